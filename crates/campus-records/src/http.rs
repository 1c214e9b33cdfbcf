//! JSON-over-HTTP backend client

use std::time::Duration;

use async_trait::async_trait;
use external_blob::BlobRef;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

use crate::backend::{Backend, BackendResult};
use crate::error::BackendError;
use crate::session::Identity;
use crate::types::*;

/// Backend reached over HTTP
///
/// Each operation is `POST {base}/api/{operation}` with the positional
/// arguments as a JSON array and the caller's token as a bearer credential.
/// The response body is the JSON-encoded return value (`null` for unit and
/// absent results).
pub struct HttpBackend {
    client: Client,
    base_url: Url,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> BackendResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Self::with_client(client, base_url)
    }

    pub fn with_client(client: Client, base_url: &str) -> BackendResult<Self> {
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn op_url(&self, op: &str) -> BackendResult<Url> {
        Ok(self.base_url.join(&format!("api/{}", op))?)
    }

    async fn call<R: DeserializeOwned>(
        &self,
        caller: &Identity,
        op: &'static str,
        args: Value,
    ) -> BackendResult<R> {
        let url = self.op_url(op)?;
        debug!(op, "Backend call");

        let response = self
            .client
            .post(url)
            .bearer_auth(&caller.token)
            .json(&args)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                code: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn add_student(&self, caller: &Identity, student: &Student) -> BackendResult<()> {
        self.call(caller, "addStudent", json!([student])).await
    }

    async fn update_student(&self, caller: &Identity, student: &Student) -> BackendResult<()> {
        self.call(caller, "updateStudent", json!([student])).await
    }

    async fn delete_student(&self, caller: &Identity, student_id: &str) -> BackendResult<()> {
        self.call(caller, "deleteStudent", json!([student_id])).await
    }

    async fn get_student(
        &self,
        caller: &Identity,
        student_id: &str,
    ) -> BackendResult<Option<Student>> {
        self.call(caller, "getStudent", json!([student_id])).await
    }

    async fn get_all_students(&self, caller: &Identity) -> BackendResult<Vec<Student>> {
        self.call(caller, "getAllStudents", json!([])).await
    }

    async fn add_course(&self, caller: &Identity, course: &Course) -> BackendResult<()> {
        self.call(caller, "addCourse", json!([course])).await
    }

    async fn update_course(&self, caller: &Identity, course: &Course) -> BackendResult<()> {
        self.call(caller, "updateCourse", json!([course])).await
    }

    async fn delete_course(&self, caller: &Identity, course_code: &str) -> BackendResult<()> {
        self.call(caller, "deleteCourse", json!([course_code])).await
    }

    async fn get_course(
        &self,
        caller: &Identity,
        course_code: &str,
    ) -> BackendResult<Option<Course>> {
        self.call(caller, "getCourse", json!([course_code])).await
    }

    async fn get_all_courses(&self, caller: &Identity) -> BackendResult<Vec<Course>> {
        self.call(caller, "getAllCourses", json!([])).await
    }

    async fn add_instructor_profile(
        &self,
        caller: &Identity,
        profile: &InstructorProfile,
    ) -> BackendResult<()> {
        self.call(caller, "addInstructorProfile", json!([profile]))
            .await
    }

    async fn update_instructor_profile(
        &self,
        caller: &Identity,
        profile: &InstructorProfile,
    ) -> BackendResult<()> {
        self.call(caller, "updateInstructorProfile", json!([profile]))
            .await
    }

    async fn delete_instructor_profile(
        &self,
        caller: &Identity,
        instructor_id: &str,
    ) -> BackendResult<()> {
        self.call(caller, "deleteInstructorProfile", json!([instructor_id]))
            .await
    }

    async fn get_instructor_profile(
        &self,
        caller: &Identity,
        instructor_id: &str,
    ) -> BackendResult<Option<InstructorProfile>> {
        self.call(caller, "getInstructorProfile", json!([instructor_id]))
            .await
    }

    async fn get_all_instructor_profiles(
        &self,
        caller: &Identity,
    ) -> BackendResult<Vec<InstructorProfile>> {
        self.call(caller, "getAllInstructorProfiles", json!([]))
            .await
    }

    async fn add_grade(&self, caller: &Identity, grade: &Grade) -> BackendResult<()> {
        self.call(caller, "addGrade", json!([grade])).await
    }

    async fn update_grade(&self, caller: &Identity, grade: &Grade) -> BackendResult<()> {
        self.call(caller, "updateGrade", json!([grade])).await
    }

    async fn get_student_grades(
        &self,
        caller: &Identity,
        student_id: &str,
        course_code: &str,
    ) -> BackendResult<Vec<Grade>> {
        self.call(caller, "getStudentGrades", json!([student_id, course_code]))
            .await
    }

    async fn get_all_student_grades(
        &self,
        caller: &Identity,
        student_id: &str,
    ) -> BackendResult<CourseGrades> {
        self.call(caller, "getAllStudentGrades", json!([student_id]))
            .await
    }

    async fn add_project(
        &self,
        caller: &Identity,
        id: &str,
        student_id: &str,
        title: &str,
        description: &str,
        pdf: &BlobRef,
    ) -> BackendResult<()> {
        self.call(
            caller,
            "addProject",
            json!([id, student_id, title, description, pdf]),
        )
        .await
    }

    async fn update_project_grade(
        &self,
        caller: &Identity,
        id: &str,
        grade: u64,
    ) -> BackendResult<()> {
        self.call(caller, "updateProjectGrade", json!([id, grade]))
            .await
    }

    async fn update_project_status(
        &self,
        caller: &Identity,
        id: &str,
        status: ProjectStatus,
    ) -> BackendResult<()> {
        self.call(caller, "updateProjectStatus", json!([id, status]))
            .await
    }

    async fn get_project_by_id(
        &self,
        caller: &Identity,
        id: &str,
    ) -> BackendResult<Option<Project>> {
        self.call(caller, "getProjectById", json!([id])).await
    }

    async fn get_projects_by_student_id(
        &self,
        caller: &Identity,
        student_id: &str,
    ) -> BackendResult<Vec<Project>> {
        self.call(caller, "getProjectsByStudentId", json!([student_id]))
            .await
    }

    async fn enroll_student(
        &self,
        caller: &Identity,
        student_id: &str,
        course_code: &str,
    ) -> BackendResult<()> {
        self.call(caller, "enrollStudent", json!([student_id, course_code]))
            .await
    }

    async fn delete_enrollment(
        &self,
        caller: &Identity,
        student_id: &str,
        course_code: &str,
    ) -> BackendResult<()> {
        self.call(caller, "deleteEnrollment", json!([student_id, course_code]))
            .await
    }

    async fn get_all_enrollments(&self, caller: &Identity) -> BackendResult<Vec<Enrollment>> {
        self.call(caller, "getAllEnrollments", json!([])).await
    }

    async fn get_enrollments_by_student(
        &self,
        caller: &Identity,
        student_id: &str,
    ) -> BackendResult<Vec<Enrollment>> {
        self.call(caller, "getEnrollmentsByStudent", json!([student_id]))
            .await
    }

    async fn get_enrollments_by_course(
        &self,
        caller: &Identity,
        course_code: &str,
    ) -> BackendResult<Vec<Enrollment>> {
        self.call(caller, "getEnrollmentsByCourse", json!([course_code]))
            .await
    }

    async fn record_attendance(
        &self,
        caller: &Identity,
        attendance: &Attendance,
    ) -> BackendResult<()> {
        self.call(caller, "recordAttendance", json!([attendance]))
            .await
    }

    async fn get_student_attendance(
        &self,
        caller: &Identity,
        student_id: &str,
        course_code: &str,
    ) -> BackendResult<Vec<Attendance>> {
        self.call(
            caller,
            "getStudentAttendance",
            json!([student_id, course_code]),
        )
        .await
    }

    async fn get_attendance_by_student(
        &self,
        caller: &Identity,
        student_id: &str,
    ) -> BackendResult<Vec<Attendance>> {
        self.call(caller, "getAttendanceByStudent", json!([student_id]))
            .await
    }

    async fn get_attendance_by_course(
        &self,
        caller: &Identity,
        course_code: &str,
    ) -> BackendResult<Vec<Attendance>> {
        self.call(caller, "getAttendanceByCourse", json!([course_code]))
            .await
    }

    async fn get_attendance_statistics(
        &self,
        caller: &Identity,
        student_id: &str,
    ) -> BackendResult<AttendanceStatistics> {
        self.call(caller, "getAttendanceStatistics", json!([student_id]))
            .await
    }

    async fn get_caller_user_profile(
        &self,
        caller: &Identity,
    ) -> BackendResult<Option<UserProfile>> {
        self.call(caller, "getCallerUserProfile", json!([])).await
    }

    async fn save_caller_user_profile(
        &self,
        caller: &Identity,
        profile: &UserProfile,
    ) -> BackendResult<()> {
        self.call(caller, "saveCallerUserProfile", json!([profile]))
            .await
    }

    async fn get_user_profile(
        &self,
        caller: &Identity,
        user: &str,
    ) -> BackendResult<Option<UserProfile>> {
        self.call(caller, "getUserProfile", json!([user])).await
    }

    async fn get_caller_user_role(&self, caller: &Identity) -> BackendResult<UserRole> {
        self.call(caller, "getCallerUserRole", json!([])).await
    }

    async fn assign_caller_user_role(
        &self,
        caller: &Identity,
        user: &str,
        role: UserRole,
    ) -> BackendResult<()> {
        self.call(caller, "assignCallerUserRole", json!([user, role]))
            .await
    }

    async fn is_caller_admin(&self, caller: &Identity) -> BackendResult<bool> {
        self.call(caller, "isCallerAdmin", json!([])).await
    }
}
