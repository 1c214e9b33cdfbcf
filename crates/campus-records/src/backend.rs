//! Backend RPC surface
//!
//! Every operation takes the calling [`Identity`] explicitly; transports never
//! hold credentials of their own.

use async_trait::async_trait;
use external_blob::BlobRef;

use crate::error::BackendError;
use crate::session::Identity;
use crate::types::*;

pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Remote operations exposed by the campus records backend
#[async_trait]
pub trait Backend: Send + Sync {
    // Students
    async fn add_student(&self, caller: &Identity, student: &Student) -> BackendResult<()>;
    async fn update_student(&self, caller: &Identity, student: &Student) -> BackendResult<()>;
    async fn delete_student(&self, caller: &Identity, student_id: &str) -> BackendResult<()>;
    async fn get_student(&self, caller: &Identity, student_id: &str)
        -> BackendResult<Option<Student>>;
    async fn get_all_students(&self, caller: &Identity) -> BackendResult<Vec<Student>>;

    // Courses
    async fn add_course(&self, caller: &Identity, course: &Course) -> BackendResult<()>;
    async fn update_course(&self, caller: &Identity, course: &Course) -> BackendResult<()>;
    async fn delete_course(&self, caller: &Identity, course_code: &str) -> BackendResult<()>;
    async fn get_course(&self, caller: &Identity, course_code: &str)
        -> BackendResult<Option<Course>>;
    async fn get_all_courses(&self, caller: &Identity) -> BackendResult<Vec<Course>>;

    // Instructors
    async fn add_instructor_profile(
        &self,
        caller: &Identity,
        profile: &InstructorProfile,
    ) -> BackendResult<()>;
    async fn update_instructor_profile(
        &self,
        caller: &Identity,
        profile: &InstructorProfile,
    ) -> BackendResult<()>;
    async fn delete_instructor_profile(
        &self,
        caller: &Identity,
        instructor_id: &str,
    ) -> BackendResult<()>;
    async fn get_instructor_profile(
        &self,
        caller: &Identity,
        instructor_id: &str,
    ) -> BackendResult<Option<InstructorProfile>>;
    async fn get_all_instructor_profiles(
        &self,
        caller: &Identity,
    ) -> BackendResult<Vec<InstructorProfile>>;

    // Grades
    async fn add_grade(&self, caller: &Identity, grade: &Grade) -> BackendResult<()>;
    async fn update_grade(&self, caller: &Identity, grade: &Grade) -> BackendResult<()>;
    async fn get_student_grades(
        &self,
        caller: &Identity,
        student_id: &str,
        course_code: &str,
    ) -> BackendResult<Vec<Grade>>;
    async fn get_all_student_grades(
        &self,
        caller: &Identity,
        student_id: &str,
    ) -> BackendResult<CourseGrades>;

    // Projects
    async fn add_project(
        &self,
        caller: &Identity,
        id: &str,
        student_id: &str,
        title: &str,
        description: &str,
        pdf: &BlobRef,
    ) -> BackendResult<()>;
    async fn update_project_grade(&self, caller: &Identity, id: &str, grade: u64)
        -> BackendResult<()>;
    async fn update_project_status(
        &self,
        caller: &Identity,
        id: &str,
        status: ProjectStatus,
    ) -> BackendResult<()>;
    async fn get_project_by_id(&self, caller: &Identity, id: &str)
        -> BackendResult<Option<Project>>;
    async fn get_projects_by_student_id(
        &self,
        caller: &Identity,
        student_id: &str,
    ) -> BackendResult<Vec<Project>>;

    // Enrollments
    async fn enroll_student(
        &self,
        caller: &Identity,
        student_id: &str,
        course_code: &str,
    ) -> BackendResult<()>;
    async fn delete_enrollment(
        &self,
        caller: &Identity,
        student_id: &str,
        course_code: &str,
    ) -> BackendResult<()>;
    async fn get_all_enrollments(&self, caller: &Identity) -> BackendResult<Vec<Enrollment>>;
    async fn get_enrollments_by_student(
        &self,
        caller: &Identity,
        student_id: &str,
    ) -> BackendResult<Vec<Enrollment>>;
    async fn get_enrollments_by_course(
        &self,
        caller: &Identity,
        course_code: &str,
    ) -> BackendResult<Vec<Enrollment>>;

    // Attendance
    async fn record_attendance(&self, caller: &Identity, attendance: &Attendance)
        -> BackendResult<()>;
    async fn get_student_attendance(
        &self,
        caller: &Identity,
        student_id: &str,
        course_code: &str,
    ) -> BackendResult<Vec<Attendance>>;
    async fn get_attendance_by_student(
        &self,
        caller: &Identity,
        student_id: &str,
    ) -> BackendResult<Vec<Attendance>>;
    async fn get_attendance_by_course(
        &self,
        caller: &Identity,
        course_code: &str,
    ) -> BackendResult<Vec<Attendance>>;
    async fn get_attendance_statistics(
        &self,
        caller: &Identity,
        student_id: &str,
    ) -> BackendResult<AttendanceStatistics>;

    // Caller profile and roles
    async fn get_caller_user_profile(&self, caller: &Identity)
        -> BackendResult<Option<UserProfile>>;
    async fn save_caller_user_profile(
        &self,
        caller: &Identity,
        profile: &UserProfile,
    ) -> BackendResult<()>;
    async fn get_user_profile(&self, caller: &Identity, user: &str)
        -> BackendResult<Option<UserProfile>>;
    async fn get_caller_user_role(&self, caller: &Identity) -> BackendResult<UserRole>;
    async fn assign_caller_user_role(
        &self,
        caller: &Identity,
        user: &str,
        role: UserRole,
    ) -> BackendResult<()>;
    async fn is_caller_admin(&self, caller: &Identity) -> BackendResult<bool>;
}
