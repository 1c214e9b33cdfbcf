//! Remote call facade
//!
//! Typed pass-through to the [`Backend`]. Each method reads the caller's
//! identity from the [`SessionGate`] at dispatch time, refuses with
//! [`SyncError::NotReady`] when there is none, and performs exactly one
//! backend call without retrying. Backend failures come back as
//! [`SyncError::Remote`] carrying the operation's wire name.

use std::sync::Arc;

use external_blob::{BlobTransport, ExternalBlob, UploadOptions};
use tracing::{debug, info, warn};

use crate::backend::{Backend, BackendResult};
use crate::error::{Result, SyncError};
use crate::session::{Identity, SessionGate};
use crate::types::*;

#[derive(Clone)]
pub struct RemoteFacade {
    backend: Arc<dyn Backend>,
    session: SessionGate,
    blobs: Arc<dyn BlobTransport>,
    upload: UploadOptions,
}

impl RemoteFacade {
    pub fn new(
        backend: Arc<dyn Backend>,
        session: SessionGate,
        blobs: Arc<dyn BlobTransport>,
    ) -> Self {
        Self {
            backend,
            session,
            blobs,
            upload: UploadOptions::default(),
        }
    }

    pub fn with_upload_options(mut self, upload: UploadOptions) -> Self {
        self.upload = upload;
        self
    }

    pub fn session(&self) -> &SessionGate {
        &self.session
    }

    /// Transport used for project documents
    pub fn blobs(&self) -> &Arc<dyn BlobTransport> {
        &self.blobs
    }

    fn caller(&self, op: &'static str) -> Result<Identity> {
        self.session.identity().ok_or_else(|| {
            debug!(op, "Session not ready, call refused");
            SyncError::NotReady
        })
    }

    fn finish<T>(op: &'static str, result: BackendResult<T>) -> Result<T> {
        result.map_err(|cause| {
            warn!(op, error = %cause, "Remote call failed");
            SyncError::remote(op, cause)
        })
    }

    // Students

    pub async fn add_student(&self, student: &Student) -> Result<()> {
        let caller = self.caller("addStudent")?;
        Self::finish("addStudent", self.backend.add_student(&caller, student).await)
    }

    pub async fn update_student(&self, student: &Student) -> Result<()> {
        let caller = self.caller("updateStudent")?;
        Self::finish(
            "updateStudent",
            self.backend.update_student(&caller, student).await,
        )
    }

    pub async fn delete_student(&self, student_id: &str) -> Result<()> {
        let caller = self.caller("deleteStudent")?;
        Self::finish(
            "deleteStudent",
            self.backend.delete_student(&caller, student_id).await,
        )
    }

    pub async fn get_student(&self, student_id: &str) -> Result<Option<Student>> {
        let caller = self.caller("getStudent")?;
        Self::finish("getStudent", self.backend.get_student(&caller, student_id).await)
    }

    pub async fn get_all_students(&self) -> Result<Vec<Student>> {
        let caller = self.caller("getAllStudents")?;
        Self::finish("getAllStudents", self.backend.get_all_students(&caller).await)
    }

    // Courses

    pub async fn add_course(&self, course: &Course) -> Result<()> {
        let caller = self.caller("addCourse")?;
        Self::finish("addCourse", self.backend.add_course(&caller, course).await)
    }

    pub async fn update_course(&self, course: &Course) -> Result<()> {
        let caller = self.caller("updateCourse")?;
        Self::finish("updateCourse", self.backend.update_course(&caller, course).await)
    }

    pub async fn delete_course(&self, course_code: &str) -> Result<()> {
        let caller = self.caller("deleteCourse")?;
        Self::finish(
            "deleteCourse",
            self.backend.delete_course(&caller, course_code).await,
        )
    }

    pub async fn get_course(&self, course_code: &str) -> Result<Option<Course>> {
        let caller = self.caller("getCourse")?;
        Self::finish("getCourse", self.backend.get_course(&caller, course_code).await)
    }

    pub async fn get_all_courses(&self) -> Result<Vec<Course>> {
        let caller = self.caller("getAllCourses")?;
        Self::finish("getAllCourses", self.backend.get_all_courses(&caller).await)
    }

    // Instructors

    pub async fn add_instructor_profile(&self, profile: &InstructorProfile) -> Result<()> {
        let caller = self.caller("addInstructorProfile")?;
        Self::finish(
            "addInstructorProfile",
            self.backend.add_instructor_profile(&caller, profile).await,
        )
    }

    pub async fn update_instructor_profile(&self, profile: &InstructorProfile) -> Result<()> {
        let caller = self.caller("updateInstructorProfile")?;
        Self::finish(
            "updateInstructorProfile",
            self.backend.update_instructor_profile(&caller, profile).await,
        )
    }

    pub async fn delete_instructor_profile(&self, instructor_id: &str) -> Result<()> {
        let caller = self.caller("deleteInstructorProfile")?;
        Self::finish(
            "deleteInstructorProfile",
            self.backend
                .delete_instructor_profile(&caller, instructor_id)
                .await,
        )
    }

    pub async fn get_instructor_profile(
        &self,
        instructor_id: &str,
    ) -> Result<Option<InstructorProfile>> {
        let caller = self.caller("getInstructorProfile")?;
        Self::finish(
            "getInstructorProfile",
            self.backend
                .get_instructor_profile(&caller, instructor_id)
                .await,
        )
    }

    pub async fn get_all_instructor_profiles(&self) -> Result<Vec<InstructorProfile>> {
        let caller = self.caller("getAllInstructorProfiles")?;
        Self::finish(
            "getAllInstructorProfiles",
            self.backend.get_all_instructor_profiles(&caller).await,
        )
    }

    // Grades

    pub async fn add_grade(&self, grade: &Grade) -> Result<()> {
        let caller = self.caller("addGrade")?;
        Self::finish("addGrade", self.backend.add_grade(&caller, grade).await)
    }

    pub async fn update_grade(&self, grade: &Grade) -> Result<()> {
        let caller = self.caller("updateGrade")?;
        Self::finish("updateGrade", self.backend.update_grade(&caller, grade).await)
    }

    pub async fn get_student_grades(&self, student_id: &str, course_code: &str) -> Result<Vec<Grade>> {
        let caller = self.caller("getStudentGrades")?;
        Self::finish(
            "getStudentGrades",
            self.backend
                .get_student_grades(&caller, student_id, course_code)
                .await,
        )
    }

    pub async fn get_all_student_grades(&self, student_id: &str) -> Result<CourseGrades> {
        let caller = self.caller("getAllStudentGrades")?;
        Self::finish(
            "getAllStudentGrades",
            self.backend.get_all_student_grades(&caller, student_id).await,
        )
    }

    // Projects

    /// Upload the project document, then register the project
    ///
    /// The upload is refused up front when the session is not ready. If the
    /// session changes while the document uploads, the registration call is
    /// refused as well rather than sent under a different identity.
    pub async fn add_project(
        &self,
        id: &str,
        student_id: &str,
        title: &str,
        description: &str,
        pdf: ExternalBlob,
    ) -> Result<()> {
        let op = "addProject";
        let caller = self.caller(op)?;

        let blob = pdf.commit(self.blobs.as_ref(), &self.upload).await?;
        info!(project = id, blob = %blob.id, "Project document committed");

        if self.caller(op)? != caller {
            warn!(project = id, "Session changed during upload, project not registered");
            return Err(SyncError::NotReady);
        }

        Self::finish(
            op,
            self.backend
                .add_project(&caller, id, student_id, title, description, &blob)
                .await,
        )
    }

    pub async fn update_project_grade(&self, id: &str, grade: u64) -> Result<()> {
        let caller = self.caller("updateProjectGrade")?;
        Self::finish(
            "updateProjectGrade",
            self.backend.update_project_grade(&caller, id, grade).await,
        )
    }

    pub async fn update_project_status(&self, id: &str, status: ProjectStatus) -> Result<()> {
        let caller = self.caller("updateProjectStatus")?;
        Self::finish(
            "updateProjectStatus",
            self.backend.update_project_status(&caller, id, status).await,
        )
    }

    pub async fn get_project_by_id(&self, id: &str) -> Result<Option<Project>> {
        let caller = self.caller("getProjectById")?;
        Self::finish(
            "getProjectById",
            self.backend.get_project_by_id(&caller, id).await,
        )
    }

    pub async fn get_projects_by_student_id(&self, student_id: &str) -> Result<Vec<Project>> {
        let caller = self.caller("getProjectsByStudentId")?;
        Self::finish(
            "getProjectsByStudentId",
            self.backend
                .get_projects_by_student_id(&caller, student_id)
                .await,
        )
    }

    // Enrollments

    pub async fn enroll_student(&self, student_id: &str, course_code: &str) -> Result<()> {
        let caller = self.caller("enrollStudent")?;
        Self::finish(
            "enrollStudent",
            self.backend
                .enroll_student(&caller, student_id, course_code)
                .await,
        )
    }

    pub async fn delete_enrollment(&self, student_id: &str, course_code: &str) -> Result<()> {
        let caller = self.caller("deleteEnrollment")?;
        Self::finish(
            "deleteEnrollment",
            self.backend
                .delete_enrollment(&caller, student_id, course_code)
                .await,
        )
    }

    pub async fn get_all_enrollments(&self) -> Result<Vec<Enrollment>> {
        let caller = self.caller("getAllEnrollments")?;
        Self::finish(
            "getAllEnrollments",
            self.backend.get_all_enrollments(&caller).await,
        )
    }

    pub async fn get_enrollments_by_student(&self, student_id: &str) -> Result<Vec<Enrollment>> {
        let caller = self.caller("getEnrollmentsByStudent")?;
        Self::finish(
            "getEnrollmentsByStudent",
            self.backend
                .get_enrollments_by_student(&caller, student_id)
                .await,
        )
    }

    pub async fn get_enrollments_by_course(&self, course_code: &str) -> Result<Vec<Enrollment>> {
        let caller = self.caller("getEnrollmentsByCourse")?;
        Self::finish(
            "getEnrollmentsByCourse",
            self.backend
                .get_enrollments_by_course(&caller, course_code)
                .await,
        )
    }

    // Attendance

    pub async fn record_attendance(&self, attendance: &Attendance) -> Result<()> {
        let caller = self.caller("recordAttendance")?;
        Self::finish(
            "recordAttendance",
            self.backend.record_attendance(&caller, attendance).await,
        )
    }

    pub async fn get_student_attendance(
        &self,
        student_id: &str,
        course_code: &str,
    ) -> Result<Vec<Attendance>> {
        let caller = self.caller("getStudentAttendance")?;
        Self::finish(
            "getStudentAttendance",
            self.backend
                .get_student_attendance(&caller, student_id, course_code)
                .await,
        )
    }

    pub async fn get_attendance_by_student(&self, student_id: &str) -> Result<Vec<Attendance>> {
        let caller = self.caller("getAttendanceByStudent")?;
        Self::finish(
            "getAttendanceByStudent",
            self.backend
                .get_attendance_by_student(&caller, student_id)
                .await,
        )
    }

    pub async fn get_attendance_by_course(&self, course_code: &str) -> Result<Vec<Attendance>> {
        let caller = self.caller("getAttendanceByCourse")?;
        Self::finish(
            "getAttendanceByCourse",
            self.backend
                .get_attendance_by_course(&caller, course_code)
                .await,
        )
    }

    pub async fn get_attendance_statistics(&self, student_id: &str) -> Result<AttendanceStatistics> {
        let caller = self.caller("getAttendanceStatistics")?;
        Self::finish(
            "getAttendanceStatistics",
            self.backend
                .get_attendance_statistics(&caller, student_id)
                .await,
        )
    }

    // Caller profile and roles

    pub async fn get_caller_user_profile(&self) -> Result<Option<UserProfile>> {
        let caller = self.caller("getCallerUserProfile")?;
        Self::finish(
            "getCallerUserProfile",
            self.backend.get_caller_user_profile(&caller).await,
        )
    }

    pub async fn save_caller_user_profile(&self, profile: &UserProfile) -> Result<()> {
        let caller = self.caller("saveCallerUserProfile")?;
        Self::finish(
            "saveCallerUserProfile",
            self.backend.save_caller_user_profile(&caller, profile).await,
        )
    }

    pub async fn get_user_profile(&self, user: &str) -> Result<Option<UserProfile>> {
        let caller = self.caller("getUserProfile")?;
        Self::finish(
            "getUserProfile",
            self.backend.get_user_profile(&caller, user).await,
        )
    }

    pub async fn get_caller_user_role(&self) -> Result<UserRole> {
        let caller = self.caller("getCallerUserRole")?;
        Self::finish(
            "getCallerUserRole",
            self.backend.get_caller_user_role(&caller).await,
        )
    }

    pub async fn assign_caller_user_role(&self, user: &str, role: UserRole) -> Result<()> {
        let caller = self.caller("assignCallerUserRole")?;
        Self::finish(
            "assignCallerUserRole",
            self.backend.assign_caller_user_role(&caller, user, role).await,
        )
    }

    pub async fn is_caller_admin(&self) -> Result<bool> {
        let caller = self.caller("isCallerAdmin")?;
        Self::finish("isCallerAdmin", self.backend.is_caller_admin(&caller).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendError;
    use crate::memory::MemoryBackend;
    use external_blob::MemoryBlobStore;
    use std::sync::Mutex;

    fn facade(session: SessionGate) -> (RemoteFacade, MemoryBackend, MemoryBlobStore) {
        let backend = MemoryBackend::new();
        let blobs = MemoryBlobStore::new();
        let facade = RemoteFacade::new(
            Arc::new(backend.clone()),
            session,
            Arc::new(blobs.clone()),
        );
        (facade, backend, blobs)
    }

    fn ready() -> SessionGate {
        SessionGate::with_identity(Identity::new("registrar", "token"))
    }

    #[tokio::test]
    async fn test_not_ready_refuses_without_remote_call() {
        let (facade, backend, _) = facade(SessionGate::new());

        assert!(matches!(
            facade.get_all_students().await,
            Err(SyncError::NotReady)
        ));
        assert!(matches!(
            facade.enroll_student("S1", "CS101").await,
            Err(SyncError::NotReady)
        ));
        assert_eq!(backend.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_backend_failure_is_tagged_with_operation() {
        let (facade, backend, _) = facade(ready());
        backend.fail("getAllCourses");

        match facade.get_all_courses().await {
            Err(SyncError::Remote { op, cause }) => {
                assert_eq!(op, "getAllCourses");
                assert!(matches!(*cause, BackendError::Rejected(_)));
            }
            other => panic!("expected remote error, got {:?}", other),
        }
        assert_eq!(backend.calls("getAllCourses"), 1);
    }

    #[tokio::test]
    async fn test_calls_use_current_identity() {
        let session = ready();
        let (facade, backend, _) = facade(session.clone());
        backend.grant_role("registrar", UserRole::Admin);

        assert!(facade.is_caller_admin().await.unwrap());
        session.complete_login(Identity::new("visitor", "other"));
        assert!(!facade.is_caller_admin().await.unwrap());
    }

    #[tokio::test]
    async fn test_add_project_uploads_document_first() {
        let (facade, backend, blobs) = facade(ready());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);
        let pdf = ExternalBlob::from_bytes(b"%PDF-1.7 thesis".to_vec())
            .with_upload_progress(move |pct: u8| sink_seen.lock().unwrap().push(pct));

        facade
            .add_project("P1", "S1", "Thesis", "Final thesis", pdf)
            .await
            .unwrap();

        assert_eq!(blobs.len(), 1);
        assert_eq!(seen.lock().unwrap().last(), Some(&100));
        let project = facade.get_project_by_id("P1").await.unwrap().unwrap();
        assert_eq!(project.status, ProjectStatus::Submitted);
        assert_eq!(
            blobs.fetch(&project.pdf).await.unwrap(),
            b"%PDF-1.7 thesis".to_vec()
        );
        assert_eq!(backend.calls("addProject"), 1);
    }

    #[tokio::test]
    async fn test_add_project_not_ready_skips_upload() {
        let (facade, backend, blobs) = facade(SessionGate::new());
        let pdf = ExternalBlob::from_bytes(b"%PDF".to_vec());

        assert!(matches!(
            facade.add_project("P1", "S1", "T", "D", pdf).await,
            Err(SyncError::NotReady)
        ));
        assert!(blobs.is_empty());
        assert_eq!(backend.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_add_project_adopts_remote_document() {
        let (facade, backend, blobs) = facade(ready());
        let pdf = ExternalBlob::from_url("https://files.example.edu/thesis.pdf").unwrap();

        facade.add_project("P2", "S1", "T", "D", pdf).await.unwrap();

        let project = facade.get_project_by_id("P2").await.unwrap().unwrap();
        assert_eq!(project.pdf.url.as_str(), "https://files.example.edu/thesis.pdf");
        assert!(blobs.is_empty());
        assert_eq!(backend.calls("addProject"), 1);
    }
}
