//! Cached, session-aware access to campus records
//!
//! [`CampusClient`] is what views talk to. Reads go through the query cache
//! under the keys in [`crate::keys`]; writes go through the facade and, on
//! success, invalidate the key families they declare. While no session is
//! ready, or when a required parameter is empty, reads return the empty
//! value for their type without contacting the backend.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use external_blob::ExternalBlob;
use query_cache::{QueryCache, QueryKey};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::Result;
use crate::facade::RemoteFacade;
use crate::keys::{self, tags};
use crate::session::{Identity, SessionGate};
use crate::types::*;

/// Default freshness window for cached reads (5 minutes)
pub const DEFAULT_STALE_TIME: Duration = Duration::from_secs(300);

/// How reads treat a cached value that has gone stale
///
/// The default, [`RefreshMode::Await`], blocks a read of an expired or
/// invalidated entry until the refetch finishes, so a read that follows a
/// successful write always observes it. [`RefreshMode::Background`] serves
/// expired and invalidated values optimistically instead, at the cost of one
/// read of possibly outdated data after a write. Either way, a failed refetch
/// keeps the previous value cached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RefreshMode {
    /// Wait for the refetch and return its result
    #[default]
    Await,
    /// Return the stale value at once and refetch in the background
    Background,
}

#[derive(Clone)]
pub struct CampusClient {
    facade: RemoteFacade,
    cache: QueryCache,
    stale_time: Duration,
    refresh: RefreshMode,
}

impl CampusClient {
    pub fn new(facade: RemoteFacade, cache: QueryCache) -> Self {
        Self {
            facade,
            cache,
            stale_time: DEFAULT_STALE_TIME,
            refresh: RefreshMode::Await,
        }
    }

    pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = stale_time;
        self
    }

    pub fn with_refresh_mode(mut self, refresh: RefreshMode) -> Self {
        self.refresh = refresh;
        self
    }

    pub fn session(&self) -> &SessionGate {
        self.facade.session()
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn facade(&self) -> &RemoteFacade {
        &self.facade
    }

    // Session lifecycle

    pub fn begin_login(&self) {
        if self.session().begin_login().is_some() {
            self.cache.clear();
        }
    }

    /// Make `identity` the active session
    ///
    /// Cached data belongs to the identity that fetched it, so switching to a
    /// different principal starts from an empty cache.
    pub fn complete_login(&self, identity: Identity) {
        let principal = identity.principal.clone();
        if let Some(previous) = self.session().complete_login(identity) {
            if previous.principal != principal {
                info!(from = %previous.principal, to = %principal, "Identity changed, clearing cache");
                self.cache.clear();
            }
        }
    }

    pub fn fail_login(&self) {
        self.session().fail_login();
    }

    pub fn logout(&self) {
        self.session().logout();
        self.cache.clear();
    }

    /// Run a read through the cache, or return `T::default()` when the
    /// session is not ready or a required parameter is empty
    async fn gated<T, F, Fut>(&self, key: QueryKey, params: &[&str], fetch: F) -> Result<Arc<T>>
    where
        T: Default + Send + Sync + 'static,
        F: FnOnce(RemoteFacade) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        if params.iter().any(|p| p.is_empty()) {
            debug!(key = %key, "Missing query parameter, returning empty result");
            return Ok(Arc::new(T::default()));
        }
        if !self.session().ready() {
            debug!(key = %key, "Session not ready, returning empty result");
            return Ok(Arc::new(T::default()));
        }

        let facade = self.facade.clone();
        let fetcher = move || fetch(facade);
        match self.refresh {
            RefreshMode::Await => self.cache.query(key, self.stale_time, fetcher).await,
            RefreshMode::Background => {
                self.cache
                    .query_optimistic(key, self.stale_time, fetcher)
                    .await
            }
        }
    }

    // Students

    pub async fn students(&self) -> Result<Arc<Vec<Student>>> {
        self.gated(keys::students(), &[], |f| async move { f.get_all_students().await })
            .await
    }

    pub async fn student(&self, id: &str) -> Result<Arc<Option<Student>>> {
        self.gated(keys::student(id), &[id], |f| {
            let id = id.to_string();
            async move { f.get_student(&id).await }
        })
        .await
    }

    pub async fn add_student(&self, student: &Student) -> Result<()> {
        self.cache
            .mutate(&tags::student_writes(), self.facade.add_student(student))
            .await
    }

    pub async fn update_student(&self, student: &Student) -> Result<()> {
        self.cache
            .mutate(&tags::student_writes(), self.facade.update_student(student))
            .await
    }

    pub async fn delete_student(&self, id: &str) -> Result<()> {
        self.cache
            .mutate(&tags::student_writes(), self.facade.delete_student(id))
            .await
    }

    // Courses

    pub async fn courses(&self) -> Result<Arc<Vec<Course>>> {
        self.gated(keys::courses(), &[], |f| async move { f.get_all_courses().await })
            .await
    }

    pub async fn course(&self, code: &str) -> Result<Arc<Option<Course>>> {
        self.gated(keys::course(code), &[code], |f| {
            let code = code.to_string();
            async move { f.get_course(&code).await }
        })
        .await
    }

    pub async fn add_course(&self, course: &Course) -> Result<()> {
        self.cache
            .mutate(&tags::course_writes(), self.facade.add_course(course))
            .await
    }

    pub async fn update_course(&self, course: &Course) -> Result<()> {
        self.cache
            .mutate(&tags::course_writes(), self.facade.update_course(course))
            .await
    }

    pub async fn delete_course(&self, code: &str) -> Result<()> {
        self.cache
            .mutate(&tags::course_writes(), self.facade.delete_course(code))
            .await
    }

    // Instructors

    pub async fn instructor_profiles(&self) -> Result<Arc<Vec<InstructorProfile>>> {
        self.gated(keys::instructor_profiles(), &[], |f| async move {
            f.get_all_instructor_profiles().await
        })
        .await
    }

    pub async fn instructor_profile(&self, id: &str) -> Result<Arc<Option<InstructorProfile>>> {
        self.gated(keys::instructor_profile(id), &[id], |f| {
            let id = id.to_string();
            async move { f.get_instructor_profile(&id).await }
        })
        .await
    }

    pub async fn add_instructor_profile(&self, profile: &InstructorProfile) -> Result<()> {
        self.cache
            .mutate(
                &tags::instructor_writes(),
                self.facade.add_instructor_profile(profile),
            )
            .await
    }

    pub async fn update_instructor_profile(&self, profile: &InstructorProfile) -> Result<()> {
        self.cache
            .mutate(
                &tags::instructor_writes(),
                self.facade.update_instructor_profile(profile),
            )
            .await
    }

    pub async fn delete_instructor_profile(&self, id: &str) -> Result<()> {
        self.cache
            .mutate(
                &tags::instructor_writes(),
                self.facade.delete_instructor_profile(id),
            )
            .await
    }

    // Grades

    /// Every grade of a student, grouped by course code
    pub async fn all_student_grades(&self, student_id: &str) -> Result<Arc<CourseGrades>> {
        self.gated(keys::all_student_grades(student_id), &[student_id], |f| {
            let student_id = student_id.to_string();
            async move { f.get_all_student_grades(&student_id).await }
        })
        .await
    }

    pub async fn student_grades(
        &self,
        student_id: &str,
        course_code: &str,
    ) -> Result<Arc<Vec<Grade>>> {
        self.gated(
            keys::student_grades(student_id, course_code),
            &[student_id, course_code],
            |f| {
                let (student_id, course_code) = (student_id.to_string(), course_code.to_string());
                async move { f.get_student_grades(&student_id, &course_code).await }
            },
        )
        .await
    }

    pub async fn add_grade(&self, grade: &Grade) -> Result<()> {
        self.cache
            .mutate(&tags::grade_writes(), self.facade.add_grade(grade))
            .await
    }

    pub async fn update_grade(&self, grade: &Grade) -> Result<()> {
        self.cache
            .mutate(&tags::grade_writes(), self.facade.update_grade(grade))
            .await
    }

    // Projects

    pub async fn projects(&self, student_id: &str) -> Result<Arc<Vec<Project>>> {
        self.gated(keys::projects(student_id), &[student_id], |f| {
            let student_id = student_id.to_string();
            async move { f.get_projects_by_student_id(&student_id).await }
        })
        .await
    }

    pub async fn project(&self, id: &str) -> Result<Arc<Option<Project>>> {
        self.gated(keys::project(id), &[id], |f| {
            let id = id.to_string();
            async move { f.get_project_by_id(&id).await }
        })
        .await
    }

    /// Upload `pdf` and register a new project under a fresh id
    ///
    /// Returns the new project id.
    pub async fn add_project(
        &self,
        student_id: &str,
        title: &str,
        description: &str,
        pdf: ExternalBlob,
    ) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        self.cache
            .mutate(
                &tags::project_writes(),
                self.facade
                    .add_project(&id, student_id, title, description, pdf),
            )
            .await?;
        Ok(id)
    }

    pub async fn update_project_grade(&self, id: &str, grade: u64) -> Result<()> {
        self.cache
            .mutate(
                &tags::project_writes(),
                self.facade.update_project_grade(id, grade),
            )
            .await
    }

    pub async fn update_project_status(&self, id: &str, status: ProjectStatus) -> Result<()> {
        self.cache
            .mutate(
                &tags::project_writes(),
                self.facade.update_project_status(id, status),
            )
            .await
    }

    // Enrollments

    pub async fn enrollments(&self) -> Result<Arc<Vec<Enrollment>>> {
        self.gated(keys::enrollments(), &[], |f| async move {
            f.get_all_enrollments().await
        })
        .await
    }

    pub async fn enrollments_by_student(&self, student_id: &str) -> Result<Arc<Vec<Enrollment>>> {
        self.gated(keys::enrollments_by_student(student_id), &[student_id], |f| {
            let student_id = student_id.to_string();
            async move { f.get_enrollments_by_student(&student_id).await }
        })
        .await
    }

    pub async fn enrollments_by_course(&self, course_code: &str) -> Result<Arc<Vec<Enrollment>>> {
        self.gated(keys::enrollments_by_course(course_code), &[course_code], |f| {
            let course_code = course_code.to_string();
            async move { f.get_enrollments_by_course(&course_code).await }
        })
        .await
    }

    pub async fn enroll_student(&self, student_id: &str, course_code: &str) -> Result<()> {
        self.cache
            .mutate(
                &tags::enrollment_writes(),
                self.facade.enroll_student(student_id, course_code),
            )
            .await
    }

    pub async fn delete_enrollment(&self, student_id: &str, course_code: &str) -> Result<()> {
        self.cache
            .mutate(
                &tags::enrollment_writes(),
                self.facade.delete_enrollment(student_id, course_code),
            )
            .await
    }

    // Attendance

    pub async fn student_attendance(
        &self,
        student_id: &str,
        course_code: &str,
    ) -> Result<Arc<Vec<Attendance>>> {
        self.gated(
            keys::student_attendance(student_id, course_code),
            &[student_id, course_code],
            |f| {
                let (student_id, course_code) = (student_id.to_string(), course_code.to_string());
                async move { f.get_student_attendance(&student_id, &course_code).await }
            },
        )
        .await
    }

    pub async fn attendance_by_student(&self, student_id: &str) -> Result<Arc<Vec<Attendance>>> {
        self.gated(keys::attendance_by_student(student_id), &[student_id], |f| {
            let student_id = student_id.to_string();
            async move { f.get_attendance_by_student(&student_id).await }
        })
        .await
    }

    pub async fn attendance_by_course(&self, course_code: &str) -> Result<Arc<Vec<Attendance>>> {
        self.gated(keys::attendance_by_course(course_code), &[course_code], |f| {
            let course_code = course_code.to_string();
            async move { f.get_attendance_by_course(&course_code).await }
        })
        .await
    }

    pub async fn attendance_statistics(
        &self,
        student_id: &str,
    ) -> Result<Arc<AttendanceStatistics>> {
        self.gated(keys::attendance_statistics(student_id), &[student_id], |f| {
            let student_id = student_id.to_string();
            async move { f.get_attendance_statistics(&student_id).await }
        })
        .await
    }

    /// Record one session for a student, stamped with the current time
    pub async fn record_attendance(
        &self,
        student_id: &str,
        course_code: &str,
        present: bool,
    ) -> Result<()> {
        let attendance = Attendance {
            student_id: student_id.to_string(),
            course_code: course_code.to_string(),
            session_date: now(),
            present,
        };
        self.cache
            .mutate(
                &tags::attendance_writes(),
                self.facade.record_attendance(&attendance),
            )
            .await
    }

    // Caller profile and roles

    pub async fn current_user_profile(&self) -> Result<Arc<Option<UserProfile>>> {
        self.gated(keys::current_user_profile(), &[], |f| async move {
            f.get_caller_user_profile().await
        })
        .await
    }

    pub async fn user_profile(&self, user: &str) -> Result<Arc<Option<UserProfile>>> {
        self.gated(keys::user_profile(user), &[user], |f| {
            let user = user.to_string();
            async move { f.get_user_profile(&user).await }
        })
        .await
    }

    /// Role of the caller; `None` while no session is ready
    pub async fn caller_user_role(&self) -> Result<Arc<Option<UserRole>>> {
        self.gated(keys::caller_user_role(), &[], |f| async move {
            f.get_caller_user_role().await.map(Some)
        })
        .await
    }

    pub async fn is_caller_admin(&self) -> Result<Arc<bool>> {
        self.gated(keys::is_caller_admin(), &[], |f| async move {
            f.is_caller_admin().await
        })
        .await
    }

    pub async fn save_caller_user_profile(&self, profile: &UserProfile) -> Result<()> {
        self.cache
            .mutate(
                &tags::profile_writes(),
                self.facade.save_caller_user_profile(profile),
            )
            .await
    }

    pub async fn assign_caller_user_role(&self, user: &str, role: UserRole) -> Result<()> {
        self.cache
            .mutate(
                &tags::role_writes(),
                self.facade.assign_caller_user_role(user, role),
            )
            .await
    }
}
