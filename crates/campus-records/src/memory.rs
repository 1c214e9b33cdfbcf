//! In-process backend
//!
//! Holds records in memory and counts calls per operation. Used by tests and
//! for running the client without a server.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use external_blob::BlobRef;

use crate::backend::{Backend, BackendResult};
use crate::error::BackendError;
use crate::session::Identity;
use crate::stats::attendance_statistics;
use crate::types::*;

#[derive(Default)]
struct Records {
    students: BTreeMap<String, Student>,
    courses: BTreeMap<String, Course>,
    instructors: BTreeMap<String, InstructorProfile>,
    grades: Vec<Grade>,
    projects: BTreeMap<String, Project>,
    enrollments: Vec<Enrollment>,
    attendance: Vec<Attendance>,
    profiles: HashMap<String, UserProfile>,
    roles: HashMap<String, UserRole>,
}

#[derive(Default)]
struct Inner {
    records: Records,
    calls: HashMap<&'static str, usize>,
    failing: HashSet<&'static str>,
    latency: Option<Duration>,
}

/// Backend that keeps every record in memory
///
/// Cloning yields another handle to the same records and counters.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency` before it touches any record
    pub fn with_latency(self, latency: Duration) -> Self {
        self.lock().latency = Some(latency);
        self
    }

    /// Make the named operation (wire name, e.g. `"addGrade"`) fail until
    /// [`MemoryBackend::recover`] is called
    pub fn fail(&self, op: &'static str) {
        self.lock().failing.insert(op);
    }

    pub fn recover(&self, op: &'static str) {
        self.lock().failing.remove(op);
    }

    /// Number of calls made to the named operation, failed ones included
    pub fn calls(&self, op: &str) -> usize {
        self.lock().calls.get(op).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.lock().calls.values().sum()
    }

    pub fn grant_role(&self, principal: &str, role: UserRole) {
        self.lock().records.roles.insert(principal.to_string(), role);
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Count the call, apply latency and failure injection, then run `f`
    /// against the records
    async fn with_records<T>(
        &self,
        op: &'static str,
        f: impl FnOnce(&mut Records) -> BackendResult<T>,
    ) -> BackendResult<T> {
        let latency = {
            let mut inner = self.lock();
            *inner.calls.entry(op).or_insert(0) += 1;
            inner.latency
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut inner = self.lock();
        if inner.failing.contains(op) {
            return Err(BackendError::Rejected(format!("{} unavailable", op)));
        }
        f(&mut inner.records)
    }
}

fn not_found(kind: &str, id: &str) -> BackendError {
    BackendError::Rejected(format!("{} not found: {}", kind, id))
}

fn already_exists(kind: &str, id: &str) -> BackendError {
    BackendError::Rejected(format!("{} already exists: {}", kind, id))
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn add_student(&self, _caller: &Identity, student: &Student) -> BackendResult<()> {
        self.with_records("addStudent", |r| {
            if r.students.contains_key(&student.id) {
                return Err(already_exists("student", &student.id));
            }
            r.students.insert(student.id.clone(), student.clone());
            Ok(())
        })
        .await
    }

    async fn update_student(&self, _caller: &Identity, student: &Student) -> BackendResult<()> {
        self.with_records("updateStudent", |r| {
            let existing = r
                .students
                .get_mut(&student.id)
                .ok_or_else(|| not_found("student", &student.id))?;
            *existing = student.clone();
            Ok(())
        })
        .await
    }

    async fn delete_student(&self, _caller: &Identity, student_id: &str) -> BackendResult<()> {
        self.with_records("deleteStudent", |r| {
            r.students
                .remove(student_id)
                .map(|_| ())
                .ok_or_else(|| not_found("student", student_id))
        })
        .await
    }

    async fn get_student(
        &self,
        _caller: &Identity,
        student_id: &str,
    ) -> BackendResult<Option<Student>> {
        self.with_records("getStudent", |r| Ok(r.students.get(student_id).cloned()))
            .await
    }

    async fn get_all_students(&self, _caller: &Identity) -> BackendResult<Vec<Student>> {
        self.with_records("getAllStudents", |r| {
            Ok(r.students.values().cloned().collect())
        })
        .await
    }

    async fn add_course(&self, _caller: &Identity, course: &Course) -> BackendResult<()> {
        self.with_records("addCourse", |r| {
            if r.courses.contains_key(&course.code) {
                return Err(already_exists("course", &course.code));
            }
            r.courses.insert(course.code.clone(), course.clone());
            Ok(())
        })
        .await
    }

    async fn update_course(&self, _caller: &Identity, course: &Course) -> BackendResult<()> {
        self.with_records("updateCourse", |r| {
            let existing = r
                .courses
                .get_mut(&course.code)
                .ok_or_else(|| not_found("course", &course.code))?;
            *existing = course.clone();
            Ok(())
        })
        .await
    }

    async fn delete_course(&self, _caller: &Identity, course_code: &str) -> BackendResult<()> {
        self.with_records("deleteCourse", |r| {
            r.courses
                .remove(course_code)
                .map(|_| ())
                .ok_or_else(|| not_found("course", course_code))
        })
        .await
    }

    async fn get_course(
        &self,
        _caller: &Identity,
        course_code: &str,
    ) -> BackendResult<Option<Course>> {
        self.with_records("getCourse", |r| Ok(r.courses.get(course_code).cloned()))
            .await
    }

    async fn get_all_courses(&self, _caller: &Identity) -> BackendResult<Vec<Course>> {
        self.with_records("getAllCourses", |r| Ok(r.courses.values().cloned().collect()))
            .await
    }

    async fn add_instructor_profile(
        &self,
        _caller: &Identity,
        profile: &InstructorProfile,
    ) -> BackendResult<()> {
        self.with_records("addInstructorProfile", |r| {
            if r.instructors.contains_key(&profile.id) {
                return Err(already_exists("instructor", &profile.id));
            }
            r.instructors.insert(profile.id.clone(), profile.clone());
            Ok(())
        })
        .await
    }

    async fn update_instructor_profile(
        &self,
        _caller: &Identity,
        profile: &InstructorProfile,
    ) -> BackendResult<()> {
        self.with_records("updateInstructorProfile", |r| {
            let existing = r
                .instructors
                .get_mut(&profile.id)
                .ok_or_else(|| not_found("instructor", &profile.id))?;
            *existing = profile.clone();
            Ok(())
        })
        .await
    }

    async fn delete_instructor_profile(
        &self,
        _caller: &Identity,
        instructor_id: &str,
    ) -> BackendResult<()> {
        self.with_records("deleteInstructorProfile", |r| {
            r.instructors
                .remove(instructor_id)
                .map(|_| ())
                .ok_or_else(|| not_found("instructor", instructor_id))
        })
        .await
    }

    async fn get_instructor_profile(
        &self,
        _caller: &Identity,
        instructor_id: &str,
    ) -> BackendResult<Option<InstructorProfile>> {
        self.with_records("getInstructorProfile", |r| {
            Ok(r.instructors.get(instructor_id).cloned())
        })
        .await
    }

    async fn get_all_instructor_profiles(
        &self,
        _caller: &Identity,
    ) -> BackendResult<Vec<InstructorProfile>> {
        self.with_records("getAllInstructorProfiles", |r| {
            Ok(r.instructors.values().cloned().collect())
        })
        .await
    }

    async fn add_grade(&self, _caller: &Identity, grade: &Grade) -> BackendResult<()> {
        self.with_records("addGrade", |r| {
            r.grades.push(grade.clone());
            Ok(())
        })
        .await
    }

    async fn update_grade(&self, _caller: &Identity, grade: &Grade) -> BackendResult<()> {
        self.with_records("updateGrade", |r| {
            let existing = r
                .grades
                .iter_mut()
                .find(|g| {
                    g.student_id == grade.student_id
                        && g.course_code == grade.course_code
                        && g.assignment == grade.assignment
                })
                .ok_or_else(|| not_found("grade", &grade.assignment))?;
            *existing = grade.clone();
            Ok(())
        })
        .await
    }

    async fn get_student_grades(
        &self,
        _caller: &Identity,
        student_id: &str,
        course_code: &str,
    ) -> BackendResult<Vec<Grade>> {
        self.with_records("getStudentGrades", |r| {
            Ok(r.grades
                .iter()
                .filter(|g| g.student_id == student_id && g.course_code == course_code)
                .cloned()
                .collect())
        })
        .await
    }

    async fn get_all_student_grades(
        &self,
        _caller: &Identity,
        student_id: &str,
    ) -> BackendResult<CourseGrades> {
        self.with_records("getAllStudentGrades", |r| {
            let mut by_course: BTreeMap<String, Vec<Grade>> = BTreeMap::new();
            for grade in r.grades.iter().filter(|g| g.student_id == student_id) {
                by_course
                    .entry(grade.course_code.clone())
                    .or_default()
                    .push(grade.clone());
            }
            Ok(by_course.into_iter().collect())
        })
        .await
    }

    async fn add_project(
        &self,
        _caller: &Identity,
        id: &str,
        student_id: &str,
        title: &str,
        description: &str,
        pdf: &BlobRef,
    ) -> BackendResult<()> {
        self.with_records("addProject", |r| {
            if r.projects.contains_key(id) {
                return Err(already_exists("project", id));
            }
            r.projects.insert(
                id.to_string(),
                Project {
                    id: id.to_string(),
                    student_id: student_id.to_string(),
                    title: title.to_string(),
                    description: description.to_string(),
                    pdf: pdf.clone(),
                    status: ProjectStatus::Submitted,
                    grade: 0,
                    submission_date: now(),
                },
            );
            Ok(())
        })
        .await
    }

    async fn update_project_grade(
        &self,
        _caller: &Identity,
        id: &str,
        grade: u64,
    ) -> BackendResult<()> {
        self.with_records("updateProjectGrade", |r| {
            let project = r.projects.get_mut(id).ok_or_else(|| not_found("project", id))?;
            project.grade = grade;
            project.status = ProjectStatus::Graded;
            Ok(())
        })
        .await
    }

    async fn update_project_status(
        &self,
        _caller: &Identity,
        id: &str,
        status: ProjectStatus,
    ) -> BackendResult<()> {
        self.with_records("updateProjectStatus", |r| {
            let project = r.projects.get_mut(id).ok_or_else(|| not_found("project", id))?;
            project.status = status;
            Ok(())
        })
        .await
    }

    async fn get_project_by_id(
        &self,
        _caller: &Identity,
        id: &str,
    ) -> BackendResult<Option<Project>> {
        self.with_records("getProjectById", |r| Ok(r.projects.get(id).cloned()))
            .await
    }

    async fn get_projects_by_student_id(
        &self,
        _caller: &Identity,
        student_id: &str,
    ) -> BackendResult<Vec<Project>> {
        self.with_records("getProjectsByStudentId", |r| {
            Ok(r.projects
                .values()
                .filter(|p| p.student_id == student_id)
                .cloned()
                .collect())
        })
        .await
    }

    async fn enroll_student(
        &self,
        _caller: &Identity,
        student_id: &str,
        course_code: &str,
    ) -> BackendResult<()> {
        self.with_records("enrollStudent", |r| {
            if !r.students.contains_key(student_id) {
                return Err(not_found("student", student_id));
            }
            if !r.courses.contains_key(course_code) {
                return Err(not_found("course", course_code));
            }
            let enrolled = r
                .enrollments
                .iter()
                .any(|e| e.student_id == student_id && e.course_code == course_code);
            if !enrolled {
                r.enrollments.push(Enrollment {
                    student_id: student_id.to_string(),
                    course_code: course_code.to_string(),
                    enrollment_date: now(),
                });
            }
            Ok(())
        })
        .await
    }

    async fn delete_enrollment(
        &self,
        _caller: &Identity,
        student_id: &str,
        course_code: &str,
    ) -> BackendResult<()> {
        self.with_records("deleteEnrollment", |r| {
            let before = r.enrollments.len();
            r.enrollments
                .retain(|e| !(e.student_id == student_id && e.course_code == course_code));
            if r.enrollments.len() == before {
                return Err(not_found("enrollment", &format!("{}/{}", student_id, course_code)));
            }
            Ok(())
        })
        .await
    }

    async fn get_all_enrollments(&self, _caller: &Identity) -> BackendResult<Vec<Enrollment>> {
        self.with_records("getAllEnrollments", |r| Ok(r.enrollments.clone()))
            .await
    }

    async fn get_enrollments_by_student(
        &self,
        _caller: &Identity,
        student_id: &str,
    ) -> BackendResult<Vec<Enrollment>> {
        self.with_records("getEnrollmentsByStudent", |r| {
            Ok(r.enrollments
                .iter()
                .filter(|e| e.student_id == student_id)
                .cloned()
                .collect())
        })
        .await
    }

    async fn get_enrollments_by_course(
        &self,
        _caller: &Identity,
        course_code: &str,
    ) -> BackendResult<Vec<Enrollment>> {
        self.with_records("getEnrollmentsByCourse", |r| {
            Ok(r.enrollments
                .iter()
                .filter(|e| e.course_code == course_code)
                .cloned()
                .collect())
        })
        .await
    }

    async fn record_attendance(
        &self,
        _caller: &Identity,
        attendance: &Attendance,
    ) -> BackendResult<()> {
        self.with_records("recordAttendance", |r| {
            r.attendance.push(attendance.clone());
            Ok(())
        })
        .await
    }

    async fn get_student_attendance(
        &self,
        _caller: &Identity,
        student_id: &str,
        course_code: &str,
    ) -> BackendResult<Vec<Attendance>> {
        self.with_records("getStudentAttendance", |r| {
            Ok(r.attendance
                .iter()
                .filter(|a| a.student_id == student_id && a.course_code == course_code)
                .cloned()
                .collect())
        })
        .await
    }

    async fn get_attendance_by_student(
        &self,
        _caller: &Identity,
        student_id: &str,
    ) -> BackendResult<Vec<Attendance>> {
        self.with_records("getAttendanceByStudent", |r| {
            Ok(r.attendance
                .iter()
                .filter(|a| a.student_id == student_id)
                .cloned()
                .collect())
        })
        .await
    }

    async fn get_attendance_by_course(
        &self,
        _caller: &Identity,
        course_code: &str,
    ) -> BackendResult<Vec<Attendance>> {
        self.with_records("getAttendanceByCourse", |r| {
            Ok(r.attendance
                .iter()
                .filter(|a| a.course_code == course_code)
                .cloned()
                .collect())
        })
        .await
    }

    async fn get_attendance_statistics(
        &self,
        _caller: &Identity,
        student_id: &str,
    ) -> BackendResult<AttendanceStatistics> {
        self.with_records("getAttendanceStatistics", |r| {
            let records: Vec<Attendance> = r
                .attendance
                .iter()
                .filter(|a| a.student_id == student_id)
                .cloned()
                .collect();
            Ok(attendance_statistics(&records))
        })
        .await
    }

    async fn get_caller_user_profile(
        &self,
        caller: &Identity,
    ) -> BackendResult<Option<UserProfile>> {
        self.with_records("getCallerUserProfile", |r| {
            Ok(r.profiles.get(&caller.principal).cloned())
        })
        .await
    }

    async fn save_caller_user_profile(
        &self,
        caller: &Identity,
        profile: &UserProfile,
    ) -> BackendResult<()> {
        self.with_records("saveCallerUserProfile", |r| {
            r.profiles.insert(caller.principal.clone(), profile.clone());
            Ok(())
        })
        .await
    }

    async fn get_user_profile(
        &self,
        _caller: &Identity,
        user: &str,
    ) -> BackendResult<Option<UserProfile>> {
        self.with_records("getUserProfile", |r| Ok(r.profiles.get(user).cloned()))
            .await
    }

    async fn get_caller_user_role(&self, caller: &Identity) -> BackendResult<UserRole> {
        self.with_records("getCallerUserRole", |r| {
            Ok(r.roles
                .get(&caller.principal)
                .copied()
                .unwrap_or(UserRole::Guest))
        })
        .await
    }

    async fn assign_caller_user_role(
        &self,
        caller: &Identity,
        user: &str,
        role: UserRole,
    ) -> BackendResult<()> {
        self.with_records("assignCallerUserRole", |r| {
            if r.roles.get(&caller.principal) != Some(&UserRole::Admin) {
                return Err(BackendError::Rejected(
                    "Unauthorized: only admins can assign roles".to_string(),
                ));
            }
            r.roles.insert(user.to_string(), role);
            Ok(())
        })
        .await
    }

    async fn is_caller_admin(&self, caller: &Identity) -> BackendResult<bool> {
        self.with_records("isCallerAdmin", |r| {
            Ok(r.roles.get(&caller.principal) == Some(&UserRole::Admin))
        })
        .await
    }
}
