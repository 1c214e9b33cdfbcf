//! Cache keys and invalidation tags for every record family
//!
//! Families with more than one query shape put a fixed sub-kind right after
//! the family name, so an id can never be mistaken for a discriminator.

use query_cache::{InvalidationTag, QueryKey};

pub const STUDENTS: &str = "students";
pub const STUDENT: &str = "student";
pub const COURSES: &str = "courses";
pub const COURSE: &str = "course";
pub const GRADES: &str = "grades";
pub const PROJECTS: &str = "projects";
pub const PROJECT: &str = "project";
pub const INSTRUCTOR_PROFILES: &str = "instructorProfiles";
pub const INSTRUCTOR_PROFILE: &str = "instructorProfile";
pub const ENROLLMENTS: &str = "enrollments";
pub const ATTENDANCE: &str = "attendance";
pub const CURRENT_USER_PROFILE: &str = "currentUserProfile";
pub const USER_PROFILE: &str = "userProfile";
pub const CALLER_USER_ROLE: &str = "callerUserRole";
pub const IS_CALLER_ADMIN: &str = "isCallerAdmin";

pub fn students() -> QueryKey {
    QueryKey::new(STUDENTS)
}

pub fn student(id: &str) -> QueryKey {
    QueryKey::new(STUDENT).with(id)
}

pub fn courses() -> QueryKey {
    QueryKey::new(COURSES)
}

pub fn course(code: &str) -> QueryKey {
    QueryKey::new(COURSE).with(code)
}

pub fn all_student_grades(student_id: &str) -> QueryKey {
    QueryKey::new(GRADES).with("student").with(student_id)
}

pub fn student_grades(student_id: &str, course_code: &str) -> QueryKey {
    QueryKey::new(GRADES)
        .with("course")
        .with(student_id)
        .with(course_code)
}

pub fn projects(student_id: &str) -> QueryKey {
    QueryKey::new(PROJECTS).with(student_id)
}

pub fn project(id: &str) -> QueryKey {
    QueryKey::new(PROJECT).with(id)
}

pub fn instructor_profiles() -> QueryKey {
    QueryKey::new(INSTRUCTOR_PROFILES)
}

pub fn instructor_profile(id: &str) -> QueryKey {
    QueryKey::new(INSTRUCTOR_PROFILE).with(id)
}

pub fn enrollments() -> QueryKey {
    QueryKey::new(ENROLLMENTS)
}

pub fn enrollments_by_student(student_id: &str) -> QueryKey {
    QueryKey::new(ENROLLMENTS).with("student").with(student_id)
}

pub fn enrollments_by_course(course_code: &str) -> QueryKey {
    QueryKey::new(ENROLLMENTS).with("course").with(course_code)
}

pub fn student_attendance(student_id: &str, course_code: &str) -> QueryKey {
    QueryKey::new(ATTENDANCE)
        .with("studentCourse")
        .with(student_id)
        .with(course_code)
}

pub fn attendance_by_student(student_id: &str) -> QueryKey {
    QueryKey::new(ATTENDANCE).with("student").with(student_id)
}

pub fn attendance_by_course(course_code: &str) -> QueryKey {
    QueryKey::new(ATTENDANCE).with("course").with(course_code)
}

pub fn attendance_statistics(student_id: &str) -> QueryKey {
    QueryKey::new(ATTENDANCE).with("statistics").with(student_id)
}

pub fn current_user_profile() -> QueryKey {
    QueryKey::new(CURRENT_USER_PROFILE)
}

pub fn user_profile(user: &str) -> QueryKey {
    QueryKey::new(USER_PROFILE).with(user)
}

pub fn caller_user_role() -> QueryKey {
    QueryKey::new(CALLER_USER_ROLE)
}

pub fn is_caller_admin() -> QueryKey {
    QueryKey::new(IS_CALLER_ADMIN)
}

/// Tags invalidated by each kind of write
pub mod tags {
    use super::*;

    pub fn student_writes() -> Vec<InvalidationTag> {
        vec![
            InvalidationTag::family(STUDENTS),
            InvalidationTag::family(STUDENT),
        ]
    }

    pub fn course_writes() -> Vec<InvalidationTag> {
        vec![
            InvalidationTag::family(COURSES),
            InvalidationTag::family(COURSE),
        ]
    }

    pub fn instructor_writes() -> Vec<InvalidationTag> {
        vec![
            InvalidationTag::family(INSTRUCTOR_PROFILES),
            InvalidationTag::family(INSTRUCTOR_PROFILE),
        ]
    }

    pub fn grade_writes() -> Vec<InvalidationTag> {
        vec![InvalidationTag::family(GRADES)]
    }

    pub fn project_writes() -> Vec<InvalidationTag> {
        vec![
            InvalidationTag::family(PROJECTS),
            InvalidationTag::family(PROJECT),
        ]
    }

    pub fn enrollment_writes() -> Vec<InvalidationTag> {
        vec![InvalidationTag::family(ENROLLMENTS)]
    }

    pub fn attendance_writes() -> Vec<InvalidationTag> {
        vec![InvalidationTag::family(ATTENDANCE)]
    }

    pub fn profile_writes() -> Vec<InvalidationTag> {
        vec![
            InvalidationTag::Exact(current_user_profile()),
            InvalidationTag::family(USER_PROFILE),
        ]
    }

    pub fn role_writes() -> Vec<InvalidationTag> {
        vec![
            InvalidationTag::Exact(caller_user_role()),
            InvalidationTag::Exact(is_caller_admin()),
            InvalidationTag::Exact(current_user_profile()),
            InvalidationTag::family(USER_PROFILE),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grade_keys_share_family() {
        let tag = &tags::grade_writes()[0];
        assert!(tag.matches(&all_student_grades("S1")));
        assert!(tag.matches(&student_grades("S1", "CS101")));
        assert!(!tag.matches(&students()));
    }

    #[test]
    fn test_student_writes_cover_list_and_detail() {
        let tags = tags::student_writes();
        assert!(tags.iter().any(|t| t.matches(&students())));
        assert!(tags.iter().any(|t| t.matches(&student("S1"))));
        assert!(!tags.iter().any(|t| t.matches(&courses())));
    }

    #[test]
    fn test_attendance_keys_are_distinct() {
        assert_ne!(attendance_by_student("S1"), attendance_statistics("S1"));
        assert_ne!(attendance_by_student("CS101"), attendance_by_course("CS101"));
    }

    #[test]
    fn test_ids_matching_sub_kinds_do_not_collide() {
        for id in ["student", "course", "statistics", "studentCourse"] {
            assert_ne!(student_grades(id, "S1"), all_student_grades("S1"));
            assert_ne!(student_grades("student", id), all_student_grades(id));

            let attendance = [
                student_attendance(id, "S1"),
                student_attendance("statistics", id),
                attendance_by_student(id),
                attendance_by_course(id),
                attendance_statistics(id),
            ];
            for (i, a) in attendance.iter().enumerate() {
                for b in &attendance[i + 1..] {
                    assert_ne!(a, b);
                }
            }

            assert_ne!(enrollments_by_student(id), enrollments_by_course(id));
        }
    }

    #[test]
    fn test_families_still_cover_every_shape() {
        let grades = &tags::grade_writes()[0];
        assert!(grades.matches(&student_grades("S1", "CS101")));
        assert!(grades.matches(&all_student_grades("S1")));

        let attendance = &tags::attendance_writes()[0];
        assert!(attendance.matches(&student_attendance("S1", "CS101")));
        assert!(attendance.matches(&attendance_statistics("S1")));
    }

    #[test]
    fn test_profile_writes_leave_roles_alone() {
        let tags = tags::profile_writes();
        assert!(tags.iter().any(|t| t.matches(&current_user_profile())));
        assert!(!tags.iter().any(|t| t.matches(&caller_user_role())));
    }
}
