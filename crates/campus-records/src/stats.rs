//! Summary statistics over fetched records

use crate::types::{Attendance, AttendanceStatistics, Grade, Project, ProjectStatus, Time};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GradeStatistics {
    pub total_assignments: usize,
    /// Mean score rounded half up
    pub average_score: u64,
    pub highest_score: u64,
    pub lowest_score: u64,
}

/// Count, rounded mean, maximum and minimum of the scores; all zero when empty
pub fn grade_statistics(grades: &[Grade]) -> GradeStatistics {
    if grades.is_empty() {
        return GradeStatistics::default();
    }

    let count = grades.len() as u64;
    let sum: u64 = grades.iter().map(|g| g.score).sum();

    GradeStatistics {
        total_assignments: grades.len(),
        average_score: (2 * sum + count) / (2 * count),
        highest_score: grades.iter().map(|g| g.score).max().unwrap_or(0),
        lowest_score: grades.iter().map(|g| g.score).min().unwrap_or(0),
    }
}

/// A submission is late only when strictly after the due date
pub fn is_late_submission(submission_date: Time, due_date: Time) -> bool {
    submission_date > due_date
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProjectStatistics {
    pub total: usize,
    pub submitted: usize,
    pub graded: usize,
    /// Mean grade of graded projects, `None` when nothing is graded
    pub average_grade: Option<f64>,
}

pub fn project_statistics(projects: &[Project]) -> ProjectStatistics {
    let graded: Vec<u64> = projects
        .iter()
        .filter(|p| p.status == ProjectStatus::Graded)
        .map(|p| p.grade)
        .collect();
    let submitted = projects
        .iter()
        .filter(|p| p.status == ProjectStatus::Submitted)
        .count();

    let average_grade = if graded.is_empty() {
        None
    } else {
        Some(graded.iter().sum::<u64>() as f64 / graded.len() as f64)
    };

    ProjectStatistics {
        total: projects.len(),
        submitted,
        graded: graded.len(),
        average_grade,
    }
}

pub fn attendance_statistics(records: &[Attendance]) -> AttendanceStatistics {
    let total = records.len() as u64;
    let attended = records.iter().filter(|a| a.present).count() as u64;
    let rate = if total == 0 {
        0.0
    } else {
        attended as f64 * 100.0 / total as f64
    };

    AttendanceStatistics {
        total_sessions: total,
        sessions_attended: attended,
        sessions_missed: total - attended,
        attendance_rate: rate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use external_blob::BlobRef;
    use url::Url;

    fn grade(score: u64) -> Grade {
        Grade {
            student_id: "S1".to_string(),
            course_code: "CS101".to_string(),
            assignment: format!("a{}", score),
            assignment_name: String::new(),
            description: String::new(),
            score,
            date: 0,
            due_date: 0,
            submission_date: 0,
            instructor_comments: String::new(),
        }
    }

    fn project(status: ProjectStatus, grade: u64) -> Project {
        Project {
            id: format!("{:?}-{}", status, grade),
            student_id: "S1".to_string(),
            title: String::new(),
            description: String::new(),
            pdf: BlobRef::remote(Url::parse("https://files.example.edu/p.pdf").unwrap()),
            status,
            grade,
            submission_date: 0,
        }
    }

    #[test]
    fn test_grade_statistics() {
        let stats = grade_statistics(&[grade(90), grade(75), grade(82)]);
        assert_eq!(
            stats,
            GradeStatistics {
                total_assignments: 3,
                average_score: 82,
                highest_score: 90,
                lowest_score: 75,
            }
        );
    }

    #[test]
    fn test_grade_average_rounds_half_up() {
        assert_eq!(grade_statistics(&[grade(80), grade(81)]).average_score, 81);
        assert_eq!(grade_statistics(&[grade(80), grade(80), grade(81)]).average_score, 80);
    }

    #[test]
    fn test_empty_grade_statistics() {
        assert_eq!(grade_statistics(&[]), GradeStatistics::default());
    }

    #[test]
    fn test_late_submission() {
        assert!(is_late_submission(11, 10));
        assert!(!is_late_submission(10, 10));
        assert!(!is_late_submission(9, 10));
    }

    #[test]
    fn test_project_statistics() {
        let stats = project_statistics(&[
            project(ProjectStatus::Graded, 90),
            project(ProjectStatus::Graded, 85),
            project(ProjectStatus::Submitted, 0),
            project(ProjectStatus::Late, 0),
        ]);
        assert_eq!(stats.total, 4);
        assert_eq!(stats.submitted, 1);
        assert_eq!(stats.graded, 2);
        assert_eq!(stats.average_grade, Some(87.5));

        assert_eq!(project_statistics(&[]).average_grade, None);
    }

    #[test]
    fn test_attendance_statistics() {
        let record = |present| Attendance {
            student_id: "S1".to_string(),
            course_code: "CS101".to_string(),
            session_date: 0,
            present,
        };
        let stats = attendance_statistics(&[record(true), record(true), record(false), record(true)]);
        assert_eq!(stats.total_sessions, 4);
        assert_eq!(stats.sessions_attended, 3);
        assert_eq!(stats.sessions_missed, 1);
        assert_eq!(stats.attendance_rate, 75.0);

        assert_eq!(attendance_statistics(&[]), AttendanceStatistics::default());
    }
}
