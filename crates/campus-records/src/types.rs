//! Record types exchanged with the campus records backend
//!
//! Field names follow the backend's camelCase wire format. Timestamps are
//! nanoseconds since the Unix epoch.

use chrono::{DateTime, Utc};
use external_blob::BlobRef;
use serde::{Deserialize, Serialize};

/// Nanoseconds since the Unix epoch
pub type Time = i64;

/// Current time in backend representation
pub fn now() -> Time {
    Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
}

pub fn to_datetime(time: Time) -> DateTime<Utc> {
    DateTime::from_timestamp_nanos(time)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub dob: String,
    pub address: String,
    pub major: String,
    pub program: String,
    pub year: u64,
    pub enrollment_date: Time,
    pub emergency_contact_name: String,
    pub emergency_contact_phone: String,
    pub emergency_contact_relationship: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub code: String,
    pub name: String,
    pub description: String,
    pub instructor: String,
    pub credits: u64,
    pub credit_hours: u64,
    pub prerequisites: Vec<String>,
    pub schedule: String,
    pub location: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grade {
    pub student_id: String,
    pub course_code: String,
    pub assignment: String,
    pub assignment_name: String,
    pub description: String,
    pub score: u64,
    pub date: Time,
    pub due_date: Time,
    pub submission_date: Time,
    pub instructor_comments: String,
}

/// Grades of one student grouped by course code
pub type CourseGrades = Vec<(String, Vec<Grade>)>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstructorProfile {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub department: String,
    pub bio: String,
    pub office_hours: String,
    pub office_location: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    Submitted,
    Late,
    Graded,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Submitted => "submitted",
            ProjectStatus::Late => "late",
            ProjectStatus::Graded => "graded",
        }
    }
}

impl std::str::FromStr for ProjectStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "submitted" => Ok(ProjectStatus::Submitted),
            "late" => Ok(ProjectStatus::Late),
            "graded" => Ok(ProjectStatus::Graded),
            other => Err(format!("unknown project status: {}", other)),
        }
    }
}

/// A student project; `pdf` references the committed document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub student_id: String,
    pub title: String,
    pub description: String,
    pub pdf: BlobRef,
    pub status: ProjectStatus,
    pub grade: u64,
    pub submission_date: Time,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    pub student_id: String,
    pub course_code: String,
    pub enrollment_date: Time,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attendance {
    pub student_id: String,
    pub course_code: String,
    pub session_date: Time,
    pub present: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceStatistics {
    pub total_sessions: u64,
    pub sessions_attended: u64,
    pub sessions_missed: u64,
    /// Percentage of sessions attended, `0.0..=100.0`
    pub attendance_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    User,
    Guest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub name: String,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
}
