// src/models/session.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::question::PublicOption;

/// Lifecycle state of a student's attempt. Transitions are one-directional:
/// Open -> Submitted -> Graded. Publication is a flag on top of Graded, not a
/// fourth state, so unpublishing never rewinds the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Open,
    Submitted,
    Graded,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Open => "open",
            SessionStatus::Submitted => "submitted",
            SessionStatus::Graded => "graded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(SessionStatus::Open),
            "submitted" => Some(SessionStatus::Submitted),
            "graded" => Some(SessionStatus::Graded),
            _ => None,
        }
    }
}

/// Represents the 'student_quizzes' table: one student's single attempt at
/// one quiz. At most one row per (quiz, student), enforced by the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct StudentQuizSession {
    pub id: i64,
    pub quiz_id: i64,
    pub student_id: i64,
    pub start_time: chrono::DateTime<chrono::Utc>,
    pub submit_time: Option<chrono::DateTime<chrono::Utc>>,
    pub score: f64,
    pub percentage: f64,
    pub status: String,
    pub graded: bool,
    pub published: bool,
}

/// Represents the 'student_answers' table: one ledger entry per
/// (session, question). `is_correct` and `points_earned` stay NULL until the
/// grading engine resolves the selected option against the answer key;
/// free-text answers keep them NULL, meaning "awaiting manual grade", which
/// is distinct from a graded zero.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct StudentAnswer {
    pub id: i64,
    pub student_quiz_id: i64,
    pub question_id: i64,
    pub selected_option_id: Option<i64>,
    pub answer_text: Option<String>,
    pub is_correct: Option<bool>,
    pub points_earned: Option<f64>,
    pub answered_at: chrono::DateTime<chrono::Utc>,
}

/// DTO for recording an answer into the ledger.
#[derive(Debug, Deserialize)]
pub struct RecordAnswerRequest {
    pub question_id: i64,
    pub selected_option_id: Option<i64>,
    pub answer_text: Option<String>,
}

/// One question of the attempt view returned by StartSession.
#[derive(Debug, Serialize)]
pub struct AttemptQuestion {
    pub question_id: i64,
    pub question_order: i32,
    pub question_text: String,
    pub question_type: String,
    pub points: i32,
    pub options: Vec<PublicOption>,
}

/// Response of StartSession: the session id plus the rendered attempt view.
#[derive(Debug, Serialize)]
pub struct StartSessionResponse {
    pub session_id: i64,
    pub quiz_id: i64,
    pub status: SessionStatus,
    pub questions: Vec<AttemptQuestion>,
}

/// Published grade row as seen by the owning student.
/// `result` is derived at read time from score vs passing_score.
#[derive(Debug, Serialize, FromRow)]
pub struct StudentGradeRow {
    pub quiz_id: i64,
    pub title: String,
    pub course_name: String,
    pub score: f64,
    pub total_points: i32,
    pub percentage: f64,
    pub result: String,
    pub submit_time: Option<chrono::DateTime<chrono::Utc>>,
}

/// Per-answer breakdown of a graded session.
#[derive(Debug, Serialize, FromRow)]
pub struct AnswerDetailRow {
    pub question_text: String,
    pub your_answer: Option<String>,
    pub answer_text: Option<String>,
    pub is_correct: Option<bool>,
    pub points_earned: Option<f64>,
    pub points: i32,
}

/// Grade row of a quiz as seen by its teacher (publication not required).
#[derive(Debug, Serialize, FromRow)]
pub struct ClassGradeRow {
    pub student_id: i64,
    pub username: String,
    pub full_name: String,
    pub score: f64,
    pub total_points: i32,
    pub percentage: f64,
    pub published: bool,
}

/// Aggregate grade report for one quiz.
#[derive(Debug, Serialize, FromRow)]
pub struct GradeReport {
    pub total_students: i64,
    pub avg_score: Option<f64>,
    pub min_score: Option<f64>,
    pub max_score: Option<f64>,
    pub passed_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_text() {
        for status in [
            SessionStatus::Open,
            SessionStatus::Submitted,
            SessionStatus::Graded,
        ] {
            assert_eq!(SessionStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn unknown_status_text_is_rejected() {
        assert_eq!(SessionStatus::parse("in_progress"), None);
        assert_eq!(SessionStatus::parse(""), None);
    }
}
