// src/models/quiz.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'quizzes' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Quiz {
    pub id: i64,
    pub classroom_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub created_by: i64,
    pub start_time: Option<chrono::DateTime<chrono::Utc>>,
    pub end_time: Option<chrono::DateTime<chrono::Utc>>,
    pub duration_minutes: i32,
    pub total_points: i32,
    pub passing_score: i32,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Represents the 'quiz_settings' table.
/// Shuffling is a presentation concern applied when the attempt view is
/// rendered; nothing about the shuffle is stored per session.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct QuizSettings {
    pub quiz_id: i64,
    pub shuffle_questions: bool,
    pub shuffle_options: bool,
    pub show_results_immediately: bool,
    pub allow_review: bool,
}

impl Default for QuizSettings {
    fn default() -> Self {
        Self {
            quiz_id: 0,
            shuffle_questions: false,
            shuffle_options: false,
            show_results_immediately: false,
            allow_review: true,
        }
    }
}

/// DTO for one (question, points) link inside a quiz-creation request.
#[derive(Debug, Deserialize, Validate)]
pub struct QuizQuestionInput {
    pub question_id: i64,
    pub question_order: i32,
    #[validate(range(min = 0, max = 1000))]
    pub points: i32,
}

/// DTO for quiz settings inside a quiz-creation request.
#[derive(Debug, Deserialize, Default)]
pub struct QuizSettingsInput {
    #[serde(default)]
    pub shuffle_questions: bool,
    #[serde(default)]
    pub shuffle_options: bool,
    #[serde(default)]
    pub show_results_immediately: bool,
    #[serde(default = "default_allow_review")]
    pub allow_review: bool,
}

fn default_allow_review() -> bool {
    true
}

/// DTO for creating a quiz together with its question links and settings.
/// The whole request is applied in one transaction.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuizRequest {
    pub classroom_id: i64,
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    pub start_time: Option<chrono::DateTime<chrono::Utc>>,
    pub end_time: Option<chrono::DateTime<chrono::Utc>>,
    #[validate(range(min = 1, max = 600))]
    pub duration_minutes: i32,
    #[validate(range(min = 1))]
    pub total_points: i32,
    #[validate(range(min = 0))]
    pub passing_score: i32,
    #[validate(nested)]
    pub questions: Vec<QuizQuestionInput>,
    pub settings: Option<QuizSettingsInput>,
}

/// Quiz detail row with its question count.
#[derive(Debug, Serialize, FromRow)]
pub struct QuizDetail {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub start_time: Option<chrono::DateTime<chrono::Utc>>,
    pub end_time: Option<chrono::DateTime<chrono::Utc>>,
    pub duration_minutes: i32,
    pub total_points: i32,
    pub passing_score: i32,
    pub question_count: i64,
}

/// Row of a teacher's quiz listing with submission count.
#[derive(Debug, Serialize, FromRow)]
pub struct TeacherQuizRow {
    pub id: i64,
    pub title: String,
    pub course_name: String,
    pub submissions: i64,
}

/// One quiz as seen by an enrolled student, with that student's attempt
/// status if a session exists.
#[derive(Debug, Serialize, FromRow)]
pub struct AvailableQuiz {
    pub id: i64,
    pub title: String,
    pub course_name: String,
    pub duration_minutes: i32,
    pub total_points: i32,
    pub start_time: Option<chrono::DateTime<chrono::Utc>>,
    pub end_time: Option<chrono::DateTime<chrono::Utc>>,
    pub my_status: Option<String>,
}
