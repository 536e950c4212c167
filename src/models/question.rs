// src/models/question.rs

use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use validator::Validate;

/// The question types the platform understands.
pub const QUESTION_TYPES: &[&str] = &[
    "single_choice",
    "true_false",
    "essay",
    "fill_blank",
    "short_answer",
];

/// Types graded by comparing a selected option against the answer key.
/// Everything else has no resolvable option and is left for manual grading.
pub fn is_choice_type(question_type: &str) -> bool {
    matches!(question_type, "single_choice" | "true_false")
}

/// Represents the 'questions' table in the database.
///
/// The usage counters (`times_used`, `total_attempts`, `correct_count`) are
/// derived values, recomputed in full by the statistics refresh; everything
/// else is authored once and read many times.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub subject_id: i64,
    pub question_text: String,
    pub question_type: String,

    /// Author-assigned difficulty, 1 (easiest) to 5.
    pub difficulty_level: i32,

    pub created_by: i64,
    pub is_deleted: bool,

    /// Count of distinct sessions that answered this question.
    pub times_used: i64,
    /// Count of answers recorded against this question.
    pub total_attempts: i64,
    /// Count of answers graded correct.
    pub correct_count: i64,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Represents the 'question_options' table.
/// Immutable once a session references it: grading depends on a stable key.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AnswerOption {
    pub id: i64,
    pub question_id: i64,
    pub option_text: String,
    pub is_correct: bool,
    pub option_order: i32,
}

/// Option view sent to students: the correctness flag is never exposed.
#[derive(Debug, Serialize, FromRow)]
pub struct PublicOption {
    pub id: i64,
    pub option_text: String,
    pub option_order: i32,
}

/// DTO for one option inside a question-creation request.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct OptionInput {
    #[validate(length(min = 1, max = 500))]
    pub option_text: String,
    pub is_correct: bool,
    pub option_order: i32,
}

/// DTO for creating a new question with its options.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateQuestionRequest {
    pub subject_id: i64,
    #[validate(length(min = 1, max = 2000))]
    pub question_text: String,
    #[validate(custom(function = validate_question_type))]
    pub question_type: String,
    #[validate(range(min = 1, max = 5))]
    pub difficulty_level: i32,
    #[validate(nested)]
    pub options: Option<Vec<OptionInput>>,
}

fn validate_question_type(question_type: &str) -> Result<(), validator::ValidationError> {
    if !QUESTION_TYPES.contains(&question_type) {
        return Err(validator::ValidationError::new("unknown_question_type"));
    }
    Ok(())
}

/// DTO for batch question upload.
#[derive(Debug, Deserialize, Validate)]
pub struct BatchCreateQuestionsRequest {
    #[validate(nested, length(min = 1, max = 500))]
    pub questions: Vec<CreateQuestionRequest>,
}

/// DTO for creating a subject.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateSubjectRequest {
    #[validate(length(min = 1, max = 100))]
    pub subject_name: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(range(min = 1, max = 10))]
    pub level: i32,
    pub parent_subject_id: Option<i64>,
}

/// Aggregated question bank statistics row.
#[derive(Debug, Serialize, FromRow)]
pub struct QuestionBankStat {
    pub total: i64,
    pub question_type: String,
    pub difficulty_level: i32,
    pub subject_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn choice_types_resolve_to_an_option() {
        assert!(is_choice_type("single_choice"));
        assert!(is_choice_type("true_false"));
    }

    #[test]
    fn free_text_types_have_no_answer_key() {
        assert!(!is_choice_type("essay"));
        assert!(!is_choice_type("fill_blank"));
        assert!(!is_choice_type("short_answer"));
    }

    #[test]
    fn unknown_question_type_is_rejected() {
        assert!(validate_question_type("multiple_choice").is_err());
        assert!(validate_question_type("single_choice").is_ok());
    }
}
