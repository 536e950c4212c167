// src/services/analytics.rs
//
// Usage statistics refresh and the adaptive difficulty analyzer. Both read
// across all historical answers, independent of any single session's
// lifecycle, and tolerate slightly stale counters with respect to concurrent
// grading.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

use crate::error::AppError;

/// Observed difficulty classification derived from aggregate performance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Difficulty {
    NoData,
    TooEasy,
    Appropriate,
    SlightlyHard,
    TooHard,
}

/// Ordered band table, evaluated top-down. Bounds are inclusive, so exactly
/// 80% classifies as TooEasy, not Appropriate.
const DIFFICULTY_BANDS: &[(i64, Difficulty)] = &[
    (80, Difficulty::TooEasy),
    (60, Difficulty::Appropriate),
    (40, Difficulty::SlightlyHard),
];

/// Correct rate as a whole percentage, rounded half away from zero to match
/// the store's ROUND(). Zero attempts yield zero.
pub fn correct_rate(correct_count: i64, total_attempts: i64) -> i64 {
    if total_attempts <= 0 {
        return 0;
    }
    (correct_count as f64 * 100.0 / total_attempts as f64).round() as i64
}

/// Classifies a question's observed difficulty from its counters.
pub fn classify(correct_count: i64, total_attempts: i64) -> Difficulty {
    if total_attempts == 0 {
        return Difficulty::NoData;
    }
    let rate = correct_rate(correct_count, total_attempts);
    DIFFICULTY_BANDS
        .iter()
        .find(|(lower_bound, _)| rate >= *lower_bound)
        .map(|(_, label)| *label)
        .unwrap_or(Difficulty::TooHard)
}

/// Recomputes the per-question usage counters from every historical answer.
///
/// Full recomputation, not an incremental counter: `times_used` counts
/// distinct sessions, `total_attempts` counts answers, `correct_count`
/// counts answers graded correct. Safe to run concurrently with grading;
/// the result is a point-in-time snapshot. Returns the number of questions
/// updated.
pub async fn refresh_question_stats(pool: &PgPool) -> Result<u64, AppError> {
    let result = sqlx::query(
        r#"
        UPDATE questions q
        SET times_used = (SELECT COUNT(DISTINCT sa.student_quiz_id)
                          FROM student_answers sa WHERE sa.question_id = q.id),
            total_attempts = (SELECT COUNT(*)
                              FROM student_answers sa WHERE sa.question_id = q.id),
            correct_count = (SELECT COUNT(*)
                             FROM student_answers sa
                             WHERE sa.question_id = q.id AND sa.is_correct = TRUE)
        WHERE q.id IN (SELECT DISTINCT question_id FROM student_answers)
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!(updated = result.rows_affected(), "question stats refreshed");

    Ok(result.rows_affected())
}

/// One rated question in the difficulty report.
#[derive(Debug, Serialize, FromRow)]
pub struct DifficultyRating {
    pub question_id: i64,
    pub question_text: String,
    /// The author's 1-5 label, for comparison against the observed rating.
    pub preset_difficulty: i32,
    pub total_attempts: i64,
    pub correct_count: i64,
    #[sqlx(skip)]
    pub correct_rate: i64,
    #[sqlx(skip)]
    pub observed_difficulty: Option<Difficulty>,
}

/// Rates every question used at least `min_attempts` times.
pub async fn rate_difficulty(
    pool: &PgPool,
    min_attempts: i64,
) -> Result<Vec<DifficultyRating>, AppError> {
    if min_attempts < 0 {
        return Err(AppError::Validation(
            "minAttempts must not be negative".to_string(),
        ));
    }

    let mut ratings = sqlx::query_as::<_, DifficultyRating>(
        r#"
        SELECT q.id AS question_id, q.question_text,
               q.difficulty_level AS preset_difficulty,
               q.total_attempts, q.correct_count
        FROM questions q
        WHERE q.times_used >= $1 AND q.is_deleted = FALSE
        ORDER BY q.id
        "#,
    )
    .bind(min_attempts)
    .fetch_all(pool)
    .await?;

    for rating in &mut ratings {
        rating.correct_rate = correct_rate(rating.correct_count, rating.total_attempts);
        rating.observed_difficulty = Some(classify(rating.correct_count, rating.total_attempts));
    }

    Ok(ratings)
}

/// The closed set of keys the usage ranking may sort by. Free-form sort keys
/// are rejected at parse time and never reach the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageOrderKey {
    TimesUsed,
    TotalAttempts,
    CorrectRate,
}

impl UsageOrderKey {
    pub fn parse(s: &str) -> Result<Self, AppError> {
        match s {
            "times_used" => Ok(UsageOrderKey::TimesUsed),
            "total_attempts" => Ok(UsageOrderKey::TotalAttempts),
            "correct_rate" => Ok(UsageOrderKey::CorrectRate),
            other => Err(AppError::Validation(format!(
                "Unknown order key '{}', expected one of times_used, total_attempts, correct_rate",
                other
            ))),
        }
    }

    /// The ORDER BY column for this key. Only these fixed strings are ever
    /// spliced into the ranking query.
    fn column(&self) -> &'static str {
        match self {
            UsageOrderKey::TimesUsed => "times_used",
            UsageOrderKey::TotalAttempts => "total_attempts",
            UsageOrderKey::CorrectRate => "correct_rate",
        }
    }
}

/// One row of the usage ranking.
#[derive(Debug, Serialize, FromRow)]
pub struct UsageRankRow {
    pub question_id: i64,
    pub question_text: String,
    pub times_used: i64,
    pub total_attempts: i64,
    pub correct_rate: f64,
}

/// Returns the top `limit` questions by the chosen key, descending, ties
/// broken by total attempts descending.
pub async fn rank_by_usage(
    pool: &PgPool,
    limit: i64,
    order_key: UsageOrderKey,
) -> Result<Vec<UsageRankRow>, AppError> {
    if limit <= 0 {
        return Err(AppError::Validation("limit must be positive".to_string()));
    }

    let sql = format!(
        r#"
        SELECT question_id, question_text, times_used, total_attempts, correct_rate
        FROM (
            SELECT q.id AS question_id, q.question_text, q.times_used, q.total_attempts,
                   CASE WHEN q.total_attempts > 0
                        THEN ROUND(q.correct_count * 100.0 / q.total_attempts, 2)::double precision
                        ELSE 0 END AS correct_rate
            FROM questions q
            WHERE q.times_used > 0 AND q.is_deleted = FALSE
        ) ranked
        ORDER BY {} DESC, total_attempts DESC
        LIMIT $1
        "#,
        order_key.column()
    );

    let rows = sqlx::query_as::<_, UsageRankRow>(&sql)
        .bind(limit)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}
