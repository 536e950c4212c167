// src/services/session.rs
//
// Session lifecycle, answer ledger, auto-grading, score aggregation and
// publication for a student's quiz attempt. Every mutating operation here is
// a single atomic statement (or transaction) against the store, so readers
// never observe a partial transition.

use sqlx::{FromRow, PgPool};
use std::collections::HashMap;

use crate::{
    error::AppError,
    models::{
        question::{PublicOption, is_choice_type},
        quiz::QuizSettings,
        session::{
            AttemptQuestion, RecordAnswerRequest, SessionStatus, StartSessionResponse,
            StudentAnswer, StudentQuizSession,
        },
    },
};

/// Computes the session percentage from the quiz's declared total points.
/// The denominator is always the quiz's own total, never a fixed scale.
pub fn percentage_of(score: f64, total_points: i32) -> Result<f64, AppError> {
    if total_points <= 0 {
        return Err(AppError::Consistency(format!(
            "Quiz total_points must be positive, got {}",
            total_points
        )));
    }
    Ok(score * 100.0 / total_points as f64)
}

/// Fetches a session row or fails with NotFound.
pub async fn fetch_session(pool: &PgPool, session_id: i64) -> Result<StudentQuizSession, AppError> {
    sqlx::query_as::<_, StudentQuizSession>(
        r#"
        SELECT id, quiz_id, student_id, start_time, submit_time,
               score, percentage, status, graded, published
        FROM student_quizzes
        WHERE id = $1
        "#,
    )
    .bind(session_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Session not found".to_string()))
}

fn session_status(session: &StudentQuizSession) -> Result<SessionStatus, AppError> {
    SessionStatus::parse(&session.status).ok_or_else(|| {
        AppError::Consistency(format!(
            "Session {} has unknown status '{}'",
            session.id, session.status
        ))
    })
}

#[derive(FromRow)]
struct AttemptQuestionRow {
    question_id: i64,
    question_order: i32,
    question_text: String,
    question_type: String,
    points: i32,
}

/// Starts a new attempt for (quiz, student).
///
/// The (quiz_id, student_id) unique constraint resolves races between two
/// concurrent starts: exactly one insert succeeds, the other maps the unique
/// violation to DuplicateSession. On success returns the ordered
/// question/option view, shuffled at read time per quiz settings.
pub async fn start_session(
    pool: &PgPool,
    quiz_id: i64,
    student_id: i64,
) -> Result<StartSessionResponse, AppError> {
    let quiz_exists: Option<i64> = sqlx::query_scalar("SELECT id FROM quizzes WHERE id = $1")
        .bind(quiz_id)
        .fetch_optional(pool)
        .await?;
    if quiz_exists.is_none() {
        return Err(AppError::NotFound("Quiz not found".to_string()));
    }

    let session_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO student_quizzes (quiz_id, student_id, start_time, status)
        VALUES ($1, $2, NOW(), 'open')
        RETURNING id
        "#,
    )
    .bind(quiz_id)
    .bind(student_id)
    .fetch_one(pool)
    .await
    .map_err(|e| {
        if let sqlx::Error::Database(ref db) = e {
            if db.is_unique_violation() {
                return AppError::DuplicateSession(format!(
                    "Student {} already has a session for quiz {}",
                    student_id, quiz_id
                ));
            }
        }
        tracing::error!("Failed to create session: {:?}", e);
        AppError::from(e)
    })?;

    let questions = attempt_view(pool, quiz_id).await?;

    Ok(StartSessionResponse {
        session_id,
        quiz_id,
        status: SessionStatus::Open,
        questions,
    })
}

/// Builds the question/option view for an attempt, applying the quiz's
/// shuffle settings. Shuffling happens in the query, nothing is stored.
pub async fn attempt_view(pool: &PgPool, quiz_id: i64) -> Result<Vec<AttemptQuestion>, AppError> {
    let settings = sqlx::query_as::<_, QuizSettings>(
        r#"
        SELECT quiz_id, shuffle_questions, shuffle_options,
               show_results_immediately, allow_review
        FROM quiz_settings
        WHERE quiz_id = $1
        "#,
    )
    .bind(quiz_id)
    .fetch_optional(pool)
    .await?
    .unwrap_or_default();

    // The ORDER BY variants are fixed strings chosen here, never caller input.
    let question_sql = if settings.shuffle_questions {
        r#"
        SELECT qq.question_id, qq.question_order, qq.points,
               q.question_text, q.question_type
        FROM quiz_questions qq
        JOIN questions q ON qq.question_id = q.id
        WHERE qq.quiz_id = $1
        ORDER BY RANDOM()
        "#
    } else {
        r#"
        SELECT qq.question_id, qq.question_order, qq.points,
               q.question_text, q.question_type
        FROM quiz_questions qq
        JOIN questions q ON qq.question_id = q.id
        WHERE qq.quiz_id = $1
        ORDER BY qq.question_order
        "#
    };

    let rows = sqlx::query_as::<_, AttemptQuestionRow>(question_sql)
        .bind(quiz_id)
        .fetch_all(pool)
        .await?;

    let question_ids: Vec<i64> = rows.iter().map(|r| r.question_id).collect();

    #[derive(FromRow)]
    struct OptionRow {
        id: i64,
        question_id: i64,
        option_text: String,
        option_order: i32,
    }

    let option_sql = if settings.shuffle_options {
        r#"
        SELECT id, question_id, option_text, option_order
        FROM question_options
        WHERE question_id = ANY($1)
        ORDER BY RANDOM()
        "#
    } else {
        r#"
        SELECT id, question_id, option_text, option_order
        FROM question_options
        WHERE question_id = ANY($1)
        ORDER BY question_id, option_order
        "#
    };

    let option_rows = sqlx::query_as::<_, OptionRow>(option_sql)
        .bind(&question_ids)
        .fetch_all(pool)
        .await?;

    let mut options_by_question: HashMap<i64, Vec<PublicOption>> = HashMap::new();
    for opt in option_rows {
        options_by_question
            .entry(opt.question_id)
            .or_default()
            .push(PublicOption {
                id: opt.id,
                option_text: opt.option_text,
                option_order: opt.option_order,
            });
    }

    Ok(rows
        .into_iter()
        .map(|r| AttemptQuestion {
            options: options_by_question.remove(&r.question_id).unwrap_or_default(),
            question_id: r.question_id,
            question_order: r.question_order,
            question_text: r.question_text,
            question_type: r.question_type,
            points: r.points,
        })
        .collect())
}

/// Records (or overwrites) the student's answer to one question.
///
/// Upserts against the (session, question) unique constraint: last write
/// wins, no history is kept. Only valid while the session is Open.
pub async fn record_answer(
    pool: &PgPool,
    session_id: i64,
    student_id: i64,
    req: &RecordAnswerRequest,
) -> Result<StudentAnswer, AppError> {
    let session = fetch_session(pool, session_id).await?;
    if session.student_id != student_id {
        return Err(AppError::NotFound("Session not found".to_string()));
    }
    if session_status(&session)? != SessionStatus::Open {
        return Err(AppError::InvalidState(format!(
            "Cannot record answers on a {} session",
            session.status
        )));
    }

    let question_type: Option<String> = sqlx::query_scalar(
        r#"
        SELECT q.question_type
        FROM quiz_questions qq
        JOIN questions q ON qq.question_id = q.id
        WHERE qq.quiz_id = $1 AND qq.question_id = $2
        "#,
    )
    .bind(session.quiz_id)
    .bind(req.question_id)
    .fetch_optional(pool)
    .await?;

    let question_type =
        question_type.ok_or(AppError::NotFound("Question not in this quiz".to_string()))?;

    if is_choice_type(&question_type) && req.selected_option_id.is_none() {
        return Err(AppError::Validation(format!(
            "Question {} requires a selected option",
            req.question_id
        )));
    }

    if let Some(option_id) = req.selected_option_id {
        let belongs: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM question_options WHERE id = $1 AND question_id = $2",
        )
        .bind(option_id)
        .bind(req.question_id)
        .fetch_optional(pool)
        .await?;
        if belongs.is_none() {
            return Err(AppError::Validation(format!(
                "Option {} does not belong to question {}",
                option_id, req.question_id
            )));
        }
    }

    // The status guard is part of the upsert itself: a submit landing after
    // the check above makes the inner SELECT empty, so no write happens.
    let answer = sqlx::query_as::<_, StudentAnswer>(
        r#"
        INSERT INTO student_answers
            (student_quiz_id, question_id, selected_option_id, answer_text)
        SELECT sq.id, $2, $3, $4
        FROM student_quizzes sq
        WHERE sq.id = $1 AND sq.status = 'open'
        ON CONFLICT (student_quiz_id, question_id) DO UPDATE SET
            selected_option_id = EXCLUDED.selected_option_id,
            answer_text = EXCLUDED.answer_text,
            answered_at = NOW()
        RETURNING id, student_quiz_id, question_id, selected_option_id,
                  answer_text, is_correct, points_earned, answered_at
        "#,
    )
    .bind(session_id)
    .bind(req.question_id)
    .bind(req.selected_option_id)
    .bind(req.answer_text.as_deref())
    .fetch_optional(pool)
    .await?;

    answer.ok_or_else(|| {
        AppError::InvalidState("Session is no longer open, answer was not recorded".to_string())
    })
}

/// Finishes the attempt: Open -> Submitted, stamping the submit time in the
/// same statement. Re-submission is rejected, not silently accepted.
pub async fn submit_session(
    pool: &PgPool,
    session_id: i64,
    student_id: i64,
) -> Result<StudentQuizSession, AppError> {
    let updated = sqlx::query_as::<_, StudentQuizSession>(
        r#"
        UPDATE student_quizzes
        SET submit_time = NOW(), status = 'submitted'
        WHERE id = $1 AND student_id = $2 AND status = 'open'
        RETURNING id, quiz_id, student_id, start_time, submit_time,
                  score, percentage, status, graded, published
        "#,
    )
    .bind(session_id)
    .bind(student_id)
    .fetch_optional(pool)
    .await?;

    match updated {
        Some(session) => Ok(session),
        None => {
            let session = fetch_session(pool, session_id).await?;
            if session.student_id != student_id {
                return Err(AppError::NotFound("Session not found".to_string()));
            }
            Err(AppError::InvalidState(format!(
                "Session is {}, only an open session can be submitted",
                session.status
            )))
        }
    }
}

/// Auto-grades every ledger entry whose selected option resolves to a known
/// answer-key option. Free-text answers and blank selections are left
/// untouched (NULL correctness, NULL points): they await manual grading.
///
/// Idempotent; re-running recomputes the same values. Returns the number of
/// graded rows.
pub async fn grade_session(pool: &PgPool, session_id: i64) -> Result<u64, AppError> {
    let session = fetch_session(pool, session_id).await?;
    match session_status(&session)? {
        SessionStatus::Open => {
            return Err(AppError::InvalidState(
                "Session must be submitted before grading".to_string(),
            ));
        }
        SessionStatus::Submitted | SessionStatus::Graded => {}
    }

    let result = sqlx::query(
        r#"
        UPDATE student_answers sa
        SET is_correct = qo.is_correct,
            points_earned = CASE WHEN qo.is_correct
                                 THEN qq.points::double precision
                                 ELSE 0 END
        FROM question_options qo, quiz_questions qq
        WHERE sa.student_quiz_id = $1
          AND qo.id = sa.selected_option_id
          AND qq.question_id = sa.question_id
          AND qq.quiz_id = $2
        "#,
    )
    .bind(session_id)
    .bind(session.quiz_id)
    .execute(pool)
    .await?;

    tracing::debug!(
        session_id,
        graded = result.rows_affected(),
        "auto-graded ledger entries"
    );

    Ok(result.rows_affected())
}

/// Rolls per-question points into the session: Submitted -> Graded.
///
/// Ungraded (NULL) points count as zero in the sum. The percentage divides by
/// the quiz's declared total points; a zero or negative total is a broken
/// quiz definition and fails with a Consistency error before any write.
pub async fn finalize_score(
    pool: &PgPool,
    session_id: i64,
) -> Result<StudentQuizSession, AppError> {
    let session = fetch_session(pool, session_id).await?;
    match session_status(&session)? {
        SessionStatus::Open => {
            return Err(AppError::InvalidState(
                "Session must be submitted before its score is finalized".to_string(),
            ));
        }
        SessionStatus::Submitted | SessionStatus::Graded => {}
    }

    let total_points: i32 = sqlx::query_scalar("SELECT total_points FROM quizzes WHERE id = $1")
        .bind(session.quiz_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("Quiz not found".to_string()))?;

    let score: f64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(points_earned), 0) FROM student_answers WHERE student_quiz_id = $1",
    )
    .bind(session_id)
    .fetch_one(pool)
    .await?;

    let percentage = percentage_of(score, total_points)?;

    let session = sqlx::query_as::<_, StudentQuizSession>(
        r#"
        UPDATE student_quizzes
        SET score = $2, percentage = $3, graded = TRUE, status = 'graded'
        WHERE id = $1
        RETURNING id, quiz_id, student_id, start_time, submit_time,
                  score, percentage, status, graded, published
        "#,
    )
    .bind(session_id)
    .bind(score)
    .bind(percentage)
    .fetch_one(pool)
    .await?;

    Ok(session)
}

/// Flips publication for every graded session of a quiz. Returns the number
/// of sessions affected. The inverse (unpublish) is the same flag flip; the
/// grading data underneath is untouched either way.
pub async fn set_quiz_published(
    pool: &PgPool,
    quiz_id: i64,
    published: bool,
) -> Result<u64, AppError> {
    let quiz_exists: Option<i64> = sqlx::query_scalar("SELECT id FROM quizzes WHERE id = $1")
        .bind(quiz_id)
        .fetch_optional(pool)
        .await?;
    if quiz_exists.is_none() {
        return Err(AppError::NotFound("Quiz not found".to_string()));
    }

    let result =
        sqlx::query("UPDATE student_quizzes SET published = $2 WHERE quiz_id = $1 AND graded = TRUE")
            .bind(quiz_id)
            .bind(published)
            .execute(pool)
            .await?;

    Ok(result.rows_affected())
}

/// Flips publication for a single graded session.
pub async fn set_session_published(
    pool: &PgPool,
    session_id: i64,
    published: bool,
) -> Result<StudentQuizSession, AppError> {
    let updated = sqlx::query_as::<_, StudentQuizSession>(
        r#"
        UPDATE student_quizzes
        SET published = $2
        WHERE id = $1 AND graded = TRUE
        RETURNING id, quiz_id, student_id, start_time, submit_time,
                  score, percentage, status, graded, published
        "#,
    )
    .bind(session_id)
    .bind(published)
    .fetch_optional(pool)
    .await?;

    match updated {
        Some(session) => Ok(session),
        None => {
            // Distinguish a missing session from an ungraded one.
            let session = fetch_session(pool, session_id).await?;
            Err(AppError::InvalidState(format!(
                "Session is {} and not graded, results cannot be published",
                session.status
            )))
        }
    }
}
