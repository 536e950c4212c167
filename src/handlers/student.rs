// src/handlers/student.rs
//
// Student-facing endpoints. Anything touching a quiz attempt delegates to
// the session service; these handlers only extract identity and parameters.

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use sqlx::PgPool;

use crate::{
    error::AppError,
    models::{
        course::EnrollRequest,
        quiz::AvailableQuiz,
        session::{AnswerDetailRow, RecordAnswerRequest, StudentGradeRow},
    },
    services::session,
    utils::jwt::Claims,
};

/// Enrolls the authenticated student into a classroom.
pub async fn enroll(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<EnrollRequest>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = claims.user_id()?;

    let classroom: Option<i64> = sqlx::query_scalar("SELECT id FROM classrooms WHERE id = $1")
        .bind(payload.classroom_id)
        .fetch_optional(&pool)
        .await?;
    if classroom.is_none() {
        return Err(AppError::NotFound("Classroom not found".to_string()));
    }

    // Re-enrolling after a drop reactivates the same row.
    let enrollment_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO enrollments (student_id, classroom_id, status)
        VALUES ($1, $2, 'active')
        ON CONFLICT (student_id, classroom_id) DO UPDATE SET status = 'active'
        RETURNING id
        "#,
    )
    .bind(student_id)
    .bind(payload.classroom_id)
    .fetch_one(&pool)
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "enrollment_id": enrollment_id,
            "classroom_id": payload.classroom_id,
            "status": "active"
        })),
    ))
}

/// Drops the authenticated student from a classroom.
/// Withdrawal is an enrollment status, not a session state.
pub async fn drop_classroom(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(classroom_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = claims.user_id()?;

    let result = sqlx::query(
        "UPDATE enrollments SET status = 'dropped' WHERE student_id = $1 AND classroom_id = $2",
    )
    .bind(student_id)
    .bind(classroom_id)
    .execute(&pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Enrollment not found".to_string()));
    }

    Ok(Json(json!({
        "classroom_id": classroom_id,
        "status": "dropped"
    })))
}

/// Lists the quizzes visible to the authenticated student through active
/// enrollments, with the student's own attempt status where one exists.
pub async fn available_quizzes(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = claims.user_id()?;

    let quizzes = sqlx::query_as::<_, AvailableQuiz>(
        r#"
        SELECT q.id, q.title, c.course_name, q.duration_minutes, q.total_points,
               q.start_time, q.end_time, sq.status AS my_status
        FROM enrollments e
        JOIN classrooms cl ON e.classroom_id = cl.id
        JOIN courses c ON cl.course_id = c.id
        JOIN quizzes q ON q.classroom_id = cl.id
        LEFT JOIN student_quizzes sq ON sq.quiz_id = q.id AND sq.student_id = e.student_id
        WHERE e.student_id = $1 AND e.status = 'active'
        ORDER BY q.id
        "#,
    )
    .bind(student_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(quizzes))
}

/// Starts an attempt at a quiz. Fails with 409 if the student already has a
/// session for it; the existing session is unaffected.
pub async fn start_quiz(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = claims.user_id()?;
    let response = session::start_session(&pool, quiz_id, student_id).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Records an answer into the session's ledger. Calling it again for the
/// same question overwrites the previous answer.
pub async fn record_answer(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(session_id): Path<i64>,
    Json(payload): Json<RecordAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = claims.user_id()?;
    let answer = session::record_answer(&pool, session_id, student_id, &payload).await?;

    Ok(Json(json!({
        "session_id": answer.student_quiz_id,
        "question_id": answer.question_id,
        "saved": true
    })))
}

/// Finishes the attempt.
pub async fn submit_quiz(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(session_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = claims.user_id()?;
    let session = session::submit_session(&pool, session_id, student_id).await?;

    Ok(Json(json!({
        "session_id": session.id,
        "status": session.status,
        "submit_time": session.submit_time
    })))
}

/// The authenticated student's published grades. Results are visible here
/// only when graded AND published; pass/fail is derived at read time.
pub async fn my_grades(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = claims.user_id()?;

    let grades = sqlx::query_as::<_, StudentGradeRow>(
        r#"
        SELECT q.id AS quiz_id, q.title, c.course_name, sq.score, q.total_points,
               sq.percentage, sq.submit_time,
               CASE WHEN sq.score >= q.passing_score THEN 'Passed' ELSE 'Failed' END AS result
        FROM student_quizzes sq
        JOIN quizzes q ON sq.quiz_id = q.id
        JOIN classrooms cl ON q.classroom_id = cl.id
        JOIN courses c ON cl.course_id = c.id
        WHERE sq.student_id = $1 AND sq.published = TRUE AND sq.graded = TRUE
        ORDER BY sq.submit_time DESC
        "#,
    )
    .bind(student_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(grades))
}

/// Per-question breakdown of one of the student's own graded sessions.
/// Hidden until the teacher publishes the results.
pub async fn answer_details(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(session_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = claims.user_id()?;

    let sess = session::fetch_session(&pool, session_id).await?;
    if sess.student_id != student_id {
        return Err(AppError::NotFound("Session not found".to_string()));
    }
    if !(sess.graded && sess.published) {
        return Err(AppError::InvalidState(
            "Results are not published yet".to_string(),
        ));
    }

    let details = sqlx::query_as::<_, AnswerDetailRow>(
        r#"
        SELECT q.question_text, qo.option_text AS your_answer, sa.answer_text,
               sa.is_correct, sa.points_earned, qq.points
        FROM student_answers sa
        JOIN questions q ON sa.question_id = q.id
        LEFT JOIN question_options qo ON sa.selected_option_id = qo.id
        JOIN quiz_questions qq ON qq.question_id = sa.question_id AND qq.quiz_id = $2
        WHERE sa.student_quiz_id = $1
        ORDER BY qq.question_order
        "#,
    )
    .bind(session_id)
    .bind(sess.quiz_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(json!({
        "session_id": session_id,
        "score": sess.score,
        "percentage": sess.percentage,
        "questions": details
    })))
}
