// src/handlers/teacher.rs
//
// Course/classroom management, question bank authoring, quiz authoring, and
// the grading/publication entry points. Grading itself lives in the session
// service; this file is CRUD plus thin callers.

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        course::{ClassroomStudent, CreateClassroomRequest, CreateCourseRequest},
        question::{
            BatchCreateQuestionsRequest, CreateQuestionRequest, CreateSubjectRequest,
            QuestionBankStat,
        },
        quiz::{CreateQuizRequest, QuizDetail, TeacherQuizRow},
        session::{ClassGradeRow, GradeReport},
    },
    services::session,
    utils::jwt::Claims,
};

/// Creates a new course owned by the authenticated teacher.
pub async fn create_course(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateCourseRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::Validation(validation_errors.to_string()));
    }

    let teacher_id = claims.user_id()?;

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO courses (course_code, course_name, description, credit_hours, created_by)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
        "#,
    )
    .bind(&payload.course_code)
    .bind(&payload.course_name)
    .bind(payload.description.as_deref())
    .bind(payload.credit_hours)
    .bind(teacher_id)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        if let sqlx::Error::Database(ref db) = e {
            if db.is_unique_violation() {
                return AppError::Conflict(format!(
                    "Course code '{}' already exists",
                    payload.course_code
                ));
            }
        }
        tracing::error!("Failed to create course: {:?}", e);
        AppError::from(e)
    })?;

    Ok((StatusCode::CREATED, Json(json!({"id": id}))))
}

/// Creates a classroom under a course.
pub async fn create_classroom(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateClassroomRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::Validation(validation_errors.to_string()));
    }

    let teacher_id = claims.user_id()?;

    let course: Option<i64> = sqlx::query_scalar("SELECT id FROM courses WHERE id = $1")
        .bind(payload.course_id)
        .fetch_optional(&pool)
        .await?;
    if course.is_none() {
        return Err(AppError::NotFound("Course not found".to_string()));
    }

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO classrooms (course_id, teacher_id, class_name, semester, year, max_students)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id
        "#,
    )
    .bind(payload.course_id)
    .bind(teacher_id)
    .bind(&payload.class_name)
    .bind(&payload.semester)
    .bind(payload.year)
    .bind(payload.max_students)
    .fetch_one(&pool)
    .await?;

    Ok((StatusCode::CREATED, Json(json!({"id": id}))))
}

/// Lists the active students of a classroom.
pub async fn classroom_students(
    State(pool): State<PgPool>,
    Path(classroom_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let students = sqlx::query_as::<_, ClassroomStudent>(
        r#"
        SELECT e.student_id, u.username, u.full_name
        FROM enrollments e
        JOIN users u ON e.student_id = u.id
        WHERE e.classroom_id = $1 AND e.status = 'active'
        ORDER BY u.username
        "#,
    )
    .bind(classroom_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(json!({
        "classroom_id": classroom_id,
        "students": students
    })))
}

/// Creates a subject node in the (possibly hierarchical) subject tree.
pub async fn create_subject(
    State(pool): State<PgPool>,
    Json(payload): Json<CreateSubjectRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::Validation(validation_errors.to_string()));
    }

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO subjects (subject_name, description, level, parent_subject_id)
        VALUES ($1, $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(&payload.subject_name)
    .bind(payload.description.as_deref())
    .bind(payload.level)
    .bind(payload.parent_subject_id)
    .fetch_one(&pool)
    .await?;

    Ok((StatusCode::CREATED, Json(json!({"id": id}))))
}

/// Inserts one question with its options inside an open transaction.
async fn insert_question(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    teacher_id: i64,
    q: &CreateQuestionRequest,
) -> Result<i64, AppError> {
    let question_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO questions (subject_id, question_text, question_type, difficulty_level, created_by)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
        "#,
    )
    .bind(q.subject_id)
    .bind(&q.question_text)
    .bind(&q.question_type)
    .bind(q.difficulty_level)
    .bind(teacher_id)
    .fetch_one(&mut **tx)
    .await?;

    if let Some(options) = &q.options {
        for option in options {
            sqlx::query(
                r#"
                INSERT INTO question_options (question_id, option_text, is_correct, option_order)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(question_id)
            .bind(&option.option_text)
            .bind(option.is_correct)
            .bind(option.option_order)
            .execute(&mut **tx)
            .await?;
        }
    }

    Ok(question_id)
}

/// Creates a question together with its options in one transaction.
pub async fn create_question(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::Validation(validation_errors.to_string()));
    }

    let teacher_id = claims.user_id()?;

    let mut tx = pool.begin().await?;
    let question_id = insert_question(&mut tx, teacher_id, &payload).await?;
    tx.commit().await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "question_id": question_id,
            "options_count": payload.options.map(|o| o.len()).unwrap_or(0)
        })),
    ))
}

/// Batch question upload. All questions land or none do.
pub async fn batch_create_questions(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<BatchCreateQuestionsRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::Validation(validation_errors.to_string()));
    }

    let teacher_id = claims.user_id()?;

    let mut tx = pool.begin().await?;
    let mut question_ids = Vec::with_capacity(payload.questions.len());
    for q in &payload.questions {
        question_ids.push(insert_question(&mut tx, teacher_id, q).await?);
    }
    tx.commit().await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "total_questions": question_ids.len(),
            "question_ids": question_ids
        })),
    ))
}

#[derive(Debug, Deserialize)]
pub struct RandomQuestionParams {
    pub subject_id: i64,
    pub question_type: Option<String>,
    pub difficulty_level: Option<i32>,
    pub count: i64,
}

#[derive(Debug, serde::Serialize, sqlx::FromRow)]
pub struct RandomQuestionRow {
    pub id: i64,
    pub question_text: String,
    pub question_type: String,
    pub difficulty_level: i32,
}

/// Picks random non-deleted questions matching the filters.
/// Filters are bound parameters assembled with QueryBuilder, never
/// interpolated text.
pub async fn random_questions(
    State(pool): State<PgPool>,
    Query(params): Query<RandomQuestionParams>,
) -> Result<impl IntoResponse, AppError> {
    if params.count <= 0 || params.count > 100 {
        return Err(AppError::Validation(
            "count must be between 1 and 100".to_string(),
        ));
    }

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
        "SELECT id, question_text, question_type, difficulty_level \
         FROM questions WHERE is_deleted = FALSE AND subject_id = ",
    );
    builder.push_bind(params.subject_id);

    if let Some(question_type) = &params.question_type {
        builder.push(" AND question_type = ");
        builder.push_bind(question_type);
    }
    if let Some(difficulty_level) = params.difficulty_level {
        builder.push(" AND difficulty_level = ");
        builder.push_bind(difficulty_level);
    }

    builder.push(" ORDER BY RANDOM() LIMIT ");
    builder.push_bind(params.count);

    let questions: Vec<RandomQuestionRow> = builder.build_query_as().fetch_all(&pool).await?;

    Ok(Json(json!({
        "selected_count": questions.len(),
        "questions": questions
    })))
}

#[derive(Debug, Deserialize)]
pub struct QuestionStatsParams {
    pub subject_id: Option<i64>,
    pub difficulty_level: Option<i32>,
}

/// Question bank statistics grouped by type, difficulty and subject.
pub async fn question_statistics(
    State(pool): State<PgPool>,
    Query(params): Query<QuestionStatsParams>,
) -> Result<impl IntoResponse, AppError> {
    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
        "SELECT COUNT(*) AS total, q.question_type, q.difficulty_level, s.subject_name \
         FROM questions q \
         JOIN subjects s ON q.subject_id = s.id \
         WHERE q.is_deleted = FALSE",
    );

    if let Some(subject_id) = params.subject_id {
        builder.push(" AND q.subject_id = ");
        builder.push_bind(subject_id);
    }
    if let Some(difficulty_level) = params.difficulty_level {
        builder.push(" AND q.difficulty_level = ");
        builder.push_bind(difficulty_level);
    }

    builder.push(" GROUP BY q.question_type, q.difficulty_level, s.subject_name");

    let statistics: Vec<QuestionBankStat> = builder.build_query_as().fetch_all(&pool).await?;

    Ok(Json(json!({ "statistics": statistics })))
}

/// Creates a quiz together with its question links and settings in ONE
/// transaction. A quiz row without its links is never observable.
pub async fn create_quiz(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::Validation(validation_errors.to_string()));
    }
    if payload.questions.is_empty() {
        return Err(AppError::Validation(
            "A quiz needs at least one question".to_string(),
        ));
    }

    let teacher_id = claims.user_id()?;

    let mut tx = pool.begin().await?;

    let quiz_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO quizzes (classroom_id, title, description, created_by,
                             start_time, end_time, duration_minutes, total_points, passing_score)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING id
        "#,
    )
    .bind(payload.classroom_id)
    .bind(&payload.title)
    .bind(payload.description.as_deref())
    .bind(teacher_id)
    .bind(payload.start_time)
    .bind(payload.end_time)
    .bind(payload.duration_minutes)
    .bind(payload.total_points)
    .bind(payload.passing_score)
    .fetch_one(&mut *tx)
    .await?;

    for q in &payload.questions {
        sqlx::query(
            r#"
            INSERT INTO quiz_questions (quiz_id, question_id, question_order, points)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(quiz_id)
        .bind(q.question_id)
        .bind(q.question_order)
        .bind(q.points)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db) = e {
                if db.is_unique_violation() {
                    return AppError::Validation(format!(
                        "Question {} is linked twice",
                        q.question_id
                    ));
                }
            }
            AppError::from(e)
        })?;
    }

    let settings = payload.settings.unwrap_or_default();
    sqlx::query(
        r#"
        INSERT INTO quiz_settings (quiz_id, shuffle_questions, shuffle_options,
                                   show_results_immediately, allow_review)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(quiz_id)
    .bind(settings.shuffle_questions)
    .bind(settings.shuffle_options)
    .bind(settings.show_results_immediately)
    .bind(settings.allow_review)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "quiz_id": quiz_id,
            "title": payload.title,
            "question_count": payload.questions.len()
        })),
    ))
}

/// Quiz detail with its question count.
pub async fn quiz_details(
    State(pool): State<PgPool>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let quiz = sqlx::query_as::<_, QuizDetail>(
        r#"
        SELECT q.id, q.title, q.description, q.start_time, q.end_time,
               q.duration_minutes, q.total_points, q.passing_score,
               COUNT(qq.question_id) AS question_count
        FROM quizzes q
        LEFT JOIN quiz_questions qq ON qq.quiz_id = q.id
        WHERE q.id = $1
        GROUP BY q.id
        "#,
    )
    .bind(quiz_id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Quiz not found".to_string()))?;

    Ok(Json(quiz))
}

/// Lists the authenticated teacher's quizzes with submission counts.
pub async fn my_quizzes(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let teacher_id = claims.user_id()?;

    let quizzes = sqlx::query_as::<_, TeacherQuizRow>(
        r#"
        SELECT q.id, q.title, c.course_name,
               COUNT(DISTINCT sq.id) AS submissions
        FROM quizzes q
        JOIN classrooms cl ON q.classroom_id = cl.id
        JOIN courses c ON cl.course_id = c.id
        LEFT JOIN student_quizzes sq ON sq.quiz_id = q.id
        WHERE q.created_by = $1
        GROUP BY q.id, q.title, c.course_name
        ORDER BY q.id
        "#,
    )
    .bind(teacher_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(quizzes))
}

/// Auto-grades a submitted session and finalizes its score.
/// Safe to call again: grading recomputes the same values.
pub async fn grade_session(
    State(pool): State<PgPool>,
    Path(session_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let graded_questions = session::grade_session(&pool, session_id).await?;
    let finalized = session::finalize_score(&pool, session_id).await?;

    Ok(Json(json!({
        "session_id": finalized.id,
        "graded_questions": graded_questions,
        "score": finalized.score,
        "percentage": finalized.percentage,
        "status": finalized.status
    })))
}

/// Publishes the results of every graded session of a quiz.
pub async fn publish_quiz(
    State(pool): State<PgPool>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let published_count = session::set_quiz_published(&pool, quiz_id, true).await?;
    Ok(Json(json!({
        "quiz_id": quiz_id,
        "published_count": published_count
    })))
}

/// Withdraws publication for a quiz. Scores and grading data are untouched;
/// the sessions simply become invisible to students again.
pub async fn unpublish_quiz(
    State(pool): State<PgPool>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let unpublished_count = session::set_quiz_published(&pool, quiz_id, false).await?;
    Ok(Json(json!({
        "quiz_id": quiz_id,
        "unpublished_count": unpublished_count
    })))
}

/// Publishes a single graded session.
pub async fn publish_session(
    State(pool): State<PgPool>,
    Path(session_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let session = session::set_session_published(&pool, session_id, true).await?;
    Ok(Json(json!({
        "session_id": session.id,
        "published": session.published
    })))
}

/// Withdraws publication for a single session.
pub async fn unpublish_session(
    State(pool): State<PgPool>,
    Path(session_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let session = session::set_session_published(&pool, session_id, false).await?;
    Ok(Json(json!({
        "session_id": session.id,
        "published": session.published
    })))
}

/// Every graded session of a quiz, score descending. Visible to the teacher
/// regardless of publication.
pub async fn class_grades(
    State(pool): State<PgPool>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let grades = sqlx::query_as::<_, ClassGradeRow>(
        r#"
        SELECT sq.student_id, u.username, u.full_name, sq.score,
               q.total_points, sq.percentage, sq.published
        FROM student_quizzes sq
        JOIN users u ON sq.student_id = u.id
        JOIN quizzes q ON sq.quiz_id = q.id
        WHERE sq.quiz_id = $1 AND sq.graded = TRUE
        ORDER BY sq.score DESC
        "#,
    )
    .bind(quiz_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(json!({
        "quiz_id": quiz_id,
        "grades": grades
    })))
}

/// Aggregate grade report for one quiz.
pub async fn grade_report(
    State(pool): State<PgPool>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let report = sqlx::query_as::<_, GradeReport>(
        r#"
        SELECT COUNT(DISTINCT sq.student_id) AS total_students,
               AVG(sq.score) AS avg_score,
               MIN(sq.score) AS min_score,
               MAX(sq.score) AS max_score,
               COUNT(*) FILTER (WHERE sq.score >= q.passing_score) AS passed_count
        FROM student_quizzes sq
        JOIN quizzes q ON sq.quiz_id = q.id
        WHERE sq.quiz_id = $1 AND sq.graded = TRUE
        "#,
    )
    .bind(quiz_id)
    .fetch_one(&pool)
    .await?;

    Ok(Json(json!({
        "quiz_id": quiz_id,
        "total_students": report.total_students,
        "avg_score": report.avg_score,
        "min_score": report.min_score,
        "max_score": report.max_score,
        "passed_count": report.passed_count
    })))
}

#[derive(Debug, serde::Serialize, sqlx::FromRow)]
pub struct QuestionAnalysis {
    pub question_id: i64,
    pub question_text: String,
    pub preset_difficulty: i32,
    pub times_used: i64,
    pub total_attempts: i64,
    pub correct_count: i64,
    pub correct_rate: f64,
}

/// Per-question usage and correctness analysis from the derived counters.
pub async fn question_analysis(
    State(pool): State<PgPool>,
    Path(question_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let analysis = sqlx::query_as::<_, QuestionAnalysis>(
        r#"
        SELECT q.id AS question_id, q.question_text,
               q.difficulty_level AS preset_difficulty,
               q.times_used, q.total_attempts, q.correct_count,
               CASE WHEN q.total_attempts > 0
                    THEN ROUND(q.correct_count * 100.0 / q.total_attempts, 2)::double precision
                    ELSE 0 END AS correct_rate
        FROM questions q
        WHERE q.id = $1
        "#,
    )
    .bind(question_id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Question not found".to_string()))?;

    Ok(Json(analysis))
}
