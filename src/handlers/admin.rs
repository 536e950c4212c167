// src/handlers/admin.rs

use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::{
    config::DEFAULT_MIN_ATTEMPTS,
    error::AppError,
    models::user::User,
    services::analytics::{self, UsageOrderKey},
};

#[derive(Debug, Deserialize)]
pub struct ListUsersParams {
    pub role: Option<String>,
    pub is_active: Option<bool>,
}

/// Lists users, optionally filtered by role and active flag.
/// Admin only.
pub async fn list_users(
    State(pool): State<PgPool>,
    Query(params): Query<ListUsersParams>,
) -> Result<impl IntoResponse, AppError> {
    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
        "SELECT id, username, password, full_name, email, role, is_active, created_at \
         FROM users WHERE 1=1",
    );

    if let Some(role) = &params.role {
        builder.push(" AND role = ");
        builder.push_bind(role);
    }
    if let Some(is_active) = params.is_active {
        builder.push(" AND is_active = ");
        builder.push_bind(is_active);
    }

    builder.push(" ORDER BY created_at DESC");

    let users: Vec<User> = builder.build_query_as().fetch_all(&pool).await.map_err(|e| {
        tracing::error!("Failed to list users: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(users))
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserStatusRequest {
    pub is_active: bool,
}

/// Activates or deactivates a user account.
/// Admin only.
pub async fn update_user_status(
    State(pool): State<PgPool>,
    Path(user_id): Path<i64>,
    Json(payload): Json<UpdateUserStatusRequest>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("UPDATE users SET is_active = $1 WHERE id = $2")
        .bind(payload.is_active)
        .bind(user_id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    Ok(Json(json!({
        "user_id": user_id,
        "is_active": payload.is_active
    })))
}

/// Recomputes the usage counters of every question that has ever been
/// answered. Full recomputation, run on demand.
pub async fn refresh_question_stats(
    State(pool): State<PgPool>,
) -> Result<impl IntoResponse, AppError> {
    let updated = analytics::refresh_question_stats(&pool).await?;
    Ok(Json(json!({ "updated_questions": updated })))
}

#[derive(Debug, Deserialize)]
pub struct DifficultyRatingParams {
    pub min_attempts: Option<i64>,
}

/// Observed-difficulty report for questions with enough usage.
pub async fn difficulty_rating(
    State(pool): State<PgPool>,
    Query(params): Query<DifficultyRatingParams>,
) -> Result<impl IntoResponse, AppError> {
    let min_attempts = params.min_attempts.unwrap_or(DEFAULT_MIN_ATTEMPTS);
    let ratings = analytics::rate_difficulty(&pool, min_attempts).await?;
    Ok(Json(json!({ "rated_questions": ratings })))
}

#[derive(Debug, Deserialize)]
pub struct UsageRankingParams {
    pub limit: Option<i64>,
    pub order_by: Option<String>,
}

/// Top-N questions by usage. The sort key is parsed against a closed enum;
/// anything else is a 400, never a query fragment.
pub async fn usage_ranking(
    State(pool): State<PgPool>,
    Query(params): Query<UsageRankingParams>,
) -> Result<impl IntoResponse, AppError> {
    let limit = params.limit.unwrap_or(10);
    let order_key = match params.order_by.as_deref() {
        Some(key) => UsageOrderKey::parse(key)?,
        None => UsageOrderKey::TimesUsed,
    };

    let rankings = analytics::rank_by_usage(&pool, limit, order_key).await?;
    Ok(Json(json!({ "top_questions": rankings })))
}

#[derive(Debug, serde::Serialize, sqlx::FromRow)]
pub struct SubjectHierarchyRow {
    pub subject_id: i64,
    pub subject_name: String,
    pub level: i32,
    pub parent_subject_id: Option<i64>,
    pub question_count: i64,
}

/// Lists the subject tree, level by level, with each subject's count of
/// non-deleted questions.
pub async fn subject_hierarchy(State(pool): State<PgPool>) -> Result<impl IntoResponse, AppError> {
    let subjects = sqlx::query_as::<_, SubjectHierarchyRow>(
        r#"
        SELECT s.id AS subject_id, s.subject_name, s.level, s.parent_subject_id,
               COUNT(q.id) AS question_count
        FROM subjects s
        LEFT JOIN questions q ON q.subject_id = s.id AND q.is_deleted = FALSE
        GROUP BY s.id, s.subject_name, s.level, s.parent_subject_id
        ORDER BY s.level, s.id
        "#,
    )
    .fetch_all(&pool)
    .await?;

    Ok(Json(json!({ "subjects": subjects })))
}

/// Soft-deletes a question. Historical answers keep referencing it; the
/// question just stops appearing in authoring and analysis views.
pub async fn soft_delete_question(
    State(pool): State<PgPool>,
    Path(question_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("UPDATE questions SET is_deleted = TRUE WHERE id = $1")
        .bind(question_id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Question not found".to_string()));
    }

    Ok(Json(json!({
        "question_id": question_id,
        "deleted": true
    })))
}

/// Restores a soft-deleted question.
pub async fn restore_question(
    State(pool): State<PgPool>,
    Path(question_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("UPDATE questions SET is_deleted = FALSE WHERE id = $1")
        .bind(question_id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Question not found".to_string()));
    }

    Ok(Json(json!({
        "question_id": question_id,
        "restored": true
    })))
}

#[derive(Debug, sqlx::FromRow)]
struct RoleCount {
    role: String,
    count: i64,
}

/// System dashboard: user, question, quiz and submission aggregates.
pub async fn dashboard(State(pool): State<PgPool>) -> Result<impl IntoResponse, AppError> {
    let role_counts = sqlx::query_as::<_, RoleCount>(
        "SELECT role, COUNT(*) AS count FROM users GROUP BY role",
    )
    .fetch_all(&pool)
    .await?;

    let total_users: i64 = role_counts.iter().map(|r| r.count).sum();
    let mut users = serde_json::Map::new();
    for rc in &role_counts {
        users.insert(rc.role.clone(), json!(rc.count));
    }
    users.insert("total".to_string(), json!(total_users));

    let total_courses: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM courses")
        .fetch_one(&pool)
        .await?;

    let total_questions: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM questions WHERE is_deleted = FALSE")
            .fetch_one(&pool)
            .await?;

    let total_quizzes: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM quizzes")
        .fetch_one(&pool)
        .await?;

    #[derive(sqlx::FromRow)]
    struct SubmissionStats {
        total_submissions: i64,
        avg_score: Option<f64>,
        pass_rate: Option<f64>,
    }

    let submissions = sqlx::query_as::<_, SubmissionStats>(
        r#"
        SELECT COUNT(*) AS total_submissions,
               AVG(sq.score) AS avg_score,
               CASE WHEN COUNT(*) > 0
                    THEN (COUNT(*) FILTER (WHERE sq.score >= q.passing_score) * 100.0 / COUNT(*))::double precision
                    ELSE NULL END AS pass_rate
        FROM student_quizzes sq
        JOIN quizzes q ON sq.quiz_id = q.id
        WHERE sq.graded = TRUE
        "#,
    )
    .fetch_one(&pool)
    .await?;

    Ok(Json(json!({
        "users": users,
        "courses": { "total": total_courses },
        "questions": { "total": total_questions },
        "quizzes": { "total": total_quizzes },
        "statistics": {
            "total_submissions": submissions.total_submissions,
            "average_score": submissions.avg_score,
            "pass_rate": submissions.pass_rate
        }
    })))
}
