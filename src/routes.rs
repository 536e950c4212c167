// src/routes.rs

use axum::{
    Router, http::Method, middleware,
    routing::{delete, get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{admin, auth, student, teacher},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware, teacher_middleware},
};

/// Assembles the main application router.
///
/// * Merges all sub-routers (auth, student, teacher, admin).
/// * Applies global middleware (Trace, CORS).
/// * Injects global state (Database Pool + Config).
pub fn create_router(state: AppState) -> Router {
    let origins = [
        "http://localhost:3000".parse().unwrap(),
        "http://127.0.0.1:3000".parse().unwrap(),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login));

    let student_routes = Router::new()
        .route("/enrollments", post(student::enroll))
        .route("/enrollments/{classroom_id}", delete(student::drop_classroom))
        .route("/quizzes", get(student::available_quizzes))
        .route("/quizzes/{quiz_id}/start", post(student::start_quiz))
        .route("/sessions/{session_id}/answers", post(student::record_answer))
        .route("/sessions/{session_id}/submit", post(student::submit_quiz))
        .route("/sessions/{session_id}/details", get(student::answer_details))
        .route("/grades", get(student::my_grades))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let teacher_routes = Router::new()
        .route("/courses", post(teacher::create_course))
        .route("/classrooms", post(teacher::create_classroom))
        .route(
            "/classrooms/{classroom_id}/students",
            get(teacher::classroom_students),
        )
        .route("/subjects", post(teacher::create_subject))
        .route("/questions", post(teacher::create_question))
        .route("/questions/batch", post(teacher::batch_create_questions))
        .route("/questions/random", get(teacher::random_questions))
        .route("/questions/statistics", get(teacher::question_statistics))
        .route(
            "/questions/{question_id}/analysis",
            get(teacher::question_analysis),
        )
        .route("/quizzes", post(teacher::create_quiz).get(teacher::my_quizzes))
        .route("/quizzes/{quiz_id}", get(teacher::quiz_details))
        .route("/quizzes/{quiz_id}/publish", post(teacher::publish_quiz))
        .route("/quizzes/{quiz_id}/unpublish", post(teacher::unpublish_quiz))
        .route("/quizzes/{quiz_id}/grades", get(teacher::class_grades))
        .route("/quizzes/{quiz_id}/report", get(teacher::grade_report))
        .route("/sessions/{session_id}/grade", post(teacher::grade_session))
        .route("/sessions/{session_id}/publish", post(teacher::publish_session))
        .route(
            "/sessions/{session_id}/unpublish",
            post(teacher::unpublish_session),
        )
        // Double middleware protection: Auth first, then role check
        .layer(middleware::from_fn(teacher_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let admin_routes = Router::new()
        .route("/users", get(admin::list_users))
        .route("/users/{user_id}", axum::routing::put(admin::update_user_status))
        .route("/dashboard", get(admin::dashboard))
        .route(
            "/questions/update-statistics",
            post(admin::refresh_question_stats),
        )
        .route("/subjects/hierarchy", get(admin::subject_hierarchy))
        .route("/questions/difficulty-rating", get(admin::difficulty_rating))
        .route("/questions/ranking", get(admin::usage_ranking))
        .route(
            "/questions/{question_id}",
            delete(admin::soft_delete_question),
        )
        .route(
            "/questions/{question_id}/restore",
            post(admin::restore_question),
        )
        .layer(middleware::from_fn(admin_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/student", student_routes)
        .nest("/api/teacher", teacher_routes)
        .nest("/api/admin", admin_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
