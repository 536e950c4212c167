// tests/session_flow_tests.rs
//
// End-to-end tests of the attempt lifecycle: start -> answer -> submit ->
// grade -> publish. Each test builds its own fixture and passes it by value;
// nothing is shared between tests. Requires a running Postgres; tests skip
// when DATABASE_URL is not set.

use exam_platform::{config::Config, routes, state::AppState};
use serde_json::{Value, json};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

struct TestApp {
    address: String,
    pool: PgPool,
    client: reqwest::Client,
}

/// Spawns the app on a random port. Returns None (skip) without DATABASE_URL.
async fn spawn_app() -> Option<TestApp> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping integration test");
        return None;
    };

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await
        .expect("Failed to connect to Postgres for testing");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    let config = Config {
        database_url: database_url.clone(),
        jwt_secret: "test_secret_for_integration_tests".to_string(),
        jwt_expiration: 600,
        rust_log: "error".to_string(),
        admin_username: None,
        admin_password: None,
    };

    let state = AppState {
        pool: pool.clone(),
        config,
    };

    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");

    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Some(TestApp {
        address,
        pool,
        client: reqwest::Client::new(),
    })
}

fn unique_name(prefix: &str) -> String {
    format!("{}_{}", prefix, &uuid::Uuid::new_v4().to_string()[..8])
}

/// Everything one test needs to run a quiz attempt, built fresh per test and
/// handed around by value.
struct Fixture {
    teacher_token: String,
    student_token: String,
    quiz_id: i64,
}

impl Fixture {
    /// Registers a teacher and a student, builds a course/classroom, a
    /// three-question quiz with points 30/30/40 and total 100, and enrolls
    /// the student.
    async fn build(app: &TestApp) -> Fixture {
        Self::build_with(
            app,
            &[
                ("single_choice", 30),
                ("single_choice", 30),
                ("single_choice", 40),
            ],
        )
        .await
    }

    /// Same setup with caller-chosen (question_type, points) pairs; the
    /// points must sum to the quiz total of 100. Choice questions get a
    /// "Correct"/"Wrong" option pair, free-text questions get none.
    async fn build_with(app: &TestApp, specs: &[(&str, i64)]) -> Fixture {
        let teacher_token = register_and_login(app, "teacher").await;
        let student_token = register_and_login(app, "student").await;

        let course_id = post_json(
            app,
            "/api/teacher/courses",
            &teacher_token,
            json!({
                "course_code": unique_name("CS"),
                "course_name": "Systems Programming",
                "credit_hours": 3
            }),
        )
        .await["id"]
            .as_i64()
            .unwrap();

        let classroom_id = post_json(
            app,
            "/api/teacher/classrooms",
            &teacher_token,
            json!({
                "course_id": course_id,
                "class_name": "Section A",
                "semester": "Fall",
                "year": 2026,
                "max_students": 50
            }),
        )
        .await["id"]
            .as_i64()
            .unwrap();

        let subject_id = post_json(
            app,
            "/api/teacher/subjects",
            &teacher_token,
            json!({
                "subject_name": unique_name("subject"),
                "level": 1
            }),
        )
        .await["id"]
            .as_i64()
            .unwrap();

        let mut questions = Vec::new();
        for (question_type, points) in specs {
            let mut body = json!({
                "subject_id": subject_id,
                "question_text": format!("Question worth {} points", points),
                "question_type": question_type,
                "difficulty_level": 3
            });
            if *question_type == "single_choice" {
                body["options"] = json!([
                    {"option_text": "Correct", "is_correct": true, "option_order": 1},
                    {"option_text": "Wrong", "is_correct": false, "option_order": 2}
                ]);
            }
            let question_id = post_json(app, "/api/teacher/questions", &teacher_token, body)
                .await["question_id"]
                .as_i64()
                .unwrap();
            questions.push((question_id, *points));
        }

        let quiz_id = post_json(
            app,
            "/api/teacher/quizzes",
            &teacher_token,
            json!({
                "classroom_id": classroom_id,
                "title": "Midterm",
                "duration_minutes": 60,
                "total_points": 100,
                "passing_score": 60,
                "questions": questions
                    .iter()
                    .enumerate()
                    .map(|(i, (id, points))| json!({
                        "question_id": id,
                        "question_order": i as i64 + 1,
                        "points": points
                    }))
                    .collect::<Vec<_>>()
            }),
        )
        .await["quiz_id"]
            .as_i64()
            .unwrap();

        let response = app
            .client
            .post(format!("{}/api/student/enrollments", app.address))
            .bearer_auth(&student_token)
            .json(&json!({"classroom_id": classroom_id}))
            .send()
            .await
            .expect("enroll request failed");
        assert_eq!(response.status().as_u16(), 201);

        Fixture {
            teacher_token,
            student_token,
            quiz_id,
        }
    }

    /// Starts the attempt and returns (session_id, attempt view questions).
    async fn start(&self, app: &TestApp) -> (i64, Vec<Value>) {
        let response = app
            .client
            .post(format!(
                "{}/api/student/quizzes/{}/start",
                app.address, self.quiz_id
            ))
            .bearer_auth(&self.student_token)
            .send()
            .await
            .expect("start request failed");
        assert_eq!(response.status().as_u16(), 201);
        let body: Value = response.json().await.unwrap();
        let session_id = body["session_id"].as_i64().unwrap();
        let questions = body["questions"].as_array().unwrap().clone();
        (session_id, questions)
    }

    /// Answers every question with the option whose text matches `wanted`.
    async fn answer_all(&self, app: &TestApp, session_id: i64, questions: &[Value], wanted: &str) {
        for q in questions {
            let option_id = q["options"]
                .as_array()
                .unwrap()
                .iter()
                .find(|o| o["option_text"] == wanted)
                .expect("option text not found")["id"]
                .as_i64()
                .unwrap();

            let response = app
                .client
                .post(format!(
                    "{}/api/student/sessions/{}/answers",
                    app.address, session_id
                ))
                .bearer_auth(&self.student_token)
                .json(&json!({
                    "question_id": q["question_id"],
                    "selected_option_id": option_id
                }))
                .send()
                .await
                .expect("answer request failed");
            assert_eq!(response.status().as_u16(), 200);
        }
    }

    async fn submit(&self, app: &TestApp, session_id: i64) -> reqwest::Response {
        app.client
            .post(format!(
                "{}/api/student/sessions/{}/submit",
                app.address, session_id
            ))
            .bearer_auth(&self.student_token)
            .send()
            .await
            .expect("submit request failed")
    }

    async fn grade(&self, app: &TestApp, session_id: i64) -> Value {
        let response = app
            .client
            .post(format!(
                "{}/api/teacher/sessions/{}/grade",
                app.address, session_id
            ))
            .bearer_auth(&self.teacher_token)
            .send()
            .await
            .expect("grade request failed");
        assert_eq!(response.status().as_u16(), 200);
        response.json().await.unwrap()
    }

    async fn publish_quiz(&self, app: &TestApp) {
        let response = app
            .client
            .post(format!(
                "{}/api/teacher/quizzes/{}/publish",
                app.address, self.quiz_id
            ))
            .bearer_auth(&self.teacher_token)
            .send()
            .await
            .expect("publish request failed");
        assert_eq!(response.status().as_u16(), 200);
    }

    async fn my_grades(&self, app: &TestApp) -> Vec<Value> {
        let response = app
            .client
            .get(format!("{}/api/student/grades", app.address))
            .bearer_auth(&self.student_token)
            .send()
            .await
            .expect("grades request failed");
        assert_eq!(response.status().as_u16(), 200);
        response.json().await.unwrap()
    }
}

async fn register_and_login(app: &TestApp, role: &str) -> String {
    let username = unique_name(role);

    let response = app
        .client
        .post(format!("{}/api/auth/register", app.address))
        .json(&json!({
            "username": username,
            "password": "password123",
            "role": role
        }))
        .send()
        .await
        .expect("register request failed");
    assert_eq!(response.status().as_u16(), 201);

    let response = app
        .client
        .post(format!("{}/api/auth/login", app.address))
        .json(&json!({
            "username": username,
            "password": "password123"
        }))
        .send()
        .await
        .expect("login request failed");
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();

    body["token"].as_str().unwrap().to_string()
}

async fn post_json(app: &TestApp, path: &str, token: &str, body: Value) -> Value {
    let response = app
        .client
        .post(format!("{}{}", app.address, path))
        .bearer_auth(token)
        .json(&body)
        .send()
        .await
        .expect("request failed");
    let status = response.status().as_u16();
    let value: Value = response.json().await.unwrap();
    assert_eq!(status, 201, "unexpected status for {}: {:?}", path, value);
    value
}

#[tokio::test]
async fn full_flow_all_correct_scores_total_and_passes() {
    let Some(app) = spawn_app().await else { return };
    let fixture = Fixture::build(&app).await;

    let (session_id, questions) = fixture.start(&app).await;
    assert_eq!(questions.len(), 3);

    fixture.answer_all(&app, session_id, &questions, "Correct").await;

    let response = fixture.submit(&app, session_id).await;
    assert_eq!(response.status().as_u16(), 200);

    let graded = fixture.grade(&app, session_id).await;
    assert_eq!(graded["graded_questions"].as_u64().unwrap(), 3);
    assert_eq!(graded["score"].as_f64().unwrap(), 100.0);
    assert_eq!(graded["percentage"].as_f64().unwrap(), 100.0);
    assert_eq!(graded["status"], "graded");

    fixture.publish_quiz(&app).await;

    let grades = fixture.my_grades(&app).await;
    assert_eq!(grades.len(), 1);
    assert_eq!(grades[0]["score"].as_f64().unwrap(), 100.0);
    assert_eq!(grades[0]["percentage"].as_f64().unwrap(), 100.0);
    assert_eq!(grades[0]["result"], "Passed");
}

#[tokio::test]
async fn starting_twice_conflicts_and_keeps_the_original_session() {
    let Some(app) = spawn_app().await else { return };
    let fixture = Fixture::build(&app).await;

    let (session_id, _) = fixture.start(&app).await;

    let response = app
        .client
        .post(format!(
            "{}/api/student/quizzes/{}/start",
            app.address, fixture.quiz_id
        ))
        .bearer_auth(&fixture.student_token)
        .send()
        .await
        .expect("second start failed");
    assert_eq!(response.status().as_u16(), 409);

    // The original session is untouched.
    let status: String =
        sqlx::query_scalar("SELECT status FROM student_quizzes WHERE id = $1")
            .bind(session_id)
            .fetch_one(&app.pool)
            .await
            .unwrap();
    assert_eq!(status, "open");
}

#[tokio::test]
async fn recording_twice_keeps_one_row_with_the_second_value() {
    let Some(app) = spawn_app().await else { return };
    let fixture = Fixture::build(&app).await;

    let (session_id, questions) = fixture.start(&app).await;
    let question = &questions[0];

    fixture
        .answer_all(&app, session_id, std::slice::from_ref(question), "Wrong")
        .await;
    fixture
        .answer_all(&app, session_id, std::slice::from_ref(question), "Correct")
        .await;

    #[derive(sqlx::FromRow)]
    struct Row {
        count: i64,
        option_text: Option<String>,
    }

    let row = sqlx::query_as::<_, Row>(
        r#"
        SELECT COUNT(*) OVER () AS count, qo.option_text
        FROM student_answers sa
        LEFT JOIN question_options qo ON sa.selected_option_id = qo.id
        WHERE sa.student_quiz_id = $1 AND sa.question_id = $2
        "#,
    )
    .bind(session_id)
    .bind(question["question_id"].as_i64().unwrap())
    .fetch_one(&app.pool)
    .await
    .unwrap();

    assert_eq!(row.count, 1);
    assert_eq!(row.option_text.as_deref(), Some("Correct"));
}

#[tokio::test]
async fn answering_after_submit_is_rejected_and_ledger_unchanged() {
    let Some(app) = spawn_app().await else { return };
    let fixture = Fixture::build(&app).await;

    let (session_id, questions) = fixture.start(&app).await;
    fixture.answer_all(&app, session_id, &questions, "Correct").await;
    fixture.submit(&app, session_id).await;

    let option_id = questions[0]["options"].as_array().unwrap()[1]["id"]
        .as_i64()
        .unwrap();
    let response = app
        .client
        .post(format!(
            "{}/api/student/sessions/{}/answers",
            app.address, session_id
        ))
        .bearer_auth(&fixture.student_token)
        .json(&json!({
            "question_id": questions[0]["question_id"],
            "selected_option_id": option_id
        }))
        .send()
        .await
        .expect("late answer request failed");
    assert_eq!(response.status().as_u16(), 409);

    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM student_answers WHERE student_quiz_id = $1")
            .bind(session_id)
            .fetch_one(&app.pool)
            .await
            .unwrap();
    assert_eq!(count, 3);
}

#[tokio::test]
async fn submitting_twice_is_rejected() {
    let Some(app) = spawn_app().await else { return };
    let fixture = Fixture::build(&app).await;

    let (session_id, _) = fixture.start(&app).await;
    assert_eq!(fixture.submit(&app, session_id).await.status().as_u16(), 200);
    assert_eq!(fixture.submit(&app, session_id).await.status().as_u16(), 409);
}

#[tokio::test]
async fn grading_twice_yields_identical_results() {
    let Some(app) = spawn_app().await else { return };
    let fixture = Fixture::build(&app).await;

    let (session_id, questions) = fixture.start(&app).await;
    // Two right, one wrong: 30 + 30 = 60 of 100.
    fixture
        .answer_all(&app, session_id, &questions[..2], "Correct")
        .await;
    fixture
        .answer_all(&app, session_id, &questions[2..], "Wrong")
        .await;
    fixture.submit(&app, session_id).await;

    let first = fixture.grade(&app, session_id).await;
    let second = fixture.grade(&app, session_id).await;

    assert_eq!(first["score"].as_f64().unwrap(), 60.0);
    assert_eq!(first["score"], second["score"]);
    assert_eq!(first["percentage"], second["percentage"]);
    assert_eq!(first["graded_questions"], second["graded_questions"]);
}

#[tokio::test]
async fn publish_then_unpublish_restores_pre_publish_visibility() {
    let Some(app) = spawn_app().await else { return };
    let fixture = Fixture::build(&app).await;

    let (session_id, questions) = fixture.start(&app).await;
    fixture.answer_all(&app, session_id, &questions, "Correct").await;
    fixture.submit(&app, session_id).await;
    fixture.grade(&app, session_id).await;

    // Not published yet: nothing visible to the student.
    assert!(fixture.my_grades(&app).await.is_empty());

    fixture.publish_quiz(&app).await;
    assert_eq!(fixture.my_grades(&app).await.len(), 1);

    let response = app
        .client
        .post(format!(
            "{}/api/teacher/quizzes/{}/unpublish",
            app.address, fixture.quiz_id
        ))
        .bearer_auth(&fixture.teacher_token)
        .send()
        .await
        .expect("unpublish request failed");
    assert_eq!(response.status().as_u16(), 200);

    // Hidden again, grading data untouched underneath.
    assert!(fixture.my_grades(&app).await.is_empty());
    let (score, graded): (f64, bool) =
        sqlx::query_as("SELECT score, graded FROM student_quizzes WHERE id = $1")
            .bind(session_id)
            .fetch_one(&app.pool)
            .await
            .unwrap();
    assert_eq!(score, 100.0);
    assert!(graded);
}

#[tokio::test]
async fn free_text_answers_stay_ungraded_and_count_zero() {
    let Some(app) = spawn_app().await else { return };
    let fixture = Fixture::build_with(&app, &[("single_choice", 60), ("essay", 40)]).await;

    let (session_id, questions) = fixture.start(&app).await;
    let choice: Vec<Value> = questions
        .iter()
        .filter(|q| q["question_type"] == "single_choice")
        .cloned()
        .collect();
    let essay = questions
        .iter()
        .find(|q| q["question_type"] == "essay")
        .unwrap();
    let essay_question_id = essay["question_id"].as_i64().unwrap();

    fixture.answer_all(&app, session_id, &choice, "Correct").await;

    let response = app
        .client
        .post(format!(
            "{}/api/student/sessions/{}/answers",
            app.address, session_id
        ))
        .bearer_auth(&fixture.student_token)
        .json(&json!({
            "question_id": essay_question_id,
            "answer_text": "Ownership rules out data races at compile time."
        }))
        .send()
        .await
        .expect("essay answer request failed");
    assert_eq!(response.status().as_u16(), 200);

    fixture.submit(&app, session_id).await;
    let graded = fixture.grade(&app, session_id).await;

    // Only the choice answer resolves against the answer key; the essay
    // contributes zero to the score until someone grades it by hand.
    assert_eq!(graded["graded_questions"].as_u64().unwrap(), 1);
    assert_eq!(graded["score"].as_f64().unwrap(), 60.0);
    assert_eq!(graded["percentage"].as_f64().unwrap(), 60.0);

    let (is_correct, points_earned): (Option<bool>, Option<f64>) = sqlx::query_as(
        "SELECT is_correct, points_earned FROM student_answers \
         WHERE student_quiz_id = $1 AND question_id = $2",
    )
    .bind(session_id)
    .bind(essay_question_id)
    .fetch_one(&app.pool)
    .await
    .unwrap();
    assert!(is_correct.is_none());
    assert!(points_earned.is_none());
}

#[tokio::test]
async fn a_session_closed_out_of_band_rejects_answers_at_the_write() {
    let Some(app) = spawn_app().await else { return };
    let fixture = Fixture::build(&app).await;

    let (session_id, questions) = fixture.start(&app).await;

    // Close the session directly, the way a concurrent submit would.
    sqlx::query("UPDATE student_quizzes SET status = 'submitted' WHERE id = $1")
        .bind(session_id)
        .execute(&app.pool)
        .await
        .unwrap();

    let option_id = questions[0]["options"].as_array().unwrap()[0]["id"]
        .as_i64()
        .unwrap();
    let response = app
        .client
        .post(format!(
            "{}/api/student/sessions/{}/answers",
            app.address, session_id
        ))
        .bearer_auth(&fixture.student_token)
        .json(&json!({
            "question_id": questions[0]["question_id"],
            "selected_option_id": option_id
        }))
        .send()
        .await
        .expect("answer request failed");
    assert_eq!(response.status().as_u16(), 409);

    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM student_answers WHERE student_quiz_id = $1")
            .bind(session_id)
            .fetch_one(&app.pool)
            .await
            .unwrap();
    assert_eq!(count, 0);
}
