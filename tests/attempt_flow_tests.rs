// tests/attempt_flow_tests.rs

use std::sync::Arc;

use gradeupnow_backend::config::Config;
use gradeupnow_backend::judge::{HttpJudgeClient, JudgeClient};
use gradeupnow_backend::routes;
use gradeupnow_backend::session::registry::SessionRegistry;
use gradeupnow_backend::state::AppState;
use gradeupnow_backend::utils::hash::hash_password;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Helper function to spawn the app on a random port for testing.
/// Returns None (and the test is skipped) when DATABASE_URL is not set, so
/// the suite can run without a database.
async fn spawn_app() -> Option<(String, PgPool)> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set; skipping integration test");
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
        jwt_expiration: 600, // 10 minutes for tests
        rust_log: "error".to_string(),
        admin_username: None,
        admin_password: None,
        judge_url: "http://localhost:2358".to_string(),
        judge_api_key: None,
        attempt_cap_minutes: 180,
    };

    let judge: Arc<dyn JudgeClient> = Arc::new(HttpJudgeClient::new(&config));
    let state = AppState {
        pool: pool.clone(),
        config,
        judge,
        sessions: SessionRegistry::new(),
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

    Some((address, pool))
}

/// Registers a fresh student and returns their bearer token.
async fn register_and_login(client: &reqwest::Client, address: &str) -> String {
    let username = format!("u_{}", &uuid::Uuid::new_v4().to_string()[..8]);

    let response = client
        .post(format!("{}/api/auth/register", address))
        .json(&serde_json::json!({
            "username": username,
            "password": "password123",
            "name": "Test Student",
            "registration_number": "20CS001",
            "section": "CSE-A"
        }))
        .send()
        .await
        .expect("Register failed");
    assert_eq!(response.status().as_u16(), 201);

    let login_resp = client
        .post(format!("{}/api/auth/login", address))
        .json(&serde_json::json!({
            "username": username,
            "password": "password123"
        }))
        .send()
        .await
        .expect("Login failed")
        .json::<serde_json::Value>()
        .await
        .expect("Failed to parse login json");

    login_resp["token"].as_str().expect("Token not found").to_string()
}

/// Seeds a two-question quiz and returns its id.
async fn seed_quiz(pool: &PgPool, start_date: Option<chrono::DateTime<chrono::Utc>>) -> i64 {
    let assessment_id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO assessments (name, kind, start_date, duration_minutes)
         VALUES ($1, 'quiz', $2, 60)
         RETURNING id",
    )
    .bind(format!("Quiz {}", uuid::Uuid::new_v4()))
    .bind(start_date)
    .fetch_one(pool)
    .await
    .unwrap();

    for i in 0..2 {
        sqlx::query(
            "INSERT INTO questions (assessment_id, content, options, correct_option, marks, position)
             VALUES ($1, $2, $3, 'a', 1, $4)",
        )
        .bind(assessment_id)
        .bind(format!("Question {}", i))
        .bind(serde_json::json!([
            {"id": "a", "text": "Option A"},
            {"id": "b", "text": "Option B"}
        ]))
        .bind(i)
        .execute(pool)
        .await
        .unwrap();
    }

    assessment_id
}

#[tokio::test]
async fn health_check_404() {
    let Some((address, _pool)) = spawn_app().await else {
        return;
    };
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/random_path_that_does_not_exist", address))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn student_routes_require_auth() {
    let Some((address, _pool)) = spawn_app().await else {
        return;
    };
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/api/student/assessments", address))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn quiz_attempt_full_flow() {
    let Some((address, pool)) = spawn_app().await else {
        return;
    };
    let client = reqwest::Client::new();

    let assessment_id = seed_quiz(&pool, None).await;
    let token = register_and_login(&client, &address).await;

    // 1. Start the quiz
    let start_resp = client
        .post(format!(
            "{}/api/student/assessments/{}/start-quiz",
            address, assessment_id
        ))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Start failed")
        .json::<serde_json::Value>()
        .await
        .unwrap();

    let attempt_id = start_resp["attempt"]["id"].as_i64().expect("attempt id");
    let questions = start_resp["questions"].as_array().expect("questions");
    assert_eq!(questions.len(), 2);
    // The answer key must never reach the student.
    assert!(questions[0].get("correct_option").is_none());
    assert!(start_resp["remaining_seconds"].as_i64().unwrap() <= 3600);

    // 2. Starting again resumes the same attempt (idempotent)
    let resume_resp = client
        .post(format!(
            "{}/api/student/assessments/{}/start-quiz",
            address, assessment_id
        ))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    assert_eq!(resume_resp["attempt"]["id"].as_i64().unwrap(), attempt_id);

    let q1 = questions[0]["id"].as_i64().unwrap();
    let q2 = questions[1]["id"].as_i64().unwrap();

    // 3. Answer both questions; change the second answer (latest wins)
    for (question_id, selected) in [(q1, "a"), (q2, "b"), (q2, "a")] {
        let resp = client
            .post(format!("{}/api/student/attempts/{}/answer", address, attempt_id))
            .bearer_auth(&token)
            .json(&serde_json::json!({
                "question_id": question_id,
                "selected_answer": selected
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 200);
    }

    // 4. Submit with telemetry counters
    let submit_resp = client
        .post(format!("{}/api/student/attempts/{}/submit", address, attempt_id))
        .bearer_auth(&token)
        .json(&serde_json::json!({
            "tab_switches": 3,
            "fullscreen_exits": 1
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(submit_resp.status().as_u16(), 200);

    let results = submit_resp.json::<serde_json::Value>().await.unwrap();
    assert_eq!(results["results"]["score"].as_i64().unwrap(), 2);
    assert_eq!(results["results"]["percentage"].as_f64().unwrap(), 100.0);
    assert_eq!(results["results"]["tab_switches"].as_i64().unwrap(), 3);
    assert_eq!(results["results"]["fullscreen_exits"].as_i64().unwrap(), 1);

    // 5. A second submit is rejected
    let resubmit = client
        .post(format!("{}/api/student/attempts/{}/submit", address, attempt_id))
        .bearer_auth(&token)
        .json(&serde_json::json!({ "tab_switches": 0, "fullscreen_exits": 0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resubmit.status().as_u16(), 409);
    let body = resubmit.json::<serde_json::Value>().await.unwrap();
    assert_eq!(body["error"].as_str().unwrap(), "already submitted");

    // 6. Starting over is also rejected
    let restart = client
        .post(format!(
            "{}/api/student/assessments/{}/start-quiz",
            address, assessment_id
        ))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(restart.status().as_u16(), 409);
}

#[tokio::test]
async fn upcoming_assessment_refuses_entry() {
    let Some((address, pool)) = spawn_app().await else {
        return;
    };
    let client = reqwest::Client::new();

    let tomorrow = chrono::Utc::now() + chrono::Duration::days(1);
    let assessment_id = seed_quiz(&pool, Some(tomorrow)).await;
    let token = register_and_login(&client, &address).await;

    let response = client
        .post(format!(
            "{}/api/student/assessments/{}/start-quiz",
            address, assessment_id
        ))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 403);
}

#[tokio::test]
async fn telemetry_counters_persist_and_freeze() {
    let Some((address, pool)) = spawn_app().await else {
        return;
    };
    let client = reqwest::Client::new();

    let assessment_id = seed_quiz(&pool, None).await;
    let token = register_and_login(&client, &address).await;

    let start_resp = client
        .post(format!(
            "{}/api/student/assessments/{}/start-quiz",
            address, assessment_id
        ))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    let attempt_id = start_resp["attempt"]["id"].as_i64().unwrap();

    // Two tab switches, reported as visibility transitions
    for visible in [false, true, false] {
        client
            .post(format!("{}/api/student/attempts/{}/telemetry", address, attempt_id))
            .bearer_auth(&token)
            .json(&serde_json::json!({ "visible": visible }))
            .send()
            .await
            .unwrap();
    }

    // Submit reporting fewer switches than the server observed; the server
    // keeps the larger value.
    let submit = client
        .post(format!("{}/api/student/attempts/{}/submit", address, attempt_id))
        .bearer_auth(&token)
        .json(&serde_json::json!({ "tab_switches": 1, "fullscreen_exits": 0 }))
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    assert_eq!(submit["results"]["tab_switches"].as_i64().unwrap(), 2);

    // Telemetry after finalize is rejected and the stored counters stay put.
    let late = client
        .post(format!("{}/api/student/attempts/{}/telemetry", address, attempt_id))
        .bearer_auth(&token)
        .json(&serde_json::json!({ "visible": false }))
        .send()
        .await
        .unwrap();
    assert_eq!(late.status().as_u16(), 410);

    let stored = sqlx::query_scalar::<_, i32>("SELECT tab_switches FROM attempts WHERE id = $1")
        .bind(attempt_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(stored, 2);
}

#[tokio::test]
async fn admin_quiz_report_lists_submitted_attempts() {
    let Some((address, pool)) = spawn_app().await else {
        return;
    };
    let client = reqwest::Client::new();

    let assessment_id = seed_quiz(&pool, None).await;
    let token = register_and_login(&client, &address).await;

    // Seed an admin account directly.
    let admin_name = format!("admin_{}", &uuid::Uuid::new_v4().to_string()[..8]);
    let hashed = hash_password("adminpass").unwrap();
    sqlx::query("INSERT INTO users (username, password, role, name) VALUES ($1, $2, 'admin', 'Admin')")
        .bind(&admin_name)
        .bind(&hashed)
        .execute(&pool)
        .await
        .unwrap();

    let admin_token = client
        .post(format!("{}/api/auth/login", address))
        .json(&serde_json::json!({ "username": admin_name, "password": "adminpass" }))
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap()["token"]
        .as_str()
        .unwrap()
        .to_string();

    // Student completes the quiz with one correct answer.
    let start_resp = client
        .post(format!(
            "{}/api/student/assessments/{}/start-quiz",
            address, assessment_id
        ))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    let attempt_id = start_resp["attempt"]["id"].as_i64().unwrap();
    let q1 = start_resp["questions"][0]["id"].as_i64().unwrap();

    client
        .post(format!("{}/api/student/attempts/{}/answer", address, attempt_id))
        .bearer_auth(&token)
        .json(&serde_json::json!({ "question_id": q1, "selected_answer": "a" }))
        .send()
        .await
        .unwrap();

    client
        .post(format!("{}/api/student/attempts/{}/submit", address, attempt_id))
        .bearer_auth(&token)
        .json(&serde_json::json!({ "tab_switches": 5, "fullscreen_exits": 2 }))
        .send()
        .await
        .unwrap();

    // Students must not reach the report; admins must.
    let forbidden = client
        .get(format!("{}/api/admin/assessments/{}/attempts", address, assessment_id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(forbidden.status().as_u16(), 403);

    let report = client
        .get(format!("{}/api/admin/assessments/{}/attempts", address, assessment_id))
        .bearer_auth(&admin_token)
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();

    let rows = report.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row["registration_number"].as_str().unwrap(), "20CS001");
    assert_eq!(row["section"].as_str().unwrap(), "CSE-A");
    assert_eq!(row["score"].as_i64().unwrap(), 1);
    assert_eq!(row["percentage"].as_f64().unwrap(), 50.0);
    assert_eq!(row["tab_switches"].as_i64().unwrap(), 5);
    assert_eq!(row["fullscreen_exits"].as_i64().unwrap(), 2);
    assert_eq!(row["breakdown"].as_array().unwrap().len(), 2);
}
