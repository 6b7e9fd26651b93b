// src/routes.rs

use axum::{
    Router, http::Method, middleware,
    routing::{delete, get, post, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{admin, auth, coding, student},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

/// Assembles the main application router.
///
/// * Merges all sub-routers (auth, student, admin).
/// * Applies global middleware (Trace, CORS).
/// * Injects global state (pool, config, judge client, session registry).
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
        .route("/assessments", get(student::list_assessments))
        .route("/assessments/{id}/start-quiz", post(student::start_quiz))
        .route(
            "/assessments/{id}/coding-problems",
            get(coding::coding_problems),
        )
        .route("/attempts/{id}/answer", post(student::save_answer))
        .route("/attempts/{id}/telemetry", post(student::report_telemetry))
        .route("/attempts/{id}/time", get(student::time_remaining))
        .route("/attempts/{id}/submit", post(student::submit_quiz))
        .route("/coding/submit", post(coding::submit_code))
        .route("/coding/submissions/{id}", get(coding::submission_status))
        .route(
            "/coding/attempts/{id}/submit",
            post(coding::submit_coding_attempt),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let admin_routes = Router::new()
        .route(
            "/assessments",
            get(admin::list_assessments).post(admin::create_assessment),
        )
        .route(
            "/assessments/{id}",
            get(admin::get_assessment)
                .put(admin::update_assessment)
                .delete(admin::delete_assessment),
        )
        .route("/assessments/{id}/questions", post(admin::create_question))
        .route(
            "/questions/{id}",
            put(admin::update_question).delete(admin::delete_question),
        )
        .route("/assessments/{id}/problems", post(admin::create_problem))
        .route("/problems/{id}", delete(admin::delete_problem))
        .route("/assessments/{id}/attempts", get(admin::quiz_report))
        .route("/coding-results/{id}", get(admin::coding_report))
        // Double middleware protection: Auth first, then Admin check
        .layer(middleware::from_fn(admin_middleware))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/student", student_routes)
        .nest("/api/admin", admin_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
