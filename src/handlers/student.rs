// src/handlers/student.rs

use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use sqlx::PgPool;

use crate::{
    error::AppError,
    models::{
        assessment::{Assessment, KIND_QUIZ, PublicQuestion, Question},
        attempt::{AnswerRecord, SaveAnswerRequest, SubmitAttemptRequest, TelemetryReport},
    },
    session::{
        clock,
        lifecycle::{self, FinalizeTrigger},
        window::{self, WindowState},
    },
    state::AppState,
    utils::jwt::Claims,
};

/// One entry of the student's assessment list, annotated with where "now"
/// falls in the access window and the student's own attempt status.
#[derive(Debug, Serialize)]
pub struct AssessmentListEntry {
    pub id: i64,
    pub name: String,
    pub branch: String,
    pub kind: String,
    pub start_date: Option<chrono::DateTime<chrono::Utc>>,
    pub end_date: Option<chrono::DateTime<chrono::Utc>>,
    pub duration_minutes: Option<i32>,
    pub window: WindowState,
    pub attempt_status: Option<String>,
}

/// Lists active assessments for the student, with window state evaluated
/// at request time.
pub async fn list_assessments(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let assessments = sqlx::query_as::<_, Assessment>(
        "SELECT * FROM assessments WHERE is_active = TRUE ORDER BY COALESCE(start_date, created_at) DESC",
    )
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list assessments: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    let attempt_statuses: HashMap<i64, String> = sqlx::query_as::<_, (i64, String)>(
        "SELECT assessment_id, status FROM attempts WHERE student_id = $1",
    )
    .bind(claims.user_id())
    .fetch_all(&pool)
    .await?
    .into_iter()
    .collect();

    let now = Utc::now();
    let entries: Vec<AssessmentListEntry> = assessments
        .into_iter()
        .map(|a| AssessmentListEntry {
            window: window::evaluate(now, a.start_date, a.end_date),
            attempt_status: attempt_statuses.get(&a.id).cloned(),
            id: a.id,
            name: a.name,
            branch: a.branch,
            kind: a.kind,
            start_date: a.start_date,
            end_date: a.end_date,
            duration_minutes: a.duration_minutes,
        })
        .collect();

    Ok(Json(entries))
}

/// Starts (or resumes) a quiz attempt and returns the paper.
///
/// Idempotent: a duplicate call lands on the same attempt. Refused with a
/// blocking status when the window is closed or the attempt was already
/// submitted.
pub async fn start_quiz(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(assessment_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let assessment = lifecycle::fetch_assessment(&state.pool, assessment_id).await?;
    if assessment.kind != KIND_QUIZ {
        return Err(AppError::BadRequest("Not a quiz assessment".to_string()));
    }

    let attempt = lifecycle::start_or_resume(
        &state.pool,
        &state.sessions,
        &assessment,
        claims.user_id(),
        state.config.attempt_cap_minutes,
    )
    .await?;

    let deadline = clock::deadline(attempt.started_at, &assessment, state.config.attempt_cap_minutes);
    if state.sessions.claim_watcher(attempt.id).await {
        tokio::spawn(lifecycle::watch_deadline(
            state.pool.clone(),
            state.sessions.clone(),
            attempt.id,
            deadline,
        ));
    }

    let questions = sqlx::query_as::<_, Question>(
        "SELECT * FROM questions WHERE assessment_id = $1 ORDER BY position, id",
    )
    .bind(assessment.id)
    .fetch_all(&state.pool)
    .await?;

    // Previously saved answers let a resumed session restore its state.
    let saved_answers = sqlx::query_as::<_, AnswerRecord>(
        "SELECT * FROM answers WHERE attempt_id = $1",
    )
    .bind(attempt.id)
    .fetch_all(&state.pool)
    .await?;

    let questions: Vec<PublicQuestion> = questions.into_iter().map(PublicQuestion::from).collect();
    let remaining_seconds = clock::remaining_seconds(Utc::now(), deadline);

    Ok(Json(json!({
        "assessment": assessment,
        "attempt": attempt,
        "questions": questions,
        "saved_answers": saved_answers,
        "remaining_seconds": remaining_seconds,
    })))
}

/// Upserts one answer of an in-progress quiz attempt.
pub async fn save_answer(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
    Json(payload): Json<SaveAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    let attempt = lifecycle::fetch_owned_attempt(&state.pool, attempt_id, claims.user_id()).await?;
    let assessment = lifecycle::fetch_assessment(&state.pool, attempt.assessment_id).await?;

    lifecycle::save_answer(
        &state.pool,
        &attempt,
        &assessment,
        state.config.attempt_cap_minutes,
        payload.question_id,
        &payload.selected_answer,
    )
    .await?;

    Ok(Json(json!({ "saved": true })))
}

/// Ingests an environment-signal report into the attempt's telemetry
/// tracker and persists the counters for crash recovery. Counters only
/// grow; the attempt is never blocked because of them.
pub async fn report_telemetry(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
    Json(payload): Json<TelemetryReport>,
) -> Result<impl IntoResponse, AppError> {
    let attempt = lifecycle::fetch_owned_attempt(&state.pool, attempt_id, claims.user_id()).await?;
    if !attempt.is_in_progress() {
        return Err(AppError::AttemptNotActive);
    }

    state.sessions.ensure(attempt.id).await;
    let (tracked_tabs, tracked_exits) = state
        .sessions
        .observe(attempt.id, payload.visible, payload.fullscreen)
        .await
        .unwrap_or((0, 0));

    // A restarted process starts with a fresh tracker; the persisted
    // counters keep earlier evidence from being under-reported.
    let tab_switches = tracked_tabs.max(attempt.tab_switches);
    let fullscreen_exits = tracked_exits.max(attempt.fullscreen_exits);

    sqlx::query(
        "UPDATE attempts
         SET tab_switches = GREATEST(tab_switches, $2),
             fullscreen_exits = GREATEST(fullscreen_exits, $3)
         WHERE id = $1 AND status = 'in_progress'",
    )
    .bind(attempt.id)
    .bind(tab_switches)
    .bind(fullscreen_exits)
    .execute(&state.pool)
    .await?;

    Ok(Json(json!({
        "tab_switches": tab_switches,
        "fullscreen_exits": fullscreen_exits,
    })))
}

/// Remaining seconds for the attempt, recomputed from the deadline instant
/// on every call so missed client ticks cannot drift the countdown.
pub async fn time_remaining(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let attempt = lifecycle::fetch_owned_attempt(&state.pool, attempt_id, claims.user_id()).await?;
    let assessment = sqlx::query_as::<_, Assessment>("SELECT * FROM assessments WHERE id = $1")
        .bind(attempt.assessment_id)
        .fetch_one(&state.pool)
        .await?;

    let deadline = clock::deadline(attempt.started_at, &assessment, state.config.attempt_cap_minutes);
    let remaining_seconds = if attempt.is_in_progress() {
        clock::remaining_seconds(Utc::now(), deadline)
    } else {
        0
    };

    Ok(Json(json!({
        "status": attempt.status,
        "remaining_seconds": remaining_seconds,
    })))
}

/// Finalizes a quiz attempt on explicit student action and returns the
/// graded results. A repeat call observes 409 "already submitted".
pub async fn submit_quiz(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
    Json(payload): Json<SubmitAttemptRequest>,
) -> Result<impl IntoResponse, AppError> {
    let attempt = lifecycle::fetch_owned_attempt(&state.pool, attempt_id, claims.user_id()).await?;

    let kind = sqlx::query_scalar::<_, String>("SELECT kind FROM assessments WHERE id = $1")
        .bind(attempt.assessment_id)
        .fetch_one(&state.pool)
        .await?;
    if kind != KIND_QUIZ {
        return Err(AppError::BadRequest("Not a quiz attempt".to_string()));
    }

    let outcome = lifecycle::finalize(
        &state.pool,
        &state.sessions,
        attempt.id,
        (payload.tab_switches, payload.fullscreen_exits),
        FinalizeTrigger::Student,
    )
    .await?;

    let results = outcome
        .quiz
        .ok_or(AppError::InternalServerError("quiz results missing".to_string()))?;

    Ok(Json(json!({
        "results": {
            "score": results.score,
            "total_marks": results.total_marks,
            "percentage": results.percentage,
            "correct_answers": results.correct_answers,
            "total_questions": results.total_questions,
            "tab_switches": outcome.attempt.tab_switches,
            "fullscreen_exits": outcome.attempt.fullscreen_exits,
            "breakdown": results.breakdown,
        }
    })))
}
