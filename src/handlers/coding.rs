// src/handlers/coding.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use serde_json::json;
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        assessment::{CodingProblem, KIND_CODING, PublicProblem, SampleTestCase, TestCase},
        attempt::SubmitAttemptRequest,
        submission::{CodeSubmission, PublicTestResult, SubmissionView, SubmitCodeRequest},
    },
    session::{
        clock,
        lifecycle::{self, FinalizeTrigger},
    },
    state::AppState,
    utils::jwt::Claims,
};

/// Helper struct for joining a test case result with its test case data.
#[derive(sqlx::FromRow)]
struct JoinedTestResult {
    test_case_id: i64,
    actual_output: String,
    error_detail: Option<String>,
    passed: bool,
    execution_time_seconds: Option<f64>,
    input: String,
    expected_output: String,
    is_hidden: bool,
}

/// Starts (or resumes) a coding attempt and returns the problem set.
/// Problems carry only their non-hidden sample test cases.
pub async fn coding_problems(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(assessment_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let assessment = lifecycle::fetch_assessment(&state.pool, assessment_id).await?;
    if assessment.kind != KIND_CODING {
        return Err(AppError::BadRequest("Not a coding assessment".to_string()));
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

    let problems = sqlx::query_as::<_, CodingProblem>(
        "SELECT * FROM coding_problems WHERE assessment_id = $1 ORDER BY position, id",
    )
    .bind(assessment.id)
    .fetch_all(&state.pool)
    .await?;

    let mut public_problems = Vec::with_capacity(problems.len());
    for problem in problems {
        let samples = sqlx::query_as::<_, TestCase>(
            "SELECT * FROM test_cases WHERE problem_id = $1 AND is_hidden = FALSE ORDER BY position, id",
        )
        .bind(problem.id)
        .fetch_all(&state.pool)
        .await?
        .into_iter()
        .map(|t| SampleTestCase {
            id: t.id,
            input: t.input,
            expected_output: t.expected_output,
        })
        .collect();

        public_problems.push(PublicProblem {
            id: problem.id,
            title: problem.title,
            description: problem.description,
            marks: problem.marks,
            sample_test_cases: samples,
        });
    }

    let remaining_seconds = clock::remaining_seconds(Utc::now(), deadline);

    Ok(Json(json!({
        "assessment": assessment,
        "attempt": attempt,
        "problems": public_problems,
        "remaining_seconds": remaining_seconds,
    })))
}

/// Accepts code for execution against a problem's test cases.
///
/// Judging runs on a spawned task against the external judge; the client
/// polls the submission endpoint for results. 202 Accepted on dispatch.
pub async fn submit_code(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<SubmitCodeRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let attempt =
        lifecycle::fetch_owned_attempt(&state.pool, payload.attempt_id, claims.user_id()).await?;
    if !attempt.is_in_progress() {
        return Err(AppError::AttemptNotActive);
    }

    let assessment = lifecycle::fetch_assessment(&state.pool, attempt.assessment_id).await?;
    let deadline = clock::deadline(attempt.started_at, &assessment, state.config.attempt_cap_minutes);
    if clock::is_expired(Utc::now(), deadline) {
        return Err(AppError::AttemptNotActive);
    }

    let belongs = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM coding_problems WHERE id = $1 AND assessment_id = $2",
    )
    .bind(payload.problem_id)
    .bind(assessment.id)
    .fetch_one(&state.pool)
    .await?;
    if belongs == 0 {
        return Err(AppError::BadRequest(
            "Problem does not belong to this assessment".to_string(),
        ));
    }

    let submission_id = lifecycle::record_submission(
        &state.pool,
        attempt.id,
        payload.problem_id,
        &payload.code,
        &payload.language,
    )
    .await?;

    tokio::spawn(lifecycle::run_submission(
        state.pool.clone(),
        state.judge.clone(),
        submission_id,
    ));

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "submission_id": submission_id })),
    ))
}

/// Returns the judging status and per-test-case results of a submission.
/// Hidden test cases report pass/fail only; their data is withheld.
pub async fn submission_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(submission_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let submission = sqlx::query_as::<_, CodeSubmission>(
        "SELECT cs.* FROM code_submissions cs
         JOIN attempts a ON cs.attempt_id = a.id
         WHERE cs.id = $1 AND a.student_id = $2",
    )
    .bind(submission_id)
    .bind(claims.user_id())
    .fetch_optional(&state.pool)
    .await?
    .ok_or(AppError::NotFound("Submission not found".to_string()))?;

    let results = sqlx::query_as::<_, JoinedTestResult>(
        "SELECT r.test_case_id, r.actual_output, r.error_detail, r.passed,
                r.execution_time_seconds, t.input, t.expected_output, t.is_hidden
         FROM test_case_results r
         JOIN test_cases t ON r.test_case_id = t.id
         WHERE r.submission_id = $1
         ORDER BY t.position, t.id",
    )
    .bind(submission_id)
    .fetch_all(&state.pool)
    .await?;

    let test_results: Vec<PublicTestResult> = results
        .into_iter()
        .map(|r| {
            if r.is_hidden {
                PublicTestResult {
                    test_case_id: r.test_case_id,
                    passed: r.passed,
                    execution_time_seconds: r.execution_time_seconds,
                    input: None,
                    expected_output: None,
                    actual_output: None,
                    error_detail: None,
                }
            } else {
                PublicTestResult {
                    test_case_id: r.test_case_id,
                    passed: r.passed,
                    execution_time_seconds: r.execution_time_seconds,
                    input: Some(r.input),
                    expected_output: Some(r.expected_output),
                    actual_output: Some(r.actual_output),
                    error_detail: r.error_detail,
                }
            }
        })
        .collect();

    let view = SubmissionView {
        id: submission.id,
        problem_id: submission.problem_id,
        language: submission.language,
        status: submission.status,
        passed_test_cases: submission.passed_count,
        total_test_cases: submission.total_count,
        submitted_at: submission.submitted_at,
        test_results,
    };

    Ok(Json(json!({ "submission": view })))
}

/// Finalizes a coding attempt and returns the graded per-problem results.
pub async fn submit_coding_attempt(
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
    if kind != KIND_CODING {
        return Err(AppError::BadRequest("Not a coding attempt".to_string()));
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
        .coding
        .ok_or(AppError::InternalServerError("coding results missing".to_string()))?;

    Ok(Json(json!({
        "results": {
            "score": results.score,
            "total_marks": results.total_marks,
            "percentage": results.percentage,
            "tab_switches": outcome.attempt.tab_switches,
            "fullscreen_exits": outcome.attempt.fullscreen_exits,
            "problems": results.problems,
        }
    })))
}
