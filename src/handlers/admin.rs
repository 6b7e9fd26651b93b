// src/handlers/admin.rs

use std::collections::HashMap;

use axum::{
    Json,
    extract::{Extension, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::{PgPool, Postgres, QueryBuilder};
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        assessment::{
            Assessment, CodingProblem, CreateAssessmentRequest, CreateProblemRequest,
            CreateQuestionRequest, KIND_CODING, KIND_QUIZ, Question, TestCase,
            UpdateAssessmentRequest, UpdateQuestionRequest,
        },
        report::{CodingReportRow, QuizReportRow},
    },
    session::scoring::{self, ProblemKey, QuestionKey, ScoringPolicy, SubmissionStat},
    utils::jwt::Claims,
};

/// Helper struct for fetching a submitted attempt joined with its student.
#[derive(sqlx::FromRow)]
struct SubmittedAttemptRow {
    attempt_id: i64,
    student_id: i64,
    registration_number: String,
    name: String,
    section: String,
    score: i32,
    total_marks: i32,
    percentage: f64,
    started_at: chrono::DateTime<chrono::Utc>,
    submitted_at: chrono::DateTime<chrono::Utc>,
    tab_switches: i32,
    fullscreen_exits: i32,
}

/// Creates a new assessment shell.
/// Admin only.
pub async fn create_assessment(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateAssessmentRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    if payload.kind != KIND_QUIZ && payload.kind != KIND_CODING {
        return Err(AppError::BadRequest(
            "kind must be 'quiz' or 'coding'".to_string(),
        ));
    }

    if let (Some(start), Some(end)) = (payload.start_date, payload.end_date) {
        if end <= start {
            return Err(AppError::BadRequest(
                "end_date must be after start_date".to_string(),
            ));
        }
    }

    let scoring_policy = payload
        .scoring_policy
        .unwrap_or_else(|| "proportional".to_string());
    if scoring_policy != "proportional" && scoring_policy != "all_or_nothing" {
        return Err(AppError::BadRequest(
            "scoring_policy must be 'proportional' or 'all_or_nothing'".to_string(),
        ));
    }

    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO assessments
         (name, branch, kind, start_date, end_date, duration_minutes, scoring_policy, created_by)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
         RETURNING id",
    )
    .bind(&payload.name)
    .bind(&payload.branch)
    .bind(&payload.kind)
    .bind(payload.start_date)
    .bind(payload.end_date)
    .bind(payload.duration_minutes)
    .bind(&scoring_policy)
    .bind(claims.user_id())
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create assessment: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok((StatusCode::CREATED, Json(serde_json::json!({ "id": id }))))
}

/// Lists all assessments with their submitted-attempt counts.
/// Admin only.
pub async fn list_assessments(State(pool): State<PgPool>) -> Result<impl IntoResponse, AppError> {
    let assessments =
        sqlx::query_as::<_, Assessment>("SELECT * FROM assessments ORDER BY id DESC")
            .fetch_all(&pool)
            .await?;

    let counts: HashMap<i64, i64> = sqlx::query_as::<_, (i64, i64)>(
        "SELECT assessment_id, COUNT(*) FROM attempts WHERE status = 'submitted' GROUP BY assessment_id",
    )
    .fetch_all(&pool)
    .await?
    .into_iter()
    .collect();

    let entries: Vec<serde_json::Value> = assessments
        .into_iter()
        .map(|a| {
            let submitted = counts.get(&a.id).copied().unwrap_or(0);
            serde_json::json!({ "assessment": a, "submitted_attempts": submitted })
        })
        .collect();

    Ok(Json(entries))
}

/// Full assessment detail including answer keys and hidden test cases.
/// Admin only.
pub async fn get_assessment(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let assessment = sqlx::query_as::<_, Assessment>("SELECT * FROM assessments WHERE id = $1")
        .bind(id)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("Assessment not found".to_string()))?;

    let questions = sqlx::query_as::<_, Question>(
        "SELECT * FROM questions WHERE assessment_id = $1 ORDER BY position, id",
    )
    .bind(id)
    .fetch_all(&pool)
    .await?;

    let problems = sqlx::query_as::<_, CodingProblem>(
        "SELECT * FROM coding_problems WHERE assessment_id = $1 ORDER BY position, id",
    )
    .bind(id)
    .fetch_all(&pool)
    .await?;

    let mut problems_with_cases = Vec::with_capacity(problems.len());
    for problem in problems {
        let cases = sqlx::query_as::<_, TestCase>(
            "SELECT * FROM test_cases WHERE problem_id = $1 ORDER BY position, id",
        )
        .bind(problem.id)
        .fetch_all(&pool)
        .await?;
        problems_with_cases.push(serde_json::json!({ "problem": problem, "test_cases": cases }));
    }

    Ok(Json(serde_json::json!({
        "assessment": assessment,
        "questions": questions,
        "problems": problems_with_cases,
    })))
}

/// Updates an assessment. Fields are optional.
/// Admin only.
pub async fn update_assessment(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateAssessmentRequest>,
) -> Result<impl IntoResponse, AppError> {
    if payload.name.is_none()
        && payload.branch.is_none()
        && payload.start_date.is_none()
        && payload.end_date.is_none()
        && payload.duration_minutes.is_none()
        && payload.scoring_policy.is_none()
        && payload.is_active.is_none()
    {
        return Ok(StatusCode::OK);
    }

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE assessments SET ");
    let mut separated = builder.separated(", ");

    if let Some(name) = payload.name {
        separated.push("name = ");
        separated.push_bind_unseparated(name);
    }

    if let Some(branch) = payload.branch {
        separated.push("branch = ");
        separated.push_bind_unseparated(branch);
    }

    if let Some(start_date) = payload.start_date {
        separated.push("start_date = ");
        separated.push_bind_unseparated(start_date);
    }

    if let Some(end_date) = payload.end_date {
        separated.push("end_date = ");
        separated.push_bind_unseparated(end_date);
    }

    if let Some(duration_minutes) = payload.duration_minutes {
        separated.push("duration_minutes = ");
        separated.push_bind_unseparated(duration_minutes);
    }

    if let Some(scoring_policy) = payload.scoring_policy {
        if scoring_policy != "proportional" && scoring_policy != "all_or_nothing" {
            return Err(AppError::BadRequest(
                "scoring_policy must be 'proportional' or 'all_or_nothing'".to_string(),
            ));
        }
        separated.push("scoring_policy = ");
        separated.push_bind_unseparated(scoring_policy);
    }

    if let Some(is_active) = payload.is_active {
        separated.push("is_active = ");
        separated.push_bind_unseparated(is_active);
    }

    builder.push(" WHERE id = ");
    builder.push_bind(id);

    let result = builder.build().execute(&pool).await.map_err(|e| {
        tracing::error!("Failed to update assessment: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Assessment not found".to_string()));
    }

    Ok(StatusCode::OK)
}

/// Deletes an assessment that has no attempts yet.
/// Attempts are the academic-integrity audit trail; once any exist the
/// assessment can only be deactivated, not deleted.
/// Admin only.
pub async fn delete_assessment(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let attempts =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM attempts WHERE assessment_id = $1")
            .bind(id)
            .fetch_one(&pool)
            .await?;

    if attempts > 0 {
        return Err(AppError::Conflict(
            "Assessment has attempts; deactivate it instead".to_string(),
        ));
    }

    let result = sqlx::query("DELETE FROM assessments WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete assessment: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Assessment not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Adds a question to a quiz assessment.
/// Admin only.
pub async fn create_question(
    State(pool): State<PgPool>,
    Path(assessment_id): Path<i64>,
    Json(payload): Json<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    if !payload.options.iter().any(|o| o.id == payload.correct_option) {
        return Err(AppError::BadRequest(
            "correct_option must be one of the option ids".to_string(),
        ));
    }

    let kind = sqlx::query_scalar::<_, String>("SELECT kind FROM assessments WHERE id = $1")
        .bind(assessment_id)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("Assessment not found".to_string()))?;
    if kind != KIND_QUIZ {
        return Err(AppError::BadRequest(
            "Questions can only be added to quiz assessments".to_string(),
        ));
    }

    let options_json = serde_json::to_value(&payload.options).unwrap_or_default();

    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO questions (assessment_id, content, options, correct_option, marks, position)
         VALUES ($1, $2, $3, $4, $5, $6)
         RETURNING id",
    )
    .bind(assessment_id)
    .bind(&payload.content)
    .bind(options_json)
    .bind(&payload.correct_option)
    .bind(payload.marks)
    .bind(payload.position)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create question: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok((StatusCode::CREATED, Json(serde_json::json!({ "id": id }))))
}

/// Updates a question by ID.
/// Admin only.
pub async fn update_question(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if payload.content.is_none()
        && payload.options.is_none()
        && payload.correct_option.is_none()
        && payload.marks.is_none()
        && payload.position.is_none()
    {
        return Ok(StatusCode::OK);
    }

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE questions SET ");
    let mut separated = builder.separated(", ");

    if let Some(content) = payload.content {
        separated.push("content = ");
        separated.push_bind_unseparated(content);
    }

    if let Some(options) = payload.options {
        separated.push("options = ");
        separated.push_bind_unseparated(serde_json::to_value(options).unwrap_or_default());
    }

    if let Some(correct_option) = payload.correct_option {
        separated.push("correct_option = ");
        separated.push_bind_unseparated(correct_option);
    }

    if let Some(marks) = payload.marks {
        separated.push("marks = ");
        separated.push_bind_unseparated(marks);
    }

    if let Some(position) = payload.position {
        separated.push("position = ");
        separated.push_bind_unseparated(position);
    }

    builder.push(" WHERE id = ");
    builder.push_bind(id);

    let result = builder.build().execute(&pool).await.map_err(|e| {
        tracing::error!("Failed to update question: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Question not found".to_string()));
    }

    Ok(StatusCode::OK)
}

/// Deletes a question by ID.
/// Admin only.
pub async fn delete_question(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("DELETE FROM questions WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete question: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Question not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Adds a coding problem (with its test cases) to a coding assessment.
/// Admin only.
pub async fn create_problem(
    State(pool): State<PgPool>,
    Path(assessment_id): Path<i64>,
    Json(payload): Json<CreateProblemRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    if payload.test_cases.is_empty() {
        return Err(AppError::BadRequest(
            "A problem needs at least one test case".to_string(),
        ));
    }

    let kind = sqlx::query_scalar::<_, String>("SELECT kind FROM assessments WHERE id = $1")
        .bind(assessment_id)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("Assessment not found".to_string()))?;
    if kind != KIND_CODING {
        return Err(AppError::BadRequest(
            "Problems can only be added to coding assessments".to_string(),
        ));
    }

    let mut tx = pool.begin().await?;

    let problem_id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO coding_problems (assessment_id, title, description, marks, position)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING id",
    )
    .bind(assessment_id)
    .bind(&payload.title)
    .bind(&payload.description)
    .bind(payload.marks)
    .bind(payload.position)
    .fetch_one(&mut *tx)
    .await?;

    for (position, case) in payload.test_cases.iter().enumerate() {
        sqlx::query(
            "INSERT INTO test_cases (problem_id, input, expected_output, is_hidden, position)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(problem_id)
        .bind(&case.input)
        .bind(&case.expected_output)
        .bind(case.is_hidden)
        .bind(position as i32)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "id": problem_id })),
    ))
}

/// Deletes a coding problem by ID.
/// Admin only.
pub async fn delete_problem(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("DELETE FROM coding_problems WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete problem: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Problem not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

async fn submitted_attempts(
    pool: &PgPool,
    assessment_id: i64,
) -> Result<Vec<SubmittedAttemptRow>, AppError> {
    let rows = sqlx::query_as::<_, SubmittedAttemptRow>(
        "SELECT a.id AS attempt_id, u.id AS student_id,
                u.registration_number, u.name, u.section,
                COALESCE(a.score, 0) AS score,
                COALESCE(a.total_marks, 0) AS total_marks,
                COALESCE(a.percentage, 0) AS percentage,
                a.started_at, a.submitted_at,
                a.tab_switches, a.fullscreen_exits
         FROM attempts a
         JOIN users u ON a.student_id = u.id
         WHERE a.assessment_id = $1 AND a.status = 'submitted'
         ORDER BY a.submitted_at",
    )
    .bind(assessment_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Quiz report: one row per submitted attempt with student identity,
/// score, time spent, tamper counters and a per-question breakdown.
/// Pure read path. Admin only.
pub async fn quiz_report(
    State(pool): State<PgPool>,
    Path(assessment_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let keys: Vec<QuestionKey> = sqlx::query_as::<_, (i64, String, i32)>(
        "SELECT id, correct_option, marks FROM questions WHERE assessment_id = $1 ORDER BY position, id",
    )
    .bind(assessment_id)
    .fetch_all(&pool)
    .await?
    .into_iter()
    .map(|(id, correct_option, marks)| QuestionKey {
        id,
        correct_option,
        marks,
    })
    .collect();

    let attempts = submitted_attempts(&pool, assessment_id).await?;

    let mut report = Vec::with_capacity(attempts.len());
    for row in attempts {
        let answers: HashMap<i64, String> = sqlx::query_as::<_, (i64, String)>(
            "SELECT question_id, selected_option FROM answers WHERE attempt_id = $1",
        )
        .bind(row.attempt_id)
        .fetch_all(&pool)
        .await?
        .into_iter()
        .collect();

        let graded = scoring::score_quiz(&keys, &answers);

        report.push(QuizReportRow {
            attempt_id: row.attempt_id,
            student_id: row.student_id,
            registration_number: row.registration_number,
            name: row.name,
            section: row.section,
            score: row.score,
            total_marks: row.total_marks,
            percentage: row.percentage,
            time_spent_seconds: (row.submitted_at - row.started_at).num_seconds(),
            tab_switches: row.tab_switches,
            fullscreen_exits: row.fullscreen_exits,
            breakdown: graded.breakdown,
        });
    }

    Ok(Json(report))
}

/// Coding report: one row per submitted attempt with per-problem outcomes,
/// distinguishing not-attempted problems from attempted-but-failed ones.
/// Pure read path. Admin only.
pub async fn coding_report(
    State(pool): State<PgPool>,
    Path(assessment_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let assessment = sqlx::query_as::<_, Assessment>("SELECT * FROM assessments WHERE id = $1")
        .bind(assessment_id)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("Assessment not found".to_string()))?;

    let problems: Vec<ProblemKey> = sqlx::query_as::<_, (i64, String, i32)>(
        "SELECT id, title, marks FROM coding_problems WHERE assessment_id = $1 ORDER BY position, id",
    )
    .bind(assessment_id)
    .fetch_all(&pool)
    .await?
    .into_iter()
    .map(|(id, title, marks)| ProblemKey { id, title, marks })
    .collect();

    let policy = ScoringPolicy::parse(&assessment.scoring_policy);
    let attempts = submitted_attempts(&pool, assessment_id).await?;

    let mut report = Vec::with_capacity(attempts.len());
    for row in attempts {
        let submissions: Vec<SubmissionStat> = sqlx::query_as::<_, (i64, i32, i32, chrono::DateTime<chrono::Utc>)>(
            "SELECT problem_id, passed_count, total_count, submitted_at
             FROM code_submissions
             WHERE attempt_id = $1 AND status = 'completed'",
        )
        .bind(row.attempt_id)
        .fetch_all(&pool)
        .await?
        .into_iter()
        .map(|(problem_id, passed_count, total_count, submitted_at)| SubmissionStat {
            problem_id,
            passed_count,
            total_count,
            submitted_at,
        })
        .collect();

        let graded = scoring::score_coding(&problems, &submissions, policy);

        report.push(CodingReportRow {
            attempt_id: row.attempt_id,
            student_id: row.student_id,
            registration_number: row.registration_number,
            name: row.name,
            section: row.section,
            score: row.score,
            total_marks: row.total_marks,
            percentage: row.percentage,
            time_spent_seconds: (row.submitted_at - row.started_at).num_seconds(),
            tab_switches: row.tab_switches,
            fullscreen_exits: row.fullscreen_exits,
            problems: graded.problems,
        });
    }

    Ok(Json(report))
}
