// src/session/lifecycle.rs

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::{
    config::{JUDGE_CPU_TIME_LIMIT_SECONDS, JUDGE_MEMORY_LIMIT_KB},
    error::AppError,
    judge::{ExecutionRequest, ExecutionStatus, JudgeClient},
    models::{
        assessment::{Assessment, KIND_QUIZ, TestCase},
        attempt::Attempt,
        submission::{CodeSubmission, SUBMISSION_COMPLETED, SUBMISSION_ERROR, SUBMISSION_RUNNING},
    },
    session::{
        clock,
        registry::SessionRegistry,
        scoring::{self, CodingScore, ProblemKey, QuestionKey, QuizScore, ScoringPolicy, SubmissionStat},
        window::{self, WindowState},
    },
};

/// Who pulled the trigger on finalize. Both paths funnel through the same
/// operation; this only affects logging.
#[derive(Debug, Clone, Copy)]
pub enum FinalizeTrigger {
    Student,
    Timeout,
}

/// Everything finalize produces: the submitted attempt row plus the graded
/// results for whichever kind the assessment is.
#[derive(Debug)]
pub struct FinalizeOutcome {
    pub attempt: Attempt,
    pub quiz: Option<QuizScore>,
    pub coding: Option<CodingScore>,
}

/// Helper struct for fetching quiz answer keys.
#[derive(sqlx::FromRow)]
struct QuestionKeyRow {
    id: i64,
    correct_option: String,
    marks: i32,
}

/// Loads an active assessment or refuses.
pub async fn fetch_assessment(pool: &PgPool, assessment_id: i64) -> Result<Assessment, AppError> {
    let assessment = sqlx::query_as::<_, Assessment>(
        "SELECT * FROM assessments WHERE id = $1 AND is_active = TRUE",
    )
    .bind(assessment_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Assessment not found".to_string()))?;

    Ok(assessment)
}

/// Loads an attempt and checks it belongs to the requesting student.
pub async fn fetch_owned_attempt(
    pool: &PgPool,
    attempt_id: i64,
    student_id: i64,
) -> Result<Attempt, AppError> {
    let attempt = sqlx::query_as::<_, Attempt>("SELECT * FROM attempts WHERE id = $1")
        .bind(attempt_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("Attempt not found".to_string()))?;

    if attempt.student_id != student_id {
        // Do not leak the existence of other students' attempts.
        return Err(AppError::NotFound("Attempt not found".to_string()));
    }

    Ok(attempt)
}

/// Starts a new attempt or resumes the existing one. Idempotent: a second
/// call (double-click, second tab) lands on the same row via the conditional
/// insert keyed on (assessment_id, student_id).
///
/// Resuming past the deadline finalizes through the timeout path instead of
/// granting fresh time.
pub async fn start_or_resume(
    pool: &PgPool,
    registry: &SessionRegistry,
    assessment: &Assessment,
    student_id: i64,
    cap_minutes: i64,
) -> Result<Attempt, AppError> {
    // An existing attempt is handled first: a submitted one is terminal and
    // an in-progress one past its deadline must finalize through the timeout
    // path, both regardless of where the window stands now.
    if let Some(existing) = sqlx::query_as::<_, Attempt>(
        "SELECT * FROM attempts WHERE assessment_id = $1 AND student_id = $2",
    )
    .bind(assessment.id)
    .bind(student_id)
    .fetch_optional(pool)
    .await?
    {
        return resume(pool, registry, assessment, existing, cap_minutes).await;
    }

    // Only fresh attempts are gated by the access window.
    let now = Utc::now();
    match window::evaluate(now, assessment.start_date, assessment.end_date) {
        WindowState::Upcoming => {
            return Err(AppError::WindowClosed(
                "assessment has not started yet".to_string(),
            ));
        }
        WindowState::Ended => {
            return Err(AppError::WindowClosed(
                "assessment window is over".to_string(),
            ));
        }
        WindowState::Active => {}
    }

    let inserted = sqlx::query_as::<_, Attempt>(
        "INSERT INTO attempts (assessment_id, student_id)
         VALUES ($1, $2)
         ON CONFLICT (assessment_id, student_id) DO NOTHING
         RETURNING *",
    )
    .bind(assessment.id)
    .bind(student_id)
    .fetch_optional(pool)
    .await?;

    match inserted {
        Some(attempt) => {
            tracing::info!(
                "Student {} started attempt {} on assessment {}",
                student_id,
                attempt.id,
                assessment.id
            );
            registry.ensure(attempt.id).await;
            Ok(attempt)
        }
        None => {
            // Lost a concurrent race; adopt the winner's row.
            let existing = sqlx::query_as::<_, Attempt>(
                "SELECT * FROM attempts WHERE assessment_id = $1 AND student_id = $2",
            )
            .bind(assessment.id)
            .bind(student_id)
            .fetch_one(pool)
            .await?;
            resume(pool, registry, assessment, existing, cap_minutes).await
        }
    }
}

async fn resume(
    pool: &PgPool,
    registry: &SessionRegistry,
    assessment: &Assessment,
    attempt: Attempt,
    cap_minutes: i64,
) -> Result<Attempt, AppError> {
    if !attempt.is_in_progress() {
        return Err(AppError::AlreadySubmitted);
    }

    let deadline = clock::deadline(attempt.started_at, assessment, cap_minutes);
    if clock::is_expired(Utc::now(), deadline) {
        let counters = (attempt.tab_switches, attempt.fullscreen_exits);
        match finalize(pool, registry, attempt.id, counters, FinalizeTrigger::Timeout).await {
            Ok(_) | Err(AppError::AlreadySubmitted) => {}
            Err(e) => return Err(e),
        }
        return Err(AppError::AlreadySubmitted);
    }

    registry.ensure(attempt.id).await;
    Ok(attempt)
}

/// Upserts a quiz answer. Grading reads the latest value per question, so a
/// changed answer simply overwrites the previous one.
pub async fn save_answer(
    pool: &PgPool,
    attempt: &Attempt,
    assessment: &Assessment,
    cap_minutes: i64,
    question_id: i64,
    selected_option: &str,
) -> Result<(), AppError> {
    if !attempt.is_in_progress() {
        return Err(AppError::AttemptNotActive);
    }

    let deadline = clock::deadline(attempt.started_at, assessment, cap_minutes);
    if clock::is_expired(Utc::now(), deadline) {
        // No edits past the deadline, even if the auto-submit has not landed.
        return Err(AppError::AttemptNotActive);
    }

    let belongs = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM questions WHERE id = $1 AND assessment_id = $2",
    )
    .bind(question_id)
    .bind(assessment.id)
    .fetch_one(pool)
    .await?;

    if belongs == 0 {
        return Err(AppError::BadRequest(
            "Question does not belong to this assessment".to_string(),
        ));
    }

    sqlx::query(
        "INSERT INTO answers (attempt_id, question_id, selected_option)
         VALUES ($1, $2, $3)
         ON CONFLICT (attempt_id, question_id)
         DO UPDATE SET selected_option = EXCLUDED.selected_option, saved_at = NOW()",
    )
    .bind(attempt.id)
    .bind(question_id)
    .bind(selected_option)
    .execute(pool)
    .await?;

    Ok(())
}

/// Creates a pending code submission row; execution happens on a spawned
/// task via [`run_submission`].
pub async fn record_submission(
    pool: &PgPool,
    attempt_id: i64,
    problem_id: i64,
    source_code: &str,
    language: &str,
) -> Result<i64, AppError> {
    let total: i64 =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM test_cases WHERE problem_id = $1")
            .bind(problem_id)
            .fetch_one(pool)
            .await?;

    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO code_submissions (attempt_id, problem_id, source_code, language, total_count)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING id",
    )
    .bind(attempt_id)
    .bind(problem_id)
    .bind(source_code)
    .bind(language)
    .bind(total as i32)
    .fetch_one(pool)
    .await?;

    Ok(id)
}

/// Task body: runs a submission against every test case of its problem.
/// Judge failures (timeout, compile error, transport) are recorded as failed
/// test cases, never as a crash of the submission pipeline.
pub async fn run_submission(pool: PgPool, judge: Arc<dyn JudgeClient>, submission_id: i64) {
    if let Err(e) = execute_submission(&pool, judge.as_ref(), submission_id).await {
        tracing::error!("Submission {} execution failed: {}", submission_id, e);
        let _ = sqlx::query(
            "UPDATE code_submissions SET status = $2 WHERE id = $1 AND status <> $3",
        )
        .bind(submission_id)
        .bind(SUBMISSION_ERROR)
        .bind(SUBMISSION_COMPLETED)
        .execute(&pool)
        .await;
    }
}

async fn execute_submission(
    pool: &PgPool,
    judge: &dyn JudgeClient,
    submission_id: i64,
) -> Result<(), AppError> {
    let submission =
        sqlx::query_as::<_, CodeSubmission>("SELECT * FROM code_submissions WHERE id = $1")
            .bind(submission_id)
            .fetch_optional(pool)
            .await?
            .ok_or(AppError::NotFound("Submission not found".to_string()))?;

    sqlx::query("UPDATE code_submissions SET status = $2 WHERE id = $1")
        .bind(submission_id)
        .bind(SUBMISSION_RUNNING)
        .execute(pool)
        .await?;

    let cases = sqlx::query_as::<_, TestCase>(
        "SELECT * FROM test_cases WHERE problem_id = $1 ORDER BY position, id",
    )
    .bind(submission.problem_id)
    .fetch_all(pool)
    .await?;

    let mut passed_count = 0;

    for case in &cases {
        let outcome = judge
            .execute(ExecutionRequest {
                source_code: submission.source_code.clone(),
                language: submission.language.clone(),
                stdin: case.input.clone(),
                cpu_time_limit: JUDGE_CPU_TIME_LIMIT_SECONDS,
                memory_limit: JUDGE_MEMORY_LIMIT_KB,
            })
            .await;

        let (actual_output, error_detail, passed, time_seconds) = match outcome {
            Ok(run) => {
                let passed = run.status == ExecutionStatus::Finished
                    && run.stdout.trim() == case.expected_output.trim();
                let detail = match run.status {
                    ExecutionStatus::Finished => None,
                    ExecutionStatus::CompileError => Some(format!("compile error: {}", run.stderr)),
                    ExecutionStatus::RuntimeError => Some(format!("runtime error: {}", run.stderr)),
                    ExecutionStatus::TimeLimitExceeded => Some("time limit exceeded".to_string()),
                };
                (run.stdout, detail, passed, run.time_seconds)
            }
            Err(e) => (String::new(), Some(e.to_string()), false, None),
        };

        if passed {
            passed_count += 1;
        }

        sqlx::query(
            "INSERT INTO test_case_results
             (submission_id, test_case_id, actual_output, error_detail, passed, execution_time_seconds)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(submission_id)
        .bind(case.id)
        .bind(&actual_output)
        .bind(&error_detail)
        .bind(passed)
        .bind(time_seconds)
        .execute(pool)
        .await?;
    }

    sqlx::query(
        "UPDATE code_submissions SET status = $2, passed_count = $3, total_count = $4 WHERE id = $1",
    )
    .bind(submission_id)
    .bind(SUBMISSION_COMPLETED)
    .bind(passed_count)
    .bind(cases.len() as i32)
    .execute(pool)
    .await?;

    tracing::info!(
        "Submission {} judged: {}/{} test cases passed",
        submission_id,
        passed_count,
        cases.len()
    );

    Ok(())
}

/// Finalizes an attempt exactly once: transitions it to submitted, freezes
/// the telemetry counters, grades it and persists the score. The student's
/// submit and the deadline watcher both land here; the in-flight gate plus
/// the conditional UPDATE guarantee a single transition.
pub async fn finalize(
    pool: &PgPool,
    registry: &SessionRegistry,
    attempt_id: i64,
    reported: (i32, i32),
    trigger: FinalizeTrigger,
) -> Result<FinalizeOutcome, AppError> {
    if !registry.begin_finalize(attempt_id).await {
        return Err(AppError::AlreadySubmitted);
    }

    let result = finalize_inner(pool, registry, attempt_id, reported, trigger).await;

    match &result {
        Ok(_) | Err(AppError::AlreadySubmitted) => registry.remove(attempt_id).await,
        // Storage failure: reopen the gate so a retry (the timeout path
        // keeps retrying until success) can get through.
        Err(_) => registry.abort_finalize(attempt_id).await,
    }

    result
}

async fn finalize_inner(
    pool: &PgPool,
    registry: &SessionRegistry,
    attempt_id: i64,
    reported: (i32, i32),
    trigger: FinalizeTrigger,
) -> Result<FinalizeOutcome, AppError> {
    let tracked = registry.counters(attempt_id).await.unwrap_or((0, 0));
    let tab_switches = reported.0.max(tracked.0);
    let fullscreen_exits = reported.1.max(tracked.1);

    let mut tx = pool.begin().await?;

    // The conditional transition is the authoritative exactly-once guard:
    // it survives concurrent tabs and devices, not just this process.
    let attempt = sqlx::query_as::<_, Attempt>(
        "UPDATE attempts
         SET status = 'submitted',
             submitted_at = NOW(),
             tab_switches = GREATEST(tab_switches, $2),
             fullscreen_exits = GREATEST(fullscreen_exits, $3)
         WHERE id = $1 AND status = 'in_progress'
         RETURNING *",
    )
    .bind(attempt_id)
    .bind(tab_switches)
    .bind(fullscreen_exits)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(mut attempt) = attempt else {
        let exists =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM attempts WHERE id = $1")
                .bind(attempt_id)
                .fetch_one(&mut *tx)
                .await?;
        return Err(if exists > 0 {
            AppError::AlreadySubmitted
        } else {
            AppError::NotFound("Attempt not found".to_string())
        });
    };

    let assessment =
        sqlx::query_as::<_, Assessment>("SELECT * FROM assessments WHERE id = $1")
            .bind(attempt.assessment_id)
            .fetch_one(&mut *tx)
            .await?;

    let (quiz, coding) = if assessment.kind == KIND_QUIZ {
        let keys = sqlx::query_as::<_, QuestionKeyRow>(
            "SELECT id, correct_option, marks FROM questions WHERE assessment_id = $1 ORDER BY position, id",
        )
        .bind(assessment.id)
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .map(|r| QuestionKey {
            id: r.id,
            correct_option: r.correct_option,
            marks: r.marks,
        })
        .collect::<Vec<_>>();

        let answers: HashMap<i64, String> = sqlx::query_as::<_, (i64, String)>(
            "SELECT question_id, selected_option FROM answers WHERE attempt_id = $1",
        )
        .bind(attempt_id)
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .collect();

        (Some(scoring::score_quiz(&keys, &answers)), None)
    } else {
        let problems = sqlx::query_as::<_, (i64, String, i32)>(
            "SELECT id, title, marks FROM coding_problems WHERE assessment_id = $1 ORDER BY position, id",
        )
        .bind(assessment.id)
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .map(|(id, title, marks)| ProblemKey { id, title, marks })
        .collect::<Vec<_>>();

        let submissions = sqlx::query_as::<_, (i64, i32, i32, DateTime<Utc>)>(
            "SELECT problem_id, passed_count, total_count, submitted_at
             FROM code_submissions
             WHERE attempt_id = $1 AND status = 'completed'",
        )
        .bind(attempt_id)
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .map(|(problem_id, passed_count, total_count, submitted_at)| SubmissionStat {
            problem_id,
            passed_count,
            total_count,
            submitted_at,
        })
        .collect::<Vec<_>>();

        let policy = ScoringPolicy::parse(&assessment.scoring_policy);
        (None, Some(scoring::score_coding(&problems, &submissions, policy)))
    };

    let (score, total_marks, percentage) = match (&quiz, &coding) {
        (Some(q), _) => (q.score, q.total_marks, q.percentage),
        (_, Some(c)) => (c.score, c.total_marks, c.percentage),
        _ => (0, 0, 0.0),
    };

    sqlx::query("UPDATE attempts SET score = $2, total_marks = $3, percentage = $4 WHERE id = $1")
        .bind(attempt_id)
        .bind(score)
        .bind(total_marks)
        .bind(percentage)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    attempt.score = Some(score);
    attempt.total_marks = Some(total_marks);
    attempt.percentage = Some(percentage);

    tracing::info!(
        "Attempt {} finalized ({:?}): {}/{} marks",
        attempt_id,
        trigger,
        score,
        total_marks
    );

    Ok(FinalizeOutcome {
        attempt,
        quiz,
        coding,
    })
}

/// Task body: sleeps until the attempt's deadline, then auto-submits through
/// the normal finalize path. Retries until the attempt is observed out of
/// in_progress so a transient failure at the deadline cannot lose the
/// auto-submit.
pub async fn watch_deadline(
    pool: PgPool,
    registry: SessionRegistry,
    attempt_id: i64,
    deadline: DateTime<Utc>,
) {
    let wait_ms = (deadline - Utc::now()).num_milliseconds();
    if wait_ms > 0 {
        tokio::time::sleep(std::time::Duration::from_millis(wait_ms as u64)).await;
    }

    loop {
        let counters = registry.counters(attempt_id).await.unwrap_or((0, 0));
        match finalize(&pool, &registry, attempt_id, counters, FinalizeTrigger::Timeout).await {
            Ok(_) => {
                tracing::info!("Attempt {} auto-submitted at deadline", attempt_id);
                break;
            }
            Err(AppError::NotFound(_)) => break,
            Err(AppError::AlreadySubmitted) => {
                // The gate also reports this while another finalize is
                // mid-flight; only stand down once the row has really
                // left in_progress.
                let status = sqlx::query_scalar::<_, String>(
                    "SELECT status FROM attempts WHERE id = $1",
                )
                .bind(attempt_id)
                .fetch_optional(&pool)
                .await;
                match status {
                    Ok(Some(s)) if s == "in_progress" => {
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                    }
                    _ => break,
                }
            }
            Err(e) => {
                tracing::warn!("Auto-submit of attempt {} failed, retrying: {}", attempt_id, e);
                tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            }
        }
    }
}
