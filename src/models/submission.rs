// src/models/submission.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Submission status values stored in `code_submissions.status`.
pub const SUBMISSION_PENDING: &str = "pending";
pub const SUBMISSION_RUNNING: &str = "running";
pub const SUBMISSION_COMPLETED: &str = "completed";
pub const SUBMISSION_ERROR: &str = "error";

/// Represents the 'code_submissions' table in the database.
///
/// A student may submit many times per problem before the final test submit;
/// grading picks the best one (highest passed_count, ties by recency).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CodeSubmission {
    pub id: i64,
    pub attempt_id: i64,
    pub problem_id: i64,

    #[serde(skip_serializing)]
    pub source_code: String,

    pub language: String,

    /// 'pending' | 'running' | 'completed' | 'error'.
    pub status: String,

    pub passed_count: i32,
    pub total_count: i32,
    pub submitted_at: chrono::DateTime<chrono::Utc>,
}

/// Represents the 'test_case_results' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TestCaseResultRow {
    pub id: i64,
    pub submission_id: i64,
    pub test_case_id: i64,
    pub actual_output: String,

    /// Judge-side failure detail (compile error, timeout, ...), if any.
    pub error_detail: Option<String>,

    pub passed: bool,
    pub execution_time_seconds: Option<f64>,
}

/// DTO for submitting code for execution against a problem's test cases.
#[derive(Debug, Deserialize, Validate)]
pub struct SubmitCodeRequest {
    pub attempt_id: i64,
    pub problem_id: i64,
    #[validate(length(min = 1, max = 65536))]
    pub code: String,
    #[validate(length(min = 1, max = 30))]
    pub language: String,
}

/// Student-facing view of one test case result.
/// Input/expected/actual are withheld for hidden test cases.
#[derive(Debug, Serialize)]
pub struct PublicTestResult {
    pub test_case_id: i64,
    pub passed: bool,
    pub execution_time_seconds: Option<f64>,
    pub input: Option<String>,
    pub expected_output: Option<String>,
    pub actual_output: Option<String>,
    pub error_detail: Option<String>,
}

/// Student-facing view of a submission while/after judging.
#[derive(Debug, Serialize)]
pub struct SubmissionView {
    pub id: i64,
    pub problem_id: i64,
    pub language: String,
    pub status: String,
    pub passed_test_cases: i32,
    pub total_test_cases: i32,
    pub submitted_at: chrono::DateTime<chrono::Utc>,
    pub test_results: Vec<PublicTestResult>,
}
