// src/models/attempt.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Attempt status values stored in `attempts.status`.
/// The state machine is `in_progress -> submitted`, submitted is terminal.
pub const STATUS_IN_PROGRESS: &str = "in_progress";
pub const STATUS_SUBMITTED: &str = "submitted";

/// Represents the 'attempts' table in the database.
///
/// One row per (assessment, student), enforced by a unique index. Rows are
/// never deleted: they are the audit trail for academic integrity.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Attempt {
    pub id: i64,
    pub assessment_id: i64,
    pub student_id: i64,

    /// 'in_progress' or 'submitted'.
    pub status: String,

    pub started_at: chrono::DateTime<chrono::Utc>,
    pub submitted_at: Option<chrono::DateTime<chrono::Utc>>,

    /// Advisory tamper counters, frozen at finalize.
    pub tab_switches: i32,
    pub fullscreen_exits: i32,

    /// Populated at finalize by the scoring pass.
    pub score: Option<i32>,
    pub total_marks: Option<i32>,
    pub percentage: Option<f64>,
}

impl Attempt {
    pub fn is_in_progress(&self) -> bool {
        self.status == STATUS_IN_PROGRESS
    }
}

/// Represents the 'answers' table in the database.
/// Upserted per question; grading reads the latest value.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub id: i64,
    pub attempt_id: i64,
    pub question_id: i64,
    pub selected_option: String,
    pub saved_at: chrono::DateTime<chrono::Utc>,
}

/// DTO for saving one quiz answer.
#[derive(Debug, Deserialize)]
pub struct SaveAnswerRequest {
    pub question_id: i64,
    pub selected_answer: String,
}

/// DTO carrying the client-side telemetry counters at final submit.
#[derive(Debug, Deserialize, Default)]
pub struct SubmitAttemptRequest {
    #[serde(default)]
    pub tab_switches: i32,
    #[serde(default)]
    pub fullscreen_exits: i32,
}

/// DTO for an incremental telemetry report while the attempt is active.
/// Each field carries the current state of one environment signal.
#[derive(Debug, Deserialize)]
pub struct TelemetryReport {
    pub visible: Option<bool>,
    pub fullscreen: Option<bool>,
}
