// src/judge/mod.rs

pub mod http;

pub use http::HttpJudgeClient;

use async_trait::async_trait;
use std::fmt;

/// One execution of student code against a single test case's stdin.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub source_code: String,
    pub language: String,
    pub stdin: String,
    pub cpu_time_limit: f64,
    pub memory_limit: i64,
}

/// Judge-side classification of a run. Output correctness is decided by the
/// caller comparing stdout against the expected output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    /// The program ran to completion (its output may still be wrong).
    Finished,
    CompileError,
    RuntimeError,
    TimeLimitExceeded,
}

#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub stdout: String,
    pub stderr: String,
    pub status: ExecutionStatus,
    pub time_seconds: Option<f64>,
}

#[derive(Debug)]
pub enum JudgeError {
    /// Transport or protocol failure talking to the judge service.
    Transport(String),
    /// The judge did not accept the request (e.g., unsupported language).
    Rejected(String),
    /// Result polling exhausted its attempts; the run may still finish
    /// judge-side but is reported as failed here.
    StillProcessing,
}

impl fmt::Display for JudgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JudgeError::Transport(msg) => write!(f, "judge transport error: {}", msg),
            JudgeError::Rejected(msg) => write!(f, "judge rejected submission: {}", msg),
            JudgeError::StillProcessing => write!(f, "judge result still processing"),
        }
    }
}

impl std::error::Error for JudgeError {}

/// The external code-execution collaborator, behind a trait so handlers and
/// tests can substitute a stub.
#[async_trait]
pub trait JudgeClient: Send + Sync {
    async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionOutcome, JudgeError>;
}
