// src/judge/http.rs

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::config::{Config, JUDGE_POLL_INTERVAL_MS, JUDGE_POLL_MAX_ATTEMPTS};
use crate::judge::{ExecutionOutcome, ExecutionRequest, ExecutionStatus, JudgeClient, JudgeError};

/// HTTP client for a Judge0-compatible execution service.
///
/// Submission is asynchronous: POST returns a token, then the result is
/// polled with a fixed backoff and a hard attempt cutoff. Exhausting the
/// cutoff surfaces `StillProcessing` rather than blocking forever.
pub struct HttpJudgeClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

#[derive(Debug, Deserialize)]
struct JudgeStatus {
    id: i32,
}

#[derive(Debug, Deserialize)]
struct JudgeSubmission {
    stdout: Option<String>,
    stderr: Option<String>,
    compile_output: Option<String>,
    status: JudgeStatus,
    /// Wall time in seconds, serialized by the judge as a string.
    time: Option<String>,
}

impl HttpJudgeClient {
    pub fn new(config: &Config) -> Self {
        HttpJudgeClient {
            http: reqwest::Client::new(),
            base_url: config.judge_url.trim_end_matches('/').to_string(),
            api_key: config.judge_api_key.clone(),
        }
    }

    fn authorized(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => req.header("X-Auth-Token", key),
            None => req,
        }
    }
}

/// Maps a language name to the judge's numeric language id.
fn language_id(language: &str) -> Option<i32> {
    match language.to_ascii_lowercase().as_str() {
        "c" => Some(50),
        "cpp" | "c++" => Some(54),
        "java" => Some(62),
        "javascript" | "js" => Some(63),
        "python" | "python3" => Some(71),
        _ => None,
    }
}

/// Judge status ids: 1 queued, 2 processing, 3 accepted, 4 wrong answer,
/// 5 time limit, 6 compile error, 7..14 runtime/internal failures.
fn map_status(id: i32) -> ExecutionStatus {
    match id {
        3 | 4 => ExecutionStatus::Finished,
        5 => ExecutionStatus::TimeLimitExceeded,
        6 => ExecutionStatus::CompileError,
        _ => ExecutionStatus::RuntimeError,
    }
}

fn is_settled(status_id: i32) -> bool {
    status_id > 2
}

#[async_trait]
impl JudgeClient for HttpJudgeClient {
    async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionOutcome, JudgeError> {
        let language_id = language_id(&request.language)
            .ok_or_else(|| JudgeError::Rejected(format!("unsupported language '{}'", request.language)))?;

        let body = json!({
            "source_code": request.source_code,
            "language_id": language_id,
            "stdin": request.stdin,
            "cpu_time_limit": request.cpu_time_limit,
            "memory_limit": request.memory_limit,
        });

        let url = format!("{}/submissions?base64_encoded=false&wait=false", self.base_url);
        let response = self
            .authorized(self.http.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| JudgeError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(JudgeError::Rejected(format!(
                "submission refused with status {}",
                response.status()
            )));
        }

        let token = response
            .json::<TokenResponse>()
            .await
            .map_err(|e| JudgeError::Transport(e.to_string()))?
            .token;

        let poll_url = format!(
            "{}/submissions/{}?base64_encoded=false&fields=stdout,stderr,compile_output,status,time",
            self.base_url, token
        );

        for _ in 0..JUDGE_POLL_MAX_ATTEMPTS {
            tokio::time::sleep(Duration::from_millis(JUDGE_POLL_INTERVAL_MS)).await;

            let submission = self
                .authorized(self.http.get(&poll_url))
                .send()
                .await
                .map_err(|e| JudgeError::Transport(e.to_string()))?
                .json::<JudgeSubmission>()
                .await
                .map_err(|e| JudgeError::Transport(e.to_string()))?;

            if !is_settled(submission.status.id) {
                continue;
            }

            let status = map_status(submission.status.id);
            let stderr = match status {
                ExecutionStatus::CompileError => submission.compile_output.unwrap_or_default(),
                _ => submission.stderr.unwrap_or_default(),
            };
            return Ok(ExecutionOutcome {
                stdout: submission.stdout.unwrap_or_default(),
                stderr,
                status,
                time_seconds: submission.time.and_then(|t| t.parse().ok()),
            });
        }

        Err(JudgeError::StillProcessing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_languages_resolve() {
        assert_eq!(language_id("python"), Some(71));
        assert_eq!(language_id("CPP"), Some(54));
        assert_eq!(language_id("brainfuck"), None);
    }

    #[test]
    fn queued_and_processing_are_not_settled() {
        assert!(!is_settled(1));
        assert!(!is_settled(2));
        assert!(is_settled(3));
    }

    #[test]
    fn wrong_answer_still_counts_as_finished_run() {
        // Output comparison happens on our side.
        assert_eq!(map_status(4), ExecutionStatus::Finished);
        assert_eq!(map_status(6), ExecutionStatus::CompileError);
        assert_eq!(map_status(11), ExecutionStatus::RuntimeError);
    }
}
