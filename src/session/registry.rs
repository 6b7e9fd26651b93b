// src/session/registry.rs

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::session::telemetry::TelemetryTracker;

/// Per-attempt state held only for the lifetime of the active session.
#[derive(Debug)]
struct ActiveSession {
    telemetry: TelemetryTracker,
    /// Set while a finalize call is in flight so the student's submit and
    /// the deadline watcher cannot race each other into the database.
    finalizing: bool,
    /// Set once a deadline watcher task has been spawned for this attempt.
    watcher_spawned: bool,
}

impl ActiveSession {
    fn new() -> Self {
        ActiveSession {
            telemetry: TelemetryTracker::new(),
            finalizing: false,
            watcher_spawned: false,
        }
    }
}

/// In-memory registry of active attempt sessions.
///
/// Shared across handlers and background tasks through `AppState`. Entries
/// exist only while an attempt is in progress on this process; the database
/// row remains the source of truth and survives restarts.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<Mutex<HashMap<i64, ActiveSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        SessionRegistry {
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Ensures a session entry exists for the attempt.
    pub async fn ensure(&self, attempt_id: i64) {
        let mut sessions = self.inner.lock().await;
        sessions.entry(attempt_id).or_insert_with(ActiveSession::new);
    }

    /// Claims the right to spawn the deadline watcher for this attempt.
    /// Returns false if a watcher was already spawned.
    pub async fn claim_watcher(&self, attempt_id: i64) -> bool {
        let mut sessions = self.inner.lock().await;
        let session = sessions.entry(attempt_id).or_insert_with(ActiveSession::new);
        if session.watcher_spawned {
            return false;
        }
        session.watcher_spawned = true;
        true
    }

    /// Feeds environment signal states into the attempt's tracker and
    /// returns the updated counters, or None if no session is active.
    pub async fn observe(
        &self,
        attempt_id: i64,
        visible: Option<bool>,
        fullscreen: Option<bool>,
    ) -> Option<(i32, i32)> {
        let mut sessions = self.inner.lock().await;
        let session = sessions.get_mut(&attempt_id)?;
        if let Some(v) = visible {
            session.telemetry.observe_visibility(v);
        }
        if let Some(f) = fullscreen {
            session.telemetry.observe_fullscreen(f);
        }
        Some(session.telemetry.counters())
    }

    /// Current counters for the attempt, if a session is active here.
    pub async fn counters(&self, attempt_id: i64) -> Option<(i32, i32)> {
        let sessions = self.inner.lock().await;
        sessions.get(&attempt_id).map(|s| s.telemetry.counters())
    }

    /// Marks the attempt as finalizing and freezes its telemetry.
    /// Returns false if another finalize call is already in flight; the
    /// first caller wins, everyone else observes AlreadySubmitted.
    pub async fn begin_finalize(&self, attempt_id: i64) -> bool {
        let mut sessions = self.inner.lock().await;
        let session = sessions.entry(attempt_id).or_insert_with(ActiveSession::new);
        if session.finalizing {
            return false;
        }
        session.finalizing = true;
        session.telemetry.freeze();
        true
    }

    /// Drops the session after a successful finalize.
    pub async fn remove(&self, attempt_id: i64) {
        let mut sessions = self.inner.lock().await;
        sessions.remove(&attempt_id);
    }

    /// Re-opens the finalize gate after a failed finalize so a retry
    /// (e.g., the timeout path after a network blip) can get through.
    pub async fn abort_finalize(&self, attempt_id: i64) {
        let mut sessions = self.inner.lock().await;
        if let Some(session) = sessions.get_mut(&attempt_id) {
            session.finalizing = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn finalize_gate_admits_one_caller() {
        let registry = SessionRegistry::new();
        registry.ensure(7).await;
        assert!(registry.begin_finalize(7).await);
        assert!(!registry.begin_finalize(7).await);
    }

    #[tokio::test]
    async fn counters_freeze_when_finalize_begins() {
        let registry = SessionRegistry::new();
        registry.ensure(7).await;
        registry.observe(7, Some(false), None).await;
        assert!(registry.begin_finalize(7).await);
        // Transitions after the gate closes are ignored.
        registry.observe(7, Some(true), None).await;
        registry.observe(7, Some(false), None).await;
        assert_eq!(registry.counters(7).await, Some((1, 0)));
    }

    #[tokio::test]
    async fn abort_reopens_the_gate() {
        let registry = SessionRegistry::new();
        assert!(registry.begin_finalize(9).await);
        registry.abort_finalize(9).await;
        assert!(registry.begin_finalize(9).await);
    }

    #[tokio::test]
    async fn watcher_claimed_once() {
        let registry = SessionRegistry::new();
        assert!(registry.claim_watcher(3).await);
        assert!(!registry.claim_watcher(3).await);
    }
}
