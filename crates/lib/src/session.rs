//! Per-session workflow state and the in-memory store that owns it.
//!
//! Sessions are keyed by id. Each holds one `SessionContext` behind its own async mutex;
//! handlers hold that lock for the whole phase so one session's phases never interleave.
//!
//! The page ends its session with DELETE on `pagehide`. Tabs that vanish without it are
//! swept on the next `create` once idle past the store's timeout.

use crate::phases::ImpactMetrics;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};

/// Unique session identifier (opaque string).
pub type SessionId = String;

/// Outputs of the three phases for one session. Fields are only written by a successful phase run.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    pub diagnosis_text: Option<String>,
    pub firmware_text: Option<String>,
    pub impact: Option<ImpactMetrics>,
}

impl SessionContext {
    /// Phase 1 has produced a diagnosis. Gates impact estimation and the report.
    pub fn phase1_complete(&self) -> bool {
        self.diagnosis_text.is_some()
    }

    pub fn view(&self, id: &str) -> SessionView {
        SessionView {
            session_id: id.to_string(),
            phase1_complete: self.phase1_complete(),
            diagnosis_text: self.diagnosis_text.clone(),
            firmware_text: self.firmware_text.clone(),
            impact: self.impact.clone(),
            report_filename: crate::report::report_filename(self),
        }
    }
}

/// Wire view of a session for the page.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub session_id: SessionId,
    pub phase1_complete: bool,
    pub diagnosis_text: Option<String>,
    pub firmware_text: Option<String>,
    pub impact: Option<ImpactMetrics>,
    /// Set once a report can be downloaded.
    pub report_filename: Option<&'static str>,
}

pub type SessionHandle = Arc<Mutex<SessionContext>>;

struct Entry {
    handle: SessionHandle,
    last_used: Instant,
}

/// In-memory store for sessions (create, get, remove).
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<SessionId, Entry>>>,
    idle_timeout: Option<Duration>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    /// Store whose sessions never expire.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            idle_timeout: None,
        }
    }

    /// Store that drops sessions unused for `idle` (checked when a session is created).
    pub fn with_idle_timeout(idle: Duration) -> Self {
        Self {
            idle_timeout: Some(idle),
            ..Self::new()
        }
    }

    /// Create a new empty session with a generated id; returns the session id.
    pub async fn create(&self) -> SessionId {
        let id = format!("sess-{}", uuid::Uuid::new_v4());
        let mut map = self.inner.write().await;
        if let Some(idle) = self.idle_timeout {
            let before = map.len();
            // A handle cloned out by a running handler keeps its session alive.
            map.retain(|_, e| e.last_used.elapsed() < idle || Arc::strong_count(&e.handle) > 1);
            if map.len() < before {
                log::debug!("expired {} idle session(s)", before - map.len());
            }
        }
        map.insert(
            id.clone(),
            Entry {
                handle: Arc::new(Mutex::new(SessionContext::default())),
                last_used: Instant::now(),
            },
        );
        id
    }

    /// Handle to the session's context if it exists. Counts as activity for idle expiry.
    pub async fn get(&self, id: &str) -> Option<SessionHandle> {
        let mut map = self.inner.write().await;
        let entry = map.get_mut(id)?;
        entry.last_used = Instant::now();
        Some(entry.handle.clone())
    }

    /// End a session; returns false if it did not exist.
    pub async fn remove(&self, id: &str) -> bool {
        self.inner.write().await.remove(id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
