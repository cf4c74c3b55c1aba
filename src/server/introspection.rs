//! In-process introspection snapshot.
//!
//! No HTTP server is started here — true to the Non-goals' exclusion of
//! the outer JSON-over-HTTP surface — but the snapshot type and its update
//! path are real: a server session publishes its state into a shared
//! `Snapshot` on every request, and whatever embeds this crate can poll or
//! serialize it (e.g. for a test harness, or a future HTTP layer).

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Serialize, Default)]
pub struct SessionState {
    pub session_handle: u32,
    pub peer_addr: String,
    pub requests_served: u64,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct TagState {
    pub name: String,
    pub forced_delay_ms: u64,
    pub induced_error_code: Option<u8>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct Snapshot {
    pub sessions: BTreeMap<u32, SessionState>,
    pub tags: BTreeMap<String, TagState>,
}

/// Shared handle cloned into every connection task; `Arc<RwLock<_>>`
/// because reads (an eventual status endpoint) vastly outnumber writes
/// (one per accepted connection / administrative toggle).
#[derive(Clone, Default)]
pub struct SharedSnapshot(Arc<RwLock<Snapshot>>);

impl SharedSnapshot {
    pub fn new() -> Self {
        SharedSnapshot::default()
    }

    pub async fn record_session(&self, state: SessionState) {
        self.0.write().await.sessions.insert(state.session_handle, state);
    }

    pub async fn remove_session(&self, session_handle: u32) {
        self.0.write().await.sessions.remove(&session_handle);
    }

    pub async fn bump_request_count(&self, session_handle: u32) {
        if let Some(session) = self.0.write().await.sessions.get_mut(&session_handle) {
            session.requests_served += 1;
        }
    }

    pub async fn set_tag_fault(&self, name: &str, forced_delay_ms: u64, induced_error_code: Option<u8>) {
        let mut guard = self.0.write().await;
        let entry = guard.tags.entry(name.to_string()).or_insert_with(|| TagState {
            name: name.to_string(),
            ..Default::default()
        });
        entry.forced_delay_ms = forced_delay_ms;
        entry.induced_error_code = induced_error_code;
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.0.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_and_removes_sessions() {
        let shared = SharedSnapshot::new();
        shared
            .record_session(SessionState {
                session_handle: 7,
                peer_addr: "127.0.0.1:1234".to_string(),
                requests_served: 0,
                enabled: true,
            })
            .await;
        shared.bump_request_count(7).await;
        let snapshot = shared.snapshot().await;
        assert_eq!(snapshot.sessions[&7].requests_served, 1);

        shared.remove_session(7).await;
        assert!(shared.snapshot().await.sessions.is_empty());
    }
}
