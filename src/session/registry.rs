//! Live stream sessions, for status reporting
//!
//! The registry is the only state shared between server sessions. Each session
//! holds a [`SessionTracker`]; dropping it removes the session.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use crate::codec::CompressionStats;

#[derive(Debug)]
struct SessionEntry {
    peer: String,
    connected_at: DateTime<Utc>,
    frames_sent: AtomicU64,
    frames_encoded: AtomicU64,
    original_bytes: AtomicU64,
    encoded_bytes: AtomicU64,
}

/// Point-in-time view of one session
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub id: Uuid,
    pub peer: String,
    pub connected_at: DateTime<Utc>,
    pub frames_sent: u64,
    pub compression: CompressionStats,
}

/// Concurrent map of active sessions
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<Uuid, Arc<SessionEntry>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a session; it stays listed until the returned tracker is dropped
    pub fn register(&self, peer: impl Into<String>) -> SessionTracker {
        let id = Uuid::new_v4();
        let entry = Arc::new(SessionEntry {
            peer: peer.into(),
            connected_at: Utc::now(),
            frames_sent: AtomicU64::new(0),
            frames_encoded: AtomicU64::new(0),
            original_bytes: AtomicU64::new(0),
            encoded_bytes: AtomicU64::new(0),
        });
        self.sessions.insert(id, entry.clone());

        SessionTracker {
            id,
            entry,
            sessions: self.sessions.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// All sessions, oldest first
    pub fn snapshot(&self) -> Vec<SessionStatus> {
        let mut sessions: Vec<SessionStatus> = self
            .sessions
            .iter()
            .map(|item| status_of(*item.key(), item.value()))
            .collect();
        sessions.sort_by_key(|s| s.connected_at);
        sessions
    }
}

fn status_of(id: Uuid, entry: &SessionEntry) -> SessionStatus {
    SessionStatus {
        id,
        peer: entry.peer.clone(),
        connected_at: entry.connected_at,
        frames_sent: entry.frames_sent.load(Ordering::Relaxed),
        compression: CompressionStats {
            frames_processed: entry.frames_encoded.load(Ordering::Relaxed),
            original_bytes: entry.original_bytes.load(Ordering::Relaxed),
            encoded_bytes: entry.encoded_bytes.load(Ordering::Relaxed),
        },
    }
}

/// Registry handle owned by one session
#[derive(Debug)]
pub struct SessionTracker {
    id: Uuid,
    entry: Arc<SessionEntry>,
    sessions: Arc<DashMap<Uuid, Arc<SessionEntry>>>,
}

impl SessionTracker {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Publish the session's current counters
    pub fn update(&self, frames_sent: u64, stats: &CompressionStats) {
        self.entry.frames_sent.store(frames_sent, Ordering::Relaxed);
        self.entry
            .frames_encoded
            .store(stats.frames_processed, Ordering::Relaxed);
        self.entry
            .original_bytes
            .store(stats.original_bytes, Ordering::Relaxed);
        self.entry
            .encoded_bytes
            .store(stats.encoded_bytes, Ordering::Relaxed);
    }
}

impl Drop for SessionTracker {
    fn drop(&mut self) {
        self.sessions.remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_lifecycle() {
        let registry = SessionRegistry::new();
        assert!(registry.is_empty());

        let first = registry.register("127.0.0.1:50000");
        let second = registry.register("127.0.0.1:50001");
        assert_eq!(registry.len(), 2);

        let mut stats = CompressionStats::default();
        stats.record(5_760, 120);
        first.update(1, &stats);

        let snapshot = registry.snapshot();
        let status = snapshot.iter().find(|s| s.id == first.id()).unwrap();
        assert_eq!(status.peer, "127.0.0.1:50000");
        assert_eq!(status.frames_sent, 1);
        assert_eq!(status.compression, stats);

        drop(first);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.snapshot()[0].id, second.id());

        drop(second);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_snapshot_serializes() {
        let registry = SessionRegistry::new();
        let _tracker = registry.register("peer");
        let json = serde_json::to_value(registry.snapshot()).unwrap();
        assert_eq!(json[0]["peer"], "peer");
        assert_eq!(json[0]["frames_sent"], 0);
        assert_eq!(json[0]["compression"]["encoded_bytes"], 0);
    }
}
