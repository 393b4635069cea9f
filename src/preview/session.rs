//! Per-editor preview state with last-write-wins semantics.
//!
//! Every render of a session takes a ticket. A render that finishes after a
//! newer one has started is dropped, whatever order the renders complete in.
//! The registry is bounded: finished sessions idle past a time-to-live are
//! pruned, and at capacity the least recently used session is evicted.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;

use super::RenderedPreview;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    seq: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    Loading,
    Ready { preview: RenderedPreview },
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub revision: u64,
    #[serde(flatten)]
    pub state: SessionState,
}

pub const DEFAULT_SESSION_CAPACITY: usize = 256;
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(30 * 60);

struct Entry {
    latest: u64,
    state: SessionState,
    touched: Instant,
    recency: u64,
}

impl Entry {
    fn is_ready(&self) -> bool {
        matches!(self.state, SessionState::Ready { .. })
    }
}

pub struct SessionRegistry {
    next: AtomicU64,
    clock: AtomicU64,
    sessions: Mutex<HashMap<String, Entry>>,
    capacity: usize,
    ttl: Duration,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::with_limits(DEFAULT_SESSION_CAPACITY, DEFAULT_SESSION_TTL)
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(capacity: usize, ttl: Duration) -> Self {
        Self {
            next: AtomicU64::new(0),
            clock: AtomicU64::new(0),
            sessions: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
            ttl,
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Starts a new render for `session_id`, discarding whatever component or
    /// error the session showed before.
    pub fn begin(&self, session_id: &str) -> Ticket {
        let seq = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        let now = Instant::now();
        let mut sessions = self.sessions.lock();

        let ttl = self.ttl;
        sessions.retain(|_, entry| !entry.is_ready() || now.duration_since(entry.touched) < ttl);
        if !sessions.contains_key(session_id) && sessions.len() >= self.capacity {
            evict_least_recent(&mut sessions);
        }

        sessions.insert(
            session_id.to_string(),
            Entry {
                latest: seq,
                state: SessionState::Loading,
                touched: now,
                recency: self.tick(),
            },
        );
        Ticket { seq }
    }

    /// Applies a finished render. Returns false when a newer render has been
    /// started since `ticket` was issued.
    pub fn complete(&self, session_id: &str, ticket: Ticket, preview: RenderedPreview) -> bool {
        let mut sessions = self.sessions.lock();
        match sessions.get_mut(session_id) {
            Some(entry) if entry.latest == ticket.seq => {
                entry.state = SessionState::Ready { preview };
                entry.touched = Instant::now();
                entry.recency = self.tick();
                true
            }
            _ => {
                tracing::debug!(session_id, ticket = ticket.seq, "⏭️ Dropping stale preview");
                false
            }
        }
    }

    pub fn snapshot(&self, session_id: &str) -> Option<SessionSnapshot> {
        let mut sessions = self.sessions.lock();
        sessions.get_mut(session_id).map(|entry| {
            entry.touched = Instant::now();
            entry.recency = self.tick();
            SessionSnapshot {
                session_id: session_id.to_string(),
                revision: entry.latest,
                state: entry.state.clone(),
            }
        })
    }
}

/// Finished sessions go first; an in-flight one is only evicted when every
/// session is still loading.
fn evict_least_recent(sessions: &mut HashMap<String, Entry>) {
    let victim = sessions
        .iter()
        .min_by_key(|(_, entry)| (!entry.is_ready(), entry.recency))
        .map(|(id, _)| id.clone());
    if let Some(id) = victim {
        tracing::debug!(session_id = %id, "🧹 Evicting preview session");
        sessions.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preview::{IsolationLevel, PreviewOutcome};

    fn preview(html: &str) -> RenderedPreview {
        RenderedPreview {
            strategy: IsolationLevel::Trusted,
            html: html.to_string(),
            outcome: PreviewOutcome::Mounted {
                component: "App".into(),
            },
        }
    }

    #[test]
    fn slow_first_render_does_not_overwrite_second() {
        let registry = SessionRegistry::new();
        let first = registry.begin("editor");
        let second = registry.begin("editor");

        assert!(registry.complete("editor", second, preview("second")));
        assert!(!registry.complete("editor", first, preview("first")));

        let snapshot = registry.snapshot("editor").unwrap();
        match snapshot.state {
            SessionState::Ready { preview } => assert_eq!(preview.html, "second"),
            SessionState::Loading => panic!("expected a finished preview"),
        }
    }

    #[test]
    fn begin_resets_to_loading() {
        let registry = SessionRegistry::new();
        let ticket = registry.begin("a");
        registry.complete("a", ticket, preview("done"));
        registry.begin("a");
        assert!(matches!(registry.snapshot("a").unwrap().state, SessionState::Loading));
        assert!(registry.snapshot("b").is_none());
    }

    #[test]
    fn capacity_evicts_the_least_recently_used_finished_session() {
        let registry = SessionRegistry::with_limits(2, DEFAULT_SESSION_TTL);
        let a = registry.begin("a");
        registry.complete("a", a, preview("a"));
        let b = registry.begin("b");
        registry.complete("b", b, preview("b"));
        registry.snapshot("a");

        registry.begin("c");
        assert_eq!(registry.len(), 2);
        assert!(registry.snapshot("a").is_some());
        assert!(registry.snapshot("b").is_none());
        assert!(registry.snapshot("c").is_some());
    }

    #[test]
    fn in_flight_sessions_outlive_finished_ones() {
        let registry = SessionRegistry::with_limits(2, DEFAULT_SESSION_TTL);
        let loading = registry.begin("loading");
        let done = registry.begin("done");
        registry.complete("done", done, preview("done"));

        registry.begin("new");
        assert!(registry.snapshot("done").is_none());
        assert!(registry.complete("loading", loading, preview("late")));
    }

    #[test]
    fn idle_finished_sessions_expire() {
        let registry = SessionRegistry::with_limits(16, Duration::ZERO);
        let ticket = registry.begin("old");
        registry.complete("old", ticket, preview("old"));
        let pending = registry.begin("pending");

        registry.begin("fresh");
        assert!(registry.snapshot("old").is_none());
        assert!(registry.complete("pending", pending, preview("pending")));
        assert_eq!(registry.len(), 2);
    }
}
