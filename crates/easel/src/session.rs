//! Session tracking for the HTTP transport.
//!
//! Sessions are identified by the `Mcp-Session-Id` header. A request with an
//! unknown or missing id gets a fresh session; idle sessions are swept by a
//! background task.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use uuid::Uuid;

use crate::types::protocol::Implementation;

#[derive(Debug)]
pub struct Session {
    pub id: String,
    pub created_at: Instant,
    pub last_seen: Instant,
    pub initialized: bool,
    pub client_info: Option<Implementation>,
}

impl Session {
    fn new(id: String) -> Self {
        let now = Instant::now();
        Self {
            id,
            created_at: now,
            last_seen: now,
            initialized: false,
            client_info: None,
        }
    }
}

/// Pluggable session storage.
pub trait SessionStore: Send + Sync {
    /// Return the session for `hint`, creating one (with that id, or a fresh
    /// UUID when no hint is given) if it does not exist.
    fn get_or_create(&self, hint: Option<&str>) -> String;

    /// Update the activity timestamp.
    fn touch(&self, id: &str);

    /// Record a completed initialize handshake.
    fn set_initialized(&self, id: &str, client_info: Implementation);

    /// Drop a session explicitly.
    fn remove(&self, id: &str);

    /// Drop sessions idle longer than `max_idle`; returns how many.
    fn cleanup(&self, max_idle: Duration) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory store backed by a `DashMap`.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: DashMap<String, Session>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl SessionStore for InMemorySessionStore {
    fn get_or_create(&self, hint: Option<&str>) -> String {
        if let Some(id) = hint {
            if self.sessions.contains_key(id) {
                return id.to_string();
            }
        }
        let id = hint
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        self.sessions.insert(id.clone(), Session::new(id.clone()));
        tracing::debug!(session_id = %id, "created session");
        id
    }

    fn touch(&self, id: &str) {
        if let Some(mut session) = self.sessions.get_mut(id) {
            session.last_seen = Instant::now();
        }
    }

    fn set_initialized(&self, id: &str, client_info: Implementation) {
        if let Some(mut session) = self.sessions.get_mut(id) {
            session.initialized = true;
            session.client_info = Some(client_info);
        }
    }

    fn remove(&self, id: &str) {
        self.sessions.remove(id);
    }

    fn cleanup(&self, max_idle: Duration) -> usize {
        let before = self.sessions.len();
        self.sessions
            .retain(|_, session| session.last_seen.elapsed() < max_idle);
        before - self.sessions.len()
    }

    fn len(&self) -> usize {
        self.sessions.len()
    }
}

/// Sweep idle sessions on an interval until the server shuts down.
pub fn spawn_cleanup_task(
    store: Arc<dyn SessionStore>,
    every: Duration,
    max_idle: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            let removed = store.cleanup(max_idle);
            if removed > 0 {
                tracing::debug!(removed, "expired idle sessions");
            }
        }
    })
}
