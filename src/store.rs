// In-memory session registry, one entry per user id.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::metrics;
use crate::session::Session;

/// A session behind its own lock. The outer store lock covers only map
/// access; holding a SharedSession lock serializes that one user's actions
/// without blocking anyone else.
pub type SharedSession = Arc<Mutex<Session>>;

/// Thread-safe user-id → session map.
#[derive(Debug, Clone)]
pub struct SessionStore {
    inner: Arc<Mutex<HashMap<String, SharedSession>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Fetch the user's session, creating a fresh `AwaitingStart` one if absent.
    pub fn get_or_create(&self, user_id: &str) -> SharedSession {
        let mut map = self.inner.lock().unwrap();
        if let Some(existing) = map.get(user_id) {
            return existing.clone();
        }
        let session = Arc::new(Mutex::new(Session::new(user_id)));
        map.insert(user_id.to_string(), session.clone());
        metrics::ACTIVE_SESSIONS.inc();
        session
    }

    /// Fetch the user's session if one exists. Absence is not an error.
    pub fn get(&self, user_id: &str) -> Option<SharedSession> {
        let map = self.inner.lock().unwrap();
        map.get(user_id).cloned()
    }

    /// Detach the user's session from the store.
    pub fn remove(&self, user_id: &str) -> Option<SharedSession> {
        let mut map = self.inner.lock().unwrap();
        let removed = map.remove(user_id);
        if removed.is_some() {
            metrics::ACTIVE_SESSIONS.dec();
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }

    /// Drop sessions idle longer than `max_idle`. Sessions whose lock is
    /// currently held are in use and are skipped. Returns how many were removed.
    pub fn sweep_idle(&self, max_idle: chrono::Duration) -> usize {
        let mut map = self.inner.lock().unwrap();
        let before = map.len();
        map.retain(|_, entry| match entry.try_lock() {
            Ok(session) => session.idle_for() <= max_idle,
            Err(_) => true,
        });
        let removed = before - map.len();
        if removed > 0 {
            metrics::ACTIVE_SESSIONS.sub(removed as i64);
        }
        removed
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
