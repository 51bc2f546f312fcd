// Per-user play state. Everything here is mutated only under the owning
// user's store entry lock.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use uuid::Uuid;

use crate::engine::TurnResult;

/// Lifecycle stage of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    AwaitingStart,
    InProgress,
    /// Reached a terminal outcome. Terminal sessions are detached from the
    /// store in the same critical section that produced the final turn, so
    /// this stage is only ever observed by a caller that grabbed the entry
    /// before removal.
    Terminal,
}

/// One user's play-through.
#[derive(Debug)]
pub struct Session {
    pub user_id: String,
    /// Fresh per play-through; a restarted game gets a new id.
    pub play_id: Uuid,
    pub stage: Stage,
    /// Id of the item currently presented to the user.
    pub current_item: Option<String>,
    /// Monotone per-session action counter.
    pub step: u64,
    /// Quiz only: set after an answer, cleared by the advance that follows.
    pub awaiting_advance: bool,
    pub correct: u32,
    pub wrong: u32,
    /// Adventure running score (sum of per-choice deltas).
    pub score: i32,
    /// Adventure behavioral tags, deduplicated.
    pub tags: BTreeSet<String>,
    /// Quiz rotation: shuffled permutation of catalog item ids.
    pub deck: Vec<String>,
    pub deck_pos: usize,
    /// Session-scoped RNG; rotation and display shuffles draw from here so
    /// a seeded session replays identically in tests.
    pub rng: StdRng,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    /// The turn most recently rendered for this user. Stale or duplicate
    /// clicks get this back verbatim instead of a re-rendered (and
    /// re-shuffled) turn.
    pub last_turn: Option<TurnResult>,
}

impl Session {
    pub fn new(user_id: &str) -> Self {
        Self::with_seed(user_id, rand::random())
    }

    pub fn with_seed(user_id: &str, seed: u64) -> Self {
        let now = Utc::now();
        Session {
            user_id: user_id.to_string(),
            play_id: Uuid::new_v4(),
            stage: Stage::AwaitingStart,
            current_item: None,
            step: 0,
            awaiting_advance: false,
            correct: 0,
            wrong: 0,
            score: 0,
            tags: BTreeSet::new(),
            deck: Vec::new(),
            deck_pos: 0,
            rng: StdRng::seed_from_u64(seed),
            started_at: now,
            last_activity: now,
            last_turn: None,
        }
    }

    /// Record activity; the idle sweeper keys off this.
    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    pub fn idle_for(&self) -> chrono::Duration {
        Utc::now() - self.last_activity
    }

    /// Read-only view for the boundary layer.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            user_id: self.user_id.clone(),
            play_id: self.play_id,
            stage: self.stage,
            current_item: self.current_item.clone(),
            step: self.step,
            correct: self.correct,
            wrong: self.wrong,
            score: self.score,
            tags: self.tags.iter().cloned().collect(),
            started_at: self.started_at,
            last_activity: self.last_activity,
        }
    }
}

/// Serializable view of a session for rendering.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub user_id: String,
    pub play_id: Uuid,
    pub stage: Stage,
    pub current_item: Option<String>,
    pub step: u64,
    pub correct: u32,
    pub wrong: u32,
    pub score: i32,
    pub tags: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_defaults() {
        let session = Session::new("U123");
        assert_eq!(session.user_id, "U123");
        assert_eq!(session.stage, Stage::AwaitingStart);
        assert_eq!(session.current_item, None);
        assert_eq!(session.correct, 0);
        assert_eq!(session.wrong, 0);
        assert_eq!(session.score, 0);
        assert!(session.tags.is_empty());
        assert!(!session.awaiting_advance);
    }

    #[test]
    fn test_seeded_sessions_share_rng_stream() {
        use rand::Rng;
        let mut a = Session::with_seed("U1", 42);
        let mut b = Session::with_seed("U2", 42);
        let xs: Vec<u32> = (0..4).map(|_| a.rng.gen()).collect();
        let ys: Vec<u32> = (0..4).map(|_| b.rng.gen()).collect();
        assert_eq!(xs, ys);
    }

    #[test]
    fn test_fresh_play_ids() {
        let a = Session::new("U1");
        let b = Session::new("U1");
        assert_ne!(a.play_id, b.play_id);
    }

    #[test]
    fn test_snapshot_sorts_tags() {
        let mut session = Session::new("U1");
        session.tags.insert("weak_password".to_string());
        session.tags.insert("eager_sales".to_string());
        session.tags.insert("weak_password".to_string());

        let snap = session.snapshot();
        assert_eq!(snap.tags, vec!["eager_sales", "weak_password"]);
    }
}
