// Game engine: validates inbound actions against per-user session state and
// produces render-ready turn results.

use std::sync::Arc;

use serde::Serialize;

use crate::catalog::{Catalog, Choice, ChoiceEffect, GameMode, Item, NotFound, END_MARKER};
use crate::metrics;
use crate::selector;
use crate::session::{Session, SessionSnapshot, Stage};
use crate::store::SessionStore;

/// Quiz thresholds. Win is checked before lose when both are met.
#[derive(Debug, Clone, Copy)]
pub struct Rules {
    pub win_at: u32,
    pub lose_at: u32,
}

impl Default for Rules {
    fn default() -> Self {
        Rules {
            win_at: 10,
            lose_at: 5,
        }
    }
}

/// What one action amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Continue,
    Correct,
    Incorrect,
    Won,
    Lost,
    Ended,
}

impl Outcome {
    fn label(self) -> &'static str {
        match self {
            Outcome::Continue => "continue",
            Outcome::Correct => "correct",
            Outcome::Incorrect => "incorrect",
            Outcome::Won => "won",
            Outcome::Lost => "lost",
            Outcome::Ended => "ended",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Outcome::Won | Outcome::Lost | Outcome::Ended)
    }
}

/// A choice as shown to the user. The id is the stable option id even when
/// display order is shuffled.
#[derive(Debug, Clone, Serialize)]
pub struct PresentedChoice {
    pub id: String,
    pub text: String,
}

/// An item as shown to the user for this turn.
#[derive(Debug, Clone, Serialize)]
pub struct PresentedItem {
    pub id: String,
    pub prompt: String,
    pub choices: Vec<PresentedChoice>,
}

/// Running score, shaped per game mode.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum ScoreSnapshot {
    Quiz {
        correct: u32,
        wrong: u32,
        win_at: u32,
        lose_at: u32,
    },
    Adventure {
        score: i32,
        tags: Vec<String>,
    },
}

/// Explanation attached to an answered choice. `correct` is present for
/// graded (quiz) answers only.
#[derive(Debug, Clone, Serialize)]
pub struct Feedback {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct: Option<bool>,
    pub text: String,
}

/// Result of one action: what to render next.
#[derive(Debug, Clone, Serialize)]
pub struct TurnResult {
    pub outcome: Outcome,
    /// Item to present, absent on feedback and terminal turns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item: Option<PresentedItem>,
    pub score: ScoreSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<Feedback>,
}

/// Why an action was not applied. `Stale` is the harmless case: duplicate or
/// out-of-date clicks are ignored and the last rendered turn comes back.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("no active session")]
    NoActiveSession,
    #[error("stale action for item '{item_id}'")]
    Stale {
        item_id: String,
        /// The turn as last shown to this user, unchanged.
        current: Option<Box<TurnResult>>,
    },
    #[error(transparent)]
    NotFound(#[from] NotFound),
}

/// Orchestrates one catalog's play-throughs. Cheap to share behind an `Arc`;
/// all methods take `&self`.
pub struct GameEngine {
    catalog: Arc<Catalog>,
    store: SessionStore,
    rules: Rules,
}

impl GameEngine {
    pub fn new(catalog: Arc<Catalog>, rules: Rules) -> Self {
        GameEngine {
            catalog,
            store: SessionStore::new(),
            rules,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Begin (or restart) a play-through for the user and return the opening
    /// turn. An in-progress session is discarded and replaced.
    pub fn start_session(&self, user_id: &str) -> TurnResult {
        self.start_session_seeded(user_id, rand::random())
    }

    /// Like [`start_session`](Self::start_session) with a fixed RNG seed, so
    /// rotation and display shuffles are reproducible.
    pub fn start_session_seeded(&self, user_id: &str, seed: u64) -> TurnResult {
        let shared = self.store.get_or_create(user_id);
        let mut session = shared.lock().unwrap();

        // Reset in place under the per-user lock; a concurrent action for the
        // same user either fully precedes or fully follows the restart.
        *session = Session::with_seed(user_id, seed);
        session.stage = Stage::InProgress;
        session.step = 1;

        let first = selector::first_item(&mut session, &self.catalog);
        session.current_item = Some(first.clone());

        let item = self
            .catalog
            .get(&first)
            .expect("selector returned an id missing from the catalog");
        let presented = self.present(&mut session, item);
        let turn = TurnResult {
            outcome: Outcome::Continue,
            item: Some(presented),
            score: self.score_snapshot(&session),
            feedback: None,
        };
        session.last_turn = Some(turn.clone());

        metrics::SESSIONS_STARTED_TOTAL
            .with_label_values(&[&self.catalog.name])
            .inc();
        tracing::info!(
            user_id,
            catalog = %self.catalog.name,
            play_id = %session.play_id,
            first_item = %first,
            "Session started"
        );
        turn
    }

    /// Apply the user's answer for `item_id`/`option_id`.
    ///
    /// Quiz: grades the option, checks win before lose, and on a non-terminal
    /// result leaves the session awaiting an advance. Adventure: unions the
    /// option's tags, applies its score delta, and follows its edge.
    pub fn submit_answer(
        &self,
        user_id: &str,
        item_id: &str,
        option_id: &str,
    ) -> Result<TurnResult, ActionError> {
        let shared = self.store.get(user_id).ok_or(ActionError::NoActiveSession)?;
        let mut session = shared.lock().unwrap();
        if session.stage != Stage::InProgress {
            // Terminal sessions are already detached from the store.
            return Err(ActionError::NoActiveSession);
        }

        let current = session
            .current_item
            .clone()
            .ok_or(ActionError::NoActiveSession)?;
        if item_id != current || session.awaiting_advance {
            return Err(self.stale(&session, item_id));
        }

        let item = self.catalog.get(&current)?;
        let Some(choice) = item.choices.iter().find(|c| c.id == option_id) else {
            return Err(self.stale(&session, item_id));
        };
        let choice = choice.clone();

        session.touch();
        session.step += 1;

        let turn = match choice.effect {
            ChoiceEffect::Grade { correct, ref why } => {
                self.apply_graded_answer(&mut session, correct, why)
            }
            ChoiceEffect::Goto {
                ref next,
                ref tags,
                score,
                ref why,
            } => self.apply_branch(&mut session, &choice, next, tags, score, why.as_deref())?,
        };

        session.last_turn = Some(turn.clone());
        if turn.outcome.is_terminal() {
            self.finish(&mut session, turn.outcome);
        }
        Ok(turn)
    }

    /// Quiz "next question" step after a feedback turn. Rejected as stale
    /// unless the session is awaiting an advance for exactly `item_id`.
    pub fn advance(&self, user_id: &str, item_id: &str) -> Result<TurnResult, ActionError> {
        let shared = self.store.get(user_id).ok_or(ActionError::NoActiveSession)?;
        let mut session = shared.lock().unwrap();
        if session.stage != Stage::InProgress {
            return Err(ActionError::NoActiveSession);
        }

        let current = session
            .current_item
            .clone()
            .ok_or(ActionError::NoActiveSession)?;
        if !session.awaiting_advance || item_id != current {
            return Err(self.stale(&session, item_id));
        }

        session.touch();
        session.awaiting_advance = false;
        session.step += 1;

        let next = selector::next_item(&mut session, &self.catalog);
        session.current_item = Some(next.clone());
        let item = self.catalog.get(&next)?;
        let presented = self.present(&mut session, item);

        let turn = TurnResult {
            outcome: Outcome::Continue,
            item: Some(presented),
            score: self.score_snapshot(&session),
            feedback: None,
        };
        session.last_turn = Some(turn.clone());
        Ok(turn)
    }

    /// Read-only session view for rendering. Absent (including just-finished)
    /// sessions are `None`.
    pub fn current_state(&self, user_id: &str) -> Option<SessionSnapshot> {
        let shared = self.store.get(user_id)?;
        let session = shared.lock().unwrap();
        if session.stage != Stage::InProgress {
            return None;
        }
        Some(session.snapshot())
    }

    fn apply_graded_answer(&self, session: &mut Session, correct: bool, why: &str) -> TurnResult {
        if correct {
            session.correct += 1;
        } else {
            session.wrong += 1;
        }
        metrics::ANSWERS_TOTAL
            .with_label_values(&[
                self.catalog.name.as_str(),
                if correct { "correct" } else { "incorrect" },
            ])
            .inc();

        // Win takes priority when both thresholds are met.
        let outcome = if session.correct >= self.rules.win_at {
            Outcome::Won
        } else if session.wrong >= self.rules.lose_at {
            Outcome::Lost
        } else if correct {
            Outcome::Correct
        } else {
            Outcome::Incorrect
        };

        if !outcome.is_terminal() {
            session.awaiting_advance = true;
        }

        TurnResult {
            outcome,
            item: None,
            score: self.score_snapshot(session),
            feedback: Some(Feedback {
                correct: Some(correct),
                text: why.to_string(),
            }),
        }
    }

    fn apply_branch(
        &self,
        session: &mut Session,
        choice: &Choice,
        next: &str,
        tags: &[String],
        score: i32,
        why: Option<&str>,
    ) -> Result<TurnResult, ActionError> {
        for tag in tags {
            session.tags.insert(tag.clone());
        }
        session.score += score;
        metrics::ANSWERS_TOTAL
            .with_label_values(&[self.catalog.name.as_str(), "branch"])
            .inc();

        let feedback = why.map(|text| Feedback {
            correct: None,
            text: text.to_string(),
        });

        if next == END_MARKER {
            tracing::debug!(user_id = %session.user_id, choice = %choice.id, "Choice ends the run");
            session.current_item = None;
            return Ok(TurnResult {
                outcome: Outcome::Ended,
                item: None,
                score: self.score_snapshot(session),
                feedback,
            });
        }

        let next_item = self.catalog.get(next)?;
        session.current_item = Some(next.to_string());
        let presented = self.present(session, next_item);

        // A scene with nothing left to choose is an ending; present its
        // prose one last time.
        let outcome = if next_item.choices.is_empty() {
            Outcome::Ended
        } else {
            Outcome::Continue
        };

        Ok(TurnResult {
            outcome,
            item: Some(presented),
            score: self.score_snapshot(session),
            feedback,
        })
    }

    /// Mark the session terminal and detach it, all under the caller's
    /// per-user lock. Later actions see no session until a fresh start.
    fn finish(&self, session: &mut Session, outcome: Outcome) {
        session.stage = Stage::Terminal;
        self.store.remove(&session.user_id);
        metrics::SESSIONS_COMPLETED_TOTAL
            .with_label_values(&[self.catalog.name.as_str(), outcome.label()])
            .inc();
        tracing::info!(
            user_id = %session.user_id,
            catalog = %self.catalog.name,
            play_id = %session.play_id,
            outcome = outcome.label(),
            correct = session.correct,
            wrong = session.wrong,
            score = session.score,
            "Session finished"
        );
    }

    fn stale(&self, session: &Session, item_id: &str) -> ActionError {
        metrics::STALE_ACTIONS_TOTAL.inc();
        tracing::debug!(
            user_id = %session.user_id,
            item_id,
            current = session.current_item.as_deref().unwrap_or("-"),
            "Ignoring stale action"
        );
        ActionError::Stale {
            item_id: item_id.to_string(),
            current: session.last_turn.clone().map(Box::new),
        }
    }

    /// Build the render view of an item. Quiz choices are shown in an order
    /// drawn from the session RNG; the stable choice ids keep answers
    /// verifiable against what was shown. Adventure choices keep authored
    /// order to preserve narrative continuity.
    fn present(&self, session: &mut Session, item: &Item) -> PresentedItem {
        let mut choices: Vec<PresentedChoice> = item
            .choices
            .iter()
            .map(|c| PresentedChoice {
                id: c.id.clone(),
                text: c.text.clone(),
            })
            .collect();
        if self.catalog.mode == GameMode::Quiz {
            use rand::seq::SliceRandom;
            choices.shuffle(&mut session.rng);
        }
        PresentedItem {
            id: item.id.clone(),
            prompt: item.prompt.clone(),
            choices,
        }
    }

    fn score_snapshot(&self, session: &Session) -> ScoreSnapshot {
        match self.catalog.mode {
            GameMode::Quiz => ScoreSnapshot::Quiz {
                correct: session.correct,
                wrong: session.wrong,
                win_at: self.rules.win_at,
                lose_at: self.rules.lose_at,
            },
            GameMode::Adventure => ScoreSnapshot::Adventure {
                score: session.score,
                tags: session.tags.iter().cloned().collect(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;

    fn quiz_engine(win_at: u32, lose_at: u32) -> GameEngine {
        let json = r#"{
            "name": "quiz",
            "mode": "quiz",
            "items": [
                {"id": "q1", "prompt": "first?", "choices": [
                    {"id": "a", "text": "right", "correct": true, "why": "yes"},
                    {"id": "b", "text": "wrong", "correct": false, "why": "no"}
                ]},
                {"id": "q2", "prompt": "second?", "choices": [
                    {"id": "a", "text": "right", "correct": true, "why": "yes"},
                    {"id": "b", "text": "wrong", "correct": false, "why": "no"}
                ]},
                {"id": "q3", "prompt": "third?", "choices": [
                    {"id": "a", "text": "right", "correct": true, "why": "yes"},
                    {"id": "b", "text": "wrong", "correct": false, "why": "no"}
                ]}
            ]
        }"#;
        let catalog = Catalog::from_json("inline", json).unwrap();
        GameEngine::new(Arc::new(catalog), Rules { win_at, lose_at })
    }

    fn adventure_engine() -> GameEngine {
        let json = r#"{
            "name": "adv",
            "mode": "adventure",
            "items": [
                {"id": "intro", "prompt": "USB on the desk.", "choices": [
                    {"id": "a", "text": "Plug it in", "next": "breach", "tags": ["unsafe_usb_use"], "score": -2},
                    {"id": "b", "text": "Report it", "next": "middle", "tags": ["reported"], "score": 2}
                ]},
                {"id": "middle", "prompt": "IT thanks you.", "choices": [
                    {"id": "a", "text": "Back to work", "next": "safe"}
                ]},
                {"id": "breach", "prompt": "Keylogger installed.", "choices": []},
                {"id": "safe", "prompt": "Crisis averted.", "choices": []}
            ]
        }"#;
        let catalog = Catalog::from_json("inline", json).unwrap();
        GameEngine::new(Arc::new(catalog), Rules::default())
    }

    fn current_item_id(turn: &TurnResult) -> String {
        turn.item.as_ref().expect("turn should carry an item").id.clone()
    }

    #[test]
    fn test_start_presents_first_item() {
        let engine = quiz_engine(10, 5);
        let turn = engine.start_session_seeded("U1", 1);
        assert_eq!(turn.outcome, Outcome::Continue);
        let item = turn.item.expect("opening turn has an item");
        assert_eq!(item.choices.len(), 2);
        match turn.score {
            ScoreSnapshot::Quiz { correct, wrong, win_at, lose_at } => {
                assert_eq!((correct, wrong, win_at, lose_at), (0, 0, 10, 5));
            }
            _ => panic!("quiz engine must report quiz score"),
        }
    }

    #[test]
    fn test_correct_answer_gives_feedback_and_awaits_advance() {
        let engine = quiz_engine(10, 5);
        let turn = engine.start_session_seeded("U1", 1);
        let item = current_item_id(&turn);

        let turn = engine.submit_answer("U1", &item, "a").unwrap();
        assert_eq!(turn.outcome, Outcome::Correct);
        assert!(turn.item.is_none());
        let feedback = turn.feedback.expect("graded answer carries feedback");
        assert_eq!(feedback.correct, Some(true));
        assert_eq!(feedback.text, "yes");

        // Second answer for the same item is a duplicate click
        let err = engine.submit_answer("U1", &item, "a").unwrap_err();
        assert!(matches!(err, ActionError::Stale { .. }));

        // Advance moves on and presents a different item
        let next = engine.advance("U1", &item).unwrap();
        assert_eq!(next.outcome, Outcome::Continue);
        assert_ne!(current_item_id(&next), item);
    }

    #[test]
    fn test_stale_answer_mutates_nothing() {
        let engine = quiz_engine(10, 5);
        let turn = engine.start_session_seeded("U1", 1);
        let item = current_item_id(&turn);

        let err = engine.submit_answer("U1", "some-other-item", "a").unwrap_err();
        match err {
            ActionError::Stale { current, .. } => {
                let replay = current.expect("stale rejection replays the last turn");
                assert_eq!(current_item_id(&replay), item);
            }
            other => panic!("expected Stale, got {other:?}"),
        }

        let snap = engine.current_state("U1").expect("session still live");
        assert_eq!(snap.correct, 0);
        assert_eq!(snap.wrong, 0);
        assert_eq!(snap.current_item.as_deref(), Some(item.as_str()));
    }

    #[test]
    fn test_unknown_option_is_stale() {
        let engine = quiz_engine(10, 5);
        let turn = engine.start_session_seeded("U1", 1);
        let item = current_item_id(&turn);
        let err = engine.submit_answer("U1", &item, "z").unwrap_err();
        assert!(matches!(err, ActionError::Stale { .. }));
    }

    #[test]
    fn test_advance_before_answer_is_stale() {
        let engine = quiz_engine(10, 5);
        let turn = engine.start_session_seeded("U1", 1);
        let item = current_item_id(&turn);
        let err = engine.advance("U1", &item).unwrap_err();
        assert!(matches!(err, ActionError::Stale { .. }));
    }

    #[test]
    fn test_win_checked_before_lose() {
        // With both thresholds at 1 the first correct answer must win.
        let engine = quiz_engine(1, 1);
        let turn = engine.start_session_seeded("U1", 1);
        let item = current_item_id(&turn);
        let turn = engine.submit_answer("U1", &item, "a").unwrap();
        assert_eq!(turn.outcome, Outcome::Won);
    }

    #[test]
    fn test_losing_at_threshold() {
        let engine = quiz_engine(10, 2);
        let turn = engine.start_session_seeded("U1", 1);
        let mut item = current_item_id(&turn);

        let turn = engine.submit_answer("U1", &item, "b").unwrap();
        assert_eq!(turn.outcome, Outcome::Incorrect);
        item = current_item_id(&engine.advance("U1", &item).unwrap());

        let turn = engine.submit_answer("U1", &item, "b").unwrap();
        assert_eq!(turn.outcome, Outcome::Lost);
    }

    #[test]
    fn test_terminal_removes_session_and_restart_is_fresh() {
        let engine = quiz_engine(1, 5);
        let turn = engine.start_session_seeded("U1", 1);
        let item = current_item_id(&turn);
        let turn = engine.submit_answer("U1", &item, "a").unwrap();
        assert_eq!(turn.outcome, Outcome::Won);

        assert!(engine.current_state("U1").is_none());
        let err = engine.submit_answer("U1", &item, "a").unwrap_err();
        assert!(matches!(err, ActionError::NoActiveSession));

        let turn = engine.start_session_seeded("U1", 2);
        assert_eq!(turn.outcome, Outcome::Continue);
        let snap = engine.current_state("U1").unwrap();
        assert_eq!((snap.correct, snap.wrong), (0, 0));
    }

    #[test]
    fn test_answer_without_session() {
        let engine = quiz_engine(10, 5);
        let err = engine.submit_answer("ghost", "q1", "a").unwrap_err();
        assert!(matches!(err, ActionError::NoActiveSession));
        assert!(engine.current_state("ghost").is_none());
    }

    #[test]
    fn test_adventure_branch_accumulates_tags_and_score() {
        let engine = adventure_engine();
        let turn = engine.start_session_seeded("U1", 1);
        assert_eq!(current_item_id(&turn), "intro");

        let turn = engine.submit_answer("U1", "intro", "b").unwrap();
        assert_eq!(turn.outcome, Outcome::Continue);
        assert_eq!(current_item_id(&turn), "middle");
        match &turn.score {
            ScoreSnapshot::Adventure { score, tags } => {
                assert_eq!(*score, 2);
                assert_eq!(tags, &["reported"]);
            }
            _ => panic!("adventure engine must report adventure score"),
        }
    }

    #[test]
    fn test_adventure_zero_choice_item_ends_the_run() {
        let engine = adventure_engine();
        engine.start_session_seeded("U1", 1);
        let turn = engine.submit_answer("U1", "intro", "a").unwrap();
        assert_eq!(turn.outcome, Outcome::Ended);
        assert_eq!(current_item_id(&turn), "breach");
        assert!(engine.current_state("U1").is_none());
    }

    #[test]
    fn test_adventure_choices_keep_authored_order() {
        let engine = adventure_engine();
        let turn = engine.start_session_seeded("U1", 7);
        let ids: Vec<_> = turn
            .item
            .unwrap()
            .choices
            .iter()
            .map(|c| c.id.clone())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_stale_replay_preserves_shuffled_choice_order() {
        let engine = quiz_engine(10, 5);
        let turn = engine.start_session_seeded("U1", 3);
        let shown: Vec<_> = turn
            .item
            .as_ref()
            .unwrap()
            .choices
            .iter()
            .map(|c| c.id.clone())
            .collect();

        let err = engine.submit_answer("U1", "not-current", "a").unwrap_err();
        let ActionError::Stale { current, .. } = err else {
            panic!("expected Stale");
        };
        let replayed: Vec<_> = current
            .unwrap()
            .item
            .unwrap()
            .choices
            .iter()
            .map(|c| c.id.clone())
            .collect();
        assert_eq!(shown, replayed);
    }
}
