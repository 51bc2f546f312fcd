// Item selection: shuffled non-repeating rotation for quiz catalogs,
// graph-edge following for adventure catalogs.

use rand::seq::SliceRandom;

use crate::catalog::{Catalog, GameMode};
use crate::session::Session;

/// Pick the item a fresh play-through opens with.
///
/// Adventure play always starts at the catalog root so every run walks the
/// same graph; quiz play draws from the session's shuffled rotation.
pub fn first_item(session: &mut Session, catalog: &Catalog) -> String {
    match catalog.mode {
        GameMode::Quiz => next_item(session, catalog),
        GameMode::Adventure => catalog.root().id.clone(),
    }
}

/// Next quiz item from the session's rotation deck.
///
/// The deck is a shuffled permutation of every item id. When it runs out a
/// new permutation is drawn, with the head swapped away if it would show
/// the item the user just saw, so long play-throughs repeat items but
/// never back-to-back.
pub fn next_item(session: &mut Session, catalog: &Catalog) -> String {
    if session.deck_pos >= session.deck.len() {
        let mut deck: Vec<String> = catalog.item_ids().to_vec();
        deck.shuffle(&mut session.rng);
        if deck.len() > 1 {
            if let Some(current) = session.current_item.as_deref() {
                if deck[0] == current {
                    let last = deck.len() - 1;
                    deck.swap(0, last);
                }
            }
        }
        session.deck = deck;
        session.deck_pos = 0;
    }

    let id = session.deck[session.deck_pos].clone();
    session.deck_pos += 1;
    id
}
