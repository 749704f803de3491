//! HiLo: guess whether the next card is higher or lower than the current one.
//!
//! Cards are drawn WITH replacement, so every rank is equally likely on each draw.
//!
//! - Normal cards (2-Q): Higher wins on >, Lower wins on <, same rank = push (the
//!   card changes, the multiplier does not).
//! - Ace (rank 1): only Higher and Same are valid.
//! - King (rank 13): only Lower and Same are valid.
//!
//! A correct guess multiplies the pot by `13 / winning_ranks`.

use super::{GameError, SessionAction, Step};
use crate::modifiers::Verdict;
use crate::rng::GameRng;
use mora_types::casino::Multiplier;
use serde::Serialize;

const RANKS: u64 = 13;
const ACE: u8 = 1;
const KING: u8 = 13;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Guess {
    Higher,
    Lower,
    Same,
}

/// Multiplier for a correct guess from `current`, or `None` if the guess is not
/// allowed at that rank.
fn guess_multiplier(current: u8, guess: Guess) -> Option<Multiplier> {
    let winning_ranks = match guess {
        Guess::Same if current == ACE || current == KING => 1,
        Guess::Same => return None,
        Guess::Higher if current == KING => return None,
        Guess::Higher => (KING - current) as u64,
        Guess::Lower if current == ACE => return None,
        Guess::Lower => (current - ACE) as u64,
    };
    Some(Multiplier::from_ratio(RANKS, winning_ranks))
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HiLoBoard {
    /// Rank of the face-up card (1-13).
    pub current: u8,
    pub multiplier: Multiplier,
    /// Correct guesses so far.
    pub streak: u32,
    /// Every rank shown, oldest first.
    pub history: Vec<u8>,
}

impl HiLoBoard {
    pub fn new(rng: &mut GameRng) -> Self {
        let current = rng.card_rank();
        Self {
            current,
            multiplier: Multiplier::ONE,
            streak: 0,
            history: vec![current],
        }
    }

    pub fn multiplier(&self) -> Multiplier {
        self.multiplier
    }

    pub(crate) fn act(&mut self, action: &SessionAction, rng: &mut GameRng) -> Result<Step, GameError> {
        let guess = match action {
            SessionAction::Higher => Guess::Higher,
            SessionAction::Lower => Guess::Lower,
            SessionAction::Same => Guess::Same,
            other => return Err(GameError::InvalidMove(format!("{other:?} in hilo"))),
        };
        let factor = guess_multiplier(self.current, guess).ok_or_else(|| {
            GameError::InvalidMove(format!("{guess:?} not allowed at rank {}", self.current))
        })?;

        let previous = self.current;
        let next = rng.card_rank();
        self.current = next;
        self.history.push(next);

        let push = guess != Guess::Same && next == previous;
        if push {
            return Ok(Step::Continue {
                multiplier: self.multiplier,
            });
        }

        let correct = match guess {
            Guess::Higher => next > previous,
            Guess::Lower => next < previous,
            Guess::Same => next == previous,
        };
        if !correct {
            return Ok(Step::Resolved {
                verdict: Verdict::Loss,
            });
        }

        self.multiplier = self.multiplier.compound(factor);
        self.streak += 1;
        Ok(Step::Continue {
            multiplier: self.multiplier,
        })
    }
}
