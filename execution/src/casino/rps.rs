use super::{GameDetails, Resolution};
use crate::modifiers::Verdict;
use crate::rng::GameRng;
use mora_types::casino::Multiplier;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Hand {
    Rock,
    Paper,
    Scissors,
}

impl Hand {
    const ALL: [Hand; 3] = [Hand::Rock, Hand::Paper, Hand::Scissors];

    pub fn beats(self, other: Hand) -> bool {
        matches!(
            (self, other),
            (Hand::Rock, Hand::Scissors) | (Hand::Paper, Hand::Rock) | (Hand::Scissors, Hand::Paper)
        )
    }
}

/// Winning pays 2x; a tie returns the stake.
pub fn resolve(player: Hand, rng: &mut GameRng) -> Resolution {
    let house = Hand::ALL[rng.below(3) as usize];
    let verdict = if player == house {
        Verdict::Push
    } else if player.beats(house) {
        Verdict::Win(Multiplier::whole(2))
    } else {
        Verdict::Loss
    };
    Resolution {
        verdict,
        details: GameDetails::Rps { player, house },
        achievements: Vec::new(),
        standard_win: Some(Multiplier::whole(2)),
    }
}
