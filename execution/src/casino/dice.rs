//! d100 over/under.
//!
//! `Over` wins on `roll > target`, `Under` on `roll < target`. The payout is the
//! fair multiplier for the winning face count, less the house edge.

use super::{edge_multiplier, registry::GameConfig, GameDetails, GameError, Resolution};
use crate::modifiers::Verdict;
use crate::rng::GameRng;
use serde::{Deserialize, Serialize};

const FACES: u64 = 100;
/// Narrowest and widest allowed winning ranges.
const MIN_WINNING: u64 = 2;
const MAX_WINNING: u64 = 98;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiceDirection {
    Over,
    Under,
}

fn winning_faces(target: u8, direction: DiceDirection) -> u64 {
    let target = target as u64;
    match direction {
        DiceDirection::Over => FACES.saturating_sub(target),
        DiceDirection::Under => target.saturating_sub(1),
    }
}

pub fn resolve(
    target: u8,
    direction: DiceDirection,
    config: &GameConfig,
    rng: &mut GameRng,
) -> Result<Resolution, GameError> {
    let winning = winning_faces(target, direction);
    if !(MIN_WINNING..=MAX_WINNING).contains(&winning) {
        return Err(GameError::InvalidParams(format!(
            "target {target} leaves {winning} winning faces"
        )));
    }
    let win = edge_multiplier(FACES, winning, config.house_edge_bps);
    let roll = rng.between(1, FACES) as u8;
    let won = match direction {
        DiceDirection::Over => roll > target,
        DiceDirection::Under => roll < target,
    };
    Ok(Resolution {
        verdict: if won { Verdict::Win(win) } else { Verdict::Loss },
        details: GameDetails::Dice {
            roll,
            target,
            direction,
        },
        achievements: Vec::new(),
        standard_win: Some(win),
    })
}
