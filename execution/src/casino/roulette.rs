//! European single-zero roulette.

use super::{GameDetails, GameError, Resolution};
use crate::modifiers::Verdict;
use crate::rng::GameRng;
use mora_types::casino::Multiplier;
use serde::{Deserialize, Serialize};

const POCKETS: u64 = 37;
const RED_NUMBERS: [u8; 18] = [1, 3, 5, 7, 9, 12, 14, 16, 18, 19, 21, 23, 25, 27, 30, 32, 34, 36];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum RouletteBet {
    Straight(u8),
    Red,
    Black,
    Odd,
    Even,
    /// 1-18.
    Low,
    /// 19-36.
    High,
    /// 1, 2 or 3.
    Dozen(u8),
}

impl RouletteBet {
    fn validate(self) -> Result<(), GameError> {
        match self {
            RouletteBet::Straight(n) if n > 36 => Err(GameError::InvalidParams(format!(
                "no pocket {n}"
            ))),
            RouletteBet::Dozen(d) if !(1..=3).contains(&d) => Err(GameError::InvalidParams(
                format!("no dozen {d}"),
            )),
            _ => Ok(()),
        }
    }

    /// Total return on a win, stake included.
    pub fn payout(self) -> Multiplier {
        match self {
            RouletteBet::Straight(_) => Multiplier::whole(36),
            RouletteBet::Dozen(_) => Multiplier::whole(3),
            _ => Multiplier::whole(2),
        }
    }

    pub fn wins(self, pocket: u8) -> bool {
        if pocket == 0 {
            return self == RouletteBet::Straight(0);
        }
        match self {
            RouletteBet::Straight(n) => n == pocket,
            RouletteBet::Red => is_red(pocket),
            RouletteBet::Black => !is_red(pocket),
            RouletteBet::Odd => pocket % 2 == 1,
            RouletteBet::Even => pocket % 2 == 0,
            RouletteBet::Low => pocket <= 18,
            RouletteBet::High => pocket >= 19,
            RouletteBet::Dozen(d) => (pocket - 1) / 12 + 1 == d,
        }
    }
}

fn is_red(number: u8) -> bool {
    RED_NUMBERS.contains(&number)
}

pub fn resolve(bet: RouletteBet, rng: &mut GameRng) -> Result<Resolution, GameError> {
    bet.validate()?;
    let pocket = rng.below(POCKETS) as u8;
    Ok(Resolution {
        verdict: if bet.wins(pocket) {
            Verdict::Win(bet.payout())
        } else {
            Verdict::Loss
        },
        details: GameDetails::Roulette { pocket },
        achievements: Vec::new(),
        standard_win: Some(bet.payout()),
    })
}
