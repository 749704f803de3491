use super::{edge_multiplier, registry::GameConfig, GameDetails, Resolution};
use crate::modifiers::Verdict;
use crate::rng::GameRng;
use crate::sampler::{Probability, WEIGHT_SCALE};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoinSide {
    Heads,
    Tails,
}

impl CoinSide {
    fn other(self) -> Self {
        match self {
            CoinSide::Heads => CoinSide::Tails,
            CoinSide::Tails => CoinSide::Heads,
        }
    }
}

pub fn resolve(called: CoinSide, config: &GameConfig, rng: &mut GameRng) -> Resolution {
    let win = edge_multiplier(2, 1, config.house_edge_bps);
    let landed = if rng.chance(Probability::from_parts(WEIGHT_SCALE / 2)) {
        called
    } else {
        called.other()
    };
    let verdict = if landed == called {
        Verdict::Win(win)
    } else {
        Verdict::Loss
    };
    Resolution {
        verdict,
        details: GameDetails::Coinflip { called, landed },
        achievements: Vec::new(),
        standard_win: Some(win),
    }
}
