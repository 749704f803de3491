//! Tower climb: pick one tile per floor, avoid the traps, cash out any time.

use super::{GameError, SessionAction, Step};
use crate::modifiers::Verdict;
use crate::rng::GameRng;
use mora_types::casino::{Multiplier, MULTIPLIER_SCALE};
use serde::{Deserialize, Serialize};

pub const FLOORS: u8 = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    /// `(tiles per floor, traps per floor)`.
    pub fn layout(self) -> (u8, u8) {
        match self {
            Difficulty::Easy => (4, 1),
            Difficulty::Medium => (3, 1),
            Difficulty::Hard => (3, 2),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TowerBoard {
    pub difficulty: Difficulty,
    /// Floors cleared so far.
    pub floor: u8,
    #[serde(skip)]
    traps: Vec<u8>,
    #[serde(skip)]
    house_edge_bps: u64,
}

impl TowerBoard {
    pub fn new(difficulty: Difficulty, house_edge_bps: u64, rng: &mut GameRng) -> Self {
        let (tiles, traps) = difficulty.layout();
        let floors = (0..FLOORS)
            .map(|_| {
                let mut columns: Vec<u8> = (0..tiles).collect();
                rng.shuffle(&mut columns);
                columns[..traps as usize]
                    .iter()
                    .fold(0u8, |mask, column| mask | 1 << *column)
            })
            .collect();
        Self {
            difficulty,
            floor: 0,
            traps: floors,
            house_edge_bps,
        }
    }

    pub fn is_trap(&self, floor: u8, column: u8) -> bool {
        self.traps
            .get(floor as usize)
            .zip(1u8.checked_shl(u32::from(column)))
            .is_some_and(|(mask, bit)| mask & bit != 0)
    }

    fn floor_factor(&self) -> Multiplier {
        let (tiles, traps) = self.difficulty.layout();
        Multiplier::from_ratio(tiles as u64, (tiles - traps) as u64)
    }

    pub fn multiplier(&self) -> Multiplier {
        if self.floor == 0 {
            return Multiplier::ONE;
        }
        let factor = self.floor_factor();
        let fair = (0..self.floor).fold(Multiplier::ONE, |acc, _| acc.compound(factor));
        fair.scale_bps(MULTIPLIER_SCALE.saturating_sub(self.house_edge_bps))
    }

    pub(crate) fn act(&mut self, action: &SessionAction) -> Result<Step, GameError> {
        let SessionAction::Climb { column } = *action else {
            return Err(GameError::InvalidMove(format!("{action:?} in tower")));
        };
        let (tiles, _) = self.difficulty.layout();
        if column >= tiles {
            return Err(GameError::InvalidMove(format!("no column {column}")));
        }
        if self.is_trap(self.floor, column) {
            return Ok(Step::Resolved {
                verdict: Verdict::Loss,
            });
        }
        self.floor += 1;
        if self.floor == FLOORS {
            return Ok(Step::Resolved {
                verdict: Verdict::Win(self.multiplier()),
            });
        }
        Ok(Step::Continue {
            multiplier: self.multiplier(),
        })
    }
}
