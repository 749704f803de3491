//! Mines on a 5x5 board.
//!
//! Mine positions are fixed when the board is created. Each safe reveal multiplies
//! the pot by `remaining_tiles / remaining_safe`; the house edge is taken once,
//! from the cash-out multiplier.

use super::{GameError, SessionAction, Step};
use crate::modifiers::Verdict;
use crate::rng::GameRng;
use mora_types::casino::{Multiplier, MULTIPLIER_SCALE};
use serde::Serialize;

pub const TILES: u8 = 25;
pub const MIN_MINES: u8 = 1;
pub const MAX_MINES: u8 = 24;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MinesBoard {
    pub mines: u8,
    /// Revealed safe tiles in reveal order.
    pub revealed: Vec<u8>,
    #[serde(skip)]
    mine_mask: u32,
    #[serde(skip)]
    fair: Multiplier,
    #[serde(skip)]
    house_edge_bps: u64,
}

impl MinesBoard {
    pub fn new(mines: u8, house_edge_bps: u64, rng: &mut GameRng) -> Result<Self, GameError> {
        if !(MIN_MINES..=MAX_MINES).contains(&mines) {
            return Err(GameError::InvalidParams(format!(
                "mines must be {MIN_MINES}-{MAX_MINES}, got {mines}"
            )));
        }
        let mut tiles: Vec<u8> = (0..TILES).collect();
        rng.shuffle(&mut tiles);
        let mine_mask = tiles[..mines as usize]
            .iter()
            .fold(0u32, |mask, tile| mask | 1 << *tile);
        Ok(Self {
            mines,
            revealed: Vec::new(),
            mine_mask,
            fair: Multiplier::ONE,
            house_edge_bps,
        })
    }

    pub fn is_mine(&self, tile: u8) -> bool {
        tile < TILES && self.mine_mask & (1 << tile) != 0
    }

    fn safe_remaining(&self) -> u8 {
        TILES - self.mines - self.revealed.len() as u8
    }

    /// Current cash-out multiplier (edge applied once any tile is revealed).
    pub fn multiplier(&self) -> Multiplier {
        if self.revealed.is_empty() {
            return Multiplier::ONE;
        }
        self.fair
            .scale_bps(MULTIPLIER_SCALE.saturating_sub(self.house_edge_bps))
    }

    pub(crate) fn act(&mut self, action: &SessionAction) -> Result<Step, GameError> {
        let SessionAction::Reveal { tile } = *action else {
            return Err(GameError::InvalidMove(format!("{action:?} in mines")));
        };
        if tile >= TILES {
            return Err(GameError::InvalidMove(format!("no tile {tile}")));
        }
        if self.revealed.contains(&tile) {
            return Err(GameError::InvalidMove(format!("tile {tile} already revealed")));
        }
        if self.is_mine(tile) {
            return Ok(Step::Resolved {
                verdict: Verdict::Loss,
            });
        }

        let unrevealed = (TILES - self.revealed.len() as u8) as u64;
        let safe = self.safe_remaining() as u64;
        self.fair = self.fair.compound(Multiplier::from_ratio(unrevealed, safe));
        self.revealed.push(tile);

        if self.safe_remaining() == 0 {
            return Ok(Step::Resolved {
                verdict: Verdict::Win(self.multiplier()),
            });
        }
        Ok(Step::Continue {
            multiplier: self.multiplier(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn safe_tiles(board: &MinesBoard) -> Vec<u8> {
        (0..TILES).filter(|t| !board.is_mine(*t)).collect()
    }

    #[test]
    fn test_mine_count_is_exact() {
        let mut rng = GameRng::from_seed(4);
        for mines in [1, 5, 24] {
            let board = MinesBoard::new(mines, 0, &mut rng).unwrap();
            assert_eq!((0..TILES).filter(|t| board.is_mine(*t)).count(), mines as usize);
        }
        assert!(MinesBoard::new(0, 0, &mut rng).is_err());
        assert!(MinesBoard::new(25, 0, &mut rng).is_err());
    }

    #[test]
    fn test_safe_reveals_compound() {
        let mut rng = GameRng::from_seed(8);
        let mut board = MinesBoard::new(5, 0, &mut rng).unwrap();
        let safe = safe_tiles(&board);
        // 25/20 = 1.25x
        assert_eq!(
            board.act(&SessionAction::Reveal { tile: safe[0] }).unwrap(),
            Step::Continue {
                multiplier: Multiplier(12_500)
            }
        );
        // 1.25 * 24/19
        let step = board.act(&SessionAction::Reveal { tile: safe[1] }).unwrap();
        assert_eq!(
            step,
            Step::Continue {
                multiplier: Multiplier(15_788)
            }
        );
        assert!(board.act(&SessionAction::Reveal { tile: safe[1] }).is_err());
    }

    #[test]
    fn test_mine_hit_loses() {
        let mut rng = GameRng::from_seed(9);
        let mut board = MinesBoard::new(3, 100, &mut rng).unwrap();
        let mine = (0..TILES).find(|t| board.is_mine(*t)).unwrap();
        assert_eq!(
            board.act(&SessionAction::Reveal { tile: mine }).unwrap(),
            Step::Resolved {
                verdict: Verdict::Loss
            }
        );
    }

    #[test]
    fn test_clearing_board_auto_cashes_out() {
        let mut rng = GameRng::from_seed(10);
        let mut board = MinesBoard::new(24, 0, &mut rng).unwrap();
        let safe = safe_tiles(&board);
        assert_eq!(safe.len(), 1);
        assert_eq!(
            board.act(&SessionAction::Reveal { tile: safe[0] }).unwrap(),
            Step::Resolved {
                verdict: Verdict::Win(Multiplier::whole(25))
            }
        );
    }
}
