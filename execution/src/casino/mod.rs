//! Minigame resolvers.
//!
//! Instant games map `(params, rng)` to a [`Resolution`] in one call. Session games
//! hold a [`Board`] that advances through [`SessionAction`]s until it resolves or is
//! cashed out. Resolvers never touch the ledger; they only produce verdicts that
//! the modifier pipeline and settlement engine act on.
//!
//! Loot and cooldown-gated actions (chests, wishes, robbery, daily) live alongside
//! the games because they share the sampler and settlement path.

pub mod chest;
pub mod coinflip;
pub mod daily;
pub mod dice;
pub mod hilo;
pub mod mines;
pub mod registry;
pub mod rob;
pub mod roulette;
pub mod rps;
pub mod scramble;
pub mod slots;
pub mod tower;
pub mod wish;

use crate::modifiers::Verdict;
use crate::rng::GameRng;
use mora_types::casino::{CooldownRecord, GameKind, Multiplier, MULTIPLIER_SCALE};
use registry::{GameConfig, GameRules};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub use coinflip::CoinSide;
pub use dice::DiceDirection;
pub use hilo::HiLoBoard;
pub use mines::MinesBoard;
pub use roulette::RouletteBet;
pub use rps::Hand;
pub use scramble::ScrambleBoard;
pub use slots::Symbol;
pub use tower::{Difficulty, TowerBoard};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GameError {
    #[error("invalid parameters: {0}")]
    InvalidParams(String),
    #[error("invalid move: {0}")]
    InvalidMove(String),
    #[error("{0} is not an instant game")]
    NotInstant(GameKind),
    #[error("{0} is not a session game")]
    NotSession(GameKind),
    #[error("parameters do not match {0}")]
    ParamsMismatch(GameKind),
}

/// Player choices made when a game starts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "game", rename_all = "snake_case")]
pub enum GameParams {
    Coinflip { side: CoinSide },
    Dice { target: u8, direction: DiceDirection },
    Roulette { bet: RouletteBet },
    Slots,
    Rps { hand: Hand },
    Mines { mines: u8 },
    Tower { difficulty: Difficulty },
    #[serde(rename = "hilo")]
    HiLo,
    Scramble,
}

impl GameParams {
    pub fn kind(&self) -> GameKind {
        match self {
            GameParams::Coinflip { .. } => GameKind::Coinflip,
            GameParams::Dice { .. } => GameKind::Dice,
            GameParams::Roulette { .. } => GameKind::Roulette,
            GameParams::Slots => GameKind::Slots,
            GameParams::Rps { .. } => GameKind::RockPaperScissors,
            GameParams::Mines { .. } => GameKind::Mines,
            GameParams::Tower { .. } => GameKind::Tower,
            GameParams::HiLo => GameKind::HiLo,
            GameParams::Scramble => GameKind::Scramble,
        }
    }
}

/// Reveal of an instant game.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "game", rename_all = "snake_case")]
pub enum GameDetails {
    Coinflip { called: CoinSide, landed: CoinSide },
    Dice { roll: u8, target: u8, direction: DiceDirection },
    Roulette { pocket: u8 },
    Slots { reels: [Symbol; 3] },
    Rps { player: Hand, house: Hand },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub verdict: Verdict,
    pub details: GameDetails,
    /// Game-specific achievements earned by this draw.
    pub achievements: Vec<&'static str>,
    /// Win a modifier may convert a loss into.
    pub standard_win: Option<Multiplier>,
}

/// Resolve an instant game.
pub fn resolve_instant(
    params: &GameParams,
    config: &GameConfig,
    rng: &mut GameRng,
) -> Result<Resolution, GameError> {
    match (params, &config.rules) {
        (GameParams::Coinflip { side }, _) => Ok(coinflip::resolve(*side, config, rng)),
        (GameParams::Dice { target, direction }, _) => {
            dice::resolve(*target, *direction, config, rng)
        }
        (GameParams::Roulette { bet }, _) => roulette::resolve(*bet, rng),
        (GameParams::Slots, GameRules::Slots(rules)) => Ok(slots::resolve(rules, rng)),
        (GameParams::Slots, _) => Err(GameError::ParamsMismatch(GameKind::Slots)),
        (GameParams::Rps { hand }, _) => Ok(rps::resolve(*hand, rng)),
        (other, _) => Err(GameError::NotInstant(other.kind())),
    }
}

/// In-progress state of a multi-step game.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "game", rename_all = "snake_case")]
pub enum Board {
    Mines(MinesBoard),
    Tower(TowerBoard),
    #[serde(rename = "hilo")]
    HiLo(HiLoBoard),
    Scramble(ScrambleBoard),
}

/// A player move inside a session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SessionAction {
    /// Mines: uncover a tile (0-based, row-major).
    Reveal { tile: u8 },
    /// Tower: pick a tile on the next floor.
    Climb { column: u8 },
    Higher,
    Lower,
    Same,
    /// Scramble: attempt the word.
    Guess { word: String },
    Hint,
    Skip,
    CashOut,
}

/// Result of one session action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    /// Still active; `multiplier` is what a cash-out would pay now.
    Continue { multiplier: Multiplier },
    Resolved { verdict: Verdict },
}

impl Board {
    pub fn start(
        params: &GameParams,
        config: &GameConfig,
        rng: &mut GameRng,
    ) -> Result<Board, GameError> {
        match (params, &config.rules) {
            (GameParams::Mines { mines }, _) => {
                MinesBoard::new(*mines, config.house_edge_bps, rng).map(Board::Mines)
            }
            (GameParams::Tower { difficulty }, _) => Ok(Board::Tower(TowerBoard::new(
                *difficulty,
                config.house_edge_bps,
                rng,
            ))),
            (GameParams::HiLo, _) => Ok(Board::HiLo(HiLoBoard::new(rng))),
            (GameParams::Scramble, GameRules::Scramble(rules)) => {
                ScrambleBoard::new(rules, rng).map(Board::Scramble)
            }
            (GameParams::Scramble, _) => Err(GameError::ParamsMismatch(GameKind::Scramble)),
            (other, _) => Err(GameError::NotSession(other.kind())),
        }
    }

    pub fn kind(&self) -> GameKind {
        match self {
            Board::Mines(_) => GameKind::Mines,
            Board::Tower(_) => GameKind::Tower,
            Board::HiLo(_) => GameKind::HiLo,
            Board::Scramble(_) => GameKind::Scramble,
        }
    }

    pub fn act(&mut self, action: &SessionAction, rng: &mut GameRng) -> Result<Step, GameError> {
        if *action == SessionAction::CashOut {
            return Ok(Step::Resolved {
                verdict: self.cash_out()?,
            });
        }
        match self {
            Board::Mines(board) => board.act(action),
            Board::Tower(board) => board.act(action),
            Board::HiLo(board) => board.act(action, rng),
            Board::Scramble(board) => board.act(action, rng),
        }
    }

    /// Verdict for settling at current progress.
    pub fn cash_out(&self) -> Result<Verdict, GameError> {
        match self {
            Board::Mines(board) => Ok(progress_verdict(board.multiplier())),
            Board::Tower(board) => Ok(progress_verdict(board.multiplier())),
            Board::HiLo(board) => Ok(progress_verdict(board.multiplier())),
            Board::Scramble(_) => Err(GameError::InvalidMove(
                "scramble cannot be cashed out".to_string(),
            )),
        }
    }

    /// Win a lucky charm or premium re-roll turns a losing move into: the progress
    /// reached before it, or the word's payout in scramble. `None` without progress.
    pub fn standard_win(&self) -> Option<Multiplier> {
        let multiplier = match self {
            Board::Mines(board) => board.multiplier(),
            Board::Tower(board) => board.multiplier(),
            Board::HiLo(board) => board.multiplier(),
            Board::Scramble(board) => board.multiplier(),
        };
        (multiplier > Multiplier::ONE).then_some(multiplier)
    }
}

/// Zero progress returns the stake.
pub(crate) fn progress_verdict(multiplier: Multiplier) -> Verdict {
    if multiplier > Multiplier::ONE {
        Verdict::Win(multiplier)
    } else {
        Verdict::Push
    }
}

/// Fair multiplier for a `winning / total` chance, less the house edge.
pub(crate) fn edge_multiplier(total: u64, winning: u64, house_edge_bps: u64) -> Multiplier {
    if winning == 0 {
        return Multiplier::ZERO;
    }
    let keep = MULTIPLIER_SCALE.saturating_sub(house_edge_bps);
    Multiplier::from_ratio(total, winning).scale_bps(keep)
}

/// Time left before `record` allows another attempt. The cooldown length may
/// depend on whether the last attempt succeeded.
pub(crate) fn cooldown_remaining(
    record: Option<CooldownRecord>,
    now: u64,
    cooldown_for: impl Fn(bool) -> Duration,
) -> Option<Duration> {
    let record = record?;
    let ready_at = record
        .last_action_at
        .saturating_add(cooldown_for(record.last_success).as_secs());
    (ready_at > now).then(|| Duration::from_secs(ready_at - now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use registry::GameRegistry;

    #[test]
    fn test_cooldown_remaining_depends_on_outcome() {
        let length = |success: bool| Duration::from_secs(if success { 60 } else { 120 });
        assert_eq!(cooldown_remaining(None, 1_000, length), None);
        let won = CooldownRecord {
            last_action_at: 1_000,
            last_success: true,
        };
        assert_eq!(
            cooldown_remaining(Some(won), 1_030, length),
            Some(Duration::from_secs(30))
        );
        assert_eq!(cooldown_remaining(Some(won), 1_060, length), None);
        let lost = CooldownRecord {
            last_success: false,
            ..won
        };
        assert_eq!(
            cooldown_remaining(Some(lost), 1_060, length),
            Some(Duration::from_secs(60))
        );
    }

    #[test]
    fn test_edge_multiplier() {
        assert_eq!(edge_multiplier(2, 1, 0), Multiplier::whole(2));
        assert_eq!(edge_multiplier(100, 50, 100), Multiplier(19_800));
        assert_eq!(edge_multiplier(10, 0, 0), Multiplier::ZERO);
    }

    #[test]
    fn test_standard_win_follows_progress() {
        let registry = GameRegistry::new().unwrap();
        let config = registry.get_config(GameKind::Mines).unwrap();
        let mut rng = GameRng::from_seed(4);
        let mut board = Board::start(&GameParams::Mines { mines: 3 }, config, &mut rng).unwrap();
        assert_eq!(board.standard_win(), None);

        let Board::Mines(mines) = &board else {
            panic!("expected mines");
        };
        let safe = (0..25).find(|tile| !mines.is_mine(*tile)).unwrap();
        let Step::Continue { multiplier } = board.act(&SessionAction::Reveal { tile: safe }, &mut rng).unwrap() else {
            panic!("one safe reveal cannot clear the board");
        };
        assert_eq!(board.standard_win(), Some(multiplier));
    }

    #[test]
    fn test_progress_verdict_pushes_without_progress() {
        assert_eq!(progress_verdict(Multiplier::ONE), Verdict::Push);
        assert_eq!(
            progress_verdict(Multiplier(15_000)),
            Verdict::Win(Multiplier(15_000))
        );
    }

    #[test]
    fn test_params_kind_routes_instant_and_session() {
        let registry = GameRegistry::new().unwrap();
        let mut rng = GameRng::from_seed(1);
        let mines = GameParams::Mines { mines: 3 };
        let config = registry.get_config(GameKind::Mines).unwrap();
        assert_eq!(
            resolve_instant(&mines, config, &mut rng).unwrap_err(),
            GameError::NotInstant(GameKind::Mines)
        );
        let flip = GameParams::Coinflip {
            side: CoinSide::Heads,
        };
        let config = registry.get_config(GameKind::Coinflip).unwrap();
        assert_eq!(
            Board::start(&flip, config, &mut rng).unwrap_err(),
            GameError::NotSession(GameKind::Coinflip)
        );
    }

    #[test]
    fn test_params_serde_shape() {
        let params: GameParams =
            serde_json::from_str(r#"{"game":"dice","target":50,"direction":"over"}"#).unwrap();
        assert_eq!(
            params,
            GameParams::Dice {
                target: 50,
                direction: DiceDirection::Over
            }
        );
        let hilo: GameParams = serde_json::from_str(r#"{"game":"hilo"}"#).unwrap();
        assert_eq!(hilo.kind(), GameKind::HiLo);
    }
}
