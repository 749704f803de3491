//! Game registry for managing available games and their configurations.
//!
//! The registry provides:
//! - Centralized listing of supported games
//! - Per-game configuration (bet limits, house edge, modifier tuning, EXP, timeouts)
//! - Active/inactive game filtering
//!
//! # Example
//! ```rust,ignore
//! use mora_execution::casino::registry::GameRegistry;
//! use mora_types::GameKind;
//!
//! let registry = GameRegistry::new()?;
//! assert!(registry.is_active(GameKind::Slots));
//! let config = registry.get_config(GameKind::Slots).unwrap();
//! assert_eq!(config.limits.min, 10);
//! ```

use super::scramble::ScrambleRules;
use super::slots::SlotsRules;
use super::GameError;
use crate::modifiers::ModifierPolicy;
use crate::sampler::{Probability, TableError};
use mora_types::casino::GameKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(90);

/// Allowed bet range. `premium_max` replaces `max` for premium accounts; admin
/// accounts skip the maximum entirely.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BetLimits {
    pub min: u64,
    pub max: u64,
    pub premium_max: u64,
}

impl BetLimits {
    pub const fn new(min: u64, max: u64, premium_max: u64) -> Self {
        Self {
            min,
            max,
            premium_max,
        }
    }

    pub fn max_for(&self, premium: bool) -> u64 {
        if premium {
            self.premium_max.max(self.max)
        } else {
            self.max
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.min == 0 {
            return Err("minimum bet must be positive".to_string());
        }
        if self.min > self.max {
            return Err(format!("minimum {} above maximum {}", self.min, self.max));
        }
        Ok(())
    }
}

/// What a session timeout does.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutPolicy {
    /// Settle at current progress (stake back if nothing was won yet).
    CashOut,
    /// Treat as a loss.
    Forfeit,
}

/// Game-specific rule data.
#[derive(Clone, Debug)]
pub enum GameRules {
    Standard,
    Slots(SlotsRules),
    Scramble(ScrambleRules),
}

/// Per-game configuration values.
#[derive(Clone, Debug)]
pub struct GameConfig {
    pub kind: GameKind,
    pub limits: BetLimits,
    /// Edge deducted from fair multipliers, in basis points.
    pub house_edge_bps: u64,
    pub modifiers: ModifierPolicy,
    /// EXP for every resolved play.
    pub play_exp: u64,
    /// Extra EXP on a win.
    pub win_exp: u64,
    pub session_timeout: Duration,
    pub timeout_policy: TimeoutPolicy,
    pub rules: GameRules,
}

impl GameConfig {
    /// Create a default configuration for a game.
    pub fn default_for(kind: GameKind) -> Result<Self, TableError> {
        let standard = Self {
            kind,
            limits: BetLimits::new(10, 50_000, 250_000),
            house_edge_bps: 0,
            modifiers: ModifierPolicy::default(),
            play_exp: 5,
            win_exp: 20,
            session_timeout: DEFAULT_SESSION_TIMEOUT,
            timeout_policy: TimeoutPolicy::CashOut,
            rules: GameRules::Standard,
        };
        let config = match kind {
            GameKind::Coinflip | GameKind::RockPaperScissors | GameKind::Roulette => standard,
            GameKind::Dice => Self {
                house_edge_bps: 100,
                ..standard
            },
            GameKind::Slots => Self {
                rules: GameRules::Slots(SlotsRules::standard()?),
                ..standard
            },
            GameKind::Mines | GameKind::Tower => Self {
                house_edge_bps: 100,
                win_exp: 30,
                ..standard
            },
            GameKind::HiLo => Self {
                limits: BetLimits::new(10, 25_000, 100_000),
                win_exp: 30,
                ..standard
            },
            GameKind::Scramble => Self {
                limits: BetLimits::new(10, 10_000, 50_000),
                modifiers: ModifierPolicy {
                    premium_reroll: Probability::NEVER,
                    lucky_charm: None,
                    ..ModifierPolicy::default()
                },
                timeout_policy: TimeoutPolicy::Forfeit,
                rules: GameRules::Scramble(ScrambleRules::default()),
                ..standard
            },
        };
        Ok(config)
    }
}

/// Registry of game configurations.
#[derive(Clone, Debug)]
pub struct GameRegistry {
    configs: HashMap<GameKind, GameConfig>,
    active: HashMap<GameKind, bool>,
}

impl GameRegistry {
    /// Create a new registry with all games using default configurations.
    pub fn new() -> Result<Self, TableError> {
        let mut configs = HashMap::new();
        let mut active = HashMap::new();

        for &kind in Self::all_game_kinds() {
            configs.insert(kind, GameConfig::default_for(kind)?);
            active.insert(kind, true);
        }

        Ok(Self { configs, active })
    }

    /// List all supported games.
    pub fn all_game_kinds() -> &'static [GameKind] {
        &GameKind::ALL
    }

    pub fn get_config(&self, kind: GameKind) -> Option<&GameConfig> {
        self.configs.get(&kind)
    }

    pub fn set_config(&mut self, config: GameConfig) -> Result<(), GameError> {
        config.limits.validate().map_err(GameError::InvalidParams)?;
        self.configs.insert(config.kind, config);
        Ok(())
    }

    pub fn set_limits(&mut self, kind: GameKind, limits: BetLimits) -> Result<(), GameError> {
        limits.validate().map_err(GameError::InvalidParams)?;
        if let Some(config) = self.configs.get_mut(&kind) {
            config.limits = limits;
        }
        Ok(())
    }

    /// Apply one timeout to every session game.
    pub fn set_session_timeout(&mut self, timeout: Duration) {
        for config in self.configs.values_mut() {
            config.session_timeout = timeout;
        }
    }

    pub fn is_active(&self, kind: GameKind) -> bool {
        self.active.get(&kind).copied().unwrap_or(false)
    }

    pub fn set_active(&mut self, kind: GameKind, active: bool) {
        self.active.insert(kind, active);
    }

    pub fn active_games(&self) -> Vec<GameKind> {
        Self::all_game_kinds()
            .iter()
            .copied()
            .filter(|kind| self.is_active(*kind))
            .collect()
    }
}
