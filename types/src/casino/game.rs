use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::MULTIPLIER_SCALE;

/// Every minigame the engine resolves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameKind {
    Coinflip,
    Dice,
    Roulette,
    Slots,
    RockPaperScissors,
    Mines,
    Tower,
    HiLo,
    Scramble,
}

impl GameKind {
    pub const ALL: [GameKind; 9] = [
        GameKind::Coinflip,
        GameKind::Dice,
        GameKind::Roulette,
        GameKind::Slots,
        GameKind::RockPaperScissors,
        GameKind::Mines,
        GameKind::Tower,
        GameKind::HiLo,
        GameKind::Scramble,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GameKind::Coinflip => "coinflip",
            GameKind::Dice => "dice",
            GameKind::Roulette => "roulette",
            GameKind::Slots => "slots",
            GameKind::RockPaperScissors => "rps",
            GameKind::Mines => "mines",
            GameKind::Tower => "tower",
            GameKind::HiLo => "hilo",
            GameKind::Scramble => "scramble",
        }
    }

    /// Multi-step games that hold an active session between start and resolution.
    pub fn is_session(&self) -> bool {
        matches!(
            self,
            GameKind::Mines | GameKind::Tower | GameKind::HiLo | GameKind::Scramble
        )
    }
}

impl fmt::Display for GameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GameKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown game: {s}"))
    }
}

/// The three balances on an account.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Currency {
    Mora,
    Dust,
    Fates,
}

impl Currency {
    pub const ALL: [Currency; 3] = [Currency::Mora, Currency::Dust, Currency::Fates];

    /// Column name in persisted account rows.
    pub fn column(&self) -> &'static str {
        match self {
            Currency::Mora => "mora",
            Currency::Dust => "dust",
            Currency::Fates => "fates",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// Payout multiplier in basis points (10_000 = 1x, total return including stake).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Multiplier(pub u64);

impl Multiplier {
    pub const ZERO: Multiplier = Multiplier(0);
    pub const ONE: Multiplier = Multiplier(MULTIPLIER_SCALE);

    pub const fn from_ratio(numerator: u64, denominator: u64) -> Self {
        if denominator == 0 {
            return Self::ZERO;
        }
        Self(numerator.saturating_mul(MULTIPLIER_SCALE) / denominator)
    }

    pub const fn whole(times: u64) -> Self {
        Self(times.saturating_mul(MULTIPLIER_SCALE))
    }

    pub fn bps(&self) -> u64 {
        self.0
    }

    /// Total return for `bet`, rounded down.
    pub fn apply(&self, bet: u64) -> u64 {
        let product = (bet as u128).saturating_mul(self.0 as u128) / MULTIPLIER_SCALE as u128;
        product.min(u64::MAX as u128) as u64
    }

    /// Compose two multipliers (e.g. successive safe reveals).
    pub fn compound(&self, other: Multiplier) -> Multiplier {
        let product = (self.0 as u128).saturating_mul(other.0 as u128) / MULTIPLIER_SCALE as u128;
        Multiplier(product.min(u64::MAX as u128) as u64)
    }

    /// Scale by `bps` basis points (10_000 leaves the multiplier unchanged).
    pub fn scale_bps(&self, bps: u64) -> Multiplier {
        self.compound(Multiplier(bps))
    }
}
