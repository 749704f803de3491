use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error as ThisError;

use super::{required_exp, Currency};

/// Opaque stable user identifier (a chat-platform snowflake).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for UserId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

#[derive(Debug, ThisError, PartialEq, Eq)]
pub enum ProgressionInvariantError {
    #[error("current_exp {current_exp} not below required {required} at level {level}")]
    ExpNotRolledOver {
        level: u32,
        current_exp: u64,
        required: u64,
    },
}

/// Currency balances for one user.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Account {
    pub user: UserId,
    /// Primary currency.
    pub mora: u64,
    /// Secondary currency ("dust").
    pub dust: u64,
    /// Premium tokens ("fates").
    pub fates: u64,
}

impl Account {
    pub fn new(user: UserId) -> Self {
        Self {
            user,
            mora: super::INITIAL_MORA,
            dust: 0,
            fates: 0,
        }
    }

    pub fn balance(&self, currency: Currency) -> u64 {
        match currency {
            Currency::Mora => self.mora,
            Currency::Dust => self.dust,
            Currency::Fates => self.fates,
        }
    }

    pub fn balance_mut(&mut self, currency: Currency) -> &mut u64 {
        match currency {
            Currency::Mora => &mut self.mora,
            Currency::Dust => &mut self.dust,
            Currency::Fates => &mut self.fates,
        }
    }
}

/// A positive item count held by a user. Zero-quantity rows never persist.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryEntry {
    pub user: UserId,
    pub item: String,
    pub quantity: u64,
}

/// Level and EXP towards the next level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProgressionRecord {
    pub level: u32,
    pub current_exp: u64,
}

impl ProgressionRecord {
    pub fn required_exp(&self) -> u64 {
        required_exp(self.level)
    }

    pub fn validate_invariants(&self) -> Result<(), ProgressionInvariantError> {
        let required = self.required_exp();
        if self.current_exp >= required {
            return Err(ProgressionInvariantError::ExpNotRolledOver {
                level: self.level,
                current_exp: self.current_exp,
                required,
            });
        }
        Ok(())
    }
}

/// Last attempt of a cooldown-gated action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CooldownRecord {
    /// Unix seconds of the last attempt.
    pub last_action_at: u64,
    /// Whether the last attempt succeeded; selects the cooldown length.
    pub last_success: bool,
}
