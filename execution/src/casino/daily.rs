//! Daily claim.

use super::cooldown_remaining;
use crate::settlement::{apply_effect, Retryable, SettleError, SettlementResult};
use crate::state::{signed, LedgerTx, StoreError};
use mora_types::casino::{CooldownRecord, Currency, EconomicEffect, UserId, ACTION_DAILY};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ClaimError {
    #[error("daily already claimed, next claim in {}s", remaining.as_secs())]
    OnCooldown { remaining: Duration },
    #[error(transparent)]
    Settlement(#[from] SettleError),
}

impl From<StoreError> for ClaimError {
    fn from(err: StoreError) -> Self {
        ClaimError::Settlement(err.into())
    }
}

impl Retryable for ClaimError {
    fn is_transient(&self) -> bool {
        matches!(self, ClaimError::Settlement(err) if err.is_transient())
    }

    fn into_exhausted(self, attempts: u32) -> Self {
        match self {
            ClaimError::Settlement(err) => ClaimError::Settlement(err.into_exhausted(attempts)),
            other => other,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DailyRules {
    pub cooldown: Duration,
    pub mora: u64,
    pub premium_multiplier: u64,
    pub exp: u64,
}

impl Default for DailyRules {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(24 * 60 * 60),
            mora: 1_000,
            premium_multiplier: 2,
            exp: 50,
        }
    }
}

impl DailyRules {
    pub fn effect(&self, premium: bool) -> EconomicEffect {
        let mora = if premium {
            self.mora.saturating_mul(self.premium_multiplier)
        } else {
            self.mora
        };
        EconomicEffect::new()
            .with_currency(Currency::Mora, signed(mora))
            .with_exp(self.exp)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DailyClaim {
    pub effect: EconomicEffect,
    pub settlement: SettlementResult,
    pub next_claim_in: Duration,
}

/// Claim the daily reward inside the caller's transaction.
pub fn claim(
    tx: &mut dyn LedgerTx,
    user: UserId,
    premium: bool,
    now: u64,
    rules: &DailyRules,
) -> Result<DailyClaim, ClaimError> {
    let record = tx.cooldown(user, ACTION_DAILY)?;
    if let Some(remaining) = cooldown_remaining(record, now, |_| rules.cooldown) {
        return Err(ClaimError::OnCooldown { remaining });
    }
    tx.store_cooldown(
        user,
        ACTION_DAILY,
        CooldownRecord {
            last_action_at: now,
            last_success: true,
        },
    )?;
    let effect = rules.effect(premium);
    let settlement = apply_effect(tx, user, &effect)?;
    Ok(DailyClaim {
        effect,
        settlement,
        next_claim_in: rules.cooldown,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Ledger, Memory};

    const ALICE: UserId = UserId(40);
    const NOW: u64 = 1_700_000_000;

    #[test]
    fn test_claim_then_cooldown() {
        let ledger = Memory::new();
        let rules = DailyRules::default();
        let first = ledger
            .transaction(|tx| claim(tx, ALICE, false, NOW, &rules))
            .unwrap();
        assert_eq!(first.settlement.account.mora, 1_000);
        assert_eq!(first.settlement.level_up.map(|up| up.current_exp), Some(50));

        let err = ledger
            .transaction(|tx| claim(tx, ALICE, false, NOW + 3_600, &rules))
            .unwrap_err();
        assert_eq!(
            err,
            ClaimError::OnCooldown {
                remaining: Duration::from_secs(23 * 3_600)
            }
        );

        let again = ledger
            .transaction(|tx| claim(tx, ALICE, false, NOW + 24 * 3_600, &rules))
            .unwrap();
        assert_eq!(again.settlement.account.mora, 2_000);
    }

    #[test]
    fn test_premium_doubles_mora() {
        let ledger = Memory::new();
        let claimed = ledger
            .transaction(|tx| claim(tx, ALICE, true, NOW, &DailyRules::default()))
            .unwrap();
        assert_eq!(claimed.settlement.account.mora, 2_000);
    }
}
