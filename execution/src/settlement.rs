//! All-or-nothing settlement of economic effects.
//!
//! [`Settlement::commit`] runs a closure inside one ledger transaction and retries
//! the whole closure on storage contention with linear, jittered backoff. Once the
//! attempts are exhausted the caller sees a storage failure that is distinct from
//! the transient error. [`apply_effect`] is the single path through which an
//! [`EconomicEffect`] touches the ledger.
//!
//! Ledger transactions are synchronous and may wait on a busy database, so each
//! attempt runs on tokio's blocking pool. The async task only awaits it, leaving the
//! executor free for other users' settlements and session timers.

use crate::backoff::{jittered_backoff, linear_backoff};
use crate::metrics::EngineMetrics;
use crate::progression::{award_exp, LevelUp};
use crate::sampler::TableError;
use crate::state::{Ledger, LedgerTx, StoreError};
use mora_types::casino::{
    Account, Currency, CurrencyDelta, EconomicEffect, ItemDelta, UserId,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, warn};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SettleError {
    #[error("insufficient {currency}: need {needed}, have {available}")]
    InsufficientFunds {
        currency: Currency,
        needed: u64,
        available: u64,
    },
    #[error("insufficient {item}: need {needed}, have {available}")]
    InsufficientItems {
        item: String,
        needed: u64,
        available: u64,
    },
    /// Transient; only seen by callers that bypass [`Settlement::commit`].
    #[error("storage contention: {0}")]
    Contention(String),
    #[error("storage failure after {attempts} attempts: {last}")]
    StorageFailure { attempts: u32, last: String },
    #[error("storage error: {0}")]
    Storage(String),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(#[from] TableError),
}

impl From<StoreError> for SettleError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Contention(reason) => SettleError::Contention(reason),
            StoreError::InsufficientFunds {
                currency,
                needed,
                available,
            } => SettleError::InsufficientFunds {
                currency,
                needed,
                available,
            },
            StoreError::InsufficientItems {
                item,
                needed,
                available,
            } => SettleError::InsufficientItems {
                item,
                needed,
                available,
            },
            StoreError::Backend(reason) => SettleError::Storage(reason),
        }
    }
}

/// Errors that [`Settlement::commit`] can retry.
pub trait Retryable: Sized {
    fn is_transient(&self) -> bool;
    /// Convert the last transient error into its "gave up" form.
    fn into_exhausted(self, attempts: u32) -> Self;
}

impl Retryable for SettleError {
    fn is_transient(&self) -> bool {
        matches!(self, SettleError::Contention(_))
    }

    fn into_exhausted(self, attempts: u32) -> Self {
        match self {
            SettleError::Contention(last) => SettleError::StorageFailure { attempts, last },
            other => other,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay before retry `n` is `base_delay * n`, with equal jitter.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(25),
        }
    }
}

/// What a committed effect did to one account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SettlementResult {
    pub user: UserId,
    /// Balances after commit.
    pub account: Account,
    /// Deltas as applied (clamped debits may be smaller than requested).
    pub currency: Vec<CurrencyDelta>,
    pub items: Vec<ItemDelta>,
    pub achievements_unlocked: Vec<String>,
    /// `None` when the effect carried no EXP.
    pub level_up: Option<LevelUp>,
}

/// Apply `effect` to `user` inside the caller's transaction.
pub fn apply_effect(
    tx: &mut dyn LedgerTx,
    user: UserId,
    effect: &EconomicEffect,
) -> Result<SettlementResult, StoreError> {
    let mut currency = Vec::with_capacity(effect.currency.len());
    for delta in &effect.currency {
        if delta.amount == 0 {
            continue;
        }
        let change = tx.apply_currency(user, delta.currency, delta.amount, effect.debit_policy)?;
        currency.push(CurrencyDelta {
            currency: delta.currency,
            amount: change.applied,
        });
    }

    let mut items = Vec::with_capacity(effect.items.len());
    for delta in &effect.items {
        if delta.quantity == 0 {
            continue;
        }
        tx.apply_item(user, &delta.item, delta.quantity)?;
        items.push(delta.clone());
    }

    let mut achievements_unlocked = Vec::new();
    for key in &effect.achievements {
        if tx.award_achievement(user, key)? {
            achievements_unlocked.push(key.clone());
        }
    }

    let level_up = if effect.exp > 0 {
        Some(award_exp(tx, user, effect.exp)?)
    } else {
        None
    };

    Ok(SettlementResult {
        user,
        account: tx.account(user)?,
        currency,
        items,
        achievements_unlocked,
        level_up,
    })
}

/// Settlement engine over a shared ledger.
pub struct Settlement<L: Ledger> {
    ledger: Arc<L>,
    retry: RetryPolicy,
    metrics: Arc<EngineMetrics>,
}

impl<L: Ledger> Settlement<L> {
    pub fn new(ledger: Arc<L>, retry: RetryPolicy, metrics: Arc<EngineMetrics>) -> Self {
        Self {
            ledger,
            retry,
            metrics,
        }
    }

    pub fn ledger(&self) -> &Arc<L> {
        &self.ledger
    }

    pub fn metrics(&self) -> &Arc<EngineMetrics> {
        &self.metrics
    }

    /// Run `f` in a transaction, retrying the whole closure on contention.
    ///
    /// `f` runs on the blocking pool and may run more than once. Any randomness it
    /// uses must be fixed before the call so a retry replays the same draws.
    pub async fn commit<T, E, F>(&self, mut f: F) -> Result<T, E>
    where
        F: FnMut(&mut dyn LedgerTx) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<StoreError> + Retryable + std::fmt::Display + Send + 'static,
    {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let ledger = self.ledger.clone();
            let (returned, result) = tokio::task::spawn_blocking(move || {
                let result = ledger.transaction(|tx| f(tx));
                (f, result)
            })
            .await
            .map_err(|err| E::from(StoreError::Backend(format!("ledger task failed: {err}"))))?;
            f = returned;

            match result {
                Ok(value) => {
                    self.metrics.inc_settlements_committed();
                    return Ok(value);
                }
                Err(err) if err.is_transient() && attempt < max_attempts => {
                    self.metrics.inc_contention_retries();
                    let delay = {
                        let mut rng = rand::thread_rng();
                        jittered_backoff(&mut rng, linear_backoff(self.retry.base_delay, attempt))
                    };
                    warn!(attempt, ?delay, error = %err, "settlement contention, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) if err.is_transient() => {
                    self.metrics.inc_storage_failures();
                    error!(attempts = attempt, error = %err, "settlement retries exhausted");
                    return Err(err.into_exhausted(attempt));
                }
                Err(err) => {
                    debug!(error = %err, "settlement rejected");
                    return Err(err);
                }
            }
        }
    }

    /// Apply one effect atomically.
    pub async fn settle(
        &self,
        user: UserId,
        effect: &EconomicEffect,
    ) -> Result<SettlementResult, SettleError> {
        let effect = effect.clone();
        self.commit(move |tx| apply_effect(tx, user, &effect).map_err(SettleError::from))
            .await
    }

    /// Apply several users' effects in one transaction (transfers, robberies).
    pub async fn settle_all(
        &self,
        effects: &[(UserId, EconomicEffect)],
    ) -> Result<Vec<SettlementResult>, SettleError> {
        let effects = effects.to_vec();
        self.commit(move |tx| {
            effects
                .iter()
                .map(|(user, effect)| apply_effect(tx, *user, effect).map_err(SettleError::from))
                .collect::<Result<Vec<_>, _>>()
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Memory;
    use mora_types::casino::{DebitPolicy, ACHIEVEMENT_FIRST_WIN, ITEM_PADLOCK};

    const ALICE: UserId = UserId(10);
    const BOB: UserId = UserId(11);

    fn engine() -> (Arc<Memory>, Settlement<Memory>) {
        let ledger = Arc::new(Memory::new());
        let settlement = Settlement::new(
            ledger.clone(),
            RetryPolicy::default(),
            Arc::new(EngineMetrics::default()),
        );
        (ledger, settlement)
    }

    #[tokio::test(start_paused = true)]
    async fn test_contention_is_retried_until_commit() {
        let (ledger, settlement) = engine();
        ledger.fail_next(2);
        let result = settlement
            .settle(ALICE, &EconomicEffect::new().with_currency(Currency::Mora, 500))
            .await
            .unwrap();
        assert_eq!(result.account.mora, 500);
        let snapshot = settlement.metrics().snapshot();
        assert_eq!(snapshot.contention_retries, 2);
        assert_eq!(snapshot.settlements_committed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_surface_storage_failure() {
        let (ledger, settlement) = engine();
        ledger.fail_next(5);
        let err = settlement
            .settle(ALICE, &EconomicEffect::new().with_currency(Currency::Mora, 500))
            .await
            .unwrap_err();
        assert!(matches!(err, SettleError::StorageFailure { attempts: 5, .. }));
        assert_eq!(ledger.read(|tx| tx.account(ALICE)).unwrap().mora, 0);
        assert_eq!(settlement.metrics().snapshot().storage_failures, 1);
    }

    #[tokio::test]
    async fn test_overdraft_rejected_without_partial_effect() {
        let (ledger, settlement) = engine();
        settlement
            .settle(ALICE, &EconomicEffect::new().with_currency(Currency::Mora, 100))
            .await
            .unwrap();
        let effect = EconomicEffect::new()
            .with_item(ITEM_PADLOCK, 1)
            .with_currency(Currency::Mora, -150)
            .with_exp(5_000);
        let err = settlement.settle(ALICE, &effect).await.unwrap_err();
        assert_eq!(
            err,
            SettleError::InsufficientFunds {
                currency: Currency::Mora,
                needed: 150,
                available: 100
            }
        );
        let (account, padlocks, progression) = ledger
            .read(|tx| {
                Ok((
                    tx.account(ALICE)?,
                    tx.quantity(ALICE, ITEM_PADLOCK)?,
                    tx.progression(ALICE)?,
                ))
            })
            .unwrap();
        assert_eq!(account.mora, 100);
        assert_eq!(padlocks, 0);
        assert_eq!(progression.level, 0);
        assert_eq!(settlement.metrics().snapshot().contention_retries, 0);
    }

    #[tokio::test]
    async fn test_clamped_debit_reports_applied_amount() {
        let (_, settlement) = engine();
        settlement
            .settle(ALICE, &EconomicEffect::new().with_currency(Currency::Mora, 80))
            .await
            .unwrap();
        let effect = EconomicEffect::new()
            .with_currency(Currency::Mora, -200)
            .with_debit_policy(DebitPolicy::Clamp);
        let result = settlement.settle(ALICE, &effect).await.unwrap();
        assert_eq!(result.account.mora, 0);
        assert_eq!(result.currency[0].amount, -80);
    }

    #[tokio::test]
    async fn test_achievements_are_idempotent() {
        let (_, settlement) = engine();
        let effect = EconomicEffect::new().with_achievement(ACHIEVEMENT_FIRST_WIN);
        let first = settlement.settle(ALICE, &effect).await.unwrap();
        let second = settlement.settle(ALICE, &effect).await.unwrap();
        assert_eq!(first.achievements_unlocked, vec![ACHIEVEMENT_FIRST_WIN.to_string()]);
        assert!(second.achievements_unlocked.is_empty());
    }

    #[tokio::test]
    async fn test_exp_resolves_level_ups() {
        let (_, settlement) = engine();
        let result = settlement
            .settle(ALICE, &EconomicEffect::new().with_exp(1_200))
            .await
            .unwrap();
        let up = result.level_up.unwrap();
        assert_eq!((up.new_level, up.current_exp), (1, 200));

        let none = settlement
            .settle(ALICE, &EconomicEffect::new().with_currency(Currency::Dust, 1))
            .await
            .unwrap();
        assert!(none.level_up.is_none());
    }

    #[tokio::test]
    async fn test_settle_all_is_atomic_across_users() {
        let (ledger, settlement) = engine();
        settlement
            .settle(ALICE, &EconomicEffect::new().with_currency(Currency::Mora, 300))
            .await
            .unwrap();
        let transfer = [
            (ALICE, EconomicEffect::new().with_currency(Currency::Mora, -200)),
            (BOB, EconomicEffect::new().with_currency(Currency::Mora, 200)),
        ];
        settlement.settle_all(&transfer).await.unwrap();

        let overdraw = [
            (BOB, EconomicEffect::new().with_currency(Currency::Mora, 1_000)),
            (ALICE, EconomicEffect::new().with_currency(Currency::Mora, -1_000)),
        ];
        assert!(settlement.settle_all(&overdraw).await.is_err());

        let (alice, bob) = ledger
            .read(|tx| Ok((tx.account(ALICE)?.mora, tx.account(BOB)?.mora)))
            .unwrap();
        assert_eq!((alice, bob), (100, 200));
    }
}
