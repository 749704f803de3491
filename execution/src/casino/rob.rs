//! Robbery between two accounts.
//!
//! One attempt is a single transaction: the robber's cooldown is checked and
//! re-armed, a victim's padlock is consumed if it blocks, and the mora moves in
//! whichever direction the roll decides. The cooldown after an attempt depends on
//! how it went.

use super::cooldown_remaining;
use crate::rng::GameRng;
use crate::sampler::Probability;
use crate::settlement::{Retryable, SettleError};
use crate::state::{consume_if_held, signed, LedgerTx, StoreError};
use mora_types::casino::{
    Account, CooldownRecord, Currency, DebitPolicy, UserId, ACHIEVEMENT_MASTER_THIEF, ACTION_ROB,
    ITEM_PADLOCK, MULTIPLIER_SCALE,
};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RobError {
    #[error("robbery on cooldown for {}s", remaining.as_secs())]
    OnCooldown { remaining: Duration },
    #[error("cannot rob yourself")]
    SelfTarget,
    #[error("victim holds {balance} mora, below the {minimum} minimum")]
    VictimTooPoor { balance: u64, minimum: u64 },
    #[error(transparent)]
    Settlement(#[from] SettleError),
}

impl From<StoreError> for RobError {
    fn from(err: StoreError) -> Self {
        RobError::Settlement(err.into())
    }
}

impl Retryable for RobError {
    fn is_transient(&self) -> bool {
        matches!(self, RobError::Settlement(err) if err.is_transient())
    }

    fn into_exhausted(self, attempts: u32) -> Self {
        match self {
            RobError::Settlement(err) => RobError::Settlement(err.into_exhausted(attempts)),
            other => other,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RobRules {
    pub success_chance: Probability,
    pub success_cooldown: Duration,
    pub failure_cooldown: Duration,
    /// Share of the victim's mora taken on success, drawn uniformly, in basis points.
    pub steal_min_bps: u64,
    pub steal_max_bps: u64,
    pub steal_cap: u64,
    /// Fine on failure, as a share of the robber's mora, in basis points.
    pub fine_bps: u64,
    pub fine_min: u64,
    /// Victims below this balance cannot be targeted.
    pub min_victim_balance: u64,
    /// A single theft at least this large unlocks `master_thief`.
    pub master_thief_amount: u64,
}

impl Default for RobRules {
    fn default() -> Self {
        Self {
            success_chance: Probability::percent(50),
            success_cooldown: Duration::from_secs(30 * 60),
            failure_cooldown: Duration::from_secs(60 * 60),
            steal_min_bps: 1_000,
            steal_max_bps: 2_500,
            steal_cap: 50_000,
            fine_bps: 1_000,
            fine_min: 100,
            min_victim_balance: 100,
            master_thief_amount: 10_000,
        }
    }
}

impl RobRules {
    pub fn cooldown_for(&self, success: bool) -> Duration {
        if success {
            self.success_cooldown
        } else {
            self.failure_cooldown
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RobResult {
    Success { stolen: u64 },
    /// Fine actually collected (clamped to the robber's balance).
    Failed { fine: u64 },
    /// The victim's padlock fired and was consumed.
    Blocked,
}

impl RobResult {
    pub fn succeeded(&self) -> bool {
        matches!(self, RobResult::Success { .. })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RobOutcome {
    pub robber: Account,
    pub victim: Account,
    pub result: RobResult,
    /// Time until the robber may try again.
    pub cooldown: Duration,
    pub achievements_unlocked: Vec<String>,
}

fn share(amount: u64, bps: u64) -> u64 {
    (amount as u128 * bps as u128 / MULTIPLIER_SCALE as u128) as u64
}

/// Run one robbery attempt inside the caller's transaction.
pub fn attempt(
    tx: &mut dyn LedgerTx,
    robber: UserId,
    victim: UserId,
    now: u64,
    rules: &RobRules,
    rng: &mut GameRng,
) -> Result<RobOutcome, RobError> {
    if robber == victim {
        return Err(RobError::SelfTarget);
    }
    let record = tx.cooldown(robber, ACTION_ROB)?;
    if let Some(remaining) = cooldown_remaining(record, now, |success| rules.cooldown_for(success))
    {
        return Err(RobError::OnCooldown { remaining });
    }
    let target = tx.account(victim)?;
    if target.mora < rules.min_victim_balance {
        return Err(RobError::VictimTooPoor {
            balance: target.mora,
            minimum: rules.min_victim_balance,
        });
    }

    let result = if consume_if_held(tx, victim, ITEM_PADLOCK)? {
        RobResult::Blocked
    } else if rng.chance(rules.success_chance) {
        let bps = rng.between(rules.steal_min_bps, rules.steal_max_bps);
        let stolen = share(target.mora, bps).min(rules.steal_cap).max(1);
        tx.apply_currency(victim, Currency::Mora, -signed(stolen), DebitPolicy::Reject)?;
        tx.apply_currency(robber, Currency::Mora, signed(stolen), DebitPolicy::Reject)?;
        RobResult::Success { stolen }
    } else {
        let own = tx.account(robber)?.mora;
        let fine = share(own, rules.fine_bps).max(rules.fine_min);
        let change = tx.apply_currency(robber, Currency::Mora, -signed(fine), DebitPolicy::Clamp)?;
        let collected = change.applied.unsigned_abs();
        if collected > 0 {
            tx.apply_currency(victim, Currency::Mora, signed(collected), DebitPolicy::Reject)?;
        }
        RobResult::Failed { fine: collected }
    };

    let success = result.succeeded();
    tx.store_cooldown(
        robber,
        ACTION_ROB,
        CooldownRecord {
            last_action_at: now,
            last_success: success,
        },
    )?;

    let mut achievements_unlocked = Vec::new();
    if let RobResult::Success { stolen } = result {
        if stolen >= rules.master_thief_amount
            && tx.award_achievement(robber, ACHIEVEMENT_MASTER_THIEF)?
        {
            achievements_unlocked.push(ACHIEVEMENT_MASTER_THIEF.to_string());
        }
    }

    Ok(RobOutcome {
        robber: tx.account(robber)?,
        victim: tx.account(victim)?,
        result,
        cooldown: rules.cooldown_for(success),
        achievements_unlocked,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Ledger, Memory};

    const ROBBER: UserId = UserId(30);
    const VICTIM: UserId = UserId(31);
    const NOW: u64 = 1_700_000_000;

    fn funded(robber: u64, victim: u64) -> Memory {
        let ledger = Memory::new();
        ledger
            .transaction(|tx| {
                tx.apply_currency(ROBBER, Currency::Mora, signed(robber), DebitPolicy::Reject)?;
                tx.apply_currency(VICTIM, Currency::Mora, signed(victim), DebitPolicy::Reject)?;
                Ok::<_, StoreError>(())
            })
            .unwrap();
        ledger
    }

    fn rules(success: Probability) -> RobRules {
        RobRules {
            success_chance: success,
            ..RobRules::default()
        }
    }

    #[test]
    fn test_success_moves_mora_and_sets_short_cooldown() {
        let ledger = funded(0, 10_000);
        let mut rng = GameRng::from_seed(1);
        let rules = rules(Probability::ALWAYS);
        let outcome = ledger
            .transaction(|tx| attempt(tx, ROBBER, VICTIM, NOW, &rules, &mut rng))
            .unwrap();
        let RobResult::Success { stolen } = outcome.result else {
            panic!("expected success");
        };
        assert!((1_000..=2_500).contains(&stolen));
        assert_eq!(outcome.robber.mora, stolen);
        assert_eq!(outcome.victim.mora, 10_000 - stolen);
        assert_eq!(outcome.cooldown, Duration::from_secs(30 * 60));

        let err = ledger
            .transaction(|tx| attempt(tx, ROBBER, VICTIM, NOW + 60, &rules, &mut rng))
            .unwrap_err();
        assert_eq!(
            err,
            RobError::OnCooldown {
                remaining: Duration::from_secs(29 * 60)
            }
        );
        assert!(ledger
            .transaction(|tx| attempt(tx, ROBBER, VICTIM, NOW + 30 * 60, &rules, &mut rng))
            .is_ok());
    }

    #[test]
    fn test_failure_fines_robber_and_sets_long_cooldown() {
        let ledger = funded(5_000, 1_000);
        let mut rng = GameRng::from_seed(2);
        let rules = rules(Probability::NEVER);
        let outcome = ledger
            .transaction(|tx| attempt(tx, ROBBER, VICTIM, NOW, &rules, &mut rng))
            .unwrap();
        assert_eq!(outcome.result, RobResult::Failed { fine: 500 });
        assert_eq!(outcome.robber.mora, 4_500);
        assert_eq!(outcome.victim.mora, 1_500);
        assert_eq!(outcome.cooldown, Duration::from_secs(60 * 60));

        let err = ledger
            .transaction(|tx| attempt(tx, ROBBER, VICTIM, NOW + 45 * 60, &rules, &mut rng))
            .unwrap_err();
        assert_eq!(
            err,
            RobError::OnCooldown {
                remaining: Duration::from_secs(15 * 60)
            }
        );
    }

    #[test]
    fn test_fine_has_minimum_and_clamps() {
        let ledger = funded(40, 1_000);
        let mut rng = GameRng::from_seed(3);
        let outcome = ledger
            .transaction(|tx| attempt(tx, ROBBER, VICTIM, NOW, &rules(Probability::NEVER), &mut rng))
            .unwrap();
        assert_eq!(outcome.result, RobResult::Failed { fine: 40 });
        assert_eq!(outcome.robber.mora, 0);
        assert_eq!(outcome.victim.mora, 1_040);
    }

    #[test]
    fn test_padlock_blocks_once_and_is_consumed() {
        let ledger = funded(0, 10_000);
        ledger
            .transaction(|tx| tx.apply_item(VICTIM, ITEM_PADLOCK, 1))
            .unwrap();
        let mut rng = GameRng::from_seed(4);
        let rules = rules(Probability::ALWAYS);
        let outcome = ledger
            .transaction(|tx| attempt(tx, ROBBER, VICTIM, NOW, &rules, &mut rng))
            .unwrap();
        assert_eq!(outcome.result, RobResult::Blocked);
        assert_eq!(outcome.victim.mora, 10_000);
        assert_eq!(
            ledger.read(|tx| tx.quantity(VICTIM, ITEM_PADLOCK)).unwrap(),
            0
        );

        let next = ledger
            .transaction(|tx| attempt(tx, ROBBER, VICTIM, NOW + 3_600, &rules, &mut rng))
            .unwrap();
        assert!(next.result.succeeded());
    }

    #[test]
    fn test_rejections_leave_cooldown_unset() {
        let ledger = funded(1_000, 50);
        let mut rng = GameRng::from_seed(5);
        let rules = RobRules::default();
        assert_eq!(
            ledger
                .transaction(|tx| attempt(tx, ROBBER, ROBBER, NOW, &rules, &mut rng))
                .unwrap_err(),
            RobError::SelfTarget
        );
        assert!(matches!(
            ledger
                .transaction(|tx| attempt(tx, ROBBER, VICTIM, NOW, &rules, &mut rng))
                .unwrap_err(),
            RobError::VictimTooPoor { balance: 50, .. }
        ));
        assert_eq!(ledger.read(|tx| tx.cooldown(ROBBER, ACTION_ROB)).unwrap(), None);
    }

    #[test]
    fn test_large_theft_unlocks_master_thief() {
        let ledger = funded(0, 1_000_000);
        let mut rng = GameRng::from_seed(6);
        let outcome = ledger
            .transaction(|tx| {
                attempt(tx, ROBBER, VICTIM, NOW, &rules(Probability::ALWAYS), &mut rng)
            })
            .unwrap();
        assert_eq!(outcome.result, RobResult::Success { stolen: 50_000 });
        assert_eq!(
            outcome.achievements_unlocked,
            vec![ACHIEVEMENT_MASTER_THIEF.to_string()]
        );
    }
}
