//! Level progression.
//!
//! [`rollover`] is the pure part: it applies an EXP award to a
//! [`ProgressionRecord`] and lists every level reached on the way. The
//! transactional helpers grant per-level rewards (at most once per `(user, level)`)
//! and resynchronise stage badges against the resulting level.

use crate::state::{signed, LedgerTx, StoreError};
use mora_types::casino::{
    required_exp, stage_badge, stage_for_level, Currency, EconomicEffect, ProgressionRecord,
    UserId, ACHIEVEMENT_SUMMIT, CHEST_COMMON, CHEST_EPIC, CHEST_RARE, MAX_BADGE_STAGE,
    MAX_LEVEL, MILESTONE_LEVEL_INTERVAL, MILESTONE_MORA_PER_STAGE,
};
use serde::Serialize;

const BADGE_PREFIX: &str = "stage_badge_";

/// Outcome of applying EXP to a record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rollover {
    pub record: ProgressionRecord,
    /// Every level reached, in ascending order.
    pub levels_reached: Vec<u32>,
}

/// Add `amount` EXP and roll over until `current_exp < required_exp(level)`.
pub fn rollover(record: ProgressionRecord, amount: u64) -> Rollover {
    let mut level = record.level;
    let mut exp = record.current_exp.saturating_add(amount);
    let mut levels_reached = Vec::new();

    while level < MAX_LEVEL && exp >= required_exp(level) {
        exp -= required_exp(level);
        level += 1;
        levels_reached.push(level);
    }
    if level >= MAX_LEVEL {
        exp = exp.min(required_exp(level) - 1);
    }

    Rollover {
        record: ProgressionRecord {
            level,
            current_exp: exp,
        },
        levels_reached,
    }
}

/// Reward for reaching `level`: one common chest, plus a stage-scaled mora sum
/// and a better chest on every milestone level.
pub fn level_reward(level: u32) -> EconomicEffect {
    let mut effect = EconomicEffect::new().with_item(CHEST_COMMON, 1);
    if level > 0 && level % MILESTONE_LEVEL_INTERVAL == 0 {
        let stage = stage_for_level(level);
        let mora = MILESTONE_MORA_PER_STAGE.saturating_mul(stage as u64);
        let chest = if stage >= 3 { CHEST_EPIC } else { CHEST_RARE };
        effect.add_currency(Currency::Mora, signed(mora));
        effect.add_item(chest, 1);
    }
    effect
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LevelReward {
    pub level: u32,
    pub effect: EconomicEffect,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BadgeSync {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LevelUp {
    pub old_level: u32,
    pub new_level: u32,
    pub current_exp: u64,
    /// Rewards granted by this call. Levels claimed earlier are absent.
    pub rewards: Vec<LevelReward>,
    pub badges: BadgeSync,
}

impl LevelUp {
    pub fn leveled(&self) -> bool {
        self.new_level > self.old_level
    }
}

/// Grant the reward for `level` unless it was already claimed.
pub fn grant_level_reward(
    tx: &mut dyn LedgerTx,
    user: UserId,
    level: u32,
) -> Result<Option<EconomicEffect>, StoreError> {
    if !tx.claim_level_reward(user, level)? {
        return Ok(None);
    }
    let effect = level_reward(level);
    for delta in &effect.currency {
        tx.apply_currency(user, delta.currency, delta.amount, effect.debit_policy)?;
    }
    for delta in &effect.items {
        tx.apply_item(user, &delta.item, delta.quantity)?;
    }
    Ok(Some(effect))
}

/// Hold exactly the badge of the stage `level` belongs to.
pub fn sync_badges(
    tx: &mut dyn LedgerTx,
    user: UserId,
    level: u32,
) -> Result<BadgeSync, StoreError> {
    let wanted = stage_badge(stage_for_level(level));
    let mut sync = BadgeSync::default();

    for held in tx.badges(user)? {
        if held.starts_with(BADGE_PREFIX) && held != wanted && tx.set_badge(user, &held, false)? {
            sync.removed.push(held);
        }
    }
    if tx.set_badge(user, &wanted, true)? {
        sync.added.push(wanted);
    }
    Ok(sync)
}

/// Apply an EXP award inside the caller's transaction.
pub fn award_exp(
    tx: &mut dyn LedgerTx,
    user: UserId,
    amount: u64,
) -> Result<LevelUp, StoreError> {
    let before = tx.progression(user)?;
    let Rollover {
        record,
        levels_reached,
    } = rollover(before, amount);
    tx.store_progression(user, record)?;

    let mut rewards = Vec::with_capacity(levels_reached.len());
    for level in levels_reached {
        if let Some(effect) = grant_level_reward(tx, user, level)? {
            rewards.push(LevelReward { level, effect });
        }
    }

    let badges = sync_badges(tx, user, record.level)?;
    if stage_for_level(record.level) >= MAX_BADGE_STAGE {
        tx.award_achievement(user, ACHIEVEMENT_SUMMIT)?;
    }

    Ok(LevelUp {
        old_level: before.level,
        new_level: record.level,
        current_exp: record.current_exp,
        rewards,
        badges,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Ledger, Memory};

    const ALICE: UserId = UserId(7);

    #[test]
    fn test_rollover_crosses_multiple_levels() {
        let result = rollover(ProgressionRecord::default(), 2_500);
        assert_eq!(result.record.level, 2);
        assert_eq!(result.record.current_exp, 300);
        assert_eq!(result.levels_reached, vec![1, 2]);
        result.record.validate_invariants().unwrap();
    }

    #[test]
    fn test_rollover_exact_threshold() {
        let result = rollover(ProgressionRecord::default(), 1_000);
        assert_eq!(result.record, ProgressionRecord { level: 1, current_exp: 0 });

        let result = rollover(ProgressionRecord::default(), 999);
        assert_eq!(result.record.level, 0);
        assert!(result.levels_reached.is_empty());
    }

    #[test]
    fn test_rollover_respects_level_cap() {
        let result = rollover(ProgressionRecord::default(), u64::MAX);
        assert_eq!(result.record.level, MAX_LEVEL);
        result.record.validate_invariants().unwrap();
    }

    #[test]
    fn test_milestone_rewards_scale_with_stage() {
        let regular = level_reward(3);
        assert_eq!(regular.item_delta(CHEST_COMMON), 1);
        assert_eq!(regular.currency_delta(Currency::Mora), 0);

        let tenth = level_reward(10);
        assert_eq!(tenth.currency_delta(Currency::Mora), 25_000);
        assert_eq!(tenth.item_delta(CHEST_RARE), 1);

        let fortieth = level_reward(40);
        assert_eq!(fortieth.currency_delta(Currency::Mora), 75_000);
        assert_eq!(fortieth.item_delta(CHEST_EPIC), 1);
    }

    #[test]
    fn test_award_exp_grants_every_intermediate_level() {
        let ledger = Memory::new();
        let up = ledger
            .transaction(|tx| award_exp(tx, ALICE, 2_500))
            .unwrap();
        assert_eq!((up.old_level, up.new_level, up.current_exp), (0, 2, 300));
        assert_eq!(
            up.rewards.iter().map(|r| r.level).collect::<Vec<_>>(),
            vec![1, 2]
        );
        let chests = ledger
            .read(|tx| tx.quantity(ALICE, CHEST_COMMON))
            .unwrap();
        assert_eq!(chests, 2);
    }

    #[test]
    fn test_level_reward_granted_once() {
        let ledger = Memory::new();
        let (first, second) = ledger
            .transaction(|tx| {
                Ok::<_, StoreError>((
                    grant_level_reward(tx, ALICE, 10)?,
                    grant_level_reward(tx, ALICE, 10)?,
                ))
            })
            .unwrap();
        assert!(first.is_some());
        assert!(second.is_none());

        let (account, rare) = ledger
            .read(|tx| Ok((tx.account(ALICE)?, tx.quantity(ALICE, CHEST_RARE)?)))
            .unwrap();
        assert_eq!(account.mora, 25_000);
        assert_eq!(rare, 1);
    }

    #[test]
    fn test_badges_are_resynchronised_both_ways() {
        let ledger = Memory::new();
        let sync = ledger
            .transaction(|tx| {
                tx.set_badge(ALICE, &stage_badge(1), true)?;
                tx.set_badge(ALICE, "founder", true)?;
                tx.store_progression(ALICE, ProgressionRecord { level: 25, current_exp: 0 })?;
                award_exp(tx, ALICE, 0).map(|up| up.badges)
            })
            .unwrap();
        assert_eq!(sync.added, vec![stage_badge(2)]);
        assert_eq!(sync.removed, vec![stage_badge(1)]);

        // A demoted record drops back to the lower badge.
        let sync = ledger
            .transaction(|tx| {
                tx.store_progression(ALICE, ProgressionRecord { level: 5, current_exp: 0 })?;
                sync_badges(tx, ALICE, 5)
            })
            .unwrap();
        assert_eq!(sync.added, vec![stage_badge(1)]);
        assert_eq!(sync.removed, vec![stage_badge(2)]);

        let badges = ledger.read(|tx| tx.badges(ALICE)).unwrap();
        assert!(badges.contains("founder"));
        assert_eq!(badges.len(), 2);
    }
}
