//! Payout modifiers applied between a raw draw and its settlement.
//!
//! Modifiers run in a fixed order, each seeing the outcome left by the previous one:
//!
//! 1. Premium luck: a premium account's loss may be re-rolled into a standard win;
//!    a premium win that was not re-rolled gets a bonus on its profit.
//! 2. Lucky charm: a held charm may convert a remaining loss into a standard win.
//! 3. Hot streak: a held token refunds part of the bet on a remaining loss.
//!
//! Consumables are only debited after their roll succeeds, inside the caller's
//! transaction, through [`consume_if_held`]. If the debit finds nothing to take
//! the modifier is treated as absent.

use crate::rng::GameRng;
use crate::sampler::Probability;
use crate::state::{consume_if_held, LedgerTx, StoreError};
use mora_types::casino::{Multiplier, UserId, ITEM_HOT_STREAK, ITEM_LUCKY_CHARM, MULTIPLIER_SCALE};
use serde::{Deserialize, Serialize};

/// Raw result of a draw before modifiers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", content = "multiplier", rename_all = "snake_case")]
pub enum Verdict {
    /// Total return is `multiplier * bet`.
    Win(Multiplier),
    Loss,
    /// Bet returned unchanged.
    Push,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct PendingOutcome {
    pub verdict: Verdict,
    pub bet: u64,
    /// Gross amount credited back (stake included).
    pub payout: u64,
}

impl PendingOutcome {
    pub fn from_verdict(bet: u64, verdict: Verdict) -> Self {
        let payout = match verdict {
            Verdict::Win(multiplier) => multiplier.apply(bet),
            Verdict::Loss => 0,
            Verdict::Push => bet,
        };
        Self {
            verdict,
            bet,
            payout,
        }
    }

    pub fn is_win(&self) -> bool {
        matches!(self.verdict, Verdict::Win(_)) && self.payout > self.bet
    }

    pub fn is_loss(&self) -> bool {
        self.verdict == Verdict::Loss
    }

    /// Signed change to the balance relative to before the bet.
    pub fn net(&self) -> i64 {
        self.payout as i64 - self.bet as i64
    }
}

/// Per-game modifier tuning.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifierPolicy {
    pub premium_reroll: Probability,
    /// Extra share of the profit paid on premium wins, in basis points.
    pub premium_win_bonus_bps: u64,
    /// `None` disables the lucky charm for the game.
    pub lucky_charm: Option<Probability>,
    /// Share of the bet refunded on a loss by a hot streak token, in basis points.
    pub hot_streak_refund_bps: u64,
}

impl Default for ModifierPolicy {
    fn default() -> Self {
        Self {
            premium_reroll: Probability::percent(5),
            premium_win_bonus_bps: 1_000,
            lucky_charm: Some(Probability::percent(10)),
            hot_streak_refund_bps: 5_000,
        }
    }
}

impl ModifierPolicy {
    /// No modifier ever fires.
    pub const fn disabled() -> Self {
        Self {
            premium_reroll: Probability::NEVER,
            premium_win_bonus_bps: 0,
            lucky_charm: None,
            hot_streak_refund_bps: 0,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ModifierContext {
    pub user: UserId,
    pub premium: bool,
    /// Win a loss converts into. `None` for games where a conversion has no
    /// meaning (multi-step games settle on progress instead).
    pub standard_win: Option<Multiplier>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "modifier", rename_all = "snake_case")]
pub enum ConsumedModifier {
    PremiumReroll,
    PremiumBonus { extra: u64 },
    LuckyCharm,
    HotStreakRefund { refund: u64 },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Modified {
    pub outcome: PendingOutcome,
    pub consumed: Vec<ConsumedModifier>,
}

fn share_bps(amount: u64, bps: u64) -> u64 {
    let share = amount as u128 * bps as u128 / MULTIPLIER_SCALE as u128;
    share.min(u64::MAX as u128) as u64
}

/// Run the pipeline over `outcome` inside the caller's transaction.
pub fn apply_modifiers(
    tx: &mut dyn LedgerTx,
    ctx: &ModifierContext,
    policy: &ModifierPolicy,
    outcome: PendingOutcome,
    rng: &mut GameRng,
) -> Result<Modified, StoreError> {
    let mut outcome = outcome;
    let mut consumed = Vec::new();

    // 1. Premium luck.
    if ctx.premium {
        match (outcome.verdict, ctx.standard_win) {
            (Verdict::Loss, Some(win)) if rng.chance(policy.premium_reroll) => {
                outcome = PendingOutcome::from_verdict(outcome.bet, Verdict::Win(win));
                consumed.push(ConsumedModifier::PremiumReroll);
            }
            (Verdict::Win(_), _) if outcome.payout > outcome.bet => {
                let extra = share_bps(outcome.payout - outcome.bet, policy.premium_win_bonus_bps);
                if extra > 0 {
                    outcome.payout = outcome.payout.saturating_add(extra);
                    consumed.push(ConsumedModifier::PremiumBonus { extra });
                }
            }
            _ => {}
        }
    }

    // 2. Lucky charm.
    if let (Verdict::Loss, Some(win), Some(chance)) =
        (outcome.verdict, ctx.standard_win, policy.lucky_charm)
    {
        if tx.quantity(ctx.user, ITEM_LUCKY_CHARM)? > 0
            && rng.chance(chance)
            && consume_if_held(tx, ctx.user, ITEM_LUCKY_CHARM)?
        {
            outcome = PendingOutcome::from_verdict(outcome.bet, Verdict::Win(win));
            consumed.push(ConsumedModifier::LuckyCharm);
        }
    }

    // 3. Hot streak refund.
    if outcome.is_loss() && policy.hot_streak_refund_bps > 0 {
        let refund = share_bps(outcome.bet, policy.hot_streak_refund_bps);
        if refund > 0
            && tx.quantity(ctx.user, ITEM_HOT_STREAK)? > 0
            && consume_if_held(tx, ctx.user, ITEM_HOT_STREAK)?
        {
            outcome.payout = refund;
            consumed.push(ConsumedModifier::HotStreakRefund { refund });
        }
    }

    Ok(Modified { outcome, consumed })
}
