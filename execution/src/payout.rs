//! Settlement of a game verdict.
//!
//! Shared by instant games (escrow and payout in the same transaction) and session
//! games (escrow committed at start). The stake has always been debited by the
//! time [`settle_verdict`] runs; it credits the payout, advances the win streak
//! and awards EXP and achievements.

use crate::casino::registry::GameConfig;
use crate::listener::{details_value, OutcomeSummary};
use crate::modifiers::{apply_modifiers, ConsumedModifier, ModifierContext, PendingOutcome, Verdict};
use crate::rng::GameRng;
use crate::settlement::{apply_effect, SettlementResult};
use crate::state::{signed, streak_key, LedgerTx, StoreError};
use mora_types::casino::{
    Currency, EconomicEffect, Multiplier, UserId, ACHIEVEMENT_FIRST_WIN, ACHIEVEMENT_HIGH_ROLLER,
    ACHIEVEMENT_STREAK_5, HIGH_ROLLER_BET, ITEM_HOT_STREAK, STREAK_REWARD_INTERVAL,
};
use serde::Serialize;

#[derive(Clone, Copy, Debug)]
pub struct PlayContext<'a> {
    pub user: UserId,
    pub bet: u64,
    pub premium: bool,
    pub config: &'a GameConfig,
    pub standard_win: Option<Multiplier>,
    pub achievements: &'a [&'static str],
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GamePayout {
    /// Verdict before modifiers.
    pub raw: Verdict,
    pub outcome: PendingOutcome,
    pub consumed: Vec<ConsumedModifier>,
    /// Consecutive wins in this game after the play.
    pub streak: u32,
    /// Net change for the play, stake debit included.
    pub effect: EconomicEffect,
    pub settlement: SettlementResult,
}

impl GamePayout {
    pub fn summary(&self, details: impl Serialize) -> OutcomeSummary {
        OutcomeSummary {
            bet: self.outcome.bet,
            payout: self.outcome.payout,
            net: self.outcome.net(),
            verdict: Some(self.outcome.verdict),
            modifiers: self.consumed.clone(),
            details: details_value(details),
        }
    }
}

/// Settle `verdict` for a stake that is already escrowed.
pub fn settle_verdict(
    tx: &mut dyn LedgerTx,
    ctx: &PlayContext<'_>,
    verdict: Verdict,
    rng: &mut GameRng,
) -> Result<GamePayout, StoreError> {
    let modifier_ctx = ModifierContext {
        user: ctx.user,
        premium: ctx.premium,
        standard_win: ctx.standard_win,
    };
    let base = PendingOutcome::from_verdict(ctx.bet, verdict);
    let modified = apply_modifiers(tx, &modifier_ctx, &ctx.config.modifiers, base, rng)?;
    let outcome = modified.outcome;
    let won = outcome.is_win();

    let mut credit = EconomicEffect::new().with_exp(if won {
        ctx.config.play_exp + ctx.config.win_exp
    } else {
        ctx.config.play_exp
    });
    credit.add_currency(Currency::Mora, signed(outcome.payout));

    let key = streak_key(ctx.config.kind);
    let previous = tx.counter(ctx.user, &key)?;
    // Getting the stake back (a push or a 1x win) neither extends nor breaks the streak.
    let streak = if won {
        previous.saturating_add(1)
    } else if outcome.payout >= outcome.bet {
        previous
    } else {
        0
    };
    tx.store_counter(ctx.user, &key, streak)?;
    if won && streak % STREAK_REWARD_INTERVAL == 0 {
        credit.add_item(ITEM_HOT_STREAK, 1);
        credit.add_achievement(ACHIEVEMENT_STREAK_5);
    }

    if won {
        credit.add_achievement(ACHIEVEMENT_FIRST_WIN);
        if ctx.bet >= HIGH_ROLLER_BET {
            credit.add_achievement(ACHIEVEMENT_HIGH_ROLLER);
        }
        for achievement in ctx.achievements {
            credit.add_achievement(*achievement);
        }
    }

    let settlement = apply_effect(tx, ctx.user, &credit)?;
    let mut effect = credit;
    effect.add_currency(Currency::Mora, -signed(ctx.bet));

    Ok(GamePayout {
        raw: verdict,
        outcome,
        consumed: modified.consumed,
        streak,
        effect,
        settlement,
    })
}
