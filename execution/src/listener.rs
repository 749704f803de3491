//! Outbound settlement notifications.
//!
//! The engine calls [`SettlementListener::on_settled`] after every committed
//! settlement. Listeners receive numbers and state changes only; rendering them is
//! the caller's concern.

use crate::modifiers::{ConsumedModifier, Verdict};
use mora_types::casino::{Account, EconomicEffect, GameKind, UserId};
use serde::Serialize;
use tracing::{info, warn};

#[cfg(any(test, feature = "mocks"))]
use std::sync::Mutex;

/// What triggered a settlement.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "activity", rename_all = "snake_case")]
pub enum Activity {
    Game { kind: GameKind },
    Chest { chest: String },
    Wish { banner: String, pulls: u32 },
    Rob { victim: UserId },
    Daily,
    Transfer { to: UserId },
    Grant,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OutcomeSummary {
    pub bet: u64,
    pub payout: u64,
    pub net: i64,
    pub verdict: Option<Verdict>,
    pub modifiers: Vec<ConsumedModifier>,
    /// Activity-specific detail (board, reels, drops).
    pub details: serde_json::Value,
}

impl OutcomeSummary {
    pub fn details_only(details: impl Serialize) -> Self {
        Self {
            bet: 0,
            payout: 0,
            net: 0,
            verdict: None,
            modifiers: Vec::new(),
            details: details_value(details),
        }
    }
}

/// Details that fail to serialize are logged and reported as `null`; the
/// settlement they describe has already committed.
pub(crate) fn details_value(details: impl Serialize) -> serde_json::Value {
    serde_json::to_value(details).unwrap_or_else(|err| {
        warn!(error = %err, "outcome details not serializable");
        serde_json::Value::Null
    })
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SettledEvent {
    pub user: UserId,
    pub activity: Activity,
    /// Net effect on `user` as committed.
    pub effect: EconomicEffect,
    pub summary: OutcomeSummary,
    pub account: Account,
}

pub trait SettlementListener: Send + Sync {
    fn on_settled(&self, event: &SettledEvent);
}

/// Logs every settlement through `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogListener;

impl SettlementListener for LogListener {
    fn on_settled(&self, event: &SettledEvent) {
        info!(
            user = %event.user,
            activity = ?event.activity,
            bet = event.summary.bet,
            payout = event.summary.payout,
            net = event.summary.net,
            mora = event.account.mora,
            "settled"
        );
    }
}

/// Collects events for assertions.
#[cfg(any(test, feature = "mocks"))]
#[derive(Default)]
pub struct RecordingListener {
    events: Mutex<Vec<SettledEvent>>,
}

#[cfg(any(test, feature = "mocks"))]
impl RecordingListener {
    pub fn events(&self) -> Vec<SettledEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

#[cfg(any(test, feature = "mocks"))]
impl SettlementListener for RecordingListener {
    fn on_settled(&self, event: &SettledEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
