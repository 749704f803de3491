//! Helpers for tests that drive an engine over the in-memory ledger.

use crate::engine::{Engine, EngineBuilder, ManualClock};
use crate::listener::RecordingListener;
use crate::rng::RngSource;
use crate::settlement::SettleError;
use crate::state::{signed, Memory};
use mora_types::casino::{Currency, EconomicEffect, UserId};
use std::sync::Arc;

/// Unix time every mock clock starts at.
pub const MOCK_EPOCH: u64 = 1_700_000_000;

/// Handles kept alongside a mock engine.
pub struct MockHarness {
    pub ledger: Arc<Memory>,
    pub clock: Arc<ManualClock>,
    pub listener: Arc<RecordingListener>,
}

/// Builder over a fresh [`Memory`] ledger, a seeded RNG and a manual clock.
pub fn engine_builder(seed: u64) -> (EngineBuilder<Memory>, MockHarness) {
    let harness = MockHarness {
        ledger: Arc::new(Memory::new()),
        clock: Arc::new(ManualClock::new(MOCK_EPOCH)),
        listener: Arc::new(RecordingListener::default()),
    };
    let builder = Engine::builder(harness.ledger.clone())
        .rng(RngSource::seeded(seed))
        .clock(harness.clock.clone())
        .listener(harness.listener.clone());
    (builder, harness)
}

/// Credit `mora` to `user` through the admin grant path.
pub async fn fund(engine: &Engine<Memory>, user: UserId, mora: u64) -> Result<(), SettleError> {
    engine
        .grant(
            user,
            EconomicEffect::new().with_currency(Currency::Mora, signed(mora)),
        )
        .await
        .map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::Activity;

    #[tokio::test]
    async fn test_harness_records_grants() {
        let (builder, harness) = engine_builder(1);
        let engine = builder.build().unwrap();
        fund(&engine, UserId(1), 250).await.unwrap();
        assert_eq!(harness.ledger.committed(), 1);
        assert_eq!(engine.account(UserId(1)).unwrap().mora, 250);
        let events = harness.listener.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].activity, Activity::Grant);
    }
}
