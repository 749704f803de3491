//! Mora execution layer.
//!
//! This crate resolves randomized rewards for the mora economy and commits their
//! economic consequences: minigame outcomes, chest drops, wishes, robberies and
//! daily claims. [`Engine`] is the entrypoint; everything else is a component it
//! wires together.
//!
//! ## Invariants
//! - Balances and inventory quantities never go negative. Debits either reject the
//!   whole settlement or clamp, as the effect's [`DebitPolicy`] says.
//! - One outcome produces exactly one settlement. Contention is retried by
//!   re-running the whole transaction, never by replaying a partial one.
//! - At most one active session exists per `(user, game)`. Whichever of user
//!   action and timeout removes the session first is the only one that settles it.
//! - Randomness for an operation is derived before its transaction starts and
//!   replayed on every retry, so a retry commits the outcome the user was shown.
//!
//! ## Minimal usage
//! ```rust,ignore
//! use mora_execution::{Engine, GameParams, Memory, CoinSide};
//! use mora_types::casino::{GameKind, UserId};
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let engine = Engine::builder(Arc::new(Memory::new())).build()?;
//! let result = engine
//!     .invoke_game(UserId(1), GameKind::Coinflip, 100, GameParams::Coinflip {
//!         side: CoinSide::Heads,
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! [`DebitPolicy`]: mora_types::casino::DebitPolicy

pub mod casino;
pub mod engine;
pub mod listener;
pub mod metrics;
pub mod modifiers;
pub mod payout;
pub mod progression;
pub mod rng;
pub mod sampler;
pub mod session;
pub mod settlement;
pub mod state;

mod backoff;

#[cfg(any(test, feature = "mocks"))]
pub mod mocks;

pub use casino::registry::{BetLimits, GameConfig, GameRegistry, TimeoutPolicy};
pub use casino::{
    CoinSide, DiceDirection, Difficulty, GameError, GameParams, Hand, Resolution, RouletteBet,
    SessionAction,
};
pub use engine::{
    BuildError, Clock, Engine, EngineBuilder, EngineConfig, InvokeError, LootError,
    PendingResult, PremiumLookup, Profile, StaticPremium, SystemClock, TransferError,
};
pub use listener::{Activity, LogListener, OutcomeSummary, SettledEvent, SettlementListener};
pub use metrics::{EngineMetrics, EngineMetricsSnapshot};
pub use rng::{GameRng, RngSource};
pub use session::{SessionCoordinator, SessionError, SessionStep, SessionView};
pub use settlement::{RetryPolicy, SettleError, Settlement, SettlementResult};
pub use state::{Ledger, LedgerTx, StoreError};

#[cfg(any(test, feature = "mocks"))]
pub use engine::ManualClock;
#[cfg(any(test, feature = "mocks"))]
pub use listener::RecordingListener;
#[cfg(any(test, feature = "mocks"))]
pub use state::Memory;
