//! Shared data types for the mora economy engine.
//!
//! Everything here is plain data: identifiers, persisted record shapes, the
//! declarative [`casino::EconomicEffect`] bundle and the constants that define
//! the progression curve and item catalog keys.

pub mod casino;

pub use casino::{
    Account, Currency, EconomicEffect, GameKind, InventoryEntry, Multiplier, ProgressionRecord,
    Reward, UserId,
};
