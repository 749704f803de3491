//! Economy domain types.
//!
//! Defines account/inventory/progression/cooldown records, the game catalog and the
//! declarative effect bundle consumed by the settlement engine.

mod constants;
mod economy;
mod game;
mod player;

pub use constants::*;
pub use economy::*;
pub use game::*;
pub use player::*;
