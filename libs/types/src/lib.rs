//! Types library for the devnet transaction explorer
//!
//! This library provides the domain types shared between the explorer
//! service and its storage backends.
//!
//! # Modules
//! - `event`: transaction lifecycle events and the ordered state set
//! - `stats`: dashboard counters and their supported time ranges

pub mod event;
pub mod stats;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::event::*;
    pub use crate::stats::*;
}
