//! Shared utilities: arena storage and deterministic randomness.

pub mod arena;
pub mod det_rng;

pub use arena::{Arena, ArenaIndex};
pub use det_rng::DetRng;
