//! Access tiers and the guard command handlers use to enforce them.

pub mod gate;
pub mod roles;

pub use gate::{require, Gated, Permission, ReplySink, REFUSAL_MESSAGE};
