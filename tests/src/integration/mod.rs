//! Cross-crate scenarios.

pub mod flows;
pub mod handoff;
