//! Verification gate: pure evaluator from a company's signal list to a
//! routing decision. No I/O, no clock reads (the caller passes `now`),
//! deterministic for a given input.

mod config;
mod evaluate;

pub use config::{GateConfig, SourceTier};
pub use evaluate::{evaluate, Contribution, GateDecision, GateVerdict};
