//! The permission engine (C1 Pattern Rule Set + C2 Permission Engine).
//!
//! Rules are compiled once, at sandbox creation, into a [`CompiledRuleSet`]
//! whose evaluation order is fixed at compile time. `evaluate` is a pure,
//! total function of `(CompiledRuleSet, path)` — callers never see partial
//! or order-dependent results.

pub mod compiled;
pub mod engine;
pub mod path;
pub mod rule;

pub use compiled::{CompiledRule, CompiledRuleSet};
pub use engine::evaluate;
pub use path::normalize;
