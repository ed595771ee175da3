//! Core engine: registry, cookbook, resolver, planner and executor.

pub mod cookbook;
pub mod engine;
pub mod error;
pub mod executor;
pub mod fieldset;
pub mod planner;
pub mod recipe;
pub mod registry;
pub mod resolver;
pub mod state;
#[cfg(test)]
pub(crate) mod testkit;
pub mod types;
