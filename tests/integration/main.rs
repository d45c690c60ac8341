//! Integration Tests
//!
//! Cross-crate tests through the `annal` facade:
//! - Lifecycle scenarios and error outcomes
//! - Temporal queries against a manual clock
//! - Random operation sequences checked against a model
//! - Associations between two stores

#[path = "../common/mod.rs"]
mod common;

mod associations;
mod invariants;
mod scenarios;
mod temporal;
