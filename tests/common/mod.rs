//! Common test utilities for cmr-dl integration tests

#[allow(dead_code)]
pub mod fixtures;

#[allow(unused_imports)]
pub use fixtures::*;
