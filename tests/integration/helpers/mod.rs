//! Helper utilities for integration tests.

pub mod assertions;

pub use assertions::*;
pub use test_pipeline::*;
