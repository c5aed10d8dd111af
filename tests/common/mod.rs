//! Common test utilities for par2guard integration tests

#[allow(dead_code)]
pub mod fixtures;
#[allow(dead_code)]
pub mod runner;

#[allow(unused_imports)]
pub use fixtures::*;
#[allow(unused_imports)]
pub use runner::*;
