//! Test utilities: mock implementations of the domain contracts.
//!
//! Available to this crate's unit tests and, behind the `test-utils`
//! feature, to integration tests.

pub mod mocks;

pub use mocks::{MockChainClient, MockConfig, MockJobStore};
