//! Background job pipeline for NFT certificate minting.
//!
//! Customer-facing requests enqueue durable jobs; background workers claim
//! them through datastore locks, submit transactions through a failover RPC
//! layer, and a confirmation monitor finalizes whatever outlives a worker.

pub mod api;
pub mod app;
pub mod domain;
pub mod infra;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
