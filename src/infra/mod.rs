//! Infrastructure implementations of the domain contracts.

pub mod chain;
pub mod database;
pub mod retry;
pub mod rpc;
