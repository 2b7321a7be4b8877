//! Chain clients and their supporting pieces.

pub mod demo;
pub mod events;
pub mod evm;
pub mod nonce;

pub use demo::DemoChainClient;
pub use evm::{EvmChainClient, EvmChainConfig};
pub use nonce::{NonceManager, PendingNonceSource};
