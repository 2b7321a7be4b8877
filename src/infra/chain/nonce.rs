//! Per-address nonce serialization and bookkeeping.
//!
//! Guarantees that concurrent submissions from the same address never reuse
//! a sequence number within this process. Tracking is in-memory only;
//! correctness after restart relies on re-deriving from the chain's
//! pending-inclusive transaction count, which is always an inclusive upper
//! bound.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::AppError;

/// Source of the chain's pending-inclusive transaction count.
///
/// Implemented by the RPC provider; tests substitute a fixture.
#[async_trait]
pub trait PendingNonceSource: Send + Sync {
    async fn pending_transaction_count(&self, address: &str) -> Result<u64, AppError>;
}

#[async_trait]
impl PendingNonceSource for crate::infra::rpc::ResilientRpcProvider {
    async fn pending_transaction_count(&self, address: &str) -> Result<u64, AppError> {
        self.get_transaction_count(address).await
    }
}

#[derive(Debug, Default)]
struct NonceSlot {
    /// Next locally reserved nonce; `None` until first assignment or after
    /// a reset
    next: Option<u64>,
}

/// Per-address mutual exclusion gate plus next-nonce tracking
#[derive(Default)]
pub struct NonceManager {
    slots: DashMap<String, Arc<Mutex<NonceSlot>>>,
}

impl NonceManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, address: &str) -> Arc<Mutex<NonceSlot>> {
        self.slots
            .entry(address.to_lowercase())
            .or_default()
            .value()
            .clone()
    }

    /// Reserve the next nonce for `address`.
    ///
    /// Holds the per-address gate across the chain query so no two
    /// concurrent callers observe the same value:
    /// `next = max(chain pending count, locally tracked)`.
    pub async fn next_nonce(
        &self,
        address: &str,
        source: &dyn PendingNonceSource,
    ) -> Result<u64, AppError> {
        let slot = self.slot(address);
        let mut guard = slot.lock().await;

        let on_chain = source.pending_transaction_count(address).await?;
        let tracked = guard.next.unwrap_or(0);
        let next = on_chain.max(tracked);
        guard.next = Some(next + 1);

        debug!(
            address = %address,
            on_chain = on_chain,
            tracked = tracked,
            assigned = next,
            "Nonce reserved"
        );

        Ok(next)
    }

    /// Return a reserved slot when a submission failed before broadcast.
    /// No-op when tracking is already at its floor.
    pub async fn release(&self, address: &str) {
        let slot = self.slot(address);
        let mut guard = slot.lock().await;
        if let Some(next) = guard.next {
            if next > 0 {
                guard.next = Some(next - 1);
                debug!(address = %address, next = next - 1, "Nonce released");
            }
        }
    }

    /// Discard all local tracking for an address, forcing the next
    /// reservation to re-derive purely from on-chain state. Used after a
    /// detected nonce conflict.
    pub fn reset(&self, address: &str) {
        self.slots.remove(&address.to_lowercase());
        debug!(address = %address, "Nonce tracking reset");
    }
}
