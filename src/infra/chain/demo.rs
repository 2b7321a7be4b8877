//! Demo chain client for environments without a funded signing key.
//!
//! Produces deterministic-looking placeholder results so the rest of the
//! pipeline (queue, monitor, API) can be exercised end to end. Every call
//! logs loudly that nothing reached a chain.

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use secrecy::SecretString;
use tracing::warn;

use crate::domain::{
    AppError, BurnRequest, BurnResult, ChainClient, CreatedWallet, MintRequest, MintResult,
    MintedToken, ReceiptSummary,
};

/// Stand-in for `EvmChainClient` when no signing key is configured
#[derive(Debug, Default)]
pub struct DemoChainClient;

impl DemoChainClient {
    #[must_use]
    pub fn new() -> Self {
        warn!("DEMO MODE: blockchain client is simulated, no transactions will be broadcast");
        Self
    }

    fn fake_hash() -> String {
        let bytes: [u8; 32] = rand::thread_rng().r#gen();
        alloy::hex::encode_prefixed(bytes)
    }
}

#[async_trait]
impl ChainClient for DemoChainClient {
    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }

    async fn create_wallet(&self) -> Result<CreatedWallet, AppError> {
        let signer = alloy::signers::local::PrivateKeySigner::random();
        warn!("DEMO MODE: generated throwaway wallet");
        Ok(CreatedWallet {
            address: signer.address().to_string(),
            private_key: SecretString::from(alloy::hex::encode_prefixed(signer.to_bytes())),
        })
    }

    async fn mint_certificate(&self, request: &MintRequest) -> Result<MintResult, AppError> {
        let token_id = rand::thread_rng().gen_range(1..1_000_000u64);
        warn!(
            order_id = %request.order_id,
            token_id = token_id,
            "DEMO MODE: simulated mint, nothing was broadcast"
        );
        Ok(MintResult {
            token_id: token_id.to_string(),
            tx_hash: Self::fake_hash(),
            block_number: Utc::now().timestamp() as u64,
        })
    }

    async fn burn_fee(&self, request: &BurnRequest) -> Result<BurnResult, AppError> {
        warn!(
            order_id = %request.order_id,
            amount_wei = %request.amount_wei,
            "DEMO MODE: simulated fee burn, nothing was broadcast"
        );
        Ok(BurnResult {
            tx_hash: Self::fake_hash(),
            block_number: Utc::now().timestamp() as u64,
        })
    }

    async fn transaction_receipt(
        &self,
        _chain: &str,
        _tx_hash: &str,
    ) -> Result<Option<ReceiptSummary>, AppError> {
        // Simulated transactions confirm instantly and deeply
        Ok(Some(ReceiptSummary {
            success: true,
            block_number: 1,
            minted: Some(MintedToken {
                token_id: rand::thread_rng().gen_range(1..1_000_000u64).to_string(),
                owner_address: alloy::primitives::Address::ZERO.to_string(),
            }),
        }))
    }

    async fn block_number(&self, _chain: &str) -> Result<u64, AppError> {
        Ok(u64::MAX / 2)
    }
}
