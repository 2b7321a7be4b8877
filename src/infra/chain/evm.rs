//! EVM transaction submission client.
//!
//! Composes the nonce manager, the resilient RPC provider, and the retry
//! executor to submit one business-level action as one transaction, wait
//! for inclusion, and extract the structured result from emitted logs.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

use alloy::consensus::TxReceipt;
use alloy::eips::eip2718::Encodable2718;
use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes, U256};
use alloy::rpc::types::{Log, TransactionRequest};
use alloy::signers::local::PrivateKeySigner;
use alloy::sol_types::SolCall;

use crate::domain::{
    AppError, BlockchainError, BurnRequest, BurnResult, ChainClient, ChainSettings, ConfigError,
    CreatedWallet, MintRequest, MintResult, ReceiptSummary,
};
use crate::infra::chain::events::{burnFromFeeCall, decode_minted_event, mintNFTCall};
use crate::infra::chain::nonce::NonceManager;
use crate::infra::retry::{RetryPolicy, execute_with_retry};
use crate::infra::rpc::ResilientRpcProvider;

/// Configuration for the EVM client.
///
/// All fields are required before any network attempt; absence is a
/// configuration error, not a runtime failure.
pub struct EvmChainConfig {
    /// Hex-encoded signing key, never logged
    pub private_key: SecretString,
    /// Certificate contract address
    pub nft_contract: String,
    /// Fee token contract address (required for BURN_FEE jobs)
    pub token_contract: Option<String>,
    /// Chain used for health checks and wallet-only deployments
    pub default_chain: String,
    /// Hard cap on the in-process confirmation wait
    pub confirmation_timeout: Duration,
    /// Receipt poll cadence during the confirmation wait
    pub receipt_poll_interval: Duration,
}

impl Default for EvmChainConfig {
    fn default() -> Self {
        Self {
            private_key: SecretString::from(String::new()),
            nft_contract: String::new(),
            token_contract: None,
            default_chain: "base-sepolia".to_string(),
            confirmation_timeout: Duration::from_secs(180),
            receipt_poll_interval: Duration::from_secs(2),
        }
    }
}

struct ConfirmedReceipt {
    tx_hash: String,
    block_number: u64,
    logs: Vec<Log>,
}

/// Real blockchain client backed by per-chain resilient providers
pub struct EvmChainClient {
    providers: HashMap<String, Arc<ResilientRpcProvider>>,
    settings: HashMap<String, ChainSettings>,
    signer: PrivateKeySigner,
    nft_contract: Address,
    token_contract: Option<Address>,
    nonces: NonceManager,
    retry: RetryPolicy,
    confirmation_timeout: Duration,
    receipt_poll_interval: Duration,
    default_chain: String,
}

impl EvmChainClient {
    pub fn new(
        config: EvmChainConfig,
        providers: HashMap<String, Arc<ResilientRpcProvider>>,
        settings: HashMap<String, ChainSettings>,
    ) -> Result<Self, AppError> {
        let key = config.private_key.expose_secret();
        if key.is_empty() {
            return Err(AppError::Config(ConfigError::Missing(
                "MINTER_PRIVATE_KEY".to_string(),
            )));
        }
        let signer: PrivateKeySigner = key
            .strip_prefix("0x")
            .unwrap_or(key)
            .parse()
            .map_err(|e| {
                AppError::Config(ConfigError::Invalid {
                    field: "MINTER_PRIVATE_KEY".to_string(),
                    message: format!("invalid private key: {}", e),
                })
            })?;

        if config.nft_contract.is_empty() {
            return Err(AppError::Config(ConfigError::Missing(
                "NFT_CONTRACT_ADDRESS".to_string(),
            )));
        }
        let nft_contract: Address = config.nft_contract.parse().map_err(|e| {
            AppError::Config(ConfigError::Invalid {
                field: "NFT_CONTRACT_ADDRESS".to_string(),
                message: format!("invalid contract address: {}", e),
            })
        })?;

        let token_contract = config
            .token_contract
            .as_deref()
            .map(|addr| {
                addr.parse::<Address>().map_err(|e| {
                    AppError::Config(ConfigError::Invalid {
                        field: "TOKEN_CONTRACT_ADDRESS".to_string(),
                        message: format!("invalid contract address: {}", e),
                    })
                })
            })
            .transpose()?;

        info!(
            address = %signer.address(),
            nft_contract = %nft_contract,
            default_chain = %config.default_chain,
            "EVM chain client initialized"
        );

        Ok(Self {
            providers,
            settings,
            signer,
            nft_contract,
            token_contract,
            nonces: NonceManager::new(),
            // Small fixed budget for the whole submit-and-confirm sequence
            retry: RetryPolicy::new(3, Duration::from_secs(3), Duration::from_secs(30)),
            confirmation_timeout: config.confirmation_timeout,
            receipt_poll_interval: config.receipt_poll_interval,
            default_chain: config.default_chain,
        })
    }

    fn provider(&self, chain: &str) -> Result<&Arc<ResilientRpcProvider>, AppError> {
        self.providers
            .get(chain)
            .ok_or_else(|| AppError::NotSupported(format!("no RPC provider for chain: {}", chain)))
    }

    fn chain_settings(&self, chain: &str) -> Result<&ChainSettings, AppError> {
        self.settings
            .get(chain)
            .ok_or_else(|| AppError::NotSupported(format!("no settings for chain: {}", chain)))
    }

    /// Submit calldata as one EIP-1559 transaction and wait for the safe
    /// confirmation depth, bounded by the confirmation timeout.
    ///
    /// Failure classification:
    /// - hash already broadcast: `Unconfirmed { tx_hash }`, never resubmit
    /// - nonce conflict, no hash: reset tracking, retryable
    /// - any other failure, no hash: release the reserved nonce
    async fn submit_and_confirm(
        &self,
        chain: &str,
        to: Address,
        calldata: Vec<u8>,
    ) -> Result<ConfirmedReceipt, AppError> {
        let provider = self.provider(chain)?;
        let settings = self.chain_settings(chain)?;
        let sender = self.signer.address().to_string();

        let nonce = self.nonces.next_nonce(&sender, provider.as_ref()).await?;

        let mut tx_hash: Option<String> = None;
        let result = self
            .broadcast_and_wait(provider, settings, to, calldata, nonce, &mut tx_hash)
            .await;

        match result {
            Ok(receipt) => Ok(receipt),
            Err(err) => match tx_hash {
                // Broadcast succeeded; resubmitting risks a double-send, so
                // surface the hash for out-of-band confirmation tracking.
                Some(hash) => {
                    warn!(tx_hash = %hash, error = %err, "Transaction may still be pending on-chain");
                    Err(AppError::Blockchain(BlockchainError::Unconfirmed {
                        tx_hash: hash,
                    }))
                }
                None => {
                    if matches!(
                        err,
                        AppError::Blockchain(BlockchainError::NonceConflict(_))
                    ) {
                        self.nonces.reset(&sender);
                    } else {
                        self.nonces.release(&sender).await;
                    }
                    Err(err)
                }
            },
        }
    }

    async fn broadcast_and_wait(
        &self,
        provider: &Arc<ResilientRpcProvider>,
        settings: &ChainSettings,
        to: Address,
        calldata: Vec<u8>,
        nonce: u64,
        tx_hash: &mut Option<String>,
    ) -> Result<ConfirmedReceipt, AppError> {
        // 1.5x headroom on both fee components to survive fee volatility
        let fees = provider.get_fee_estimate().await?;
        let max_fee_per_gas = fees.max_fee_per_gas * 150 / 100;
        let max_priority_fee_per_gas = fees.max_priority_fee_per_gas * 150 / 100;

        let sender = self.signer.address().to_string();
        let data_hex = alloy::hex::encode_prefixed(&calldata);
        let gas = provider
            .estimate_gas(&sender, &to.to_string(), &data_hex)
            .await?;
        let gas_limit = gas + gas / 5;

        let request = TransactionRequest::default()
            .with_from(self.signer.address())
            .with_to(to)
            .with_input(Bytes::from(calldata))
            .with_nonce(nonce)
            .with_chain_id(settings.chain_id)
            .with_gas_limit(gas_limit)
            .with_max_fee_per_gas(max_fee_per_gas)
            .with_max_priority_fee_per_gas(max_priority_fee_per_gas);

        let wallet = EthereumWallet::from(self.signer.clone());
        let envelope = request.build(&wallet).await.map_err(|e| {
            AppError::Internal(format!("failed to sign transaction: {}", e))
        })?;

        let hash = provider
            .send_raw_transaction(&envelope.encoded_2718())
            .await?;
        *tx_hash = Some(hash.clone());
        info!(tx_hash = %hash, nonce = nonce, "Transaction submitted");

        // Race the confirmation wait against a hard timeout. Exceeding it
        // does not cancel the broadcast; it only stops waiting.
        let confirmed = tokio::time::timeout(
            self.confirmation_timeout,
            self.wait_for_confirmations(provider, &hash, settings.safe_confirmations),
        )
        .await
        .map_err(|_| {
            AppError::Blockchain(BlockchainError::Unconfirmed {
                tx_hash: hash.clone(),
            })
        })??;

        Ok(confirmed)
    }

    async fn wait_for_confirmations(
        &self,
        provider: &Arc<ResilientRpcProvider>,
        tx_hash: &str,
        required: u64,
    ) -> Result<ConfirmedReceipt, AppError> {
        let mut ticker = tokio::time::interval(self.receipt_poll_interval);

        loop {
            ticker.tick().await;

            let receipt = match provider.get_transaction_receipt(tx_hash).await? {
                Some(receipt) => receipt,
                None => continue,
            };

            if !receipt.status() {
                return Err(AppError::Blockchain(BlockchainError::Reverted(format!(
                    "transaction {} reverted on-chain",
                    tx_hash
                ))));
            }

            let block_number = match receipt.block_number {
                Some(block) => block,
                None => continue,
            };
            let current = provider.get_block_number().await?;
            let confirmations = current.saturating_sub(block_number) + 1;

            if confirmations >= required {
                info!(
                    tx_hash = %tx_hash,
                    block = block_number,
                    confirmations = confirmations,
                    "Transaction confirmed"
                );
                return Ok(ConfirmedReceipt {
                    tx_hash: tx_hash.to_string(),
                    block_number,
                    logs: receipt.inner.logs().to_vec(),
                });
            }
        }
    }

    async fn try_mint(&self, request: &MintRequest) -> Result<MintResult, AppError> {
        let recipient: Address = request.recipient_address.parse().map_err(|e| {
            AppError::Validation(crate::domain::ValidationError::InvalidField {
                field: "recipient_address".to_string(),
                message: format!("{}", e),
            })
        })?;

        let calldata = mintNFTCall {
            recipient,
            productId: request.product_id.clone(),
            orderId: request.order_id.clone(),
            brand: request.brand.clone(),
            productName: request.product_name.clone(),
            tokenURI: request.token_uri.clone(),
        }
        .abi_encode();

        let confirmed = self
            .submit_and_confirm(&request.chain, self.nft_contract, calldata)
            .await?;

        // A successful receipt without the mint event is a contract-behavior
        // mismatch, not a transient fault.
        let minted = decode_minted_event(&confirmed.logs).ok_or_else(|| {
            AppError::Blockchain(BlockchainError::MissingEvent(format!(
                "NFTMinted event not found in receipt for {}",
                confirmed.tx_hash
            )))
        })?;

        Ok(MintResult {
            token_id: minted.token_id,
            tx_hash: confirmed.tx_hash,
            block_number: confirmed.block_number,
        })
    }

    async fn try_burn(&self, request: &BurnRequest) -> Result<BurnResult, AppError> {
        let token_contract = self.token_contract.ok_or_else(|| {
            AppError::Config(ConfigError::Missing("TOKEN_CONTRACT_ADDRESS".to_string()))
        })?;

        let amount = U256::from_str(&request.amount_wei).map_err(|e| {
            AppError::Validation(crate::domain::ValidationError::InvalidField {
                field: "amount_wei".to_string(),
                message: format!("{}", e),
            })
        })?;

        let calldata = burnFromFeeCall {
            amount,
            reason: request.reason.clone(),
        }
        .abi_encode();

        let confirmed = self
            .submit_and_confirm(&request.chain, token_contract, calldata)
            .await?;

        Ok(BurnResult {
            tx_hash: confirmed.tx_hash,
            block_number: confirmed.block_number,
        })
    }
}

#[async_trait]
impl ChainClient for EvmChainClient {
    async fn health_check(&self) -> Result<(), AppError> {
        let provider = self.provider(&self.default_chain)?;
        provider.get_block_number().await?;
        Ok(())
    }

    async fn create_wallet(&self) -> Result<CreatedWallet, AppError> {
        let signer = PrivateKeySigner::random();
        Ok(CreatedWallet {
            address: signer.address().to_string(),
            private_key: SecretString::from(alloy::hex::encode_prefixed(signer.to_bytes())),
        })
    }

    #[instrument(skip(self, request), fields(order_id = %request.order_id, chain = %request.chain))]
    async fn mint_certificate(&self, request: &MintRequest) -> Result<MintResult, AppError> {
        // The whole submit-and-confirm sequence retries only while no hash
        // has been produced; `Unconfirmed` is non-retryable by taxonomy.
        execute_with_retry(&self.retry, || self.try_mint(request)).await
    }

    #[instrument(skip(self, request), fields(order_id = %request.order_id, chain = %request.chain))]
    async fn burn_fee(&self, request: &BurnRequest) -> Result<BurnResult, AppError> {
        execute_with_retry(&self.retry, || self.try_burn(request)).await
    }

    async fn transaction_receipt(
        &self,
        chain: &str,
        tx_hash: &str,
    ) -> Result<Option<ReceiptSummary>, AppError> {
        let provider = self.provider(chain)?;
        let receipt = match provider.get_transaction_receipt(tx_hash).await? {
            Some(receipt) => receipt,
            None => return Ok(None),
        };

        Ok(Some(ReceiptSummary {
            success: receipt.status(),
            block_number: receipt.block_number.unwrap_or(0),
            minted: decode_minted_event(receipt.inner.logs()),
        }))
    }

    async fn block_number(&self, chain: &str) -> Result<u64, AppError> {
        self.provider(chain)?.get_block_number().await
    }
}
