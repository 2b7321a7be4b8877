//! Contract call and event codecs.
//!
//! The `sol!` definitions mirror the deployed certificate and fee-token
//! contracts; decoding is pure so the monitor and the submission path can
//! share it without touching the network.

use alloy::rpc::types::Log;
use alloy::sol;

use crate::domain::MintedToken;

sol! {
    /// Emitted by the certificate contract for every successful mint.
    #[derive(Debug)]
    event NFTMinted(
        uint256 indexed tokenId,
        address indexed owner,
        string productId,
        string orderId,
        string brand,
        string productName,
        uint256 mintedAt
    );

    /// Mint entry point on the certificate contract.
    function mintNFT(
        address recipient,
        string productId,
        string orderId,
        string brand,
        string productName,
        string tokenURI
    ) returns (uint256);

    /// Fee burn entry point on the token contract.
    function burnFromFee(uint256 amount, string reason);
}

/// Scan receipt logs for the first NFTMinted event.
///
/// `None` after a successful receipt indicates a contract-behavior
/// mismatch; callers treat that as fatal.
#[must_use]
pub fn decode_minted_event(logs: &[Log]) -> Option<MintedToken> {
    logs.iter().find_map(|log| {
        log.log_decode::<NFTMinted>().ok().map(|decoded| {
            let event = decoded.inner.data;
            MintedToken {
                token_id: event.tokenId.to_string(),
                owner_address: event.owner.to_string(),
            }
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Address, LogData, U256, address};
    use alloy::sol_types::SolEvent;

    fn minted_log(token_id: u64, owner: Address) -> Log {
        let event = NFTMinted {
            tokenId: U256::from(token_id),
            owner,
            productId: "prod_1".to_string(),
            orderId: "order_1".to_string(),
            brand: "Maison".to_string(),
            productName: "Chronograph".to_string(),
            mintedAt: U256::from(1_700_000_000u64),
        };
        Log {
            inner: alloy::primitives::Log {
                address: Address::ZERO,
                data: event.encode_log_data(),
            },
            ..Default::default()
        }
    }

    fn unrelated_log() -> Log {
        Log {
            inner: alloy::primitives::Log {
                address: Address::ZERO,
                data: LogData::default(),
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_decode_minted_event() {
        let owner = address!("f39fd6e51aad88f6f4ce6ab8827279cfffb92266");
        let logs = vec![unrelated_log(), minted_log(42, owner)];

        let minted = decode_minted_event(&logs).unwrap();
        assert_eq!(minted.token_id, "42");
        assert_eq!(minted.owner_address, owner.to_string());
    }

    #[test]
    fn test_decode_returns_none_without_event() {
        assert!(decode_minted_event(&[]).is_none());
        assert!(decode_minted_event(&[unrelated_log()]).is_none());
    }
}
