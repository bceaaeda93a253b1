//! External boundaries: the injected wallet provider and the campaign
//! contract ABI.
//!
//! Everything that crosses these traits is already normalised or still raw
//! in a clearly named `Raw*` type; services never see JSON-RPC payloads.

use std::future::Future;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::config::ChainConfig;
use crate::models::{Address, CampaignId, ChainId, ResultType, TxHash, TxReceipt, VotingRestriction, WalletEvent};

pub mod abi;
pub mod http_wallet;
pub mod rpc;
pub mod rpc_contract;

pub use abi::{RawCampaignMetadata, RawProposal, U256};
pub use http_wallet::HttpWalletProvider;
pub use rpc::JsonRpcClient;
pub use rpc_contract::{RetryConfig, RpcCampaignContract};

/// EIP-1193: the user rejected the request.
pub const USER_REJECTED_CODE: i64 = 4001;
/// EIP-3085: the wallet does not know the requested chain.
pub const UNRECOGNIZED_CHAIN_CODE: i64 = 4902;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("No wallet provider available")]
    Unavailable,

    #[error("{message}")]
    Rpc {
        code: i64,
        message: String,
        data: Option<serde_json::Value>,
    },

    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid response: {0}")]
    Decode(String),

    #[error("Transaction {hash} reverted{}", revert_suffix(.reason))]
    Reverted { hash: TxHash, reason: Option<String> },

    #[error("Timed out waiting for transaction {0}")]
    ConfirmationTimeout(TxHash),
}

fn revert_suffix(reason: &Option<String>) -> String {
    reason
        .as_deref()
        .map(|r| format!(": {r}"))
        .unwrap_or_default()
}

impl ProviderError {
    pub fn code(&self) -> Option<i64> {
        match self {
            ProviderError::Rpc { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn is_user_rejection(&self) -> bool {
        self.code() == Some(USER_REJECTED_CODE)
    }

    pub fn is_unrecognized_chain(&self) -> bool {
        self.code() == Some(UNRECOGNIZED_CHAIN_CODE)
    }
}

impl From<abi::AbiError> for ProviderError {
    fn from(err: abi::AbiError) -> Self {
        ProviderError::Decode(err.to_string())
    }
}

/// Injected wallet (EIP-1193 style). The wallet owns the keys; the client
/// only asks it for accounts, chain changes and signatures.
pub trait WalletProvider: Send + Sync + 'static {
    /// Prompts the user for account access.
    fn request_accounts(&self) -> impl Future<Output = Result<Vec<Address>, ProviderError>> + Send;

    /// Already-authorised accounts; never prompts.
    fn accounts(&self) -> impl Future<Output = Result<Vec<Address>, ProviderError>> + Send;

    fn chain_id(&self) -> impl Future<Output = Result<ChainId, ProviderError>> + Send;

    fn switch_chain(&self, chain_id: ChainId) -> impl Future<Output = Result<(), ProviderError>> + Send;

    fn add_chain(&self, chain: &ChainConfig) -> impl Future<Output = Result<(), ProviderError>> + Send;

    /// Native balance in the smallest unit (wei).
    fn balance(&self, address: Address) -> impl Future<Output = Result<U256, ProviderError>> + Send;

    fn subscribe(&self) -> broadcast::Receiver<WalletEvent>;
}

/// State-changing calls the contract accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractCall {
    CreateProposalBasedCampaign {
        description: String,
        restriction: VotingRestriction,
        result_type: ResultType,
        start_time: u64,
        end_time: u64,
        max_voters: u64,
        proposals: Vec<String>,
    },
    RegisterToVote {
        campaign_id: CampaignId,
        key: Option<[u8; 32]>,
    },
    VoteForProposal {
        campaign_id: CampaignId,
        proposal_id: u64,
    },
}

/// The campaign contract's fixed ABI. Reads return raw chain values; writes
/// are submitted from `from` and confirmed separately.
pub trait CampaignContract: Send + Sync + 'static {
    fn campaign_count(&self) -> impl Future<Output = Result<U256, ProviderError>> + Send;

    fn campaign_metadata(
        &self,
        id: CampaignId,
    ) -> impl Future<Output = Result<RawCampaignMetadata, ProviderError>> + Send;

    fn get_proposals(
        &self,
        id: CampaignId,
    ) -> impl Future<Output = Result<Vec<RawProposal>, ProviderError>> + Send;

    fn is_voting_open(&self, id: CampaignId) -> impl Future<Output = Result<bool, ProviderError>> + Send;

    fn get_registration_details(
        &self,
        id: CampaignId,
        voter: Address,
    ) -> impl Future<Output = Result<bool, ProviderError>> + Send;

    fn check_has_voted(
        &self,
        id: CampaignId,
        voter: Address,
    ) -> impl Future<Output = Result<bool, ProviderError>> + Send;

    fn submit(
        &self,
        from: Address,
        call: ContractCall,
    ) -> impl Future<Output = Result<TxHash, ProviderError>> + Send;

    /// Resolves once the transaction has one confirmation. A mined but
    /// failed transaction is `ProviderError::Reverted`.
    fn wait_for_confirmation(
        &self,
        hash: TxHash,
    ) -> impl Future<Output = Result<TxReceipt, ProviderError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let rejected = ProviderError::Rpc {
            code: 4001,
            message: "User rejected the request.".into(),
            data: None,
        };
        assert!(rejected.is_user_rejection());
        assert!(!rejected.is_unrecognized_chain());
        assert_eq!(rejected.to_string(), "User rejected the request.");

        let unknown_chain = ProviderError::Rpc {
            code: 4902,
            message: "Unrecognized chain ID".into(),
            data: None,
        };
        assert!(unknown_chain.is_unrecognized_chain());
        assert_eq!(ProviderError::Unavailable.code(), None);
    }

    #[test]
    fn test_reverted_message_includes_reason() {
        let hash = TxHash::from_bytes([1u8; 32]);
        let err = ProviderError::Reverted {
            hash: hash.clone(),
            reason: Some("Already voted".into()),
        };
        assert!(err.to_string().ends_with("reverted: Already voted"));

        let bare = ProviderError::Reverted { hash, reason: None };
        assert!(bare.to_string().ends_with("reverted"));
    }
}
