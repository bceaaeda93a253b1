//! Campaign contract reached over JSON-RPC.
//!
//! Reads go through `eth_call`; writes are handed to the account-managing
//! node with `eth_sendTransaction` and then watched with
//! `eth_getTransactionReceipt` until mined.

use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::abi::{self, Token, U256};
use super::rpc::JsonRpcClient;
use super::{CampaignContract, ContractCall, ProviderError, RawCampaignMetadata, RawProposal};
use crate::models::{Address, CampaignId, TxHash, TxReceipt};

/// Receipt polling configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 30,
            initial_delay_ms: 1000,
            max_delay_ms: 10000,
            backoff_multiplier: 2.0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReceiptResponse {
    status: Option<String>,
    block_number: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RpcCampaignContract {
    rpc: Arc<JsonRpcClient>,
    address: Address,
    retry_config: RetryConfig,
}

impl RpcCampaignContract {
    pub fn with_retry_config(rpc: Arc<JsonRpcClient>, address: Address, retry_config: RetryConfig) -> Self {
        Self {
            rpc,
            address,
            retry_config,
        }
    }

    async fn eth_call(&self, data: Vec<u8>) -> Result<Vec<u8>, ProviderError> {
        let params = serde_json::json!([
            {
                "to": self.address,
                "data": format!("0x{}", hex::encode(data)),
            },
            "latest"
        ]);
        let result: String = self.rpc.call("eth_call", params).await?;
        decode_hex(&result)
    }

    async fn receipt(&self, hash: &TxHash) -> Result<Option<ReceiptResponse>, ProviderError> {
        self.rpc
            .call("eth_getTransactionReceipt", serde_json::json!([hash]))
            .await
    }
}

impl CampaignContract for RpcCampaignContract {
    async fn campaign_count(&self) -> Result<U256, ProviderError> {
        let data = self.eth_call(abi::encode_call("campaignCount()", &[])).await?;
        Ok(abi::decode_uint(&data)?)
    }

    async fn campaign_metadata(&self, id: CampaignId) -> Result<RawCampaignMetadata, ProviderError> {
        let data = self
            .eth_call(abi::encode_call("campaignMetadata(uint256)", &[uint(id)]))
            .await?;
        Ok(abi::decode_campaign_metadata(&data)?)
    }

    async fn get_proposals(&self, id: CampaignId) -> Result<Vec<RawProposal>, ProviderError> {
        let data = self
            .eth_call(abi::encode_call("getProposals(uint256)", &[uint(id)]))
            .await?;
        Ok(abi::decode_proposals(&data)?)
    }

    async fn is_voting_open(&self, id: CampaignId) -> Result<bool, ProviderError> {
        let data = self
            .eth_call(abi::encode_call("isVotingOpen(uint256)", &[uint(id)]))
            .await?;
        Ok(abi::decode_bool(&data)?)
    }

    async fn get_registration_details(&self, id: CampaignId, voter: Address) -> Result<bool, ProviderError> {
        let data = self
            .eth_call(abi::encode_call(
                "getRegistrationDetails(uint256,address)",
                &[uint(id), Token::Address(voter)],
            ))
            .await?;
        Ok(abi::decode_bool(&data)?)
    }

    async fn check_has_voted(&self, id: CampaignId, voter: Address) -> Result<bool, ProviderError> {
        let data = self
            .eth_call(abi::encode_call(
                "checkHasVoted(uint256,address)",
                &[uint(id), Token::Address(voter)],
            ))
            .await?;
        Ok(abi::decode_bool(&data)?)
    }

    async fn submit(&self, from: Address, call: ContractCall) -> Result<TxHash, ProviderError> {
        let params = serde_json::json!([{
            "from": from,
            "to": self.address,
            "data": format!("0x{}", hex::encode(call_data(&call))),
        }]);
        let hash: TxHash = self.rpc.call("eth_sendTransaction", params).await?;
        info!(tx_hash = %hash, from = %from, "Transaction submitted");
        Ok(hash)
    }

    async fn wait_for_confirmation(&self, hash: TxHash) -> Result<TxReceipt, ProviderError> {
        let mut attempt = 0;
        let mut delay = self.retry_config.initial_delay_ms;

        loop {
            match self.receipt(&hash).await {
                Ok(Some(receipt)) => {
                    let block_number = receipt
                        .block_number
                        .as_deref()
                        .and_then(U256::from_hex_quantity)
                        .and_then(U256::to_u64)
                        .unwrap_or_default();
                    return match receipt.status.as_deref() {
                        Some("0x1") => {
                            info!(tx_hash = %hash, block_number = block_number, "Transaction confirmed");
                            Ok(TxReceipt {
                                hash,
                                block_number,
                                success: true,
                            })
                        }
                        _ => {
                            error!(tx_hash = %hash, "Transaction reverted");
                            Err(ProviderError::Reverted { hash, reason: None })
                        }
                    };
                }
                Ok(None) => {
                    // not mined yet
                    if attempt >= self.retry_config.max_retries {
                        return Err(ProviderError::ConfirmationTimeout(hash));
                    }
                }
                Err(e) => {
                    warn!(
                        tx_hash = %hash,
                        attempt = attempt,
                        error = %e,
                        "Error checking transaction receipt"
                    );
                    if attempt >= self.retry_config.max_retries {
                        return Err(e);
                    }
                }
            }

            attempt += 1;
            debug!(
                tx_hash = %hash,
                attempt = attempt,
                delay_ms = delay,
                "Waiting before retry"
            );

            tokio::time::sleep(Duration::from_millis(delay)).await;

            delay = (delay as f64 * self.retry_config.backoff_multiplier) as u64;
            delay = delay.min(self.retry_config.max_delay_ms);
        }
    }
}

fn uint(value: u64) -> Token {
    Token::Uint(U256::from(value))
}

/// ABI call data for a state-changing call.
pub fn call_data(call: &ContractCall) -> Vec<u8> {
    match call {
        ContractCall::CreateProposalBasedCampaign {
            description,
            restriction,
            result_type,
            start_time,
            end_time,
            max_voters,
            proposals,
        } => abi::encode_call(
            "createProposalBasedCampaign(string,uint8,uint8,uint256,uint256,uint256,string[])",
            &[
                Token::String(description.clone()),
                Token::Uint(U256::from(u8::from(*restriction))),
                Token::Uint(U256::from(u8::from(*result_type))),
                uint(*start_time),
                uint(*end_time),
                uint(*max_voters),
                Token::Array(proposals.iter().cloned().map(Token::String).collect()),
            ],
        ),
        ContractCall::RegisterToVote {
            campaign_id,
            key: Some(key),
        } => abi::encode_call(
            "registerToVote(uint256,bytes32)",
            &[uint(*campaign_id), Token::FixedBytes(*key)],
        ),
        ContractCall::RegisterToVote {
            campaign_id,
            key: None,
        } => abi::encode_call("registerToVote(uint256)", &[uint(*campaign_id)]),
        ContractCall::VoteForProposal {
            campaign_id,
            proposal_id,
        } => abi::encode_call(
            "voteForProposal(uint256,uint256)",
            &[uint(*campaign_id), uint(*proposal_id)],
        ),
    }
}

fn decode_hex(value: &str) -> Result<Vec<u8>, ProviderError> {
    hex::decode(value.strip_prefix("0x").unwrap_or(value))
        .map_err(|e| ProviderError::Decode(format!("bad hex payload: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ResultType, VotingRestriction};

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 30);
        assert_eq!(config.initial_delay_ms, 1000);
        assert_eq!(config.max_delay_ms, 10000);
        assert_eq!(config.backoff_multiplier, 2.0);
    }

    #[test]
    fn test_register_overloads_use_distinct_selectors() {
        let with_key = call_data(&ContractCall::RegisterToVote {
            campaign_id: 1,
            key: Some([9u8; 32]),
        });
        let without_key = call_data(&ContractCall::RegisterToVote {
            campaign_id: 1,
            key: None,
        });
        assert_eq!(&with_key[..4], &abi::selector("registerToVote(uint256,bytes32)"));
        assert_eq!(&without_key[..4], &abi::selector("registerToVote(uint256)"));
        assert_eq!(with_key.len(), 4 + 64);
        assert_eq!(&with_key[36..], &[9u8; 32]);
        assert_eq!(without_key.len(), 4 + 32);
    }

    #[test]
    fn test_create_campaign_call_data() {
        let data = call_data(&ContractCall::CreateProposalBasedCampaign {
            description: "Pick the next community project".into(),
            restriction: VotingRestriction::RequiredRegistration,
            result_type: ResultType::OneWinner,
            start_time: 100,
            end_time: 200,
            max_voters: 0,
            proposals: vec!["Park".into(), "Library".into()],
        });
        let args = abi::AbiDecoder::new(&data[4..]);
        assert_eq!(args.uint(32).unwrap().to_u8(), Some(2));
        assert_eq!(args.uint(64).unwrap().to_u8(), Some(1));
        assert_eq!(args.uint(96).unwrap().to_u64(), Some(100));
        assert_eq!(args.uint(128).unwrap().to_u64(), Some(200));
        let description_at = args.offset(0).unwrap();
        assert_eq!(args.string(description_at).unwrap(), "Pick the next community project");
        let proposals = args.sub(args.offset(192).unwrap()).unwrap();
        assert_eq!(proposals.offset(0).unwrap(), 2);
    }

    #[test]
    fn test_decode_hex_payload() {
        assert_eq!(decode_hex("0x0a0b").unwrap(), vec![10, 11]);
        assert!(matches!(decode_hex("0xzz"), Err(ProviderError::Decode(_))));
    }

    #[test]
    fn test_receipt_response_deserialization() {
        let receipt: ReceiptResponse =
            serde_json::from_str(r#"{"status":"0x1","blockNumber":"0x10","transactionHash":"0xab"}"#).unwrap();
        assert_eq!(receipt.status.as_deref(), Some("0x1"));
        assert_eq!(receipt.block_number.as_deref(), Some("0x10"));
    }
}
