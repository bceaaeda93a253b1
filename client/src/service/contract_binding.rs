//! Contract Binding
//!
//! Hands out contract handles derived from the current wallet snapshot.
//! Handles are never memoised: a write handle carries the signer it was
//! built for, so it cannot outlive an account switch unnoticed.

use std::sync::Arc;
use tracing::debug;

use crate::chain::{CampaignContract, ContractCall, ProviderError, RawCampaignMetadata, RawProposal, U256};
use crate::client_error::ClientError;
use crate::models::{
    Address, Campaign, CampaignId, CampaignStatus, ChainId, Proposal, ResultType, TimeFrame, TxHash, TxReceipt,
    UserCampaignStatus, VotingRestriction, VotingType, WalletSnapshot,
};

pub struct ContractBinding<C: CampaignContract> {
    reader: Arc<C>,
    /// Contract reached through the wallet; `None` without a wallet.
    signer: Option<Arc<C>>,
    target_chain: ChainId,
}

impl<C: CampaignContract> ContractBinding<C> {
    pub fn new(reader: Arc<C>, signer: Option<Arc<C>>, target_chain: ChainId) -> Self {
        Self {
            reader,
            signer,
            target_chain,
        }
    }

    /// Handle for public reads; needs no wallet.
    pub fn read_handle(&self) -> ReadHandle<C> {
        ReadHandle {
            contract: Arc::clone(&self.reader),
        }
    }

    /// Handle bound to the connected account of `session`.
    pub fn write_handle(&self, session: &WalletSnapshot) -> Result<WriteHandle<C>, ClientError> {
        let signer = session.address().ok_or(ClientError::SignerUnavailable)?;
        if session.chain_id() != Some(self.target_chain) {
            return Err(ClientError::WrongChain {
                expected: self.target_chain,
                actual: session.chain_id(),
            });
        }
        let contract = self
            .signer
            .clone()
            .ok_or(ClientError::ProviderUnavailable)?;
        Ok(WriteHandle { contract, signer })
    }
}

pub struct ReadHandle<C: CampaignContract> {
    contract: Arc<C>,
}

impl<C: CampaignContract> Clone for ReadHandle<C> {
    fn clone(&self) -> Self {
        Self {
            contract: Arc::clone(&self.contract),
        }
    }
}

impl<C: CampaignContract> ReadHandle<C> {
    pub async fn campaign_count(&self) -> Result<u64, ClientError> {
        let count = self
            .contract
            .campaign_count()
            .await
            .map_err(ClientError::from_read)?;
        to_u64(count, "campaign count").map_err(ClientError::from_read)
    }

    pub async fn campaign(&self, id: CampaignId) -> Result<Campaign, ClientError> {
        debug!(campaign_id = id, "Reading campaign metadata");
        let raw = self
            .contract
            .campaign_metadata(id)
            .await
            .map_err(ClientError::from_read)?;
        normalize_campaign(id, raw).map_err(ClientError::from_read)
    }

    pub async fn proposals(&self, id: CampaignId) -> Result<Vec<Proposal>, ClientError> {
        let raw = self
            .contract
            .get_proposals(id)
            .await
            .map_err(ClientError::from_read)?;
        raw.into_iter()
            .map(normalize_proposal)
            .collect::<Result<Vec<_>, _>>()
            .map_err(ClientError::from_read)
    }

    pub async fn is_voting_open(&self, id: CampaignId) -> Result<bool, ClientError> {
        self.contract
            .is_voting_open(id)
            .await
            .map_err(ClientError::from_read)
    }

    pub async fn user_status(&self, id: CampaignId, voter: Address) -> Result<UserCampaignStatus, ClientError> {
        let (is_registered, has_voted) = tokio::try_join!(
            self.contract.get_registration_details(id, voter),
            self.contract.check_has_voted(id, voter),
        )
        .map_err(ClientError::from_read)?;
        Ok(UserCampaignStatus {
            is_registered,
            has_voted,
        })
    }
}

pub struct WriteHandle<C: CampaignContract> {
    contract: Arc<C>,
    signer: Address,
}

impl<C: CampaignContract> WriteHandle<C> {
    pub fn signer(&self) -> Address {
        self.signer
    }

    pub async fn submit(&self, call: ContractCall) -> Result<TxHash, ClientError> {
        self.contract
            .submit(self.signer, call)
            .await
            .map_err(ClientError::from_write)
    }

    pub async fn confirm(&self, hash: TxHash) -> Result<TxReceipt, ClientError> {
        self.contract
            .wait_for_confirmation(hash)
            .await
            .map_err(ClientError::from_write)
    }
}

fn to_u64(value: U256, field: &str) -> Result<u64, ProviderError> {
    value
        .to_u64()
        .ok_or_else(|| ProviderError::Decode(format!("{field} does not fit in u64: {value:?}")))
}

fn to_discriminant<T>(value: U256, field: &str) -> Result<T, ProviderError>
where
    T: TryFrom<u8>,
    T::Error: std::fmt::Display,
{
    let byte = value
        .to_u8()
        .ok_or_else(|| ProviderError::Decode(format!("{field} out of range: {value:?}")))?;
    T::try_from(byte).map_err(|e| ProviderError::Decode(e.to_string()))
}

/// Converts raw contract words into the cached model.
pub fn normalize_campaign(id: CampaignId, raw: RawCampaignMetadata) -> Result<Campaign, ProviderError> {
    let voting_type: VotingType = to_discriminant(raw.voting_type, "voting type")?;
    let restriction: VotingRestriction = to_discriminant(raw.restriction, "restriction")?;
    let result_type: ResultType = to_discriminant(raw.result_type, "result type")?;
    let status: CampaignStatus = to_discriminant(raw.status, "status")?;

    Ok(Campaign {
        id,
        description: raw.description,
        creator: raw.creator,
        voting_type,
        restriction,
        result_type,
        status,
        time_frame: TimeFrame {
            start_time: to_u64(raw.start_time, "start time")?,
            end_time: to_u64(raw.end_time, "end time")?,
        },
        max_voters: to_u64(raw.max_voters, "max voters")?,
    })
}

pub fn normalize_proposal(raw: RawProposal) -> Result<Proposal, ProviderError> {
    Ok(Proposal {
        vote_count: to_u64(raw.vote_count, "vote count")?,
        content: raw.content,
    })
}
