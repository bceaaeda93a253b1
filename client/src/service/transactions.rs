//! Transaction Orchestrator
//!
//! Runs register, vote and create-campaign calls: local precondition
//! checks, submission through a write handle, confirmation, then cache
//! invalidation and refetch. At most one transaction per kind per campaign
//! is in flight; a duplicate is rejected before any chain call.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{error, info, warn};

use super::lock;
use crate::chain::{abi, CampaignContract, ContractCall};
use crate::client_error::ClientError;
use crate::models::{
    Address, CampaignDetails, CampaignId, CreateCampaignRequest, TxKey, TxKind, TxReceipt, TxState, UnixSeconds,
    WalletSnapshot,
};
use crate::service::campaign_cache::CampaignCache;
use crate::service::contract_binding::{ContractBinding, WriteHandle};
use crate::service::eligibility::{permits, resolve_phase};
use crate::service::notifications::{Notice, NotificationHub};

/// Result of a confirmed transaction. `details` holds the refetched
/// campaign when the refetch succeeded.
#[derive(Debug, Clone)]
pub struct TxOutcome {
    pub receipt: TxReceipt,
    pub details: Option<CampaignDetails>,
}

/// Holds one in-flight slot until dropped.
struct InFlightGuard {
    key: TxKey,
    in_flight: Arc<Mutex<HashSet<TxKey>>>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        lock(&self.in_flight).remove(&self.key);
    }
}

pub struct TransactionOrchestrator<C: CampaignContract> {
    binding: Arc<ContractBinding<C>>,
    cache: Arc<CampaignCache<C>>,
    in_flight: Arc<Mutex<HashSet<TxKey>>>,
    states: watch::Sender<HashMap<TxKey, TxState>>,
    notifications: NotificationHub,
}

impl<C: CampaignContract> TransactionOrchestrator<C> {
    pub fn new(binding: Arc<ContractBinding<C>>, cache: Arc<CampaignCache<C>>, notifications: NotificationHub) -> Self {
        let (states, _) = watch::channel(HashMap::new());
        Self {
            binding,
            cache,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            states,
            notifications,
        }
    }

    pub fn state(&self, key: TxKey) -> TxState {
        self.states.borrow().get(&key).cloned().unwrap_or(TxState::Idle)
    }

    pub fn subscribe(&self) -> watch::Receiver<HashMap<TxKey, TxState>> {
        self.states.subscribe()
    }

    pub fn is_pending(&self, key: TxKey) -> bool {
        lock(&self.in_flight).contains(&key)
    }

    /// Registers the connected account. A non-blank `key` is hashed and
    /// sent with the two-argument overload.
    pub async fn register(
        &self,
        session: &WalletSnapshot,
        campaign_id: CampaignId,
        key: Option<&str>,
        now: UnixSeconds,
    ) -> Result<TxOutcome, ClientError> {
        let result = self.try_register(session, campaign_id, key, now).await;
        self.report(&result, "Registration successful");
        result
    }

    async fn try_register(
        &self,
        session: &WalletSnapshot,
        campaign_id: CampaignId,
        key: Option<&str>,
        now: UnixSeconds,
    ) -> Result<TxOutcome, ClientError> {
        let key = match key {
            Some(key) if key.trim().is_empty() => {
                return Err(ClientError::Validation("Registration key cannot be blank".to_string()));
            }
            Some(key) => Some(abi::keccak256(key.as_bytes())),
            None => None,
        };
        let write = self.binding.write_handle(session)?;
        let tx_key = TxKey::register(campaign_id);
        let _guard = self.acquire(tx_key)?;

        self.check_phase(campaign_id, write.signer(), TxKind::Register, now)
            .await?;

        let call = ContractCall::RegisterToVote { campaign_id, key };
        let receipt = self.submit(tx_key, &write, call).await?;
        let details = self.refresh_campaign(campaign_id, write.signer()).await;
        Ok(TxOutcome { receipt, details })
    }

    /// Casts the connected account's vote for `proposal_id`.
    pub async fn vote(
        &self,
        session: &WalletSnapshot,
        campaign_id: CampaignId,
        proposal_id: u64,
        now: UnixSeconds,
    ) -> Result<TxOutcome, ClientError> {
        let result = self.try_vote(session, campaign_id, proposal_id, now).await;
        self.report(&result, "Vote submitted successfully");
        result
    }

    async fn try_vote(
        &self,
        session: &WalletSnapshot,
        campaign_id: CampaignId,
        proposal_id: u64,
        now: UnixSeconds,
    ) -> Result<TxOutcome, ClientError> {
        let write = self.binding.write_handle(session)?;
        let tx_key = TxKey::vote(campaign_id);
        let _guard = self.acquire(tx_key)?;

        let details = self
            .check_phase(campaign_id, write.signer(), TxKind::Vote, now)
            .await?;
        if proposal_id >= details.proposals.len() as u64 {
            return Err(ClientError::Validation(format!(
                "Proposal {proposal_id} does not exist in campaign {campaign_id}"
            )));
        }

        let call = ContractCall::VoteForProposal {
            campaign_id,
            proposal_id,
        };
        let receipt = self.submit(tx_key, &write, call).await?;
        let details = self.refresh_campaign(campaign_id, write.signer()).await;
        Ok(TxOutcome { receipt, details })
    }

    /// Creates a proposal-based campaign after validating the form.
    pub async fn create_campaign(
        &self,
        session: &WalletSnapshot,
        request: CreateCampaignRequest,
        now: UnixSeconds,
    ) -> Result<TxOutcome, ClientError> {
        let result = self.try_create_campaign(session, request, now).await;
        self.report(&result, "Campaign created successfully");
        result
    }

    async fn try_create_campaign(
        &self,
        session: &WalletSnapshot,
        request: CreateCampaignRequest,
        now: UnixSeconds,
    ) -> Result<TxOutcome, ClientError> {
        request.validate_at(now).map_err(ClientError::Validation)?;
        let write = self.binding.write_handle(session)?;
        let tx_key = TxKey::create_campaign();
        let _guard = self.acquire(tx_key)?;

        let call = ContractCall::CreateProposalBasedCampaign {
            description: request.description,
            restriction: request.restriction,
            result_type: request.result_type,
            start_time: request.start_time,
            end_time: request.end_time,
            max_voters: request.max_voters,
            proposals: request.proposals,
        };
        let receipt = self.submit(tx_key, &write, call).await?;

        self.cache.invalidate_all();
        if let Err(e) = self.cache.list_all().await {
            warn!(error = %e, "Campaign listing refetch failed after creation");
        }
        Ok(TxOutcome {
            receipt,
            details: None,
        })
    }

    fn acquire(&self, key: TxKey) -> Result<InFlightGuard, ClientError> {
        let mut in_flight = lock(&self.in_flight);
        if !in_flight.insert(key) {
            warn!(kind = %key.kind, campaign_id = ?key.campaign_id, "Duplicate submission rejected");
            return Err(ClientError::TransactionPending(key.kind));
        }
        Ok(InFlightGuard {
            key,
            in_flight: Arc::clone(&self.in_flight),
        })
    }

    async fn check_phase(
        &self,
        campaign_id: CampaignId,
        signer: Address,
        kind: TxKind,
        now: UnixSeconds,
    ) -> Result<CampaignDetails, ClientError> {
        let details = self.cache.get_one(campaign_id, Some(signer)).await?;
        let phase = resolve_phase(&details, now);
        if !permits(phase, kind) {
            let reason = phase
                .map(|p| p.to_string())
                .unwrap_or_else(|| "voting has not started".to_string());
            return Err(ClientError::ActionNotPermitted { action: kind, reason });
        }
        Ok(details)
    }

    async fn submit(&self, key: TxKey, write: &WriteHandle<C>, call: ContractCall) -> Result<TxReceipt, ClientError> {
        self.set_state(key, TxState::Pending);

        let result = async {
            let hash = write.submit(call).await?;
            info!(kind = %key.kind, campaign_id = ?key.campaign_id, tx_hash = %hash, "Transaction pending confirmation");
            write.confirm(hash).await
        }
        .await;

        match &result {
            Ok(receipt) => {
                info!(
                    kind = %key.kind,
                    campaign_id = ?key.campaign_id,
                    tx_hash = %receipt.hash,
                    block_number = receipt.block_number,
                    "Transaction confirmed"
                );
                self.set_state(
                    key,
                    TxState::Succeeded {
                        hash: receipt.hash.clone(),
                    },
                );
            }
            Err(ClientError::UserRejected) => {
                info!(kind = %key.kind, campaign_id = ?key.campaign_id, "Transaction rejected in wallet");
                self.set_state(key, TxState::Idle);
            }
            Err(e) => {
                error!(kind = %key.kind, campaign_id = ?key.campaign_id, error = %e, "Transaction failed");
                self.set_state(
                    key,
                    TxState::Failed {
                        message: e.to_string(),
                    },
                );
            }
        }
        result
    }

    /// Drops the cached entry and reads it again. A failed refetch is logged;
    /// the transaction itself already succeeded.
    async fn refresh_campaign(&self, campaign_id: CampaignId, viewer: Address) -> Option<CampaignDetails> {
        self.cache.invalidate(campaign_id);
        match self.cache.get_one(campaign_id, Some(viewer)).await {
            Ok(details) => Some(details),
            Err(e) => {
                warn!(campaign_id = campaign_id, error = %e, "Refetch after confirmation failed");
                None
            }
        }
    }

    fn set_state(&self, key: TxKey, state: TxState) {
        self.states.send_modify(|states| {
            states.insert(key, state);
        });
    }

    fn report(&self, result: &Result<TxOutcome, ClientError>, success: &str) {
        match result {
            Ok(_) => self.notifications.publish(Notice::success(success)),
            Err(e) => self.notifications.publish(e.notice()),
        }
    }
}
