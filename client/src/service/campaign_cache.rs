//! Campaign Cache
//!
//! Keyed store of campaign listings and per-campaign details. Every fetch
//! takes a per-key sequence number when it is issued; a result is written
//! only if no newer request for the same key has resolved first.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::lock;
use crate::chain::CampaignContract;
use crate::client_error::ClientError;
use crate::models::{Address, Campaign, CampaignDetails, CampaignId};
use crate::service::contract_binding::ContractBinding;

/// Upper bound on metadata reads in flight while listing.
const LISTING_CONCURRENCY: usize = 8;

#[derive(Debug, Clone)]
struct Slot<T> {
    issued: u64,
    resolved: u64,
    value: Option<T>,
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self {
            issued: 0,
            resolved: 0,
            value: None,
        }
    }
}

impl<T: Clone> Slot<T> {
    fn issue(&mut self) -> u64 {
        self.issued += 1;
        self.issued
    }

    /// Records the outcome of request `seq`. Returns the value the caller
    /// should see: its own on success, or the newer cached one if it was
    /// overtaken and `accept` takes it.
    fn resolve(
        &mut self,
        seq: u64,
        outcome: Result<T, ClientError>,
        accept: impl Fn(&T) -> bool,
    ) -> Result<T, ClientError> {
        if seq <= self.resolved {
            return match self.value.as_ref().filter(|newer| accept(newer)) {
                Some(newer) => Ok(newer.clone()),
                None => outcome,
            };
        }
        self.resolved = seq;
        let value = outcome?;
        self.value = Some(value.clone());
        Ok(value)
    }

    fn invalidate(&mut self) {
        self.value = None;
        // drop whatever is still in flight
        self.resolved = self.issued;
    }
}

pub struct CampaignCache<C: CampaignContract> {
    binding: Arc<ContractBinding<C>>,
    listing: Mutex<Slot<Vec<Campaign>>>,
    details: Mutex<HashMap<CampaignId, Slot<CampaignDetails>>>,
}

impl<C: CampaignContract> CampaignCache<C> {
    pub fn new(binding: Arc<ContractBinding<C>>) -> Self {
        Self {
            binding,
            listing: Mutex::new(Slot::default()),
            details: Mutex::new(HashMap::new()),
        }
    }

    /// Every campaign, ordered by id. Any failed read fails the whole
    /// listing and nothing is cached.
    pub async fn list_all(&self) -> Result<Vec<Campaign>, ClientError> {
        let seq = {
            let mut slot = lock(&self.listing);
            if let Some(campaigns) = &slot.value {
                return Ok(campaigns.clone());
            }
            slot.issue()
        };

        let outcome = self.fetch_listing().await;
        if let Err(e) = &outcome {
            warn!(error = %e, "Campaign listing failed");
        }
        let mut slot = lock(&self.listing);
        if seq <= slot.resolved {
            warn!(seq = seq, "Discarding superseded campaign listing");
        }
        slot.resolve(seq, outcome, |_| true)
    }

    /// Metadata, proposals, the voting-open flag and, when `viewer` is set,
    /// the viewer's registration and vote flags, read as one unit.
    pub async fn get_one(&self, id: CampaignId, viewer: Option<Address>) -> Result<CampaignDetails, ClientError> {
        let seq = {
            let mut details = lock(&self.details);
            let slot = details.entry(id).or_default();
            if let Some(cached) = slot.value.as_ref().filter(|d| d.viewer == viewer) {
                debug!(campaign_id = id, "Campaign details served from cache");
                return Ok(cached.clone());
            }
            slot.issue()
        };

        let outcome = self.fetch_details(id, viewer).await;
        if let Err(e) = &outcome {
            warn!(campaign_id = id, error = %e, "Campaign fetch failed");
        }
        let mut details = lock(&self.details);
        let slot = details.entry(id).or_default();
        if seq <= slot.resolved {
            warn!(campaign_id = id, seq = seq, "Discarding superseded campaign fetch");
        }
        slot.resolve(seq, outcome, |newer| newer.viewer == viewer)
    }

    /// Forces the next read of `id` and of the listing to go to the chain.
    pub fn invalidate(&self, id: CampaignId) {
        if let Some(slot) = lock(&self.details).get_mut(&id) {
            slot.invalidate();
        }
        lock(&self.listing).invalidate();
        debug!(campaign_id = id, "Campaign cache invalidated");
    }

    pub fn invalidate_all(&self) {
        lock(&self.details).values_mut().for_each(Slot::invalidate);
        lock(&self.listing).invalidate();
        debug!("Campaign cache cleared");
    }

    async fn fetch_listing(&self) -> Result<Vec<Campaign>, ClientError> {
        let read = self.binding.read_handle();
        let count = read.campaign_count().await?;

        // count comes from the chain; never size anything by it up front
        let mut ids = 1..=count;
        let mut reads = JoinSet::new();
        let mut campaigns = Vec::new();
        loop {
            while reads.len() < LISTING_CONCURRENCY {
                let Some(id) = ids.next() else {
                    break;
                };
                let read = read.clone();
                reads.spawn(async move { read.campaign(id).await });
            }
            let Some(joined) = reads.join_next().await else {
                break;
            };
            // dropping `reads` on error aborts the rest
            let campaign = joined.map_err(|e| ClientError::ReadFailure(e.to_string()))??;
            campaigns.push(campaign);
        }
        campaigns.sort_by_key(|c| c.id);

        info!(count = campaigns.len(), "Campaign listing fetched");
        Ok(campaigns)
    }

    async fn fetch_details(&self, id: CampaignId, viewer: Option<Address>) -> Result<CampaignDetails, ClientError> {
        let read = self.binding.read_handle();
        let user_status = async {
            match viewer {
                Some(voter) => read.user_status(id, voter).await,
                None => Ok(Default::default()),
            }
        };

        let (campaign, proposals, is_voting_open, user_status) = tokio::try_join!(
            read.campaign(id),
            read.proposals(id),
            read.is_voting_open(id),
            user_status,
        )?;

        CampaignDetails::new(campaign, proposals, is_voting_open, viewer, user_status)
            .ok_or_else(|| ClientError::ReadFailure(format!("vote total overflow for campaign {id}")))
    }
}
