use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::chain::Address;

/// Contract-assigned campaign id. Ids are 1-based and dense.
pub type CampaignId = u64;

/// Seconds since the Unix epoch, as stored by the contract.
pub type UnixSeconds = u64;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown {kind} discriminant: {value}")]
pub struct UnknownDiscriminant {
    pub kind: &'static str,
    pub value: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum VotingType {
    CandidateBased = 0,
    ProposalBased = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum VotingRestriction {
    OpenToAll = 0,
    Limited = 1,
    RequiredRegistration = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ResultType {
    RankBased = 0,
    OneWinner = 1,
}

/// Contract-side lifecycle status. Informational only; phase gating uses
/// live totals and `isVotingOpen` instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum CampaignStatus {
    Created = 0,
    Active = 1,
    Ended = 2,
}

macro_rules! contract_enum {
    ($ty:ident, $kind:literal, { $($value:literal => $variant:ident),+ $(,)? }) => {
        impl TryFrom<u8> for $ty {
            type Error = UnknownDiscriminant;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $($value => Ok($ty::$variant),)+
                    _ => Err(UnknownDiscriminant { kind: $kind, value }),
                }
            }
        }

        impl From<$ty> for u8 {
            fn from(value: $ty) -> u8 {
                value as u8
            }
        }
    };
}

contract_enum!(VotingType, "voting type", { 0 => CandidateBased, 1 => ProposalBased });
contract_enum!(VotingRestriction, "restriction", { 0 => OpenToAll, 1 => Limited, 2 => RequiredRegistration });
contract_enum!(ResultType, "result type", { 0 => RankBased, 1 => OneWinner });
contract_enum!(CampaignStatus, "campaign status", { 0 => Created, 1 => Active, 2 => Ended });

impl std::fmt::Display for VotingType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VotingType::CandidateBased => write!(f, "Candidate Based"),
            VotingType::ProposalBased => write!(f, "Proposal Based"),
        }
    }
}

impl std::fmt::Display for VotingRestriction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VotingRestriction::OpenToAll => write!(f, "Open to all"),
            VotingRestriction::Limited => write!(f, "Limited"),
            VotingRestriction::RequiredRegistration => write!(f, "Registration required"),
        }
    }
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CampaignStatus::Created => write!(f, "created"),
            CampaignStatus::Active => write!(f, "active"),
            CampaignStatus::Ended => write!(f, "ended"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeFrame {
    pub start_time: UnixSeconds,
    pub end_time: UnixSeconds,
}

/// Campaign metadata. Immutable once created; only `status` changes, and
/// only through a refetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub description: String,
    pub creator: Address,
    pub voting_type: VotingType,
    pub restriction: VotingRestriction,
    pub result_type: ResultType,
    pub status: CampaignStatus,
    pub time_frame: TimeFrame,
    /// 0 means unlimited.
    pub max_voters: u64,
}

/// One option within a campaign. Its position in the list is the on-chain
/// proposal id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub content: String,
    pub vote_count: u64,
}

/// Per-viewer flags, always freshly read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCampaignStatus {
    pub is_registered: bool,
    pub has_voted: bool,
}

/// One consistent read of a campaign for one viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignDetails {
    pub campaign: Campaign,
    pub proposals: Vec<Proposal>,
    pub is_voting_open: bool,
    pub viewer: Option<Address>,
    pub user_status: UserCampaignStatus,
    pub total_votes: u64,
}

impl CampaignDetails {
    /// Builds the details and derives `total_votes` from `proposals`.
    /// Returns `None` if the sum does not fit in a `u64`.
    pub fn new(
        campaign: Campaign,
        proposals: Vec<Proposal>,
        is_voting_open: bool,
        viewer: Option<Address>,
        user_status: UserCampaignStatus,
    ) -> Option<Self> {
        let total_votes = total_votes(&proposals)?;
        Some(Self {
            campaign,
            proposals,
            is_voting_open,
            viewer,
            user_status,
            total_votes,
        })
    }
}

pub fn total_votes(proposals: &[Proposal]) -> Option<u64> {
    proposals
        .iter()
        .try_fold(0u64, |acc, proposal| acc.checked_add(proposal.vote_count))
}

/// Orders campaigns the way the listing page shows them: latest start first.
pub fn sort_newest_first(campaigns: &mut [Campaign]) {
    campaigns.sort_by(|a, b| {
        b.time_frame
            .start_time
            .cmp(&a.time_frame.start_time)
            .then_with(|| b.id.cmp(&a.id))
    });
}

/// Listing filter: free-text search over the description plus an optional
/// restriction match.
#[derive(Debug, Clone, Default)]
pub struct CampaignFilter {
    pub search: Option<String>,
    pub restriction: Option<VotingRestriction>,
}

impl CampaignFilter {
    pub fn matches(&self, campaign: &Campaign) -> bool {
        if let Some(restriction) = self.restriction {
            if campaign.restriction != restriction {
                return false;
            }
        }
        match self.search.as_deref().map(str::trim) {
            Some(term) if !term.is_empty() => campaign
                .description
                .to_lowercase()
                .contains(&term.to_lowercase()),
            _ => true,
        }
    }

    pub fn apply(&self, campaigns: &[Campaign]) -> Vec<Campaign> {
        campaigns
            .iter()
            .filter(|campaign| self.matches(campaign))
            .cloned()
            .collect()
    }
}
