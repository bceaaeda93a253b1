//! Eligibility Resolver
//!
//! Pure mapping from one consistent campaign read plus the clock to the
//! phase that gates every user action. Rules are evaluated in priority
//! order and the first match wins.

use serde::{Deserialize, Serialize};

use crate::models::{CampaignDetails, TxKind, UnixSeconds, UserCampaignStatus, VotingRestriction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignPhase {
    Ended,
    RegistrationRequired,
    RegistrationClosed,
    RegisteredWaiting,
    AlreadyVoted,
    VotingClosedCapacity,
    VotingOpen,
}

impl CampaignPhase {
    /// Whether a transaction of `kind` may be submitted in this phase.
    pub fn permits(self, kind: TxKind) -> bool {
        match kind {
            TxKind::Vote => self == CampaignPhase::VotingOpen,
            TxKind::Register => self == CampaignPhase::RegistrationRequired,
            TxKind::CreateCampaign => true,
        }
    }
}

impl std::fmt::Display for CampaignPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CampaignPhase::Ended => write!(f, "This campaign has ended"),
            CampaignPhase::RegistrationRequired => write!(f, "Registration is required to vote"),
            CampaignPhase::RegistrationClosed => write!(f, "Registration is closed, voting has started"),
            CampaignPhase::RegisteredWaiting => write!(f, "You are registered, voting has not started yet"),
            CampaignPhase::AlreadyVoted => write!(f, "You have already voted"),
            CampaignPhase::VotingClosedCapacity => write!(f, "Voting closed: maximum number of voters reached"),
            CampaignPhase::VotingOpen => write!(f, "Voting is open"),
        }
    }
}

/// Everything the resolver looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseInputs {
    pub restriction: VotingRestriction,
    pub end_time: UnixSeconds,
    pub max_voters: u64,
    pub is_voting_open: bool,
    pub total_votes: u64,
    pub user_status: UserCampaignStatus,
}

impl PhaseInputs {
    fn restricted(&self) -> bool {
        self.restriction != VotingRestriction::OpenToAll
    }

    fn may_vote(&self) -> bool {
        self.is_voting_open && (self.user_status.is_registered || !self.restricted())
    }
}

impl From<&CampaignDetails> for PhaseInputs {
    fn from(details: &CampaignDetails) -> Self {
        Self {
            restriction: details.campaign.restriction,
            end_time: details.campaign.time_frame.end_time,
            max_voters: details.campaign.max_voters,
            is_voting_open: details.is_voting_open,
            total_votes: details.total_votes,
            user_status: details.user_status,
        }
    }
}

type Rule = fn(&PhaseInputs, UnixSeconds) -> bool;

fn ended(inputs: &PhaseInputs, now: UnixSeconds) -> bool {
    now > inputs.end_time
}

fn registration_required(inputs: &PhaseInputs, _: UnixSeconds) -> bool {
    inputs.restricted() && !inputs.user_status.is_registered && !inputs.is_voting_open
}

fn registration_closed(inputs: &PhaseInputs, _: UnixSeconds) -> bool {
    inputs.restricted() && !inputs.user_status.is_registered && inputs.is_voting_open
}

fn registered_waiting(inputs: &PhaseInputs, _: UnixSeconds) -> bool {
    inputs.user_status.is_registered && !inputs.is_voting_open
}

fn already_voted(inputs: &PhaseInputs, _: UnixSeconds) -> bool {
    inputs.user_status.has_voted
}

fn capacity_reached(inputs: &PhaseInputs, _: UnixSeconds) -> bool {
    inputs.may_vote() && inputs.max_voters > 0 && inputs.total_votes >= inputs.max_voters
}

fn voting_open(inputs: &PhaseInputs, _: UnixSeconds) -> bool {
    inputs.may_vote()
}

/// Priority order; the first matching rule decides the phase.
const RULES: [(CampaignPhase, Rule); 7] = [
    (CampaignPhase::Ended, ended),
    (CampaignPhase::RegistrationRequired, registration_required),
    (CampaignPhase::RegistrationClosed, registration_closed),
    (CampaignPhase::RegisteredWaiting, registered_waiting),
    (CampaignPhase::AlreadyVoted, already_voted),
    (CampaignPhase::VotingClosedCapacity, capacity_reached),
    (CampaignPhase::VotingOpen, voting_open),
];

/// `None` means there is nothing actionable to show beyond the campaign
/// data itself.
pub fn resolve(inputs: &PhaseInputs, now: UnixSeconds) -> Option<CampaignPhase> {
    RULES
        .iter()
        .find(|(_, rule)| rule(inputs, now))
        .map(|(phase, _)| *phase)
}

pub fn resolve_phase(details: &CampaignDetails, now: UnixSeconds) -> Option<CampaignPhase> {
    resolve(&PhaseInputs::from(details), now)
}

/// Whether `kind` may be submitted given a resolved phase.
pub fn permits(phase: Option<CampaignPhase>, kind: TxKind) -> bool {
    match phase {
        Some(phase) => phase.permits(kind),
        None => kind == TxKind::CreateCampaign,
    }
}
