use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use super::campaign::{CampaignId, ResultType, UnixSeconds, VotingRestriction};
use super::chain::TxHash;

pub const MIN_CAPPED_VOTERS: u64 = 2;
pub const MAX_CAPPED_VOTERS: u64 = 10_000;

/// Kinds of state-changing contract calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxKind {
    Register,
    Vote,
    CreateCampaign,
}

impl std::fmt::Display for TxKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TxKind::Register => write!(f, "register"),
            TxKind::Vote => write!(f, "vote"),
            TxKind::CreateCampaign => write!(f, "create_campaign"),
        }
    }
}

/// Identifies one in-flight slot: at most one transaction per kind per
/// campaign. Campaign creation has no campaign yet and uses `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxKey {
    pub kind: TxKind,
    pub campaign_id: Option<CampaignId>,
}

impl TxKey {
    pub fn register(campaign_id: CampaignId) -> Self {
        Self {
            kind: TxKind::Register,
            campaign_id: Some(campaign_id),
        }
    }

    pub fn vote(campaign_id: CampaignId) -> Self {
        Self {
            kind: TxKind::Vote,
            campaign_id: Some(campaign_id),
        }
    }

    pub fn create_campaign() -> Self {
        Self {
            kind: TxKind::CreateCampaign,
            campaign_id: None,
        }
    }
}

/// Observable state of one transaction slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum TxState {
    Idle,
    Pending,
    Succeeded { hash: TxHash },
    Failed { message: String },
}

/// Mined transaction receipt, reduced to what the client needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub hash: TxHash,
    pub block_number: u64,
    pub success: bool,
}

/// Form data for `createProposalBasedCampaign`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_time_frame"))]
pub struct CreateCampaignRequest {
    #[validate(length(min = 10, max = 1000, message = "Description must be 10 to 1000 characters"))]
    pub description: String,
    pub restriction: VotingRestriction,
    pub result_type: ResultType,
    pub start_time: UnixSeconds,
    pub end_time: UnixSeconds,
    #[validate(custom(function = "validate_max_voters"))]
    pub max_voters: u64,
    #[validate(
        length(min = 2, max = 10, message = "A campaign needs 2 to 10 proposals"),
        custom(function = "validate_proposal_contents")
    )]
    pub proposals: Vec<String>,
}

fn validate_max_voters(max_voters: u64) -> Result<(), ValidationError> {
    if max_voters == 0 || (MIN_CAPPED_VOTERS..=MAX_CAPPED_VOTERS).contains(&max_voters) {
        Ok(())
    } else {
        Err(ValidationError::new("max_voters")
            .with_message("Max voters must be between 2 and 10000".into()))
    }
}

#[allow(clippy::ptr_arg)]
fn validate_proposal_contents(proposals: &Vec<String>) -> Result<(), ValidationError> {
    if proposals.iter().any(|content| content.trim().is_empty()) {
        return Err(ValidationError::new("proposals")
            .with_message("Proposals cannot be blank".into()));
    }
    Ok(())
}

fn validate_time_frame(request: &CreateCampaignRequest) -> Result<(), ValidationError> {
    if request.end_time <= request.start_time {
        return Err(ValidationError::new("time_frame")
            .with_message("End time must be after start time".into()));
    }
    Ok(())
}

impl CreateCampaignRequest {
    /// Field rules plus the clock-dependent rule that the campaign must
    /// start in the future.
    pub fn validate_at(&self, now: UnixSeconds) -> Result<(), String> {
        self.validate().map_err(|e| e.to_string())?;
        if self.start_time <= now {
            return Err("Start time must be in the future".to_string());
        }
        Ok(())
    }
}
