//! Derived results and time helpers for a fetched campaign.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::models::{CampaignDetails, UnixSeconds};

const SECONDS_PER_DAY: u64 = 86_400;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalResult {
    /// On-chain proposal id (position in the proposal list).
    pub proposal_id: u64,
    pub content: String,
    pub vote_count: u64,
    /// Share of all votes cast, rounded to one decimal place.
    pub percentage: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignResults {
    pub total_votes: u64,
    /// Highest vote count first; ties keep proposal order.
    pub ranking: Vec<ProposalResult>,
    /// Every proposal sharing the top count. Empty before the first vote.
    pub winners: Vec<ProposalResult>,
    /// Votes cast against `max_voters`; `None` for unlimited campaigns.
    pub participation_rate: Option<Decimal>,
}

impl CampaignResults {
    pub fn from_details(details: &CampaignDetails) -> Self {
        let total_votes = details.total_votes;

        let mut ranking: Vec<ProposalResult> = details
            .proposals
            .iter()
            .enumerate()
            .map(|(index, proposal)| ProposalResult {
                proposal_id: index as u64,
                content: proposal.content.clone(),
                vote_count: proposal.vote_count,
                percentage: percentage(proposal.vote_count, total_votes),
            })
            .collect();
        ranking.sort_by(|a, b| b.vote_count.cmp(&a.vote_count));

        let winners = match ranking.first() {
            Some(leader) if leader.vote_count > 0 => {
                let top = leader.vote_count;
                ranking
                    .iter()
                    .take_while(|r| r.vote_count == top)
                    .cloned()
                    .collect()
            }
            _ => Vec::new(),
        };

        let max_voters = details.campaign.max_voters;
        let participation_rate = (max_voters > 0).then(|| percentage(total_votes, max_voters));

        Self {
            total_votes,
            ranking,
            winners,
            participation_rate,
        }
    }

    pub fn is_tie(&self) -> bool {
        self.winners.len() > 1
    }
}

fn percentage(part: u64, whole: u64) -> Decimal {
    if whole == 0 {
        return Decimal::ZERO;
    }
    (Decimal::from(part) * Decimal::ONE_HUNDRED / Decimal::from(whole))
        .round_dp_with_strategy(1, RoundingStrategy::MidpointAwayFromZero)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "unit", content = "value", rename_all = "lowercase")]
pub enum TimeRemaining {
    Ended,
    Days(u64),
    Weeks(u64),
}

impl std::fmt::Display for TimeRemaining {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeRemaining::Ended => write!(f, "Ended"),
            TimeRemaining::Days(1) => write!(f, "1 day"),
            TimeRemaining::Days(n) => write!(f, "{n} days"),
            TimeRemaining::Weeks(1) => write!(f, "1 week"),
            TimeRemaining::Weeks(n) => write!(f, "{n} weeks"),
        }
    }
}

/// Whole days left, shown in weeks once more than seven days remain.
pub fn time_remaining(end_time: UnixSeconds, now: UnixSeconds) -> TimeRemaining {
    if now > end_time {
        return TimeRemaining::Ended;
    }
    let days = (end_time - now) / SECONDS_PER_DAY;
    if days > 7 {
        TimeRemaining::Weeks(days / 7)
    } else {
        TimeRemaining::Days(days)
    }
}
