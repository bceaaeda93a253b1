// Service layer for the Polytix client
pub mod campaign_cache;
pub mod contract_binding;
pub mod eligibility;
pub mod notifications;
pub mod results;
pub mod transactions;
pub mod voting_client;
pub mod wallet_session;


pub use campaign_cache::CampaignCache;
pub use contract_binding::{ContractBinding, ReadHandle, WriteHandle};
pub use eligibility::{resolve, resolve_phase, CampaignPhase, PhaseInputs};
pub use notifications::{Notice, NoticeLevel, NotificationHub};
pub use results::{time_remaining, CampaignResults, ProposalResult, TimeRemaining};
pub use transactions::{TransactionOrchestrator, TxOutcome};
pub use voting_client::{CampaignView, VotingClient};
pub use wallet_session::WalletSession;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Locks a std mutex, recovering the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
