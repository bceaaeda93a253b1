//! Voting Client
//!
//! Explicitly constructed engine that owns one wallet session, the contract
//! binding, the campaign cache and the transaction orchestrator. Callers
//! read derived views and submit actions through it; nothing is global.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

use crate::chain::{CampaignContract, WalletProvider};
use crate::client_error::ClientError;
use crate::config::ChainConfig;
use crate::models::{
    sort_newest_first, Campaign, CampaignDetails, CampaignFilter, CampaignId, CreateCampaignRequest, TxKey, TxState,
    UnixSeconds, WalletSnapshot,
};
use crate::service::campaign_cache::CampaignCache;
use crate::service::contract_binding::ContractBinding;
use crate::service::eligibility::{resolve_phase, CampaignPhase};
use crate::service::notifications::{Notice, NotificationHub};
use crate::service::results::{time_remaining, CampaignResults, TimeRemaining};
use crate::service::transactions::{TransactionOrchestrator, TxOutcome};
use crate::service::wallet_session::WalletSession;

/// Everything a campaign page renders, derived from one consistent read.
#[derive(Debug, Clone, Serialize)]
pub struct CampaignView {
    pub details: CampaignDetails,
    pub phase: Option<CampaignPhase>,
    pub results: CampaignResults,
    pub time_remaining: TimeRemaining,
}

impl CampaignView {
    pub fn derive(details: CampaignDetails, now: UnixSeconds) -> Self {
        Self {
            phase: resolve_phase(&details, now),
            results: CampaignResults::from_details(&details),
            time_remaining: time_remaining(details.campaign.time_frame.end_time, now),
            details,
        }
    }
}

pub struct VotingClient<P: WalletProvider, C: CampaignContract> {
    session: Arc<WalletSession<P>>,
    cache: Arc<CampaignCache<C>>,
    transactions: TransactionOrchestrator<C>,
    notifications: NotificationHub,
}

impl<P: WalletProvider, C: CampaignContract> VotingClient<P, C> {
    /// `provider` and `signer` are `None` when no wallet is available;
    /// public reads still work through `reader`.
    pub fn new(
        chain: ChainConfig,
        balance_poll_interval: Duration,
        provider: Option<Arc<P>>,
        reader: Arc<C>,
        signer: Option<Arc<C>>,
    ) -> Self {
        let notifications = NotificationHub::default();
        let target_chain = chain.chain_id;
        let session = Arc::new(WalletSession::new(
            provider,
            chain,
            balance_poll_interval,
            notifications.clone(),
        ));
        let binding = Arc::new(ContractBinding::new(reader, signer, target_chain));
        let cache = Arc::new(CampaignCache::new(Arc::clone(&binding)));
        let transactions = TransactionOrchestrator::new(binding, Arc::clone(&cache), notifications.clone());

        Self {
            session,
            cache,
            transactions,
            notifications,
        }
    }

    /// Restores an authorised session, if any, and starts following wallet
    /// events.
    pub async fn init(&self) {
        if !self.session.has_provider() {
            warn!("No wallet provider configured; running read-only");
            self.notifications
                .publish(ClientError::ProviderUnavailable.notice());
        }
        if let Err(e) = self.session.check_existing().await {
            warn!(error = %e, "Could not restore wallet session");
        }
        self.session.spawn_event_listener();
        info!("Voting client initialised");
    }

    pub fn teardown(&self) {
        self.session.teardown();
        info!("Voting client torn down");
    }

    pub fn wallet(&self) -> WalletSnapshot {
        self.session.snapshot()
    }

    pub fn subscribe_wallet(&self) -> watch::Receiver<WalletSnapshot> {
        self.session.subscribe()
    }

    pub fn subscribe_notices(&self) -> broadcast::Receiver<Notice> {
        self.notifications.subscribe()
    }

    pub fn tx_state(&self, key: TxKey) -> TxState {
        self.transactions.state(key)
    }

    pub async fn connect(&self) -> Result<WalletSnapshot, ClientError> {
        self.session.connect().await
    }

    pub fn disconnect(&self) {
        self.session.disconnect();
    }

    /// Filtered listing, newest start first.
    pub async fn campaigns(&self, filter: &CampaignFilter) -> Result<Vec<Campaign>, ClientError> {
        let campaigns = self.cache.list_all().await.inspect_err(|e| {
            self.notifications.publish(e.notice());
        })?;
        let mut visible = filter.apply(&campaigns);
        sort_newest_first(&mut visible);
        Ok(visible)
    }

    /// Details, phase and results for the current viewer.
    pub async fn campaign_view(&self, id: CampaignId) -> Result<CampaignView, ClientError> {
        let viewer = self.session.snapshot().address();
        let details = self.cache.get_one(id, viewer).await.inspect_err(|e| {
            self.notifications.publish(e.notice());
        })?;
        Ok(CampaignView::derive(details, now()))
    }

    /// Drops the cached entry and reads it again.
    pub async fn refresh_campaign(&self, id: CampaignId) -> Result<CampaignView, ClientError> {
        self.cache.invalidate(id);
        self.campaign_view(id).await
    }

    pub async fn register(&self, id: CampaignId, key: Option<&str>) -> Result<TxOutcome, ClientError> {
        let outcome = self
            .transactions
            .register(&self.session.snapshot(), id, key, now())
            .await?;
        self.after_confirmation().await;
        Ok(outcome)
    }

    pub async fn vote(&self, id: CampaignId, proposal_id: u64) -> Result<TxOutcome, ClientError> {
        let outcome = self
            .transactions
            .vote(&self.session.snapshot(), id, proposal_id, now())
            .await?;
        self.after_confirmation().await;
        Ok(outcome)
    }

    pub async fn create_campaign(&self, request: CreateCampaignRequest) -> Result<TxOutcome, ClientError> {
        let outcome = self
            .transactions
            .create_campaign(&self.session.snapshot(), request, now())
            .await?;
        self.after_confirmation().await;
        Ok(outcome)
    }

    async fn after_confirmation(&self) {
        if let Err(e) = self.session.refresh_balance().await {
            warn!(error = %e, "Balance refresh after transaction failed");
        }
    }
}

impl<P: WalletProvider, C: CampaignContract> Drop for VotingClient<P, C> {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn now() -> UnixSeconds {
    u64::try_from(Utc::now().timestamp()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChainId, VotingRestriction};
    use crate::test_support::{address, raw_campaign, target_chain, MockContract, MockWallet, ONE_ETH_WEI};
    use rust_decimal::Decimal;
    use tokio_test::assert_ok;

    const TARGET: ChainId = ChainId(0x98a);

    fn client(wallet: MockWallet) -> (Arc<MockWallet>, Arc<MockContract>, VotingClient<MockWallet, MockContract>) {
        let now = now();
        let contract = MockContract::new();
        contract.add_campaign(1, raw_campaign(0, now - 3_600, now + 86_400, 0), vec![("Park", 1), ("Library", 0)], true);
        contract.add_campaign(2, raw_campaign(2, now + 3_600, now + 30 * 86_400, 0), vec![("Yes", 0), ("No", 0)], false);
        let contract = Arc::new(contract);
        let wallet = Arc::new(wallet);
        let client = VotingClient::new(
            target_chain(),
            Duration::from_secs(12),
            Some(Arc::clone(&wallet)),
            Arc::clone(&contract),
            Some(Arc::clone(&contract)),
        );
        (wallet, contract, client)
    }

    #[tokio::test]
    async fn test_init_restores_authorised_session() {
        let (_wallet, _contract, client) = client(MockWallet::new(vec![address(1)], TARGET).authorized());
        client.init().await;
        assert_eq!(client.wallet().address(), Some(address(1)));
        client.teardown();
    }

    #[tokio::test]
    async fn test_read_only_without_wallet() {
        let contract = Arc::new(MockContract::new());
        contract.add_campaign(1, raw_campaign(0, 0, u64::MAX / 2, 0), vec![("A", 0), ("B", 0)], true);
        let client: VotingClient<MockWallet, MockContract> =
            VotingClient::new(target_chain(), Duration::from_secs(12), None, Arc::clone(&contract), None);
        let mut notices = client.subscribe_notices();

        client.init().await;

        assert!(notices.recv().await.unwrap().persistent);
        let view = assert_ok!(client.campaign_view(1).await);
        assert_eq!(view.phase, Some(CampaignPhase::VotingOpen));
        assert_eq!(client.vote(1, 0).await.err(), Some(ClientError::SignerUnavailable));
    }

    #[tokio::test]
    async fn test_campaign_listing_is_filtered_and_sorted() {
        let (_wallet, _contract, client) = client(MockWallet::new(vec![address(1)], TARGET));

        let all = assert_ok!(client.campaigns(&CampaignFilter::default()).await);
        assert_eq!(all.iter().map(|c| c.id).collect::<Vec<_>>(), vec![2, 1]);

        let filter = CampaignFilter {
            search: None,
            restriction: Some(VotingRestriction::RequiredRegistration),
        };
        let restricted = assert_ok!(client.campaigns(&filter).await);
        assert_eq!(restricted.len(), 1);
        assert_eq!(restricted[0].id, 2);
    }

    #[tokio::test]
    async fn test_view_follows_connected_viewer() {
        let (_wallet, _contract, client) = client(MockWallet::new(vec![address(1)], TARGET));

        let anonymous = assert_ok!(client.campaign_view(2).await);
        assert_eq!(anonymous.details.viewer, None);
        assert_eq!(anonymous.time_remaining, TimeRemaining::Weeks(4));

        assert_ok!(client.connect().await);
        let personal = assert_ok!(client.campaign_view(2).await);
        assert_eq!(personal.details.viewer, Some(address(1)));
        assert_eq!(personal.phase, Some(CampaignPhase::RegistrationRequired));
    }

    #[tokio::test]
    async fn test_vote_end_to_end_refreshes_balance() {
        let (wallet, _contract, client) = client(MockWallet::new(vec![address(1)], TARGET));
        assert_ok!(client.connect().await);
        assert_eq!(client.wallet().balance(), Decimal::ZERO);

        wallet.set_balance(address(1), ONE_ETH_WEI / 2);
        let outcome = assert_ok!(client.vote(1, 1).await);

        let details = outcome.details.unwrap();
        assert_eq!(details.total_votes, 2);
        assert_eq!(client.tx_state(TxKey::vote(1)), TxState::Succeeded { hash: outcome.receipt.hash });
        assert_eq!(client.wallet().balance(), Decimal::new(5, 1));

        let view = assert_ok!(client.campaign_view(1).await);
        assert_eq!(view.phase, Some(CampaignPhase::AlreadyVoted));
        assert!(view.results.is_tie());
    }

    #[tokio::test]
    async fn test_account_switch_changes_viewer() {
        let (wallet, contract, client) = client(MockWallet::new(vec![address(1)], TARGET));
        assert_ok!(client.connect().await);
        contract.set_voted(1, address(1));
        assert_eq!(
            assert_ok!(client.campaign_view(1).await).phase,
            Some(CampaignPhase::AlreadyVoted)
        );

        wallet.set_accounts(vec![address(2)]);
        client
            .session
            .handle_event(crate::models::WalletEvent::AccountsChanged {
                accounts: vec![address(2)],
            })
            .await;

        let view = assert_ok!(client.campaign_view(1).await);
        assert_eq!(view.details.viewer, Some(address(2)));
        assert_eq!(view.phase, Some(CampaignPhase::VotingOpen));
    }
}
