//! In-memory doubles of the wallet provider and the campaign contract.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, Notify};

use crate::chain::{
    CampaignContract, ContractCall, ProviderError, RawCampaignMetadata, RawProposal, WalletProvider, U256,
};
use crate::config::ChainConfig;
use crate::models::{Address, CampaignId, ChainId, TxHash, TxReceipt, WalletEvent};

pub const ONE_ETH_WEI: u128 = 1_000_000_000_000_000_000;

pub fn address(byte: u8) -> Address {
    Address::from_bytes([byte; 20])
}

pub fn target_chain() -> ChainConfig {
    ChainConfig::cardona_testnet()
}

fn user_rejected() -> ProviderError {
    ProviderError::Rpc {
        code: 4001,
        message: "User rejected the request.".to_string(),
        data: None,
    }
}

#[derive(Default)]
struct CallLog {
    counts: Mutex<HashMap<&'static str, usize>>,
}

impl CallLog {
    fn record(&self, method: &'static str) {
        *self.counts.lock().unwrap().entry(method).or_default() += 1;
    }

    fn count(&self, method: &'static str) -> usize {
        self.counts.lock().unwrap().get(method).copied().unwrap_or(0)
    }

    fn total(&self) -> usize {
        self.counts.lock().unwrap().values().sum()
    }
}

pub struct MockWallet {
    accounts: Mutex<Vec<Address>>,
    authorized: AtomicBool,
    chain: Mutex<ChainId>,
    known_chains: Mutex<HashSet<ChainId>>,
    balances: Mutex<HashMap<Address, U256>>,
    balance_delay: Mutex<Option<Duration>>,
    reject_requests: AtomicBool,
    reject_switch: AtomicBool,
    switch_error: Mutex<Option<String>>,
    fail_next_balance: AtomicBool,
    events: broadcast::Sender<WalletEvent>,
    calls: CallLog,
}

impl MockWallet {
    /// A wallet holding `accounts`, currently on `chain`, that has not yet
    /// authorised this client.
    pub fn new(accounts: Vec<Address>, chain: ChainId) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            accounts: Mutex::new(accounts),
            authorized: AtomicBool::new(false),
            chain: Mutex::new(chain),
            known_chains: Mutex::new(HashSet::from([chain])),
            balances: Mutex::new(HashMap::new()),
            balance_delay: Mutex::new(None),
            reject_requests: AtomicBool::new(false),
            reject_switch: AtomicBool::new(false),
            switch_error: Mutex::new(None),
            fail_next_balance: AtomicBool::new(false),
            events,
            calls: CallLog::default(),
        }
    }

    pub fn authorized(self) -> Self {
        self.authorized.store(true, Ordering::SeqCst);
        self
    }

    pub fn knowing(self, chain: ChainId) -> Self {
        self.known_chains.lock().unwrap().insert(chain);
        self
    }

    pub fn set_balance(&self, address: Address, wei: u128) {
        self.balances.lock().unwrap().insert(address, U256::from(wei));
    }

    pub fn set_balance_delay(&self, delay: Option<Duration>) {
        *self.balance_delay.lock().unwrap() = delay;
    }

    pub fn reject_requests(&self, reject: bool) {
        self.reject_requests.store(reject, Ordering::SeqCst);
    }

    pub fn reject_switch(&self, reject: bool) {
        self.reject_switch.store(reject, Ordering::SeqCst);
    }

    /// Makes every chain switch fail with a non-rejection error.
    pub fn fail_switch(&self, message: &str) {
        *self.switch_error.lock().unwrap() = Some(message.to_string());
    }

    /// Makes the next balance read fail once, as a flaky node would.
    pub fn fail_next_balance(&self) {
        self.fail_next_balance.store(true, Ordering::SeqCst);
    }

    /// Simulates the user picking different accounts in the wallet UI.
    pub fn set_accounts(&self, accounts: Vec<Address>) {
        *self.accounts.lock().unwrap() = accounts;
    }

    /// Simulates the user switching network in the wallet UI.
    pub fn set_chain(&self, chain: ChainId) {
        *self.chain.lock().unwrap() = chain;
    }

    pub fn emit(&self, event: WalletEvent) {
        let _ = self.events.send(event);
    }

    pub fn calls(&self, method: &'static str) -> usize {
        self.calls.count(method)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.total()
    }
}

impl WalletProvider for MockWallet {
    async fn request_accounts(&self) -> Result<Vec<Address>, ProviderError> {
        self.calls.record("eth_requestAccounts");
        if self.reject_requests.load(Ordering::SeqCst) {
            return Err(user_rejected());
        }
        self.authorized.store(true, Ordering::SeqCst);
        Ok(self.accounts.lock().unwrap().clone())
    }

    async fn accounts(&self) -> Result<Vec<Address>, ProviderError> {
        self.calls.record("eth_accounts");
        if self.authorized.load(Ordering::SeqCst) {
            Ok(self.accounts.lock().unwrap().clone())
        } else {
            Ok(Vec::new())
        }
    }

    async fn chain_id(&self) -> Result<ChainId, ProviderError> {
        self.calls.record("eth_chainId");
        Ok(*self.chain.lock().unwrap())
    }

    async fn switch_chain(&self, chain_id: ChainId) -> Result<(), ProviderError> {
        self.calls.record("wallet_switchEthereumChain");
        if self.reject_switch.load(Ordering::SeqCst) {
            return Err(user_rejected());
        }
        if let Some(message) = self.switch_error.lock().unwrap().clone() {
            return Err(ProviderError::Rpc {
                code: -32603,
                message,
                data: None,
            });
        }
        if !self.known_chains.lock().unwrap().contains(&chain_id) {
            return Err(ProviderError::Rpc {
                code: 4902,
                message: "Unrecognized chain ID".to_string(),
                data: None,
            });
        }
        *self.chain.lock().unwrap() = chain_id;
        Ok(())
    }

    async fn add_chain(&self, chain: &ChainConfig) -> Result<(), ProviderError> {
        self.calls.record("wallet_addEthereumChain");
        if self.reject_switch.load(Ordering::SeqCst) {
            return Err(user_rejected());
        }
        self.known_chains.lock().unwrap().insert(chain.chain_id);
        *self.chain.lock().unwrap() = chain.chain_id;
        Ok(())
    }

    async fn balance(&self, address: Address) -> Result<U256, ProviderError> {
        self.calls.record("eth_getBalance");
        if self.fail_next_balance.swap(false, Ordering::SeqCst) {
            return Err(ProviderError::Rpc {
                code: -32000,
                message: "header not found".to_string(),
                data: None,
            });
        }
        let delay = *self.balance_delay.lock().unwrap();
        let balance = self
            .balances
            .lock()
            .unwrap()
            .get(&address)
            .copied()
            .unwrap_or(U256::ZERO);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(balance)
    }

    fn subscribe(&self) -> broadcast::Receiver<WalletEvent> {
        self.events.subscribe()
    }
}

/// Contract double that applies accepted writes to its own state, so a
/// refetch after confirmation observes the change.
#[derive(Default)]
pub struct MockContract {
    campaigns: Mutex<BTreeMap<CampaignId, RawCampaignMetadata>>,
    proposals: Mutex<HashMap<CampaignId, Vec<RawProposal>>>,
    voting_open: Mutex<HashMap<CampaignId, bool>>,
    registered: Mutex<HashSet<(CampaignId, Address)>>,
    voted: Mutex<HashSet<(CampaignId, Address)>>,
    failing_reads: Mutex<HashSet<CampaignId>>,
    read_delays: Mutex<HashMap<CampaignId, VecDeque<Duration>>>,
    metadata_delay: Mutex<Option<Duration>>,
    metadata_in_flight: AtomicUsize,
    metadata_peak: AtomicUsize,
    count_override: Mutex<Option<u64>>,
    reject_next: AtomicBool,
    revert_next: Mutex<Option<String>>,
    confirm_gate: Mutex<Option<Arc<Notify>>>,
    submitted: Mutex<Vec<(Address, ContractCall)>>,
    next_hash: AtomicU64,
    calls: CallLog,
}

impl MockContract {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_campaign(&self, id: CampaignId, meta: RawCampaignMetadata, proposals: Vec<(&str, u64)>, open: bool) {
        self.campaigns.lock().unwrap().insert(id, meta);
        self.proposals.lock().unwrap().insert(
            id,
            proposals
                .into_iter()
                .map(|(content, votes)| RawProposal {
                    content: content.to_string(),
                    vote_count: U256::from(votes),
                })
                .collect(),
        );
        self.voting_open.lock().unwrap().insert(id, open);
    }

    pub fn set_voting_open(&self, id: CampaignId, open: bool) {
        self.voting_open.lock().unwrap().insert(id, open);
    }

    pub fn set_votes(&self, id: CampaignId, proposal: usize, votes: u64) {
        if let Some(list) = self.proposals.lock().unwrap().get_mut(&id) {
            list[proposal].vote_count = U256::from(votes);
        }
    }

    pub fn set_registered(&self, id: CampaignId, voter: Address) {
        self.registered.lock().unwrap().insert((id, voter));
    }

    pub fn set_voted(&self, id: CampaignId, voter: Address) {
        self.voted.lock().unwrap().insert((id, voter));
    }

    pub fn fail_reads_for(&self, id: CampaignId) {
        self.failing_reads.lock().unwrap().insert(id);
    }

    /// Queues a delay for the next metadata read of `id`.
    pub fn delay_next_read(&self, id: CampaignId, delay: Duration) {
        self.read_delays
            .lock()
            .unwrap()
            .entry(id)
            .or_default()
            .push_back(delay);
    }

    /// Delays every metadata read, for observing how many run at once.
    pub fn set_metadata_delay(&self, delay: Duration) {
        *self.metadata_delay.lock().unwrap() = Some(delay);
    }

    pub fn peak_metadata_reads(&self) -> usize {
        self.metadata_peak.load(Ordering::SeqCst)
    }

    /// Makes `campaignCount` report `count` regardless of stored campaigns.
    pub fn report_count(&self, count: u64) {
        *self.count_override.lock().unwrap() = Some(count);
    }

    pub fn reject_next_submission(&self) {
        self.reject_next.store(true, Ordering::SeqCst);
    }

    pub fn revert_next(&self, reason: &str) {
        *self.revert_next.lock().unwrap() = Some(reason.to_string());
    }

    /// Holds confirmations until the returned handle is notified.
    pub fn hold_confirmations(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.confirm_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub fn submitted(&self) -> Vec<(Address, ContractCall)> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn calls(&self, method: &'static str) -> usize {
        self.calls.count(method)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.total()
    }

    fn check_read(&self, id: CampaignId) -> Result<(), ProviderError> {
        if self.failing_reads.lock().unwrap().contains(&id) {
            return Err(ProviderError::Rpc {
                code: -32000,
                message: "execution reverted: Campaign does not exist".to_string(),
                data: None,
            });
        }
        Ok(())
    }

    fn apply(&self, from: Address, call: &ContractCall) {
        match call {
            ContractCall::CreateProposalBasedCampaign {
                description,
                restriction,
                result_type,
                start_time,
                end_time,
                max_voters,
                proposals,
            } => {
                let id = self.campaigns.lock().unwrap().len() as CampaignId + 1;
                let meta = RawCampaignMetadata {
                    voting_type: U256::from(1u8),
                    restriction: U256::from(u8::from(*restriction)),
                    result_type: U256::from(u8::from(*result_type)),
                    creator: from,
                    description: description.clone(),
                    status: U256::ZERO,
                    start_time: U256::from(*start_time),
                    end_time: U256::from(*end_time),
                    max_voters: U256::from(*max_voters),
                };
                let proposals = proposals.iter().map(|p| (p.as_str(), 0)).collect();
                self.add_campaign(id, meta, proposals, false);
            }
            ContractCall::RegisterToVote { campaign_id, .. } => {
                self.set_registered(*campaign_id, from);
            }
            ContractCall::VoteForProposal {
                campaign_id,
                proposal_id,
            } => {
                if let Some(list) = self.proposals.lock().unwrap().get_mut(campaign_id) {
                    let proposal = &mut list[*proposal_id as usize];
                    let votes = proposal.vote_count.to_u64().unwrap_or(0) + 1;
                    proposal.vote_count = U256::from(votes);
                }
                self.set_voted(*campaign_id, from);
            }
        }
    }
}

pub fn raw_campaign(restriction: u8, start_time: u64, end_time: u64, max_voters: u64) -> RawCampaignMetadata {
    RawCampaignMetadata {
        voting_type: U256::from(1u8),
        restriction: U256::from(restriction),
        result_type: U256::from(1u8),
        creator: address(0xcc),
        description: "Community budget allocation".to_string(),
        status: U256::from(1u8),
        start_time: U256::from(start_time),
        end_time: U256::from(end_time),
        max_voters: U256::from(max_voters),
    }
}

impl CampaignContract for MockContract {
    async fn campaign_count(&self) -> Result<U256, ProviderError> {
        self.calls.record("campaignCount");
        let stored = self.campaigns.lock().unwrap().len() as u64;
        Ok(U256::from(self.count_override.lock().unwrap().unwrap_or(stored)))
    }

    async fn campaign_metadata(&self, id: CampaignId) -> Result<RawCampaignMetadata, ProviderError> {
        self.calls.record("campaignMetadata");
        let delay = self
            .read_delays
            .lock()
            .unwrap()
            .get_mut(&id)
            .and_then(VecDeque::pop_front)
            .or(*self.metadata_delay.lock().unwrap());
        // snapshot state before the delay so a delayed read returns old data
        let result = self.check_read(id).and_then(|_| {
            self.campaigns
                .lock()
                .unwrap()
                .get(&id)
                .cloned()
                .ok_or_else(|| ProviderError::Decode(format!("no campaign {id}")))
        });
        if let Some(delay) = delay {
            let in_flight = self.metadata_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.metadata_peak.fetch_max(in_flight, Ordering::SeqCst);
            tokio::time::sleep(delay).await;
            self.metadata_in_flight.fetch_sub(1, Ordering::SeqCst);
        }
        result
    }

    async fn get_proposals(&self, id: CampaignId) -> Result<Vec<RawProposal>, ProviderError> {
        self.calls.record("getProposals");
        self.check_read(id)?;
        Ok(self.proposals.lock().unwrap().get(&id).cloned().unwrap_or_default())
    }

    async fn is_voting_open(&self, id: CampaignId) -> Result<bool, ProviderError> {
        self.calls.record("isVotingOpen");
        self.check_read(id)?;
        Ok(self.voting_open.lock().unwrap().get(&id).copied().unwrap_or(false))
    }

    async fn get_registration_details(&self, id: CampaignId, voter: Address) -> Result<bool, ProviderError> {
        self.calls.record("getRegistrationDetails");
        Ok(self.registered.lock().unwrap().contains(&(id, voter)))
    }

    async fn check_has_voted(&self, id: CampaignId, voter: Address) -> Result<bool, ProviderError> {
        self.calls.record("checkHasVoted");
        Ok(self.voted.lock().unwrap().contains(&(id, voter)))
    }

    async fn submit(&self, from: Address, call: ContractCall) -> Result<TxHash, ProviderError> {
        self.calls.record("eth_sendTransaction");
        if self.reject_next.swap(false, Ordering::SeqCst) {
            return Err(user_rejected());
        }
        self.submitted.lock().unwrap().push((from, call.clone()));
        if self.revert_next.lock().unwrap().is_none() {
            self.apply(from, &call);
        }
        let n = self.next_hash.fetch_add(1, Ordering::SeqCst) + 1;
        let mut bytes = [0u8; 32];
        bytes[24..].copy_from_slice(&n.to_be_bytes());
        Ok(TxHash::from_bytes(bytes))
    }

    async fn wait_for_confirmation(&self, hash: TxHash) -> Result<TxReceipt, ProviderError> {
        self.calls.record("eth_getTransactionReceipt");
        let gate = self.confirm_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if let Some(reason) = self.revert_next.lock().unwrap().take() {
            return Err(ProviderError::Reverted {
                hash,
                reason: Some(reason),
            });
        }
        Ok(TxReceipt {
            hash,
            block_number: 1,
            success: true,
        })
    }
}
