//! Wallet Session
//!
//! Owns the connection to the single injected wallet provider. The current
//! state is published on a `watch` channel; only this service mutates it.
//! While connected, a balance poller runs as a task that is aborted the
//! moment the session leaves `Connected`.

use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::lock;
use crate::chain::{ProviderError, WalletProvider, U256};
use crate::client_error::ClientError;
use crate::config::ChainConfig;
use crate::models::{Address, ChainId, WalletEvent, WalletSnapshot};
use crate::service::notifications::{Notice, NotificationHub};

/// Converts a wei amount into whole units of the native currency.
pub fn wei_to_decimal(wei: U256, decimals: u32) -> Option<Decimal> {
    let value = i128::try_from(wei.to_u128()?).ok()?;
    Decimal::try_from_i128_with_scale(value, decimals)
        .ok()
        .map(|d| d.normalize())
}

/// State shared with the balance poller.
struct SessionState {
    snapshot: watch::Sender<WalletSnapshot>,
    /// Bumped on every session transition; work started under an older
    /// epoch must not write.
    epoch: AtomicU64,
}

impl SessionState {
    fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    fn transition(&self, snapshot: WalletSnapshot) -> u64 {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        self.snapshot.send_replace(snapshot);
        epoch
    }

    /// Applies a balance read if the session is still the one that issued it.
    fn apply_balance(&self, epoch: u64, address: Address, balance: Decimal) -> bool {
        self.snapshot.send_if_modified(|snapshot| {
            if self.current_epoch() != epoch || snapshot.address() != Some(address) {
                return false;
            }
            if snapshot.balance() == balance {
                return false;
            }
            *snapshot = snapshot.with_balance(balance);
            true
        })
    }
}

pub struct WalletSession<P: WalletProvider> {
    provider: Option<Arc<P>>,
    chain: ChainConfig,
    poll_interval: Duration,
    state: Arc<SessionState>,
    poller: Mutex<Option<JoinHandle<()>>>,
    listener: Mutex<Option<JoinHandle<()>>>,
    notifications: NotificationHub,
}

impl<P: WalletProvider> WalletSession<P> {
    /// `provider` is `None` when no injected wallet exists.
    pub fn new(
        provider: Option<Arc<P>>,
        chain: ChainConfig,
        poll_interval: Duration,
        notifications: NotificationHub,
    ) -> Self {
        let (snapshot, _) = watch::channel(WalletSnapshot::disconnected());
        Self {
            provider,
            chain,
            poll_interval,
            state: Arc::new(SessionState {
                snapshot,
                epoch: AtomicU64::new(0),
            }),
            poller: Mutex::new(None),
            listener: Mutex::new(None),
            notifications,
        }
    }

    pub fn snapshot(&self) -> WalletSnapshot {
        self.state.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<WalletSnapshot> {
        self.state.snapshot.subscribe()
    }

    pub fn target_chain(&self) -> ChainId {
        self.chain.chain_id
    }

    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }

    fn provider(&self) -> Result<Arc<P>, ClientError> {
        self.provider.clone().ok_or(ClientError::ProviderUnavailable)
    }

    /// Prompts for account access, moves the wallet to the target chain and
    /// reads the account's balance.
    pub async fn connect(&self) -> Result<WalletSnapshot, ClientError> {
        let provider = match self.provider() {
            Ok(provider) => provider,
            Err(e) => {
                self.notifications.publish(e.notice());
                return Err(e);
            }
        };

        let previous = self.snapshot();
        self.stop_poller();
        let epoch = self.state.transition(WalletSnapshot::connecting());
        info!("Connecting wallet");

        let result = async {
            let accounts = provider
                .request_accounts()
                .await
                .map_err(ClientError::from_wallet)?;
            let address = accounts
                .first()
                .copied()
                .ok_or(ClientError::SignerUnavailable)?;
            self.switch_to_target(&provider).await?;
            let chain_id = self.verify_chain(&provider).await?;
            let balance = self.read_balance(&provider, address).await?;
            Ok::<_, ClientError>((address, chain_id, balance))
        }
        .await;

        if self.state.current_epoch() != epoch {
            // a disconnect or wallet event overtook this attempt
            debug!("Discarding superseded connect result");
            let current = self.snapshot();
            return match result {
                Ok(_) if current.is_connected() => Ok(current),
                Ok(_) => Err(ClientError::SignerUnavailable),
                Err(e) => Err(e),
            };
        }

        match result {
            Ok((address, chain_id, balance)) => {
                let snapshot = self.establish(address, chain_id, balance);
                self.notifications.publish(Notice::success(format!(
                    "Wallet connected: {}",
                    address.short()
                )));
                Ok(snapshot)
            }
            Err(e) => {
                warn!(error = %e, "Wallet connection failed");
                match (previous.address(), previous.chain_id()) {
                    (Some(address), Some(chain_id)) if !matches!(e, ClientError::WrongChain { .. }) => {
                        info!(address = %address, "Keeping existing session after failed reconnect");
                        self.establish(address, chain_id, previous.balance());
                    }
                    _ => {
                        let next = match e {
                            ClientError::UserRejected => WalletSnapshot::disconnected(),
                            _ => WalletSnapshot::failed(e.to_string()),
                        };
                        self.state.transition(next);
                    }
                }
                self.notifications.publish(e.notice());
                Err(e)
            }
        }
    }

    /// Restores a session the wallet has already authorised, without
    /// prompting. Stays disconnected when no account is authorised.
    pub async fn check_existing(&self) -> Result<WalletSnapshot, ClientError> {
        let Some(provider) = self.provider.clone() else {
            return Ok(self.snapshot());
        };
        let epoch = self.state.current_epoch();
        let mut observed = None;

        let result = async {
            let accounts = provider.accounts().await.map_err(ClientError::from_read)?;
            let Some(address) = accounts.first().copied() else {
                return Ok::<_, ClientError>(None);
            };
            observed = Some(address);
            let current = provider.chain_id().await.map_err(ClientError::from_read)?;
            if current != self.target_chain() {
                info!(chain_id = %current, target = %self.target_chain(), "Wallet on foreign chain, switching");
                self.switch_to_target(&provider).await?;
            }
            let chain_id = self.verify_chain(&provider).await?;
            let balance = self.read_balance(&provider, address).await?;
            Ok::<_, ClientError>(Some((address, chain_id, balance)))
        }
        .await;

        if self.state.current_epoch() != epoch {
            debug!("Discarding superseded session check");
            return result.map(|_| self.snapshot());
        }

        match result {
            Ok(Some((address, chain_id, balance))) => {
                if self.snapshot().address() == Some(address) {
                    self.state.apply_balance(epoch, address, balance);
                    return Ok(self.snapshot());
                }
                Ok(self.establish(address, chain_id, balance))
            }
            Ok(None) => {
                if self.snapshot().is_connected() {
                    self.reset();
                }
                Ok(self.snapshot())
            }
            Err(e) => {
                let account_moved = observed.is_some_and(|a| self.snapshot().address() != Some(a));
                if is_chain_failure(&e) || account_moved {
                    warn!(error = %e, "Existing session check failed, resetting");
                    self.reset();
                } else {
                    // the account is still authorised; the poller keeps retrying
                    warn!(error = %e, "Existing session check failed, keeping session");
                }
                self.notifications.publish(e.notice());
                Err(e)
            }
        }
    }

    /// Clears local session state. The wallet itself stays authorised.
    pub fn disconnect(&self) {
        let was_connected = self.snapshot().is_connected();
        self.reset();
        if was_connected {
            info!("Wallet disconnected");
            self.notifications.publish(Notice::info("Wallet disconnected"));
        }
    }

    /// Re-reads the balance of the connected account.
    pub async fn refresh_balance(&self) -> Result<(), ClientError> {
        let Some(provider) = self.provider.clone() else {
            return Ok(());
        };
        let epoch = self.state.current_epoch();
        let Some(address) = self.snapshot().address() else {
            return Ok(());
        };
        let balance = self.read_balance(&provider, address).await?;
        self.state.apply_balance(epoch, address, balance);
        Ok(())
    }

    /// Reacts to one provider event.
    pub async fn handle_event(&self, event: WalletEvent) {
        match event {
            WalletEvent::AccountsChanged { accounts } if accounts.is_empty() => {
                info!("Wallet reported no accounts");
                self.disconnect();
            }
            WalletEvent::AccountsChanged { accounts } => {
                debug!(count = accounts.len(), "Wallet accounts changed");
                if let Err(e) = self.check_existing().await {
                    warn!(error = %e, "Failed to follow account change");
                }
            }
            WalletEvent::ChainChanged { chain_id } if chain_id != self.target_chain() => {
                warn!(chain_id = %chain_id, target = %self.target_chain(), "Wallet moved to a foreign chain");
                self.reset();
                let err = ClientError::WrongChain {
                    expected: self.target_chain(),
                    actual: Some(chain_id),
                };
                self.notifications.publish(err.notice());
            }
            WalletEvent::ChainChanged { chain_id } => {
                debug!(chain_id = %chain_id, "Wallet back on target chain");
                if let Err(e) = self.check_existing().await {
                    warn!(error = %e, "Failed to follow chain change");
                }
            }
        }
    }

    /// Forwards provider events into `handle_event` until teardown.
    pub fn spawn_event_listener(self: &Arc<Self>) {
        let Some(provider) = self.provider.clone() else {
            return;
        };
        let mut events = provider.subscribe();
        let session: Weak<Self> = Arc::downgrade(self);

        let handle = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        let Some(session) = session.upgrade() else {
                            break;
                        };
                        session.handle_event(event).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped = skipped, "Wallet event listener lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        if let Some(old) = lock(&self.listener).replace(handle) {
            old.abort();
        }
    }

    /// Stops the poller and the event listener.
    pub fn teardown(&self) {
        self.stop_poller();
        if let Some(listener) = lock(&self.listener).take() {
            listener.abort();
        }
    }

    async fn switch_to_target(&self, provider: &P) -> Result<(), ClientError> {
        let target = self.target_chain();
        match provider.switch_chain(target).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_unrecognized_chain() => {
                info!(chain_id = %target, "Target chain unknown to wallet, adding it");
                provider
                    .add_chain(&self.chain)
                    .await
                    .map_err(ClientError::from_wallet)
            }
            Err(e) => Err(ClientError::from_wallet(e)),
        }
    }

    async fn verify_chain(&self, provider: &P) -> Result<ChainId, ClientError> {
        let chain_id = provider.chain_id().await.map_err(ClientError::from_read)?;
        if chain_id != self.target_chain() {
            return Err(ClientError::WrongChain {
                expected: self.target_chain(),
                actual: Some(chain_id),
            });
        }
        Ok(chain_id)
    }

    async fn read_balance(&self, provider: &P, address: Address) -> Result<Decimal, ClientError> {
        let wei = provider
            .balance(address)
            .await
            .map_err(ClientError::from_read)?;
        wei_to_decimal(wei, self.chain.native_currency.decimals).ok_or_else(|| {
            ClientError::from_read(ProviderError::Decode(format!("balance out of range: {wei:?}")))
        })
    }

    fn establish(&self, address: Address, chain_id: ChainId, balance: Decimal) -> WalletSnapshot {
        self.stop_poller();
        let snapshot = WalletSnapshot::connected(address, chain_id, balance);
        let epoch = self.state.transition(snapshot.clone());
        info!(address = %address, chain_id = %chain_id, "Wallet connected");
        self.start_poller(epoch, address);
        snapshot
    }

    fn reset(&self) {
        self.stop_poller();
        self.state.transition(WalletSnapshot::disconnected());
    }

    fn start_poller(&self, epoch: u64, address: Address) {
        let Some(provider) = self.provider.clone() else {
            return;
        };
        let state = Arc::clone(&self.state);
        let interval = self.poll_interval;
        let decimals = self.chain.native_currency.decimals;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            loop {
                ticker.tick().await;
                if state.current_epoch() != epoch {
                    break;
                }
                match provider.balance(address).await {
                    Ok(wei) => match wei_to_decimal(wei, decimals) {
                        Some(balance) => {
                            if state.apply_balance(epoch, address, balance) {
                                debug!(address = %address, balance = %balance, "Balance updated");
                            }
                        }
                        None => warn!(address = %address, "Balance out of range"),
                    },
                    // retried on the next tick
                    Err(e) => warn!(address = %address, error = %e, "Balance poll failed"),
                }
            }
        });

        if let Some(old) = lock(&self.poller).replace(handle) {
            old.abort();
        }
    }

    fn stop_poller(&self) {
        if let Some(poller) = lock(&self.poller).take() {
            poller.abort();
        }
    }

    #[cfg(test)]
    pub(crate) fn is_polling(&self) -> bool {
        lock(&self.poller).as_ref().is_some_and(|h| !h.is_finished())
    }
}

/// Failures that mean the wallet is not usable on the target chain.
fn is_chain_failure(err: &ClientError) -> bool {
    matches!(
        err,
        ClientError::WrongChain { .. } | ClientError::UserRejected | ClientError::ChainSwitchFailed(_)
    )
}

impl<P: WalletProvider> Drop for WalletSession<P> {
    fn drop(&mut self) {
        self.teardown();
    }
}
