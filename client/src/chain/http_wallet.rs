//! Wallet provider reached over JSON-RPC.
//!
//! The endpoint is expected to manage accounts itself (a local signer or a
//! wallet bridge). HTTP has no push channel, so account and chain changes
//! are detected by a polling watcher and re-emitted as `WalletEvent`s.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::abi::U256;
use super::rpc::JsonRpcClient;
use super::{ProviderError, WalletProvider};
use crate::config::ChainConfig;
use crate::models::{Address, ChainId, WalletEvent};

const EVENT_CHANNEL_CAPACITY: usize = 32;

#[derive(Debug)]
pub struct HttpWalletProvider {
    rpc: Arc<JsonRpcClient>,
    events: broadcast::Sender<WalletEvent>,
}

impl HttpWalletProvider {
    pub fn new(rpc: Arc<JsonRpcClient>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { rpc, events }
    }

    /// Polls accounts and chain id every `interval`, emitting an event for
    /// every observed change. The first poll only records the baseline.
    pub fn spawn_change_watcher(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let provider = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            let mut last_accounts: Option<Vec<Address>> = None;
            let mut last_chain: Option<ChainId> = None;

            loop {
                ticker.tick().await;

                match provider.accounts().await {
                    Ok(accounts) => {
                        if let Some(previous) = &last_accounts {
                            if *previous != accounts {
                                debug!(count = accounts.len(), "Wallet accounts changed");
                                provider.emit(WalletEvent::AccountsChanged {
                                    accounts: accounts.clone(),
                                });
                            }
                        }
                        last_accounts = Some(accounts);
                    }
                    Err(e) => warn!(error = %e, "Failed to poll wallet accounts"),
                }

                match provider.chain_id().await {
                    Ok(chain_id) => {
                        if last_chain.is_some_and(|previous| previous != chain_id) {
                            debug!(chain_id = %chain_id, "Wallet chain changed");
                            provider.emit(WalletEvent::ChainChanged { chain_id });
                        }
                        last_chain = Some(chain_id);
                    }
                    Err(e) => warn!(error = %e, "Failed to poll wallet chain id"),
                }
            }
        })
    }

    fn emit(&self, event: WalletEvent) {
        // no listeners is fine
        let _ = self.events.send(event);
    }
}

impl WalletProvider for HttpWalletProvider {
    async fn request_accounts(&self) -> Result<Vec<Address>, ProviderError> {
        self.rpc
            .call("eth_requestAccounts", serde_json::json!([]))
            .await
    }

    async fn accounts(&self) -> Result<Vec<Address>, ProviderError> {
        self.rpc.call("eth_accounts", serde_json::json!([])).await
    }

    async fn chain_id(&self) -> Result<ChainId, ProviderError> {
        self.rpc.call("eth_chainId", serde_json::json!([])).await
    }

    async fn switch_chain(&self, chain_id: ChainId) -> Result<(), ProviderError> {
        let _: serde_json::Value = self
            .rpc
            .call(
                "wallet_switchEthereumChain",
                serde_json::json!([{ "chainId": chain_id }]),
            )
            .await?;
        info!(chain_id = %chain_id, "Wallet switched chain");
        Ok(())
    }

    async fn add_chain(&self, chain: &ChainConfig) -> Result<(), ProviderError> {
        let _: serde_json::Value = self
            .rpc
            .call("wallet_addEthereumChain", serde_json::json!([chain]))
            .await?;
        info!(chain_id = %chain.chain_id, chain_name = %chain.chain_name, "Chain added to wallet");
        Ok(())
    }

    async fn balance(&self, address: Address) -> Result<U256, ProviderError> {
        let quantity: String = self
            .rpc
            .call("eth_getBalance", serde_json::json!([address, "latest"]))
            .await?;
        U256::from_hex_quantity(&quantity)
            .ok_or_else(|| ProviderError::Decode(format!("bad balance quantity: {quantity}")))
    }

    fn subscribe(&self) -> broadcast::Receiver<WalletEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_chain_params_shape() {
        let chain = ChainConfig::cardona_testnet();
        let params = serde_json::json!([chain]);
        assert_eq!(params[0]["chainId"], "0x98a");
        assert_eq!(params[0]["nativeCurrency"]["decimals"], 18);
        assert_eq!(params[0]["rpcUrls"][0], "https://rpc.cardona.zkevm-rpc.com");
    }

    #[tokio::test]
    async fn test_emit_reaches_subscribers() {
        let provider = HttpWalletProvider::new(Arc::new(JsonRpcClient::new("http://127.0.0.1:1")));
        let mut rx = provider.subscribe();
        provider.emit(WalletEvent::ChainChanged {
            chain_id: ChainId(1),
        });
        assert_eq!(
            rx.recv().await.unwrap(),
            WalletEvent::ChainChanged {
                chain_id: ChainId(1)
            }
        );
    }

    #[test]
    fn test_emit_without_subscribers_is_silent() {
        let provider = HttpWalletProvider::new(Arc::new(JsonRpcClient::new("http://127.0.0.1:1")));
        provider.emit(WalletEvent::AccountsChanged { accounts: vec![] });
    }
}
