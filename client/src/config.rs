use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::chain::rpc_contract::RetryConfig;
use crate::models::{Address, ChainId};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub chain: ChainConfig,
    pub contract: ContractConfig,
    pub wallet: WalletConfig,
    pub confirmation: ConfirmationConfig,
    pub rust_log: String,
}

/// Target network, shaped exactly like the `wallet_addEthereumChain` params.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainConfig {
    pub chain_id: ChainId,
    pub chain_name: String,
    pub native_currency: NativeCurrency,
    pub rpc_urls: Vec<String>,
    pub block_explorer_urls: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u32,
}

impl ChainConfig {
    /// Polygon zkEVM Cardona testnet
    pub fn cardona_testnet() -> Self {
        Self {
            chain_id: ChainId(0x98a),
            chain_name: "Polygon ZkEVM Cardona Testnet".to_string(),
            native_currency: NativeCurrency {
                name: "ETH".to_string(),
                symbol: "ETH".to_string(),
                decimals: 18,
            },
            rpc_urls: vec!["https://rpc.cardona.zkevm-rpc.com".to_string()],
            block_explorer_urls: vec!["https://cardona-zkevm.polygonscan.com/".to_string()],
        }
    }

    pub fn rpc_url(&self) -> &str {
        self.rpc_urls.first().map(String::as_str).unwrap_or_default()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ContractConfig {
    pub address: Address,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WalletConfig {
    /// Endpoint of the account-managing wallet. `None` means no wallet
    /// provider is available.
    pub provider_url: Option<String>,
    pub balance_poll_interval: Duration,
    pub event_poll_interval: Duration,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            provider_url: None,
            balance_poll_interval: Duration::from_millis(12_000),
            event_poll_interval: Duration::from_millis(2_000),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConfirmationConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl From<&ConfirmationConfig> for RetryConfig {
    fn from(config: &ConfirmationConfig) -> Self {
        RetryConfig {
            max_retries: config.max_retries,
            initial_delay_ms: config.initial_delay_ms,
            max_delay_ms: config.max_delay_ms,
            ..RetryConfig::default()
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let preset = ChainConfig::cardona_testnet();
        let retry = RetryConfig::default();

        let contract_address: Address = env::var("CONTRACT_ADDRESS")?.parse()?;
        let chain_id: ChainId = match env::var("TARGET_CHAIN_ID") {
            Ok(value) => value.parse()?,
            Err(_) => preset.chain_id,
        };
        let chain_name = env::var("CHAIN_NAME").unwrap_or(preset.chain_name);
        let rpc_urls = env::var("CHAIN_RPC_URL")
            .map(|url| vec![url])
            .unwrap_or(preset.rpc_urls);
        let block_explorer_urls = env::var("CHAIN_EXPLORER_URL")
            .map(|url| vec![url])
            .unwrap_or(preset.block_explorer_urls);
        let currency_name =
            env::var("NATIVE_CURRENCY_NAME").unwrap_or(preset.native_currency.name);
        let currency_symbol =
            env::var("NATIVE_CURRENCY_SYMBOL").unwrap_or(preset.native_currency.symbol);
        let currency_decimals: u32 = match env::var("NATIVE_CURRENCY_DECIMALS") {
            Ok(value) => value.parse()?,
            Err(_) => preset.native_currency.decimals,
        };
        let provider_url = env::var("WALLET_RPC_URL").ok();
        let balance_poll_ms: u64 = env_or("BALANCE_POLL_INTERVAL_MS", 12_000)?;
        let event_poll_ms: u64 = env_or("WALLET_EVENT_POLL_INTERVAL_MS", 2_000)?;
        let max_retries: u32 = env_or("TX_MAX_RETRIES", retry.max_retries)?;
        let initial_delay_ms: u64 = env_or("TX_INITIAL_DELAY_MS", retry.initial_delay_ms)?;
        let max_delay_ms: u64 = env_or("TX_MAX_DELAY_MS", retry.max_delay_ms)?;
        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "polytix_client=info".to_string());

        Ok(Config {
            chain: ChainConfig {
                chain_id,
                chain_name,
                native_currency: NativeCurrency {
                    name: currency_name,
                    symbol: currency_symbol,
                    decimals: currency_decimals,
                },
                rpc_urls,
                block_explorer_urls,
            },
            contract: ContractConfig {
                address: contract_address,
            },
            wallet: WalletConfig {
                provider_url,
                balance_poll_interval: Duration::from_millis(balance_poll_ms),
                event_poll_interval: Duration::from_millis(event_poll_ms),
            },
            confirmation: ConfirmationConfig {
                max_retries,
                initial_delay_ms,
                max_delay_ms,
            },
            rust_log,
        })
    }
}

fn env_or<T>(key: &str, default: T) -> Result<T, anyhow::Error>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => Ok(value.parse()?),
        Err(_) => Ok(default),
    }
}
