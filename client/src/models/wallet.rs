use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use super::chain::{Address, ChainId};

/// Wallet connection state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "message", rename_all = "lowercase")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Error(String),
}

/// Point-in-time view of the wallet session.
///
/// Fields are private so that `address.is_some()` holds exactly when the
/// status is `Connected`; every state is built through a constructor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletSnapshot {
    address: Option<Address>,
    chain_id: Option<ChainId>,
    balance: Decimal,
    status: ConnectionStatus,
}

impl Default for WalletSnapshot {
    fn default() -> Self {
        Self::disconnected()
    }
}

impl WalletSnapshot {
    pub fn disconnected() -> Self {
        Self {
            address: None,
            chain_id: None,
            balance: Decimal::ZERO,
            status: ConnectionStatus::Disconnected,
        }
    }

    pub fn connecting() -> Self {
        Self {
            status: ConnectionStatus::Connecting,
            ..Self::disconnected()
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: ConnectionStatus::Error(message.into()),
            ..Self::disconnected()
        }
    }

    pub fn connected(address: Address, chain_id: ChainId, balance: Decimal) -> Self {
        Self {
            address: Some(address),
            chain_id: Some(chain_id),
            balance,
            status: ConnectionStatus::Connected,
        }
    }

    pub fn address(&self) -> Option<Address> {
        self.address
    }

    pub fn chain_id(&self) -> Option<ChainId> {
        self.chain_id
    }

    pub fn balance(&self) -> Decimal {
        self.balance
    }

    pub fn status(&self) -> &ConnectionStatus {
        &self.status
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    pub fn is_connecting(&self) -> bool {
        self.status == ConnectionStatus::Connecting
    }

    pub fn error(&self) -> Option<&str> {
        match &self.status {
            ConnectionStatus::Error(message) => Some(message),
            _ => None,
        }
    }

    /// Returns a copy with a new balance; only meaningful while connected.
    pub fn with_balance(&self, balance: Decimal) -> Self {
        Self {
            balance,
            ..self.clone()
        }
    }

    /// Balance rounded to 4 decimal places for display.
    pub fn formatted_balance(&self) -> String {
        format_balance(self.balance)
    }
}

pub fn format_balance(balance: Decimal) -> String {
    let rounded = balance.round_dp_with_strategy(4, RoundingStrategy::MidpointAwayFromZero);
    format!("{:.4}", rounded)
}

/// Events pushed by the wallet provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WalletEvent {
    AccountsChanged { accounts: Vec<Address> },
    ChainChanged { chain_id: ChainId },
}
