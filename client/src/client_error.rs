use thiserror::Error;

use crate::chain::ProviderError;
use crate::models::{ChainId, TxHash, TxKind};
use crate::service::notifications::{Notice, NoticeLevel};

/// Every failure a caller of the engine can observe. Provider errors are
/// converted into one of these at the service that made the call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    #[error("No wallet provider detected. Please install a wallet to continue")]
    ProviderUnavailable,

    #[error("Request rejected in wallet")]
    UserRejected,

    #[error("Failed to switch network: {0}")]
    ChainSwitchFailed(String),

    #[error("Wrong network. Please switch your wallet to chain {expected}")]
    WrongChain {
        expected: ChainId,
        actual: Option<ChainId>,
    },

    #[error("Wallet not connected")]
    SignerUnavailable,

    #[error("Failed to fetch campaign data: {0}")]
    ReadFailure(String),

    #[error("{message}")]
    WriteReverted {
        hash: Option<TxHash>,
        message: String,
    },

    #[error("{0}")]
    WriteFailed(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Cannot {action}: {reason}")]
    ActionNotPermitted { action: TxKind, reason: String },

    #[error("A {0} transaction is already pending")]
    TransactionPending(TxKind),
}

impl ClientError {
    /// Wallet-side failure during connect, check or chain switch.
    pub fn from_wallet(err: ProviderError) -> Self {
        match err {
            ProviderError::Unavailable => ClientError::ProviderUnavailable,
            e if e.is_user_rejection() => ClientError::UserRejected,
            e => ClientError::ChainSwitchFailed(e.to_string()),
        }
    }

    /// Any failure while reading campaign data.
    pub fn from_read(err: ProviderError) -> Self {
        ClientError::ReadFailure(err.to_string())
    }

    /// Failure while submitting or confirming a transaction. The provider's
    /// message is kept verbatim.
    pub fn from_write(err: ProviderError) -> Self {
        match err {
            ProviderError::Unavailable => ClientError::ProviderUnavailable,
            e if e.is_user_rejection() => ClientError::UserRejected,
            ProviderError::Reverted { hash, reason } => ClientError::WriteReverted {
                message: reason.unwrap_or_else(|| format!("Transaction {hash} reverted")),
                hash: Some(hash),
            },
            ProviderError::Rpc { message, .. } if is_revert_message(&message) => {
                ClientError::WriteReverted {
                    hash: None,
                    message,
                }
            }
            e => ClientError::WriteFailed(e.to_string()),
        }
    }

    /// Whether the user can simply try the same action again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::UserRejected
                | ClientError::ReadFailure(_)
                | ClientError::WriteFailed(_)
                | ClientError::ChainSwitchFailed(_)
        )
    }

    /// Presentation mapping for this error.
    pub fn notice(&self) -> Notice {
        let (level, persistent) = match self {
            ClientError::ProviderUnavailable => (NoticeLevel::Error, true),
            ClientError::UserRejected => (NoticeLevel::Info, false),
            ClientError::ChainSwitchFailed(_) => (NoticeLevel::Error, false),
            ClientError::WrongChain { .. } => (NoticeLevel::Warning, true),
            ClientError::SignerUnavailable => (NoticeLevel::Warning, false),
            ClientError::ReadFailure(_) => (NoticeLevel::Error, true),
            ClientError::WriteReverted { .. } => (NoticeLevel::Error, false),
            ClientError::WriteFailed(_) => (NoticeLevel::Error, false),
            ClientError::Validation(_) => (NoticeLevel::Warning, false),
            ClientError::ActionNotPermitted { .. } => (NoticeLevel::Warning, false),
            ClientError::TransactionPending(_) => (NoticeLevel::Info, false),
        };

        Notice {
            level,
            message: self.to_string(),
            persistent,
            retryable: self.is_retryable(),
        }
    }
}

fn is_revert_message(message: &str) -> bool {
    message.to_ascii_lowercase().contains("revert")
}
