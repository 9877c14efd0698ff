use alloy::primitives::TxHash;
use thiserror::Error;

pub type ChainResult<T> = std::result::Result<T, ChainError>;

#[derive(Error, Debug)]
pub enum ChainError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Contract call `{call}` failed: {reason}")]
    Call { call: &'static str, reason: String },

    #[error("Transaction {0} reverted")]
    Reverted(TxHash),

    #[error("No wallet connected")]
    NoWallet,
}

impl ChainError {
    pub fn rpc(err: impl std::fmt::Display) -> Self {
        Self::Rpc(err.to_string())
    }

    pub fn call(call: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Call {
            call,
            reason: err.to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid RPC URL `{0}`")]
    InvalidUrl(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
