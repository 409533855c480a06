//! Error taxonomy for reconciliation and execution.
//!
//! Configuration errors abort a run before any RPC is made. Read, submission
//! and timeout errors are scoped to one unit of work and are collected by the
//! batch orchestrator instead of being propagated past it.

use std::time::Duration;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The network key is not present in the registry.
    #[error("unknown network: {0}")]
    UnknownNetwork(String),

    /// The network has no known deployment of the requested contract.
    #[error("no {contract} address known for network {network}")]
    UnresolvedAddress { network: String, contract: String },

    /// An on-chain read failed or returned bytes that do not decode.
    #[error("rpc read failed on {network}: {message}")]
    RpcRead { network: String, message: String },

    /// Signing or broadcasting a transaction failed.
    #[error("submission failed on {network}: {message}")]
    Submission { network: String, message: String },

    /// The transaction was mined but its receipt reports failure.
    #[error("transaction {tx_hash} reverted on {network}")]
    Reverted { network: String, tx_hash: String },

    /// No confirmation was observed within the configured window.
    #[error("no confirmation on {network} after {timeout:?} (tx {tx_hash})")]
    ConfirmationTimeout {
        network: String,
        tx_hash: String,
        timeout: Duration,
    },

    /// A reconciliation task panicked or was cancelled.
    #[error("reconciliation task for {network} did not complete: {message}")]
    Task { network: String, message: String },

    /// The operator declined the confirmation prompt.
    #[error("aborted by operator")]
    UserAbort,

    /// The configuration or desired state is malformed.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// No signing material is available for the network.
    #[error("no credentials for network {network}: {message}")]
    Credentials { network: String, message: String },
}

impl Error {
    pub fn rpc_read(network: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::RpcRead {
            network: network.into(),
            message: err.to_string(),
        }
    }

    pub fn submission(network: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Submission {
            network: network.into(),
            message: err.to_string(),
        }
    }

    pub fn unresolved(network: impl Into<String>, contract: impl Into<String>) -> Self {
        Self::UnresolvedAddress {
            network: network.into(),
            contract: contract.into(),
        }
    }

    /// Errors that mean "nothing to do here" rather than "something broke".
    pub fn is_skip(&self) -> bool {
        matches!(self, Self::UnresolvedAddress { .. })
    }
}
