//! Error taxonomy for the deployment pipeline.

use std::{path::PathBuf, time::Duration};

use alloy_core::primitives::TxHash;

/// Boxed error used as the underlying cause of a failed deployment.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by the deployment pipeline.
///
/// Every variant is terminal for the current invocation: nothing is retried
/// locally, since resubmitting a contract-creation transaction can create a
/// duplicate contract.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("unknown network '{name}' (registered: {})", .registered.join(", "))]
    UnknownNetwork {
        name: String,
        registered: Vec<String>,
    },

    #[error("network '{network}' requires secret '{secret}', which is not set")]
    MissingCredential { network: String, secret: String },

    #[error("network '{network}' is misconfigured: {reason}")]
    InvalidNetwork { network: String, reason: String },

    #[error("no compiled artifact for contract '{contract}' under {}", .root.display())]
    ArtifactNotFound { contract: String, root: PathBuf },

    #[error("artifact for contract '{contract}' at {} is invalid: {reason}", .path.display())]
    InvalidArtifact {
        contract: String,
        path: PathBuf,
        reason: String,
    },

    #[error("failed to deploy '{contract}' to '{network}': {source}")]
    DeploymentFailed {
        contract: String,
        network: String,
        #[source]
        source: BoxError,
    },

    #[error(
        "timed out after {}s waiting for '{contract}' on '{network}' to confirm{}",
        .timeout.as_secs(),
        .tx_hash.map(|h| format!(" (tx {h})")).unwrap_or_default()
    )]
    DeploymentTimeout {
        contract: String,
        network: String,
        tx_hash: Option<TxHash>,
        timeout: Duration,
    },

    #[error("unknown deployment module '{0}'")]
    UnknownModule(String),

    #[error("deployment journal error: {0:#}")]
    Journal(anyhow::Error),

    #[error("configuration error: {0:#}")]
    Config(anyhow::Error),
}

impl DeployError {
    /// Wrap any underlying cause as a [`DeployError::DeploymentFailed`].
    pub fn failed(
        contract: impl Into<String>,
        network: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::DeploymentFailed {
            contract: contract.into(),
            network: network.into(),
            source: source.into(),
        }
    }

    /// Whether the error happened after the network accepted a transaction.
    ///
    /// Callers that want to retry must check the chain first in that case.
    pub fn may_have_submitted(&self) -> bool {
        matches!(
            self,
            Self::DeploymentTimeout {
                tx_hash: Some(_),
                ..
            }
        )
    }
}
