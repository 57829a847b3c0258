//! solivre-deploy - Deployment pipeline for compiled EVM contracts.
//!
//! Given a contract name and a symbolic network name, the [`Orchestrator`]
//! resolves the network through the [`NetworkRegistry`], loads the compiled
//! artifact with the [`ArtifactResolver`], submits a contract-creation
//! transaction and waits for one confirmation.
//!
//! ```no_run
//! # async fn run() -> Result<(), solivre_deploy::DeployError> {
//! use std::sync::Arc;
//!
//! use solivre_deploy::{EnvSecrets, Orchestrator, ProjectConfig};
//!
//! let config = ProjectConfig::load(None)?;
//! let orchestrator = Orchestrator::from_config(&config, Arc::new(EnvSecrets));
//! let result = orchestrator.deploy("SolivreKernel", "hardhatMainnet").await?;
//! println!("deployed to {}", result.address);
//! # Ok(())
//! # }
//! ```

pub mod artifact;
pub mod config;
mod error;
pub mod journal;
pub mod module;
pub mod network;
mod orchestrator;
pub mod rpc;
mod secrets;
pub mod transport;
pub mod tx;

pub use artifact::{ArtifactResolver, ContractArtifact};
pub use config::{CONFIG_FILENAME, ProjectConfig};
pub use error::{BoxError, DeployError};
pub use journal::{DeploymentJournal, JournalEntry};
pub use module::{ContractOutcome, DeploymentModule, ModuleDeployment, ModuleRegistry};
pub use network::{
    ChainType, CredentialRef, NetworkConfig, NetworkDefinition, NetworkRegistry, TransportKind,
    UrlSource, endpoint_label,
};
pub use orchestrator::{
    DEFAULT_CONFIRMATION_TIMEOUT, DEFAULT_POLL_INTERVAL, DeploymentResult, DeploymentStatus,
    Orchestrator,
};
pub use secrets::{EnvSecrets, Secret, SecretProvider, StaticSecrets};
