use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::level_filters::LevelFilter;

#[derive(Parser)]
#[command(name = "solivre")]
#[command(
    author,
    version,
    about = "Deploy compiled contracts to named networks"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, global = true, env = "SOLIVRE_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Path to a Solivre.toml file, or to the directory holding it.
    ///
    /// If not provided, ./Solivre.toml is used when present, otherwise the built-in defaults.
    #[arg(long, global = true, alias = "conf", env = "SOLIVRE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Deploy a single contract.
    Deploy {
        /// Contract name, or `<source>:<name>` when the name is ambiguous.
        contract: String,

        /// The network to deploy to.
        #[arg(short, long, env = "SOLIVRE_NETWORK")]
        network: String,

        /// Do not record the deployment under the deployments directory.
        #[arg(long)]
        no_record: bool,
    },

    /// Deploy every contract of a module, skipping those already deployed.
    Module {
        /// Module name, e.g. `SolivreKernelModule`.
        module: String,

        /// The network to deploy to.
        #[arg(short, long, env = "SOLIVRE_NETWORK")]
        network: String,

        /// Redeploy contracts even when they are already recorded.
        #[arg(long, env = "SOLIVRE_REDEPLOY", default_value_t = false)]
        redeploy: bool,
    },

    /// List registered networks.
    Networks,

    /// List recorded deployments of a network.
    Deployments {
        /// The network to list.
        #[arg(short, long, env = "SOLIVRE_NETWORK")]
        network: String,
    },
}
