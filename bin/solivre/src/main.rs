//! solivre deploys compiled EVM contracts to named networks.

mod cli;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use comfy_table::{Table, presets::UTF8_FULL};

use cli::{Cli, Command};
use solivre_deploy::{
    ContractOutcome, CredentialRef, DeploymentJournal, EnvSecrets, Orchestrator, ProjectConfig,
    TransportKind, UrlSource,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger. Stdout is reserved for results.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .with_writer(std::io::stderr)
        .init();

    let config = ProjectConfig::load(cli.config.as_deref())?;
    let orchestrator = Orchestrator::from_config(&config, Arc::new(EnvSecrets));
    let journal = DeploymentJournal::new(&config.deployments);

    match cli.command {
        Command::Deploy {
            contract,
            network,
            no_record,
        } => {
            let result = if no_record || !is_persistent(&orchestrator, &network) {
                orchestrator.deploy(&contract, &network).await?
            } else {
                orchestrator
                    .deploy_recorded(&contract, &network, &journal)
                    .await?
            };
            println!("{contract} deployed to: {}", result.address);
        }

        Command::Module {
            module,
            network,
            redeploy,
        } => {
            let journal = is_persistent(&orchestrator, &network).then_some(&journal);
            let deployment = orchestrator
                .deploy_module(&module, &network, journal, redeploy)
                .await?;

            for outcome in &deployment.outcomes {
                match outcome {
                    ContractOutcome::Deployed(result) => {
                        println!("{} deployed to: {}", result.contract, result.address)
                    }
                    ContractOutcome::Reused { contract, address } => {
                        println!("{contract} already deployed at: {address}")
                    }
                }
            }
        }

        Command::Networks => println!("{}", networks_table(&config)),

        Command::Deployments { network } => {
            if !config.networks.contains(&network) {
                tracing::warn!(network = %network, "Network is not registered");
            }
            println!("{}", deployments_table(&journal, &network)?);
        }
    }

    Ok(())
}

/// Simulated networks live for one process, so their deployments are not recorded.
fn is_persistent(orchestrator: &Orchestrator, network: &str) -> bool {
    orchestrator
        .networks()
        .get(network)
        .is_some_and(|definition| definition.transport != TransportKind::Simulated)
}

fn networks_table(config: &ProjectConfig) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec![
        "Name",
        "Type",
        "Chain type",
        "Chain id",
        "Endpoint",
        "Credentials",
    ]);

    for (name, definition) in config.networks.iter() {
        let endpoint = definition
            .url
            .as_ref()
            .map_or_else(|| "in-process".to_string(), UrlSource::label);
        let credentials = definition
            .accounts
            .iter()
            .map(|credential: &CredentialRef| {
                if credential.is_required() {
                    credential.var().to_string()
                } else {
                    format!("{} (optional)", credential.var())
                }
            })
            .collect::<Vec<_>>()
            .join(", ");

        table.add_row(vec![
            name.to_string(),
            definition.transport.to_string(),
            definition.chain_type.to_string(),
            definition
                .chain_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "-".to_string()),
            endpoint,
            credentials,
        ]);
    }

    table
}

fn deployments_table(journal: &DeploymentJournal, network: &str) -> Result<Table> {
    let addresses = journal.deployed_addresses(network)?;
    let entries = journal.entries(network)?;

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["Key", "Address", "Transaction", "Block", "Recorded at"]);

    for (key, address) in &addresses {
        let entry = entries
            .iter()
            .rev()
            .find(|entry| &entry.key == key && entry.address == Some(*address));

        let tx_hash = entry
            .and_then(|entry| entry.tx_hash)
            .map(|hash| hash.to_string())
            .unwrap_or_else(|| "-".to_string());
        let block = entry
            .and_then(|entry| entry.block_number)
            .map(|n| n.to_string())
            .unwrap_or_else(|| "-".to_string());
        let recorded_at = entry
            .and_then(|entry| chrono::DateTime::from_timestamp(entry.recorded_at, 0))
            .map(|time| time.to_rfc3339())
            .unwrap_or_else(|| "-".to_string());

        table.add_row(vec![
            key.clone(),
            address.to_string(),
            tx_hash,
            block,
            recorded_at,
        ]);
    }

    if addresses.is_empty() {
        tracing::info!(network = %network, root = %journal.root().display(), "No deployments recorded");
    }

    Ok(table)
}
