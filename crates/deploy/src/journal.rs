//! On-disk record of deployments, one directory per network.
//!
//! ```text
//! {deployments}/{network}/deployed_addresses.json   "Module#Contract" -> address
//! {deployments}/{network}/journal.jsonl             one JournalEntry per attempt
//! ```

use std::{
    collections::BTreeMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use alloy_core::primitives::{Address, TxHash};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{DeployError, DeploymentResult, DeploymentStatus};

/// Default deployments directory, relative to the project root.
pub const DEFAULT_DEPLOYMENTS_DIR: &str = "deployments";

const ADDRESSES_FILENAME: &str = "deployed_addresses.json";
const JOURNAL_FILENAME: &str = "journal.jsonl";

/// Journal key of a contract, optionally scoped by the module that deployed it.
pub fn journal_key(module: Option<&str>, contract: &str) -> String {
    match module {
        Some(module) => format!("{module}#{contract}"),
        None => contract.to_string(),
    }
}

/// One deployment attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub key: String,
    pub contract: String,
    pub network: String,
    pub status: DeploymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<TxHash>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    /// SHA-256 of the creation bytecode that was deployed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytecode_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Unix timestamp of the attempt.
    pub recorded_at: i64,
}

impl JournalEntry {
    pub fn confirmed(key: impl Into<String>, result: &DeploymentResult, bytecode_hash: String) -> Self {
        Self {
            key: key.into(),
            contract: result.contract.clone(),
            network: result.network.clone(),
            status: result.status,
            address: Some(result.address),
            tx_hash: Some(result.tx_hash),
            block_number: result.block_number,
            bytecode_hash: Some(bytecode_hash),
            error: None,
            recorded_at: chrono::Utc::now().timestamp(),
        }
    }

    pub fn failed(
        key: impl Into<String>,
        contract: impl Into<String>,
        network: impl Into<String>,
        error: &DeployError,
    ) -> Self {
        let tx_hash = match error {
            DeployError::DeploymentTimeout { tx_hash, .. } => *tx_hash,
            _ => None,
        };
        Self {
            key: key.into(),
            contract: contract.into(),
            network: network.into(),
            status: DeploymentStatus::Failed,
            address: None,
            tx_hash,
            block_number: None,
            bytecode_hash: None,
            error: Some(error.to_string()),
            recorded_at: chrono::Utc::now().timestamp(),
        }
    }
}

/// Reads and appends deployment records under a root directory.
#[derive(Debug, Clone)]
pub struct DeploymentJournal {
    root: PathBuf,
}

impl DeploymentJournal {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn network_dir(&self, network: &str) -> PathBuf {
        self.root.join(network)
    }

    /// Addresses of every confirmed deployment on `network`.
    pub fn deployed_addresses(&self, network: &str) -> Result<BTreeMap<String, Address>, DeployError> {
        load_addresses(&self.network_dir(network).join(ADDRESSES_FILENAME))
            .map_err(DeployError::Journal)
    }

    /// The recorded address of `key` on `network`.
    pub fn lookup(&self, network: &str, key: &str) -> Result<Option<Address>, DeployError> {
        Ok(self.deployed_addresses(network)?.get(key).copied())
    }

    /// The most recent confirmed entry of `key` on `network`.
    pub fn last_confirmed(&self, network: &str, key: &str) -> Result<Option<JournalEntry>, DeployError> {
        Ok(self
            .entries(network)?
            .into_iter()
            .rev()
            .find(|entry| entry.key == key && entry.status == DeploymentStatus::Confirmed))
    }

    /// Every recorded attempt on `network`, oldest first.
    pub fn entries(&self, network: &str) -> Result<Vec<JournalEntry>, DeployError> {
        load_entries(&self.network_dir(network).join(JOURNAL_FILENAME)).map_err(DeployError::Journal)
    }

    /// Append `entry`. Confirmed entries also update the address map.
    pub fn record(&self, entry: &JournalEntry) -> Result<(), DeployError> {
        self.try_record(entry).map_err(DeployError::Journal)
    }

    fn try_record(&self, entry: &JournalEntry) -> Result<()> {
        let dir = self.network_dir(&entry.network);
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create deployments directory {}", dir.display()))?;

        let journal_path = dir.join(JOURNAL_FILENAME);
        let line = serde_json::to_string(entry).context("Failed to serialize journal entry")?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&journal_path)
            .with_context(|| format!("Failed to open {}", journal_path.display()))?;
        writeln!(file, "{line}")
            .with_context(|| format!("Failed to append to {}", journal_path.display()))?;

        if let (DeploymentStatus::Confirmed, Some(address)) = (entry.status, entry.address) {
            let addresses_path = dir.join(ADDRESSES_FILENAME);
            let mut addresses = load_addresses(&addresses_path)?;
            addresses.insert(entry.key.clone(), address);
            save_addresses(&addresses_path, &addresses)?;
        }

        tracing::debug!(
            network = %entry.network,
            key = %entry.key,
            status = %entry.status,
            "Deployment recorded"
        );

        Ok(())
    }
}

fn load_addresses(path: &Path) -> Result<BTreeMap<String, Address>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read deployed addresses from {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse deployed addresses in {}", path.display()))
}

/// Write through a temporary file so a crash never leaves a truncated map.
fn save_addresses(path: &Path, addresses: &BTreeMap<String, Address>) -> Result<()> {
    let json =
        serde_json::to_string_pretty(addresses).context("Failed to serialize deployed addresses")?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).with_context(|| format!("Failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("Failed to move {} into place", tmp.display()))?;
    Ok(())
}

fn load_entries(path: &Path) -> Result<Vec<JournalEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read journal {}", path.display()))?;
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("Malformed entry at {}:{}", path.display(), n + 1))
        })
        .collect()
}
