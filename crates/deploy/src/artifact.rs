//! Compiled contract artifacts.
//!
//! Artifacts are produced by an external compilation step. Two layouts are
//! understood, both keyed by `<Source>.sol/<Contract>.json`:
//! - Hardhat: `bytecode` is a hex string, link references at the top level.
//! - Foundry: `bytecode` is an object holding `object` and `linkReferences`.

use std::{
    fs,
    path::{Path, PathBuf},
};

use alloy_core::{json_abi::JsonAbi, primitives::Bytes};
use serde::Deserialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::DeployError;

/// Default build output directory, relative to the project root.
pub const DEFAULT_ARTIFACTS_DIR: &str = "artifacts";

/// Directories that hold compiler bookkeeping rather than contract artifacts.
const IGNORED_DIRS: &[&str] = &["build-info", "cache"];

/// A compiled contract ready for deployment.
#[derive(Debug, Clone, PartialEq)]
pub struct ContractArtifact {
    /// The contract name.
    pub name: String,
    /// The source file the contract was compiled from, when recorded.
    pub source_name: Option<String>,
    /// Creation bytecode.
    pub bytecode: Bytes,
    /// The contract's interface description.
    pub abi: JsonAbi,
    /// Where the artifact was read from.
    pub path: PathBuf,
}

impl ContractArtifact {
    /// Whether the artifact carries creation code. Interfaces and abstract
    /// contracts compile to empty bytecode.
    pub fn is_deployable(&self) -> bool {
        !self.bytecode.is_empty()
    }

    /// Number of arguments the constructor expects.
    pub fn constructor_arity(&self) -> usize {
        self.abi
            .constructor
            .as_ref()
            .map_or(0, |constructor| constructor.inputs.len())
    }

    /// SHA-256 of the creation bytecode, hex encoded.
    pub fn bytecode_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.bytecode);
        hex::encode(hasher.finalize())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawArtifact {
    #[serde(default)]
    contract_name: Option<String>,
    #[serde(default)]
    source_name: Option<String>,
    abi: JsonAbi,
    bytecode: RawBytecode,
    #[serde(default)]
    link_references: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawBytecode {
    Hex(String),
    Object {
        object: String,
        #[serde(default, rename = "linkReferences")]
        link_references: Map<String, Value>,
    },
}

/// Reads contract artifacts from a build output directory.
#[derive(Debug, Clone)]
pub struct ArtifactResolver {
    root: PathBuf,
}

impl ArtifactResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Load the artifact of `contract`.
    ///
    /// `contract` is either a bare name (`ProofOrchestrator`) or a fully
    /// qualified name (`contracts/ProofOrchestrator.sol:ProofOrchestrator`),
    /// the latter being required when two sources define the same name.
    pub fn load(&self, contract: &str) -> Result<ContractArtifact, DeployError> {
        let path = self.locate(contract)?;
        let name = contract
            .rsplit_once(':')
            .map_or(contract, |(_, name)| name);

        let artifact = Self::read(name, &path)?;
        tracing::debug!(
            contract = %artifact.name,
            path = %path.display(),
            bytecode_len = artifact.bytecode.len(),
            "Artifact loaded"
        );
        Ok(artifact)
    }

    /// Names of all contracts with an artifact under the root, sorted.
    pub fn available(&self) -> Vec<String> {
        let mut names: Vec<String> = artifact_files(&self.root)
            .into_iter()
            .filter_map(|path| {
                path.file_stem()
                    .and_then(|stem| stem.to_str())
                    .map(String::from)
            })
            .collect();
        names.sort();
        names.dedup();
        names
    }

    fn not_found(&self, contract: &str) -> DeployError {
        DeployError::ArtifactNotFound {
            contract: contract.to_string(),
            root: self.root.clone(),
        }
    }

    fn locate(&self, contract: &str) -> Result<PathBuf, DeployError> {
        if contract.is_empty() {
            return Err(self.not_found(contract));
        }

        if let Some((source, name)) = contract.rsplit_once(':') {
            let path = self.root.join(source).join(format!("{name}.json"));
            return if path.is_file() {
                Ok(path)
            } else {
                Err(self.not_found(contract))
            };
        }

        let file_name = format!("{contract}.json");
        let mut matches: Vec<PathBuf> = artifact_files(&self.root)
            .into_iter()
            .filter(|path| path.file_name().and_then(|f| f.to_str()) == Some(file_name.as_str()))
            .collect();

        match matches.len() {
            0 => Err(self.not_found(contract)),
            1 => Ok(matches.remove(0)),
            _ => {
                matches.sort();
                let sources = matches
                    .iter()
                    .filter_map(|p| p.parent())
                    .map(|p| p.strip_prefix(&self.root).unwrap_or(p).display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                Err(DeployError::InvalidArtifact {
                    contract: contract.to_string(),
                    path: self.root.clone(),
                    reason: format!(
                        "name is defined in several sources ({sources}), use '<source>:{contract}'"
                    ),
                })
            }
        }
    }

    fn read(name: &str, path: &Path) -> Result<ContractArtifact, DeployError> {
        let invalid = |reason: String| DeployError::InvalidArtifact {
            contract: name.to_string(),
            path: path.to_path_buf(),
            reason,
        };

        let content = fs::read_to_string(path).map_err(|e| invalid(format!("read failed: {e}")))?;
        let raw: RawArtifact =
            serde_json::from_str(&content).map_err(|e| invalid(format!("malformed json: {e}")))?;

        let (code, nested_links) = match raw.bytecode {
            RawBytecode::Hex(code) => (code, Map::new()),
            RawBytecode::Object {
                object,
                link_references,
            } => (object, link_references),
        };

        if !raw.link_references.is_empty() || !nested_links.is_empty() {
            return Err(invalid(
                "bytecode references external libraries, which must be linked first".to_string(),
            ));
        }

        let bytecode = decode_bytecode(&code).map_err(invalid)?;

        Ok(ContractArtifact {
            name: raw.contract_name.unwrap_or_else(|| name.to_string()),
            source_name: raw.source_name,
            bytecode,
            abi: raw.abi,
            path: path.to_path_buf(),
        })
    }
}

fn decode_bytecode(code: &str) -> Result<Bytes, String> {
    let code = code.trim();
    let code = code.strip_prefix("0x").unwrap_or(code);
    if code.contains("__") {
        return Err("bytecode contains unlinked library placeholders".to_string());
    }
    hex::decode(code)
        .map(Bytes::from)
        .map_err(|e| format!("bytecode is not valid hex: {e}"))
}

/// Every `<Source>.sol/<Contract>.json` file under `root`.
fn artifact_files(root: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                if dir != root {
                    tracing::warn!(dir = %dir.display(), error = %e, "Skipping unreadable directory");
                }
                continue;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();

            if path.is_dir() {
                if !IGNORED_DIRS.contains(&file_name.as_ref()) {
                    pending.push(path);
                }
                continue;
            }

            let in_source_dir = dir
                .file_name()
                .and_then(|d| d.to_str())
                .is_some_and(|d| d.ends_with(".sol"));

            if in_source_dir && file_name.ends_with(".json") && !file_name.ends_with(".dbg.json") {
                found.push(path);
            }
        }
    }

    found
}
