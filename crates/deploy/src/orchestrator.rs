//! The deployment pipeline: resolve, load, bind signer, submit, confirm.

use std::{fmt, sync::Arc, time::Duration};

use alloy_core::primitives::{Address, TxHash};
use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::{
    ArtifactResolver, ContractArtifact, DeployError, DeploymentJournal, JournalEntry,
    ModuleRegistry, NetworkConfig, NetworkRegistry, ProjectConfig, SecretProvider,
    journal::journal_key,
    module::{ContractOutcome, ModuleDeployment},
    network::TransportKind,
    rpc,
    transport::{
        DeployRequest, DeployTransport, HttpTransport, SIMULATED_CHAIN_ID, SimulatedChain,
        SimulatedChains, SimulatedTransport, Transport,
    },
    tx::LocalSigner,
};

/// Default time to wait for a submitted deployment to be mined.
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(120);

/// Default interval between receipt polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Terminal state of a deployment.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DeploymentStatus {
    Confirmed,
    Failed,
}

/// A confirmed contract deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentResult {
    pub contract: String,
    pub network: String,
    pub address: Address,
    pub tx_hash: TxHash,
    pub status: DeploymentStatus,
    pub block_number: Option<u64>,
    /// Account that sent the creation transaction.
    pub deployer: Address,
}

/// Deploys compiled contracts to registered networks.
///
/// Submissions made through one orchestrator are serialized from nonce
/// lookup until the node accepted the transaction. Deployments from several
/// processes to the same account must be coordinated by the caller.
pub struct Orchestrator {
    networks: NetworkRegistry,
    modules: ModuleRegistry,
    artifacts: ArtifactResolver,
    secrets: Arc<dyn SecretProvider>,
    simulated: SimulatedChains,
    confirmation_timeout: Duration,
    poll_interval: Duration,
    request_timeout: Duration,
    submission_lock: tokio::sync::Mutex<()>,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("networks", &self.networks.names())
            .field("modules", &self.modules.names())
            .field("artifacts", &self.artifacts.root())
            .field("confirmation_timeout", &self.confirmation_timeout)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn new(
        networks: NetworkRegistry,
        artifacts: ArtifactResolver,
        secrets: Arc<dyn SecretProvider>,
    ) -> Self {
        Self {
            networks,
            modules: ModuleRegistry::default(),
            artifacts,
            secrets,
            simulated: SimulatedChains::new(),
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            request_timeout: rpc::DEFAULT_TIMEOUT,
            submission_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn from_config(config: &ProjectConfig, secrets: Arc<dyn SecretProvider>) -> Self {
        Self::new(
            config.networks.clone(),
            ArtifactResolver::new(&config.artifacts),
            secrets,
        )
        .with_modules(config.modules.clone())
        .with_confirmation_timeout(config.confirmation_timeout())
        .with_poll_interval(config.poll_interval())
        .with_request_timeout(config.request_timeout())
    }

    pub fn with_modules(mut self, modules: ModuleRegistry) -> Self {
        self.modules = modules;
        self
    }

    pub fn with_confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn networks(&self) -> &NetworkRegistry {
        &self.networks
    }

    pub fn modules(&self) -> &ModuleRegistry {
        &self.modules
    }

    pub fn artifacts(&self) -> &ArtifactResolver {
        &self.artifacts
    }

    /// Resolve `network` against the registry and the secret provider.
    pub fn resolve_network(&self, network: &str) -> Result<NetworkConfig, DeployError> {
        self.networks.resolve(network, self.secrets.as_ref())
    }

    /// The in-process chain behind a simulated network, once something was deployed to it.
    pub fn simulated_chain(&self, network: &str) -> Option<Arc<SimulatedChain>> {
        self.simulated.get(network)
    }

    /// Build the transport for a resolved network, binding its signer.
    pub fn connect(&self, network: &NetworkConfig) -> Result<Transport, anyhow::Error> {
        let signer = network
            .signer_credential()
            .map(|secret| LocalSigner::from_private_key(secret.expose()))
            .transpose()
            .with_context(|| format!("Credential of network '{}' is not a usable key", network.name))?;

        match network.transport {
            TransportKind::Simulated => {
                let chain = self.simulated.get_or_create(
                    &network.name,
                    network.chain_id.unwrap_or(SIMULATED_CHAIN_ID),
                    network.chain_type,
                );
                Ok(Transport::Simulated(SimulatedTransport::new(chain, signer)?))
            }
            TransportKind::LocalHttp | TransportKind::RemoteHttp => {
                let url = network
                    .url
                    .clone()
                    .with_context(|| format!("Network '{}' has no endpoint url", network.name))?;
                Ok(Transport::Http(HttpTransport::new(
                    url,
                    signer,
                    self.request_timeout,
                )?))
            }
        }
    }

    /// Deploy `contract` to `network` and wait for one confirmation.
    pub async fn deploy(
        &self,
        contract: &str,
        network: &str,
    ) -> Result<DeploymentResult, DeployError> {
        let network = self.resolve_network(network)?;
        let artifact = Arc::new(self.artifacts.load(contract)?);
        self.deploy_artifact(contract, &network, &artifact).await
    }

    /// Like [`deploy`](Self::deploy), recording the attempt in `journal` under the contract name.
    pub async fn deploy_recorded(
        &self,
        contract: &str,
        network: &str,
        journal: &DeploymentJournal,
    ) -> Result<DeploymentResult, DeployError> {
        let network = self.resolve_network(network)?;
        let artifact = Arc::new(self.artifacts.load(contract)?);
        let key = journal_key(None, contract);
        self.deploy_and_record(&key, contract, &network, &artifact, Some(journal))
            .await
    }

    /// Deploy every contract of `module` to `network`, in order.
    ///
    /// With a journal, contracts already confirmed on the network with the
    /// same bytecode are reused unless `redeploy` is set. The first failure
    /// stops the module; contracts deployed before it stay recorded.
    pub async fn deploy_module(
        &self,
        module: &str,
        network: &str,
        journal: Option<&DeploymentJournal>,
        redeploy: bool,
    ) -> Result<ModuleDeployment, DeployError> {
        let contracts = self.modules.get(module)?.contracts.clone();
        let network = self.resolve_network(network)?;

        tracing::info!(
            module = %module,
            network = %network.name,
            contracts = contracts.len(),
            redeploy,
            "Deploying module"
        );

        let mut outcomes = Vec::with_capacity(contracts.len());
        for contract in &contracts {
            let key = journal_key(Some(module), contract);
            let artifact = Arc::new(self.artifacts.load(contract)?);

            if let (Some(journal), false) = (journal, redeploy) {
                if let Some(address) = reusable_address(journal, &network.name, &key, &artifact)? {
                    tracing::info!(
                        contract = %contract,
                        network = %network.name,
                        address = %address,
                        "Contract already deployed, reusing"
                    );
                    outcomes.push(ContractOutcome::Reused {
                        contract: contract.clone(),
                        address,
                    });
                    continue;
                }
            }

            let result = self
                .deploy_and_record(&key, contract, &network, &artifact, journal)
                .await?;
            outcomes.push(ContractOutcome::Deployed(result));
        }

        Ok(ModuleDeployment {
            module: module.to_string(),
            network: network.name,
            outcomes,
        })
    }

    async fn deploy_and_record(
        &self,
        key: &str,
        contract: &str,
        network: &NetworkConfig,
        artifact: &Arc<ContractArtifact>,
        journal: Option<&DeploymentJournal>,
    ) -> Result<DeploymentResult, DeployError> {
        let outcome = self.deploy_artifact(contract, network, artifact).await;

        let Some(journal) = journal else {
            return outcome;
        };

        let entry = match &outcome {
            Ok(result) => JournalEntry::confirmed(key, result, artifact.bytecode_hash()),
            Err(err) => JournalEntry::failed(key, contract, &network.name, err),
        };
        match (journal.record(&entry), outcome) {
            (Ok(()), outcome) => outcome,
            // The deployment error is the one worth reporting.
            (Err(journal_err), Err(err)) => {
                tracing::warn!(error = %journal_err, "Failed to record failed deployment");
                Err(err)
            }
            (Err(journal_err), Ok(result)) => {
                tracing::error!(
                    contract = %contract,
                    network = %network.name,
                    address = %result.address,
                    tx_hash = %result.tx_hash,
                    "Contract deployed but could not be recorded"
                );
                let source = match journal_err {
                    DeployError::Journal(source) => source,
                    other => anyhow::Error::new(other),
                };
                Err(DeployError::Journal(source.context(format!(
                    "'{contract}' was deployed to {} (tx {}) on '{}' but not recorded",
                    result.address, result.tx_hash, network.name
                ))))
            }
        }
    }

    async fn deploy_artifact(
        &self,
        contract: &str,
        network: &NetworkConfig,
        artifact: &ContractArtifact,
    ) -> Result<DeploymentResult, DeployError> {
        let fail = |source: anyhow::Error| DeployError::failed(contract, &network.name, source);

        if !artifact.is_deployable() {
            return Err(fail(anyhow::anyhow!(
                "artifact {} has no creation bytecode (abstract contract or interface?)",
                artifact.path.display()
            )));
        }
        let arity = artifact.constructor_arity();
        if arity > 0 {
            return Err(fail(anyhow::anyhow!(
                "constructor takes {arity} argument(s), constructor arguments are not supported"
            )));
        }

        let transport = self.connect(network).map_err(fail)?;

        tracing::info!(
            contract = %contract,
            network = %network.name,
            transport = %network.transport,
            endpoint = %network.endpoint_label(),
            bytecode_len = artifact.bytecode.len(),
            "Deploying contract"
        );

        let submission = {
            let _guard = self.submission_lock.lock().await;

            let chain_id = transport.chain_id().await.map_err(fail)?;
            if let Some(expected) = network.chain_id {
                if expected != chain_id {
                    return Err(fail(anyhow::anyhow!(
                        "endpoint reports chain id {chain_id}, network is declared with {expected}"
                    )));
                }
            }

            let request = DeployRequest {
                chain_id,
                initcode: artifact.bytecode.clone(),
            };
            transport.submit(&request).await.map_err(fail)?
        };

        tracing::info!(
            contract = %contract,
            network = %network.name,
            tx_hash = %submission.tx_hash,
            from = %submission.from,
            "Deployment submitted, waiting for confirmation"
        );

        let receipt = tokio::time::timeout(
            self.confirmation_timeout,
            rpc::poll_until("deployment receipt", self.poll_interval, || {
                transport.receipt(submission.tx_hash)
            }),
        )
        .await
        .map_err(|_| DeployError::DeploymentTimeout {
            contract: contract.to_string(),
            network: network.name.clone(),
            tx_hash: Some(submission.tx_hash),
            timeout: self.confirmation_timeout,
        })?
        .map_err(fail)?;

        if !receipt.succeeded() {
            return Err(fail(anyhow::anyhow!(
                "transaction {} reverted{}",
                submission.tx_hash,
                receipt
                    .block_number()
                    .map(|n| format!(" in block {n}"))
                    .unwrap_or_default()
            )));
        }
        let address = receipt.contract_address.with_context(|| {
            format!("receipt of {} carries no contract address", submission.tx_hash)
        }).map_err(fail)?;

        let result = DeploymentResult {
            contract: contract.to_string(),
            network: network.name.clone(),
            address,
            tx_hash: submission.tx_hash,
            status: DeploymentStatus::Confirmed,
            block_number: receipt.block_number(),
            deployer: receipt.from.unwrap_or(submission.from),
        };

        tracing::info!(
            contract = %contract,
            network = %network.name,
            address = %result.address,
            block = ?result.block_number,
            "Contract deployed"
        );

        Ok(result)
    }
}

/// The recorded address of `key` when its last confirmed deployment used the same bytecode.
fn reusable_address(
    journal: &DeploymentJournal,
    network: &str,
    key: &str,
    artifact: &ContractArtifact,
) -> Result<Option<Address>, DeployError> {
    let Some(entry) = journal.last_confirmed(network, key)? else {
        return Ok(None);
    };
    let Some(address) = journal.lookup(network, key)?.or(entry.address) else {
        return Ok(None);
    };

    let current = artifact.bytecode_hash();
    match entry.bytecode_hash.as_deref() {
        Some(recorded) if recorded == current => Ok(Some(address)),
        Some(recorded) => {
            tracing::info!(
                key = %key,
                network = %network,
                recorded = %recorded,
                current = %current,
                "Bytecode changed since last deployment, redeploying"
            );
            Ok(None)
        }
        None => Ok(Some(address)),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempdir::TempDir;

    use super::*;
    use crate::{
        StaticSecrets,
        network::{ChainType, CredentialRef, NetworkDefinition},
        transport::DEV_PRIVATE_KEY,
    };

    fn write_artifact(root: &std::path::Path, name: &str, bytecode: &str, abi: serde_json::Value) {
        let dir = root.join("contracts").join(format!("{name}.sol"));
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join(format!("{name}.json")),
            serde_json::json!({
                "contractName": name,
                "sourceName": format!("contracts/{name}.sol"),
                "abi": abi,
                "bytecode": bytecode,
            })
            .to_string(),
        )
        .unwrap();
    }

    fn orchestrator(root: &std::path::Path) -> Orchestrator {
        Orchestrator::new(
            NetworkRegistry::default(),
            ArtifactResolver::new(root),
            Arc::new(StaticSecrets::new()),
        )
        .with_poll_interval(Duration::from_millis(5))
        .with_confirmation_timeout(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_deploy_to_simulated_network() {
        let tmp = TempDir::new("artifacts").unwrap();
        write_artifact(tmp.path(), "SolivreKernel", "0x6080604052", serde_json::json!([]));
        let orchestrator = orchestrator(tmp.path());

        let result = orchestrator
            .deploy("SolivreKernel", "hardhatMainnet")
            .await
            .unwrap();

        assert_eq!(result.status, DeploymentStatus::Confirmed);
        assert_eq!(result.network, "hardhatMainnet");
        assert_eq!(result.block_number, Some(1));
        let chain = orchestrator.simulated_chain("hardhatMainnet").unwrap();
        assert!(chain.code_at(result.address).is_some());
    }

    #[tokio::test]
    async fn test_simulated_chain_persists_between_deployments() {
        let tmp = TempDir::new("artifacts").unwrap();
        write_artifact(tmp.path(), "SolivreKernel", "0x6080604052", serde_json::json!([]));
        let orchestrator = orchestrator(tmp.path());

        let first = orchestrator.deploy("SolivreKernel", "hardhatOp").await.unwrap();
        let second = orchestrator.deploy("SolivreKernel", "hardhatOp").await.unwrap();

        assert_ne!(first.address, second.address);
        assert_eq!(second.block_number, Some(2));
    }

    #[tokio::test]
    async fn test_unknown_network() {
        let tmp = TempDir::new("artifacts").unwrap();
        let err = orchestrator(tmp.path())
            .deploy("SolivreKernel", "nonexistent")
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::UnknownNetwork { .. }));
    }

    #[tokio::test]
    async fn test_missing_required_credential_comes_before_artifact_lookup() {
        let tmp = TempDir::new("artifacts").unwrap();
        let err = orchestrator(tmp.path())
            .deploy("DoesNotExist", "sepolia")
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::MissingCredential { .. }));
    }

    #[tokio::test]
    async fn test_missing_artifact() {
        let tmp = TempDir::new("artifacts").unwrap();
        let err = orchestrator(tmp.path())
            .deploy("DoesNotExist", "hardhatMainnet")
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::ArtifactNotFound { .. }));
    }

    #[tokio::test]
    async fn test_empty_bytecode_fails_before_submission() {
        let tmp = TempDir::new("artifacts").unwrap();
        write_artifact(tmp.path(), "IKernel", "0x", serde_json::json!([]));
        let orchestrator = orchestrator(tmp.path());

        let err = orchestrator.deploy("IKernel", "hardhatMainnet").await.unwrap_err();

        assert!(matches!(err, DeployError::DeploymentFailed { .. }));
        // Nothing was submitted, so no chain was started.
        assert!(orchestrator.simulated_chain("hardhatMainnet").is_none());
    }

    #[tokio::test]
    async fn test_constructor_arguments_are_rejected() {
        let tmp = TempDir::new("artifacts").unwrap();
        write_artifact(
            tmp.path(),
            "ProofOrchestrator",
            "0x6080604052",
            serde_json::json!([{
                "type": "constructor",
                "stateMutability": "nonpayable",
                "inputs": [{ "name": "kernel", "type": "address", "internalType": "address" }]
            }]),
        );

        let err = orchestrator(tmp.path())
            .deploy("ProofOrchestrator", "hardhatMainnet")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("constructor"));
    }

    #[tokio::test]
    async fn test_simulated_network_uses_configured_credential() {
        let tmp = TempDir::new("artifacts").unwrap();
        write_artifact(tmp.path(), "SolivreKernel", "0x6080604052", serde_json::json!([]));

        let key = format!("0x{}", "46".repeat(32));
        let networks = NetworkRegistry::empty()
            .with_network(
                "sim",
                NetworkDefinition::simulated(ChainType::Generic)
                    .chain_id(1)
                    .account(CredentialRef::required("SIM_KEY")),
            )
            .unwrap();
        let orchestrator = Orchestrator::new(
            networks,
            ArtifactResolver::new(tmp.path()),
            Arc::new(StaticSecrets::new().with("SIM_KEY", key)),
        )
        .with_poll_interval(Duration::from_millis(5));

        let result = orchestrator.deploy("SolivreKernel", "sim").await.unwrap();
        assert_eq!(
            result.deployer,
            alloy_core::primitives::address!("9d8A62f656a8d1615C1294fd71e9CFb3E4855A4F")
        );
    }

    #[tokio::test]
    async fn test_module_reuses_recorded_contracts() {
        let tmp = TempDir::new("project").unwrap();
        let artifacts = tmp.path().join("artifacts");
        write_artifact(&artifacts, "SolivreKernel", "0x6080604052", serde_json::json!([]));
        let journal = DeploymentJournal::new(tmp.path().join("deployments"));
        let orchestrator = orchestrator(&artifacts);

        let first = orchestrator
            .deploy_module("SolivreKernelModule", "hardhatMainnet", Some(&journal), false)
            .await
            .unwrap();
        assert!(matches!(first.outcomes[0], ContractOutcome::Deployed(_)));

        let second = orchestrator
            .deploy_module("SolivreKernelModule", "hardhatMainnet", Some(&journal), false)
            .await
            .unwrap();
        assert!(matches!(second.outcomes[0], ContractOutcome::Reused { .. }));
        assert_eq!(first.outcomes[0].address(), second.outcomes[0].address());

        let third = orchestrator
            .deploy_module("SolivreKernelModule", "hardhatMainnet", Some(&journal), true)
            .await
            .unwrap();
        assert!(matches!(third.outcomes[0], ContractOutcome::Deployed(_)));
        assert_ne!(first.outcomes[0].address(), third.outcomes[0].address());
        assert_eq!(
            journal
                .lookup("hardhatMainnet", "SolivreKernelModule#SolivreKernel")
                .unwrap(),
            Some(third.outcomes[0].address())
        );
    }

    #[tokio::test]
    async fn test_unrecorded_deployment_reports_address() {
        let tmp = TempDir::new("project").unwrap();
        let artifacts = tmp.path().join("artifacts");
        write_artifact(&artifacts, "SolivreKernel", "0x6080604052", serde_json::json!([]));
        // A regular file where the deployments directory should be.
        let blocked = tmp.path().join("deployments");
        fs::write(&blocked, "").unwrap();
        let journal = DeploymentJournal::new(&blocked);
        let orchestrator = orchestrator(&artifacts);

        let err = orchestrator
            .deploy_recorded("SolivreKernel", "hardhatMainnet", &journal)
            .await
            .unwrap_err();

        assert!(matches!(err, DeployError::Journal(_)));
        let message = err.to_string();
        assert!(message.contains("'SolivreKernel' was deployed to 0x"));
        assert!(message.contains("(tx 0x"));
        assert!(message.contains("hardhatMainnet"));
    }

    #[tokio::test]
    async fn test_unknown_module() {
        let tmp = TempDir::new("artifacts").unwrap();
        let err = orchestrator(tmp.path())
            .deploy_module("Nope", "hardhatMainnet", None, false)
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::UnknownModule(_)));
    }

    #[test]
    fn test_debug_hides_secrets() {
        let tmp = TempDir::new("artifacts").unwrap();
        let orchestrator = Orchestrator::new(
            NetworkRegistry::default(),
            ArtifactResolver::new(tmp.path()),
            Arc::new(StaticSecrets::new().with("SEPOLIA_PRIVATE_KEY", DEV_PRIVATE_KEY)),
        );
        let debug = format!("{orchestrator:?}");
        assert!(!debug.contains(&DEV_PRIVATE_KEY[2..]));
    }
}
