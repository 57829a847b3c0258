//! Deployment modules: named, ordered groups of contracts deployed together.

use std::collections::BTreeMap;

use alloy_core::primitives::Address;
use serde::{Deserialize, Serialize};

use crate::{DeployError, DeploymentResult};

/// Contracts deployed by a module, in deployment order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentModule {
    pub contracts: Vec<String>,
}

impl DeploymentModule {
    pub fn new<I, S>(contracts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            contracts: contracts.into_iter().map(Into::into).collect(),
        }
    }
}

/// Registry of deployment modules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleRegistry {
    modules: BTreeMap<String, DeploymentModule>,
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self {
            modules: BTreeMap::from([
                (
                    "ProofOrchestratorModule".to_string(),
                    DeploymentModule::new(["ProofOrchestrator"]),
                ),
                (
                    "SolivreKernelModule".to_string(),
                    DeploymentModule::new(["SolivreKernel"]),
                ),
            ]),
        }
    }
}

impl ModuleRegistry {
    pub fn empty() -> Self {
        Self {
            modules: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, module: DeploymentModule) {
        self.modules.insert(name.into(), module);
    }

    /// Overlay `other` on top of this registry. Modules of `other` replace same-named ones.
    pub fn merge(&mut self, other: ModuleRegistry) {
        self.modules.extend(other.modules);
    }

    pub fn get(&self, name: &str) -> Result<&DeploymentModule, DeployError> {
        self.modules
            .get(name)
            .ok_or_else(|| DeployError::UnknownModule(name.to_string()))
    }

    pub fn names(&self) -> Vec<String> {
        self.modules.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DeploymentModule)> {
        self.modules.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// What happened to one contract of a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractOutcome {
    /// A new instance was deployed and confirmed.
    Deployed(DeploymentResult),
    /// A previously recorded instance was kept.
    Reused { contract: String, address: Address },
}

impl ContractOutcome {
    pub fn contract(&self) -> &str {
        match self {
            Self::Deployed(result) => &result.contract,
            Self::Reused { contract, .. } => contract,
        }
    }

    pub fn address(&self) -> Address {
        match self {
            Self::Deployed(result) => result.address,
            Self::Reused { address, .. } => *address,
        }
    }
}

/// Result of deploying a module to a network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDeployment {
    pub module: String,
    pub network: String,
    pub outcomes: Vec<ContractOutcome>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_modules() {
        let modules = ModuleRegistry::default();
        assert_eq!(
            modules.get("ProofOrchestratorModule").unwrap().contracts,
            vec!["ProofOrchestrator".to_string()]
        );
        assert_eq!(
            modules.get("SolivreKernelModule").unwrap().contracts,
            vec!["SolivreKernel".to_string()]
        );
    }

    #[test]
    fn test_unknown_module() {
        let err = ModuleRegistry::default().get("Nope").unwrap_err();
        assert!(matches!(err, DeployError::UnknownModule(ref name) if name == "Nope"));
    }

    #[test]
    fn test_modules_from_toml() {
        let modules: ModuleRegistry = toml::from_str(
            r#"
            [FullStack]
            contracts = ["SolivreKernel", "ProofOrchestrator"]
            "#,
        )
        .unwrap();
        assert_eq!(modules.names(), vec!["FullStack".to_string()]);
        assert_eq!(modules.get("FullStack").unwrap().contracts.len(), 2);
    }
}
