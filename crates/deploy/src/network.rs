//! Network registry: named endpoint definitions and their resolution.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    DeployError,
    secrets::{Secret, SecretProvider},
};

/// Default URL of a local development node.
pub const LOCALHOST_RPC_URL: &str = "http://127.0.0.1:8545";

/// How a network is reached.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
pub enum TransportKind {
    /// Plain JSON-RPC endpoint on the developer machine. No credential required.
    #[serde(rename = "local-http")]
    #[strum(to_string = "local-http")]
    LocalHttp,
    /// In-process simulated chain. No URL, no credential.
    #[serde(rename = "edr-simulated", alias = "simulated")]
    #[strum(to_string = "edr-simulated", serialize = "simulated")]
    Simulated,
    /// Remote JSON-RPC endpoint.
    #[serde(rename = "http", alias = "remote-http")]
    #[strum(to_string = "http", serialize = "remote-http")]
    RemoteHttp,
}

impl TransportKind {
    /// Whether networks of this kind must declare a URL.
    pub fn requires_url(&self) -> bool {
        matches!(self, Self::LocalHttp | Self::RemoteHttp)
    }
}

/// Chain type tag carried along with a network definition.
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ChainType {
    #[default]
    L1,
    Op,
    Generic,
}

/// Where a network's endpoint URL comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UrlSource {
    /// A URL written in the configuration.
    Literal(String),
    /// A URL read from a secret at resolution time.
    Secret { var: String },
}

impl UrlSource {
    /// Display form of the source, safe to print. Secret URLs show their variable name.
    pub fn label(&self) -> String {
        match self {
            Self::Literal(raw) => match Url::parse(raw) {
                Ok(url) => endpoint_label(&url),
                Err(_) => "<invalid url>".to_string(),
            },
            Self::Secret { var } => format!("${var}"),
        }
    }
}

/// `scheme://host[:port]` of an endpoint URL, safe to log.
///
/// Credentials, paths and query strings are dropped since providers embed API keys there.
pub fn endpoint_label(url: &Url) -> String {
    let host = url.host_str().unwrap_or("?");
    match url.port() {
        Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
        None => format!("{}://{}", url.scheme(), host),
    }
}

/// Reference to a credential (a hex private key) held by a secret provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CredentialRef {
    /// Shorthand for a required credential.
    Var(String),
    Spec {
        var: String,
        #[serde(default = "default_required")]
        required: bool,
    },
}

fn default_required() -> bool {
    true
}

impl CredentialRef {
    pub fn required(var: impl Into<String>) -> Self {
        Self::Var(var.into())
    }

    pub fn optional(var: impl Into<String>) -> Self {
        Self::Spec {
            var: var.into(),
            required: false,
        }
    }

    pub fn var(&self) -> &str {
        match self {
            Self::Var(var) | Self::Spec { var, .. } => var,
        }
    }

    pub fn is_required(&self) -> bool {
        match self {
            Self::Var(_) => true,
            Self::Spec { required, .. } => *required,
        }
    }
}

/// A network as declared in configuration, before secrets are resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkDefinition {
    #[serde(rename = "type")]
    pub transport: TransportKind,
    #[serde(default)]
    pub chain_type: ChainType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<UrlSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub accounts: Vec<CredentialRef>,
}

impl NetworkDefinition {
    pub fn local_http(url: impl Into<String>) -> Self {
        Self {
            transport: TransportKind::LocalHttp,
            chain_type: ChainType::L1,
            url: Some(UrlSource::Literal(url.into())),
            chain_id: None,
            accounts: Vec::new(),
        }
    }

    pub fn simulated(chain_type: ChainType) -> Self {
        Self {
            transport: TransportKind::Simulated,
            chain_type,
            url: None,
            chain_id: None,
            accounts: Vec::new(),
        }
    }

    pub fn remote_http(url: UrlSource) -> Self {
        Self {
            transport: TransportKind::RemoteHttp,
            chain_type: ChainType::L1,
            url: Some(url),
            chain_id: None,
            accounts: Vec::new(),
        }
    }

    pub fn chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = Some(chain_id);
        self
    }

    pub fn account(mut self, credential: CredentialRef) -> Self {
        self.accounts.push(credential);
        self
    }

    /// Check the static shape of the definition.
    fn validate(&self, name: &str) -> Result<(), DeployError> {
        let invalid = |reason: &str| DeployError::InvalidNetwork {
            network: name.to_string(),
            reason: reason.to_string(),
        };

        match (&self.url, self.transport.requires_url()) {
            (None, true) => return Err(invalid("http networks must declare a url")),
            (Some(_), false) => return Err(invalid("simulated networks cannot declare a url")),
            (Some(UrlSource::Literal(url)), true) => {
                parse_http_url(url).map_err(|reason| invalid(&reason))?;
            }
            (Some(UrlSource::Secret { var }), true) if var.trim().is_empty() => {
                return Err(invalid("url secret name is empty"));
            }
            _ => {}
        }

        if self.accounts.iter().any(|c| c.var().trim().is_empty()) {
            return Err(invalid("credential secret name is empty"));
        }

        Ok(())
    }
}

fn parse_http_url(raw: &str) -> Result<Url, String> {
    let url = Url::parse(raw).map_err(|e| format!("invalid url: {e}"))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(format!("unsupported url scheme '{other}'")),
    }
}

/// A network with its URL and credentials resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    pub name: String,
    pub transport: TransportKind,
    pub chain_type: ChainType,
    pub url: Option<Url>,
    pub chain_id: Option<u64>,
    pub credentials: Vec<Secret>,
}

impl NetworkConfig {
    /// See [`endpoint_label`]. Simulated networks are labelled `in-process`.
    pub fn endpoint_label(&self) -> String {
        self.url
            .as_ref()
            .map_or_else(|| "in-process".to_string(), endpoint_label)
    }

    /// The credential used to sign deployments, if any.
    pub fn signer_credential(&self) -> Option<&Secret> {
        self.credentials.first()
    }
}

/// Registry of named networks.
///
/// Holds definitions only. Secrets are looked up on every [`resolve`](Self::resolve)
/// call and never stored here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkRegistry {
    networks: BTreeMap<String, NetworkDefinition>,
}

impl Default for NetworkRegistry {
    /// The project's standard networks.
    fn default() -> Self {
        let networks = BTreeMap::from([
            (
                "localhost".to_string(),
                NetworkDefinition::local_http(LOCALHOST_RPC_URL),
            ),
            (
                "hardhatMainnet".to_string(),
                NetworkDefinition::simulated(ChainType::L1),
            ),
            (
                "hardhatOp".to_string(),
                NetworkDefinition::simulated(ChainType::Op),
            ),
            (
                "coti".to_string(),
                NetworkDefinition::remote_http(UrlSource::Literal(
                    "https://rpc.coti.io".to_string(),
                ))
                .chain_id(30371)
                .account(CredentialRef::optional("COTI_PRIVATE_KEY")),
            ),
            (
                "sepolia".to_string(),
                NetworkDefinition::remote_http(UrlSource::Secret {
                    var: "SEPOLIA_RPC_URL".to_string(),
                })
                .account(CredentialRef::required("SEPOLIA_PRIVATE_KEY")),
            ),
        ]);

        Self { networks }
    }
}

impl NetworkRegistry {
    /// An empty registry.
    pub fn empty() -> Self {
        Self {
            networks: BTreeMap::new(),
        }
    }

    /// Register or replace a network.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        definition: NetworkDefinition,
    ) -> Result<(), DeployError> {
        let name = name.into();
        definition.validate(&name)?;
        self.networks.insert(name, definition);
        Ok(())
    }

    /// Register or replace a network, returning the registry.
    pub fn with_network(
        mut self,
        name: impl Into<String>,
        definition: NetworkDefinition,
    ) -> Result<Self, DeployError> {
        self.insert(name, definition)?;
        Ok(self)
    }

    /// Overlay `other` on top of this registry. Entries of `other` win.
    pub fn merge(&mut self, other: NetworkRegistry) -> Result<(), DeployError> {
        for (name, definition) in other.networks {
            self.insert(name, definition)?;
        }
        Ok(())
    }

    /// Validate every registered definition.
    pub fn validate(&self) -> Result<(), DeployError> {
        self.networks
            .iter()
            .try_for_each(|(name, definition)| definition.validate(name))
    }

    pub fn get(&self, name: &str) -> Option<&NetworkDefinition> {
        self.networks.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.networks.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.networks.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &NetworkDefinition)> {
        self.networks.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Resolve a network name into connection parameters.
    ///
    /// Secret-backed URLs and credentials are read from `secrets` on every call.
    pub fn resolve(
        &self,
        name: &str,
        secrets: &dyn SecretProvider,
    ) -> Result<NetworkConfig, DeployError> {
        let definition = self
            .networks
            .get(name)
            .ok_or_else(|| DeployError::UnknownNetwork {
                name: name.to_string(),
                registered: self.names(),
            })?;

        let url = match &definition.url {
            None => None,
            Some(UrlSource::Literal(raw)) => Some(parse_http_url(raw).map_err(|reason| {
                DeployError::InvalidNetwork {
                    network: name.to_string(),
                    reason,
                }
            })?),
            Some(UrlSource::Secret { var }) => {
                let raw =
                    secrets
                        .resolve_secret(var)
                        .ok_or_else(|| DeployError::MissingCredential {
                            network: name.to_string(),
                            secret: var.clone(),
                        })?;
                // The parse error is kept, the value is not: it may embed an API key.
                Some(
                    parse_http_url(&raw).map_err(|reason| DeployError::InvalidNetwork {
                        network: name.to_string(),
                        reason: format!("secret '{var}' does not hold a usable url ({reason})"),
                    })?,
                )
            }
        };

        let mut credentials = Vec::with_capacity(definition.accounts.len());
        for credential in &definition.accounts {
            match secrets.resolve_secret(credential.var()) {
                Some(value) => credentials.push(Secret::new(value)),
                None if credential.is_required() => {
                    return Err(DeployError::MissingCredential {
                        network: name.to_string(),
                        secret: credential.var().to_string(),
                    });
                }
                None => {
                    tracing::debug!(
                        network = %name,
                        secret = %credential.var(),
                        "Optional credential not set, continuing without it"
                    );
                }
            }
        }

        let config = NetworkConfig {
            name: name.to_string(),
            transport: definition.transport,
            chain_type: definition.chain_type,
            url,
            chain_id: definition.chain_id,
            credentials,
        };

        tracing::debug!(
            network = %name,
            transport = %config.transport,
            chain_type = %config.chain_type,
            endpoint = %config.endpoint_label(),
            credentials = config.credentials.len(),
            "Network resolved"
        );

        Ok(config)
    }
}
