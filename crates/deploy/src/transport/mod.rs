//! Transports that carry a contract-creation transaction to a network.
//!
//! Two transports exist:
//! - [`HttpTransport`]: a JSON-RPC node, local or remote.
//! - [`SimulatedTransport`]: an in-process chain that mines every transaction immediately.

mod http;
mod simulated;

use std::future::Future;

use alloy_core::primitives::{Address, Bytes, TxHash, U64};
use serde::{Deserialize, Serialize};

pub use http::HttpTransport;
pub use simulated::{
    DEV_PRIVATE_KEY, MAX_INITCODE_SIZE, SIMULATED_CHAIN_ID, SimulatedChain, SimulatedChains,
    SimulatedTransport,
};

/// A contract-creation request handed to a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployRequest {
    /// Chain id the transaction is signed for.
    pub chain_id: u64,
    /// Creation bytecode.
    pub initcode: Bytes,
}

/// What the network acknowledged on submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submission {
    pub tx_hash: TxHash,
    pub from: Address,
}

/// The subset of a transaction receipt the pipeline relies on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxReceipt {
    pub transaction_hash: TxHash,
    #[serde(default)]
    pub block_number: Option<U64>,
    #[serde(default)]
    pub from: Option<Address>,
    #[serde(default)]
    pub contract_address: Option<Address>,
    /// `0x1` on success, `0x0` on revert. Absent on pre-Byzantium chains.
    #[serde(default)]
    pub status: Option<U64>,
    #[serde(default)]
    pub gas_used: Option<U64>,
}

impl TxReceipt {
    pub fn succeeded(&self) -> bool {
        self.status.is_none_or(|status| status == U64::from(1))
    }

    pub fn block_number(&self) -> Option<u64> {
        self.block_number.map(|n| n.to::<u64>())
    }
}

/// Operations the orchestrator needs from a network.
///
/// Submission is never retried by implementations: a failed `submit` is
/// reported as is, because resending may create a second contract.
pub trait DeployTransport: Send + Sync {
    /// The chain id reported by the network.
    fn chain_id(&self) -> impl Future<Output = Result<u64, anyhow::Error>> + Send;

    /// Sign (when holding a key) and submit a creation transaction.
    fn submit(
        &self,
        request: &DeployRequest,
    ) -> impl Future<Output = Result<Submission, anyhow::Error>> + Send;

    /// The receipt of `tx_hash`, or `None` while it is pending.
    fn receipt(
        &self,
        tx_hash: TxHash,
    ) -> impl Future<Output = Result<Option<TxReceipt>, anyhow::Error>> + Send;
}

/// A transport bound to one resolved network.
#[derive(Debug)]
pub enum Transport {
    Http(HttpTransport),
    Simulated(SimulatedTransport),
}

impl DeployTransport for Transport {
    async fn chain_id(&self) -> Result<u64, anyhow::Error> {
        match self {
            Self::Http(transport) => transport.chain_id().await,
            Self::Simulated(transport) => transport.chain_id().await,
        }
    }

    async fn submit(&self, request: &DeployRequest) -> Result<Submission, anyhow::Error> {
        match self {
            Self::Http(transport) => transport.submit(request).await,
            Self::Simulated(transport) => transport.submit(request).await,
        }
    }

    async fn receipt(&self, tx_hash: TxHash) -> Result<Option<TxReceipt>, anyhow::Error> {
        match self {
            Self::Http(transport) => transport.receipt(tx_hash).await,
            Self::Simulated(transport) => transport.receipt(tx_hash).await,
        }
    }
}
