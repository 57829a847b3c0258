//! In-process simulated chain.
//!
//! Every accepted transaction is mined into its own block at once. Creation
//! code is not executed: the initcode is recorded at the derived contract
//! address, which is enough to exercise the deployment lifecycle without a
//! node.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use alloy_core::primitives::{Address, Bytes, TxHash, U64};
use anyhow::Context;

use super::{DeployRequest, DeployTransport, Submission, TxReceipt};
use crate::{
    network::ChainType,
    tx::{LegacyTx, LocalSigner, SignedTx},
};

/// Chain id of simulated networks that do not declare one.
pub const SIMULATED_CHAIN_ID: u64 = 31337;

/// Private key of the well-known development account 0.
pub const DEV_PRIVATE_KEY: &str =
    "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

/// Maximum initcode size (EIP-3860).
pub const MAX_INITCODE_SIZE: usize = 49_152;

const SIMULATED_GAS_PRICE: u128 = 1_000_000_000;
const TX_BASE_GAS: u64 = 21_000;
const CREATE_GAS: u64 = 32_000;

/// Intrinsic gas of a creation transaction carrying `initcode`.
fn intrinsic_gas(initcode: &[u8]) -> u64 {
    let zero_bytes = initcode.iter().filter(|b| **b == 0).count() as u64;
    let non_zero_bytes = initcode.len() as u64 - zero_bytes;
    let words = (initcode.len() as u64).div_ceil(32);
    TX_BASE_GAS + CREATE_GAS + zero_bytes * 4 + non_zero_bytes * 16 + words * 2
}

#[derive(Debug, Default)]
struct ChainState {
    block_number: u64,
    nonces: HashMap<Address, u64>,
    code: HashMap<Address, Bytes>,
    receipts: HashMap<TxHash, TxReceipt>,
}

/// State of one simulated network.
#[derive(Debug)]
pub struct SimulatedChain {
    chain_id: u64,
    chain_type: ChainType,
    state: Mutex<ChainState>,
}

impl SimulatedChain {
    pub fn new(chain_id: u64, chain_type: ChainType) -> Self {
        Self {
            chain_id,
            chain_type,
            state: Mutex::new(ChainState::default()),
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn chain_type(&self) -> ChainType {
        self.chain_type
    }

    fn state(&self) -> std::sync::MutexGuard<'_, ChainState> {
        // State is only mutated after every check passed, so a poisoned lock still holds consistent data.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The next nonce of `account`.
    pub fn nonce(&self, account: Address) -> u64 {
        self.state().nonces.get(&account).copied().unwrap_or_default()
    }

    pub fn block_number(&self) -> u64 {
        self.state().block_number
    }

    /// The initcode recorded at `address`, if a contract was created there.
    pub fn code_at(&self, address: Address) -> Option<Bytes> {
        self.state().code.get(&address).cloned()
    }

    pub fn receipt(&self, tx_hash: &TxHash) -> Option<TxReceipt> {
        self.state().receipts.get(tx_hash).cloned()
    }

    /// Validate and mine a signed creation transaction.
    pub fn apply(&self, tx: &LegacyTx, signed: &SignedTx) -> Result<TxReceipt, anyhow::Error> {
        if tx.to.is_some() {
            anyhow::bail!("simulated chain only accepts contract creation transactions");
        }
        if tx.chain_id != self.chain_id {
            anyhow::bail!(
                "invalid chain id: transaction signed for {}, chain is {}",
                tx.chain_id,
                self.chain_id
            );
        }
        if tx.input.is_empty() {
            anyhow::bail!("contract creation with empty initcode");
        }
        if tx.input.len() > MAX_INITCODE_SIZE {
            anyhow::bail!(
                "max initcode size exceeded: {} > {}",
                tx.input.len(),
                MAX_INITCODE_SIZE
            );
        }
        let gas_used = intrinsic_gas(&tx.input);
        if tx.gas_limit < gas_used {
            anyhow::bail!("intrinsic gas too low: have {}, want {}", tx.gas_limit, gas_used);
        }

        let mut state = self.state();

        let expected_nonce = state.nonces.get(&signed.from).copied().unwrap_or_default();
        if tx.nonce != expected_nonce {
            anyhow::bail!(
                "nonce mismatch for {}: transaction has {}, account is at {}",
                signed.from,
                tx.nonce,
                expected_nonce
            );
        }
        if state.receipts.contains_key(&signed.hash) {
            anyhow::bail!("already known: {}", signed.hash);
        }

        let contract_address = signed.from.create(tx.nonce);
        state.block_number += 1;
        state.nonces.insert(signed.from, expected_nonce + 1);
        state.code.insert(contract_address, tx.input.clone());

        let receipt = TxReceipt {
            transaction_hash: signed.hash,
            block_number: Some(U64::from(state.block_number)),
            from: Some(signed.from),
            contract_address: Some(contract_address),
            status: Some(U64::from(1)),
            gas_used: Some(U64::from(gas_used)),
        };
        state.receipts.insert(signed.hash, receipt.clone());

        Ok(receipt)
    }
}

/// Simulated chains of one process, created on first use and keyed by network name.
#[derive(Debug, Default)]
pub struct SimulatedChains {
    chains: Mutex<HashMap<String, Arc<SimulatedChain>>>,
}

impl SimulatedChains {
    pub fn new() -> Self {
        Self::default()
    }

    /// The chain backing `network`, created on first use.
    pub fn get_or_create(
        &self,
        network: &str,
        chain_id: u64,
        chain_type: ChainType,
    ) -> Arc<SimulatedChain> {
        let mut chains = self
            .chains
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        chains
            .entry(network.to_string())
            .or_insert_with(|| {
                tracing::debug!(network = %network, chain_id, chain_type = %chain_type, "Starting simulated chain");
                Arc::new(SimulatedChain::new(chain_id, chain_type))
            })
            .clone()
    }

    pub fn get(&self, network: &str) -> Option<Arc<SimulatedChain>> {
        self.chains
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(network)
            .cloned()
    }
}

/// A simulated chain bound to a signing account.
#[derive(Debug)]
pub struct SimulatedTransport {
    chain: Arc<SimulatedChain>,
    signer: LocalSigner,
}

impl SimulatedTransport {
    /// Bind `chain` to `signer`, or to the development account when `None`.
    pub fn new(chain: Arc<SimulatedChain>, signer: Option<LocalSigner>) -> Result<Self, anyhow::Error> {
        let signer = match signer {
            Some(signer) => signer,
            None => LocalSigner::from_private_key(DEV_PRIVATE_KEY)
                .context("Failed to load development account")?,
        };
        Ok(Self { chain, signer })
    }

    pub fn chain(&self) -> &Arc<SimulatedChain> {
        &self.chain
    }

    pub fn sender(&self) -> Address {
        self.signer.address()
    }
}

impl DeployTransport for SimulatedTransport {
    async fn chain_id(&self) -> Result<u64, anyhow::Error> {
        Ok(self.chain.chain_id())
    }

    async fn submit(&self, request: &DeployRequest) -> Result<Submission, anyhow::Error> {
        let from = self.signer.address();
        let tx = LegacyTx::create(
            request.chain_id,
            self.chain.nonce(from),
            SIMULATED_GAS_PRICE,
            intrinsic_gas(&request.initcode),
            request.initcode.clone(),
        );
        let signed = self.signer.sign(&tx)?;
        self.chain.apply(&tx, &signed)?;

        Ok(Submission {
            tx_hash: signed.hash,
            from,
        })
    }

    async fn receipt(&self, tx_hash: TxHash) -> Result<Option<TxReceipt>, anyhow::Error> {
        Ok(self.chain.receipt(&tx_hash))
    }
}

#[cfg(test)]
mod tests {
    use alloy_core::primitives::address;

    use super::*;

    fn transport() -> SimulatedTransport {
        let chain = Arc::new(SimulatedChain::new(SIMULATED_CHAIN_ID, ChainType::L1));
        SimulatedTransport::new(chain, None).unwrap()
    }

    fn request(initcode: &[u8]) -> DeployRequest {
        DeployRequest {
            chain_id: SIMULATED_CHAIN_ID,
            initcode: Bytes::copy_from_slice(initcode),
        }
    }

    #[test]
    fn test_dev_account_address() {
        assert_eq!(
            transport().sender(),
            address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266")
        );
    }

    #[tokio::test]
    async fn test_creation_is_mined_immediately() {
        let transport = transport();
        let submission = transport.submit(&request(&[0x60, 0x80])).await.unwrap();
        let receipt = transport.receipt(submission.tx_hash).await.unwrap().unwrap();

        assert!(receipt.succeeded());
        assert_eq!(receipt.block_number(), Some(1));
        // First deployment of the dev account, nonce 0.
        assert_eq!(
            receipt.contract_address,
            Some(address!("5FbDB2315678afecb367f032d93F642f64180aa3"))
        );
        assert_eq!(transport.chain().nonce(submission.from), 1);
    }

    #[tokio::test]
    async fn test_sequential_deployments_get_distinct_addresses() {
        let transport = transport();
        let first = transport.submit(&request(&[0x01])).await.unwrap();
        let second = transport.submit(&request(&[0x01])).await.unwrap();
        assert_ne!(first.tx_hash, second.tx_hash);

        let a = transport.receipt(first.tx_hash).await.unwrap().unwrap();
        let b = transport.receipt(second.tx_hash).await.unwrap().unwrap();
        assert_ne!(a.contract_address, b.contract_address);
    }

    #[tokio::test]
    async fn test_empty_initcode_is_rejected() {
        let transport = transport();
        let err = transport.submit(&request(&[])).await.unwrap_err();
        assert!(err.to_string().contains("empty initcode"));
        assert_eq!(transport.chain().block_number(), 0);
    }

    #[tokio::test]
    async fn test_oversized_initcode_is_rejected() {
        let transport = transport();
        let err = transport
            .submit(&request(&vec![0x60; MAX_INITCODE_SIZE + 1]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("max initcode size"));
    }

    #[tokio::test]
    async fn test_wrong_chain_id_is_rejected() {
        let transport = transport();
        let mut req = request(&[0x01]);
        req.chain_id = 1;
        assert!(transport.submit(&req).await.is_err());
    }

    #[test]
    fn test_chains_are_shared_per_network() {
        let chains = SimulatedChains::new();
        let a = chains.get_or_create("hardhatMainnet", SIMULATED_CHAIN_ID, ChainType::L1);
        let b = chains.get_or_create("hardhatMainnet", SIMULATED_CHAIN_ID, ChainType::L1);
        let c = chains.get_or_create("hardhatOp", SIMULATED_CHAIN_ID, ChainType::Op);

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(c.chain_type(), ChainType::Op);
        assert!(chains.get("unknown").is_none());
    }

    #[test]
    fn test_intrinsic_gas() {
        assert_eq!(intrinsic_gas(&[]), 53_000);
        // one non-zero byte, one zero byte, one word
        assert_eq!(intrinsic_gas(&[0x01, 0x00]), 53_000 + 16 + 4 + 2);
    }
}
