//! JSON-RPC transport for local and remote nodes.

use std::{fmt, time::Duration};

use alloy_core::primitives::{Address, TxHash, U64, U128};
use anyhow::Context;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use url::Url;

use super::{DeployRequest, DeployTransport, Submission, TxReceipt};
use crate::{rpc, tx::LegacyTx, tx::LocalSigner};

/// Talks to a node over HTTP JSON-RPC.
///
/// With a signer, transactions are signed locally and sent with
/// `eth_sendRawTransaction`. Without one, the node's first unlocked account
/// sends them through `eth_sendTransaction`.
pub struct HttpTransport {
    client: reqwest::Client,
    url: Url,
    signer: Option<LocalSigner>,
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("host", &self.url.host_str())
            .field("signer", &self.signer.as_ref().map(LocalSigner::address))
            .finish()
    }
}

impl HttpTransport {
    pub fn new(
        url: Url,
        signer: Option<LocalSigner>,
        request_timeout: Duration,
    ) -> Result<Self, anyhow::Error> {
        Ok(Self {
            client: rpc::create_client(request_timeout)?,
            url,
            signer,
        })
    }

    /// The locally held signing address, if any.
    pub fn signer_address(&self) -> Option<Address> {
        self.signer.as_ref().map(LocalSigner::address)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, anyhow::Error> {
        rpc::json_rpc_call(&self.client, self.url.as_str(), method, params).await
    }

    async fn submit_signed(
        &self,
        signer: &LocalSigner,
        request: &DeployRequest,
    ) -> Result<Submission, anyhow::Error> {
        let from = signer.address();

        let nonce: U64 = self
            .call("eth_getTransactionCount", vec![json!(from), json!("pending")])
            .await
            .context("Failed to fetch account nonce")?;
        let gas_price: U128 = self
            .call("eth_gasPrice", vec![])
            .await
            .context("Failed to fetch gas price")?;
        let gas_limit: U64 = self
            .call(
                "eth_estimateGas",
                vec![json!({ "from": from, "data": request.initcode })],
            )
            .await
            .context("Failed to estimate deployment gas")?;

        let tx = LegacyTx::create(
            request.chain_id,
            nonce.to::<u64>(),
            gas_price.to::<u128>(),
            gas_limit.to::<u64>(),
            request.initcode.clone(),
        );
        let signed = signer.sign(&tx)?;

        tracing::debug!(
            from = %from,
            nonce = tx.nonce,
            gas_limit = tx.gas_limit,
            gas_price = tx.gas_price,
            tx_hash = %signed.hash,
            "Sending signed deployment transaction"
        );

        let tx_hash: TxHash = self
            .call("eth_sendRawTransaction", vec![json!(signed.raw)])
            .await
            .context("Node rejected the signed deployment transaction")?;

        if tx_hash != signed.hash {
            tracing::warn!(
                expected = %signed.hash,
                reported = %tx_hash,
                "Node reported a different transaction hash than the locally computed one"
            );
        }

        Ok(Submission { tx_hash, from })
    }

    async fn submit_unlocked(&self, request: &DeployRequest) -> Result<Submission, anyhow::Error> {
        let accounts: Vec<Address> = self
            .call("eth_accounts", vec![])
            .await
            .context("Failed to list node accounts")?;
        let from = accounts.first().copied().context(
            "No credential configured and the node exposes no unlocked account to deploy from",
        )?;

        tracing::debug!(from = %from, "Sending deployment through unlocked node account");

        let tx_hash: TxHash = self
            .call(
                "eth_sendTransaction",
                vec![json!({ "from": from, "data": request.initcode })],
            )
            .await
            .context("Node rejected the deployment transaction")?;

        Ok(Submission { tx_hash, from })
    }
}

impl DeployTransport for HttpTransport {
    async fn chain_id(&self) -> Result<u64, anyhow::Error> {
        let chain_id: U64 = self
            .call("eth_chainId", vec![])
            .await
            .context("Failed to fetch chain id")?;
        Ok(chain_id.to::<u64>())
    }

    async fn submit(&self, request: &DeployRequest) -> Result<Submission, anyhow::Error> {
        match &self.signer {
            Some(signer) => self.submit_signed(signer, request).await,
            None => self.submit_unlocked(request).await,
        }
    }

    async fn receipt(&self, tx_hash: TxHash) -> Result<Option<TxReceipt>, anyhow::Error> {
        self.call("eth_getTransactionReceipt", vec![json!(tx_hash)])
            .await
            .context("Failed to fetch transaction receipt")
    }
}
