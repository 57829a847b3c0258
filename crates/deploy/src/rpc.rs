//! Shared RPC utilities for interacting with Ethereum JSON-RPC endpoints.

use std::{future::Future, time::Duration};

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Default timeout for RPC requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Number of consecutive failed polls tolerated before giving up.
const MAX_CONSECUTIVE_POLL_ERRORS: usize = 5;

/// Create an HTTP client configured for JSON-RPC requests.
pub fn create_client(timeout: Duration) -> Result<reqwest::Client, anyhow::Error> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to create HTTP client")
}

/// Make a JSON-RPC call and deserialize the result.
///
/// Transport errors are stripped of the request URL, since provider URLs
/// embed API keys.
///
/// # Arguments
/// * `client` - The HTTP client to use
/// * `url` - The RPC endpoint URL
/// * `method` - The RPC method name
/// * `params` - The method parameters
///
/// # Returns
/// The deserialized result, or an error if the request failed or returned an error response.
pub async fn json_rpc_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    method: &str,
    params: Vec<Value>,
) -> Result<T, anyhow::Error> {
    let response = client
        .post(url)
        .json(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        }))
        .send()
        .await
        .map_err(reqwest::Error::without_url)
        .with_context(|| format!("Failed to send {} request", method))?;

    let result: Value = response
        .json()
        .await
        .map_err(reqwest::Error::without_url)
        .with_context(|| format!("Failed to parse {} response", method))?;

    if let Some(error) = result.get("error") {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown");
        match error.get("code").and_then(|c| c.as_i64()) {
            Some(code) => anyhow::bail!("RPC error {} from {}: {}", code, method, message),
            None => anyhow::bail!("RPC error from {}: {}", method, message),
        }
    }

    let result_value = result
        .get("result")
        .context("No result in response")?
        .clone();

    serde_json::from_value(result_value)
        .with_context(|| format!("Failed to deserialize {} result", method))
}

/// Poll `check_fn` every `interval` until it yields a value.
///
/// `Ok(None)` means "not yet". Errors are tolerated while they stay sporadic;
/// a run of consecutive failures aborts with the last error. The loop has no
/// deadline of its own, callers bound it with [`tokio::time::timeout`].
pub async fn poll_until<T, F, Fut>(
    name: &str,
    interval: Duration,
    check_fn: F,
) -> Result<T, anyhow::Error>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<Option<T>, anyhow::Error>>,
{
    let mut consecutive_errors = 0;

    loop {
        match check_fn().await {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => {
                consecutive_errors = 0;
                tracing::trace!(target_name = %name, "Not ready yet, polling again...");
            }
            Err(e) => {
                consecutive_errors += 1;
                if consecutive_errors >= MAX_CONSECUTIVE_POLL_ERRORS {
                    return Err(e.context(format!(
                        "Giving up on {} after {} consecutive errors",
                        name, consecutive_errors
                    )));
                }
                tracing::debug!(error = %e, target_name = %name, "Poll failed, retrying...");
            }
        }

        tokio::time::sleep(interval).await;
    }
}
