//! Resource factory backed by an Ethereum JSON-RPC endpoint.
//!
//! Transactions are sent with `eth_sendTransaction` from accounts the node holds
//! unlocked (Hardhat and Anvil development nodes), so no key material passes
//! through this process. The pre-signed ERC-1820 registry deployment is the one
//! transaction submitted raw.

use std::time::Duration;

use alloy_core::primitives::{Address, B256, Bytes};
use anyhow::{Context, Result};
use backon::{ConstantBuilder, Retryable};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use url::Url;

use super::{
    CallOutput, ERC1820_DEPLOYER, ERC1820_DEPLOYMENT_COST, ERC1820_REGISTRY, ResourceFactory,
    ResourceHandle, abi, artifacts::ArtifactStore,
};
use crate::plan::{ArgValue, Operation, ResourceKind};

/// Timeout for a single RPC request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// How to wait for transactions to be mined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptPolicy {
    /// Delay between two `eth_getTransactionReceipt` polls.
    pub poll_interval_ms: u64,
    /// Polls before giving up on a transaction. At least one poll is made.
    pub max_attempts: usize,
}

impl Default for ReceiptPolicy {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            max_attempts: 120,
        }
    }
}

/// Fields of a transaction receipt the factory inspects.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionReceipt {
    transaction_hash: B256,
    status: Option<String>,
    contract_address: Option<Address>,
}

impl TransactionReceipt {
    fn succeeded(&self) -> bool {
        self.status.as_deref() == Some("0x1")
    }
}

/// Outcome of a single receipt poll that did not produce a receipt.
enum ReceiptPoll {
    Pending,
    Failed(anyhow::Error),
}

/// Ledger access over JSON-RPC.
#[derive(Debug, Clone)]
pub struct RpcFactory {
    client: reqwest::Client,
    url: Url,
    artifacts: ArtifactStore,
    receipts: ReceiptPolicy,
}

impl RpcFactory {
    pub fn new(url: Url, artifacts: ArtifactStore, receipts: ReceiptPolicy) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            url,
            artifacts,
            receipts,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Make a JSON-RPC call and deserialize the result.
    async fn request<T: DeserializeOwned>(&self, method: &str, params: Vec<Value>) -> Result<T> {
        let response = self
            .client
            .post(self.url.clone())
            .json(&serde_json::json!({
                "jsonrpc": "2.0",
                "method": method,
                "params": params,
                "id": 1
            }))
            .send()
            .await
            .with_context(|| format!("Failed to send {} request", method))?;

        let result: Value = response
            .json()
            .await
            .with_context(|| format!("Failed to parse {} response", method))?;

        if let Some(error) = result.get("error") {
            anyhow::bail!(
                "RPC error: {}",
                error
                    .get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("unknown")
            );
        }

        let result_value = result
            .get("result")
            .context("No result in response")?
            .clone();

        serde_json::from_value(result_value)
            .with_context(|| format!("Failed to deserialize {} result", method))
    }

    /// Send a transaction and wait until it is mined successfully.
    async fn send_transaction(&self, tx: Value) -> Result<TransactionReceipt> {
        let tx_hash: B256 = self
            .request("eth_sendTransaction", vec![tx])
            .await
            .context("Failed to send transaction")?;

        tracing::debug!(%tx_hash, "Transaction sent, waiting for receipt");
        self.confirm(tx_hash).await
    }

    /// Wait for a sent transaction and require that it succeeded.
    async fn confirm(&self, tx_hash: B256) -> Result<TransactionReceipt> {
        let receipt = self.wait_for_receipt(tx_hash).await?;
        if !receipt.succeeded() {
            anyhow::bail!(
                "Transaction {} reverted (status {})",
                tx_hash,
                receipt.status.as_deref().unwrap_or("missing")
            );
        }

        Ok(receipt)
    }

    async fn poll_receipt(&self, tx_hash: B256) -> Result<TransactionReceipt, ReceiptPoll> {
        self.request::<Option<TransactionReceipt>>(
            "eth_getTransactionReceipt",
            vec![serde_json::json!(tx_hash)],
        )
        .await
        .map_err(ReceiptPoll::Failed)?
        .ok_or(ReceiptPoll::Pending)
    }

    async fn wait_for_receipt(&self, tx_hash: B256) -> Result<TransactionReceipt> {
        // The first poll is not a retry.
        let polls = self.receipts.max_attempts.max(1);
        let backoff = ConstantBuilder::default()
            .with_delay(Duration::from_millis(self.receipts.poll_interval_ms))
            .with_max_times(polls - 1);

        let polled = (|| self.poll_receipt(tx_hash))
            .retry(backoff)
            .when(|poll| matches!(poll, ReceiptPoll::Pending))
            .notify(|_, delay| {
                tracing::trace!(%tx_hash, ?delay, "Receipt not available yet, retrying...");
            })
            .await;

        match polled {
            Ok(receipt) => Ok(receipt),
            Err(ReceiptPoll::Pending) => anyhow::bail!(
                "Transaction {} not mined after {} polls",
                tx_hash,
                polls
            ),
            Err(ReceiptPoll::Failed(err)) => {
                Err(err.context(format!("Failed to fetch receipt for {}", tx_hash)))
            }
        }
    }
}

impl ResourceFactory for RpcFactory {
    async fn accounts(&self) -> Result<Vec<Address>> {
        self.request("eth_accounts", vec![])
            .await
            .context("Failed to list node accounts")
    }

    async fn create(
        &self,
        name: &str,
        kind: ResourceKind,
        from: Address,
        args: &[ArgValue],
    ) -> Result<ResourceHandle> {
        let bytecode = self.artifacts.bytecode(kind)?;
        let data = abi::encode_creation(&bytecode, args);

        let receipt = self
            .send_transaction(serde_json::json!({ "from": from, "data": data }))
            .await
            .with_context(|| format!("Failed to deploy {}", kind.contract_name()))?;

        let address = receipt
            .contract_address
            .context("Creation receipt has no contract address")?;

        tracing::debug!(
            name,
            %kind,
            %address,
            tx_hash = %receipt.transaction_hash,
            "Contract created"
        );

        Ok(ResourceHandle {
            name: name.to_string(),
            address,
            kind,
        })
    }

    async fn ensure_registry_singleton(&self, funder: Address) -> Result<bool> {
        let code: Bytes = self
            .request(
                "eth_getCode",
                vec![serde_json::json!(ERC1820_REGISTRY), serde_json::json!("latest")],
            )
            .await
            .context("Failed to read ERC1820 registry code")?;

        if !code.is_empty() {
            tracing::debug!(address = %ERC1820_REGISTRY, "ERC1820 registry already deployed");
            return Ok(false);
        }

        // Loaded before funding, so a missing file costs nothing.
        let deployment = self.artifacts.registry_deployment()?;

        self.send_transaction(serde_json::json!({
            "from": funder,
            "to": ERC1820_DEPLOYER,
            "value": ERC1820_DEPLOYMENT_COST,
        }))
        .await
        .context("Failed to fund the ERC1820 deployer")?;

        let tx_hash: B256 = self
            .request("eth_sendRawTransaction", vec![serde_json::json!(deployment)])
            .await
            .context("Failed to submit the ERC1820 deployment")?;
        self.confirm(tx_hash)
            .await
            .context("ERC1820 registry deployment failed")?;

        tracing::info!(address = %ERC1820_REGISTRY, %funder, "ERC1820 registry deployed");
        Ok(true)
    }

    async fn call(
        &self,
        target: &ResourceHandle,
        from: Address,
        operation: &Operation,
        args: &[ArgValue],
    ) -> Result<CallOutput> {
        let data = abi::encode_call(operation, args);
        let tx = serde_json::json!({ "from": from, "to": target.address, "data": data });

        if operation.is_view() {
            let output: Bytes = self
                .request("eth_call", vec![tx, serde_json::json!("latest")])
                .await
                .with_context(|| format!("Failed to read {} on {}", operation, target.name))?;
            return Ok(CallOutput::returned(output));
        }

        let receipt = self
            .send_transaction(tx)
            .await
            .with_context(|| format!("Failed to call {} on {}", operation, target.name))?;

        Ok(CallOutput::transaction(receipt.transaction_hash))
    }
}
