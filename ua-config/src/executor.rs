use std::{
    collections::BTreeMap,
    future::Future,
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration,
};

use alloy::{
    network::{EthereumWallet, TransactionBuilder},
    primitives::{Address, Bytes, B256},
    providers::Provider,
    rpc::types::TransactionRequest,
};
use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use crate::{
    cache::ConnectionCache,
    chain::HttpConnector,
    change::PendingChange,
    error::{Error, Result},
    network::NetworkRegistry,
};

/// Signer derivation index used for submissions.
pub const SUBMITTER_INDEX: u32 = 0;

/// Outcome of handing one change to an executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Execution {
    /// Mined with a successful receipt.
    #[serde(rename_all = "camelCase")]
    Confirmed {
        tx_hash: B256,
        block_number: Option<u64>,
    },
    /// Queued for a multi-signature wallet instead of being sent.
    #[serde(rename_all = "camelCase")]
    Proposed { safe: Address, position: usize },
}

/// Applies approved changes. The engine never knows which one is active.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, network: &str, change: &PendingChange) -> Result<Execution>;

    /// Called once after every change has been handed over.
    async fn finish(&self) -> Result<()> {
        Ok(())
    }
}

/// Submission price: 25% above the node's quote, rounded down.
///
/// `p + p / 4` is `floor(p * 10 / 8)` without the intermediate overflow.
pub fn premium_gas_price(gas_price: u128) -> u128 {
    gas_price.saturating_add(gas_price / 4)
}

/// The unsigned legacy transaction submitted for `change`.
pub fn submission_request(
    change: &PendingChange,
    from: Address,
    nonce: u64,
    chain_id: u64,
    quoted_gas_price: u128,
    gas_limit: u64,
) -> TransactionRequest {
    TransactionRequest::default()
        .with_from(from)
        .with_to(change.contract_address)
        .with_input(change.calldata.clone())
        .with_nonce(nonce)
        .with_chain_id(chain_id)
        .with_gas_price(premium_gas_price(quoted_gas_price))
        .with_gas_limit(gas_limit)
}

/// Waits for `receipt` for at most `timeout`.
pub async fn await_confirmation<T, E, F>(
    network: &str,
    tx_hash: B256,
    timeout: Duration,
    receipt: F,
) -> Result<T>
where
    F: Future<Output = std::result::Result<T, E>>,
    E: std::fmt::Display,
{
    tokio::time::timeout(timeout, receipt)
        .await
        .map_err(|_| Error::ConfirmationTimeout {
            network: network.to_owned(),
            tx_hash: tx_hash.to_string(),
            timeout,
        })?
        .map_err(|e| Error::submission(network, e))
}

/// A mined transaction only counts once its receipt reports success.
pub fn settle(
    network: &str,
    tx_hash: B256,
    block_number: Option<u64>,
    status: bool,
) -> Result<Execution> {
    if !status {
        return Err(Error::Reverted {
            network: network.to_owned(),
            tx_hash: tx_hash.to_string(),
        });
    }
    Ok(Execution::Confirmed {
        tx_hash,
        block_number,
    })
}

/// Signs with the network's submitter key and waits for one confirmation.
pub struct DirectExecutor {
    cache: Arc<ConnectionCache<HttpConnector>>,
    gas_limit: u64,
    confirmation_timeout: Duration,
}

impl DirectExecutor {
    pub fn new(
        cache: Arc<ConnectionCache<HttpConnector>>,
        gas_limit: u64,
        confirmation_timeout: Duration,
    ) -> Self {
        Self {
            cache,
            gas_limit,
            confirmation_timeout,
        }
    }
}

#[async_trait]
impl Executor for DirectExecutor {
    async fn execute(&self, network: &str, change: &PendingChange) -> Result<Execution> {
        let provider = self.cache.provider(network).await?;
        let signer = self.cache.signer(network, SUBMITTER_INDEX).await?;
        let from = signer.address();

        let quoted = provider
            .get_gas_price()
            .await
            .map_err(|e| Error::submission(network, e))?;
        let nonce = provider
            .get_transaction_count(from)
            .await
            .map_err(|e| Error::submission(network, e))?;
        let chain_id = provider
            .get_chain_id()
            .await
            .map_err(|e| Error::submission(network, e))?;

        let tx = submission_request(change, from, nonce, chain_id, quoted, self.gas_limit);
        let wallet = EthereumWallet::from(signer.as_ref().clone());
        let envelope = tx
            .build(&wallet)
            .await
            .map_err(|e| Error::submission(network, e))?;
        let pending = provider
            .send_tx_envelope(envelope)
            .await
            .map_err(|e| Error::submission(network, e))?;
        let tx_hash = *pending.tx_hash();
        info!(network, method = %change.method_name, %tx_hash, "submitted");

        let receipt = await_confirmation(
            network,
            tx_hash,
            self.confirmation_timeout,
            pending.with_required_confirmations(1).get_receipt(),
        )
        .await?;

        let status = receipt.status();
        debug!(network, %tx_hash, block = ?receipt.block_number, status, "mined");
        settle(network, tx_hash, receipt.block_number, status)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SafeTransaction {
    pub to: Address,
    pub value: String,
    pub data: Bytes,
}

/// Transactions proposed to one network's Safe. This is a plain list for
/// owners to review and queue; it is not a Transaction Builder import file.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SafeProposal<'a> {
    network: &'a str,
    safe: Address,
    transactions: &'a [SafeTransaction],
}

/// Collects changes into one proposal list per network for a multi-signature
/// wallet and writes them out in [`Executor::finish`].
pub struct SafeBatchExecutor {
    registry: Arc<NetworkRegistry>,
    output_dir: PathBuf,
    batches: Mutex<BTreeMap<String, (Address, Vec<SafeTransaction>)>>,
}

impl SafeBatchExecutor {
    pub fn new(registry: Arc<NetworkRegistry>, output_dir: PathBuf) -> Self {
        Self {
            registry,
            output_dir,
            batches: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn proposal_path(&self, network: &str) -> PathBuf {
        self.output_dir.join(format!("{network}-safe-proposal.json"))
    }
}

#[async_trait]
impl Executor for SafeBatchExecutor {
    async fn execute(&self, network: &str, change: &PendingChange) -> Result<Execution> {
        let safe = self.registry.resolve_safe_address(network)?;
        let mut batches = self.batches.lock().unwrap_or_else(|e| e.into_inner());
        let (_, transactions) = batches
            .entry(network.to_owned())
            .or_insert_with(|| (safe, Vec::new()));
        transactions.push(SafeTransaction {
            to: change.contract_address,
            value: "0".to_owned(),
            data: change.calldata.clone(),
        });
        Ok(Execution::Proposed {
            safe,
            position: transactions.len() - 1,
        })
    }

    async fn finish(&self) -> Result<()> {
        let batches = std::mem::take(&mut *self.batches.lock().unwrap_or_else(|e| e.into_inner()));
        if batches.is_empty() {
            return Ok(());
        }

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| Error::Config(format!("{}: {e}", self.output_dir.display())))?;
        for (network, (safe, transactions)) in &batches {
            let path = self.proposal_path(network);
            let proposal = SafeProposal {
                network,
                safe: *safe,
                transactions,
            };
            let json = serde_json::to_vec_pretty(&proposal)
                .map_err(|e| Error::Config(e.to_string()))?;
            tokio::fs::write(&path, json)
                .await
                .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
            let count = transactions.len();
            info!(network, path = %path.display(), count, "wrote safe proposal");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::{address, TxKind, U256};

    use super::*;
    use crate::{
        change::{Target, UaCall},
        network::NetworkDescriptor,
        params::ConfigParameter,
    };

    #[test]
    fn premium_is_ten_eighths_rounded_down() {
        assert_eq!(premium_gas_price(8), 10);
        assert_eq!(premium_gas_price(0), 0);
        assert_eq!(premium_gas_price(7), 8);
        assert_eq!(premium_gas_price(1_000_000_001), 1_250_000_001);

        for price in [1, 3, 15, 30_000_000_000, u128::MAX / 2, u128::MAX / 5 * 4] {
            let exact = U256::from(price) * U256::from(10) / U256::from(8);
            assert_eq!(premium_gas_price(price), exact.to::<u128>(), "{price}");
        }
        assert_eq!(premium_gas_price(u128::MAX), u128::MAX);
    }

    #[test]
    fn submission_carries_premium_and_gas_limit() {
        let change = change("a");
        let from = address!("f39fd6e51aad88f6f4ce6ab8827279cfffb92266");
        let tx = submission_request(&change, from, 7, 10121, 10_000, 8_000_000);

        assert_eq!(tx.gas_price, Some(12_500));
        assert_eq!(tx.gas, Some(8_000_000));
        assert_eq!(tx.nonce, Some(7));
        assert_eq!(tx.chain_id, Some(10121));
        assert_eq!(tx.from, Some(from));
        assert_eq!(tx.to, Some(TxKind::Call(change.contract_address)));
        assert_eq!(tx.input.input(), Some(&change.calldata));
    }

    #[tokio::test]
    async fn missing_receipt_times_out() {
        let timeout = Duration::from_millis(10);
        let never = std::future::pending::<std::result::Result<(), String>>();
        let err = await_confirmation("a", B256::ZERO, timeout, never)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::ConfirmationTimeout { network, timeout: t, .. } if network == "a" && t == timeout
        ));
    }

    #[tokio::test]
    async fn receipt_error_is_a_submission_error() {
        let dropped = std::future::ready(Err::<(), _>("backend gone"));
        let err = await_confirmation("a", B256::ZERO, Duration::from_secs(1), dropped)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Submission { message, .. } if message == "backend gone"));
    }

    #[test]
    fn reverted_receipt_is_not_applied() {
        let tx_hash = B256::repeat_byte(0x11);
        assert!(matches!(
            settle("a", tx_hash, Some(9), false),
            Err(Error::Reverted { network, .. }) if network == "a"
        ));
        assert_eq!(
            settle("a", tx_hash, Some(9), true).unwrap(),
            Execution::Confirmed {
                tx_hash,
                block_number: Some(9),
            }
        );
    }

    fn change(network: &str) -> PendingChange {
        PendingChange::compare(
            Target {
                network,
                remote_network: None,
                chain_id: 101,
                contract_address: address!("00000000000000000000000000000000000000a0"),
                contract_name: "ILayerZeroUserApplicationConfig",
            },
            ConfigParameter::SendVersion,
            UaCall::SetSendVersion(2),
            "1".to_owned(),
            "2".to_owned(),
        )
    }

    fn registry(safe: Option<Address>) -> Arc<NetworkRegistry> {
        let mut registry = NetworkRegistry::default();
        registry.insert(
            NetworkDescriptor {
                name: "a".to_owned(),
                chain_id: 101,
                rpc_url: "http://a.localhost:8545".parse().unwrap(),
            },
            None,
            None,
        );
        if let Some(safe) = safe {
            registry.set_safe("a", safe);
        }
        Arc::new(registry)
    }

    #[tokio::test]
    async fn safe_proposal_collects_and_writes() {
        let safe = address!("00000000000000000000000000000000000005af");
        let dir = std::env::temp_dir().join(format!("ua-config-safe-{}", std::process::id()));
        let executor = SafeBatchExecutor::new(registry(Some(safe)), dir.clone());

        let first = executor.execute("a", &change("a")).await.unwrap();
        let second = executor.execute("a", &change("a")).await.unwrap();
        assert_eq!(first, Execution::Proposed { safe, position: 0 });
        assert_eq!(second, Execution::Proposed { safe, position: 1 });

        executor.finish().await.unwrap();
        let written: serde_json::Value =
            serde_json::from_slice(&std::fs::read(executor.proposal_path("a")).unwrap()).unwrap();
        assert!(executor.proposal_path("a").ends_with("a-safe-proposal.json"));
        assert_eq!(written["network"], "a");
        assert_eq!(written["safe"], serde_json::json!(safe));
        assert_eq!(written["transactions"].as_array().unwrap().len(), 2);
        assert_eq!(written["transactions"][0]["value"], "0");
        assert_eq!(
            written["transactions"][0]["data"],
            serde_json::json!(change("a").calldata)
        );
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn safe_proposal_requires_a_safe() {
        let executor = SafeBatchExecutor::new(registry(None), std::env::temp_dir());
        let err = executor.execute("a", &change("a")).await.unwrap_err();
        assert!(matches!(err, Error::UnresolvedAddress { .. }));
    }
}
