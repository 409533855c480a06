//! Memoized connection state for one batch run.
//!
//! Key spaces:
//! - providers: network name
//! - signers: (network name, derivation index)
//! - contracts: (network name, contract name, address)
//!
//! Each key is built at most once. Concurrent first accesses to the same key
//! wait on a shared [`OnceCell`] instead of racing to construct duplicates.
//! Nothing is evicted; build a fresh cache per run.

use std::{
    collections::HashMap,
    hash::Hash,
    sync::{Arc, Mutex},
};

use alloy::primitives::Address;
use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::{
    error::Result,
    network::{NetworkDescriptor, NetworkRegistry},
};

/// Performs the expensive construction the cache memoizes.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Provider: Send + Sync + 'static;
    type Signer: Send + Sync + 'static;

    async fn connect(&self, network: &NetworkDescriptor) -> Result<Self::Provider>;

    async fn signer(
        &self,
        network: &NetworkDescriptor,
        provider: &Self::Provider,
        index: u32,
    ) -> Result<Self::Signer>;
}

/// A contract address bound to a network connection.
#[derive(Debug)]
pub struct ContractHandle<P> {
    pub network: String,
    pub name: String,
    pub address: Address,
    pub provider: Arc<P>,
}

struct Memo<K, V> {
    cells: Mutex<HashMap<K, Arc<OnceCell<Arc<V>>>>>,
}

impl<K: Eq + Hash + Clone, V> Memo<K, V> {
    fn new() -> Self {
        Self {
            cells: Mutex::new(HashMap::new()),
        }
    }

    fn cell(&self, key: &K) -> Arc<OnceCell<Arc<V>>> {
        let mut cells = self.cells.lock().unwrap_or_else(|e| e.into_inner());
        cells.entry(key.clone()).or_default().clone()
    }

    /// Returns the value for `key`, running `init` only if no value exists
    /// yet. A failed `init` leaves the key empty so a later call may retry.
    async fn get_or_try_init<F, Fut>(&self, key: K, init: F) -> Result<Arc<V>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<V>>,
    {
        let cell = self.cell(&key);
        let value = cell
            .get_or_try_init(|| async move { init().await.map(Arc::new) })
            .await?;
        Ok(value.clone())
    }
}

pub struct ConnectionCache<C: Connector> {
    connector: C,
    registry: Arc<NetworkRegistry>,
    providers: Memo<String, C::Provider>,
    signers: Memo<(String, u32), C::Signer>,
    contracts: Memo<(String, String, Address), ContractHandle<C::Provider>>,
}

impl<C: Connector> ConnectionCache<C> {
    pub fn new(connector: C, registry: Arc<NetworkRegistry>) -> Self {
        Self {
            connector,
            registry,
            providers: Memo::new(),
            signers: Memo::new(),
            contracts: Memo::new(),
        }
    }

    pub fn registry(&self) -> &NetworkRegistry {
        &self.registry
    }

    pub async fn provider(&self, network: &str) -> Result<Arc<C::Provider>> {
        let descriptor = self.registry.descriptor(network)?;
        self.providers
            .get_or_try_init(network.to_owned(), || async move {
                debug!(network, url = %descriptor.rpc_url, "connecting");
                self.connector.connect(descriptor).await
            })
            .await
    }

    pub async fn signer(&self, network: &str, index: u32) -> Result<Arc<C::Signer>> {
        let descriptor = self.registry.descriptor(network)?;
        let provider = self.provider(network).await?;
        self.signers
            .get_or_try_init((network.to_owned(), index), || async move {
                debug!(network, index, "deriving signer");
                self.connector.signer(descriptor, &provider, index).await
            })
            .await
    }

    /// Handle for a contract whose address is known to the registry.
    pub async fn contract(
        &self,
        network: &str,
        contract: &str,
    ) -> Result<Arc<ContractHandle<C::Provider>>> {
        let address = self.registry.resolve_deployment_address(network, contract)?;
        self.contract_at(network, contract, address).await
    }

    pub async fn contract_at(
        &self,
        network: &str,
        contract: &str,
        address: Address,
    ) -> Result<Arc<ContractHandle<C::Provider>>> {
        let provider = self.provider(network).await?;
        self.contracts
            .get_or_try_init(
                (network.to_owned(), contract.to_owned(), address),
                || async move {
                    Ok(ContractHandle {
                        network: network.to_owned(),
                        name: contract.to_owned(),
                        address,
                        provider,
                    })
                },
            )
            .await
    }
}
