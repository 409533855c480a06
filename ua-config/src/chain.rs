use std::{env, sync::Arc};

use alloy::{
    primitives::{Address, Bytes, U256},
    providers::RootProvider,
    signers::local::{coins_bip39::English, MnemonicBuilder, PrivateKeySigner},
    transports::http::{Client, Http},
};
use async_trait::async_trait;
use tracing::debug;

use crate::{
    bindings::{ILayerZeroEndpoint, ILayerZeroUserApplicationConfig},
    cache::{ConnectionCache, Connector},
    error::{Error, Result},
    network::{NetworkDescriptor, ENDPOINT_CONTRACT, UA_CONTRACT},
    reconcile::{ConfigSource, VersionState},
};

pub type HttpProvider = RootProvider<Http<Client>>;

/// Connects over HTTP and derives signers from a BIP-39 mnemonic.
pub struct HttpConnector {
    mnemonic_env: String,
}

impl HttpConnector {
    pub fn new(mnemonic_env: impl Into<String>) -> Self {
        Self {
            mnemonic_env: mnemonic_env.into(),
        }
    }

    fn mnemonic(&self, network: &str) -> Result<String> {
        self.mnemonic_from(network, |name: &str| env::var(name).ok())
    }

    /// `MNEMONIC_<NETWORK>` wins over the shared variable.
    fn mnemonic_from(
        &self,
        network: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<String> {
        let specific = format!(
            "{}_{}",
            self.mnemonic_env,
            network.to_uppercase().replace('-', "_")
        );
        let set = |name: &str| lookup(name).filter(|m| !m.trim().is_empty());
        set(&specific)
            .or_else(|| set(&self.mnemonic_env))
            .ok_or_else(|| Error::Credentials {
                network: network.to_owned(),
                message: format!("neither {specific} nor {} is set", self.mnemonic_env),
            })
    }
}

/// Derives the account at `m/44'/60'/0'/0/{index}`.
fn derive_signer(network: &str, phrase: String, index: u32) -> Result<PrivateKeySigner> {
    MnemonicBuilder::<English>::default()
        .phrase(phrase)
        .index(index)
        .and_then(|builder| builder.build())
        .map_err(|e| Error::Credentials {
            network: network.to_owned(),
            message: e.to_string(),
        })
}

#[async_trait]
impl Connector for HttpConnector {
    type Provider = HttpProvider;
    type Signer = PrivateKeySigner;

    async fn connect(&self, network: &NetworkDescriptor) -> Result<HttpProvider> {
        Ok(RootProvider::new_http(network.rpc_url.clone()))
    }

    async fn signer(
        &self,
        network: &NetworkDescriptor,
        _provider: &HttpProvider,
        index: u32,
    ) -> Result<PrivateKeySigner> {
        let phrase = self.mnemonic(&network.name)?;
        let signer = derive_signer(&network.name, phrase, index)?;
        debug!(network = %network.name, index, address = %signer.address(), "derived signer");
        Ok(signer)
    }
}

/// Reads user application state through cached HTTP connections.
pub struct RpcConfigSource {
    cache: Arc<ConnectionCache<HttpConnector>>,
}

impl RpcConfigSource {
    pub fn new(cache: Arc<ConnectionCache<HttpConnector>>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl ConfigSource for RpcConfigSource {
    async fn versions(
        &self,
        network: &str,
        endpoint: Address,
        ua: Address,
    ) -> Result<VersionState> {
        let endpoint = self
            .cache
            .contract_at(network, ENDPOINT_CONTRACT, endpoint)
            .await?;
        let contract = ILayerZeroEndpoint::new(endpoint.address, endpoint.provider.as_ref());
        let lookup = contract
            .uaConfigLookup(ua)
            .call()
            .await
            .map_err(|e| Error::rpc_read(network, e))?
            ._0;

        Ok(VersionState {
            send_version: lookup.sendVersion,
            receive_version: lookup.receiveVersion,
        })
    }

    async fn get_config(
        &self,
        network: &str,
        ua: Address,
        version: u16,
        remote_chain_id: u16,
        config_type: u16,
    ) -> Result<Bytes> {
        let ua = self.cache.contract_at(network, UA_CONTRACT, ua).await?;
        let contract = ILayerZeroUserApplicationConfig::new(ua.address, ua.provider.as_ref());
        let raw = contract
            .getConfig(version, remote_chain_id, Address::ZERO, U256::from(config_type))
            .call()
            .await
            .map_err(|e| Error::rpc_read(network, e))?
            ._0;
        Ok(raw)
    }
}
