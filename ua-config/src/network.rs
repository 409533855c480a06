use std::collections::BTreeMap;

use alloy::primitives::Address;
use url::Url;

use crate::{
    cfg::Config,
    error::{Error, Result},
};

pub const ENDPOINT_CONTRACT: &str = "Endpoint";
pub const UA_CONTRACT: &str = "UserApplication";
pub const SAFE_CONTRACT: &str = "Safe";

/// Static facts about one network. Never mutated after load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkDescriptor {
    pub name: String,
    pub chain_id: u16,
    pub rpc_url: Url,
}

#[derive(Debug, Clone)]
struct Entry {
    descriptor: NetworkDescriptor,
    endpoint: Option<Address>,
    ua: Option<Address>,
    safe: Option<Address>,
    contracts: BTreeMap<String, Address>,
}

/// Lookup from network name to descriptor and known contract addresses.
#[derive(Debug, Clone, Default)]
pub struct NetworkRegistry {
    networks: BTreeMap<String, Entry>,
}

impl NetworkRegistry {
    pub fn from_config(config: &Config) -> Self {
        let networks = config
            .networks
            .iter()
            .map(|(name, network)| {
                let entry = Entry {
                    descriptor: NetworkDescriptor {
                        name: name.clone(),
                        chain_id: network.chain_id,
                        rpc_url: network.rpc_url.clone(),
                    },
                    endpoint: network.endpoint,
                    ua: network.ua,
                    safe: network.safe,
                    contracts: network.contracts.clone(),
                };
                (name.clone(), entry)
            })
            .collect();
        Self { networks }
    }

    pub fn insert(
        &mut self,
        descriptor: NetworkDescriptor,
        endpoint: Option<Address>,
        ua: Option<Address>,
    ) {
        let entry = Entry {
            descriptor,
            endpoint,
            ua,
            safe: None,
            contracts: BTreeMap::new(),
        };
        self.networks.insert(entry.descriptor.name.clone(), entry);
    }

    pub fn set_safe(&mut self, network: &str, safe: Address) {
        if let Some(entry) = self.networks.get_mut(network) {
            entry.safe = Some(safe);
        }
    }

    fn entry(&self, network: &str) -> Result<&Entry> {
        self.networks
            .get(network)
            .ok_or_else(|| Error::UnknownNetwork(network.to_owned()))
    }

    pub fn descriptor(&self, network: &str) -> Result<&NetworkDescriptor> {
        Ok(&self.entry(network)?.descriptor)
    }

    pub fn resolve_chain_id(&self, network: &str) -> Result<u16> {
        Ok(self.entry(network)?.descriptor.chain_id)
    }

    pub fn resolve_endpoint_address(&self, network: &str) -> Result<Address> {
        self.entry(network)?
            .endpoint
            .ok_or_else(|| Error::unresolved(network, ENDPOINT_CONTRACT))
    }

    pub fn resolve_ua_address(&self, network: &str) -> Result<Address> {
        self.entry(network)?
            .ua
            .ok_or_else(|| Error::unresolved(network, UA_CONTRACT))
    }

    pub fn resolve_safe_address(&self, network: &str) -> Result<Address> {
        self.entry(network)?
            .safe
            .ok_or_else(|| Error::unresolved(network, SAFE_CONTRACT))
    }

    /// Named deployments; the endpoint and user application are always known
    /// under their own names as well.
    pub fn resolve_deployment_address(&self, network: &str, contract: &str) -> Result<Address> {
        let entry = self.entry(network)?;
        let address = match contract {
            ENDPOINT_CONTRACT => entry.endpoint,
            UA_CONTRACT => entry.ua,
            _ => entry.contracts.get(contract).copied(),
        };
        address.ok_or_else(|| Error::unresolved(network, contract))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.networks.keys().map(String::as_str)
    }
}
