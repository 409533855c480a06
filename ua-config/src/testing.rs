//! In-memory chain used by unit tests.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};

use alloy::{
    primitives::{address, keccak256, Address, Bytes},
    sol_types::SolCall,
};
use async_trait::async_trait;

use crate::{
    bindings::ILayerZeroUserApplicationConfig::{
        setConfigCall, setReceiveVersionCall, setSendVersionCall,
    },
    cfg::DesiredState,
    change::PendingChange,
    error::{Error, Result},
    executor::{settle, Execution, Executor},
    network::{NetworkDescriptor, NetworkRegistry},
    reconcile::{ConfigSource, VersionState},
};

pub const ORACLE: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";
pub const ENDPOINT: Address = address!("bfd2135bffbb0b5378b56643c2df8a87552bfa23");
pub const A_UA: Address = address!("00000000000000000000000000000000000000a0");

/// Networks `a`, `b`, `c` (chain ids 101..103) have a user application;
/// `d` (104) does not.
pub fn registry() -> NetworkRegistry {
    let mut registry = NetworkRegistry::default();
    let uas = [
        ("a", 101, Some(A_UA)),
        ("b", 102, Some(address!("00000000000000000000000000000000000000b0"))),
        ("c", 103, Some(address!("00000000000000000000000000000000000000c0"))),
        ("d", 104, None),
    ];
    for (name, chain_id, ua) in uas {
        registry.insert(
            NetworkDescriptor {
                name: name.to_owned(),
                chain_id,
                rpc_url: format!("http://{name}.localhost:8545").parse().unwrap(),
            },
            Some(ENDPOINT),
            ua,
        );
    }
    registry
}

pub fn desired(content: &str) -> DesiredState {
    DesiredState::new(toml::from_str(content).unwrap())
}

#[derive(Default)]
struct State {
    versions: HashMap<String, VersionState>,
    configs: HashMap<(String, u16, u16), Bytes>,
    failing_reads: HashSet<(String, u16, u16)>,
    failing_networks: HashSet<String>,
    reverting_networks: HashSet<String>,
    panicking_networks: HashSet<String>,
    executed: Vec<(String, String)>,
}

#[derive(Default)]
pub struct FakeChain {
    state: Mutex<State>,
    reads: AtomicUsize,
}

impl FakeChain {
    pub fn set_versions(&self, network: &str, send_version: u16, receive_version: u16) {
        self.state.lock().unwrap().versions.insert(
            network.to_owned(),
            VersionState {
                send_version,
                receive_version,
            },
        );
    }

    pub fn set_raw(&self, network: &str, remote_chain_id: u16, config_type: u16, raw: Bytes) {
        self.state
            .lock()
            .unwrap()
            .configs
            .insert((network.to_owned(), remote_chain_id, config_type), raw);
    }

    pub fn fail_reads(&self, network: &str, remote_chain_id: u16, config_type: u16) {
        self.state
            .lock()
            .unwrap()
            .failing_reads
            .insert((network.to_owned(), remote_chain_id, config_type));
    }

    pub fn fail_submissions(&self, network: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_networks
            .insert(network.to_owned());
    }

    /// Submissions on `network` are mined with a failed status.
    pub fn revert_submissions(&self, network: &str) {
        self.state
            .lock()
            .unwrap()
            .reverting_networks
            .insert(network.to_owned());
    }

    /// Reads on `network` panic, taking down its reconciliation task.
    pub fn panic_on_reads(&self, network: &str) {
        self.state
            .lock()
            .unwrap()
            .panicking_networks
            .insert(network.to_owned());
    }

    /// Number of `get_config` reads served.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// (network, method) of every executed change, in submission order.
    pub fn executed(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().executed.clone()
    }

    /// Applies a change by decoding its calldata, as the contract would.
    pub fn apply(&self, change: &PendingChange) -> Result<()> {
        let data = change.calldata.as_ref();
        let mut state = self.state.lock().unwrap();
        let network = change.network.clone();

        if data.starts_with(&setConfigCall::SELECTOR) {
            let call = setConfigCall::abi_decode(data, true)
                .map_err(|e| Error::submission(&network, e))?;
            let key = (network, call.chainId, call.configType.to::<u16>());
            state.configs.insert(key, call.config);
        } else if data.starts_with(&setSendVersionCall::SELECTOR) {
            let call = setSendVersionCall::abi_decode(data, true)
                .map_err(|e| Error::submission(&network, e))?;
            state.versions.entry(network).or_insert(ZERO_VERSIONS).send_version = call.version;
        } else if data.starts_with(&setReceiveVersionCall::SELECTOR) {
            let call = setReceiveVersionCall::abi_decode(data, true)
                .map_err(|e| Error::submission(&network, e))?;
            state.versions.entry(network).or_insert(ZERO_VERSIONS).receive_version = call.version;
        } else {
            return Err(Error::submission(network, "unknown selector"));
        }
        Ok(())
    }
}

const ZERO_VERSIONS: VersionState = VersionState {
    send_version: 0,
    receive_version: 0,
};

#[async_trait]
impl ConfigSource for FakeChain {
    async fn versions(
        &self,
        network: &str,
        _endpoint: Address,
        _ua: Address,
    ) -> Result<VersionState> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .versions
            .get(network)
            .copied()
            .unwrap_or(ZERO_VERSIONS))
    }

    async fn get_config(
        &self,
        network: &str,
        _ua: Address,
        _version: u16,
        remote_chain_id: u16,
        config_type: u16,
    ) -> Result<Bytes> {
        tokio::task::yield_now().await;
        let panics = self.state.lock().unwrap().panicking_networks.contains(network);
        if panics {
            panic!("node for {network} crashed");
        }
        let key = (network.to_owned(), remote_chain_id, config_type);
        let state = self.state.lock().unwrap();
        if state.failing_reads.contains(&key) {
            return Err(Error::rpc_read(network, "connection reset by peer"));
        }
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(state
            .configs
            .get(&key)
            .cloned()
            .unwrap_or_else(|| Bytes::from(vec![0u8; 32])))
    }
}

#[async_trait]
impl Executor for FakeChain {
    async fn execute(&self, network: &str, change: &PendingChange) -> Result<Execution> {
        let (fails, reverts) = {
            let state = self.state.lock().unwrap();
            (
                state.failing_networks.contains(network),
                state.reverting_networks.contains(network),
            )
        };
        if fails {
            return Err(Error::submission(network, "nonce too low"));
        }
        let tx_hash = keccak256(&change.calldata);
        if reverts {
            return settle(network, tx_hash, Some(1), false);
        }
        self.apply(change)?;
        self.state
            .lock()
            .unwrap()
            .executed
            .push((network.to_owned(), change.method_name.clone()));
        settle(network, tx_hash, Some(1), true)
    }
}
