use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use alloy::primitives::Address;
use serde::Deserialize;
use url::Url;

use crate::{
    error::{Error, Result},
    params::{ConfigParameter, DesiredValue},
};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub networks: BTreeMap<String, NetworkConfig>,
    /// Named network sets, e.g. `testnet = ["goerli", "fuji"]`.
    #[serde(default)]
    pub environments: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub desired: BTreeMap<String, DesiredConfig>,
    /// JSON file with the same shape as `desired`, used when the table is empty.
    pub desired_state_file: Option<PathBuf>,
    #[serde(default)]
    pub execution: ExecutionConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkConfig {
    pub chain_id: u16,
    pub rpc_url: Url,
    pub endpoint: Option<Address>,
    pub ua: Option<Address>,
    #[serde(default)]
    pub contracts: BTreeMap<String, Address>,
    pub safe: Option<Address>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorKind {
    #[default]
    Direct,
    Safe,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutionConfig {
    #[serde(default = "default_confirmation_timeout_secs")]
    pub confirmation_timeout_secs: u64,
    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,
    #[serde(default)]
    pub executor: ExecutorKind,
    #[serde(default = "default_safe_output_dir")]
    pub safe_output_dir: PathBuf,
    #[serde(default = "default_mnemonic_env")]
    pub mnemonic_env: String,
}

impl ExecutionConfig {
    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            confirmation_timeout_secs: default_confirmation_timeout_secs(),
            gas_limit: default_gas_limit(),
            executor: ExecutorKind::default(),
            safe_output_dir: default_safe_output_dir(),
            mnemonic_env: default_mnemonic_env(),
        }
    }
}

fn default_confirmation_timeout_secs() -> u64 {
    120
}

fn default_gas_limit() -> u64 {
    8_000_000
}

fn default_safe_output_dir() -> PathBuf {
    PathBuf::from("safe-batches")
}

fn default_mnemonic_env() -> String {
    "MNEMONIC".to_owned()
}

/// Per-pair desired values. Absent fields mean "leave as is".
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PairConfig {
    pub inbound_proof_library_version: Option<DesiredValue>,
    pub inbound_block_confirmations: Option<DesiredValue>,
    pub relayer: Option<DesiredValue>,
    pub outbound_proof_type: Option<DesiredValue>,
    pub outbound_block_confirmations: Option<DesiredValue>,
    pub oracle: Option<DesiredValue>,
}

impl PairConfig {
    pub fn value(&self, parameter: ConfigParameter) -> Option<&DesiredValue> {
        match parameter {
            ConfigParameter::InboundProofLibraryVersion => {
                self.inbound_proof_library_version.as_ref()
            }
            ConfigParameter::InboundBlockConfirmations => self.inbound_block_confirmations.as_ref(),
            ConfigParameter::Relayer => self.relayer.as_ref(),
            ConfigParameter::OutboundProofType => self.outbound_proof_type.as_ref(),
            ConfigParameter::OutboundBlockConfirmations => {
                self.outbound_block_confirmations.as_ref()
            }
            ConfigParameter::Oracle => self.oracle.as_ref(),
            ConfigParameter::SendVersion | ConfigParameter::ReceiveVersion => None,
        }
    }

    fn validate(&self, context: &str) -> Result<()> {
        for parameter in ConfigParameter::PER_PAIR {
            if let Some(value) = self.value(parameter) {
                parameter
                    .value_type()
                    .validate(value.as_str())
                    .map_err(|e| Error::Config(format!("{context}.{parameter}: {e}")))?;
            }
        }
        Ok(())
    }
}

/// Desired state for one local network.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DesiredConfig {
    pub send_version: Option<u16>,
    pub receive_version: Option<u16>,
    pub inbound_proof_library_version: Option<DesiredValue>,
    pub inbound_block_confirmations: Option<DesiredValue>,
    pub relayer: Option<DesiredValue>,
    pub outbound_proof_type: Option<DesiredValue>,
    pub outbound_block_confirmations: Option<DesiredValue>,
    pub oracle: Option<DesiredValue>,
    /// Overrides for specific remote networks.
    #[serde(default)]
    pub remotes: BTreeMap<String, PairConfig>,
}

impl DesiredConfig {
    fn defaults(&self) -> PairConfig {
        PairConfig {
            inbound_proof_library_version: self.inbound_proof_library_version.clone(),
            inbound_block_confirmations: self.inbound_block_confirmations.clone(),
            relayer: self.relayer.clone(),
            outbound_proof_type: self.outbound_proof_type.clone(),
            outbound_block_confirmations: self.outbound_block_confirmations.clone(),
            oracle: self.oracle.clone(),
        }
    }
}

/// Read-only desired-state table keyed by (local, remote, parameter).
#[derive(Debug, Clone, Default)]
pub struct DesiredState {
    networks: BTreeMap<String, DesiredNetwork>,
}

#[derive(Debug, Clone, Default)]
struct DesiredNetwork {
    send_version: Option<u16>,
    receive_version: Option<u16>,
    defaults: PairConfig,
    remotes: BTreeMap<String, PairConfig>,
}

impl DesiredState {
    pub fn new(desired: BTreeMap<String, DesiredConfig>) -> Self {
        let networks = desired
            .into_iter()
            .map(|(name, config)| {
                let network = DesiredNetwork {
                    send_version: config.send_version,
                    receive_version: config.receive_version,
                    defaults: config.defaults(),
                    remotes: config.remotes,
                };
                (name, network)
            })
            .collect();
        Self { networks }
    }

    pub fn has_network(&self, local: &str) -> bool {
        self.networks.contains_key(local)
    }

    pub fn send_version(&self, local: &str) -> Option<u16> {
        self.networks.get(local)?.send_version
    }

    pub fn receive_version(&self, local: &str) -> Option<u16> {
        self.networks.get(local)?.receive_version
    }

    /// A remote-specific override wins over the network-wide value.
    pub fn pair_value(
        &self,
        local: &str,
        remote: &str,
        parameter: ConfigParameter,
    ) -> Option<&DesiredValue> {
        let network = self.networks.get(local)?;
        network
            .remotes
            .get(remote)
            .and_then(|pair| pair.value(parameter))
            .or_else(|| network.defaults.value(parameter))
    }
}

impl Config {
    /// Rejects references to unknown networks and values that cannot be
    /// encoded, so a bad input fails before any RPC is made.
    pub fn validate(&self) -> Result<()> {
        for (environment, members) in &self.environments {
            for name in members {
                if !self.networks.contains_key(name) {
                    return Err(Error::UnknownNetwork(format!(
                        "{name} (environment {environment})"
                    )));
                }
            }
        }

        for (local, desired) in &self.desired {
            if !self.networks.contains_key(local) {
                return Err(Error::UnknownNetwork(format!("{local} (desired state)")));
            }
            desired.defaults().validate(local)?;
            for (remote, pair) in &desired.remotes {
                if !self.networks.contains_key(remote) {
                    return Err(Error::UnknownNetwork(format!(
                        "{remote} (desired state of {local})"
                    )));
                }
                pair.validate(&format!("{local}.remotes.{remote}"))?;
            }
        }

        Ok(())
    }

    /// Resolves the network matrix for a run: explicit names first, then a
    /// named environment, then every configured network.
    pub fn select_networks(
        &self,
        environment: Option<&str>,
        networks: &[String],
    ) -> Result<Vec<String>> {
        let selected = if !networks.is_empty() {
            networks.to_vec()
        } else if let Some(environment) = environment {
            self.environments
                .get(environment)
                .cloned()
                .ok_or_else(|| Error::Config(format!("unknown environment {environment}")))?
        } else {
            self.networks.keys().cloned().collect()
        };

        for name in &selected {
            if !self.networks.contains_key(name) {
                return Err(Error::UnknownNetwork(name.clone()));
            }
        }
        Ok(selected)
    }

    pub fn desired_state(&self) -> DesiredState {
        DesiredState::new(self.desired.clone())
    }
}

pub fn read_config(config_file: &Path) -> Result<Config> {
    let content = fs::read_to_string(config_file).map_err(|e| {
        Error::Config(format!("cannot read {}: {e}", config_file.display()))
    })?;
    let mut config: Config = toml::from_str(&content).map_err(|e| Error::Config(e.to_string()))?;

    if let Some(file) = &config.desired_state_file {
        if !config.desired.is_empty() {
            return Err(Error::Config(
                "desired state given both inline and as desired_state_file".to_owned(),
            ));
        }
        let file = config_file
            .parent()
            .map(|dir| dir.join(file))
            .unwrap_or_else(|| file.clone());
        let content = fs::read_to_string(&file)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", file.display())))?;
        config.desired = serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {e}", file.display())))?;
    }

    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
        [networks.goerli]
        chain_id = 10121
        rpc_url = "https://goerli.example"
        endpoint = "0xbfD2135BFfbb0B5378b56643c2Df8a87552Bfa23"
        ua = "0x0000000000000000000000000000000000000aaa"

        [networks.fuji]
        chain_id = 10106
        rpc_url = "https://fuji.example"

        [environments]
        testnet = ["goerli", "fuji"]

        [desired.goerli]
        sendVersion = 2
        inboundBlockConfirmations = 15
        oracle = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"

        [desired.goerli.remotes.fuji]
        inboundBlockConfirmations = 20
    "#;

    fn parse(content: &str) -> Config {
        toml::from_str(content).unwrap()
    }

    #[test]
    fn parses_and_applies_defaults() {
        let config = parse(CONFIG);
        config.validate().unwrap();
        assert_eq!(config.execution.gas_limit, 8_000_000);
        assert_eq!(config.execution.confirmation_timeout(), Duration::from_secs(120));
        assert_eq!(config.execution.executor, ExecutorKind::Direct);
        assert_eq!(config.networks["goerli"].chain_id, 10121);
    }

    #[test]
    fn remote_override_wins() {
        let desired = parse(CONFIG).desired_state();
        let value = desired
            .pair_value("goerli", "fuji", ConfigParameter::InboundBlockConfirmations)
            .unwrap();
        assert_eq!(value.as_str(), "20");

        let oracle = desired
            .pair_value("goerli", "fuji", ConfigParameter::Oracle)
            .unwrap();
        assert_eq!(oracle.as_str(), "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed");

        assert!(desired
            .pair_value("goerli", "fuji", ConfigParameter::Relayer)
            .is_none());
        assert_eq!(desired.send_version("goerli"), Some(2));
        assert_eq!(desired.receive_version("goerli"), None);
        assert!(!desired.has_network("fuji"));
    }

    #[test]
    fn malformed_desired_value_is_rejected() {
        let config = parse(&CONFIG.replace(
            "inboundBlockConfirmations = 15",
            "inboundBlockConfirmations = \"many\"",
        ));
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = parse(&CONFIG.replace("oracle = \"0x5aAe", "oracle = \"0xZZ"));
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn unknown_networks_fail_fast() {
        let config = parse(&CONFIG.replace(
            "testnet = [\"goerli\", \"fuji\"]",
            "testnet = [\"goerli\", \"mumbai\"]",
        ));
        assert!(matches!(config.validate(), Err(Error::UnknownNetwork(_))));

        let config = parse(CONFIG);
        assert!(matches!(
            config.select_networks(None, &["mumbai".to_owned()]),
            Err(Error::UnknownNetwork(_))
        ));
    }

    #[test]
    fn network_selection_order() {
        let config = parse(CONFIG);
        assert_eq!(
            config.select_networks(Some("testnet"), &[]).unwrap(),
            vec!["goerli", "fuji"]
        );
        assert_eq!(
            config.select_networks(Some("testnet"), &["fuji".to_owned()]).unwrap(),
            vec!["fuji"]
        );
        assert_eq!(config.select_networks(None, &[]).unwrap(), vec!["fuji", "goerli"]);
        assert!(config.select_networks(Some("mainnet"), &[]).is_err());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let content = CONFIG.replace("sendVersion = 2", "sendVersoin = 2");
        assert!(toml::from_str::<Config>(&content).is_err());
    }
}
