use alloy::{
    primitives::{Address, Bytes, U256},
    sol_types::SolCall,
};
use serde::Serialize;
use serde_json::{json, Value};

use crate::{bindings::ILayerZeroUserApplicationConfig, params::ConfigParameter};

/// Protocol version used for every config read and write.
pub const VERSION: u16 = 2;

/// A state-changing call on the user application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UaCall {
    SetConfig {
        version: u16,
        remote_chain_id: u16,
        config_type: u16,
        config: Bytes,
    },
    SetSendVersion(u16),
    SetReceiveVersion(u16),
}

impl UaCall {
    pub fn method_name(&self) -> &'static str {
        match self {
            Self::SetConfig { .. } => "setConfig",
            Self::SetSendVersion(_) => "setSendVersion",
            Self::SetReceiveVersion(_) => "setReceiveVersion",
        }
    }

    pub fn args(&self) -> Vec<Value> {
        match self {
            Self::SetConfig {
                version,
                remote_chain_id,
                config_type,
                config,
            } => vec![
                json!(version),
                json!(remote_chain_id),
                json!(config_type),
                json!(config.to_string()),
            ],
            Self::SetSendVersion(version) | Self::SetReceiveVersion(version) => {
                vec![json!(version)]
            }
        }
    }

    pub fn calldata(&self) -> Bytes {
        let encoded = match self {
            Self::SetConfig {
                version,
                remote_chain_id,
                config_type,
                config,
            } => ILayerZeroUserApplicationConfig::setConfigCall {
                version: *version,
                chainId: *remote_chain_id,
                configType: U256::from(*config_type),
                config: config.clone(),
            }
            .abi_encode(),
            Self::SetSendVersion(version) => {
                ILayerZeroUserApplicationConfig::setSendVersionCall { version: *version }
                    .abi_encode()
            }
            Self::SetReceiveVersion(version) => {
                ILayerZeroUserApplicationConfig::setReceiveVersionCall { version: *version }
                    .abi_encode()
            }
        };
        encoded.into()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diff {
    pub old_value: String,
    pub new_value: String,
}

/// One potential on-chain transition. `calldata` is always populated so a
/// no-op record still shows what would be sent; `diff` is present iff
/// `need_change`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingChange {
    pub need_change: bool,
    pub network: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_network: Option<String>,
    pub parameter: ConfigParameter,
    pub chain_id: u16,
    pub contract_address: Address,
    pub contract_name: String,
    pub method_name: String,
    pub args: Vec<Value>,
    pub calldata: Bytes,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<Diff>,
}

/// Where a change applies.
#[derive(Debug, Clone)]
pub struct Target<'a> {
    pub network: &'a str,
    pub remote_network: Option<&'a str>,
    pub chain_id: u16,
    pub contract_address: Address,
    pub contract_name: &'a str,
}

impl PendingChange {
    /// Builds the record for `call`, marking it as needed when the current and
    /// desired values differ as strings.
    pub fn compare(
        target: Target<'_>,
        parameter: ConfigParameter,
        call: UaCall,
        old_value: String,
        new_value: String,
    ) -> Self {
        let need_change = old_value != new_value;
        let diff = need_change.then_some(Diff {
            old_value,
            new_value,
        });

        Self {
            need_change,
            network: target.network.to_owned(),
            remote_network: target.remote_network.map(str::to_owned),
            parameter,
            chain_id: target.chain_id,
            contract_address: target.contract_address,
            contract_name: target.contract_name.to_owned(),
            method_name: call.method_name().to_owned(),
            args: call.args(),
            calldata: call.calldata(),
            diff,
        }
    }
}
