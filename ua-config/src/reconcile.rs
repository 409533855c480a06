//! Diffing of on-chain user application configuration against desired state.
//!
//! Work is split into units: two per local network for the send and receive
//! versions, and one per (local, remote, parameter) triple. Units never share
//! failures; a read error is recorded against its unit and siblings proceed.

use std::sync::Arc;

use alloy::primitives::{Address, Bytes};
use async_trait::async_trait;
use futures_util::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    bindings::UA_CONTRACT_NAME,
    cfg::DesiredState,
    change::{PendingChange, Target, UaCall, VERSION},
    error::{Error, Result},
    network::NetworkRegistry,
    params::ConfigParameter,
};

/// Versions currently selected by a user application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionState {
    pub send_version: u16,
    pub receive_version: u16,
}

/// Read side of the chain as seen by the engine.
#[async_trait]
pub trait ConfigSource: Send + Sync + 'static {
    /// Combined send/receive version lookup on the endpoint.
    async fn versions(&self, network: &str, endpoint: Address, ua: Address) -> Result<VersionState>;

    /// Raw ABI-encoded value of one config type towards a remote chain.
    async fn get_config(
        &self,
        network: &str,
        ua: Address,
        version: u16,
        remote_chain_id: u16,
        config_type: u16,
    ) -> Result<Bytes>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitFailure {
    pub network: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_network: Option<String>,
    /// Absent when the whole local network failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameter: Option<ConfigParameter>,
    #[serde(serialize_with = "crate::serialize_display")]
    pub error: Error,
}

/// Work that was not attempted because there is nothing to reconcile.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Skip {
    pub network: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_network: Option<String>,
    pub reason: String,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkOutcome {
    pub changes: Vec<PendingChange>,
    pub failures: Vec<UnitFailure>,
    pub skipped: Vec<Skip>,
}

impl NetworkOutcome {
    fn skip(&mut self, network: &str, remote_network: Option<&str>, reason: impl ToString) {
        let reason = reason.to_string();
        info!(network, remote_network, %reason, "skipping");
        self.skipped.push(Skip {
            network: network.to_owned(),
            remote_network: remote_network.map(str::to_owned),
            reason,
        });
    }

    fn record(
        &mut self,
        network: &str,
        remote_network: Option<&str>,
        parameter: ConfigParameter,
        result: Result<PendingChange>,
    ) {
        match result {
            Ok(change) => {
                if let Some(diff) = &change.diff {
                    info!(
                        network,
                        remote_network,
                        %parameter,
                        old = %diff.old_value,
                        new = %diff.new_value,
                        "change needed"
                    );
                } else {
                    debug!(network, remote_network, %parameter, "up to date");
                }
                self.changes.push(change);
            }
            Err(error) => {
                warn!(network, remote_network, %parameter, %error, "unit failed");
                self.failures.push(UnitFailure {
                    network: network.to_owned(),
                    remote_network: remote_network.map(str::to_owned),
                    parameter: Some(parameter),
                    error,
                });
            }
        }
    }
}

pub struct Reconciler<S> {
    registry: Arc<NetworkRegistry>,
    desired: Arc<DesiredState>,
    source: Arc<S>,
}

impl<S> Clone for Reconciler<S> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            desired: self.desired.clone(),
            source: self.source.clone(),
        }
    }
}

/// What the pair units of one local network share.
struct LocalContext<'a> {
    network: &'a str,
    chain_id: u16,
    ua: Address,
}

impl LocalContext<'_> {
    fn target<'a>(&'a self, remote_network: Option<&'a str>) -> Target<'a> {
        Target {
            network: self.network,
            remote_network,
            chain_id: self.chain_id,
            contract_address: self.ua,
            contract_name: UA_CONTRACT_NAME,
        }
    }
}

impl<S: ConfigSource> Reconciler<S> {
    pub fn new(registry: Arc<NetworkRegistry>, desired: Arc<DesiredState>, source: Arc<S>) -> Self {
        Self {
            registry,
            desired,
            source,
        }
    }

    /// Reconciles `local` against every other network in `matrix`.
    pub async fn reconcile_network(&self, local: &str, matrix: &[String]) -> NetworkOutcome {
        let mut outcome = NetworkOutcome::default();

        if !self.desired.has_network(local) {
            outcome.skip(local, None, "no desired state declared");
            return outcome;
        }
        let ua = match self.registry.resolve_ua_address(local) {
            Ok(ua) => ua,
            Err(e) => {
                outcome.skip(local, None, e);
                return outcome;
            }
        };
        let chain_id = match self.registry.resolve_chain_id(local) {
            Ok(chain_id) => chain_id,
            Err(e) => {
                outcome.skip(local, None, e);
                return outcome;
            }
        };
        let context = LocalContext {
            network: local,
            chain_id,
            ua,
        };

        let pairs = matrix
            .iter()
            .filter(|remote| remote.as_str() != local)
            .map(|remote| self.reconcile_pair(&context, remote));
        let (versions, pairs) = tokio::join!(self.reconcile_versions(&context), join_all(pairs));

        for result in versions {
            match result {
                VersionResult::Skipped(reason) => outcome.skip(local, None, reason),
                VersionResult::Unit(parameter, result) => {
                    outcome.record(local, None, parameter, result)
                }
            }
        }
        for (remote, pair) in matrix.iter().filter(|r| r.as_str() != local).zip(pairs) {
            match pair {
                Err(reason) => outcome.skip(local, Some(remote), reason),
                Ok(units) => {
                    for (parameter, result) in units {
                        outcome.record(local, Some(remote), parameter, result);
                    }
                }
            }
        }

        outcome
    }

    async fn reconcile_versions(&self, context: &LocalContext<'_>) -> Vec<VersionResult> {
        let declared: Vec<(ConfigParameter, u16)> = [
            (ConfigParameter::SendVersion, self.desired.send_version(context.network)),
            (ConfigParameter::ReceiveVersion, self.desired.receive_version(context.network)),
        ]
        .into_iter()
        .filter_map(|(parameter, desired)| desired.map(|d| (parameter, d)))
        .collect();

        if declared.is_empty() {
            return Vec::new();
        }

        let endpoint = match self.registry.resolve_endpoint_address(context.network) {
            Ok(endpoint) => endpoint,
            Err(e) => return vec![VersionResult::Skipped(e.to_string())],
        };

        let current = self
            .source
            .versions(context.network, endpoint, context.ua)
            .await;

        declared
            .into_iter()
            .map(|(parameter, desired)| {
                let result = match &current {
                    Ok(state) => Ok(Self::version_change(context, parameter, *state, desired)),
                    Err(Error::RpcRead { network, message }) => Err(Error::RpcRead {
                        network: network.clone(),
                        message: message.clone(),
                    }),
                    Err(e) => Err(Error::rpc_read(context.network, e)),
                };
                VersionResult::Unit(parameter, result)
            })
            .collect()
    }

    fn version_change(
        context: &LocalContext<'_>,
        parameter: ConfigParameter,
        state: VersionState,
        desired: u16,
    ) -> PendingChange {
        let (current, call) = match parameter {
            ConfigParameter::SendVersion => (state.send_version, UaCall::SetSendVersion(desired)),
            _ => (state.receive_version, UaCall::SetReceiveVersion(desired)),
        };
        PendingChange::compare(
            context.target(None),
            parameter,
            call,
            current.to_string(),
            desired.to_string(),
        )
    }

    /// All declared per-pair units for (local, remote), in evaluation order.
    /// `Err` carries the reason the whole pair was skipped.
    async fn reconcile_pair(
        &self,
        context: &LocalContext<'_>,
        remote: &str,
    ) -> std::result::Result<Vec<(ConfigParameter, Result<PendingChange>)>, String> {
        self.registry
            .resolve_ua_address(remote)
            .map_err(|e| e.to_string())?;
        let remote_chain_id = self
            .registry
            .resolve_chain_id(remote)
            .map_err(|e| e.to_string())?;

        let units = ConfigParameter::PER_PAIR.into_iter().filter_map(|parameter| {
            let desired = self
                .desired
                .pair_value(context.network, remote, parameter)?
                .as_str();
            Some(async move {
                let result = self
                    .reconcile_parameter(context, remote, remote_chain_id, parameter, desired)
                    .await;
                (parameter, result)
            })
        });

        Ok(join_all(units).await)
    }

    async fn reconcile_parameter(
        &self,
        context: &LocalContext<'_>,
        remote: &str,
        remote_chain_id: u16,
        parameter: ConfigParameter,
        desired: &str,
    ) -> Result<PendingChange> {
        let Some(config_type) = parameter.type_id() else {
            return Err(Error::Config(format!("{parameter} is not a per-pair parameter")));
        };
        let value_type = parameter.value_type();

        let raw = self
            .source
            .get_config(context.network, context.ua, VERSION, remote_chain_id, config_type)
            .await?;
        let current = value_type
            .decode(&raw)
            .map_err(|e| Error::rpc_read(context.network, format!("decoding {parameter}: {e}")))?;

        let call = UaCall::SetConfig {
            version: VERSION,
            remote_chain_id,
            config_type,
            config: value_type.encode(desired)?,
        };

        Ok(PendingChange::compare(
            context.target(Some(remote)),
            parameter,
            call,
            current,
            desired.to_owned(),
        ))
    }
}

enum VersionResult {
    Skipped(String),
    Unit(ConfigParameter, Result<PendingChange>),
}
