//! Drives the local x remote matrix and the optional execution step.

use std::collections::BTreeMap;

use futures_util::future::join_all;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::{
    change::PendingChange,
    error::{Error, Result},
    executor::{Execution, Executor},
    gate::{require_approval, ConfirmationGate},
    reconcile::{ConfigSource, Reconciler, Skip, UnitFailure},
};

/// Every record produced by one reconciliation pass, no-ops included.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub changes: Vec<PendingChange>,
    pub failures: Vec<UnitFailure>,
    pub skipped: Vec<Skip>,
}

impl BatchReport {
    pub fn needed(&self) -> impl Iterator<Item = &PendingChange> {
        self.changes.iter().filter(|c| c.need_change)
    }

    pub fn needed_count(&self) -> usize {
        self.needed().count()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedChange {
    pub change: PendingChange,
    pub execution: Execution,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedChange {
    pub change: PendingChange,
    #[serde(serialize_with = "crate::serialize_display")]
    pub error: Error,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReport {
    pub applied: Vec<AppliedChange>,
    pub failed: Vec<FailedChange>,
}

pub struct Orchestrator<S> {
    reconciler: Reconciler<S>,
    networks: Vec<String>,
}

impl<S: ConfigSource> Orchestrator<S> {
    /// `networks` is both the set of local networks and the remote matrix.
    pub fn new(reconciler: Reconciler<S>, networks: Vec<String>) -> Self {
        Self {
            reconciler,
            networks,
        }
    }

    /// Reconciles every local network in its own task. Results are collected
    /// in network order regardless of completion order.
    pub async fn plan(&self) -> BatchReport {
        let handles: Vec<_> = self
            .networks
            .iter()
            .map(|local| {
                let reconciler = self.reconciler.clone();
                let matrix = self.networks.clone();
                let task_local = local.clone();
                let handle = tokio::spawn(async move {
                    reconciler.reconcile_network(&task_local, &matrix).await
                });
                (local.clone(), handle)
            })
            .collect();

        let mut report = BatchReport::default();
        for (local, handle) in handles {
            match handle.await {
                Ok(outcome) => {
                    report.changes.extend(outcome.changes);
                    report.failures.extend(outcome.failures);
                    report.skipped.extend(outcome.skipped);
                }
                Err(e) => {
                    error!(network = %local, error = %e, "reconciliation task failed");
                    let error = Error::Task {
                        network: local.clone(),
                        message: e.to_string(),
                    };
                    report.failures.push(UnitFailure {
                        network: local,
                        remote_network: None,
                        parameter: None,
                        error,
                    });
                }
            }
        }

        info!(
            records = report.changes.len(),
            needed = report.needed_count(),
            failed = report.failures.len(),
            skipped = report.skipped.len(),
            "reconciliation finished"
        );
        report
    }
}

/// Hands every needed change to `executor` after the operator approves.
///
/// Networks run concurrently; changes within a network run in order so
/// submissions from one signer do not race. A failed change does not stop
/// the next one.
pub async fn execute(
    report: &BatchReport,
    executor: &dyn Executor,
    gate: &dyn ConfirmationGate,
) -> Result<ExecutionReport> {
    let mut by_network: BTreeMap<&str, Vec<&PendingChange>> = BTreeMap::new();
    for change in report.needed() {
        by_network.entry(&change.network).or_default().push(change);
    }
    if by_network.is_empty() {
        info!("nothing to execute");
        return Ok(ExecutionReport::default());
    }

    let message = format!(
        "Submit {} change(s) on {}?",
        report.needed_count(),
        by_network.keys().copied().collect::<Vec<_>>().join(", ")
    );
    require_approval(gate, &message).await?;

    let per_network = by_network.into_iter().map(|(network, changes)| async move {
        let mut results = Vec::with_capacity(changes.len());
        for change in changes {
            let result = executor.execute(network, change).await;
            if let Err(e) = &result {
                warn!(network, method = %change.method_name, error = %e, "execution failed");
            }
            results.push((change.clone(), result));
        }
        results
    });

    let mut execution = ExecutionReport::default();
    for (change, result) in join_all(per_network).await.into_iter().flatten() {
        match result {
            Ok(outcome) => execution.applied.push(AppliedChange {
                change,
                execution: outcome,
            }),
            Err(error) => execution.failed.push(FailedChange { change, error }),
        }
    }
    executor.finish().await?;

    info!(
        applied = execution.applied.len(),
        failed = execution.failed.len(),
        "execution finished"
    );
    Ok(execution)
}
