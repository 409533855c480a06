use std::{path::PathBuf, process::ExitCode, sync::Arc};

use clap::Parser;
use eyre::WrapErr;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use ua_config::{
    batch::{self, Orchestrator},
    cache::ConnectionCache,
    cfg::{self, ExecutorKind},
    chain::{HttpConnector, RpcConfigSource},
    executor::{DirectExecutor, Executor, SafeBatchExecutor},
    gate::{ConfirmationGate, NoPrompt, Prompt},
    network::NetworkRegistry,
    reconcile::Reconciler,
    Error,
};

#[derive(Parser, Debug)]
#[command(about = "Converge user application config on every network to the desired state")]
struct Args {
    #[clap(long, short, default_value = "ua-config.toml")]
    config_file: PathBuf,
    /// Named network set from the config's `[environments]` table.
    #[clap(long, short)]
    environment: Option<String>,
    /// Restrict the matrix to these networks. Repeatable.
    #[clap(long = "network", short)]
    networks: Vec<String>,
    /// Write every change record, no-ops included, to this JSON file.
    #[clap(long, short)]
    output: Option<PathBuf>,
    /// Submit the needed changes after confirmation.
    #[clap(long)]
    execute: bool,
    #[clap(long)]
    no_prompt: bool,
}

#[tokio::main]
async fn main() -> eyre::Result<ExitCode> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_line_number(true);
    builder.init();

    let args = Args::parse();
    let config = cfg::read_config(&args.config_file)
        .wrap_err_with(|| format!("loading {}", args.config_file.display()))?;
    let networks = config.select_networks(args.environment.as_deref(), &args.networks)?;
    info!(networks = ?networks, "reconciling");

    let registry = Arc::new(NetworkRegistry::from_config(&config));
    let cache = Arc::new(ConnectionCache::new(
        HttpConnector::new(&config.execution.mnemonic_env),
        registry.clone(),
    ));
    let reconciler = Reconciler::new(
        registry.clone(),
        Arc::new(config.desired_state()),
        Arc::new(RpcConfigSource::new(cache.clone())),
    );

    let report = Orchestrator::new(reconciler, networks).plan().await;
    for change in report.needed() {
        println!("{}", serde_json::to_string(change)?);
    }
    for failure in &report.failures {
        warn!(
            network = %failure.network,
            remote_network = ?failure.remote_network,
            parameter = ?failure.parameter,
            error = %failure.error,
            "could not reconcile"
        );
    }
    if let Some(output) = &args.output {
        std::fs::write(output, serde_json::to_vec_pretty(&report.changes)?)
            .wrap_err_with(|| format!("writing {}", output.display()))?;
        info!(path = %output.display(), "wrote change records");
    }

    if !args.execute {
        info!(needed = report.needed_count(), "dry run, nothing submitted");
        return Ok(exit_code(report.failures.is_empty()));
    }

    let executor: Box<dyn Executor> = match config.execution.executor {
        ExecutorKind::Direct => Box::new(DirectExecutor::new(
            cache,
            config.execution.gas_limit,
            config.execution.confirmation_timeout(),
        )),
        ExecutorKind::Safe => Box::new(SafeBatchExecutor::new(
            registry,
            config.execution.safe_output_dir.clone(),
        )),
    };
    let gate: Box<dyn ConfirmationGate> = if args.no_prompt {
        Box::new(NoPrompt)
    } else {
        Box::new(Prompt)
    };

    let execution = match batch::execute(&report, executor.as_ref(), gate.as_ref()).await {
        Ok(execution) => execution,
        Err(Error::UserAbort) => {
            println!("Aborting...");
            return Ok(ExitCode::SUCCESS);
        }
        Err(e) => return Err(e.into()),
    };
    for failed in &execution.failed {
        error!(
            network = %failed.change.network,
            method = %failed.change.method_name,
            error = %failed.error,
            "change not applied"
        );
    }

    info!(
        needed = report.needed_count(),
        applied = execution.applied.len(),
        failed = execution.failed.len() + report.failures.len(),
        skipped = report.skipped.len(),
        "run complete"
    );
    Ok(exit_code(report.failures.is_empty() && execution.failed.is_empty()))
}

fn exit_code(clean: bool) -> ExitCode {
    if clean {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
