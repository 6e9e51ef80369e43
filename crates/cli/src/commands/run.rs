//! `run` command implementation.

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{info, warn};

use contracts::RelayBlueprint;
use dispatcher::CancellationToken;

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::relay::{Relay, RelayConfig};

/// Execute the `run` command
pub async fn run_relay(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    if !args.config.exists() {
        return Err(CliError::config_not_found(args.config.display().to_string()).into());
    }

    let mut blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    apply_overrides(&mut blueprint, args);

    // Overrides bypassed file validation
    config_loader::ConfigLoader::validate(&blueprint)
        .context("Invalid configuration after applying CLI overrides")?;

    for warning in config_loader::ConfigLoader::warnings(&blueprint) {
        warn!(%warning, "Configuration warning");
    }

    info!(
        limit = blueprint.service.limit,
        period_ms = blueprint.service.period_ms,
        items = blueprint.workload.items,
        mode = ?blueprint.dispatcher.mode,
        "Configuration loaded"
    );

    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        println!(
            "Would dispatch {} items in {} chunks (at least {:.3}s)",
            blueprint.workload.items,
            blueprint.chunk_count(),
            blueprint.minimum_duration().as_secs_f64()
        );
        return Ok(());
    }

    let relay = Relay::new(RelayConfig {
        blueprint,
        metrics_port: (args.metrics_port != 0).then_some(args.metrics_port),
    });

    let ctx = CancellationToken::new();
    let run = relay.run(ctx.clone());
    let timeout = async {
        if args.timeout == 0 {
            std::future::pending::<()>().await;
        } else {
            tokio::time::sleep(Duration::from_secs(args.timeout)).await;
        }
    };

    tokio::select! {
        result = run => {
            let stats = result.context("Relay execution failed")?;
            if stats.is_complete() {
                info!(
                    sent = stats.sent,
                    duration_secs = stats.duration.as_secs_f64(),
                    throughput = format!("{:.2}", stats.throughput()),
                    "Relay completed successfully"
                );
            } else {
                warn!(
                    sent = stats.sent,
                    items = stats.items,
                    failed_chunks = stats.failures.len(),
                    "Relay completed with unsent items"
                );
            }
            stats.print_summary();
        }
        _ = timeout => {
            ctx.cancel();
            return Err(CliError::Timeout { secs: args.timeout }.into());
        }
        _ = shutdown_signal() => {
            ctx.cancel();
            warn!("Received shutdown signal, abandoning relay");
        }
    }

    info!("Batch Relay finished");
    Ok(())
}

fn apply_overrides(blueprint: &mut RelayBlueprint, args: &RunArgs) {
    if let Some(items) = args.items {
        info!(items, "Overriding workload size from CLI");
        blueprint.workload.items = items;
    }
    if let Some(mode) = args.mode {
        info!(mode = ?mode, "Overriding dispatch mode from CLI");
        blueprint.dispatcher.mode = mode.into();
    }
    if let Some(limit) = args.limit {
        info!(limit, "Overriding service limit from CLI");
        blueprint.service.limit = limit;
    }
    if let Some(period_ms) = args.period_ms {
        info!(period_ms, "Overriding service period from CLI");
        blueprint.service.period_ms = period_ms;
    }
    if let Some(latency_ms) = args.latency_ms {
        blueprint.service.latency_ms = latency_ms;
    }
    if let Some(max_in_flight) = args.max_in_flight {
        blueprint.dispatcher.max_in_flight = Some(max_in_flight);
    }
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
