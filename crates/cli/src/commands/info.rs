//! `info` command implementation.

use std::num::NonZeroUsize;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use contracts::RelayBlueprint;

use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    service: ServiceInfo,
    dispatch: DispatchInfo,
    plan: PlanInfo,
}

#[derive(Serialize)]
struct ServiceInfo {
    limit: u64,
    period_ms: u64,
    latency_ms: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    fail_chunks: Vec<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    refuse_chunks: Vec<usize>,
}

#[derive(Serialize)]
struct DispatchInfo {
    mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_in_flight: Option<usize>,
    report_capacity: usize,
}

#[derive(Serialize)]
struct PlanInfo {
    items: usize,
    chunks: usize,
    minimum_duration_ms: u128,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    ranges: Vec<[usize; 2]>,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    let info = build_config_info(&blueprint, args.chunks);
    if args.json {
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&info);
    }

    Ok(())
}

/// Half-open item ranges of every chunk
fn planned_ranges(blueprint: &RelayBlueprint) -> Vec<[usize; 2]> {
    let Some(limit) = blueprint
        .service
        .rate_limits()
        .chunk_size()
        .and_then(NonZeroUsize::new)
    else {
        return Vec::new();
    };
    dispatcher::chunk_ranges(blueprint.workload.items, limit)
        .map(|r| [r.start, r.end])
        .collect()
}

fn build_config_info(blueprint: &RelayBlueprint, with_ranges: bool) -> ConfigInfo {
    let service = &blueprint.service;
    let dispatch = &blueprint.dispatcher;

    ConfigInfo {
        version: format!("{:?}", blueprint.version),
        service: ServiceInfo {
            limit: service.limit,
            period_ms: service.period_ms,
            latency_ms: service.latency_ms,
            fail_chunks: service.fail_chunks.clone(),
            refuse_chunks: service.refuse_chunks.clone(),
        },
        dispatch: DispatchInfo {
            mode: format!("{:?}", dispatch.mode),
            max_in_flight: dispatch.max_in_flight,
            report_capacity: dispatch.report_capacity,
        },
        plan: PlanInfo {
            items: blueprint.workload.items,
            chunks: blueprint.chunk_count(),
            minimum_duration_ms: blueprint.minimum_duration().as_millis(),
            ranges: if with_ranges {
                planned_ranges(blueprint)
            } else {
                Vec::new()
            },
        },
    }
}

fn print_config_info(info: &ConfigInfo) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║               Batch Relay Configuration                      ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    let service = &info.service;
    println!("📡 Service");
    println!("   ├─ Version: {}", info.version);
    println!("   ├─ Limit: {} items per {}ms", service.limit, service.period_ms);
    println!("   ├─ Latency: {}ms", service.latency_ms);
    if !service.fail_chunks.is_empty() {
        println!("   ├─ Failing chunks: {:?}", service.fail_chunks);
    }
    if !service.refuse_chunks.is_empty() {
        println!("   ├─ Refused chunks: {:?}", service.refuse_chunks);
    }
    println!("   └─ Simulated");

    let dispatch = &info.dispatch;
    println!("\n⚙️  Dispatch");
    println!("   ├─ Mode: {}", dispatch.mode);
    match dispatch.max_in_flight {
        Some(n) => println!("   ├─ Max in flight: {}", n),
        None => println!("   ├─ Max in flight: unbounded"),
    }
    println!("   └─ Report capacity: {}", dispatch.report_capacity);

    let plan = &info.plan;
    println!("\n📦 Plan");
    println!("   ├─ Items: {}", plan.items);
    println!("   ├─ Chunks: {}", plan.chunks);
    println!(
        "   └─ Minimum duration: {:.3}s",
        plan.minimum_duration_ms as f64 / 1000.0
    );

    if !plan.ranges.is_empty() {
        println!("\n🧩 Chunks");
        for (i, [start, end]) in plan.ranges.iter().enumerate() {
            let prefix = if i == plan.ranges.len() - 1 { "└─" } else { "├─" };
            println!("   {} #{}: items {}..{} ({})", prefix, i, start, end, end - start);
        }
    }

    println!();
}
