#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use roster_controllers::{
    endpoints, nodehealth, register_catalog_controllers, workloadhealth, CancellationToken, Manager, ManagerConfig, NodeMapper,
    RunSummary, Runtime, WorkloadMapper,
};
use roster_core::catalog::{node_type, service_endpoints_type, service_type, workload_type, ServiceEndpoints};
use roster_core::{Delta, DeltaKind, Resource};
use roster_store::{MemoryStore, Store};
use serde::Serialize;
use tracing::{info, warn};

mod state;

#[derive(Parser, Debug)]
#[command(name = "rosterctl", version, about = "Roster catalog controllers over a local state file")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load a state file, run the controllers until idle and print derived state
    Reconcile {
        /// YAML or JSON state file
        file: PathBuf,
    },
    /// Show which reconciliations a change to one resource would trigger
    Deps {
        /// YAML or JSON state file
        file: PathBuf,
        /// Resource key, e.g. "Workload/api-1" or "Node/n1"
        key: String,
    },
}

fn init_tracing() {
    let env = std::env::var("ROSTER_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("ROSTER_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid ROSTER_METRICS_ADDR; expected host:port");
        }
    }
}

/// Store, controllers and mappers wired together, with the state file loaded
/// and reconciled to quiescence.
struct Host {
    store: Arc<MemoryStore>,
    mgr: Manager,
    summary: RunSummary,
}

async fn reconcile_file(file: &Path) -> Result<Host> {
    let resources = state::load(file)?;
    let store = Arc::new(MemoryStore::new());
    let mut rx = store.subscribe();
    for res in resources {
        let id = res.id.clone();
        store.write(res).await.with_context(|| format!("write {id}"))?;
    }

    let config = ManagerConfig::from_env();
    let mut mgr = Manager::new(config);
    register_catalog_controllers(&mut mgr, Arc::new(WorkloadMapper::new()), Arc::new(NodeMapper::new()));

    let cx = CancellationToken::new();
    let on_signal = cx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let rt = Runtime::new(store.clone());
    info!(resources = store.len(), max_attempts = config.max_attempts, "reconciling");
    let summary = mgr.run_until_idle(&cx, &rt, &mut rx).await;
    if summary.dropped > 0 || summary.exhausted {
        warn!(dropped = summary.dropped, exhausted = summary.exhausted, "reconciliation did not fully converge");
    }
    info!(reconciled = summary.reconciled, failed = summary.failed, "idle");
    Ok(Host { store, mgr, summary })
}

fn healthy_reason(res: &Resource, key: &str) -> String {
    res.status
        .get(key)
        .and_then(|s| s.condition(nodehealth::CONDITION_HEALTHY))
        .map(|c| c.reason.clone())
        .unwrap_or_else(|| "-".to_string())
}

fn print_human(store: &MemoryStore, summary: &RunSummary) {
    let all = store.dump();
    println!("reconciled={} failed={} dropped={}", summary.reconciled, summary.failed, summary.dropped);

    for node in all.iter().filter(|r| r.is_type(&node_type())) {
        println!("node {} • {}", node.id.name, healthy_reason(node, nodehealth::STATUS_KEY));
    }
    for wl in all.iter().filter(|r| r.is_type(&workload_type())) {
        println!("workload {} • {}", wl.id.name, healthy_reason(wl, workloadhealth::STATUS_KEY));
    }
    for svc in all.iter().filter(|r| r.is_type(&service_type())) {
        let managed = svc
            .status
            .get(endpoints::STATUS_KEY)
            .and_then(|s| s.condition(endpoints::CONDITION_ENDPOINTS_MANAGED))
            .map(|c| c.reason.as_str())
            .unwrap_or("-");
        println!("service {} • {}", svc.id.name, managed);
        let eps = all
            .iter()
            .find(|r| r.is_type(&service_endpoints_type()) && r.id.name == svc.id.name && r.id.tenancy == svc.id.tenancy);
        let Some(eps) = eps.and_then(|r| r.decode::<ServiceEndpoints>().ok()) else { continue };
        for ep in eps.endpoints {
            let addrs: Vec<String> = ep.addresses.iter().map(|a| format!("{}[{}]", a.host, a.ports.join(","))).collect();
            println!("  {} • {} • {}", ep.target_ref.name, ep.health_status, addrs.join(" "));
        }
    }
}

#[derive(Serialize)]
struct DepsRow<'a> {
    controller: &'a str,
    target: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();

    match cli.command {
        Commands::Reconcile { file } => {
            let host = reconcile_file(&file).await?;
            match cli.output {
                Output::Human => print_human(&host.store, &host.summary),
                Output::Json => println!("{}", serde_json::to_string_pretty(&host.store.dump())?),
            }
        }
        Commands::Deps { file, key } => {
            let id = state::parse_ref(&key)?;
            let host = reconcile_file(&file).await?;
            let res = host.store.read(&id).await.with_context(|| format!("read {key}"))?;
            let rows: Vec<DepsRow> = host
                .mgr
                .requests_for(&Delta { kind: DeltaKind::Applied, resource: res })
                .into_iter()
                .map(|(controller, req)| DepsRow { controller, target: req.id.to_string() })
                .collect();
            match cli.output {
                Output::Human => {
                    for r in &rows {
                        println!("{} • {}", r.controller, r.target);
                    }
                }
                Output::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
            }
        }
    }
    Ok(())
}
