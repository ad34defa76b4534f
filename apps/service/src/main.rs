mod config;
mod monitoring;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use logger::LogSettings;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use config::{Properties, ServiceConfig};
use monitoring::{
    CommandProber, HttpErrorReporter, HttpProber, MonitoringScheduler, PassCoordinator, PassSummary,
    ProbeSet,
};

/// Periodically probes a list of hosts with ping, HTTP and traceroute
#[derive(Debug, Parser)]
#[command(version, about)]
struct CommandLine {
    /// Config file, defaults to $XDG_CONFIG_HOME/pinger/config.toml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run a single pass, print the results as JSON and exit
    #[arg(long)]
    once: bool,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CommandLine::parse();

    let props = Properties::from_config(args.config.as_ref()).context("loading configuration")?;
    let cfg = ServiceConfig::from_properties(&props).context("invalid configuration")?;

    if args.print_config {
        println!("{cfg}");
        return Ok(());
    }

    let mut log_settings = LogSettings::default();
    if let Some(path) = &cfg.log_file {
        log_settings = log_settings.with_file(path);
    }
    logger::init(&log_settings).context("initializing logging")?;

    cfg.ensure_commands_available()?;

    let coordinator = build_coordinator(&cfg)?;
    let shutdown = CancellationToken::new();
    spawn_shutdown_listener(shutdown.clone());

    if args.once {
        let outcome = coordinator.run_pass(&cfg.hosts, &shutdown).await?;
        info!("Pass finished: {}", PassSummary::of(outcome.results()));
        println!("{}", serde_json::to_string_pretty(outcome.results())?);
        return Ok(());
    }

    info!(
        "Probing {} hosts every {}ms after {}ms",
        cfg.hosts.len(),
        cfg.period.as_millis(),
        cfg.delay.as_millis()
    );
    MonitoringScheduler::new(coordinator, cfg.hosts.clone(), cfg.delay, cfg.period)
        .run(&shutdown)
        .await?;

    Ok(())
}

fn build_coordinator(cfg: &ServiceConfig) -> Result<PassCoordinator> {
    let reporter = HttpErrorReporter::new(cfg.report_endpoint.clone())
        .context("building report service client")?;

    let probes = ProbeSet {
        icmp: Arc::new(CommandProber::icmp(&cfg.icmp_command)?),
        tcp: Arc::new(HttpProber::new(&cfg.tcp_timeouts).context("building HTTP probe clients")?),
        trace: Arc::new(CommandProber::trace(&cfg.trace_command)?),
    };

    let mut coordinator =
        PassCoordinator::new(probes, Arc::new(reporter)).with_dispatch(cfg.dispatch);
    if let Some(workers) = cfg.workers {
        coordinator = coordinator.with_workers(workers);
    }
    Ok(coordinator)
}

fn spawn_shutdown_listener(shutdown: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl-C, shutting down");
                shutdown.cancel();
            }
            Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
        }
    });
}
