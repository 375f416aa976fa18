//! kszswd entry point.
//!
//! Loads the switch configuration, installs the initial tables and keeps
//! the chip in sync by committing dirty rows on a fixed interval.

use anyhow::{Context, Result};
use clap::Parser;
use ksz_vswitch::audit::{init_logging, init_logging_pretty, AuditCategory, AuditOutcome, AuditRecord};
use ksz_vswitch::config::DEFAULT_CONFIG_PATH;
use ksz_vswitch::{audit_log, LoggingWriter, SwitchConfig};
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};

/// KSZ virtual switch daemon
#[derive(Parser, Debug)]
#[command(name = "kszswd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short = 'l', long)]
    log_level: Option<String>,

    /// Human-readable log output instead of JSON
    #[arg(long)]
    pretty: bool,

    /// Commit interval in milliseconds; overrides the config file
    #[arg(long)]
    commit_interval_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = SwitchConfig::load_or_default(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(interval_ms) = args.commit_interval_ms {
        config.commit.interval_ms = interval_ms;
    }

    let log_level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    if args.pretty || !config.logging.json {
        init_logging_pretty(&log_level);
    } else {
        init_logging(&log_level);
    }

    config.validate().context("invalid configuration")?;

    info!(
        ports = config.switch.port_count,
        host_port = config.switch.host_port,
        tail_tagging = config.switch.tail_tagging,
        "Starting kszswd"
    );

    let switch = config
        .build(Box::new(LoggingWriter))
        .context("building switch")?;
    config.apply(&switch).context("applying configuration")?;

    audit_log!(AuditRecord::new(AuditCategory::SystemLifecycle, "kszswd", "start")
        .with_outcome(AuditOutcome::Success)
        .with_details(json!({
            "config": args.config.display().to_string(),
            "vlans": config.vlans.len(),
            "static_macs": config.static_macs.len(),
        })));

    let mut ticker = tokio::time::interval(config.commit_interval());
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let report = switch.commit().await;
                if report.failed > 0 {
                    warn!(failed = report.failed, "Commit left rows dirty");
                }
            }
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    error!("Failed to listen for ctrl-c: {}", e);
                }
                warn!("Received SIGINT, shutting down");
                break;
            }
        }
    }

    // Flush whatever is still pending before exit.
    let report = tokio::time::timeout(Duration::from_secs(5), switch.commit())
        .await
        .unwrap_or_default();
    let stats = switch.stats();

    audit_log!(AuditRecord::new(AuditCategory::SystemLifecycle, "kszswd", "stop")
        .with_outcome(AuditOutcome::Success)
        .with_details(json!({
            "final_commit": report,
            "stats": stats,
        })));
    info!("kszswd shutdown complete");
    Ok(())
}
