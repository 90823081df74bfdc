mod demo;

use anyhow::{Context, Result};
use clap::Parser;
use cs_opcua_adapter::{
    AdapterConfig, AdapterResult, ControlSystemAdapter, DEFAULT_PORT, FieldId, ServerHandle,
    TagLayout, ids,
};
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Serve control-system process variables over OPC UA.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// OPC UA endpoint port.
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Address to bind the endpoint to.
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    bind: IpAddr,

    /// Capacity of the request queue.
    #[arg(long, default_value_t = 32)]
    queue: usize,

    /// Publish uint32 variables as "uint16_t", as earlier releases did.
    #[arg(long)]
    legacy_uint32_tag: bool,

    /// Directory for the daily-rolling log file.
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,
}

impl Args {
    fn adapter_config(&self) -> AdapterConfig {
        AdapterConfig {
            bind_address: self.bind,
            port: self.port,
            request_queue: self.queue,
            tag_layout: if self.legacy_uint32_tag {
                TagLayout::Legacy
            } else {
                TagLayout::Standard
            },
        }
    }
}

fn init_logging(log_dir: &Path) -> tracing_appender::non_blocking::WorkerGuard {
    let file_appender = tracing_appender::rolling::daily(log_dir, "cs-opcua-server.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
    guard
}

/// One line per mapped variable: name, type, value and timestamp.
async fn describe_address_space(handle: &ServerHandle) -> AdapterResult<Vec<String>> {
    let mut lines = Vec::new();
    for node in handle.browse(ids::PROCESS_VARIABLES).await? {
        let value_type = handle.read(node.id, FieldId::Type).await?;
        let value = handle.read(node.id, FieldId::Value).await?;
        let stamp = handle
            .browse(node.id)
            .await?
            .iter()
            .find_map(|child| child.timestamp().map(|ts| ts.to_local_string()))
            .unwrap_or_else(|| "N/A".to_string());
        lines.push(format!(
            "{} ({}) {value_type} = {value} @ {stamp}",
            node.display_name.text, node.id
        ));
    }
    Ok(lines)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _guard = init_logging(&args.log_dir);
    tracing::info!(?args, "Starting OPC UA adapter");

    let source = Arc::new(demo::demo_store().context("Failed to build demo variable set")?);
    let mut adapter = ControlSystemAdapter::new(args.adapter_config(), source)
        .context("Failed to start OPC UA adapter")?;

    for line in describe_address_space(&adapter.handle()).await? {
        tracing::info!("{line}");
    }
    for skipped in adapter.skipped() {
        tracing::warn!(variable = %skipped.name, error = %skipped.error, "not published");
    }
    tracing::info!(endpoint = %adapter.local_addr(), "Serving, press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("Shutdown requested");
    adapter.terminate();
    Ok(())
}
