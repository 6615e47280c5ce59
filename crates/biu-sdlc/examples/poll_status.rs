//! BIU Static Status Poller
//!
//! Opens the SDLC link, polls static status and prints each new snapshot as
//! JSON together with the link counters.
//!
//! Usage:
//!   cargo run --example poll_status -- [OPTIONS]
//!
//! Options:
//!   --config FILE     JSON settings file (default: built-in defaults)
//!   --port PORT       Serial port (overrides the settings file)
//!   --baud RATE       Baud rate (overrides the settings file)
//!   --seconds N       Run time in seconds (default: 30)
//!
//! Set `RUST_LOG=biu_sdlc=debug` for frame tracing, or
//! `RUST_LOG=biu_sdlc::audit=trace` for the audit trail.

use anyhow::{bail, Context, Result};
use biu_sdlc::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().collect();
    let mut config_path: Option<PathBuf> = None;
    let mut port_name: Option<String> = None;
    let mut baud_rate: Option<u32> = None;
    let mut seconds = 30u64;

    let mut i = 1;
    while i < args.len() {
        let value = args.get(i + 1).cloned();
        match args[i].as_str() {
            "--config" | "-c" => config_path = value.map(PathBuf::from),
            "--port" | "-p" => port_name = value,
            "--baud" | "-b" => baud_rate = value.map(|v| v.parse()).transpose()?,
            "--seconds" | "-s" => seconds = value.context("--seconds needs a value")?.parse()?,
            other => bail!("unknown option: {other}"),
        }
        i += 2;
    }

    let mut config = match &config_path {
        Some(path) => SdlcConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => SdlcConfig::default(),
    };
    if let Some(port) = port_name {
        config.serial.port_name = port;
    }
    if let Some(baud) = baud_rate {
        config.serial.baud_rate = baud;
    }
    if config.serial.port_name.is_empty() {
        bail!("no serial port given; use --port or a settings file");
    }

    let metrics = Arc::new(Metrics::new());
    let context = SdlcContext::new(metrics.clone(), Arc::new(TracingAudit));
    let service = Arc::new(SdlcService::with_system_port(config, context));
    service.start()?;

    let mut executor = Executor::new(service.clone()).start()?;

    let deadline = Instant::now() + Duration::from_secs(seconds);
    let mut last: Option<StaticStatus> = None;
    while Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(500));
        let status = executor.static_status();
        if status.is_some() && status != last {
            println!("{}", serde_json::to_string_pretty(&status)?);
            last = status;
        }
    }

    executor.stop();
    service.stop();

    for (counter, value) in metrics.snapshot() {
        println!("{:>24}: {value}", counter.to_string());
    }
    Ok(())
}
