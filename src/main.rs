//! Scanner Bridge - barcode scanner to MQTT daemon
//!
//! Runs until killed. Configuration errors are the only way out.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use scanner_bridge::config::Config;

/// Forward codes from a keyboard-emulating barcode scanner to an MQTT broker.
#[derive(Debug, Parser)]
#[command(name = "scanner-bridge", version, about)]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, short, env = "SCANNER_BRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Broker host, overrides the config file
    #[arg(long, env = "SCANNER_BRIDGE_HOST")]
    host: Option<String>,

    /// Broker port, overrides the config file
    #[arg(long, env = "SCANNER_BRIDGE_PORT")]
    port: Option<u16>,

    /// Exact scanner device name, overrides the config file
    #[arg(long, env = "SCANNER_BRIDGE_DEVICE")]
    device_name: Option<String>,

    /// Topic receiving scanned codes, overrides the config file
    #[arg(long, env = "SCANNER_BRIDGE_TOPIC")]
    topic: Option<String>,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    dump_config: bool,
}

impl Cli {
    fn load_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load_from(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => Config::load().context("failed to load config")?,
        };

        if let Some(host) = &self.host {
            config.broker.host = host.clone();
        }
        if let Some(port) = self.port {
            config.broker.port = port;
        }
        if let Some(name) = &self.device_name {
            config.device.name = Some(name.clone());
            config.device.vendor_id = None;
            config.device.product_id = None;
        }
        if let Some(topic) = &self.topic {
            config.broker.topic = topic.clone();
        }

        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = cli.load_config()?;

    if cli.dump_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    run(config)
}

#[cfg(target_os = "linux")]
fn run(config: Config) -> Result<()> {
    use log::info;
    use scanner_bridge::broker::{BrokerConnection, RumqttTransport};
    use scanner_bridge::device::{DeviceConnection, EvdevProvider};
    use scanner_bridge::dispatch::{DeliveryWorker, ScanDispatcher};
    use scanner_bridge::retry::Backoff;
    use scanner_bridge::stats::ScanStats;
    use std::sync::Arc;

    let selector = config.device.selector()?;
    let backoff = Backoff::new(config.retry.backoff());
    let stats = Arc::new(ScanStats::new());

    info!(
        "Bridging scanner {} to {}:{} topic {}.",
        selector, config.broker.host, config.broker.port, config.broker.topic
    );

    let transport = RumqttTransport::new(&config.broker, config.retry.connect_timeout());
    let broker = BrokerConnection::new(transport, backoff).with_stats(stats.clone());
    let worker = DeliveryWorker::new(
        broker,
        &config.broker,
        config.retry.service_interval(),
        stats.clone(),
    );
    let (queue, _worker) = worker.spawn().context("failed to start delivery worker")?;

    let device = DeviceConnection::new(EvdevProvider::new(), selector, backoff);
    ScanDispatcher::new(device, queue, stats).run()
}

#[cfg(not(target_os = "linux"))]
fn run(_config: Config) -> Result<()> {
    anyhow::bail!("scanner access requires Linux evdev devices")
}
