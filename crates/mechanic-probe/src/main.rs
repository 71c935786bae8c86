//! Mechanic probe: samples OBD-II gauges over CAN.
//!
//! Loads the TOML config, opens the CAN interface, reads the VIN once and
//! then writes one JSON line per gauge reading to stdout until interrupted.

use tracing_subscriber::EnvFilter;

use mechanic_probe::config::ProbeConfig;
use mechanic_probe::sampler;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "mechanic-probe starting");

    // ── Load config ─────────────────────────────────────────────
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/etc/mechanic/probe.toml".to_string());

    let config = ProbeConfig::from_file(&config_path)?;
    tracing::info!(
        interface = %config.interface,
        gauges = config.gauges.len(),
        "config loaded"
    );

    run(config).await
}

#[cfg(target_os = "linux")]
async fn run(config: ProbeConfig) -> anyhow::Result<()> {
    use mechanic_obd::{ObdInterface, SocketCanTransport};

    // ── CAN interface ───────────────────────────────────────────
    let transport = SocketCanTransport::open(&config.interface, &config.bus)?;
    let mut iface = ObdInterface::new(transport, config.bus.clone());

    if config.read_vin {
        match iface.read_vin().await {
            Ok(vin) => tracing::info!(vin = %vin, "vehicle identified"),
            Err(e) => tracing::warn!(error = %e, "VIN not available"),
        }
    }

    tracing::info!("mechanic-probe ready");

    let mut stdout = std::io::stdout().lock();
    tokio::select! {
        () = sampler::run(&mut iface, &config.gauges, config.sample_interval(), &mut stdout) => {
            tracing::error!("sampling loop exited unexpectedly");
        }
        // Graceful shutdown on SIGINT
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    tracing::info!("mechanic-probe stopped");
    Ok(())
}

#[cfg(not(target_os = "linux"))]
async fn run(_config: ProbeConfig) -> anyhow::Result<()> {
    anyhow::bail!("SocketCAN is only available on Linux")
}
