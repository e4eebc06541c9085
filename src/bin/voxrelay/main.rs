//! VoxRelay entrypoint: capture segments from the microphone and serve them
//! to a local loopback consumer through the same poll interface a GATT-style
//! transport binding would use.

mod loopback;
mod signals;

use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};
use voxrelay::audio::CpalSource;
use voxrelay::config::AppConfig;
use voxrelay::{init_tracing, Relay};

use crate::loopback::run_loopback;
use crate::signals::install_shutdown_handler;

fn main() -> Result<()> {
    let config = AppConfig::parse_args()?;
    if config.list_input_devices {
        list_input_devices()?;
        return Ok(());
    }

    init_tracing(&config);
    info!(version = env!("CARGO_PKG_VERSION"), "voxrelay starting");
    if let Err(err) = install_shutdown_handler() {
        warn!("Ctrl+C will not flush the open segment: {err:#}");
    }
    match CpalSource::list_devices() {
        Ok(devices) => {
            for (index, name) in devices.iter().enumerate() {
                info!(index, device = %name, "audio input device");
            }
        }
        Err(err) => warn!("failed to enumerate audio input devices: {err:#}"),
    }

    let source = Arc::new(CpalSource::new(
        config.input_device.clone(),
        config.block_channel_capacity,
        config.read_timeout(),
    ));
    let relay = Relay::new(config.relay_config(), source)?;
    let outcome = run_loopback(&relay, &config);
    relay.shutdown();

    println!("{}", serde_json::to_string_pretty(&relay.stats())?);
    info!("voxrelay stopped");
    outcome
}

fn list_input_devices() -> Result<()> {
    match CpalSource::list_devices() {
        Ok(devices) if devices.is_empty() => println!("No audio input devices detected."),
        Ok(devices) => {
            println!("Detected audio input devices:");
            for name in devices {
                println!("  {name}");
            }
        }
        Err(err) => println!("Failed to list audio input devices: {err:#}"),
    }
    Ok(())
}
