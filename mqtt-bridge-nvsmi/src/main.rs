//! MQTT bridge republishing `nvidia-smi dmon` telemetry for Home Assistant.

use anyhow::Result;

use mqtt_bridge_nvsmi::args::BridgeArgs;
use mqtt_bridge_nvsmi::bridge::Bridge;
use mqtt_bridge_nvsmi::config::NvsmiBridgeConfig;
use mqtt_bridge_nvsmi::{gpu, init_tracing};

#[tokio::main]
async fn main() -> Result<()> {
    let args = BridgeArgs::parse_with_default("nvsmi.json5");
    let config = NvsmiBridgeConfig::load(&args.config)?;

    init_tracing(&args.logging(&config.logging))?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting nvsmi MQTT bridge");

    let gpus = gpu::enumerate(&config.nvsmi.binary).await?;
    if gpus.is_empty() {
        // Nothing to monitor; distinguishable from a clean exit
        tracing::error!(binary = %config.nvsmi.binary, "no GPUs reported, exiting");
        std::process::exit(1);
    }
    for gpu in &gpus {
        tracing::info!(index = gpu.index, name = %gpu.name, uuid = %gpu.uuid, "discovered GPU");
    }

    let (bridge, eventloop) = Bridge::new(config, gpus);
    let code = bridge.run(eventloop).await?;

    std::process::exit(code);
}
