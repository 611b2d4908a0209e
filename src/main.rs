mod command;
mod config;
mod device;
mod dispatch;
mod engine;
mod security;
mod shutdown;
mod transport;

use anyhow::{bail, Context, Result};
use config::EngineConfig;
use device::{AdbConfig, AdbConnector, DeviceConnector};
use engine::ShadowEngine;
use security::{FileKeyStore, KeyProvider};
use shadow_shared::{CommandRequest, EncryptedChannel};
use shutdown::shutdown_channel;
use std::time::Duration;
use transport::HttpBridge;

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Per-request timeout for the command API
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = EngineConfig::from_env()?;
    let keys = FileKeyStore::new(&config.key_path);

    let mut args = std::env::args().skip(1);
    if args.next().as_deref() == Some("encrypt") {
        let json = args
            .next()
            .context("usage: shadow-device encrypt '<command json>'")?;
        return print_token(&keys, &json);
    }

    info!("Shadow device starting");
    info!("  API: {}", config.api_url);
    info!("  Shadow mode: {}", config.shadow_mode);

    let bridge = HttpBridge::new(&config.api_url, &config.auth_token, HTTP_TIMEOUT)
        .context("Failed to build HTTP client")?;
    let connector = AdbConnector::new(AdbConfig {
        adb_path: config.adb_path.clone(),
    });
    let mut engine = ShadowEngine::new(config, &keys, connector)?;

    if !engine.initialize().await {
        bail!("no usable device, dispatcher not started");
    }
    if let Some(device) = engine.device_info() {
        info!("  Device: {}", serde_json::to_string(&device)?);
    }

    let (trigger, signal) = shutdown_channel();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested");
                trigger.trigger();
            }
            Err(e) => {
                error!("Cannot listen for Ctrl-C: {}", e);
                // Keep the trigger alive; dropping it would stop the engine
                std::future::pending::<()>().await;
            }
        }
    });

    let stats = tokio::select! {
        biased;
        stats = engine.run(bridge.clone(), bridge, signal) => stats?,
        _ = toggle_shadow_on_signal(&engine) => bail!("shadow mode toggle stopped"),
    };
    info!(
        "Shadow device stopped: {} completed, {} failed, {} discarded, {} reports delivered",
        stats.dispatch.completed,
        stats.dispatch.failed,
        stats.dispatch.discarded,
        stats.reports.delivered
    );

    Ok(())
}

/// Flip shadow mode on every SIGUSR1
#[cfg(unix)]
async fn toggle_shadow_on_signal<C: DeviceConnector>(engine: &ShadowEngine<C>) {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::user_defined1()) {
        Ok(mut usr1) => {
            while usr1.recv().await.is_some() {
                engine.set_shadow_mode(!engine.shadow_mode());
            }
        }
        Err(e) => warn!("Cannot listen for SIGUSR1: {}", e),
    }
    std::future::pending::<()>().await
}

#[cfg(not(unix))]
async fn toggle_shadow_on_signal<C: DeviceConnector>(_engine: &ShadowEngine<C>) {
    std::future::pending::<()>().await
}

/// Seal a plaintext command under the local key and print the token
fn print_token(keys: &dyn KeyProvider, json: &str) -> Result<()> {
    let value: serde_json::Value = serde_json::from_str(json).context("command is not valid JSON")?;
    let request = CommandRequest::from_json(value)?;

    let channel = EncryptedChannel::new(&keys.load()?);
    println!("{}", channel.encrypt(&request)?);
    Ok(())
}
