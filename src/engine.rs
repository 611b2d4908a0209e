//! Shadow engine - wires key, device, queue, dispatcher and transport together

use crate::command::{ActionRouter, HumanizedDevice, ShadowSwitch};
use crate::config::EngineConfig;
use crate::device::{DeviceConnector, DeviceError, DeviceSession, ScreenInfo};
use crate::dispatch::{
    command_queue, CommandQueue, DispatchConfig, DispatchStats, Dispatcher, QueueConsumer,
    SubmitError,
};
use crate::security::KeyProvider;
use crate::shutdown::ShutdownSignal;
use crate::transport::{CommandSource, Poller, ReportStats, ResultReporter, ResultSink};
use anyhow::Context;
use serde::Serialize;
use shadow_shared::{timing, CodecError, CommandRequest, EncryptedChannel};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info, warn};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("engine not initialized: no device session")]
    NotInitialized,

    #[error("engine has already run")]
    AlreadyRan,
}

/// Totals from one engine run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub dispatch: DispatchStats,
    pub reports: ReportStats,
}

/// Snapshot of the attached device and engine mode
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub device_id: String,
    pub brand: String,
    pub model: String,
    pub version: String,
    /// `WIDTHxHEIGHT` in pixels
    pub resolution: String,
    pub connected: bool,
    pub shadow_mode: bool,
}

/// Identity of the device picked by `initialize`
struct Attached {
    device_id: String,
    screen: Option<ScreenInfo>,
}

pub struct ShadowEngine<C: DeviceConnector> {
    config: EngineConfig,
    connector: C,
    channel: Arc<EncryptedChannel>,
    queue: CommandQueue,
    shadow: ShadowSwitch,
    link: Arc<AtomicBool>,
    attached: Option<Attached>,
    consumer: Mutex<Option<QueueConsumer>>,
    session: Mutex<Option<C::Session>>,
}

impl<C: DeviceConnector> ShadowEngine<C> {
    /// Build an engine. The key is loaded here and never again.
    pub fn new(config: EngineConfig, keys: &dyn KeyProvider, connector: C) -> anyhow::Result<Self> {
        let key = keys.load().context("Failed to load command key")?;
        let (queue, consumer) = command_queue(config.allowlist());

        Ok(Self {
            shadow: ShadowSwitch::new(config.shadow_mode),
            config,
            connector,
            channel: Arc::new(EncryptedChannel::new(&key)),
            queue,
            link: Arc::new(AtomicBool::new(false)),
            attached: None,
            consumer: Mutex::new(Some(consumer)),
            session: Mutex::new(None),
        })
    }

    /// Connect to the configured (or first) device. False means the
    /// dispatcher must not start.
    pub async fn initialize(&mut self) -> bool {
        match self.connect().await {
            Ok((session, screen)) => {
                info!(
                    "[ENGINE] Connected to {} via {}",
                    session.device_id(),
                    self.connector.name()
                );
                self.attached = Some(Attached {
                    device_id: session.device_id().to_string(),
                    screen,
                });
                self.link.store(true, Ordering::Relaxed);
                *self.session.get_mut() = Some(session);
                true
            }
            Err(e) => {
                error!("[ENGINE] Device initialization failed: {}", e);
                false
            }
        }
    }

    async fn connect(&self) -> Result<(C::Session, Option<ScreenInfo>), DeviceError> {
        let devices = self.connector.list_devices().await?;

        let device_id = match &self.config.device_id {
            Some(wanted) if devices.contains(wanted) => wanted.clone(),
            Some(wanted) => {
                return Err(DeviceError::Disconnected(format!("{} is not attached", wanted)))
            }
            None => devices.into_iter().next().ok_or(DeviceError::NoDevice)?,
        };

        let session = self.connector.connect(&device_id).await?;
        let screen = match session.screen_info().await {
            Ok(screen) => {
                info!(
                    "[ENGINE] {} {} (Android {}), {}x{}",
                    screen.brand, screen.model, screen.os_version, screen.width, screen.height
                );
                Some(screen)
            }
            Err(e) => {
                warn!("[ENGINE] Could not read screen info: {}", e);
                None
            }
        };

        Ok((session, screen))
    }

    pub fn is_initialized(&self) -> bool {
        self.attached.is_some()
    }

    /// Switch humanization on or off. Takes effect at the next device step,
    /// including while `run` is in progress.
    pub fn set_shadow_mode(&self, enabled: bool) {
        self.shadow.set(enabled);
        info!(
            "[ENGINE] Shadow mode {}",
            if enabled { "enabled" } else { "disabled" }
        );
    }

    pub fn shadow_mode(&self) -> bool {
        self.shadow.is_enabled()
    }

    /// Attached device, or `None` before a successful `initialize`
    pub fn device_info(&self) -> Option<DeviceInfo> {
        let attached = self.attached.as_ref()?;
        let unknown = || "unknown".to_string();
        let screen = attached.screen.as_ref();

        Some(DeviceInfo {
            device_id: attached.device_id.clone(),
            brand: screen.map_or_else(unknown, |s| s.brand.clone()),
            model: screen.map_or_else(unknown, |s| s.model.clone()),
            version: screen.map_or_else(unknown, |s| s.os_version.clone()),
            resolution: screen.map_or_else(unknown, |s| format!("{}x{}", s.width, s.height)),
            connected: self.link.load(Ordering::Relaxed),
            shadow_mode: self.shadow.is_enabled(),
        })
    }

    pub fn submit(&self, request: CommandRequest) -> Result<String, SubmitError> {
        self.queue.submit(request)
    }

    /// Seal a request under the engine key
    pub fn encrypt(&self, request: &CommandRequest) -> Result<String, CodecError> {
        self.channel.encrypt(request)
    }

    pub fn pending(&self) -> usize {
        self.queue.pending()
    }

    /// Run poller, dispatcher and reporter side by side on the current task
    /// until `shutdown` fires.
    pub async fn run<Src, Sink>(
        &self,
        source: Src,
        sink: Sink,
        shutdown: ShutdownSignal,
    ) -> Result<EngineStats, EngineError>
    where
        Src: CommandSource,
        Sink: ResultSink,
    {
        if !self.is_initialized() {
            return Err(EngineError::NotInitialized);
        }
        let consumer = self.consumer.lock().await.take().ok_or(EngineError::AlreadyRan)?;
        let session = self.session.lock().await.take().ok_or(EngineError::AlreadyRan)?;

        let device = HumanizedDevice::new(session, self.shadow.clone(), self.config.step_timeout());
        let (report_tx, report_rx) = mpsc::unbounded_channel();

        let dispatcher = Dispatcher::new(
            ActionRouter::new(device),
            report_tx,
            DispatchConfig {
                log_commands: self.config.log_commands,
                loop_backoff: self.config.loop_backoff(),
            },
        )
        .with_link_flag(self.link.clone());
        let poller = Poller::new(
            source,
            self.queue.clone(),
            self.channel.clone(),
            self.config.polling_interval(),
            self.config.loop_backoff(),
        );
        let reporter = ResultReporter::new(
            sink,
            self.config.max_retries,
            Duration::from_millis(timing::REPORT_RETRY_DELAY_MS),
        );

        info!(
            "[ENGINE] Running (shadow mode {})",
            if self.shadow.is_enabled() { "on" } else { "off" }
        );

        let (dispatch, (), reports) = tokio::join!(
            dispatcher.run(consumer, shutdown.clone()),
            poller.run(shutdown),
            reporter.run(report_rx),
        );

        info!("[ENGINE] Stopped");
        Ok(EngineStats { dispatch, reports })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::fake::{DeviceOp, FakeConnector, FakeDevice};
    use crate::device::{Selector, UiElement};
    use crate::security::StaticKey;
    use crate::shutdown::shutdown_channel;
    use crate::transport::memory::{MemorySink, MemorySource};
    use crate::transport::InboundCommand;
    use shadow_shared::{App, CommandKey, CommandStatus, Point};

    fn key() -> StaticKey {
        StaticKey(CommandKey::from_bytes([1u8; 32]))
    }

    fn quiet_config() -> EngineConfig {
        EngineConfig {
            shadow_mode: false,
            ..EngineConfig::default()
        }
    }

    #[tokio::test]
    async fn test_no_devices_means_no_dispatch() {
        let mut engine =
            ShadowEngine::new(quiet_config(), &key(), FakeConnector::empty()).unwrap();
        engine
            .submit(CommandRequest::new(App::Instagram, "like"))
            .unwrap();
        engine
            .submit(CommandRequest::new(App::Instagram, "follow"))
            .unwrap();

        assert!(!engine.initialize().await);

        let (_trigger, signal) = shutdown_channel();
        let result = engine
            .run(MemorySource::default(), MemorySink::default(), signal)
            .await;
        assert!(matches!(result, Err(EngineError::NotInitialized)));
        assert_eq!(engine.pending(), 2);
        assert!(engine.device_info().is_none());
    }

    #[tokio::test]
    async fn test_device_info_after_initialize() {
        let mut engine =
            ShadowEngine::new(quiet_config(), &key(), FakeConnector::new(FakeDevice::new("emu")))
                .unwrap();
        assert!(engine.initialize().await);

        let info = engine.device_info().unwrap();
        assert_eq!(
            info,
            DeviceInfo {
                device_id: "emu".into(),
                brand: "fake".into(),
                model: "Pixel Test".into(),
                version: "14".into(),
                resolution: "1080x2400".into(),
                connected: true,
                shadow_mode: false,
            }
        );

        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["resolution"], "1080x2400");
        assert_eq!(json["shadow_mode"], false);
    }

    #[tokio::test]
    async fn test_set_shadow_mode_shows_in_device_info() {
        let mut engine =
            ShadowEngine::new(quiet_config(), &key(), FakeConnector::new(FakeDevice::new("emu")))
                .unwrap();
        assert!(engine.initialize().await);
        assert!(!engine.shadow_mode());

        engine.set_shadow_mode(true);
        assert!(engine.shadow_mode());
        assert!(engine.device_info().unwrap().shadow_mode);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shadow_mode_toggles_while_running() {
        let fake = FakeDevice::new("emu");
        let mut engine =
            ShadowEngine::new(quiet_config(), &key(), FakeConnector::new(fake.clone())).unwrap();
        assert!(engine.initialize().await);

        let type_cmd = |text: &str| CommandRequest::new(App::Generic, "type").with_text(text);
        let (trigger, signal) = shutdown_channel();
        let drive = async {
            engine.submit(type_cmd("ab")).unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
            engine.set_shadow_mode(true);
            engine.submit(type_cmd("cd")).unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
            trigger.trigger();
        };

        let (stats, ()) = tokio::join!(
            engine.run(MemorySource::default(), MemorySink::default(), signal),
            drive
        );
        assert_eq!(stats.unwrap().dispatch.completed, 2);

        let typed: Vec<DeviceOp> = fake
            .ops()
            .into_iter()
            .filter(|op| matches!(op, DeviceOp::Type(_)))
            .collect();
        assert_eq!(
            typed,
            vec![
                DeviceOp::Type("ab".into()),
                DeviceOp::Type("c".into()),
                DeviceOp::Type("d".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_configured_device_must_be_attached() {
        let config = EngineConfig {
            device_id: Some("R58M".into()),
            ..quiet_config()
        };
        let mut engine =
            ShadowEngine::new(config, &key(), FakeConnector::new(FakeDevice::new("emu"))).unwrap();
        assert!(!engine.initialize().await);
        assert!(!engine.is_initialized());
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_to_end_poll_dispatch_report() {
        let fake = FakeDevice::new("emu").with_element(
            Selector::text("Follow"),
            UiElement::at(Point::new(900, 340)),
        );
        let mut engine =
            ShadowEngine::new(quiet_config(), &key(), FakeConnector::new(fake.clone())).unwrap();
        assert!(engine.initialize().await);

        let sealed = engine
            .encrypt(&CommandRequest::new(App::Instagram, "follow"))
            .unwrap();
        let source = MemorySource::default();
        source.push(Ok(vec![
            InboundCommand::Encrypted { encrypted: sealed },
            InboundCommand::Plain(serde_json::json!({"app": "Instagram", "action": "scroll"})),
            InboundCommand::Encrypted {
                encrypted: "garbage".into(),
            },
            InboundCommand::Plain(serde_json::json!({"app": "TikTok", "action": "dance"})),
        ]));
        let sink = MemorySink::default();

        let (trigger, signal) = shutdown_channel();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            trigger.trigger();
        });

        let stats = engine.run(source, sink.clone(), signal).await.unwrap();

        assert_eq!(stats.dispatch.completed, 2);
        assert_eq!(stats.dispatch.failed, 1);
        assert_eq!(stats.reports.delivered, 3);

        let delivered = sink.delivered();
        let statuses: Vec<CommandStatus> = delivered.iter().map(|e| e.result.status).collect();
        assert_eq!(
            statuses,
            vec![
                CommandStatus::Completed,
                CommandStatus::Completed,
                CommandStatus::Failed
            ]
        );
        assert_eq!(delivered[0].result.result, "Followed account");
        assert_eq!(fake.taps(), vec![Point::new(900, 340)]);

        // A second run is refused
        let (_t, signal) = shutdown_channel();
        assert!(engine
            .run(MemorySource::default(), MemorySink::default(), signal)
            .await
            .is_err());
    }
}
