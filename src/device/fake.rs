//! Scripted in-memory device for tests

use super::traits::{
    DeviceConnector, DeviceError, DeviceSession, ElementMatch, ScreenInfo, Selector, UiElement,
};
use async_trait::async_trait;
use shadow_shared::Point;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// A call recorded by [`FakeDevice`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceOp {
    Launch(String),
    Tap(Point),
    Swipe { from: Point, to: Point, duration: Duration },
    Type(String),
    Clear,
}

struct FakeState {
    elements: HashMap<Selector, Vec<UiElement>>,
    foreground: String,
    follow_launch: bool,
    disconnected: bool,
    hang_on_tap: bool,
    screen: ScreenInfo,
    ops: Vec<(Instant, DeviceOp)>,
}

/// Cloneable handle; clones share the same recorded state
#[derive(Clone)]
pub struct FakeDevice {
    id: String,
    state: Arc<Mutex<FakeState>>,
}

impl FakeDevice {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            state: Arc::new(Mutex::new(FakeState {
                elements: HashMap::new(),
                foreground: "com.android.launcher".into(),
                follow_launch: true,
                disconnected: false,
                hang_on_tap: false,
                screen: ScreenInfo {
                    width: 1080,
                    height: 2400,
                    brand: "fake".into(),
                    model: "Pixel Test".into(),
                    os_version: "14".into(),
                },
                ops: Vec::new(),
            })),
        }
    }

    pub fn with_element(self, selector: Selector, element: UiElement) -> Self {
        self.state()
            .elements
            .entry(selector)
            .or_default()
            .push(element);
        self
    }

    /// Launches no longer change the foreground app
    pub fn ignore_launch(self) -> Self {
        self.state().follow_launch = false;
        self
    }

    /// Taps never complete
    pub fn hang_on_tap(self) -> Self {
        self.state().hang_on_tap = true;
        self
    }

    pub fn disconnect(&self) {
        self.state().disconnected = true;
    }

    pub fn ops(&self) -> Vec<DeviceOp> {
        self.state().ops.iter().map(|(_, op)| op.clone()).collect()
    }

    pub fn timed_ops(&self) -> Vec<(Instant, DeviceOp)> {
        self.state().ops.clone()
    }

    pub fn taps(&self) -> Vec<Point> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                DeviceOp::Tap(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    pub fn tap_times(&self) -> Vec<Instant> {
        self.timed_ops()
            .into_iter()
            .filter_map(|(at, op)| matches!(op, DeviceOp::Tap(_)).then_some(at))
            .collect()
    }

    /// Concatenation of everything typed
    pub fn typed(&self) -> String {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                DeviceOp::Type(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake device lock poisoned")
    }

    fn record(&self, op: DeviceOp) -> Result<(), DeviceError> {
        let mut state = self.state();
        if state.disconnected {
            return Err(DeviceError::Disconnected(self.id.clone()));
        }
        state.ops.push((Instant::now(), op));
        Ok(())
    }

    fn check_connected(&self) -> Result<(), DeviceError> {
        if self.state().disconnected {
            return Err(DeviceError::Disconnected(self.id.clone()));
        }
        Ok(())
    }
}

#[async_trait]
impl DeviceSession for FakeDevice {
    fn device_id(&self) -> &str {
        &self.id
    }

    async fn launch_app(&self, package: &str) -> Result<(), DeviceError> {
        self.record(DeviceOp::Launch(package.to_string()))?;
        let mut state = self.state();
        if state.follow_launch {
            state.foreground = package.to_string();
        }
        Ok(())
    }

    async fn current_app(&self) -> Result<String, DeviceError> {
        self.check_connected()?;
        Ok(self.state().foreground.clone())
    }

    async fn tap(&self, at: Point) -> Result<(), DeviceError> {
        let hang = self.state().hang_on_tap;
        if hang {
            std::future::pending::<()>().await;
        }
        self.record(DeviceOp::Tap(at))
    }

    async fn swipe(&self, from: Point, to: Point, duration: Duration) -> Result<(), DeviceError> {
        self.record(DeviceOp::Swipe { from, to, duration })
    }

    async fn type_text(&self, text: &str) -> Result<(), DeviceError> {
        self.record(DeviceOp::Type(text.to_string()))
    }

    async fn clear_text(&self) -> Result<(), DeviceError> {
        self.record(DeviceOp::Clear)
    }

    async fn locate(&self, selector: &Selector) -> Result<ElementMatch, DeviceError> {
        self.check_connected()?;
        let elements = self.state().elements.get(selector).cloned().unwrap_or_default();
        Ok(ElementMatch::new(elements))
    }

    async fn screen_info(&self) -> Result<ScreenInfo, DeviceError> {
        self.check_connected()?;
        Ok(self.state().screen.clone())
    }
}

/// Connector over a fixed device list, handing out one shared [`FakeDevice`]
pub struct FakeConnector {
    pub devices: Vec<String>,
    pub device: FakeDevice,
}

impl FakeConnector {
    pub fn new(device: FakeDevice) -> Self {
        Self {
            devices: vec![device.device_id().to_string()],
            device,
        }
    }

    /// Enumeration finds nothing
    pub fn empty() -> Self {
        Self {
            devices: Vec::new(),
            device: FakeDevice::new("absent"),
        }
    }
}

#[async_trait]
impl DeviceConnector for FakeConnector {
    type Session = FakeDevice;

    async fn list_devices(&self) -> Result<Vec<String>, DeviceError> {
        Ok(self.devices.clone())
    }

    async fn connect(&self, device_id: &str) -> Result<Self::Session, DeviceError> {
        if self.devices.iter().any(|d| d == device_id) {
            Ok(self.device.clone())
        } else {
            Err(DeviceError::Disconnected(device_id.to_string()))
        }
    }

    fn name(&self) -> &'static str {
        "Fake"
    }
}
