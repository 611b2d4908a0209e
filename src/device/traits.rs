//! Device capability abstraction for pluggable automation backends

use async_trait::async_trait;
use shadow_shared::Point;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by a device backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("no device available")]
    NoDevice,

    #[error("automation backend unavailable: {0}")]
    Unavailable(String),

    #[error("device disconnected: {0}")]
    Disconnected(String),

    #[error("device command failed: {0}")]
    CommandFailed(String),

    #[error("unexpected device output: {0}")]
    Parse(String),
}

/// Query against the device's UI tree
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selector {
    ResourceId(String),
    Text(String),
    Description(String),
}

impl Selector {
    pub fn resource_id(id: impl Into<String>) -> Self {
        Selector::ResourceId(id.into())
    }

    pub fn text(text: impl Into<String>) -> Self {
        Selector::Text(text.into())
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::ResourceId(id) => write!(f, "resource-id={}", id),
            Selector::Text(text) => write!(f, "text={:?}", text),
            Selector::Description(desc) => write!(f, "content-desc={:?}", desc),
        }
    }
}

/// Screen rectangle of a UI node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Bounds {
    pub fn center(&self) -> Point {
        Point::new((self.left + self.right) / 2, (self.top + self.bottom) / 2)
    }
}

/// A matched UI node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UiElement {
    pub bounds: Bounds,
    pub selected: bool,
}

impl UiElement {
    /// 40x40 element centered on `center`
    pub fn at(center: Point) -> Self {
        Self {
            bounds: Bounds {
                left: center.x - 20,
                top: center.y - 20,
                right: center.x + 20,
                bottom: center.y + 20,
            },
            selected: false,
        }
    }

    pub fn selected(mut self) -> Self {
        self.selected = true;
        self
    }

    pub fn center(&self) -> Point {
        self.bounds.center()
    }
}

/// Result of a locate query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElementMatch {
    elements: Vec<UiElement>,
}

impl ElementMatch {
    pub fn new(elements: Vec<UiElement>) -> Self {
        Self { elements }
    }

    pub fn exists(&self) -> bool {
        !self.elements.is_empty()
    }

    pub fn count(&self) -> usize {
        self.elements.len()
    }

    /// Center of the first match
    pub fn center(&self) -> Option<Point> {
        self.elements.first().map(UiElement::center)
    }

    pub fn elements(&self) -> &[UiElement] {
        &self.elements
    }
}

/// Display and build information reported by the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenInfo {
    pub width: u32,
    pub height: u32,
    pub brand: String,
    pub model: String,
    pub os_version: String,
}

/// A live connection to one device.
///
/// Every method is a suspension point; callers must not issue two calls
/// concurrently against the same session.
#[async_trait]
pub trait DeviceSession: Send + Sync + 'static {
    fn device_id(&self) -> &str;

    async fn launch_app(&self, package: &str) -> Result<(), DeviceError>;

    /// Package currently in the foreground
    async fn current_app(&self) -> Result<String, DeviceError>;

    async fn tap(&self, at: Point) -> Result<(), DeviceError>;

    async fn swipe(&self, from: Point, to: Point, duration: Duration) -> Result<(), DeviceError>;

    async fn type_text(&self, text: &str) -> Result<(), DeviceError>;

    async fn clear_text(&self) -> Result<(), DeviceError>;

    async fn locate(&self, selector: &Selector) -> Result<ElementMatch, DeviceError>;

    async fn screen_info(&self) -> Result<ScreenInfo, DeviceError>;
}

/// Factory for device sessions
#[async_trait]
pub trait DeviceConnector: Send + Sync {
    /// The session type this connector produces
    type Session: DeviceSession;

    /// IDs of devices ready to accept input
    async fn list_devices(&self) -> Result<Vec<String>, DeviceError>;

    /// Attempt to connect, returning a session on success
    async fn connect(&self, device_id: &str) -> Result<Self::Session, DeviceError>;

    /// Human-readable name for this backend
    fn name(&self) -> &'static str;
}
