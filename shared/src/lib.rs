//! Shadow Shared Command Model
//!
//! This crate provides the command model, lifecycle state machine, encrypted
//! codec and humanization policy shared by the shadow automation engine.

pub mod codec;
pub mod humanize;
pub mod state_machine;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

pub use codec::{CodecError, CommandKey, EncryptedChannel};
pub use humanize::{ActionKind, HumanizationPolicy};
pub use state_machine::{CommandStatus, LifecycleEvent, TransitionError};

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Timing parameters for the engine
pub mod timing {
    /// Default swipe/press duration hint carried by a command
    pub const DEFAULT_DURATION_MS: u64 = 1000;

    /// Default pre-action delay hint carried by a command
    pub const DEFAULT_DELAY_MS: u64 = 500;

    /// Poll cadence for the remote command source
    pub const DEFAULT_POLLING_INTERVAL_SECS: u64 = 2;

    /// Pause after a loop-level failure (device lost, transport down)
    pub const LOOP_BACKOFF_SECS: u64 = 5;

    /// Upper bound on any single device call
    pub const DEFAULT_STEP_TIMEOUT_SECS: u64 = 30;

    /// Fixed settle wait after opening a screen or a text field
    pub const SETTLE_MS: u64 = 1000;

    /// Extra delivery attempts for a result report
    pub const DEFAULT_MAX_RETRIES: u32 = 3;

    /// Gap between report delivery attempts
    pub const REPORT_RETRY_DELAY_MS: u64 = 1000;
}

/// Applications the engine knows how to drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum App {
    #[serde(alias = "instagram")]
    Instagram,
    #[serde(alias = "whatsapp")]
    WhatsApp,
    #[serde(alias = "youtube")]
    YouTube,
    #[serde(alias = "telegram")]
    Telegram,
    #[serde(alias = "tiktok")]
    TikTok,
    #[serde(alias = "facebook")]
    Facebook,
    #[serde(alias = "twitter")]
    Twitter,
    #[serde(alias = "linkedin")]
    LinkedIn,
    /// Raw tap/type/swipe commands not tied to an app
    #[default]
    #[serde(rename = "generic", alias = "Generic")]
    Generic,
}

impl App {
    pub const ALL: [App; 9] = [
        App::Instagram,
        App::WhatsApp,
        App::YouTube,
        App::Telegram,
        App::TikTok,
        App::Facebook,
        App::Twitter,
        App::LinkedIn,
        App::Generic,
    ];

    /// Android package name, `None` for generic commands
    pub fn package(self) -> Option<&'static str> {
        match self {
            App::Instagram => Some("com.instagram.android"),
            App::WhatsApp => Some("com.whatsapp"),
            App::YouTube => Some("com.google.android.youtube"),
            App::Telegram => Some("org.telegram.messenger"),
            App::TikTok => Some("com.zhiliaoapp.musically"),
            App::Facebook => Some("com.facebook.katana"),
            App::Twitter => Some("com.twitter.android"),
            App::LinkedIn => Some("com.linkedin.android"),
            App::Generic => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            App::Instagram => "Instagram",
            App::WhatsApp => "WhatsApp",
            App::YouTube => "YouTube",
            App::Telegram => "Telegram",
            App::TikTok => "TikTok",
            App::Facebook => "Facebook",
            App::Twitter => "Twitter",
            App::LinkedIn => "LinkedIn",
            App::Generic => "generic",
        }
    }
}

impl fmt::Display for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for App {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        App::ALL
            .into_iter()
            .find(|app| app.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| RequestError::UnknownApp(s.to_string()))
    }
}

/// Screen coordinate, serialized as `[x, y]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(i32, i32)", into = "(i32, i32)")]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl From<(i32, i32)> for Point {
    fn from((x, y): (i32, i32)) -> Self {
        Self { x, y }
    }
}

impl From<Point> for (i32, i32) {
    fn from(p: Point) -> Self {
        (p.x, p.y)
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Validation errors for inbound requests
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("command action is empty")]
    EmptyAction,

    #[error("unknown app: {0}")]
    UnknownApp(String),

    #[error("invalid command payload: {0}")]
    Malformed(String),

    #[error("{field} {point} is off screen")]
    NegativeCoordinate { field: &'static str, point: Point },
}

fn default_duration_ms() -> u64 {
    timing::DEFAULT_DURATION_MS
}

fn default_delay_ms() -> u64 {
    timing::DEFAULT_DELAY_MS
}

/// Wire form of a command, as received from the command source or
/// carried inside an encrypted token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRequest {
    #[serde(default)]
    pub app: App,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Point>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_coordinates: Option<Point>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default = "default_duration_ms", alias = "duration")]
    pub duration_ms: u64,
    #[serde(default = "default_delay_ms", alias = "delay")]
    pub delay_ms: u64,
}

impl CommandRequest {
    pub fn new(app: App, action: impl Into<String>) -> Self {
        Self {
            app,
            action: action.into(),
            target: None,
            coordinates: None,
            end_coordinates: None,
            text: None,
            duration_ms: timing::DEFAULT_DURATION_MS,
            delay_ms: timing::DEFAULT_DELAY_MS,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_coordinates(mut self, x: i32, y: i32) -> Self {
        self.coordinates = Some(Point::new(x, y));
        self
    }

    pub fn with_end_coordinates(mut self, x: i32, y: i32) -> Self {
        self.end_coordinates = Some(Point::new(x, y));
        self
    }

    /// Parse a plaintext JSON request
    pub fn from_json(value: serde_json::Value) -> Result<Self, RequestError> {
        let request: CommandRequest =
            serde_json::from_value(value).map_err(|e| RequestError::Malformed(e.to_string()))?;
        request.validate()?;
        Ok(request)
    }

    pub fn validate(&self) -> Result<(), RequestError> {
        if self.action.trim().is_empty() {
            return Err(RequestError::EmptyAction);
        }
        for (field, point) in [
            ("coordinates", self.coordinates),
            ("end_coordinates", self.end_coordinates),
        ] {
            if let Some(point) = point.filter(|p| p.x < 0 || p.y < 0) {
                return Err(RequestError::NegativeCoordinate { field, point });
            }
        }
        Ok(())
    }
}

/// Hands out 12-character URL-safe command IDs.
///
/// Layout of the 9 encoded bytes:
/// ```text
/// [ 5 bytes: SHA-256(app_action_unixsecs) ][ 4 bytes: sequence (u32, big-endian) ]
/// ```
/// The sequence makes IDs unique for the first 2^32 commands of a generator,
/// even when app, action and second all coincide.
#[derive(Debug, Default)]
pub struct CommandIdGenerator {
    sequence: AtomicU32,
}

impl CommandIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self, app: App, action: &str, unix_secs: u64) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        let digest = Sha256::digest(format!("{}_{}_{}", app, action, unix_secs).as_bytes());

        let mut raw = [0u8; 9];
        raw[..5].copy_from_slice(&digest[..5]);
        raw[5..].copy_from_slice(&seq.to_be_bytes());
        URL_SAFE_NO_PAD.encode(raw)
    }
}

/// A unit of automation work.
///
/// Lifecycle fields are private; they only move through [`ShadowCommand::start`],
/// [`ShadowCommand::complete`] and [`ShadowCommand::fail`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShadowCommand {
    pub id: String,
    pub app: App,
    pub action: String,
    pub target: Option<String>,
    pub coordinates: Option<Point>,
    pub end_coordinates: Option<Point>,
    pub text: Option<String>,
    pub duration_ms: u64,
    pub delay_ms: u64,
    pub created_at_ms: u64,
    status: CommandStatus,
    executed_at_ms: Option<u64>,
    result: Option<String>,
}

impl ShadowCommand {
    pub fn from_request(id: String, request: CommandRequest, created_at_ms: u64) -> Self {
        Self {
            id,
            app: request.app,
            action: request.action.trim().to_string(),
            target: request.target,
            coordinates: request.coordinates,
            end_coordinates: request.end_coordinates,
            text: request.text,
            duration_ms: request.duration_ms,
            delay_ms: request.delay_ms,
            created_at_ms,
            status: CommandStatus::Pending,
            executed_at_ms: None,
            result: None,
        }
    }

    pub fn status(&self) -> CommandStatus {
        self.status
    }

    pub fn executed_at_ms(&self) -> Option<u64> {
        self.executed_at_ms
    }

    pub fn result(&self) -> Option<&str> {
        self.result.as_deref()
    }

    /// Pending -> Running, stamping `executed_at`
    pub fn start(&mut self, at_ms: u64) -> Result<(), TransitionError> {
        self.status = self.status.next(LifecycleEvent::Started)?;
        self.executed_at_ms = Some(at_ms);
        Ok(())
    }

    /// Running -> Completed
    pub fn complete(&mut self, result: impl Into<String>) -> Result<(), TransitionError> {
        self.status = self.status.next(LifecycleEvent::Succeeded)?;
        self.result = Some(result.into());
        Ok(())
    }

    /// Running -> Failed
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), TransitionError> {
        self.status = self.status.next(LifecycleEvent::Failed)?;
        self.result = Some(reason.into());
        Ok(())
    }

    /// Result record, available once the command is terminal
    pub fn report(&self) -> Option<CommandReport> {
        if !self.status.is_terminal() {
            return None;
        }
        Some(CommandReport {
            id: self.id.clone(),
            status: self.status,
            result: self.result.clone().unwrap_or_default(),
            executed_at: self.executed_at_ms,
        })
    }
}

/// Outcome of a finished command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandReport {
    pub id: String,
    pub status: CommandStatus,
    pub result: String,
    /// Unix milliseconds
    pub executed_at: Option<u64>,
}

/// Payload posted to the remote result sink
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultEnvelope {
    pub command_id: String,
    pub result: CommandReport,
    /// Unix milliseconds
    pub timestamp: u64,
}

impl ResultEnvelope {
    pub fn new(report: CommandReport) -> Self {
        Self {
            command_id: report.id.clone(),
            result: report,
            timestamp: now_ms(),
        }
    }
}
