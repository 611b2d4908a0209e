//! ADB Device Bridge
//!
//! Drives an Android device through the `adb` binary: input injection via
//! `input`, UI lookup via `uiautomator dump`, foreground checks via `dumpsys`.

use super::traits::{
    Bounds, DeviceConnector, DeviceError, DeviceSession, ElementMatch, ScreenInfo, Selector,
    UiElement,
};
use async_trait::async_trait;
use regex::Regex;
use shadow_shared::Point;
use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// DEL keystrokes sent to empty a focused text field
const CLEAR_KEYSTROKES: usize = 64;

/// Configuration for the ADB bridge
#[derive(Debug, Clone)]
pub struct AdbConfig {
    /// Path to the adb binary
    pub adb_path: String,
}

impl Default for AdbConfig {
    fn default() -> Self {
        Self {
            adb_path: "adb".into(),
        }
    }
}

/// Enumerates and connects to devices known to the local adb server
#[derive(Debug, Clone, Default)]
pub struct AdbConnector {
    config: AdbConfig,
}

impl AdbConnector {
    pub fn new(config: AdbConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl DeviceConnector for AdbConnector {
    type Session = AdbSession;

    async fn list_devices(&self) -> Result<Vec<String>, DeviceError> {
        let output = run_adb(&self.config.adb_path, None, &["devices"]).await?;
        Ok(parse_devices(&output))
    }

    async fn connect(&self, device_id: &str) -> Result<Self::Session, DeviceError> {
        let state = run_adb(&self.config.adb_path, Some(device_id), &["get-state"]).await?;
        if state.trim() != "device" {
            return Err(DeviceError::Disconnected(format!(
                "{} is in state '{}'",
                device_id,
                state.trim()
            )));
        }

        Ok(AdbSession {
            serial: device_id.to_string(),
            adb_path: self.config.adb_path.clone(),
        })
    }

    fn name(&self) -> &'static str {
        "ADB"
    }
}

/// Session bound to one adb serial
pub struct AdbSession {
    serial: String,
    adb_path: String,
}

impl AdbSession {
    async fn shell(&self, args: &[&str]) -> Result<String, DeviceError> {
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push("shell");
        full.extend_from_slice(args);
        run_adb(&self.adb_path, Some(&self.serial), &full).await
    }

    async fn getprop(&self, name: &str) -> Result<String, DeviceError> {
        Ok(self.shell(&["getprop", name]).await?.trim().to_string())
    }
}

#[async_trait]
impl DeviceSession for AdbSession {
    fn device_id(&self) -> &str {
        &self.serial
    }

    async fn launch_app(&self, package: &str) -> Result<(), DeviceError> {
        self.shell(&[
            "monkey",
            "-p",
            package,
            "-c",
            "android.intent.category.LAUNCHER",
            "1",
        ])
        .await?;
        Ok(())
    }

    async fn current_app(&self) -> Result<String, DeviceError> {
        let output = self.shell(&["dumpsys", "window", "windows"]).await?;
        parse_focus(&output).ok_or_else(|| DeviceError::Parse("no focused app window".into()))
    }

    async fn tap(&self, at: Point) -> Result<(), DeviceError> {
        let (x, y) = (at.x.to_string(), at.y.to_string());
        self.shell(&["input", "tap", &x, &y]).await?;
        Ok(())
    }

    async fn swipe(&self, from: Point, to: Point, duration: Duration) -> Result<(), DeviceError> {
        let args = [
            from.x.to_string(),
            from.y.to_string(),
            to.x.to_string(),
            to.y.to_string(),
            duration.as_millis().to_string(),
        ];
        let mut cmd = vec!["input", "swipe"];
        cmd.extend(args.iter().map(String::as_str));
        self.shell(&cmd).await?;
        Ok(())
    }

    /// `input text` only handles ASCII reliably
    async fn type_text(&self, text: &str) -> Result<(), DeviceError> {
        if text.is_empty() {
            return Ok(());
        }
        for chunk in input_chunks(text) {
            let escaped = escape_input_text(chunk);
            self.shell(&["input", "text", &escaped]).await?;
        }
        Ok(())
    }

    async fn clear_text(&self) -> Result<(), DeviceError> {
        self.shell(&["input", "keyevent", "KEYCODE_MOVE_END"]).await?;

        let mut cmd = vec!["input", "keyevent"];
        cmd.extend(std::iter::repeat("67").take(CLEAR_KEYSTROKES));
        self.shell(&cmd).await?;
        Ok(())
    }

    async fn locate(&self, selector: &Selector) -> Result<ElementMatch, DeviceError> {
        let dump = run_adb(
            &self.adb_path,
            Some(&self.serial),
            &["exec-out", "uiautomator", "dump", "/dev/tty"],
        )
        .await?;

        let elements = parse_ui_dump(&dump, selector);
        debug!("[ADB] {} matched {} node(s)", selector, elements.len());
        Ok(ElementMatch::new(elements))
    }

    async fn screen_info(&self) -> Result<ScreenInfo, DeviceError> {
        let size = self.shell(&["wm", "size"]).await?;
        let (width, height) = parse_wm_size(&size)
            .ok_or_else(|| DeviceError::Parse(format!("wm size: {}", size.trim())))?;

        Ok(ScreenInfo {
            width,
            height,
            brand: self.getprop("ro.product.brand").await?,
            model: self.getprop("ro.product.model").await?,
            os_version: self.getprop("ro.build.version.release").await?,
        })
    }
}

/// Run adb and classify failures.
///
/// The child is killed if the future is dropped, so a step timeout does not
/// leave stray adb processes behind.
async fn run_adb(adb: &str, serial: Option<&str>, args: &[&str]) -> Result<String, DeviceError> {
    let mut cmd = Command::new(adb);
    if let Some(serial) = serial {
        cmd.arg("-s").arg(serial);
    }
    cmd.args(args).kill_on_drop(true);

    let output = cmd
        .output()
        .await
        .map_err(|e| DeviceError::Unavailable(format!("{}: {}", adb, e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if is_connection_loss(&stderr) {
            return Err(DeviceError::Disconnected(stderr));
        }
        return Err(DeviceError::CommandFailed(format!(
            "adb {}: {}",
            args.join(" "),
            stderr
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn is_connection_loss(stderr: &str) -> bool {
    static MISSING_SERIAL: OnceLock<Regex> = OnceLock::new();

    let lower = stderr.to_ascii_lowercase();
    if regex(&MISSING_SERIAL, r"device '[^']*' not found").is_match(&lower) {
        return true;
    }
    ["device not found", "device offline", "no devices", "unauthorized", "closed"]
        .iter()
        .any(|needle| lower.contains(needle))
}

fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static regex"))
}

/// Serials in state `device` from `adb devices`
fn parse_devices(output: &str) -> Vec<String> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            match (parts.next(), parts.next()) {
                (Some(serial), Some("device")) => Some(serial.to_string()),
                _ => None,
            }
        })
        .collect()
}

/// Foreground package from `dumpsys window windows`
fn parse_focus(output: &str) -> Option<String> {
    static FOCUS: OnceLock<Regex> = OnceLock::new();
    static FOCUSED_APP: OnceLock<Regex> = OnceLock::new();

    let focus = regex(&FOCUS, r"mCurrentFocus=Window\{[^}]*?\s([A-Za-z0-9_.]+)/");
    let focused_app = regex(&FOCUSED_APP, r"mFocusedApp=.*?\s([A-Za-z0-9_.]+)/");

    focus
        .captures(output)
        .or_else(|| focused_app.captures(output))
        .map(|caps| caps[1].to_string())
}

/// `wm size` output, preferring an override over the physical size
fn parse_wm_size(output: &str) -> Option<(u32, u32)> {
    static SIZE: OnceLock<Regex> = OnceLock::new();
    let size = regex(&SIZE, r"(Override|Physical) size:\s*(\d+)x(\d+)");

    let mut physical = None;
    for caps in size.captures_iter(output) {
        let dims = (caps[2].parse().ok()?, caps[3].parse().ok()?);
        if &caps[1] == "Override" {
            return Some(dims);
        }
        physical = Some(dims);
    }
    physical
}

/// Nodes in a `uiautomator dump` that match `selector`
fn parse_ui_dump(xml: &str, selector: &Selector) -> Vec<UiElement> {
    static NODE: OnceLock<Regex> = OnceLock::new();
    static ATTR: OnceLock<Regex> = OnceLock::new();
    static BOUNDS: OnceLock<Regex> = OnceLock::new();

    let node = regex(&NODE, r"<node\s[^>]*>");
    let attr = regex(&ATTR, r#"([\w-]+)="([^"]*)""#);
    let bounds = regex(&BOUNDS, r"\[(-?\d+),(-?\d+)\]\[(-?\d+),(-?\d+)\]");

    node.find_iter(xml)
        .filter_map(|m| {
            let attrs: HashMap<&str, &str> = attr
                .captures_iter(m.as_str())
                .filter_map(|c| Some((c.get(1)?.as_str(), c.get(2)?.as_str())))
                .collect();

            let matches = match selector {
                Selector::ResourceId(id) => attrs.get("resource-id") == Some(&id.as_str()),
                Selector::Text(text) => attrs.get("text").map(|t| unescape_xml(t)).as_deref()
                    == Some(text.as_str()),
                Selector::Description(desc) => {
                    attrs.get("content-desc").map(|d| unescape_xml(d)).as_deref()
                        == Some(desc.as_str())
                }
            };
            if !matches {
                return None;
            }

            let caps = bounds.captures(attrs.get("bounds")?)?;
            Some(UiElement {
                bounds: Bounds {
                    left: caps[1].parse().ok()?,
                    top: caps[2].parse().ok()?,
                    right: caps[3].parse().ok()?,
                    bottom: caps[4].parse().ok()?,
                },
                selected: attrs.get("selected") == Some(&"true"),
            })
        })
        .collect()
}

fn unescape_xml(raw: &str) -> String {
    static NUMERIC: OnceLock<Regex> = OnceLock::new();

    let named = raw
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">");
    // `&amp;` last so `&amp;#38;` stays literal
    regex(&NUMERIC, r"&#(?:x([0-9a-fA-F]+)|([0-9]+));")
        .replace_all(&named, |caps: &regex::Captures| {
            let code = match (caps.get(1), caps.get(2)) {
                (Some(hex), _) => u32::from_str_radix(hex.as_str(), 16).ok(),
                (_, Some(dec)) => dec.as_str().parse().ok(),
                _ => None,
            };
            code.and_then(char::from_u32)
                .map(String::from)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .replace("&amp;", "&")
}

/// Split text so no piece holds a literal `%s`, which `input text` turns
/// into a space. A trailing `%` is typed as-is.
fn input_chunks(text: &str) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut start = 0;
    for (i, _) in text.match_indices("%s") {
        chunks.push(&text[start..=i]);
        start = i + 1;
    }
    chunks.push(&text[start..]);
    chunks
}

/// Escape text for `input text`, which goes through the device shell
fn escape_input_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len() * 2);
    for ch in text.chars() {
        match ch {
            ' ' => out.push_str("%s"),
            '\\' | '"' | '\'' | '(' | ')' | '&' | '<' | '>' | ';' | '|' | '*' | '~' | '$'
            | '`' | '!' | '?' | '[' | ']' | '{' | '}' | '#' => {
                out.push('\\');
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }
    out
}
