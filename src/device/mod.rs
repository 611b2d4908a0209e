//! Device capability layer
//!
//! The engine drives exactly one device session. Backends implement
//! [`DeviceConnector`] and [`DeviceSession`]; the ADB bridge is the one
//! shipped with the binary.

pub mod adb;
#[cfg(test)]
pub mod fake;
mod traits;

pub use adb::{AdbConfig, AdbConnector};
pub use traits::{
    DeviceConnector, DeviceError, DeviceSession, ElementMatch, ScreenInfo, Selector, UiElement,
};
