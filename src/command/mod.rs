//! Command execution for the automation device
//!
//! This module handles:
//! - Resolving `(app, action)` pairs into a closed set of plans
//! - Running per-app state machines against the device session
//! - Humanized timing and per-step timeouts around every device call

mod executor;
pub mod handlers;
mod primitives;

pub use executor::{ActionError, ActionRouter};
pub use primitives::{HumanizedDevice, ShadowSwitch};
