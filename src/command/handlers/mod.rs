//! Per-app action state machines

pub mod generic;
pub mod instagram;
pub mod whatsapp;

use super::{ActionError, HumanizedDevice};
use crate::device::DeviceSession;
use shadow_shared::App;
use tracing::debug;

/// Context passed to action handlers
pub struct HandlerContext<'a, S> {
    pub command_id: &'a str,
    pub device: &'a mut HumanizedDevice<S>,
}

/// Launch a named app and confirm it is in the foreground
pub async fn open_app<S: DeviceSession>(
    ctx: &mut HandlerContext<'_, S>,
    app: App,
) -> Result<String, ActionError> {
    let package = app.package().ok_or_else(|| ActionError::Unsupported {
        app,
        action: "open".into(),
    })?;

    ctx.device.launch(package).await?;
    debug!("  [{}] {} in foreground", ctx.command_id, package);

    Ok(format!("Opened {}", app))
}
