//! Raw primitives for apps without a dedicated state machine

use super::HandlerContext;
use crate::command::ActionError;
use crate::device::{DeviceSession, Selector};
use shadow_shared::{ActionKind, Point};
use std::time::Duration;

/// Wait the caller's delay hint, then tap
pub async fn tap<S: DeviceSession>(
    ctx: &mut HandlerContext<'_, S>,
    at: Point,
    delay: Duration,
) -> Result<String, ActionError> {
    ctx.device.wait(delay).await;
    ctx.device.tap(at).await?;
    Ok(format!("Tapped at {}", at))
}

pub async fn swipe<S: DeviceSession>(
    ctx: &mut HandlerContext<'_, S>,
    from: Point,
    to: Point,
    duration: Duration,
    delay: Duration,
) -> Result<String, ActionError> {
    ctx.device.wait(delay).await;
    ctx.device
        .swipe(from, to, duration, ActionKind::Swipe)
        .await?;
    Ok(format!("Swiped from {} to {}", from, to))
}

/// Type into the focused field, or into the field showing `field` if it is on screen
pub async fn type_text<S: DeviceSession>(
    ctx: &mut HandlerContext<'_, S>,
    text: &str,
    field: Option<&str>,
) -> Result<String, ActionError> {
    if let Some(label) = field {
        if let Some(at) = ctx.device.locate(&Selector::text(label)).await?.center() {
            ctx.device.tap(at).await?;
        }
    }

    ctx.device.type_text(text).await?;
    Ok(format!("Typed {} character(s)", text.chars().count()))
}
