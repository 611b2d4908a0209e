//! Instagram state machine

use super::HandlerContext;
use crate::command::ActionError;
use crate::device::{DeviceSession, ScreenInfo, Selector, UiElement};
use shadow_shared::{ActionKind, Point};
use std::time::Duration;
use tracing::debug;

const PACKAGE: &str = "com.instagram.android";
const LIKE_BUTTON: &str = "com.instagram.android:id/row_feed_button_like";
const COMMENT_BUTTON: &str = "com.instagram.android:id/row_feed_button_comment";
const COMMENT_FIELD: &str = "Add a comment…";
const POST_BUTTON: &str = "Post";
const FOLLOW_BUTTON: &str = "Follow";

/// Most posts liked per command
pub const MAX_LIKES: usize = 3;

/// Feed scroll gesture length
const SCROLL_DURATION: Duration = Duration::from_millis(800);

async fn open<S: DeviceSession>(ctx: &mut HandlerContext<'_, S>) -> Result<(), ActionError> {
    ctx.device.launch(PACKAGE).await?;
    ctx.device.settle().await;
    Ok(())
}

/// Like up to [`MAX_LIKES`] visible posts that are not already liked
pub async fn like<S: DeviceSession>(
    ctx: &mut HandlerContext<'_, S>,
) -> Result<String, ActionError> {
    open(ctx).await?;

    let selector = Selector::resource_id(LIKE_BUTTON);
    let buttons = ctx.device.locate(&selector).await?;
    let targets: Vec<Point> = buttons
        .elements()
        .iter()
        .filter(|e| !e.selected)
        .take(MAX_LIKES)
        .map(UiElement::center)
        .collect();

    if targets.is_empty() {
        return Err(ActionError::ElementNotFound {
            control: "unliked like button",
            selector: selector.to_string(),
        });
    }

    // Likes are paced tap to tap
    let mut last_tap = None;
    for at in &targets {
        match last_tap {
            None => ctx.device.pause(ActionKind::Tap).await,
            Some(previous) => ctx.device.pace_from(previous).await,
        }
        last_tap = Some(ctx.device.tap_once(*at).await?);
        debug!("  [{}] liked post at {}", ctx.command_id, at);
    }
    ctx.device.pause(ActionKind::Tap).await;

    Ok(format!("Liked {} post(s)", targets.len()))
}

/// Open the comment sheet of the first post, optionally type, then submit
pub async fn comment<S: DeviceSession>(
    ctx: &mut HandlerContext<'_, S>,
    text: Option<&str>,
) -> Result<String, ActionError> {
    open(ctx).await?;

    let button = ctx
        .device
        .require(&Selector::resource_id(COMMENT_BUTTON), "comment button")
        .await?;
    ctx.device.tap(button).await?;
    ctx.device.settle().await;

    if let Some(text) = text {
        // The field is usually focused already
        if let Some(field) = ctx.device.locate(&Selector::text(COMMENT_FIELD)).await?.center() {
            ctx.device.tap(field).await?;
        }
        ctx.device.type_text(text).await?;
    }

    let post = ctx
        .device
        .require(&Selector::text(POST_BUTTON), "post button")
        .await?;
    ctx.device.tap(post).await?;

    Ok("Comment posted".into())
}

pub async fn follow<S: DeviceSession>(
    ctx: &mut HandlerContext<'_, S>,
) -> Result<String, ActionError> {
    open(ctx).await?;

    let button = ctx
        .device
        .require(&Selector::text(FOLLOW_BUTTON), "follow button")
        .await?;
    ctx.device.tap(button).await?;

    Ok("Followed account".into())
}

/// Swipe up from 80% to 30% of the screen height at the horizontal center
pub async fn scroll<S: DeviceSession>(
    ctx: &mut HandlerContext<'_, S>,
) -> Result<String, ActionError> {
    open(ctx).await?;

    let (from, to) = scroll_vector(&ctx.device.screen_info().await?);
    ctx.device
        .swipe(from, to, SCROLL_DURATION, ActionKind::Scroll)
        .await?;

    Ok("Scrolled feed".into())
}

fn scroll_vector(screen: &ScreenInfo) -> (Point, Point) {
    let x = (screen.width / 2) as i32;
    let height = screen.height as i64;
    (
        Point::new(x, (height * 8 / 10) as i32),
        Point::new(x, (height * 3 / 10) as i32),
    )
}
