//! WhatsApp state machine
//!
//! Every step is gated on its control being on screen; the first missing
//! control aborts the command.

use super::HandlerContext;
use crate::command::ActionError;
use crate::device::{DeviceSession, Selector};
use tracing::debug;

const PACKAGE: &str = "com.whatsapp";
const SEARCH: &str = "com.whatsapp:id/search";
const CONTACT_ROW: &str = "com.whatsapp:id/contactpicker_row_name";
const MESSAGE_ENTRY: &str = "com.whatsapp:id/entry";
const SEND_BUTTON: &str = "com.whatsapp:id/send";

/// Search for `contact`, open the first result and send `body`
pub async fn send_message<S: DeviceSession>(
    ctx: &mut HandlerContext<'_, S>,
    contact: &str,
    body: &str,
) -> Result<String, ActionError> {
    ctx.device.launch(PACKAGE).await?;

    let search = ctx
        .device
        .require(&Selector::resource_id(SEARCH), "search")
        .await?;
    ctx.device.tap(search).await?;
    ctx.device.settle().await;

    ctx.device.type_text(contact).await?;
    ctx.device.settle().await;

    let row = ctx
        .device
        .require(&Selector::resource_id(CONTACT_ROW), "contact search result")
        .await?;
    ctx.device.tap(row).await?;
    ctx.device.settle().await;
    debug!("  [{}] chat with {} open", ctx.command_id, contact);

    let entry = ctx
        .device
        .require(&Selector::resource_id(MESSAGE_ENTRY), "message input")
        .await?;
    ctx.device.tap(entry).await?;
    ctx.device.type_text(body).await?;

    let send = ctx
        .device
        .require(&Selector::resource_id(SEND_BUTTON), "send button")
        .await?;
    ctx.device.tap(send).await?;

    Ok(format!("Message sent to {}", contact))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::HumanizedDevice;
    use crate::device::fake::{DeviceOp, FakeDevice};
    use crate::device::UiElement;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use shadow_shared::{HumanizationPolicy, Point};
    use std::time::Duration;

    fn chat_screen() -> FakeDevice {
        FakeDevice::new("d1")
            .with_element(Selector::resource_id(SEARCH), UiElement::at(Point::new(900, 150)))
            .with_element(
                Selector::resource_id(CONTACT_ROW),
                UiElement::at(Point::new(400, 420)),
            )
            .with_element(
                Selector::resource_id(MESSAGE_ENTRY),
                UiElement::at(Point::new(500, 2250)),
            )
            .with_element(
                Selector::resource_id(SEND_BUTTON),
                UiElement::at(Point::new(1000, 2250)),
            )
    }

    async fn run(fake: &FakeDevice) -> Result<String, ActionError> {
        let mut dev =
            HumanizedDevice::new(fake.clone(), HumanizationPolicy::disabled(), Duration::from_secs(30))
                .with_rng(StdRng::seed_from_u64(3));
        let mut ctx = HandlerContext {
            command_id: "w1",
            device: &mut dev,
        };
        send_message(&mut ctx, "Alice", "hi").await
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_message_full_chain() {
        let fake = chat_screen();
        let result = run(&fake).await.unwrap();

        assert_eq!(result, "Message sent to Alice");
        assert_eq!(
            fake.ops(),
            vec![
                DeviceOp::Launch(PACKAGE.into()),
                DeviceOp::Tap(Point::new(900, 150)),
                DeviceOp::Clear,
                DeviceOp::Type("Alice".into()),
                DeviceOp::Tap(Point::new(400, 420)),
                DeviceOp::Tap(Point::new(500, 2250)),
                DeviceOp::Clear,
                DeviceOp::Type("hi".into()),
                DeviceOp::Tap(Point::new(1000, 2250)),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_search_aborts_before_any_tap() {
        let fake = FakeDevice::new("d1");
        let err = run(&fake).await.unwrap_err();

        assert!(err.to_string().contains("search"));
        assert!(fake.taps().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_contact_stops_chain() {
        let fake = FakeDevice::new("d1")
            .with_element(Selector::resource_id(SEARCH), UiElement::at(Point::new(900, 150)));
        let err = run(&fake).await.unwrap_err();

        assert!(matches!(
            err,
            ActionError::ElementNotFound {
                control: "contact search result",
                ..
            }
        ));
        assert_eq!(fake.taps(), vec![Point::new(900, 150)]);
        assert_eq!(fake.typed(), "Alice");
    }
}
