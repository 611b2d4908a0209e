//! Action router - resolves a command into a plan and runs it

use super::handlers::{self, generic, instagram, whatsapp, HandlerContext};
use super::primitives::HumanizedDevice;
use crate::device::{DeviceError, DeviceSession};
use shadow_shared::{ActionKind, App, Point, ShadowCommand};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Per-command failures. None of these stop the dispatcher.
#[derive(Error, Debug)]
pub enum ActionError {
    #[error("unsupported action '{action}' for {app}")]
    Unsupported { app: App, action: String },

    #[error("required control '{control}' not found ({selector})")]
    ElementNotFound {
        control: &'static str,
        selector: String,
    },

    #[error("{action} requires '{field}'")]
    MissingField {
        action: &'static str,
        field: &'static str,
    },

    #[error("failed to bring {package} to the foreground (current: {foreground})")]
    LaunchFailed { package: String, foreground: String },

    #[error("step '{step}' timed out after {}ms", .after.as_millis())]
    StepTimeout { step: &'static str, after: Duration },

    #[error(transparent)]
    Device(#[from] DeviceError),
}

impl ActionError {
    /// True when the device itself went away, as opposed to the command failing
    pub fn is_connection_loss(&self) -> bool {
        matches!(
            self,
            ActionError::Device(DeviceError::Disconnected(_) | DeviceError::Unavailable(_))
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstagramAction {
    Like,
    Comment { text: Option<String> },
    Follow,
    Scroll,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WhatsAppAction {
    SendMessage { contact: String, body: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenericAction {
    Tap {
        at: Point,
        delay: Duration,
    },
    Swipe {
        from: Point,
        to: Point,
        duration: Duration,
        delay: Duration,
    },
    Type {
        text: String,
        field: Option<String>,
    },
}

/// Every supported `(app, action)` pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    Open(App),
    Instagram(InstagramAction),
    WhatsApp(WhatsAppAction),
    Generic(GenericAction),
}

impl Plan {
    /// Map a command onto a plan. Unknown pairs are `Unsupported`.
    pub fn resolve(cmd: &ShadowCommand) -> Result<Plan, ActionError> {
        let action = cmd.action.to_ascii_lowercase();

        let plan = match (cmd.app, action.as_str()) {
            (app, "open") if app.package().is_some() => Plan::Open(app),

            (App::Instagram, "like") => Plan::Instagram(InstagramAction::Like),
            (App::Instagram, "comment") => Plan::Instagram(InstagramAction::Comment {
                text: cmd.target.clone().or_else(|| cmd.text.clone()),
            }),
            (App::Instagram, "follow") => Plan::Instagram(InstagramAction::Follow),
            (App::Instagram, "scroll") => Plan::Instagram(InstagramAction::Scroll),

            (App::WhatsApp, "send_message") => Plan::WhatsApp(WhatsAppAction::SendMessage {
                contact: required(&cmd.target, "send_message", "target")?,
                body: required(&cmd.text, "send_message", "text")?,
            }),

            (App::Instagram | App::WhatsApp, _) => return Err(unsupported(cmd)),

            (_, "tap") => Plan::Generic(GenericAction::Tap {
                at: cmd.coordinates.ok_or(ActionError::MissingField {
                    action: "tap",
                    field: "coordinates",
                })?,
                delay: Duration::from_millis(cmd.delay_ms),
            }),
            (_, "swipe") => Plan::Generic(GenericAction::Swipe {
                from: cmd.coordinates.ok_or(ActionError::MissingField {
                    action: "swipe",
                    field: "coordinates",
                })?,
                to: cmd.end_coordinates.ok_or(ActionError::MissingField {
                    action: "swipe",
                    field: "end_coordinates",
                })?,
                duration: Duration::from_millis(cmd.duration_ms),
                delay: Duration::from_millis(cmd.delay_ms),
            }),
            (_, "type") => Plan::Generic(GenericAction::Type {
                text: required(&cmd.text, "type", "text")?,
                field: cmd.target.clone(),
            }),

            _ => return Err(unsupported(cmd)),
        };

        Ok(plan)
    }
}

fn required(
    value: &Option<String>,
    action: &'static str,
    field: &'static str,
) -> Result<String, ActionError> {
    value
        .clone()
        .filter(|v| !v.is_empty())
        .ok_or(ActionError::MissingField { action, field })
}

fn unsupported(cmd: &ShadowCommand) -> ActionError {
    ActionError::Unsupported {
        app: cmd.app,
        action: cmd.action.clone(),
    }
}

/// Runs commands against the single device session
pub struct ActionRouter<S> {
    device: HumanizedDevice<S>,
}

impl<S: DeviceSession> ActionRouter<S> {
    pub fn new(device: HumanizedDevice<S>) -> Self {
        Self { device }
    }

    /// Execute one command, returning its human-readable result
    pub async fn execute(&mut self, cmd: &ShadowCommand) -> Result<String, ActionError> {
        let plan = Plan::resolve(cmd)?;
        debug!("[ROUTER] {} -> {:?}", cmd.id, plan);

        let mut ctx = HandlerContext {
            command_id: &cmd.id,
            device: &mut self.device,
        };

        match plan {
            Plan::Open(app) => handlers::open_app(&mut ctx, app).await,

            Plan::Instagram(InstagramAction::Like) => instagram::like(&mut ctx).await,
            Plan::Instagram(InstagramAction::Comment { text }) => {
                instagram::comment(&mut ctx, text.as_deref()).await
            }
            Plan::Instagram(InstagramAction::Follow) => instagram::follow(&mut ctx).await,
            Plan::Instagram(InstagramAction::Scroll) => instagram::scroll(&mut ctx).await,

            Plan::WhatsApp(WhatsAppAction::SendMessage { contact, body }) => {
                whatsapp::send_message(&mut ctx, &contact, &body).await
            }

            Plan::Generic(GenericAction::Tap { at, delay }) => {
                generic::tap(&mut ctx, at, delay).await
            }
            Plan::Generic(GenericAction::Swipe {
                from,
                to,
                duration,
                delay,
            }) => generic::swipe(&mut ctx, from, to, duration, delay).await,
            Plan::Generic(GenericAction::Type { text, field }) => {
                generic::type_text(&mut ctx, &text, field.as_deref()).await
            }
        }
    }

    /// Idle one navigate delay before the next command
    pub async fn cool_down(&mut self) {
        self.device.pause(ActionKind::Navigate).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shadow_shared::CommandRequest;

    fn command(request: CommandRequest) -> ShadowCommand {
        ShadowCommand::from_request("cmd-1".into(), request, 0)
    }

    #[test]
    fn test_resolve_instagram_actions() {
        let like = command(CommandRequest::new(App::Instagram, "like"));
        assert_eq!(
            Plan::resolve(&like).unwrap(),
            Plan::Instagram(InstagramAction::Like)
        );

        let comment = command(CommandRequest::new(App::Instagram, "comment").with_target("nice"));
        assert_eq!(
            Plan::resolve(&comment).unwrap(),
            Plan::Instagram(InstagramAction::Comment {
                text: Some("nice".into())
            })
        );
    }

    #[test]
    fn test_resolve_is_case_insensitive_on_action() {
        let follow = command(CommandRequest::new(App::Instagram, "Follow"));
        assert_eq!(
            Plan::resolve(&follow).unwrap(),
            Plan::Instagram(InstagramAction::Follow)
        );
    }

    #[test]
    fn test_unknown_pair_is_unsupported() {
        let cmd = command(CommandRequest::new(App::Instagram, "dance"));
        assert!(matches!(
            Plan::resolve(&cmd),
            Err(ActionError::Unsupported { app: App::Instagram, .. })
        ));

        // Dedicated apps do not fall through to generic primitives
        let cmd = command(CommandRequest::new(App::WhatsApp, "tap").with_coordinates(1, 2));
        assert!(matches!(
            Plan::resolve(&cmd),
            Err(ActionError::Unsupported { .. })
        ));

        let cmd = command(CommandRequest::new(App::Generic, "open"));
        assert!(matches!(
            Plan::resolve(&cmd),
            Err(ActionError::Unsupported { .. })
        ));
    }

    #[test]
    fn test_send_message_requires_target_and_text() {
        let cmd = command(CommandRequest::new(App::WhatsApp, "send_message").with_text("hi"));
        assert!(matches!(
            Plan::resolve(&cmd),
            Err(ActionError::MissingField { field: "target", .. })
        ));
    }

    #[test]
    fn test_generic_primitives_on_any_app() {
        let cmd = command(
            CommandRequest::new(App::YouTube, "swipe")
                .with_coordinates(500, 1800)
                .with_end_coordinates(500, 600),
        );
        match Plan::resolve(&cmd).unwrap() {
            Plan::Generic(GenericAction::Swipe { from, to, duration, delay }) => {
                assert_eq!(from, Point::new(500, 1800));
                assert_eq!(to, Point::new(500, 600));
                assert_eq!(duration, Duration::from_millis(1000));
                assert_eq!(delay, Duration::from_millis(500));
            }
            other => panic!("unexpected plan {:?}", other),
        }

        let missing = command(CommandRequest::new(App::Generic, "tap"));
        assert!(matches!(
            Plan::resolve(&missing),
            Err(ActionError::MissingField { field: "coordinates", .. })
        ));
    }

    #[test]
    fn test_connection_loss_classification() {
        assert!(ActionError::Device(DeviceError::Disconnected("x".into())).is_connection_loss());
        assert!(!ActionError::Device(DeviceError::CommandFailed("x".into())).is_connection_loss());
        assert!(!ActionError::StepTimeout {
            step: "tap",
            after: Duration::from_secs(1)
        }
        .is_connection_loss());
    }
}
