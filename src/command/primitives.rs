//! Humanized device primitives
//!
//! Wraps a [`DeviceSession`] so that every tap, swipe and keystroke goes
//! through the humanization policy, and every device call is bounded by the
//! step timeout. Shadow mode sits behind a shared [`ShadowSwitch`] and is
//! re-read on every step, so it can be flipped while the engine runs.

use super::ActionError;
use crate::device::{DeviceError, DeviceSession, ElementMatch, ScreenInfo, Selector};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shadow_shared::{timing, ActionKind, HumanizationPolicy, Point};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, sleep_until, timeout, Instant};

/// Shared shadow-mode flag
#[derive(Debug, Clone)]
pub struct ShadowSwitch(Arc<AtomicBool>);

impl ShadowSwitch {
    pub fn new(enabled: bool) -> Self {
        Self(Arc::new(AtomicBool::new(enabled)))
    }

    pub fn set(&self, enabled: bool) {
        self.0.store(enabled, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn policy(&self) -> HumanizationPolicy {
        HumanizationPolicy::new(self.is_enabled())
    }
}

impl From<HumanizationPolicy> for ShadowSwitch {
    fn from(policy: HumanizationPolicy) -> Self {
        Self::new(policy.is_enabled())
    }
}

/// A device session plus the timing policy applied around each call
pub struct HumanizedDevice<S> {
    session: S,
    shadow: ShadowSwitch,
    rng: StdRng,
    step_timeout: Duration,
}

impl<S: DeviceSession> HumanizedDevice<S> {
    pub fn new(session: S, shadow: impl Into<ShadowSwitch>, step_timeout: Duration) -> Self {
        Self {
            session,
            shadow: shadow.into(),
            rng: StdRng::from_entropy(),
            step_timeout,
        }
    }

    /// Replace the random source, for reproducible runs
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    fn policy(&self) -> HumanizationPolicy {
        self.shadow.policy()
    }

    async fn step<T>(
        &self,
        name: &'static str,
        call: impl Future<Output = Result<T, DeviceError>>,
    ) -> Result<T, ActionError> {
        match timeout(self.step_timeout, call).await {
            Ok(result) => result.map_err(ActionError::from),
            Err(_) => Err(ActionError::StepTimeout {
                step: name,
                after: self.step_timeout,
            }),
        }
    }

    /// Sleep for one humanized delay of the given kind
    pub async fn pause(&mut self, kind: ActionKind) {
        let delay = self.policy().delay(kind, &mut self.rng);
        sleep(delay).await;
    }

    /// Fixed wait for a screen or field to settle
    pub async fn settle(&self) {
        sleep(Duration::from_millis(timing::SETTLE_MS)).await;
    }

    /// Sleep until one inter-action pause has passed since `since`
    pub async fn pace_from(&mut self, since: Instant) {
        let pause = self.policy().inter_action_pause(&mut self.rng);
        sleep_until(since + pause).await;
    }

    /// Caller-requested wait, outside the humanization policy
    pub async fn wait(&self, delay: Duration) {
        if !delay.is_zero() {
            sleep(delay).await;
        }
    }

    /// Launch `package` and check it reached the foreground
    pub async fn launch(&mut self, package: &str) -> Result<(), ActionError> {
        self.step("launch", self.session.launch_app(package)).await?;
        self.pause(ActionKind::Navigate).await;

        let foreground = self.step("current app", self.session.current_app()).await?;
        if foreground != package {
            return Err(ActionError::LaunchFailed {
                package: package.to_string(),
                foreground,
            });
        }
        Ok(())
    }

    pub async fn tap(&mut self, at: Point) -> Result<(), ActionError> {
        self.pause(ActionKind::Tap).await;
        self.tap_once(at).await?;
        self.pause(ActionKind::Tap).await;
        Ok(())
    }

    /// Jittered tap with no delay on either side. Returns when it was sent.
    pub async fn tap_once(&mut self, at: Point) -> Result<Instant, ActionError> {
        let at = self.policy().jitter(at, &mut self.rng);
        let sent = Instant::now();
        self.step("tap", self.session.tap(at)).await?;
        Ok(sent)
    }

    pub async fn swipe(
        &mut self,
        from: Point,
        to: Point,
        duration: Duration,
        kind: ActionKind,
    ) -> Result<(), ActionError> {
        self.pause(kind).await;
        let policy = self.policy();
        let from = policy.jitter(from, &mut self.rng);
        let to = policy.jitter(to, &mut self.rng);
        self.step("swipe", self.session.swipe(from, to, duration)).await?;
        self.pause(kind).await;
        Ok(())
    }

    /// Clear the focused field, then type into it.
    ///
    /// In shadow mode characters go out one at a time with a keystroke delay.
    pub async fn type_text(&mut self, text: &str) -> Result<(), ActionError> {
        self.step("clear text", self.session.clear_text()).await?;

        let policy = self.policy();
        if policy.is_enabled() {
            let mut buf = [0u8; 4];
            for ch in text.chars() {
                let key: &str = ch.encode_utf8(&mut buf);
                self.step("type", self.session.type_text(key)).await?;
                let delay = policy.keystroke_delay(&mut self.rng);
                sleep(delay).await;
            }
        } else {
            self.step("type", self.session.type_text(text)).await?;
        }

        self.pause(ActionKind::Type).await;
        Ok(())
    }

    pub async fn locate(&self, selector: &Selector) -> Result<ElementMatch, ActionError> {
        self.step("locate", self.session.locate(selector)).await
    }

    /// Center of the first element matching `selector`, or `ElementNotFound`
    pub async fn require(
        &self,
        selector: &Selector,
        control: &'static str,
    ) -> Result<Point, ActionError> {
        self.locate(selector)
            .await?
            .center()
            .ok_or_else(|| ActionError::ElementNotFound {
                control,
                selector: selector.to_string(),
            })
    }

    pub async fn screen_info(&self) -> Result<ScreenInfo, ActionError> {
        self.step("screen info", self.session.screen_info()).await
    }
}
