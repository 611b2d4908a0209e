//! Humanization Policy
//!
//! Randomized delays and coordinate jitter that make scripted input look
//! like a person using the phone. Pure apart from the caller's RNG.

use crate::Point;
use rand::Rng;
use std::time::Duration;

/// Constant delay when shadow mode is off
pub const DISABLED_DELAY_MS: u64 = 100;

/// Chance of layering a hesitation pause on top of a delay
pub const HESITATION_PROBABILITY: f64 = 0.3;

/// Bounds of the hesitation pause
pub const HESITATION_RANGE_MS: (u64, u64) = (200, 1000);

/// Per-axis coordinate jitter, in pixels
pub const JITTER_PX: i32 = 15;

/// Bounds of the delay between two typed characters
pub const KEYSTROKE_RANGE_MS: (u64, u64) = (50, 300);

/// Bounds of the pause between repeated actions on a feed (e.g. successive likes)
pub const INTER_ACTION_PAUSE_MS: (u64, u64) = (2000, 5000);

/// Kinds of device interaction with their own timing profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Tap,
    Swipe,
    Type,
    Scroll,
    Navigate,
}

impl ActionKind {
    /// Base delay range in milliseconds (inclusive)
    pub fn range_ms(self) -> (u64, u64) {
        match self {
            ActionKind::Tap => (50, 200),
            ActionKind::Swipe => (200, 800),
            ActionKind::Type => (50, 300),
            ActionKind::Scroll => (100, 500),
            ActionKind::Navigate => (500, 2000),
        }
    }
}

/// Timing and jitter generator, toggled by shadow mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HumanizationPolicy {
    shadow_mode: bool,
}

impl HumanizationPolicy {
    pub fn new(shadow_mode: bool) -> Self {
        Self { shadow_mode }
    }

    pub fn enabled() -> Self {
        Self::new(true)
    }

    pub fn disabled() -> Self {
        Self::new(false)
    }

    pub fn is_enabled(&self) -> bool {
        self.shadow_mode
    }

    /// Delay to wait around an action of the given kind
    pub fn delay<R: Rng + ?Sized>(&self, kind: ActionKind, rng: &mut R) -> Duration {
        if !self.shadow_mode {
            return Duration::from_millis(DISABLED_DELAY_MS);
        }

        let (min, max) = kind.range_ms();
        let mut millis = rng.gen_range(min..=max);

        if rng.gen_bool(HESITATION_PROBABILITY) {
            let (lo, hi) = HESITATION_RANGE_MS;
            millis += rng.gen_range(lo..=hi);
        }

        Duration::from_millis(millis)
    }

    /// Delay between two typed characters (no hesitation layer)
    pub fn keystroke_delay<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if !self.shadow_mode {
            return Duration::ZERO;
        }
        let (min, max) = KEYSTROKE_RANGE_MS;
        Duration::from_millis(rng.gen_range(min..=max))
    }

    /// Perturb a tap/swipe endpoint by up to `JITTER_PX` per axis, never below zero
    pub fn jitter<R: Rng + ?Sized>(&self, point: Point, rng: &mut R) -> Point {
        if !self.shadow_mode {
            return point;
        }

        let dx = rng.gen_range(-JITTER_PX..=JITTER_PX);
        let dy = rng.gen_range(-JITTER_PX..=JITTER_PX);

        Point {
            x: point.x.saturating_add(dx).max(0),
            y: point.y.saturating_add(dy).max(0),
        }
    }

    /// Pause between repeated feed actions. Applied in both modes.
    pub fn inter_action_pause<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let (min, max) = INTER_ACTION_PAUSE_MS;
        Duration::from_millis(rng.gen_range(min..=max))
    }
}

impl Default for HumanizationPolicy {
    fn default() -> Self {
        Self::enabled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const SAMPLES: usize = 10_000;

    #[test]
    fn test_disabled_delay_is_constant() {
        let policy = HumanizationPolicy::disabled();
        let mut rng = StdRng::seed_from_u64(1);

        for _ in 0..SAMPLES {
            assert_eq!(policy.delay(ActionKind::Tap, &mut rng), Duration::from_millis(100));
        }
    }

    #[test]
    fn test_enabled_tap_delay_bounds() {
        let policy = HumanizationPolicy::enabled();
        let mut rng = StdRng::seed_from_u64(2);
        let (lo, hi) = ActionKind::Tap.range_ms();
        let (_, extra_hi) = HESITATION_RANGE_MS;

        let mut plain = 0;
        let mut hesitated = 0;

        for _ in 0..SAMPLES {
            let ms = policy.delay(ActionKind::Tap, &mut rng).as_millis() as u64;
            assert!(ms >= lo && ms <= hi + extra_hi, "tap delay {} out of bounds", ms);
            if ms <= hi {
                plain += 1;
            }
            if ms > hi {
                hesitated += 1;
            }
        }

        // Roughly 30% of samples carry the hesitation layer
        assert!(hesitated > SAMPLES / 5 && hesitated < SAMPLES * 2 / 5);
        assert!(plain > SAMPLES / 2);
    }

    #[test]
    fn test_every_kind_respects_its_range() {
        let policy = HumanizationPolicy::enabled();
        let mut rng = StdRng::seed_from_u64(3);

        for kind in [
            ActionKind::Tap,
            ActionKind::Swipe,
            ActionKind::Type,
            ActionKind::Scroll,
            ActionKind::Navigate,
        ] {
            let (lo, hi) = kind.range_ms();
            for _ in 0..1000 {
                let ms = policy.delay(kind, &mut rng).as_millis() as u64;
                assert!(ms >= lo && ms <= hi + HESITATION_RANGE_MS.1, "{:?}: {}", kind, ms);
            }
        }
    }

    #[test]
    fn test_disabled_jitter_is_identity() {
        let policy = HumanizationPolicy::disabled();
        let mut rng = StdRng::seed_from_u64(4);
        let p = Point::new(540, 1200);
        for _ in 0..1000 {
            assert_eq!(policy.jitter(p, &mut rng), p);
        }
    }

    #[test]
    fn test_jitter_clamps_at_origin() {
        let policy = HumanizationPolicy::enabled();
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..1000 {
            let p = policy.jitter(Point::new(0, 3), &mut rng);
            assert!(p.x >= 0 && p.y >= 0);
            assert!(p.x <= JITTER_PX && p.y <= 3 + JITTER_PX);
        }
    }

    #[test]
    fn test_inter_action_pause_bounds() {
        let mut rng = StdRng::seed_from_u64(6);
        for policy in [HumanizationPolicy::enabled(), HumanizationPolicy::disabled()] {
            for _ in 0..1000 {
                let pause = policy.inter_action_pause(&mut rng);
                assert!(pause >= Duration::from_secs(2) && pause <= Duration::from_secs(5));
            }
        }
    }

    #[test]
    fn test_keystroke_delay() {
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(
            HumanizationPolicy::disabled().keystroke_delay(&mut rng),
            Duration::ZERO
        );
        for _ in 0..1000 {
            let ms = HumanizationPolicy::enabled()
                .keystroke_delay(&mut rng)
                .as_millis() as u64;
            assert!((50..=300).contains(&ms));
        }
    }

    proptest! {
        #[test]
        fn prop_jitter_bounds(x in 0i32..10_000, y in 0i32..10_000, seed in any::<u64>()) {
            let policy = HumanizationPolicy::enabled();
            let mut rng = StdRng::seed_from_u64(seed);
            let p = policy.jitter(Point::new(x, y), &mut rng);

            prop_assert!((p.x - x).abs() <= JITTER_PX);
            prop_assert!((p.y - y).abs() <= JITTER_PX);
            prop_assert!(p.x >= 0 && p.y >= 0);
        }
    }
}
