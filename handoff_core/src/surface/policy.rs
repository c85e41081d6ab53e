// Copyright 2026 the Handoff Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use super::BeginFrameArgs;
use crate::time::{Duration, HostTime};

/// Decides whether a skipped BeginFrame is still fresh enough to hand to a
/// client whose demand arrived late.
///
/// Passed to the [`OutputSurface`](super::OutputSurface) via
/// [`OutputSurfaceConfig::retroactive_policy`](super::OutputSurfaceConfig::retroactive_policy).
#[derive(Clone, Copy, Debug, Default)]
pub enum RetroactivePolicy {
    /// Never replay a skipped BeginFrame; wait for the next tick.
    Disabled,
    /// Replay until half an interval past the skipped frame time.
    #[default]
    HalfInterval,
    /// Replay until a fixed span past the skipped frame time.
    Window(Duration),
    /// Ask a caller-supplied predicate.
    Custom(fn(&BeginFrameArgs, HostTime) -> bool),
}

impl RetroactivePolicy {
    /// Returns `true` if `skipped` may still be delivered at `now`.
    #[must_use]
    pub fn is_satisfied(&self, skipped: &BeginFrameArgs, now: HostTime) -> bool {
        match *self {
            Self::Disabled => false,
            Self::HalfInterval => {
                now < skipped
                    .frame_time
                    .saturating_add(skipped.interval.div(2))
            }
            Self::Window(window) => now < skipped.frame_time.saturating_add(window),
            Self::Custom(predicate) => predicate(skipped, now),
        }
    }

    /// Returns `true` unless the policy is [`Disabled`](Self::Disabled).
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        !matches!(self, Self::Disabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn skipped_at(t: u64) -> BeginFrameArgs {
        BeginFrameArgs::for_interval(HostTime(t), Duration(1_000))
    }

    #[test]
    fn half_interval_window_is_exclusive() {
        let policy = RetroactivePolicy::HalfInterval;
        let skipped = skipped_at(2_000);
        assert!(policy.is_satisfied(&skipped, HostTime(2_000)));
        assert!(policy.is_satisfied(&skipped, HostTime(2_499)));
        assert!(!policy.is_satisfied(&skipped, HostTime(2_500)));
    }

    #[test]
    fn fixed_window() {
        let policy = RetroactivePolicy::Window(Duration(100));
        assert!(policy.is_satisfied(&skipped_at(0), HostTime(99)));
        assert!(!policy.is_satisfied(&skipped_at(0), HostTime(100)));
    }

    #[test]
    fn disabled_never_replays() {
        let policy = RetroactivePolicy::Disabled;
        assert!(!policy.is_enabled());
        assert!(!policy.is_satisfied(&skipped_at(0), HostTime(0)));
    }

    #[test]
    fn custom_predicate_is_consulted() {
        fn before_deadline(args: &BeginFrameArgs, now: HostTime) -> bool {
            now <= args.deadline
        }
        let policy = RetroactivePolicy::Custom(before_deadline);
        assert!(policy.is_enabled());
        assert!(policy.is_satisfied(&skipped_at(0), HostTime(1_000)));
        assert!(!policy.is_satisfied(&skipped_at(0), HostTime(1_001)));
    }
}
