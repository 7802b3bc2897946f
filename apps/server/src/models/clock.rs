//! Playback clock model
//!
//! The clock stores the last position somebody set and the instant playback
//! started from it. The current playhead is derived on every read; nothing
//! ticks in the background. Every play, pause or seek re-anchors the clock
//! with a single override.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A playback position in milliseconds, always finite and non-negative
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Playhead(f64);

/// Raised for negative, NaN or infinite positions
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("playhead must be a finite, non-negative number of milliseconds (got {0})")]
pub struct InvalidPlayhead(pub f64);

impl Playhead {
    pub const ZERO: Playhead = Playhead(0.0);

    pub fn new(millis: f64) -> Result<Self, InvalidPlayhead> {
        if millis.is_finite() && millis >= 0.0 {
            Ok(Self(millis))
        } else {
            Err(InvalidPlayhead(millis))
        }
    }

    pub fn as_millis(self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for Playhead {
    type Error = InvalidPlayhead;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Playhead> for f64 {
    fn from(playhead: Playhead) -> Self {
        playhead.0
    }
}

/// Last known position plus the instant playback resumed from it
///
/// `playing_since == None` means paused.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlaybackClock {
    last_known: Playhead,
    playing_since: Option<DateTime<Utc>>,
}

impl PlaybackClock {
    /// A paused clock at position zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically seek and set play/pause state, anchored at `at`
    pub fn apply_override(&mut self, position: Playhead, paused: bool, at: DateTime<Utc>) {
        self.last_known = position;
        self.playing_since = if paused { None } else { Some(at) };
    }

    /// Back to `{0, paused}`
    pub fn reset(&mut self) {
        self.last_known = Playhead::ZERO;
        self.playing_since = None;
    }

    pub fn paused(&self) -> bool {
        self.playing_since.is_none()
    }

    /// Position at `now`. A `now` earlier than the anchor counts as no elapsed time.
    pub fn current_position(&self, now: DateTime<Utc>) -> Playhead {
        match self.playing_since {
            Some(since) => {
                let elapsed = (now - since)
                    .num_microseconds()
                    .map(|micros| micros as f64 / 1_000.0)
                    .unwrap_or_else(|| (now - since).num_milliseconds() as f64)
                    .max(0.0);
                Playhead(self.last_known.0 + elapsed)
            }
            None => self.last_known,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rstest::rstest;

    fn ms(value: f64) -> Playhead {
        Playhead::new(value).unwrap()
    }

    #[rstest]
    #[case(-1.0)]
    #[case(f64::NAN)]
    #[case(f64::INFINITY)]
    #[case(f64::NEG_INFINITY)]
    fn test_invalid_playheads_rejected(#[case] value: f64) {
        assert!(Playhead::new(value).is_err());
    }

    #[test]
    fn test_new_clock_is_paused_at_zero() {
        let clock = PlaybackClock::new();
        assert!(clock.paused());
        assert_eq!(clock.current_position(Utc::now()), Playhead::ZERO);
    }

    #[test]
    fn test_paused_clock_is_constant() {
        let start = Utc::now();
        let mut clock = PlaybackClock::new();
        clock.apply_override(ms(1_500.0), true, start);

        for offset in [0, 10, 1_000, 60_000] {
            let now = start + Duration::milliseconds(offset);
            assert_eq!(clock.current_position(now), ms(1_500.0));
        }
    }

    #[test]
    fn test_playing_clock_advances_monotonically() {
        let start = Utc::now();
        let mut clock = PlaybackClock::new();
        clock.apply_override(ms(5_000.0), false, start);

        let mut previous = clock.current_position(start);
        assert_eq!(previous, ms(5_000.0));
        for offset in [1, 2, 250, 1_000, 90_000] {
            let position = clock.current_position(start + Duration::milliseconds(offset));
            assert!(position >= previous);
            previous = position;
        }
        assert_eq!(previous, ms(95_000.0));
    }

    #[test]
    fn test_override_while_playing_seeks_and_pauses() {
        let start = Utc::now();
        let mut clock = PlaybackClock::new();
        clock.apply_override(ms(0.0), false, start);

        let later = start + Duration::seconds(3);
        clock.apply_override(ms(42.0), true, later);
        assert!(clock.paused());
        assert_eq!(
            clock.current_position(later + Duration::seconds(10)),
            ms(42.0)
        );
    }

    #[test]
    fn test_now_before_anchor_counts_as_zero_elapsed() {
        let start = Utc::now();
        let mut clock = PlaybackClock::new();
        clock.apply_override(ms(100.0), false, start);
        assert_eq!(
            clock.current_position(start - Duration::seconds(1)),
            ms(100.0)
        );
    }

    #[test]
    fn test_reset() {
        let mut clock = PlaybackClock::new();
        clock.apply_override(ms(100.0), false, Utc::now());
        clock.reset();
        assert!(clock.paused());
        assert_eq!(clock.current_position(Utc::now()), Playhead::ZERO);
    }

    #[test]
    fn test_playhead_deserialization_rejects_negative() {
        assert!(serde_json::from_str::<Playhead>("-5").is_err());
        assert_eq!(serde_json::from_str::<Playhead>("5000").unwrap(), ms(5_000.0));
    }
}
