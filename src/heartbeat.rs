// src/heartbeat.rs

use std::time::{Duration, Instant};

/// Default mute threshold when the caller never sets one.
pub const DEFAULT_HEARTBEAT_THRESHOLD: Duration = Duration::from_millis(500);

/// Dead-man switch for playback: the host signals liveness periodically, and
/// the mixing callback asks `should_mute` on every pull. Kept separate from
/// the mixing path so the policy is testable with synthetic instants.
pub struct Heartbeat {
    enabled: bool,
    threshold: Duration,
    last_signal: Instant,
}

impl Heartbeat {
    pub fn new(now: Instant) -> Self {
        Self {
            enabled: false,
            threshold: DEFAULT_HEARTBEAT_THRESHOLD,
            last_signal: now,
        }
    }

    /// Arm or disarm the watchdog. A `threshold_ms` of 0 keeps the previous
    /// threshold. Arming stamps `last_signal` so playback gets one full
    /// threshold of grace before the first signal is due.
    pub fn set_active(&mut self, active: bool, threshold_ms: u64, now: Instant) {
        if threshold_ms != 0 {
            self.threshold = Duration::from_millis(threshold_ms);
        }
        if active && !self.enabled {
            self.last_signal = now;
        }
        self.enabled = active;
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Record one liveness signal.
    pub fn signal(&mut self, now: Instant) {
        self.last_signal = now;
    }

    /// True when liveness has been lost: armed and no signal within the
    /// threshold.
    pub fn should_mute(&self, now: Instant) -> bool {
        self.enabled && now.duration_since(self.last_signal) > self.threshold
    }

    #[cfg(test)]
    pub(crate) fn last_signal(&self) -> Instant {
        self.last_signal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_never_mutes() {
        let t0 = Instant::now();
        let hb = Heartbeat::new(t0);
        assert!(!hb.should_mute(t0 + Duration::from_secs(3600)));
    }

    #[test]
    fn test_mutes_only_past_threshold() {
        let t0 = Instant::now();
        let mut hb = Heartbeat::new(t0);
        hb.set_active(true, 100, t0);

        assert!(!hb.should_mute(t0 + Duration::from_millis(50)));
        assert!(!hb.should_mute(t0 + Duration::from_millis(100)));
        assert!(hb.should_mute(t0 + Duration::from_millis(101)));
    }

    #[test]
    fn test_signal_restores_liveness() {
        let t0 = Instant::now();
        let mut hb = Heartbeat::new(t0);
        hb.set_active(true, 100, t0);

        let late = t0 + Duration::from_millis(500);
        assert!(hb.should_mute(late));

        hb.signal(late);
        assert!(!hb.should_mute(late + Duration::from_millis(50)));
    }

    #[test]
    fn test_zero_threshold_keeps_previous() {
        let t0 = Instant::now();
        let mut hb = Heartbeat::new(t0);
        hb.set_active(true, 250, t0);
        hb.set_active(true, 0, t0);
        assert_eq!(hb.threshold(), Duration::from_millis(250));

        hb.set_active(false, 0, t0);
        hb.set_active(true, 0, t0);
        assert_eq!(hb.threshold(), Duration::from_millis(250));
    }

    #[test]
    fn test_rearming_grants_a_fresh_grace_period() {
        let t0 = Instant::now();
        let mut hb = Heartbeat::new(t0);
        hb.set_active(true, 100, t0);
        hb.set_active(false, 0, t0);

        let later = t0 + Duration::from_secs(10);
        hb.set_active(true, 0, later);
        assert!(!hb.should_mute(later + Duration::from_millis(50)));
    }
}
