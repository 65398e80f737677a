//! [`DetectorHealth`] – detector availability and freshness.
//!
//! A detector that failed to initialise is registered as unavailable and stays
//! that way for the session; any such detector puts the system in degraded
//! mode. Available detectors heartbeat each time inference completes (with or
//! without a person), and are reported [`DetectorStatus::Stale`] when they
//! have been silent for longer than their timeout.
//!
//! Time is passed in explicitly as a monotonic [`Duration`] so the same clock
//! drives detection, gestures and health.

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::warn;

/// Reason reported for a detector slot that was never filled.
pub const NOT_CONFIGURED: &str = "not configured";

/// Health reported for a single detector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectorStatus {
    /// Produced a result within its timeout.
    Healthy,
    /// Initialised, but no result within its timeout.
    Stale,
    /// Never initialised; carries the reason.
    Unavailable(String),
}

#[derive(Debug)]
enum Entry {
    Live { last_heartbeat: Duration, timeout: Duration },
    Unavailable(String),
}

/// Tracks heartbeats and availability of named detectors.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use avatar_kernel::health::{DetectorHealth, DetectorStatus};
///
/// let mut health = DetectorHealth::new();
/// health.register("body", Duration::from_secs(1), Duration::ZERO);
/// health.mark_unavailable("face", "model failed to load");
///
/// assert!(health.degraded());
/// assert_eq!(health.status("body", Duration::from_millis(500)), DetectorStatus::Healthy);
/// ```
#[derive(Debug, Default)]
pub struct DetectorHealth {
    detectors: BTreeMap<String, Entry>,
}

impl DetectorHealth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an initialised detector. Re-registering resets its deadline.
    pub fn register(&mut self, detector: &str, timeout: Duration, now: Duration) {
        self.detectors.insert(
            detector.to_string(),
            Entry::Live {
                last_heartbeat: now,
                timeout,
            },
        );
    }

    /// Hold a slot for a detector that has not been supplied yet. Counts as
    /// unavailable but, unlike [`mark_unavailable`](Self::mark_unavailable),
    /// logs nothing.
    pub fn mark_unconfigured(&mut self, detector: &str) {
        self.detectors
            .insert(detector.to_string(), Entry::Unavailable(NOT_CONFIGURED.to_string()));
    }

    /// Record that `detector` could not be initialised.
    pub fn mark_unavailable(&mut self, detector: &str, reason: &str) {
        warn!(detector, reason, "detector unavailable; running degraded");
        self.detectors
            .insert(detector.to_string(), Entry::Unavailable(reason.to_string()));
    }

    /// Record a completed inference. No-op for unknown or unavailable detectors.
    pub fn heartbeat(&mut self, detector: &str, now: Duration) {
        if let Some(Entry::Live { last_heartbeat, .. }) = self.detectors.get_mut(detector) {
            *last_heartbeat = now;
        }
    }

    /// Status of `detector` at `now`. Unknown detectors are unavailable.
    pub fn status(&self, detector: &str, now: Duration) -> DetectorStatus {
        match self.detectors.get(detector) {
            Some(Entry::Live {
                last_heartbeat,
                timeout,
            }) if now.saturating_sub(*last_heartbeat) <= *timeout => DetectorStatus::Healthy,
            Some(Entry::Live { .. }) => DetectorStatus::Stale,
            Some(Entry::Unavailable(reason)) => DetectorStatus::Unavailable(reason.clone()),
            None => DetectorStatus::Unavailable("not registered".to_string()),
        }
    }

    pub fn is_available(&self, detector: &str) -> bool {
        matches!(self.detectors.get(detector), Some(Entry::Live { .. }))
    }

    /// `true` if any registered detector failed to initialise, or none are
    /// registered at all.
    pub fn degraded(&self) -> bool {
        self.detectors.is_empty()
            || self
                .detectors
                .values()
                .any(|e| matches!(e, Entry::Unavailable(_)))
    }

    /// Names of detectors that are live but silent past their timeout.
    pub fn stale(&self, now: Duration) -> Vec<String> {
        self.detectors
            .keys()
            .filter(|name| self.status(name, now) == DetectorStatus::Stale)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn unconfigured_slot_is_degraded_until_registered() {
        let mut health = DetectorHealth::new();
        health.mark_unconfigured("face");
        assert!(health.degraded());
        assert_eq!(
            health.status("face", ms(0)),
            DetectorStatus::Unavailable(NOT_CONFIGURED.to_string())
        );
        health.register("face", ms(500), ms(0));
        assert!(!health.degraded());
    }

    #[test]
    fn fresh_detector_is_healthy() {
        let mut health = DetectorHealth::new();
        health.register("face", ms(500), ms(0));
        assert_eq!(health.status("face", ms(100)), DetectorStatus::Healthy);
        assert!(!health.degraded());
    }

    #[test]
    fn heartbeat_resets_deadline() {
        let mut health = DetectorHealth::new();
        health.register("body", ms(200), ms(0));
        health.heartbeat("body", ms(150));
        assert_eq!(health.status("body", ms(300)), DetectorStatus::Healthy);
        assert_eq!(health.status("body", ms(400)), DetectorStatus::Stale);
        assert_eq!(health.stale(ms(400)), vec!["body".to_string()]);
    }

    #[test]
    fn stale_is_not_degraded() {
        let mut health = DetectorHealth::new();
        health.register("face", ms(10), ms(0));
        assert_eq!(health.status("face", ms(1_000)), DetectorStatus::Stale);
        assert!(!health.degraded());
    }

    #[test]
    fn unavailable_detector_degrades() {
        let mut health = DetectorHealth::new();
        health.register("body", ms(500), ms(0));
        health.mark_unavailable("face", "wasm init failed");
        assert!(health.degraded());
        assert!(!health.is_available("face"));
        assert!(health.is_available("body"));
        assert_eq!(
            health.status("face", ms(0)),
            DetectorStatus::Unavailable("wasm init failed".to_string())
        );
    }

    #[test]
    fn heartbeat_cannot_revive_unavailable_detector() {
        let mut health = DetectorHealth::new();
        health.mark_unavailable("face", "no model");
        health.heartbeat("face", ms(10));
        assert!(!health.is_available("face"));
    }

    #[test]
    fn nothing_registered_is_degraded() {
        let health = DetectorHealth::new();
        assert!(health.degraded());
        assert!(matches!(health.status("ghost", ms(0)), DetectorStatus::Unavailable(_)));
    }
}
