//! Orientation Smoother – continuous head tracking.
//!
//! Runs once per frame and eases the head towards a target orientation:
//!
//! | Situation            | Target                                   | Factor |
//! |----------------------|------------------------------------------|--------|
//! | gesture active       | *(tick skipped entirely)*                | –      |
//! | person present       | `(y · 0.2, x · 0.3)`                     | 0.15   |
//! | nobody present       | `(sin(0.7 t) · 0.1, sin(0.5 t) · 0.2)`   | 0.05   |
//!
//! with `t = now_ms / 3000`. The filter is a per-axis exponential low-pass
//! `current += (target − current) · factor`, so it never overshoots.
//!
//! When the person is near (`proximity`), the smoothed value still advances
//! but the head is driven directly by the mapped face position
//! (`rotation.y = x · 0.6`, `rotation.x = y · 0.4`) for responsive mimicry.
//!
//! Orientations are `(pitch, yaw)` pairs applied to the head's rotation `x`
//! and `y`; the head's roll is left alone.

use std::time::Duration;

use avatar_hal::scene::Scene;
use avatar_types::{NodeId, TrackingState};
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

/// Gains, factors and idle-wander shape.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmootherConfig {
    pub tracking_pitch_gain: f32,
    pub tracking_yaw_gain: f32,
    pub tracking_factor: f32,
    pub idle_factor: f32,
    /// Wall-clock divisor (ms) for the idle-wander phase.
    pub idle_period_ms: f32,
    pub idle_pitch_frequency: f32,
    pub idle_yaw_frequency: f32,
    pub idle_pitch_amplitude: f32,
    pub idle_yaw_amplitude: f32,
    pub mimic_yaw_gain: f32,
    pub mimic_pitch_gain: f32,
}

impl Default for SmootherConfig {
    fn default() -> Self {
        Self {
            tracking_pitch_gain: 0.2,
            tracking_yaw_gain: 0.3,
            tracking_factor: 0.15,
            idle_factor: 0.05,
            idle_period_ms: 3000.0,
            idle_pitch_frequency: 0.7,
            idle_yaw_frequency: 0.5,
            idle_pitch_amplitude: 0.1,
            idle_yaw_amplitude: 0.2,
            mimic_yaw_gain: 0.6,
            mimic_pitch_gain: 0.4,
        }
    }
}

/// Head orientation as `(pitch, yaw)` in radians.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Orientation {
    pub pitch: f32,
    pub yaw: f32,
}

impl Orientation {
    pub fn new(pitch: f32, yaw: f32) -> Self {
        Self { pitch, yaw }
    }
}

/// Current and target orientation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SmoothingState {
    pub current: Orientation,
    pub target: Orientation,
}

/// What the smoother did on one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmootherMode {
    /// A gesture owns the rig; nothing was touched.
    Suspended,
    Tracking,
    /// Near person: head written from the raw face position.
    Mimic,
    Idle,
}

/// The per-frame head tracker.
#[derive(Debug, Default)]
pub struct OrientationSmoother {
    config: SmootherConfig,
    state: SmoothingState,
    head_warned: bool,
}

impl OrientationSmoother {
    pub fn new(config: SmootherConfig) -> Self {
        Self {
            config,
            state: SmoothingState::default(),
            head_warned: false,
        }
    }

    pub fn state(&self) -> SmoothingState {
        self.state
    }

    /// Forget that the missing head was already reported (call on scene load).
    pub fn reset_head_warning(&mut self) {
        self.head_warned = false;
    }

    /// Idle-wander target at `now`.
    pub fn idle_target(&self, now: Duration) -> Orientation {
        let c = &self.config;
        let t = now.as_secs_f32() * 1000.0 / c.idle_period_ms;
        Orientation::new(
            (t * c.idle_pitch_frequency).sin() * c.idle_pitch_amplitude,
            (t * c.idle_yaw_frequency).sin() * c.idle_yaw_amplitude,
        )
    }

    /// Advance one frame.
    ///
    /// `gesture_active` is the write token: while it is `true` the smoother
    /// neither moves its state nor writes the head.
    pub fn tick(
        &mut self,
        tracking: &TrackingState,
        gesture_active: bool,
        now: Duration,
        scene: &mut dyn Scene,
        head: Option<NodeId>,
    ) -> SmootherMode {
        if gesture_active {
            return SmootherMode::Suspended;
        }

        let c = self.config;
        let (target, factor, mode) = if tracking.presence {
            let target = Orientation::new(tracking.y * c.tracking_pitch_gain, tracking.x * c.tracking_yaw_gain);
            let mode = if tracking.proximity {
                SmootherMode::Mimic
            } else {
                SmootherMode::Tracking
            };
            (target, c.tracking_factor, mode)
        } else {
            (self.idle_target(now), c.idle_factor, SmootherMode::Idle)
        };

        self.state.target = target;
        let cur = &mut self.state.current;
        cur.pitch += (target.pitch - cur.pitch) * factor;
        cur.yaw += (target.yaw - cur.yaw) * factor;

        let applied = if mode == SmootherMode::Mimic {
            Orientation::new(tracking.y * c.mimic_pitch_gain, tracking.x * c.mimic_yaw_gain)
        } else {
            self.state.current
        };

        self.apply(scene, head, applied);
        trace!(?mode, pitch = applied.pitch, yaw = applied.yaw, "head tick");
        mode
    }

    fn apply(&mut self, scene: &mut dyn Scene, head: Option<NodeId>, o: Orientation) {
        let Some(head) = head else {
            if !self.head_warned {
                warn!("no head joint in scene; head tracking disabled");
                self.head_warned = true;
            }
            return;
        };
        let Some(mut rotation) = scene.rotation(head) else {
            if !self.head_warned {
                warn!(node = %head, "head joint vanished from scene");
                self.head_warned = true;
            }
            return;
        };
        rotation.x = o.pitch;
        rotation.y = o.yaw;
        if let Err(e) = scene.set_rotation(head, rotation) {
            warn!(node = %head, error = %e, "head rotation write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use avatar_hal::sim::SimScene;
    use avatar_types::Vec3;

    fn rig() -> (SimScene, Option<NodeId>) {
        let scene = SimScene::new().with_node("Head", Vec3::new(0.0, 0.0, 0.25));
        (scene, Some(NodeId(0)))
    }

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn tracking_target_and_single_step() {
        let (mut scene, head) = rig();
        let mut s = OrientationSmoother::default();
        let tracking = TrackingState::body(0.5, -0.5);
        assert_eq!(s.tick(&tracking, false, ms(0), &mut scene, head), SmootherMode::Tracking);
        let st = s.state();
        assert!((st.target.pitch - -0.1).abs() < 1e-6);
        assert!((st.target.yaw - 0.15).abs() < 1e-6);
        assert!((st.current.yaw - 0.15 * 0.15).abs() < 1e-6);
        let r = scene.rotation(NodeId(0)).unwrap();
        assert_eq!(r.y, st.current.yaw);
        // Roll untouched.
        assert_eq!(r.z, 0.25);
    }

    #[test]
    fn converges_within_bounded_ticks() {
        let (mut scene, head) = rig();
        let mut s = OrientationSmoother::default();
        let tracking = TrackingState::body(1.0, 1.0);
        // (1 - 0.15)^n < 0.01 ⇒ n ≥ 29.
        for _ in 0..29 {
            s.tick(&tracking, false, ms(0), &mut scene, head);
        }
        let st = s.state();
        assert!((st.current.yaw - st.target.yaw).abs() <= 0.01 * st.target.yaw.abs());
        assert!((st.current.pitch - st.target.pitch).abs() <= 0.01 * st.target.pitch.abs());
    }

    #[test]
    fn never_overshoots() {
        let (mut scene, head) = rig();
        let mut s = OrientationSmoother::default();
        let tracking = TrackingState::body(1.0, 0.0);
        let mut last = 0.0;
        for _ in 0..200 {
            s.tick(&tracking, false, ms(0), &mut scene, head);
            let yaw = s.state().current.yaw;
            assert!(yaw >= last && yaw <= 0.3 + 1e-6);
            last = yaw;
        }
    }

    #[test]
    fn idle_wander_follows_clock() {
        let (mut scene, head) = rig();
        let mut s = OrientationSmoother::default();
        let now = ms(4_500);
        assert_eq!(s.tick(&TrackingState::absent(), false, now, &mut scene, head), SmootherMode::Idle);
        let t = 1.5_f32;
        let st = s.state();
        assert!((st.target.pitch - (t * 0.7).sin() * 0.1).abs() < 1e-6);
        assert!((st.target.yaw - (t * 0.5).sin() * 0.2).abs() < 1e-6);
        assert!((st.current.yaw - st.target.yaw * 0.05).abs() < 1e-6);
    }

    #[test]
    fn idle_resumes_the_tick_presence_drops() {
        let (mut scene, head) = rig();
        let mut s = OrientationSmoother::default();
        let present = TrackingState::body(0.2, 0.0);
        for i in 0..10 {
            assert_ne!(s.tick(&present, false, ms(i * 16), &mut scene, head), SmootherMode::Idle);
        }
        assert_eq!(s.tick(&TrackingState::absent(), false, ms(160), &mut scene, head), SmootherMode::Idle);
    }

    #[test]
    fn proximity_mimics_raw_position() {
        let (mut scene, head) = rig();
        let mut s = OrientationSmoother::default();
        let near = TrackingState::face(0.5, -0.25, true);
        assert_eq!(s.tick(&near, false, ms(0), &mut scene, head), SmootherMode::Mimic);
        let r = scene.rotation(NodeId(0)).unwrap();
        assert!((r.y - 0.3).abs() < 1e-6);
        assert!((r.x - -0.1).abs() < 1e-6);
        // Smoothed state kept moving underneath.
        assert!(s.state().current.yaw > 0.0);
    }

    #[test]
    fn gesture_token_suspends_everything() {
        let (mut scene, head) = rig();
        let mut s = OrientationSmoother::default();
        let before = s.state();
        let mode = s.tick(&TrackingState::body(1.0, 1.0), true, ms(0), &mut scene, head);
        assert_eq!(mode, SmootherMode::Suspended);
        assert_eq!(s.state(), before);
        assert_eq!(scene.write_count(), 0);
    }

    #[test]
    fn missing_head_keeps_ticking() {
        let mut scene = SimScene::new();
        let mut s = OrientationSmoother::default();
        for i in 0..3 {
            s.tick(&TrackingState::body(0.4, 0.0), false, ms(i), &mut scene, None);
        }
        assert!(s.state().current.yaw > 0.0);
        assert!(s.head_warned);
        s.reset_head_warning();
        assert!(!s.head_warned);
    }
}
