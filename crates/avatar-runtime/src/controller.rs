//! [`AvatarLoop`] – the per-frame orchestrator.
//!
//! Owns every collaborator and runs one cooperative tick at a time:
//!
//! 1. **Detect** – if the frame source is ready, capture a frame and poll the
//!    face and body adapters (each rate-limits itself).
//! 2. **Fuse** – merge the adapters' latest samples into a [`TrackingState`].
//! 3. **Notify** – invoke the change callback only if the fused state differs
//!    from the last one published.
//! 4. **Gesture** – feed presence to the [`GestureController`] and advance any
//!    running wave.
//! 5. **Smooth** – tick the [`OrientationSmoother`], passing it the gesture
//!    write token.
//!
//! Steps 4 and 5 read the same fused snapshot. Nothing blocks inside a tick;
//! time is supplied by the caller as a monotonic [`Duration`].
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use avatar_hal::sim::{SimFrameSource, SimScene};
//! use avatar_perception::sim::VisitorScript;
//! use avatar_runtime::controller::{AvatarLoop, AvatarLoopConfig};
//!
//! let script = VisitorScript::walk_in();
//! let mut avatar = AvatarLoop::new(
//!     AvatarLoopConfig::default(),
//!     Box::new(SimScene::robot()),
//!     Box::new(SimFrameSource::new("webcam")),
//! )
//! .with_face(Ok(Box::new(script.face_inference())))
//! .with_body(Ok(Box::new(script.body_inference())));
//!
//! avatar.tick(Duration::ZERO);
//! assert!(!avatar.tracking().presence);
//! ```

use std::time::Duration;

use avatar_hal::frame::FrameSource;
use avatar_hal::registry::JointRegistry;
use avatar_hal::scene::Scene;
use avatar_kernel::health::DetectorHealth;
use avatar_kernel::ownership::{JointArbiter, JointWriter};
use avatar_perception::detector::{
    BodyDetector, BodyInference, DetectorAdapter, DetectorConfig, FaceDetector, FaceInference,
    SampleOutcome,
};
use avatar_perception::fusion::{FusionArbiter, FusionConfig};
use avatar_types::{AvatarError, GesturePhase, TrackingState};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::gesture::{GestureConfig, GestureController, RigAccess, TriggerOutcome};
use crate::smoother::{OrientationSmoother, SmootherConfig, SmoothingState};

/// A detector that has produced nothing for this long is reported stale.
const DETECTOR_STALE_AFTER: Duration = Duration::from_secs(2);

const FACE: &str = "face";
const BODY: &str = "body";

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration bundle for [`AvatarLoop`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AvatarLoopConfig {
    /// Frame ticks per second when driven by a [`FrameTask`](crate::ticker::FrameTask).
    pub frame_rate_hz: u32,
    pub detector: DetectorConfig,
    pub fusion: FusionConfig,
    pub smoother: SmootherConfig,
    pub gesture: GestureConfig,
}

impl Default for AvatarLoopConfig {
    fn default() -> Self {
        Self {
            frame_rate_hz: 60,
            detector: DetectorConfig::default(),
            fusion: FusionConfig::default(),
            smoother: SmootherConfig::default(),
            gesture: GestureConfig::default(),
        }
    }
}

impl AvatarLoopConfig {
    pub fn frame_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.frame_rate_hz.max(1)))
    }
}

/// Callback fired with the new fused state whenever it changes.
pub type TrackingCallback = Box<dyn FnMut(&TrackingState) + Send>;

// ─────────────────────────────────────────────────────────────────────────────
// AvatarLoop
// ─────────────────────────────────────────────────────────────────────────────

pub struct AvatarLoop {
    config: AvatarLoopConfig,
    scene: Box<dyn Scene>,
    frames: Box<dyn FrameSource>,
    registry: JointRegistry,
    face: Option<Box<dyn DetectorAdapter>>,
    body: Option<Box<dyn DetectorAdapter>>,
    health: DetectorHealth,
    fusion: FusionArbiter,
    joints: JointArbiter,
    smoother: OrientationSmoother,
    gesture: GestureController,
    tracking: TrackingState,
    published: TrackingState,
    on_change: Option<TrackingCallback>,
}

impl AvatarLoop {
    /// Build a loop around `scene` and `frames`. Both detectors start out
    /// unavailable until supplied with [`with_face`](Self::with_face) /
    /// [`with_body`](Self::with_body).
    pub fn new(config: AvatarLoopConfig, scene: Box<dyn Scene>, frames: Box<dyn FrameSource>) -> Self {
        let registry = JointRegistry::discover(&*scene);
        let mut health = DetectorHealth::new();
        health.mark_unconfigured(FACE);
        health.mark_unconfigured(BODY);
        Self {
            config,
            scene,
            frames,
            registry,
            face: None,
            body: None,
            health,
            fusion: FusionArbiter::new(config.fusion),
            joints: JointArbiter::new(),
            smoother: OrientationSmoother::new(config.smoother),
            gesture: GestureController::new(config.gesture),
            tracking: TrackingState::absent(),
            published: TrackingState::absent(),
            on_change: None,
        }
    }

    /// Attach the face engine, or record why it failed to initialise.
    pub fn with_face(mut self, engine: Result<Box<dyn FaceInference>, AvatarError>) -> Self {
        match engine {
            Ok(engine) => {
                self.face = Some(Box::new(FaceDetector::new(engine, self.config.detector)));
                self.health.register(FACE, DETECTOR_STALE_AFTER, Duration::ZERO);
            }
            Err(e) => {
                self.face = None;
                self.health.mark_unavailable(FACE, &e.to_string());
            }
        }
        self
    }

    /// Attach the body engine, or record why it failed to initialise.
    pub fn with_body(mut self, engine: Result<Box<dyn BodyInference>, AvatarError>) -> Self {
        match engine {
            Ok(engine) => {
                self.body = Some(Box::new(BodyDetector::new(engine, self.config.detector)));
                self.health.register(BODY, DETECTOR_STALE_AFTER, Duration::ZERO);
            }
            Err(e) => {
                self.body = None;
                self.health.mark_unavailable(BODY, &e.to_string());
            }
        }
        self
    }

    /// Register the change callback (replaces any previous one).
    pub fn on_change(mut self, callback: impl FnMut(&TrackingState) + Send + 'static) -> Self {
        self.on_change = Some(Box::new(callback));
        self
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn config(&self) -> &AvatarLoopConfig {
        &self.config
    }

    /// Fused state from the most recent tick.
    pub fn tracking(&self) -> TrackingState {
        self.tracking
    }

    pub fn gesture_phase(&self) -> GesturePhase {
        self.gesture.phase()
    }

    pub fn wave_count(&self) -> u32 {
        self.gesture.wave_count()
    }

    pub fn is_degraded(&self) -> bool {
        self.health.degraded()
    }

    pub fn health(&self) -> &DetectorHealth {
        &self.health
    }

    pub fn registry(&self) -> &JointRegistry {
        &self.registry
    }

    pub fn smoothing(&self) -> SmoothingState {
        self.smoother.state()
    }

    pub fn gesture(&self) -> &GestureController {
        &self.gesture
    }

    pub fn scene(&self) -> &dyn Scene {
        &*self.scene
    }

    // ── Tick ─────────────────────────────────────────────────────────────────

    /// Run one frame at monotonic time `now`.
    pub fn tick(&mut self, now: Duration) -> TrackingState {
        self.detect(now);

        let face = self.face.as_ref().and_then(|d| d.latest());
        let body = self.body.as_ref().and_then(|d| d.latest());
        self.tracking = self.fusion.fuse(face.as_ref(), body.as_ref());

        if self.published != self.tracking {
            self.published = self.tracking;
            debug!(
                x = self.tracking.x,
                y = self.tracking.y,
                presence = self.tracking.presence,
                proximity = self.tracking.proximity,
                source = ?self.tracking.source,
                "tracking changed"
            );
            if let Some(callback) = self.on_change.as_mut() {
                callback(&self.tracking);
            }
        }

        let mut rig = RigAccess {
            scene: &mut *self.scene,
            registry: &self.registry,
            arbiter: &mut self.joints,
        };
        if let Some(outcome) = self.gesture.update(self.tracking.presence, now, &mut rig) {
            debug!(?outcome, "presence edge");
        }

        let head = self.registry.head();
        let gesture_active = self.gesture.is_active()
            || head.is_some_and(|h| !self.joints.is_writable_by(h, JointWriter::Smoother));
        self.smoother
            .tick(&self.tracking, gesture_active, now, &mut *self.scene, head);

        self.tracking
    }

    fn detect(&mut self, now: Duration) {
        if !self.frames.is_ready() {
            return;
        }
        let frame = match self.frames.capture() {
            Ok(frame) => frame,
            Err(e) => {
                debug!(source = self.frames.id(), error = %e, "frame capture skipped");
                return;
            }
        };
        for detector in [self.face.as_mut(), self.body.as_mut()].into_iter().flatten() {
            match detector.poll(&frame, now) {
                SampleOutcome::Detected(_) | SampleOutcome::Empty => {
                    self.health.heartbeat(detector.name(), now);
                }
                SampleOutcome::Skipped | SampleOutcome::Failed => {}
            }
        }
    }

    // ── Operator entry points ────────────────────────────────────────────────

    /// Start a wave now, subject to the active check and cooldown.
    pub fn trigger_gesture(&mut self, now: Duration) -> TriggerOutcome {
        let mut rig = RigAccess {
            scene: &mut *self.scene,
            registry: &self.registry,
            arbiter: &mut self.joints,
        };
        let outcome = self.gesture.trigger_gesture(now, &mut rig);
        info!(?outcome, "manual wave trigger");
        outcome
    }

    pub fn reset_gesture_limits(&mut self) {
        self.gesture.reset_limits();
    }

    /// Swap in a new scene. Any running wave is restored on the old scene
    /// first, then joints are rediscovered.
    pub fn load_scene(&mut self, scene: Box<dyn Scene>, now: Duration) {
        self.restore_gesture(now);
        self.scene = scene;
        self.registry = JointRegistry::discover(&*self.scene);
        self.smoother.reset_head_warning();
        info!(joints = self.registry.found().len(), "scene loaded");
    }

    /// Stop-time cleanup: puts any joint a wave moved back on its base pose.
    /// Returns `true` if a wave had to be cut short.
    pub fn shutdown(&mut self, now: Duration) -> bool {
        let restored = self.restore_gesture(now);
        info!(restored, waves = self.gesture.wave_count(), "avatar loop stopped");
        restored
    }

    fn restore_gesture(&mut self, now: Duration) -> bool {
        let mut rig = RigAccess {
            scene: &mut *self.scene,
            registry: &self.registry,
            arbiter: &mut self.joints,
        };
        self.gesture.force_restore(now, &mut rig)
    }
}
