//! Scripted inference doubles.
//!
//! - [`ScriptedFace`] / [`ScriptedBody`] wrap a closure, for tests that need
//!   a specific answer (or error) on a specific call.
//! - [`VisitorScript`] plays a timed scenario of a person walking into view,
//!   coming close, and leaving, and hands out a face and a body engine that
//!   both report that same person.
//!
//! The script keeps its own [`ScriptClock`]: the host sets it once per frame
//! before ticking, so face and body answers always describe the same moment.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use avatar_hal::frame::Frame;
use avatar_types::AvatarError;

use crate::detector::{
    BodyInference, BodyPart, BodyPose, BoundingBox, FaceDetection, FaceInference, Keypoint,
};

// ────────────────────────────────────────────────────────────────────────────
// Closure-backed engines
// ────────────────────────────────────────────────────────────────────────────

type FaceFn = dyn FnMut(&Frame, u64) -> Result<Option<FaceDetection>, AvatarError> + Send;
type BodyFn = dyn FnMut(&Frame) -> Result<Option<BodyPose>, AvatarError> + Send;

/// Face engine whose answers come from a closure.
pub struct ScriptedFace {
    script: Box<FaceFn>,
}

impl ScriptedFace {
    pub fn new<F>(script: F) -> Self
    where
        F: FnMut(&Frame, u64) -> Result<Option<FaceDetection>, AvatarError> + Send + 'static,
    {
        Self { script: Box::new(script) }
    }
}

impl FaceInference for ScriptedFace {
    fn detect(&mut self, frame: &Frame, timestamp_ms: u64) -> Result<Option<FaceDetection>, AvatarError> {
        (self.script)(frame, timestamp_ms)
    }
}

/// Body engine whose answers come from a closure.
pub struct ScriptedBody {
    script: Box<BodyFn>,
}

impl ScriptedBody {
    pub fn new<F>(script: F) -> Self
    where
        F: FnMut(&Frame) -> Result<Option<BodyPose>, AvatarError> + Send + 'static,
    {
        Self { script: Box::new(script) }
    }
}

impl BodyInference for ScriptedBody {
    fn detect(&mut self, frame: &Frame) -> Result<Option<BodyPose>, AvatarError> {
        (self.script)(frame)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Visitor scenario
// ────────────────────────────────────────────────────────────────────────────

/// What the simulated person is doing during one script segment.
///
/// Positions are in the fused tracking frame: `x` positive to the person's
/// right, `y` positive downwards, both in `[-1, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Visit {
    /// Nobody in view.
    Away,
    /// Visible to the body detector only; the face is too small to score.
    Far { x: f32, y: f32 },
    /// Close to the camera: confident face covering `face_width` of the frame.
    Near { x: f32, y: f32, face_width: f32 },
}

/// Shared monotonic time for a [`VisitorScript`].
#[derive(Debug, Clone, Default)]
pub struct ScriptClock(Arc<AtomicU64>);

impl ScriptClock {
    pub fn set(&self, now: Duration) {
        self.0.store(now.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn now(&self) -> Duration {
        Duration::from_millis(self.0.load(Ordering::Relaxed))
    }
}

#[derive(Debug)]
struct Timeline {
    segments: Vec<(Duration, Visit)>,
    cycle: Option<Duration>,
}

impl Timeline {
    fn at(&self, now: Duration) -> Visit {
        let t = match self.cycle {
            Some(period) if !period.is_zero() => {
                Duration::from_nanos((now.as_nanos() % period.as_nanos()) as u64)
            }
            _ => now,
        };
        self.segments
            .iter()
            .rev()
            .find(|(start, _)| *start <= t)
            .map(|(_, v)| *v)
            .unwrap_or(Visit::Away)
    }
}

/// A timed scenario shared by one face and one body engine.
#[derive(Debug, Clone)]
pub struct VisitorScript {
    timeline: Arc<Timeline>,
    clock: ScriptClock,
}

impl VisitorScript {
    /// Build a script from `(start, visit)` segments. Each segment lasts until
    /// the next one starts; before the first segment nobody is in view.
    pub fn new(mut segments: Vec<(Duration, Visit)>) -> Self {
        segments.sort_by_key(|(start, _)| *start);
        Self {
            timeline: Arc::new(Timeline { segments, cycle: None }),
            clock: ScriptClock::default(),
        }
    }

    /// Repeat the scenario every `period`.
    pub fn cycling(self, period: Duration) -> Self {
        let segments = self.timeline.segments.clone();
        Self {
            timeline: Arc::new(Timeline {
                segments,
                cycle: Some(period),
            }),
            clock: self.clock,
        }
    }

    /// The demo visit: empty room, someone walks up from the left, steps
    /// close, drifts right, leaves. Repeats every 16 s.
    pub fn walk_in() -> Self {
        let s = Duration::from_secs;
        Self::new(vec![
            (s(0), Visit::Away),
            (s(2), Visit::Far { x: -0.6, y: 0.1 }),
            (s(4), Visit::Far { x: -0.2, y: 0.05 }),
            (s(6), Visit::Near { x: 0.0, y: -0.1, face_width: 0.25 }),
            (s(9), Visit::Near { x: 0.3, y: -0.05, face_width: 0.22 }),
            (s(11), Visit::Far { x: 0.6, y: 0.1 }),
            (s(13), Visit::Away),
        ])
        .cycling(s(16))
    }

    pub fn clock(&self) -> ScriptClock {
        self.clock.clone()
    }

    /// What the script shows at the current clock time.
    pub fn current(&self) -> Visit {
        self.timeline.at(self.clock.now())
    }

    pub fn face_inference(&self) -> ScriptedFace {
        let script = self.clone();
        ScriptedFace::new(move |frame, _ts| Ok(script.face_at(frame)))
    }

    pub fn body_inference(&self) -> ScriptedBody {
        let script = self.clone();
        ScriptedBody::new(move |frame| Ok(script.body_at(frame)))
    }

    fn face_at(&self, frame: &Frame) -> Option<FaceDetection> {
        let (x, y, width, confidence) = match self.current() {
            Visit::Away => return None,
            // Reported but below the fusion threshold.
            Visit::Far { x, y } => (x, y, 0.06, 0.4),
            Visit::Near { x, y, face_width } => (x, y, face_width, 0.92),
        };
        let (w, h) = (frame.width as f32, frame.height as f32);
        let box_w = width * w;
        let box_h = box_w * 1.2;
        // Face engines report y with the opposite sign to the body engine.
        let (cx, cy) = (pixel_x(x, w), pixel_y(-y, h));
        Some(FaceDetection {
            bounding_box: BoundingBox {
                origin_x: cx - box_w / 2.0,
                origin_y: cy - box_h / 2.0,
                width: box_w,
                height: box_h,
            },
            confidence: Some(confidence),
        })
    }

    fn body_at(&self, frame: &Frame) -> Option<BodyPose> {
        let (x, y) = match self.current() {
            Visit::Away => return None,
            Visit::Far { x, y } | Visit::Near { x, y, .. } => (x, y),
        };
        let (w, h) = (frame.width as f32, frame.height as f32);
        let (cx, cy) = (pixel_x(x, w), pixel_y(y, h));
        let spread = 0.08 * w;
        let keypoints = [
            (BodyPart::Nose, 0.0, -2.0, 0.9),
            (BodyPart::LeftShoulder, spread, -1.0, 0.8),
            (BodyPart::RightShoulder, -spread, -1.0, 0.8),
            (BodyPart::LeftHip, spread * 0.6, 1.5, 0.7),
            (BodyPart::RightHip, -spread * 0.6, 1.5, 0.7),
            (BodyPart::LeftWrist, spread * 1.8, 0.5, 0.5),
        ]
        .into_iter()
        .map(|(part, dx, dy, score)| Keypoint {
            part,
            x: cx + dx,
            y: cy + dy * spread * 0.5,
            score,
        })
        .collect();
        Some(BodyPose { keypoints })
    }
}

/// Pixel column for a mirrored, normalized x.
fn pixel_x(x: f32, width: f32) -> f32 {
    (1.0 - x) / 2.0 * width
}

fn pixel_y(y: f32, height: f32) -> f32 {
    (y + 1.0) / 2.0 * height
}
