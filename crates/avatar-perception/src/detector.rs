//! Detector adapters.
//!
//! Each adapter wraps one black-box inference engine and turns its raw pixel
//! output into a [`PositionSample`]:
//!
//! - coordinates are mapped to `[-1, 1]` with the origin at frame centre,
//! - the horizontal axis is mirrored because the camera is a self-view, so a
//!   person moving to their right yields positive `x` for both detectors,
//! - inference runs at most once per [`DetectorConfig::min_interval_ms`];
//!   calls inside the interval leave the previous sample untouched,
//! - an inference error is logged and swallowed, the previous sample is kept.
//!
//! The body adapter additionally collapses a fixed keypoint subset (shoulders,
//! hips, nose) into one confidence-weighted centroid and ignores moves smaller
//! than [`DetectorConfig::hysteresis`] to stop flicker.

use std::time::Duration;

use avatar_hal::frame::Frame;
use avatar_types::{AvatarError, Extent, PositionSample};
use governor::clock::{Clock, FakeRelativeClock};
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

// ────────────────────────────────────────────────────────────────────────────
// Collaborator contracts
// ────────────────────────────────────────────────────────────────────────────

/// Axis-aligned face box in frame pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub origin_x: f32,
    pub origin_y: f32,
    pub width: f32,
    pub height: f32,
}

/// First face reported by the face engine for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceDetection {
    pub bounding_box: BoundingBox,
    /// Top category score; engines may omit it.
    pub confidence: Option<f32>,
}

/// Single-frame face inference (e.g. a BlazeFace-style short-range model).
pub trait FaceInference: Send {
    /// Run inference on `frame`. `Ok(None)` means no face in view.
    fn detect(&mut self, frame: &Frame, timestamp_ms: u64) -> Result<Option<FaceDetection>, AvatarError>;
}

/// Named body keypoints reported by the pose engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BodyPart {
    Nose,
    LeftEye,
    RightEye,
    LeftEar,
    RightEar,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
}

impl BodyPart {
    /// Parts that make up the torso centroid.
    pub const CENTROID: [BodyPart; 5] = [
        BodyPart::LeftShoulder,
        BodyPart::RightShoulder,
        BodyPart::LeftHip,
        BodyPart::RightHip,
        BodyPart::Nose,
    ];
}

/// One keypoint in frame pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    pub part: BodyPart,
    pub x: f32,
    pub y: f32,
    pub score: f32,
}

/// Keypoints of the first person the pose engine found.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BodyPose {
    pub keypoints: Vec<Keypoint>,
}

/// Single-frame body pose inference.
pub trait BodyInference: Send {
    /// Run inference on `frame`. `Ok(None)` means nobody in view.
    fn detect(&mut self, frame: &Frame) -> Result<Option<BodyPose>, AvatarError>;
}

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

/// Tunables shared by both adapters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Minimum time between two inference calls (milliseconds).
    pub min_interval_ms: u64,
    /// Keypoints at or below this score are left out of the body centroid.
    pub keypoint_min_score: f32,
    /// Body moves shorter than this (normalized units) keep the old sample.
    pub hysteresis: f32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 100,
            keypoint_min_score: 0.3,
            hysteresis: 0.01,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Adapter contract
// ────────────────────────────────────────────────────────────────────────────

/// What happened on one [`DetectorAdapter::poll`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleOutcome {
    /// Called inside the minimum interval; nothing ran.
    Skipped,
    /// Inference ran and produced this sample (possibly the previous one,
    /// kept by hysteresis).
    Detected(PositionSample),
    /// Inference ran and found nobody; the latest sample is now `None`.
    Empty,
    /// Inference raised; the latest sample is unchanged.
    Failed,
}

/// Common surface of the face and body adapters.
pub trait DetectorAdapter: Send {
    /// Short name used in logs and health reports, e.g. `"face"`.
    fn name(&self) -> &'static str;

    /// Run the detector if the rate limit allows and report what happened.
    fn poll(&mut self, frame: &Frame, now: Duration) -> SampleOutcome;

    /// Most recent sample this adapter stands behind.
    fn latest(&self) -> Option<PositionSample>;

    /// `sample(frame) → PositionSample | null`.
    ///
    /// Inside the rate-limit window this returns the previous sample
    /// unchanged; on failure or an empty frame it returns `None`.
    fn sample(&mut self, frame: &Frame, now: Duration) -> Option<PositionSample> {
        match self.poll(frame, now) {
            SampleOutcome::Skipped => self.latest(),
            SampleOutcome::Detected(s) => Some(s),
            SampleOutcome::Empty | SampleOutcome::Failed => None,
        }
    }
}

type FrameClockLimiter = RateLimiter<
    NotKeyed,
    InMemoryState,
    FakeRelativeClock,
    NoOpMiddleware<<FakeRelativeClock as Clock>::Instant>,
>;

/// Fixed minimum spacing between runs, measured on the caller's frame clock.
///
/// A one-cell quota per interval: refused calls consume nothing. A zero
/// interval disables the gate.
struct RunGate {
    limiter: Option<FrameClockLimiter>,
    clock: FakeRelativeClock,
    clock_at: Duration,
}

impl RunGate {
    fn new(min_interval_ms: u64) -> Self {
        let clock = FakeRelativeClock::default();
        let limiter = Quota::with_period(Duration::from_millis(min_interval_ms))
            .map(|quota| RateLimiter::direct_with_clock(quota, clock.clone()));
        Self {
            limiter,
            clock,
            clock_at: Duration::ZERO,
        }
    }

    /// `true` when a run is allowed at `now`. Time never moves backwards.
    fn try_acquire(&mut self, now: Duration) -> bool {
        if now > self.clock_at {
            self.clock.advance(now - self.clock_at);
            self.clock_at = now;
        }
        self.limiter.as_ref().is_none_or(|limiter| limiter.check().is_ok())
    }
}

/// Map a pixel coordinate to `[-1, 1]` around the frame centre.
fn normalize(px: f32, extent_px: u32) -> f32 {
    ((px / extent_px as f32) * 2.0 - 1.0).clamp(-1.0, 1.0)
}

fn check_frame(detector: &str, frame: &Frame) -> Result<(), AvatarError> {
    if frame.width == 0 || frame.height == 0 {
        return Err(AvatarError::InferenceFailed {
            detector: detector.to_string(),
            details: format!("degenerate frame {}x{}", frame.width, frame.height),
        });
    }
    Ok(())
}

// ────────────────────────────────────────────────────────────────────────────
// Face
// ────────────────────────────────────────────────────────────────────────────

/// Adapter around a [`FaceInference`] engine.
pub struct FaceDetector {
    inference: Box<dyn FaceInference>,
    limiter: RunGate,
    latest: Option<PositionSample>,
}

impl FaceDetector {
    pub fn new(inference: Box<dyn FaceInference>, config: DetectorConfig) -> Self {
        Self {
            inference,
            limiter: RunGate::new(config.min_interval_ms),
            latest: None,
        }
    }

    fn to_sample(frame: &Frame, det: &FaceDetection, now: Duration) -> PositionSample {
        let b = det.bounding_box;
        let center_x = b.origin_x + b.width / 2.0;
        let center_y = b.origin_y + b.height / 2.0;
        PositionSample {
            x: -normalize(center_x, frame.width),
            y: normalize(center_y, frame.height),
            confidence: det.confidence.unwrap_or(0.0),
            extent: Some(Extent {
                width: b.width / frame.width as f32,
                height: b.height / frame.height as f32,
            }),
            timestamp: now,
        }
    }
}

impl DetectorAdapter for FaceDetector {
    fn name(&self) -> &'static str {
        "face"
    }

    fn poll(&mut self, frame: &Frame, now: Duration) -> SampleOutcome {
        if !self.limiter.try_acquire(now) {
            return SampleOutcome::Skipped;
        }
        let result = check_frame(self.name(), frame)
            .and_then(|_| self.inference.detect(frame, now.as_millis() as u64));
        match result {
            Ok(Some(det)) => {
                let sample = Self::to_sample(frame, &det, now);
                trace!(x = sample.x, y = sample.y, confidence = sample.confidence, "face sample");
                self.latest = Some(sample);
                SampleOutcome::Detected(sample)
            }
            Ok(None) => {
                self.latest = None;
                SampleOutcome::Empty
            }
            Err(e) => {
                warn!(detector = "face", error = %e, "face inference failed; keeping previous sample");
                SampleOutcome::Failed
            }
        }
    }

    fn latest(&self) -> Option<PositionSample> {
        self.latest
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Body
// ────────────────────────────────────────────────────────────────────────────

/// Adapter around a [`BodyInference`] engine.
pub struct BodyDetector {
    inference: Box<dyn BodyInference>,
    limiter: RunGate,
    config: DetectorConfig,
    latest: Option<PositionSample>,
}

impl BodyDetector {
    pub fn new(inference: Box<dyn BodyInference>, config: DetectorConfig) -> Self {
        Self {
            inference,
            limiter: RunGate::new(config.min_interval_ms),
            config,
            latest: None,
        }
    }

    /// Confidence-weighted centroid of the qualifying torso keypoints, or
    /// `None` if none qualify.
    fn centroid(&self, frame: &Frame, pose: &BodyPose, now: Duration) -> Option<PositionSample> {
        let qualifying: Vec<&Keypoint> = pose
            .keypoints
            .iter()
            .filter(|kp| BodyPart::CENTROID.contains(&kp.part) && kp.score > self.config.keypoint_min_score)
            .collect();
        if qualifying.is_empty() {
            return None;
        }

        let weight: f32 = qualifying.iter().map(|kp| kp.score).sum();
        let cx = qualifying.iter().map(|kp| kp.x * kp.score).sum::<f32>() / weight;
        let cy = qualifying.iter().map(|kp| kp.y * kp.score).sum::<f32>() / weight;

        Some(PositionSample {
            x: -normalize(cx, frame.width),
            y: normalize(cy, frame.height),
            confidence: weight / qualifying.len() as f32,
            extent: None,
            timestamp: now,
        })
    }
}

impl DetectorAdapter for BodyDetector {
    fn name(&self) -> &'static str {
        "body"
    }

    fn poll(&mut self, frame: &Frame, now: Duration) -> SampleOutcome {
        if !self.limiter.try_acquire(now) {
            return SampleOutcome::Skipped;
        }
        let result = check_frame(self.name(), frame).and_then(|_| self.inference.detect(frame));
        let pose = match result {
            Ok(pose) => pose,
            Err(e) => {
                warn!(detector = "body", error = %e, "body inference failed; keeping previous sample");
                return SampleOutcome::Failed;
            }
        };

        let Some(fresh) = pose.and_then(|p| self.centroid(frame, &p, now)) else {
            self.latest = None;
            return SampleOutcome::Empty;
        };

        if let Some(prev) = self.latest {
            let moved = (fresh.x - prev.x).hypot(fresh.y - prev.y);
            if moved < self.config.hysteresis {
                trace!(moved, "body move below hysteresis; keeping previous sample");
                return SampleOutcome::Detected(prev);
            }
        }
        self.latest = Some(fresh);
        SampleOutcome::Detected(fresh)
    }

    fn latest(&self) -> Option<PositionSample> {
        self.latest
    }
}
