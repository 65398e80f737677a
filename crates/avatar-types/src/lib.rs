use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rotation or position triple in scene units (radians for rotations).
///
/// `x` is pitch, `y` is yaw and `z` is roll when the triple is a rotation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 0.0 };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Read a single component.
    pub fn get(&self, axis: Axis) -> f32 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }

    /// Overwrite a single component.
    pub fn set(&mut self, axis: Axis, value: f32) {
        match axis {
            Axis::X => self.x = value,
            Axis::Y => self.y = value,
            Axis::Z => self.z = value,
        }
    }

    /// Copy of `self` rounded to [`POSE_PRECISION`] on every axis.
    ///
    /// Base poses are stored through this so that restoring a joint writes
    /// back exactly the same bits no matter how the snapshot was taken.
    pub fn snapshot(&self) -> Self {
        Self {
            x: quantize(self.x),
            y: quantize(self.y),
            z: quantize(self.z),
        }
    }

    /// Largest absolute per-axis difference between two triples.
    pub fn max_abs_diff(&self, other: &Vec3) -> f32 {
        (self.x - other.x)
            .abs()
            .max((self.y - other.y).abs())
            .max((self.z - other.z).abs())
    }
}

/// Resolution of a captured base pose (radians).
pub const POSE_PRECISION: f32 = 1e-6;

fn quantize(v: f32) -> f32 {
    if !v.is_finite() {
        return v;
    }
    ((v as f64 / POSE_PRECISION as f64).round() * POSE_PRECISION as f64) as f32
}

/// One rotation axis of a scene node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
    Z,
}

/// Body side of a limb, as seen from the character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    /// Direction multiplier applied to gesture deltas: `+1` right, `-1` left.
    pub fn sign(self) -> f32 {
        match self {
            Side::Right => 1.0,
            Side::Left => -1.0,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Left => write!(f, "left"),
            Side::Right => write!(f, "right"),
        }
    }
}

/// Opaque, non-owning reference to a node in the host scene graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Perception
// ────────────────────────────────────────────────────────────────────────────

/// Size of a detection relative to the frame (fractions in `[0, 1]`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub width: f32,
    pub height: f32,
}

/// One normalized position estimate produced by a detector adapter.
///
/// `x` and `y` are in `[-1, 1]` with the origin at the frame centre and the
/// horizontal axis already mirrored for a self-view camera. Never mutated
/// once produced; the next sample supersedes it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    pub x: f32,
    pub y: f32,
    pub confidence: f32,
    pub extent: Option<Extent>,
    /// Monotonic time at which the frame was processed.
    pub timestamp: Duration,
}

/// Which detector the fused state was taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackingSource {
    Face,
    Body,
    #[default]
    None,
}

/// Authoritative "where is the person and how close" estimate for one tick.
///
/// Invariants: `proximity ⇒ presence`, and `source == None ⇒ !presence && x == y == 0`.
/// Use the constructors to keep them.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TrackingState {
    pub x: f32,
    pub y: f32,
    pub presence: bool,
    pub proximity: bool,
    pub source: TrackingSource,
}

impl TrackingState {
    /// Nobody detected.
    pub fn absent() -> Self {
        Self::default()
    }

    /// Person tracked through the face detector.
    pub fn face(x: f32, y: f32, proximity: bool) -> Self {
        Self {
            x,
            y,
            presence: true,
            proximity,
            source: TrackingSource::Face,
        }
    }

    /// Person tracked through the body detector; never claims proximity.
    pub fn body(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            presence: true,
            proximity: false,
            source: TrackingSource::Body,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Gesture
// ────────────────────────────────────────────────────────────────────────────

/// How well the discovered joints can express a wave, best last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GestureQuality {
    /// A single hand or arm joint.
    Basic,
    /// Arm and hand on the same side.
    Good,
    /// Shoulder plus arm or hand on the same side.
    Excellent,
}

/// Observable state of the gesture state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum GesturePhase {
    #[default]
    Idle,
    Triggered,
    LiftToReady,
    WaveOscillate,
    Restoring,
}

impl GesturePhase {
    pub fn is_active(self) -> bool {
        self != GesturePhase::Idle
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Error type shared by every avatar crate.
///
/// None of these are fatal to the host; callers degrade functionality and log.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AvatarError {
    #[error("Detector '{detector}' unavailable: {reason}")]
    DetectorUnavailable { detector: String, reason: String },

    #[error("Inference failed on '{detector}': {details}")]
    InferenceFailed { detector: String, details: String },

    #[error("Scene write to {node} failed: {details}")]
    SceneWrite { node: NodeId, details: String },

    #[error("Joint {node} is held by {holder}")]
    JointBusy { node: NodeId, holder: String },

    #[error("Frame unavailable: {0}")]
    FrameUnavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_sign() {
        assert_eq!(Side::Right.sign(), 1.0);
        assert_eq!(Side::Left.sign(), -1.0);
    }

    #[test]
    fn snapshot_is_stable_and_close() {
        let v = Vec3::new(0.123_456_78, -1.987_654_3, 3.0);
        let snap = v.snapshot();
        assert!(snap.max_abs_diff(&v) <= POSE_PRECISION);
        // Snapshotting twice gives identical bits.
        assert_eq!(snap.snapshot(), snap);
    }

    #[test]
    fn vec3_axis_access() {
        let mut v = Vec3::ZERO;
        v.set(Axis::Y, 0.5);
        v.set(Axis::Z, -0.25);
        assert_eq!(v.get(Axis::X), 0.0);
        assert_eq!(v.get(Axis::Y), 0.5);
        assert_eq!(v.get(Axis::Z), -0.25);
    }

    #[test]
    fn tracking_state_constructors_keep_invariants() {
        let absent = TrackingState::absent();
        assert!(!absent.presence && !absent.proximity);
        assert_eq!(absent.source, TrackingSource::None);
        assert_eq!((absent.x, absent.y), (0.0, 0.0));

        let body = TrackingState::body(0.2, 0.1);
        assert!(body.presence);
        assert!(!body.proximity);

        let near = TrackingState::face(0.0, 0.0, true);
        assert!(near.presence && near.proximity);
    }

    #[test]
    fn gesture_quality_ordering() {
        assert!(GestureQuality::Excellent > GestureQuality::Good);
        assert!(GestureQuality::Good > GestureQuality::Basic);
    }

    #[test]
    fn tracking_state_json_uses_lowercase_source() {
        let json = serde_json::to_string(&TrackingState::body(0.5, -0.5)).unwrap();
        assert!(json.contains("\"source\":\"body\""));
        let back: TrackingState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, TrackingState::body(0.5, -0.5));
    }

    #[test]
    fn avatar_error_display() {
        let err = AvatarError::SceneWrite {
            node: NodeId(7),
            details: "node detached".to_string(),
        };
        assert!(err.to_string().contains("node#7"));

        let err = AvatarError::DetectorUnavailable {
            detector: "face".to_string(),
            reason: "model missing".to_string(),
        };
        assert!(err.to_string().contains("face"));
    }
}
