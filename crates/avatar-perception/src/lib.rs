//! `avatar-perception` – turns raw detector output into one tracking estimate.
//!
//! # Modules
//!
//! - [`detector`] – [`FaceDetector`][detector::FaceDetector] and
//!   [`BodyDetector`][detector::BodyDetector]: rate-limited adapters around
//!   black-box inference calls that emit normalized, mirrored
//!   [`PositionSample`][avatar_types::PositionSample]s.
//! - [`fusion`] – [`FusionArbiter`][fusion::FusionArbiter]: pure, priority-based
//!   merge of the latest face and body samples into a
//!   [`TrackingState`][avatar_types::TrackingState].
//! - [`sim`] – scripted inference doubles, including a
//!   [`VisitorScript`][sim::VisitorScript] that walks a simulated person in
//!   and out of view.

pub mod detector;
pub mod fusion;
pub mod sim;

pub use detector::{
    BodyDetector, BodyInference, BodyPart, BodyPose, BoundingBox, DetectorAdapter, DetectorConfig,
    FaceDetection, FaceDetector, FaceInference, Keypoint, SampleOutcome,
};
pub use fusion::{FusionArbiter, FusionConfig};
pub use sim::{ScriptClock, ScriptedBody, ScriptedFace, Visit, VisitorScript};
