//! `avatar-runtime` – the per-frame response controller.
//!
//! Everything that moves the avatar lives here. The perception crate says
//! *where* someone is; this crate decides what the rig does about it.
//!
//! # Modules
//!
//! - [`controller`] – [`AvatarLoop`]: owns the scene, both detector
//!   adapters, the fusion arbiter, the smoother and the gesture controller,
//!   and runs them in that order once per frame.
//! - [`smoother`] – [`OrientationSmoother`]: exponential head tracking with
//!   idle wander when nobody is there and direct mimicry when someone is close.
//! - [`gesture`] – [`GestureController`]: the wave state machine with
//!   cooldown, consecutive limit, joint claims and base-pose restoration.
//! - [`timeline`] – [`Timeline`]: sequenced rotation tweens with gaps,
//!   parallel tracks and eased interpolation.
//! - [`ticker`] – [`FrameTask`]: runs an [`AvatarLoop`] on a tokio interval
//!   and restores the rig when cancelled.
//! - [`telemetry`] – [`init_tracing`]: `tracing` subscriber setup with an
//!   optional OTLP exporter.
//!
//! # Write ownership
//!
//! The head has two writers. While a wave is active the smoother is
//! suspended and every gesture write is checked against the
//! [`JointArbiter`](avatar_kernel::JointArbiter), so no joint ever receives
//! two writes from different owners in one frame.

pub mod controller;
pub mod gesture;
pub mod smoother;
pub mod telemetry;
pub mod ticker;
pub mod timeline;

pub use controller::{AvatarLoop, AvatarLoopConfig, TrackingCallback};
pub use gesture::{
    CooldownAnchor, GestureConfig, GestureController, GestureSession, TriggerKind, TriggerOutcome, WaveRig,
};
pub use smoother::{Orientation, OrientationSmoother, SmootherConfig, SmootherMode, SmoothingState};
pub use telemetry::{TracerProviderGuard, init_tracing};
pub use ticker::FrameTask;
pub use timeline::{Ease, Timeline, TimelineBuilder, Tween};
