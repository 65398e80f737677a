//! `avatar-kernel` – arbitration and health
//!
//! Does not animate anything itself; it decides who may write which joint and
//! whether the perception side is running degraded.
//!
//! # Modules
//!
//! - [`ownership`] – [`JointArbiter`][ownership::JointArbiter]: an explicit
//!   ownership table that lets the gesture controller take exclusive write
//!   access to its joints, and tells the head smoother what it may touch.
//! - [`health`] – [`DetectorHealth`][health::DetectorHealth]: tracks which
//!   detectors initialised, when each last produced a result, and whether the
//!   system is in degraded mode.

pub mod health;
pub mod ownership;

pub use health::{DetectorHealth, DetectorStatus};
pub use ownership::{JointArbiter, JointWriter};
