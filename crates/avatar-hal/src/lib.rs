//! `avatar-hal` – the seams to the host renderer and camera.
//!
//! The core never owns scene nodes or video frames; it talks to them through
//! the traits in this crate so any renderer or capture backend can be plugged
//! in.
//!
//! # Modules
//!
//! - [`scene`] – [`Scene`][scene::Scene]: name lookup, node listing and
//!   rotation/position access on the host scene graph.
//! - [`frame`] – [`FrameSource`][frame::FrameSource]: a live video surface
//!   with dimensions and a readiness predicate.
//! - [`registry`] – [`JointRegistry`][registry::JointRegistry]: resolves
//!   semantic joint roles (head, shoulder, arm, hand per side) to scene nodes
//!   once per scene load.
//! - [`sim`] – in-process [`SimScene`][sim::SimScene] and
//!   [`SimFrameSource`][sim::SimFrameSource] for tests and headless runs.

pub mod frame;
pub mod registry;
pub mod scene;
pub mod sim;

pub use frame::{Frame, FrameSource};
pub use registry::{JointRegistry, JointRole, Limb};
pub use scene::{Scene, SceneNode};
pub use sim::{SimFrameSource, SimScene};
