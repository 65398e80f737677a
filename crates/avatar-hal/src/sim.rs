//! In-process simulation doubles for running the full stack headless.
//!
//! [`SimScene`] is a flat list of named nodes whose transforms are plain
//! values, with optional write-fault injection. [`SimFrameSource`] hands out
//! blank frames of a fixed size and can be toggled between ready and not
//! ready.
//!
//! # Example
//!
//! ```rust
//! use avatar_hal::registry::JointRegistry;
//! use avatar_hal::sim::SimScene;
//!
//! let scene = SimScene::robot();
//! let registry = JointRegistry::discover(&scene);
//! assert!(registry.head().is_some());
//! ```

use std::collections::HashSet;

use avatar_types::{AvatarError, NodeId, Vec3};

use crate::frame::{Frame, FrameSource};
use crate::scene::{Scene, SceneNode};

// ────────────────────────────────────────────────────────────────────────────
// Scene
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct SimNode {
    name: String,
    rotation: Vec3,
    position: Vec3,
}

/// A simulated scene graph that records every rotation written to it.
#[derive(Debug, Clone, Default)]
pub struct SimScene {
    nodes: Vec<SimNode>,
    failing: HashSet<NodeId>,
    writes: usize,
}

impl SimScene {
    /// Create an empty scene.
    pub fn new() -> Self {
        Self::default()
    }

    /// A small humanoid rig with the node names most character assets use:
    /// a head, a body, a right arm chain (`"Right Shoulder"`, `"arm"`,
    /// `"Hand"`) and a left arm chain (`"Left Shoulder"`, `"Hand LEFT"`).
    pub fn robot() -> Self {
        Self::new()
            .with_node("Body", Vec3::ZERO)
            .with_node("Head", Vec3::ZERO)
            .with_node("Right Shoulder", Vec3::new(0.0, 0.0, -0.1))
            .with_node("arm", Vec3::new(0.05, 0.0, 0.0))
            .with_node("Hand", Vec3::new(0.0, 0.02, 0.0))
            .with_node("Left Shoulder", Vec3::new(0.0, 0.0, 0.1))
            .with_node("Hand LEFT", Vec3::ZERO)
    }

    /// Append a node with the given initial rotation.
    pub fn with_node(mut self, name: impl Into<String>, rotation: Vec3) -> Self {
        self.nodes.push(SimNode {
            name: name.into(),
            rotation,
            position: Vec3::ZERO,
        });
        self
    }

    /// Make every subsequent write to `node` fail.
    pub fn fail_writes_to(&mut self, node: NodeId) {
        self.failing.insert(node);
    }

    /// Let writes to `node` succeed again.
    pub fn heal(&mut self, node: NodeId) {
        self.failing.remove(&node);
    }

    /// Number of successful rotation writes since construction.
    pub fn write_count(&self) -> usize {
        self.writes
    }
}

impl Scene for SimScene {
    fn find_node_by_name(&self, name: &str) -> Option<NodeId> {
        self.nodes.iter().position(|n| n.name == name).map(NodeId)
    }

    fn list_all_nodes(&self) -> Vec<SceneNode> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, n)| SceneNode {
                id: NodeId(i),
                name: n.name.clone(),
            })
            .collect()
    }

    fn rotation(&self, node: NodeId) -> Option<Vec3> {
        self.nodes.get(node.0).map(|n| n.rotation)
    }

    fn set_rotation(&mut self, node: NodeId, rotation: Vec3) -> Result<(), AvatarError> {
        if self.failing.contains(&node) {
            return Err(AvatarError::SceneWrite {
                node,
                details: "injected fault".to_string(),
            });
        }
        match self.nodes.get_mut(node.0) {
            Some(n) => {
                n.rotation = rotation;
                self.writes += 1;
                Ok(())
            }
            None => Err(AvatarError::SceneWrite {
                node,
                details: "node not present in scene".to_string(),
            }),
        }
    }

    fn position(&self, node: NodeId) -> Option<Vec3> {
        self.nodes.get(node.0).map(|n| n.position)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Frame source
// ────────────────────────────────────────────────────────────────────────────

/// A simulated camera that returns blank RGBA frames.
#[derive(Debug, Clone)]
pub struct SimFrameSource {
    id: String,
    width: u32,
    height: u32,
    ready: bool,
}

impl SimFrameSource {
    /// A ready 640×480 source.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            width: 640,
            height: 480,
            ready: true,
        }
    }

    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn set_ready(&mut self, ready: bool) {
        self.ready = ready;
    }
}

impl FrameSource for SimFrameSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_ready(&self) -> bool {
        self.ready
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn capture(&mut self) -> Result<Frame, AvatarError> {
        if !self.ready {
            return Err(AvatarError::FrameUnavailable(format!(
                "source '{}' is not ready",
                self.id
            )));
        }
        // Pixel content is irrelevant to scripted detectors; keep it tiny.
        Ok(Frame {
            width: self.width,
            height: self.height,
            data: Vec::new(),
        })
    }
}
