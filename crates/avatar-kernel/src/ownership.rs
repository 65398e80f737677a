//! [`JointArbiter`] – exclusive write ownership over scene joints.
//!
//! Two writers touch joint rotations: the head smoother and the gesture
//! controller. An unclaimed joint is writable by either. Once a writer claims
//! a joint, every other writer is refused until the claim is released.
//!
//! The gesture controller claims its whole limb before it captures the base
//! pose and releases it only after restoration, so the smoother can never
//! land a write in the middle of a wave.

use std::collections::HashMap;
use std::fmt;

use avatar_types::{AvatarError, NodeId};
use tracing::debug;

/// The logical writers that compete for joints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JointWriter {
    Smoother,
    Gesture,
}

impl fmt::Display for JointWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JointWriter::Smoother => write!(f, "smoother"),
            JointWriter::Gesture => write!(f, "gesture"),
        }
    }
}

/// Node → current owner.
///
/// # Example
///
/// ```
/// use avatar_kernel::ownership::{JointArbiter, JointWriter};
/// use avatar_types::NodeId;
///
/// let mut arbiter = JointArbiter::new();
/// arbiter.claim(JointWriter::Gesture, &[NodeId(3)]).unwrap();
///
/// assert!(arbiter.is_writable_by(NodeId(3), JointWriter::Gesture));
/// assert!(!arbiter.is_writable_by(NodeId(3), JointWriter::Smoother));
/// assert!(arbiter.is_writable_by(NodeId(0), JointWriter::Smoother));
/// ```
#[derive(Debug, Default)]
pub struct JointArbiter {
    owners: HashMap<NodeId, JointWriter>,
}

impl JointArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim every node in `nodes` for `writer`, all or nothing.
    ///
    /// Re-claiming a node the writer already holds is fine. If any node is
    /// held by another writer nothing is claimed and
    /// [`AvatarError::JointBusy`] names the first conflict.
    pub fn claim(&mut self, writer: JointWriter, nodes: &[NodeId]) -> Result<(), AvatarError> {
        if let Some((node, holder)) = nodes
            .iter()
            .find_map(|n| self.owners.get(n).filter(|h| **h != writer).map(|h| (*n, *h)))
        {
            return Err(AvatarError::JointBusy {
                node,
                holder: holder.to_string(),
            });
        }
        for node in nodes {
            self.owners.insert(*node, writer);
        }
        debug!(%writer, count = nodes.len(), "joints claimed");
        Ok(())
    }

    /// Drop every claim held by `writer`.
    pub fn release_all(&mut self, writer: JointWriter) {
        let before = self.owners.len();
        self.owners.retain(|_, w| *w != writer);
        let released = before - self.owners.len();
        if released > 0 {
            debug!(%writer, released, "joints released");
        }
    }

    pub fn owner(&self, node: NodeId) -> Option<JointWriter> {
        self.owners.get(&node).copied()
    }

    /// `true` when `node` is unclaimed or claimed by `writer`.
    pub fn is_writable_by(&self, node: NodeId, writer: JointWriter) -> bool {
        self.owner(node).is_none_or(|w| w == writer)
    }

    /// `Ok` when `writer` may write `node`, otherwise the holder.
    pub fn check(&self, node: NodeId, writer: JointWriter) -> Result<(), AvatarError> {
        match self.owner(node) {
            Some(holder) if holder != writer => Err(AvatarError::JointBusy {
                node,
                holder: holder.to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// Whether `writer` currently holds any joint.
    pub fn holds_any(&self, writer: JointWriter) -> bool {
        self.owners.values().any(|w| *w == writer)
    }
}
