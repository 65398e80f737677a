//! Generic `Scene` trait for the renderer that hosts the character.
//!
//! The renderer owns every node. The core keeps only [`NodeId`] handles and
//! goes through this trait whenever it reads or writes a transform, so a
//! failing or detached node surfaces as an [`AvatarError`] instead of a
//! dangling reference.

use avatar_types::{AvatarError, NodeId, Vec3};

/// A named node as reported by [`Scene::list_all_nodes`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneNode {
    pub id: NodeId,
    pub name: String,
}

/// The host scene graph.
pub trait Scene: Send {
    /// First node whose name equals `name` exactly, if any.
    fn find_node_by_name(&self, name: &str) -> Option<NodeId>;

    /// Every node in scene order.
    fn list_all_nodes(&self) -> Vec<SceneNode>;

    /// Current local rotation of `node`, or `None` if the node is unknown.
    fn rotation(&self, node: NodeId) -> Option<Vec3>;

    /// Overwrite the local rotation of `node`.
    ///
    /// # Errors
    ///
    /// Returns [`AvatarError::SceneWrite`] when the renderer rejects the write
    /// (unknown node, node detached, renderer torn down).
    fn set_rotation(&mut self, node: NodeId, rotation: Vec3) -> Result<(), AvatarError>;

    /// Current local position of `node`, or `None` if the node is unknown.
    fn position(&self, node: NodeId) -> Option<Vec3>;
}

