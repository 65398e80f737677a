//! [`JointRegistry`] – semantic joint roles resolved to scene nodes.
//!
//! Character assets name their bones inconsistently (`"Right Shoulder"`,
//! `"RightShoulder"`, `"R Shoulder"`, a bare `"arm"` …). Each [`JointRole`]
//! carries an ordered alias list; [`JointRegistry::discover`] walks the roles
//! in a fixed order and claims the first unclaimed node whose name matches one
//! of the role's aliases.
//!
//! # Claim rule
//!
//! A node claimed for one role is never handed to another role in the same
//! pass. An asset with two nodes called `"forearm"` therefore yields the
//! first as the right hand and the second as the left hand.
//!
//! # Missing joints
//!
//! A role with no matching node stays `None`. Discovery never fails: a scene
//! with no recognisable joints loads fine and simply cannot gesture or
//! head-track.

use std::collections::HashSet;
use std::fmt;

use avatar_types::{GestureQuality, NodeId, Side};
use tracing::{debug, info};

use crate::scene::Scene;

// ────────────────────────────────────────────────────────────────────────────
// Roles
// ────────────────────────────────────────────────────────────────────────────

/// A semantic joint the controllers know how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JointRole {
    Head,
    Body,
    Shoulder(Side),
    Arm(Side),
    Hand(Side),
}

impl JointRole {
    /// Order in which roles get to claim nodes. Shoulders go before arms and
    /// hands because they drive the main lift of a wave.
    pub const DISCOVERY_ORDER: [JointRole; 8] = [
        JointRole::Head,
        JointRole::Shoulder(Side::Right),
        JointRole::Shoulder(Side::Left),
        JointRole::Arm(Side::Right),
        JointRole::Arm(Side::Left),
        JointRole::Hand(Side::Right),
        JointRole::Hand(Side::Left),
        JointRole::Body,
    ];

    /// Candidate node names for this role, most specific first.
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            JointRole::Head => &[
                "Head",
                "head",
                "Robot Head",
                "Bot Head",
                "Character Head",
                "Top part",
            ],
            JointRole::Body => &["Body", "body", "Torso", "Chest", "Robot", "Character", "Bot"],
            JointRole::Shoulder(Side::Right) => &[
                "Right Shoulder",
                "RightShoulder",
                "Shoulder Right",
                "R Shoulder",
                "right shoulder",
            ],
            JointRole::Shoulder(Side::Left) => &[
                "Left Shoulder",
                "LeftShoulder",
                "Shoulder Left",
                "L Shoulder",
                "left shoulder",
            ],
            JointRole::Arm(Side::Right) => &[
                "arm",
                "Right Arm",
                "RightArm",
                "Arm Right",
                "R Arm",
                "Upper Arm Right",
                "right arm",
            ],
            // The generic "arm" comes last so it only lands here when the
            // right side did not take it (or the asset has two of them).
            JointRole::Arm(Side::Left) => &[
                "Left Arm",
                "LeftArm",
                "Arm Left",
                "L Arm",
                "Upper Arm Left",
                "left arm",
                "arm",
            ],
            JointRole::Hand(Side::Right) => &[
                "Hand",
                "Hand Instance",
                "forearm",
                "elbow",
                "Right Hand",
                "RightHand",
                "Hand Right",
                "R Hand",
                "Right Forearm",
            ],
            JointRole::Hand(Side::Left) => &[
                "Hand LEFT",
                "Left Hand",
                "LeftHand",
                "Hand Left",
                "L Hand",
                "Left Forearm",
                "LeftForearm",
                "forearm",
                "elbow",
            ],
        }
    }
}

impl fmt::Display for JointRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JointRole::Head => write!(f, "head"),
            JointRole::Body => write!(f, "body"),
            JointRole::Shoulder(side) => write!(f, "{side} shoulder"),
            JointRole::Arm(side) => write!(f, "{side} arm"),
            JointRole::Hand(side) => write!(f, "{side} hand"),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Limb
// ────────────────────────────────────────────────────────────────────────────

/// The three gesture joints on one side of the character.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Limb {
    pub shoulder: Option<NodeId>,
    pub arm: Option<NodeId>,
    pub hand: Option<NodeId>,
}

impl Limb {
    /// Best wave this limb can perform on its own, or `None` if it has
    /// neither an arm nor a hand.
    pub fn quality(&self) -> Option<GestureQuality> {
        match (self.shoulder, self.arm, self.hand) {
            (Some(_), Some(_), _) | (Some(_), _, Some(_)) => Some(GestureQuality::Excellent),
            (None, Some(_), Some(_)) => Some(GestureQuality::Good),
            (_, Some(_), None) | (_, None, Some(_)) => Some(GestureQuality::Basic),
            _ => None,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// JointRegistry
// ────────────────────────────────────────────────────────────────────────────

/// Immutable role → node map built once per scene load.
///
/// Rebuild it with [`JointRegistry::discover`] whenever the scene is
/// reloaded; handles from a previous scene must not be reused.
#[derive(Debug, Clone, Default)]
pub struct JointRegistry {
    head: Option<NodeId>,
    body: Option<NodeId>,
    left: Limb,
    right: Limb,
    found: Vec<(JointRole, String)>,
}

impl JointRegistry {
    /// A registry with every slot empty.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Resolve every [`JointRole`] against `scene`.
    pub fn discover(scene: &dyn Scene) -> Self {
        let nodes = scene.list_all_nodes();
        let mut claimed: HashSet<NodeId> = HashSet::new();
        let mut registry = Self::empty();

        debug!(node_count = nodes.len(), "joint discovery started");

        for role in JointRole::DISCOVERY_ORDER {
            let hit = role.aliases().iter().find_map(|alias| {
                // Fast path through the renderer's own lookup, then fall back
                // to a scan for a later node with the same name.
                match scene.find_node_by_name(alias) {
                    Some(id) if !claimed.contains(&id) => Some((id, *alias)),
                    _ => nodes
                        .iter()
                        .find(|n| n.name == *alias && !claimed.contains(&n.id))
                        .map(|n| (n.id, *alias)),
                }
            });

            if let Some((id, name)) = hit {
                claimed.insert(id);
                registry.assign(role, id);
                registry.found.push((role, name.to_string()));
                debug!(role = %role, node = %id, name, "joint resolved");
            }
        }

        info!(
            resolved = registry.found.len(),
            capability = ?registry.capability(),
            "joint discovery complete"
        );
        registry
    }

    fn assign(&mut self, role: JointRole, id: NodeId) {
        match role {
            JointRole::Head => self.head = Some(id),
            JointRole::Body => self.body = Some(id),
            JointRole::Shoulder(side) => self.limb_mut(side).shoulder = Some(id),
            JointRole::Arm(side) => self.limb_mut(side).arm = Some(id),
            JointRole::Hand(side) => self.limb_mut(side).hand = Some(id),
        }
    }

    fn limb_mut(&mut self, side: Side) -> &mut Limb {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        }
    }

    /// Node resolved for `role`, if any.
    pub fn get(&self, role: JointRole) -> Option<NodeId> {
        match role {
            JointRole::Head => self.head,
            JointRole::Body => self.body,
            JointRole::Shoulder(side) => self.limb(side).shoulder,
            JointRole::Arm(side) => self.limb(side).arm,
            JointRole::Hand(side) => self.limb(side).hand,
        }
    }

    pub fn head(&self) -> Option<NodeId> {
        self.head
    }

    pub fn limb(&self, side: Side) -> &Limb {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    /// Best wave quality achievable with the resolved joints.
    pub fn capability(&self) -> Option<GestureQuality> {
        self.right.quality().max(self.left.quality())
    }

    /// `(role, matched alias)` for every resolved role, in discovery order.
    pub fn found(&self) -> &[(JointRole, String)] {
        &self.found
    }

    pub fn is_empty(&self) -> bool {
        self.found.is_empty()
    }
}
