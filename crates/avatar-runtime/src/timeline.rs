//! Tween timeline.
//!
//! A [`Timeline`] is a finite set of [`Tween`]s placed at fixed offsets from
//! the timeline's start. Each tween drives some rotation axes of one scene
//! node from wherever they are when the tween starts to absolute target
//! values, shaped by an [`Ease`].
//!
//! Timelines are advanced explicitly with the elapsed time since their start;
//! nothing runs on its own. A tween that reaches its end writes its exact
//! target values, so a sequence ending on a base pose lands on it bit for bit.
//!
//! Placement follows the usual animation-timeline conventions:
//!
//! | Builder call         | Starts at                                   |
//! |----------------------|---------------------------------------------|
//! | [`then`]             | the current end of the timeline             |
//! | [`gap`] + [`then`]   | the current end plus the gap                |
//! | [`with_previous`]    | the start of the most recently added tween  |
//! | [`join`]             | offset 0, merging another timeline          |
//!
//! [`then`]: TimelineBuilder::then
//! [`gap`]: TimelineBuilder::gap
//! [`with_previous`]: TimelineBuilder::with_previous
//! [`join`]: TimelineBuilder::join

use std::time::Duration;

use avatar_hal::scene::Scene;
use avatar_types::{AvatarError, Axis, NodeId, Vec3};

// ────────────────────────────────────────────────────────────────────────────
// Easing
// ────────────────────────────────────────────────────────────────────────────

/// Progress curve mapping `[0, 1]` time to `[0, 1]` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ease {
    Linear,
    Power2In,
    Power2Out,
    Power2InOut,
    SineInOut,
}

impl Ease {
    pub fn apply(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Ease::Linear => t,
            Ease::Power2In => t * t * t,
            Ease::Power2Out => 1.0 - (1.0 - t).powi(3),
            Ease::Power2InOut => {
                if t < 0.5 {
                    4.0 * t * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
                }
            }
            Ease::SineInOut => -((std::f32::consts::PI * t).cos() - 1.0) / 2.0,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tween
// ────────────────────────────────────────────────────────────────────────────

/// Animate some rotation axes of `node` to absolute values.
#[derive(Debug, Clone, PartialEq)]
pub struct Tween {
    pub node: NodeId,
    pub targets: Vec<(Axis, f32)>,
    pub duration: Duration,
    pub ease: Ease,
}

impl Tween {
    pub fn new(node: NodeId, duration: Duration, ease: Ease) -> Self {
        Self {
            node,
            targets: Vec::new(),
            duration,
            ease,
        }
    }

    pub fn to(mut self, axis: Axis, value: f32) -> Self {
        self.targets.retain(|(a, _)| *a != axis);
        self.targets.push((axis, value));
        self
    }

    /// Tween every axis of `node` to `rotation`.
    pub fn to_rotation(node: NodeId, rotation: Vec3, duration: Duration, ease: Ease) -> Self {
        Self::new(node, duration, ease)
            .to(Axis::X, rotation.x)
            .to(Axis::Y, rotation.y)
            .to(Axis::Z, rotation.z)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Progress {
    Pending,
    /// Started; holds the node's rotation as captured at start.
    Running(Vec3),
    Done,
}

#[derive(Debug, Clone)]
struct Entry {
    start: Duration,
    tween: Tween,
    progress: Progress,
}

impl Entry {
    fn end(&self) -> Duration {
        self.start + self.tween.duration
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Builder
// ────────────────────────────────────────────────────────────────────────────

/// Places tweens on a timeline. See the module docs for placement rules.
#[derive(Debug, Clone, Default)]
pub struct TimelineBuilder {
    entries: Vec<Entry>,
    cursor: Duration,
    pending_gap: Duration,
}

impl TimelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Leave `gap` of idle time before the next [`then`](Self::then).
    pub fn gap(mut self, gap: Duration) -> Self {
        self.pending_gap += gap;
        self
    }

    /// Append `tween` at the end of the timeline (plus any pending gap).
    pub fn then(mut self, tween: Tween) -> Self {
        let start = self.cursor + std::mem::take(&mut self.pending_gap);
        self.push(start, tween);
        self
    }

    /// Start `tween` together with the most recently added tween.
    pub fn with_previous(mut self, tween: Tween) -> Self {
        let start = self.entries.last().map(|e| e.start).unwrap_or(self.cursor);
        self.push(start, tween);
        self
    }

    /// Merge `other`, starting it at offset 0 alongside this timeline.
    pub fn join(mut self, other: TimelineBuilder) -> Self {
        let other_end = other.cursor + other.pending_gap;
        for e in other.entries {
            self.cursor = self.cursor.max(e.end());
            self.entries.push(e);
        }
        self.cursor = self.cursor.max(other_end);
        self
    }

    fn push(&mut self, start: Duration, tween: Tween) {
        let entry = Entry {
            start,
            tween,
            progress: Progress::Pending,
        };
        self.cursor = self.cursor.max(entry.end());
        self.entries.push(entry);
    }

    pub fn build(mut self) -> Timeline {
        // Stable sort keeps insertion order for tweens sharing a start.
        self.entries.sort_by_key(|e| e.start);
        Timeline {
            duration: self.cursor + self.pending_gap,
            entries: self.entries,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Timeline
// ────────────────────────────────────────────────────────────────────────────

/// A built, playable timeline.
#[derive(Debug, Clone)]
pub struct Timeline {
    entries: Vec<Entry>,
    duration: Duration,
}

impl Timeline {
    pub fn builder() -> TimelineBuilder {
        TimelineBuilder::new()
    }

    /// Total length including trailing gaps.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Nodes touched by any tween, in first-use order, without duplicates.
    pub fn nodes(&self) -> Vec<NodeId> {
        let mut out: Vec<NodeId> = Vec::new();
        for e in &self.entries {
            if !out.contains(&e.tween.node) {
                out.push(e.tween.node);
            }
        }
        out
    }

    /// `true` once `elapsed` has passed the end and every tween completed.
    pub fn is_finished(&self, elapsed: Duration) -> bool {
        elapsed >= self.duration && self.entries.iter().all(|e| e.progress == Progress::Done)
    }

    /// Bring every tween up to `elapsed` and write the resulting rotations.
    ///
    /// Returns `Ok(true)` when the timeline has finished. The first failed
    /// read or write aborts the advance with that error; tweens already
    /// written this call stay written.
    pub fn advance(&mut self, elapsed: Duration, scene: &mut dyn Scene) -> Result<bool, AvatarError> {
        for entry in &mut self.entries {
            if entry.progress == Progress::Done || elapsed < entry.start {
                continue;
            }
            let node = entry.tween.node;
            let mut current = scene.rotation(node).ok_or_else(|| AvatarError::SceneWrite {
                node,
                details: "node not present in scene".to_string(),
            })?;

            let from = match entry.progress {
                Progress::Running(from) => from,
                _ => {
                    entry.progress = Progress::Running(current);
                    current
                }
            };

            let span = entry.tween.duration.as_secs_f32();
            let raw = if span <= 0.0 {
                1.0
            } else {
                (elapsed - entry.start).as_secs_f32() / span
            };

            if raw >= 1.0 {
                for (axis, to) in &entry.tween.targets {
                    current.set(*axis, *to);
                }
                scene.set_rotation(node, current)?;
                entry.progress = Progress::Done;
            } else {
                let k = entry.tween.ease.apply(raw);
                for (axis, to) in &entry.tween.targets {
                    let start = from.get(*axis);
                    current.set(*axis, start + (to - start) * k);
                }
                scene.set_rotation(node, current)?;
            }
        }
        Ok(self.is_finished(elapsed))
    }
}
