//! Gesture Controller – the greeting wave.
//!
//! # State machine
//!
//! ```text
//! Idle ──presence edge / manual──▶ Triggered ──▶ LiftToReady ──▶ WaveOscillate ──▶ Restoring ──▶ Idle
//!                                                    │                 │
//!                                                    └──── error ──────┴──────────▶ Restoring
//! ```
//!
//! A presence edge (absent → present) starts a wave when the controller is
//! idle, the cooldown has elapsed and fewer than `max_consecutive` waves have
//! run since the last reset. Manual triggers skip the consecutive limit.
//!
//! # Limb selection
//!
//! | Quality   | Joints                                   | Side order    |
//! |-----------|------------------------------------------|---------------|
//! | Excellent | shoulder + (arm or hand), plus the rest  | right, left   |
//! | Good      | arm + hand                               | right, left   |
//! | Basic     | a single hand or arm                     | RH, LH, RA, LA|
//!
//! # Pose isolation
//!
//! Before anything moves, the controller claims every chosen joint in the
//! [`JointArbiter`] and snapshots its rotation as the base pose. All timeline
//! writes go through the arbiter. The session only ends after every joint is
//! back on its base pose; a write error mid-wave jumps straight to
//! `Restoring`, and an error while restoring writes the base pose directly.

use std::time::Duration;

use avatar_hal::registry::JointRegistry;
use avatar_hal::scene::{Scene, SceneNode};
use avatar_kernel::ownership::{JointArbiter, JointWriter};
use avatar_types::{AvatarError, Axis, GesturePhase, GestureQuality, NodeId, Side, Vec3};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::timeline::{Ease, Timeline, TimelineBuilder, Tween};

// ────────────────────────────────────────────────────────────────────────────
// Wave shape
// ────────────────────────────────────────────────────────────────────────────

const LIFT: Duration = Duration::from_millis(350);
const SHOULDER_LIFT_Z: f32 = 0.6;
const SHOULDER_FORWARD_Y: f32 = 0.2;
const ARM_BEND_Z: f32 = 0.9;

/// `(intensity, stroke duration ms)` per oscillation, gentler and slower.
const STROKES: [(f32, u64); 3] = [(0.4, 150), (0.35, 180), (0.25, 220)];
const ARM_ASSIST: [f32; 3] = [0.15, 0.1, 0.1];

const PHASE_GAP: Duration = Duration::from_millis(50);
const STROKE_GAP: Duration = Duration::from_millis(50);
const RETURN_GAP: Duration = Duration::from_millis(20);
const SETTLE_GAP: Duration = Duration::from_millis(100);
const SETTLE: Duration = Duration::from_millis(250);

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

/// Which moment of a wave the cooldown is measured from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CooldownAnchor {
    #[default]
    Start,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureConfig {
    pub cooldown_ms: u64,
    /// Presence-edge waves allowed before [`GestureController::reset_limits`].
    pub max_consecutive: u32,
    pub cooldown_anchor: CooldownAnchor,
    pub restore_duration_ms: u64,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: 5000,
            max_consecutive: 3,
            cooldown_anchor: CooldownAnchor::Start,
            restore_duration_ms: 250,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Public types
// ────────────────────────────────────────────────────────────────────────────

/// How a wave was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    PresenceEdge,
    Manual,
}

/// Result of a trigger attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    Started {
        session: Uuid,
        side: Side,
        quality: GestureQuality,
    },
    AlreadyActive,
    CoolingDown {
        remaining: Duration,
    },
    LimitReached,
    NoJoints,
    JointsBusy,
}

impl TriggerOutcome {
    pub fn started(&self) -> bool {
        matches!(self, TriggerOutcome::Started { .. })
    }
}

/// The joints one wave will drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaveRig {
    pub side: Side,
    pub quality: GestureQuality,
    pub shoulder: Option<NodeId>,
    pub arm: Option<NodeId>,
    pub hand: Option<NodeId>,
}

impl WaveRig {
    /// Pick the best limb configuration the registry offers.
    pub fn select(registry: &JointRegistry) -> Option<WaveRig> {
        const SIDES: [Side; 2] = [Side::Right, Side::Left];

        let excellent = SIDES.iter().find_map(|&side| {
            let limb = registry.limb(side);
            (limb.shoulder.is_some() && (limb.arm.is_some() || limb.hand.is_some())).then_some(WaveRig {
                side,
                quality: GestureQuality::Excellent,
                shoulder: limb.shoulder,
                arm: limb.arm,
                hand: limb.hand,
            })
        });
        let good = || {
            SIDES.iter().find_map(|&side| {
                let limb = registry.limb(side);
                (limb.arm.is_some() && limb.hand.is_some()).then_some(WaveRig {
                    side,
                    quality: GestureQuality::Good,
                    shoulder: None,
                    arm: limb.arm,
                    hand: limb.hand,
                })
            })
        };
        let basic = || {
            let single = |side: Side, hand: bool| {
                let limb = registry.limb(side);
                let node = if hand { limb.hand } else { limb.arm }?;
                Some(WaveRig {
                    side,
                    quality: GestureQuality::Basic,
                    shoulder: None,
                    arm: (!hand).then_some(node),
                    hand: hand.then_some(node),
                })
            };
            single(Side::Right, true)
                .or_else(|| single(Side::Left, true))
                .or_else(|| single(Side::Right, false))
                .or_else(|| single(Side::Left, false))
        };

        excellent.or_else(good).or_else(basic)
    }

    pub fn nodes(&self) -> Vec<NodeId> {
        [self.shoulder, self.arm, self.hand].into_iter().flatten().collect()
    }
}

/// Live state of one wave, from trigger to restoration.
#[derive(Debug, Clone, PartialEq)]
pub struct GestureSession {
    pub id: Uuid,
    pub rig: WaveRig,
    pub trigger: TriggerKind,
    /// Rotation snapshot of every driven joint, taken before any write.
    pub base_pose: Vec<(NodeId, Vec3)>,
    pub started_at: Duration,
}

impl GestureSession {
    pub fn base_of(&self, node: NodeId) -> Option<Vec3> {
        self.base_pose.iter().find(|(n, _)| *n == node).map(|(_, r)| *r)
    }
}

/// Mutable view of the rig a controller tick needs.
pub struct RigAccess<'a> {
    pub scene: &'a mut dyn Scene,
    pub registry: &'a JointRegistry,
    pub arbiter: &'a mut JointArbiter,
}

// ────────────────────────────────────────────────────────────────────────────
// Ownership-checked scene
// ────────────────────────────────────────────────────────────────────────────

/// Routes rotation writes through the arbiter on behalf of one writer.
struct GuardedScene<'a> {
    inner: &'a mut dyn Scene,
    arbiter: &'a JointArbiter,
    writer: JointWriter,
}

impl Scene for GuardedScene<'_> {
    fn find_node_by_name(&self, name: &str) -> Option<NodeId> {
        self.inner.find_node_by_name(name)
    }

    fn list_all_nodes(&self) -> Vec<SceneNode> {
        self.inner.list_all_nodes()
    }

    fn rotation(&self, node: NodeId) -> Option<Vec3> {
        self.inner.rotation(node)
    }

    fn set_rotation(&mut self, node: NodeId, rotation: Vec3) -> Result<(), AvatarError> {
        self.arbiter.check(node, self.writer)?;
        self.inner.set_rotation(node, rotation)
    }

    fn position(&self, node: NodeId) -> Option<Vec3> {
        self.inner.position(node)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Controller
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct Running {
    timeline: Timeline,
    started_at: Duration,
}

/// Edge-triggered wave state machine.
#[derive(Debug, Default)]
pub struct GestureController {
    config: GestureConfig,
    phase: GesturePhase,
    session: Option<GestureSession>,
    running: Option<Running>,
    last_presence: bool,
    last_gesture_at: Option<Duration>,
    wave_count: u32,
}

impl GestureController {
    pub fn new(config: GestureConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn phase(&self) -> GesturePhase {
        self.phase
    }

    pub fn is_active(&self) -> bool {
        self.phase.is_active()
    }

    pub fn session(&self) -> Option<&GestureSession> {
        self.session.as_ref()
    }

    /// Waves completed since the last [`reset_limits`](Self::reset_limits).
    pub fn wave_count(&self) -> u32 {
        self.wave_count
    }

    pub fn config(&self) -> &GestureConfig {
        &self.config
    }

    /// Clear the consecutive-wave counter and the cooldown.
    pub fn reset_limits(&mut self) {
        info!(previous = self.wave_count, "gesture limits reset");
        self.wave_count = 0;
        self.last_gesture_at = None;
    }

    /// Per-frame entry point: detect a presence edge, then advance the
    /// running timeline. Returns the trigger outcome when an edge was seen.
    pub fn update(&mut self, presence: bool, now: Duration, rig: &mut RigAccess<'_>) -> Option<TriggerOutcome> {
        let rising = presence && !self.last_presence;
        self.last_presence = presence;

        let outcome = rising.then(|| {
            let outcome = self.try_start(TriggerKind::PresenceEdge, now, rig);
            if !outcome.started() {
                debug!(?outcome, "presence edge did not start a wave");
            }
            outcome
        });
        self.advance(now, rig);
        outcome
    }

    /// Operator trigger. Honours the active check and cooldown but not the
    /// consecutive limit.
    pub fn trigger_gesture(&mut self, now: Duration, rig: &mut RigAccess<'_>) -> TriggerOutcome {
        let outcome = self.try_start(TriggerKind::Manual, now, rig);
        self.advance(now, rig);
        outcome
    }

    /// Put every captured joint straight back on its base pose and end the
    /// session. Returns `false` when no wave was running.
    pub fn force_restore(&mut self, now: Duration, rig: &mut RigAccess<'_>) -> bool {
        if self.session.is_none() {
            return false;
        }
        warn!(phase = ?self.phase, "forcing immediate pose restore");
        self.write_base_pose(rig);
        self.finish(now, rig.arbiter);
        true
    }

    fn cooldown_remaining(&self, now: Duration) -> Option<Duration> {
        let cooldown = Duration::from_millis(self.config.cooldown_ms);
        let since = now.saturating_sub(self.last_gesture_at?);
        (since < cooldown).then(|| cooldown - since)
    }

    fn try_start(&mut self, trigger: TriggerKind, now: Duration, rig: &mut RigAccess<'_>) -> TriggerOutcome {
        if self.is_active() {
            return TriggerOutcome::AlreadyActive;
        }
        if let Some(remaining) = self.cooldown_remaining(now) {
            return TriggerOutcome::CoolingDown { remaining };
        }
        if trigger == TriggerKind::PresenceEdge && self.wave_count >= self.config.max_consecutive {
            return TriggerOutcome::LimitReached;
        }
        let Some(wave) = WaveRig::select(rig.registry) else {
            info!("no arm or hand joints found; wave skipped");
            return TriggerOutcome::NoJoints;
        };

        let base_pose: Vec<(NodeId, Vec3)> = wave
            .nodes()
            .into_iter()
            .filter_map(|n| rig.scene.rotation(n).map(|r| (n, r.snapshot())))
            .collect();
        if base_pose.is_empty() {
            return TriggerOutcome::NoJoints;
        }
        let nodes: Vec<NodeId> = base_pose.iter().map(|(n, _)| *n).collect();
        if let Err(e) = rig.arbiter.claim(JointWriter::Gesture, &nodes) {
            warn!(error = %e, "wave joints busy");
            return TriggerOutcome::JointsBusy;
        }

        let session = GestureSession {
            id: Uuid::new_v4(),
            rig: wave,
            trigger,
            base_pose,
            started_at: now,
        };
        self.phase = GesturePhase::Triggered;
        info!(
            session = %session.id,
            side = %wave.side,
            quality = ?wave.quality,
            ?trigger,
            "wave triggered"
        );
        if self.config.cooldown_anchor == CooldownAnchor::Start {
            self.last_gesture_at = Some(now);
        }

        let outcome = TriggerOutcome::Started {
            session: session.id,
            side: wave.side,
            quality: wave.quality,
        };
        self.running = Some(Running {
            timeline: lift_timeline(&session),
            started_at: now,
        });
        self.session = Some(session);
        self.phase = GesturePhase::LiftToReady;
        outcome
    }

    /// Drive the current phase's timeline, chaining into later phases when a
    /// large step finishes more than one.
    fn advance(&mut self, now: Duration, rig: &mut RigAccess<'_>) {
        while let Some(running) = self.running.as_mut() {
            let elapsed = now.saturating_sub(running.started_at);
            let mut guarded = GuardedScene {
                inner: &mut *rig.scene,
                arbiter: &*rig.arbiter,
                writer: JointWriter::Gesture,
            };
            match running.timeline.advance(elapsed, &mut guarded) {
                Ok(false) => return,
                Ok(true) => {
                    let ended_at = running.started_at + running.timeline.duration();
                    if !self.next_phase(ended_at, rig) {
                        return;
                    }
                }
                Err(e) if self.phase == GesturePhase::Restoring => {
                    error!(error = %e, "restore timeline failed; writing base pose directly");
                    self.write_base_pose(rig);
                    self.finish(now, rig.arbiter);
                    return;
                }
                Err(e) => {
                    error!(phase = ?self.phase, error = %e, "wave interrupted; restoring");
                    self.enter_restoring(now);
                    return;
                }
            }
        }
    }

    /// Move past a finished phase. Returns `true` while a timeline is still
    /// running afterwards.
    fn next_phase(&mut self, at: Duration, rig: &mut RigAccess<'_>) -> bool {
        let Some(session) = self.session.as_ref() else {
            self.running = None;
            return false;
        };
        match self.phase {
            GesturePhase::Triggered | GesturePhase::LiftToReady => {
                debug!(session = %session.id, "wave ready; oscillating");
                self.running = Some(Running {
                    timeline: wave_timeline(session),
                    started_at: at,
                });
                self.phase = GesturePhase::WaveOscillate;
                true
            }
            GesturePhase::WaveOscillate => {
                self.enter_restoring(at);
                true
            }
            GesturePhase::Restoring | GesturePhase::Idle => {
                self.finish(at, rig.arbiter);
                false
            }
        }
    }

    fn enter_restoring(&mut self, at: Duration) {
        if let Some(session) = self.session.as_ref() {
            self.running = Some(Running {
                timeline: restore_timeline(session, Duration::from_millis(self.config.restore_duration_ms)),
                started_at: at,
            });
            self.phase = GesturePhase::Restoring;
            debug!(session = %session.id, "restoring base pose");
        }
    }

    fn write_base_pose(&self, rig: &mut RigAccess<'_>) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        for (node, base) in &session.base_pose {
            if let Err(e) = rig.scene.set_rotation(*node, *base) {
                error!(%node, error = %e, "base pose write failed");
            }
        }
    }

    fn finish(&mut self, at: Duration, arbiter: &mut JointArbiter) {
        arbiter.release_all(JointWriter::Gesture);
        if self.config.cooldown_anchor == CooldownAnchor::End {
            self.last_gesture_at = Some(at);
        }
        self.wave_count += 1;
        self.running = None;
        self.phase = GesturePhase::Idle;
        if let Some(session) = self.session.take() {
            info!(
                session = %session.id,
                waves = self.wave_count,
                duration_ms = at.saturating_sub(session.started_at).as_millis() as u64,
                "wave complete"
            );
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Timelines
// ────────────────────────────────────────────────────────────────────────────

fn lift_timeline(session: &GestureSession) -> Timeline {
    let s = session.rig.side.sign();
    let mut tl = Timeline::builder();
    if let Some((node, base)) = session.rig.shoulder.and_then(|n| session.base_of(n).map(|b| (n, b))) {
        tl = tl.then(
            Tween::new(node, LIFT, Ease::Power2Out)
                .to(Axis::Z, base.z + s * SHOULDER_LIFT_Z)
                .to(Axis::Y, base.y + s * SHOULDER_FORWARD_Y),
        );
    }
    if let Some((node, base)) = session.rig.arm.and_then(|n| session.base_of(n).map(|b| (n, b))) {
        tl = tl.with_previous(Tween::new(node, LIFT, Ease::Power2Out).to(Axis::Z, base.z + s * ARM_BEND_Z));
    }
    tl.build()
}

fn wave_timeline(session: &GestureSession) -> Timeline {
    let rig = session.rig;
    let s = rig.side.sign();
    let Some((wave, base)) = rig
        .hand
        .or(rig.arm)
        .and_then(|n| session.base_of(n).map(|b| (n, b)))
    else {
        return Timeline::builder().build();
    };

    let mut track = Timeline::builder().gap(PHASE_GAP);
    for (i, (intensity, stroke_ms)) in STROKES.into_iter().enumerate() {
        let stroke = Duration::from_millis(stroke_ms);
        let first = i == 0;
        track = track
            .gap(STROKE_GAP)
            .then(Tween::new(wave, stroke, Ease::Power2Out).to(Axis::Y, base.y + s * intensity))
            .with_previous(
                Tween::new(wave, stroke.mul_f32(0.7), Ease::SineInOut)
                    .to(Axis::X, base.x + if first { 0.1 } else { 0.05 }),
            )
            .gap(RETURN_GAP)
            .then(
                Tween::new(wave, stroke, Ease::Power2In)
                    .to(Axis::Y, base.y - s * intensity * 0.8)
                    .to(Axis::X, base.x - if first { 0.08 } else { 0.03 })
                    .to(Axis::Z, base.z + s * 0.05),
            );
    }
    track = track
        .gap(SETTLE_GAP)
        .then(Tween::to_rotation(wave, base, SETTLE, Ease::Power2InOut));

    if let (Some(arm), Some(_)) = (rig.arm, rig.hand)
        && let Some(arm_base) = session.base_of(arm)
    {
        track = track.join(arm_assist(arm, arm_base, s));
    }
    track.build()
}

fn arm_assist(arm: NodeId, base: Vec3, s: f32) -> TimelineBuilder {
    let mut track = Timeline::builder().gap(PHASE_GAP);
    for ((_, stroke_ms), intensity) in STROKES.into_iter().zip(ARM_ASSIST) {
        let stroke = Duration::from_millis(stroke_ms);
        track = track
            .gap(STROKE_GAP)
            .then(
                Tween::new(arm, stroke, Ease::Power2Out)
                    .to(Axis::Z, base.z + s * intensity)
                    .to(Axis::X, base.x + 0.05),
            )
            .gap(RETURN_GAP)
            .then(
                Tween::new(arm, stroke, Ease::Power2In)
                    .to(Axis::Z, base.z - s * intensity * 0.5)
                    .to(Axis::X, base.x),
            );
    }
    track.gap(SETTLE_GAP).then(
        Tween::new(arm, SETTLE, Ease::Power2InOut)
            .to(Axis::Z, base.z)
            .to(Axis::X, base.x),
    )
}

fn restore_timeline(session: &GestureSession, duration: Duration) -> Timeline {
    session
        .base_pose
        .iter()
        .fold(Timeline::builder(), |tl, (node, base)| {
            tl.with_previous(Tween::to_rotation(*node, *base, duration, Ease::Power2InOut))
        })
        .build()
}
