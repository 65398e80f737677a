//! Whole-loop behaviour: detectors → fusion → gesture + smoother → scene.
//!
//! Every test drives [`AvatarLoop::tick`] with explicit timestamps.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use avatar_hal::frame::Frame;
use avatar_hal::scene::{Scene, SceneNode};
use avatar_hal::sim::{SimFrameSource, SimScene};
use avatar_perception::detector::{BodyPart, BodyPose, BoundingBox, FaceDetection, Keypoint};
use avatar_perception::sim::{ScriptedBody, ScriptedFace, VisitorScript};
use avatar_runtime::{AvatarLoop, AvatarLoopConfig, CooldownAnchor, OrientationSmoother, SmootherConfig};
use avatar_types::{AvatarError, GesturePhase, NodeId, TrackingSource, TrackingState, Vec3};

fn ms(v: u64) -> Duration {
    Duration::from_millis(v)
}

// ── Collaborator doubles ─────────────────────────────────────────────────────

/// Where the scripted person stands, in fused coordinates. `None` = nobody.
type Spot = Arc<Mutex<Option<(f32, f32)>>>;

fn spot() -> Spot {
    Arc::new(Mutex::new(None))
}

fn place(spot: &Spot, at: Option<(f32, f32)>) {
    *spot.lock().unwrap() = at;
}

/// Body engine reporting a single nose keypoint at the spot.
fn body_engine(spot: &Spot, score: f32) -> ScriptedBody {
    let spot = Arc::clone(spot);
    ScriptedBody::new(move |frame: &Frame| {
        let Some((x, y)) = *spot.lock().unwrap() else {
            return Ok(None);
        };
        let (w, h) = (frame.width as f32, frame.height as f32);
        Ok(Some(BodyPose {
            keypoints: vec![Keypoint {
                part: BodyPart::Nose,
                x: (1.0 - x) / 2.0 * w,
                y: (y + 1.0) / 2.0 * h,
                score,
            }],
        }))
    })
}

/// A scene shared with the test so faults can be injected mid-run.
#[derive(Clone)]
struct SharedScene(Arc<Mutex<SimScene>>);

impl SharedScene {
    fn new(scene: SimScene) -> Self {
        Self(Arc::new(Mutex::new(scene)))
    }

    fn with<R>(&self, f: impl FnOnce(&mut SimScene) -> R) -> R {
        f(&mut self.0.lock().unwrap())
    }
}

impl Scene for SharedScene {
    fn find_node_by_name(&self, name: &str) -> Option<NodeId> {
        self.0.lock().unwrap().find_node_by_name(name)
    }

    fn list_all_nodes(&self) -> Vec<SceneNode> {
        self.0.lock().unwrap().list_all_nodes()
    }

    fn rotation(&self, node: NodeId) -> Option<Vec3> {
        self.0.lock().unwrap().rotation(node)
    }

    fn set_rotation(&mut self, node: NodeId, rotation: Vec3) -> Result<(), AvatarError> {
        self.0.lock().unwrap().set_rotation(node, rotation)
    }

    fn position(&self, node: NodeId) -> Option<Vec3> {
        self.0.lock().unwrap().position(node)
    }
}

fn avatar_with(config: AvatarLoopConfig, scene: impl Scene + 'static, spot: &Spot) -> AvatarLoop {
    AvatarLoop::new(config, Box::new(scene), Box::new(SimFrameSource::new("cam")))
        .with_face(Ok(Box::new(ScriptedFace::new(|_f, _ts| Ok(None)))))
        .with_body(Ok(Box::new(body_engine(spot, 0.9))))
}

fn no_waves() -> AvatarLoopConfig {
    let mut config = AvatarLoopConfig::default();
    config.gesture.max_consecutive = 0;
    config
}

/// Tick at each `(ms, present)` step; return the step indices where a wave started.
fn run_edges(avatar: &mut AvatarLoop, spot: &Spot, steps: &[(u64, bool)]) -> Vec<usize> {
    let mut started = Vec::new();
    for (i, &(t, present)) in steps.iter().enumerate() {
        place(spot, present.then_some((0.1, 0.0)));
        avatar.tick(ms(t));
        if avatar.gesture().session().is_some_and(|s| s.started_at == ms(t)) {
            started.push(i);
        }
    }
    started
}

/// Tick every 16 ms over `[from, to]`.
fn run_frames(avatar: &mut AvatarLoop, from: u64, to: u64) {
    for t in (from..=to).step_by(16) {
        avatar.tick(ms(t));
    }
}

fn assert_pose(scene: &dyn Scene, expected: &[(NodeId, Vec3)]) {
    for (node, want) in expected {
        let got = scene.rotation(*node).unwrap();
        assert!(
            got.max_abs_diff(want) <= 1e-6,
            "{node} at {got:?}, expected {want:?}"
        );
    }
}

// ── Presence edge & cooldown ─────────────────────────────────────────────────

#[test]
fn presence_edges_inside_cooldown_fire_once() {
    let spot = spot();
    let mut avatar = avatar_with(AvatarLoopConfig::default(), SimScene::robot(), &spot);
    let steps = [(0, false), (200, false), (400, true), (600, true), (800, false), (1000, true)];
    assert_eq!(run_edges(&mut avatar, &spot, &steps), vec![2]);
}

#[test]
fn presence_edges_after_cooldown_fire_twice() {
    let spot = spot();
    let mut avatar = avatar_with(AvatarLoopConfig::default(), SimScene::robot(), &spot);
    let steps = [(0, false), (200, false), (400, true), (3000, true), (4000, false), (5400, true)];
    assert_eq!(run_edges(&mut avatar, &spot, &steps), vec![2, 5]);
}

#[test]
fn edges_4000ms_apart_trigger_once() {
    let spot = spot();
    let mut avatar = avatar_with(AvatarLoopConfig::default(), SimScene::robot(), &spot);
    let steps = [(0, true), (3000, false), (4000, true), (7000, true)];
    assert_eq!(run_edges(&mut avatar, &spot, &steps), vec![0]);
    assert_eq!(avatar.wave_count(), 1);
}

#[test]
fn edges_6000ms_apart_trigger_twice() {
    let spot = spot();
    let mut avatar = avatar_with(AvatarLoopConfig::default(), SimScene::robot(), &spot);
    let steps = [(0, true), (3000, false), (6000, true), (9000, true)];
    assert_eq!(run_edges(&mut avatar, &spot, &steps), vec![0, 2]);
    assert_eq!(avatar.wave_count(), 2);
}

#[test]
fn end_anchored_cooldown_counts_from_restoration() {
    let spot = spot();
    let mut config = AvatarLoopConfig::default();
    config.gesture.cooldown_anchor = CooldownAnchor::End;
    let mut avatar = avatar_with(config, SimScene::robot(), &spot);
    // First wave ends at 2310 ms, so 6000 ms is still inside its cooldown.
    let steps = [(0, true), (3000, false), (6000, true), (7000, false), (7400, true)];
    assert_eq!(run_edges(&mut avatar, &spot, &steps), vec![0, 4]);
}

#[test]
fn consecutive_limit_then_reset() {
    let spot = spot();
    let mut avatar = avatar_with(AvatarLoopConfig::default(), SimScene::robot(), &spot);
    let mut steps = Vec::new();
    for k in 0..4 {
        steps.push((k * 6000, true));
        steps.push((k * 6000 + 3000, false));
    }
    assert_eq!(run_edges(&mut avatar, &spot, &steps), vec![0, 2, 4]);
    assert_eq!(avatar.wave_count(), 3);

    avatar.reset_gesture_limits();
    assert_eq!(run_edges(&mut avatar, &spot, &[(24_100, true)]), vec![0]);
}

#[test]
fn manual_trigger_ignores_the_consecutive_limit() {
    let spot = spot();
    let mut avatar = avatar_with(no_waves(), SimScene::robot(), &spot);
    place(&spot, Some((0.1, 0.0)));
    avatar.tick(ms(0));
    assert_eq!(avatar.gesture_phase(), GesturePhase::Idle);
    assert!(avatar.trigger_gesture(ms(16)).started());
}

// ── Pose restoration ─────────────────────────────────────────────────────────

const RIGS: &[&[&str]] = &[
    &["Hand"],
    &["arm"],
    &["Left Arm"],
    &["Hand LEFT"],
    &["arm", "Hand"],
    &["Right Shoulder", "Hand"],
    &["Right Shoulder", "arm"],
    &["Right Shoulder", "arm", "Hand"],
    &["Left Shoulder", "Left Arm", "Hand LEFT"],
    &["Head", "Right Shoulder", "arm", "Hand", "Left Shoulder", "Hand LEFT"],
];

fn rig_scene(names: &[&str]) -> (SimScene, Vec<(NodeId, Vec3)>) {
    let mut scene = SimScene::new();
    let mut pose = Vec::new();
    for (i, name) in names.iter().enumerate() {
        let k = i as f32 + 1.0;
        let rotation = Vec3::new(0.013 * k, -0.021 * k, 0.7 - 0.05 * k);
        scene = scene.with_node(*name, rotation);
        pose.push((NodeId(i), rotation));
    }
    (scene, pose)
}

#[test]
fn every_rig_returns_to_its_base_pose() {
    for names in RIGS {
        let (scene, pose) = rig_scene(names);
        let mut avatar = AvatarLoop::new(
            AvatarLoopConfig::default(),
            Box::new(scene),
            Box::new(SimFrameSource::new("cam")),
        );
        assert!(avatar.trigger_gesture(ms(0)).started(), "rig {names:?}");
        run_frames(&mut avatar, 16, 2600);
        assert_eq!(avatar.gesture_phase(), GesturePhase::Idle, "rig {names:?}");
        // The head belongs to the smoother, which idles while nobody is there.
        let head = avatar.registry().head();
        let limbs: Vec<_> = pose.into_iter().filter(|(n, _)| Some(*n) != head).collect();
        assert_pose(avatar.scene(), &limbs);
    }
}

#[test]
fn wave_moves_joints_before_restoring() {
    let (scene, pose) = rig_scene(&["Right Shoulder", "arm", "Hand"]);
    let mut avatar = AvatarLoop::new(
        AvatarLoopConfig::default(),
        Box::new(scene),
        Box::new(SimFrameSource::new("cam")),
    );
    avatar.trigger_gesture(ms(0));
    run_frames(&mut avatar, 16, 400);
    assert_eq!(avatar.gesture_phase(), GesturePhase::WaveOscillate);
    let shoulder = avatar.scene().rotation(NodeId(0)).unwrap();
    assert!((shoulder.z - (pose[0].1.z + 0.6)).abs() < 1e-4);
}

#[test]
fn write_error_mid_wave_restores_base_pose() {
    let (sim, pose) = rig_scene(&["Right Shoulder", "arm", "Hand"]);
    let scene = SharedScene::new(sim);
    let hand = NodeId(2);
    let mut avatar = AvatarLoop::new(
        AvatarLoopConfig::default(),
        Box::new(scene.clone()),
        Box::new(SimFrameSource::new("cam")),
    );
    avatar.trigger_gesture(ms(0));
    run_frames(&mut avatar, 16, 688);
    assert_eq!(avatar.gesture_phase(), GesturePhase::WaveOscillate);

    // The hand is mid return stroke at 704 ms.
    scene.with(|s| s.fail_writes_to(hand));
    avatar.tick(ms(704));
    scene.with(|s| s.heal(hand));
    assert_eq!(avatar.gesture_phase(), GesturePhase::Restoring);

    run_frames(&mut avatar, 720, 1200);
    assert_eq!(avatar.gesture_phase(), GesturePhase::Idle);
    assert_eq!(avatar.wave_count(), 1);
    scene.with(|s| assert_pose(s, &pose));
}

#[test]
fn failure_while_restoring_still_ends_the_session() {
    let (sim, pose) = rig_scene(&["Right Shoulder", "arm", "Hand"]);
    let scene = SharedScene::new(sim);
    let hand = NodeId(2);
    let mut avatar = AvatarLoop::new(
        AvatarLoopConfig::default(),
        Box::new(scene.clone()),
        Box::new(SimFrameSource::new("cam")),
    );
    avatar.trigger_gesture(ms(0));
    run_frames(&mut avatar, 16, 688);
    scene.with(|s| s.fail_writes_to(hand));
    run_frames(&mut avatar, 704, 1200);

    assert_eq!(avatar.gesture_phase(), GesturePhase::Idle);
    // Everything except the faulted hand is back on its base pose.
    scene.with(|s| assert_pose(s, &pose[..2]));
    scene.with(|s| s.heal(hand));
    assert!(avatar.trigger_gesture(ms(6000)).started());
}

#[test]
fn shutdown_mid_wave_restores_immediately() {
    let (scene, pose) = rig_scene(&["Right Shoulder", "arm", "Hand"]);
    let mut avatar = AvatarLoop::new(
        AvatarLoopConfig::default(),
        Box::new(scene),
        Box::new(SimFrameSource::new("cam")),
    );
    avatar.trigger_gesture(ms(0));
    run_frames(&mut avatar, 16, 1000);
    assert!(avatar.shutdown(ms(1016)));
    assert_eq!(avatar.gesture_phase(), GesturePhase::Idle);
    assert_pose(avatar.scene(), &pose);
}

#[test]
fn load_scene_mid_wave_restores_old_scene() {
    let (sim, pose) = rig_scene(&["Right Shoulder", "arm", "Hand"]);
    let old = SharedScene::new(sim);
    let mut avatar = AvatarLoop::new(
        AvatarLoopConfig::default(),
        Box::new(old.clone()),
        Box::new(SimFrameSource::new("cam")),
    );
    avatar.trigger_gesture(ms(0));
    run_frames(&mut avatar, 16, 500);
    avatar.load_scene(Box::new(SimScene::robot()), ms(516));
    assert_eq!(avatar.gesture_phase(), GesturePhase::Idle);
    old.with(|s| assert_pose(s, &pose));
    assert!(avatar.registry().head().is_some());
}

// ── Head tracking ────────────────────────────────────────────────────────────

#[test]
fn head_is_left_alone_while_waving() {
    let spot = spot();
    let scene = SharedScene::new(SimScene::robot());
    let mut avatar = avatar_with(AvatarLoopConfig::default(), scene.clone(), &spot);
    let head = avatar.registry().head().unwrap();
    place(&spot, Some((0.8, 0.4)));
    avatar.tick(ms(0));
    assert!(avatar.gesture_phase().is_active());

    let before = scene.with(|s| s.rotation(head).unwrap());
    for t in (16..2300).step_by(16) {
        avatar.tick(ms(t));
        if avatar.gesture_phase().is_active() {
            assert_eq!(scene.with(|s| s.rotation(head).unwrap()), before);
        }
    }
    run_frames(&mut avatar, 2304, 2400);
    assert_ne!(scene.with(|s| s.rotation(head).unwrap()), before);
}

#[test]
fn idle_wander_only_without_presence() {
    let spot = spot();
    let mut avatar = avatar_with(no_waves(), SimScene::robot(), &spot);
    let idle = OrientationSmoother::new(SmootherConfig::default());

    place(&spot, Some((0.5, -0.4)));
    for t in (0..=1000).step_by(16) {
        let tracking = avatar.tick(ms(t));
        assert!(tracking.presence);
        let target = avatar.smoothing().target;
        assert!((target.pitch - tracking.y * 0.2).abs() < 1e-6);
        assert!((target.yaw - tracking.x * 0.3).abs() < 1e-6);
    }

    place(&spot, None);
    let mut dropped_at = None;
    for t in (1008..=1400).step_by(16) {
        let tracking = avatar.tick(ms(t));
        let target = avatar.smoothing().target;
        if tracking.presence {
            assert!((target.yaw - tracking.x * 0.3).abs() < 1e-6);
        } else {
            dropped_at.get_or_insert(t);
            assert_eq!(target, idle.idle_target(ms(t)));
        }
    }
    assert!(dropped_at.is_some());
}

#[test]
fn head_converges_on_a_steady_person() {
    let spot = spot();
    let scene = SharedScene::new(SimScene::robot());
    let mut avatar = avatar_with(no_waves(), scene.clone(), &spot);
    let head = avatar.registry().head().unwrap();
    place(&spot, Some((0.6, 0.5)));
    // (1 - 0.15)^n < 0.01 needs n ≥ 29.
    for i in 0..29 {
        avatar.tick(ms(i * 16));
    }
    let st = avatar.smoothing();
    assert!((st.current.yaw - st.target.yaw).abs() <= 0.01 * st.target.yaw.abs());
    assert!((st.current.pitch - st.target.pitch).abs() <= 0.01 * st.target.pitch.abs());
    let r = scene.with(|s| s.rotation(head).unwrap());
    assert_eq!((r.x, r.y), (st.current.pitch, st.current.yaw));
}

// ── Detection scenarios ──────────────────────────────────────────────────────

#[test]
fn near_face_wins_and_mirrors() {
    // 640×480 frame; box centre (480, 312) covers 0.2 × 0.25 of the frame.
    let face = ScriptedFace::new(|_f, _ts| {
        Ok(Some(FaceDetection {
            bounding_box: BoundingBox {
                origin_x: 416.0,
                origin_y: 252.0,
                width: 128.0,
                height: 120.0,
            },
            confidence: Some(0.8),
        }))
    });
    let mut avatar = AvatarLoop::new(
        no_waves(),
        Box::new(SimScene::robot()),
        Box::new(SimFrameSource::new("cam")),
    )
    .with_face(Ok(Box::new(face)))
    .with_body(Ok(Box::new(ScriptedBody::new(|_f| Ok(None)))));

    let state = avatar.tick(ms(0));
    assert_eq!(state.source, TrackingSource::Face);
    assert!(state.presence && state.proximity);
    assert!((state.x - -0.5).abs() < 1e-5);
    assert!((state.y - -0.3).abs() < 1e-5);
    assert!(!avatar.is_degraded());
}

#[test]
fn body_only_person_is_tracked_without_proximity() {
    let spot = spot();
    let mut avatar = AvatarLoop::new(
        no_waves(),
        Box::new(SimScene::robot()),
        Box::new(SimFrameSource::new("cam")),
    )
    .with_face(Ok(Box::new(ScriptedFace::new(|_f, _ts| Ok(None)))))
    .with_body(Ok(Box::new(body_engine(&spot, 0.5))));
    place(&spot, Some((0.2, 0.1)));

    let state = avatar.tick(ms(0));
    assert_eq!(state.source, TrackingSource::Body);
    assert!(state.presence);
    assert!(!state.proximity);
    assert!((state.x - 0.2).abs() < 1e-5);
    assert!((state.y - 0.1).abs() < 1e-5);
}

#[test]
fn both_detectors_down_means_nobody() {
    let down = |name: &str| AvatarError::DetectorUnavailable {
        detector: name.into(),
        reason: "model failed to load".into(),
    };
    let mut avatar = AvatarLoop::new(
        AvatarLoopConfig::default(),
        Box::new(SimScene::robot()),
        Box::new(SimFrameSource::new("cam")),
    )
    .with_face(Err(down("face")))
    .with_body(Err(down("body")));
    assert!(avatar.is_degraded());
    run_frames(&mut avatar, 0, 500);
    assert_eq!(avatar.tracking(), TrackingState::absent());
    assert_eq!(avatar.wave_count(), 0);
}

#[test]
fn transient_inference_failure_keeps_tracking() {
    let calls = Arc::new(Mutex::new(0u32));
    let counter = Arc::clone(&calls);
    let body = ScriptedBody::new(move |frame: &Frame| {
        let mut n = counter.lock().unwrap();
        *n += 1;
        if *n == 2 {
            return Err(AvatarError::InferenceFailed {
                detector: "body".into(),
                details: "GPU context lost".into(),
            });
        }
        Ok(Some(BodyPose {
            keypoints: vec![Keypoint {
                part: BodyPart::Nose,
                x: frame.width as f32 / 2.0,
                y: frame.height as f32 / 2.0,
                score: 0.9,
            }],
        }))
    });
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let mut avatar = AvatarLoop::new(
        no_waves(),
        Box::new(SimScene::robot()),
        Box::new(SimFrameSource::new("cam")),
    )
    .with_body(Ok(Box::new(body)))
    .on_change(move |s| sink.lock().unwrap().push(*s));

    for t in [0, 100, 200] {
        assert!(avatar.tick(ms(t)).presence);
    }
    assert_eq!(*calls.lock().unwrap(), 3);
    assert_eq!(seen.lock().unwrap().len(), 1);
}

// ── Scripted visit ───────────────────────────────────────────────────────────

#[test]
fn scripted_walk_in_waves_once_and_mimics_up_close() {
    let script = VisitorScript::walk_in();
    let clock = script.clock();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let mut avatar = AvatarLoop::new(
        AvatarLoopConfig::default(),
        Box::new(SimScene::robot()),
        Box::new(SimFrameSource::new("cam")),
    )
    .with_face(Ok(Box::new(script.face_inference())))
    .with_body(Ok(Box::new(script.body_inference())))
    .on_change(move |s| sink.lock().unwrap().push(*s));

    let mut first_presence = None;
    for t in (0..16_000).step_by(16) {
        clock.set(ms(t));
        let state = avatar.tick(ms(t));
        if state.presence && first_presence.is_none() {
            first_presence = Some(t);
            assert_eq!(state.source, TrackingSource::Body);
            assert!(avatar.gesture_phase().is_active());
        }
    }

    let first = first_presence.unwrap();
    assert!((2000..2100).contains(&first));
    assert_eq!(avatar.wave_count(), 1);
    assert_eq!(avatar.gesture_phase(), GesturePhase::Idle);
    assert!(!avatar.tracking().presence);

    let seen = seen.lock().unwrap();
    assert!(seen.iter().any(|s| s.source == TrackingSource::Face && s.proximity));
    assert!(seen.iter().all(|s| !s.proximity || s.source == TrackingSource::Face));
    // Consecutive notifications always differ.
    assert!(seen.windows(2).all(|w| w[0] != w[1]));
}
