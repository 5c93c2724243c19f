use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use approx::assert_relative_eq;
use parking_lot::Mutex;
use particle_pipeline::gpu::Result;
use particle_pipeline::scene::{ClothConfig, ObstacleConfig, SyncContext};
use particle_pipeline::*;

type Events = Arc<Mutex<Vec<String>>>;

/// Small cloth sheet that records every callback it receives.
struct RecordingScene {
    name: &'static str,
    events: Events,
}

impl RecordingScene {
    fn boxed(name: &'static str, events: &Events) -> Box<dyn Scene> {
        Box::new(Self {
            name,
            events: Arc::clone(events),
        })
    }

    fn log(&self, event: impl Into<String>) {
        self.events.lock().push(event.into());
    }
}

impl Scene for RecordingScene {
    fn name(&self) -> &str {
        self.name
    }

    fn initialize(&mut self, buffers: &mut MappedBuffers<'_>, ctx: &mut SimContext) {
        self.log(format!("initialize:{}", self.name));
        let grid = create_spring_grid(
            buffers.store_mut(),
            &GridDesc {
                lower: Vec3::new(0.0, 1.0, 0.0),
                nx: 4,
                ny: 4,
                radius: 0.1,
                ..GridDesc::default()
            },
        );
        buffers.positions[grid.index(0, 0) as usize].w = 0.0;
        ctx.params.radius = 0.1;
    }

    fn update(&mut self, buffers: &mut MappedBuffers<'_>, _ctx: &mut SimContext) {
        assert!(buffers.is_sealed());
        self.log("update");
    }

    fn sync(&mut self, sync: &mut SyncContext<'_>) {
        assert_eq!(sync.solver.active_count(), sync.store.active_count());
        self.log(if sync.buffers_mapped { "sync:mapped" } else { "sync" });
    }

    fn key_down(&mut self, key: char, _ctx: &mut SimContext) {
        self.log(format!("key:{key}"));
    }
}

fn pipeline_with(config: PipelineConfig) -> (FramePipeline, Events) {
    let events: Events = Arc::default();
    let mut scenes = SceneRegistry::new();
    scenes.register(RecordingScene::boxed("first", &events));
    scenes.register(RecordingScene::boxed("second", &events));
    let pipeline = FramePipeline::new(config, scenes, Box::new(CpuSolver::new()))
        .expect("pipeline should initialize");
    (pipeline, events)
}

/// CPU solver that logs each facade call into the shared event log.
struct RecordingSolver {
    inner: CpuSolver,
    events: Events,
    shape_rotations: Arc<Mutex<Vec<Quat>>>,
    fail_next_upload: Arc<AtomicBool>,
}

impl RecordingSolver {
    fn new(events: &Events) -> Self {
        Self {
            inner: CpuSolver::new(),
            events: Arc::clone(events),
            shape_rotations: Arc::default(),
            fail_next_upload: Arc::default(),
        }
    }

    fn log(&self, event: impl Into<String>) {
        self.events.lock().push(event.into());
    }
}

impl SolverFacade for RecordingSolver {
    fn name(&self) -> &str {
        "recording"
    }

    fn configure(&mut self, params: &SimParams) {
        self.log("configure");
        self.inner.configure(params);
    }

    fn params(&self) -> SimParams {
        self.inner.params()
    }

    fn upload(&mut self, store: &ParticleStore, scope: UploadScope) -> Result<()> {
        self.log(format!("upload:{scope:?}"));
        if self.fail_next_upload.swap(false, Ordering::SeqCst) {
            return Err(SolverError::Device("device lost".into()));
        }
        self.inner.upload(store, scope)
    }

    fn upload_shapes(&mut self, shapes: &ShapeBuffers, assets: &AssetRegistry) -> Result<()> {
        self.log("upload_shapes");
        if let Some(&rotation) = shapes.rotations.first() {
            self.shape_rotations.lock().push(rotation);
        }
        self.inner.upload_shapes(shapes, assets)
    }

    fn dispatch(&mut self, dt: f32, substeps: u32) -> DispatchHandle {
        self.log("dispatch");
        self.inner.dispatch(dt, substeps)
    }

    fn download(&mut self, store: &mut ParticleStore, scope: ReadbackScope) {
        self.log(format!("download:{scope:?}"));
        self.inner.download(store, scope);
    }

    fn active_count(&self) -> usize {
        self.inner.active_count()
    }

    fn release_assets(&mut self) {
        self.inner.release_assets();
    }
}

fn count(events: &Events, name: &str) -> usize {
    events.lock().iter().filter(|e| e.as_str() == name).count()
}

#[test]
fn frames_keep_buffer_sizes_and_balanced_maps() {
    let (mut pipeline, events) = pipeline_with(PipelineConfig {
        extra_particles: 4,
        ..PipelineConfig::default()
    });
    let capacity = pipeline.store().capacity();
    assert_eq!(capacity, 20);

    pipeline.run_frames(10).unwrap();

    let store = pipeline.store();
    assert_eq!(store.positions.len(), capacity);
    assert_eq!(store.velocities.len(), capacity);
    assert_eq!(store.phases.len(), capacity);
    assert_eq!(pipeline.state(), FrameState::Idle);

    let stats = pipeline.map_stats();
    assert!(stats.is_balanced());
    // one map for the initial reset plus one per frame
    assert_eq!(stats.maps, 11);
    assert_eq!(count(&events, "update"), 10);
    assert_eq!(count(&events, "sync"), 10);
    assert_eq!(pipeline.context().frame, 10);
}

#[test]
fn free_particles_fall_and_pinned_ones_stay() {
    let (mut pipeline, _) = pipeline_with(PipelineConfig {
        async_compute: false,
        ..PipelineConfig::default()
    });
    let before = pipeline.store().positions.clone();
    pipeline.run_frames(5).unwrap();
    pipeline.flush();

    let after = &pipeline.store().positions;
    assert_eq!(after[0], before[0]);
    assert!(after[15].y < before[15].y);
}

#[test]
fn async_compute_defers_the_join_to_the_next_map() {
    let (mut pipeline, _) = pipeline_with(PipelineConfig::default());
    pipeline.run_frame().unwrap();
    assert!(pipeline.has_pending_dispatch());
    pipeline.run_frame().unwrap();
    pipeline.flush();
    assert!(!pipeline.has_pending_dispatch());

    let (mut sync, _) = pipeline_with(PipelineConfig {
        async_compute: false,
        ..PipelineConfig::default()
    });
    sync.run_frame().unwrap();
    assert!(!sync.has_pending_dispatch());
}

#[test]
fn paused_frames_map_but_do_not_simulate() {
    let (mut pipeline, events) = pipeline_with(PipelineConfig::default());
    pipeline.handle_key('p');
    pipeline.run_frames(3).unwrap();
    pipeline.flush();

    assert_eq!(count(&events, "update"), 0);
    assert_eq!(count(&events, "sync"), 3);
    assert_eq!(pipeline.context().frame, 0);
    assert!(pipeline.map_stats().is_balanced());

    pipeline.handle_key('o');
    pipeline.run_frames(2).unwrap();
    assert_eq!(count(&events, "update"), 1);
    assert_eq!(pipeline.context().frame, 1);
    assert!(!pipeline.context().step);
}

#[test]
fn keys_reach_the_scene_after_pipeline_controls() {
    let (mut pipeline, events) = pipeline_with(PipelineConfig::default());
    let planes = pipeline.context().params.num_planes;

    pipeline.handle_key('-');
    pipeline.handle_key('g');
    pipeline.handle_key('j');
    pipeline.handle_key('x');

    let ctx = pipeline.context();
    assert_eq!(ctx.params.num_planes, planes.saturating_sub(1));
    assert_eq!(ctx.params.gravity.y, 0.0);
    assert_eq!(ctx.wind.strength, 1.5);
    assert_eq!(count(&events, "key:x"), 1);
    assert_eq!(count(&events, "key:-"), 1);
}

#[test]
fn scene_switch_is_applied_at_the_end_of_the_frame() {
    let (mut pipeline, events) = pipeline_with(PipelineConfig::default());
    assert_eq!(pipeline.scene_name(), "first");

    pipeline.handle_key('2');
    assert_eq!(pipeline.scene_name(), "first");
    pipeline.run_frame().unwrap();

    assert_eq!(pipeline.scene_name(), "second");
    assert_eq!(count(&events, "initialize:second"), 1);
    // the frame itself still ran on the old scene
    let log = events.lock();
    let switch = log.iter().position(|e| e == "initialize:second").unwrap();
    assert_eq!(log[switch - 1], "sync");
}

#[test]
fn digits_past_the_registry_are_ignored() {
    let (mut pipeline, events) = pipeline_with(PipelineConfig::default());
    pipeline.handle_key('9');
    pipeline.run_frame().unwrap();
    assert_eq!(pipeline.scene_name(), "first");
    assert_eq!(count(&events, "initialize:first"), 1);
}

#[test]
fn reset_key_restores_the_initial_state() {
    let (mut pipeline, events) = pipeline_with(PipelineConfig::default());
    let initial = pipeline.store().positions.clone();

    pipeline.run_frames(4).unwrap();
    pipeline.handle_key('r');
    pipeline.run_frame().unwrap();

    assert_eq!(count(&events, "initialize:first"), 2);
    assert_eq!(pipeline.store().positions, initial);
    assert_eq!(pipeline.context().frame, 0);
    assert!(!pipeline.has_pending_dispatch());
}

#[test]
fn picked_particle_is_pinned_until_released() {
    let (mut pipeline, _) = pipeline_with(PipelineConfig {
        async_compute: false,
        ..PipelineConfig::default()
    });
    let target = pipeline.store().positions[5].truncate();
    let origin = target + Vec3::new(0.0, 5.0, 0.0);

    pipeline.pick(origin, -Vec3::Y, 0.05);
    pipeline.run_frame().unwrap();
    assert_eq!(pipeline.picked(), Some(5));
    pipeline.flush();
    assert_eq!(pipeline.store().positions[5].w, 0.0);

    pipeline.release();
    pipeline.run_frame().unwrap();
    pipeline.flush();
    assert_eq!(pipeline.picked(), None);
    assert_eq!(pipeline.store().positions[5].w, 1.0);
}

#[test]
fn unknown_initial_scene_falls_back_to_first() {
    let (pipeline, _) = pipeline_with(PipelineConfig {
        initial_scene: Some("missing".into()),
        ..PipelineConfig::default()
    });
    assert_eq!(pipeline.scene_index(), 0);

    let (pipeline, _) = pipeline_with(PipelineConfig {
        initial_scene: Some("second".into()),
        ..PipelineConfig::default()
    });
    assert_eq!(pipeline.scene_name(), "second");
}

#[test]
fn builtin_simulation_steps_every_scene() {
    for name in ["cloth_drape", "rotating_table", "ball_drop", "rigid_drop"] {
        let mut sim = ParticleSimulation::new(PipelineConfig {
            initial_scene: Some(name.into()),
            ..PipelineConfig::default()
        })
        .unwrap();
        sim.step().unwrap();
        sim.step().unwrap();

        let store = sim.particles();
        assert!(store.validate().is_ok(), "{name} left an invalid store");
        assert!(store.positions.iter().all(|p| p.is_finite()), "{name} produced NaNs");
        assert!(sim.pipeline().map_stats().is_balanced());
    }
}

#[test]
fn one_frame_runs_its_phases_in_order() {
    let events: Events = Arc::default();
    let mut scenes = SceneRegistry::new();
    scenes.register(RecordingScene::boxed("first", &events));
    let mut pipeline = FramePipeline::new(
        PipelineConfig {
            async_compute: false,
            ..PipelineConfig::default()
        },
        scenes,
        Box::new(RecordingSolver::new(&events)),
    )
    .unwrap();
    events.lock().clear();

    pipeline.run_frames(2).unwrap();

    let frame = ["update", "sync", "upload:Dynamic", "configure", "dispatch"];
    let mut expected: Vec<&str> = frame.to_vec();
    // the second frame first applies the readback requested by the first
    expected.push("download:Frame");
    expected.extend(frame);
    assert_eq!(*events.lock(), expected);
    assert_eq!(count(&events, "sync:mapped"), 0);
}

#[test]
fn turning_table_shapes_reach_the_solver_before_each_dispatch() {
    let events: Events = Arc::default();
    let solver = RecordingSolver::new(&events);
    let rotations = Arc::clone(&solver.shape_rotations);
    let cloth = ClothConfig {
        resolution: Some(8),
        ..ClothConfig::default()
    };
    let table = RotatingTable::new(cloth, ObstacleConfig::default());
    let reference = table.clone();

    let mut scenes = SceneRegistry::new();
    scenes.register(Box::new(table));
    let mut pipeline = FramePipeline::new(
        PipelineConfig {
            async_compute: false,
            ..PipelineConfig::default()
        },
        scenes,
        Box::new(solver),
    )
    .unwrap();
    // the reset itself sends the resting table once
    assert_eq!(rotations.lock().as_slice(), &[Quat::IDENTITY]);

    let dt = pipeline.context().dt;
    let frames = ((reference.start_time + 0.5) / dt).ceil() as usize;
    let mut time = 0.0f32;
    for _ in 0..frames {
        events.lock().clear();
        pipeline.run_frame().unwrap();
        time += dt;

        let log = events.lock();
        let shapes = log.iter().position(|e| e == "upload_shapes");
        let dispatch = log.iter().position(|e| e == "dispatch");
        assert!(shapes.is_some() && shapes < dispatch, "shapes not sent before dispatch: {log:?}");

        let sent = *rotations.lock().last().unwrap();
        let expected = reference.rotation_at((time - reference.start_time).max(0.0));
        assert!(sent.abs_diff_eq(expected, 1e-5), "{sent:?} != {expected:?}");
    }

    let (_, angle) = rotations.lock().last().unwrap().to_axis_angle();
    assert!(angle > 0.0);
    assert_relative_eq!(
        angle,
        reference
            .rotation_at(time - reference.start_time)
            .to_axis_angle()
            .1,
        epsilon = 1e-4
    );
}

#[test]
fn failed_upload_leaves_the_pipeline_idle_and_recoverable() {
    let events: Events = Arc::default();
    let solver = RecordingSolver::new(&events);
    let fail = Arc::clone(&solver.fail_next_upload);
    let mut scenes = SceneRegistry::new();
    scenes.register(RecordingScene::boxed("first", &events));
    let mut pipeline =
        FramePipeline::new(PipelineConfig::default(), scenes, Box::new(solver)).unwrap();

    fail.store(true, Ordering::SeqCst);
    let err = pipeline.run_frame().unwrap_err();
    assert!(matches!(err, SolverError::Device(_)));
    assert_eq!(pipeline.state(), FrameState::Idle);
    assert!(pipeline.map_stats().is_balanced());
    assert_eq!(pipeline.context().frame, 0);
    assert!(!pipeline.has_pending_dispatch());

    pipeline.run_frames(2).unwrap();
    assert_eq!(pipeline.state(), FrameState::Idle);
    assert_eq!(pipeline.context().frame, 2);
}
