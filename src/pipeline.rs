//! The frame loop: map, scene update, unmap, sync, upload, dispatch, readback.

pub mod context;
pub mod mapping;
pub mod picking;
pub mod reset;
pub mod wind;

pub use context::SimContext;
pub use mapping::{MapStats, MappedBuffers};
pub use picking::ParticlePicker;
pub use reset::{ResetController, ResetReport};
pub use wind::{WavePool, Wind};

use std::time::Instant;

use glam::Vec3;
use log::{info, trace, warn};
use serde::{Deserialize, Serialize};

use crate::config::{DEFAULT_SUBSTEPS, DEFAULT_TIME_STEP, FRAME_BUDGET_MS};
use crate::core::params::SimParams;
use crate::core::store::ParticleStore;
use crate::gpu::{DispatchHandle, ReadbackScope, Result, SolverFacade, UploadScope};
use crate::scene::{SceneRegistry, SyncContext};
use crate::utils::logging::{warn_if_frame_budget_exceeded, ScopedTimer};
use crate::utils::profiling::{FrameProfiler, FrameSample, PhaseTimer};

/// Settings the pipeline rebuilds the simulation from on every reset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Starting parameters; scenes override what they need.
    pub params: SimParams,
    pub dt: f32,
    pub substeps: u32,
    /// Defer joining the dispatch to the next frame's map.
    pub async_compute: bool,
    pub warmup: bool,
    /// Particle slots reserved beyond those created at initialization.
    pub extra_particles: usize,
    pub seed: u64,
    pub initial_scene: Option<String>,
    pub frame_budget_ms: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            params: SimParams::default(),
            dt: DEFAULT_TIME_STEP,
            substeps: DEFAULT_SUBSTEPS,
            async_compute: true,
            warmup: false,
            extra_particles: 0,
            seed: 0,
            initial_scene: None,
            frame_budget_ms: FRAME_BUDGET_MS,
        }
    }
}

/// Position of the pipeline within a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameState {
    Idle,
    Mapped,
    SceneUpdated,
    Synced,
    Dispatching,
    Readback,
}

impl FrameState {
    /// Whether `next` may follow `self`. Paused frames skip `Dispatching`.
    pub fn can_advance_to(self, next: FrameState) -> bool {
        use FrameState::*;
        matches!(
            (self, next),
            (Idle, Mapped)
                | (Mapped, SceneUpdated)
                | (SceneUpdated, Synced)
                | (Synced, Dispatching)
                | (Synced, Readback)
                | (Dispatching, Readback)
                | (Readback, Idle)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reinit {
    Reset,
    Scene(usize),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum PickCommand {
    Pick { origin: Vec3, dir: Vec3, radius: f32 },
    Drag { origin: Vec3, dir: Vec3 },
    Release,
}

/// Owns the store, the solver and the active scene and steps them in lock-step.
pub struct FramePipeline {
    config: PipelineConfig,
    store: ParticleStore,
    stats: MapStats,
    ctx: SimContext,
    scenes: SceneRegistry,
    current: usize,
    solver: Box<dyn SolverFacade>,
    pending: Option<DispatchHandle>,
    readback_requested: bool,
    state: FrameState,
    capacity: usize,
    picker: ParticlePicker,
    pick_commands: Vec<PickCommand>,
    queued: Option<Reinit>,
    profiler: FrameProfiler,
    last_reset: Option<ResetReport>,
}

impl FramePipeline {
    /// Builds the pipeline and runs the first reset on the configured scene.
    ///
    /// An unknown `initial_scene` falls back to the first registered scene.
    pub fn new(
        config: PipelineConfig,
        scenes: SceneRegistry,
        solver: Box<dyn SolverFacade>,
    ) -> Result<Self> {
        assert!(!scenes.is_empty(), "pipeline needs at least one scene");
        let current = match config.initial_scene.as_deref() {
            Some(name) => scenes.index_of(name).unwrap_or_else(|| {
                warn!("Unknown scene '{name}', starting with '{}'", scenes[0].name());
                0
            }),
            None => 0,
        };
        info!("Solver backend: {}", solver.name());

        let mut pipeline = Self {
            ctx: SimContext::new(&config),
            config,
            store: ParticleStore::new(),
            stats: MapStats::default(),
            scenes,
            current,
            solver,
            pending: None,
            readback_requested: false,
            state: FrameState::Idle,
            capacity: 0,
            picker: ParticlePicker::new(),
            pick_commands: Vec::new(),
            queued: None,
            profiler: FrameProfiler::default(),
            last_reset: None,
        };
        pipeline.reinitialize()?;
        Ok(pipeline)
    }

    /// Runs the reset sequence on the current scene immediately.
    pub fn reset(&mut self) -> Result<ResetReport> {
        self.reinitialize()
    }

    /// Queues a reset for the end of the current frame.
    pub fn request_reset(&mut self) {
        if self.queued.is_none() {
            self.queued = Some(Reinit::Reset);
        }
    }

    /// Queues a switch to scene `index`. Returns false if there is no such scene.
    pub fn select_scene(&mut self, index: usize) -> bool {
        if index >= self.scenes.len() {
            warn!("No scene at index {index}");
            return false;
        }
        self.queued = Some(Reinit::Scene(index));
        true
    }

    /// Queues a switch to the scene called `name`.
    pub fn select_scene_by_name(&mut self, name: &str) -> bool {
        match self.scenes.index_of(name) {
            Some(index) => self.select_scene(index),
            None => {
                warn!("No scene named '{name}'");
                false
            }
        }
    }

    /// Applies a keyboard command, then forwards the key to the scene.
    pub fn handle_key(&mut self, key: char) {
        match key {
            'p' => self.ctx.toggle_pause(),
            'o' => self.ctx.step = true,
            'r' => self.request_reset(),
            'g' => self.ctx.toggle_gravity(),
            '-' => self.ctx.remove_plane(),
            'j' => self.ctx.wind.gust(),
            'y' => self.ctx.wave.toggle(),
            '1'..='9' => {
                let index = key as usize - '1' as usize;
                if index < self.scenes.len() {
                    self.select_scene(index);
                }
            }
            _ => {}
        }
        self.scenes[self.current].key_down(key, &mut self.ctx);
    }

    /// Grabs the particle nearest along the ray on the next frame.
    pub fn pick(&mut self, origin: Vec3, dir: Vec3, radius: f32) {
        self.pick_commands.push(PickCommand::Pick {
            origin,
            dir: dir.normalize_or_zero(),
            radius,
        });
    }

    pub fn drag(&mut self, origin: Vec3, dir: Vec3) {
        self.pick_commands.push(PickCommand::Drag {
            origin,
            dir: dir.normalize_or_zero(),
        });
    }

    pub fn release(&mut self) {
        self.pick_commands.push(PickCommand::Release);
    }

    /// Writes the scene's OBJ export during the next frame.
    pub fn request_export(&mut self, path: impl Into<std::path::PathBuf>) {
        self.ctx.request_export(path);
    }

    /// Runs one full frame, then any reset or scene switch queued during it.
    ///
    /// A failed upload returns the error with the pipeline back in
    /// [`FrameState::Idle`]; nothing was dispatched, so the next frame
    /// simply uploads again.
    pub fn run_frame(&mut self) -> Result<()> {
        let frame_start = Instant::now();
        let _timer = ScopedTimer::new("frame");
        let mut sample = FrameSample::default();

        {
            let _wait = PhaseTimer::new(&mut sample.wait);
            self.complete_pending();
        }

        let simulate = self.ctx.is_simulating();
        let scene = &mut self.scenes[self.current];

        {
            let _update = PhaseTimer::new(&mut sample.update);
            let mut buffers = MappedBuffers::map(&mut self.store, &mut self.stats);
            advance(&mut self.state, FrameState::Mapped);

            for command in self.pick_commands.drain(..) {
                match command {
                    PickCommand::Pick {
                        origin,
                        dir,
                        radius,
                    } => {
                        self.picker.pick(&mut buffers, origin, dir, radius);
                    }
                    PickCommand::Drag { origin, dir } => self.picker.drag(origin, dir),
                    PickCommand::Release => self.picker.release(&mut buffers),
                }
            }

            if simulate {
                self.ctx.advance_environment();
                self.picker.apply(&mut buffers, self.ctx.dt);
                scene.update(&mut buffers, &mut self.ctx);
            }

            if let Some(path) = self.ctx.export_path.take() {
                info!("Exporting frame {} to {}", self.ctx.frame, path.display());
                if let Err(err) = scene.export(buffers.store(), &path) {
                    warn!("Export to {} failed: {err}", path.display());
                }
            }
            advance(&mut self.state, FrameState::SceneUpdated);
        }

        {
            let _sync = PhaseTimer::new(&mut sample.sync);
            let mut sync = SyncContext {
                solver: self.solver.as_mut(),
                store: &self.store,
                ctx: &mut self.ctx,
                buffers_mapped: self.stats.is_mapped(),
            };
            scene.sync(&mut sync);
            advance(&mut self.state, FrameState::Synced);
        }

        {
            let _dispatch = PhaseTimer::new(&mut sample.dispatch);
            assert_eq!(
                self.store.capacity(),
                self.capacity,
                "particle buffers resized outside a reset"
            );
            if let Err(err) = self.upload_frame() {
                warn!("Upload for frame {} failed: {err}", self.ctx.frame);
                self.state = FrameState::Idle;
                return Err(err);
            }

            if simulate {
                self.solver.configure(&self.ctx.params);
                let handle = self.solver.dispatch(self.ctx.dt, self.ctx.substeps);
                advance(&mut self.state, FrameState::Dispatching);
                if self.config.async_compute {
                    self.pending = Some(handle);
                } else {
                    handle.join();
                }
                self.ctx.frame += 1;
                self.ctx.step = false;
            }

            self.readback_requested = true;
            advance(&mut self.state, FrameState::Readback);
        }
        advance(&mut self.state, FrameState::Idle);

        sample.total = frame_start.elapsed();
        self.profiler.record(&sample);
        warn_if_frame_budget_exceeded(self.ctx.frame, sample.total, self.config.frame_budget_ms);

        if let Some(reinit) = self.queued.take() {
            if let Reinit::Scene(index) = reinit {
                info!(
                    "Switching scene '{}' -> '{}'",
                    self.scenes[self.current].name(),
                    self.scenes[index].name()
                );
                self.current = index;
            }
            self.reinitialize()?;
        }
        Ok(())
    }

    pub fn run_frames(&mut self, frames: usize) -> Result<()> {
        for _ in 0..frames {
            self.run_frame()?;
        }
        Ok(())
    }

    /// Joins outstanding work and applies the last readback, leaving the
    /// store current with the solver.
    pub fn flush(&mut self) {
        self.complete_pending();
    }

    fn upload_frame(&mut self) -> Result<()> {
        self.solver.upload(&self.store, UploadScope::Dynamic)?;
        if self.ctx.shapes_changed {
            self.solver
                .upload_shapes(&self.store.shapes, &self.ctx.assets)?;
            self.ctx.shapes_changed = false;
        }
        Ok(())
    }

    fn complete_pending(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.join();
        }
        if self.readback_requested {
            self.solver.download(&mut self.store, ReadbackScope::Frame);
            self.readback_requested = false;
        }
    }

    fn reinitialize(&mut self) -> Result<ResetReport> {
        self.picker.clear();
        self.pick_commands.clear();
        self.readback_requested = false;
        self.profiler.reset();

        let report = ResetController {
            config: &self.config,
            scene: &mut self.scenes[self.current],
            solver: self.solver.as_mut(),
            pending: &mut self.pending,
            ctx: &mut self.ctx,
            store: &mut self.store,
            stats: &mut self.stats,
        }
        .run()?;
        self.capacity = report.capacity;
        self.state = FrameState::Idle;
        self.last_reset = Some(report);
        Ok(report)
    }

    pub fn store(&self) -> &ParticleStore {
        &self.store
    }

    pub fn context(&self) -> &SimContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut SimContext {
        &mut self.ctx
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn map_stats(&self) -> MapStats {
        self.stats
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    pub fn profiler(&self) -> &FrameProfiler {
        &self.profiler
    }

    pub fn solver(&self) -> &dyn SolverFacade {
        self.solver.as_ref()
    }

    pub fn scenes(&self) -> &SceneRegistry {
        &self.scenes
    }

    pub fn scene_index(&self) -> usize {
        self.current
    }

    pub fn scene_name(&self) -> &str {
        self.scenes[self.current].name()
    }

    pub fn last_reset(&self) -> Option<ResetReport> {
        self.last_reset
    }

    pub fn picked(&self) -> Option<u32> {
        self.picker.picked()
    }

    /// Whether a dispatch is still deferred to the next map.
    pub fn has_pending_dispatch(&self) -> bool {
        self.pending.is_some()
    }

    /// Point the active scene wants the camera to look at.
    pub fn camera_target(&self) -> Option<Vec3> {
        self.scenes[self.current].center_camera(&self.store)
    }
}

impl Drop for FramePipeline {
    fn drop(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.join();
        }
    }
}

fn advance(state: &mut FrameState, next: FrameState) {
    debug_assert!(
        state.can_advance_to(next),
        "illegal frame transition {state:?} -> {next:?}"
    );
    trace!("frame state {state:?} -> {next:?}");
    *state = next;
}
