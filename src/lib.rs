//! Particle Pipeline – frame-synchronized orchestration for particle simulations.
//!
//! This crate owns the particle/constraint data model, the scenes that
//! populate it, and the per-frame map → update → unmap → sync → dispatch →
//! readback loop that keeps host buffers and an external solver in step.

pub mod config;
pub mod constraints;
pub mod core;
pub mod gpu;
pub mod pipeline;
pub mod scene;
pub mod utils;

pub use glam::{Quat, Vec3, Vec4};

pub use constraints::{
    create_rigid_cluster, create_spring, create_spring_grid, create_tethers, GridDesc,
    GridHandle, RigidDesc, TetherDesc,
};
pub use core::{
    make_phase, Aabb, AssetRegistry, ParticleStore, PhaseFlags, ShapeBuffers, SimParams,
    StoreError, TriangleMesh,
};
pub use gpu::{
    AshSolver, CpuSolver, DispatchHandle, ReadbackScope, SolverError, SolverFacade, UploadScope,
};
pub use pipeline::{
    FramePipeline, FrameState, MapStats, MappedBuffers, PipelineConfig, ResetReport, SimContext,
};
pub use scene::{BallDrop, ClothDrape, RigidDrop, RotatingTable, Scene, SceneRegistry};

/// High-level convenience wrapper running the built-in scenes on the CPU solver.
pub struct ParticleSimulation {
    pipeline: FramePipeline,
}

impl ParticleSimulation {
    /// Builds the built-in scene set and resets into the configured scene.
    pub fn new(config: PipelineConfig) -> gpu::Result<Self> {
        Self::with_solver(config, Box::new(CpuSolver::new()))
    }

    /// Same as [`ParticleSimulation::new`] but driving a caller-supplied solver.
    pub fn with_solver(config: PipelineConfig, solver: Box<dyn SolverFacade>) -> gpu::Result<Self> {
        Ok(Self {
            pipeline: FramePipeline::new(config, SceneRegistry::with_builtin(), solver)?,
        })
    }

    /// Advances one frame.
    pub fn step(&mut self) -> gpu::Result<()> {
        self.pipeline.run_frame()
    }

    /// Forwards a key press to the pipeline controls and the active scene.
    pub fn key_down(&mut self, key: char) {
        self.pipeline.handle_key(key);
    }

    /// Host view of the particles, current after the last readback.
    pub fn particles(&mut self) -> &ParticleStore {
        self.pipeline.flush();
        self.pipeline.store()
    }

    pub fn pipeline(&self) -> &FramePipeline {
        &self.pipeline
    }

    pub fn pipeline_mut(&mut self) -> &mut FramePipeline {
        &mut self.pipeline
    }
}
