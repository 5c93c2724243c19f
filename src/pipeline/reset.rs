use glam::Vec3;
use log::{debug, info};

use super::context::SimContext;
use super::mapping::{MapStats, MappedBuffers};
use super::PipelineConfig;
use crate::config::{WARMUP_ITERATIONS, WARMUP_SOLVER_ITERATIONS, WARMUP_TIME_STEP};
use crate::constraints::rigid::prepare_rigids;
use crate::core::mesh::Aabb;
use crate::core::store::ParticleStore;
use crate::gpu::{DispatchHandle, ReadbackScope, Result, SolverFacade, UploadScope};
use crate::scene::Scene;
use crate::utils::logging::ScopedTimer;

/// Sizes of the simulation rebuilt by a reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetReport {
    pub live_particles: usize,
    /// Padded particle capacity; fixed until the next reset.
    pub capacity: usize,
    pub springs: usize,
    pub rigids: usize,
    pub triangles: usize,
    pub shapes: usize,
    pub warmed_up: bool,
}

/// Tears down and rebuilds every piece of simulation state for one scene.
///
/// The steps run in a fixed order: later ones read what earlier ones derived.
pub struct ResetController<'a> {
    pub config: &'a PipelineConfig,
    pub scene: &'a mut dyn Scene,
    pub solver: &'a mut dyn SolverFacade,
    pub pending: &'a mut Option<DispatchHandle>,
    pub ctx: &'a mut SimContext,
    pub store: &'a mut ParticleStore,
    pub stats: &'a mut MapStats,
}

impl ResetController<'_> {
    pub fn run(self) -> Result<ResetReport> {
        let _timer = ScopedTimer::new("reset");
        let Self {
            config,
            scene,
            solver,
            pending,
            ctx,
            store,
            stats,
        } = self;

        // release everything tied to the previous scene
        if let Some(handle) = pending.take() {
            handle.join();
        }
        solver.release_assets();
        let mut assets = std::mem::take(&mut ctx.assets);
        assets.clear();

        *ctx = SimContext::new(config);
        ctx.assets = assets;
        *store = ParticleStore::new();

        {
            let mut buffers = MappedBuffers::map(store, stats);
            scene.initialize(&mut buffers, ctx);
        }

        prepare_rigids(store);

        store.rebuild_normals();
        scene.post_initialize(store, ctx);
        let live = store.particle_count();
        store.set_active(0..live as u32)?;
        store.seal(live + ctx.num_extra_particles);

        ctx.params.apply_derived_defaults();
        let bounds = scene_bounds(store, ctx).expand(ctx.params.collision_distance);
        ctx.params
            .set_boundary_planes(bounds.min, bounds.max, ctx.floor_tilt);
        ctx.wave.rest_offset = ctx.params.planes[2].w;
        ctx.params.log_summary(ctx.substeps);

        store.validate()?;
        solver.configure(&ctx.params);
        solver.upload(store, UploadScope::Full)?;
        solver.upload_shapes(&store.shapes, &ctx.assets)?;
        ctx.shapes_changed = false;

        if ctx.warmup {
            warm_up(solver, store, ctx)?;
        }

        let report = ResetReport {
            live_particles: live,
            capacity: store.capacity(),
            springs: store.num_springs(),
            rigids: store.num_rigids(),
            triangles: store.num_triangles(),
            shapes: store.shapes.len(),
            warmed_up: ctx.warmup,
        };
        info!(
            "Reset '{}': {} particles ({} capacity), {} springs, {} rigids, {} shapes",
            scene.name(),
            report.live_particles,
            report.capacity,
            report.springs,
            report.rigids,
            report.shapes
        );
        Ok(report)
    }
}

/// Union of the live particle bounds and the collision shape bounds.
fn scene_bounds(store: &ParticleStore, ctx: &SimContext) -> Aabb {
    let bounds = store
        .particle_bounds()
        .union(&store.shapes.bounds(&ctx.assets));
    if bounds.is_empty() {
        Aabb::new(Vec3::ZERO, Vec3::ZERO)
    } else {
        bounds
    }
}

/// Settles the initial state with tiny steps, then restores host velocities.
fn warm_up(solver: &mut dyn SolverFacade, store: &mut ParticleStore, ctx: &SimContext) -> Result<()> {
    info!("Warming up for {WARMUP_ITERATIONS} steps");
    let mut params = ctx.params;
    params.num_iterations = WARMUP_SOLVER_ITERATIONS;
    solver.configure(&params);

    for _ in 0..WARMUP_ITERATIONS {
        solver.dispatch(WARMUP_TIME_STEP, 1).join();
        solver.upload(store, UploadScope::Velocities)?;
    }

    solver.configure(&ctx.params);
    solver.download(store, ReadbackScope::Positions);
    debug!("Warm-up done");
    Ok(())
}
