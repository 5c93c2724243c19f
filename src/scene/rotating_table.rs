use std::f32::consts::PI;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use glam::{Quat, Vec3};
use log::info;
use serde::{Deserialize, Serialize};

use super::cloth::{apply_cloth_defaults, ClothConfig, ObstacleConfig};
use super::{store_faces, write_obj_object, Scene};
use crate::constraints::grid::{create_spring_grid, GridHandle};
use crate::core::phase::{make_phase, PhaseFlags};
use crate::core::store::ParticleStore;
use crate::pipeline::context::SimContext;
use crate::pipeline::mapping::MappedBuffers;

/// Cloth dropped onto a box that starts turning about +Y once it has settled.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RotatingTable {
    pub cloth: ClothConfig,
    pub obstacle: ObstacleConfig,
    /// Height above the obstacle the cloth starts from.
    pub fall_height: f32,
    /// Seconds before the table starts to turn.
    pub start_time: f32,
    pub rotation_speed: f32,
    #[serde(skip)]
    time: f32,
    #[serde(skip)]
    grid: Option<GridHandle>,
    #[serde(skip)]
    table: usize,
}

impl Default for RotatingTable {
    fn default() -> Self {
        Self {
            cloth: ClothConfig::default(),
            obstacle: ObstacleConfig::default(),
            fall_height: 0.01,
            start_time: 1.0,
            rotation_speed: 1.0,
            time: 0.0,
            grid: None,
            table: 0,
        }
    }
}

impl RotatingTable {
    pub fn new(cloth: ClothConfig, obstacle: ObstacleConfig) -> Self {
        Self {
            cloth,
            obstacle,
            ..Self::default()
        }
    }

    /// Table rotation `t` seconds after it started turning.
    ///
    /// Eases in and out, peaking at `2π / 1.5` when `speed * t = π`.
    pub fn rotation_at(&self, t: f32) -> Quat {
        Quat::from_axis_angle(Vec3::Y, PI * (1.0 - (self.rotation_speed * t).cos()) / 1.5)
    }

    pub fn grid(&self) -> Option<GridHandle> {
        self.grid
    }
}

impl Scene for RotatingTable {
    fn name(&self) -> &str {
        "rotating_table"
    }

    fn initialize(&mut self, buffers: &mut MappedBuffers<'_>, ctx: &mut SimContext) {
        self.cloth.log_summary();
        self.time = 0.0;
        let store = buffers.store_mut();

        let mesh = self.obstacle.build_mesh();
        let bounds = mesh.bounds;
        let mesh_id = ctx.assets.add_mesh(mesh);
        self.table = store
            .shapes
            .add_triangle_mesh(mesh_id, Vec3::ZERO, Quat::IDENTITY, Vec3::ONE);

        let (nx, ny) = self.cloth.resolution_for(&bounds);
        let lower = self.cloth.centered_over(&bounds, nx, ny, self.fall_height);
        let phase = make_phase(0, PhaseFlags::SELF_COLLIDE);
        let grid = create_spring_grid(store, &self.cloth.grid_desc(lower, nx, ny, phase));

        ctx.params.radius = self.cloth.particle_radius;
        apply_cloth_defaults(&mut ctx.params, self.cloth.particle_radius);
        ctx.params.relaxation_factor = 1.3;
        ctx.params.static_friction = 0.18;
        ctx.wind.strength = 0.0;

        info!("Rotating table: {nx}x{ny} cloth over {:?}", bounds);
        self.grid = Some(grid);
    }

    fn update(&mut self, buffers: &mut MappedBuffers<'_>, ctx: &mut SimContext) {
        self.time += ctx.dt;
        let t = (self.time - self.start_time).max(0.0);
        let last = (t - ctx.dt).max(0.0);

        let shapes = &mut buffers.store_mut().shapes;
        if self.table >= shapes.len() {
            return;
        }
        let position = shapes.positions[self.table].truncate();
        let prev_position = shapes.prev_positions[self.table].truncate();
        shapes.set_transform_with_prev(
            self.table,
            position,
            self.rotation_at(t),
            prev_position,
            self.rotation_at(last),
        );
        ctx.shapes_changed = true;
    }

    fn export(&self, store: &ParticleStore, path: &Path) -> io::Result<()> {
        let Some(grid) = self.grid else {
            return Ok(());
        };
        let mut out = BufWriter::new(File::create(path.with_extension("cloth.obj"))?);
        let range = grid.range();
        write_obj_object(
            &mut out,
            "cloth",
            &store.positions[range.start as usize..range.end as usize],
            store_faces(store),
        )?;
        out.flush()
    }

    fn center_camera(&self, store: &ParticleStore) -> Option<Vec3> {
        store
            .shapes
            .positions
            .get(self.table)
            .map(|p| p.truncate())
    }
}
