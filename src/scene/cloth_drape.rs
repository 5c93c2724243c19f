use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use glam::{Quat, Vec3};
use log::info;
use serde::{Deserialize, Serialize};

use super::cloth::{apply_cloth_defaults, ClothConfig, ObstacleConfig};
use super::{store_faces, write_obj_object, Scene};
use crate::config::CLOTH_VELOCITY_JITTER;
use crate::constraints::grid::{create_spring_grid, max_neighbor_distance, rotate_to_vertical, GridHandle};
use crate::constraints::tether::{create_tethers, TetherDesc};
use crate::core::phase::{make_phase, PhaseFlags};
use crate::core::store::ParticleStore;
use crate::pipeline::context::SimContext;
use crate::pipeline::mapping::MappedBuffers;

/// Cloth hung from its two top corners and blown by the procedural wind,
/// next to a static box.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClothDrape {
    pub cloth: ClothConfig,
    pub obstacle: ObstacleConfig,
    pub tether: TetherDesc,
    pub wind_strength: f32,
    #[serde(skip)]
    grid: Option<GridHandle>,
}

/// Where the horizontal lattice is laid out before it is stood up.
const CLOTH_OFFSET: Vec3 = Vec3::new(0.0, 0.0, -3.0);

impl ClothDrape {
    pub fn new(cloth: ClothConfig, obstacle: ObstacleConfig, wind_strength: f32) -> Self {
        Self {
            cloth,
            obstacle,
            wind_strength,
            ..Self::default()
        }
    }

    pub fn grid(&self) -> Option<GridHandle> {
        self.grid
    }

    /// Largest neighbour distance in the lattice; grows when the cloth tears.
    pub fn max_stretch(&self, store: &ParticleStore) -> Option<f32> {
        self.grid
            .map(|g| max_neighbor_distance(store, g.base, g.nx, g.ny))
    }
}

impl Scene for ClothDrape {
    fn name(&self) -> &str {
        "cloth_drape"
    }

    fn initialize(&mut self, buffers: &mut MappedBuffers<'_>, ctx: &mut SimContext) {
        self.cloth.log_summary();
        let store = buffers.store_mut();

        let mesh = self.obstacle.build_mesh();
        let bounds = mesh.bounds;
        let mesh_id = ctx.assets.add_mesh(mesh);
        store
            .shapes
            .add_triangle_mesh(mesh_id, Vec3::ZERO, Quat::IDENTITY, Vec3::ONE);

        let (nx, ny) = self.cloth.resolution_for(&bounds);
        let phase = make_phase(0, PhaseFlags::SELF_COLLIDE);
        let grid = create_spring_grid(store, &self.cloth.grid_desc(CLOTH_OFFSET, nx, ny, phase));
        ctx.params.radius = self.cloth.particle_radius;

        let c1 = grid.index(0, 0);
        let c2 = grid.index(nx - 1, 0);
        store.positions[c1 as usize].w = 0.0;
        store.positions[c2 as usize].w = 0.0;

        rotate_to_vertical(store, grid.range());
        for i in grid.range() {
            store.velocities[i as usize] = ctx.random_unit_vector() * CLOTH_VELOCITY_JITTER;
        }
        let tethers = create_tethers(store, grid.range(), c1, c2, &self.tether);

        apply_cloth_defaults(&mut ctx.params, self.cloth.particle_radius);
        ctx.params.static_friction = 3.18;
        ctx.wind.strength = self.wind_strength;

        info!(
            "Cloth drape: {nx}x{ny} particles, {} springs ({tethers} tethers)",
            store.num_springs()
        );
        self.grid = Some(grid);
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
        let bounds = store.particle_bounds();
        (!bounds.is_empty()).then(|| bounds.center())
    }
}
