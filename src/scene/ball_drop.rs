use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use glam::{Quat, Vec3};
use log::info;
use serde::{Deserialize, Serialize};

use super::cloth::ClothConfig;
use super::{store_faces, write_obj_object, Scene};
use crate::config::CLOTH_VELOCITY_JITTER;
use crate::constraints::grid::{create_spring_grid, rotate_to_vertical};
use crate::constraints::rigid::{create_rigid_cluster, RigidDesc};
use crate::constraints::tether::{create_tethers, TetherDesc};
use crate::core::mesh::TriangleMesh;
use crate::core::phase::{make_phase, PhaseFlags};
use crate::core::store::ParticleStore;
use crate::pipeline::context::SimContext;
use crate::pipeline::mapping::MappedBuffers;

/// A heavy rigid ball thrown into a hanging cloth above a ground slab.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BallDrop {
    pub cloth: ClothConfig,
    pub ball_radius: f32,
    /// Ball offset, given with y and z swapped like the cloth layout.
    pub ball_translate: Vec3,
    pub ball_velocity: Vec3,
    pub ball_inv_mass: f32,
    pub ground_size: f32,
    pub fall_height: f32,
    #[serde(skip)]
    ball: Option<TriangleMesh>,
    #[serde(skip)]
    cloth_count: u32,
}

impl Default for BallDrop {
    fn default() -> Self {
        Self {
            cloth: ClothConfig {
                resolution: Some(48),
                ..ClothConfig::default()
            },
            ball_radius: 0.3,
            ball_translate: Vec3::new(1.2, -1.0, 1.0),
            ball_velocity: Vec3::new(0.0, -1.0, 1.2),
            ball_inv_mass: 0.001,
            ground_size: 8.0,
            fall_height: 1.0,
            ball: None,
            cloth_count: 0,
        }
    }
}

impl BallDrop {
    /// First particle index of the ball cluster.
    pub fn ball_start(&self) -> u32 {
        self.cloth_count
    }
}

impl Scene for BallDrop {
    fn name(&self) -> &str {
        "ball_drop"
    }

    fn initialize(&mut self, buffers: &mut MappedBuffers<'_>, ctx: &mut SimContext) {
        let store = buffers.store_mut();
        let mut group = 0;

        let ground = ctx.assets.add_mesh(TriangleMesh::plane(self.ground_size));
        store
            .shapes
            .add_triangle_mesh(ground, Vec3::ZERO, Quat::IDENTITY, Vec3::ONE);

        let t = self.ball_translate;
        let mut ball = TriangleMesh::sphere(self.ball_radius, 8, 12);
        ball.translate(Vec3::new(t.x, t.z, t.y));
        let bounds = ball.bounds;

        let (nx, ny) = self.cloth.resolution_for(&bounds);
        let lower = self.cloth.centered_over(&bounds, nx, ny, self.fall_height);
        let phase = make_phase(group, PhaseFlags::SELF_COLLIDE);
        group += 1;
        let grid = create_spring_grid(store, &self.cloth.grid_desc(lower, nx, ny, phase));
        ctx.params.radius = self.cloth.particle_radius;

        let c1 = grid.index(0, 0);
        let c2 = grid.index(nx - 1, 0);
        store.positions[c1 as usize].w = 0.0;
        store.positions[c2 as usize].w = 0.0;

        rotate_to_vertical(store, grid.range());
        for i in grid.range() {
            store.velocities[i as usize] = ctx.random_unit_vector() * CLOTH_VELOCITY_JITTER;
        }
        create_tethers(store, grid.range(), c1, c2, &TetherDesc::default());

        self.cloth_count = store.particle_count() as u32;
        create_rigid_cluster(
            store,
            &ball.vertices,
            &RigidDesc {
                phase: make_phase(group, PhaseFlags::NONE),
                velocity: self.ball_velocity,
                inv_mass: self.ball_inv_mass,
                ..RigidDesc::default()
            },
        );
        ctx.params.static_friction = 3.18;

        info!(
            "Ball drop: {nx}x{ny} cloth, ball of {} particles",
            ball.vertices.len()
        );
        self.ball = Some(ball);
    }

    fn export(&self, store: &ParticleStore, path: &Path) -> io::Result<()> {
        let Some(ball) = &self.ball else {
            return Ok(());
        };
        let start = self.cloth_count;
        let end = start + ball.vertices.len() as u32;
        let mut out = BufWriter::new(File::create(path.with_extension("obj"))?);

        write_obj_object(
            &mut out,
            "cloth",
            &store.positions[..start as usize],
            store_faces(store),
        )?;
        write_obj_object(
            &mut out,
            "object",
            &store.positions[start as usize..end as usize],
            ball.indices
                .iter()
                .map(|&[a, b, c]| [a + start, b + start, c + start]),
        )?;
        out.flush()
    }

    fn center_camera(&self, store: &ParticleStore) -> Option<Vec3> {
        store.rigid_translations.first().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::mapping::MapStats;
    use crate::pipeline::PipelineConfig;

    #[test]
    fn ball_follows_the_cloth() {
        let mut scene = BallDrop {
            cloth: ClothConfig {
                resolution: Some(6),
                ..ClothConfig::default()
            },
            ..BallDrop::default()
        };
        let mut store = ParticleStore::new();
        let mut stats = MapStats::default();
        let mut ctx = SimContext::new(&PipelineConfig::default());
        {
            let mut buffers = MappedBuffers::map(&mut store, &mut stats);
            scene.initialize(&mut buffers, &mut ctx);
        }

        assert_eq!(scene.ball_start(), 36);
        assert_eq!(store.num_rigids(), 1);
        assert_eq!(store.rigid_indices[0], 36);
        assert_eq!(store.positions[36].w, scene.ball_inv_mass);
        assert_eq!(store.velocities[36], scene.ball_velocity);
        assert_eq!(store.shapes.len(), 1);
        assert!(stats.is_balanced());
    }

    #[test]
    fn export_writes_cloth_then_object() {
        let mut scene = BallDrop {
            cloth: ClothConfig {
                resolution: Some(3),
                ..ClothConfig::default()
            },
            ..BallDrop::default()
        };
        let mut store = ParticleStore::new();
        let mut stats = MapStats::default();
        let mut ctx = SimContext::new(&PipelineConfig::default());
        scene.initialize(&mut MappedBuffers::map(&mut store, &mut stats), &mut ctx);

        let path = std::env::temp_dir().join(format!("ball_drop_export_{}", std::process::id()));
        scene.export(&store, &path).unwrap();
        let text = std::fs::read_to_string(path.with_extension("obj")).unwrap();
        let cloth = text.find("o cloth").unwrap();
        let object = text.find("o object").unwrap();
        assert!(cloth < object);
        // first object face is offset past the nine cloth vertices
        let first_object_face = text[object..].lines().find(|l| l.starts_with("f ")).unwrap();
        let min_index = first_object_face[2..]
            .split_whitespace()
            .map(|i| i.parse::<u32>().unwrap())
            .min()
            .unwrap();
        assert!(min_index >= 10);
        let _ = std::fs::remove_file(path.with_extension("obj"));
    }
}
