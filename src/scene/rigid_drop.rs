use glam::{Quat, Vec3};
use log::info;
use serde::{Deserialize, Serialize};

use super::Scene;
use crate::constraints::rigid::{create_rigid_cluster, RigidDesc};
use crate::core::phase::{make_phase, PhaseFlags};
use crate::core::store::ParticleStore;
use crate::pipeline::context::SimContext;
use crate::pipeline::mapping::MappedBuffers;

/// A small stack of particle bricks dropped onto the ground plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RigidDrop {
    pub particle_radius: f32,
    /// Brick edge length in particles.
    pub height: u32,
    pub dim_x: u32,
    pub dim_y: u32,
    pub dim_z: u32,
    /// Rotation of every brick about +Y, in radians.
    pub rotation: f32,
    /// Scale of the random position offset given to each particle.
    pub jitter: f32,
}

impl Default for RigidDrop {
    fn default() -> Self {
        Self {
            particle_radius: 0.1,
            height: 3,
            dim_x: 2,
            dim_y: 1,
            dim_z: 1,
            rotation: 0.3,
            jitter: 0.002,
        }
    }
}

impl RigidDrop {
    pub fn num_bricks(&self) -> u32 {
        self.dim_x * self.dim_y * self.dim_z
    }

    /// Particle lattice filling a box of `half_extents` at `spacing`,
    /// centred on the origin.
    pub fn brick_points(half_extents: Vec3, spacing: f32) -> Vec<Vec3> {
        let counts = ((half_extents * 2.0) / spacing).round().max(Vec3::ONE).as_uvec3();
        let span = (counts - 1).as_vec3() * spacing;
        let origin = -0.5 * span;

        let mut points = Vec::with_capacity((counts.x * counts.y * counts.z) as usize);
        for x in 0..counts.x {
            for y in 0..counts.y {
                for z in 0..counts.z {
                    points.push(origin + Vec3::new(x as f32, y as f32, z as f32) * spacing);
                }
            }
        }
        points
    }
}

impl Scene for RigidDrop {
    fn name(&self) -> &str {
        "rigid_drop"
    }

    fn initialize(&mut self, buffers: &mut MappedBuffers<'_>, ctx: &mut SimContext) {
        let store = buffers.store_mut();
        let radius = self.particle_radius;
        let size = self.height as f32;
        let lower = Vec3::new(0.0, 1.5 + radius * 0.25, 0.0);
        let rotation = Quat::from_rotation_y(self.rotation);
        let spacing = radius * 0.9;
        let local = Self::brick_points(Vec3::splat(radius * 0.9 * size * 0.5), spacing);

        for x in 0..self.dim_x {
            for y in 0..self.dim_y {
                for z in 0..self.dim_z {
                    let cell = Vec3::new(x as f32, y as f32, z as f32);
                    let center = radius * 0.905 * cell * size + radius * 0.1 * cell + lower;
                    let points: Vec<Vec3> = local
                        .iter()
                        .map(|&p| center + rotation * p + ctx.random_unit_vector() * self.jitter)
                        .collect();

                    let group = store.num_rigids() as i32 + 1;
                    create_rigid_cluster(
                        store,
                        &points,
                        &RigidDesc {
                            phase: make_phase(group, PhaseFlags::NONE),
                            ..RigidDesc::default()
                        },
                    );
                }
            }
        }

        let params = &mut ctx.params;
        params.radius = radius;
        params.num_iterations = 8;
        params.dynamic_friction = 0.4;
        params.dissipation = 0.01;
        params.particle_collision_margin = radius * 0.05;
        params.sleep_threshold = radius * 0.25;
        params.shock_propagation = 3.0;
        ctx.substeps = 2;
        ctx.wind.strength = 0.0;

        info!(
            "Rigid drop: {} bricks of {} particles",
            self.num_bricks(),
            local.len()
        );
    }

    fn center_camera(&self, store: &ParticleStore) -> Option<Vec3> {
        let bounds = store.particle_bounds();
        (!bounds.is_empty()).then(|| bounds.center())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::mapping::MapStats;
    use crate::pipeline::PipelineConfig;
    use approx::assert_relative_eq;

    #[test]
    fn brick_lattice_is_centred() {
        let points = RigidDrop::brick_points(Vec3::splat(0.135), 0.09);
        assert_eq!(points.len(), 27);
        let centroid = points.iter().sum::<Vec3>() / points.len() as f32;
        assert_relative_eq!(centroid.length(), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn each_brick_is_its_own_cluster_and_group() {
        let mut scene = RigidDrop::default();
        let mut store = ParticleStore::new();
        let mut stats = MapStats::default();
        let mut ctx = SimContext::new(&PipelineConfig::default());
        scene.initialize(&mut MappedBuffers::map(&mut store, &mut stats), &mut ctx);

        assert_eq!(store.num_rigids(), 2);
        assert_eq!(store.num_springs(), 0);
        assert_eq!(store.rigid_offsets, vec![0, 27, 54]);
        assert_ne!(store.phases[0], store.phases[27]);
        assert_eq!(ctx.substeps, 2);
        assert_eq!(ctx.params.shock_propagation, 3.0);
    }
}
