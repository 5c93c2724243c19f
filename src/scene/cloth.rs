use glam::{Quat, Vec3};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::constraints::grid::{auto_cloth_size, GridDesc};
use crate::core::mesh::{Aabb, TriangleMesh};
use crate::core::params::SimParams;

/// Cloth lattice settings shared by the cloth scenes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClothConfig {
    /// Particles per side; `None` sizes the cloth to drape the obstacle.
    pub resolution: Option<u32>,
    pub particle_radius: f32,
    pub inv_mass: f32,
    pub stretch_stiffness: f32,
    pub bend_stiffness: f32,
    pub shear_stiffness: f32,
    pub extra_spacing: f32,
    pub spacing_radius_mult: f32,
}

impl Default for ClothConfig {
    fn default() -> Self {
        Self {
            resolution: Some(64),
            particle_radius: 0.05,
            inv_mass: 1.0,
            stretch_stiffness: 1.0,
            bend_stiffness: 0.8,
            shear_stiffness: 0.5,
            extra_spacing: 0.0,
            spacing_radius_mult: 1.0,
        }
    }
}

impl ClothConfig {
    pub fn spacing(&self) -> f32 {
        self.particle_radius * self.spacing_radius_mult + self.extra_spacing
    }

    /// Lattice size, either fixed (at least 2 per side) or derived from the
    /// obstacle bounds.
    pub fn resolution_for(&self, obstacle: &Aabb) -> (u32, u32) {
        match self.resolution {
            Some(n) => (n.max(2), n.max(2)),
            None => auto_cloth_size(obstacle, self.particle_radius),
        }
    }

    pub fn grid_desc(&self, lower: Vec3, nx: u32, ny: u32, phase: i32) -> GridDesc {
        GridDesc {
            lower,
            nx,
            ny,
            nz: 1,
            radius: self.particle_radius,
            phase,
            stretch_stiffness: self.stretch_stiffness,
            bend_stiffness: self.bend_stiffness,
            shear_stiffness: self.shear_stiffness,
            velocity: Vec3::ZERO,
            inv_mass: self.inv_mass,
            extra_spacing: self.extra_spacing,
            spacing_radius_mult: self.spacing_radius_mult,
        }
    }

    /// Lower corner that centres an `nx × ny` cloth over `bounds`, `height` above it.
    pub fn centered_over(&self, bounds: &Aabb, nx: u32, ny: u32, height: f32) -> Vec3 {
        let center = bounds.center();
        let spacing = self.spacing();
        Vec3::new(
            center.x - 0.5 * nx as f32 * spacing,
            bounds.max.y + height,
            center.z - 0.5 * ny as f32 * spacing,
        )
    }

    pub fn log_summary(&self) {
        debug!("---- Cloth Params ----");
        debug!("resolution:          {:?}", self.resolution);
        debug!("particle_radius:     {}", self.particle_radius);
        debug!("inv_mass:            {}", self.inv_mass);
        debug!("stretch_stiffness:   {}", self.stretch_stiffness);
        debug!("bend_stiffness:      {}", self.bend_stiffness);
        debug!("shear_stiffness:     {}", self.shear_stiffness);
        debug!("extra_spacing:       {}", self.extra_spacing);
        debug!("spacing_radius_mult: {}", self.spacing_radius_mult);
    }
}

/// Box obstacle the cloth falls onto, built in place of an imported mesh.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObstacleConfig {
    pub half_extents: Vec3,
    pub translate: Vec3,
    pub rotate: Quat,
}

impl Default for ObstacleConfig {
    fn default() -> Self {
        Self {
            half_extents: Vec3::splat(0.5),
            translate: Vec3::new(0.0, 0.5, 0.0),
            rotate: Quat::IDENTITY,
        }
    }
}

impl ObstacleConfig {
    pub fn build_mesh(&self) -> TriangleMesh {
        let mut mesh = TriangleMesh::cuboid(self.half_extents);
        mesh.rotate(self.rotate);
        mesh.translate(self.translate);
        mesh
    }
}

/// Fills cloth-friendly values into parameters the user left at zero.
pub fn apply_cloth_defaults(params: &mut SimParams, particle_radius: f32) {
    if params.drag == 0.0 {
        params.drag = 0.05;
    }
    if params.num_iterations == 0 {
        params.num_iterations = 8;
    }
    if params.dynamic_friction == 0.0 {
        params.dynamic_friction = 0.1625;
    }
    if params.collision_distance == 0.0 {
        params.collision_distance = particle_radius;
    }
    if params.shape_collision_margin == 0.0 {
        params.shape_collision_margin = particle_radius * 0.1;
    }
}
