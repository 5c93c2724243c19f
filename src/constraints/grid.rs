use std::ops::Range;

use glam::{Vec2, Vec3};

use super::spring::create_spring;
use crate::core::mesh::Aabb;
use crate::core::store::ParticleStore;

/// Row-major lattice index.
#[inline]
pub fn grid_index(x: u32, y: u32, nx: u32) -> u32 {
    y * nx + x
}

/// Layout and material of a cloth lattice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridDesc {
    pub lower: Vec3,
    pub nx: u32,
    pub ny: u32,
    pub nz: u32,
    pub radius: f32,
    pub phase: i32,
    pub stretch_stiffness: f32,
    pub bend_stiffness: f32,
    pub shear_stiffness: f32,
    pub velocity: Vec3,
    pub inv_mass: f32,
    pub extra_spacing: f32,
    pub spacing_radius_mult: f32,
}

impl Default for GridDesc {
    fn default() -> Self {
        Self {
            lower: Vec3::ZERO,
            nx: 2,
            ny: 2,
            nz: 1,
            radius: 0.05,
            phase: 0,
            stretch_stiffness: 1.0,
            bend_stiffness: 0.8,
            shear_stiffness: 0.5,
            velocity: Vec3::ZERO,
            inv_mass: 1.0,
            extra_spacing: 0.0,
            spacing_radius_mult: 1.0,
        }
    }
}

impl GridDesc {
    pub fn spacing(&self) -> f32 {
        self.radius * self.spacing_radius_mult + self.extra_spacing
    }
}

/// Particles created by [`create_spring_grid`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridHandle {
    pub base: u32,
    pub nx: u32,
    pub ny: u32,
    pub nz: u32,
}

impl GridHandle {
    pub fn index(&self, x: u32, y: u32) -> u32 {
        self.base + grid_index(x, y, self.nx)
    }

    pub fn len(&self) -> u32 {
        self.nx * self.ny * self.nz
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn range(&self) -> Range<u32> {
        self.base..self.base + self.len()
    }
}

/// Builds an `nx × ny` cloth lattice (repeated for `nz` layers) with
/// triangles plus stretch, shear and bend springs.
///
/// Particle `(x, y)` of layer `z` sits at `lower + spacing * (x, z, y)`.
pub fn create_spring_grid(store: &mut ParticleStore, desc: &GridDesc) -> GridHandle {
    let base = store.particle_count() as u32;
    let (nx, ny) = (desc.nx, desc.ny);
    let spacing = desc.spacing();
    let layer = nx * ny;

    for z in 0..desc.nz {
        let layer_base = base + z * layer;
        for y in 0..ny {
            for x in 0..nx {
                let position = desc.lower + spacing * Vec3::new(x as f32, z as f32, y as f32);
                store.push_particle(position, desc.inv_mass, desc.velocity, desc.phase);

                if x > 0 && y > 0 {
                    store.triangles.extend([
                        layer_base + grid_index(x - 1, y - 1, nx),
                        layer_base + grid_index(x, y - 1, nx),
                        layer_base + grid_index(x, y, nx),
                    ]);
                    store.triangles.extend([
                        layer_base + grid_index(x - 1, y - 1, nx),
                        layer_base + grid_index(x, y, nx),
                        layer_base + grid_index(x - 1, y, nx),
                    ]);
                    store.triangle_normals.extend([Vec3::Y, Vec3::Y]);
                }
            }
        }
    }

    for z in 0..desc.nz {
        let layer_base = base + z * layer;

        // horizontal
        for y in 0..ny {
            for x in 0..nx {
                let index0 = layer_base + grid_index(x, y, nx);
                if x > 0 {
                    let index1 = layer_base + grid_index(x - 1, y, nx);
                    create_spring(store, index0, index1, desc.stretch_stiffness, 0.0);
                }
                if x > 1 {
                    let index2 = layer_base + grid_index(x - 2, y, nx);
                    create_spring(store, index0, index2, desc.bend_stiffness, 0.0);
                }
                if y > 0 && x < nx - 1 {
                    let diag = layer_base + grid_index(x + 1, y - 1, nx);
                    create_spring(store, index0, diag, desc.shear_stiffness, 0.0);
                }
                if y > 0 && x > 0 {
                    let diag = layer_base + grid_index(x - 1, y - 1, nx);
                    create_spring(store, index0, diag, desc.shear_stiffness, 0.0);
                }
            }
        }

        // vertical
        for x in 0..nx {
            for y in 0..ny {
                let index0 = layer_base + grid_index(x, y, nx);
                if y > 0 {
                    let index1 = layer_base + grid_index(x, y - 1, nx);
                    create_spring(store, index0, index1, desc.stretch_stiffness, 0.0);
                }
                if y > 1 {
                    let index2 = layer_base + grid_index(x, y - 2, nx);
                    create_spring(store, index0, index2, desc.bend_stiffness, 0.0);
                }
            }
        }
    }

    GridHandle {
        base,
        nx,
        ny,
        nz: desc.nz,
    }
}

/// Largest distance between a lattice particle and the neighbours visited
/// before it (top-left, top, top-right, left). Grows when the cloth tears
/// or over-stretches.
pub fn max_neighbor_distance(store: &ParticleStore, base: u32, nx: u32, ny: u32) -> f32 {
    let at = |x: u32, y: u32| store.positions[(base + grid_index(x, y, nx)) as usize].truncate();
    let mut max_dist = 0.0f32;

    for y in 1..ny {
        for x in 1..nx.saturating_sub(1) {
            let center = at(x, y);
            max_dist = max_dist
                .max(center.distance(at(x - 1, y - 1)))
                .max(center.distance(at(x, y - 1)))
                .max(center.distance(at(x + 1, y - 1)))
                .max(center.distance(at(x - 1, y)));
        }
    }

    // top row
    for x in 1..nx {
        max_dist = max_dist.max(at(x, 0).distance(at(x - 1, 0)));
    }

    // outer columns
    if nx > 1 {
        for y in 1..ny {
            let left = at(0, y);
            max_dist = max_dist
                .max(left.distance(at(0, y - 1)))
                .max(left.distance(at(1, y - 1)));

            let right = at(nx - 1, y);
            max_dist = max_dist
                .max(right.distance(at(nx - 2, y - 1)))
                .max(right.distance(at(nx - 2, y)))
                .max(right.distance(at(nx - 1, y - 1)));
        }
    }

    max_dist
}

/// Stands a horizontal lattice up: swaps y and z, then flips y.
pub fn rotate_to_vertical(store: &mut ParticleStore, range: Range<u32>) {
    for i in range {
        let p = &mut store.positions[i as usize];
        let (y, z) = (p.y, p.z);
        p.y = -z;
        p.z = y;
    }
}

/// Cloth extent needed to drape a box: its footprint plus twice its
/// height on each axis.
pub fn bbox_drape(bounds: &Aabb) -> Vec2 {
    let d = bounds.max - bounds.min;
    Vec2::new(d.x + 2.0 * d.y, d.z + 2.0 * d.y)
}

/// Lattice resolution that drapes `bounds` with particles `radius` apart,
/// with 0.1 of slack per axis.
pub fn auto_cloth_size(bounds: &Aabb, radius: f32) -> (u32, u32) {
    let dims = bbox_drape(bounds) + Vec2::splat(0.1);
    (
        (dims.x / radius).ceil().max(1.0) as u32,
        (dims.y / radius).ceil().max(1.0) as u32,
    )
}
