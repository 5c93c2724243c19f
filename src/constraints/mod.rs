//! Builders that append derived constraints to a [`ParticleStore`](crate::core::store::ParticleStore).

pub mod grid;
pub mod rigid;
pub mod spring;
pub mod tether;

pub use grid::{
    auto_cloth_size, bbox_drape, create_spring_grid, grid_index, max_neighbor_distance,
    rotate_to_vertical, GridDesc, GridHandle,
};
pub use rigid::{
    calculate_centers_of_mass, calculate_local_positions, create_rigid_cluster, prepare_rigids,
    RigidDesc,
};
pub use spring::create_spring;
pub use tether::{create_tethers, TetherDesc};
