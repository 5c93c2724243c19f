use glam::{Quat, Vec3, Vec4};

use crate::core::store::ParticleStore;

/// Per-cluster parameters for [`create_rigid_cluster`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RigidDesc {
    pub phase: i32,
    pub velocity: Vec3,
    pub inv_mass: f32,
    /// Shape-matching stiffness in `[0, 1]`.
    pub coefficient: f32,
    /// Deformation beyond which the rest shape creeps; 0 disables plasticity.
    pub plastic_threshold: f32,
    pub plastic_creep: f32,
}

impl Default for RigidDesc {
    fn default() -> Self {
        Self {
            phase: 0,
            velocity: Vec3::ZERO,
            inv_mass: 1.0,
            coefficient: 1.0,
            plastic_threshold: 0.0,
            plastic_creep: 0.0,
        }
    }
}

/// Appends `vertices` as one shape-matched cluster and returns its index.
///
/// The particles are not connected by springs; the cluster holds them
/// together.
pub fn create_rigid_cluster(store: &mut ParticleStore, vertices: &[Vec3], desc: &RigidDesc) -> usize {
    if store.rigid_offsets.is_empty() {
        store.rigid_offsets.push(0);
    }
    let cluster = store.num_rigids();

    for &v in vertices {
        let index = store.push_particle(v, desc.inv_mass, desc.velocity, desc.phase);
        store.rigid_indices.push(index);
    }

    store.rigid_offsets.push(store.rigid_indices.len() as u32);
    store.rigid_coefficients.push(desc.coefficient);
    store.rigid_plastic_thresholds.push(desc.plastic_threshold);
    store.rigid_plastic_creeps.push(desc.plastic_creep);
    cluster
}

/// Sets each cluster's translation to the mean of its particle positions.
pub fn calculate_centers_of_mass(store: &mut ParticleStore) {
    let mut translations = Vec::with_capacity(store.num_rigids());
    for window in store.rigid_offsets.windows(2) {
        let (start, end) = (window[0] as usize, window[1] as usize);
        let members = &store.rigid_indices[start..end];
        let sum: Vec3 = members
            .iter()
            .map(|&i| store.positions[i as usize].truncate())
            .sum();
        translations.push(if members.is_empty() {
            Vec3::ZERO
        } else {
            sum / members.len() as f32
        });
    }
    store.rigid_translations = translations;
}

/// Rest offsets of each cluster member from its cluster translation.
pub fn calculate_local_positions(store: &mut ParticleStore) {
    let mut local = Vec::with_capacity(store.rigid_indices.len());
    for (cluster, window) in store.rigid_offsets.windows(2).enumerate() {
        let center = store.rigid_translations[cluster];
        for &i in &store.rigid_indices[window[0] as usize..window[1] as usize] {
            local.push(store.positions[i as usize].truncate() - center);
        }
    }
    store.rigid_local_positions = local;
}

/// Derives every rigid field the solver needs but the scene did not supply.
///
/// Centers of mass are computed only when no translations were given;
/// local positions are always recomputed from the current pose.
pub fn prepare_rigids(store: &mut ParticleStore) {
    if store.rigid_offsets.is_empty() {
        return;
    }
    assert!(
        store.rigid_offsets.len() > 1,
        "rigid offsets present without any cluster"
    );
    assert_eq!(
        store.rigid_offsets.last().copied().unwrap_or(0) as usize,
        store.rigid_indices.len(),
        "rigid offsets disagree with rigid indices"
    );

    let rigids = store.num_rigids();
    if store.rigid_translations.is_empty() {
        calculate_centers_of_mass(store);
    }
    calculate_local_positions(store);
    store.rigid_rotations.resize(rigids, Quat::IDENTITY);
    store
        .rigid_local_normals
        .resize(store.rigid_indices.len(), Vec4::ZERO);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::mesh::TriangleMesh;
    use approx::assert_relative_eq;

    #[test]
    fn cluster_offsets_are_prefix_sums() {
        let mut store = ParticleStore::new();
        let cube = TriangleMesh::cuboid(Vec3::splat(0.5));

        assert_eq!(create_rigid_cluster(&mut store, &cube.vertices, &RigidDesc::default()), 0);
        assert_eq!(create_rigid_cluster(&mut store, &cube.vertices[..4], &RigidDesc::default()), 1);

        assert_eq!(store.rigid_offsets, vec![0, 8, 12]);
        assert_eq!(store.rigid_indices.len(), 12);
        assert_eq!(store.rigid_coefficients.len(), 2);
        assert_eq!(store.num_springs(), 0);
    }

    #[test]
    fn local_positions_are_relative_to_centroid() {
        let mut store = ParticleStore::new();
        let mut cube = TriangleMesh::cuboid(Vec3::ONE);
        cube.translate(Vec3::new(2.0, 3.0, 4.0));
        create_rigid_cluster(&mut store, &cube.vertices, &RigidDesc::default());
        prepare_rigids(&mut store);

        assert_relative_eq!(store.rigid_translations[0].x, 2.0, epsilon = 1e-6);
        assert_relative_eq!(store.rigid_translations[0].y, 3.0, epsilon = 1e-6);
        for (local, v) in store.rigid_local_positions.iter().zip(&cube.vertices) {
            assert_relative_eq!(local.length(), (*v - Vec3::new(2.0, 3.0, 4.0)).length(), epsilon = 1e-5);
        }
        assert_eq!(store.rigid_rotations, vec![Quat::IDENTITY]);
        assert_eq!(store.rigid_local_normals.len(), 8);
    }

    #[test]
    fn supplied_translations_are_kept() {
        let mut store = ParticleStore::new();
        create_rigid_cluster(&mut store, &[Vec3::ZERO, Vec3::X], &RigidDesc::default());
        store.rigid_translations.push(Vec3::ZERO);
        prepare_rigids(&mut store);

        assert_eq!(store.rigid_translations, vec![Vec3::ZERO]);
        assert_eq!(store.rigid_local_positions[1], Vec3::X);
    }
}
