use approx::assert_relative_eq;
use particle_pipeline::constraints::{grid_index, prepare_rigids};
use particle_pipeline::*;

fn count_with_stiffness(store: &ParticleStore, stiffness: f32) -> usize {
    store
        .spring_stiffness
        .iter()
        .filter(|&&s| s == stiffness)
        .count()
}

#[test]
fn four_by_four_grid_has_expected_spring_families() {
    let mut store = ParticleStore::new();
    let desc = GridDesc {
        nx: 4,
        ny: 4,
        stretch_stiffness: 1.0,
        bend_stiffness: 0.8,
        shear_stiffness: 0.5,
        ..GridDesc::default()
    };
    let grid = create_spring_grid(&mut store, &desc);
    let (nx, ny) = (4, 4);

    assert_eq!(count_with_stiffness(&store, 1.0), (nx - 1) * ny + nx * (ny - 1));
    assert_eq!(count_with_stiffness(&store, 0.5), 2 * (nx - 1) * (ny - 1));
    assert_eq!(count_with_stiffness(&store, 0.8), (nx - 2) * ny + nx * (ny - 2));
    assert_eq!(store.spring_indices.len(), 2 * store.num_springs());

    assert_eq!(grid.index(2, 3), grid_index(2, 3, 4));
    assert_eq!(grid.index(2, 3), 14);
    assert_eq!(store.num_triangles(), 2 * 3 * 3);
    assert_eq!(store.triangle_normals.len(), store.num_triangles());
}

#[test]
fn single_row_grid_has_no_shear_or_vertical_springs() {
    let mut store = ParticleStore::new();
    create_spring_grid(
        &mut store,
        &GridDesc {
            nx: 5,
            ny: 1,
            ..GridDesc::default()
        },
    );
    // four structural plus three bend
    assert_eq!(store.num_springs(), 7);
    assert_eq!(store.num_triangles(), 0);
}

#[test]
fn tethers_on_a_row_are_bit_exact() {
    let mut store = ParticleStore::new();
    let row = create_spring_grid(
        &mut store,
        &GridDesc {
            nx: 8,
            ny: 1,
            radius: 0.1,
            ..GridDesc::default()
        },
    );
    let before = store.num_springs();
    let initial: Vec<Vec3> = store.positions.iter().map(|p| p.truncate()).collect();
    let desc = TetherDesc::default();
    let (c1, c2) = (row.index(0, 0), row.index(7, 0));

    let added = create_tethers(&mut store, row.range(), c1, c2, &desc);
    assert_eq!(added, 2 * (8 - 2));

    for (k, i) in (1..7u32).enumerate() {
        let spring = before + 2 * k;
        let p = initial[i as usize];
        for (offset, anchor) in [(0, c1), (1, c2)] {
            let d2 = initial[anchor as usize].distance_squared(p);
            let expected = -desc.stiffness * (-d2 / 0.2f32).exp();
            let s = spring + offset;
            assert_eq!(store.spring_stiffness[s].to_bits(), expected.to_bits());
            assert_eq!(store.spring_indices[2 * s], anchor);
            assert_eq!(store.spring_indices[2 * s + 1], i);
        }
    }
}

#[test]
fn rigid_cube_offsets_and_local_positions() {
    let mut store = ParticleStore::new();
    let mut cube = TriangleMesh::cuboid(Vec3::splat(0.5));
    cube.translate(Vec3::new(1.0, 2.0, 0.0));

    create_rigid_cluster(
        &mut store,
        &cube.vertices,
        &RigidDesc {
            phase: make_phase(1, PhaseFlags::NONE),
            ..RigidDesc::default()
        },
    );
    prepare_rigids(&mut store);

    assert_eq!(store.rigid_offsets, vec![0, 8]);
    assert_eq!(store.rigid_coefficients.len(), 1);
    assert_eq!(store.num_springs(), 0);
    let centroid = cube.vertices.iter().sum::<Vec3>() / 8.0;
    for (local, v) in store.rigid_local_positions.iter().zip(&cube.vertices) {
        let expected = *v - centroid;
        assert_relative_eq!(local.x, expected.x, epsilon = 1e-6);
        assert_relative_eq!(local.y, expected.y, epsilon = 1e-6);
        assert_relative_eq!(local.z, expected.z, epsilon = 1e-6);
    }
}

#[test]
fn rigid_offsets_stay_monotonic_across_clusters() {
    let mut store = ParticleStore::new();
    let cube = TriangleMesh::cuboid(Vec3::ONE);
    for n in [8, 3, 0, 5] {
        create_rigid_cluster(&mut store, &cube.vertices[..n], &RigidDesc::default());
    }

    assert_eq!(store.rigid_offsets[0], 0);
    assert!(store.rigid_offsets.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(
        *store.rigid_offsets.last().unwrap() as usize,
        store.rigid_indices.len()
    );
    assert_eq!(store.num_rigids(), 4);
    assert!(store.validate().is_ok());
}

#[test]
fn malformed_springs_fail_validation() {
    let mut store = ParticleStore::new();
    store.push_particle(Vec3::ZERO, 1.0, Vec3::ZERO, 0);
    store.push_particle(Vec3::X, 1.0, Vec3::ZERO, 0);
    create_spring(&mut store, 0, 1, 1.0, 0.0);
    store.spring_indices.push(1);

    assert!(matches!(store.validate(), Err(StoreError::OddSpringIndices(3))));
}

#[test]
fn springs_past_capacity_fail_validation() {
    let mut store = ParticleStore::new();
    store.push_particle(Vec3::ZERO, 1.0, Vec3::ZERO, 0);
    store.spring_indices.extend([0, 4]);
    store.spring_lengths.push(1.0);
    store.spring_stiffness.push(1.0);

    assert!(matches!(
        store.validate(),
        Err(StoreError::IndexOutOfRange { index: 4, .. })
    ));
}
