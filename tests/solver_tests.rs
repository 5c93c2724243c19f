use approx::assert_relative_eq;
use particle_pipeline::*;

fn sealed(points: &[(Vec3, f32)], extra: usize) -> ParticleStore {
    let mut store = ParticleStore::new();
    for &(p, w) in points {
        store.push_particle(p, w, Vec3::ZERO, 0);
    }
    let live = store.particle_count();
    store.set_active(0..live as u32).unwrap();
    store.seal(live + extra);
    store
}

fn no_planes() -> SimParams {
    SimParams {
        num_planes: 0,
        ..SimParams::default()
    }
}

#[test]
fn dynamic_upload_rejects_resized_buffers() {
    let mut solver = CpuSolver::new();
    let store = sealed(&[(Vec3::ZERO, 1.0)], 2);
    solver.upload(&store, UploadScope::Full).unwrap();

    let bigger = sealed(&[(Vec3::ZERO, 1.0)], 5);
    let err = solver.upload(&bigger, UploadScope::Dynamic).unwrap_err();
    assert!(matches!(
        err,
        SolverError::BufferMismatch {
            expected: 3,
            actual: 6,
            ..
        }
    ));
}

#[test]
fn full_upload_validates_the_store() {
    let mut solver = CpuSolver::new();
    let mut store = sealed(&[(Vec3::ZERO, 1.0), (Vec3::X, 1.0)], 0);
    store.spring_indices.push(0);
    let err = solver.upload(&store, UploadScope::Full).unwrap_err();
    assert!(matches!(err, SolverError::Store(StoreError::OddSpringIndices(1))));
}

#[test]
fn queued_dispatches_run_in_order() {
    let mut solver = CpuSolver::new();
    let mut store = sealed(&[(Vec3::new(0.0, 10.0, 0.0), 1.0)], 0);
    solver.configure(&no_planes());
    solver.upload(&store, UploadScope::Full).unwrap();

    let first = solver.dispatch(0.1, 1);
    let second = solver.dispatch(0.1, 1);
    drop(second);
    first.join();
    solver.download(&mut store, ReadbackScope::Frame);

    // two explicit Euler steps under gravity
    assert_relative_eq!(store.velocities[0].y, -1.96, epsilon = 1e-4);
    assert_relative_eq!(store.positions[0].y, 10.0 - 0.098 - 0.196, epsilon = 1e-4);
}

#[test]
fn inactive_and_padding_particles_do_not_move() {
    let mut solver = CpuSolver::new();
    let mut store = sealed(&[(Vec3::ONE, 1.0), (Vec3::ONE * 2.0, 1.0)], 3);
    store.deactivate(1);
    solver.configure(&no_planes());
    solver.upload(&store, UploadScope::Full).unwrap();
    solver.dispatch(1.0 / 60.0, 2).join();
    solver.download(&mut store, ReadbackScope::Frame);

    assert!(store.positions[0].y < 1.0);
    assert_eq!(store.positions[1], Vec4::new(2.0, 2.0, 2.0, 1.0));
    assert_eq!(&store.positions[2..], &[Vec4::ZERO; 3]);
    assert_eq!(solver.active_count(), 1);
}

#[test]
fn compressed_tether_does_not_push() {
    let mut solver = CpuSolver::new();
    let mut store = ParticleStore::new();
    store.push_particle(Vec3::ZERO, 0.0, Vec3::ZERO, 0);
    store.push_particle(Vec3::new(1.0, 0.0, 0.0), 1.0, Vec3::ZERO, 0);
    create_spring(&mut store, 0, 1, -0.8, 0.0);
    // rest length twice the current distance
    store.spring_lengths[0] = 2.0;
    store.set_active(0..2).unwrap();
    store.seal(2);

    solver.configure(&SimParams {
        gravity: Vec3::ZERO,
        ..no_planes()
    });
    solver.upload(&store, UploadScope::Full).unwrap();
    solver.dispatch(1.0 / 60.0, 1).join();
    solver.download(&mut store, ReadbackScope::Positions);

    assert_eq!(store.positions[1].x, 1.0);
}

#[test]
fn stretched_spring_pulls_back() {
    let mut solver = CpuSolver::new();
    let mut store = ParticleStore::new();
    store.push_particle(Vec3::ZERO, 0.0, Vec3::ZERO, 0);
    store.push_particle(Vec3::new(2.0, 0.0, 0.0), 1.0, Vec3::ZERO, 0);
    create_spring(&mut store, 0, 1, 1.0, 0.0);
    store.spring_lengths[0] = 1.0;
    store.set_active(0..2).unwrap();
    store.seal(2);

    solver.configure(&SimParams {
        gravity: Vec3::ZERO,
        ..no_planes()
    });
    solver.upload(&store, UploadScope::Full).unwrap();
    solver.dispatch(1.0 / 60.0, 1).join();
    solver.download(&mut store, ReadbackScope::Positions);

    assert_relative_eq!(store.positions[1].x, 1.0, epsilon = 1e-5);
}

#[test]
fn particles_rest_on_a_sphere_shape() {
    let mut solver = CpuSolver::new();
    let mut store = sealed(&[(Vec3::new(0.0, 1.05, 0.0), 1.0)], 0);
    store
        .shapes
        .add_sphere(1.0, Vec3::ZERO, Quat::IDENTITY);
    let params = SimParams {
        collision_distance: 0.1,
        ..no_planes()
    };
    solver.configure(&params);
    solver.upload(&store, UploadScope::Full).unwrap();
    solver
        .upload_shapes(&store.shapes, &AssetRegistry::new())
        .unwrap();
    assert_eq!(solver.shape_count(), 1);

    for _ in 0..30 {
        solver.dispatch(1.0 / 60.0, 2).join();
    }
    solver.download(&mut store, ReadbackScope::Positions);
    assert!(store.positions[0].truncate().length() >= 1.1 - 1e-3);

    solver.release_assets();
    assert_eq!(solver.shape_count(), 0);
}

#[test]
fn readback_is_skipped_on_size_mismatch() {
    let mut solver = CpuSolver::new();
    let device = sealed(&[(Vec3::ONE, 1.0)], 0);
    solver.upload(&device, UploadScope::Full).unwrap();

    let mut host = sealed(&[(Vec3::ZERO, 1.0), (Vec3::X, 1.0)], 0);
    let before = host.positions.clone();
    solver.download(&mut host, ReadbackScope::Frame);
    assert_eq!(host.positions, before);
}

#[test]
fn rigid_cluster_keeps_its_shape_while_falling() {
    let mut solver = CpuSolver::new();
    let mut store = ParticleStore::new();
    let mut cube = TriangleMesh::cuboid(Vec3::splat(0.2));
    cube.translate(Vec3::new(0.0, 2.0, 0.0));
    create_rigid_cluster(&mut store, &cube.vertices, &RigidDesc::default());
    constraints::prepare_rigids(&mut store);
    let live = store.particle_count() as u32;
    store.set_active(0..live).unwrap();
    store.seal(live as usize);

    solver.configure(&no_planes());
    solver.upload(&store, UploadScope::Full).unwrap();
    for _ in 0..10 {
        solver.dispatch(1.0 / 60.0, 2).join();
    }
    solver.download(&mut store, ReadbackScope::Frame);

    let edge = store.positions[0].truncate().distance(store.positions[1].truncate());
    let rest = cube.vertices[0].distance(cube.vertices[1]);
    assert_relative_eq!(edge, rest, epsilon = 1e-3);
    assert!(store.rigid_translations[0].y < 2.0);
}

#[test]
fn backend_is_send() {
    fn assert_send<T: Send>() {}
    assert_send::<CpuSolver>();
    assert_send::<FramePipeline>();
}
