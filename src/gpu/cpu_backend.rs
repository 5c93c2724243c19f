//! Reference solver that runs the particle step on a host worker thread.
//!
//! It implements the facade contract faithfully (asynchronous dispatch,
//! readback, shape lag) with simple position-based numerics, so the
//! pipeline can be driven without an accelerator.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use glam::{Mat3, Quat, Vec3, Vec4};
use log::{debug, warn};
use parking_lot::{Condvar, Mutex, MutexGuard};
#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::{DispatchHandle, ReadbackScope, Result, SolverError, SolverFacade, UploadScope};
use crate::core::assets::AssetRegistry;
use crate::core::params::SimParams;
use crate::core::shapes::{CollisionGeometry, ShapeBuffers};
use crate::core::store::{BufferSet, ParticleStore};
use crate::utils::math::{outer, polar_rotation, quat_from_rotation, safe_normalize};

const POLAR_ITERATIONS: u32 = 10;

/// Collision proxy used by the reference solver. Mesh-backed shapes
/// collide with their local bounding box.
#[derive(Debug, Clone, Copy)]
enum Primitive {
    Sphere { radius: f32 },
    Capsule { radius: f32, half_height: f32 },
    Box { center: Vec3, half_extents: Vec3 },
}

#[derive(Debug, Clone, Copy)]
struct ShapeRecord {
    primitive: Primitive,
    prev_position: Vec3,
    prev_rotation: Quat,
    position: Vec3,
    rotation: Quat,
}

impl ShapeRecord {
    fn collect(shapes: &ShapeBuffers, assets: &AssetRegistry) -> Vec<Self> {
        let mut records = Vec::with_capacity(shapes.len());
        for (i, geometry) in shapes.geometry.iter().enumerate() {
            if shapes.flags[i].is_trigger() {
                continue;
            }
            let primitive = match *geometry {
                CollisionGeometry::Sphere { radius } => Primitive::Sphere { radius },
                CollisionGeometry::Capsule {
                    radius,
                    half_height,
                } => Primitive::Capsule {
                    radius,
                    half_height,
                },
                CollisionGeometry::Box { half_extents } => Primitive::Box {
                    center: Vec3::ZERO,
                    half_extents,
                },
                _ => {
                    let bounds = geometry.local_bounds(assets);
                    if bounds.is_empty() {
                        warn!("Shape {i} references a released asset; skipping");
                        continue;
                    }
                    Primitive::Box {
                        center: bounds.center(),
                        half_extents: bounds.extent(),
                    }
                }
            };
            records.push(Self {
                primitive,
                prev_position: shapes.prev_positions[i].truncate(),
                prev_rotation: shapes.prev_rotations[i],
                position: shapes.positions[i].truncate(),
                rotation: shapes.rotations[i],
            });
        }
        records
    }

    /// Transform a fraction `t` of the way from the previous pose.
    fn pose_at(&self, t: f32) -> (Vec3, Quat) {
        (
            self.prev_position.lerp(self.position, t),
            self.prev_rotation.slerp(self.rotation, t),
        )
    }

    /// Projects a local-space point out of the primitive grown by `margin`.
    fn push_out(&self, local: Vec3, margin: f32) -> Option<Vec3> {
        match self.primitive {
            Primitive::Sphere { radius } => push_from_point(local, Vec3::ZERO, radius + margin),
            Primitive::Capsule {
                radius,
                half_height,
            } => {
                let axis_point = Vec3::new(local.x.clamp(-half_height, half_height), 0.0, 0.0);
                push_from_point(local, axis_point, radius + margin)
            }
            Primitive::Box {
                center,
                half_extents,
            } => {
                let rel = local - center;
                let limit = half_extents + Vec3::splat(margin);
                let depth = limit - rel.abs();
                if depth.min_element() <= 0.0 {
                    return None;
                }
                let mut out = rel;
                if depth.x <= depth.y && depth.x <= depth.z {
                    out.x = limit.x.copysign(rel.x);
                } else if depth.y <= depth.z {
                    out.y = limit.y.copysign(rel.y);
                } else {
                    out.z = limit.z.copysign(rel.z);
                }
                Some(out + center)
            }
        }
    }
}

fn push_from_point(local: Vec3, anchor: Vec3, min_dist: f32) -> Option<Vec3> {
    let delta = local - anchor;
    let dist = delta.length();
    if dist >= min_dist || dist < 1e-6 {
        return None;
    }
    Some(anchor + delta / dist * min_dist)
}

#[derive(Default)]
struct DeviceState {
    params: SimParams,
    buffers: BufferSet,
    shapes: Vec<ShapeRecord>,
    predicted: Vec<Vec3>,
    active: Vec<bool>,
    dispatched: u64,
    completed: u64,
}

fn predict_particle(
    position: &Vec4,
    velocity: &mut Vec3,
    predicted: &mut Vec3,
    active: bool,
    params: &SimParams,
    dt: f32,
) {
    let p = position.truncate();
    if !active || position.w == 0.0 {
        *predicted = p;
        return;
    }
    let accel = (params.gravity + (params.wind - *velocity) * params.drag)
        .clamp_length_max(params.max_acceleration);
    *velocity += accel * dt;
    *predicted = p + *velocity * dt;
}

fn finish_particle(
    position: &mut Vec4,
    velocity: &mut Vec3,
    predicted: &Vec3,
    active: bool,
    params: &SimParams,
    dt: f32,
) {
    if !active || position.w == 0.0 {
        return;
    }
    let mut v = (*predicted - position.truncate()) / dt;
    v *= (1.0 - params.damping * dt).max(0.0);
    v = v.clamp_length_max(params.max_speed);

    if params.sleep_threshold > 0.0 && v.length() < params.sleep_threshold {
        *velocity = Vec3::ZERO;
        return;
    }
    *velocity = v;
    *position = predicted.extend(position.w);
}

impl DeviceState {
    fn step(&mut self, dt: f32, substeps: u32) {
        if dt <= 0.0 || substeps == 0 {
            return;
        }
        let sub_dt = dt / substeps as f32;
        let params = self.params;
        let count = self.buffers.positions.len();

        self.active.clear();
        self.active.resize(count, false);
        for &i in &self.buffers.active_indices {
            if let Some(slot) = self.active.get_mut(i as usize) {
                *slot = true;
            }
        }
        self.predicted.resize(count, Vec3::ZERO);

        for substep in 0..substeps {
            let t = (substep + 1) as f32 / substeps as f32;
            self.predict(&params, sub_dt);
            for _ in 0..params.num_iterations.max(1) {
                self.solve_springs();
                self.solve_rigids();
                self.solve_planes(&params);
                self.solve_shapes(&params, t);
            }
            self.finish(&params, sub_dt);
        }

        self.update_normals();
    }

    fn predict(&mut self, params: &SimParams, dt: f32) {
        let buffers = &mut self.buffers;

        #[cfg(feature = "parallel")]
        buffers
            .positions
            .par_iter()
            .zip(buffers.velocities.par_iter_mut())
            .zip(self.predicted.par_iter_mut().zip(self.active.par_iter()))
            .for_each(|((p, v), (pred, &on))| predict_particle(p, v, pred, on, params, dt));

        #[cfg(not(feature = "parallel"))]
        buffers
            .positions
            .iter()
            .zip(buffers.velocities.iter_mut())
            .zip(self.predicted.iter_mut().zip(self.active.iter()))
            .for_each(|((p, v), (pred, &on))| predict_particle(p, v, pred, on, params, dt));
    }

    fn finish(&mut self, params: &SimParams, dt: f32) {
        let buffers = &mut self.buffers;

        #[cfg(feature = "parallel")]
        buffers
            .positions
            .par_iter_mut()
            .zip(buffers.velocities.par_iter_mut())
            .zip(self.predicted.par_iter().zip(self.active.par_iter()))
            .for_each(|((p, v), (pred, &on))| finish_particle(p, v, pred, on, params, dt));

        #[cfg(not(feature = "parallel"))]
        buffers
            .positions
            .iter_mut()
            .zip(buffers.velocities.iter_mut())
            .zip(self.predicted.iter().zip(self.active.iter()))
            .for_each(|((p, v), (pred, &on))| finish_particle(p, v, pred, on, params, dt));
    }

    /// Gauss-Seidel pass over all springs. Negative stiffness only resists stretch.
    fn solve_springs(&mut self) {
        let buffers = &self.buffers;
        let predicted = &mut self.predicted;

        for (s, pair) in buffers.spring_indices.chunks_exact(2).enumerate() {
            let (a, b) = (pair[0] as usize, pair[1] as usize);
            let (wa, wb) = (buffers.positions[a].w, buffers.positions[b].w);
            let w_sum = wa + wb;
            if w_sum <= 0.0 {
                continue;
            }

            let delta = predicted[a] - predicted[b];
            let dist = delta.length();
            let rest = buffers.spring_lengths[s];
            let stiffness = buffers.spring_stiffness[s];
            if dist < 1e-6 || (stiffness < 0.0 && dist <= rest) {
                continue;
            }

            let k = stiffness.abs().min(1.0);
            let correction = delta / dist * ((dist - rest) / w_sum * k);
            predicted[a] -= correction * wa;
            predicted[b] += correction * wb;
        }
    }

    /// Shape matching toward each cluster's rotated rest pose.
    fn solve_rigids(&mut self) {
        let buffers = &mut self.buffers;
        let predicted = &mut self.predicted;

        for (cluster, window) in buffers.rigid_offsets.windows(2).enumerate() {
            let (start, end) = (window[0] as usize, window[1] as usize);
            if buffers.rigid_local_positions.len() < end {
                continue;
            }
            let members = &buffers.rigid_indices[start..end];

            let mut com = Vec3::ZERO;
            let mut total_mass = 0.0f32;
            for &i in members {
                let w = buffers.positions[i as usize].w;
                if w > 0.0 {
                    com += predicted[i as usize] / w;
                    total_mass += 1.0 / w;
                }
            }
            if total_mass < 1e-10 {
                continue;
            }
            com /= total_mass;

            let mut a_pq = Mat3::ZERO;
            for (k, &i) in members.iter().enumerate() {
                let w = buffers.positions[i as usize].w;
                if w > 0.0 {
                    let q = (predicted[i as usize] - com) / w;
                    a_pq += outer(q, buffers.rigid_local_positions[start + k]);
                }
            }
            let r = polar_rotation(a_pq + Mat3::IDENTITY * 1e-6, POLAR_ITERATIONS);

            let stiffness = buffers.rigid_coefficients.get(cluster).copied().unwrap_or(1.0);
            for (k, &i) in members.iter().enumerate() {
                if buffers.positions[i as usize].w == 0.0 {
                    continue;
                }
                let goal = r * buffers.rigid_local_positions[start + k] + com;
                let p = &mut predicted[i as usize];
                *p += (goal - *p) * stiffness;
            }

            if let Some(t) = buffers.rigid_translations.get_mut(cluster) {
                *t = com;
            }
            if let Some(q) = buffers.rigid_rotations.get_mut(cluster) {
                *q = quat_from_rotation(r);
            }
        }
    }

    fn solve_planes(&mut self, params: &SimParams) {
        let planes = params.active_planes();
        if planes.is_empty() {
            return;
        }
        for (i, p) in self.predicted.iter_mut().enumerate() {
            if !self.active[i] || self.buffers.positions[i].w == 0.0 {
                continue;
            }
            for plane in planes {
                let n = plane.truncate();
                let d = n.dot(*p) + plane.w - params.collision_distance;
                if d < 0.0 {
                    *p -= n * d;
                }
            }
        }
    }

    fn solve_shapes(&mut self, params: &SimParams, t: f32) {
        let margin = params.collision_distance;
        for shape in &self.shapes {
            let (position, rotation) = shape.pose_at(t);
            let inverse = rotation.inverse();
            for (i, p) in self.predicted.iter_mut().enumerate() {
                if !self.active[i] || self.buffers.positions[i].w == 0.0 {
                    continue;
                }
                let local = inverse * (*p - position);
                if let Some(out) = shape.push_out(local, margin) {
                    *p = position + rotation * out;
                }
            }
        }
    }

    fn update_normals(&mut self) {
        let buffers = &mut self.buffers;
        let mut normals = vec![Vec3::ZERO; buffers.positions.len()];
        buffers
            .triangle_normals
            .resize(buffers.triangles.len() / 3, Vec3::Y);

        for (t, tri) in buffers.triangles.chunks_exact(3).enumerate() {
            let (a, b, c) = (tri[0] as usize, tri[1] as usize, tri[2] as usize);
            let v0 = buffers.positions[a].truncate();
            let n = (buffers.positions[b].truncate() - v0).cross(buffers.positions[c].truncate() - v0);
            normals[a] += n;
            normals[b] += n;
            normals[c] += n;
            buffers.triangle_normals[t] = safe_normalize(n, Vec3::Y);
        }

        buffers.normals = normals
            .into_iter()
            .map(|n| safe_normalize(n, Vec3::Y).extend(0.0))
            .collect();
    }
}

struct Shared {
    state: Mutex<DeviceState>,
    done: Condvar,
}

/// Host-thread implementation of [`SolverFacade`].
///
/// Dispatches run on a spawned worker in submission order; every host
/// access through the facade waits for outstanding dispatches first.
pub struct CpuSolver {
    shared: Arc<Shared>,
}

impl Default for CpuSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuSolver {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(DeviceState::default()),
                done: Condvar::new(),
            }),
        }
    }

    fn wait_idle(&self) -> MutexGuard<'_, DeviceState> {
        let mut state = self.shared.state.lock();
        while state.completed < state.dispatched {
            self.shared.done.wait(&mut state);
        }
        state
    }

    /// Device-side copy of the buffers, for inspection in tests and tools.
    pub fn device_buffers(&self) -> BufferSet {
        self.wait_idle().buffers.clone()
    }

    pub fn shape_count(&self) -> usize {
        self.wait_idle().shapes.len()
    }
}

fn check_len(buffer: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(SolverError::BufferMismatch {
            buffer,
            expected,
            actual,
        });
    }
    Ok(())
}

impl SolverFacade for CpuSolver {
    fn name(&self) -> &str {
        "cpu-reference"
    }

    fn configure(&mut self, params: &SimParams) {
        self.wait_idle().params = *params;
    }

    fn params(&self) -> SimParams {
        self.wait_idle().params
    }

    fn upload(&mut self, store: &ParticleStore, scope: UploadScope) -> Result<()> {
        let mut state = self.wait_idle();
        match scope {
            UploadScope::Full => {
                store.validate()?;
                state.buffers = store.snapshot();
                debug!(
                    "Uploaded {} particles, {} springs, {} rigids",
                    store.capacity(),
                    store.num_springs(),
                    store.num_rigids()
                );
            }
            UploadScope::Dynamic => {
                let device = &mut state.buffers;
                check_len("positions", device.positions.len(), store.positions.len())?;
                check_len("velocities", device.velocities.len(), store.velocities.len())?;
                check_len("phases", device.phases.len(), store.phases.len())?;
                device.positions.copy_from_slice(&store.positions);
                device.velocities.copy_from_slice(&store.velocities);
                device.phases.copy_from_slice(&store.phases);
                device.active_indices.clone_from(&store.active_indices);
            }
            UploadScope::Velocities => {
                let device = &mut state.buffers;
                check_len("velocities", device.velocities.len(), store.velocities.len())?;
                device.velocities.copy_from_slice(&store.velocities);
            }
        }
        Ok(())
    }

    fn upload_shapes(&mut self, shapes: &ShapeBuffers, assets: &AssetRegistry) -> Result<()> {
        if !shapes.lengths_consistent() {
            return Err(SolverError::BufferMismatch {
                buffer: "shapes",
                expected: shapes.flags.len(),
                actual: shapes.geometry.len(),
            });
        }
        self.wait_idle().shapes = ShapeRecord::collect(shapes, assets);
        Ok(())
    }

    fn dispatch(&mut self, dt: f32, substeps: u32) -> DispatchHandle {
        let ticket = {
            let mut state = self.shared.state.lock();
            state.dispatched += 1;
            state.dispatched
        };
        let shared = Arc::clone(&self.shared);

        DispatchHandle::spawn(move || {
            let mut state = shared.state.lock();
            while state.completed + 1 < ticket {
                shared.done.wait(&mut state);
            }
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| state.step(dt, substeps)));
            state.completed = ticket;
            drop(state);
            shared.done.notify_all();
            if let Err(payload) = outcome {
                panic::resume_unwind(payload);
            }
        })
    }

    fn download(&mut self, store: &mut ParticleStore, scope: ReadbackScope) {
        let state = self.wait_idle();
        let device = &state.buffers;
        if device.positions.len() != store.positions.len() {
            warn!(
                "Skipping readback: device holds {} particles, host {}",
                device.positions.len(),
                store.positions.len()
            );
            return;
        }

        store.positions.copy_from_slice(&device.positions);
        if scope == ReadbackScope::Positions {
            return;
        }
        store.velocities.copy_from_slice(&device.velocities);
        if device.normals.len() == store.normals.len() {
            store.normals.copy_from_slice(&device.normals);
        }
        if device.triangle_normals.len() == store.triangle_normals.len() {
            store.triangle_normals.copy_from_slice(&device.triangle_normals);
        }
        store.rigid_translations.clone_from(&device.rigid_translations);
        store.rigid_rotations.clone_from(&device.rigid_rotations);
    }

    fn active_count(&self) -> usize {
        self.wait_idle().buffers.active_indices.len()
    }

    fn release_assets(&mut self) {
        self.wait_idle().shapes.clear();
    }
}
