use std::fmt;

use glam::{Quat, Vec3, Vec4};

use super::mesh::Aabb;
use super::shapes::ShapeBuffers;
use crate::utils::math::safe_normalize;

/// Broken structural invariant found by [`ParticleStore::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Positions, velocities and phases disagree in length.
    ParticleArrayMismatch {
        positions: usize,
        velocities: usize,
        phases: usize,
    },
    /// Spring index array holds an odd number of entries.
    OddSpringIndices(usize),
    /// Spring pairs, lengths and stiffness disagree in count.
    SpringArrayMismatch {
        pairs: usize,
        lengths: usize,
        stiffness: usize,
    },
    /// Rigid offsets are present but do not describe a single cluster.
    RigidOffsetsIncomplete,
    /// Rigid offsets do not start at zero.
    RigidOffsetsStart(u32),
    /// Rigid offset at the given position is smaller than its predecessor.
    RigidOffsetsDecreasing(usize),
    /// Final rigid offset disagrees with the rigid index count.
    RigidIndexCountMismatch { expected: usize, actual: usize },
    /// A per-cluster rigid array disagrees with the cluster count.
    RigidArrayMismatch {
        name: &'static str,
        rigids: usize,
        actual: usize,
    },
    /// Triangle index array is not a whole number of triples.
    TriangleIndicesNotTriples(usize),
    /// Triangle normals disagree with the triangle count.
    TriangleNormalMismatch { triangles: usize, normals: usize },
    /// A constraint or active entry references a slot past capacity.
    IndexOutOfRange {
        name: &'static str,
        index: u32,
        capacity: usize,
    },
    /// Shape arrays disagree in length.
    ShapeArrayMismatch,
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::ParticleArrayMismatch {
                positions,
                velocities,
                phases,
            } => write!(
                f,
                "particle arrays mismatch: {positions} positions, {velocities} velocities, {phases} phases"
            ),
            Self::OddSpringIndices(len) => write!(f, "odd spring index count: {len}"),
            Self::SpringArrayMismatch {
                pairs,
                lengths,
                stiffness,
            } => write!(
                f,
                "spring arrays mismatch: {pairs} pairs, {lengths} lengths, {stiffness} stiffness"
            ),
            Self::RigidOffsetsIncomplete => write!(f, "rigid offsets hold no cluster"),
            Self::RigidOffsetsStart(first) => {
                write!(f, "rigid offsets start at {first} instead of 0")
            }
            Self::RigidOffsetsDecreasing(at) => write!(f, "rigid offsets decrease at {at}"),
            Self::RigidIndexCountMismatch { expected, actual } => write!(
                f,
                "rigid offsets end at {expected} but {actual} rigid indices exist"
            ),
            Self::RigidArrayMismatch {
                name,
                rigids,
                actual,
            } => write!(f, "{name} has {actual} entries for {rigids} rigids"),
            Self::TriangleIndicesNotTriples(len) => {
                write!(f, "triangle index count {len} is not a multiple of 3")
            }
            Self::TriangleNormalMismatch { triangles, normals } => write!(
                f,
                "{normals} triangle normals for {triangles} triangles"
            ),
            Self::IndexOutOfRange {
                name,
                index,
                capacity,
            } => write!(f, "{name} index {index} out of range (capacity {capacity})"),
            Self::ShapeArrayMismatch => write!(f, "shape arrays mismatch"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Host-side parallel arrays shared by the scene, the constraint builders
/// and the solver.
///
/// Every constraint addresses particles by their index in `positions`.
/// Particles can only be pushed before [`seal`](Self::seal); afterwards the
/// array lengths are frozen at `max_particles` and only contents change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParticleStore {
    /// xyz position, w inverse mass (0 pins the particle).
    pub positions: Vec<Vec4>,
    pub velocities: Vec<Vec3>,
    pub phases: Vec<i32>,
    pub normals: Vec<Vec4>,
    pub rest_positions: Vec<Vec4>,
    pub active_indices: Vec<u32>,

    /// Interleaved `(a, b)` pairs.
    pub spring_indices: Vec<u32>,
    pub spring_lengths: Vec<f32>,
    /// Negative values mark unilateral tethers.
    pub spring_stiffness: Vec<f32>,

    pub rigid_offsets: Vec<u32>,
    pub rigid_indices: Vec<u32>,
    pub rigid_coefficients: Vec<f32>,
    pub rigid_plastic_thresholds: Vec<f32>,
    pub rigid_plastic_creeps: Vec<f32>,
    pub rigid_translations: Vec<Vec3>,
    pub rigid_rotations: Vec<Quat>,
    pub rigid_local_positions: Vec<Vec3>,
    pub rigid_local_normals: Vec<Vec4>,

    pub triangles: Vec<u32>,
    pub triangle_normals: Vec<Vec3>,

    pub shapes: ShapeBuffers,

    live: usize,
    sealed: bool,
}

impl ParticleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one particle and returns its index.
    ///
    /// # Panics
    /// If the store has already been sealed.
    pub fn push_particle(&mut self, position: Vec3, inv_mass: f32, velocity: Vec3, phase: i32) -> u32 {
        assert!(
            !self.sealed,
            "particles pushed after the store was sealed at {}",
            self.positions.len()
        );
        let index = self.positions.len() as u32;
        self.positions.push(position.extend(inv_mass));
        self.velocities.push(velocity);
        self.phases.push(phase);
        self.live = self.positions.len();
        index
    }

    /// Particles created by the scene, excluding padding.
    pub fn particle_count(&self) -> usize {
        if self.sealed {
            self.live
        } else {
            self.positions.len()
        }
    }

    /// Slots available to the solver.
    pub fn capacity(&self) -> usize {
        self.positions.len()
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Pads every per-particle array to `max_particles`, snapshots rest
    /// positions and freezes the sizes.
    ///
    /// Padding slots are pinned at the origin with a `+Y` normal.
    pub fn seal(&mut self, max_particles: usize) {
        assert!(!self.sealed, "store sealed twice");
        let live = self.positions.len();
        assert!(
            max_particles >= live,
            "max_particles {max_particles} below live particle count {live}"
        );

        self.live = live;
        self.positions.resize(max_particles, Vec4::ZERO);
        self.velocities.resize(max_particles, Vec3::ZERO);
        self.phases.resize(max_particles, 0);
        self.normals.resize(max_particles, Vec4::Y);
        self.rest_positions = self.positions.clone();
        self.sealed = true;
    }

    /// Replaces the active set.
    pub fn set_active<I>(&mut self, indices: I) -> Result<(), StoreError>
    where
        I: IntoIterator<Item = u32>,
    {
        let capacity = self.capacity();
        let indices: Vec<u32> = indices.into_iter().collect();
        if let Some(&bad) = indices.iter().find(|&&i| i as usize >= capacity) {
            return Err(StoreError::IndexOutOfRange {
                name: "active",
                index: bad,
                capacity,
            });
        }
        self.active_indices = indices;
        Ok(())
    }

    /// Adds `index` to the active set if it is not already there.
    pub fn activate(&mut self, index: u32) -> Result<(), StoreError> {
        let capacity = self.capacity();
        if index as usize >= capacity {
            return Err(StoreError::IndexOutOfRange {
                name: "active",
                index,
                capacity,
            });
        }
        if !self.active_indices.contains(&index) {
            self.active_indices.push(index);
        }
        Ok(())
    }

    /// Removes `index` from the active set, returning whether it was active.
    pub fn deactivate(&mut self, index: u32) -> bool {
        match self.active_indices.iter().position(|&i| i == index) {
            Some(slot) => {
                self.active_indices.swap_remove(slot);
                true
            }
            None => false,
        }
    }

    pub fn active_count(&self) -> usize {
        self.active_indices.len()
    }

    pub fn num_springs(&self) -> usize {
        self.spring_lengths.len()
    }

    pub fn num_rigids(&self) -> usize {
        self.rigid_offsets.len().saturating_sub(1)
    }

    pub fn num_triangles(&self) -> usize {
        self.triangles.len() / 3
    }

    /// Bounds of the scene-created particles.
    pub fn particle_bounds(&self) -> Aabb {
        let mut bounds = Aabb::empty();
        for p in &self.positions[..self.particle_count()] {
            bounds.extend(p.truncate());
        }
        bounds
    }

    /// Recomputes per-particle normals from the triangle list.
    ///
    /// Face normals are accumulated unnormalized, so larger triangles weigh
    /// more. Particles touched by no triangle get `+Y`.
    pub fn rebuild_normals(&mut self) {
        self.normals.clear();
        self.normals.resize(self.positions.len(), Vec4::ZERO);

        for tri in self.triangles.chunks_exact(3) {
            let (a, b, c) = (tri[0] as usize, tri[1] as usize, tri[2] as usize);
            let v0 = self.positions[a].truncate();
            let v1 = self.positions[b].truncate();
            let v2 = self.positions[c].truncate();
            let n = (v1 - v0).cross(v2 - v0).extend(0.0);

            self.normals[a] += n;
            self.normals[b] += n;
            self.normals[c] += n;
        }

        for n in &mut self.normals {
            *n = safe_normalize(n.truncate(), Vec3::Y).extend(0.0);
        }
    }

    /// Checks every cross-array invariant the solver relies on.
    pub fn validate(&self) -> Result<(), StoreError> {
        let capacity = self.capacity();

        if self.velocities.len() != capacity || self.phases.len() != capacity {
            return Err(StoreError::ParticleArrayMismatch {
                positions: self.positions.len(),
                velocities: self.velocities.len(),
                phases: self.phases.len(),
            });
        }

        if self.spring_indices.len() % 2 != 0 {
            return Err(StoreError::OddSpringIndices(self.spring_indices.len()));
        }
        let pairs = self.spring_indices.len() / 2;
        if pairs != self.spring_lengths.len() || pairs != self.spring_stiffness.len() {
            return Err(StoreError::SpringArrayMismatch {
                pairs,
                lengths: self.spring_lengths.len(),
                stiffness: self.spring_stiffness.len(),
            });
        }
        check_indices("spring", &self.spring_indices, capacity)?;

        self.validate_rigids(capacity)?;

        if self.triangles.len() % 3 != 0 {
            return Err(StoreError::TriangleIndicesNotTriples(self.triangles.len()));
        }
        if self.triangle_normals.len() != self.num_triangles() {
            return Err(StoreError::TriangleNormalMismatch {
                triangles: self.num_triangles(),
                normals: self.triangle_normals.len(),
            });
        }
        check_indices("triangle", &self.triangles, capacity)?;
        check_indices("active", &self.active_indices, capacity)?;

        if !self.shapes.lengths_consistent() {
            return Err(StoreError::ShapeArrayMismatch);
        }
        Ok(())
    }

    fn validate_rigids(&self, capacity: usize) -> Result<(), StoreError> {
        if self.rigid_offsets.is_empty() {
            if !self.rigid_indices.is_empty() {
                return Err(StoreError::RigidIndexCountMismatch {
                    expected: 0,
                    actual: self.rigid_indices.len(),
                });
            }
            return Ok(());
        }
        if self.rigid_offsets.len() < 2 {
            return Err(StoreError::RigidOffsetsIncomplete);
        }
        if self.rigid_offsets[0] != 0 {
            return Err(StoreError::RigidOffsetsStart(self.rigid_offsets[0]));
        }
        if let Some(at) = self.rigid_offsets.windows(2).position(|w| w[1] < w[0]) {
            return Err(StoreError::RigidOffsetsDecreasing(at + 1));
        }

        let expected = self.rigid_offsets.last().copied().unwrap_or(0) as usize;
        if expected != self.rigid_indices.len() {
            return Err(StoreError::RigidIndexCountMismatch {
                expected,
                actual: self.rigid_indices.len(),
            });
        }
        check_indices("rigid", &self.rigid_indices, capacity)?;

        let rigids = self.num_rigids();
        let per_cluster = [
            ("rigid_coefficients", self.rigid_coefficients.len(), false),
            ("rigid_plastic_thresholds", self.rigid_plastic_thresholds.len(), true),
            ("rigid_plastic_creeps", self.rigid_plastic_creeps.len(), true),
            ("rigid_translations", self.rigid_translations.len(), true),
            ("rigid_rotations", self.rigid_rotations.len(), true),
        ];
        for (name, actual, optional) in per_cluster {
            if actual != rigids && !(optional && actual == 0) {
                return Err(StoreError::RigidArrayMismatch {
                    name,
                    rigids,
                    actual,
                });
            }
        }
        Ok(())
    }

    /// Device-facing copy of every solver buffer.
    pub fn snapshot(&self) -> BufferSet {
        BufferSet {
            positions: self.positions.clone(),
            velocities: self.velocities.clone(),
            phases: self.phases.clone(),
            normals: self.normals.clone(),
            rest_positions: self.rest_positions.clone(),
            active_indices: self.active_indices.clone(),
            spring_indices: self.spring_indices.clone(),
            spring_lengths: self.spring_lengths.clone(),
            spring_stiffness: self.spring_stiffness.clone(),
            rigid_offsets: self.rigid_offsets.clone(),
            rigid_indices: self.rigid_indices.clone(),
            rigid_coefficients: self.rigid_coefficients.clone(),
            rigid_plastic_thresholds: self.rigid_plastic_thresholds.clone(),
            rigid_plastic_creeps: self.rigid_plastic_creeps.clone(),
            rigid_translations: self.rigid_translations.clone(),
            rigid_rotations: self.rigid_rotations.clone(),
            rigid_local_positions: self.rigid_local_positions.clone(),
            rigid_local_normals: self.rigid_local_normals.clone(),
            triangles: self.triangles.clone(),
            triangle_normals: self.triangle_normals.clone(),
        }
    }
}

fn check_indices(name: &'static str, indices: &[u32], capacity: usize) -> Result<(), StoreError> {
    match indices.iter().find(|&&i| i as usize >= capacity) {
        Some(&index) => Err(StoreError::IndexOutOfRange {
            name,
            index,
            capacity,
        }),
        None => Ok(()),
    }
}

/// Solver-side image of a [`ParticleStore`], minus shapes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BufferSet {
    pub positions: Vec<Vec4>,
    pub velocities: Vec<Vec3>,
    pub phases: Vec<i32>,
    pub normals: Vec<Vec4>,
    pub rest_positions: Vec<Vec4>,
    pub active_indices: Vec<u32>,
    pub spring_indices: Vec<u32>,
    pub spring_lengths: Vec<f32>,
    pub spring_stiffness: Vec<f32>,
    pub rigid_offsets: Vec<u32>,
    pub rigid_indices: Vec<u32>,
    pub rigid_coefficients: Vec<f32>,
    pub rigid_plastic_thresholds: Vec<f32>,
    pub rigid_plastic_creeps: Vec<f32>,
    pub rigid_translations: Vec<Vec3>,
    pub rigid_rotations: Vec<Quat>,
    pub rigid_local_positions: Vec<Vec3>,
    pub rigid_local_normals: Vec<Vec4>,
    pub triangles: Vec<u32>,
    pub triangle_normals: Vec<Vec3>,
}
