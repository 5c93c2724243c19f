use log::debug;

use super::mesh::TriangleMesh;
use crate::utils::allocator::{Arena, AssetId};

/// Regular grid of signed distances sampled over a unit cube.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceField {
    pub dimensions: [u32; 3],
    pub samples: Vec<f32>,
}

impl DistanceField {
    pub fn new(dimensions: [u32; 3], samples: Vec<f32>) -> Self {
        debug_assert_eq!(
            samples.len(),
            (dimensions[0] * dimensions[1] * dimensions[2]) as usize
        );
        Self {
            dimensions,
            samples,
        }
    }
}

/// Collision assets a scene registers for the solver to reference by id.
///
/// Cleared wholesale on reset; ids from a previous scene never resolve.
#[derive(Debug, Default)]
pub struct AssetRegistry {
    meshes: Arena<TriangleMesh>,
    convexes: Arena<TriangleMesh>,
    fields: Arena<DistanceField>,
}

impl AssetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_mesh(&mut self, mesh: TriangleMesh) -> AssetId {
        self.meshes.insert(mesh)
    }

    pub fn add_convex(&mut self, hull: TriangleMesh) -> AssetId {
        self.convexes.insert(hull)
    }

    pub fn add_field(&mut self, field: DistanceField) -> AssetId {
        self.fields.insert(field)
    }

    pub fn mesh(&self, id: AssetId) -> Option<&TriangleMesh> {
        self.meshes.get(id)
    }

    pub fn convex(&self, id: AssetId) -> Option<&TriangleMesh> {
        self.convexes.get(id)
    }

    pub fn field(&self, id: AssetId) -> Option<&DistanceField> {
        self.fields.get(id)
    }

    pub fn len(&self) -> usize {
        self.meshes.len() + self.convexes.len() + self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        debug!("Releasing {} coupled collision assets", self.len());
        self.meshes.clear();
        self.convexes.clear();
        self.fields.clear();
    }
}
