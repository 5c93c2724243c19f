use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box used for mesh, particle and shape bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn empty() -> Self {
        Self {
            min: Vec3::splat(f32::MAX),
            max: Vec3::splat(-f32::MAX),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn extend(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn expand(&self, amount: f32) -> Aabb {
        Aabb {
            min: self.min - Vec3::splat(amount),
            max: self.max + Vec3::splat(amount),
        }
    }

    pub fn from_points(points: &[Vec3]) -> Self {
        let mut bounds = Self::empty();
        for &p in points {
            bounds.extend(p);
        }
        bounds
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn extent(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Bounds of this box after a rigid transform (conservative).
    pub fn transformed(&self, position: Vec3, rotation: Quat) -> Aabb {
        if self.is_empty() {
            return *self;
        }
        let mut out = Aabb::empty();
        for i in 0..8 {
            let corner = Vec3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            );
            out.extend(position + rotation * corner);
        }
        out
    }
}

/// Triangle mesh owned by a scene, used both as rigid-cluster source
/// geometry and as static collision geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriangleMesh {
    pub vertices: Vec<Vec3>,
    pub indices: Vec<[u32; 3]>,
    pub bounds: Aabb,
}

impl TriangleMesh {
    pub fn new(vertices: Vec<Vec3>, indices: Vec<[u32; 3]>) -> Self {
        let bounds = Aabb::from_points(&vertices);
        Self {
            vertices,
            indices,
            bounds,
        }
    }

    /// Axis-aligned box spanning `[-half_extents, half_extents]`: 8 vertices, 12 triangles.
    pub fn cuboid(half_extents: Vec3) -> Self {
        let h = half_extents;
        let vertices = vec![
            Vec3::new(-h.x, -h.y, -h.z),
            Vec3::new(h.x, -h.y, -h.z),
            Vec3::new(h.x, h.y, -h.z),
            Vec3::new(-h.x, h.y, -h.z),
            Vec3::new(-h.x, -h.y, h.z),
            Vec3::new(h.x, -h.y, h.z),
            Vec3::new(h.x, h.y, h.z),
            Vec3::new(-h.x, h.y, h.z),
        ];
        let indices = vec![
            [0, 2, 1],
            [0, 3, 2],
            [4, 5, 6],
            [4, 6, 7],
            [0, 1, 5],
            [0, 5, 4],
            [3, 7, 6],
            [3, 6, 2],
            [0, 4, 7],
            [0, 7, 3],
            [1, 2, 6],
            [1, 6, 5],
        ];
        Self::new(vertices, indices)
    }

    /// Flat `size × size` quad centred on the origin in the XZ plane.
    pub fn plane(size: f32) -> Self {
        let s = size * 0.5;
        Self::new(
            vec![
                Vec3::new(-s, 0.0, -s),
                Vec3::new(s, 0.0, -s),
                Vec3::new(s, 0.0, s),
                Vec3::new(-s, 0.0, s),
            ],
            vec![[0, 2, 1], [0, 3, 2]],
        )
    }

    /// UV sphere with `rings` latitude bands and `segments` longitude slices.
    pub fn sphere(radius: f32, rings: u32, segments: u32) -> Self {
        let rings = rings.max(2);
        let segments = segments.max(3);
        let mut vertices = vec![Vec3::new(0.0, radius, 0.0)];
        for r in 1..rings {
            let phi = std::f32::consts::PI * r as f32 / rings as f32;
            for s in 0..segments {
                let theta = std::f32::consts::TAU * s as f32 / segments as f32;
                vertices.push(radius * Vec3::new(phi.sin() * theta.cos(), phi.cos(), phi.sin() * theta.sin()));
            }
        }
        vertices.push(Vec3::new(0.0, -radius, 0.0));

        let bottom = vertices.len() as u32 - 1;
        let ring = |r: u32, s: u32| 1 + (r - 1) * segments + s % segments;
        let mut indices = Vec::new();
        for s in 0..segments {
            indices.push([0, ring(1, s + 1), ring(1, s)]);
            indices.push([bottom, ring(rings - 1, s), ring(rings - 1, s + 1)]);
        }
        for r in 1..rings - 1 {
            for s in 0..segments {
                let (a, b) = (ring(r, s), ring(r, s + 1));
                let (c, d) = (ring(r + 1, s), ring(r + 1, s + 1));
                indices.push([a, b, d]);
                indices.push([a, d, c]);
            }
        }
        Self::new(vertices, indices)
    }

    pub fn num_triangles(&self) -> usize {
        self.indices.len()
    }

    pub fn translate(&mut self, offset: Vec3) {
        for v in &mut self.vertices {
            *v += offset;
        }
        self.recompute_bounds();
    }

    pub fn rotate(&mut self, rotation: Quat) {
        for v in &mut self.vertices {
            *v = rotation * *v;
        }
        self.recompute_bounds();
    }

    pub fn scale(&mut self, factor: Vec3) {
        for v in &mut self.vertices {
            *v *= factor;
        }
        self.recompute_bounds();
    }

    /// Recenters vertices around their centroid.
    pub fn recenter(&mut self) {
        if self.vertices.is_empty() {
            return;
        }
        let centroid: Vec3 =
            self.vertices.iter().copied().sum::<Vec3>() / self.vertices.len() as f32;
        self.translate(-centroid);
    }

    fn recompute_bounds(&mut self) {
        self.bounds = Aabb::from_points(&self.vertices);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cuboid_has_eight_vertices_and_symmetric_bounds() {
        let mesh = TriangleMesh::cuboid(Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(mesh.vertices.len(), 8);
        assert_eq!(mesh.num_triangles(), 12);
        assert_eq!(mesh.bounds.min, Vec3::new(-1.0, -2.0, -3.0));
        assert_eq!(mesh.bounds.center(), Vec3::ZERO);
    }

    #[test]
    fn translate_updates_bounds() {
        let mut mesh = TriangleMesh::cuboid(Vec3::ONE);
        mesh.translate(Vec3::new(0.0, 5.0, 0.0));
        assert_eq!(mesh.bounds.min.y, 4.0);
        assert_eq!(mesh.bounds.max.y, 6.0);
    }

    #[test]
    fn sphere_vertices_lie_on_radius() {
        let mesh = TriangleMesh::sphere(0.5, 4, 6);
        assert_eq!(mesh.vertices.len(), 2 + 3 * 6);
        assert_eq!(mesh.num_triangles(), 2 * 6 + 2 * 2 * 6);
        for v in &mesh.vertices {
            assert!((v.length() - 0.5).abs() < 1e-5);
        }
    }

    #[test]
    fn empty_bounds_report_empty() {
        assert!(Aabb::empty().is_empty());
        assert!(!Aabb::from_points(&[Vec3::ZERO]).is_empty());
    }
}
