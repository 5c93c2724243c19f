use glam::{Quat, Vec3, Vec4};
use serde::{Deserialize, Serialize};

use super::assets::AssetRegistry;
use super::mesh::Aabb;
use crate::utils::allocator::AssetId;

/// Geometry variants understood by the solver's shape collider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CollisionGeometry {
    Sphere { radius: f32 },
    Capsule { radius: f32, half_height: f32 },
    Box { half_extents: Vec3 },
    ConvexMesh { mesh: AssetId, scale: Vec3 },
    TriangleMesh { mesh: AssetId, scale: Vec3 },
    Sdf { field: AssetId, scale: f32 },
}

impl CollisionGeometry {
    pub fn shape_type(&self) -> ShapeType {
        match self {
            Self::Sphere { .. } => ShapeType::Sphere,
            Self::Capsule { .. } => ShapeType::Capsule,
            Self::Box { .. } => ShapeType::Box,
            Self::ConvexMesh { .. } => ShapeType::ConvexMesh,
            Self::TriangleMesh { .. } => ShapeType::TriangleMesh,
            Self::Sdf { .. } => ShapeType::Sdf,
        }
    }

    /// Bounds in the shape's local frame. Unknown asset ids yield an empty box.
    pub fn local_bounds(&self, assets: &AssetRegistry) -> Aabb {
        match *self {
            Self::Sphere { radius } => Aabb::new(Vec3::splat(-radius), Vec3::splat(radius)),
            // capsule axis is local X
            Self::Capsule {
                radius,
                half_height,
            } => {
                let extent = Vec3::new(half_height + radius, radius, radius);
                Aabb::new(-extent, extent)
            }
            Self::Box { half_extents } => Aabb::new(-half_extents, half_extents),
            Self::ConvexMesh { mesh, scale } => assets
                .convex(mesh)
                .map(|m| Aabb::new(m.bounds.min * scale, m.bounds.max * scale))
                .unwrap_or_else(Aabb::empty),
            Self::TriangleMesh { mesh, scale } => assets
                .mesh(mesh)
                .map(|m| Aabb::new(m.bounds.min * scale, m.bounds.max * scale))
                .unwrap_or_else(Aabb::empty),
            Self::Sdf { field, scale } => assets
                .field(field)
                .map(|_| Aabb::new(Vec3::ZERO, Vec3::splat(scale)))
                .unwrap_or_else(Aabb::empty),
        }
    }
}

/// Shape type stored in the low bits of [`ShapeFlags`].
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShapeType {
    Sphere = 0,
    Capsule = 1,
    Box = 2,
    ConvexMesh = 3,
    TriangleMesh = 4,
    Sdf = 5,
}

/// Packed shape flags: type in bits 0..3, dynamic and trigger above.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ShapeFlags(pub u32);

impl ShapeFlags {
    pub const TYPE_MASK: u32 = 0x7;
    pub const DYNAMIC: u32 = 1 << 3;
    pub const TRIGGER: u32 = 1 << 4;

    pub fn new(shape_type: ShapeType, dynamic: bool) -> Self {
        let mut bits = shape_type as u32;
        if dynamic {
            bits |= Self::DYNAMIC;
        }
        Self(bits)
    }

    pub fn as_trigger(self) -> Self {
        Self(self.0 | Self::TRIGGER)
    }

    pub fn type_bits(self) -> u32 {
        self.0 & Self::TYPE_MASK
    }

    pub fn is_dynamic(self) -> bool {
        self.0 & Self::DYNAMIC != 0
    }

    pub fn is_trigger(self) -> bool {
        self.0 & Self::TRIGGER != 0
    }
}

/// Parallel shape arrays in the layout the solver consumes.
///
/// The solver collides against `prev_*` for the first substep and
/// interpolates toward the current transform, so a shape moved this frame
/// only takes full effect one step later.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShapeBuffers {
    pub geometry: Vec<CollisionGeometry>,
    pub positions: Vec<Vec4>,
    pub rotations: Vec<Quat>,
    pub prev_positions: Vec<Vec4>,
    pub prev_rotations: Vec<Quat>,
    pub flags: Vec<ShapeFlags>,
}

impl ShapeBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Appends a shape whose previous transform equals the current one.
    pub fn add(
        &mut self,
        geometry: CollisionGeometry,
        position: Vec3,
        rotation: Quat,
        dynamic: bool,
    ) -> usize {
        let index = self.len();
        let flags = ShapeFlags::new(geometry.shape_type(), dynamic);
        self.geometry.push(geometry);
        self.positions.push(position.extend(0.0));
        self.rotations.push(rotation);
        self.prev_positions.push(position.extend(0.0));
        self.prev_rotations.push(rotation);
        self.flags.push(flags);
        index
    }

    pub fn add_sphere(&mut self, radius: f32, position: Vec3, rotation: Quat) -> usize {
        self.add(CollisionGeometry::Sphere { radius }, position, rotation, false)
    }

    pub fn add_capsule(
        &mut self,
        radius: f32,
        half_height: f32,
        position: Vec3,
        rotation: Quat,
    ) -> usize {
        self.add(
            CollisionGeometry::Capsule {
                radius,
                half_height,
            },
            position,
            rotation,
            false,
        )
    }

    pub fn add_box(
        &mut self,
        half_extents: Vec3,
        position: Vec3,
        rotation: Quat,
        dynamic: bool,
    ) -> usize {
        self.add(
            CollisionGeometry::Box { half_extents },
            position,
            rotation,
            dynamic,
        )
    }

    pub fn add_triangle_mesh(
        &mut self,
        mesh: AssetId,
        position: Vec3,
        rotation: Quat,
        scale: Vec3,
    ) -> usize {
        self.add(
            CollisionGeometry::TriangleMesh { mesh, scale },
            position,
            rotation,
            false,
        )
    }

    pub fn add_convex(
        &mut self,
        mesh: AssetId,
        position: Vec3,
        rotation: Quat,
        scale: Vec3,
    ) -> usize {
        self.add(
            CollisionGeometry::ConvexMesh { mesh, scale },
            position,
            rotation,
            false,
        )
    }

    pub fn add_sdf(&mut self, field: AssetId, position: Vec3, rotation: Quat, scale: f32) -> usize {
        self.add(CollisionGeometry::Sdf { field, scale }, position, rotation, false)
    }

    /// Moves a shape, shifting its current transform into the previous slot.
    pub fn set_transform(&mut self, index: usize, position: Vec3, rotation: Quat) {
        self.prev_positions[index] = self.positions[index];
        self.prev_rotations[index] = self.rotations[index];
        self.positions[index] = position.extend(0.0);
        self.rotations[index] = rotation;
    }

    /// Writes both transforms explicitly, for kinematic paths computed analytically.
    pub fn set_transform_with_prev(
        &mut self,
        index: usize,
        position: Vec3,
        rotation: Quat,
        prev_position: Vec3,
        prev_rotation: Quat,
    ) {
        self.positions[index] = position.extend(0.0);
        self.rotations[index] = rotation;
        self.prev_positions[index] = prev_position.extend(0.0);
        self.prev_rotations[index] = prev_rotation;
    }

    pub fn lengths_consistent(&self) -> bool {
        let n = self.flags.len();
        self.geometry.len() == n
            && self.positions.len() == n
            && self.rotations.len() == n
            && self.prev_positions.len() == n
            && self.prev_rotations.len() == n
    }

    /// World-space bounds of every shape at its current transform.
    pub fn bounds(&self, assets: &AssetRegistry) -> Aabb {
        let mut out = Aabb::empty();
        for (i, geometry) in self.geometry.iter().enumerate() {
            let local = geometry.local_bounds(assets);
            if local.is_empty() {
                continue;
            }
            out = out.union(&local.transformed(self.positions[i].truncate(), self.rotations[i]));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_pack_type_and_dynamic_bit() {
        let flags = ShapeFlags::new(ShapeType::TriangleMesh, true);
        assert_eq!(flags.type_bits(), 4);
        assert!(flags.is_dynamic());
        assert!(!flags.is_trigger());
        assert!(flags.as_trigger().is_trigger());
    }

    #[test]
    fn set_transform_shifts_previous() {
        let mut shapes = ShapeBuffers::new();
        let idx = shapes.add_sphere(0.5, Vec3::ZERO, Quat::IDENTITY);
        shapes.set_transform(idx, Vec3::X, Quat::from_rotation_y(0.3));

        assert_eq!(shapes.prev_positions[idx], Vec4::ZERO);
        assert_eq!(shapes.positions[idx], Vec4::new(1.0, 0.0, 0.0, 0.0));
        assert_eq!(shapes.prev_rotations[idx], Quat::IDENTITY);
        assert!(shapes.lengths_consistent());
    }

    #[test]
    fn bounds_cover_translated_sphere() {
        let mut shapes = ShapeBuffers::new();
        shapes.add_sphere(1.0, Vec3::new(0.0, 3.0, 0.0), Quat::IDENTITY);
        let bounds = shapes.bounds(&AssetRegistry::new());
        assert_eq!(bounds.min, Vec3::new(-1.0, 2.0, -1.0));
        assert_eq!(bounds.max, Vec3::new(1.0, 4.0, 1.0));
    }
}
