//! Scene capability trait, the built-in scenes and their registry.

pub mod ball_drop;
pub mod cloth;
pub mod cloth_drape;
pub mod rigid_drop;
pub mod rotating_table;

pub use ball_drop::BallDrop;
pub use cloth::{ClothConfig, ObstacleConfig};
pub use cloth_drape::ClothDrape;
pub use rigid_drop::RigidDrop;
pub use rotating_table::RotatingTable;

use std::io::{self, Write};
use std::ops::{Index, IndexMut};
use std::path::Path;

use glam::{Vec3, Vec4};
use log::warn;

use crate::core::store::ParticleStore;
use crate::gpu::SolverFacade;
use crate::pipeline::context::SimContext;
use crate::pipeline::mapping::MappedBuffers;

/// What a scene sees while the buffers are unmapped.
pub struct SyncContext<'a> {
    pub solver: &'a mut dyn SolverFacade,
    pub store: &'a ParticleStore,
    pub ctx: &'a mut SimContext,
    /// Whether the host buffers are still mapped. Always false for a
    /// well-formed frame.
    pub buffers_mapped: bool,
}

/// Behaviour a scene plugs into the frame pipeline.
///
/// `initialize` and `update` run with the buffers mapped, `sync` with them
/// unmapped. A scene may only append particles during `initialize`.
pub trait Scene: Send {
    fn name(&self) -> &str;

    fn initialize(&mut self, buffers: &mut MappedBuffers<'_>, ctx: &mut SimContext);

    /// Runs after normals are built, before the store is sealed.
    fn post_initialize(&mut self, _store: &mut ParticleStore, _ctx: &mut SimContext) {}

    fn update(&mut self, _buffers: &mut MappedBuffers<'_>, _ctx: &mut SimContext) {}

    fn sync(&mut self, _sync: &mut SyncContext<'_>) {}

    /// Writes the scene's particles under `path`; a no-op unless overridden.
    fn export(&self, _store: &ParticleStore, _path: &Path) -> io::Result<()> {
        Ok(())
    }

    fn draw(&self, _pass: u32) {}

    fn key_down(&mut self, _key: char, _ctx: &mut SimContext) {}

    fn do_gui(&mut self, _ctx: &mut SimContext) {}

    /// Point the camera should look at, if the scene has a preference.
    fn center_camera(&self, _store: &ParticleStore) -> Option<Vec3> {
        None
    }
}

/// Appends one named object to an OBJ stream.
///
/// `faces` hold 0-based particle indices; vertices of earlier objects in
/// the same stream must precede these so indices stay global.
pub fn write_obj_object<W: Write>(
    out: &mut W,
    name: &str,
    vertices: &[Vec4],
    faces: impl IntoIterator<Item = [u32; 3]>,
) -> io::Result<()> {
    writeln!(out, "o {name}")?;
    for v in vertices {
        writeln!(out, "v {:.6} {:.6} {:.6}", v.x, v.y, v.z)?;
    }
    writeln!(out, "\ns off")?;
    for [a, b, c] in faces {
        writeln!(out, "f {} {} {}", a + 1, b + 1, c + 1)?;
    }
    Ok(())
}

/// Triangle index triples of the store as arrays.
pub fn store_faces(store: &ParticleStore) -> impl Iterator<Item = [u32; 3]> + '_ {
    store
        .triangles
        .chunks_exact(3)
        .map(|t| [t[0], t[1], t[2]])
}

/// Scenes selectable by index or name.
pub struct SceneRegistry {
    scenes: Vec<Box<dyn Scene>>,
}

impl Default for SceneRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneRegistry {
    pub fn new() -> Self {
        Self { scenes: Vec::new() }
    }

    /// Registry holding every built-in scene with its default configuration.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(ClothDrape::default()));
        registry.register(Box::new(RotatingTable::default()));
        registry.register(Box::new(BallDrop::default()));
        registry.register(Box::new(RigidDrop::default()));
        registry
    }

    pub fn register(&mut self, scene: Box<dyn Scene>) -> usize {
        if self.index_of(scene.name()).is_some() {
            warn!("Scene '{}' registered twice", scene.name());
        }
        self.scenes.push(scene);
        self.scenes.len() - 1
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.scenes.iter().position(|s| s.name() == name)
    }

    pub fn get(&self, index: usize) -> Option<&dyn Scene> {
        self.scenes.get(index).map(|s| s.as_ref())
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut (dyn Scene + 'static)> {
        self.scenes.get_mut(index).map(|s| s.as_mut())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.scenes.iter().map(|s| s.name())
    }
}

impl Index<usize> for SceneRegistry {
    type Output = dyn Scene;

    fn index(&self, index: usize) -> &Self::Output {
        self.scenes[index].as_ref()
    }
}

impl IndexMut<usize> for SceneRegistry {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        self.scenes[index].as_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn obj_faces_are_one_based() {
        let mut out = Vec::new();
        let vertices = [Vec4::new(0.0, 0.0, 0.0, 1.0), Vec4::X, Vec4::Y];
        write_obj_object(&mut out, "cloth", &vertices, [[0, 1, 2]]).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("o cloth\nv 0.000000 0.000000 0.000000\n"));
        assert!(text.ends_with("s off\nf 1 2 3\n"));
    }

    #[test]
    fn builtin_scenes_are_addressable_by_name() {
        let registry = SceneRegistry::with_builtin();
        assert_eq!(registry.len(), 4);
        assert_eq!(registry.index_of("rigid_drop"), Some(3));
        assert_eq!(registry.get(0).map(|s| s.name()), Some("cloth_drape"));
        assert!(registry.index_of("missing").is_none());
    }
}
