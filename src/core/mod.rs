//! Particle data model: the store, its parameters and the geometry it references.

pub mod assets;
pub mod mesh;
pub mod params;
pub mod phase;
pub mod shapes;
pub mod store;

pub use assets::{AssetRegistry, DistanceField};
pub use mesh::{Aabb, TriangleMesh};
pub use params::{RelaxationMode, SimParams};
pub use phase::{make_phase, PhaseFlags};
pub use shapes::{CollisionGeometry, ShapeBuffers, ShapeFlags, ShapeType};
pub use store::{BufferSet, ParticleStore, StoreError};
