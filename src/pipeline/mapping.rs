use std::ops::{Deref, DerefMut};

use crate::core::store::ParticleStore;

/// Map/unmap counters. A balanced frame leaves `maps == unmaps`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MapStats {
    pub maps: u64,
    pub unmaps: u64,
    mapped: bool,
}

impl MapStats {
    pub fn is_mapped(&self) -> bool {
        self.mapped
    }

    pub fn is_balanced(&self) -> bool {
        !self.mapped && self.maps == self.unmaps
    }
}

/// Host access to the particle store for the duration of the borrow.
///
/// Creating the guard maps the buffers; dropping it unmaps them, on every
/// exit path including unwinding.
pub struct MappedBuffers<'a> {
    store: &'a mut ParticleStore,
    stats: &'a mut MapStats,
}

impl<'a> MappedBuffers<'a> {
    pub fn map(store: &'a mut ParticleStore, stats: &'a mut MapStats) -> Self {
        assert!(!stats.mapped, "buffers are already mapped");
        stats.mapped = true;
        stats.maps += 1;
        Self { store, stats }
    }

    pub fn store(&self) -> &ParticleStore {
        self.store
    }

    pub fn store_mut(&mut self) -> &mut ParticleStore {
        self.store
    }
}

impl Deref for MappedBuffers<'_> {
    type Target = ParticleStore;

    fn deref(&self) -> &ParticleStore {
        self.store
    }
}

impl DerefMut for MappedBuffers<'_> {
    fn deref_mut(&mut self) -> &mut ParticleStore {
        self.store
    }
}

impl Drop for MappedBuffers<'_> {
    fn drop(&mut self) {
        debug_assert!(self.stats.mapped, "unmapping buffers that are not mapped");
        self.stats.mapped = false;
        self.stats.unmaps += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn guard_counts_map_and_unmap() {
        let mut store = ParticleStore::new();
        let mut stats = MapStats::default();
        {
            let mut mapped = MappedBuffers::map(&mut store, &mut stats);
            mapped.push_particle(Vec3::ZERO, 1.0, Vec3::ZERO, 0);
        }
        assert_eq!(stats.maps, 1);
        assert!(stats.is_balanced());
        assert_eq!(store.particle_count(), 1);
    }

    #[test]
    fn unwinding_still_unmaps() {
        let mut store = ParticleStore::new();
        let mut stats = MapStats::default();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _mapped = MappedBuffers::map(&mut store, &mut stats);
            panic!("scene failed");
        }));
        assert!(result.is_err());
        assert!(stats.is_balanced());
    }
}
