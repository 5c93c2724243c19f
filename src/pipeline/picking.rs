use glam::Vec3;
use log::debug;

use crate::config::PICK_LERP;
use crate::core::store::ParticleStore;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Pick {
    index: u32,
    inv_mass: f32,
    /// Distance along the pick ray, kept while dragging.
    depth: f32,
    target: Vec3,
}

/// Mouse-style particle dragging.
///
/// The picked particle is pinned (inverse mass 0) while held and pulled
/// toward the target each frame.
#[derive(Debug, Default, Clone)]
pub struct ParticlePicker {
    current: Option<Pick>,
}

impl ParticlePicker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn picked(&self) -> Option<u32> {
        self.current.map(|p| p.index)
    }

    /// Grabs the active particle nearest the ray origin within `radius` of the ray.
    ///
    /// `dir` must be normalized. Any previous pick is released first.
    pub fn pick(&mut self, store: &mut ParticleStore, origin: Vec3, dir: Vec3, radius: f32) -> Option<u32> {
        self.release(store);

        let radius_sq = radius * radius;
        let mut best: Option<(u32, f32)> = None;
        for &i in &store.active_indices {
            let p = store.positions[i as usize].truncate();
            let t = (p - origin).dot(dir);
            if t <= 0.0 {
                continue;
            }
            let closest = origin + dir * t;
            if closest.distance_squared(p) < radius_sq && best.is_none_or(|(_, d)| t < d) {
                best = Some((i, t));
            }
        }

        let (index, depth) = best?;
        let particle = &mut store.positions[index as usize];
        self.current = Some(Pick {
            index,
            inv_mass: particle.w,
            depth,
            target: origin + dir * depth,
        });
        particle.w = 0.0;
        debug!("Picked particle {index} at depth {depth:.3}");
        Some(index)
    }

    /// Moves the drag target along a new ray at the original pick depth.
    pub fn drag(&mut self, origin: Vec3, dir: Vec3) {
        if let Some(pick) = &mut self.current {
            pick.target = origin + dir * pick.depth;
        }
    }

    /// Pulls the held particle toward the target and sets its velocity to match.
    pub fn apply(&self, store: &mut ParticleStore, dt: f32) {
        let Some(pick) = self.current else {
            return;
        };
        let index = pick.index as usize;
        let current = store.positions[index].truncate();
        let p = current.lerp(pick.target, PICK_LERP);
        let delta = p - current;

        let w = store.positions[index].w;
        store.positions[index] = p.extend(w);
        if dt > 0.0 {
            store.velocities[index] = delta / dt;
        }
    }

    /// Drops the held particle, restoring its mass.
    pub fn release(&mut self, store: &mut ParticleStore) {
        if let Some(pick) = self.current.take() {
            if let Some(p) = store.positions.get_mut(pick.index as usize) {
                p.w = pick.inv_mass;
            }
        }
    }

    /// Forgets the pick without touching the store (the store was rebuilt).
    pub fn clear(&mut self) {
        self.current = None;
    }
}
