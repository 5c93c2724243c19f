use std::ops::Range;

use serde::{Deserialize, Serialize};

use super::spring::create_spring;
use crate::config::{TETHER_FALLOFF, TETHER_GIVE};
use crate::core::store::ParticleStore;

/// Strength and slack of anchor tethers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TetherDesc {
    /// Peak strength; the stored stiffness is `-stiffness * exp(-d² / falloff)`.
    pub stiffness: f32,
    pub give: f32,
    pub falloff: f32,
}

impl Default for TetherDesc {
    fn default() -> Self {
        Self {
            stiffness: 0.8,
            give: TETHER_GIVE,
            falloff: TETHER_FALLOFF,
        }
    }
}

impl TetherDesc {
    /// Signed stiffness for a particle at squared distance `dist_sq` from its anchor.
    pub fn stiffness_at(&self, dist_sq: f32) -> f32 {
        -self.stiffness * (-dist_sq / self.falloff).exp()
    }
}

/// Tethers every particle in `range` to both anchors `c1` and `c2`.
///
/// Particles nearer an anchor are held more tightly. The anchors themselves
/// get no tethers. Returns the number of springs appended.
pub fn create_tethers(
    store: &mut ParticleStore,
    range: Range<u32>,
    c1: u32,
    c2: u32,
    desc: &TetherDesc,
) -> usize {
    let anchor1 = store.positions[c1 as usize].truncate();
    let anchor2 = store.positions[c2 as usize].truncate();
    let before = store.num_springs();

    for i in range {
        if i == c1 || i == c2 {
            continue;
        }
        let p = store.positions[i as usize].truncate();
        let stiffness1 = desc.stiffness_at(anchor1.distance_squared(p));
        let stiffness2 = desc.stiffness_at(anchor2.distance_squared(p));

        create_spring(store, c1, i, stiffness1, desc.give);
        create_spring(store, c2, i, stiffness2, desc.give);
    }

    store.num_springs() - before
}
