use crate::core::store::ParticleStore;

/// Appends a spring between particles `i` and `j` and returns its index.
///
/// The rest length is `(1 + give)` times their current distance. A negative
/// `stiffness` makes the spring a unilateral tether of strength `|stiffness|`.
pub fn create_spring(store: &mut ParticleStore, i: u32, j: u32, stiffness: f32, give: f32) -> usize {
    let a = store.positions[i as usize].truncate();
    let b = store.positions[j as usize].truncate();
    let index = store.num_springs();

    store.spring_indices.extend([i, j]);
    store.spring_lengths.push((1.0 + give) * a.distance(b));
    store.spring_stiffness.push(stiffness);
    index
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use glam::Vec3;

    #[test]
    fn rest_length_includes_give() {
        let mut store = ParticleStore::new();
        let a = store.push_particle(Vec3::ZERO, 1.0, Vec3::ZERO, 0);
        let b = store.push_particle(Vec3::new(3.0, 4.0, 0.0), 1.0, Vec3::ZERO, 0);

        assert_eq!(create_spring(&mut store, a, b, 1.0, 0.0), 0);
        assert_eq!(create_spring(&mut store, b, a, -0.5, 0.1), 1);

        assert_eq!(store.spring_indices, vec![0, 1, 1, 0]);
        assert_relative_eq!(store.spring_lengths[0], 5.0);
        assert_relative_eq!(store.spring_lengths[1], 5.5);
        assert_eq!(store.spring_stiffness[1], -0.5);
    }
}
