use std::path::PathBuf;

use glam::Vec3;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use super::wind::{Wind, WavePool};
use super::PipelineConfig;
use crate::config::DEFAULT_GRAVITY;
use crate::core::assets::AssetRegistry;
use crate::core::params::SimParams;

/// Per-simulation mutable state shared by the pipeline and the active scene.
///
/// Rebuilt from the [`PipelineConfig`] on every reset.
#[derive(Debug)]
pub struct SimContext {
    pub params: SimParams,
    pub frame: u64,
    pub dt: f32,
    pub substeps: u32,

    pub paused: bool,
    /// Run exactly one frame while paused.
    pub step: bool,

    /// Capacity allocated beyond the particles created at initialization.
    pub num_extra_particles: usize,
    pub warmup: bool,

    /// Set by scenes that moved or replaced collision shapes this frame.
    pub shapes_changed: bool,
    pub floor_tilt: f32,
    pub wind: Wind,
    pub wave: WavePool,

    /// Collision meshes and fields registered by the current scene.
    pub assets: AssetRegistry,
    pub rng: Pcg32,

    /// Export base path requested for the current frame.
    pub export_path: Option<PathBuf>,
}

impl SimContext {
    pub fn new(config: &PipelineConfig) -> Self {
        let mut params = config.params;
        params.wind = Vec3::ZERO;
        Self {
            params,
            frame: 0,
            dt: config.dt,
            substeps: config.substeps.max(1),
            paused: false,
            step: false,
            num_extra_particles: config.extra_particles,
            warmup: config.warmup,
            shapes_changed: false,
            floor_tilt: 0.0,
            wind: Wind::new(),
            wave: WavePool::default(),
            assets: AssetRegistry::new(),
            rng: Pcg32::seed_from_u64(config.seed),
            export_path: None,
        }
    }

    /// Whether this frame advances the simulation.
    pub fn is_simulating(&self) -> bool {
        !self.paused || self.step
    }

    pub fn toggle_pause(&mut self) {
        self.paused = !self.paused;
    }

    pub fn toggle_gravity(&mut self) {
        self.params.gravity.y = if self.params.gravity.y != 0.0 {
            0.0
        } else {
            DEFAULT_GRAVITY[1]
        };
    }

    pub fn remove_plane(&mut self) {
        self.params.num_planes = self.params.num_planes.saturating_sub(1);
    }

    /// Uniformly distributed direction from the seeded generator.
    pub fn random_unit_vector(&mut self) -> Vec3 {
        let z: f32 = self.rng.random_range(-1.0..=1.0);
        let theta: f32 = self.rng.random_range(0.0..std::f32::consts::TAU);
        let r = (1.0 - z * z).max(0.0).sqrt();
        Vec3::new(r * theta.cos(), r * theta.sin(), z)
    }

    pub fn request_export(&mut self, path: impl Into<PathBuf>) {
        self.export_path = Some(path.into());
    }

    /// Updates wind and the wave pool for one frame.
    pub fn advance_environment(&mut self) {
        self.params.wind = self.wind.advance(self.dt);
        self.wave.advance(self.dt, &mut self.params);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn same_seed_same_jitter() {
        let config = PipelineConfig::default();
        let mut a = SimContext::new(&config);
        let mut b = SimContext::new(&config);
        for _ in 0..8 {
            let v = a.random_unit_vector();
            assert_eq!(v, b.random_unit_vector());
            assert_relative_eq!(v.length(), 1.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn gravity_toggles_between_zero_and_default() {
        let mut ctx = SimContext::new(&PipelineConfig::default());
        ctx.toggle_gravity();
        assert_eq!(ctx.params.gravity.y, 0.0);
        ctx.toggle_gravity();
        assert_eq!(ctx.params.gravity.y, -9.8);
    }

    #[test]
    fn plane_removal_stops_at_zero() {
        let mut ctx = SimContext::new(&PipelineConfig::default());
        ctx.params.num_planes = 1;
        ctx.remove_plane();
        ctx.remove_plane();
        assert_eq!(ctx.params.num_planes, 0);
    }
}
