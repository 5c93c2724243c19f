use std::f32::consts::PI;

use glam::Vec3;

use crate::config::{
    GUST_FREQUENCY, GUST_STRENGTH, WAVE_AMPLITUDE, WAVE_FREQUENCY, WIND_DIRECTION,
    WIND_FREQUENCY, WIND_NOISE_OCTAVES, WIND_NOISE_PERSISTENCE,
};
use crate::core::params::SimParams;
use crate::utils::math::perlin1d;

/// Procedural wind driven by 1D Perlin noise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Wind {
    pub time: f32,
    pub strength: f32,
    pub frequency: f32,
}

impl Wind {
    /// Calm wind at the base noise frequency.
    pub fn new() -> Self {
        Self {
            time: 0.0,
            strength: 0.0,
            frequency: WIND_FREQUENCY,
        }
    }

    /// Advances the wind clock and returns the new wind vector.
    pub fn advance(&mut self, dt: f32) -> Vec3 {
        self.time += dt;
        let noise = perlin1d(
            self.time * self.frequency,
            WIND_NOISE_OCTAVES,
            WIND_NOISE_PERSISTENCE,
        );
        self.strength * Vec3::from_array(WIND_DIRECTION) * Vec3::new(noise, 0.0, noise.abs())
    }

    /// Restarts the noise with a stronger, faster gust.
    pub fn gust(&mut self) {
        self.time = 0.0;
        self.strength = GUST_STRENGTH;
        self.frequency = GUST_FREQUENCY;
    }
}

impl Default for Wind {
    fn default() -> Self {
        Self::new()
    }
}

/// Oscillating side wall (boundary plane 2).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WavePool {
    pub enabled: bool,
    pub time: f32,
    /// Rest offset of plane 2, captured when the planes are built.
    pub rest_offset: f32,
}

impl WavePool {
    pub fn toggle(&mut self) {
        self.enabled = !self.enabled;
    }

    /// Offset of plane 2 at the current wave time.
    pub fn offset(&self) -> f32 {
        let phase = (self.time * WAVE_FREQUENCY - PI * 0.5).sin() * 0.5 + 0.5;
        self.rest_offset + phase * WAVE_AMPLITUDE
    }

    /// Moves plane 2 when enabled. Leaves the plane alone otherwise.
    pub fn advance(&mut self, dt: f32, params: &mut SimParams) {
        if !self.enabled {
            return;
        }
        self.time += dt;
        params.planes[2].w = self.offset();
    }
}
