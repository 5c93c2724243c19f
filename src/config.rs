//! Global configuration constants for the particle pipeline.

/// Default gravity vector applied to particles (Y-up).
pub const DEFAULT_GRAVITY: [f32; 3] = [0.0, -9.8, 0.0];

/// Default frame timestep (in seconds).
pub const DEFAULT_TIME_STEP: f32 = 1.0 / 60.0;

/// Number of solver substeps dispatched per frame.
pub const DEFAULT_SUBSTEPS: u32 = 5;

/// Constraint iterations performed per substep.
pub const DEFAULT_SOLVER_ITERATIONS: u32 = 3;

/// Default particle radius.
pub const DEFAULT_PARTICLE_RADIUS: f32 = 0.15;

/// Upper bound on acceleration, roughly 10x gravity.
pub const DEFAULT_MAX_ACCELERATION: f32 = 100.0;

/// Neighbour budget handed to the solver.
pub const DEFAULT_MAX_NEIGHBORS_PER_PARTICLE: u32 = 96;

/// Number of boundary planes carried by [`SimParams`](crate::core::params::SimParams).
pub const MAX_PLANES: usize = 8;

/// Warm-up dispatch count performed after a reset when enabled.
pub const WARMUP_ITERATIONS: u32 = 100;

/// Timestep used for every warm-up dispatch.
pub const WARMUP_TIME_STEP: f32 = 0.0001;

/// Solver iterations used while warming up.
pub const WARMUP_SOLVER_ITERATIONS: u32 = 4;

/// Squared-distance falloff of the tether stiffness, `exp(-d² / falloff)`.
pub const TETHER_FALLOFF: f32 = 0.2;

/// Rest-length slack applied to tether springs.
pub const TETHER_GIVE: f32 = 0.1;

/// Base direction of the procedural wind.
pub const WIND_DIRECTION: [f32; 3] = [3.0, 0.0, 15.0];

/// Octaves and persistence of the wind noise.
pub const WIND_NOISE_OCTAVES: u32 = 10;
pub const WIND_NOISE_PERSISTENCE: f32 = 0.25;

/// Magnitude of the random velocity jitter given to fresh cloth particles.
pub const CLOTH_VELOCITY_JITTER: f32 = 0.01;

/// Exponential smoothing applied to the on-screen frame timers.
pub const TIMER_SMOOTHING: f32 = 0.05;

/// Frame budget used for overrun warnings (in milliseconds).
pub const FRAME_BUDGET_MS: f32 = 16.6;

/// Wind noise frequency, applied to the wind clock in seconds.
pub const WIND_FREQUENCY: f32 = 0.1;

/// Strength and frequency set by a wind gust.
pub const GUST_STRENGTH: f32 = 1.5;
pub const GUST_FREQUENCY: f32 = 0.2;

/// Oscillation of the wave-pool wall (plane 2).
pub const WAVE_FREQUENCY: f32 = 1.5;
pub const WAVE_AMPLITUDE: f32 = 1.0;

/// Fraction of the remaining distance a picked particle moves per frame.
pub const PICK_LERP: f32 = 0.8;
