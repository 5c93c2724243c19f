use glam::{Vec3, Vec4};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::{
    DEFAULT_GRAVITY, DEFAULT_MAX_ACCELERATION, DEFAULT_PARTICLE_RADIUS,
    DEFAULT_SOLVER_ITERATIONS, MAX_PLANES,
};

/// How constraint corrections are relaxed inside the solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelaxationMode {
    Global,
    Local,
}

/// Flat record of every solver-visible simulation parameter.
///
/// Several fields use `0.0` as a "derive me" sentinel; see
/// [`SimParams::apply_derived_defaults`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimParams {
    pub gravity: Vec3,
    pub wind: Vec3,

    pub radius: f32,
    pub solid_rest_distance: f32,
    pub fluid_rest_distance: f32,
    pub num_iterations: u32,

    pub dynamic_friction: f32,
    pub static_friction: f32,
    pub particle_friction: f32,
    pub restitution: f32,
    pub adhesion: f32,
    pub sleep_threshold: f32,
    pub max_speed: f32,
    pub max_acceleration: f32,
    pub shock_propagation: f32,
    pub dissipation: f32,
    pub damping: f32,

    pub drag: f32,
    pub lift: f32,

    pub cohesion: f32,
    pub surface_tension: f32,
    pub viscosity: f32,
    pub vorticity_confinement: f32,
    pub solid_pressure: f32,
    pub free_surface_drag: f32,
    pub buoyancy: f32,

    pub collision_distance: f32,
    pub particle_collision_margin: f32,
    pub shape_collision_margin: f32,

    pub relaxation_mode: RelaxationMode,
    pub relaxation_factor: f32,

    /// Boundary planes as `(normal, offset)` with `dot(n, p) + w >= 0` inside.
    pub planes: [Vec4; MAX_PLANES],
    pub num_planes: usize,
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            gravity: Vec3::from_array(DEFAULT_GRAVITY),
            wind: Vec3::ZERO,
            radius: DEFAULT_PARTICLE_RADIUS,
            solid_rest_distance: 0.0,
            fluid_rest_distance: 0.0,
            num_iterations: DEFAULT_SOLVER_ITERATIONS,
            dynamic_friction: 0.0,
            static_friction: 0.0,
            particle_friction: 0.0,
            restitution: 0.0,
            adhesion: 0.0,
            sleep_threshold: 0.0,
            max_speed: f32::MAX,
            max_acceleration: DEFAULT_MAX_ACCELERATION,
            shock_propagation: 0.0,
            dissipation: 0.0,
            damping: 0.0,
            drag: 0.0,
            lift: 0.0,
            cohesion: 0.025,
            surface_tension: 0.0,
            viscosity: 0.0,
            vorticity_confinement: 0.0,
            solid_pressure: 1.0,
            free_surface_drag: 0.0,
            buoyancy: 1.0,
            collision_distance: 0.0,
            particle_collision_margin: 0.0,
            shape_collision_margin: 0.0,
            relaxation_mode: RelaxationMode::Local,
            relaxation_factor: 1.0,
            planes: [Vec4::ZERO; MAX_PLANES],
            num_planes: 1,
        }
    }
}

impl SimParams {
    /// Fills every zero-sentinel field from the values it depends on.
    ///
    /// Order matters: each derived value may feed the next one. Explicit
    /// non-zero values are never overwritten.
    pub fn apply_derived_defaults(&mut self) {
        if self.solid_rest_distance == 0.0 {
            self.solid_rest_distance = self.radius;
        }

        // fluid present: solids share the fluid spacing
        if self.fluid_rest_distance > 0.0 {
            self.solid_rest_distance = self.fluid_rest_distance;
        }

        if self.collision_distance == 0.0 {
            self.collision_distance =
                self.solid_rest_distance.max(self.fluid_rest_distance) * 0.5;
        }

        if self.particle_friction == 0.0 {
            self.particle_friction = self.dynamic_friction * 0.1;
        }

        if self.shape_collision_margin == 0.0 {
            self.shape_collision_margin = self.collision_distance * 0.5;
        }
    }

    /// Active boundary planes.
    pub fn active_planes(&self) -> &[Vec4] {
        &self.planes[..self.num_planes.min(MAX_PLANES)]
    }

    /// Derives the six boundary planes from the padded scene bounds.
    ///
    /// Plane 0 is the (optionally tilted) ground; the rest enclose the scene.
    pub fn set_boundary_planes(&mut self, lower: Vec3, upper: Vec3, floor_tilt: f32) {
        let up = Vec3::new(-floor_tilt, 1.0, 0.0).normalize();

        self.planes[0] = up.extend(0.0);
        self.planes[1] = Vec4::new(0.0, 0.0, 1.0, -lower.z);
        self.planes[2] = Vec4::new(1.0, 0.0, 0.0, -lower.x);
        self.planes[3] = Vec4::new(-1.0, 0.0, 0.0, upper.x);
        self.planes[4] = Vec4::new(0.0, 0.0, -1.0, upper.z);
        self.planes[5] = Vec4::new(0.0, -1.0, 0.0, upper.y);
    }

    /// Dumps the solver-relevant subset at debug level.
    pub fn log_summary(&self, substeps: u32) {
        debug!("---- Simulation Params ----");
        debug!("substeps:                  {substeps}");
        debug!("radius:                    {}", self.radius);
        debug!("num_planes:                {}", self.num_planes);
        debug!("iterations:                {}", self.num_iterations);
        debug!("restitution:               {}", self.restitution);
        debug!("dissipation:               {}", self.dissipation);
        debug!("damping:                   {}", self.damping);
        debug!("drag:                      {}", self.drag);
        debug!("lift:                      {}", self.lift);
        debug!("dynamic_friction:          {}", self.dynamic_friction);
        debug!("static_friction:           {}", self.static_friction);
        debug!("particle_friction:         {}", self.particle_friction);
        debug!("collision_distance:        {}", self.collision_distance);
        debug!("shape_collision_margin:    {}", self.shape_collision_margin);
        debug!("particle_collision_margin: {}", self.particle_collision_margin);
        debug!("relaxation_factor:         {}", self.relaxation_factor);
        debug!("relaxation_mode:           {:?}", self.relaxation_mode);
        debug!("viscosity:                 {}", self.viscosity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_defaults_follow_dependency_order() {
        let mut params = SimParams {
            radius: 0.1,
            dynamic_friction: 0.5,
            ..SimParams::default()
        };
        params.apply_derived_defaults();

        assert_eq!(params.solid_rest_distance, 0.1);
        assert_eq!(params.collision_distance, 0.05);
        assert_eq!(params.particle_friction, 0.05);
        assert_eq!(params.shape_collision_margin, 0.025);
    }

    #[test]
    fn fluid_rest_distance_overrides_solid() {
        let mut params = SimParams {
            radius: 0.1,
            solid_rest_distance: 0.08,
            fluid_rest_distance: 0.06,
            ..SimParams::default()
        };
        params.apply_derived_defaults();

        assert_eq!(params.solid_rest_distance, 0.06);
        assert_eq!(params.collision_distance, 0.03);
    }

    #[test]
    fn explicit_values_are_kept() {
        let mut params = SimParams {
            collision_distance: 0.4,
            particle_friction: 0.7,
            shape_collision_margin: 0.9,
            ..SimParams::default()
        };
        params.apply_derived_defaults();

        assert_eq!(params.collision_distance, 0.4);
        assert_eq!(params.particle_friction, 0.7);
        assert_eq!(params.shape_collision_margin, 0.9);
    }

    #[test]
    fn boundary_planes_enclose_bounds() {
        let mut params = SimParams::default();
        params.set_boundary_planes(Vec3::splat(-1.0), Vec3::splat(2.0), 0.0);

        let inside = Vec3::splat(0.5);
        for plane in &params.planes[..6] {
            assert!(plane.truncate().dot(inside) + plane.w >= 0.0);
        }
        assert_eq!(params.planes[0], Vec4::new(0.0, 1.0, 0.0, 0.0));
    }
}
