//! Additional math helpers layered on top of `glam`.

use std::f32::consts::PI;

use glam::{Mat3, Quat, Vec3};

/// Normalizes `v`, returning `fallback` when it is too short to carry a direction.
pub fn safe_normalize(v: Vec3, fallback: Vec3) -> Vec3 {
    let len_sq = v.length_squared();
    if len_sq > 0.0 {
        v / len_sq.sqrt()
    } else {
        fallback
    }
}

/// Integer hash noise in `[-1, 1]`.
fn noise1(x: i32) -> f32 {
    let x = (x << 13) ^ x;
    let hashed = x
        .wrapping_mul(x.wrapping_mul(x).wrapping_mul(15731).wrapping_add(789_221))
        .wrapping_add(1_376_312_589)
        & 0x7fff_ffff;
    1.0 - hashed as f32 / 1_073_741_824.0
}

fn smoothed_noise1(x: i32) -> f32 {
    noise1(x) / 2.0 + noise1(x.wrapping_sub(1)) / 4.0 + noise1(x.wrapping_add(1)) / 4.0
}

fn cosine_interpolate(a: f32, b: f32, t: f32) -> f32 {
    let f = (1.0 - (t * PI).cos()) * 0.5;
    a * (1.0 - f) + b * f
}

fn interpolated_noise1(x: f32) -> f32 {
    let whole = x.floor();
    let frac = x - whole;
    let i = whole as i32;
    cosine_interpolate(smoothed_noise1(i), smoothed_noise1(i.wrapping_add(1)), frac)
}

/// Fractal 1D value noise: octave `i` samples at `2^i` frequency with
/// `persistence^i` amplitude.
pub fn perlin1d(x: f32, octaves: u32, persistence: f32) -> f32 {
    let mut total = 0.0;
    let mut frequency = 1.0;
    let mut amplitude = 1.0;
    for _ in 0..octaves {
        total += interpolated_noise1(x * frequency) * amplitude;
        frequency *= 2.0;
        amplitude *= persistence;
    }
    total
}

/// Rotation part of `a = R * S`, by averaging with the inverse transpose.
///
/// Singular inputs collapse to identity.
pub fn polar_rotation(a: Mat3, iterations: u32) -> Mat3 {
    let mut r = a;
    for _ in 0..iterations {
        let det = r.determinant();
        if det.abs() < 1e-10 {
            return Mat3::IDENTITY;
        }
        r = (r + r.inverse().transpose()) * 0.5;
    }
    r
}

/// `a * b^T`.
pub fn outer(a: Vec3, b: Vec3) -> Mat3 {
    Mat3::from_cols(a * b.x, a * b.y, a * b.z)
}

/// Quaternion from a rotation matrix that may have drifted from orthonormal.
pub fn quat_from_rotation(r: Mat3) -> Quat {
    let q = Quat::from_mat3(&r);
    if q.is_finite() && q.length_squared() > 0.0 {
        q.normalize()
    } else {
        Quat::IDENTITY
    }
}
