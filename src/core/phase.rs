//! Phase encoding: a collision group in the low bits plus behaviour flags.

/// Mask selecting the group portion of a phase.
pub const PHASE_GROUP_MASK: i32 = 0x000f_ffff;

/// Behaviour flags stored above the group bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PhaseFlags(pub i32);

impl PhaseFlags {
    pub const NONE: Self = Self(0);
    /// Particles of the same group collide with each other.
    pub const SELF_COLLIDE: Self = Self(1 << 20);
    /// Self collision ignores particles that overlap at rest.
    pub const SELF_COLLIDE_FILTER: Self = Self(1 << 21);
    /// Particle participates in fluid density constraints.
    pub const FLUID: Self = Self(1 << 22);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for PhaseFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Builds a phase value from a group id and flags.
pub fn make_phase(group: i32, flags: PhaseFlags) -> i32 {
    (group & PHASE_GROUP_MASK) | flags.0
}

pub fn phase_group(phase: i32) -> i32 {
    phase & PHASE_GROUP_MASK
}

pub fn phase_flags(phase: i32) -> PhaseFlags {
    PhaseFlags(phase & !PHASE_GROUP_MASK)
}
