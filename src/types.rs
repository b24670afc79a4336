//! Core physics types and constants shared by the ephemeris engine.
//!
//! All quantities are SI: positions in metres, velocities in m/s,
//! accelerations in m/s², times in seconds since an arbitrary epoch
//! (J2000 for the solar-system presets). Every vector is expressed in the
//! single inertial frame of the `Ephemeris` that produced it.

use bevy::math::DVec3;

/// Physical constants (SI units)

/// Gravitational constant (m³·kg⁻¹·s⁻²)
pub const G: f64 = 6.67430e-11;

/// Astronomical unit in meters
pub const AU_TO_METERS: f64 = 1.495978707e11;

/// Degrees to radians conversion factor
pub const DEG_TO_RAD: f64 = std::f64::consts::PI / 180.0;

/// Seconds per day
pub const SECONDS_PER_DAY: f64 = 86400.0;

/// Seconds per Julian year
pub const SECONDS_PER_JULIAN_YEAR: f64 = 365.25 * SECONDS_PER_DAY;

/// Sun standard gravitational parameter (m³/s²)
pub const GM_SUN: f64 = 1.32712440018e20;

/// Position and velocity of a point at one instant.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DegreesOfFreedom {
    /// Position in meters
    pub position: DVec3,
    /// Velocity in meters per second
    pub velocity: DVec3,
}

impl DegreesOfFreedom {
    pub const fn new(position: DVec3, velocity: DVec3) -> Self {
        Self { position, velocity }
    }

    /// Whether every component is finite.
    pub fn is_finite(&self) -> bool {
        self.position.is_finite() && self.velocity.is_finite()
    }
}

impl std::ops::Sub for DegreesOfFreedom {
    type Output = DegreesOfFreedom;

    /// Relative state of `self` with respect to `rhs`.
    fn sub(self, rhs: Self) -> Self::Output {
        DegreesOfFreedom::new(self.position - rhs.position, self.velocity - rhs.velocity)
    }
}

/// A `DegreesOfFreedom` stamped with the time it holds at.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimedDegreesOfFreedom {
    /// Time in seconds since the epoch
    pub time: f64,
    pub degrees_of_freedom: DegreesOfFreedom,
}

impl TimedDegreesOfFreedom {
    pub const fn new(time: f64, degrees_of_freedom: DegreesOfFreedom) -> Self {
        Self {
            time,
            degrees_of_freedom,
        }
    }

    #[inline]
    pub fn position(&self) -> DVec3 {
        self.degrees_of_freedom.position
    }

    #[inline]
    pub fn velocity(&self) -> DVec3 {
        self.degrees_of_freedom.velocity
    }
}
