//! Fixtures and orbital invariants shared by the unit tests.

use bevy::math::DVec3;

use crate::types::{AU_TO_METERS, DegreesOfFreedom, GM_SUN};

/// Fixtures for creating test orbital states.
pub mod fixtures {
    use super::*;
    use crate::body::MassiveBody;

    /// Create a body in a circular orbit at the given distance from the Sun.
    ///
    /// The body is placed on the positive x-axis with velocity in the +y direction.
    pub fn circular_orbit(distance_au: f64) -> DegreesOfFreedom {
        let r = distance_au * AU_TO_METERS;
        // Circular orbit velocity: v = sqrt(GM/r)
        let v = (GM_SUN / r).sqrt();
        DegreesOfFreedom::new(DVec3::new(r, 0.0, 0.0), DVec3::new(0.0, v, 0.0))
    }

    /// Create a body in an elliptical orbit at perihelion.
    ///
    /// The body starts at perihelion (closest approach) on the positive x-axis.
    pub fn elliptical_orbit(perihelion_au: f64, eccentricity: f64) -> DegreesOfFreedom {
        assert!(
            (0.0..1.0).contains(&eccentricity),
            "Eccentricity must be in [0, 1) for elliptical orbit"
        );

        let r_p = perihelion_au * AU_TO_METERS;
        let a = r_p / (1.0 - eccentricity);
        // Vis-viva equation at perihelion: v = sqrt(GM * (2/r - 1/a))
        let v = (GM_SUN * (2.0 / r_p - 1.0 / a)).sqrt();
        DegreesOfFreedom::new(DVec3::new(r_p, 0.0, 0.0), DVec3::new(0.0, v, 0.0))
    }

    /// Create a body on an escape trajectory (1.1× escape velocity).
    pub fn escape_trajectory(distance_au: f64) -> DegreesOfFreedom {
        let r = distance_au * AU_TO_METERS;
        let v = (2.0 * GM_SUN / r).sqrt() * 1.1;
        DegreesOfFreedom::new(DVec3::new(r, 0.0, 0.0), DVec3::new(0.0, v, 0.0))
    }

    pub fn sun() -> MassiveBody {
        MassiveBody::new("Sun", GM_SUN).unwrap()
    }

    /// A Sun and a Jupiter-mass planet on a mildly eccentric mutual orbit,
    /// with the barycentre at rest at the origin.
    pub fn sun_and_jupiter() -> (Vec<MassiveBody>, Vec<DegreesOfFreedom>) {
        let mu_jupiter = 1.266_865_34e17;
        let bodies = vec![sun(), MassiveBody::new("Jupiter", mu_jupiter).unwrap()];

        // Relative orbit at perihelion, e = 0.05.
        let mu = GM_SUN + mu_jupiter;
        let r_p = 4.95 * AU_TO_METERS;
        let a = r_p / 0.95;
        let v = (mu * (2.0 / r_p - 1.0 / a)).sqrt();
        let relative = DegreesOfFreedom::new(DVec3::new(r_p, 0.0, 0.0), DVec3::new(0.0, v, 0.0));

        let jupiter_share = mu_jupiter / mu;
        let sun_state = DegreesOfFreedom::new(
            -relative.position * jupiter_share,
            -relative.velocity * jupiter_share,
        );
        let jupiter_state = DegreesOfFreedom::new(
            relative.position * (1.0 - jupiter_share),
            relative.velocity * (1.0 - jupiter_share),
        );
        (bodies, vec![sun_state, jupiter_state])
    }
}

/// Two-body invariants about the Sun.
pub mod assertions {
    use super::*;

    /// Compute specific orbital energy (energy per unit mass) around the Sun.
    ///
    /// E = v²/2 - GM/r
    /// Negative for bound orbits, zero for parabolic, positive for hyperbolic.
    pub fn orbital_energy(pos: DVec3, vel: DVec3) -> f64 {
        0.5 * vel.length_squared() - GM_SUN / pos.length()
    }

    /// Magnitude of the specific angular momentum |r × v|.
    pub fn angular_momentum(pos: DVec3, vel: DVec3) -> f64 {
        pos.cross(vel).length()
    }

    /// Compute orbital period for an elliptical orbit around the Sun.
    ///
    /// Uses Kepler's third law: T = 2π * sqrt(a³/GM)
    pub fn orbital_period(semi_major_axis: f64) -> f64 {
        use std::f64::consts::TAU;
        TAU * (semi_major_axis.powi(3) / GM_SUN).sqrt()
    }

    /// Check if an orbit is bound (elliptical) or unbound (hyperbolic/parabolic).
    pub fn is_bound(pos: DVec3, vel: DVec3) -> bool {
        orbital_energy(pos, vel) < 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_circular_orbit_has_correct_velocity() {
        let state = fixtures::circular_orbit(1.0); // 1 AU
        let expected_v = (GM_SUN / AU_TO_METERS).sqrt();
        assert_relative_eq!(state.velocity.length(), expected_v, epsilon = 1.0);
    }

    #[test]
    fn test_circular_orbit_is_bound() {
        let state = fixtures::circular_orbit(1.0);
        assert!(assertions::is_bound(state.position, state.velocity));
    }

    #[test]
    fn test_escape_trajectory_is_unbound() {
        let state = fixtures::escape_trajectory(1.0);
        assert!(!assertions::is_bound(state.position, state.velocity));
    }

    #[test]
    fn test_sun_and_jupiter_barycentre_at_rest() {
        let (bodies, states) = fixtures::sun_and_jupiter();
        let mut momentum = DVec3::ZERO;
        let mut moment = DVec3::ZERO;
        for (body, state) in bodies.iter().zip(&states) {
            momentum += state.velocity * body.gravitational_parameter();
            moment += state.position * body.gravitational_parameter();
        }
        assert!(momentum.length() / (GM_SUN * states[1].velocity.length()) < 1e-14);
        assert!(moment.length() / (GM_SUN * states[1].position.length()) < 1e-14);
    }

    #[test]
    fn test_orbital_period_earth() {
        let period = assertions::orbital_period(AU_TO_METERS);
        let year_seconds = 365.25 * 24.0 * 3600.0;
        assert_relative_eq!(period, year_seconds, epsilon = year_seconds * 0.01);
    }
}
