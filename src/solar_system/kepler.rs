//! Keplerian elements and their conversion to states.

use bevy::math::DVec3;

use crate::types::{DEG_TO_RAD, DegreesOfFreedom};

/// Keplerian orbital elements of an elliptic orbit.
/// All angular values in radians, distances in meters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KeplerOrbit {
    /// Semi-major axis in meters
    pub semi_major_axis: f64,
    /// Eccentricity (dimensionless, 0 ≤ e < 1)
    pub eccentricity: f64,
    /// Inclination to the reference plane in radians
    pub inclination: f64,
    /// Argument of periapsis in radians
    pub argument_of_periapsis: f64,
    /// Longitude of the ascending node in radians
    pub longitude_of_ascending_node: f64,
    /// Mean anomaly at the epoch in radians
    pub mean_anomaly: f64,
}

impl KeplerOrbit {
    /// Create an orbit from elements given in degrees.
    ///
    /// # Arguments
    /// * `semi_major_axis` - Semi-major axis in meters
    /// * `eccentricity` - Orbital eccentricity (0-1 for elliptical orbits)
    /// * `inclination_deg` - Inclination in degrees
    /// * `argument_of_periapsis_deg` - Argument of periapsis in degrees
    /// * `longitude_of_ascending_node_deg` - Longitude of the ascending node in degrees
    /// * `mean_anomaly_deg` - Mean anomaly at the epoch in degrees
    pub fn from_elements(
        semi_major_axis: f64,
        eccentricity: f64,
        inclination_deg: f64,
        argument_of_periapsis_deg: f64,
        longitude_of_ascending_node_deg: f64,
        mean_anomaly_deg: f64,
    ) -> Self {
        Self {
            semi_major_axis,
            eccentricity,
            inclination: inclination_deg * DEG_TO_RAD,
            argument_of_periapsis: argument_of_periapsis_deg * DEG_TO_RAD,
            longitude_of_ascending_node: longitude_of_ascending_node_deg * DEG_TO_RAD,
            mean_anomaly: mean_anomaly_deg * DEG_TO_RAD,
        }
    }

    /// Whether the elements describe a closed orbit.
    pub fn is_elliptic(&self) -> bool {
        self.semi_major_axis.is_finite()
            && self.semi_major_axis > 0.0
            && (0.0..1.0).contains(&self.eccentricity)
            && self.inclination.is_finite()
            && self.argument_of_periapsis.is_finite()
            && self.longitude_of_ascending_node.is_finite()
            && self.mean_anomaly.is_finite()
    }

    /// Mean motion in radians per second about a primary with the given μ.
    pub fn mean_motion(&self, gravitational_parameter: f64) -> f64 {
        (gravitational_parameter / self.semi_major_axis.powi(3)).sqrt()
    }

    /// Orbital period in seconds.
    pub fn period(&self, gravitational_parameter: f64) -> f64 {
        std::f64::consts::TAU / self.mean_motion(gravitational_parameter)
    }

    /// Solve Kepler's equation M = E - e*sin(E) for eccentric anomaly E
    /// using Newton's method.
    ///
    /// Starts from π at high eccentricity, where E = M converges poorly.
    pub fn solve_eccentric_anomaly(&self, mean_anomaly: f64) -> f64 {
        let m = mean_anomaly.rem_euclid(std::f64::consts::TAU);
        let e = self.eccentricity;

        let mut e_anomaly = if e < 0.8 { m } else { std::f64::consts::PI };
        for _ in 0..50 {
            let (sin_e, cos_e) = e_anomaly.sin_cos();
            let delta = (e_anomaly - e * sin_e - m) / (1.0 - e * cos_e);
            e_anomaly -= delta;
            if delta.abs() < 1e-12 {
                break;
            }
        }
        e_anomaly
    }

    /// True anomaly from eccentric anomaly, over the full circle.
    pub fn eccentric_to_true_anomaly(&self, eccentric_anomaly: f64) -> f64 {
        let e = self.eccentricity;
        let half = eccentric_anomaly / 2.0;
        2.0 * ((1.0 + e).sqrt() * half.sin()).atan2((1.0 - e).sqrt() * half.cos())
    }

    /// State relative to the primary, `time` seconds after the epoch.
    ///
    /// `gravitational_parameter` is the μ of the two-body problem, i.e. the
    /// sum of the primary's and the orbiting body's.
    pub fn degrees_of_freedom(&self, gravitational_parameter: f64, time: f64) -> DegreesOfFreedom {
        let a = self.semi_major_axis;
        let e = self.eccentricity;
        let n = self.mean_motion(gravitational_parameter);

        let e_anomaly = self.solve_eccentric_anomaly(self.mean_anomaly + n * time);
        let (sin_e, cos_e) = e_anomaly.sin_cos();
        let b_over_a = (1.0 - e * e).sqrt();
        let r = a * (1.0 - e * cos_e);

        // Perifocal frame: x toward periapsis, z along the angular momentum.
        let position = DVec3::new(a * (cos_e - e), a * b_over_a * sin_e, 0.0);
        let velocity = DVec3::new(-sin_e, b_over_a * cos_e, 0.0) * (n * a * a / r);

        let [p, q, w] = self.perifocal_basis();
        DegreesOfFreedom::new(
            p * position.x + q * position.y + w * position.z,
            p * velocity.x + q * velocity.y + w * velocity.z,
        )
    }

    /// Unit vectors of the perifocal frame (toward periapsis, 90° ahead in
    /// the orbit, orbit normal) in the reference frame.
    pub fn perifocal_basis(&self) -> [DVec3; 3] {
        let (sin_o, cos_o) = self.longitude_of_ascending_node.sin_cos();
        let (sin_w, cos_w) = self.argument_of_periapsis.sin_cos();
        let (sin_i, cos_i) = self.inclination.sin_cos();

        let p = DVec3::new(
            cos_o * cos_w - sin_o * sin_w * cos_i,
            sin_o * cos_w + cos_o * sin_w * cos_i,
            sin_w * sin_i,
        );
        let q = DVec3::new(
            -cos_o * sin_w - sin_o * cos_w * cos_i,
            -sin_o * sin_w + cos_o * cos_w * cos_i,
            cos_w * sin_i,
        );
        let w = DVec3::new(sin_o * sin_i, -cos_o * sin_i, cos_i);
        [p, q, w]
    }
}
