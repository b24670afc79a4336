//! Gravity calculation for massive bodies and massless test particles.
//!
//! Pairwise Newtonian attraction summed over all massive bodies, plus the
//! zonal J2 term of every oblate body. Body positions are supplied by the
//! caller: fresh integration state while prolonging the ephemeris, or the
//! continuous trajectories when flowing other trajectories.
//!
//! No singularity guard is applied: coincident points yield non-finite
//! accelerations, which the adaptive integrator reports as a singularity.

use bevy::math::DVec3;

use crate::body::{MassiveBody, Oblateness};

/// Compute the accelerations of all massive bodies due to one another.
///
/// # Arguments
/// * `bodies` - The massive bodies, in ephemeris order
/// * `positions` - Position of each body in meters (same order)
/// * `accelerations` - Output, overwritten; acceleration of each body in m/s²
pub fn compute_mutual_accelerations(
    bodies: &[MassiveBody],
    positions: &[DVec3],
    accelerations: &mut [DVec3],
) {
    debug_assert_eq!(bodies.len(), positions.len());
    debug_assert_eq!(bodies.len(), accelerations.len());

    accelerations.fill(DVec3::ZERO);

    for (i, body_i) in bodies.iter().enumerate() {
        let mu_i = body_i.gravitational_parameter();
        for j in (i + 1)..bodies.len() {
            let body_j = &bodies[j];
            let mu_j = body_j.gravitational_parameter();

            // Displacement from i to j.
            let delta = positions[j] - positions[i];
            let r_squared = delta.length_squared();
            let r = r_squared.sqrt();
            let inverse_r_cubed = 1.0 / (r_squared * r);

            accelerations[i] += delta * (mu_j * inverse_r_cubed);
            accelerations[j] -= delta * (mu_i * inverse_r_cubed);

            // J2 of i acting on j, and the reaction on i.
            if let Some(oblateness) = body_i.oblateness() {
                let term = j2_unit_acceleration(oblateness, delta);
                accelerations[j] += term * mu_i;
                accelerations[i] -= term * mu_j;
            }
            // J2 of j acting on i, and the reaction on j.
            if let Some(oblateness) = body_j.oblateness() {
                let term = j2_unit_acceleration(oblateness, -delta);
                accelerations[i] += term * mu_j;
                accelerations[j] -= term * mu_i;
            }
        }
    }
}

/// Compute the gravitational acceleration on a massless point.
///
/// # Arguments
/// * `bodies` - The massive bodies, in ephemeris order
/// * `body_positions` - Position of each body in meters at the time of interest
/// * `position` - Position of the massless point in meters
///
/// # Returns
/// Acceleration vector in m/s²
#[inline]
pub fn compute_test_particle_acceleration(
    bodies: &[MassiveBody],
    body_positions: &[DVec3],
    position: DVec3,
) -> DVec3 {
    debug_assert_eq!(bodies.len(), body_positions.len());

    let mut acc = DVec3::ZERO;
    for (body, &body_pos) in bodies.iter().zip(body_positions) {
        let mu = body.gravitational_parameter();
        let delta = body_pos - position;
        let r_squared = delta.length_squared();
        let r = r_squared.sqrt();
        acc += delta * (mu / (r_squared * r));

        if let Some(oblateness) = body.oblateness() {
            acc += j2_unit_acceleration(oblateness, -delta) * mu;
        }
    }
    acc
}

/// The J2 acceleration of a point at `displacement` from an oblate body of
/// gravitational parameter `mu`.
#[inline]
pub fn j2_acceleration(oblateness: &Oblateness, mu: f64, displacement: DVec3) -> DVec3 {
    j2_unit_acceleration(oblateness, displacement) * mu
}

/// J2 acceleration per unit μ.
///
/// `a = 3/2 J2 R² / r⁵ [ (5 z²/r² − 1) r⃗ − 2 z ê ]` with `z = r⃗·ê`, where `ê`
/// is the polar axis and `r⃗` the displacement from the body to the point.
#[inline]
fn j2_unit_acceleration(oblateness: &Oblateness, displacement: DVec3) -> DVec3 {
    let r_squared = displacement.length_squared();
    let r = r_squared.sqrt();
    let z = displacement.dot(oblateness.axis);

    // Written as (R/r)² r⁻³ to keep the intermediate values well scaled.
    let radius_ratio = oblateness.reference_radius / r;
    let coef = 1.5 * oblateness.j2 * radius_ratio * radius_ratio / (r_squared * r);
    let z_term = 5.0 * z * z / r_squared;

    (displacement * (z_term - 1.0) - oblateness.axis * (2.0 * z)) * coef
}
