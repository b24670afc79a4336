//! Apsis detection along a discrete trajectory.

use bevy::math::DVec3;
use wide::f64x4;

use crate::trajectory::{BranchMut, ContinuousTrajectory, ContinuousTrajectoryError, DiscreteTrajectoryError};
use crate::types::{DegreesOfFreedom, TimedDegreesOfFreedom};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ApsisError {
    #[error("no body with index {0}")]
    UnknownBody(usize),

    #[error("reference trajectory: {0}")]
    Reference(#[from] ContinuousTrajectoryError),

    #[error("output trajectory: {0}")]
    Output(#[from] DiscreteTrajectoryError),
}

/// Find the apsides of `points` with respect to `reference`.
///
/// A sign change of `r·v` (relative position and velocity) between two
/// points brackets an extremum of the distance: `+` to `−` is an apoapsis,
/// `−` to `+` a periapsis. Points where `r·v` is exactly zero are skipped
/// when bracketing. The time of the extremum is the root of
/// the derivative of the cubic Hermite interpolant of `|r|²` over the pair,
/// and the state appended to the output is the Hermite interpolation of the
/// pair at that time.
pub fn compute_apsides<I>(
    reference: &ContinuousTrajectory,
    points: I,
    apoapsides: &mut BranchMut<'_>,
    periapsides: &mut BranchMut<'_>,
) -> Result<(), ApsisError>
where
    I: IntoIterator<Item = TimedDegreesOfFreedom>,
{
    // (point, |r|², r·v)
    let mut previous: Option<(TimedDegreesOfFreedom, f64, f64)> = None;

    for point in points {
        let relative = point.degrees_of_freedom - reference.evaluate_degrees_of_freedom(point.time)?;
        let squared_distance = relative.position.length_squared();
        let radial = relative.position.dot(relative.velocity);

        if let Some((start, start_squared_distance, start_radial)) = previous {
            let is_apoapsis = start_radial > 0.0 && radial < 0.0;
            let is_periapsis = start_radial < 0.0 && radial > 0.0;
            if is_apoapsis || is_periapsis {
                let h = point.time - start.time;
                let s = extremum_parameter(
                    start_squared_distance,
                    squared_distance,
                    2.0 * start_radial * h,
                    2.0 * radial * h,
                );
                let time = start.time + s * h;
                let apsis = hermite_interpolate(&start, &point, s);
                if is_apoapsis {
                    apoapsides.append(time, apsis)?;
                } else {
                    periapsides.append(time, apsis)?;
                }
            }
        }
        // A point exactly at `r·v = 0` does not end a bracket; the sign
        // change is judged against the next point with a definite sign.
        if radial != 0.0 || previous.is_none() {
            previous = Some((point, squared_distance, radial));
        }
    }
    Ok(())
}

/// Root in `[0, 1]` of the derivative of the cubic Hermite interpolant with
/// end values `p0`, `p1` and end slopes `m0`, `m1` (per unit parameter).
///
/// The slopes have opposite signs (or one vanishes), so a root exists.
fn extremum_parameter(p0: f64, p1: f64, m0: f64, m1: f64) -> f64 {
    // d/ds H(s) = a s² + b s + c
    let a = 6.0 * (p0 - p1) + 3.0 * (m0 + m1);
    let b = 6.0 * (p1 - p0) - 4.0 * m0 - 2.0 * m1;
    let c = m0;

    let linear = if m0 == m1 { 0.5 } else { m0 / (m0 - m1) };
    let scale = a.abs().max(b.abs()).max(c.abs());
    if scale == 0.0 {
        return linear.clamp(0.0, 1.0);
    }

    let candidates: [f64; 2] = if a.abs() <= 1e-12 * scale {
        [-c / b, f64::NAN]
    } else {
        let discriminant = (b * b - 4.0 * a * c).max(0.0);
        // Numerically stable pair of roots.
        let q = -0.5 * (b + b.signum() * discriminant.sqrt());
        [q / a, if q == 0.0 { f64::NAN } else { c / q }]
    };

    candidates
        .into_iter()
        .filter(|s| (-1e-9..=1.0 + 1e-9).contains(s))
        .min_by(|x, y| (x - linear).abs().total_cmp(&(y - linear).abs()))
        .unwrap_or(linear)
        .clamp(0.0, 1.0)
}

#[inline]
fn lanes(v: DVec3) -> f64x4 {
    f64x4::new([v.x, v.y, v.z, 0.0])
}

#[inline]
fn from_lanes(v: f64x4) -> DVec3 {
    let a = v.to_array();
    DVec3::new(a[0], a[1], a[2])
}

/// Cubic Hermite interpolation between two timed states at parameter `s ∈ [0, 1]`.
fn hermite_interpolate(start: &TimedDegreesOfFreedom, end: &TimedDegreesOfFreedom, s: f64) -> DegreesOfFreedom {
    let step = end.time - start.time;

    let p0 = lanes(start.position());
    let p1 = lanes(end.position());
    // Velocity tangents scaled by step
    let m0 = lanes(start.velocity() * step);
    let m1 = lanes(end.velocity() * step);

    let s2 = s * s;
    let s3 = s2 * s;
    let h00 = 2.0 * s3 - 3.0 * s2 + 1.0;
    let h10 = s3 - 2.0 * s2 + s;
    let h01 = -2.0 * s3 + 3.0 * s2;
    let h11 = s3 - s2;

    let position = p0 * f64x4::splat(h00) + m0 * f64x4::splat(h10) + p1 * f64x4::splat(h01) + m1 * f64x4::splat(h11);

    // Derivative of Hermite basis for velocity
    let dh00 = 6.0 * s2 - 6.0 * s;
    let dh10 = 3.0 * s2 - 4.0 * s + 1.0;
    let dh01 = -6.0 * s2 + 6.0 * s;
    let dh11 = 3.0 * s2 - 2.0 * s;

    let velocity = (p0 * f64x4::splat(dh00) + m0 * f64x4::splat(dh10) + p1 * f64x4::splat(dh01) + m1 * f64x4::splat(dh11))
        * f64x4::splat(1.0 / step);

    DegreesOfFreedom::new(from_lanes(position), from_lanes(velocity))
}
