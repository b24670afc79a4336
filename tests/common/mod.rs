//! Common test utilities for integration tests.

#![allow(dead_code)]

use bevy::math::DVec3;
use orrery::body::MassiveBody;
use orrery::physics::{FixedStepIntegrator, FixedStepParameters};
use orrery::trajectory::{BranchId, DiscreteTrajectory};
use orrery::types::{AU_TO_METERS, DegreesOfFreedom, GM_SUN};

/// Create a circular orbit state at the given distance from the Sun.
pub fn circular_orbit(distance_au: f64) -> DegreesOfFreedom {
    let r = distance_au * AU_TO_METERS;
    let v = (GM_SUN / r).sqrt();
    DegreesOfFreedom::new(DVec3::new(r, 0.0, 0.0), DVec3::new(0.0, v, 0.0))
}

/// Create an elliptical orbit state at perihelion.
pub fn elliptical_orbit(perihelion_au: f64, eccentricity: f64) -> DegreesOfFreedom {
    let r_p = perihelion_au * AU_TO_METERS;
    let a = r_p / (1.0 - eccentricity);
    let v = (GM_SUN * (2.0 / r_p - 1.0 / a)).sqrt();
    DegreesOfFreedom::new(DVec3::new(r_p, 0.0, 0.0), DVec3::new(0.0, v, 0.0))
}

/// Specific orbital energy about a body of parameter `mu`.
pub fn orbital_energy(mu: f64, pos: DVec3, vel: DVec3) -> f64 {
    0.5 * vel.length_squared() - mu / pos.length()
}

/// Specific angular momentum vector.
pub fn angular_momentum(pos: DVec3, vel: DVec3) -> DVec3 {
    pos.cross(vel)
}

/// Orbital period for a given semi-major axis and μ.
pub fn orbital_period(mu: f64, semi_major_axis: f64) -> f64 {
    std::f64::consts::TAU * (semi_major_axis.powi(3) / mu).sqrt()
}

/// Two bodies of parameters `mu` and `mass_ratio · mu` on a mutual orbit of
/// semi-major axis `a` and eccentricity `e`, starting at periapsis, with the
/// barycentre at rest at the origin.
pub fn binary(mu: f64, mass_ratio: f64, a: f64, e: f64) -> (Vec<MassiveBody>, Vec<DegreesOfFreedom>) {
    let mu_secondary = mu * mass_ratio;
    let total = mu + mu_secondary;
    let r_p = a * (1.0 - e);
    let v_p = (total * (2.0 / r_p - 1.0 / a)).sqrt();
    let share = mu_secondary / total;
    let relative = DegreesOfFreedom::new(DVec3::new(r_p, 0.0, 0.0), DVec3::new(0.0, v_p, 0.0));
    let bodies = vec![
        MassiveBody::new("Primary", mu).unwrap(),
        MassiveBody::new("Secondary", mu_secondary).unwrap(),
    ];
    let states = vec![
        DegreesOfFreedom::new(-relative.position * share, -relative.velocity * share),
        DegreesOfFreedom::new(relative.position * (1.0 - share), relative.velocity * (1.0 - share)),
    ];
    (bodies, states)
}

pub fn pefrl(step: f64) -> FixedStepParameters {
    FixedStepParameters::new(FixedStepIntegrator::Pefrl, step)
}

/// A discrete trajectory holding a single sample.
pub fn probe(time: f64, dof: DegreesOfFreedom) -> DiscreteTrajectory {
    let mut trajectory = DiscreteTrajectory::new();
    trajectory.append(BranchId::ROOT, time, dof).unwrap();
    trajectory
}

/// Last sample of the root branch.
pub fn last(trajectory: &DiscreteTrajectory) -> orrery::types::TimedDegreesOfFreedom {
    *trajectory.last(BranchId::ROOT).unwrap().unwrap()
}
