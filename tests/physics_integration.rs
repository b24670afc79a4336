//! Integration tests for the gravity model and the integrators.

mod common;

use approx::assert_relative_eq;
use bevy::math::DVec3;
use orrery::body::MassiveBody;
use orrery::physics::{
    AdaptiveStepInstance, AdaptiveStepParameters, FixedStepInstance, FixedStepIntegrator, FixedStepParameters,
    SystemState, compute_mutual_accelerations, compute_test_particle_acceleration,
};
use orrery::types::{AU_TO_METERS, GM_SUN, SECONDS_PER_DAY};
use particular::prelude::*;

/// Particle type for particular crate
#[derive(Clone, Copy)]
struct Body {
    position: [f64; 3],
    mu: f64,
}

impl Particle for Body {
    type Array = [f64; 3];

    fn position(&self) -> [f64; 3] {
        self.position
    }

    fn mu(&self) -> f64 {
        self.mu
    }
}

fn sun_only(_: f64, q: &[DVec3], a: &mut [DVec3]) {
    let sun = [MassiveBody::new("Sun", GM_SUN).unwrap()];
    for (a, &q) in a.iter_mut().zip(q) {
        *a = compute_test_particle_acceleration(&sun, &[DVec3::ZERO], q);
    }
}

fn single(dof: orrery::types::DegreesOfFreedom) -> SystemState {
    SystemState::new(0.0, vec![dof.position], vec![dof.velocity])
}

#[test]
fn test_mutual_accelerations_match_particular() {
    let bodies: Vec<MassiveBody> = (0..7)
        .map(|i| MassiveBody::new(format!("Body {i}"), GM_SUN * 10f64.powi(-(i as i32))).unwrap())
        .collect();
    let positions: Vec<DVec3> = (0..7)
        .map(|i| {
            let angle = i as f64 * 1.3;
            DVec3::new(angle.cos(), angle.sin(), 0.1 * i as f64) * (AU_TO_METERS * (1.0 + i as f64))
        })
        .collect();

    let mut ours = vec![DVec3::ZERO; bodies.len()];
    compute_mutual_accelerations(&bodies, &positions, &mut ours);

    let mut compute_method = sequential::BruteForceSIMD::<4>;
    let theirs: Vec<[f64; 3]> = bodies
        .iter()
        .zip(&positions)
        .map(|(b, q)| Body {
            position: q.to_array(),
            mu: b.gravitational_parameter(),
        })
        .accelerations(&mut compute_method)
        .collect();

    for (a, b) in ours.iter().zip(&theirs) {
        let b = DVec3::from_array(*b);
        assert_relative_eq!((*a - b).length() / b.length(), 0.0, epsilon = 1e-10);
    }
}

#[test]
fn test_earth_orbit_365_days() {
    let start = common::circular_orbit(1.0);
    let period = common::orbital_period(GM_SUN, AU_TO_METERS);
    assert_relative_eq!(period / SECONDS_PER_DAY, 365.25, epsilon = 0.5);

    // Step chosen to divide the period exactly.
    let mut instance = FixedStepInstance::new(
        FixedStepParameters::new(FixedStepIntegrator::Pefrl, period / 1000.0),
        single(start),
    );
    for _ in 0..1000 {
        instance.step(sun_only);
    }

    let distance = (instance.state().positions[0] - start.position).length();
    assert!(
        distance / AU_TO_METERS < 1e-6,
        "Earth should return to within 1e-6 AU after one orbit, got {} AU",
        distance / AU_TO_METERS
    );
    assert_relative_eq!(instance.time(), period, max_relative = 1e-15);
}

#[test]
fn test_retrograde_inclined_orbit_stable() {
    let r = AU_TO_METERS;
    let v = (GM_SUN / r).sqrt();
    let pos = DVec3::new(r, 0.0, 0.0);
    let vel = DVec3::new(0.0, -v * 0.6, v * 0.8);
    let initial_energy = common::orbital_energy(GM_SUN, pos, vel);
    let initial_h = common::angular_momentum(pos, vel);

    let mut instance = FixedStepInstance::new(
        FixedStepParameters::new(FixedStepIntegrator::Leapfrog, 3600.0),
        single(orrery::types::DegreesOfFreedom::new(pos, vel)),
    );
    instance.solve(10.0 * 365.25 * SECONDS_PER_DAY, sun_only, |_| {});

    let state = instance.state();
    let final_energy = common::orbital_energy(GM_SUN, state.positions[0], state.velocities[0]);
    let final_h = common::angular_momentum(state.positions[0], state.velocities[0]);
    assert!(((final_energy - initial_energy) / initial_energy).abs() < 1e-6);
    assert!((final_h - initial_h).length() / initial_h.length() < 1e-10);
}

#[test]
fn test_adaptive_highly_eccentric_orbit() {
    let e = 0.9;
    let start = common::elliptical_orbit(0.1, e);
    let a = 0.1 * AU_TO_METERS / (1.0 - e);
    let period = common::orbital_period(GM_SUN, a);
    let initial_energy = common::orbital_energy(GM_SUN, start.position, start.velocity);

    let mut instance = AdaptiveStepInstance::new(
        AdaptiveStepParameters {
            length_integration_tolerance: 1.0,
            speed_integration_tolerance: 1e-3,
            ..Default::default()
        },
        single(start),
    );
    let mut min_radius = f64::INFINITY;
    let mut max_radius: f64 = 0.0;
    let stats = instance
        .solve(2.0 * period, sun_only, |state| {
            let r = state.positions[0].length();
            min_radius = min_radius.min(r);
            max_radius = max_radius.max(r);
        })
        .unwrap();

    assert!(stats.accepted_steps > 100);
    assert_eq!(instance.state().time, 2.0 * period);
    let state = instance.state();
    let final_energy = common::orbital_energy(GM_SUN, state.positions[0], state.velocities[0]);
    assert!(((final_energy - initial_energy) / initial_energy).abs() < 1e-5);
    assert_relative_eq!(max_radius, a * (1.0 + e), max_relative = 1e-3);
    assert_relative_eq!(min_radius, a * (1.0 - e), max_relative = 1e-2);
}

#[test]
fn test_j2_nodal_regression() {
    let mu = 3.986_004_418e14;
    let radius = 6.378_137e6;
    let j2 = 1.082_63e-3;
    let earth = [MassiveBody::oblate("Earth", mu, j2, radius, DVec3::Z).unwrap()];

    let a = 7.0e6;
    let inclination = 45f64.to_radians();
    let v = (mu / a).sqrt();
    let start = orrery::types::DegreesOfFreedom::new(
        DVec3::new(a, 0.0, 0.0),
        DVec3::new(0.0, v * inclination.cos(), v * inclination.sin()),
    );

    let mut instance = AdaptiveStepInstance::new(
        AdaptiveStepParameters {
            length_integration_tolerance: 1e-3,
            speed_integration_tolerance: 1e-6,
            ..Default::default()
        },
        single(start),
    );
    let duration = SECONDS_PER_DAY;
    instance
        .solve(
            duration,
            |_, q, acc| {
                for (acc, &q) in acc.iter_mut().zip(q) {
                    *acc = compute_test_particle_acceleration(&earth, &[DVec3::ZERO], q);
                }
            },
            |_| {},
        )
        .unwrap();

    let node = |h: DVec3| h.x.atan2(-h.y);
    let state = instance.state();
    let drift = node(common::angular_momentum(state.positions[0], state.velocities[0]))
        - node(common::angular_momentum(start.position, start.velocity));

    // dΩ/dt = −3/2 n J2 (R/a)² cos i
    let n = (mu / (a * a * a)).sqrt();
    let expected = -1.5 * n * j2 * (radius / a).powi(2) * inclination.cos() * duration;
    assert!(drift < 0.0, "node should regress, drift = {drift}");
    assert_relative_eq!(drift, expected, max_relative = 0.1);
}
