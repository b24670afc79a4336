//! Property-based tests for the dynamical law and the integrators.
//!
//! These tests verify physical invariants across a wide range of orbital parameters.

use bevy::math::DVec3;
use proptest::prelude::*;

use super::{
    AdaptiveStepInstance, AdaptiveStepParameters, FixedStepInstance, FixedStepIntegrator,
    FixedStepParameters, SystemState, compute_mutual_accelerations,
};
use crate::body::MassiveBody;
use crate::test_utils::{assertions, fixtures};
use crate::types::{AU_TO_METERS, GM_SUN};

fn sun_rhs(_t: f64, q: &[DVec3], a: &mut [DVec3]) {
    for (qi, ai) in q.iter().zip(a.iter_mut()) {
        let r = qi.length();
        *ai = -GM_SUN / (r * r * r) * *qi;
    }
}

fn single(perihelion_au: f64, eccentricity: f64) -> SystemState {
    let dof = fixtures::elliptical_orbit(perihelion_au, eccentricity);
    SystemState::new(0.0, vec![dof.position], vec![dof.velocity])
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// PEFRL keeps the specific orbital energy E = v²/2 - GM/r within a
    /// tight band over one period.
    #[test]
    fn prop_pefrl_energy_conservation_one_orbit(
        distance_au in 0.5f64..10.0,
        eccentricity in 0.0f64..0.8,
    ) {
        let state = single(distance_au, eccentricity);
        let initial_energy = assertions::orbital_energy(state.positions[0], state.velocities[0]);

        let a = distance_au * AU_TO_METERS / (1.0 - eccentricity);
        let period = assertions::orbital_period(a);
        let parameters = FixedStepParameters::new(FixedStepIntegrator::Pefrl, period / 2000.0);
        let mut instance = FixedStepInstance::new(parameters, state);
        instance.solve(period, sun_rhs, |_| {});

        let s = instance.state();
        let final_energy = assertions::orbital_energy(s.positions[0], s.velocities[0]);
        let drift = ((final_energy - initial_energy) / initial_energy).abs();
        prop_assert!(
            drift < 1e-3,
            "Energy drift {:.4e} (e={}, a={} AU)",
            drift, eccentricity, a / AU_TO_METERS
        );
    }

    /// For a central force every kick is parallel to r and every drift is
    /// parallel to v, so a splitting scheme conserves r × v to roundoff.
    #[test]
    fn prop_leapfrog_angular_momentum_conservation(
        distance_au in 0.5f64..10.0,
        eccentricity in 0.0f64..0.8,
    ) {
        let state = single(distance_au, eccentricity);
        let initial_l = assertions::angular_momentum(state.positions[0], state.velocities[0]);

        let a = distance_au * AU_TO_METERS / (1.0 - eccentricity);
        let period = assertions::orbital_period(a);
        let parameters = FixedStepParameters::new(FixedStepIntegrator::Leapfrog, period / 5000.0);
        let mut instance = FixedStepInstance::new(parameters, state);
        instance.solve(period, sun_rhs, |_| {});

        let s = instance.state();
        let final_l = assertions::angular_momentum(s.positions[0], s.velocities[0]);
        let drift = ((final_l - initial_l) / initial_l).abs();
        prop_assert!(drift < 1e-10, "Angular momentum drift {:.4e}", drift);
    }

    /// The adaptive integrator brings a bound orbit back to perihelion after
    /// one period.
    #[test]
    fn prop_adaptive_orbit_closes(
        distance_au in 0.5f64..5.0,
        eccentricity in 0.0f64..0.8,
    ) {
        let state = single(distance_au, eccentricity);
        let start = state.positions[0];
        let a = distance_au * AU_TO_METERS / (1.0 - eccentricity);
        let period = assertions::orbital_period(a);

        let mut instance = AdaptiveStepInstance::new(AdaptiveStepParameters::default(), state);
        let result = instance.solve(period, sun_rhs, |_| {});
        prop_assert!(result.is_ok(), "{:?}", result);

        let closure = (instance.state().positions[0] - start).length() / start.length();
        prop_assert!(closure < 1e-4, "Orbit failed to close: {:.4e}", closure);
    }

    /// Σ μᵢ aᵢ vanishes for any configuration of distinct bodies.
    #[test]
    fn prop_mutual_accelerations_balance(
        coords in prop::collection::vec(-1.0e11f64..1.0e11, 12),
        mus in prop::collection::vec(1.0e15f64..1.0e20, 4),
        j2 in 0.0f64..1.0e-2,
    ) {
        let bodies = vec![
            MassiveBody::new("A", mus[0]).unwrap(),
            MassiveBody::new("B", mus[1]).unwrap(),
            MassiveBody::oblate("C", mus[2], j2, 6.0e7, DVec3::new(0.3, -0.2, 1.0)).unwrap(),
            MassiveBody::new("D", mus[3]).unwrap(),
        ];
        let positions: Vec<DVec3> = coords
            .chunks(3)
            .enumerate()
            .map(|(i, c)| DVec3::new(c[0], c[1], c[2]) + DVec3::X * (i as f64 * 3.0e11))
            .collect();
        let mut accelerations = vec![DVec3::ZERO; 4];
        compute_mutual_accelerations(&bodies, &positions, &mut accelerations);

        let mut total = DVec3::ZERO;
        let mut scale: f64 = 0.0;
        for (body, a) in bodies.iter().zip(&accelerations) {
            total += *a * body.gravitational_parameter();
            scale = scale.max((*a * body.gravitational_parameter()).length());
        }
        prop_assert!(total.length() <= scale * 1e-12, "Net force {:?} (scale {:e})", total, scale);
    }

    /// A hyperbolic flyby stays unbound and keeps its energy.
    #[test]
    fn prop_escape_trajectory_stays_unbound(
        distance_au in 0.2f64..20.0,
        days in 10.0f64..1000.0,
    ) {
        let dof = fixtures::escape_trajectory(distance_au);
        let initial_energy = assertions::orbital_energy(dof.position, dof.velocity);
        let parameters = AdaptiveStepParameters {
            speed_integration_tolerance: 1e-3,
            ..Default::default()
        };
        let mut instance = AdaptiveStepInstance::new(
            parameters,
            SystemState::new(0.0, vec![dof.position], vec![dof.velocity]),
        );
        let result = instance.solve(days * 86400.0, sun_rhs, |_| {});
        prop_assert!(result.is_ok(), "{:?}", result);

        let s = instance.state();
        prop_assert!(!assertions::is_bound(s.positions[0], s.velocities[0]));
        prop_assert!(s.positions[0].length() > dof.position.length());
        let final_energy = assertions::orbital_energy(s.positions[0], s.velocities[0]);
        prop_assert!(((final_energy - initial_energy) / initial_energy).abs() < 1e-5);
    }
}
