//! Property-based tests for the ephemeris using proptest.
//!
//! These tests verify that prolongation and evaluation keep their
//! guarantees across a range of systems, steps and tolerances.

use bevy::math::DVec3;
use proptest::prelude::*;

use super::Ephemeris;
use crate::body::MassiveBody;
use crate::physics::{
    FixedStepInstance, FixedStepIntegrator, FixedStepParameters, SystemState, compute_mutual_accelerations,
};
use crate::types::{AU_TO_METERS, DegreesOfFreedom, GM_SUN, SECONDS_PER_DAY};

/// A star with a planet on a circular relative orbit, barycentre at rest.
fn star_and_planet(mass_ratio: f64, distance_au: f64) -> (Vec<MassiveBody>, Vec<DegreesOfFreedom>) {
    let mu_planet = GM_SUN * mass_ratio;
    let mu = GM_SUN + mu_planet;
    let r = distance_au * AU_TO_METERS;
    let v = (mu / r).sqrt();
    let share = mu_planet / mu;
    let bodies = vec![
        MassiveBody::new("Star", GM_SUN).unwrap(),
        MassiveBody::new("Planet", mu_planet).unwrap(),
    ];
    let states = vec![
        DegreesOfFreedom::new(DVec3::new(-r * share, 0.0, 0.0), DVec3::new(0.0, -v * share, 0.0)),
        DegreesOfFreedom::new(
            DVec3::new(r * (1.0 - share), 0.0, 0.0),
            DVec3::new(0.0, v * (1.0 - share), 0.0),
        ),
    ];
    (bodies, states)
}

fn integrator() -> impl Strategy<Value = FixedStepIntegrator> {
    prop_oneof![Just(FixedStepIntegrator::Leapfrog), Just(FixedStepIntegrator::Pefrl)]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// `t_max` never decreases and always covers the last requested time.
    #[test]
    fn prop_prolong_is_monotonic(
        targets in prop::collection::vec(0.0f64..400.0, 1..6),
        step_hours in 6.0f64..48.0,
    ) {
        let (bodies, states) = star_and_planet(1e-3, 1.0);
        let mut ephemeris = Ephemeris::new(
            bodies,
            states,
            0.0,
            10.0,
            FixedStepParameters::new(FixedStepIntegrator::Pefrl, step_hours * 3600.0),
        ).unwrap();

        let mut previous = ephemeris.t_max();
        for days in targets {
            let t = days * SECONDS_PER_DAY;
            ephemeris.prolong(t).unwrap();
            prop_assert!(ephemeris.t_max() >= t);
            prop_assert!(ephemeris.t_max() >= previous);
            previous = ephemeris.t_max();
        }
        prop_assert_eq!(ephemeris.t_min(), 0.0);
    }

    /// The continuous trajectories agree with the raw integration samples.
    #[test]
    fn prop_evaluation_matches_samples(
        mass_ratio in 1e-6f64..1e-2,
        distance_au in 0.5f64..5.0,
        integrator in integrator(),
        log_tolerance in -1.0f64..2.0,
    ) {
        let (bodies, states) = star_and_planet(mass_ratio, distance_au);
        let step = SECONDS_PER_DAY;
        let tolerance = 10f64.powf(log_tolerance);
        let parameters = FixedStepParameters::new(integrator, step);
        let mut ephemeris = Ephemeris::new(bodies.clone(), states.clone(), 0.0, tolerance, parameters).unwrap();
        ephemeris.prolong(64.0 * step).unwrap();

        // Replay the same integration by hand.
        let mut instance = FixedStepInstance::new(
            parameters,
            SystemState::new(
                0.0,
                states.iter().map(|s| s.position).collect(),
                states.iter().map(|s| s.velocity).collect(),
            ),
        );
        for _ in 0..64 {
            instance.step(|_, q, a| compute_mutual_accelerations(&bodies, q, a));
            let state = instance.state();
            for (i, trajectory) in ephemeris.trajectories().iter().enumerate() {
                let error = (trajectory.evaluate_position(state.time).unwrap() - state.positions[i]).length();
                prop_assert!(
                    error <= 10.0 * trajectory.adjusted_tolerance(),
                    "body {} at t = {}: error {} m, tolerance {} m",
                    i, state.time, error, trajectory.adjusted_tolerance()
                );
            }
        }
    }

    /// Identical inputs give bit-identical ephemerides.
    #[test]
    fn prop_prolong_is_deterministic(
        mass_ratio in 1e-6f64..1e-2,
        days in 1.0f64..200.0,
        integrator in integrator(),
    ) {
        let (bodies, states) = star_and_planet(mass_ratio, 1.0);
        let parameters = FixedStepParameters::new(integrator, SECONDS_PER_DAY / 2.0);
        let mut a = Ephemeris::new(bodies.clone(), states.clone(), 0.0, 1.0, parameters).unwrap();
        let mut b = Ephemeris::new(bodies, states, 0.0, 1.0, parameters).unwrap();
        a.prolong(days * SECONDS_PER_DAY).unwrap();
        b.prolong(days * SECONDS_PER_DAY).unwrap();
        prop_assert_eq!(a, b);
    }
}
