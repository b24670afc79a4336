//! Property-based tests for Keplerian elements using proptest.

use proptest::prelude::*;
use std::f64::consts::TAU;

use super::KeplerOrbit;
use crate::types::{AU_TO_METERS, GM_SUN, SECONDS_PER_DAY};

fn orbit() -> impl Strategy<Value = KeplerOrbit> {
    (
        0.3f64..50.0,
        0.0f64..0.9,
        0.0f64..180.0,
        0.0f64..360.0,
        0.0f64..360.0,
        0.0f64..360.0,
    )
        .prop_map(|(a_au, e, i, w, o, m)| KeplerOrbit::from_elements(a_au * AU_TO_METERS, e, i, w, o, m))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// The solver satisfies M = E - e*sin(E) for all valid eccentricities.
    #[test]
    fn prop_kepler_solver_convergence(
        mean_anomaly_normalized in 0.0f64..1.0,
        eccentricity in 0.0f64..0.95,
    ) {
        let mean_anomaly = mean_anomaly_normalized * TAU;
        let orbit = KeplerOrbit::from_elements(AU_TO_METERS, eccentricity, 0.0, 0.0, 0.0, 0.0);
        let e_anom = orbit.solve_eccentric_anomaly(mean_anomaly);
        let error = (e_anom - eccentricity * e_anom.sin() - mean_anomaly.rem_euclid(TAU)).abs();
        prop_assert!(error < 1e-8, "M={}, e={}, error={}", mean_anomaly, eccentricity, error);
    }

    /// Energy and angular momentum of the state match the elements.
    #[test]
    fn prop_state_matches_elements(
        orbit in orbit(),
        days in 0.0f64..10000.0,
    ) {
        let dof = orbit.degrees_of_freedom(GM_SUN, days * SECONDS_PER_DAY);
        let a = orbit.semi_major_axis;
        let e = orbit.eccentricity;

        let energy = 0.5 * dof.velocity.length_squared() - GM_SUN / dof.position.length();
        let expected_energy = -GM_SUN / (2.0 * a);
        prop_assert!(((energy - expected_energy) / expected_energy).abs() < 1e-9);

        let h = dof.position.cross(dof.velocity);
        let expected_h = (GM_SUN * a * (1.0 - e * e)).sqrt();
        prop_assert!(((h.length() - expected_h) / expected_h).abs() < 1e-9);
        prop_assert!((h.normalize().z - orbit.inclination.cos()).abs() < 1e-9);
    }

    /// The state repeats after one period.
    #[test]
    fn prop_state_periodic(
        orbit in orbit(),
        start_days in 0.0f64..365.0,
    ) {
        let start = start_days * SECONDS_PER_DAY;
        let period = orbit.period(GM_SUN);
        let a = orbit.degrees_of_freedom(GM_SUN, start);
        let b = orbit.degrees_of_freedom(GM_SUN, start + period);
        let error = (b.position - a.position).length() / orbit.semi_major_axis;
        prop_assert!(error < 1e-8, "relative position error {} after one period", error);
    }
}
