//! Property-based tests for the continuous trajectory store.
//!
//! These tests verify that fitted segments meet their tolerance and stay
//! consistent with the samples they were built from, across a range of
//! orbits, steps and tolerances.

use bevy::math::DVec3;
use proptest::prelude::*;

use super::{ContinuousTrajectory, ContinuousTrajectoryError, DIVISIONS};
use crate::types::{AU_TO_METERS, DegreesOfFreedom, GM_SUN, SECONDS_PER_DAY};

/// Keplerian circular motion in an inclined plane.
fn circular(radius: f64, inclination: f64, t: f64) -> DegreesOfFreedom {
    let omega = (GM_SUN / radius.powi(3)).sqrt();
    let (s, c) = (omega * t).sin_cos();
    let (si, ci) = inclination.sin_cos();
    DegreesOfFreedom::new(
        DVec3::new(c, s * ci, s * si) * radius,
        DVec3::new(-s, c * ci, c * si) * (radius * omega),
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Every committed segment's error estimate is within the adjusted
    /// tolerance, and the segments tile the sampled interval.
    #[test]
    fn prop_segments_meet_adjusted_tolerance(
        radius_au in 0.3f64..30.0,
        inclination in 0.0f64..3.0,
        step_hours in 1.0f64..240.0,
        log_tolerance in -3.0f64..3.0,
        segments in 1usize..12,
    ) {
        let step = step_hours * 3600.0;
        let mut trajectory = ContinuousTrajectory::new(step, 10f64.powf(log_tolerance)).unwrap();
        for i in 0..=segments * DIVISIONS {
            let t = i as f64 * step;
            trajectory.append(t, circular(radius_au * AU_TO_METERS, inclination, t)).unwrap();
        }

        prop_assert_eq!(trajectory.segment_count(), segments);
        prop_assert_eq!(trajectory.t_min(), 0.0);
        prop_assert_eq!(trajectory.t_max(), (segments * DIVISIONS) as f64 * step);
        prop_assert!(trajectory.adjusted_tolerance() >= trajectory.tolerance());
        for segment in trajectory.segments() {
            prop_assert!(segment.last_coefficient_norm() <= trajectory.adjusted_tolerance());
        }
        for pair in trajectory.segments().windows(2) {
            prop_assert_eq!(pair[0].t_max(), pair[1].t_min());
        }
    }

    /// Segment end points reproduce the samples they were fitted to.
    #[test]
    fn prop_segment_ends_match_samples(
        radius_au in 0.5f64..10.0,
        step_hours in 1.0f64..48.0,
    ) {
        let step = step_hours * 3600.0;
        let radius = radius_au * AU_TO_METERS;
        let mut trajectory = ContinuousTrajectory::new(step, 1.0).unwrap();
        for i in 0..=4 * DIVISIONS {
            let t = i as f64 * step;
            trajectory.append(t, circular(radius, 0.4, t)).unwrap();
        }
        for k in 0..=4 {
            let t = (k * DIVISIONS) as f64 * step;
            let expected = circular(radius, 0.4, t).position;
            let error = (trajectory.evaluate_position(t).unwrap() - expected).length();
            prop_assert!(error < 1e-10 * radius, "error {:e} m at t = {}", error, t);
        }
    }

    /// Evaluation is defined exactly on [t_min, t_max].
    #[test]
    fn prop_evaluation_range(
        fraction in -0.5f64..1.5,
    ) {
        let step = SECONDS_PER_DAY;
        let mut trajectory = ContinuousTrajectory::new(step, 1.0).unwrap();
        for i in 0..=2 * DIVISIONS {
            let t = i as f64 * step;
            trajectory.append(t, circular(AU_TO_METERS, 0.0, t)).unwrap();
        }
        let t = trajectory.t_min() + fraction * (trajectory.t_max() - trajectory.t_min());
        let result = trajectory.evaluate_position(t);
        if (0.0..=1.0).contains(&fraction) {
            prop_assert!(result.is_ok());
        } else {
            let is_out_of_range = matches!(result, Err(ContinuousTrajectoryError::OutOfRange { .. }));
            prop_assert!(is_out_of_range);
        }
    }
}
