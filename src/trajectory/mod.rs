//! Trajectory containers.
//!
//! - [`ContinuousTrajectory`]: a massive body's motion as contiguous
//!   Chebyshev segments, owned by the ephemeris.
//! - [`DiscreteTrajectory`]: caller-owned timed samples with forking
//!   branches, the target of flows.

mod chebyshev;
mod continuous;
mod discrete;

#[cfg(test)]
mod proptest_trajectory;

pub use chebyshev::{
    ChebyshevError, ChebyshevSeries, DIVISIONS, MAX_DEGREE, MIN_DEGREE, SAMPLES, VELOCITY_WEIGHT,
    newhall_approximation,
};
pub use continuous::{ContinuousTrajectory, ContinuousTrajectoryError, MAX_DEGREE_AGE};
pub use discrete::{BranchId, BranchMut, DiscreteTrajectory, DiscreteTrajectoryError, IntrinsicAcceleration};
