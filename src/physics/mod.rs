//! Dynamical law and numerical integration.
//!
//! `gravity` evaluates accelerations for a given set of massive bodies and
//! positions; `integrator` advances second-order systems with either a
//! fixed-step symplectic scheme or an adaptive embedded RKN pair. Neither
//! layer owns trajectories: the ephemeris wires them together.

mod gravity;
mod integrator;

#[cfg(test)]
mod proptest_physics;

pub use gravity::{compute_mutual_accelerations, compute_test_particle_acceleration, j2_acceleration};
pub use integrator::{
    AdaptiveStepInstance, AdaptiveStepIntegrator, AdaptiveStepParameters, AdaptiveStepStats,
    FixedStepInstance, FixedStepIntegrator, FixedStepParameters, IntegrationError, SystemState,
};
