//! Orrery - Gravitational Ephemeris Engine
//!
//! Integrates massive bodies under mutual Newtonian gravity (with J2 for
//! oblate bodies), stores their motion as piecewise Chebyshev series, and
//! flows other trajectories through the resulting field.
//!
//! ```no_run
//! use orrery::physics::FixedStepParameters;
//! use orrery::solar_system::SolarSystem;
//!
//! let system = SolarSystem::sun_and_planets()?;
//! let mut ephemeris = system.make_ephemeris(1.0, FixedStepParameters::default())?;
//! ephemeris.prolong(86400.0 * 365.25)?;
//! let earth = system.index("Earth").unwrap_or_default();
//! let position = ephemeris.trajectory(earth).map(|t| t.evaluate_position(1.0e7));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod body;
pub mod ephemeris;
pub mod physics;
pub mod snapshot;
pub mod solar_system;
pub mod trajectory;
pub mod types;

#[cfg(test)]
pub mod test_utils;
