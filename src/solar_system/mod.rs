//! Named sets of massive bodies with initial states, and the ephemerides
//! built from them.
//!
//! Coordinate frame:
//! - Ecliptic and equinox of J2000 for the preset, barycentre at rest at the
//!   origin. Times are seconds since the system's epoch.

mod data;
mod kepler;

#[cfg(test)]
mod proptest_solar_system;

pub use kepler::KeplerOrbit;

use bevy::log::info;

use crate::body::{BodyError, MassiveBody};
use crate::ephemeris::{Ephemeris, EphemerisError};
use crate::physics::FixedStepParameters;
use crate::types::{DegreesOfFreedom, SECONDS_PER_JULIAN_YEAR};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SolarSystemError {
    #[error("duplicate body name: {0}")]
    DuplicateBody(String),

    #[error("no body named {0}")]
    UnknownBody(String),

    #[error("orbit of {name} is not elliptic")]
    InvalidOrbit { name: String },

    #[error("invalid mean radius for {name}: {value} (must be positive and finite)")]
    InvalidMeanRadius { name: String, value: f64 },

    #[error("non-finite initial state for {name}")]
    NonFiniteState { name: String },

    #[error("invalid body: {0}")]
    Body(#[from] BodyError),
}

#[derive(Clone, Debug, PartialEq)]
struct Entry {
    body: MassiveBody,
    mean_radius: f64,
    initial_state: DegreesOfFreedom,
}

/// An ordered set of named massive bodies with their states at an epoch.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SolarSystem {
    /// Seconds since J2000
    epoch: f64,
    entries: Vec<Entry>,
}

impl SolarSystem {
    pub fn new(epoch: f64) -> Self {
        Self {
            epoch,
            entries: Vec::new(),
        }
    }

    /// The Sun and the eight planets at J2000, from approximate mean
    /// elements, with the barycentre moved to rest at the origin.
    pub fn sun_and_planets() -> Result<Self, SolarSystemError> {
        let mut system = Self::new(0.0);
        for data in data::sun_and_planets() {
            let body = match data.zonal {
                Some(zonal) => MassiveBody::oblate(
                    data.name,
                    data.gravitational_parameter,
                    zonal.j2,
                    zonal.reference_radius,
                    zonal.axis(),
                )?,
                None => MassiveBody::new(data.name, data.gravitational_parameter)?,
            };
            match data.orbit {
                Some(orbit) => system.add_orbiting_body(body, data.mean_radius, "Sun", &orbit)?,
                None => system.add_body(body, data.mean_radius, DegreesOfFreedom::default())?,
            }
        }
        system.move_barycentre_to_origin();

        info!(
            "Solar system preset loaded: {} bodies at J2000 + {} yr",
            system.entries.len(),
            system.epoch / SECONDS_PER_JULIAN_YEAR
        );
        Ok(system)
    }

    pub fn epoch(&self) -> f64 {
        self.epoch
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add a body with its state at the epoch.
    pub fn add_body(
        &mut self,
        body: MassiveBody,
        mean_radius: f64,
        initial_state: DegreesOfFreedom,
    ) -> Result<(), SolarSystemError> {
        if self.index(body.name()).is_some() {
            return Err(SolarSystemError::DuplicateBody(body.name().to_string()));
        }
        if !(mean_radius.is_finite() && mean_radius > 0.0) {
            return Err(SolarSystemError::InvalidMeanRadius {
                name: body.name().to_string(),
                value: mean_radius,
            });
        }
        if !initial_state.is_finite() {
            return Err(SolarSystemError::NonFiniteState {
                name: body.name().to_string(),
            });
        }
        self.entries.push(Entry {
            body,
            mean_radius,
            initial_state,
        });
        Ok(())
    }

    /// Add a body on a Keplerian orbit about `parent`, which must already be
    /// in the system. The two-body μ is the sum of both bodies'.
    pub fn add_orbiting_body(
        &mut self,
        body: MassiveBody,
        mean_radius: f64,
        parent: &str,
        orbit: &KeplerOrbit,
    ) -> Result<(), SolarSystemError> {
        if !orbit.is_elliptic() {
            return Err(SolarSystemError::InvalidOrbit {
                name: body.name().to_string(),
            });
        }
        let parent = self.entry(parent)?;
        let mu = parent.body.gravitational_parameter() + body.gravitational_parameter();
        let relative = orbit.degrees_of_freedom(mu, 0.0);
        let state = DegreesOfFreedom::new(
            parent.initial_state.position + relative.position,
            parent.initial_state.velocity + relative.velocity,
        );
        self.add_body(body, mean_radius, state)
    }

    /// Names in body order.
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.body.name()).collect()
    }

    /// Position of `name` in body order, which is also its index in the
    /// ephemeris built by [`make_ephemeris`](Self::make_ephemeris).
    pub fn index(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.body.name() == name)
    }

    fn entry(&self, name: &str) -> Result<&Entry, SolarSystemError> {
        self.entries
            .iter()
            .find(|e| e.body.name() == name)
            .ok_or_else(|| SolarSystemError::UnknownBody(name.to_string()))
    }

    fn entry_mut(&mut self, name: &str) -> Result<&mut Entry, SolarSystemError> {
        self.entries
            .iter_mut()
            .find(|e| e.body.name() == name)
            .ok_or_else(|| SolarSystemError::UnknownBody(name.to_string()))
    }

    pub fn body(&self, name: &str) -> Option<&MassiveBody> {
        self.entry(name).ok().map(|e| &e.body)
    }

    pub fn initial_state(&self, name: &str) -> Option<DegreesOfFreedom> {
        self.entry(name).ok().map(|e| e.initial_state)
    }

    /// μ in m³/s².
    pub fn gravitational_parameter(&self, name: &str) -> Option<f64> {
        self.body(name).map(MassiveBody::gravitational_parameter)
    }

    /// Mean radius in meters.
    pub fn mean_radius(&self, name: &str) -> Option<f64> {
        self.entry(name).ok().map(|e| e.mean_radius)
    }

    /// Replace the body's gravity model by a point mass.
    pub fn remove_oblateness(&mut self, name: &str) -> Result<(), SolarSystemError> {
        let entry = self.entry_mut(name)?;
        entry.body = entry.body.spherical();
        Ok(())
    }

    /// Drop a body from the system.
    pub fn remove_massive_body(&mut self, name: &str) -> Result<(), SolarSystemError> {
        let index = self
            .index(name)
            .ok_or_else(|| SolarSystemError::UnknownBody(name.to_string()))?;
        self.entries.remove(index);
        Ok(())
    }

    /// μ-weighted mean state of all bodies.
    pub fn barycentre(&self) -> DegreesOfFreedom {
        let total: f64 = self.entries.iter().map(|e| e.body.gravitational_parameter()).sum();
        if total == 0.0 {
            return DegreesOfFreedom::default();
        }
        let mut barycentre = DegreesOfFreedom::default();
        for e in &self.entries {
            let weight = e.body.gravitational_parameter() / total;
            barycentre.position += e.initial_state.position * weight;
            barycentre.velocity += e.initial_state.velocity * weight;
        }
        barycentre
    }

    /// Shift every state so the barycentre is at rest at the origin.
    pub fn move_barycentre_to_origin(&mut self) {
        let barycentre = self.barycentre();
        for e in &mut self.entries {
            e.initial_state = e.initial_state - barycentre;
        }
    }

    /// An ephemeris of all bodies starting at the epoch.
    pub fn make_ephemeris(
        &self,
        fitting_tolerance: f64,
        parameters: FixedStepParameters,
    ) -> Result<Ephemeris, EphemerisError> {
        Ephemeris::new(
            self.entries.iter().map(|e| e.body.clone()).collect(),
            self.entries.iter().map(|e| e.initial_state).collect(),
            self.epoch,
            fitting_tolerance,
            parameters,
        )
    }
}
