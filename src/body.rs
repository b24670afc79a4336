//! Massive bodies and their gravity models.

use bevy::math::DVec3;

use crate::types::G;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum BodyError {
    #[error("invalid gravitational parameter for {name}: {value} (must be positive and finite)")]
    InvalidGravitationalParameter { name: String, value: f64 },

    #[error("invalid J2 for {name}: {value} (must be finite)")]
    InvalidJ2 { name: String, value: f64 },

    #[error("invalid reference radius for {name}: {value} (must be positive and finite)")]
    InvalidReferenceRadius { name: String, value: f64 },

    #[error("invalid polar axis for {name} (must be non-zero and finite)")]
    InvalidAxis { name: String },
}

/// Zonal J2 gravity model of an oblate body.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Oblateness {
    /// Second zonal harmonic coefficient (dimensionless).
    pub j2: f64,
    /// Radius the harmonic is normalised to, in meters.
    pub reference_radius: f64,
    /// Unit vector along the body's polar axis.
    pub axis: DVec3,
}

/// A body that contributes to the gravitational field.
///
/// We carry μ = GM rather than the mass so that G is not multiplied in
/// repeatedly.
#[derive(Clone, Debug, PartialEq)]
pub struct MassiveBody {
    name: String,
    gravitational_parameter: f64,
    oblateness: Option<Oblateness>,
}

impl MassiveBody {
    /// A spherical body with the given μ (m³/s²).
    pub fn new(name: impl Into<String>, gravitational_parameter: f64) -> Result<Self, BodyError> {
        let name = name.into();
        if !(gravitational_parameter.is_finite() && gravitational_parameter > 0.0) {
            return Err(BodyError::InvalidGravitationalParameter {
                name,
                value: gravitational_parameter,
            });
        }
        Ok(Self {
            name,
            gravitational_parameter,
            oblateness: None,
        })
    }

    /// A spherical body of the given mass (kg).
    pub fn from_mass(name: impl Into<String>, mass: f64) -> Result<Self, BodyError> {
        Self::new(name, G * mass)
    }

    /// An oblate body. `axis` need not be normalised.
    pub fn oblate(
        name: impl Into<String>,
        gravitational_parameter: f64,
        j2: f64,
        reference_radius: f64,
        axis: DVec3,
    ) -> Result<Self, BodyError> {
        let body = Self::new(name, gravitational_parameter)?;
        body.with_oblateness(j2, reference_radius, axis)
    }

    fn with_oblateness(mut self, j2: f64, reference_radius: f64, axis: DVec3) -> Result<Self, BodyError> {
        if !j2.is_finite() {
            return Err(BodyError::InvalidJ2 {
                name: self.name,
                value: j2,
            });
        }
        if !(reference_radius.is_finite() && reference_radius > 0.0) {
            return Err(BodyError::InvalidReferenceRadius {
                name: self.name,
                value: reference_radius,
            });
        }
        let axis = axis.try_normalize().ok_or_else(|| BodyError::InvalidAxis {
            name: self.name.clone(),
        })?;
        self.oblateness = Some(Oblateness {
            j2,
            reference_radius,
            axis,
        });
        Ok(self)
    }

    /// Rebuild a body from stored parts without renormalising the axis.
    pub(crate) fn from_parts(
        name: String,
        gravitational_parameter: f64,
        oblateness: Option<Oblateness>,
    ) -> Result<Self, BodyError> {
        let body = Self::new(name, gravitational_parameter)?;
        match oblateness {
            None => Ok(body),
            Some(oblateness) => {
                let mut body = body.with_oblateness(oblateness.j2, oblateness.reference_radius, oblateness.axis)?;
                body.oblateness = Some(oblateness);
                Ok(body)
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// μ = GM in m³/s².
    pub fn gravitational_parameter(&self) -> f64 {
        self.gravitational_parameter
    }

    /// Mass in kg, derived from μ.
    pub fn mass(&self) -> f64 {
        self.gravitational_parameter / G
    }

    pub fn oblateness(&self) -> Option<&Oblateness> {
        self.oblateness.as_ref()
    }

    pub fn is_oblate(&self) -> bool {
        self.oblateness.is_some()
    }

    /// The same body with its oblateness dropped.
    pub fn spherical(&self) -> Self {
        Self {
            name: self.name.clone(),
            gravitational_parameter: self.gravitational_parameter,
            oblateness: None,
        }
    }
}
