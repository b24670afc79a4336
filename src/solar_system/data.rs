//! Physical data and approximate J2000 elements for the Sun and planets.
//! Source: JPL approximate planetary elements (valid 1800–2050) and IAU
//! rotational elements; heliocentric, mean ecliptic and equinox of J2000.

use bevy::math::DVec3;

use super::kepler::KeplerOrbit;
use crate::types::{AU_TO_METERS, DEG_TO_RAD};

/// Mean obliquity of the ecliptic at J2000 (degrees).
const OBLIQUITY_J2000_DEG: f64 = 23.439_291_1;

/// J2 gravity model of a body, with its pole given in equatorial
/// coordinates as the IAU publishes it.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ZonalData {
    pub j2: f64,
    /// meters
    pub reference_radius: f64,
    pub pole_right_ascension_deg: f64,
    pub pole_declination_deg: f64,
}

impl ZonalData {
    /// Polar axis as a unit vector in ecliptic J2000 coordinates.
    pub fn axis(&self) -> DVec3 {
        let (sin_ra, cos_ra) = (self.pole_right_ascension_deg * DEG_TO_RAD).sin_cos();
        let (sin_dec, cos_dec) = (self.pole_declination_deg * DEG_TO_RAD).sin_cos();
        let equatorial = DVec3::new(cos_dec * cos_ra, cos_dec * sin_ra, sin_dec);

        let (sin_eps, cos_eps) = (OBLIQUITY_J2000_DEG * DEG_TO_RAD).sin_cos();
        DVec3::new(
            equatorial.x,
            cos_eps * equatorial.y + sin_eps * equatorial.z,
            -sin_eps * equatorial.y + cos_eps * equatorial.z,
        )
    }
}

/// Static data for one body of the preset.
#[derive(Clone, Debug)]
pub(crate) struct BodyData {
    pub name: &'static str,
    /// m³/s²
    pub gravitational_parameter: f64,
    /// meters
    pub mean_radius: f64,
    pub zonal: Option<ZonalData>,
    /// Heliocentric orbit; `None` for the Sun.
    pub orbit: Option<KeplerOrbit>,
}

/// Elements as tabulated: a (AU), e, I, L, ϖ, Ω (degrees), converted to
/// argument of periapsis ω = ϖ − Ω and mean anomaly M = L − ϖ.
fn orbit(a_au: f64, e: f64, i: f64, mean_longitude: f64, longitude_of_periapsis: f64, node: f64) -> KeplerOrbit {
    KeplerOrbit::from_elements(
        a_au * AU_TO_METERS,
        e,
        i,
        longitude_of_periapsis - node,
        node,
        mean_longitude - longitude_of_periapsis,
    )
}

/// The Sun followed by the eight planets, in order of distance.
pub(crate) fn sun_and_planets() -> Vec<BodyData> {
    vec![
        BodyData {
            name: "Sun",
            gravitational_parameter: 1.327_124_400_18e20,
            mean_radius: 6.957e8,
            zonal: Some(ZonalData {
                j2: 2.2e-7,
                reference_radius: 6.957e8,
                pole_right_ascension_deg: 286.13,
                pole_declination_deg: 63.87,
            }),
            orbit: None,
        },
        BodyData {
            name: "Mercury",
            gravitational_parameter: 2.2032e13,
            mean_radius: 2.4397e6,
            zonal: None,
            orbit: Some(orbit(0.387_099_27, 0.205_635_93, 7.004_979_02, 252.250_323_50, 77.457_796_28, 48.330_765_93)),
        },
        BodyData {
            name: "Venus",
            gravitational_parameter: 3.248_59e14,
            mean_radius: 6.0518e6,
            zonal: None,
            orbit: Some(orbit(0.723_335_66, 0.006_776_72, 3.394_676_05, 181.979_099_50, 131.602_467_18, 76.679_842_55)),
        },
        BodyData {
            name: "Earth",
            // Earth and Moon together: the tabulated orbit is that of their barycentre.
            gravitational_parameter: 4.035_032_35e14,
            mean_radius: 6.371e6,
            zonal: Some(ZonalData {
                j2: 1.082_63e-3,
                reference_radius: 6.378_137e6,
                pole_right_ascension_deg: 0.0,
                pole_declination_deg: 90.0,
            }),
            orbit: Some(orbit(1.000_002_61, 0.016_711_23, -0.000_015_31, 100.464_571_66, 102.937_681_93, 0.0)),
        },
        BodyData {
            name: "Mars",
            gravitational_parameter: 4.282_837e13,
            mean_radius: 3.3895e6,
            zonal: Some(ZonalData {
                j2: 1.960_45e-3,
                reference_radius: 3.3962e6,
                pole_right_ascension_deg: 317.681_43,
                pole_declination_deg: 52.886_50,
            }),
            orbit: Some(orbit(1.523_710_34, 0.093_394_10, 1.849_691_42, -4.553_432_05, -23.943_629_59, 49.559_538_91)),
        },
        BodyData {
            name: "Jupiter",
            gravitational_parameter: 1.266_865_34e17,
            mean_radius: 6.9911e7,
            zonal: Some(ZonalData {
                j2: 1.4736e-2,
                reference_radius: 7.1492e7,
                pole_right_ascension_deg: 268.056_595,
                pole_declination_deg: 64.495_303,
            }),
            orbit: Some(orbit(5.202_887_00, 0.048_386_24, 1.304_396_95, 34.396_440_51, 14.728_479_83, 100.473_909_09)),
        },
        BodyData {
            name: "Saturn",
            gravitational_parameter: 3.793_118_7e16,
            mean_radius: 5.8232e7,
            zonal: Some(ZonalData {
                j2: 1.6298e-2,
                reference_radius: 6.0268e7,
                pole_right_ascension_deg: 40.589,
                pole_declination_deg: 83.537,
            }),
            orbit: Some(orbit(9.536_675_94, 0.053_861_79, 2.485_991_87, 49.954_244_23, 92.598_878_31, 113.662_424_48)),
        },
        BodyData {
            name: "Uranus",
            gravitational_parameter: 5.793_939e15,
            mean_radius: 2.5362e7,
            zonal: Some(ZonalData {
                j2: 3.343_43e-3,
                reference_radius: 2.5559e7,
                pole_right_ascension_deg: 257.311,
                pole_declination_deg: -15.175,
            }),
            orbit: Some(orbit(19.189_164_64, 0.047_257_44, 0.772_637_83, 313.238_104_51, 170.954_276_30, 74.016_925_03)),
        },
        BodyData {
            name: "Neptune",
            gravitational_parameter: 6.836_529e15,
            mean_radius: 2.4622e7,
            zonal: Some(ZonalData {
                j2: 3.411e-3,
                reference_radius: 2.4764e7,
                pole_right_ascension_deg: 299.36,
                pole_declination_deg: 43.46,
            }),
            orbit: Some(orbit(30.069_922_76, 0.008_590_48, 1.770_043_47, -55.120_029_69, 44.964_762_27, 131.784_225_74)),
        },
    ]
}
