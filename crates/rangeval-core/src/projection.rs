//! Equal-area projection used for overlap ratios.
//! Ellipsoidal Albers conic (Snyder, "Map Projections: A Working Manual", §14).
//! All projection math uses f64; output units are metres.

use serde::{Deserialize, Serialize};

use crate::error::GeometryError;

/// GRS 1980 semi-major axis (m).
pub const GRS80_A: f64 = 6_378_137.0;
/// GRS 1980 inverse flattening.
pub const GRS80_INV_F: f64 = 298.257_222_101;

/// Inverse iterations stop once the latitude update is below this (radians).
const INVERSE_TOLERANCE: f64 = 1e-12;
const INVERSE_MAX_ITERS: usize = 25;

/// Parameters of an Albers equal-area conic projection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlbersParams {
    /// First standard parallel, degrees.
    pub lat_1: f64,
    /// Second standard parallel, degrees.
    pub lat_2: f64,
    /// Latitude of origin, degrees.
    pub lat_0: f64,
    /// Central meridian, degrees.
    pub lon_0: f64,
    pub false_easting: f64,
    pub false_northing: f64,
}

impl AlbersParams {
    /// North America Albers Equal Area Conic (ESRI:102008), NAD83 / GRS80.
    pub fn north_america() -> Self {
        Self {
            lat_1: 20.0,
            lat_2: 60.0,
            lat_0: 40.0,
            lon_0: -96.0,
            false_easting: 0.0,
            false_northing: 0.0,
        }
    }
}

impl Default for AlbersParams {
    fn default() -> Self {
        Self::north_america()
    }
}

/// Target plane for area computation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EqualArea {
    /// Inputs are already planar and equal-area; reprojection is the identity.
    Planar,
    Albers(AlbersParams),
}

impl Default for EqualArea {
    fn default() -> Self {
        EqualArea::Albers(AlbersParams::north_america())
    }
}

impl EqualArea {
    /// Build the projector for this target plane.
    pub fn projector(&self) -> Projector {
        match self {
            EqualArea::Planar => Projector::Planar,
            EqualArea::Albers(p) => Projector::Albers(Albers::new(*p)),
        }
    }
}

/// A ready-to-use projection with derived constants precomputed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projector {
    Planar,
    Albers(Albers),
}

impl Projector {
    /// (lon, lat) degrees → (x, y) metres.
    pub fn forward(&self, lon: f64, lat: f64) -> Result<(f64, f64), GeometryError> {
        match self {
            Projector::Planar => Ok((lon, lat)),
            Projector::Albers(a) => a.forward(lon, lat),
        }
    }

    /// (x, y) metres → (lon, lat) degrees.
    pub fn inverse(&self, x: f64, y: f64) -> Result<(f64, f64), GeometryError> {
        match self {
            Projector::Planar => Ok((x, y)),
            Projector::Albers(a) => Ok(a.inverse(x, y)),
        }
    }
}

/// Ellipsoidal Albers conic on GRS80.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Albers {
    params: AlbersParams,
    a: f64,
    e: f64,
    e2: f64,
    n: f64,
    c: f64,
    rho0: f64,
}

impl Albers {
    pub fn new(params: AlbersParams) -> Self {
        let a = GRS80_A;
        let f = 1.0 / GRS80_INV_F;
        let e2 = 2.0 * f - f * f;
        let e = e2.sqrt();

        let phi1 = params.lat_1.to_radians();
        let phi2 = params.lat_2.to_radians();
        let phi0 = params.lat_0.to_radians();

        let m1 = m(phi1, e2);
        let m2 = m(phi2, e2);
        let q0 = q(phi0, e, e2);
        let q1 = q(phi1, e, e2);
        let q2 = q(phi2, e, e2);

        // Tangent cone when the parallels coincide.
        let n = if (phi1 - phi2).abs() < 1e-10 {
            phi1.sin()
        } else {
            (m1 * m1 - m2 * m2) / (q2 - q1)
        };
        let c = m1 * m1 + n * q1;
        let rho0 = a * (c - n * q0).max(0.0).sqrt() / n;

        Self { params, a, e, e2, n, c, rho0 }
    }

    pub fn forward(&self, lon: f64, lat: f64) -> Result<(f64, f64), GeometryError> {
        if !lon.is_finite() || !lat.is_finite() {
            return Err(GeometryError::NonFinite { x: lon, y: lat });
        }
        if lat.abs() > 90.0 {
            return Err(GeometryError::OutOfDomain { lat });
        }
        let phi = lat.to_radians();
        let dlon = wrap_degrees(lon - self.params.lon_0).to_radians();

        let q = q(phi, self.e, self.e2);
        let rho = self.a * (self.c - self.n * q).max(0.0).sqrt() / self.n;
        let theta = self.n * dlon;

        let x = rho * theta.sin() + self.params.false_easting;
        let y = self.rho0 - rho * theta.cos() + self.params.false_northing;
        Ok((x, y))
    }

    pub fn inverse(&self, x: f64, y: f64) -> (f64, f64) {
        let x = x - self.params.false_easting;
        let dy = self.rho0 - (y - self.params.false_northing);

        let sign = self.n.signum();
        let rho = (x * x + dy * dy).sqrt() * sign;
        let theta = if sign < 0.0 {
            (-x).atan2(-dy)
        } else {
            x.atan2(dy)
        };

        let q = (self.c - (rho * rho * self.n * self.n) / (self.a * self.a)) / self.n;
        let phi = self.latitude_from_q(q);
        let lon = self.params.lon_0 + (theta / self.n).to_degrees();
        (wrap_degrees(lon), phi.to_degrees())
    }

    /// Snyder eq. 3-16, iterated from the spherical estimate.
    fn latitude_from_q(&self, q: f64) -> f64 {
        let (e, e2) = (self.e, self.e2);

        // |q| at the poles; beyond it the point is outside the ellipsoid image.
        let q_pole = 1.0 - (1.0 - e2) / (2.0 * e) * ((1.0 - e) / (1.0 + e)).ln();
        if q.abs() >= q_pole - 1e-12 {
            return std::f64::consts::FRAC_PI_2.copysign(q);
        }

        let mut phi = (q / 2.0).clamp(-1.0, 1.0).asin();
        for _ in 0..INVERSE_MAX_ITERS {
            let s = phi.sin();
            let es2 = 1.0 - e2 * s * s;
            let delta = es2 * es2 / (2.0 * phi.cos())
                * (q / (1.0 - e2) - s / es2 + (1.0 / (2.0 * e)) * ((1.0 - e * s) / (1.0 + e * s)).ln());
            phi += delta;
            if delta.abs() < INVERSE_TOLERANCE {
                break;
            }
        }
        phi
    }
}

fn m(phi: f64, e2: f64) -> f64 {
    let s = phi.sin();
    phi.cos() / (1.0 - e2 * s * s).sqrt()
}

fn q(phi: f64, e: f64, e2: f64) -> f64 {
    let s = phi.sin();
    (1.0 - e2) * (s / (1.0 - e2 * s * s) - (1.0 / (2.0 * e)) * ((1.0 - e * s) / (1.0 + e * s)).ln())
}

/// Wrap a longitude difference into [-180, 180).
fn wrap_degrees(deg: f64) -> f64 {
    (deg + 180.0).rem_euclid(360.0) - 180.0
}
