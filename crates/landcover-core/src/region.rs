//! Region of interest: an immutable lon/lat polygon.
//!
//! Every sampled point, extracted feature row and classified pixel is
//! restricted to the region. Containment uses the even-odd rule on the
//! outer ring; holes are not supported.

use serde::{Deserialize, Serialize};

use crate::coords::{Bbox, LatLon};
use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RegionDef", into = "RegionDef")]
pub struct Region {
    name: String,
    /// Outer ring, not closed (first vertex is not repeated).
    ring: Vec<LatLon>,
    bbox: Bbox,
}

#[derive(Serialize, Deserialize)]
struct RegionDef {
    name: String,
    /// `[lon, lat]` pairs, GeoJSON axis order.
    coordinates: Vec<[f64; 2]>,
}

impl TryFrom<RegionDef> for Region {
    type Error = ConfigError;

    fn try_from(def: RegionDef) -> Result<Self, Self::Error> {
        let ring = def
            .coordinates
            .iter()
            .map(|&[lon, lat]| LatLon::new(lat, lon))
            .collect();
        Region::new(def.name, ring)
    }
}

impl From<Region> for RegionDef {
    fn from(r: Region) -> Self {
        RegionDef {
            name: r.name,
            coordinates: r.ring.iter().map(|p| [p.lon, p.lat]).collect(),
        }
    }
}

impl Region {
    /// Build a region from its outer ring. A closing vertex equal to the
    /// first is dropped.
    pub fn new(name: impl Into<String>, mut ring: Vec<LatLon>) -> Result<Self, ConfigError> {
        if ring.len() > 1 && ring.first() == ring.last() {
            ring.pop();
        }
        if ring.len() < 3 || ring.iter().any(|p| !p.is_finite()) {
            return Err(ConfigError::DegenerateRegion);
        }
        let area = signed_area(&ring);
        if area.abs() < 1e-12 {
            return Err(ConfigError::DegenerateRegion);
        }

        let mut bbox = Bbox {
            min_lat: f64::INFINITY,
            max_lat: f64::NEG_INFINITY,
            min_lon: f64::INFINITY,
            max_lon: f64::NEG_INFINITY,
        };
        for p in &ring {
            bbox.min_lat = bbox.min_lat.min(p.lat);
            bbox.max_lat = bbox.max_lat.max(p.lat);
            bbox.min_lon = bbox.min_lon.min(p.lon);
            bbox.max_lon = bbox.max_lon.max(p.lon);
        }

        Ok(Self { name: name.into(), ring, bbox })
    }

    /// Axis-aligned rectangle region.
    pub fn rectangle(name: impl Into<String>, bbox: Bbox) -> Result<Self, ConfigError> {
        Self::new(
            name,
            vec![
                LatLon::new(bbox.min_lat, bbox.min_lon),
                LatLon::new(bbox.min_lat, bbox.max_lon),
                LatLon::new(bbox.max_lat, bbox.max_lon),
                LatLon::new(bbox.max_lat, bbox.min_lon),
            ],
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bbox(&self) -> Bbox {
        self.bbox
    }

    /// Even-odd containment test. Points exactly on the southern or western
    /// edge of an axis-aligned ring count as inside, points on the northern
    /// or eastern edge do not, so adjacent regions never share a point.
    pub fn contains(&self, p: LatLon) -> bool {
        if !self.bbox.contains(p) {
            return false;
        }
        let n = self.ring.len();
        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let a = self.ring[i];
            let b = self.ring[j];
            if (a.lat > p.lat) != (b.lat > p.lat) {
                let x = b.lon + (p.lat - b.lat) / (a.lat - b.lat) * (a.lon - b.lon);
                if p.lon < x {
                    inside = !inside;
                }
            }
            j = i;
        }
        inside
    }
}

/// Shoelace formula over the ring, in square degrees.
fn signed_area(ring: &[LatLon]) -> f64 {
    let n = ring.len();
    let mut acc = 0.0;
    for i in 0..n {
        let a = ring[i];
        let b = ring[(i + 1) % n];
        acc += a.lon * b.lat - b.lon * a.lat;
    }
    acc / 2.0
}
