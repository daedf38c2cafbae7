/// Geographic coordinate types.
/// All coordinate math uses f64 for precision.
use serde::{Deserialize, Serialize};

/// A point in geographic coordinates (degrees).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    /// Latitude in degrees, -90 to +90.
    pub lat: f64,
    /// Longitude in degrees, -180 to +180.
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lon.is_finite()
    }
}

/// Axis-aligned lon/lat bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bbox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl Bbox {
    pub fn contains(&self, p: LatLon) -> bool {
        p.lon >= self.min_lon && p.lon <= self.max_lon && p.lat >= self.min_lat && p.lat <= self.max_lat
    }

    pub fn intersects(&self, other: &Bbox) -> bool {
        self.min_lat < other.max_lat
            && self.max_lat > other.min_lat
            && self.min_lon < other.max_lon
            && self.max_lon > other.min_lon
    }

    pub fn width(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    pub fn height(&self) -> f64 {
        self.max_lat - self.min_lat
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bbox_contains_edges() {
        let b = Bbox { min_lat: 0.0, max_lat: 1.0, min_lon: 10.0, max_lon: 12.0 };
        assert!(b.contains(LatLon::new(0.0, 10.0)));
        assert!(b.contains(LatLon::new(1.0, 12.0)));
        assert!(!b.contains(LatLon::new(1.5, 11.0)));
    }

    #[test]
    fn touching_boxes_do_not_intersect() {
        let a = Bbox { min_lat: 0.0, max_lat: 1.0, min_lon: 0.0, max_lon: 1.0 };
        let b = Bbox { min_lat: 0.0, max_lat: 1.0, min_lon: 1.0, max_lon: 2.0 };
        let c = Bbox { min_lat: 0.5, max_lat: 2.0, min_lon: 0.5, max_lon: 2.0 };
        assert!(!a.intersects(&b));
        assert!(a.intersects(&c));
    }
}
