//! Hand-engineered spectral/terrain feature stack.
//!
//! Takes the composite delivered by the imagery service, appends normalized
//! difference indices, then the terrain service's elevation and slope.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};
use crate::pipeline::Representation;
use crate::raster::BandStack;

pub const ELEVATION_BAND: &str = "elevation";
pub const SLOPE_BAND: &str = "slope";

/// `(a - b) / (a + b)` written to a band named `name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedDifference {
    pub name: String,
    pub a: String,
    pub b: String,
}

impl NormalizedDifference {
    pub fn new(name: &str, a: &str, b: &str) -> Self {
        Self { name: name.into(), a: a.into(), b: b.into() }
    }
}

/// NDVI (B8, B4), NDBI (B11, B8) and MNDWI (B3, B11) on Sentinel-2 band names.
pub fn sentinel2_indices() -> Vec<NormalizedDifference> {
    vec![
        NormalizedDifference::new("ndvi", "B8", "B4"),
        NormalizedDifference::new("ndbi", "B11", "B8"),
        NormalizedDifference::new("mndwi", "B3", "B11"),
    ]
}

/// Per-pixel normalized difference. Masked inputs give a masked output;
/// a zero denominator gives 0.
pub fn normalized_difference(a: &[f32], b: &[f32]) -> Vec<f32> {
    a.iter()
        .zip(b)
        .map(|(&x, &y)| {
            if !x.is_finite() || !y.is_finite() {
                f32::NAN
            } else if x + y == 0.0 {
                0.0
            } else {
                (x - y) / (x + y)
            }
        })
        .collect()
}

/// Composite bands, then `indices`, then elevation and slope.
///
/// Missing input bands or a terrain grid that does not line up with the
/// composite make the spectral representation unavailable.
pub fn build_spectral_stack(
    imagery: &BandStack,
    terrain: &BandStack,
    indices: &[NormalizedDifference],
) -> Result<BandStack> {
    let rep = Some(Representation::SpectralComposite);
    imagery.validate()?;
    terrain.validate()?;

    if !imagery.grid.aligned_with(&terrain.grid) {
        return Err(Error::unavailable(rep, "terrain grid is not aligned with the imagery composite"));
    }

    let mut stack = imagery.clone();
    for nd in indices {
        let (Some(a), Some(b)) = (imagery.band(&nd.a), imagery.band(&nd.b)) else {
            return Err(Error::unavailable(
                rep,
                format!("index {} needs bands {} and {}", nd.name, nd.a, nd.b),
            ));
        };
        let data = normalized_difference(&a.data, &b.data);
        stack.push_band(nd.name.clone(), data)?;
    }

    for name in [ELEVATION_BAND, SLOPE_BAND] {
        let band = terrain
            .band(name)
            .ok_or_else(|| Error::unavailable(rep, format!("terrain source has no {name} band")))?;
        stack.push_band(name, band.data.clone())?;
    }

    info!(bands = stack.bands.len(), "spectral feature stack assembled");
    Ok(stack)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::Bbox;
    use crate::raster::GridSpec;
    use approx::assert_relative_eq;

    fn grid() -> GridSpec {
        GridSpec::new(2, 1, Bbox { min_lat: 0.0, max_lat: 1.0, min_lon: 0.0, max_lon: 2.0 })
    }

    fn imagery() -> BandStack {
        BandStack::new(grid())
            .with_band("B3", vec![0.1, 0.2])
            .unwrap()
            .with_band("B4", vec![0.1, 0.0])
            .unwrap()
            .with_band("B8", vec![0.5, 0.0])
            .unwrap()
            .with_band("B11", vec![0.3, f32::NAN])
            .unwrap()
    }

    fn terrain() -> BandStack {
        BandStack::new(grid())
            .with_band("elevation", vec![12.0, 30.0])
            .unwrap()
            .with_band("slope", vec![1.5, 4.0])
            .unwrap()
    }

    #[test]
    fn stack_band_order() {
        let s = build_spectral_stack(&imagery(), &terrain(), &sentinel2_indices()).unwrap();
        assert_eq!(
            s.band_names(),
            vec!["B3", "B4", "B8", "B11", "ndvi", "ndbi", "mndwi", "elevation", "slope"]
        );
    }

    #[test]
    fn index_values() {
        let s = build_spectral_stack(&imagery(), &terrain(), &sentinel2_indices()).unwrap();
        let ndvi = &s.band("ndvi").unwrap().data;
        assert_relative_eq!(ndvi[0], 0.4 / 0.6, epsilon = 1e-6);
        // B8 + B4 == 0
        assert_eq!(ndvi[1], 0.0);
        // B11 masked
        assert!(s.band("mndwi").unwrap().data[1].is_nan());
    }

    #[test]
    fn missing_terrain_band_is_unavailable() {
        let t = BandStack::new(grid()).with_band("elevation", vec![1.0, 2.0]).unwrap();
        let err = build_spectral_stack(&imagery(), &t, &[]).unwrap_err();
        assert_eq!(err.representation(), Some(Representation::SpectralComposite));
    }

    #[test]
    fn misaligned_terrain_is_unavailable() {
        let shifted = GridSpec::new(2, 1, Bbox { min_lat: 0.5, max_lat: 1.5, min_lon: 0.0, max_lon: 2.0 });
        let mut t = terrain();
        t.grid = shifted;
        assert!(matches!(
            build_spectral_stack(&imagery(), &t, &[]),
            Err(Error::DataUnavailable { .. })
        ));
    }
}
