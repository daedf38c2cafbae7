use serde::{Deserialize, Serialize};

use crate::coords::{Bbox, LatLon};
use crate::error::ConfigError;

/// Geographic footprint of a row-major raster.
///
/// Pixels are areas: cell `(row, col)` covers
/// `[min_lon + col·dx, min_lon + (col+1)·dx)` × `[min_lat + row·dy, min_lat + (row+1)·dy)`.
/// Row 0 is the southernmost row (S→N), matching the sampler's GeoTIFF flip.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub width: usize,
    pub height: usize,
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl GridSpec {
    pub fn new(width: usize, height: usize, bbox: Bbox) -> Self {
        Self {
            width,
            height,
            min_lon: bbox.min_lon,
            max_lon: bbox.max_lon,
            min_lat: bbox.min_lat,
            max_lat: bbox.max_lat,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.width * self.height
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn bbox(&self) -> Bbox {
        Bbox {
            min_lat: self.min_lat,
            max_lat: self.max_lat,
            min_lon: self.min_lon,
            max_lon: self.max_lon,
        }
    }

    /// Pixel size `(dx, dy)` in degrees.
    pub fn pixel_size(&self) -> (f64, f64) {
        (
            (self.max_lon - self.min_lon) / self.width as f64,
            (self.max_lat - self.min_lat) / self.height as f64,
        )
    }

    /// Cell containing `p`, or None when `p` is outside the footprint.
    /// The northern and eastern edges are exclusive.
    pub fn locate(&self, p: LatLon) -> Option<(usize, usize)> {
        if self.is_empty() || !p.is_finite() {
            return None;
        }
        let (dx, dy) = self.pixel_size();
        let fx = (p.lon - self.min_lon) / dx;
        let fy = (p.lat - self.min_lat) / dy;
        if fx < 0.0 || fy < 0.0 {
            return None;
        }
        let col = fx.floor() as usize;
        let row = fy.floor() as usize;
        if col >= self.width || row >= self.height {
            return None;
        }
        Some((row, col))
    }

    pub fn cell_center(&self, row: usize, col: usize) -> LatLon {
        let (dx, dy) = self.pixel_size();
        LatLon::new(
            self.min_lat + (row as f64 + 0.5) * dy,
            self.min_lon + (col as f64 + 0.5) * dx,
        )
    }

    /// Same dimensions and bounds, within a tolerance of 1e-9 of a pixel.
    pub fn aligned_with(&self, other: &GridSpec) -> bool {
        if self.width != other.width || self.height != other.height {
            return false;
        }
        let (dx, dy) = self.pixel_size();
        let tol_x = dx.abs() * 1e-9;
        let tol_y = dy.abs() * 1e-9;
        (self.min_lon - other.min_lon).abs() <= tol_x
            && (self.max_lon - other.max_lon).abs() <= tol_x
            && (self.min_lat - other.min_lat).abs() <= tol_y
            && (self.max_lat - other.max_lat).abs() <= tol_y
    }

    pub(crate) fn check_len(&self, len: usize) -> Result<(), ConfigError> {
        if self.len() != len || self.max_lon <= self.min_lon || self.max_lat <= self.min_lat {
            return Err(ConfigError::GridMismatch {
                width: self.width,
                height: self.height,
                len,
            });
        }
        Ok(())
    }
}

/// Integer class-code raster (reference land cover or classifier output).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassRaster {
    #[serde(flatten)]
    pub grid: GridSpec,
    /// Row-major class codes.
    pub data: Vec<i32>,
    /// Sentinel marking pixels with no class.
    #[serde(default)]
    pub nodata: Option<i32>,
}

/// Nodata sentinel used for rasters of target class codes.
pub const NODATA_CLASS: i32 = -1;

impl ClassRaster {
    pub fn new(grid: GridSpec, data: Vec<i32>, nodata: Option<i32>) -> Result<Self, ConfigError> {
        grid.check_len(data.len())?;
        Ok(Self { grid, data, nodata })
    }

    /// Raster of target codes with every pixel set to nodata.
    pub fn empty_target(grid: GridSpec) -> Self {
        Self {
            grid,
            data: vec![NODATA_CLASS; grid.len()],
            nodata: Some(NODATA_CLASS),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.grid.check_len(self.data.len())
    }

    /// Class code at `(row, col)`, None for nodata.
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> Option<i32> {
        let v = self.data[row * self.grid.width + col];
        if Some(v) == self.nodata {
            None
        } else {
            Some(v)
        }
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, val: i32) {
        self.data[row * self.grid.width + col] = val;
    }

    /// Class code of the pixel containing `p`.
    pub fn value_at(&self, p: LatLon) -> Option<i32> {
        let (row, col) = self.grid.locate(p)?;
        self.get(row, col)
    }

    /// Distinct non-nodata codes in ascending order.
    pub fn distinct_codes(&self) -> Vec<i32> {
        let mut codes: Vec<i32> = self
            .data
            .iter()
            .copied()
            .filter(|&v| Some(v) != self.nodata)
            .collect();
        codes.sort_unstable();
        codes.dedup();
        codes
    }
}

/// One named band of a feature raster. NaN marks masked pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub name: String,
    pub data: Vec<f32>,
}

/// Multi-band feature raster (spectral composite or embedding).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandStack {
    #[serde(flatten)]
    pub grid: GridSpec,
    pub bands: Vec<Band>,
}

impl BandStack {
    pub fn new(grid: GridSpec) -> Self {
        Self { grid, bands: Vec::new() }
    }

    /// Append a band, rejecting duplicate names and size mismatches.
    pub fn push_band(&mut self, name: impl Into<String>, data: Vec<f32>) -> Result<(), ConfigError> {
        let name = name.into();
        self.grid.check_len(data.len())?;
        if self.bands.iter().any(|b| b.name == name) {
            return Err(ConfigError::DuplicateBand(name));
        }
        self.bands.push(Band { name, data });
        Ok(())
    }

    pub fn with_band(mut self, name: impl Into<String>, data: Vec<f32>) -> Result<Self, ConfigError> {
        self.push_band(name, data)?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bands.is_empty() {
            return Err(ConfigError::EmptyBandSet);
        }
        for (i, band) in self.bands.iter().enumerate() {
            self.grid.check_len(band.data.len())?;
            if self.bands[..i].iter().any(|b| b.name == band.name) {
                return Err(ConfigError::DuplicateBand(band.name.clone()));
            }
        }
        Ok(())
    }

    pub fn band_names(&self) -> Vec<String> {
        self.bands.iter().map(|b| b.name.clone()).collect()
    }

    pub fn band(&self, name: &str) -> Option<&Band> {
        self.bands.iter().find(|b| b.name == name)
    }

    /// All band values at one pixel; None if any band is masked there.
    pub fn pixel(&self, row: usize, col: usize) -> Option<Vec<f32>> {
        let idx = row * self.grid.width + col;
        let values: Vec<f32> = self.bands.iter().map(|b| b.data[idx]).collect();
        if values.iter().any(|v| !v.is_finite()) {
            None
        } else {
            Some(values)
        }
    }

    /// Band values at `p` aggregated to `scale` degrees.
    ///
    /// When `scale` does not exceed the pixel size this is the pixel
    /// containing `p`. Otherwise each band is the mean of its unmasked pixels
    /// whose centres fall inside the `scale`×`scale` cell centred on `p`.
    /// Returns None when `p` is outside the grid or any band has no
    /// unmasked pixel in the cell.
    pub fn sample(&self, p: LatLon, scale: f64) -> Option<Vec<f32>> {
        let (row, col) = self.grid.locate(p)?;
        let (dx, dy) = self.grid.pixel_size();
        if scale <= dx.max(dy) {
            return self.pixel(row, col);
        }

        let half = scale / 2.0;
        let col_lo = (((p.lon - half - self.grid.min_lon) / dx) - 0.5).ceil().max(0.0) as usize;
        let col_hi = (((p.lon + half - self.grid.min_lon) / dx) - 0.5).floor();
        let row_lo = (((p.lat - half - self.grid.min_lat) / dy) - 0.5).ceil().max(0.0) as usize;
        let row_hi = (((p.lat + half - self.grid.min_lat) / dy) - 0.5).floor();
        if col_hi < 0.0 || row_hi < 0.0 {
            return None;
        }
        let col_hi = (col_hi as usize).min(self.grid.width - 1);
        let row_hi = (row_hi as usize).min(self.grid.height - 1);

        let mut out = Vec::with_capacity(self.bands.len());
        for band in &self.bands {
            let mut sum = 0.0f64;
            let mut n = 0usize;
            for r in row_lo..=row_hi {
                for c in col_lo..=col_hi {
                    let v = band.data[r * self.grid.width + c];
                    if v.is_finite() {
                        sum += v as f64;
                        n += 1;
                    }
                }
            }
            if n == 0 {
                return None;
            }
            out.push((sum / n as f64) as f32);
        }
        Some(out)
    }
}
