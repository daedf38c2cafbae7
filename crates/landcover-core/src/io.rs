//! Raster loading from JSON and single-band GeoTIFF files.
//!
//! GeoTIFF rows are stored north to south; rasters here are south to north,
//! so every decoded image is flipped on load. Georeferencing tags are not
//! read: the footprint comes from the caller.

use std::fs::{self, File};
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use serde::de::DeserializeOwned;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::ColorType;
use tracing::debug;

use crate::coords::Bbox;
use crate::error::{ConfigError, Error, Result};
use crate::raster::{BandStack, ClassRaster, GridSpec};

// ── JSON ─────────────────────────────────────────────────────────────────────

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// Read and validate a class raster stored as JSON.
pub fn load_class_raster(path: &Path) -> Result<ClassRaster> {
    let raster: ClassRaster = read_json(path)?;
    raster.validate()?;
    debug!(path = %path.display(), width = raster.grid.width, height = raster.grid.height, "class raster loaded");
    Ok(raster)
}

/// Read and validate a band stack stored as JSON.
pub fn load_band_stack(path: &Path) -> Result<BandStack> {
    let stack: BandStack = read_json(path)?;
    stack.validate()?;
    debug!(path = %path.display(), bands = stack.bands.len(), "band stack loaded");
    Ok(stack)
}

// ── GeoTIFF ──────────────────────────────────────────────────────────────────

/// Decoded single-band image, rows already flipped to south-first.
#[derive(Debug, Clone, PartialEq)]
pub struct TiffBand {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f64>,
}

/// Decode the first image of a single-band TIFF.
pub fn decode_tiff<R: Read + Seek>(reader: R) -> Result<TiffBand> {
    let mut decoder = Decoder::new(reader)?;
    let (width, height) = decoder.dimensions()?;
    let (width, height) = (width as usize, height as usize);
    if !matches!(decoder.colortype()?, ColorType::Gray(_)) {
        return Err(Error::unavailable(None, "expected a single-band (grayscale) TIFF"));
    }

    let raw: Vec<f64> = match decoder.read_image()? {
        DecodingResult::U8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U64(v) => v.into_iter().map(|x| x as f64).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I64(v) => v.into_iter().map(|x| x as f64).collect(),
        DecodingResult::F32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::F64(v) => v,
    };
    if width == 0 || raw.len() != width * height {
        return Err(Error::unavailable(
            None,
            format!("TIFF holds {} samples for a {width}x{height} image", raw.len()),
        ));
    }
    Ok(TiffBand { width, height, data: flip_rows(&raw, width) })
}

pub fn read_tiff(path: &Path) -> Result<TiffBand> {
    let band = decode_tiff(BufReader::new(File::open(path)?))?;
    debug!(path = %path.display(), width = band.width, height = band.height, "TIFF decoded");
    Ok(band)
}

/// Reverse row order (N→S storage to S→N).
pub fn flip_rows<T: Copy>(data: &[T], width: usize) -> Vec<T> {
    let mut out = Vec::with_capacity(data.len());
    for row in data.chunks(width).rev() {
        out.extend_from_slice(row);
    }
    out
}

/// Class raster from a single-band TIFF covering `bbox`.
pub fn load_class_tiff(path: &Path, bbox: Bbox, nodata: Option<i32>) -> Result<ClassRaster> {
    let band = read_tiff(path)?;
    let mut data = Vec::with_capacity(band.data.len());
    for v in band.data {
        if v.fract() != 0.0 || v < i32::MIN as f64 || v > i32::MAX as f64 {
            return Err(Error::unavailable(
                None,
                format!("{} holds non-integer class value {v}", path.display()),
            ));
        }
        data.push(v as i32);
    }
    let grid = GridSpec::new(band.width, band.height, bbox);
    Ok(ClassRaster::new(grid, data, nodata)?)
}

/// Band stack from one single-band TIFF per `(name, path)`. All files must
/// share dimensions. Pixels equal to `nodata` become NaN.
pub fn load_tiff_stack(bands: &[(String, &Path)], bbox: Bbox, nodata: Option<f64>) -> Result<BandStack> {
    let mut stack: Option<BandStack> = None;
    for (name, path) in bands {
        let band = read_tiff(path)?;
        let data: Vec<f32> = band
            .data
            .into_iter()
            .map(|v| if Some(v) == nodata { f32::NAN } else { v as f32 })
            .collect();
        let stack = stack.get_or_insert_with(|| BandStack::new(GridSpec::new(band.width, band.height, bbox)));
        if (stack.grid.width, stack.grid.height) != (band.width, band.height) {
            return Err(Error::unavailable(
                None,
                format!(
                    "band {name} is {}x{}, expected {}x{}",
                    band.width, band.height, stack.grid.width, stack.grid.height
                ),
            ));
        }
        stack.push_band(name.clone(), data)?;
    }
    Ok(stack.ok_or(ConfigError::EmptyBandSet)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tiff::encoder::{colortype, TiffEncoder};

    fn bbox() -> Bbox {
        Bbox { min_lat: 0.0, max_lat: 3.0, min_lon: 0.0, max_lon: 2.0 }
    }

    fn write_f32(path: &Path, width: u32, height: u32, data: &[f32]) {
        let mut buf = Cursor::new(Vec::new());
        TiffEncoder::new(&mut buf)
            .unwrap()
            .write_image::<colortype::Gray32Float>(width, height, data)
            .unwrap();
        fs::write(path, buf.into_inner()).unwrap();
    }

    #[test]
    fn flip_reverses_rows_only() {
        assert_eq!(flip_rows(&[1, 2, 3, 4, 5, 6], 2), vec![5, 6, 3, 4, 1, 2]);
    }

    #[test]
    fn u8_tiff_decodes_south_first() {
        // TIFF row 0 (north) = 1, row 2 (south) = 3.
        let mut buf = Cursor::new(Vec::new());
        TiffEncoder::new(&mut buf)
            .unwrap()
            .write_image::<colortype::Gray8>(2, 3, &[1, 1, 2, 2, 3, 3])
            .unwrap();
        buf.set_position(0);
        let band = decode_tiff(buf).unwrap();
        assert_eq!((band.width, band.height), (2, 3));
        assert_eq!(band.data, vec![3.0, 3.0, 2.0, 2.0, 1.0, 1.0]);
    }

    #[test]
    fn class_tiff_becomes_class_raster() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("worldcover.tif");
        write_f32(&path, 2, 3, &[50.0, 50.0, 80.0, 80.0, 10.0, 0.0]);
        let r = load_class_tiff(&path, bbox(), Some(0)).unwrap();
        assert_eq!(r.data, vec![10, 0, 80, 80, 50, 50]);
        assert_eq!(r.get(0, 1), None);
        assert_eq!(r.get(2, 0), Some(50));
    }

    #[test]
    fn fractional_class_values_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.tif");
        write_f32(&path, 1, 1, &[1.5]);
        assert!(matches!(
            load_class_tiff(&path, bbox(), None),
            Err(Error::DataUnavailable { .. })
        ));
    }

    #[test]
    fn tiff_stack_masks_nodata_and_checks_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let b4 = dir.path().join("b4.tif");
        let b8 = dir.path().join("b8.tif");
        let small = dir.path().join("small.tif");
        write_f32(&b4, 2, 3, &[0.1, 0.2, 0.3, 0.4, -9999.0, 0.6]);
        write_f32(&b8, 2, 3, &[0.5; 6]);
        write_f32(&small, 1, 1, &[0.0]);

        let bands = vec![("B4".to_string(), b4.as_path()), ("B8".to_string(), b8.as_path())];
        let stack = load_tiff_stack(&bands, bbox(), Some(-9999.0)).unwrap();
        assert_eq!(stack.band_names(), vec!["B4", "B8"]);
        assert!(stack.band("B4").unwrap().data[0].is_nan());
        assert!(stack.pixel(0, 0).is_none());
        assert!(stack.pixel(2, 0).is_some());

        let mixed = vec![("B4".to_string(), b4.as_path()), ("x".to_string(), small.as_path())];
        assert!(load_tiff_stack(&mixed, bbox(), None).is_err());
        assert!(load_tiff_stack(&[], bbox(), None).is_err());
    }

    #[test]
    fn json_rasters_are_validated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ref.json");
        fs::write(
            &path,
            r#"{"width":2,"height":1,"min_lon":0,"max_lon":2,"min_lat":0,"max_lat":1,"data":[10]}"#,
        )
        .unwrap();
        assert!(matches!(load_class_raster(&path), Err(Error::Config(_))));
    }
}
