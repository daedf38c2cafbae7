//! Palette PNG export of classified rasters.

use std::io::Cursor;
use std::path::PathBuf;

use anyhow::{Context, Result};
use image::{ImageFormat, Rgba, RgbaImage};
use landcover_core::export::{write_atomic, Exporter, Palette};
use landcover_core::ClassRaster;

/// Writes `<dir>/<name>.png`. Nodata and undeclared classes are transparent.
pub struct PngExporter {
    dir: PathBuf,
}

impl PngExporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

/// Raster row 0 is the southern edge; image row 0 is the top (north).
pub fn render(raster: &ClassRaster, palette: &Palette) -> RgbaImage {
    let (w, h) = (raster.grid.width, raster.grid.height);
    let mut img = RgbaImage::new(w as u32, h as u32);
    for r in 0..h {
        for c in 0..w {
            let px = match raster.get(r, c).and_then(|v| palette.color(v)) {
                Some([red, green, blue]) => Rgba([red, green, blue, 255]),
                None => Rgba([0, 0, 0, 0]),
            };
            img.put_pixel(c as u32, (h - 1 - r) as u32, px);
        }
    }
    img
}

impl Exporter for PngExporter {
    fn export(&self, raster: &ClassRaster, palette: &Palette, name: &str) -> Result<PathBuf> {
        let img = render(raster, palette);
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png)
            .with_context(|| format!("encoding {name}.png"))?;
        let path = self.dir.join(format!("{name}.png"));
        write_atomic(&path, buf.get_ref()).with_context(|| format!("writing {}", path.display()))?;
        Ok(path)
    }
}
