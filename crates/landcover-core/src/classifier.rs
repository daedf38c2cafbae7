//! Classifier capability contract and the inference helpers built on it.
//!
//! Training and per-row prediction belong to whatever engine implements
//! [`Classifier`]. This module enforces what the pipeline needs around it:
//! non-empty training data, identical band order between the model and the
//! data it is applied to, one prediction per row, and region clipping for
//! full-raster inference.

use tracing::{debug, info};

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::features::FeatureTable;
use crate::pipeline::Representation;
use crate::raster::{BandStack, ClassRaster, GridSpec, NODATA_CLASS};
use crate::region::Region;
use crate::taxonomy::ClassCode;

#[cfg(feature = "threading")]
use rayon::prelude::*;

/// Something that fits a model on labelled feature rows.
pub trait Classifier: Send + Sync {
    type Model: TrainedModel;

    /// Fit a model. The table is non-empty and every row has one value per
    /// entry of `table.band_names()`.
    fn train(&self, table: &FeatureTable) -> anyhow::Result<Self::Model>;
}

/// A fitted model bound to the band order it was trained on.
pub trait TrainedModel: Send + Sync {
    fn band_names(&self) -> &[String];

    /// Predict one class per row. Rows are in `band_names()` order.
    fn predict(&self, rows: &[&[f32]]) -> anyhow::Result<Vec<ClassCode>>;
}

/// Train `classifier` on `table`, attributing failures to `representation`.
pub fn train<C: Classifier>(
    classifier: &C,
    table: &FeatureTable,
    representation: Representation,
) -> Result<C::Model> {
    if table.is_empty() {
        return Err(Error::unavailable(
            Some(representation),
            "no training rows after feature extraction",
        ));
    }
    info!(%representation, rows = table.len(), bands = table.band_names().len(), "training classifier");
    let model = classifier.train(table).map_err(|e| Error::Classifier {
        representation,
        message: format!("{e:#}"),
    })?;
    check_bands(model.band_names(), table.band_names(), representation)?;
    Ok(model)
}

/// Predict every row of `table`.
pub fn predict_table<M: TrainedModel>(
    model: &M,
    table: &FeatureTable,
    representation: Representation,
) -> Result<Vec<ClassCode>> {
    check_bands(model.band_names(), table.band_names(), representation)?;
    let rows: Vec<&[f32]> = table.rows().iter().map(|r| r.values.as_slice()).collect();
    predict_rows(model, &rows, representation)
}

/// Classify every pixel of `source` whose centre lies inside `region`.
///
/// Pixels outside the region, or with any masked band, are
/// [`NODATA_CLASS`]. Cancellation is checked once per raster row.
pub fn classify_raster<M: TrainedModel>(
    model: &M,
    source: &BandStack,
    region: &Region,
    representation: Representation,
    cancel: &CancelToken,
) -> Result<ClassRaster> {
    source.validate()?;
    check_bands(model.band_names(), &source.band_names(), representation)?;
    if !region.bbox().intersects(&source.grid.bbox()) {
        return Err(Error::unavailable(
            Some(representation),
            format!("feature source does not intersect region {:?}", region.name()),
        ));
    }

    let grid = source.grid;
    let per_row = |row: usize| -> Result<Vec<i32>> {
        cancel.check(Some(representation))?;
        classify_row(model, source, region, grid, row, representation)
    };

    #[cfg(feature = "threading")]
    let rows: Vec<Vec<i32>> = (0..grid.height)
        .into_par_iter()
        .map(per_row)
        .collect::<Result<_>>()?;
    #[cfg(not(feature = "threading"))]
    let rows: Vec<Vec<i32>> = (0..grid.height).map(per_row).collect::<Result<_>>()?;

    let out = ClassRaster {
        grid,
        data: rows.concat(),
        nodata: Some(NODATA_CLASS),
    };
    debug!(%representation, pixels = out.data.len(), "raster classified");
    Ok(out)
}

fn classify_row<M: TrainedModel>(
    model: &M,
    source: &BandStack,
    region: &Region,
    grid: GridSpec,
    row: usize,
    representation: Representation,
) -> Result<Vec<i32>> {
    let mut out = vec![NODATA_CLASS; grid.width];
    let mut cols = Vec::new();
    let mut values = Vec::new();
    for col in 0..grid.width {
        if !region.contains(grid.cell_center(row, col)) {
            continue;
        }
        if let Some(v) = source.pixel(row, col) {
            cols.push(col);
            values.push(v);
        }
    }
    if cols.is_empty() {
        return Ok(out);
    }
    let rows: Vec<&[f32]> = values.iter().map(Vec::as_slice).collect();
    let predicted = predict_rows(model, &rows, representation)?;
    for (col, class) in cols.into_iter().zip(predicted) {
        out[col] = i32::from(class);
    }
    Ok(out)
}

fn predict_rows<M: TrainedModel>(
    model: &M,
    rows: &[&[f32]],
    representation: Representation,
) -> Result<Vec<ClassCode>> {
    let predicted = model.predict(rows).map_err(|e| Error::Classifier {
        representation,
        message: format!("{e:#}"),
    })?;
    if predicted.len() != rows.len() {
        return Err(Error::Classifier {
            representation,
            message: format!("{} predictions for {} rows", predicted.len(), rows.len()),
        });
    }
    Ok(predicted)
}

fn check_bands(expected: &[String], found: &[String], representation: Representation) -> Result<()> {
    if expected != found {
        return Err(Error::BandMismatch {
            representation,
            expected: expected.to_vec(),
            found: found.to_vec(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::{Bbox, LatLon};
    use crate::features::FeatureRow;

    /// Predicts class 1 when the first band is positive, else 0.
    #[derive(Debug)]
    struct Threshold(Vec<String>);

    impl TrainedModel for Threshold {
        fn band_names(&self) -> &[String] {
            &self.0
        }

        fn predict(&self, rows: &[&[f32]]) -> anyhow::Result<Vec<ClassCode>> {
            Ok(rows.iter().map(|r| u8::from(r[0] > 0.0)).collect())
        }
    }

    struct Failing;

    impl Classifier for Failing {
        type Model = Threshold;

        fn train(&self, _table: &FeatureTable) -> anyhow::Result<Threshold> {
            anyhow::bail!("engine unavailable")
        }
    }

    fn stack() -> BandStack {
        let grid = GridSpec::new(2, 2, Bbox { min_lat: 0.0, max_lat: 1.0, min_lon: 0.0, max_lon: 1.0 });
        BandStack::new(grid)
            .with_band("x", vec![1.0, -1.0, f32::NAN, 2.0])
            .unwrap()
    }

    #[test]
    fn raster_is_clipped_and_masked() {
        let model = Threshold(vec!["x".into()]);
        // Triangle covering every cell centre except the north-east one.
        let region = Region::new(
            "tri",
            vec![LatLon::new(0.0, 0.0), LatLon::new(0.0, 1.2), LatLon::new(1.2, 0.0)],
        )
        .unwrap();
        let out = classify_raster(
            &model,
            &stack(),
            &region,
            Representation::Embedding,
            &CancelToken::new(),
        )
        .unwrap();
        // (1,0) is masked; (1,1) lies outside the triangle.
        assert_eq!(out.data, vec![1, 0, NODATA_CLASS, NODATA_CLASS]);
    }

    #[test]
    fn band_order_must_match() {
        let model = Threshold(vec!["y".into()]);
        let region = Region::rectangle("r", stack().grid.bbox()).unwrap();
        let err = classify_raster(
            &model,
            &stack(),
            &region,
            Representation::SpectralComposite,
            &CancelToken::new(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::BandMismatch { .. }));
    }

    #[test]
    fn cancelled_token_aborts_classification() {
        let model = Threshold(vec!["x".into()]);
        let region = Region::rectangle("r", stack().grid.bbox()).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = classify_raster(&model, &stack(), &region, Representation::Embedding, &cancel)
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled { .. }));
    }

    #[test]
    fn training_failure_names_representation() {
        let table = FeatureTable::new(
            vec!["x".into()],
            vec![FeatureRow { point: 0, label: 1, values: vec![1.0] }],
        );
        let err = train(&Failing, &table, Representation::Embedding).unwrap_err();
        assert_eq!(err.representation(), Some(Representation::Embedding));
        assert!(err.to_string().contains("engine unavailable"));
    }

    #[test]
    fn empty_training_table_is_unavailable() {
        let table = FeatureTable::new(vec!["x".into()], vec![]);
        let err = train(&Failing, &table, Representation::SpectralComposite).unwrap_err();
        assert!(matches!(err, Error::DataUnavailable { .. }));
    }
}
