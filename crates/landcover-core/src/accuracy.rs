//! Confusion matrix and the accuracy measures derived from it.
//!
//! Rows are actual (reference) classes, columns are predicted classes, both
//! in the same ascending class order. Every measure is a pure function of
//! the matrix. Producer's and consumer's accuracy are NaN for a class whose
//! row or column is empty; the class is still reported.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ConfigError;
use crate::pipeline::Representation;
use crate::taxonomy::ClassCode;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    classes: Vec<ClassCode>,
    /// Row-major `classes.len()²` counts.
    counts: Vec<u64>,
}

impl ConfusionMatrix {
    /// Build from parallel label sequences. The class axis is the union of
    /// `classes` and every label seen, ascending.
    pub fn from_pairs(
        actual: &[ClassCode],
        predicted: &[ClassCode],
        classes: &[ClassCode],
    ) -> Result<Self, ConfigError> {
        if actual.len() != predicted.len() {
            return Err(ConfigError::InvalidParameter {
                name: "predicted",
                value: predicted.len().to_string(),
                reason: format!("expected one prediction per actual label ({})", actual.len()),
            });
        }

        let mut axis: Vec<ClassCode> = classes.iter().chain(actual).chain(predicted).copied().collect();
        axis.sort_unstable();
        axis.dedup();

        let n = axis.len();
        let mut counts = vec![0u64; n * n];
        for (&a, &p) in actual.iter().zip(predicted) {
            // Both labels are on the axis by construction.
            let (Ok(i), Ok(j)) = (axis.binary_search(&a), axis.binary_search(&p)) else {
                continue;
            };
            counts[i * n + j] += 1;
        }
        Ok(Self { classes: axis, counts })
    }

    pub fn classes(&self) -> &[ClassCode] {
        &self.classes
    }

    fn index(&self, class: ClassCode) -> Option<usize> {
        self.classes.binary_search(&class).ok()
    }

    /// Count of points with reference `actual` predicted as `predicted`.
    pub fn get(&self, actual: ClassCode, predicted: ClassCode) -> u64 {
        match (self.index(actual), self.index(predicted)) {
            (Some(i), Some(j)) => self.counts[i * self.classes.len() + j],
            _ => 0,
        }
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    pub fn diagonal(&self) -> u64 {
        let n = self.classes.len();
        (0..n).map(|i| self.counts[i * n + i]).sum()
    }

    fn row_sum(&self, i: usize) -> u64 {
        let n = self.classes.len();
        self.counts[i * n..(i + 1) * n].iter().sum()
    }

    fn col_sum(&self, j: usize) -> u64 {
        let n = self.classes.len();
        (0..n).map(|i| self.counts[i * n + j]).sum()
    }

    /// True when every off-diagonal cell is zero.
    pub fn is_diagonal(&self) -> bool {
        let n = self.classes.len();
        self.counts
            .iter()
            .enumerate()
            .all(|(k, &c)| c == 0 || k / n == k % n)
    }

    /// Diagonal sum over total; NaN for an empty matrix.
    pub fn overall_accuracy(&self) -> f64 {
        ratio(self.diagonal(), self.total())
    }

    /// Per class: correct / actual count (row sum).
    pub fn producers_accuracy(&self) -> Vec<ClassAccuracy> {
        let n = self.classes.len();
        (0..n)
            .map(|i| ClassAccuracy {
                class: self.classes[i],
                value: ratio(self.counts[i * n + i], self.row_sum(i)),
            })
            .collect()
    }

    /// Per class: correct / predicted count (column sum).
    pub fn consumers_accuracy(&self) -> Vec<ClassAccuracy> {
        let n = self.classes.len();
        (0..n)
            .map(|j| ClassAccuracy {
                class: self.classes[j],
                value: ratio(self.counts[j * n + j], self.col_sum(j)),
            })
            .collect()
    }
}

fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 {
        f64::NAN
    } else {
        num as f64 / den as f64
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = self.classes.len();
        write!(f, "{:>8}", "act\\pred")?;
        for c in &self.classes {
            write!(f, " {c:>6}")?;
        }
        writeln!(f)?;
        for i in 0..n {
            write!(f, "{:>8}", self.classes[i])?;
            for j in 0..n {
                write!(f, " {:>6}", self.counts[i * n + j])?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// One class's producer's or consumer's accuracy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ClassAccuracy {
    pub class: ClassCode,
    #[serde(with = "nan_as_null")]
    pub value: f64,
}

impl PartialEq for ClassAccuracy {
    /// NaN equals NaN here, so identical reports compare equal.
    fn eq(&self, other: &Self) -> bool {
        self.class == other.class && same_f64(self.value, other.value)
    }
}

fn same_f64(a: f64, b: f64) -> bool {
    (a.is_nan() && b.is_nan()) || a == b
}

/// Accuracy assessment of one representation over the validation points.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccuracyReport {
    pub representation: Representation,
    pub matrix: ConfusionMatrix,
    #[serde(with = "nan_as_null")]
    pub overall_accuracy: f64,
    pub producers_accuracy: Vec<ClassAccuracy>,
    pub consumers_accuracy: Vec<ClassAccuracy>,
    /// Training rows actually used.
    pub training_points: usize,
    /// Validation rows that reached the matrix.
    pub validation_points: usize,
    /// Training points dropped as extraction gaps.
    pub omitted_training: usize,
    /// Validation points dropped as extraction gaps.
    pub omitted_validation: usize,
}

impl PartialEq for AccuracyReport {
    fn eq(&self, other: &Self) -> bool {
        self.representation == other.representation
            && self.matrix == other.matrix
            && same_f64(self.overall_accuracy, other.overall_accuracy)
            && self.producers_accuracy == other.producers_accuracy
            && self.consumers_accuracy == other.consumers_accuracy
            && self.training_points == other.training_points
            && self.validation_points == other.validation_points
            && self.omitted_training == other.omitted_training
            && self.omitted_validation == other.omitted_validation
    }
}

impl AccuracyReport {
    pub fn from_matrix(representation: Representation, matrix: ConfusionMatrix) -> Self {
        Self {
            representation,
            overall_accuracy: matrix.overall_accuracy(),
            producers_accuracy: matrix.producers_accuracy(),
            consumers_accuracy: matrix.consumers_accuracy(),
            validation_points: matrix.total() as usize,
            training_points: 0,
            omitted_training: 0,
            omitted_validation: 0,
            matrix,
        }
    }
}

/// JSON has no NaN: write it as null and read null back as NaN.
mod nan_as_null {
    use super::*;

    pub fn serialize<S: Serializer>(v: &f64, s: S) -> Result<S::Ok, S::Error> {
        if v.is_finite() {
            s.serialize_f64(*v)
        } else {
            s.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(d)?.unwrap_or(f64::NAN))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn matrix() -> ConfusionMatrix {
        // actual:    0 0 0 1 1 2
        // predicted: 0 0 1 1 2 2
        ConfusionMatrix::from_pairs(&[0, 0, 0, 1, 1, 2], &[0, 0, 1, 1, 2, 2], &[0, 1, 2, 3]).unwrap()
    }

    #[test]
    fn cells_and_totals() {
        let m = matrix();
        assert_eq!(m.classes(), [0, 1, 2, 3]);
        assert_eq!(m.get(0, 0), 2);
        assert_eq!(m.get(0, 1), 1);
        assert_eq!(m.get(1, 2), 1);
        assert_eq!(m.get(3, 3), 0);
        assert_eq!(m.get(9, 0), 0);
        assert_eq!(m.total(), 6);
        assert_eq!(m.diagonal(), 4);
        assert!(!m.is_diagonal());
    }

    #[test]
    fn overall_producers_consumers() {
        let m = matrix();
        assert_relative_eq!(m.overall_accuracy(), 4.0 / 6.0);

        let pa = m.producers_accuracy();
        assert_relative_eq!(pa[0].value, 2.0 / 3.0);
        assert_relative_eq!(pa[1].value, 0.5);
        assert_relative_eq!(pa[2].value, 1.0);
        assert!(pa[3].value.is_nan(), "empty row must be NaN, not zero");

        let ca = m.consumers_accuracy();
        assert_relative_eq!(ca[0].value, 1.0);
        assert_relative_eq!(ca[1].value, 0.5);
        assert_relative_eq!(ca[2].value, 0.5);
        assert!(ca[3].value.is_nan());
        assert_eq!(ca[3].class, 3);
    }

    #[test]
    fn axis_includes_unexpected_predictions() {
        let m = ConfusionMatrix::from_pairs(&[0, 1], &[0, 7], &[0, 1]).unwrap();
        assert_eq!(m.classes(), [0, 1, 7]);
        assert_eq!(m.get(1, 7), 1);
        assert!(m.producers_accuracy()[2].value.is_nan());
        assert_relative_eq!(m.consumers_accuracy()[2].value, 0.0);
    }

    #[test]
    fn empty_matrix_overall_is_nan() {
        let m = ConfusionMatrix::from_pairs(&[], &[], &[0, 1]).unwrap();
        assert_eq!(m.total(), 0);
        assert!(m.overall_accuracy().is_nan());
    }

    #[test]
    fn length_mismatch_is_rejected() {
        assert!(ConfusionMatrix::from_pairs(&[0, 1], &[0], &[]).is_err());
    }

    #[test]
    fn report_json_keeps_nan_as_null() {
        let report = AccuracyReport::from_matrix(Representation::Embedding, matrix());
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains(r#""class":3,"value":null"#));
        let back: AccuracyReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
    }

    #[test]
    fn display_lists_every_class() {
        let text = matrix().to_string();
        assert_eq!(text.lines().count(), 5);
        assert!(text.lines().next().unwrap().contains("act\\pred"));
    }

    proptest! {
        #[test]
        fn prop_overall_in_unit_interval(
            pairs in proptest::collection::vec((0_u8..5, 0_u8..5), 1..200)
        ) {
            let (a, p): (Vec<u8>, Vec<u8>) = pairs.into_iter().unzip();
            let m = ConfusionMatrix::from_pairs(&a, &p, &[]).unwrap();
            let oa = m.overall_accuracy();
            prop_assert!((0.0..=1.0).contains(&oa));
            prop_assert_eq!(m.total() as usize, a.len());
            prop_assert_eq!(oa == 1.0, m.is_diagonal());
        }
    }
}
