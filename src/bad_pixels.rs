//! Dead / outlier pixel detection and correction.
//!
//! A pixel is flagged when its value is not finite, or when
//! it deviates from the median of its finite 8-neighbours by
//! more than `threshold_sigma` robust standard deviations.
//! The spread is estimated across the whole grid as
//! `1.4826 × MAD` of those deviations, so that the outliers
//! being searched for do not inflate it.

use std::collections::BTreeSet;

use itertools::iproduct;
use ndarray::{Array2, ArrayView2, Zip};
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::{
    error::{Result, ThermalError},
    field::TemperatureField,
    metadata::QualityControl,
};

/// MAD to σ for normally distributed residuals.
const MAD_TO_SIGMA: f64 = 1.4826;

/// Flagged pixels as `(row, col)`, in row-major order.
pub type PixelSet = BTreeSet<(usize, usize)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Neighborhood {
    Four,
    Eight,
}

impl Default for Neighborhood {
    fn default() -> Self {
        Neighborhood::Eight
    }
}

impl Neighborhood {
    fn contains(self, dr: isize, dc: isize) -> bool {
        match self {
            Neighborhood::Four => (dr == 0) != (dc == 0),
            Neighborhood::Eight => dr != 0 || dc != 0,
        }
    }

    /// In-grid neighbours of `(row, col)`.
    fn around(
        self,
        row: usize,
        col: usize,
        (rows, cols): (usize, usize),
    ) -> impl Iterator<Item = (usize, usize)> {
        iproduct!(-1isize..=1, -1isize..=1)
            .filter(move |&(dr, dc)| self.contains(dr, dc))
            .filter_map(move |(dr, dc)| {
                let r = row as isize + dr;
                let c = col as isize + dc;
                (r >= 0 && c >= 0 && (r as usize) < rows && (c as usize) < cols)
                    .then(|| (r as usize, c as usize))
            })
    }
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.
    } else {
        values[mid]
    })
}

/// Deviation of every finite pixel from its local median.
/// `NaN` where undefined.
fn local_residuals(values: ArrayView2<'_, f64>) -> Array2<f64> {
    let dim = values.dim();
    Zip::indexed(values).par_map_collect(|(row, col), &v| {
        if !v.is_finite() {
            return f64::NAN;
        }
        let mut neighbours: Vec<f64> = Neighborhood::Eight
            .around(row, col, dim)
            .map(|idx| values[idx])
            .filter(|n| n.is_finite())
            .collect();
        median(&mut neighbours).map_or(f64::NAN, |m| v - m)
    })
}

fn robust_sigma(residuals: &Array2<f64>) -> f64 {
    let mut finite: Vec<f64> = residuals.iter().copied().filter(|r| r.is_finite()).collect();
    let center = match median(&mut finite) {
        Some(m) => m,
        None => return 0.,
    };
    let mut deviations: Vec<f64> = finite.iter().map(|r| (r - center).abs()).collect();
    let mad = median(&mut deviations).unwrap_or(0.);
    if mad > 0. {
        return MAD_TO_SIGMA * mad;
    }
    let n = finite.len() as f64;
    let mean = finite.iter().sum::<f64>() / n;
    (finite.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n).sqrt()
}

/// Flag non-finite and outlier pixels.
pub fn detect_bad_pixels(field: &TemperatureField, threshold_sigma: f64) -> Result<PixelSet> {
    if !(threshold_sigma > 0. && threshold_sigma.is_finite()) {
        return Err(ThermalError::InvalidParameter {
            name: "threshold_sigma",
            value: threshold_sigma,
            expected: "a finite threshold > 0",
        });
    }

    let residuals = local_residuals(field.view());
    let sigma = robust_sigma(&residuals);
    let limit = threshold_sigma * sigma;

    let flagged: PixelSet = field
        .view()
        .indexed_iter()
        .filter(|&(idx, v)| {
            if !v.is_finite() {
                return true;
            }
            let r = residuals[idx];
            sigma > 0. && r.is_finite() && r.abs() > limit
        })
        .map(|(idx, _)| idx)
        .collect();

    debug!(sigma, limit, flagged = flagged.len(), "bad pixel detection");
    Ok(flagged)
}

/// Result of a correction pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Correction {
    pub field: TemperatureField,
    /// Pixels that were replaced.
    pub corrected: usize,
    /// Flagged pixels without a valid neighbour, left as-is.
    pub unrecoverable: Vec<(usize, usize)>,
}

impl Correction {
    /// Total flagged pixels (corrected or not).
    pub fn flagged(&self) -> usize {
        self.corrected + self.unrecoverable.len()
    }

    /// Fail with the first unrecoverable pixel, if any.
    pub fn into_result(self) -> Result<TemperatureField> {
        match self.unrecoverable.first() {
            Some(&(row, col)) => Err(ThermalError::Correction { row, col }),
            None => Ok(self.field),
        }
    }

    /// Record the bad-pixel count in quality control.
    pub fn record_into(&self, qc: &mut QualityControl) {
        qc.bad_pixel_count = Some(self.flagged() as u32);
    }
}

/// Replace flagged pixels with the mean of their valid
/// 8-neighbours.
pub fn correct(field: &TemperatureField, bad_pixels: &PixelSet) -> Result<Correction> {
    correct_with(field, bad_pixels, Neighborhood::Eight)
}

/// Replace flagged pixels with the mean of their valid
/// neighbours. A neighbour is valid when it is finite and
/// not itself flagged; replacements only read the input
/// field.
pub fn correct_with(
    field: &TemperatureField,
    bad_pixels: &PixelSet,
    neighborhood: Neighborhood,
) -> Result<Correction> {
    for &(row, col) in bad_pixels {
        field.check_bounds(row, col)?;
    }
    if bad_pixels.is_empty() {
        return Ok(Correction {
            field: field.clone(),
            corrected: 0,
            unrecoverable: vec![],
        });
    }

    let values = field.view();
    let dim = field.dim();
    let flagged: Vec<(usize, usize)> = bad_pixels.iter().copied().collect();
    let replacements: Vec<Option<f64>> = flagged
        .par_iter()
        .map(|&(row, col)| {
            let (sum, count) = neighborhood
                .around(row, col, dim)
                .filter(|idx| !bad_pixels.contains(idx))
                .map(|idx| values[idx])
                .filter(|v| v.is_finite())
                .fold((0., 0usize), |(s, n), v| (s + v, n + 1));
            (count > 0).then(|| sum / count as f64)
        })
        .collect();

    let mut out = values.to_owned();
    let mut unrecoverable = vec![];
    let mut corrected = 0;
    for (&(row, col), replacement) in flagged.iter().zip(replacements) {
        match replacement {
            Some(v) => {
                out[(row, col)] = v;
                corrected += 1;
            }
            None => unrecoverable.push((row, col)),
        }
    }
    if !unrecoverable.is_empty() {
        warn!(count = unrecoverable.len(), "bad pixels without valid neighbours");
    }

    Ok(Correction {
        field: field.replace_values(out),
        corrected,
        unrecoverable,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(rows: usize, cols: usize) -> TemperatureField {
        let values = Array2::from_shape_fn((rows, cols), |(r, c)| {
            30. + 0.1 * r as f64 + 0.05 * c as f64 + 0.01 * ((r * 7 + c * 3) % 5) as f64
        });
        TemperatureField::new(values)
    }

    #[test]
    fn finds_hot_and_dead_pixels() -> anyhow::Result<()> {
        let mut values = gradient(16, 16).into_inner();
        values[(5, 7)] = 80.;
        values[(10, 2)] = f64::NAN;
        values[(0, 0)] = -10.;
        let field = TemperatureField::new(values);

        let bad = detect_bad_pixels(&field, 5.)?;
        assert!(bad.contains(&(5, 7)));
        assert!(bad.contains(&(10, 2)));
        assert!(bad.contains(&(0, 0)));
        assert_eq!(bad.len(), 3, "{:?}", bad);
        Ok(())
    }

    #[test]
    fn uniform_field_is_clean() -> anyhow::Result<()> {
        let field = TemperatureField::filled(8, 8, 33.);
        assert!(detect_bad_pixels(&field, 3.)?.is_empty());
        assert!(detect_bad_pixels(&field, 0.).is_err());
        Ok(())
    }

    #[test]
    fn correcting_nothing_is_identity() -> anyhow::Result<()> {
        let field = gradient(6, 5);
        let out = correct(&field, &PixelSet::new())?;
        assert_eq!(out.field, field);
        assert_eq!(out.flagged(), 0);
        Ok(())
    }

    #[test]
    fn replaces_with_neighbour_mean() -> anyhow::Result<()> {
        let mut values = Array2::from_elem((3, 3), 30.);
        values[(0, 1)] = 32.;
        values[(1, 1)] = 90.;
        let field = TemperatureField::new(values);
        let bad: PixelSet = [(1, 1)].iter().copied().collect();

        let eight = correct(&field, &bad)?.into_result()?;
        assert!((eight.at(1, 1)? - (30. * 7. + 32.) / 8.).abs() < 1e-12);

        let four = correct_with(&field, &bad, Neighborhood::Four)?.into_result()?;
        assert!((four.at(1, 1)? - (30. * 3. + 32.) / 4.).abs() < 1e-12);
        // untouched elsewhere
        assert_eq!(four.at(0, 1)?, 32.);
        Ok(())
    }

    #[test]
    fn reports_unrecoverable_pixels() -> anyhow::Result<()> {
        let field = TemperatureField::from_shape_vec(1, 2, vec![f64::NAN, f64::NAN])?;
        let bad = detect_bad_pixels(&field, 3.)?;
        assert_eq!(bad.len(), 2);

        let outcome = correct(&field, &bad)?;
        assert_eq!(outcome.unrecoverable, vec![(0, 0), (0, 1)]);
        assert!(outcome.field.at(0, 0)?.is_nan());

        let mut qc = QualityControl::default();
        outcome.record_into(&mut qc);
        assert_eq!(qc.bad_pixel_count, Some(2));

        assert_eq!(
            outcome.into_result(),
            Err(ThermalError::Correction { row: 0, col: 0 })
        );
        Ok(())
    }

    #[test]
    fn rejects_pixels_outside_grid() {
        let field = TemperatureField::filled(2, 2, 30.);
        let bad: PixelSet = [(2, 0)].iter().copied().collect();
        assert!(matches!(
            correct(&field, &bad),
            Err(ThermalError::OutOfBounds { .. })
        ));
    }
}
