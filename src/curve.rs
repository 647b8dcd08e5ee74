//! Empirical correction curves fitted against reference
//! blackbody measurements.

use serde_derive::*;
use tracing::debug;

use crate::{
    error::{Result, ThermalError},
    field::TemperatureField,
};

/// How measured values are mapped to reference values.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CurveFit {
    /// Interpolate between the calibration points, extending
    /// the first / last segment beyond them.
    PiecewiseLinear,
    /// Least-squares line `reference = offset + slope * measured`.
    Linear { offset: f64, slope: f64 },
}

/// Correction from camera readings to reference
/// temperatures.
///
/// Points are `(reference, measured)` pairs sorted by
/// strictly increasing reference.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CalibrationCurve {
    points: Vec<(f64, f64)>,
    fit: CurveFit,
}

/// Fit a monotonic correction from paired readings.
///
/// Pairs are sorted by reference value; repeated references
/// are merged by averaging their measured values. When the
/// measured values increase along with the reference the
/// curve interpolates the points exactly, otherwise a
/// least-squares line is used, which must have a positive
/// slope.
pub fn create_calibration_curve(reference: &[f64], measured: &[f64]) -> Result<CalibrationCurve> {
    if reference.len() != measured.len() {
        return Err(ThermalError::InvalidParameter {
            name: "measured",
            value: measured.len() as f64,
            expected: "as many measured values as reference values",
        });
    }
    if let Some(bad) = reference.iter().chain(measured).find(|v| !v.is_finite()) {
        return Err(ThermalError::InvalidParameter {
            name: "calibration_point",
            value: *bad,
            expected: "finite temperatures",
        });
    }

    let mut pairs: Vec<(f64, f64)> = reference.iter().copied().zip(measured.iter().copied()).collect();
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut points: Vec<(f64, f64)> = Vec::with_capacity(pairs.len());
    let mut merged = 1usize;
    for (r, m) in pairs {
        match points.last_mut() {
            Some(last) if last.0 == r => {
                merged += 1;
                last.1 += (m - last.1) / merged as f64;
            }
            _ => {
                merged = 1;
                points.push((r, m));
            }
        }
    }

    if points.len() < 2 {
        return Err(ThermalError::InsufficientData {
            distinct: points.len(),
        });
    }

    let fit = if points.windows(2).all(|w| w[1].1 > w[0].1) {
        CurveFit::PiecewiseLinear
    } else {
        let (offset, slope) = least_squares(&points);
        if !(slope > 0.) {
            return Err(ThermalError::InvalidParameter {
                name: "measured",
                value: slope,
                expected: "readings that increase with the reference temperature",
            });
        }
        CurveFit::Linear { offset, slope }
    };
    debug!(points = points.len(), ?fit, "fitted calibration curve");

    Ok(CalibrationCurve { points, fit })
}

// reference = offset + slope * measured
fn least_squares(points: &[(f64, f64)]) -> (f64, f64) {
    let n = points.len() as f64;
    let mean_m = points.iter().map(|p| p.1).sum::<f64>() / n;
    let mean_r = points.iter().map(|p| p.0).sum::<f64>() / n;
    let (mut sxy, mut sxx) = (0., 0.);
    for (r, m) in points {
        sxy += (m - mean_m) * (r - mean_r);
        sxx += (m - mean_m) * (m - mean_m);
    }
    let slope = if sxx > 0. { sxy / sxx } else { 0. };
    (mean_r - slope * mean_m, slope)
}

impl CalibrationCurve {
    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }

    pub fn fit(&self) -> CurveFit {
        self.fit
    }

    /// Measured range covered by the calibration points.
    pub fn measured_range(&self) -> (f64, f64) {
        let first = self.points[0].1;
        let last = self.points[self.points.len() - 1].1;
        (first.min(last), first.max(last))
    }

    /// Corrected temperature for a camera reading.
    pub fn evaluate(&self, measured: f64) -> f64 {
        match self.fit {
            CurveFit::Linear { offset, slope } => offset + slope * measured,
            CurveFit::PiecewiseLinear => {
                let n = self.points.len();
                // index of the segment to use, boundary segments
                // extend past the ends
                let idx = self
                    .points
                    .partition_point(|p| p.1 <= measured)
                    .clamp(1, n - 1);
                let (r0, m0) = self.points[idx - 1];
                let (r1, m1) = self.points[idx];
                r0 + (measured - m0) * (r1 - r0) / (m1 - m0)
            }
        }
    }

    /// Root mean square of `evaluate(measured) - reference`
    /// over the calibration points.
    pub fn rms_residual(&self) -> f64 {
        let sum: f64 = self
            .points
            .iter()
            .map(|(r, m)| (self.evaluate(*m) - r).powi(2))
            .sum();
        (sum / self.points.len() as f64).sqrt()
    }
}

/// Apply a curve to every cell. `NaN` cells stay `NaN`.
pub fn apply_curve(curve: &CalibrationCurve, field: &TemperatureField) -> TemperatureField {
    field.map_par(|v| curve.evaluate(v))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn curve_preserves_ordering() -> anyhow::Result<()> {
        let curve = create_calibration_curve(&[25., 30., 35., 40.], &[25.1, 29.9, 35.2, 39.8])?;
        assert_eq!(curve.fit(), CurveFit::PiecewiseLinear);
        assert!(curve.evaluate(30.) < curve.evaluate(35.));
        assert!((curve.evaluate(29.9) - 30.).abs() < 1e-12);
        assert!(curve.rms_residual() < 1e-12);
        Ok(())
    }

    #[test]
    fn extrapolates_boundary_segments() -> anyhow::Result<()> {
        let curve = create_calibration_curve(&[20., 30., 40.], &[21., 30., 39.])?;
        // first segment: slope 10/9 through (21, 20)
        let below = curve.evaluate(12.);
        assert!((below - (20. - 9. * 10. / 9.)).abs() < 1e-9);
        let above = curve.evaluate(48.);
        assert!((above - (40. + 9. * 10. / 9.)).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn falls_back_to_linear_fit() -> anyhow::Result<()> {
        // measured not strictly increasing: 30.2 then 30.1
        let curve = create_calibration_curve(&[25., 30., 31., 40.], &[25., 30.2, 30.1, 40.])?;
        match curve.fit() {
            CurveFit::Linear { slope, .. } => assert!(slope > 0.),
            other => panic!("unexpected fit {:?}", other),
        }
        assert!(curve.evaluate(30.) < curve.evaluate(35.));
        assert!(curve.rms_residual() > 0.);
        Ok(())
    }

    #[test]
    fn sorts_and_merges_points() -> anyhow::Result<()> {
        let curve = create_calibration_curve(&[35., 25., 35.], &[35.4, 25., 35.2])?;
        assert_eq!(curve.points().len(), 2);
        assert_eq!(curve.points()[0], (25., 25.));
        assert!((curve.points()[1].1 - 35.3).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn degenerate_input() {
        assert_eq!(
            create_calibration_curve(&[30., 30.], &[30.1, 29.9]),
            Err(ThermalError::InsufficientData { distinct: 1 })
        );
        assert_eq!(
            create_calibration_curve(&[], &[]),
            Err(ThermalError::InsufficientData { distinct: 0 })
        );
        assert!(create_calibration_curve(&[1., 2.], &[1.]).is_err());
        assert!(create_calibration_curve(&[1., 2.], &[1., f64::NAN]).is_err());
        assert!(create_calibration_curve(&[20., 30., 40.], &[40., 30., 20.]).is_err());
    }

    #[test]
    fn applies_to_fields() -> anyhow::Result<()> {
        let curve = create_calibration_curve(&[20., 40.], &[21., 41.])?;
        let field = TemperatureField::from_shape_vec(1, 3, vec![21., 31., f64::NAN])?;
        let out = apply_curve(&curve, &field);
        assert_eq!(out.at(0, 0)?, 20.);
        assert_eq!(out.at(0, 1)?, 30.);
        assert!(out.at(0, 2)?.is_nan());
        Ok(())
    }
}
