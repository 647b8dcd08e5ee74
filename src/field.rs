//! The calibrated temperature grid.

use ndarray::{Array2, ArrayView2};

use crate::{
    error::{Result, ThermalError},
    stats::Stats,
    units::TemperatureUnit,
};

/// A rows × cols grid of temperatures in a single unit.
///
/// Invalid cells hold `NaN`. The shape is fixed at
/// construction; transforms return new fields of the same
/// shape.
#[derive(Debug, Clone, PartialEq)]
pub struct TemperatureField {
    values: Array2<f64>,
    unit: TemperatureUnit,
}

impl TemperatureField {
    pub fn new(values: Array2<f64>) -> Self {
        Self::with_unit(values, TemperatureUnit::Celsius)
    }

    pub fn with_unit(values: Array2<f64>, unit: TemperatureUnit) -> Self {
        TemperatureField { values, unit }
    }

    /// Build from row-major values.
    pub fn from_shape_vec(rows: usize, cols: usize, values: Vec<f64>) -> Result<Self> {
        let found = values.len();
        let values = Array2::from_shape_vec((rows, cols), values).map_err(|_| {
            ThermalError::ShapeMismatch {
                what: "temperature values",
                expected: (rows, cols),
                found: (found, 1),
            }
        })?;
        Ok(Self::new(values))
    }

    pub fn filled(rows: usize, cols: usize, value: f64) -> Self {
        Self::new(Array2::from_elem((rows, cols), value))
    }

    pub fn rows(&self) -> usize {
        self.values.nrows()
    }

    pub fn cols(&self) -> usize {
        self.values.ncols()
    }

    /// `(rows, cols)`
    pub fn dim(&self) -> (usize, usize) {
        self.values.dim()
    }

    pub fn unit(&self) -> TemperatureUnit {
        self.unit
    }

    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        self.values.get((row, col)).copied()
    }

    pub fn at(&self, row: usize, col: usize) -> Result<f64> {
        self.get(row, col).ok_or(ThermalError::OutOfBounds {
            row,
            col,
            rows: self.rows(),
            cols: self.cols(),
        })
    }

    pub(crate) fn check_bounds(&self, row: usize, col: usize) -> Result<()> {
        self.at(row, col).map(|_| ())
    }

    pub fn is_valid(&self, row: usize, col: usize) -> bool {
        self.get(row, col).map_or(false, f64::is_finite)
    }

    pub fn invalid_count(&self) -> usize {
        self.values.iter().filter(|v| !v.is_finite()).count()
    }

    /// Row-major copy of the values.
    pub fn to_vec(&self) -> Vec<f64> {
        self.values.iter().copied().collect()
    }

    pub fn into_inner(self) -> Array2<f64> {
        self.values
    }

    /// Element-wise transform in parallel. The unit is kept.
    pub fn map_par<F>(&self, f: F) -> Self
    where
        F: Fn(f64) -> f64 + Sync + Send,
    {
        let mut values = self.values.clone();
        values.par_mapv_inplace(f);
        TemperatureField {
            values,
            unit: self.unit,
        }
    }

    /// The same field expressed in another unit.
    pub fn to_unit(&self, unit: TemperatureUnit) -> Self {
        if unit == self.unit {
            return self.clone();
        }
        let from = self.unit;
        let mut converted = self.map_par(move |v| unit.from_celsius(from.to_celsius(v)));
        converted.unit = unit;
        converted
    }

    /// Statistics over all finite cells, in row-major order.
    pub fn statistics(&self) -> Stats {
        let mut stats = Stats::default();
        for v in self.values.iter().filter(|v| v.is_finite()) {
            stats += *v;
        }
        stats
    }

    pub(crate) fn replace_values(&self, values: Array2<f64>) -> Self {
        debug_assert_eq!(values.dim(), self.values.dim());
        TemperatureField {
            values,
            unit: self.unit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_and_lookup() -> anyhow::Result<()> {
        let field = TemperatureField::from_shape_vec(2, 3, vec![1., 2., 3., 4., 5., 6.])?;
        assert_eq!(field.dim(), (2, 3));
        assert_eq!(field.at(1, 2)?, 6.);
        assert_eq!(
            field.at(2, 0),
            Err(ThermalError::OutOfBounds {
                row: 2,
                col: 0,
                rows: 2,
                cols: 3
            })
        );
        assert!(TemperatureField::from_shape_vec(2, 2, vec![1.]).is_err());
        Ok(())
    }

    #[test]
    fn invalid_cells_are_skipped() -> anyhow::Result<()> {
        let field = TemperatureField::from_shape_vec(1, 3, vec![30., f64::NAN, 32.])?;
        assert_eq!(field.invalid_count(), 1);
        assert!(!field.is_valid(0, 1));
        let stats = field.statistics();
        assert_eq!(stats.count(), 2);
        assert_eq!(stats.mean(), 31.);
        Ok(())
    }

    #[test]
    fn unit_conversion_keeps_shape() {
        let field = TemperatureField::filled(3, 4, 100.);
        let f = field.to_unit(TemperatureUnit::Fahrenheit);
        assert_eq!(f.dim(), (3, 4));
        assert_eq!(f.unit(), TemperatureUnit::Fahrenheit);
        assert_eq!(f.at(2, 3).unwrap(), 212.);
    }
}
