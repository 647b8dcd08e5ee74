//! Temperature units and linear scales between sensor
//! counts and physical values.

use serde_derive::*;

use crate::error::{Result, ThermalError};

pub const CELSIUS_OFFSET: f64 = 273.15;

/// Lowest representable temperature, in celsius.
pub const ABSOLUTE_ZERO_CELSIUS: f64 = -CELSIUS_OFFSET;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureUnit {
    Celsius,
    Fahrenheit,
    Kelvin,
}

impl Default for TemperatureUnit {
    fn default() -> Self {
        TemperatureUnit::Celsius
    }
}

impl TemperatureUnit {
    /// Code string written into the dataset (CS).
    pub fn code(self) -> &'static str {
        match self {
            TemperatureUnit::Celsius => "CELSIUS",
            TemperatureUnit::Fahrenheit => "FAHRENHEIT",
            TemperatureUnit::Kelvin => "KELVIN",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "CELSIUS" => Some(TemperatureUnit::Celsius),
            "FAHRENHEIT" => Some(TemperatureUnit::Fahrenheit),
            "KELVIN" => Some(TemperatureUnit::Kelvin),
            _ => None,
        }
    }

    pub fn to_celsius(self, value: f64) -> f64 {
        match self {
            TemperatureUnit::Celsius => value,
            TemperatureUnit::Fahrenheit => fahrenheit_to_celsius(value),
            TemperatureUnit::Kelvin => kelvin_to_celsius(value),
        }
    }

    pub fn from_celsius(self, value: f64) -> f64 {
        match self {
            TemperatureUnit::Celsius => value,
            TemperatureUnit::Fahrenheit => celsius_to_fahrenheit(value),
            TemperatureUnit::Kelvin => celsius_to_kelvin(value),
        }
    }
}

#[inline]
pub fn celsius_to_kelvin(c: f64) -> f64 {
    c + CELSIUS_OFFSET
}

#[inline]
pub fn kelvin_to_celsius(k: f64) -> f64 {
    k - CELSIUS_OFFSET
}

#[inline]
pub fn celsius_to_fahrenheit(c: f64) -> f64 {
    c * 9. / 5. + 32.
}

#[inline]
pub fn fahrenheit_to_celsius(f: f64) -> f64 {
    (f - 32.) * 5. / 9.
}

/// Convert `value` between two units.
pub fn convert(value: f64, from: TemperatureUnit, to: TemperatureUnit) -> f64 {
    if from == to {
        return value;
    }
    to.from_celsius(from.to_celsius(value))
}

/// Affine map `V = offset + slope * x`.
///
/// Used to normalize raw sensor counts into physical units
/// (when the camera publishes a linear count range) and to
/// quantize temperatures for display.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct LinearScale {
    pub offset: f64,
    pub slope: f64,
}

impl LinearScale {
    /// Scale mapping `[from_min, from_max]` onto `[to_min, to_max]`.
    pub fn between(from_min: f64, from_max: f64, to_min: f64, to_max: f64) -> Result<Self> {
        let span = from_max - from_min;
        if !(span.is_finite() && span > 0.) {
            return Err(ThermalError::InvalidParameter {
                name: "scale_range",
                value: span,
                expected: "a finite, strictly increasing source range",
            });
        }
        let slope = (to_max - to_min) / span;
        Ok(LinearScale {
            offset: to_min - from_min * slope,
            slope,
        })
    }

    #[inline]
    pub fn apply(&self, x: f64) -> f64 {
        self.offset + self.slope * x
    }

    /// The inverse map (`C = -offset/slope + 1/slope V`).
    pub fn inverse(&self) -> Self {
        LinearScale {
            offset: -self.offset / self.slope,
            slope: 1. / self.slope,
        }
    }

    /// Apply and clamp to the `u16` range.
    pub fn apply_u16(&self, x: f64) -> u16 {
        self.apply(x).max(0.).min(u16::MAX as f64) as u16
    }
}

/// Normalize raw sensor counts, given the count range the
/// detector reports for a known temperature span.
pub fn normalize_counts(
    raw: f64,
    raw_range: (f64, f64),
    temperature_range: (f64, f64),
) -> Result<f64> {
    let scale = LinearScale::between(
        raw_range.0,
        raw_range.1,
        temperature_range.0,
        temperature_range.1,
    )?;
    Ok(scale.apply(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_conversions() {
        assert_eq!(celsius_to_kelvin(0.), 273.15);
        assert_eq!(celsius_to_fahrenheit(100.), 212.);
        assert!((fahrenheit_to_celsius(98.6) - 37.).abs() < 1e-9);
        assert_eq!(
            convert(37., TemperatureUnit::Celsius, TemperatureUnit::Celsius),
            37.
        );
        let k = convert(98.6, TemperatureUnit::Fahrenheit, TemperatureUnit::Kelvin);
        assert!((k - 310.15).abs() < 1e-9);
    }

    #[test]
    fn unit_codes() {
        for unit in [
            TemperatureUnit::Celsius,
            TemperatureUnit::Fahrenheit,
            TemperatureUnit::Kelvin,
        ] {
            assert_eq!(TemperatureUnit::from_code(unit.code()), Some(unit));
        }
        assert_eq!(TemperatureUnit::from_code("RANKINE"), None);
    }

    #[test]
    fn scale_and_inverse() -> anyhow::Result<()> {
        let scale = LinearScale::between(20., 40., 0., u16::MAX as f64)?;
        assert_eq!(scale.apply_u16(20.), 0);
        assert_eq!(scale.apply_u16(40.), u16::MAX);
        assert_eq!(scale.apply_u16(100.), u16::MAX);
        let back = scale.inverse();
        assert!((back.apply(scale.apply(31.5)) - 31.5).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn counts_normalization() -> anyhow::Result<()> {
        let t = normalize_counts(8192., (0., 16384.), (-20., 120.))?;
        assert!((t - 50.).abs() < 1e-9);
        assert!(normalize_counts(1., (10., 10.), (0., 1.)).is_err());
        Ok(())
    }
}
