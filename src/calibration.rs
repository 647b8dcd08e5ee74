//! Emissivity, reflection and atmosphere correction.
//!
//! The sensor sees a mix of object, reflected and
//! atmospheric radiance:
//!
//! ```text
//! apparent = E·τ·object + (1-E)·τ·reflected + (1-τ)·atmosphere
//! ```
//!
//! [`calibrate`] solves this for the object radiance at every
//! pixel and converts it back to a temperature. Radiances
//! are computed with [`PlanckConstants`] and `τ` with
//! [`AtmosphericModel`].

use ndarray::Array2;
use serde_derive::*;
use tracing::debug;

use crate::{
    error::{Result, ThermalError},
    field::TemperatureField,
    radiometry::{AtmosphericModel, PlanckConstants},
    units::TemperatureUnit,
};

/// Accepted range (°C) for ambient, reflected and
/// atmospheric temperatures.
pub const ENVIRONMENT_TEMPERATURE_RANGE: (f64, f64) = (-50., 100.);

/// Scene parameters for the radiometric correction.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CalibrationParameters {
    pub emissivity: f64,
    /// Meters.
    #[serde(alias = "distance")]
    pub distance_from_camera: f64,
    /// °C
    pub ambient_temperature: f64,
    /// °C, defaults to the ambient temperature.
    #[serde(default)]
    pub reflected_temperature: Option<f64>,
    /// Percent.
    #[serde(default = "default_humidity")]
    pub relative_humidity: f64,
    /// °C, defaults to the ambient temperature.
    #[serde(default)]
    pub atmospheric_temperature: Option<f64>,
}

fn default_humidity() -> f64 {
    50.
}

impl CalibrationParameters {
    pub fn new(emissivity: f64, distance_from_camera: f64, ambient_temperature: f64) -> Self {
        CalibrationParameters {
            emissivity,
            distance_from_camera,
            ambient_temperature,
            reflected_temperature: None,
            relative_humidity: default_humidity(),
            atmospheric_temperature: None,
        }
    }

    pub fn with_reflected_temperature(mut self, temp: f64) -> Self {
        self.reflected_temperature = Some(temp);
        self
    }

    pub fn with_relative_humidity(mut self, humidity: f64) -> Self {
        self.relative_humidity = humidity;
        self
    }

    pub fn with_atmospheric_temperature(mut self, temp: f64) -> Self {
        self.atmospheric_temperature = Some(temp);
        self
    }

    pub fn reflected(&self) -> f64 {
        self.reflected_temperature.unwrap_or(self.ambient_temperature)
    }

    pub fn atmospheric(&self) -> f64 {
        self.atmospheric_temperature.unwrap_or(self.ambient_temperature)
    }

    /// Check every parameter against its documented range.
    pub fn validate(&self) -> Result<()> {
        check_emissivity(self.emissivity)?;
        check_distance(self.distance_from_camera)?;
        check_humidity(self.relative_humidity)?;
        check_environment_temperature("ambient_temperature", self.ambient_temperature)?;
        if let Some(t) = self.reflected_temperature {
            check_environment_temperature("reflected_temperature", t)?;
        }
        if let Some(t) = self.atmospheric_temperature {
            check_environment_temperature("atmospheric_temperature", t)?;
        }
        Ok(())
    }
}

pub(crate) fn check_emissivity(value: f64) -> Result<()> {
    if value > 0. && value <= 1. {
        Ok(())
    } else {
        Err(ThermalError::InvalidParameter {
            name: "emissivity",
            value,
            expected: "a value in (0, 1]",
        })
    }
}

pub(crate) fn check_distance(value: f64) -> Result<()> {
    if value > 0. && value.is_finite() {
        Ok(())
    } else {
        Err(ThermalError::InvalidParameter {
            name: "distance_from_camera",
            value,
            expected: "a finite distance > 0 m",
        })
    }
}

pub(crate) fn check_humidity(value: f64) -> Result<()> {
    if (0. ..=100.).contains(&value) {
        Ok(())
    } else {
        Err(ThermalError::InvalidParameter {
            name: "relative_humidity",
            value,
            expected: "a percentage in [0, 100]",
        })
    }
}

pub(crate) fn check_environment_temperature(name: &'static str, value: f64) -> Result<()> {
    let (lo, hi) = ENVIRONMENT_TEMPERATURE_RANGE;
    if (lo..=hi).contains(&value) {
        Ok(())
    } else {
        Err(ThermalError::InvalidParameter {
            name,
            value,
            expected: "a temperature in [-50, 100] °C",
        })
    }
}

/// Camera model used by the correction.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq)]
pub struct Calibrator {
    #[serde(flatten)]
    pub planck: PlanckConstants,
    #[serde(flatten)]
    pub atmosphere: AtmosphericModel,
}

/// Per-image affine correction in radiance space:
/// `object = coeffs[0] + coeffs[1] * apparent`.
#[derive(Debug, Clone, Copy)]
struct RadianceCorrection {
    coeffs: [f64; 2],
}

impl RadianceCorrection {
    #[inline]
    fn apply(&self, apparent: f64) -> f64 {
        self.coeffs[0] + self.coeffs[1] * apparent
    }
}

impl Calibrator {
    pub fn new(planck: PlanckConstants, atmosphere: AtmosphericModel) -> Self {
        Calibrator { planck, atmosphere }
    }

    /// Atmospheric transmission for the given scene.
    pub fn transmission(&self, params: &CalibrationParameters) -> f64 {
        self.atmosphere.transmission(
            params.distance_from_camera,
            params.relative_humidity,
            params.atmospheric(),
        )
    }

    fn radiance_correction(&self, params: &CalibrationParameters) -> Result<RadianceCorrection> {
        params.validate()?;

        let tau = self.transmission(params);
        if !(tau > 0. && tau.is_finite()) {
            return Err(ThermalError::InvalidParameter {
                name: "distance_from_camera",
                value: params.distance_from_camera,
                expected: "a distance with positive atmospheric transmission",
            });
        }
        let e = params.emissivity;

        // (1-E)·τ·reflected, exactly zero for a blackbody
        let refl = (1. - e) * tau * self.planck.temp_to_raw(params.reflected());
        // (1-τ)·atmosphere
        let atm = (1. - tau) * self.planck.temp_to_raw(params.atmospheric());

        let scale = 1. / (e * tau);
        debug!(
            emissivity = e,
            transmission = tau,
            reflected_raw = refl,
            atmospheric_raw = atm,
            "radiometric correction"
        );

        Ok(RadianceCorrection {
            coeffs: [-(refl + atm) * scale, scale],
        })
    }

    /// Object temperature (°C) for a raw apparent radiance.
    pub fn counts_transform(
        &self,
        params: &CalibrationParameters,
    ) -> Result<impl Fn(f64) -> f64 + Sync + Send> {
        let correction = self.radiance_correction(params)?;
        let planck = self.planck;
        Ok(move |raw: f64| planck.raw_to_temp(correction.apply(raw)))
    }

    /// Object temperature (°C) for an apparent temperature (°C).
    pub fn temperature_transform(
        &self,
        params: &CalibrationParameters,
    ) -> Result<impl Fn(f64) -> f64 + Sync + Send> {
        let correction = self.radiance_correction(params)?;
        let planck = self.planck;
        Ok(move |apparent: f64| {
            if !apparent.is_finite() {
                return f64::NAN;
            }
            planck.raw_to_temp(correction.apply(planck.temp_to_raw(apparent)))
        })
    }

    /// Correct a field of apparent temperatures. The result
    /// is in the unit of the input.
    pub fn calibrate(
        &self,
        raw: &TemperatureField,
        params: &CalibrationParameters,
    ) -> Result<TemperatureField> {
        let transform = self.temperature_transform(params)?;
        let unit = raw.unit();
        debug!(rows = raw.rows(), cols = raw.cols(), ?unit, "calibrating field");
        Ok(raw.map_par(move |v| unit.from_celsius(transform(unit.to_celsius(v)))))
    }

    /// Correct raw sensor counts, producing temperatures in
    /// celsius.
    pub fn calibrate_counts(
        &self,
        counts: &Array2<f64>,
        params: &CalibrationParameters,
    ) -> Result<TemperatureField> {
        let transform = self.counts_transform(params)?;
        let mut values = counts.clone();
        values.par_mapv_inplace(|raw| {
            if raw.is_finite() {
                transform(raw)
            } else {
                f64::NAN
            }
        });
        Ok(TemperatureField::with_unit(values, TemperatureUnit::Celsius))
    }
}

/// [`Calibrator::calibrate`] with the default camera model.
pub fn calibrate(
    raw: &TemperatureField,
    params: &CalibrationParameters,
) -> Result<TemperatureField> {
    Calibrator::default().calibrate(raw, params)
}

/// [`Calibrator::calibrate_counts`] with the default camera
/// model.
pub fn calibrate_counts(
    counts: &Array2<f64>,
    params: &CalibrationParameters,
) -> Result<TemperatureField> {
    Calibrator::default().calibrate_counts(counts, params)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> CalibrationParameters {
        CalibrationParameters::new(0.98, 1.0, 22.0)
    }

    #[test]
    fn warm_object_reads_warmer_after_correction() -> anyhow::Result<()> {
        let raw = TemperatureField::filled(4, 4, 36.0);
        let out = calibrate(&raw, &params())?;
        for v in out.view().iter() {
            assert!(*v > 36.0, "{}", v);
        }
        Ok(())
    }

    #[test]
    fn blackbody_ignores_reflections() -> anyhow::Result<()> {
        let raw = TemperatureField::from_shape_vec(2, 2, vec![30., 33., 36., 39.])?;
        let base = CalibrationParameters::new(1.0, 2.0, 22.0);
        let cold = calibrate(&raw, &base.with_reflected_temperature(-20.))?;
        let hot = calibrate(&raw, &base.with_reflected_temperature(80.))?;
        assert_eq!(cold, hot);
        Ok(())
    }

    #[test]
    fn identity_without_losses() -> anyhow::Result<()> {
        // E = 1 and RH = 0 at close range: nearly nothing to correct
        let raw = TemperatureField::filled(2, 2, 34.0);
        let p = CalibrationParameters::new(1.0, 1e-6, 22.0).with_relative_humidity(0.);
        let out = calibrate(&raw, &p)?;
        assert!((out.at(0, 0)? - 34.0).abs() < 1e-3);
        Ok(())
    }

    #[test]
    fn rejects_out_of_range_parameters() {
        let raw = TemperatureField::filled(1, 1, 30.);
        let cases = [
            (CalibrationParameters::new(0.0, 1.0, 22.0), "emissivity"),
            (CalibrationParameters::new(1.2, 1.0, 22.0), "emissivity"),
            (CalibrationParameters::new(0.98, 0.0, 22.0), "distance_from_camera"),
            (CalibrationParameters::new(0.98, -1.0, 22.0), "distance_from_camera"),
            (
                CalibrationParameters::new(0.98, 1.0, 22.0).with_relative_humidity(120.),
                "relative_humidity",
            ),
            (CalibrationParameters::new(0.98, 1.0, 400.0), "ambient_temperature"),
            (
                CalibrationParameters::new(0.98, 2000.0, 40.0).with_relative_humidity(100.),
                "distance_from_camera",
            ),
        ];
        for (p, field) in cases.iter() {
            match calibrate(&raw, p) {
                Err(ThermalError::InvalidParameter { name, .. }) => assert_eq!(name, *field),
                other => panic!("expected failure for {}: {:?}", field, other),
            }
        }
    }

    #[test]
    fn keeps_input_unit_and_invalid_cells() -> anyhow::Result<()> {
        let raw = TemperatureField::from_shape_vec(1, 2, vec![36.0, f64::NAN])?
            .to_unit(TemperatureUnit::Fahrenheit);
        let out = calibrate(&raw, &params())?;
        assert_eq!(out.unit(), TemperatureUnit::Fahrenheit);
        assert!(out.at(0, 0)? > 96.8);
        assert!(out.at(0, 1)?.is_nan());
        Ok(())
    }

    #[test]
    fn counts_and_temperatures_agree() -> anyhow::Result<()> {
        let calibrator = Calibrator::default();
        let raw = calibrator.planck.temp_to_raw(36.0);
        let counts = Array2::from_elem((2, 2), raw);
        let from_counts = calibrator.calibrate_counts(&counts, &params())?;
        let from_temps = calibrator.calibrate(&TemperatureField::filled(2, 2, 36.0), &params())?;
        assert!((from_counts.at(1, 1)? - from_temps.at(1, 1)?).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn parameters_from_json() -> anyhow::Result<()> {
        let p: CalibrationParameters = serde_json::from_str(
            r#"{"emissivity": 0.98, "distance": 1.5, "ambient_temperature": 21.0}"#,
        )?;
        assert_eq!(p.distance_from_camera, 1.5);
        assert_eq!(p.reflected(), 21.0);
        assert_eq!(p.relative_humidity, 50.);
        assert!(serde_json::from_str::<CalibrationParameters>(
            r#"{"emissivity": 0.98, "distance": 1.5, "ambient_temperature": 21.0, "colour": 1}"#
        )
        .is_err());
        Ok(())
    }
}
