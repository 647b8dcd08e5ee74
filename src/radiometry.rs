//! Planck and atmospheric transmission model.
//!
//! Radiance is expressed in camera raw units using the
//! FLIR Planck parameterisation, as in the [Thermimage R
//! library]:
//!
//! ```text
//! raw  = R1 / (R2 * (exp(B / T) - F)) - O
//! T    = B / ln(R1 / (R2 * (raw + O)) + F)
//! ```
//!
//! with `T` in kelvin. Atmospheric transmission follows the
//! empirical model from Minkina and Dudzik's *Infrared
//! Thermography*, evaluated over two half paths.
//!
//! [Thermimage R library]: //github.com/gtatters/Thermimage/blob/master/R/raw2temp.R

use serde_derive::*;

use crate::units::CELSIUS_OFFSET;

/// Planck constants of a radiometric camera.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct PlanckConstants {
    #[serde(rename = "PlanckR1")]
    pub r1: f64,
    #[serde(rename = "PlanckB")]
    pub b: f64,
    #[serde(rename = "PlanckF")]
    pub f: f64,
    #[serde(rename = "PlanckO")]
    pub o: f64,
    #[serde(rename = "PlanckR2")]
    pub r2: f64,
}

impl Default for PlanckConstants {
    /// Typical FLIR microbolometer constants.
    fn default() -> Self {
        PlanckConstants {
            r1: 21106.77,
            b: 1501.,
            f: 1.,
            o: -7340.,
            r2: 0.012545258,
        }
    }
}

impl PlanckConstants {
    /// Radiance (raw units) of a blackbody at `temp` °C.
    pub fn temp_to_raw(&self, temp: f64) -> f64 {
        self.r1 / (self.r2 * ((self.b / (temp + CELSIUS_OFFSET)).exp() - self.f)) - self.o
    }

    /// Inverse of [`temp_to_raw`][Self::temp_to_raw].
    /// Returns `NaN` for radiances outside the model's
    /// domain.
    pub fn raw_to_temp(&self, raw: f64) -> f64 {
        let shifted = self.r2 * (raw + self.o);
        if !(shifted > 0.) {
            return f64::NAN;
        }
        self.b / (self.r1 / shifted + self.f).ln() - CELSIUS_OFFSET
    }
}

/// Coefficients of the two-term atmospheric attenuation
/// model.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct AtmosphericModel {
    #[serde(rename = "AtmosphericTransAlpha1")]
    pub alpha_1: f64,
    #[serde(rename = "AtmosphericTransAlpha2")]
    pub alpha_2: f64,
    #[serde(rename = "AtmosphericTransBeta1")]
    pub beta_1: f64,
    #[serde(rename = "AtmosphericTransBeta2")]
    pub beta_2: f64,
    #[serde(rename = "AtmosphericTransX")]
    pub x: f64,
}

impl Default for AtmosphericModel {
    /// Published FLIR attenuation coefficients.
    fn default() -> Self {
        AtmosphericModel {
            alpha_1: 0.006569,
            alpha_2: 0.01262,
            beta_1: -0.002276,
            beta_2: -0.00667,
            x: 1.9,
        }
    }
}

// h2o<-(RH/100)*exp(1.5587+0.06939*(ATemp)-0.00027816*(ATemp)^2+0.00000068455*(ATemp)^3)
const WATER_VAPOUR_SERIES: [f64; 4] = [1.5587, 0.06939, -0.00027816, 0.00000068455];

impl AtmosphericModel {
    /// Water vapour pressure (mmHg) for a relative humidity
    /// (%) and air temperature (°C).
    pub fn water_vapour(humidity_percentage: f64, air_temperature: f64) -> f64 {
        (humidity_percentage / 100.) * power_series_at(&WATER_VAPOUR_SERIES, air_temperature).exp()
    }

    fn affine1(&self, val: f64) -> f64 {
        self.alpha_1 + self.beta_1 * val
    }

    fn affine2(&self, val: f64) -> f64 {
        self.alpha_2 + self.beta_2 * val
    }

    fn interpolate(&self, val1: f64, val2: f64) -> f64 {
        self.x * val1 + (1. - self.x) * val2
    }

    /// Transmission over a single path of `length` meters.
    fn path_transmission(&self, length: f64, h2o_sqrt: f64) -> f64 {
        let dist_factor = length.sqrt();
        self.interpolate(
            (-dist_factor * self.affine1(h2o_sqrt)).exp(),
            (-dist_factor * self.affine2(h2o_sqrt)).exp(),
        )
    }

    /// Fraction of radiance transmitted between an object at
    /// `distance` meters and the sensor.
    ///
    /// The path is split at its mid-point and the two halves
    /// multiplied. The result is capped at `1.`, which is
    /// also the value at zero distance. Paths where the model
    /// breaks down give a value `<= 0.`.
    pub fn transmission(&self, distance: f64, humidity_percentage: f64, air_temperature: f64) -> f64 {
        if distance <= 0. {
            return 1.;
        }
        let h2o_sqrt = Self::water_vapour(humidity_percentage, air_temperature).sqrt();
        let half = self.path_transmission(distance / 2., h2o_sqrt);
        if !(half > 0.) {
            return half;
        }
        (half * half).min(1.)
    }
}

#[inline]
pub(crate) fn power_series_at(coeffs: &[f64], x: f64) -> f64 {
    let mut pow = 1.;
    let mut sum = 0.;
    for coeff in coeffs.iter() {
        sum += pow * coeff;
        pow *= x;
    }
    sum
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn planck_round_trip() {
        let planck = PlanckConstants::default();
        for t in [-20., 0., 22., 36.5, 80.] {
            let back = planck.raw_to_temp(planck.temp_to_raw(t));
            assert!((back - t).abs() < 1e-9, "{} -> {}", t, back);
        }
    }

    #[test]
    fn planck_is_monotonic() {
        let planck = PlanckConstants::default();
        assert!(planck.temp_to_raw(30.) < planck.temp_to_raw(31.));
        assert!(planck.raw_to_temp(-1e9).is_nan());
    }

    #[test]
    fn transmission_bounds() {
        let model = AtmosphericModel::default();
        assert_eq!(model.transmission(0., 50., 22.), 1.);
        let near = model.transmission(1., 50., 22.);
        let far = model.transmission(100., 50., 22.);
        assert!(near <= 1. && near > 0.9);
        assert!(far < near);
        assert!(far > 0.);
    }

    #[test]
    fn long_humid_paths_are_not_squared_away() {
        let model = AtmosphericModel::default();
        assert!(model.transmission(2000., 100., 40.) <= 0.);
        assert!(model.transmission(1000., 100., 40.) > 0.);
    }

    #[test]
    fn water_vapour_grows_with_humidity() {
        let dry = AtmosphericModel::water_vapour(10., 22.);
        let wet = AtmosphericModel::water_vapour(90., 22.);
        assert!(wet > dry);
        assert_eq!(AtmosphericModel::water_vapour(0., 22.), 0.);
    }

    #[test]
    fn power_series() {
        assert_eq!(power_series_at(&[1., 2., 3.], 2.), 17.);
    }
}
