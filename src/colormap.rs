//! False-color rendering of temperature fields.

use std::str::FromStr;

use image::{Rgb, RgbImage};
use serde_derive::*;

use crate::{
    error::{Result, ThermalError},
    field::TemperatureField,
    units::LinearScale,
};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Colormap {
    Grayscale,
    Iron,
    Rainbow,
    Hot,
}

impl Default for Colormap {
    fn default() -> Self {
        Colormap::Iron
    }
}

// Control points over [0, 1], evenly spaced.
const GRAYSCALE: &[[u8; 3]] = &[[0, 0, 0], [255, 255, 255]];
const IRON: &[[u8; 3]] = &[
    [0, 0, 0],
    [32, 0, 140],
    [204, 0, 119],
    [255, 115, 0],
    [255, 215, 0],
    [255, 255, 255],
];
const RAINBOW: &[[u8; 3]] = &[
    [0, 0, 255],
    [0, 255, 255],
    [0, 255, 0],
    [255, 255, 0],
    [255, 0, 0],
];
const HOT: &[[u8; 3]] = &[[0, 0, 0], [255, 0, 0], [255, 255, 0], [255, 255, 255]];

impl Colormap {
    fn stops(self) -> &'static [[u8; 3]] {
        match self {
            Colormap::Grayscale => GRAYSCALE,
            Colormap::Iron => IRON,
            Colormap::Rainbow => RAINBOW,
            Colormap::Hot => HOT,
        }
    }

    /// Color at `t ∈ [0, 1]`; values outside are clamped.
    pub fn color(self, t: f64) -> Rgb<u8> {
        let stops = self.stops();
        let t = if t.is_nan() { 0. } else { t.max(0.).min(1.) };
        let pos = t * (stops.len() - 1) as f64;
        let idx = (pos.floor() as usize).min(stops.len() - 2);
        let frac = pos - idx as f64;

        let (lo, hi) = (stops[idx], stops[idx + 1]);
        let mut out = [0u8; 3];
        for c in 0..3 {
            let v = lo[c] as f64 + frac * (hi[c] as f64 - lo[c] as f64);
            out[c] = v.round() as u8;
        }
        Rgb(out)
    }

    /// Render `field` mapping `range` onto the colormap.
    /// Without a range, the finite extent of the field is
    /// used. Invalid cells are black.
    pub fn render(self, field: &TemperatureField, range: Option<(f64, f64)>) -> Result<RgbImage> {
        let (min, max) = match range {
            Some(r) => r,
            None => {
                let stats = field.statistics();
                if stats.is_empty() {
                    (0., 1.)
                } else if stats.max() > stats.min() {
                    (stats.min(), stats.max())
                } else {
                    (stats.min() - 0.5, stats.min() + 0.5)
                }
            }
        };
        let scale = LinearScale::between(min, max, 0., 1.)?;

        let (rows, cols) = field.dim();
        let view = field.view();
        Ok(RgbImage::from_fn(cols as u32, rows as u32, |x, y| {
            let v = view[(y as usize, x as usize)];
            if v.is_finite() {
                self.color(scale.apply(v))
            } else {
                Rgb([0, 0, 0])
            }
        }))
    }
}

impl FromStr for Colormap {
    type Err = ThermalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "grayscale" | "gray" => Ok(Colormap::Grayscale),
            "iron" => Ok(Colormap::Iron),
            "rainbow" => Ok(Colormap::Rainbow),
            "hot" => Ok(Colormap::Hot),
            _ => Err(ThermalError::InvalidParameter {
                name: "colormap",
                value: f64::NAN,
                expected: "one of grayscale, iron, rainbow, hot",
            }),
        }
    }
}
