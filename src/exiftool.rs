//! Input from ExifTool JSON (`exiftool -b -j`).
//!
//! Radiometric JPEGs carry the raw sensor counts as an
//! embedded image together with the Planck constants and
//! scene parameters the camera recorded. ExifTool exports
//! both; the counts arrive as a `base64:` encoded TIFF.
//!
//! ```rust,no_run
//! # fn main() -> anyhow::Result<()> {
//! use std::{fs::File, io::BufReader};
//! use thermal_dicom::exiftool::ExiftoolEntry;
//!
//! let entries: Vec<ExiftoolEntry> =
//!     serde_json::from_reader(BufReader::new(File::open("metadata.json")?))?;
//! let field = entries[0].calibrate()?;
//! # Ok(())
//! # }
//! ```

use std::io::Cursor;

use anyhow::{bail, Context, Result};
use image::{codecs::tiff::TiffDecoder, ColorType, ImageDecoder};
use ndarray::Array2;
use serde_derive::*;
use tracing::debug;
use zerocopy::{AsBytes, FromBytes};

use crate::{
    calibration::{CalibrationParameters, Calibrator},
    field::TemperatureField,
    metadata::{EquipmentInfo, ThermalParameters},
};

/// One image of an ExifTool JSON array.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "PascalCase")]
pub struct ExiftoolEntry {
    pub source_file: String,

    #[serde(deserialize_with = "serde_helpers::float_with_suffix")]
    pub emissivity: f64,
    /// e.g. `1.00 m`
    #[serde(deserialize_with = "serde_helpers::float_with_suffix")]
    pub object_distance: f64,
    /// e.g. `20.0 C`
    #[serde(deserialize_with = "serde_helpers::float_with_suffix")]
    pub reflected_apparent_temperature: f64,
    #[serde(deserialize_with = "serde_helpers::float_with_suffix")]
    pub atmospheric_temperature: f64,
    /// e.g. `50.0 %`
    #[serde(deserialize_with = "serde_helpers::float_with_suffix")]
    pub relative_humidity: f64,

    #[serde(default)]
    pub make: Option<String>,
    #[serde(default)]
    pub camera_model: Option<String>,
    #[serde(default)]
    pub camera_serial_number: Option<String>,

    #[serde(flatten)]
    pub calibrator: Calibrator,

    #[serde(flatten)]
    raw: ThermalRawBytes,
}

impl ExiftoolEntry {
    /// Scene parameters recorded by the camera. The air
    /// temperature doubles as the ambient temperature.
    pub fn calibration_parameters(&self) -> crate::Result<CalibrationParameters> {
        let params = CalibrationParameters::new(
            self.emissivity,
            self.object_distance,
            self.atmospheric_temperature,
        )
        .with_reflected_temperature(self.reflected_apparent_temperature)
        .with_relative_humidity(self.relative_humidity)
        .with_atmospheric_temperature(self.atmospheric_temperature);
        params.validate()?;
        Ok(params)
    }

    pub fn thermal_parameters(&self) -> crate::Result<ThermalParameters> {
        let params = self.calibration_parameters()?;
        Ok(ThermalParameters {
            camera_model: self.camera_model.clone(),
            ..ThermalParameters::from_calibration(&params)
        })
    }

    pub fn equipment(&self) -> EquipmentInfo {
        EquipmentInfo {
            manufacturer: self.make.clone(),
            model: self.camera_model.clone(),
            serial_number: self.camera_serial_number.clone(),
            ..Default::default()
        }
    }

    /// Raw sensor counts, `rows × cols`.
    pub fn raw_counts(&self) -> Result<Array2<f64>> {
        self.raw
            .thermal_image()
            .with_context(|| format!("{}: could not decode raw thermal image", self.source_file))
    }

    /// Object temperatures (°C) with the recorded parameters.
    pub fn calibrate(&self) -> Result<TemperatureField> {
        self.calibrate_with(&self.calibration_parameters()?)
    }

    /// Object temperatures (°C) with the camera's constants
    /// and the given scene parameters.
    pub fn calibrate_with(&self, params: &CalibrationParameters) -> Result<TemperatureField> {
        let counts = self.raw_counts()?;
        debug!(source = %self.source_file, dim = ?counts.dim(), "calibrating raw counts");
        Ok(self.calibrator.calibrate_counts(&counts, params)?)
    }
}

#[derive(Deserialize, Debug)]
struct ThermalRawBytes {
    #[serde(rename = "RawThermalImageType")]
    ty: String,

    #[serde(
        rename = "RawThermalImage",
        deserialize_with = "serde_helpers::base64_bytes"
    )]
    bytes: Vec<u8>,
}

impl ThermalRawBytes {
    fn thermal_image(&self) -> Result<Array2<f64>> {
        if self.ty != "TIFF" {
            bail!("unsupported raw image type: {}", self.ty);
        }

        let decoder = TiffDecoder::new(Cursor::new(&self.bytes))?;
        let (width, height) = decoder.dimensions();
        let values = match decoder.color_type() {
            ColorType::L8 => image_as_float::<u8, _>(decoder)?,
            ColorType::L16 => image_as_float::<u16, _>(decoder)?,
            ty => bail!("unsupported color type: {:?}", ty),
        };
        Ok(Array2::from_shape_vec(
            (height as usize, width as usize),
            values,
        )?)
    }
}

fn image_as_float<'a, T, R>(decoder: R) -> Result<Vec<f64>>
where
    f64: From<T>,
    T: AsBytes + FromBytes + Copy + Default,
    R: ImageDecoder<'a>,
{
    let (width, height) = decoder.dimensions();
    let mut image = vec![T::default(); width as usize * height as usize];
    decoder.read_image(image.as_bytes_mut())?;
    Ok(image.into_iter().map(f64::from).collect())
}

mod serde_helpers {
    use lazy_static::lazy_static;
    use regex::Regex;
    use serde::*;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrText {
        Number(f64),
        Text(String),
    }

    /// Numbers, or text starting with a number (`"1.00 m"`).
    pub fn float_with_suffix<'de, D>(de: D) -> Result<f64, D::Error>
    where
        D: Deserializer<'de>,
    {
        lazy_static! {
            static ref RE: Regex = Regex::new(r"^[-+]?\d*\.?\d+").unwrap();
        }

        use serde::de::Error;
        match NumberOrText::deserialize(de)? {
            NumberOrText::Number(v) => Ok(v),
            NumberOrText::Text(text) => RE
                .find(text.trim())
                .ok_or_else(|| Error::custom(format!("`{}` does not begin with a number", text)))?
                .as_str()
                .parse()
                .map_err(Error::custom),
        }
    }

    pub fn base64_bytes<'de, D>(de: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error;
        let text = <String as Deserialize>::deserialize(de)?;
        let encoded = text
            .strip_prefix("base64:")
            .ok_or_else(|| Error::custom("unexpected format: must begin with `base64:`"))?;
        base64::decode(encoded).map_err(Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use image::{codecs::tiff::TiffEncoder, ColorType};

    use super::*;

    fn tiff_base64(width: u32, height: u32, values: &[u16]) -> String {
        let mut bytes = Vec::new();
        TiffEncoder::new(Cursor::new(&mut bytes))
            .encode(values.as_bytes(), width, height, ColorType::L16)
            .unwrap();
        format!("base64:{}", base64::encode(&bytes))
    }

    fn entry_json(raw: &str) -> String {
        format!(
            r#"{{
                "SourceFile": "IR_0042.jpg",
                "Make": "FLIR Systems AB",
                "CameraModel": "FLIR T540",
                "Emissivity": 0.98,
                "ObjectDistance": "1.00 m",
                "ReflectedApparentTemperature": "22.0 C",
                "AtmosphericTemperature": "22.0 C",
                "RelativeHumidity": "50.0 %",
                "PlanckR1": 21106.77,
                "PlanckB": 1501,
                "PlanckF": 1,
                "PlanckO": -7340,
                "PlanckR2": 0.012545258,
                "AtmosphericTransAlpha1": 0.006569,
                "AtmosphericTransAlpha2": 0.01262,
                "AtmosphericTransBeta1": -0.002276,
                "AtmosphericTransBeta2": -0.00667,
                "AtmosphericTransX": 1.9,
                "RawThermalImageType": "TIFF",
                "RawThermalImage": "{}"
            }}"#,
            raw
        )
    }

    #[test]
    fn parses_scene_and_counts() -> anyhow::Result<()> {
        let counts: Vec<u16> = (0..12).map(|i| 15000 + 10 * i).collect();
        let entry: ExiftoolEntry = serde_json::from_str(&entry_json(&tiff_base64(4, 3, &counts)))?;

        let params = entry.calibration_parameters()?;
        assert_eq!(params.emissivity, 0.98);
        assert_eq!(params.distance_from_camera, 1.);
        assert_eq!(params.reflected(), 22.);
        assert_eq!(params.relative_humidity, 50.);
        assert_eq!(entry.calibrator, Calibrator::default());
        assert_eq!(entry.equipment().model.as_deref(), Some("FLIR T540"));

        let raw = entry.raw_counts()?;
        assert_eq!(raw.dim(), (3, 4));
        assert_eq!(raw[(2, 3)], 15110.);

        let field = entry.calibrate()?;
        assert_eq!(field.dim(), (3, 4));
        // hotter counts give hotter objects
        assert!(field.at(2, 3)? > field.at(0, 0)?);
        Ok(())
    }

    #[test]
    fn rejects_non_base64() {
        let json = entry_json("not-base64");
        assert!(serde_json::from_str::<ExiftoolEntry>(&json).is_err());
    }

    #[test]
    fn suffixed_floats() {
        #[derive(Deserialize)]
        struct T {
            #[serde(deserialize_with = "serde_helpers::float_with_suffix")]
            v: f64,
        }
        let parse = |s: &str| serde_json::from_str::<T>(s).map(|t| t.v).ok();
        assert_eq!(parse(r#"{"v": "-5.5 C"}"#), Some(-5.5));
        assert_eq!(parse(r#"{"v": "1.00 m"}"#), Some(1.));
        assert_eq!(parse(r#"{"v": 3}"#), Some(3.));
        assert_eq!(parse(r#"{"v": "m"}"#), None);
    }
}
