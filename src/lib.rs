//! Library to turn radiometric thermal images into DICOM
//! objects for medical thermography.
//!
//! This crate provides three functionalities:
//!
//! 1. [Calibrate](calibration) apparent temperatures or raw
//! sensor counts into object temperatures, correcting for
//! emissivity, reflected radiation and atmospheric
//! transmission. The radiometric model follows the
//! [Thermimage R library]. Reference-source
//! [calibration curves](curve) and [bad pixel](bad_pixels)
//! detection/correction refine the result.
//!
//! 2. Describe the examination with a strongly typed,
//! validated [metadata record](metadata).
//!
//! 3. [Assemble](dataset) temperatures, a false-color
//! display image and metadata into a DICOM object that can
//! be saved, reopened and queried.
//!
//! # Usage
//!
//! ## Calibrating temperatures
//!
//! ```rust
//! # fn main() -> anyhow::Result<()> {
//! use thermal_dicom::{calibrate, CalibrationParameters, TemperatureField};
//!
//! let apparent = TemperatureField::filled(4, 4, 36.0);
//! let params = CalibrationParameters::new(0.98, 1.0, 22.0);
//! let object = calibrate(&apparent, &params)?;
//! assert!(object.at(0, 0)? > 36.0);
//! # Ok(())
//! # }
//! ```
//!
//! Raw counts exported with `exiftool -b -j` are read via
//! [`ExiftoolEntry`][exiftool::ExiftoolEntry], which also
//! carries the camera's own Planck constants.
//!
//! ## Encoding as DICOM
//!
//! The [`ThermalMetadataRecord`] is usually loaded from a
//! JSON document; unknown keys and invalid values are
//! rejected on load. [`assemble`] refuses records that miss
//! required information.
//!
//! ```rust
//! # fn main() -> anyhow::Result<()> {
//! use thermal_dicom::{assemble, colormap::Colormap, TemperatureField, ThermalMetadataRecord};
//!
//! let record: ThermalMetadataRecord = serde_json::from_str(r#"{
//!     "patient": {"name": "DOE^JANE", "id": "P-0042"},
//!     "study": {"description": "Hand thermography", "procedure": "vascular_assessment"},
//!     "thermal": {"emissivity": 0.98, "distance_from_camera": 1.0}
//! }"#)?;
//!
//! let field = TemperatureField::filled(4, 4, 33.5);
//! let display = Colormap::Iron.render(&field, None)?;
//! let object = assemble(field, Some(display), record)?;
//! assert_eq!(object.temperature_at(1, 2)?, 33.5);
//! # Ok(())
//! # }
//! ```
//!
//! [Thermimage R library]: //github.com/gtatters/Thermimage/blob/master/R/raw2temp.R

pub mod error;
pub mod units;
pub mod stats;
pub mod field;

pub mod radiometry;
pub mod calibration;
pub mod curve;
pub mod bad_pixels;

pub mod validation;
pub mod codes;
pub mod metadata;

pub mod tags;
mod codec;
pub mod colormap;
pub mod dataset;

pub mod exiftool;
pub mod cli;

pub use crate::error::{Result, ThermalError};
pub use crate::field::TemperatureField;
pub use crate::calibration::{calibrate, calibrate_counts, CalibrationParameters, Calibrator};
pub use crate::curve::{apply_curve, create_calibration_curve, CalibrationCurve};
pub use crate::bad_pixels::{correct, detect_bad_pixels};
pub use crate::metadata::ThermalMetadataRecord;
pub use crate::stats::RoiStatistics;
pub use crate::dataset::{assemble, DatasetAssembler, ThermalDicomObject};
