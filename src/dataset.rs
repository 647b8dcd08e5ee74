//! Assembly of thermal DICOM objects.
//!
//! A [`ThermalDicomObject`] owns the temperature grid it was
//! built from together with its encoded dataset. It is never
//! mutated in place: [`ThermalDicomObject::modify`] and
//! [`ThermalDicomObject::with_overlay`] return new objects
//! that went through validation and encoding again.
//!
//! ```rust,no_run
//! # fn main() -> anyhow::Result<()> {
//! use thermal_dicom::{assemble, ThermalDicomObject, ThermalMetadataRecord};
//! # let field = thermal_dicom::TemperatureField::filled(4, 4, 36.5);
//! # let record: ThermalMetadataRecord = unimplemented!();
//!
//! let object = assemble(field, None, record)?;
//! object.save("study.dcm")?;
//! let reopened = ThermalDicomObject::open("study.dcm")?;
//! assert_eq!(reopened.temperature_at(0, 0)?, object.temperature_at(0, 0)?);
//! # Ok(())
//! # }
//! ```

use std::{collections::BTreeSet, path::Path};

use dicom::{
    dictionary_std::uids,
    object::{open_file, FileMetaTableBuilder, InMemDicomObject},
};
use image::RgbImage;
use ndarray::Array2;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    codec::{self, Decoded, Parts, SOP_CLASS_UID},
    error::{Result, ThermalError},
    field::TemperatureField,
    metadata::{check_uid, check_uid_prefix, ThermalMetadataRecord},
    stats::{RoiStatistics, Stats},
    validation::Field,
};

/// Longest DICOM UID.
pub const UID_MAX_LEN: usize = 64;
/// Root of UUID-derived UIDs (ISO/IEC 9834-8).
pub const UUID_UID_ROOT: &str = "2.25";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceUids {
    pub study: String,
    pub series: String,
    pub sop_instance: String,
}

/// A fresh UID under `root`, or under `2.25` when absent.
pub fn generate_uid(root: Option<&str>) -> String {
    let n = Uuid::new_v4().as_u128();
    match root {
        None => format!("{}.{}", UUID_UID_ROOT, n),
        Some(root) => {
            let digits = (UID_MAX_LEN - root.len() - 1).min(38) as u32;
            format!("{}.{}", root, n % 10u128.pow(digits))
        }
    }
}

impl InstanceUids {
    pub fn generate(root: Option<&str>) -> Self {
        InstanceUids {
            study: generate_uid(root),
            series: generate_uid(root),
            sop_instance: generate_uid(root),
        }
    }
}

/// Builds [`ThermalDicomObject`]s.
#[derive(Debug, Clone, Default)]
pub struct DatasetAssembler {
    uid_root: Option<String>,
    study_uid: Option<String>,
    series_uid: Option<String>,
}

impl DatasetAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate UIDs under an organization root instead of
    /// `2.25`. A root in the record's equipment information
    /// takes precedence.
    pub fn with_uid_root(mut self, root: &str) -> Result<Self> {
        check_uid_prefix(root)
            .map_err(|reason| ThermalError::validation(Field::OrganizationUidPrefix, reason))?;
        self.uid_root = Some(root.to_string());
        Ok(self)
    }

    /// Place every assembled object in an existing study.
    pub fn with_study_uid(mut self, uid: &str) -> Result<Self> {
        check_uid(uid)
            .map_err(|reason| ThermalError::validation(Field::StudyInstanceUid, reason))?;
        self.study_uid = Some(uid.to_string());
        Ok(self)
    }

    /// Place every assembled object in an existing series.
    pub fn with_series_uid(mut self, uid: &str) -> Result<Self> {
        check_uid(uid)
            .map_err(|reason| ThermalError::validation(Field::SeriesInstanceUid, reason))?;
        self.series_uid = Some(uid.to_string());
        Ok(self)
    }

    fn uids(&self, metadata: &ThermalMetadataRecord) -> InstanceUids {
        let root = metadata
            .equipment()
            .organization_uid_prefix
            .as_deref()
            .or_else(|| self.uid_root.as_deref());
        let mut uids = InstanceUids::generate(root);
        if let Some(study) = &self.study_uid {
            uids.study = study.clone();
        }
        if let Some(series) = &self.series_uid {
            uids.series = series.clone();
        }
        uids
    }

    /// Encode a calibrated temperature grid, an optional
    /// display rendering and its metadata.
    ///
    /// The record must be valid and have every required
    /// field; the display image must have the grid's shape.
    /// Nothing is encoded unless every check passes. The grid
    /// is stored as given; the record takes over its unit.
    pub fn assemble(
        &self,
        temperature: TemperatureField,
        display_image: Option<RgbImage>,
        mut metadata: ThermalMetadataRecord,
    ) -> Result<ThermalDicomObject> {
        metadata.validate_completeness().into_result()?;
        metadata.validate().into_result()?;
        if let Some(display) = &display_image {
            check_display(&temperature, display)?;
        }

        if metadata.thermal().temperature_unit != temperature.unit() {
            debug!(
                record = metadata.thermal().temperature_unit.code(),
                grid = temperature.unit().code(),
                "recording the grid's temperature unit"
            );
            metadata.set_temperature_unit(temperature.unit());
        }
        let uids = self.uids(&metadata);
        let object = ThermalDicomObject::encode(temperature, display_image, None, metadata, uids)?;
        info!(
            sop_instance = %object.uids.sop_instance,
            rows = object.temperature.rows(),
            cols = object.temperature.cols(),
            "assembled thermal object"
        );
        Ok(object)
    }
}

/// [`DatasetAssembler::assemble`] with `2.25` UIDs.
pub fn assemble(
    temperature: TemperatureField,
    display_image: Option<RgbImage>,
    metadata: ThermalMetadataRecord,
) -> Result<ThermalDicomObject> {
    DatasetAssembler::new().assemble(temperature, display_image, metadata)
}

fn check_display(field: &TemperatureField, display: &RgbImage) -> Result<()> {
    let found = (display.height() as usize, display.width() as usize);
    if found != field.dim() {
        return Err(ThermalError::ShapeMismatch {
            what: "display image",
            expected: field.dim(),
            found,
        });
    }
    Ok(())
}

/// A calibrated thermal image encoded as DICOM.
#[derive(Debug, Clone)]
pub struct ThermalDicomObject {
    temperature: TemperatureField,
    display: Option<RgbImage>,
    overlay: Option<Array2<bool>>,
    metadata: ThermalMetadataRecord,
    uids: InstanceUids,
    dataset: InMemDicomObject,
}

impl ThermalDicomObject {
    fn encode(
        temperature: TemperatureField,
        display: Option<RgbImage>,
        overlay: Option<Array2<bool>>,
        metadata: ThermalMetadataRecord,
        uids: InstanceUids,
    ) -> Result<Self> {
        let dataset = codec::encode(&Parts {
            field: &temperature,
            display: display.as_ref(),
            overlay: overlay.as_ref(),
            metadata: &metadata,
            uids: &uids,
        })?;
        Ok(ThermalDicomObject {
            temperature,
            display,
            overlay,
            metadata,
            uids,
            dataset,
        })
    }

    pub fn temperature(&self) -> &TemperatureField {
        &self.temperature
    }

    pub fn display_image(&self) -> Option<&RgbImage> {
        self.display.as_ref()
    }

    pub fn overlay(&self) -> Option<&Array2<bool>> {
        self.overlay.as_ref()
    }

    pub fn metadata(&self) -> &ThermalMetadataRecord {
        &self.metadata
    }

    pub fn uids(&self) -> &InstanceUids {
        &self.uids
    }

    pub fn dataset(&self) -> &InMemDicomObject {
        &self.dataset
    }

    pub fn into_dataset(self) -> InMemDicomObject {
        self.dataset
    }

    /// Calibrated temperature of one pixel, in the stored
    /// unit.
    pub fn temperature_at(&self, row: usize, col: usize) -> Result<f64> {
        self.temperature.at(row, col)
    }

    /// Statistics over the valid cells of `roi`.
    ///
    /// Coordinates outside the grid are
    /// [`OutOfBounds`][ThermalError::OutOfBounds]; a region
    /// without valid cells is
    /// [`EmptyRoi`][ThermalError::EmptyRoi].
    pub fn roi_statistics(&self, roi: &BTreeSet<(usize, usize)>) -> Result<RoiStatistics> {
        let mut stats = Stats::default();
        for &(row, col) in roi {
            let v = self.temperature.at(row, col)?;
            if v.is_finite() {
                stats += v;
            }
        }
        stats.summary().ok_or(ThermalError::EmptyRoi)
    }

    /// [`roi_statistics`][Self::roi_statistics] over a boolean
    /// mask of the grid's shape.
    pub fn roi_statistics_mask(&self, mask: &Array2<bool>) -> Result<RoiStatistics> {
        if mask.dim() != self.temperature.dim() {
            return Err(ThermalError::ShapeMismatch {
                what: "roi mask",
                expected: self.temperature.dim(),
                found: mask.dim(),
            });
        }
        let mut stats = Stats::default();
        for (v, _) in self
            .temperature
            .view()
            .iter()
            .zip(mask.iter())
            .filter(|&(v, &selected)| selected && v.is_finite())
        {
            stats += *v;
        }
        stats.summary().ok_or(ThermalError::EmptyRoi)
    }

    /// Attach a region-of-interest overlay plane.
    pub fn with_overlay(self, mask: Array2<bool>) -> Result<Self> {
        if mask.dim() != self.temperature.dim() {
            return Err(ThermalError::ShapeMismatch {
                what: "overlay",
                expected: self.temperature.dim(),
                found: mask.dim(),
            });
        }
        let dataset = codec::put_overlay(self.dataset, &mask)?;
        Ok(ThermalDicomObject {
            overlay: Some(mask),
            dataset,
            ..self
        })
    }

    /// Change the metadata and re-encode. The grid with its
    /// unit, the display image, overlay and study/series are
    /// kept; the result is a new instance.
    pub fn modify<F>(&self, edit: F) -> Result<Self>
    where
        F: FnOnce(&mut ThermalMetadataRecord) -> Result<()>,
    {
        let mut metadata = self.metadata.clone();
        edit(&mut metadata)?;
        metadata.set_temperature_unit(self.temperature.unit());
        metadata.validate_completeness().into_result()?;
        metadata.validate().into_result()?;

        let root = metadata.equipment().organization_uid_prefix.clone();
        let uids = InstanceUids {
            sop_instance: generate_uid(root.as_deref()),
            ..self.uids.clone()
        };
        debug!(
            from = %self.uids.sop_instance,
            to = %uids.sop_instance,
            "re-encoding modified thermal object"
        );
        Self::encode(
            self.temperature.clone(),
            self.display.clone(),
            self.overlay.clone(),
            metadata,
            uids,
        )
    }

    /// Decode and validate a dataset written by this crate.
    pub fn from_dicom(dataset: InMemDicomObject) -> Result<Self> {
        let Decoded {
            field,
            display,
            overlay,
            metadata,
            uids,
        } = codec::decode(&dataset)?;
        metadata.validate_completeness().into_result()?;
        if let Some(display) = &display {
            check_display(&field, display)?;
        }
        Ok(ThermalDicomObject {
            temperature: field,
            display,
            overlay,
            metadata,
            uids,
            dataset,
        })
    }

    /// Write a DICOM file (explicit VR little endian).
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let meta = FileMetaTableBuilder::new()
            .transfer_syntax(uids::EXPLICIT_VR_LITTLE_ENDIAN)
            .media_storage_sop_class_uid(SOP_CLASS_UID)
            .media_storage_sop_instance_uid(self.uids.sop_instance.as_str());
        self.dataset
            .clone()
            .with_meta(meta)
            .map_err(|e| ThermalError::Dicom(e.to_string()))?
            .write_to_file(path)
            .map_err(|e| ThermalError::Dicom(e.to_string()))?;
        info!(path = %path.display(), sop_instance = %self.uids.sop_instance, "saved thermal object");
        Ok(())
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = open_file(path).map_err(|e| ThermalError::Dicom(e.to_string()))?;
        debug!(path = %path.display(), "opened dicom file");
        Self::from_dicom(file.into_inner())
    }
}
