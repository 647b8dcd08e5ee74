//! Field identifiers and validation reports.

use std::{collections::BTreeSet, fmt};

use serde_derive::*;

use crate::error::{Result, ThermalError};

/// Every validated attribute of a
/// [`ThermalMetadataRecord`][crate::metadata::ThermalMetadataRecord].
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    PatientName,
    PatientId,
    PatientBirthDate,
    PatientSex,
    PatientAge,

    StudyDescription,
    ReferringPhysician,
    Procedure,
    StudyDate,
    StudyTime,
    StudyId,
    AccessionNumber,
    StudyInstanceUid,
    SeriesInstanceUid,

    Modality,
    SeriesDescription,
    SeriesNumber,
    BodyPart,
    Laterality,
    ViewPosition,
    AcquisitionMode,

    Manufacturer,
    ManufacturerModel,
    DeviceSerialNumber,
    DetectorType,
    SpatialResolution,
    SoftwareVersion,
    InstitutionName,
    OrganizationUidPrefix,

    Emissivity,
    DistanceFromCamera,
    AmbientTemperature,
    ReflectedTemperature,
    RelativeHumidity,
    AtmosphericTemperature,
    CameraModel,
    SpectralRange,
    ThermalSensitivity,

    UniformityCheck,
    MeasuredNetd,
    BadPixelCount,
    ResolutionTest,
    TemperatureAccuracy,
    CalibrationDate,
}

impl Field {
    pub fn name(self) -> &'static str {
        use Field::*;
        match self {
            PatientName => "patient_name",
            PatientId => "patient_id",
            PatientBirthDate => "patient_birth_date",
            PatientSex => "patient_sex",
            PatientAge => "patient_age",
            StudyDescription => "study_description",
            ReferringPhysician => "referring_physician",
            Procedure => "procedure",
            StudyDate => "study_date",
            StudyTime => "study_time",
            StudyId => "study_id",
            AccessionNumber => "accession_number",
            StudyInstanceUid => "study_instance_uid",
            SeriesInstanceUid => "series_instance_uid",
            Modality => "modality",
            SeriesDescription => "series_description",
            SeriesNumber => "series_number",
            BodyPart => "body_part",
            Laterality => "laterality",
            ViewPosition => "view_position",
            AcquisitionMode => "acquisition_mode",
            Manufacturer => "manufacturer",
            ManufacturerModel => "manufacturer_model",
            DeviceSerialNumber => "device_serial_number",
            DetectorType => "detector_type",
            SpatialResolution => "spatial_resolution",
            SoftwareVersion => "software_version",
            InstitutionName => "institution_name",
            OrganizationUidPrefix => "organization_uid_prefix",
            Emissivity => "emissivity",
            DistanceFromCamera => "distance_from_camera",
            AmbientTemperature => "ambient_temperature",
            ReflectedTemperature => "reflected_temperature",
            RelativeHumidity => "relative_humidity",
            AtmosphericTemperature => "atmospheric_temperature",
            CameraModel => "camera_model",
            SpectralRange => "spectral_range",
            ThermalSensitivity => "thermal_sensitivity",
            UniformityCheck => "uniformity_check",
            MeasuredNetd => "measured_netd",
            BadPixelCount => "bad_pixel_count",
            ResolutionTest => "resolution_test",
            TemperatureAccuracy => "temperature_accuracy",
            CalibrationDate => "calibration_date",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single rule violation.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Violation {
    pub field: Field,
    pub reason: String,
}

impl Violation {
    pub fn new(field: Field, reason: impl Into<String>) -> Self {
        Violation {
            field,
            reason: reason.into(),
        }
    }
}

impl From<Violation> for ThermalError {
    fn from(v: Violation) -> Self {
        ThermalError::Validation {
            field: v.field,
            reason: v.reason,
        }
    }
}

/// Outcome of an accumulate-all validation pass.
#[derive(Serialize, Debug, Clone, PartialEq, Default)]
pub struct ValidationReport {
    pub valid: bool,
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    pub fn from_violations(violations: Vec<Violation>) -> Self {
        ValidationReport {
            valid: violations.is_empty(),
            violations,
        }
    }

    /// Fail-fast view: the first violation as an error.
    pub fn into_result(self) -> Result<()> {
        match self.violations.into_iter().next() {
            Some(v) => Err(v.into()),
            None => Ok(()),
        }
    }
}

/// Required fields that are absent, and recommended ones
/// that are.
#[derive(Serialize, Debug, Clone, PartialEq, Default)]
pub struct CompletenessReport {
    pub missing_required: BTreeSet<Field>,
    pub warnings: BTreeSet<Field>,
}

impl CompletenessReport {
    pub fn is_complete(&self) -> bool {
        self.missing_required.is_empty()
    }

    pub fn into_result(self) -> Result<()> {
        if self.missing_required.is_empty() {
            Ok(())
        } else {
            Err(ThermalError::IncompleteMetadata {
                missing: self.missing_required.into_iter().collect(),
            })
        }
    }
}

/// Collects violations from a sequence of checks.
#[derive(Default)]
pub(crate) struct Checker {
    violations: Vec<Violation>,
}

impl Checker {
    pub fn fail(&mut self, field: Field, reason: impl Into<String>) {
        self.violations.push(Violation::new(field, reason));
    }

    pub fn check(&mut self, field: Field, ok: bool, reason: impl FnOnce() -> String) {
        if !ok {
            self.fail(field, reason());
        }
    }

    pub fn check_result(&mut self, field: Field, res: std::result::Result<(), String>) {
        if let Err(reason) = res {
            self.fail(field, reason);
        }
    }

    pub fn finish(self) -> Vec<Violation> {
        self.violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_fail_fast() {
        let report = ValidationReport::from_violations(vec![
            Violation::new(Field::PatientSex, "unknown sex `X`"),
            Violation::new(Field::PatientAge, "age out of range"),
        ]);
        assert!(!report.valid);
        assert_eq!(
            report.into_result(),
            Err(ThermalError::Validation {
                field: Field::PatientSex,
                reason: "unknown sex `X`".into()
            })
        );
        assert!(ValidationReport::from_violations(vec![]).into_result().is_ok());
    }

    #[test]
    fn incomplete_lists_missing_fields() {
        let mut report = CompletenessReport::default();
        report.missing_required.insert(Field::PatientId);
        report.missing_required.insert(Field::Emissivity);
        let err = report.into_result().unwrap_err();
        assert_eq!(err.to_string(), "metadata incomplete, missing: patient_id, emissivity");
    }
}
