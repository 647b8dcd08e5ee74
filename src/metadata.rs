//! Typed metadata carried by a thermal DICOM object.
//!
//! The record is split in information groups (patient,
//! study, series, equipment, thermal parameters, quality
//! control). Each group is plain data that can be built in
//! code or deserialized from a JSON document (unknown keys
//! are rejected); the [`ThermalMetadataRecord`] setters only
//! accept groups that pass their field-level rules.
//!
//! ```rust
//! # fn main() -> anyhow::Result<()> {
//! use thermal_dicom::metadata::{PatientInfo, Sex, ThermalMetadataRecord};
//!
//! let mut record = ThermalMetadataRecord::default();
//! record.set_patient(PatientInfo {
//!     name: Some("DOE^JANE".into()),
//!     id: Some("P-0042".into()),
//!     sex: Some(Sex::Female),
//!     age: Some(45),
//!     ..Default::default()
//! })?;
//! assert!(!record.validate_completeness().is_complete());
//! # Ok(())
//! # }
//! ```

use std::{convert::TryFrom, fmt, str::FromStr};

use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;
use serde_derive::*;

use crate::{
    calibration::{
        check_distance, check_emissivity, check_environment_temperature, check_humidity,
        CalibrationParameters,
    },
    codes::{self, BodyPart, Procedure},
    dataset::UID_MAX_LEN,
    error::{Result, ThermalError},
    tags::{self, rounds_to_zero, PrivateAttribute, PIXEL_SPACING_DECIMALS},
    units::TemperatureUnit,
    validation::{Checker, CompletenessReport, Field, ValidationReport, Violation},
};

// Value-representation length limits.
const LO_MAX: usize = 64;
const SH_MAX: usize = 16;
const PN_COMPONENT_MAX: usize = 64;
pub const MAX_PATIENT_AGE: u16 = 150;
/// Longest accepted organization root, leaving room for a
/// generated suffix within the 64 character UID limit.
pub const UID_PREFIX_MAX: usize = 40;

lazy_static! {
    static ref DATE_RE: Regex = Regex::new(r"^\d{8}$").unwrap();
    static ref TIME_RE: Regex =
        Regex::new(r"^([01]\d|2[0-3])([0-5]\d([0-5]\d(\.\d{1,6})?)?)?$").unwrap();
    static ref UID_RE: Regex = Regex::new(r"^(0|[1-9]\d*)(\.(0|[1-9]\d*))*$").unwrap();
    static ref SPECTRAL_RANGE_RE: Regex =
        Regex::new(r"^(\d+(?:\.\d+)?)-(\d+(?:\.\d+)?)um$").unwrap();
}

pub(crate) fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

fn check_text(value: &str, max: usize) -> std::result::Result<(), String> {
    if value.chars().count() > max {
        return Err(format!("longer than {} characters", max));
    }
    if value.chars().any(|c| c == '\\' || c.is_control()) {
        return Err("contains a backslash or control character".into());
    }
    Ok(())
}

fn check_person_name(value: &str) -> std::result::Result<(), String> {
    let components: Vec<&str> = value.split('^').collect();
    if components.len() > 5 {
        return Err("more than 5 name components".into());
    }
    components
        .iter()
        .try_for_each(|c| check_text(c, PN_COMPONENT_MAX))
}

/// DICOM DA (`YYYYMMDD`) naming a real calendar day.
pub fn parse_date(value: &str) -> std::result::Result<NaiveDate, String> {
    if !DATE_RE.is_match(value) {
        return Err(format!("`{}` is not a YYYYMMDD date", value));
    }
    NaiveDate::parse_from_str(value, "%Y%m%d").map_err(|e| format!("`{}`: {}", value, e))
}

fn check_date(value: &str) -> std::result::Result<(), String> {
    parse_date(value).map(|_| ())
}

fn check_time(value: &str) -> std::result::Result<(), String> {
    if TIME_RE.is_match(value) {
        Ok(())
    } else {
        Err(format!("`{}` is not a HHMMSS[.FFFFFF] time", value))
    }
}

/// Dotted-numeric UID root without leading zeros.
pub fn check_uid_prefix(value: &str) -> std::result::Result<(), String> {
    if value.len() > UID_PREFIX_MAX {
        return Err(format!("longer than {} characters", UID_PREFIX_MAX));
    }
    if !UID_RE.is_match(value) {
        return Err(format!("`{}` is not a dotted numeric UID root", value));
    }
    Ok(())
}

/// Complete dotted-numeric UID.
pub fn check_uid(value: &str) -> std::result::Result<(), String> {
    if value.len() > UID_MAX_LEN {
        return Err(format!("longer than {} characters", UID_MAX_LEN));
    }
    if !UID_RE.is_match(value) {
        return Err(format!("`{}` is not a dotted numeric UID", value));
    }
    Ok(())
}

fn check_positive(value: f64) -> std::result::Result<(), String> {
    if value > 0. && value.is_finite() {
        Ok(())
    } else {
        Err(format!("{} is not a finite value > 0", value))
    }
}

/// Positive values must not be written as zero.
fn check_written(value: f64, places: usize) -> std::result::Result<(), String> {
    if rounds_to_zero(value, places) {
        return Err(format!("{} is written as 0 with {} decimals", value, places));
    }
    Ok(())
}

fn check_positive_attr(attr: &PrivateAttribute, value: f64) -> std::result::Result<(), String> {
    check_positive(value)?;
    check_written(value, attr.places())
}

fn check_range(res: Result<()>) -> std::result::Result<(), String> {
    res.map_err(|e| e.to_string())
}

fn first_violation(violations: Vec<Violation>) -> Result<()> {
    ValidationReport::from_violations(violations).into_result()
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sex {
    #[serde(rename = "M")]
    Male,
    #[serde(rename = "F")]
    Female,
    #[serde(rename = "O")]
    Other,
}

impl Sex {
    pub fn code(self) -> &'static str {
        match self {
            Sex::Male => "M",
            Sex::Female => "F",
            Sex::Other => "O",
        }
    }
}

impl FromStr for Sex {
    type Err = ThermalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "M" => Ok(Sex::Male),
            "F" => Ok(Sex::Female),
            "O" => Ok(Sex::Other),
            other => Err(ThermalError::validation(
                Field::PatientSex,
                format!("`{}` is not one of M, F, O", other),
            )),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PatientInfo {
    /// DICOM person name, e.g. `DOE^JANE`.
    pub name: Option<String>,
    pub id: Option<String>,
    /// `YYYYMMDD`
    pub birth_date: Option<String>,
    pub sex: Option<Sex>,
    /// Years.
    pub age: Option<u16>,
}

impl PatientInfo {
    pub fn violations(&self) -> Vec<Violation> {
        let mut c = Checker::default();
        if let Some(name) = &self.name {
            c.check_result(Field::PatientName, check_person_name(name));
        }
        if let Some(id) = &self.id {
            c.check_result(Field::PatientId, check_text(id, LO_MAX));
        }
        if let Some(date) = &self.birth_date {
            c.check_result(Field::PatientBirthDate, check_date(date));
        }
        if let Some(age) = self.age {
            c.check(Field::PatientAge, age <= MAX_PATIENT_AGE, || {
                format!("{} is outside 0..={}", age, MAX_PATIENT_AGE)
            });
        }
        c.finish()
    }

    /// DICOM AS encoding (`nnnY`).
    pub fn age_string(&self) -> Option<String> {
        self.age.map(|a| format!("{:03}Y", a))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct StudyInfo {
    pub description: Option<String>,
    pub referring_physician: Option<String>,
    /// Keyword from [`codes::PROCEDURES`].
    pub procedure: Option<String>,
    /// `YYYYMMDD`
    pub date: Option<String>,
    /// `HHMMSS`
    pub time: Option<String>,
    pub study_id: Option<String>,
    pub accession_number: Option<String>,
}

impl StudyInfo {
    pub fn procedure_code(&self) -> Result<Option<&'static Procedure>> {
        self.procedure.as_deref().map(codes::procedure).transpose()
    }

    pub fn violations(&self) -> Vec<Violation> {
        let mut c = Checker::default();
        if let Some(v) = &self.description {
            c.check_result(Field::StudyDescription, check_text(v, LO_MAX));
        }
        if let Some(v) = &self.referring_physician {
            c.check_result(Field::ReferringPhysician, check_person_name(v));
        }
        if let Err(e) = self.procedure_code() {
            c.fail(Field::Procedure, e.to_string());
        }
        if let Some(v) = &self.date {
            c.check_result(Field::StudyDate, check_date(v));
        }
        if let Some(v) = &self.time {
            c.check_result(Field::StudyTime, check_time(v));
        }
        if let Some(v) = &self.study_id {
            c.check_result(Field::StudyId, check_text(v, SH_MAX));
        }
        if let Some(v) = &self.accession_number {
            c.check_result(Field::AccessionNumber, check_text(v, SH_MAX));
        }
        c.finish()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Laterality {
    #[serde(rename = "L")]
    Left,
    #[serde(rename = "R")]
    Right,
    #[serde(rename = "B")]
    Both,
}

impl Laterality {
    pub fn code(self) -> &'static str {
        match self {
            Laterality::Left => "L",
            Laterality::Right => "R",
            Laterality::Both => "B",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "L" => Some(Laterality::Left),
            "R" => Some(Laterality::Right),
            "B" => Some(Laterality::Both),
            _ => None,
        }
    }
}

pub const MODALITIES: &[&str] = &["TG", "OT"];
pub const VIEW_POSITIONS: &[&str] = &[
    "A", "P", "L", "R", "OBL", "LAT", "PA", "AP", "FFS", "HFS", "HFP", "FFP", "HFDL", "HFDR",
    "FFDL", "FFDR",
];

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SeriesInfo {
    pub modality: String,
    pub description: Option<String>,
    pub number: Option<u32>,
    /// Keyword from [`codes::BODY_PARTS`].
    pub body_part: Option<String>,
    pub laterality: Option<Laterality>,
    pub view_position: Option<String>,
    pub acquisition_mode: Option<String>,
}

impl Default for SeriesInfo {
    fn default() -> Self {
        SeriesInfo {
            modality: "TG".into(),
            description: None,
            number: None,
            body_part: None,
            laterality: None,
            view_position: None,
            acquisition_mode: None,
        }
    }
}

impl SeriesInfo {
    pub fn body_part_code(&self) -> Result<Option<&'static BodyPart>> {
        self.body_part.as_deref().map(codes::body_part).transpose()
    }

    pub fn violations(&self) -> Vec<Violation> {
        let mut c = Checker::default();
        c.check(Field::Modality, MODALITIES.contains(&self.modality.as_str()), || {
            format!("`{}` is not one of {:?}", self.modality, MODALITIES)
        });
        if let Some(v) = &self.description {
            c.check_result(Field::SeriesDescription, check_text(v, LO_MAX));
        }
        if let Err(e) = self.body_part_code() {
            c.fail(Field::BodyPart, e.to_string());
        }
        if let Some(v) = &self.view_position {
            c.check(Field::ViewPosition, VIEW_POSITIONS.contains(&v.as_str()), || {
                format!("`{}` is not a supported view position", v)
            });
        }
        if let Some(v) = &self.acquisition_mode {
            c.check_result(Field::AcquisitionMode, check_text(v, LO_MAX));
        }
        c.finish()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct EquipmentInfo {
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub serial_number: Option<String>,
    /// e.g. `UNCOOLED MICROBOLOMETER`
    pub detector_type: Option<String>,
    /// Millimeters per pixel at the object plane.
    pub spatial_resolution: Option<f64>,
    pub software_version: Option<String>,
    pub institution_name: Option<String>,
    /// Root for generated UIDs; `2.25` UUID-derived UIDs
    /// are used when absent.
    pub organization_uid_prefix: Option<String>,
}

impl EquipmentInfo {
    pub fn violations(&self) -> Vec<Violation> {
        let mut c = Checker::default();
        let texts = [
            (Field::Manufacturer, &self.manufacturer),
            (Field::ManufacturerModel, &self.model),
            (Field::DeviceSerialNumber, &self.serial_number),
            (Field::DetectorType, &self.detector_type),
            (Field::SoftwareVersion, &self.software_version),
            (Field::InstitutionName, &self.institution_name),
        ];
        for (field, value) in texts.iter() {
            if let Some(v) = value {
                c.check_result(*field, check_text(v, LO_MAX));
            }
        }
        if let Some(v) = self.spatial_resolution {
            c.check_result(
                Field::SpatialResolution,
                check_positive(v).and_then(|_| check_written(v, PIXEL_SPACING_DECIMALS)),
            );
        }
        if let Some(v) = &self.organization_uid_prefix {
            c.check_result(Field::OrganizationUidPrefix, check_uid_prefix(v));
        }
        c.finish()
    }
}

/// Wavelength band of the detector, in micrometers.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct SpectralRange {
    pub min_um: f64,
    pub max_um: f64,
}

impl SpectralRange {
    pub fn check(&self) -> std::result::Result<(), String> {
        if self.min_um > 0. && self.max_um > self.min_um && self.max_um <= 1000. {
            Ok(())
        } else {
            Err(format!(
                "{}-{} µm is not an increasing band within (0, 1000]",
                self.min_um, self.max_um
            ))
        }
    }
}

impl fmt::Display for SpectralRange {
    /// Canonical SH encoding, e.g. `7.50-14.00um`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}-{:.2}um", self.min_um, self.max_um)
    }
}

impl FromStr for SpectralRange {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, String> {
        let caps = SPECTRAL_RANGE_RE
            .captures(s.trim())
            .ok_or_else(|| format!("`{}` is not a `<min>-<max>um` band", s))?;
        let parse = |i: usize| caps[i].parse::<f64>().map_err(|e| e.to_string());
        Ok(SpectralRange {
            min_um: parse(1)?,
            max_um: parse(2)?,
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ThermalParameters {
    pub emissivity: Option<f64>,
    /// Meters.
    pub distance_from_camera: Option<f64>,
    /// °C
    pub ambient_temperature: Option<f64>,
    /// °C
    pub reflected_temperature: Option<f64>,
    /// Percent.
    pub relative_humidity: Option<f64>,
    /// °C
    pub atmospheric_temperature: Option<f64>,
    pub camera_model: Option<String>,
    pub spectral_range: Option<SpectralRange>,
    /// NETD, kelvin.
    #[serde(alias = "netd")]
    pub thermal_sensitivity: Option<f64>,
    pub temperature_unit: TemperatureUnit,
}

impl ThermalParameters {
    pub fn from_calibration(params: &CalibrationParameters) -> Self {
        ThermalParameters {
            emissivity: Some(params.emissivity),
            distance_from_camera: Some(params.distance_from_camera),
            ambient_temperature: Some(params.ambient_temperature),
            reflected_temperature: params.reflected_temperature,
            relative_humidity: Some(params.relative_humidity),
            atmospheric_temperature: params.atmospheric_temperature,
            ..Default::default()
        }
    }

    /// Parameters for [`calibrate`][crate::calibration::calibrate].
    /// Emissivity, distance, ambient temperature and humidity
    /// must be present.
    pub fn calibration_parameters(&self) -> Result<CalibrationParameters> {
        let required = [
            (Field::Emissivity, self.emissivity),
            (Field::DistanceFromCamera, self.distance_from_camera),
            (Field::AmbientTemperature, self.ambient_temperature),
            (Field::RelativeHumidity, self.relative_humidity),
        ];
        let missing: Vec<Field> = required
            .iter()
            .filter(|(_, v)| v.is_none())
            .map(|(f, _)| *f)
            .collect();
        match (
            self.emissivity,
            self.distance_from_camera,
            self.ambient_temperature,
            self.relative_humidity,
        ) {
            (Some(e), Some(d), Some(a), Some(h)) => {
                let params = CalibrationParameters {
                    emissivity: e,
                    distance_from_camera: d,
                    ambient_temperature: a,
                    reflected_temperature: self.reflected_temperature,
                    relative_humidity: h,
                    atmospheric_temperature: self.atmospheric_temperature,
                };
                params.validate()?;
                Ok(params)
            }
            _ => Err(ThermalError::IncompleteMetadata { missing }),
        }
    }

    /// [`calibration_parameters`][Self::calibration_parameters],
    /// taking each missing value from `fallback`.
    pub fn calibration_parameters_or(
        &self,
        fallback: &CalibrationParameters,
    ) -> Result<CalibrationParameters> {
        let params = CalibrationParameters {
            emissivity: self.emissivity.unwrap_or(fallback.emissivity),
            distance_from_camera: self
                .distance_from_camera
                .unwrap_or(fallback.distance_from_camera),
            ambient_temperature: self
                .ambient_temperature
                .unwrap_or(fallback.ambient_temperature),
            reflected_temperature: self
                .reflected_temperature
                .or(fallback.reflected_temperature),
            relative_humidity: self.relative_humidity.unwrap_or(fallback.relative_humidity),
            atmospheric_temperature: self
                .atmospheric_temperature
                .or(fallback.atmospheric_temperature),
        };
        params.validate()?;
        Ok(params)
    }

    pub fn violations(&self) -> Vec<Violation> {
        let mut c = Checker::default();
        if let Some(v) = self.emissivity {
            c.check_result(
                Field::Emissivity,
                check_range(check_emissivity(v))
                    .and_then(|_| check_written(v, tags::EMISSIVITY.places())),
            );
        }
        if let Some(v) = self.distance_from_camera {
            c.check_result(
                Field::DistanceFromCamera,
                check_range(check_distance(v))
                    .and_then(|_| check_written(v, tags::DISTANCE_FROM_CAMERA.places())),
            );
        }
        if let Some(v) = self.relative_humidity {
            c.check_result(Field::RelativeHumidity, check_range(check_humidity(v)));
        }
        let temperatures = [
            (Field::AmbientTemperature, "ambient_temperature", self.ambient_temperature),
            (Field::ReflectedTemperature, "reflected_temperature", self.reflected_temperature),
            (
                Field::AtmosphericTemperature,
                "atmospheric_temperature",
                self.atmospheric_temperature,
            ),
        ];
        for (field, name, value) in temperatures.iter() {
            if let Some(v) = value {
                c.check_result(*field, check_range(check_environment_temperature(*name, *v)));
            }
        }
        if let Some(v) = &self.camera_model {
            c.check_result(Field::CameraModel, check_text(v, LO_MAX));
        }
        if let Some(v) = &self.spectral_range {
            c.check_result(Field::SpectralRange, v.check());
        }
        if let Some(v) = self.thermal_sensitivity {
            c.check_result(
                Field::ThermalSensitivity,
                check_positive_attr(&tags::THERMAL_SENSITIVITY, v),
            );
        }
        c.finish()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct QualityControl {
    /// Flat-field uniformity check passed.
    pub uniformity_check: Option<bool>,
    /// Measured NETD, kelvin.
    pub measured_netd: Option<f64>,
    pub bad_pixel_count: Option<u32>,
    pub resolution_test: Option<bool>,
    /// ± °C against a reference source.
    pub temperature_accuracy: Option<f64>,
    /// `YYYYMMDD`
    pub calibration_date: Option<String>,
}

impl QualityControl {
    pub fn violations(&self) -> Vec<Violation> {
        let mut c = Checker::default();
        if let Some(v) = self.measured_netd {
            c.check_result(Field::MeasuredNetd, check_positive_attr(&tags::MEASURED_NETD, v));
        }
        if let Some(v) = self.temperature_accuracy {
            c.check_result(
                Field::TemperatureAccuracy,
                check_positive_attr(&tags::TEMPERATURE_ACCURACY, v),
            );
        }
        if let Some(v) = &self.calibration_date {
            c.check_result(Field::CalibrationDate, check_date(v));
        }
        c.finish()
    }
}

/// The JSON shape of a [`ThermalMetadataRecord`].
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct MetadataDocument {
    pub patient: PatientInfo,
    pub study: StudyInfo,
    pub series: SeriesInfo,
    pub equipment: EquipmentInfo,
    pub thermal: ThermalParameters,
    pub quality_control: QualityControl,
}

/// Validated metadata of one thermal image.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(try_from = "MetadataDocument")]
pub struct ThermalMetadataRecord {
    patient: PatientInfo,
    study: StudyInfo,
    series: SeriesInfo,
    equipment: EquipmentInfo,
    thermal: ThermalParameters,
    quality_control: QualityControl,
}

impl TryFrom<MetadataDocument> for ThermalMetadataRecord {
    type Error = ThermalError;

    fn try_from(doc: MetadataDocument) -> Result<Self> {
        let record = ThermalMetadataRecord {
            patient: doc.patient,
            study: doc.study,
            series: doc.series,
            equipment: doc.equipment,
            thermal: doc.thermal,
            quality_control: doc.quality_control,
        };
        record.validate().into_result()?;
        Ok(record)
    }
}

impl ThermalMetadataRecord {
    pub fn patient(&self) -> &PatientInfo {
        &self.patient
    }

    pub fn study(&self) -> &StudyInfo {
        &self.study
    }

    pub fn series(&self) -> &SeriesInfo {
        &self.series
    }

    pub fn equipment(&self) -> &EquipmentInfo {
        &self.equipment
    }

    pub fn thermal(&self) -> &ThermalParameters {
        &self.thermal
    }

    pub fn quality_control(&self) -> &QualityControl {
        &self.quality_control
    }

    pub fn set_patient(&mut self, patient: PatientInfo) -> Result<()> {
        first_violation(patient.violations())?;
        self.patient = patient;
        Ok(())
    }

    /// Fails with [`ThermalError::UnknownProcedure`] for
    /// procedure keywords outside the code table.
    pub fn set_study(&mut self, study: StudyInfo) -> Result<()> {
        study.procedure_code()?;
        first_violation(study.violations())?;
        self.study = study;
        Ok(())
    }

    pub fn set_series(&mut self, series: SeriesInfo) -> Result<()> {
        series.body_part_code()?;
        first_violation(series.violations())?;
        self.series = series;
        Ok(())
    }

    pub fn set_equipment(&mut self, equipment: EquipmentInfo) -> Result<()> {
        first_violation(equipment.violations())?;
        self.equipment = equipment;
        Ok(())
    }

    pub fn set_thermal_parameters(&mut self, thermal: ThermalParameters) -> Result<()> {
        first_violation(thermal.violations())?;
        self.thermal = thermal;
        Ok(())
    }

    /// Store scene parameters already checked by
    /// [`CalibrationParameters::validate`], keeping the
    /// camera description.
    pub fn set_calibration_parameters(&mut self, params: &CalibrationParameters) -> Result<()> {
        params.validate()?;
        let from = ThermalParameters::from_calibration(params);
        self.thermal = ThermalParameters {
            camera_model: self.thermal.camera_model.take(),
            spectral_range: self.thermal.spectral_range,
            thermal_sensitivity: self.thermal.thermal_sensitivity,
            temperature_unit: self.thermal.temperature_unit,
            ..from
        };
        Ok(())
    }

    /// Unit of the encoded temperature grid.
    pub fn set_temperature_unit(&mut self, unit: TemperatureUnit) {
        self.thermal.temperature_unit = unit;
    }

    pub fn set_quality_control(&mut self, qc: QualityControl) -> Result<()> {
        first_violation(qc.violations())?;
        self.quality_control = qc;
        Ok(())
    }

    /// Every rule violation across all groups.
    pub fn validate(&self) -> ValidationReport {
        let violations = self
            .patient
            .violations()
            .into_iter()
            .chain(self.study.violations())
            .chain(self.series.violations())
            .chain(self.equipment.violations())
            .chain(self.thermal.violations())
            .chain(self.quality_control.violations())
            .collect();
        ValidationReport::from_violations(violations)
    }

    /// Required fields that are missing and recommended
    /// fields that are absent. Never fails.
    pub fn validate_completeness(&self) -> CompletenessReport {
        let mut report = CompletenessReport::default();

        let required = [
            (Field::PatientId, is_blank(&self.patient.id)),
            (Field::PatientName, is_blank(&self.patient.name)),
            (Field::StudyDescription, is_blank(&self.study.description)),
            (Field::Emissivity, self.thermal.emissivity.is_none()),
            (
                Field::DistanceFromCamera,
                self.thermal.distance_from_camera.is_none(),
            ),
        ];
        report.missing_required = required
            .iter()
            .filter(|(_, missing)| *missing)
            .map(|(f, _)| *f)
            .collect();

        let recommended = [
            (
                Field::ReferringPhysician,
                is_blank(&self.study.referring_physician),
            ),
            (
                Field::SpatialResolution,
                self.equipment.spatial_resolution.is_none(),
            ),
            (Field::PatientBirthDate, is_blank(&self.patient.birth_date)),
            (Field::PatientSex, self.patient.sex.is_none()),
            (
                Field::AmbientTemperature,
                self.thermal.ambient_temperature.is_none(),
            ),
            (Field::CameraModel, is_blank(&self.thermal.camera_model)),
            (Field::Manufacturer, is_blank(&self.equipment.manufacturer)),
            (
                Field::ThermalSensitivity,
                self.thermal.thermal_sensitivity.is_none(),
            ),
        ];
        report.warnings = recommended
            .iter()
            .filter(|(_, missing)| *missing)
            .map(|(f, _)| *f)
            .collect();

        report
    }

    pub fn is_complete(&self) -> bool {
        self.validate_completeness().is_complete()
    }

    /// Load and validate a JSON metadata document.
    pub fn from_json_reader<R: std::io::Read>(rdr: R) -> Result<Self> {
        serde_json::from_reader(rdr).map_err(|e| {
            if e.is_io() {
                ThermalError::Io(e.to_string())
            } else {
                ThermalError::Document(e.to_string())
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn complete_record() -> ThermalMetadataRecord {
        let mut record = ThermalMetadataRecord::default();
        record
            .set_patient(PatientInfo {
                name: Some("DOE^JANE".into()),
                id: Some("P-0042".into()),
                birth_date: Some("19800229".into()),
                sex: Some(Sex::Female),
                age: Some(45),
            })
            .unwrap();
        record
            .set_study(StudyInfo {
                description: Some("Breast thermography".into()),
                procedure: Some("breast_thermography".into()),
                ..Default::default()
            })
            .unwrap();
        record
            .set_calibration_parameters(&CalibrationParameters::new(0.98, 1.0, 22.0))
            .unwrap();
        record
    }

    #[test]
    fn missing_patient_id_is_always_reported() {
        let mut record = complete_record();
        assert!(record.is_complete());

        let mut patient = record.patient().clone();
        patient.id = None;
        record.set_patient(patient.clone()).unwrap();
        assert!(record
            .validate_completeness()
            .missing_required
            .contains(&Field::PatientId));

        // blank ids count as missing
        patient.id = Some("  ".into());
        record.set_patient(patient).unwrap();
        let report = record.validate_completeness();
        assert_eq!(
            report.missing_required.into_iter().collect::<Vec<_>>(),
            vec![Field::PatientId]
        );
    }

    #[test]
    fn empty_record_misses_all_required() {
        let report = ThermalMetadataRecord::default().validate_completeness();
        assert_eq!(report.missing_required.len(), 5);
        assert!(report.warnings.contains(&Field::ReferringPhysician));
        assert!(report.warnings.contains(&Field::SpatialResolution));
    }

    #[test]
    fn setters_reject_first_violation() {
        let mut record = ThermalMetadataRecord::default();
        let err = record
            .set_patient(PatientInfo {
                birth_date: Some("20230230".into()),
                age: Some(200),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(
            err,
            ThermalError::Validation {
                field: Field::PatientBirthDate,
                ..
            }
        ));
        // nothing stored
        assert_eq!(record.patient(), &PatientInfo::default());
    }

    #[test]
    fn unknown_procedure() {
        let mut record = ThermalMetadataRecord::default();
        let err = record
            .set_study(StudyInfo {
                procedure: Some("palm_reading".into()),
                ..Default::default()
            })
            .unwrap_err();
        assert_eq!(err, ThermalError::UnknownProcedure("palm_reading".into()));
    }

    #[test]
    fn sex_codes() {
        assert_eq!("F".parse::<Sex>().unwrap(), Sex::Female);
        assert!(matches!(
            "X".parse::<Sex>(),
            Err(ThermalError::Validation {
                field: Field::PatientSex,
                ..
            })
        ));
        let patient: std::result::Result<PatientInfo, _> =
            serde_json::from_str(r#"{"sex": "Q"}"#);
        assert!(patient.is_err());
    }

    #[test]
    fn accumulates_all_violations() {
        let doc = MetadataDocument {
            patient: PatientInfo {
                age: Some(151),
                ..Default::default()
            },
            thermal: ThermalParameters {
                emissivity: Some(1.5),
                relative_humidity: Some(-1.),
                ..Default::default()
            },
            quality_control: QualityControl {
                calibration_date: Some("2024-01-01".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        let record = ThermalMetadataRecord {
            patient: doc.patient,
            study: doc.study,
            series: doc.series,
            equipment: doc.equipment,
            thermal: doc.thermal,
            quality_control: doc.quality_control,
        };
        let report = record.validate();
        assert!(!report.valid);
        let fields: Vec<Field> = report.violations.iter().map(|v| v.field).collect();
        assert_eq!(
            fields,
            vec![
                Field::PatientAge,
                Field::Emissivity,
                Field::RelativeHumidity,
                Field::CalibrationDate
            ]
        );
    }

    #[test]
    fn document_rejects_unknown_keys() {
        let ok = r#"{
            "patient": {"name": "DOE^JOHN", "id": "7"},
            "study": {"description": "Hands", "procedure": "vascular_assessment"},
            "series": {"body_part": "hand", "laterality": "B"},
            "thermal": {"emissivity": 0.98, "distance_from_camera": 1.0,
                        "spectral_range": {"min_um": 7.5, "max_um": 14.0}, "netd": 0.05}
        }"#;
        let record: ThermalMetadataRecord = serde_json::from_str(ok).unwrap();
        assert!(record.is_complete());
        assert_eq!(record.thermal().thermal_sensitivity, Some(0.05));

        let unknown = r#"{"patient": {"name": "DOE^JOHN", "favourite_colour": "red"}}"#;
        assert!(serde_json::from_str::<ThermalMetadataRecord>(unknown).is_err());

        let invalid = r#"{"thermal": {"emissivity": 2.0}}"#;
        assert!(serde_json::from_str::<ThermalMetadataRecord>(invalid).is_err());
    }

    #[test]
    fn calibration_parameters_need_scene() {
        let record = complete_record();
        let params = record.thermal().calibration_parameters().unwrap();
        assert_eq!(params.emissivity, 0.98);

        let partial = ThermalParameters {
            emissivity: Some(0.98),
            ..Default::default()
        };
        assert_eq!(
            partial.calibration_parameters(),
            Err(ThermalError::IncompleteMetadata {
                missing: vec![
                    Field::DistanceFromCamera,
                    Field::AmbientTemperature,
                    Field::RelativeHumidity
                ]
            })
        );
    }

    #[test]
    fn scene_merges_camera_values() -> anyhow::Result<()> {
        let clinician = ThermalParameters {
            emissivity: Some(0.98),
            distance_from_camera: Some(1.0),
            ..Default::default()
        };
        let camera = CalibrationParameters::new(0.95, 3.0, 24.0)
            .with_relative_humidity(40.)
            .with_reflected_temperature(23.);
        let params = clinician.calibration_parameters_or(&camera)?;
        assert_eq!(params.emissivity, 0.98);
        assert_eq!(params.distance_from_camera, 1.0);
        assert_eq!(params.ambient_temperature, 24.0);
        assert_eq!(params.relative_humidity, 40.);
        assert_eq!(params.reflected_temperature, Some(23.));
        Ok(())
    }

    #[test]
    fn json_errors_are_thermal_errors() {
        let invalid = br#"{"thermal": {"emissivity": 2.0}}"#;
        let err = ThermalMetadataRecord::from_json_reader(&invalid[..]).unwrap_err();
        assert!(matches!(err, ThermalError::Document(_)));
        assert!(ThermalMetadataRecord::from_json_reader(&br#"{"patient": {}}"#[..]).is_ok());
    }

    #[test]
    fn detector_type_is_long_text() {
        let equipment = EquipmentInfo {
            detector_type: Some("UNCOOLED MICROBOLOMETER".into()),
            ..Default::default()
        };
        assert!(equipment.violations().is_empty());
        let equipment = EquipmentInfo {
            detector_type: Some("X".repeat(65)),
            ..Default::default()
        };
        assert_eq!(equipment.violations()[0].field, Field::DetectorType);
    }

    #[test]
    fn values_must_survive_their_decimals() {
        let thermal = ThermalParameters {
            emissivity: Some(0.0004),
            thermal_sensitivity: Some(0.0001),
            ..Default::default()
        };
        let fields: Vec<Field> = thermal.violations().iter().map(|v| v.field).collect();
        assert_eq!(fields, vec![Field::Emissivity, Field::ThermalSensitivity]);

        let qc = QualityControl {
            measured_netd: Some(0.0002),
            temperature_accuracy: Some(0.004),
            ..Default::default()
        };
        let fields: Vec<Field> = qc.violations().iter().map(|v| v.field).collect();
        assert_eq!(fields, vec![Field::MeasuredNetd, Field::TemperatureAccuracy]);

        let equipment = EquipmentInfo {
            spatial_resolution: Some(0.00004),
            ..Default::default()
        };
        assert_eq!(equipment.violations()[0].field, Field::SpatialResolution);
    }

    #[test]
    fn spectral_range_text() {
        let band = SpectralRange {
            min_um: 7.5,
            max_um: 14.,
        };
        assert_eq!(band.to_string(), "7.50-14.00um");
        assert_eq!("7.50-14.00um".parse::<SpectralRange>().unwrap(), band);
        assert!("14-7um".parse::<SpectralRange>().unwrap().check().is_err());
    }

    #[test]
    fn text_rules() {
        assert!(check_uid_prefix("1.2.826.0.1.3680043").is_ok());
        assert!(check_uid_prefix("1.02.3").is_err());
        assert!(check_uid_prefix("1..2").is_err());
        assert!(check_time("143015.25").is_ok());
        assert!(check_time("251500").is_err());
        assert!(check_person_name("A^B^C^D^E^F").is_err());
        assert!(check_uid("1.2.840.10008.5.1.4.1.1.7").is_ok());
        assert!(check_uid("1.2.abc").is_err());
        assert!(check_uid(&format!("2.25.{}", "1".repeat(61))).is_err());
        assert_eq!(
            PatientInfo {
                age: Some(7),
                ..Default::default()
            }
            .age_string()
            .as_deref(),
            Some("007Y")
        );
    }
}
