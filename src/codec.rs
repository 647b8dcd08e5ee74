//! Mapping between thermal objects and DICOM datasets.
//!
//! Patient, study, series and equipment information use
//! standard attributes. Thermal parameters and quality
//! control use the [private schema][crate::tags]. The
//! temperature grid is stored losslessly as Double Float
//! Pixel Data in the unit recorded by the
//! `TEMPERATURE_UNIT` private attribute.

use std::{convert::TryFrom, fmt::Display, str::FromStr};

use dicom::{
    core::{value::DataSetSequence, DataElement, PrimitiveValue, Tag, VR},
    dictionary_std::{tags, uids},
    object::InMemDicomObject,
};
use image::RgbImage;
use ndarray::Array2;
use tracing::debug;

use crate::{
    codes::{self, CodedEntry},
    dataset::InstanceUids,
    error::{Result, ThermalError},
    field::TemperatureField,
    metadata::{
        EquipmentInfo, Laterality, MetadataDocument, PatientInfo, QualityControl, SeriesInfo,
        Sex, SpectralRange, StudyInfo, ThermalMetadataRecord, ThermalParameters,
    },
    tags::{self as private, standard, PrivateAttribute},
    units::TemperatureUnit,
};

pub const SOP_CLASS_UID: &str = uids::SECONDARY_CAPTURE_IMAGE_STORAGE;

/// Everything that goes into one dataset.
pub(crate) struct Parts<'a> {
    pub field: &'a TemperatureField,
    pub display: Option<&'a RgbImage>,
    pub overlay: Option<&'a Array2<bool>>,
    pub metadata: &'a ThermalMetadataRecord,
    pub uids: &'a InstanceUids,
}

/// Owned counterpart of [`Parts`] read back from a dataset.
pub(crate) struct Decoded {
    pub field: TemperatureField,
    pub display: Option<RgbImage>,
    pub overlay: Option<Array2<bool>>,
    pub metadata: ThermalMetadataRecord,
    pub uids: InstanceUids,
}

struct Writer {
    obj: InMemDicomObject,
}

impl Writer {
    fn put(&mut self, tag: Tag, vr: VR, value: PrimitiveValue) {
        self.obj.put(DataElement::new(tag, vr, value));
    }

    fn str(&mut self, tag: Tag, vr: VR, value: &str) {
        self.put(tag, vr, PrimitiveValue::from(value));
    }

    /// Type 3: omitted when absent.
    fn optional(&mut self, tag: Tag, vr: VR, value: Option<&str>) {
        if let Some(v) = value {
            self.str(tag, vr, v);
        }
    }

    /// Type 2: zero length when absent.
    fn required(&mut self, tag: Tag, vr: VR, value: Option<&str>) {
        match value {
            Some(v) => self.str(tag, vr, v),
            None => self.put(tag, vr, PrimitiveValue::Empty),
        }
    }

    fn private_text(&mut self, attr: &PrivateAttribute, value: Option<&str>) {
        self.optional(attr.tag(), attr.vr, value);
    }

    fn private_decimal(&mut self, attr: &PrivateAttribute, value: Option<f64>) {
        if let Some(v) = value {
            let text = attr.format_decimal(v);
            self.str(attr.tag(), attr.vr, &text);
        }
    }

    fn private_flag(&mut self, attr: &PrivateAttribute, value: Option<bool>) {
        self.private_text(attr, value.map(private::format_flag));
    }

    fn code_sequence(&mut self, tag: Tag, code: &CodedEntry) {
        let item = InMemDicomObject::from_element_iter([
            DataElement::new(tags::CODE_VALUE, VR::SH, PrimitiveValue::from(code.value)),
            DataElement::new(
                tags::CODING_SCHEME_DESIGNATOR,
                VR::SH,
                PrimitiveValue::from(code.scheme),
            ),
            DataElement::new(tags::CODE_MEANING, VR::LO, PrimitiveValue::from(code.meaning)),
        ]);
        self.obj
            .put(DataElement::new(tag, VR::SQ, DataSetSequence::from(vec![item])));
    }

    fn strs(&mut self, tag: Tag, vr: VR, values: Vec<String>) {
        self.put(tag, vr, PrimitiveValue::Strs(values.into()));
    }
}

pub(crate) fn encode(parts: &Parts<'_>) -> Result<InMemDicomObject> {
    let mut w = Writer {
        obj: InMemDicomObject::new_empty(),
    };
    let record = parts.metadata;

    w.str(tags::SPECIFIC_CHARACTER_SET, VR::CS, "ISO_IR 192");
    w.strs(
        tags::IMAGE_TYPE,
        VR::CS,
        vec!["ORIGINAL".into(), "PRIMARY".into()],
    );
    w.str(tags::SOP_CLASS_UID, VR::UI, SOP_CLASS_UID);
    w.str(tags::SOP_INSTANCE_UID, VR::UI, &parts.uids.sop_instance);
    w.str(tags::STUDY_INSTANCE_UID, VR::UI, &parts.uids.study);
    w.str(tags::SERIES_INSTANCE_UID, VR::UI, &parts.uids.series);
    w.str(tags::CONVERSION_TYPE, VR::CS, "WSD");
    w.str(tags::INSTANCE_NUMBER, VR::IS, "1");

    encode_patient(&mut w, record.patient());
    encode_study(&mut w, record.study())?;
    encode_series(&mut w, record.series())?;
    encode_equipment(&mut w, record.equipment());
    encode_thermal(&mut w, record.thermal());
    encode_quality_control(&mut w, record.quality_control());

    encode_field(&mut w, parts.field)?;
    if let Some(display) = parts.display {
        encode_display(&mut w, display)?;
    }
    if let Some(mask) = parts.overlay {
        encode_overlay(&mut w, mask)?;
    }

    debug!(
        sop_instance = %parts.uids.sop_instance,
        rows = parts.field.rows(),
        cols = parts.field.cols(),
        "encoded thermal dataset"
    );
    Ok(w.obj)
}

fn encode_patient(w: &mut Writer, patient: &PatientInfo) {
    w.required(tags::PATIENT_NAME, VR::PN, patient.name.as_deref());
    w.required(tags::PATIENT_ID, VR::LO, patient.id.as_deref());
    w.required(
        tags::PATIENT_BIRTH_DATE,
        VR::DA,
        patient.birth_date.as_deref(),
    );
    w.required(tags::PATIENT_SEX, VR::CS, patient.sex.map(Sex::code));
    w.optional(tags::PATIENT_AGE, VR::AS, patient.age_string().as_deref());
}

fn encode_study(w: &mut Writer, study: &StudyInfo) -> Result<()> {
    w.optional(tags::STUDY_DESCRIPTION, VR::LO, study.description.as_deref());
    w.required(
        tags::REFERRING_PHYSICIAN_NAME,
        VR::PN,
        study.referring_physician.as_deref(),
    );
    w.required(tags::STUDY_DATE, VR::DA, study.date.as_deref());
    w.required(tags::STUDY_TIME, VR::TM, study.time.as_deref());
    w.required(tags::STUDY_ID, VR::SH, study.study_id.as_deref());
    w.required(
        tags::ACCESSION_NUMBER,
        VR::SH,
        study.accession_number.as_deref(),
    );
    if let Some(procedure) = study.procedure_code()? {
        w.code_sequence(tags::PROCEDURE_CODE_SEQUENCE, &procedure.code);
    }
    Ok(())
}

fn encode_series(w: &mut Writer, series: &SeriesInfo) -> Result<()> {
    w.str(tags::MODALITY, VR::CS, &series.modality);
    w.optional(
        tags::SERIES_DESCRIPTION,
        VR::LO,
        series.description.as_deref(),
    );
    let number = series.number.map(|n| n.to_string());
    w.required(tags::SERIES_NUMBER, VR::IS, number.as_deref());
    if let Some(part) = series.body_part_code()? {
        w.str(tags::BODY_PART_EXAMINED, VR::CS, part.examined);
        w.code_sequence(tags::ANATOMIC_REGION_SEQUENCE, &part.code);
    }
    w.optional(
        tags::IMAGE_LATERALITY,
        VR::CS,
        series.laterality.map(Laterality::code),
    );
    w.optional(tags::VIEW_POSITION, VR::CS, series.view_position.as_deref());
    w.optional(
        tags::ACQUISITION_DEVICE_PROCESSING_DESCRIPTION,
        VR::LO,
        series.acquisition_mode.as_deref(),
    );
    Ok(())
}

fn encode_equipment(w: &mut Writer, equipment: &EquipmentInfo) {
    w.required(tags::MANUFACTURER, VR::LO, equipment.manufacturer.as_deref());
    w.optional(
        tags::MANUFACTURER_MODEL_NAME,
        VR::LO,
        equipment.model.as_deref(),
    );
    w.optional(
        tags::DEVICE_SERIAL_NUMBER,
        VR::LO,
        equipment.serial_number.as_deref(),
    );
    w.optional(
        tags::SOFTWARE_VERSIONS,
        VR::LO,
        equipment.software_version.as_deref(),
    );
    w.optional(
        tags::INSTITUTION_NAME,
        VR::LO,
        equipment.institution_name.as_deref(),
    );
    if let Some(spacing) = equipment.spatial_resolution {
        let value = private::format_decimal(spacing, private::PIXEL_SPACING_DECIMALS);
        w.strs(tags::PIXEL_SPACING, VR::DS, vec![value.clone(), value]);
    }

    w.str(private::PRIVATE_CREATOR_TAG, VR::LO, private::PRIVATE_CREATOR);
    w.private_text(&private::SCHEMA_VERSION_ATTR, Some(private::SCHEMA_VERSION));
    w.private_text(
        &private::DETECTOR_TYPE,
        equipment.detector_type.as_deref(),
    );
    w.private_text(
        &private::ORGANIZATION_UID_ROOT,
        equipment.organization_uid_prefix.as_deref(),
    );
}

fn encode_thermal(w: &mut Writer, thermal: &ThermalParameters) {
    w.private_decimal(&private::EMISSIVITY, thermal.emissivity);
    w.private_decimal(
        &private::DISTANCE_FROM_CAMERA,
        thermal.distance_from_camera,
    );
    w.private_decimal(
        &private::AMBIENT_TEMPERATURE,
        thermal.ambient_temperature,
    );
    w.private_decimal(
        &private::REFLECTED_TEMPERATURE,
        thermal.reflected_temperature,
    );
    w.private_decimal(&private::RELATIVE_HUMIDITY, thermal.relative_humidity);
    w.private_decimal(
        &private::ATMOSPHERIC_TEMPERATURE,
        thermal.atmospheric_temperature,
    );
    w.private_text(&private::CAMERA_MODEL, thermal.camera_model.as_deref());
    let band = thermal.spectral_range.map(|r| r.to_string());
    w.private_text(&private::SPECTRAL_RANGE, band.as_deref());
    w.private_decimal(
        &private::THERMAL_SENSITIVITY,
        thermal.thermal_sensitivity,
    );
    w.private_text(
        &private::TEMPERATURE_UNIT,
        Some(thermal.temperature_unit.code()),
    );
}

fn encode_quality_control(w: &mut Writer, qc: &QualityControl) {
    w.private_flag(&private::UNIFORMITY_CHECK, qc.uniformity_check);
    w.private_decimal(&private::MEASURED_NETD, qc.measured_netd);
    let count = qc.bad_pixel_count.map(|c| c.to_string());
    w.private_text(&private::BAD_PIXEL_COUNT, count.as_deref());
    w.private_flag(&private::RESOLUTION_TEST, qc.resolution_test);
    w.private_decimal(&private::TEMPERATURE_ACCURACY, qc.temperature_accuracy);
    w.optional(
        tags::DATE_OF_LAST_CALIBRATION,
        VR::DA,
        qc.calibration_date.as_deref(),
    );
}

fn dimension(what: &'static str, rows: usize, cols: usize) -> Result<(u16, u16)> {
    match (u16::try_from(rows), u16::try_from(cols)) {
        (Ok(r), Ok(c)) if r > 0 && c > 0 => Ok((r, c)),
        _ => Err(ThermalError::ShapeMismatch {
            what,
            expected: (u16::MAX as usize, u16::MAX as usize),
            found: (rows, cols),
        }),
    }
}

fn encode_field(w: &mut Writer, field: &TemperatureField) -> Result<()> {
    let (rows, cols) = dimension("temperature field", field.rows(), field.cols())?;
    w.put(tags::ROWS, VR::US, PrimitiveValue::from(rows));
    w.put(tags::COLUMNS, VR::US, PrimitiveValue::from(cols));
    w.put(tags::SAMPLES_PER_PIXEL, VR::US, PrimitiveValue::from(1u16));
    w.str(tags::PHOTOMETRIC_INTERPRETATION, VR::CS, "MONOCHROME2");
    w.put(tags::BITS_ALLOCATED, VR::US, PrimitiveValue::from(64u16));
    w.put(
        standard::DOUBLE_FLOAT_PIXEL_DATA,
        VR::OD,
        PrimitiveValue::F64(field.to_vec().into()),
    );
    Ok(())
}

fn encode_display(w: &mut Writer, display: &RgbImage) -> Result<()> {
    let (rows, cols) = dimension(
        "display image",
        display.height() as usize,
        display.width() as usize,
    )?;
    w.put(
        private::DISPLAY_ROWS.tag(),
        VR::US,
        PrimitiveValue::from(rows),
    );
    w.put(
        private::DISPLAY_COLUMNS.tag(),
        VR::US,
        PrimitiveValue::from(cols),
    );
    w.strs(
        private::DISPLAY_IMAGE_TYPE.tag(),
        private::DISPLAY_IMAGE_TYPE.vr,
        private::DISPLAY_IMAGE_TYPE_VALUE
            .iter()
            .map(|s| s.to_string())
            .collect(),
    );
    let mut bytes = display.as_raw().clone();
    if bytes.len() % 2 == 1 {
        bytes.push(0);
    }
    w.put(
        private::DISPLAY_IMAGE.tag(),
        VR::OB,
        PrimitiveValue::U8(bytes.into()),
    );
    Ok(())
}

/// Overlay bits, row-major, least significant bit first,
/// padded to an even number of bytes.
pub(crate) fn pack_bits(mask: &Array2<bool>) -> Vec<u8> {
    let mut bytes = vec![0u8; (mask.len() + 7) / 8];
    for (i, _) in mask.iter().enumerate().filter(|&(_, &set)| set) {
        bytes[i / 8] |= 1 << (i % 8);
    }
    if bytes.len() % 2 == 1 {
        bytes.push(0);
    }
    bytes
}

pub(crate) fn unpack_bits(bytes: &[u8], rows: usize, cols: usize) -> Option<Array2<bool>> {
    if bytes.len() * 8 < rows * cols {
        return None;
    }
    Some(Array2::from_shape_fn((rows, cols), |(r, c)| {
        let i = r * cols + c;
        bytes[i / 8] & (1 << (i % 8)) != 0
    }))
}

fn encode_overlay(w: &mut Writer, mask: &Array2<bool>) -> Result<()> {
    let (rows, cols) = dimension("overlay", mask.nrows(), mask.ncols())?;
    w.put(standard::OVERLAY_ROWS, VR::US, PrimitiveValue::from(rows));
    w.put(standard::OVERLAY_COLUMNS, VR::US, PrimitiveValue::from(cols));
    w.str(standard::OVERLAY_TYPE, VR::CS, "R");
    w.str(standard::OVERLAY_DESCRIPTION, VR::LO, "REGION OF INTEREST");
    w.put(
        standard::OVERLAY_ORIGIN,
        VR::SS,
        PrimitiveValue::I16(vec![1i16, 1].into()),
    );
    w.put(
        standard::OVERLAY_BITS_ALLOCATED,
        VR::US,
        PrimitiveValue::from(1u16),
    );
    w.put(
        standard::OVERLAY_BIT_POSITION,
        VR::US,
        PrimitiveValue::from(0u16),
    );
    w.put(
        standard::OVERLAY_DATA,
        VR::OB,
        PrimitiveValue::U8(pack_bits(mask).into()),
    );
    Ok(())
}

/// Add or replace the overlay plane of an encoded dataset.
pub(crate) fn put_overlay(obj: InMemDicomObject, mask: &Array2<bool>) -> Result<InMemDicomObject> {
    let mut w = Writer { obj };
    encode_overlay(&mut w, mask)?;
    Ok(w.obj)
}

struct Reader<'a> {
    obj: &'a InMemDicomObject,
}

impl<'a> Reader<'a> {
    /// Trimmed text of `tag`; absent and empty are `None`.
    fn text(&self, tag: Tag) -> Result<Option<String>> {
        let elem = match self.obj.element(tag) {
            Ok(elem) => elem,
            Err(_) => return Ok(None),
        };
        let value = elem
            .to_str()
            .map_err(|e| ThermalError::malformed(tag, e.to_string()))?;
        let value = value.trim_end_matches(|c: char| c == ' ' || c == '\0');
        let value = value.trim_start();
        Ok(if value.is_empty() {
            None
        } else {
            Some(value.to_string())
        })
    }

    fn parsed<T>(&self, tag: Tag) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.text(tag)?
            .map(|v| {
                v.parse::<T>()
                    .map_err(|e| ThermalError::malformed(tag, format!("`{}`: {}", v, e)))
            })
            .transpose()
    }

    fn require<T>(&self, tag: Tag) -> Result<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.parsed(tag)?
            .ok_or_else(|| ThermalError::malformed(tag, "missing required attribute"))
    }

    fn private_text(&self, attr: &PrivateAttribute) -> Result<Option<String>> {
        self.text(attr.tag())
    }

    fn private_parsed<T>(&self, attr: &PrivateAttribute) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.parsed(attr.tag())
    }

    fn private_flag(&self, attr: &PrivateAttribute) -> Result<Option<bool>> {
        self.private_text(attr)?
            .map(|v| {
                private::parse_flag(&v).ok_or_else(|| {
                    ThermalError::malformed(attr.tag(), format!("`{}` is not PASS or FAIL", v))
                })
            })
            .transpose()
    }

    fn bytes(&self, tag: Tag) -> Result<Option<Vec<u8>>> {
        match self.obj.element(tag) {
            Ok(elem) => elem
                .to_bytes()
                .map(|b| Some(b.into_owned()))
                .map_err(|e| ThermalError::malformed(tag, e.to_string())),
            Err(_) => Ok(None),
        }
    }

    /// Code value of the first item of a code sequence.
    fn code_value(&self, tag: Tag) -> Result<Option<String>> {
        let items = match self.obj.element(tag).ok().and_then(|e| e.items()) {
            Some(items) => items,
            None => return Ok(None),
        };
        match items.first() {
            Some(item) => Reader { obj: item }.text(tags::CODE_VALUE),
            None => Ok(None),
        }
    }
}

pub(crate) fn decode(obj: &InMemDicomObject) -> Result<Decoded> {
    let r = Reader { obj };

    match r.text(private::PRIVATE_CREATOR_TAG)? {
        Some(creator) if creator == private::PRIVATE_CREATOR => {}
        other => {
            return Err(ThermalError::malformed(
                private::PRIVATE_CREATOR_TAG,
                format!(
                    "expected private creator {}, found {:?}",
                    private::PRIVATE_CREATOR,
                    other
                ),
            ))
        }
    }
    if let Some(version) = r.private_text(&private::SCHEMA_VERSION_ATTR)? {
        if version != private::SCHEMA_VERSION {
            debug!(%version, "decoding dataset written with another schema version");
        }
    }

    let uids = InstanceUids {
        study: r.require(tags::STUDY_INSTANCE_UID)?,
        series: r.require(tags::SERIES_INSTANCE_UID)?,
        sop_instance: r.require(tags::SOP_INSTANCE_UID)?,
    };

    let doc = MetadataDocument {
        patient: decode_patient(&r)?,
        study: decode_study(&r)?,
        series: decode_series(&r)?,
        equipment: decode_equipment(&r)?,
        thermal: decode_thermal(&r)?,
        quality_control: decode_quality_control(&r)?,
    };
    let unit = doc.thermal.temperature_unit;
    let metadata = ThermalMetadataRecord::try_from(doc)?;

    let field = decode_field(&r, unit)?;
    let display = decode_display(&r)?;
    let overlay = decode_overlay(&r)?;

    Ok(Decoded {
        field,
        display,
        overlay,
        metadata,
        uids,
    })
}

fn decode_patient(r: &Reader<'_>) -> Result<PatientInfo> {
    let age = match r.text(tags::PATIENT_AGE)? {
        Some(v) => Some(
            v.strip_suffix('Y')
                .and_then(|n| n.parse::<u16>().ok())
                .ok_or_else(|| {
                    ThermalError::malformed(tags::PATIENT_AGE, format!("`{}` is not nnnY", v))
                })?,
        ),
        None => None,
    };
    Ok(PatientInfo {
        name: r.text(tags::PATIENT_NAME)?,
        id: r.text(tags::PATIENT_ID)?,
        birth_date: r.text(tags::PATIENT_BIRTH_DATE)?,
        sex: r.parsed::<Sex>(tags::PATIENT_SEX)?,
        age,
    })
}

fn decode_study(r: &Reader<'_>) -> Result<StudyInfo> {
    let procedure = match r.code_value(tags::PROCEDURE_CODE_SEQUENCE)? {
        Some(code) => Some(
            codes::procedure_by_code(&code)
                .ok_or_else(|| ThermalError::UnknownProcedure(code.clone()))?
                .keyword
                .to_string(),
        ),
        None => None,
    };
    Ok(StudyInfo {
        description: r.text(tags::STUDY_DESCRIPTION)?,
        referring_physician: r.text(tags::REFERRING_PHYSICIAN_NAME)?,
        procedure,
        date: r.text(tags::STUDY_DATE)?,
        time: r.text(tags::STUDY_TIME)?,
        study_id: r.text(tags::STUDY_ID)?,
        accession_number: r.text(tags::ACCESSION_NUMBER)?,
    })
}

fn decode_series(r: &Reader<'_>) -> Result<SeriesInfo> {
    let body_part = match r.text(tags::BODY_PART_EXAMINED)? {
        Some(examined) => Some(
            codes::body_part_by_examined(&examined)
                .ok_or_else(|| ThermalError::UnknownBodyPart(examined.clone()))?
                .keyword
                .to_string(),
        ),
        None => None,
    };
    let laterality = match r.text(tags::IMAGE_LATERALITY)? {
        Some(v) => Some(Laterality::from_code(&v).ok_or_else(|| {
            ThermalError::malformed(tags::IMAGE_LATERALITY, format!("`{}` is not L, R or B", v))
        })?),
        None => None,
    };
    Ok(SeriesInfo {
        modality: r.require(tags::MODALITY)?,
        description: r.text(tags::SERIES_DESCRIPTION)?,
        number: r.parsed(tags::SERIES_NUMBER)?,
        body_part,
        laterality,
        view_position: r.text(tags::VIEW_POSITION)?,
        acquisition_mode: r.text(tags::ACQUISITION_DEVICE_PROCESSING_DESCRIPTION)?,
    })
}

fn decode_equipment(r: &Reader<'_>) -> Result<EquipmentInfo> {
    let spatial_resolution = match r.text(tags::PIXEL_SPACING)? {
        Some(v) => {
            let first = v.split('\\').next().unwrap_or_default().trim();
            Some(first.parse::<f64>().map_err(|e| {
                ThermalError::malformed(tags::PIXEL_SPACING, format!("`{}`: {}", v, e))
            })?)
        }
        None => None,
    };
    Ok(EquipmentInfo {
        manufacturer: r.text(tags::MANUFACTURER)?,
        model: r.text(tags::MANUFACTURER_MODEL_NAME)?,
        serial_number: r.text(tags::DEVICE_SERIAL_NUMBER)?,
        detector_type: r.private_text(&private::DETECTOR_TYPE)?,
        spatial_resolution,
        software_version: r.text(tags::SOFTWARE_VERSIONS)?,
        institution_name: r.text(tags::INSTITUTION_NAME)?,
        organization_uid_prefix: r.private_text(&private::ORGANIZATION_UID_ROOT)?,
    })
}

fn decode_thermal(r: &Reader<'_>) -> Result<ThermalParameters> {
    let spectral_range = r
        .private_text(&private::SPECTRAL_RANGE)?
        .map(|v| {
            v.parse::<SpectralRange>()
                .map_err(|e| ThermalError::malformed(private::SPECTRAL_RANGE.tag(), e))
        })
        .transpose()?;
    let temperature_unit = match r.private_text(&private::TEMPERATURE_UNIT)? {
        Some(code) => TemperatureUnit::from_code(&code).ok_or_else(|| {
            ThermalError::malformed(
                private::TEMPERATURE_UNIT.tag(),
                format!("unknown unit `{}`", code),
            )
        })?,
        None => TemperatureUnit::default(),
    };
    Ok(ThermalParameters {
        emissivity: r.private_parsed(&private::EMISSIVITY)?,
        distance_from_camera: r.private_parsed(&private::DISTANCE_FROM_CAMERA)?,
        ambient_temperature: r.private_parsed(&private::AMBIENT_TEMPERATURE)?,
        reflected_temperature: r.private_parsed(&private::REFLECTED_TEMPERATURE)?,
        relative_humidity: r.private_parsed(&private::RELATIVE_HUMIDITY)?,
        atmospheric_temperature: r.private_parsed(&private::ATMOSPHERIC_TEMPERATURE)?,
        camera_model: r.private_text(&private::CAMERA_MODEL)?,
        spectral_range,
        thermal_sensitivity: r.private_parsed(&private::THERMAL_SENSITIVITY)?,
        temperature_unit,
    })
}

fn decode_quality_control(r: &Reader<'_>) -> Result<QualityControl> {
    Ok(QualityControl {
        uniformity_check: r.private_flag(&private::UNIFORMITY_CHECK)?,
        measured_netd: r.private_parsed(&private::MEASURED_NETD)?,
        bad_pixel_count: r.private_parsed(&private::BAD_PIXEL_COUNT)?,
        resolution_test: r.private_flag(&private::RESOLUTION_TEST)?,
        temperature_accuracy: r.private_parsed(&private::TEMPERATURE_ACCURACY)?,
        calibration_date: r.text(tags::DATE_OF_LAST_CALIBRATION)?,
    })
}

fn decode_field(r: &Reader<'_>, unit: TemperatureUnit) -> Result<TemperatureField> {
    let rows: usize = r.require(tags::ROWS)?;
    let cols: usize = r.require(tags::COLUMNS)?;
    let tag = standard::DOUBLE_FLOAT_PIXEL_DATA;
    let values = r
        .obj
        .element(tag)
        .map_err(|_| ThermalError::malformed(tag, "missing temperature data"))?
        .to_multi_float64()
        .map_err(|e| ThermalError::malformed(tag, e.to_string()))?;
    let field = TemperatureField::from_shape_vec(rows, cols, values)?;
    Ok(TemperatureField::with_unit(field.into_inner(), unit))
}

fn decode_display(r: &Reader<'_>) -> Result<Option<RgbImage>> {
    let bytes = match r.bytes(private::DISPLAY_IMAGE.tag())? {
        Some(bytes) => bytes,
        None => return Ok(None),
    };
    let rows: u32 = r.require(private::DISPLAY_ROWS.tag())?;
    let cols: u32 = r.require(private::DISPLAY_COLUMNS.tag())?;
    let len = 3 * rows as usize * cols as usize;
    if bytes.len() < len {
        return Err(ThermalError::malformed(
            private::DISPLAY_IMAGE.tag(),
            format!("{} bytes for a {}x{} RGB image", bytes.len(), rows, cols),
        ));
    }
    let mut bytes = bytes;
    bytes.truncate(len);
    Ok(RgbImage::from_raw(cols, rows, bytes))
}

fn decode_overlay(r: &Reader<'_>) -> Result<Option<Array2<bool>>> {
    let bytes = match r.bytes(standard::OVERLAY_DATA)? {
        Some(bytes) => bytes,
        None => return Ok(None),
    };
    let rows: usize = r.require(standard::OVERLAY_ROWS)?;
    let cols: usize = r.require(standard::OVERLAY_COLUMNS)?;
    unpack_bits(&bytes, rows, cols)
        .map(Some)
        .ok_or_else(|| {
            ThermalError::malformed(standard::OVERLAY_DATA, "fewer bits than overlay cells")
        })
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn overlay_bits() {
        let mask = array![[true, false, false], [false, true, true], [false, false, true]];
        let bytes = pack_bits(&mask);
        assert_eq!(bytes.len(), 2);
        assert_eq!(bytes[0], 0b0011_0001);
        assert_eq!(bytes[1], 0b0000_0001);
        assert_eq!(unpack_bits(&bytes, 3, 3), Some(mask));
        assert_eq!(unpack_bits(&bytes, 5, 5), None);
    }

    #[test]
    fn oversized_grids_are_rejected() {
        let field = TemperatureField::filled(1, 70_000, 30.);
        let mut w = Writer {
            obj: InMemDicomObject::new_empty(),
        };
        assert!(matches!(
            encode_field(&mut w, &field),
            Err(ThermalError::ShapeMismatch { .. })
        ));
    }
}
