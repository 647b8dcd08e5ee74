//! Private attribute registry.
//!
//! Thermal and quality-control attributes without a
//! standard DICOM home live in private group `0029`, in the
//! block reserved by the creator `MEDTHERMAL_1` at
//! `(0029,0010)`. Elements are therefore `(0029,10xx)`.
//!
//! The table below is a wire contract: released entries
//! are never renumbered or re-typed. New entries bump
//! [`SCHEMA_VERSION`].

use dicom::core::{Tag, VR};

pub const PRIVATE_GROUP: u16 = 0x0029;
pub const PRIVATE_CREATOR: &str = "MEDTHERMAL_1";
/// Reserves block `0x10` of [`PRIVATE_GROUP`].
pub const PRIVATE_CREATOR_TAG: Tag = Tag(PRIVATE_GROUP, 0x0010);
pub const SCHEMA_VERSION: &str = "1.0";

/// How a value is rendered in its element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// DS with a fixed number of decimals.
    Decimal(usize),
    /// IS
    Integer,
    /// CS `PASS` / `FAIL`
    Flag,
    Text,
    Binary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrivateAttribute {
    pub name: &'static str,
    /// Low byte of the element number.
    pub offset: u8,
    pub vr: VR,
    pub encoding: Encoding,
}

impl PrivateAttribute {
    pub const fn tag(&self) -> Tag {
        Tag(PRIVATE_GROUP, 0x1000 | self.offset as u16)
    }

    /// Canonical DS text of `value`.
    pub fn format_decimal(&self, value: f64) -> String {
        match self.encoding {
            Encoding::Decimal(places) => format_decimal(value, places),
            _ => value.to_string(),
        }
    }

    /// Decimals written for [`Encoding::Decimal`] values, 0
    /// otherwise.
    pub const fn places(&self) -> usize {
        match self.encoding {
            Encoding::Decimal(places) => places,
            _ => 0,
        }
    }

    /// Largest difference between a value and its encoding.
    pub fn precision(&self) -> f64 {
        match self.encoding {
            Encoding::Decimal(places) => 0.5 * 10f64.powi(-(places as i32)),
            _ => 0.,
        }
    }
}

pub fn format_decimal(value: f64, places: usize) -> String {
    format!("{:.*}", places, value)
}

/// Whether a positive `value` is written as zero with
/// `places` decimals.
pub fn rounds_to_zero(value: f64, places: usize) -> bool {
    value > 0.
        && format_decimal(value, places)
            .parse::<f64>()
            .map_or(true, |v| v <= 0.)
}

/// Decimals of the standard Pixel Spacing.
pub const PIXEL_SPACING_DECIMALS: usize = 4;

pub fn format_flag(value: bool) -> &'static str {
    if value {
        "PASS"
    } else {
        "FAIL"
    }
}

pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim() {
        "PASS" => Some(true),
        "FAIL" => Some(false),
        _ => None,
    }
}

macro_rules! private {
    ($name:ident, $offset:expr, $vr:ident, $encoding:expr) => {
        pub const $name: PrivateAttribute = PrivateAttribute {
            name: stringify!($name),
            offset: $offset,
            vr: VR::$vr,
            encoding: $encoding,
        };
    };
}

private!(SCHEMA_VERSION_ATTR, 0x01, LO, Encoding::Text);
private!(ORGANIZATION_UID_ROOT, 0x02, UI, Encoding::Text);

private!(EMISSIVITY, 0x10, DS, Encoding::Decimal(3));
private!(DISTANCE_FROM_CAMERA, 0x11, DS, Encoding::Decimal(3));
private!(AMBIENT_TEMPERATURE, 0x12, DS, Encoding::Decimal(2));
private!(REFLECTED_TEMPERATURE, 0x13, DS, Encoding::Decimal(2));
private!(RELATIVE_HUMIDITY, 0x14, DS, Encoding::Decimal(1));
private!(ATMOSPHERIC_TEMPERATURE, 0x15, DS, Encoding::Decimal(2));
private!(CAMERA_MODEL, 0x16, LO, Encoding::Text);
private!(SPECTRAL_RANGE, 0x17, SH, Encoding::Text);
private!(THERMAL_SENSITIVITY, 0x18, DS, Encoding::Decimal(3));
private!(TEMPERATURE_UNIT, 0x19, CS, Encoding::Text);
private!(DETECTOR_TYPE, 0x1A, LO, Encoding::Text);

private!(UNIFORMITY_CHECK, 0x20, CS, Encoding::Flag);
private!(MEASURED_NETD, 0x21, DS, Encoding::Decimal(3));
private!(BAD_PIXEL_COUNT, 0x22, IS, Encoding::Integer);
private!(RESOLUTION_TEST, 0x23, CS, Encoding::Flag);
private!(TEMPERATURE_ACCURACY, 0x24, DS, Encoding::Decimal(2));

private!(DISPLAY_IMAGE, 0x30, OB, Encoding::Binary);
private!(DISPLAY_ROWS, 0x31, US, Encoding::Integer);
private!(DISPLAY_COLUMNS, 0x32, US, Encoding::Integer);
private!(DISPLAY_IMAGE_TYPE, 0x33, CS, Encoding::Text);

/// Every registered attribute, by element number.
pub static SCHEMA: &[PrivateAttribute] = &[
    SCHEMA_VERSION_ATTR,
    ORGANIZATION_UID_ROOT,
    EMISSIVITY,
    DISTANCE_FROM_CAMERA,
    AMBIENT_TEMPERATURE,
    REFLECTED_TEMPERATURE,
    RELATIVE_HUMIDITY,
    ATMOSPHERIC_TEMPERATURE,
    CAMERA_MODEL,
    SPECTRAL_RANGE,
    THERMAL_SENSITIVITY,
    TEMPERATURE_UNIT,
    DETECTOR_TYPE,
    UNIFORMITY_CHECK,
    MEASURED_NETD,
    BAD_PIXEL_COUNT,
    RESOLUTION_TEST,
    TEMPERATURE_ACCURACY,
    DISPLAY_IMAGE,
    DISPLAY_ROWS,
    DISPLAY_COLUMNS,
    DISPLAY_IMAGE_TYPE,
];

pub fn lookup(tag: Tag) -> Option<&'static PrivateAttribute> {
    SCHEMA.iter().find(|a| a.tag() == tag)
}

/// Value multiplicity of [`DISPLAY_IMAGE_TYPE`].
pub const DISPLAY_IMAGE_TYPE_VALUE: &[&str] = &["DERIVED", "PRESENTATION"];

/// Standard attributes the encoder writes outside the
/// standard dictionary's named set.
pub mod standard {
    use dicom::core::Tag;

    /// Double Float Pixel Data
    pub const DOUBLE_FLOAT_PIXEL_DATA: Tag = Tag(0x7FE0, 0x0009);

    pub const OVERLAY_ROWS: Tag = Tag(0x6000, 0x0010);
    pub const OVERLAY_COLUMNS: Tag = Tag(0x6000, 0x0011);
    pub const OVERLAY_DESCRIPTION: Tag = Tag(0x6000, 0x0022);
    pub const OVERLAY_TYPE: Tag = Tag(0x6000, 0x0040);
    pub const OVERLAY_ORIGIN: Tag = Tag(0x6000, 0x0050);
    pub const OVERLAY_BITS_ALLOCATED: Tag = Tag(0x6000, 0x0100);
    pub const OVERLAY_BIT_POSITION: Tag = Tag(0x6000, 0x0102);
    pub const OVERLAY_DATA: Tag = Tag(0x6000, 0x3000);
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn elements_are_unique_and_in_block() {
        let tags: HashSet<Tag> = SCHEMA.iter().map(|a| a.tag()).collect();
        assert_eq!(tags.len(), SCHEMA.len());
        for attr in SCHEMA {
            let tag = attr.tag();
            assert_eq!(tag.group(), PRIVATE_GROUP);
            assert_eq!(tag.element() >> 8, 0x10, "{} outside block", attr.name);
        }
        assert_eq!(lookup(Tag(0x0029, 0x1010)), Some(&EMISSIVITY));
        assert_eq!(lookup(Tag(0x0029, 0x10FF)), None);
    }

    #[test]
    fn fixed_decimals() {
        assert_eq!(EMISSIVITY.format_decimal(0.98), "0.980");
        assert_eq!(RELATIVE_HUMIDITY.format_decimal(45.26), "45.3");
        assert_eq!(AMBIENT_TEMPERATURE.format_decimal(-5.), "-5.00");
        assert!((THERMAL_SENSITIVITY.precision() - 0.0005).abs() < 1e-12);
        // every decimal fits in a 16 character DS
        for attr in SCHEMA.iter().filter(|a| a.vr == VR::DS) {
            assert!(attr.format_decimal(-1234.5678).len() <= 16);
        }
    }

    #[test]
    fn tiny_values_round_to_zero() {
        assert!(rounds_to_zero(0.0004, EMISSIVITY.places()));
        assert!(!rounds_to_zero(0.0005, EMISSIVITY.places()));
        assert!(!rounds_to_zero(0., EMISSIVITY.places()));
        assert!(rounds_to_zero(0.00004, PIXEL_SPACING_DECIMALS));
        assert_eq!(DETECTOR_TYPE.places(), 0);
    }

    #[test]
    fn flags() {
        assert_eq!(parse_flag(format_flag(true)), Some(true));
        assert_eq!(parse_flag("FAIL "), Some(false));
        assert_eq!(parse_flag("MAYBE"), None);
    }
}
