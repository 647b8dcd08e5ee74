//! Error type shared by the library modules.

use itertools::Itertools;
use thiserror::Error;

use crate::validation::Field;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ThermalError {
    #[error("invalid parameter `{name}` = {value}: expected {expected}")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        expected: &'static str,
    },

    #[error("insufficient calibration data: {distinct} distinct reference point(s), need at least 2")]
    InsufficientData { distinct: usize },

    #[error("bad pixel at ({row}, {col}) has no valid neighbours")]
    Correction { row: usize, col: usize },

    #[error("invalid value for `{field}`: {reason}")]
    Validation { field: Field, reason: String },

    #[error("metadata incomplete, missing: {}", .missing.iter().join(", "))]
    IncompleteMetadata { missing: Vec<Field> },

    #[error("unknown procedure `{0}`")]
    UnknownProcedure(String),

    #[error("unknown body part `{0}`")]
    UnknownBodyPart(String),

    #[error("({row}, {col}) is outside the {rows}x{cols} grid")]
    OutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("region of interest selects no valid cells")]
    EmptyRoi,

    #[error("shape mismatch for {what}: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("invalid metadata document: {0}")]
    Document(String),

    #[error("malformed attribute {tag}: {reason}")]
    MalformedAttribute { tag: String, reason: String },

    #[error("dicom: {0}")]
    Dicom(String),

    #[error("io: {0}")]
    Io(String),
}

impl ThermalError {
    pub(crate) fn validation(field: Field, reason: impl Into<String>) -> Self {
        ThermalError::Validation {
            field,
            reason: reason.into(),
        }
    }

    pub(crate) fn malformed(tag: dicom::core::Tag, reason: impl Into<String>) -> Self {
        ThermalError::MalformedAttribute {
            tag: format!("{}", tag),
            reason: reason.into(),
        }
    }
}

impl From<std::io::Error> for ThermalError {
    fn from(e: std::io::Error) -> Self {
        ThermalError::Io(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ThermalError>;
