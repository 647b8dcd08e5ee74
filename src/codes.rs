//! Closed clinical code tables.
//!
//! Procedures use a local coding scheme (DICOM reserves
//! designators starting with `99` for private schemes).
//! Anatomic regions use SNOMED CT (`SCT`) as in DICOM
//! CID 4031.

use serde_derive::*;

use crate::error::{Result, ThermalError};

/// A DICOM code sequence item.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodedEntry {
    pub value: &'static str,
    pub scheme: &'static str,
    pub meaning: &'static str,
}

pub const PROCEDURE_SCHEME: &str = "99MTHERM";
pub const SNOMED_SCHEME: &str = "SCT";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Procedure {
    pub keyword: &'static str,
    pub code: CodedEntry,
}

macro_rules! procedure {
    ($keyword:expr, $value:expr, $meaning:expr) => {
        Procedure {
            keyword: $keyword,
            code: CodedEntry {
                value: $value,
                scheme: PROCEDURE_SCHEME,
                meaning: $meaning,
            },
        }
    };
}

pub static PROCEDURES: &[Procedure] = &[
    procedure!("breast_thermography", "MT-001", "Breast thermography"),
    procedure!("vascular_assessment", "MT-002", "Thermographic vascular assessment"),
    procedure!("musculoskeletal_assessment", "MT-003", "Thermographic musculoskeletal assessment"),
    procedure!("neurological_assessment", "MT-004", "Thermographic neurological assessment"),
    procedure!("inflammation_assessment", "MT-005", "Thermographic inflammation assessment"),
    procedure!("diabetic_foot_screening", "MT-006", "Diabetic foot thermography"),
    procedure!("fever_screening", "MT-007", "Febrile temperature screening"),
    procedure!("dermatological_assessment", "MT-008", "Dermatological thermography"),
];

/// Resolve a procedure keyword.
pub fn procedure(keyword: &str) -> Result<&'static Procedure> {
    PROCEDURES
        .iter()
        .find(|p| p.keyword == keyword)
        .ok_or_else(|| ThermalError::UnknownProcedure(keyword.to_string()))
}

pub fn procedure_by_code(value: &str) -> Option<&'static Procedure> {
    PROCEDURES.iter().find(|p| p.code.value == value)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyPart {
    pub keyword: &'static str,
    /// Body Part Examined (0018,0015)
    pub examined: &'static str,
    pub code: CodedEntry,
}

macro_rules! body_part {
    ($keyword:expr, $examined:expr, $value:expr, $meaning:expr) => {
        BodyPart {
            keyword: $keyword,
            examined: $examined,
            code: CodedEntry {
                value: $value,
                scheme: SNOMED_SCHEME,
                meaning: $meaning,
            },
        }
    };
}

pub static BODY_PARTS: &[BodyPart] = &[
    body_part!("breast", "BREAST", "76752008", "Breast"),
    body_part!("hand", "HAND", "85562004", "Hand"),
    body_part!("foot", "FOOT", "56459004", "Foot"),
    body_part!("face", "FACE", "89545001", "Face"),
    body_part!("chest", "CHEST", "51185008", "Chest"),
    body_part!("abdomen", "ABDOMEN", "113345001", "Abdomen"),
    body_part!("back", "BACK", "77568009", "Back"),
    body_part!("whole_body", "WHOLEBODY", "38266002", "Entire body"),
];

pub fn body_part(keyword: &str) -> Result<&'static BodyPart> {
    BODY_PARTS
        .iter()
        .find(|p| p.keyword == keyword)
        .ok_or_else(|| ThermalError::UnknownBodyPart(keyword.to_string()))
}

pub fn body_part_by_examined(examined: &str) -> Option<&'static BodyPart> {
    BODY_PARTS.iter().find(|p| p.examined == examined)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn lookups() -> anyhow::Result<()> {
        let p = procedure("breast_thermography")?;
        assert_eq!(p.code.scheme, PROCEDURE_SCHEME);
        assert_eq!(procedure_by_code(p.code.value), Some(p));
        assert_eq!(
            procedure("palm_reading"),
            Err(ThermalError::UnknownProcedure("palm_reading".into()))
        );

        let b = body_part("whole_body")?;
        assert_eq!(body_part_by_examined("WHOLEBODY"), Some(b));
        assert!(body_part("tail").is_err());
        Ok(())
    }

    #[test]
    fn tables_have_unique_keys() {
        let keywords: HashSet<_> = PROCEDURES.iter().map(|p| p.keyword).collect();
        let codes: HashSet<_> = PROCEDURES.iter().map(|p| p.code.value).collect();
        assert_eq!(keywords.len(), PROCEDURES.len());
        assert_eq!(codes.len(), PROCEDURES.len());

        let parts: HashSet<_> = BODY_PARTS.iter().map(|p| p.examined).collect();
        assert_eq!(parts.len(), BODY_PARTS.len());
    }
}
