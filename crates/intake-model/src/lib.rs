#![forbid(unsafe_code)]

use std::fmt::{Display, Formatter};

pub const CRATE_NAME: &str = "intake-model";

pub mod inspection;
pub mod template;
pub mod vehicle;

pub use inspection::{
    Inspection, InspectionId, InspectionKind, InspectionStatus, UpdateEvent,
};
pub use template::{FormTemplate, TemplateId};
pub use vehicle::{Vehicle, VehicleId, VehicleStatus};

pub const ID_MAX_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError(pub String);

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ValidationError {}

pub(crate) fn validate_id(kind: &str, input: &str) -> Result<String, ValidationError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(ValidationError(format!("{kind} id must not be empty")));
    }
    if s.len() > ID_MAX_LEN {
        return Err(ValidationError(format!(
            "{kind} id exceeds max length {ID_MAX_LEN}"
        )));
    }
    Ok(s.to_string())
}
