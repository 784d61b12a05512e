// SPDX-License-Identifier: Apache-2.0

use crate::inspection::InspectionKind;
use crate::{validate_id, ValidationError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(transparent)]
#[non_exhaustive]
pub struct TemplateId(String);

impl TemplateId {
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        validate_id("template", input).map(Self)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for TemplateId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An inspection form definition: the section/field layout inspectors fill
/// in. The section structure is free-form JSON; the server never validates
/// inspection content against it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormTemplate {
    pub id: TemplateId,
    pub name: String,
    pub kind: InspectionKind,
    pub sections: Value,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FormTemplate {
    pub fn new(name: &str, kind: InspectionKind, sections: Value) -> Result<Self, ValidationError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError("template name must not be empty".to_string()));
        }
        let now = Utc::now();
        Ok(Self {
            id: TemplateId::generate(),
            name: name.to_string(),
            kind,
            sections,
            active: true,
            created_at: now,
            updated_at: now,
        })
    }
}
