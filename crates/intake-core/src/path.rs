// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

pub const PATH_MAX_LEN: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathError(pub String);

impl Display for PathError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for PathError {}

/// A dot-separated field path addressing one slot inside a nested document,
/// e.g. `sections.exterior.notes`. Segments address mapping keys only; there
/// is no array-index form and no coercion — segments match by exact string
/// equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(transparent)]
#[non_exhaustive]
pub struct FieldPath(String);

impl FieldPath {
    pub fn parse(input: &str) -> Result<Self, PathError> {
        let s = input.trim();
        if s.is_empty() {
            return Err(PathError("path must not be empty".to_string()));
        }
        if s.len() > PATH_MAX_LEN {
            return Err(PathError(format!("path exceeds max length {PATH_MAX_LEN}")));
        }
        if s.split('.').any(str::is_empty) {
            return Err(PathError(
                "path segments must be non-empty (no leading, trailing, or doubled dots)"
                    .to_string(),
            ));
        }
        Ok(Self(s.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.0.split('.').count()
    }
}

impl Display for FieldPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
