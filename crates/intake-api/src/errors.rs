// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ApiErrorCode {
    MalformedInput,
    NotFound,
    Conflict,
    PathConflict,
    InspectionClosed,
    InvalidTransition,
    StorageFailure,
    Internal,
}

impl ApiErrorCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MalformedInput => "malformed_input",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::PathConflict => "path_conflict",
            Self::InspectionClosed => "inspection_closed",
            Self::InvalidTransition => "invalid_transition",
            Self::StorageFailure => "storage_failure",
            Self::Internal => "internal",
        }
    }

    #[must_use]
    pub const fn http_status(self) -> u16 {
        match self {
            Self::MalformedInput => 400,
            Self::NotFound => 404,
            Self::Conflict | Self::PathConflict | Self::InspectionClosed | Self::InvalidTransition => {
                409
            }
            Self::StorageFailure | Self::Internal => 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ApiErrorCode,
    pub message: String,
    #[serde(default)]
    pub details: Value,
}

impl ApiError {
    #[must_use]
    pub fn new(code: ApiErrorCode, message: impl Into<String>, details: Value) -> Self {
        Self {
            code,
            message: message.into(),
            details,
        }
    }

    #[must_use]
    pub fn malformed_input(field: &str, reason: &str) -> Self {
        Self::new(
            ApiErrorCode::MalformedInput,
            format!("invalid request field: {field}"),
            json!({"field": field, "reason": reason}),
        )
    }

    #[must_use]
    pub fn not_found(entity: &str, id: &str) -> Self {
        Self::new(
            ApiErrorCode::NotFound,
            format!("{entity} not found"),
            json!({"id": id}),
        )
    }

    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(ApiErrorCode::StorageFailure, message, Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_map_to_expected_statuses() {
        assert_eq!(ApiErrorCode::MalformedInput.http_status(), 400);
        assert_eq!(ApiErrorCode::NotFound.http_status(), 404);
        assert_eq!(ApiErrorCode::PathConflict.http_status(), 409);
        assert_eq!(ApiErrorCode::StorageFailure.http_status(), 500);
    }

    #[test]
    fn serializes_snake_case_codes() {
        let err = ApiError::not_found("inspection", "does-not-exist");
        let value = serde_json::to_value(&err).expect("serialize");
        assert_eq!(value["code"], "not_found");
        assert_eq!(value["details"]["id"], "does-not-exist");
    }
}
