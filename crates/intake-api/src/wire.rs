// SPDX-License-Identifier: Apache-2.0

//! Request and response bodies for the REST surface. Wire structs stay
//! decoupled from the domain types; handlers convert at the boundary.

use chrono::{DateTime, Utc};
use intake_model::{InspectionKind, InspectionStatus, UpdateEvent, VehicleStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateVehicleRequest {
    pub license_plate: String,
    #[serde(default)]
    pub vin: Option<String>,
    #[serde(default)]
    pub make: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub mileage: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateVehicleRequest {
    #[serde(default)]
    pub status: Option<VehicleStatus>,
    #[serde(default)]
    pub mileage: Option<i64>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub checked_out_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateInspectionRequest {
    pub vehicle_id: String,
    pub inspector_id: String,
    pub kind: InspectionKind,
}

/// One field-path write: `{"path": "sections.exterior.notes", "value": …}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatchInspectionRequest {
    pub path: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchInspectionResponse {
    pub success: bool,
    pub update: UpdateEvent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateInspectionRequest {
    pub status: InspectionStatus,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateTemplateRequest {
    pub name: String,
    pub kind: InspectionKind,
    pub sections: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateTemplateRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub sections: Option<Value>,
    #[serde(default)]
    pub active: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn patch_request_requires_path() {
        let err = serde_json::from_value::<PatchInspectionRequest>(json!({"value": 1}))
            .expect_err("missing path must fail");
        assert!(err.to_string().contains("path"));
    }

    #[test]
    fn patch_request_rejects_unknown_fields() {
        assert!(serde_json::from_value::<PatchInspectionRequest>(
            json!({"path": "a", "value": 1, "extra": true})
        )
        .is_err());
    }

    #[test]
    fn patch_request_accepts_null_value() {
        let req = serde_json::from_value::<PatchInspectionRequest>(
            json!({"path": "a.b", "value": null}),
        )
        .expect("null value is a valid write");
        assert_eq!(req.value, Value::Null);
    }
}
