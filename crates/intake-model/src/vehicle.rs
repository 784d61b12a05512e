// SPDX-License-Identifier: Apache-2.0

use crate::{validate_id, ValidationError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(transparent)]
#[non_exhaustive]
pub struct VehicleId(String);

impl VehicleId {
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        validate_id("vehicle", input).map(Self)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for VehicleId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum VehicleStatus {
    Pending,
    Inspecting,
    Repairing,
    Completed,
    Delivered,
}

impl VehicleStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Inspecting => "inspecting",
            Self::Repairing => "repairing",
            Self::Completed => "completed",
            Self::Delivered => "delivered",
        }
    }

    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        match input {
            "pending" => Ok(Self::Pending),
            "inspecting" => Ok(Self::Inspecting),
            "repairing" => Ok(Self::Repairing),
            "completed" => Ok(Self::Completed),
            "delivered" => Ok(Self::Delivered),
            other => Err(ValidationError(format!("unknown vehicle status: {other}"))),
        }
    }
}

impl Display for VehicleStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: VehicleId,
    pub license_plate: String,
    pub vin: Option<String>,
    pub make: String,
    pub model: String,
    pub year: Option<i32>,
    pub color: Option<String>,
    pub mileage: Option<i64>,
    pub status: VehicleStatus,
    pub checked_in_at: DateTime<Utc>,
    pub checked_out_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Vehicle {
    /// Registers a vehicle at intake. Everything beyond the plate is filled
    /// in from the request after construction.
    pub fn check_in(license_plate: &str) -> Result<Self, ValidationError> {
        let plate = license_plate.trim();
        if plate.is_empty() {
            return Err(ValidationError("license plate must not be empty".to_string()));
        }
        let now = Utc::now();
        Ok(Self {
            id: VehicleId::generate(),
            license_plate: plate.to_string(),
            vin: None,
            make: String::new(),
            model: String::new(),
            year: None,
            color: None,
            mileage: None,
            status: VehicleStatus::Pending,
            checked_in_at: now,
            checked_out_at: None,
            created_at: now,
            updated_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_in_requires_a_plate() {
        assert!(Vehicle::check_in("  ").is_err());
        let vehicle = Vehicle::check_in(" AB-1234 ").expect("valid plate");
        assert_eq!(vehicle.license_plate, "AB-1234");
        assert_eq!(vehicle.status, VehicleStatus::Pending);
        assert!(vehicle.checked_out_at.is_none());
    }

    #[test]
    fn generated_ids_are_distinct() {
        assert_ne!(VehicleId::generate(), VehicleId::generate());
    }
}
