// SPDX-License-Identifier: Apache-2.0

use crate::vehicle::VehicleId;
use crate::{validate_id, ValidationError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Opaque inspection identifier. Generated once at creation and never reused;
/// lookups treat any well-formed string as a candidate key, so an unknown id
/// is a not-found condition rather than a parse failure.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(transparent)]
#[non_exhaustive]
pub struct InspectionId(String);

impl InspectionId {
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        validate_id("inspection", input).map(Self)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for InspectionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum InspectionKind {
    Entry,
    Routine,
    Exit,
    Special,
}

impl InspectionKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Entry => "entry",
            Self::Routine => "routine",
            Self::Exit => "exit",
            Self::Special => "special",
        }
    }

    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        match input {
            "entry" => Ok(Self::Entry),
            "routine" => Ok(Self::Routine),
            "exit" => Ok(Self::Exit),
            "special" => Ok(Self::Special),
            other => Err(ValidationError(format!("unknown inspection kind: {other}"))),
        }
    }
}

impl Display for InspectionKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle state. Transitions are monotonic: `draft → in_progress →
/// completed → approved`, never backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum InspectionStatus {
    Draft,
    InProgress,
    Completed,
    Approved,
}

impl InspectionStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Approved => "approved",
        }
    }

    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        match input {
            "draft" => Ok(Self::Draft),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "approved" => Ok(Self::Approved),
            other => Err(ValidationError(format!(
                "unknown inspection status: {other}"
            ))),
        }
    }

    #[must_use]
    pub const fn is_closed(self) -> bool {
        matches!(self, Self::Completed | Self::Approved)
    }

    const fn rank(self) -> u8 {
        match self {
            Self::Draft => 0,
            Self::InProgress => 1,
            Self::Completed => 2,
            Self::Approved => 3,
        }
    }
}

impl Display for InspectionStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inspection {
    pub id: InspectionId,
    pub vehicle_id: VehicleId,
    pub inspector_id: String,
    pub kind: InspectionKind,
    pub status: InspectionStatus,
    /// Nested inspection content, organized by section and field. Always a
    /// mapping at the root; any path may be written.
    pub data: Value,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Inspection {
    /// Starts a new inspection in `draft` with empty content.
    #[must_use]
    pub fn start(vehicle_id: VehicleId, inspector_id: String, kind: InspectionKind) -> Self {
        let now = Utc::now();
        Self {
            id: InspectionId::generate(),
            vehicle_id,
            inspector_id,
            kind,
            status: InspectionStatus::Draft,
            data: Value::Object(Map::new()),
            started_at: now,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn can_edit(&self) -> bool {
        !self.status.is_closed()
    }

    /// Moves the lifecycle forward. Re-sending the current status is allowed
    /// and is a no-op apart from `updated_at`; moving backwards is refused.
    /// `completed_at`, once set, is never cleared or overwritten.
    pub fn transition(
        &mut self,
        status: InspectionStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<(), ValidationError> {
        if status.rank() < self.status.rank() {
            return Err(ValidationError(format!(
                "status cannot move backwards: {} -> {}",
                self.status, status
            )));
        }
        self.status = status;
        if status.is_closed() && self.completed_at.is_none() {
            self.completed_at = Some(completed_at.unwrap_or_else(Utc::now));
        }
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// One successful path-patch, as acknowledged to the HTTP caller and pushed
/// to live subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateEvent {
    pub inspection_id: InspectionId,
    pub path: String,
    pub value: Value,
    pub timestamp: DateTime<Utc>,
    pub actor_id: String,
}
