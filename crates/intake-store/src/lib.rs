#![forbid(unsafe_code)]

use async_trait::async_trait;
use intake_model::{
    FormTemplate, Inspection, InspectionId, TemplateId, Vehicle, VehicleId,
};
use std::fmt::{Display, Formatter};

pub const CRATE_NAME: &str = "intake-store";

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum StoreErrorCode {
    NotFound,
    Conflict,
    Serialization,
    Io,
    Internal,
}

impl StoreErrorCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Serialization => "serialization_error",
            Self::Io => "io_error",
            Self::Internal => "internal_error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreError {
    pub code: StoreErrorCode,
    pub message: String,
}

impl StoreError {
    #[must_use]
    pub fn new(code: StoreErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn not_found(entity: &str, id: &str) -> Self {
        Self::new(StoreErrorCode::NotFound, format!("{entity} {id} not found"))
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.code == StoreErrorCode::NotFound
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for StoreError {}

/// The persistence boundary. Every operation is a single-document atomic
/// read or write; there are no multi-document transactions, and the store
/// itself does not serialize concurrent writers — that is the update
/// pipeline's job.
#[async_trait]
pub trait IntakeStore: Send + Sync + 'static {
    async fn create_inspection(&self, inspection: &Inspection) -> Result<(), StoreError>;
    async fn load_inspection(&self, id: &InspectionId) -> Result<Inspection, StoreError>;
    async fn save_inspection(&self, inspection: &Inspection) -> Result<(), StoreError>;
    async fn list_inspections(
        &self,
        vehicle: Option<&VehicleId>,
    ) -> Result<Vec<Inspection>, StoreError>;
    async fn delete_inspection(&self, id: &InspectionId) -> Result<(), StoreError>;

    async fn create_vehicle(&self, vehicle: &Vehicle) -> Result<(), StoreError>;
    async fn load_vehicle(&self, id: &VehicleId) -> Result<Vehicle, StoreError>;
    async fn save_vehicle(&self, vehicle: &Vehicle) -> Result<(), StoreError>;
    async fn list_vehicles(&self) -> Result<Vec<Vehicle>, StoreError>;

    async fn create_template(&self, template: &FormTemplate) -> Result<(), StoreError>;
    async fn load_template(&self, id: &TemplateId) -> Result<FormTemplate, StoreError>;
    async fn save_template(&self, template: &FormTemplate) -> Result<(), StoreError>;
    async fn list_templates(&self) -> Result<Vec<FormTemplate>, StoreError>;
    async fn delete_template(&self, id: &TemplateId) -> Result<(), StoreError>;
}
