// SPDX-License-Identifier: Apache-2.0

//! In-memory store used by unit tests. Mirrors the SQLite semantics (unique
//! plates, not-found on save of an absent row) and exposes a failure toggle
//! so callers can exercise the storage-failure path.

use crate::{IntakeStore, StoreError, StoreErrorCode};
use async_trait::async_trait;
use intake_model::{
    FormTemplate, Inspection, InspectionId, TemplateId, Vehicle, VehicleId,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::Mutex;

#[derive(Default)]
pub struct MemoryStore {
    inspections: Mutex<HashMap<InspectionId, Inspection>>,
    vehicles: Mutex<HashMap<VehicleId, Vehicle>>,
    templates: Mutex<HashMap<TemplateId, FormTemplate>>,
    pub save_calls: AtomicU64,
    pub fail_saves: AtomicBool,
}

impl MemoryStore {
    fn check_save_allowed(&self) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::Relaxed) {
            return Err(StoreError::new(
                StoreErrorCode::Io,
                "simulated storage failure",
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl IntakeStore for MemoryStore {
    async fn create_inspection(&self, inspection: &Inspection) -> Result<(), StoreError> {
        self.check_save_allowed()?;
        let mut inspections = self.inspections.lock().await;
        if inspections.contains_key(&inspection.id) {
            return Err(StoreError::new(
                StoreErrorCode::Conflict,
                format!("inspection {} already exists", inspection.id),
            ));
        }
        inspections.insert(inspection.id.clone(), inspection.clone());
        Ok(())
    }

    async fn load_inspection(&self, id: &InspectionId) -> Result<Inspection, StoreError> {
        self.inspections
            .lock()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("inspection", id.as_str()))
    }

    async fn save_inspection(&self, inspection: &Inspection) -> Result<(), StoreError> {
        self.check_save_allowed()?;
        self.save_calls.fetch_add(1, Ordering::Relaxed);
        let mut inspections = self.inspections.lock().await;
        if !inspections.contains_key(&inspection.id) {
            return Err(StoreError::not_found("inspection", inspection.id.as_str()));
        }
        inspections.insert(inspection.id.clone(), inspection.clone());
        Ok(())
    }

    async fn list_inspections(
        &self,
        vehicle: Option<&VehicleId>,
    ) -> Result<Vec<Inspection>, StoreError> {
        let inspections = self.inspections.lock().await;
        let mut rows: Vec<Inspection> = inspections
            .values()
            .filter(|i| vehicle.map_or(true, |v| &i.vehicle_id == v))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn delete_inspection(&self, id: &InspectionId) -> Result<(), StoreError> {
        match self.inspections.lock().await.remove(id) {
            Some(_) => Ok(()),
            None => Err(StoreError::not_found("inspection", id.as_str())),
        }
    }

    async fn create_vehicle(&self, vehicle: &Vehicle) -> Result<(), StoreError> {
        let mut vehicles = self.vehicles.lock().await;
        if vehicles
            .values()
            .any(|v| v.license_plate == vehicle.license_plate)
        {
            return Err(StoreError::new(
                StoreErrorCode::Conflict,
                format!("license plate {} already registered", vehicle.license_plate),
            ));
        }
        vehicles.insert(vehicle.id.clone(), vehicle.clone());
        Ok(())
    }

    async fn load_vehicle(&self, id: &VehicleId) -> Result<Vehicle, StoreError> {
        self.vehicles
            .lock()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("vehicle", id.as_str()))
    }

    async fn save_vehicle(&self, vehicle: &Vehicle) -> Result<(), StoreError> {
        let mut vehicles = self.vehicles.lock().await;
        if !vehicles.contains_key(&vehicle.id) {
            return Err(StoreError::not_found("vehicle", vehicle.id.as_str()));
        }
        vehicles.insert(vehicle.id.clone(), vehicle.clone());
        Ok(())
    }

    async fn list_vehicles(&self) -> Result<Vec<Vehicle>, StoreError> {
        let vehicles = self.vehicles.lock().await;
        let mut rows: Vec<Vehicle> = vehicles.values().cloned().collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn create_template(&self, template: &FormTemplate) -> Result<(), StoreError> {
        let mut templates = self.templates.lock().await;
        if templates.contains_key(&template.id) {
            return Err(StoreError::new(
                StoreErrorCode::Conflict,
                format!("template {} already exists", template.id),
            ));
        }
        templates.insert(template.id.clone(), template.clone());
        Ok(())
    }

    async fn load_template(&self, id: &TemplateId) -> Result<FormTemplate, StoreError> {
        self.templates
            .lock()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("template", id.as_str()))
    }

    async fn save_template(&self, template: &FormTemplate) -> Result<(), StoreError> {
        let mut templates = self.templates.lock().await;
        if !templates.contains_key(&template.id) {
            return Err(StoreError::not_found("template", template.id.as_str()));
        }
        templates.insert(template.id.clone(), template.clone());
        Ok(())
    }

    async fn list_templates(&self) -> Result<Vec<FormTemplate>, StoreError> {
        let templates = self.templates.lock().await;
        let mut rows: Vec<FormTemplate> = templates.values().cloned().collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn delete_template(&self, id: &TemplateId) -> Result<(), StoreError> {
        match self.templates.lock().await.remove(id) {
            Some(_) => Ok(()),
            None => Err(StoreError::not_found("template", id.as_str())),
        }
    }
}
