// SPDX-License-Identifier: Apache-2.0

//! SQLite-backed store. One writable connection shared behind a lock; every
//! trait call runs a short single-statement transaction, which keeps the
//! single-document atomicity contract without connection pooling.

use crate::{IntakeStore, StoreError, StoreErrorCode};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use intake_model::{
    FormTemplate, Inspection, InspectionId, InspectionKind, InspectionStatus, TemplateId,
    ValidationError, Vehicle, VehicleId, VehicleStatus,
};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS vehicles (
    id             TEXT PRIMARY KEY,
    license_plate  TEXT NOT NULL UNIQUE,
    vin            TEXT,
    make           TEXT NOT NULL DEFAULT '',
    model          TEXT NOT NULL DEFAULT '',
    year           INTEGER,
    color          TEXT,
    mileage        INTEGER,
    status         TEXT NOT NULL,
    checked_in_at  TEXT NOT NULL,
    checked_out_at TEXT,
    created_at     TEXT NOT NULL,
    updated_at     TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS inspections (
    id           TEXT PRIMARY KEY,
    vehicle_id   TEXT NOT NULL REFERENCES vehicles(id),
    inspector_id TEXT NOT NULL,
    kind         TEXT NOT NULL,
    status       TEXT NOT NULL,
    data         TEXT NOT NULL,
    started_at   TEXT NOT NULL,
    completed_at TEXT,
    created_at   TEXT NOT NULL,
    updated_at   TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_inspections_vehicle ON inspections(vehicle_id);
CREATE TABLE IF NOT EXISTS form_templates (
    id         TEXT PRIMARY KEY,
    name       TEXT NOT NULL,
    kind       TEXT NOT NULL,
    sections   TEXT NOT NULL,
    active     INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
";

pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::new(StoreErrorCode::Io, e.to_string()))?;
            }
        }
        let conn = Connection::open(path).map_err(map_sqlite_err)?;
        Self::bootstrap(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(map_sqlite_err)?;
        Self::bootstrap(conn)
    }

    fn bootstrap(conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(map_sqlite_err)?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(map_sqlite_err)?;
        conn.pragma_update(None, "busy_timeout", 5000)
            .map_err(map_sqlite_err)?;
        conn.execute_batch(SCHEMA).map_err(map_sqlite_err)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

fn map_sqlite_err(e: rusqlite::Error) -> StoreError {
    match &e {
        rusqlite::Error::SqliteFailure(inner, _)
            if inner.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            StoreError::new(StoreErrorCode::Conflict, e.to_string())
        }
        _ => StoreError::new(StoreErrorCode::Internal, e.to_string()),
    }
}

fn map_validation(e: ValidationError) -> StoreError {
    StoreError::new(StoreErrorCode::Serialization, e.to_string())
}

fn ts(value: &DateTime<Utc>) -> String {
    value.to_rfc3339()
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            StoreError::new(
                StoreErrorCode::Serialization,
                format!("bad timestamp {raw}: {e}"),
            )
        })
}

fn parse_opt_ts(raw: Option<String>) -> Result<Option<DateTime<Utc>>, StoreError> {
    raw.as_deref().map(parse_ts).transpose()
}

type InspectionRow = (
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    String,
    String,
);

fn read_inspection(row: &rusqlite::Row<'_>) -> rusqlite::Result<InspectionRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
    ))
}

fn inspection_from_row(row: InspectionRow) -> Result<Inspection, StoreError> {
    let (id, vehicle_id, inspector_id, kind, status, data, started, completed, created, updated) =
        row;
    Ok(Inspection {
        id: InspectionId::parse(&id).map_err(map_validation)?,
        vehicle_id: VehicleId::parse(&vehicle_id).map_err(map_validation)?,
        inspector_id,
        kind: InspectionKind::parse(&kind).map_err(map_validation)?,
        status: InspectionStatus::parse(&status).map_err(map_validation)?,
        data: serde_json::from_str(&data)
            .map_err(|e| StoreError::new(StoreErrorCode::Serialization, e.to_string()))?,
        started_at: parse_ts(&started)?,
        completed_at: parse_opt_ts(completed)?,
        created_at: parse_ts(&created)?,
        updated_at: parse_ts(&updated)?,
    })
}

type VehicleRow = (
    String,
    String,
    Option<String>,
    String,
    String,
    Option<i32>,
    Option<String>,
    Option<i64>,
    String,
    String,
    Option<String>,
    String,
    String,
);

fn read_vehicle(row: &rusqlite::Row<'_>) -> rusqlite::Result<VehicleRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
        row.get(11)?,
        row.get(12)?,
    ))
}

fn vehicle_from_row(row: VehicleRow) -> Result<Vehicle, StoreError> {
    let (
        id,
        license_plate,
        vin,
        make,
        model,
        year,
        color,
        mileage,
        status,
        checked_in,
        checked_out,
        created,
        updated,
    ) = row;
    Ok(Vehicle {
        id: VehicleId::parse(&id).map_err(map_validation)?,
        license_plate,
        vin,
        make,
        model,
        year,
        color,
        mileage,
        status: VehicleStatus::parse(&status).map_err(map_validation)?,
        checked_in_at: parse_ts(&checked_in)?,
        checked_out_at: parse_opt_ts(checked_out)?,
        created_at: parse_ts(&created)?,
        updated_at: parse_ts(&updated)?,
    })
}

type TemplateRow = (String, String, String, String, bool, String, String);

fn read_template(row: &rusqlite::Row<'_>) -> rusqlite::Result<TemplateRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn template_from_row(row: TemplateRow) -> Result<FormTemplate, StoreError> {
    let (id, name, kind, sections, active, created, updated) = row;
    Ok(FormTemplate {
        id: TemplateId::parse(&id).map_err(map_validation)?,
        name,
        kind: InspectionKind::parse(&kind).map_err(map_validation)?,
        sections: serde_json::from_str(&sections)
            .map_err(|e| StoreError::new(StoreErrorCode::Serialization, e.to_string()))?,
        active,
        created_at: parse_ts(&created)?,
        updated_at: parse_ts(&updated)?,
    })
}

fn encode_json(value: &serde_json::Value) -> Result<String, StoreError> {
    serde_json::to_string(value)
        .map_err(|e| StoreError::new(StoreErrorCode::Serialization, e.to_string()))
}

const INSPECTION_COLUMNS: &str = "id, vehicle_id, inspector_id, kind, status, data, \
     started_at, completed_at, created_at, updated_at";
const VEHICLE_COLUMNS: &str = "id, license_plate, vin, make, model, year, color, mileage, \
     status, checked_in_at, checked_out_at, created_at, updated_at";
const TEMPLATE_COLUMNS: &str = "id, name, kind, sections, active, created_at, updated_at";

#[async_trait]
impl IntakeStore for SqliteStore {
    async fn create_inspection(&self, inspection: &Inspection) -> Result<(), StoreError> {
        let data = encode_json(&inspection.data)?;
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO inspections (id, vehicle_id, inspector_id, kind, status, data, \
             started_at, completed_at, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                inspection.id.as_str(),
                inspection.vehicle_id.as_str(),
                inspection.inspector_id,
                inspection.kind.as_str(),
                inspection.status.as_str(),
                data,
                ts(&inspection.started_at),
                inspection.completed_at.as_ref().map(ts),
                ts(&inspection.created_at),
                ts(&inspection.updated_at),
            ],
        )
        .map_err(map_sqlite_err)?;
        Ok(())
    }

    async fn load_inspection(&self, id: &InspectionId) -> Result<Inspection, StoreError> {
        let conn = self.conn.lock().await;
        let row = conn
            .query_row(
                &format!("SELECT {INSPECTION_COLUMNS} FROM inspections WHERE id = ?1"),
                params![id.as_str()],
                read_inspection,
            )
            .optional()
            .map_err(map_sqlite_err)?;
        match row {
            Some(row) => inspection_from_row(row),
            None => Err(StoreError::not_found("inspection", id.as_str())),
        }
    }

    async fn save_inspection(&self, inspection: &Inspection) -> Result<(), StoreError> {
        let data = encode_json(&inspection.data)?;
        let conn = self.conn.lock().await;
        let changed = conn
            .execute(
                "UPDATE inspections SET status = ?2, data = ?3, completed_at = ?4, \
                 updated_at = ?5 WHERE id = ?1",
                params![
                    inspection.id.as_str(),
                    inspection.status.as_str(),
                    data,
                    inspection.completed_at.as_ref().map(ts),
                    ts(&inspection.updated_at),
                ],
            )
            .map_err(map_sqlite_err)?;
        if changed == 0 {
            return Err(StoreError::not_found("inspection", inspection.id.as_str()));
        }
        Ok(())
    }

    async fn list_inspections(
        &self,
        vehicle: Option<&VehicleId>,
    ) -> Result<Vec<Inspection>, StoreError> {
        let conn = self.conn.lock().await;
        let mut rows = Vec::new();
        match vehicle {
            Some(vehicle) => {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT {INSPECTION_COLUMNS} FROM inspections \
                         WHERE vehicle_id = ?1 ORDER BY created_at DESC"
                    ))
                    .map_err(map_sqlite_err)?;
                let mapped = stmt
                    .query_map(params![vehicle.as_str()], read_inspection)
                    .map_err(map_sqlite_err)?;
                for row in mapped {
                    rows.push(row.map_err(map_sqlite_err)?);
                }
            }
            None => {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT {INSPECTION_COLUMNS} FROM inspections ORDER BY created_at DESC"
                    ))
                    .map_err(map_sqlite_err)?;
                let mapped = stmt
                    .query_map([], read_inspection)
                    .map_err(map_sqlite_err)?;
                for row in mapped {
                    rows.push(row.map_err(map_sqlite_err)?);
                }
            }
        }
        rows.into_iter().map(inspection_from_row).collect()
    }

    async fn delete_inspection(&self, id: &InspectionId) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        let changed = conn
            .execute(
                "DELETE FROM inspections WHERE id = ?1",
                params![id.as_str()],
            )
            .map_err(map_sqlite_err)?;
        if changed == 0 {
            return Err(StoreError::not_found("inspection", id.as_str()));
        }
        Ok(())
    }

    async fn create_vehicle(&self, vehicle: &Vehicle) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO vehicles (id, license_plate, vin, make, model, year, color, mileage, \
             status, checked_in_at, checked_out_at, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                vehicle.id.as_str(),
                vehicle.license_plate,
                vehicle.vin,
                vehicle.make,
                vehicle.model,
                vehicle.year,
                vehicle.color,
                vehicle.mileage,
                vehicle.status.as_str(),
                ts(&vehicle.checked_in_at),
                vehicle.checked_out_at.as_ref().map(ts),
                ts(&vehicle.created_at),
                ts(&vehicle.updated_at),
            ],
        )
        .map_err(map_sqlite_err)?;
        Ok(())
    }

    async fn load_vehicle(&self, id: &VehicleId) -> Result<Vehicle, StoreError> {
        let conn = self.conn.lock().await;
        let row = conn
            .query_row(
                &format!("SELECT {VEHICLE_COLUMNS} FROM vehicles WHERE id = ?1"),
                params![id.as_str()],
                read_vehicle,
            )
            .optional()
            .map_err(map_sqlite_err)?;
        match row {
            Some(row) => vehicle_from_row(row),
            None => Err(StoreError::not_found("vehicle", id.as_str())),
        }
    }

    async fn save_vehicle(&self, vehicle: &Vehicle) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        let changed = conn
            .execute(
                "UPDATE vehicles SET status = ?2, mileage = ?3, color = ?4, \
                 checked_out_at = ?5, updated_at = ?6 WHERE id = ?1",
                params![
                    vehicle.id.as_str(),
                    vehicle.status.as_str(),
                    vehicle.mileage,
                    vehicle.color,
                    vehicle.checked_out_at.as_ref().map(ts),
                    ts(&vehicle.updated_at),
                ],
            )
            .map_err(map_sqlite_err)?;
        if changed == 0 {
            return Err(StoreError::not_found("vehicle", vehicle.id.as_str()));
        }
        Ok(())
    }

    async fn list_vehicles(&self) -> Result<Vec<Vehicle>, StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {VEHICLE_COLUMNS} FROM vehicles ORDER BY created_at DESC"
            ))
            .map_err(map_sqlite_err)?;
        let mapped = stmt.query_map([], read_vehicle).map_err(map_sqlite_err)?;
        let mut rows = Vec::new();
        for row in mapped {
            rows.push(row.map_err(map_sqlite_err)?);
        }
        rows.into_iter().map(vehicle_from_row).collect()
    }

    async fn create_template(&self, template: &FormTemplate) -> Result<(), StoreError> {
        let sections = encode_json(&template.sections)?;
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO form_templates (id, name, kind, sections, active, created_at, \
             updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                template.id.as_str(),
                template.name,
                template.kind.as_str(),
                sections,
                template.active,
                ts(&template.created_at),
                ts(&template.updated_at),
            ],
        )
        .map_err(map_sqlite_err)?;
        Ok(())
    }

    async fn load_template(&self, id: &TemplateId) -> Result<FormTemplate, StoreError> {
        let conn = self.conn.lock().await;
        let row = conn
            .query_row(
                &format!("SELECT {TEMPLATE_COLUMNS} FROM form_templates WHERE id = ?1"),
                params![id.as_str()],
                read_template,
            )
            .optional()
            .map_err(map_sqlite_err)?;
        match row {
            Some(row) => template_from_row(row),
            None => Err(StoreError::not_found("template", id.as_str())),
        }
    }

    async fn save_template(&self, template: &FormTemplate) -> Result<(), StoreError> {
        let sections = encode_json(&template.sections)?;
        let conn = self.conn.lock().await;
        let changed = conn
            .execute(
                "UPDATE form_templates SET name = ?2, sections = ?3, active = ?4, \
                 updated_at = ?5 WHERE id = ?1",
                params![
                    template.id.as_str(),
                    template.name,
                    sections,
                    template.active,
                    ts(&template.updated_at),
                ],
            )
            .map_err(map_sqlite_err)?;
        if changed == 0 {
            return Err(StoreError::not_found("template", template.id.as_str()));
        }
        Ok(())
    }

    async fn list_templates(&self) -> Result<Vec<FormTemplate>, StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {TEMPLATE_COLUMNS} FROM form_templates ORDER BY created_at DESC"
            ))
            .map_err(map_sqlite_err)?;
        let mapped = stmt.query_map([], read_template).map_err(map_sqlite_err)?;
        let mut rows = Vec::new();
        for row in mapped {
            rows.push(row.map_err(map_sqlite_err)?);
        }
        rows.into_iter().map(template_from_row).collect()
    }

    async fn delete_template(&self, id: &TemplateId) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        let changed = conn
            .execute(
                "DELETE FROM form_templates WHERE id = ?1",
                params![id.as_str()],
            )
            .map_err(map_sqlite_err)?;
        if changed == 0 {
            return Err(StoreError::not_found("template", id.as_str()));
        }
        Ok(())
    }
}
