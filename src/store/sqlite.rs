//! SQLite-backed store
//!
//! A single connection behind a mutex. Timestamps are stored as RFC 3339
//! text, enums as their lowercase tags. Simple clauses (parcel, kind,
//! responsible, state) are pushed into SQL; the remaining filter clauses
//! are applied in Rust through [`ActivityFilter::matches`] so both store
//! implementations share one matching semantics.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::models::{
    Activity, ActivityState, Crop, CropKind, Equipment, EquipmentUsage, Parcel, Product,
    ProductUsage,
};

use super::{ActivityFilter, Store, StoreError};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS parcels (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    area_ha     REAL NOT NULL,
    soil_type   TEXT,
    crop_id     TEXT
);

CREATE TABLE IF NOT EXISTS crops (
    id                  TEXT PRIMARY KEY,
    name                TEXT NOT NULL,
    kind                TEXT NOT NULL,
    growth_cycle_days   INTEGER
);

CREATE TABLE IF NOT EXISTS equipment (
    id              TEXT PRIMARY KEY,
    name            TEXT NOT NULL,
    equipment_type  TEXT,
    hourly_cost     REAL
);

CREATE TABLE IF NOT EXISTS products (
    id            TEXT PRIMARY KEY,
    name          TEXT NOT NULL,
    product_type  TEXT,
    unit_price    REAL
);

CREATE TABLE IF NOT EXISTS people (
    id    TEXT PRIMARY KEY,
    name  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS activities (
    id                  TEXT PRIMARY KEY,
    kind                TEXT NOT NULL,
    state               TEXT NOT NULL,
    started_at          TEXT NOT NULL,
    ended_at            TEXT,
    parcel_id           TEXT NOT NULL,
    responsible_id      TEXT NOT NULL,
    harvested_quantity  REAL,
    harvest_unit        TEXT,
    notes               TEXT
);

CREATE TABLE IF NOT EXISTS activity_equipment (
    activity_id   TEXT NOT NULL REFERENCES activities(id),
    equipment_id  TEXT NOT NULL,
    time_used     REAL NOT NULL,
    time_unit     TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS activity_products (
    activity_id  TEXT NOT NULL REFERENCES activities(id),
    product_id   TEXT NOT NULL,
    quantity     REAL NOT NULL,
    unit         TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_activities_parcel ON activities(parcel_id);
CREATE INDEX IF NOT EXISTS idx_activities_kind ON activities(kind);
CREATE INDEX IF NOT EXISTS idx_activities_started ON activities(started_at);
CREATE INDEX IF NOT EXISTS idx_parcels_crop ON parcels(crop_id);
CREATE INDEX IF NOT EXISTS idx_activity_equipment ON activity_equipment(activity_id);
CREATE INDEX IF NOT EXISTS idx_activity_products ON activity_products(activity_id);
"#;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create tables and indexes if they do not exist
    pub fn initialize(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM activities", [], |row| row.get(0))?;
        Ok(count == 0)
    }

    pub fn insert_parcel(&self, parcel: &Parcel) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO parcels (id, name, area_ha, soil_type, crop_id)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                parcel.id,
                parcel.name,
                parcel.area_ha,
                parcel.soil_type,
                parcel.crop_id
            ],
        )?;
        Ok(())
    }

    pub fn insert_crop(&self, crop: &Crop) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO crops (id, name, kind, growth_cycle_days)
             VALUES (?1, ?2, ?3, ?4)",
            params![crop.id, crop.name, crop.kind.as_str(), crop.growth_cycle_days],
        )?;
        Ok(())
    }

    pub fn insert_equipment(&self, equipment: &Equipment) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO equipment (id, name, equipment_type, hourly_cost)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                equipment.id,
                equipment.name,
                equipment.equipment_type,
                equipment.hourly_cost
            ],
        )?;
        Ok(())
    }

    pub fn insert_product(&self, product: &Product) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO products (id, name, product_type, unit_price)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                product.id,
                product.name,
                product.product_type,
                product.unit_price
            ],
        )?;
        Ok(())
    }

    pub fn insert_person(&self, id: &str, name: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO people (id, name) VALUES (?1, ?2)",
            params![id, name],
        )?;
        Ok(())
    }

    pub fn insert_activity(&self, activity: &Activity) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO activities
             (id, kind, state, started_at, ended_at, parcel_id, responsible_id,
              harvested_quantity, harvest_unit, notes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                activity.id,
                activity.kind.as_str(),
                activity.state.as_str(),
                activity.started_at.to_rfc3339(),
                activity.ended_at.map(|t| t.to_rfc3339()),
                activity.parcel_id,
                activity.responsible_id,
                activity.harvested_quantity,
                activity.harvest_unit,
                activity.notes
            ],
        )?;
        conn.execute(
            "DELETE FROM activity_equipment WHERE activity_id = ?1",
            params![activity.id],
        )?;
        for usage in &activity.equipment {
            conn.execute(
                "INSERT INTO activity_equipment (activity_id, equipment_id, time_used, time_unit)
                 VALUES (?1, ?2, ?3, ?4)",
                params![activity.id, usage.equipment_id, usage.time_used, usage.time_unit],
            )?;
        }
        conn.execute(
            "DELETE FROM activity_products WHERE activity_id = ?1",
            params![activity.id],
        )?;
        for usage in &activity.products {
            conn.execute(
                "INSERT INTO activity_products (activity_id, product_id, quantity, unit)
                 VALUES (?1, ?2, ?3, ?4)",
                params![activity.id, usage.product_id, usage.quantity, usage.unit],
            )?;
        }
        Ok(())
    }
}

fn activity_from_row(row: &Row<'_>) -> Result<Activity, rusqlite::Error> {
    let kind_tag: String = row.get(1)?;
    let state_tag: String = row.get(2)?;
    let started_at: String = row.get(3)?;
    let ended_at: Option<String> = row.get(4)?;

    Ok(Activity {
        id: row.get(0)?,
        kind: crate::models::ActivityKind::parse(&kind_tag).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                1,
                rusqlite::types::Type::Text,
                format!("unknown activity kind {kind_tag:?}").into(),
            )
        })?,
        state: ActivityState::parse(&state_tag).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                2,
                rusqlite::types::Type::Text,
                format!("unknown activity state {state_tag:?}").into(),
            )
        })?,
        started_at: started_at.parse().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                3,
                rusqlite::types::Type::Text,
                format!("bad timestamp: {e}").into(),
            )
        })?,
        ended_at: match ended_at {
            Some(text) => Some(text.parse().map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    4,
                    rusqlite::types::Type::Text,
                    format!("bad timestamp: {e}").into(),
                )
            })?),
            None => None,
        },
        parcel_id: row.get(5)?,
        responsible_id: row.get(6)?,
        equipment: vec![],
        products: vec![],
        harvested_quantity: row.get(7)?,
        harvest_unit: row.get(8)?,
        notes: row.get(9)?,
    })
}

fn load_usage_lines(conn: &Connection, activity: &mut Activity) -> Result<(), StoreError> {
    let mut stmt = conn.prepare(
        "SELECT equipment_id, time_used, time_unit
         FROM activity_equipment WHERE activity_id = ?1",
    )?;
    activity.equipment = stmt
        .query_map(params![activity.id], |row| {
            Ok(EquipmentUsage {
                equipment_id: row.get(0)?,
                time_used: row.get(1)?,
                time_unit: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare(
        "SELECT product_id, quantity, unit
         FROM activity_products WHERE activity_id = ?1",
    )?;
    activity.products = stmt
        .query_map(params![activity.id], |row| {
            Ok(ProductUsage {
                product_id: row.get(0)?,
                quantity: row.get(1)?,
                unit: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(())
}

const ACTIVITY_COLUMNS: &str = "id, kind, state, started_at, ended_at, parcel_id, \
     responsible_id, harvested_quantity, harvest_unit, notes";

impl Store for SqliteStore {
    async fn activities(&self, filter: &ActivityFilter) -> Result<Vec<Activity>, StoreError> {
        let conn = self.lock()?;

        let mut sql = format!("SELECT {ACTIVITY_COLUMNS} FROM activities WHERE 1 = 1");
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(parcel_id) = &filter.parcel_id {
            sql.push_str(&format!(" AND parcel_id = ?{}", args.len() + 1));
            args.push(Box::new(parcel_id.clone()));
        }
        if let Some(kind) = filter.kind {
            sql.push_str(&format!(" AND kind = ?{}", args.len() + 1));
            args.push(Box::new(kind.as_str().to_string()));
        }
        if let Some(responsible_id) = &filter.responsible_id {
            sql.push_str(&format!(" AND responsible_id = ?{}", args.len() + 1));
            args.push(Box::new(responsible_id.clone()));
        }
        sql.push_str(" ORDER BY started_at ASC");

        let mut stmt = conn.prepare(&sql)?;
        let params: Vec<&dyn rusqlite::ToSql> = args.iter().map(|a| a.as_ref()).collect();
        let rows = stmt
            .query_map(params.as_slice(), activity_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        // id/state/period clauses stay in Rust to keep one matching semantics
        let mut activities = Vec::new();
        for mut activity in rows {
            if filter.matches(&activity) {
                load_usage_lines(&conn, &mut activity)?;
                activities.push(activity);
            }
        }
        Ok(activities)
    }

    async fn activity(&self, id: &str) -> Result<Option<Activity>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ACTIVITY_COLUMNS} FROM activities WHERE id = ?1"
        ))?;
        let activity = stmt.query_row(params![id], activity_from_row).optional()?;
        match activity {
            Some(mut activity) => {
                load_usage_lines(&conn, &mut activity)?;
                Ok(Some(activity))
            }
            None => Ok(None),
        }
    }

    async fn parcel(&self, id: &str) -> Result<Option<Parcel>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, area_ha, soil_type, crop_id FROM parcels WHERE id = ?1",
        )?;
        Ok(stmt
            .query_row(params![id], |row| {
                Ok(Parcel {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    area_ha: row.get(2)?,
                    soil_type: row.get(3)?,
                    crop_id: row.get(4)?,
                })
            })
            .optional()?)
    }

    async fn parcels_for_crop(&self, crop_id: &str) -> Result<Vec<Parcel>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, area_ha, soil_type, crop_id
             FROM parcels WHERE crop_id = ?1 ORDER BY id ASC",
        )?;
        let parcels = stmt
            .query_map(params![crop_id], |row| {
                Ok(Parcel {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    area_ha: row.get(2)?,
                    soil_type: row.get(3)?,
                    crop_id: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(parcels)
    }

    async fn crop(&self, id: &str) -> Result<Option<Crop>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, kind, growth_cycle_days FROM crops WHERE id = ?1",
        )?;
        Ok(stmt
            .query_row(params![id], |row| {
                let kind_tag: String = row.get(2)?;
                Ok(Crop {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    kind: CropKind::parse(&kind_tag),
                    growth_cycle_days: row.get(3)?,
                })
            })
            .optional()?)
    }

    async fn equipment(&self, id: &str) -> Result<Option<Equipment>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, equipment_type, hourly_cost FROM equipment WHERE id = ?1",
        )?;
        Ok(stmt
            .query_row(params![id], |row| {
                Ok(Equipment {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    equipment_type: row.get(2)?,
                    hourly_cost: row.get(3)?,
                })
            })
            .optional()?)
    }

    async fn product(&self, id: &str) -> Result<Option<Product>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, product_type, unit_price FROM products WHERE id = ?1",
        )?;
        Ok(stmt
            .query_row(params![id], |row| {
                Ok(Product {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    product_type: row.get(2)?,
                    unit_price: row.get(3)?,
                })
            })
            .optional()?)
    }

    async fn person_name(&self, id: &str) -> Result<Option<String>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT name FROM people WHERE id = ?1")?;
        Ok(stmt.query_row(params![id], |row| row.get(0)).optional()?)
    }
}

/// Default on-disk database location
pub fn default_db_path() -> PathBuf {
    let data_dir = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    data_dir.join("agrolens").join("agrolens.db")
}
