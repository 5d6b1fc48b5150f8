//! Demo entrypoint: opens (and seeds, when empty) a local database, then
//! drives both engines through the command dispatch layer and prints the
//! JSON envelopes.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::info;

use agrolens::aggregator::cost::CostAggregator;
use agrolens::aggregator::productivity::ProductivityAggregator;
use agrolens::dispatch::{dispatch_cost, dispatch_productivity};
use agrolens::models::{
    Activity, ActivityKind, ActivityState, Crop, CropKind, Equipment, EquipmentUsage, Parcel,
    Product, ProductUsage,
};
use agrolens::store::sqlite::default_db_path;
use agrolens::store::SqliteStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let db_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(default_db_path);
    info!(path = %db_path.display(), "opening database");
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let store = SqliteStore::new(&db_path)?;
    store.initialize()?;
    if store.is_empty()? {
        info!("database is empty, seeding sample data");
        seed(&store)?;
    }
    let store = Arc::new(store);

    let mut costs = CostAggregator::new(Arc::clone(&store));
    let mut productivity = ProductivityAggregator::new(store);

    let commands = [
        json!({
            "kind": "compute-parcel-costs",
            "payload": { "parcel_id": "parcel-north" }
        }),
        json!({
            "kind": "compare-costs",
            "payload": {
                "comparison": "parcels",
                "ids": ["parcel-north", "parcel-south"],
                "options": {}
            }
        }),
    ];
    for command in commands {
        let response = dispatch_cost(&mut costs, command).await;
        println!("{}", serde_json::to_string_pretty(&response)?);
    }

    let commands = [
        json!({
            "kind": "analyze-parcel-productivity",
            "payload": { "parcel_id": "parcel-north" }
        }),
        json!({
            "kind": "analyze-trends",
            "payload": { "parcel_id": "parcel-north" }
        }),
        json!({
            "kind": "analyze-operational-efficiency",
            "payload": { "scope": { "kind": "harvest" } }
        }),
    ];
    for command in commands {
        let response = dispatch_productivity(&mut productivity, command).await;
        println!("{}", serde_json::to_string_pretty(&response)?);
    }

    Ok(())
}

fn ts(text: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    text.parse()
}

fn seed(store: &SqliteStore) -> Result<(), Box<dyn std::error::Error>> {
    store.insert_crop(&Crop {
        id: "crop-wheat".to_string(),
        name: "Winter Wheat".to_string(),
        kind: CropKind::Cereal,
        growth_cycle_days: Some(240),
    })?;
    store.insert_parcel(&Parcel {
        id: "parcel-north".to_string(),
        name: "North Field".to_string(),
        area_ha: 5.0,
        soil_type: Some("clay".to_string()),
        crop_id: Some("crop-wheat".to_string()),
    })?;
    store.insert_parcel(&Parcel {
        id: "parcel-south".to_string(),
        name: "South Field".to_string(),
        area_ha: 10.0,
        soil_type: Some("loam".to_string()),
        crop_id: Some("crop-wheat".to_string()),
    })?;
    store.insert_equipment(&Equipment {
        id: "eq-tractor".to_string(),
        name: "Tractor".to_string(),
        equipment_type: Some("tractor".to_string()),
        hourly_cost: Some(45.0),
    })?;
    store.insert_product(&Product {
        id: "prod-fertilizer".to_string(),
        name: "NPK Fertilizer".to_string(),
        product_type: Some("fertilizer".to_string()),
        unit_price: Some(4.0),
    })?;
    store.insert_person("person-ana", "Ana Pereira")?;
    store.insert_person("person-bruno", "Bruno Costa")?;

    let tractor = |hours: f64| EquipmentUsage {
        equipment_id: "eq-tractor".to_string(),
        time_used: hours,
        time_unit: "hour".to_string(),
    };
    let fertilizer = |quantity: f64| ProductUsage {
        product_id: "prod-fertilizer".to_string(),
        quantity,
        unit: "kg".to_string(),
    };

    store.insert_activity(&Activity {
        id: "act-treatment-1".to_string(),
        kind: ActivityKind::Treatment,
        state: ActivityState::Completed,
        started_at: ts("2025-05-02T08:00:00Z")?,
        ended_at: Some(ts("2025-05-02T12:00:00Z")?),
        parcel_id: "parcel-north".to_string(),
        responsible_id: "person-bruno".to_string(),
        equipment: vec![tractor(2.0)],
        products: vec![fertilizer(40.0)],
        harvested_quantity: None,
        harvest_unit: None,
        notes: Some("spring fertilization".to_string()),
    })?;

    let harvests = [
        ("act-harvest-1", "parcel-north", "2025-06-15", 20_000.0),
        ("act-harvest-2", "parcel-north", "2025-07-15", 25_000.0),
        ("act-harvest-3", "parcel-north", "2025-08-14", 30_000.0),
        ("act-harvest-4", "parcel-south", "2025-07-01", 30_000.0),
    ];
    for (id, parcel_id, day, quantity) in harvests {
        store.insert_activity(&Activity {
            id: id.to_string(),
            kind: ActivityKind::Harvest,
            state: ActivityState::Completed,
            started_at: ts(&format!("{day}T06:00:00Z"))?,
            ended_at: Some(ts(&format!("{day}T16:00:00Z"))?),
            parcel_id: parcel_id.to_string(),
            responsible_id: "person-ana".to_string(),
            equipment: vec![tractor(5.0)],
            products: vec![],
            harvested_quantity: Some(quantity),
            harvest_unit: Some("kg".to_string()),
            notes: None,
        })?;
    }

    Ok(())
}
