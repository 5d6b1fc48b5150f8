//! In-memory store
//!
//! Fixture-friendly store backed by hash maps. Used by tests and the demo
//! binary before a database exists.

use std::collections::HashMap;

use crate::models::{Activity, Crop, Equipment, Parcel, Product};

use super::{ActivityFilter, Store, StoreError};

#[derive(Debug, Default)]
pub struct MemoryStore {
    activities: Vec<Activity>,
    parcels: HashMap<String, Parcel>,
    crops: HashMap<String, Crop>,
    equipment: HashMap<String, Equipment>,
    products: HashMap<String, Product>,
    people: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_activities(mut self, activities: Vec<Activity>) -> Self {
        self.activities.extend(activities);
        self
    }

    pub fn with_parcels(mut self, parcels: Vec<Parcel>) -> Self {
        for parcel in parcels {
            self.parcels.insert(parcel.id.clone(), parcel);
        }
        self
    }

    pub fn with_crops(mut self, crops: Vec<Crop>) -> Self {
        for crop in crops {
            self.crops.insert(crop.id.clone(), crop);
        }
        self
    }

    pub fn with_equipment(mut self, equipment: Vec<Equipment>) -> Self {
        for item in equipment {
            self.equipment.insert(item.id.clone(), item);
        }
        self
    }

    pub fn with_products(mut self, products: Vec<Product>) -> Self {
        for product in products {
            self.products.insert(product.id.clone(), product);
        }
        self
    }

    pub fn with_person(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.people.insert(id.into(), name.into());
        self
    }
}

impl Store for MemoryStore {
    async fn activities(&self, filter: &ActivityFilter) -> Result<Vec<Activity>, StoreError> {
        Ok(self
            .activities
            .iter()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect())
    }

    async fn activity(&self, id: &str) -> Result<Option<Activity>, StoreError> {
        Ok(self.activities.iter().find(|a| a.id == id).cloned())
    }

    async fn parcel(&self, id: &str) -> Result<Option<Parcel>, StoreError> {
        Ok(self.parcels.get(id).cloned())
    }

    async fn parcels_for_crop(&self, crop_id: &str) -> Result<Vec<Parcel>, StoreError> {
        let mut parcels: Vec<Parcel> = self
            .parcels
            .values()
            .filter(|p| p.crop_id.as_deref() == Some(crop_id))
            .cloned()
            .collect();
        // HashMap iteration order is arbitrary; callers expect stable output
        parcels.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(parcels)
    }

    async fn crop(&self, id: &str) -> Result<Option<Crop>, StoreError> {
        Ok(self.crops.get(id).cloned())
    }

    async fn equipment(&self, id: &str) -> Result<Option<Equipment>, StoreError> {
        Ok(self.equipment.get(id).cloned())
    }

    async fn product(&self, id: &str) -> Result<Option<Product>, StoreError> {
        Ok(self.products.get(id).cloned())
    }

    async fn person_name(&self, id: &str) -> Result<Option<String>, StoreError> {
        Ok(self.people.get(id).cloned())
    }
}
