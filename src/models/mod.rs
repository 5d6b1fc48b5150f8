//! Domain model types
//!
//! Plain data records as read by the aggregation core. The core never
//! mutates these; lifecycle changes belong to the data-collection layer.

pub mod activity;
pub mod entities;

pub use activity::{Activity, ActivityKind, ActivityState, EquipmentUsage, ProductUsage};
pub use entities::{Crop, CropKind, Equipment, Parcel, Product};
