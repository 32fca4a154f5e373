//! Lot Tracker - Card Production Records
//!
//! Records production lots of payment cards, sizes quality-control samples,
//! allocates packaging units for shipment and tracks dispatch through the
//! delivery agencies. Backed by SQLite; the operator UI talks to the JSON API
//! in [`web`].

pub mod database;
pub mod error;
pub mod models;
pub mod packaging;
pub mod sampling;
pub mod web;

pub use error::{LotError, Result};
pub use models::{Lot, LotType, NewLot, ShipmentStatus, TestResult};
pub use packaging::{allocate, packet_capacity, ShippingUnit, UnitKind};
pub use sampling::{cards_to_test, plan_samples, sample_size, SamplingDecision};
