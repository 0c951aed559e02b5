//! # Records
//!
//! Shared record types for the fuel station back office.
//!
//! Every persisted record carries an [`Id`] and serializes with the wire
//! names the clients expect (camelCase fields, `_id` for the identifier).
//! Grouping records ([`FuelTankReading`], [`FuelDelivery`]) own their child
//! volume records; children never outlive their parent.

mod id;

pub mod deliveries;
pub mod fuel;
pub mod readings;
pub mod staff;

pub use deliveries::{DeliveryStatus, FuelDelivery, FuelDeliveryVolume};
pub use fuel::{Fuel, FuelTank};
pub use id::Id;
pub use readings::{FuelTankReading, FuelTankReadingVolume};
pub use staff::{DayOff, Employee, Position, Role, User};
