use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::Id;

/// Grouping record for the dip readings taken on one calendar date.
/// At most one group exists per date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FuelTankReading {
    #[serde(rename = "_id")]
    pub id: Id,
    pub date: NaiveDate,
}

/// One dip reading inside a group: a (tank, volume) pair. Each tank appears
/// at most once per group.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FuelTankReadingVolume {
    #[serde(rename = "_id")]
    pub id: Id,
    /// Reference to the owning [`FuelTankReading`].
    pub reading: Id,
    /// Reference to a [`crate::FuelTank`].
    pub fuel_tank: Id,
    pub volume: f64,
}
