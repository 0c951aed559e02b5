use serde::{Deserialize, Serialize};

use crate::Id;

/// A fuel type sold at the station (e.g. diesel, 95 octane).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fuel {
    #[serde(rename = "_id")]
    pub id: Id,
    pub name: String,
}

/// A physical tank on the forecourt. Referenced by readings and delivery
/// volumes, so it must exist before either can be validated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FuelTank {
    #[serde(rename = "_id")]
    pub id: Id,
    /// Reference to a [`Fuel`].
    pub fuel_type: Id,
    pub capacity: f64,
    pub deadstock: f64,
    pub acceptable_variance: f64,
}
