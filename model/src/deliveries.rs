use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::Id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Approved,
    Delivered,
    Cancelled,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Approved => "approved",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Cancelled => "cancelled",
        }
    }
}

/// Grouping record for one fuel order. Chronology invariant: the order date
/// is never after the delivery date, the payment due date, or the actual
/// delivered date.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FuelDelivery {
    #[serde(rename = "_id")]
    pub id: Id,
    pub date_ordered: NaiveDate,
    pub delivery_date: NaiveDate,
    pub payment_due_date: NaiveDate,
    pub date_delivered: Option<NaiveDate>,
    pub status: DeliveryStatus,
    pub credit: f64,
}

/// One line of a delivery: how much fuel went into which tank at what price.
/// Each tank appears at most once per delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FuelDeliveryVolume {
    #[serde(rename = "_id")]
    pub id: Id,
    /// Reference to the owning [`FuelDelivery`].
    pub delivery: Id,
    /// Reference to a [`crate::FuelTank`].
    pub fuel_tank: Id,
    pub volume: f64,
    pub price: f64,
}
