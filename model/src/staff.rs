use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::Id;

/// Access level attached to a [`User`]. The `admin` role unlocks account
/// management and fuel tank deletion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    #[serde(rename = "_id")]
    pub id: Id,
    pub name: String,
}

/// Back-office account. Password material never leaves the server.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: Id,
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[serde(skip_serializing)]
    pub salt: String,
    /// Reference to a [`Role`].
    pub role: Id,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    #[serde(rename = "_id")]
    pub id: Id,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DayOff {
    Sunday,
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
}

impl DayOff {
    pub fn as_str(&self) -> &'static str {
        match self {
            DayOff::Sunday => "Sunday",
            DayOff::Monday => "Monday",
            DayOff::Tuesday => "Tuesday",
            DayOff::Wednesday => "Wednesday",
            DayOff::Thursday => "Thursday",
            DayOff::Friday => "Friday",
            DayOff::Saturday => "Saturday",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Employee {
    #[serde(rename = "_id")]
    pub id: Id,
    pub first_name: String,
    pub last_name: String,
    /// Reference to a [`Position`].
    pub position: Id,
    pub day_off: DayOff,
    pub birthday: NaiveDate,
    pub date_started: NaiveDate,
}
