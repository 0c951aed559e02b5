use std::sync::Arc;

use async_trait::async_trait;
use axum::{routing::get, Router};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;

use model::{DayOff, Employee, Id, Position};

use crate::error::AppError;
use crate::query::{FieldValue, Fields};
use crate::resource::{self, Resource};
use crate::state::AppState;
use crate::store::Collection;
use crate::validate;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeInput {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub position_id: Id,
    pub day_off: DayOff,
    pub birthday: NaiveDate,
    pub date_started: NaiveDate,
}

#[async_trait]
impl Resource for Employee {
    const TITLE: &'static str = "Employee";
    const TITLE_PLURAL: &'static str = "Employees";
    const DEFAULT_SORT: Option<&'static str> = Some("lastName");

    type Input = EmployeeInput;

    fn collection(state: &AppState) -> &Collection<Self> {
        &state.employees
    }

    async fn validate(
        state: &AppState,
        input: &EmployeeInput,
        _existing: Option<Id>,
    ) -> Result<(), AppError> {
        validate::all_filled([input.first_name.as_str(), input.last_name.as_str()])?;

        if state.positions.find_by_id(input.position_id).await.is_none() {
            return Err(AppError::NotFound("Position not found.".to_string()));
        }
        Ok(())
    }

    fn build(input: EmployeeInput) -> Self {
        Employee {
            id: Id::new(),
            first_name: input.first_name,
            last_name: input.last_name,
            position: input.position_id,
            day_off: input.day_off,
            birthday: input.birthday,
            date_started: input.date_started,
        }
    }

    fn apply(&mut self, input: EmployeeInput) {
        self.first_name = input.first_name;
        self.last_name = input.last_name;
        self.position = input.position_id;
        self.day_off = input.day_off;
        self.birthday = input.birthday;
        self.date_started = input.date_started;
    }

    async fn render(&self, state: &AppState) -> Value {
        let mut view = serde_json::to_value(self).unwrap_or(Value::Null);
        let position = state.positions.find_by_id(self.position).await;
        resource::populate::<Position>(&mut view, "position", position);
        view
    }
}

impl Fields for Employee {
    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "firstName" => Some(FieldValue::Text(self.first_name.clone())),
            "lastName" => Some(FieldValue::Text(self.last_name.clone())),
            "dayOff" => Some(FieldValue::Text(self.day_off.as_str().to_string())),
            "birthday" => Some(FieldValue::Date(self.birthday)),
            "dateStarted" => Some(FieldValue::Date(self.date_started)),
            _ => None,
        }
    }
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/",
            get(resource::list::<Employee>).post(resource::create::<Employee>),
        )
        .route(
            "/:id",
            get(resource::get_one::<Employee>)
                .put(resource::update::<Employee>)
                .delete(resource::delete::<Employee>),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn employees_need_an_existing_position() {
        let state = AppState::for_tests();
        let input = EmployeeInput {
            first_name: "Sam".to_string(),
            last_name: "Forte".to_string(),
            position_id: Id::new(),
            day_off: DayOff::Sunday,
            birthday: NaiveDate::from_ymd_opt(1990, 4, 2).unwrap(),
            date_started: NaiveDate::from_ymd_opt(2020, 1, 6).unwrap(),
        };

        let missing = Employee::validate(&state, &input, None).await.unwrap_err();
        assert!(matches!(missing, AppError::NotFound(_)));

        let cashier = state
            .positions
            .insert(Position {
                id: input.position_id,
                name: "Cashier".to_string(),
            })
            .await
            .unwrap();
        Employee::validate(&state, &input, None).await.unwrap();

        let view = Employee::build(input).render(&state).await;
        assert_eq!(view["position"]["name"], cashier.name);
        assert_eq!(view["dayOff"], "Sunday");
    }
}
