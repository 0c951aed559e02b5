use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{Path, State},
    response::Response,
    routing::get,
    Router,
};
use serde::Deserialize;
use serde_json::Value;

use model::{Fuel, FuelTank, Id};

use crate::auth::Principal;
use crate::error::AppError;
use crate::query::{FieldValue, Fields};
use crate::resource::{self, Resource};
use crate::state::AppState;
use crate::store::Collection;
use crate::validate;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FuelTankInput {
    pub fuel_type_id: Id,
    pub capacity: f64,
    pub deadstock: f64,
    pub acceptable_variance: f64,
}

#[async_trait]
impl Resource for FuelTank {
    const TITLE: &'static str = "Fuel tank";
    const TITLE_PLURAL: &'static str = "Fuel tanks";

    type Input = FuelTankInput;

    fn collection(state: &AppState) -> &Collection<Self> {
        &state.fuel_tanks
    }

    async fn validate(
        state: &AppState,
        input: &FuelTankInput,
        _existing: Option<Id>,
    ) -> Result<(), AppError> {
        validate::numbers(
            "Capacity, deadstock, and acceptable variance must be greater than 0.",
            &[input.capacity, input.deadstock, input.acceptable_variance],
        )?;

        if state.fuels.find_by_id(input.fuel_type_id).await.is_none() {
            return Err(AppError::NotFound("Fuel not found.".to_string()));
        }
        Ok(())
    }

    fn build(input: FuelTankInput) -> Self {
        FuelTank {
            id: Id::new(),
            fuel_type: input.fuel_type_id,
            capacity: input.capacity,
            deadstock: input.deadstock,
            acceptable_variance: input.acceptable_variance,
        }
    }

    fn apply(&mut self, input: FuelTankInput) {
        self.fuel_type = input.fuel_type_id;
        self.capacity = input.capacity;
        self.deadstock = input.deadstock;
        self.acceptable_variance = input.acceptable_variance;
    }

    async fn render(&self, state: &AppState) -> Value {
        let mut view = serde_json::to_value(self).unwrap_or(Value::Null);
        let fuel = state.fuels.find_by_id(self.fuel_type).await;
        resource::populate::<Fuel>(&mut view, "fuelType", fuel);
        view
    }
}

impl Fields for FuelTank {
    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "capacity" => Some(FieldValue::Number(self.capacity)),
            "deadstock" => Some(FieldValue::Number(self.deadstock)),
            "acceptableVariance" => Some(FieldValue::Number(self.acceptable_variance)),
            _ => None,
        }
    }
}

// Tank deletion is admin-only.
async fn delete(
    principal: Principal,
    state: State<Arc<AppState>>,
    path: Path<String>,
) -> Result<Response, AppError> {
    principal.require_admin()?;
    resource::delete::<FuelTank>(state, path).await
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/",
            get(resource::list::<FuelTank>).post(resource::create::<FuelTank>),
        )
        .route(
            "/:id",
            get(resource::get_one::<FuelTank>)
                .put(resource::update::<FuelTank>)
                .delete(delete),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tanks_reject_negative_numbers_and_ghost_fuels() {
        let state = AppState::for_tests();
        let diesel = state
            .fuels
            .insert(Fuel {
                id: Id::new(),
                name: "Diesel".to_string(),
            })
            .await
            .unwrap();

        let negative = FuelTank::validate(
            &state,
            &FuelTankInput {
                fuel_type_id: diesel.id,
                capacity: 25000.0,
                deadstock: -1.0,
                acceptable_variance: 200.0,
            },
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(negative, AppError::BadRequest(_)));

        let ghost = FuelTank::validate(
            &state,
            &FuelTankInput {
                fuel_type_id: Id::new(),
                capacity: 25000.0,
                deadstock: 1000.0,
                acceptable_variance: 200.0,
            },
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(ghost, AppError::NotFound(_)));

        FuelTank::validate(
            &state,
            &FuelTankInput {
                fuel_type_id: diesel.id,
                capacity: 25000.0,
                deadstock: 1000.0,
                acceptable_variance: 200.0,
            },
            None,
        )
        .await
        .unwrap();
    }
}
