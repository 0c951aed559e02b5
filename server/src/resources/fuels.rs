use std::sync::Arc;

use async_trait::async_trait;
use axum::{routing::get, Router};
use serde::Deserialize;

use model::{Fuel, Id};

use crate::error::AppError;
use crate::query::{FieldValue, Fields};
use crate::resource::{self, Resource};
use crate::state::AppState;
use crate::store::Collection;
use crate::validate;

#[derive(Debug, Deserialize)]
pub struct FuelInput {
    #[serde(default)]
    pub name: String,
}

#[async_trait]
impl Resource for Fuel {
    const TITLE: &'static str = "Fuel";
    const TITLE_PLURAL: &'static str = "Fuels";
    const DEFAULT_SORT: Option<&'static str> = Some("name");

    type Input = FuelInput;

    fn collection(state: &AppState) -> &Collection<Self> {
        &state.fuels
    }

    async fn validate(
        state: &AppState,
        input: &FuelInput,
        existing: Option<Id>,
    ) -> Result<(), AppError> {
        validate::all_filled([input.name.as_str()])?;

        if let Some(clash) = state.fuels.find_one(|f| f.name == input.name).await {
            if existing != Some(clash.id) {
                return Err(AppError::BadRequest("Fuel already exists.".to_string()));
            }
        }
        Ok(())
    }

    fn build(input: FuelInput) -> Self {
        Fuel {
            id: Id::new(),
            name: input.name,
        }
    }

    fn apply(&mut self, input: FuelInput) {
        self.name = input.name;
    }
}

impl Fields for Fuel {
    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "name" => Some(FieldValue::Text(self.name.clone())),
            _ => None,
        }
    }
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/",
            get(resource::list::<Fuel>).post(resource::create::<Fuel>),
        )
        .route(
            "/:id",
            get(resource::get_one::<Fuel>)
                .put(resource::update::<Fuel>)
                .delete(resource::delete::<Fuel>),
        )
}
