use std::sync::Arc;

use async_trait::async_trait;
use axum::{routing::get, Router};
use serde::Deserialize;

use model::{Id, Position};

use crate::error::AppError;
use crate::query::{FieldValue, Fields};
use crate::resource::{self, Resource};
use crate::state::AppState;
use crate::store::Collection;
use crate::validate;

#[derive(Debug, Deserialize)]
pub struct PositionInput {
    #[serde(default)]
    pub name: String,
}

#[async_trait]
impl Resource for Position {
    const TITLE: &'static str = "Position";
    const TITLE_PLURAL: &'static str = "Positions";
    const DEFAULT_SORT: Option<&'static str> = Some("name");

    type Input = PositionInput;

    fn collection(state: &AppState) -> &Collection<Self> {
        &state.positions
    }

    async fn validate(
        state: &AppState,
        input: &PositionInput,
        existing: Option<Id>,
    ) -> Result<(), AppError> {
        validate::all_filled([input.name.as_str()])?;

        if let Some(clash) = state.positions.find_one(|p| p.name == input.name).await {
            if existing != Some(clash.id) {
                return Err(AppError::BadRequest("Position already exists.".to_string()));
            }
        }
        Ok(())
    }

    fn build(input: PositionInput) -> Self {
        Position {
            id: Id::new(),
            name: input.name,
        }
    }

    fn apply(&mut self, input: PositionInput) {
        self.name = input.name;
    }
}

impl Fields for Position {
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
            get(resource::list::<Position>).post(resource::create::<Position>),
        )
        .route(
            "/:id",
            get(resource::get_one::<Position>)
                .put(resource::update::<Position>)
                .delete(resource::delete::<Position>),
        )
}
