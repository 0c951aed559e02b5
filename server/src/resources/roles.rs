use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    response::Response,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::collections::HashMap;

use model::{Id, Role};

use crate::auth::Principal;
use crate::error::AppError;
use crate::query::{FieldValue, Fields};
use crate::resource::{self, Resource};
use crate::state::AppState;
use crate::store::Collection;
use crate::validate;

#[derive(Debug, Deserialize)]
pub struct RoleInput {
    #[serde(default)]
    pub name: String,
}

#[async_trait]
impl Resource for Role {
    const TITLE: &'static str = "Role";
    const TITLE_PLURAL: &'static str = "Roles";
    const DEFAULT_SORT: Option<&'static str> = Some("name");

    type Input = RoleInput;

    fn collection(state: &AppState) -> &Collection<Self> {
        &state.roles
    }

    async fn validate(
        state: &AppState,
        input: &RoleInput,
        existing: Option<Id>,
    ) -> Result<(), AppError> {
        validate::all_filled([input.name.as_str()])?;

        if let Some(clash) = state.roles.find_one(|r| r.name == input.name).await {
            if existing != Some(clash.id) {
                return Err(AppError::BadRequest("Role already exists.".to_string()));
            }
        }
        Ok(())
    }

    fn build(input: RoleInput) -> Self {
        Role {
            id: Id::new(),
            name: input.name,
        }
    }

    fn apply(&mut self, input: RoleInput) {
        self.name = input.name;
    }
}

impl Fields for Role {
    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "name" => Some(FieldValue::Text(self.name.clone())),
            _ => None,
        }
    }
}

// Role mutations are admin-only.
async fn create(
    principal: Principal,
    state: State<Arc<AppState>>,
    payload: Result<Json<RoleInput>, JsonRejection>,
) -> Result<Response, AppError> {
    principal.require_admin()?;
    resource::create::<Role>(state, payload).await
}

async fn update(
    principal: Principal,
    state: State<Arc<AppState>>,
    path: Path<String>,
    payload: Result<Json<RoleInput>, JsonRejection>,
) -> Result<Response, AppError> {
    principal.require_admin()?;
    resource::update::<Role>(state, path, payload).await
}

async fn delete(
    principal: Principal,
    state: State<Arc<AppState>>,
    path: Path<String>,
) -> Result<Response, AppError> {
    principal.require_admin()?;
    resource::delete::<Role>(state, path).await
}

async fn list(
    state: State<Arc<AppState>>,
    query: Query<HashMap<String, String>>,
) -> Result<Response, AppError> {
    resource::list::<Role>(state, query).await
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/:id", get(resource::get_one::<Role>).put(update).delete(delete))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn duplicate_names_are_rejected_except_for_self() {
        let state = AppState::for_tests();
        let admin = Role::build(RoleInput {
            name: "admin".to_string(),
        });
        let admin = state.roles.insert(admin).await.unwrap();

        let clash = Role::validate(
            &state,
            &RoleInput {
                name: "admin".to_string(),
            },
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(clash, AppError::BadRequest(_)));

        // Updating the record to its own name is fine.
        Role::validate(
            &state,
            &RoleInput {
                name: "admin".to_string(),
            },
            Some(admin.id),
        )
        .await
        .unwrap();

        let blank = Role::validate(&state, &RoleInput { name: String::new() }, None)
            .await
            .unwrap_err();
        assert!(matches!(blank, AppError::BadRequest(_)));
    }
}
