use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    response::{IntoResponse, Response},
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use model::{Id, Role, User};

use crate::auth::{hash_password, new_salt, Principal};
use crate::error::AppError;
use crate::query::{FieldValue, Fields};
use crate::resource::{self, parse_id, read_payload, Resource};
use crate::state::AppState;
use crate::store::Collection;
use crate::validate;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInput {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub username: String,
    /// Required on creation, ignored on update (passwords change through
    /// the dedicated password endpoint).
    #[serde(default)]
    pub password: Option<String>,
    pub role_id: Id,
}

#[async_trait]
impl Resource for User {
    const TITLE: &'static str = "User";
    const TITLE_PLURAL: &'static str = "Users";
    const DEFAULT_SORT: Option<&'static str> = Some("username");

    type Input = UserInput;

    fn collection(state: &AppState) -> &Collection<Self> {
        &state.users
    }

    async fn validate(
        state: &AppState,
        input: &UserInput,
        existing: Option<Id>,
    ) -> Result<(), AppError> {
        validate::all_filled([
            input.first_name.as_str(),
            input.last_name.as_str(),
            input.username.as_str(),
        ])?;

        if existing.is_none() {
            let password = input.password.as_deref().unwrap_or_default();
            if password.trim().is_empty() {
                return Err(AppError::BadRequest(
                    "Please fill in all required fields.".to_string(),
                ));
            }
        }

        if let Some(clash) = state.users.find_one(|u| u.username == input.username).await {
            if existing != Some(clash.id) {
                return Err(AppError::BadRequest("Username already exists.".to_string()));
            }
        }

        if state.roles.find_by_id(input.role_id).await.is_none() {
            return Err(AppError::NotFound("Role not found.".to_string()));
        }
        Ok(())
    }

    fn build(input: UserInput) -> Self {
        let salt = new_salt();
        let password_hash = hash_password(input.password.as_deref().unwrap_or_default(), &salt);
        User {
            id: Id::new(),
            first_name: input.first_name,
            last_name: input.last_name,
            username: input.username,
            password_hash,
            salt,
            role: input.role_id,
        }
    }

    fn apply(&mut self, input: UserInput) {
        self.first_name = input.first_name;
        self.last_name = input.last_name;
        self.username = input.username;
        self.role = input.role_id;
    }

    async fn render(&self, state: &AppState) -> Value {
        let mut view = serde_json::to_value(self).unwrap_or(Value::Null);
        let role = state.roles.find_by_id(self.role).await;
        resource::populate::<Role>(&mut view, "role", role);
        view
    }
}

impl Fields for User {
    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "firstName" => Some(FieldValue::Text(self.first_name.clone())),
            "lastName" => Some(FieldValue::Text(self.last_name.clone())),
            "username" => Some(FieldValue::Text(self.username.clone())),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PasswordInput {
    #[serde(default)]
    password: String,
}

async fn update_password(
    principal: Principal,
    State(state): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
    payload: Result<Json<PasswordInput>, JsonRejection>,
) -> Result<Response, AppError> {
    principal.require_admin()?;

    let id = parse_id(&raw_id)?;
    let input = read_payload(payload)?;

    if input.password.trim().is_empty() {
        return Err(AppError::BadRequest(
            "Password cannot be blank.".to_string(),
        ));
    }

    let salt = new_salt();
    let password_hash = hash_password(&input.password, &salt);
    let updated = state
        .users
        .update(id, |user| {
            user.salt = salt;
            user.password_hash = password_hash;
        })
        .await?
        .ok_or_else(|| AppError::NotFound("User not found.".to_string()))?;

    let data = updated.render(&state).await;
    Ok(Json(json!({
        "message": "Password updated successfully.",
        "data": data,
    }))
    .into_response())
}

// Every user operation is admin-only.
async fn create(
    principal: Principal,
    state: State<Arc<AppState>>,
    payload: Result<Json<UserInput>, JsonRejection>,
) -> Result<Response, AppError> {
    principal.require_admin()?;
    resource::create::<User>(state, payload).await
}

async fn list(
    principal: Principal,
    state: State<Arc<AppState>>,
    query: Query<HashMap<String, String>>,
) -> Result<Response, AppError> {
    principal.require_admin()?;
    resource::list::<User>(state, query).await
}

async fn get_one(
    principal: Principal,
    state: State<Arc<AppState>>,
    path: Path<String>,
) -> Result<Response, AppError> {
    principal.require_admin()?;
    resource::get_one::<User>(state, path).await
}

async fn update(
    principal: Principal,
    state: State<Arc<AppState>>,
    path: Path<String>,
    payload: Result<Json<UserInput>, JsonRejection>,
) -> Result<Response, AppError> {
    principal.require_admin()?;
    resource::update::<User>(state, path, payload).await
}

async fn delete(
    principal: Principal,
    state: State<Arc<AppState>>,
    path: Path<String>,
) -> Result<Response, AppError> {
    principal.require_admin()?;
    resource::delete::<User>(state, path).await
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/:id", get(get_one).put(update).delete(delete))
        .route("/password/:id", put(update_password))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn staff_role(state: &AppState) -> Role {
        state
            .roles
            .insert(Role {
                id: Id::new(),
                name: "staff".to_string(),
            })
            .await
            .unwrap()
    }

    fn input(role: Id, username: &str, password: Option<&str>) -> UserInput {
        UserInput {
            first_name: "Pat".to_string(),
            last_name: "Doe".to_string(),
            username: username.to_string(),
            password: password.map(String::from),
            role_id: role,
        }
    }

    #[tokio::test]
    async fn creation_requires_a_password_and_a_real_role() {
        let state = AppState::for_tests();
        let role = staff_role(&state).await;

        let no_password = User::validate(&state, &input(role.id, "pat", None), None)
            .await
            .unwrap_err();
        assert!(matches!(no_password, AppError::BadRequest(_)));

        let ghost_role = User::validate(&state, &input(Id::new(), "pat", Some("pw")), None)
            .await
            .unwrap_err();
        assert!(matches!(ghost_role, AppError::NotFound(_)));

        User::validate(&state, &input(role.id, "pat", Some("pw")), None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn usernames_stay_unique() {
        let state = AppState::for_tests();
        let role = staff_role(&state).await;
        let pat = state
            .users
            .insert(User::build(input(role.id, "pat", Some("pw"))))
            .await
            .unwrap();

        let clash = User::validate(&state, &input(role.id, "pat", Some("pw")), None)
            .await
            .unwrap_err();
        assert!(matches!(clash, AppError::BadRequest(_)));

        // The record itself may keep its username on update; no password
        // needed there.
        User::validate(&state, &input(role.id, "pat", None), Some(pat.id))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn rendering_embeds_the_role_and_hides_secrets() {
        let state = AppState::for_tests();
        let role = staff_role(&state).await;
        let user = User::build(input(role.id, "pat", Some("pw")));

        let view = user.render(&state).await;
        assert_eq!(view["role"]["name"], "staff");
        assert_eq!(view["username"], "pat");
        assert!(view.get("passwordHash").is_none());
        assert!(view.get("salt").is_none());
    }
}
