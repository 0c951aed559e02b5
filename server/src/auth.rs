//! # Sessions
//!
//! Explicit session state instead of an ambient auth provider: logging in
//! mints an opaque token mapped to a user id, every protected request
//! resolves that token to a [`Principal`], and logging out drops the token.
//!
//! Passwords are stored as salted SHA-256 digests with a per-user salt.
//! Tokens are random and carry no claims; a token is valid exactly as long
//! as its map entry exists.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::{rejection::JsonRejection, FromRequestParts, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use uuid::Uuid;

use model::Id;

use crate::error::AppError;
use crate::resource::read_payload;
use crate::state::AppState;

/// Token -> user id map behind the bearer header.
pub struct Sessions {
    tokens: RwLock<HashMap<String, Id>>,
}

impl Sessions {
    pub fn new() -> Self {
        Self {
            tokens: RwLock::new(HashMap::new()),
        }
    }

    pub async fn open(&self, user: Id) -> String {
        let token = Uuid::new_v4().simple().to_string();
        self.tokens.write().await.insert(token.clone(), user);
        token
    }

    pub async fn resolve(&self, token: &str) -> Option<Id> {
        self.tokens.read().await.get(token).copied()
    }

    pub async fn close(&self, token: &str) -> bool {
        self.tokens.write().await.remove(token).is_some()
    }
}

impl Default for Sessions {
    fn default() -> Self {
        Self::new()
    }
}

/// The authenticated caller, resolved once per request and handed to
/// handlers explicitly.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: Id,
    pub username: String,
    pub role: String,
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "You are not authorized to access this resource.".to_string(),
            ))
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .ok_or_else(missing_token)
    }
}

pub fn hash_password(password: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    let digest = hasher.finalize();

    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

pub fn new_salt() -> String {
    Uuid::new_v4().simple().to_string()
}

fn missing_token() -> AppError {
    AppError::Unauthorized("Please provide a token in the authorization header.".to_string())
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .filter(|token| !token.is_empty())
        .ok_or_else(missing_token)
}

/// Resolves the bearer token to a [`Principal`] and stashes it in the
/// request extensions for handlers to extract.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(request.headers())?;
    let user_id = state
        .sessions
        .resolve(token)
        .await
        .ok_or_else(|| AppError::Unauthorized("Session expired or not found.".to_string()))?;
    let user = state
        .users
        .find_by_id(user_id)
        .await
        .ok_or_else(|| AppError::Unauthorized("User not found.".to_string()))?;
    let role = state
        .roles
        .find_by_id(user.role)
        .await
        .map(|role| role.name)
        .unwrap_or_default();

    request.extensions_mut().insert(Principal {
        user_id,
        username: user.username,
        role,
    });

    Ok(next.run(request).await)
}

#[derive(Deserialize)]
pub struct LoginPayload {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

async fn login_inner(state: &AppState, payload: LoginPayload) -> Result<Value, AppError> {
    if payload.username.is_empty() || payload.password.is_empty() {
        return Err(AppError::BadRequest(
            "Please fill in all the fields.".to_string(),
        ));
    }

    let user = state
        .users
        .find_one(|u| u.username == payload.username)
        .await
        .ok_or_else(|| {
            AppError::BadRequest("User with this username does not exist.".to_string())
        })?;

    if hash_password(&payload.password, &user.salt) != user.password_hash {
        return Err(AppError::BadRequest("Incorrect password.".to_string()));
    }

    let token = state.sessions.open(user.id).await;
    let role = state.roles.find_by_id(user.role).await;

    let mut view = serde_json::to_value(&user).unwrap_or(Value::Null);
    if let Value::Object(map) = &mut view {
        map.insert(
            "role".to_string(),
            serde_json::to_value(role).unwrap_or(Value::Null),
        );
    }

    Ok(json!({ "token": token, "user": view }))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LoginPayload>, JsonRejection>,
) -> Result<Response, AppError> {
    let payload = read_payload(payload)?;
    let data = login_inner(&state, payload).await?;
    Ok((
        StatusCode::OK,
        Json(json!({ "message": "Logged in successfully.", "data": data })),
    )
        .into_response())
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let token = bearer_token(&headers)?;
    state.sessions.close(token).await;
    Ok(Json(json!({ "message": "Logged out successfully." })).into_response())
}
