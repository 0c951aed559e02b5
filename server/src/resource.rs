//! One CRUD implementation shared by every simple record type.
//!
//! A [`Resource`] supplies its collection, its declarative validation
//! (uniqueness and reference-integrity rules included) and how to build or
//! apply an input; the generic handlers below do the rest. The grouped
//! records (readings, deliveries) have their own reconciliation modules
//! instead.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use model::Id;

use crate::error::AppError;
use crate::query::{self, Fields, ListParams};
use crate::state::AppState;
use crate::store::{Collection, Document};

#[async_trait]
pub trait Resource: Document + Fields + Serialize {
    /// Display name used in response messages, e.g. "Fuel tank".
    const TITLE: &'static str;
    const TITLE_PLURAL: &'static str;
    /// Sort applied when the caller does not pick one.
    const DEFAULT_SORT: Option<&'static str> = None;

    type Input: DeserializeOwned + Send + Sync + 'static;

    fn collection(state: &AppState) -> &Collection<Self>;

    /// Checked eagerly, before any write. `existing` is the id being
    /// updated, so uniqueness rules can exempt the record itself.
    async fn validate(
        state: &AppState,
        input: &Self::Input,
        existing: Option<Id>,
    ) -> Result<(), AppError>;

    fn build(input: Self::Input) -> Self;

    fn apply(&mut self, input: Self::Input);

    /// Response shape; overridden by records that resolve references for
    /// display (user -> role, tank -> fuel type, ...).
    async fn render(&self, _state: &AppState) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

pub fn parse_id(raw: &str) -> Result<Id, AppError> {
    raw.parse()
        .map_err(|_| AppError::BadRequest("Invalid id.".to_string()))
}

pub fn read_payload<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError>
where
    T: DeserializeOwned,
{
    payload
        .map(|Json(input)| input)
        .map_err(|rejection| AppError::BadRequest(rejection.body_text()))
}

async fn find_existing<R: Resource>(state: &AppState, id: Id) -> Result<R, AppError> {
    R::collection(state)
        .find_by_id(id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("{} not found.", R::TITLE)))
}

pub async fn create<R: Resource>(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<R::Input>, JsonRejection>,
) -> Result<Response, AppError> {
    let input = read_payload(payload)?;
    R::validate(&state, &input, None).await?;

    let record = R::collection(&state).insert(R::build(input)).await?;
    let data = record.render(&state).await;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": format!("{} created successfully.", R::TITLE),
            "data": data,
        })),
    )
        .into_response())
}

pub async fn list<R: Resource>(
    State(state): State<Arc<AppState>>,
    Query(raw): Query<HashMap<String, String>>,
) -> Result<Response, AppError> {
    let mut params = ListParams::from_query(raw);
    if params.sort.is_none() {
        params.sort = R::DEFAULT_SORT.map(String::from);
    }

    let page = query::run(R::collection(&state), &params).await?;

    let mut data = Vec::with_capacity(page.rows.len());
    for row in &page.rows {
        data.push(row.render(&state).await);
    }

    Ok(Json(json!({
        "message": format!("{} retrieved successfully.", R::TITLE_PLURAL),
        "data": data,
        "count": page.count,
    }))
    .into_response())
}

pub async fn get_one<R: Resource>(
    State(state): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
) -> Result<Response, AppError> {
    let record = find_existing::<R>(&state, parse_id(&raw_id)?).await?;
    let data = record.render(&state).await;

    Ok(Json(json!({
        "message": format!("{} retrieved successfully.", R::TITLE),
        "data": data,
    }))
    .into_response())
}

pub async fn update<R: Resource>(
    State(state): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
    payload: Result<Json<R::Input>, JsonRejection>,
) -> Result<Response, AppError> {
    let id = parse_id(&raw_id)?;
    let input = read_payload(payload)?;

    find_existing::<R>(&state, id).await?;
    R::validate(&state, &input, Some(id)).await?;

    let updated = R::collection(&state)
        .update(id, |record| record.apply(input))
        .await?
        .ok_or_else(|| AppError::NotFound(format!("{} not found.", R::TITLE)))?;
    let data = updated.render(&state).await;

    Ok(Json(json!({
        "message": format!("{} updated successfully.", R::TITLE),
        "data": data,
    }))
    .into_response())
}

pub async fn delete<R: Resource>(
    State(state): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
) -> Result<Response, AppError> {
    let id = parse_id(&raw_id)?;
    find_existing::<R>(&state, id).await?;

    let removed = R::collection(&state)
        .remove(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("{} not found.", R::TITLE)))?;
    let data = removed.render(&state).await;

    Ok(Json(json!({
        "message": format!("{} deleted successfully.", R::TITLE),
        "data": data,
    }))
    .into_response())
}

/// Resolves a referenced record inside a rendered value, replacing the raw
/// id under `key` with the full record (or null when dangling).
pub fn populate<T>(view: &mut Value, key: &str, referenced: Option<T>)
where
    T: Serialize,
{
    if let Value::Object(map) = view {
        map.insert(
            key.to_string(),
            serde_json::to_value(referenced).unwrap_or(Value::Null),
        );
    }
}
