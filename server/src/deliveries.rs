//! # Fuel deliveries
//!
//! Same reconciliation shape as the readings module: one delivery order
//! owns a set of per-tank volume/price lines, written parent-first with
//! best-effort compensation when a write fails mid-sequence. On top of the
//! shared rules, deliveries validate the order chronology (nothing happens
//! before the order date) and a status from the fixed enumeration.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::NaiveDate;
use futures::future::join_all;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, warn};

use model::{DeliveryStatus, FuelDelivery, FuelDeliveryVolume, FuelTank, Id};

use crate::error::AppError;
use crate::query::{self, ListParams};
use crate::resource::{parse_id, populate, read_payload};
use crate::state::AppState;
use crate::store::StoreError;
use crate::validate;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliverySubmission {
    pub date_ordered: NaiveDate,
    pub delivery_date: NaiveDate,
    pub payment_due_date: NaiveDate,
    #[serde(default)]
    pub date_delivered: Option<NaiveDate>,
    pub status: DeliveryStatus,
    #[serde(default)]
    pub credit: f64,
    #[serde(default)]
    pub volumes: Vec<DeliveryLine>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryLine {
    pub fuel_tank_id: Id,
    pub volume: f64,
    pub price: f64,
}

fn delivery_not_found() -> AppError {
    AppError::NotFound("Fuel delivery not found.".to_string())
}

async fn validate_submission(
    state: &AppState,
    submission: &DeliverySubmission,
    updating: Option<Id>,
) -> Result<(), AppError> {
    validate::not_after(
        "Date ordered cannot be after the delivery date.",
        submission.date_ordered,
        submission.delivery_date,
    )?;
    validate::not_after(
        "Date ordered cannot be after the payment due date.",
        submission.date_ordered,
        submission.payment_due_date,
    )?;
    if let Some(date_delivered) = submission.date_delivered {
        validate::not_after(
            "Date ordered cannot be after the date delivered.",
            submission.date_ordered,
            date_delivered,
        )?;
    }
    validate::numbers("Credit cannot be negative.", &[submission.credit])?;

    if submission.volumes.is_empty() {
        return Err(AppError::BadRequest(
            "You need to add a fuel tank.".to_string(),
        ));
    }

    // Checked before the per-line fan-out; see the readings module.
    let mut seen = HashSet::new();
    for line in &submission.volumes {
        if !seen.insert(line.fuel_tank_id) {
            return Err(AppError::BadRequest(
                "Each fuel tank can only be added once.".to_string(),
            ));
        }
    }

    let checks = submission
        .volumes
        .iter()
        .map(|line| validate_line(state, line, updating));
    for check in join_all(checks).await {
        check?;
    }
    Ok(())
}

async fn validate_line(
    state: &AppState,
    line: &DeliveryLine,
    updating: Option<Id>,
) -> Result<(), AppError> {
    validate::numbers(
        "Volume and price cannot be negative.",
        &[line.volume, line.price],
    )?;

    if state.fuel_tanks.find_by_id(line.fuel_tank_id).await.is_none() {
        return Err(AppError::BadRequest("Fuel tank not found.".to_string()));
    }

    if let Some(parent) = updating {
        let matches = state
            .delivery_volumes
            .find_one(|v| v.delivery == parent && v.fuel_tank == line.fuel_tank_id)
            .await;
        if matches.is_none() {
            return Err(AppError::BadRequest(
                "No existing volume for this fuel tank.".to_string(),
            ));
        }
    }
    Ok(())
}

pub async fn create_delivery(
    state: &AppState,
    submission: DeliverySubmission,
) -> Result<Value, AppError> {
    validate_submission(state, &submission, None).await?;

    let parent = state
        .deliveries
        .insert(FuelDelivery {
            id: Id::new(),
            date_ordered: submission.date_ordered,
            delivery_date: submission.delivery_date,
            payment_due_date: submission.payment_due_date,
            date_delivered: submission.date_delivered,
            status: submission.status,
            credit: submission.credit,
        })
        .await?;

    let inserts = submission.volumes.iter().map(|line| {
        state.delivery_volumes.insert(FuelDeliveryVolume {
            id: Id::new(),
            delivery: parent.id,
            fuel_tank: line.fuel_tank_id,
            volume: line.volume,
            price: line.price,
        })
    });

    let mut created = Vec::new();
    let mut failure: Option<StoreError> = None;
    for outcome in join_all(inserts).await {
        match outcome {
            Ok(volume) => created.push(volume),
            Err(err) => failure = failure.or(Some(err)),
        }
    }

    if let Some(err) = failure {
        roll_back_create(state, &parent, &created).await;
        error!("fuel delivery creation failed, submission rolled back: {err}");
        return Err(err.into());
    }

    Ok(render_delivery(state, &parent).await)
}

async fn roll_back_create(
    state: &AppState,
    parent: &FuelDelivery,
    created: &[FuelDeliveryVolume],
) {
    let deletes = created
        .iter()
        .map(|volume| state.delivery_volumes.remove(volume.id));
    for outcome in join_all(deletes).await {
        if let Err(err) = outcome {
            warn!("compensating volume delete failed: {err}");
        }
    }
    if let Err(err) = state.deliveries.remove(parent.id).await {
        warn!("compensating delivery delete failed: {err}");
    }
}

pub async fn update_delivery(
    state: &AppState,
    id: Id,
    submission: DeliverySubmission,
) -> Result<Value, AppError> {
    state
        .deliveries
        .find_by_id(id)
        .await
        .ok_or_else(delivery_not_found)?;
    validate_submission(state, &submission, Some(id)).await?;

    let updated = state
        .deliveries
        .update(id, |delivery| {
            delivery.date_ordered = submission.date_ordered;
            delivery.delivery_date = submission.delivery_date;
            delivery.payment_due_date = submission.payment_due_date;
            delivery.date_delivered = submission.date_delivered;
            delivery.status = submission.status;
            delivery.credit = submission.credit;
        })
        .await?
        .ok_or_else(delivery_not_found)?;

    let mut originals = Vec::with_capacity(submission.volumes.len());
    for line in &submission.volumes {
        let original = state
            .delivery_volumes
            .find_one(|v| v.delivery == id && v.fuel_tank == line.fuel_tank_id)
            .await
            .ok_or_else(|| {
                StoreError(format!(
                    "delivery volume for tank {} vanished mid-update",
                    line.fuel_tank_id
                ))
            })?;
        originals.push(original);
    }

    let updates = submission
        .volumes
        .iter()
        .zip(&originals)
        .map(|(line, original)| {
            let volume = line.volume;
            let price = line.price;
            state.delivery_volumes.update(original.id, move |v| {
                v.volume = volume;
                v.price = price;
            })
        });

    let mut failure: Option<StoreError> = None;
    for outcome in join_all(updates).await {
        match outcome {
            Ok(Some(_)) => {}
            Ok(None) => {
                failure = failure
                    .or(Some(StoreError("delivery volume vanished mid-update".to_string())));
            }
            Err(err) => failure = failure.or(Some(err)),
        }
    }

    if let Some(err) = failure {
        revert_volumes(state, &originals).await;
        error!("fuel delivery update failed, volumes reverted: {err}");
        return Err(err.into());
    }

    Ok(render_delivery(state, &updated).await)
}

async fn revert_volumes(state: &AppState, originals: &[FuelDeliveryVolume]) {
    let reverts = originals.iter().map(|original| {
        let volume = original.volume;
        let price = original.price;
        let fuel_tank = original.fuel_tank;
        state.delivery_volumes.update(original.id, move |v| {
            v.volume = volume;
            v.price = price;
            v.fuel_tank = fuel_tank;
        })
    });
    for outcome in join_all(reverts).await {
        if let Err(err) = outcome {
            warn!("compensating volume revert failed: {err}");
        }
    }
}

pub async fn delete_delivery(state: &AppState, id: Id) -> Result<(), AppError> {
    let parent = state
        .deliveries
        .find_by_id(id)
        .await
        .ok_or_else(delivery_not_found)?;
    let children = state.delivery_volumes.find(|v| v.delivery == id).await;

    let outcome: Result<(), StoreError> = async {
        state
            .delivery_volumes
            .delete_many(|v| v.delivery == id)
            .await?;
        state.deliveries.remove(id).await?;
        Ok(())
    }
    .await;

    if let Err(err) = outcome {
        restore_delivery(state, &parent, &children).await;
        error!("delivery deletion failed, snapshot restored: {err}");
        return Err(err.into());
    }
    Ok(())
}

async fn restore_delivery(
    state: &AppState,
    parent: &FuelDelivery,
    children: &[FuelDeliveryVolume],
) {
    if state.deliveries.find_by_id(parent.id).await.is_none() {
        if let Err(err) = state.deliveries.insert(parent.clone()).await {
            warn!("restoring deleted delivery failed: {err}");
        }
    }
    for child in children {
        if state.delivery_volumes.find_by_id(child.id).await.is_some() {
            continue;
        }
        if let Err(err) = state.delivery_volumes.insert(child.clone()).await {
            warn!("restoring deleted delivery volume failed: {err}");
        }
    }
}

async fn render_delivery(state: &AppState, parent: &FuelDelivery) -> Value {
    let volumes = state
        .delivery_volumes
        .find(|v| v.delivery == parent.id)
        .await;
    let total_price: f64 = volumes.iter().map(|v| v.price).sum();

    let mut views = Vec::with_capacity(volumes.len());
    for volume in &volumes {
        let mut view = serde_json::to_value(volume).unwrap_or(Value::Null);
        let tank = state.fuel_tanks.find_by_id(volume.fuel_tank).await;
        populate::<FuelTank>(&mut view, "fuelTank", tank);
        views.push(view);
    }

    let mut view = serde_json::to_value(parent).unwrap_or(Value::Null);
    if let Value::Object(map) = &mut view {
        map.insert("volumes".to_string(), Value::Array(views));
        map.insert("totalPrice".to_string(), json!(total_price));
    }
    view
}

async fn create(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<DeliverySubmission>, JsonRejection>,
) -> Result<Response, AppError> {
    let submission = read_payload(payload)?;
    let data = create_delivery(&state, submission).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Fuel delivery created successfully.",
            "data": data,
        })),
    )
        .into_response())
}

async fn list(
    State(state): State<Arc<AppState>>,
    Query(raw): Query<HashMap<String, String>>,
) -> Result<Response, AppError> {
    let mut raw = raw;
    let (start, end) = query::date_range(&mut raw)?;
    let params = ListParams::from_query(raw);

    let mut parents = state
        .deliveries
        .find(|d| query::within_range(d.delivery_date, start, end))
        .await;
    let count = parents.len();
    parents.sort_by(|a, b| b.delivery_date.cmp(&a.delivery_date));
    let parents: Vec<_> = parents
        .into_iter()
        .skip(params.skip())
        .take(params.page_size)
        .collect();

    let mut data = Vec::with_capacity(parents.len());
    for parent in &parents {
        data.push(render_delivery(&state, parent).await);
    }

    Ok(Json(json!({
        "message": "Fuel deliveries fetched successfully.",
        "data": data,
        "count": count,
    }))
    .into_response())
}

async fn get_one(
    State(state): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
) -> Result<Response, AppError> {
    let id = parse_id(&raw_id)?;
    let parent = state
        .deliveries
        .find_by_id(id)
        .await
        .ok_or_else(delivery_not_found)?;

    Ok(Json(json!({
        "message": "Fuel delivery fetched successfully.",
        "data": render_delivery(&state, &parent).await,
    }))
    .into_response())
}

async fn update(
    State(state): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
    payload: Result<Json<DeliverySubmission>, JsonRejection>,
) -> Result<Response, AppError> {
    let id = parse_id(&raw_id)?;
    let submission = read_payload(payload)?;
    let data = update_delivery(&state, id, submission).await?;

    Ok(Json(json!({
        "message": "Fuel delivery updated successfully.",
        "data": data,
    }))
    .into_response())
}

async fn delete(
    State(state): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
) -> Result<Response, AppError> {
    let id = parse_id(&raw_id)?;
    delete_delivery(&state, id).await?;

    Ok(Json(json!({
        "message": "Fuel delivery deleted successfully.",
    }))
    .into_response())
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/:id", get(get_one).put(update).delete(delete))
}
