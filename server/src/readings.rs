//! # Fuel tank readings
//!
//! Batch reconciliation for dip readings: one submission carries a date and
//! one volume per tank, and the whole set is persisted as a unit — parent
//! grouping record first, then the child volumes.
//!
//! The store has no multi-document transaction, so a failure mid-sequence
//! triggers best-effort compensation: creates are undone by deleting what
//! was already written, updates revert the children touched so far, and a
//! failed delete reinserts the pre-deletion snapshot. Compensation is
//! deliberately best-effort, not atomic: a crash mid-rollback can still
//! leave residue. Partial success is never reported as success.

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

use model::{FuelTank, FuelTankReading, FuelTankReadingVolume, Id};

use crate::error::AppError;
use crate::query::{self, ListParams};
use crate::resource::{parse_id, populate, read_payload};
use crate::state::AppState;
use crate::store::StoreError;
use crate::validate;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingSubmission {
    pub date: NaiveDate,
    #[serde(default)]
    pub fuel_tank_readings: Vec<ReadingLine>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingLine {
    pub fuel_tank_id: Id,
    pub volume: f64,
}

fn reading_not_found() -> AppError {
    AppError::NotFound("Fuel tank reading not found.".to_string())
}

/// Whole-submission checks run before any per-line work so two concurrent
/// lines cannot race each other into a duplicate, then the per-line checks
/// fan out together. Nothing is written until everything passes.
async fn validate_submission(
    state: &AppState,
    submission: &ReadingSubmission,
    updating: Option<Id>,
) -> Result<(), AppError> {
    if submission.fuel_tank_readings.is_empty() {
        return Err(AppError::BadRequest(
            "You need to add a fuel tank.".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for line in &submission.fuel_tank_readings {
        if !seen.insert(line.fuel_tank_id) {
            return Err(AppError::BadRequest(
                "Each fuel tank can only be added once.".to_string(),
            ));
        }
    }

    // One reading group per calendar date; a resubmission for the same date
    // is a duplicate, not an append.
    let date = submission.date;
    if state
        .readings
        .find_one(|r| r.date == date && Some(r.id) != updating)
        .await
        .is_some()
    {
        return Err(AppError::BadRequest(
            "A fuel tank reading for this date already exists.".to_string(),
        ));
    }

    let checks = submission
        .fuel_tank_readings
        .iter()
        .map(|line| validate_line(state, line, updating));
    for check in join_all(checks).await {
        check?;
    }
    Ok(())
}

async fn validate_line(
    state: &AppState,
    line: &ReadingLine,
    updating: Option<Id>,
) -> Result<(), AppError> {
    validate::numbers("Fuel tank reading cannot be negative.", &[line.volume])?;

    if state.fuel_tanks.find_by_id(line.fuel_tank_id).await.is_none() {
        return Err(AppError::BadRequest("Fuel tank not found.".to_string()));
    }

    // Updates rewrite existing children in place, so every submitted line
    // must match one.
    if let Some(parent) = updating {
        let matches = state
            .reading_volumes
            .find_one(|v| v.reading == parent && v.fuel_tank == line.fuel_tank_id)
            .await;
        if matches.is_none() {
            return Err(AppError::BadRequest(
                "No existing reading for this fuel tank.".to_string(),
            ));
        }
    }
    Ok(())
}

pub async fn create_reading(
    state: &AppState,
    submission: ReadingSubmission,
) -> Result<Value, AppError> {
    validate_submission(state, &submission, None).await?;

    let parent = state
        .readings
        .insert(FuelTankReading {
            id: Id::new(),
            date: submission.date,
        })
        .await?;

    let inserts = submission.fuel_tank_readings.iter().map(|line| {
        state.reading_volumes.insert(FuelTankReadingVolume {
            id: Id::new(),
            reading: parent.id,
            fuel_tank: line.fuel_tank_id,
            volume: line.volume,
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
        error!("batch reading creation failed, submission rolled back: {err}");
        return Err(err.into());
    }

    Ok(render_reading(state, &parent).await)
}

/// Children first, parent last, so a concurrent reader never sees orphaned
/// volumes without their group.
async fn roll_back_create(
    state: &AppState,
    parent: &FuelTankReading,
    created: &[FuelTankReadingVolume],
) {
    let deletes = created
        .iter()
        .map(|volume| state.reading_volumes.remove(volume.id));
    for outcome in join_all(deletes).await {
        if let Err(err) = outcome {
            warn!("compensating volume delete failed: {err}");
        }
    }
    if let Err(err) = state.readings.remove(parent.id).await {
        warn!("compensating reading delete failed: {err}");
    }
}

pub async fn update_reading(
    state: &AppState,
    id: Id,
    submission: ReadingSubmission,
) -> Result<Value, AppError> {
    state
        .readings
        .find_by_id(id)
        .await
        .ok_or_else(reading_not_found)?;
    validate_submission(state, &submission, Some(id)).await?;

    let date = submission.date;
    let updated = state
        .readings
        .update(id, |reading| reading.date = date)
        .await?
        .ok_or_else(reading_not_found)?;

    // Snapshot the children before touching them; the snapshot is what a
    // mid-sequence failure reverts to.
    let mut originals = Vec::with_capacity(submission.fuel_tank_readings.len());
    for line in &submission.fuel_tank_readings {
        let original = state
            .reading_volumes
            .find_one(|v| v.reading == id && v.fuel_tank == line.fuel_tank_id)
            .await
            .ok_or_else(|| {
                StoreError(format!(
                    "reading volume for tank {} vanished mid-update",
                    line.fuel_tank_id
                ))
            })?;
        originals.push(original);
    }

    let updates = submission
        .fuel_tank_readings
        .iter()
        .zip(&originals)
        .map(|(line, original)| {
            let volume = line.volume;
            state
                .reading_volumes
                .update(original.id, move |v| v.volume = volume)
        });

    let mut failure: Option<StoreError> = None;
    for outcome in join_all(updates).await {
        match outcome {
            Ok(Some(_)) => {}
            Ok(None) => {
                failure =
                    failure.or(Some(StoreError("reading volume vanished mid-update".to_string())));
            }
            Err(err) => failure = failure.or(Some(err)),
        }
    }

    if let Some(err) = failure {
        revert_volumes(state, &originals).await;
        error!("batch reading update failed, volumes reverted: {err}");
        return Err(err.into());
    }

    Ok(render_reading(state, &updated).await)
}

async fn revert_volumes(state: &AppState, originals: &[FuelTankReadingVolume]) {
    let reverts = originals.iter().map(|original| {
        let volume = original.volume;
        let fuel_tank = original.fuel_tank;
        state.reading_volumes.update(original.id, move |v| {
            v.volume = volume;
            v.fuel_tank = fuel_tank;
        })
    });
    for outcome in join_all(reverts).await {
        if let Err(err) = outcome {
            warn!("compensating volume revert failed: {err}");
        }
    }
}

pub async fn delete_reading(state: &AppState, id: Id) -> Result<(), AppError> {
    let parent = state
        .readings
        .find_by_id(id)
        .await
        .ok_or_else(reading_not_found)?;
    let children = state.reading_volumes.find(|v| v.reading == id).await;

    let outcome: Result<(), StoreError> = async {
        state.reading_volumes.delete_many(|v| v.reading == id).await?;
        state.readings.remove(id).await?;
        Ok(())
    }
    .await;

    if let Err(err) = outcome {
        restore_reading(state, &parent, &children).await;
        error!("reading deletion failed, snapshot restored: {err}");
        return Err(err.into());
    }
    Ok(())
}

/// Parent back first so restored children never dangle.
async fn restore_reading(
    state: &AppState,
    parent: &FuelTankReading,
    children: &[FuelTankReadingVolume],
) {
    if state.readings.find_by_id(parent.id).await.is_none() {
        if let Err(err) = state.readings.insert(parent.clone()).await {
            warn!("restoring deleted reading failed: {err}");
        }
    }
    for child in children {
        if state.reading_volumes.find_by_id(child.id).await.is_some() {
            continue;
        }
        if let Err(err) = state.reading_volumes.insert(child.clone()).await {
            warn!("restoring deleted reading volume failed: {err}");
        }
    }
}

async fn render_reading(state: &AppState, parent: &FuelTankReading) -> Value {
    let volumes = state.reading_volumes.find(|v| v.reading == parent.id).await;

    let mut views = Vec::with_capacity(volumes.len());
    for volume in &volumes {
        let mut view = serde_json::to_value(volume).unwrap_or(Value::Null);
        let tank = state.fuel_tanks.find_by_id(volume.fuel_tank).await;
        populate::<FuelTank>(&mut view, "fuelTank", tank);
        views.push(view);
    }

    json!({ "_id": parent.id, "date": parent.date, "volumes": views })
}

async fn create(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ReadingSubmission>, JsonRejection>,
) -> Result<Response, AppError> {
    let submission = read_payload(payload)?;
    let data = create_reading(&state, submission).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Fuel tank reading created successfully.",
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
        .readings
        .find(|r| query::within_range(r.date, start, end))
        .await;
    let count = parents.len();
    parents.sort_by(|a, b| b.date.cmp(&a.date));
    let parents: Vec<_> = parents
        .into_iter()
        .skip(params.skip())
        .take(params.page_size)
        .collect();

    let mut data = Vec::with_capacity(parents.len());
    for parent in &parents {
        data.push(render_reading(&state, parent).await);
    }

    Ok(Json(json!({
        "message": "Fuel tank readings retrieved successfully.",
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
        .readings
        .find_by_id(id)
        .await
        .ok_or_else(reading_not_found)?;

    Ok(Json(json!({
        "message": "Fuel tank reading retrieved successfully.",
        "data": render_reading(&state, &parent).await,
    }))
    .into_response())
}

async fn update(
    State(state): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
    payload: Result<Json<ReadingSubmission>, JsonRejection>,
) -> Result<Response, AppError> {
    let id = parse_id(&raw_id)?;
    let submission = read_payload(payload)?;
    let data = update_reading(&state, id, submission).await?;

    Ok(Json(json!({
        "message": "Fuel tank reading updated successfully.",
        "data": data,
    }))
    .into_response())
}

async fn delete(
    State(state): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
) -> Result<Response, AppError> {
    let id = parse_id(&raw_id)?;
    delete_reading(&state, id).await?;

    Ok(Json(json!({
        "message": "Fuel tank reading and associated volumes deleted successfully.",
    }))
    .into_response())
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/:id", get(get_one).put(update).delete(delete))
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::Fuel;

    async fn tank(state: &AppState) -> FuelTank {
        let fuel = state
            .fuels
            .insert(Fuel {
                id: Id::new(),
                name: "Diesel".to_string(),
            })
            .await
            .unwrap();
        state
            .fuel_tanks
            .insert(FuelTank {
                id: Id::new(),
                fuel_type: fuel.id,
                capacity: 25000.0,
                deadstock: 1000.0,
                acceptable_variance: 200.0,
            })
            .await
            .unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn submission(date: NaiveDate, lines: &[(Id, f64)]) -> ReadingSubmission {
        ReadingSubmission {
            date,
            fuel_tank_readings: lines
                .iter()
                .map(|(tank, volume)| ReadingLine {
                    fuel_tank_id: *tank,
                    volume: *volume,
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn batch_create_persists_one_group_with_exact_children() {
        let state = AppState::for_tests();
        let tank_a = tank(&state).await;
        let tank_b = tank(&state).await;
        let day = date(2024, 6, 10);

        let data = create_reading(
            &state,
            submission(day, &[(tank_a.id, 120.0), (tank_b.id, 80.0)]),
        )
        .await
        .unwrap();

        assert_eq!(state.readings.count(|_| true).await, 1);
        assert_eq!(state.reading_volumes.count(|_| true).await, 2);
        assert_eq!(data["date"], "2024-06-10");
        assert_eq!(data["volumes"].as_array().unwrap().len(), 2);

        let for_a = state
            .reading_volumes
            .find_one(|v| v.fuel_tank == tank_a.id)
            .await
            .unwrap();
        assert_eq!(for_a.volume, 120.0);

        // Same date again is a duplicate, even for a single tank.
        let err = create_reading(&state, submission(day, &[(tank_a.id, 120.0)]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        assert_eq!(state.readings.count(|_| true).await, 1);
    }

    #[tokio::test]
    async fn unknown_tank_fails_the_whole_submission_with_no_residue() {
        let state = AppState::for_tests();
        let tank_a = tank(&state).await;

        let err = create_reading(
            &state,
            submission(date(2024, 6, 10), &[(tank_a.id, 50.0), (Id::new(), 30.0)]),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        assert_eq!(state.readings.count(|_| true).await, 0);
        assert_eq!(state.reading_volumes.count(|_| true).await, 0);
    }

    #[tokio::test]
    async fn duplicate_tank_within_a_submission_is_rejected() {
        let state = AppState::for_tests();
        let tank_a = tank(&state).await;

        let err = create_reading(
            &state,
            submission(date(2024, 6, 10), &[(tank_a.id, 50.0), (tank_a.id, 30.0)]),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        assert_eq!(state.readings.count(|_| true).await, 0);
    }

    #[tokio::test]
    async fn negative_volume_is_rejected_before_any_write() {
        let state = AppState::for_tests();
        let tank_a = tank(&state).await;

        let err = create_reading(&state, submission(date(2024, 6, 10), &[(tank_a.id, -1.0)]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        assert_eq!(state.readings.count(|_| true).await, 0);
    }

    #[tokio::test]
    async fn child_write_failure_rolls_the_parent_back() {
        let state = AppState::for_tests();
        let tank_a = tank(&state).await;
        let tank_b = tank(&state).await;

        // First child lands, second one hits the injected fault.
        state.reading_volumes.fail_insert_after(1);

        let err = create_reading(
            &state,
            submission(date(2024, 6, 10), &[(tank_a.id, 50.0), (tank_b.id, 30.0)]),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Storage(_)));

        assert_eq!(state.readings.count(|_| true).await, 0);
        assert_eq!(state.reading_volumes.count(|_| true).await, 0);
    }

    #[tokio::test]
    async fn update_with_identical_values_changes_nothing() {
        let state = AppState::for_tests();
        let tank_a = tank(&state).await;
        let tank_b = tank(&state).await;
        let day = date(2024, 6, 10);

        create_reading(
            &state,
            submission(day, &[(tank_a.id, 120.0), (tank_b.id, 80.0)]),
        )
        .await
        .unwrap();

        let parent = state.readings.find_one(|_| true).await.unwrap();
        let mut before = state.reading_volumes.find(|_| true).await;
        before.sort_by_key(|v| v.id);

        update_reading(
            &state,
            parent.id,
            submission(day, &[(tank_a.id, 120.0), (tank_b.id, 80.0)]),
        )
        .await
        .unwrap();

        let mut after = state.reading_volumes.find(|_| true).await;
        after.sort_by_key(|v| v.id);

        assert_eq!(before.len(), after.len());
        for (b, a) in before.iter().zip(&after) {
            assert_eq!(b.id, a.id);
            assert_eq!(b.fuel_tank, a.fuel_tank);
            assert_eq!(b.volume, a.volume);
        }
    }

    #[tokio::test]
    async fn update_rewrites_children_in_place() {
        let state = AppState::for_tests();
        let tank_a = tank(&state).await;
        let day = date(2024, 6, 10);

        create_reading(&state, submission(day, &[(tank_a.id, 120.0)]))
            .await
            .unwrap();
        let parent = state.readings.find_one(|_| true).await.unwrap();
        let child_before = state.reading_volumes.find_one(|_| true).await.unwrap();

        update_reading(&state, parent.id, submission(day, &[(tank_a.id, 95.0)]))
            .await
            .unwrap();

        let child_after = state.reading_volumes.find_one(|_| true).await.unwrap();
        assert_eq!(child_before.id, child_after.id);
        assert_eq!(child_after.volume, 95.0);
    }

    #[tokio::test]
    async fn failed_update_reverts_already_updated_children() {
        let state = AppState::for_tests();
        let tank_a = tank(&state).await;
        let tank_b = tank(&state).await;
        let day = date(2024, 6, 10);

        create_reading(
            &state,
            submission(day, &[(tank_a.id, 120.0), (tank_b.id, 80.0)]),
        )
        .await
        .unwrap();
        let parent = state.readings.find_one(|_| true).await.unwrap();

        // First child update succeeds, second one faults.
        state.reading_volumes.fail_update_after(1);

        let err = update_reading(
            &state,
            parent.id,
            submission(day, &[(tank_a.id, 1.0), (tank_b.id, 2.0)]),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Storage(_)));

        let mut volumes: Vec<f64> = state
            .reading_volumes
            .find(|_| true)
            .await
            .iter()
            .map(|v| v.volume)
            .collect();
        volumes.sort_by(f64::total_cmp);
        assert_eq!(volumes, [80.0, 120.0]);
    }

    #[tokio::test]
    async fn updating_a_missing_group_is_not_found() {
        let state = AppState::for_tests();
        let tank_a = tank(&state).await;

        let err = update_reading(
            &state,
            Id::new(),
            submission(date(2024, 6, 10), &[(tank_a.id, 10.0)]),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_removes_the_group_and_its_children() {
        let state = AppState::for_tests();
        let tank_a = tank(&state).await;

        create_reading(&state, submission(date(2024, 6, 10), &[(tank_a.id, 50.0)]))
            .await
            .unwrap();
        let parent = state.readings.find_one(|_| true).await.unwrap();

        delete_reading(&state, parent.id).await.unwrap();
        assert_eq!(state.readings.count(|_| true).await, 0);
        assert_eq!(state.reading_volumes.count(|_| true).await, 0);
    }

    #[tokio::test]
    async fn failed_delete_restores_the_snapshot() {
        let state = AppState::for_tests();
        let tank_a = tank(&state).await;

        create_reading(&state, submission(date(2024, 6, 10), &[(tank_a.id, 50.0)]))
            .await
            .unwrap();
        let parent = state.readings.find_one(|_| true).await.unwrap();

        // Children are removed, then the parent delete faults.
        state.readings.fail_remove_after(0);

        let err = delete_reading(&state, parent.id).await.unwrap_err();
        assert!(matches!(err, AppError::Storage(_)));

        assert!(state.readings.find_by_id(parent.id).await.is_some());
        let restored = state.reading_volumes.find_one(|_| true).await.unwrap();
        assert_eq!(restored.fuel_tank, tank_a.id);
        assert_eq!(restored.volume, 50.0);
    }
}
