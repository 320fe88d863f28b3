//! Observation endpoint handlers.
//!
//! Each handler owns one unit of work for the whole request; nothing is
//! persisted unless the handler reaches `save`, so every early return
//! doubles as a rollback.

use crate::api::{ApiError, ApiResponse, OperationOutcome};
use crate::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use obsvault_core::fhir::ObservationResource;
use obsvault_core::mapper::{observation_to_resource, resource_to_observation};
use obsvault_core::model::TEST_LOGICAL_ID;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize, Default)]
pub struct WriteParams {
    /// Smoke-test flag: a create that has no id yet gets the sentinel id.
    #[serde(default)]
    pub test: bool,
}

pub async fn root() -> impl IntoResponse {
    let body = json!({
        "service": "ObsVault",
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    });
    (StatusCode::OK, Json(body))
}

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"status": "ok"})))
}

pub async fn read_observation(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    let mut uow = state.store.begin();
    let Some(observation) = uow.get_resource_by_id(id).await? else {
        return Err(ApiError::not_found(format!(
            "Observation with id {id} not found"
        )));
    };
    if observation.is_deleted {
        return Err(ApiError::gone(format!(
            "Observation with id {id} has been deleted"
        )));
    }
    let record = uow
        .get_latest_record(id)
        .await?
        .ok_or_else(|| ApiError::internal(format!("Observation {id} has no history record")))?;

    let mut external = observation_to_resource(&observation);
    uow.add_metadata(&observation, &mut external, &record);

    Ok(ApiResponse::ok(external)
        .with_version_etag(record.version_id)
        .with_last_modified(&record.last_modified)
        .into_response())
}

pub async fn create_observation(
    State(state): State<AppState>,
    Query(params): Query<WriteParams>,
    Json(body): Json<Value>,
) -> Result<Response, ApiError> {
    let resource = parse_resource(body)?;
    if resource.id.is_some() {
        return Err(ApiError::bad_request(
            "Observation to create must not carry a logical id; the server assigns one",
        ));
    }

    let mut observation = resource_to_observation(&resource)?;
    if params.test && observation.is_unassigned() {
        observation.observation_id = TEST_LOGICAL_ID;
    }

    let mut uow = state.store.begin();
    uow.add_resource(&mut observation).await?;
    let record = uow.add_create_record(&observation).await?;
    uow.save().await?;

    let mut external = observation_to_resource(&observation);
    uow.add_metadata(&observation, &mut external, &record);
    tracing::info!(id = observation.observation_id, "observation created");

    let location = format!(
        "{}/fhir/Observation/{}",
        state.base_url, observation.observation_id
    );
    Ok(ApiResponse::created(external)
        .with_location(&location)
        .with_version_etag(record.version_id)
        .with_last_modified(&record.last_modified)
        .into_response())
}

pub async fn update_observation(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(params): Query<WriteParams>,
    Json(body): Json<Value>,
) -> Result<Response, ApiError> {
    let resource = parse_resource(body)?;
    let body_id = resource
        .id
        .as_deref()
        .ok_or_else(|| ApiError::bad_request("Observation to update must carry a logical id"))?;
    let body_id: i64 = body_id
        .parse()
        .map_err(|_| ApiError::bad_request(format!("Logical id '{body_id}' is not numeric")))?;
    if body_id != id {
        return Err(ApiError::bad_request(format!(
            "Logical id mismatch: URL names {id}, payload names {body_id}"
        )));
    }

    let mut observation = resource_to_observation(&resource)?;
    let mut uow = state.store.begin();

    if uow.resource_exists(id).await? {
        let previous = uow
            .get_latest_record(id)
            .await?
            .ok_or_else(|| ApiError::internal(format!("Observation {id} has no history record")))?;
        let record = uow.add_update_record(&observation, &previous).await?;
        uow.update_resource(&mut observation).await?;
        uow.save().await?;

        let mut external = observation_to_resource(&observation);
        uow.add_metadata(&observation, &mut external, &record);
        tracing::info!(id, version = record.version_id, "observation updated");

        Ok(ApiResponse::ok(external)
            .with_version_etag(record.version_id)
            .with_last_modified(&record.last_modified)
            .into_response())
    } else {
        // Unknown id: the update becomes a create at the client's id.
        if params.test && observation.is_unassigned() {
            observation.observation_id = TEST_LOGICAL_ID;
        }
        uow.add_resource(&mut observation).await?;
        let record = uow.add_create_record(&observation).await?;
        uow.save().await?;

        let mut external = observation_to_resource(&observation);
        uow.add_metadata(&observation, &mut external, &record);
        tracing::info!(id = observation.observation_id, "observation created via update");

        let location = format!(
            "{}/fhir/Observation/{}",
            state.base_url, observation.observation_id
        );
        Ok(ApiResponse::created(external)
            .with_location(&location)
            .with_version_etag(record.version_id)
            .with_last_modified(&record.last_modified)
            .into_response())
    }
}

pub async fn delete_observation(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    let mut uow = state.store.begin();
    let Some(mut observation) = uow.get_resource_by_id(id).await? else {
        // Deleting what never existed is a success.
        return Ok(StatusCode::NO_CONTENT.into_response());
    };
    if observation.is_deleted {
        return Ok(
            ApiResponse::ok(OperationOutcome::information("Resource already deleted"))
                .into_response(),
        );
    }

    let previous = uow
        .get_latest_record(id)
        .await?
        .ok_or_else(|| ApiError::internal(format!("Observation {id} has no history record")))?;
    uow.delete_resource(&mut observation).await?;
    uow.add_delete_record(&observation, &previous).await?;
    uow.save().await?;
    tracing::info!(id, "observation deleted");

    Ok(StatusCode::NO_CONTENT.into_response())
}

fn parse_resource(body: Value) -> Result<ObservationResource, ApiError> {
    serde_json::from_value(body)
        .map_err(|e| ApiError::bad_request(format!("Malformed Observation payload: {e}")))
}
