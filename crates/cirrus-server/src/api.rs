use crate::logger::Logger;
use crate::supervisor::Supervisor;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use cirrus_core::{
	LoggingSnapshot, Observation, ObservationQuery, ProcessSnapshot, SensorReading, Station,
};
use cirrus_storage::{Storage, StorageError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

#[derive(Clone)]
pub struct AppState {
	pub store: Arc<dyn Storage>,
	pub supervisor: Arc<Supervisor>,
	pub logger: Arc<Logger>,
}

pub fn router(store: Arc<dyn Storage>, supervisor: Arc<Supervisor>, logger: Arc<Logger>) -> Router {
	let state = AppState {
		store,
		supervisor,
		logger,
	};

	Router::new()
		.route("/api/stations", get(list_stations).post(add_station))
		.route("/api/stations/{name}/current", get(current_conditions))
		.route("/api/stations/{name}/observations", get(observations))
		.route("/api/readings", post(upload_reading))
		.route("/api/processes", get(list_processes).post(start_process))
		.route("/api/processes/{id}", delete(stop_process))
		.route("/api/logging", get(logging_settings))
		.route("/api/logging/{name}", put(set_logging))
		.layer(CorsLayer::permissive())
		.with_state(state)
}

#[derive(Serialize)]
struct ErrorResponse {
	error: String,
}

#[derive(Serialize)]
struct ActionResponse {
	message: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn storage_error(e: StorageError) -> ApiError {
	let status = match e {
		StorageError::StationNotFound(_) => StatusCode::NOT_FOUND,
		StorageError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
	};
	(
		status,
		Json(ErrorResponse {
			error: e.to_string(),
		}),
	)
}

fn bad_request(error: String) -> ApiError {
	(StatusCode::BAD_REQUEST, Json(ErrorResponse { error }))
}

async fn list_stations(State(state): State<AppState>) -> Result<Json<Vec<Station>>, ApiError> {
	state
		.store
		.get_stations()
		.await
		.map(Json)
		.map_err(storage_error)
}

async fn add_station(
	State(state): State<AppState>,
	Json(station): Json<Station>,
) -> Result<Json<ActionResponse>, ApiError> {
	state
		.store
		.add_or_update_station(&station)
		.await
		.map_err(storage_error)?;
	Ok(Json(ActionResponse {
		message: format!("{}: saved", station.name),
	}))
}

async fn current_conditions(
	State(state): State<AppState>,
	Path(name): Path<String>,
) -> Result<Json<SensorReading>, ApiError> {
	state
		.store
		.get_current_reading(&name)
		.await
		.map(Json)
		.map_err(storage_error)
}

#[derive(Deserialize)]
struct ObservationParams {
	sensor: Option<String>,
	start: Option<DateTime<Utc>>,
	end: Option<DateTime<Utc>>,
}

async fn observations(
	State(state): State<AppState>,
	Path(name): Path<String>,
	Query(params): Query<ObservationParams>,
) -> Result<Json<Vec<Observation>>, ApiError> {
	let query = ObservationQuery {
		station: name,
		sensor: params.sensor,
		start: params.start,
		end: params.end,
	};
	state
		.store
		.get_observations(&query)
		.await
		.map(Json)
		.map_err(storage_error)
}

/// Station-agent upload path: replaces the station's cached current
/// conditions. Nothing is written durably until the next flush sweep.
async fn upload_reading(
	State(state): State<AppState>,
	Json(reading): Json<SensorReading>,
) -> Result<Json<ActionResponse>, ApiError> {
	let station = reading.station_name.clone();
	state
		.store
		.set_current_reading(reading)
		.await
		.map_err(storage_error)?;
	Ok(Json(ActionResponse {
		message: format!("{}: current conditions updated", station),
	}))
}

async fn list_processes(State(state): State<AppState>) -> Json<Vec<ProcessSnapshot>> {
	Json(state.supervisor.list().await)
}

#[derive(Deserialize)]
struct StartProcessRequest {
	path: PathBuf,
	#[serde(default)]
	args: Vec<String>,
}

#[derive(Serialize)]
struct StartProcessResponse {
	id: u64,
	message: String,
}

async fn start_process(
	State(state): State<AppState>,
	Json(request): Json<StartProcessRequest>,
) -> Result<Json<StartProcessResponse>, ApiError> {
	state
		.supervisor
		.start_by_path(request.path, request.args)
		.await
		.map(|id| {
			Json(StartProcessResponse {
				id,
				message: format!("{}: starting", id),
			})
		})
		.map_err(bad_request)
}

async fn stop_process(
	State(state): State<AppState>,
	Path(id): Path<u64>,
) -> Result<Json<ActionResponse>, ApiError> {
	state
		.supervisor
		.stop(id)
		.await
		.map(|message| Json(ActionResponse { message }))
		.map_err(bad_request)
}

async fn logging_settings(State(state): State<AppState>) -> Json<Vec<LoggingSnapshot>> {
	Json(state.logger.snapshot().await)
}

#[derive(Deserialize)]
struct SetLoggingRequest {
	enabled: bool,
}

async fn set_logging(
	State(state): State<AppState>,
	Path(name): Path<String>,
	Json(request): Json<SetLoggingRequest>,
) -> Json<ActionResponse> {
	state.logger.set_enabled(&name, request.enabled).await;
	Json(ActionResponse {
		message: format!("{}: logging {}", name, if request.enabled { "enabled" } else { "disabled" }),
	})
}
