//! # cirrus-storage
//!
//! The storage collaborator for the cirrus weather-station server: a
//! `Storage` trait safe for concurrent callers, a SQLite implementation for
//! durable stations and observations, and a memory cache for the current
//! conditions each station last uploaded.

pub mod cache;
pub mod sqlite;

pub use cache::CachedStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use cirrus_core::{Observation, ObservationQuery, SensorReading, Station};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
	#[error("database error: {0}")]
	Database(#[from] sqlx::Error),
	#[error("station not found: {0}")]
	StationNotFound(String),
}

/// Persistence plus current-conditions cache. Every method is safe for
/// concurrent invocation from the REST handlers and the background sweeps.
#[async_trait]
pub trait Storage: Send + Sync {
	/// All known stations, durable or cache-only.
	async fn get_stations(&self) -> Result<Vec<Station>, StorageError>;

	async fn get_station_by_name(&self, name: &str) -> Result<Option<Station>, StorageError>;

	async fn add_or_update_station(&self, station: &Station) -> Result<(), StorageError>;

	/// The station's most recently uploaded reading, or an empty template if
	/// nothing is cached for it.
	async fn get_current_reading(&self, station_name: &str) -> Result<SensorReading, StorageError>;

	async fn set_current_reading(&self, reading: SensorReading) -> Result<(), StorageError>;

	/// Durably log a reading, creating the station record if it does not
	/// exist yet.
	async fn log_conditions(&self, reading: &SensorReading) -> Result<(), StorageError>;

	async fn get_observations(
		&self,
		query: &ObservationQuery,
	) -> Result<Vec<Observation>, StorageError>;
}
