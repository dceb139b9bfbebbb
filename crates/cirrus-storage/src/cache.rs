use async_trait::async_trait;
use cirrus_core::{Observation, ObservationQuery, SensorReading, Station};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::{SqliteStore, Storage, StorageError};

/// Layers an in-memory current-conditions cache over the database. Current
/// readings live only in memory; everything durable is delegated.
pub struct CachedStore {
	database: SqliteStore,
	current: RwLock<HashMap<String, SensorReading>>,
}

impl CachedStore {
	pub fn new(database: SqliteStore) -> Self {
		Self {
			database,
			current: RwLock::new(HashMap::new()),
		}
	}
}

#[async_trait]
impl Storage for CachedStore {
	async fn get_stations(&self) -> Result<Vec<Station>, StorageError> {
		let mut stations = self.database.get_stations().await?;

		// A station that is uploading but has never been logged has no
		// database row yet; surface it with no id.
		let current = self.current.read().await;
		for name in current.keys() {
			if !stations.iter().any(|s| &s.name == name) {
				stations.push(Station {
					id: None,
					name: name.clone(),
					description: String::new(),
					latitude: None,
					longitude: None,
				});
			}
		}
		Ok(stations)
	}

	async fn get_station_by_name(&self, name: &str) -> Result<Option<Station>, StorageError> {
		self.database.get_station_by_name(name).await
	}

	async fn add_or_update_station(&self, station: &Station) -> Result<(), StorageError> {
		self.database.add_or_update_station(station).await
	}

	async fn get_current_reading(&self, station_name: &str) -> Result<SensorReading, StorageError> {
		let current = self.current.read().await;
		Ok(current
			.get(station_name)
			.cloned()
			.unwrap_or_else(|| SensorReading::empty(station_name)))
	}

	async fn set_current_reading(&self, reading: SensorReading) -> Result<(), StorageError> {
		let mut current = self.current.write().await;
		current.insert(reading.station_name.clone(), reading);
		Ok(())
	}

	async fn log_conditions(&self, reading: &SensorReading) -> Result<(), StorageError> {
		self.database.log_conditions(reading).await
	}

	async fn get_observations(
		&self,
		query: &ObservationQuery,
	) -> Result<Vec<Observation>, StorageError> {
		self.database.get_observations(query).await
	}
}
