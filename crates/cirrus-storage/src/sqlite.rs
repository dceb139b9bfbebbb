use cirrus_core::{Observation, ObservationQuery, SensorReading, Station};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use tracing::{debug, info};

use crate::StorageError;

/// Durable storage for stations and observations, backed by a single SQLite
/// file created on first open.
#[derive(Debug, Clone)]
pub struct SqliteStore {
	pool: SqlitePool,
}

impl SqliteStore {
	pub async fn open(path: &Path) -> Result<Self, StorageError> {
		let options = SqliteConnectOptions::new()
			.filename(path)
			.create_if_missing(true);
		let pool = SqlitePoolOptions::new()
			.max_connections(5)
			.connect_with(options)
			.await?;

		let store = Self { pool };
		store.migrate().await?;
		info!("opened database at {}", path.display());
		Ok(store)
	}

	async fn migrate(&self) -> Result<(), StorageError> {
		sqlx::query(
			r#"
			CREATE TABLE IF NOT EXISTS stations (
				id INTEGER PRIMARY KEY AUTOINCREMENT,
				name TEXT NOT NULL UNIQUE,
				description TEXT NOT NULL DEFAULT '',
				latitude REAL,
				longitude REAL
			)
			"#,
		)
		.execute(&self.pool)
		.await?;

		sqlx::query(
			r#"
			CREATE TABLE IF NOT EXISTS observations (
				id INTEGER PRIMARY KEY AUTOINCREMENT,
				station_id INTEGER NOT NULL REFERENCES stations(id),
				sensor TEXT NOT NULL,
				value TEXT NOT NULL,
				recorded_at TEXT NOT NULL
			)
			"#,
		)
		.execute(&self.pool)
		.await?;

		sqlx::query(
			"CREATE INDEX IF NOT EXISTS idx_observations_station \
			 ON observations (station_id, sensor, recorded_at)",
		)
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	fn row_to_station(row: &SqliteRow) -> Station {
		Station {
			id: Some(row.get("id")),
			name: row.get("name"),
			description: row.get("description"),
			latitude: row.get("latitude"),
			longitude: row.get("longitude"),
		}
	}

	pub async fn get_stations(&self) -> Result<Vec<Station>, StorageError> {
		let rows = sqlx::query(
			"SELECT id, name, description, latitude, longitude FROM stations ORDER BY name",
		)
		.fetch_all(&self.pool)
		.await?;
		Ok(rows.iter().map(Self::row_to_station).collect())
	}

	pub async fn get_station_by_name(&self, name: &str) -> Result<Option<Station>, StorageError> {
		let row = sqlx::query(
			"SELECT id, name, description, latitude, longitude FROM stations WHERE name = ?",
		)
		.bind(name)
		.fetch_optional(&self.pool)
		.await?;
		Ok(row.as_ref().map(Self::row_to_station))
	}

	async fn station_id_by_name(&self, name: &str) -> Result<Option<i64>, StorageError> {
		let row = sqlx::query("SELECT id FROM stations WHERE name = ?")
			.bind(name)
			.fetch_optional(&self.pool)
			.await?;
		Ok(row.map(|r| r.get("id")))
	}

	pub async fn add_or_update_station(&self, station: &Station) -> Result<(), StorageError> {
		sqlx::query(
			r#"
			INSERT INTO stations (name, description, latitude, longitude)
			VALUES (?, ?, ?, ?)
			ON CONFLICT(name) DO UPDATE SET
				description = excluded.description,
				latitude = excluded.latitude,
				longitude = excluded.longitude
			"#,
		)
		.bind(&station.name)
		.bind(&station.description)
		.bind(station.latitude)
		.bind(station.longitude)
		.execute(&self.pool)
		.await?;
		Ok(())
	}

	/// Record one observation row per sensor value, creating the station row
	/// first if this is the first time the station is logged. A reading with
	/// no sensor values is a no-op.
	pub async fn log_conditions(&self, reading: &SensorReading) -> Result<(), StorageError> {
		if reading.is_empty() {
			return Ok(());
		}

		let station_id = match self.station_id_by_name(&reading.station_name).await? {
			Some(id) => id,
			None => {
				debug!("creating station row for {}", reading.station_name);
				self.add_or_update_station(&Station {
					id: None,
					name: reading.station_name.clone(),
					description: String::new(),
					latitude: None,
					longitude: None,
				})
				.await?;
				self.station_id_by_name(&reading.station_name)
					.await?
					.ok_or_else(|| StorageError::StationNotFound(reading.station_name.clone()))?
			}
		};

		let mut tx = self.pool.begin().await?;
		for (sensor, value) in &reading.readings {
			sqlx::query(
				"INSERT INTO observations (station_id, sensor, value, recorded_at) \
				 VALUES (?, ?, ?, ?)",
			)
			.bind(station_id)
			.bind(sensor)
			.bind(value)
			.bind(reading.timestamp)
			.execute(&mut *tx)
			.await?;
		}
		tx.commit().await?;
		Ok(())
	}

	pub async fn get_observations(
		&self,
		query: &ObservationQuery,
	) -> Result<Vec<Observation>, StorageError> {
		let station_id = match self.station_id_by_name(&query.station).await? {
			Some(id) => id,
			None => return Err(StorageError::StationNotFound(query.station.clone())),
		};

		let mut sql = String::from(
			"SELECT id, station_id, sensor, value, recorded_at FROM observations \
			 WHERE station_id = ?",
		);
		if query.sensor.is_some() {
			sql.push_str(" AND sensor = ?");
		}
		if query.start.is_some() {
			sql.push_str(" AND recorded_at >= ?");
		}
		if query.end.is_some() {
			sql.push_str(" AND recorded_at <= ?");
		}
		sql.push_str(" ORDER BY recorded_at");

		let mut q = sqlx::query(&sql).bind(station_id);
		if let Some(ref sensor) = query.sensor {
			q = q.bind(sensor);
		}
		if let Some(start) = query.start {
			q = q.bind(start);
		}
		if let Some(end) = query.end {
			q = q.bind(end);
		}

		let rows = q.fetch_all(&self.pool).await?;
		Ok(rows
			.iter()
			.map(|row| Observation {
				id: row.get("id"),
				station_id: row.get("station_id"),
				sensor: row.get("sensor"),
				value: row.get("value"),
				recorded_at: row.get("recorded_at"),
			})
			.collect())
	}
}
