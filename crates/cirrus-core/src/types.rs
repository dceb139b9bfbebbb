use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// A weather station as known to durable storage. `id` is `None` for a
/// station that has only been seen in the current-conditions cache and has
/// no database row yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Station {
	pub id: Option<i64>,
	pub name: String,
	#[serde(default)]
	pub description: String,
	pub latitude: Option<f64>,
	pub longitude: Option<f64>,
}

/// One upload from a station agent: everything the station's sensors
/// reported at `timestamp`, keyed by sensor name. Also the shape the
/// current-conditions cache hands back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorReading {
	pub station_name: String,
	pub timestamp: DateTime<Utc>,
	#[serde(default)]
	pub readings: HashMap<String, String>,
}

impl SensorReading {
	/// An empty template for a station with nothing cached.
	pub fn empty(station_name: &str) -> Self {
		Self {
			station_name: station_name.to_string(),
			timestamp: Utc::now(),
			readings: HashMap::new(),
		}
	}

	pub fn is_empty(&self) -> bool {
		self.readings.is_empty()
	}
}

/// A single logged sensor value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
	pub id: i64,
	pub station_id: i64,
	pub sensor: String,
	pub value: String,
	pub recorded_at: DateTime<Utc>,
}

/// Parameters for a historical observation query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservationQuery {
	pub station: String,
	pub sensor: Option<String>,
	pub start: Option<DateTime<Utc>>,
	pub end: Option<DateTime<Utc>>,
}

/// Lifecycle state of a managed station-agent process.
///
/// `Running` is entered on the first line of output, not on spawn: liveness
/// is defined by output. `Unknown` means the output stream could not be
/// attached and the record needs operator attention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessState {
	Launching,
	Running,
	Stopped,
	Unknown,
}

impl ProcessState {
	pub fn is_running(&self) -> bool {
		matches!(self, ProcessState::Running)
	}
}

/// Serializable view of one managed process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessSnapshot {
	pub id: u64,
	pub path: PathBuf,
	pub args: Vec<String>,
	pub state: ProcessState,
	pub pid: Option<u32>,
	pub last_heartbeat: DateTime<Utc>,
	pub restarts: u32,
	pub last_error: Option<String>,
}

/// Serializable view of one station's logging bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSnapshot {
	pub station_name: String,
	pub station_id: Option<i64>,
	pub last_log: Option<DateTime<Utc>>,
	pub enabled: bool,
}
