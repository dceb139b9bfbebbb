use chrono::{DateTime, Local, Timelike, Utc};
use cirrus_core::LoggingSnapshot;
use cirrus_storage::Storage;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};

pub struct LoggerConfig {
	pub interval_minutes: u32,
	pub discovery_period: Duration,
}

impl Default for LoggerConfig {
	fn default() -> Self {
		Self {
			interval_minutes: 15,
			discovery_period: Duration::from_secs(15),
		}
	}
}

/// Tracks which stations exist and commits each one's current cached
/// reading to durable storage on wall-clock aligned intervals. Stations
/// appear in the registry the first time a discovery sweep sees them and
/// stay for the life of the process.
pub struct Logger {
	entries: Arc<RwLock<HashMap<String, LogEntry>>>,
	storage: Arc<dyn Storage>,
	config: LoggerConfig,
}

#[derive(Debug, Clone)]
struct LogEntry {
	station_id: Option<i64>,
	last_log: Option<DateTime<Utc>>,
	enabled: bool,
}

impl Logger {
	pub fn new(storage: Arc<dyn Storage>, config: LoggerConfig) -> Arc<Self> {
		Arc::new(Self {
			entries: Arc::new(RwLock::new(HashMap::new())),
			storage,
			config,
		})
	}

	/// Serializable view of every tracked station.
	pub async fn snapshot(&self) -> Vec<LoggingSnapshot> {
		let entries = self.entries.read().await;
		let mut snapshot: Vec<LoggingSnapshot> = entries
			.iter()
			.map(|(name, entry)| LoggingSnapshot {
				station_name: name.clone(),
				station_id: entry.station_id,
				last_log: entry.last_log,
				enabled: entry.enabled,
			})
			.collect();
		snapshot.sort_by(|a, b| a.station_name.cmp(&b.station_name));
		snapshot
	}

	/// Flip the logging flag for a station, creating a blank entry if the
	/// discovery sweep has not seen it yet. Never touches storage.
	pub async fn set_enabled(&self, station_name: &str, enabled: bool) {
		let mut entries = self.entries.write().await;
		let entry = entries.entry(station_name.to_string()).or_insert(LogEntry {
			station_id: None,
			last_log: None,
			enabled: false,
		});
		entry.enabled = enabled;
	}

	/// Ask storage for the station list and register any station seen for
	/// the first time. Existing entries are left untouched, so re-running
	/// against an unchanged list is a no-op.
	pub async fn discover_once(&self) {
		let stations = match self.storage.get_stations().await {
			Ok(stations) => stations,
			Err(e) => {
				warn!("station discovery failed: {}", e);
				return;
			}
		};

		let mut entries = self.entries.write().await;
		for station in stations {
			if !entries.contains_key(&station.name) {
				debug!("tracking station {} for logging", station.name);
				entries.insert(
					station.name.clone(),
					LogEntry {
						station_id: station.id,
						last_log: Some(Utc::now()),
						enabled: false,
					},
				);
			}
		}
	}

	/// Commit every tracked station's current reading. Stations are
	/// processed independently; one storage failure never aborts the rest
	/// of the sweep, and a failed station simply waits for the next one.
	/// The enabled flag is settings state only and does not gate the flush.
	pub async fn flush_once(&self) {
		let names: Vec<String> = {
			let entries = self.entries.read().await;
			entries.keys().cloned().collect()
		};

		for name in names {
			let reading = match self.storage.get_current_reading(&name).await {
				Ok(reading) => reading,
				Err(e) => {
					warn!("{}: failed to fetch current reading: {}", name, e);
					continue;
				}
			};
			if let Err(e) = self.storage.log_conditions(&reading).await {
				warn!("{}: failed to log conditions: {}", name, e);
				continue;
			}

			let mut entries = self.entries.write().await;
			if let Some(entry) = entries.get_mut(&name) {
				entry.last_log = Some(Utc::now());
			}
		}
	}

	/// Start the discovery and flush tasks. Both stop when `shutdown`
	/// fires.
	pub fn spawn(self: &Arc<Self>, shutdown: watch::Receiver<bool>) {
		let logger = Arc::clone(self);
		let mut discovery_shutdown = shutdown.clone();
		tokio::spawn(async move {
			let mut ticker = tokio::time::interval(logger.config.discovery_period);
			loop {
				tokio::select! {
					_ = ticker.tick() => logger.discover_once().await,
					_ = discovery_shutdown.changed() => return,
				}
			}
		});

		let logger = Arc::clone(self);
		let mut flush_shutdown = shutdown;
		tokio::spawn(async move {
			// wait out the partial interval so every flush lands on a
			// wall-clock boundary instead of drifting from process start
			let delta = seconds_until_boundary(&Local::now(), logger.config.interval_minutes);
			info!("first conditions flush in {}s", delta);
			tokio::select! {
				_ = tokio::time::sleep(Duration::from_secs(delta)) => {}
				_ = flush_shutdown.changed() => return,
			}

			let period = Duration::from_secs(u64::from(logger.config.interval_minutes) * 60);
			let mut ticker = tokio::time::interval(period);
			loop {
				tokio::select! {
					_ = ticker.tick() => logger.flush_once().await,
					_ = flush_shutdown.changed() => return,
				}
			}
		});
	}
}

/// Seconds until the next interval boundary aligned to the hour (for a
/// 15-minute interval: :00, :15, :30, :45). A time already sitting on a
/// boundary waits a full interval, never zero.
pub fn seconds_until_boundary<T: Timelike>(now: &T, interval_minutes: u32) -> u64 {
	let interval_secs = u64::from(interval_minutes) * 60;
	let elapsed = u64::from(now.minute()) * 60 + u64::from(now.second());
	let delta = elapsed.div_ceil(interval_secs) * interval_secs - elapsed;
	if delta == 0 {
		interval_secs
	} else {
		delta
	}
}
