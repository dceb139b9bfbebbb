use cirrus_server::{api, Logger, LoggerConfig, Supervisor, SupervisorConfig};
use cirrus_storage::{CachedStore, SqliteStore, Storage};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[tokio::main]
async fn main() {
	tracing_subscriber::fmt().init();

	let config_path = std::env::args()
		.nth(1)
		.map(PathBuf::from)
		.unwrap_or_else(|| PathBuf::from("./cirrus.toml"));
	let config = cirrus_core::load_config(&config_path);

	// the database is the one thing the daemon cannot run without
	let database = match SqliteStore::open(&config.database.path).await {
		Ok(database) => database,
		Err(e) => {
			tracing::error!(
				"failed to open database {}: {}",
				config.database.path.display(),
				e
			);
			std::process::exit(1);
		}
	};
	let store: Arc<dyn Storage> = Arc::new(CachedStore::new(database));

	let (shutdown_tx, shutdown_rx) = watch::channel(false);

	let supervisor = Supervisor::new(SupervisorConfig {
		sweep_interval: Duration::from_secs(config.supervisor.sweep_secs),
		hang_threshold: Duration::from_secs(config.supervisor.hang_threshold_secs),
	});
	let agents = cirrus_core::discover_agents(&config.agents);
	tracing::info!("discovered {} station agents", agents.len());
	for agent in agents {
		supervisor.create(agent.path, agent.args).await;
	}
	tokio::spawn(Arc::clone(&supervisor).run(shutdown_rx.clone()));

	let logger = Logger::new(
		Arc::clone(&store),
		LoggerConfig {
			interval_minutes: config.logging.interval_minutes,
			discovery_period: Duration::from_secs(config.logging.discovery_secs),
		},
	);
	logger.spawn(shutdown_rx.clone());

	let app = api::router(store, supervisor, logger);
	let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.http.port));
	let listener = match tokio::net::TcpListener::bind(addr).await {
		Ok(listener) => listener,
		Err(e) => {
			tracing::error!("failed to bind {}: {}", addr, e);
			std::process::exit(1);
		}
	};
	tracing::info!("listening on {}", addr);

	tokio::select! {
		result = axum::serve(listener, app) => {
			if let Err(e) = result {
				tracing::error!("server error: {}", e);
			}
		}
		_ = tokio::signal::ctrl_c() => {
			tracing::info!("shutting down");
		}
	}

	// every sweep, flush task and output listener watches this channel
	let _ = shutdown_tx.send(true);
}
