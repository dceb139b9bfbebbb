use cirrus_core::config::{discover_agents, load_config, AgentsConfig};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

fn temp_dir(name: &str) -> PathBuf {
	let n = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
	let dir = std::env::temp_dir().join(format!("cirrus-core-test-{}-{}-{}", std::process::id(), n, name));
	let _ = std::fs::create_dir_all(&dir);
	dir
}

#[test]
fn missing_config_file_yields_defaults() {
	let config = load_config(Path::new("/nonexistent/cirrus.toml"));
	assert_eq!(config.http.port, 8080);
	assert_eq!(config.logging.interval_minutes, 15);
	assert_eq!(config.logging.discovery_secs, 15);
	assert_eq!(config.supervisor.sweep_secs, 60);
	assert_eq!(config.supervisor.hang_threshold_secs, 180);
}

#[test]
fn partial_config_keeps_defaults_for_the_rest() {
	let dir = temp_dir("partial");
	let path = dir.join("cirrus.toml");
	std::fs::write(
		&path,
		"[http]\nport = 9999\n\n[logging]\ninterval_minutes = 5\n",
	)
	.unwrap();

	let config = load_config(&path);
	assert_eq!(config.http.port, 9999);
	assert_eq!(config.logging.interval_minutes, 5);
	assert_eq!(config.logging.discovery_secs, 15);
	assert_eq!(config.supervisor.sweep_secs, 60);

	let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn malformed_config_falls_back_to_defaults() {
	let dir = temp_dir("malformed");
	let path = dir.join("cirrus.toml");
	std::fs::write(&path, "this is not toml [[[").unwrap();

	let config = load_config(&path);
	assert_eq!(config.http.port, 8080);

	let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn discover_agents_maps_config_files_to_launches() {
	let config_dir = temp_dir("agent-configs");
	let exec_dir = PathBuf::from("/opt/agents");
	std::fs::write(
		config_dir.join("alpha.json"),
		r#"{"exec_name": "agent-alpha", "upload_url": "http://localhost:8080"}"#,
	)
	.unwrap();
	std::fs::write(config_dir.join("beta.json"), r#"{"exec_name": "agent-beta"}"#).unwrap();
	// files the agents own but this server cannot parse are skipped
	std::fs::write(config_dir.join("notes.txt"), "not json").unwrap();

	let launches = discover_agents(&AgentsConfig {
		config_dir: config_dir.clone(),
		exec_dir: exec_dir.clone(),
	});

	assert_eq!(launches.len(), 2);
	let alpha = launches
		.iter()
		.find(|l| l.path == exec_dir.join("agent-alpha"))
		.unwrap();
	assert_eq!(alpha.args[0], "--config");
	assert!(alpha.args[1].ends_with("alpha.json"));

	let _ = std::fs::remove_dir_all(&config_dir);
}

#[test]
fn discover_agents_with_missing_dir_is_empty() {
	let launches = discover_agents(&AgentsConfig {
		config_dir: PathBuf::from("/nonexistent/agent-configs"),
		exec_dir: PathBuf::from("/opt/agents"),
	});
	assert!(launches.is_empty());
}
