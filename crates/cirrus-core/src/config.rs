use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ServerConfig {
	#[serde(default)]
	pub http: HttpConfig,
	#[serde(default)]
	pub database: DatabaseConfig,
	#[serde(default)]
	pub agents: AgentsConfig,
	#[serde(default)]
	pub logging: LoggingConfig,
	#[serde(default)]
	pub supervisor: SupervisorSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
	#[serde(default = "default_port")]
	pub port: u16,
}

impl Default for HttpConfig {
	fn default() -> Self {
		Self { port: default_port() }
	}
}

fn default_port() -> u16 {
	8080
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
	#[serde(default = "default_db_path")]
	pub path: PathBuf,
}

impl Default for DatabaseConfig {
	fn default() -> Self {
		Self { path: default_db_path() }
	}
}

fn default_db_path() -> PathBuf {
	PathBuf::from("./cirrus.db")
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentsConfig {
	#[serde(default = "default_agent_config_dir")]
	pub config_dir: PathBuf,
	#[serde(default = "default_agent_exec_dir")]
	pub exec_dir: PathBuf,
}

impl Default for AgentsConfig {
	fn default() -> Self {
		Self {
			config_dir: default_agent_config_dir(),
			exec_dir: default_agent_exec_dir(),
		}
	}
}

fn default_agent_config_dir() -> PathBuf {
	PathBuf::from("./config/stations")
}

fn default_agent_exec_dir() -> PathBuf {
	PathBuf::from("./bin/agents")
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
	#[serde(default = "default_interval_minutes")]
	pub interval_minutes: u32,
	#[serde(default = "default_discovery_secs")]
	pub discovery_secs: u64,
}

impl Default for LoggingConfig {
	fn default() -> Self {
		Self {
			interval_minutes: default_interval_minutes(),
			discovery_secs: default_discovery_secs(),
		}
	}
}

fn default_interval_minutes() -> u32 {
	15
}

fn default_discovery_secs() -> u64 {
	15
}

#[derive(Debug, Clone, Deserialize)]
pub struct SupervisorSettings {
	#[serde(default = "default_sweep_secs")]
	pub sweep_secs: u64,
	#[serde(default = "default_hang_threshold_secs")]
	pub hang_threshold_secs: u64,
}

impl Default for SupervisorSettings {
	fn default() -> Self {
		Self {
			sweep_secs: default_sweep_secs(),
			hang_threshold_secs: default_hang_threshold_secs(),
		}
	}
}

fn default_sweep_secs() -> u64 {
	60
}

fn default_hang_threshold_secs() -> u64 {
	180
}

/// Load the server configuration. A missing file yields the defaults; an
/// unreadable or unparsable file warns and yields the defaults.
pub fn load_config(path: &Path) -> ServerConfig {
	if path.exists() {
		match std::fs::read_to_string(path) {
			Ok(content) => match toml::from_str(&content) {
				Ok(config) => return config,
				Err(e) => eprintln!("warning: failed to parse {}: {}", path.display(), e),
			},
			Err(e) => eprintln!("warning: failed to read {}: {}", path.display(), e),
		}
	}
	ServerConfig::default()
}

/// One station agent the supervisor should keep alive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentLaunch {
	pub path: PathBuf,
	pub args: Vec<String>,
}

/// The slice of a station-agent config file this server cares about: the
/// executable that speaks for the station. Everything else in the file
/// belongs to the agent.
#[derive(Debug, Deserialize)]
struct AgentConfig {
	exec_name: String,
}

/// Scan the agent config directory and produce one launch tuple per station
/// config file. The agent is pointed back at its own config file.
pub fn discover_agents(agents: &AgentsConfig) -> Vec<AgentLaunch> {
	let mut launches = Vec::new();
	let entries = match std::fs::read_dir(&agents.config_dir) {
		Ok(entries) => entries,
		Err(e) => {
			eprintln!(
				"warning: cannot read agent config dir {}: {}",
				agents.config_dir.display(),
				e
			);
			return launches;
		}
	};

	for entry in entries.flatten() {
		let config_path = entry.path();
		if !config_path.is_file() {
			continue;
		}
		let content = match std::fs::read_to_string(&config_path) {
			Ok(content) => content,
			Err(e) => {
				eprintln!("warning: failed to read {}: {}", config_path.display(), e);
				continue;
			}
		};
		let parsed: AgentConfig = match serde_json::from_str(&content) {
			Ok(parsed) => parsed,
			Err(e) => {
				eprintln!("warning: failed to parse {}: {}", config_path.display(), e);
				continue;
			}
		};
		launches.push(AgentLaunch {
			path: agents.exec_dir.join(&parsed.exec_name),
			args: vec![
				"--config".to_string(),
				config_path.to_string_lossy().to_string(),
			],
		});
	}

	// read_dir order is filesystem-dependent
	launches.sort_by(|a, b| a.args.cmp(&b.args));
	launches
}
