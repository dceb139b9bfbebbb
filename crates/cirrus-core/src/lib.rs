//! # cirrus-core
//!
//! Shared types and configuration for the cirrus weather-station server.
//!
//! Holds the domain model (stations, sensor readings, observations), the
//! snapshot types the daemon exposes over its REST surface, the TOML server
//! configuration, and station-agent launch discovery.

pub mod config;
pub mod types;

pub use config::{discover_agents, load_config, AgentLaunch, ServerConfig};
pub use types::*;
