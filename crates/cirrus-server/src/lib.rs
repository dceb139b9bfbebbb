//! # cirrus-server
//!
//! The cirrus daemon: supervises station-agent processes, schedules
//! condition logging on wall-clock boundaries, and serves the REST API the
//! configuration site and the station agents talk to.

pub mod api;
pub mod logger;
pub mod supervisor;

pub use logger::{seconds_until_boundary, Logger, LoggerConfig};
pub use supervisor::{Supervisor, SupervisorConfig};
