use chrono::{DateTime, Utc};
use cirrus_core::{ProcessSnapshot, ProcessState};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};

pub struct SupervisorConfig {
	pub sweep_interval: Duration,
	pub hang_threshold: Duration,
}

impl Default for SupervisorConfig {
	fn default() -> Self {
		Self {
			sweep_interval: Duration::from_secs(60),
			hang_threshold: Duration::from_secs(180),
		}
	}
}

/// Keeps the station-agent processes alive. Agents are expected to write a
/// line of output now and then; that output is the only liveness signal.
/// An agent that exits, or that stays silent past the hang threshold, is
/// force-killed and relaunched by the periodic sweep.
pub struct Supervisor {
	processes: Arc<RwLock<HashMap<u64, ManagedProcess>>>,
	next_id: AtomicU64,
	config: SupervisorConfig,
}

struct ManagedProcess {
	path: PathBuf,
	args: Vec<String>,
	state: ProcessState,
	last_heartbeat: DateTime<Utc>,
	last_error: Option<String>,
	pid: Option<u32>,
	restarts: u32,
	cancel: Option<watch::Sender<bool>>,
}

impl ManagedProcess {
	fn new(path: PathBuf, args: Vec<String>, restarts: u32) -> Self {
		Self {
			path,
			args,
			state: ProcessState::Launching,
			// a process that never speaks hangs out from its launch time
			last_heartbeat: Utc::now(),
			last_error: None,
			pid: None,
			restarts,
			cancel: None,
		}
	}
}

impl Supervisor {
	pub fn new(config: SupervisorConfig) -> Arc<Self> {
		Arc::new(Self {
			processes: Arc::new(RwLock::new(HashMap::new())),
			next_id: AtomicU64::new(0),
			config,
		})
	}

	/// Register a process in `Launching`. The next sweep starts it. The
	/// returned handle is never reused, even after the record is removed.
	pub async fn create(&self, path: PathBuf, args: Vec<String>) -> u64 {
		let id = self.next_id.fetch_add(1, Ordering::SeqCst);
		let mut processes = self.processes.write().await;
		processes.insert(id, ManagedProcess::new(path, args, 0));
		id
	}

	/// Register and immediately launch a process.
	pub async fn start_by_path(&self, path: PathBuf, args: Vec<String>) -> Result<u64, String> {
		let id = self.create(path, args).await;
		self.start(id).await?;
		Ok(id)
	}

	/// Spawn the process and attach its output listener. A spawn or
	/// stream-attach failure parks the record in `Unknown` with the error
	/// recorded; nothing retries it faster than the sweep.
	pub async fn start(&self, id: u64) -> Result<(), String> {
		let mut processes = self.processes.write().await;
		let record = processes
			.get_mut(&id)
			.ok_or_else(|| format!("{}: no such process", id))?;

		if record.pid.is_some() {
			return Err(format!("{}: already started", id));
		}

		let mut command = Command::new(&record.path);
		command
			.args(&record.args)
			.stdout(Stdio::piped())
			.stderr(Stdio::null());

		let mut child = match command.spawn() {
			Ok(child) => child,
			Err(e) => {
				let msg = format!("failed to spawn {}: {}", record.path.display(), e);
				record.state = ProcessState::Unknown;
				record.last_error = Some(msg.clone());
				return Err(msg);
			}
		};

		let stdout = match child.stdout.take() {
			Some(stdout) => stdout,
			None => {
				let msg = format!("no output stream for {}", record.path.display());
				record.state = ProcessState::Unknown;
				record.last_error = Some(msg.clone());
				let _ = child.start_kill();
				return Err(msg);
			}
		};

		let (cancel_tx, cancel_rx) = watch::channel(false);
		record.pid = child.id();
		record.last_heartbeat = Utc::now();
		record.last_error = None;
		record.cancel = Some(cancel_tx);

		info!("started {} as process {}", record.path.display(), id);

		let registry = Arc::clone(&self.processes);
		let attempt = record.restarts;
		tokio::spawn(async move {
			listen(registry, id, attempt, child, stdout, cancel_rx).await;
		});

		Ok(())
	}

	/// Terminate and deregister. On failure (never started, already gone,
	/// permission denied) the error goes to the caller and the record is
	/// left exactly as found for the next sweep to reconcile.
	pub async fn stop(&self, id: u64) -> Result<String, String> {
		let mut processes = self.processes.write().await;
		let record = processes
			.get_mut(&id)
			.ok_or_else(|| format!("{}: no such process", id))?;

		let pid = record
			.pid
			.ok_or_else(|| format!("{}: no running process", id))?;
		send_signal(pid, nix::sys::signal::Signal::SIGTERM)
			.map_err(|e| format!("{}: failed to stop pid {}: {}", id, pid, e))?;

		if let Some(cancel) = record.cancel.take() {
			let _ = cancel.send(true);
		}
		processes.remove(&id);
		info!("stopped process {}", id);
		Ok(format!("{}: stopped", id))
	}

	/// Snapshot of every registered process, error states included.
	pub async fn list(&self) -> Vec<ProcessSnapshot> {
		let processes = self.processes.read().await;
		let mut snapshot: Vec<ProcessSnapshot> = processes
			.iter()
			.map(|(id, record)| ProcessSnapshot {
				id: *id,
				path: record.path.clone(),
				args: record.args.clone(),
				state: record.state,
				pid: record.pid,
				last_heartbeat: record.last_heartbeat,
				restarts: record.restarts,
				last_error: record.last_error.clone(),
			})
			.collect();
		snapshot.sort_by_key(|p| p.id);
		snapshot
	}

	/// One pass over the registry: start what is waiting, replace what has
	/// crashed or gone silent. A failure handling one handle never stops
	/// the rest of the sweep.
	pub async fn sweep_once(&self) {
		let candidates: Vec<(u64, ProcessState, Option<u32>, DateTime<Utc>)> = {
			let processes = self.processes.read().await;
			processes
				.iter()
				.map(|(id, r)| (*id, r.state, r.pid, r.last_heartbeat))
				.collect()
		};

		let now = Utc::now();
		for (id, state, pid, heartbeat) in candidates {
			if state == ProcessState::Launching && pid.is_none() {
				if let Err(e) = self.start(id).await {
					warn!("sweep: start of {} failed: {}", id, e);
				}
				continue;
			}

			let silent_ms = now.signed_duration_since(heartbeat).num_milliseconds();
			let hung = silent_ms > self.config.hang_threshold.as_millis() as i64;
			if state == ProcessState::Stopped || hung {
				if hung {
					warn!("process {} silent for {}ms, replacing", id, silent_ms);
				}
				if let Err(e) = self.replace(id).await {
					warn!("sweep: replace of {} failed: {}", id, e);
				}
			}
		}
	}

	/// Force-kill whatever is left of the process and relaunch it under the
	/// same handle.
	async fn replace(&self, id: u64) -> Result<(), String> {
		{
			let mut processes = self.processes.write().await;
			let record = processes
				.get_mut(&id)
				.ok_or_else(|| format!("{}: no such process", id))?;

			if let Some(cancel) = record.cancel.take() {
				let _ = cancel.send(true);
			}
			if let Some(pid) = record.pid.take() {
				// the old listener reaps it once the kill lands
				if let Err(e) = send_signal(pid, nix::sys::signal::Signal::SIGKILL) {
					debug!("kill of pid {} during replace: {}", pid, e);
				}
			}

			let restarts = record.restarts + 1;
			let path = record.path.clone();
			let args = record.args.clone();
			*record = ManagedProcess::new(path, args, restarts);
		}
		self.start(id).await
	}

	/// Periodic supervision until the shutdown signal fires. The first
	/// sweep runs immediately, which is what launches freshly created
	/// records at daemon startup.
	pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
		let mut ticker = tokio::time::interval(self.config.sweep_interval);
		loop {
			tokio::select! {
				_ = ticker.tick() => self.sweep_once().await,
				_ = shutdown.changed() => {
					info!("supervisor sweep stopping");
					self.shutdown_listeners().await;
					return;
				}
			}
		}
	}

	/// Ask every agent to exit and release the listeners; each listener
	/// grants its child a short grace period before force-killing it.
	async fn shutdown_listeners(&self) {
		let mut processes = self.processes.write().await;
		for record in processes.values_mut() {
			if let Some(pid) = record.pid {
				let _ = send_signal(pid, nix::sys::signal::Signal::SIGTERM);
			}
			if let Some(cancel) = record.cancel.take() {
				let _ = cancel.send(true);
			}
		}
	}
}

/// Per-attempt output listener. Owns the child: every line refreshes the
/// heartbeat, EOF means the process exited, and either way the child is
/// reaped before the task ends. Writes are guarded by the attempt number so
/// a listener from a replaced attempt can never touch the fresh record.
async fn listen(
	registry: Arc<RwLock<HashMap<u64, ManagedProcess>>>,
	id: u64,
	attempt: u32,
	mut child: Child,
	stdout: ChildStdout,
	mut cancel: watch::Receiver<bool>,
) {
	let mut lines = BufReader::new(stdout).lines();

	loop {
		tokio::select! {
			line = lines.next_line() => match line {
				Ok(Some(_)) => {
					// anything the process prints counts as a heartbeat
					if !heartbeat(&registry, id, attempt).await {
						break;
					}
				}
				Ok(None) => {
					mark_stopped(&registry, id, attempt).await;
					let _ = child.wait().await;
					return;
				}
				Err(e) => {
					warn!("process {}: output read error: {}", id, e);
					mark_stopped(&registry, id, attempt).await;
					let _ = child.wait().await;
					return;
				}
			},
			_ = cancel.changed() => break,
		}
	}

	// cancelled or superseded: give the child a moment to exit on its own,
	// then force-kill, and reap it either way
	if tokio::time::timeout(Duration::from_secs(3), child.wait())
		.await
		.is_err()
	{
		let _ = child.kill().await;
	}
}

async fn heartbeat(
	registry: &Arc<RwLock<HashMap<u64, ManagedProcess>>>,
	id: u64,
	attempt: u32,
) -> bool {
	let mut processes = registry.write().await;
	match processes.get_mut(&id) {
		Some(record) if record.restarts == attempt => {
			record.state = ProcessState::Running;
			record.last_heartbeat = Utc::now();
			true
		}
		_ => false,
	}
}

async fn mark_stopped(
	registry: &Arc<RwLock<HashMap<u64, ManagedProcess>>>,
	id: u64,
	attempt: u32,
) {
	let mut processes = registry.write().await;
	if let Some(record) = processes.get_mut(&id) {
		if record.restarts == attempt {
			record.state = ProcessState::Stopped;
			record.pid = None;
		}
	}
}

fn send_signal(pid: u32, signal: nix::sys::signal::Signal) -> Result<(), String> {
	use nix::sys::signal::kill;
	use nix::unistd::Pid;
	kill(Pid::from_raw(pid as i32), signal).map_err(|e| e.to_string())
}
