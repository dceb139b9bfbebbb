use cirrus_core::ProcessState;
use cirrus_server::supervisor::{Supervisor, SupervisorConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

fn sh(script: &str) -> (PathBuf, Vec<String>) {
	(
		PathBuf::from("/bin/sh"),
		vec!["-c".to_string(), script.to_string()],
	)
}

fn test_supervisor(hang_ms: u64) -> Arc<Supervisor> {
	Supervisor::new(SupervisorConfig {
		sweep_interval: Duration::from_secs(60),
		hang_threshold: Duration::from_millis(hang_ms),
	})
}

// --- State predicates ---

#[test]
fn process_state_is_running() {
	assert!(ProcessState::Running.is_running());
	assert!(!ProcessState::Launching.is_running());
	assert!(!ProcessState::Stopped.is_running());
	assert!(!ProcessState::Unknown.is_running());
}

// --- Handles ---

#[tokio::test]
async fn handles_are_never_reused() {
	let sup = test_supervisor(60_000);
	let (path, args) = sh("sleep 60");

	let a = sup.create(path.clone(), args.clone()).await;
	let b = sup.create(path.clone(), args.clone()).await;
	assert_ne!(a, b);

	sup.start(b).await.unwrap();
	tokio::time::sleep(Duration::from_millis(100)).await;
	sup.stop(b).await.unwrap();

	let c = sup.create(path, args).await;
	assert!(c > b);

	let ids: Vec<u64> = sup.list().await.iter().map(|p| p.id).collect();
	assert_eq!(ids, vec![a, c]);
}

// --- Launch lifecycle ---

#[tokio::test]
async fn create_is_started_by_the_sweep() {
	let sup = test_supervisor(60_000);
	let (path, args) = sh("while true; do echo tick; sleep 0.1; done");
	let id = sup.create(path, args).await;

	let procs = sup.list().await;
	assert_eq!(procs[0].state, ProcessState::Launching);
	assert_eq!(procs[0].pid, None);

	sup.sweep_once().await;
	tokio::time::sleep(Duration::from_millis(300)).await;

	let procs = sup.list().await;
	assert_eq!(procs[0].state, ProcessState::Running);
	assert!(procs[0].pid.is_some());

	let _ = sup.stop(id).await;
}

#[tokio::test]
async fn output_refreshes_the_heartbeat() {
	let sup = test_supervisor(60_000);
	let (path, args) = sh("while true; do echo tick; sleep 0.1; done");
	let id = sup.create(path, args).await;
	sup.sweep_once().await;
	tokio::time::sleep(Duration::from_millis(500)).await;

	let procs = sup.list().await;
	assert_eq!(procs[0].state, ProcessState::Running);
	let age = chrono::Utc::now().signed_duration_since(procs[0].last_heartbeat);
	assert!(age.num_milliseconds() < 1_000, "heartbeat was {}ms old", age.num_milliseconds());

	let _ = sup.stop(id).await;
}

// --- Replacement ---

#[tokio::test]
async fn exited_process_is_replaced_by_the_sweep() {
	let sup = test_supervisor(60_000);
	let (path, args) = sh("echo once");
	let id = sup.create(path, args).await;

	sup.sweep_once().await;
	tokio::time::sleep(Duration::from_millis(300)).await;
	assert_eq!(sup.list().await[0].state, ProcessState::Stopped);

	sup.sweep_once().await;
	let procs = sup.list().await;
	assert_eq!(procs[0].id, id);
	assert_eq!(procs[0].restarts, 1);
}

#[tokio::test]
async fn hung_process_is_replaced() {
	let sup = test_supervisor(500);
	let (path, args) = sh("echo hello; sleep 60");
	let id = sup.create(path, args).await;

	sup.sweep_once().await;
	tokio::time::sleep(Duration::from_millis(200)).await;
	assert_eq!(sup.list().await[0].state, ProcessState::Running);

	// no further output; wait out the hang threshold
	tokio::time::sleep(Duration::from_millis(700)).await;
	sup.sweep_once().await;

	let procs = sup.list().await;
	assert_eq!(procs[0].id, id);
	assert_eq!(procs[0].restarts, 1);

	let _ = sup.stop(id).await;
}

#[tokio::test]
async fn silent_process_is_replaced_after_the_hang_threshold() {
	let sup = test_supervisor(300);
	// never produces output, so the heartbeat stays at launch time
	let (path, args) = sh("sleep 60");
	let id = sup.create(path, args).await;

	sup.sweep_once().await;
	tokio::time::sleep(Duration::from_millis(500)).await;
	sup.sweep_once().await;

	assert_eq!(sup.list().await[0].restarts, 1);
	let _ = sup.stop(id).await;
}

// --- Launch failures ---

#[tokio::test]
async fn spawn_failure_parks_the_record_in_unknown() {
	let sup = test_supervisor(60_000);
	sup.create(PathBuf::from("/nonexistent/agent"), vec![]).await;
	sup.sweep_once().await;

	let procs = sup.list().await;
	assert_eq!(procs[0].state, ProcessState::Unknown);
	assert!(procs[0]
		.last_error
		.as_deref()
		.unwrap_or("")
		.contains("failed to spawn"));
	assert_eq!(procs[0].pid, None);

	// a back-to-back sweep does not retry before the hang threshold
	sup.sweep_once().await;
	assert_eq!(sup.list().await[0].restarts, 0);
}

#[tokio::test]
async fn unknown_record_is_retried_once_stale() {
	let sup = test_supervisor(200);
	sup.create(PathBuf::from("/nonexistent/agent"), vec![]).await;
	sup.sweep_once().await;
	assert_eq!(sup.list().await[0].state, ProcessState::Unknown);

	tokio::time::sleep(Duration::from_millis(400)).await;
	sup.sweep_once().await;

	let procs = sup.list().await;
	assert_eq!(procs[0].restarts, 1);
	assert_eq!(procs[0].state, ProcessState::Unknown);
}

// --- Stop semantics ---

#[tokio::test]
async fn stop_removes_a_running_process() {
	let sup = test_supervisor(60_000);
	let (path, args) = sh("while true; do echo tick; sleep 0.1; done");
	let id = sup.start_by_path(path, args).await.unwrap();
	tokio::time::sleep(Duration::from_millis(200)).await;

	let msg = sup.stop(id).await.unwrap();
	assert!(msg.contains("stopped"));
	assert!(sup.list().await.is_empty());
}

#[tokio::test]
async fn stop_failure_leaves_the_record_for_the_sweep() {
	let sup = test_supervisor(60_000);
	let (path, args) = sh("echo done");
	let id = sup.start_by_path(path, args).await.unwrap();
	tokio::time::sleep(Duration::from_millis(300)).await;

	// the process exited on its own; there is nothing left to signal
	let result = sup.stop(id).await;
	assert!(result.is_err());

	let procs = sup.list().await;
	assert_eq!(procs.len(), 1);
	assert_eq!(procs[0].state, ProcessState::Stopped);
}

#[tokio::test]
async fn stop_of_unknown_handle_is_an_error() {
	let sup = test_supervisor(60_000);
	assert!(sup.stop(42).await.is_err());
}

// --- Sweep isolation ---

#[tokio::test]
async fn sweep_continues_past_a_broken_record() {
	let sup = test_supervisor(60_000);
	let bad = sup.create(PathBuf::from("/nonexistent/agent"), vec![]).await;
	let (path, args) = sh("while true; do echo tick; sleep 0.1; done");
	let good = sup.create(path, args).await;

	sup.sweep_once().await;
	tokio::time::sleep(Duration::from_millis(300)).await;

	let procs = sup.list().await;
	let bad_proc = procs.iter().find(|p| p.id == bad).unwrap();
	let good_proc = procs.iter().find(|p| p.id == good).unwrap();
	assert_eq!(bad_proc.state, ProcessState::Unknown);
	assert_eq!(good_proc.state, ProcessState::Running);

	let _ = sup.stop(good).await;
}
