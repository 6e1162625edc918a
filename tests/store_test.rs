//! Task store persistence tests - reopen, reconciliation, retention

use tempfile::TempDir;

use skysync::store::TaskStore;
use skysync::task::{LogLevel, SyncTask, TaskKind, TaskState};

fn task(name: &str) -> SyncTask {
	SyncTask::new(name, TaskKind::Transfer, "Local Storage", "/a", "My Drive", "/b")
}

#[test]
fn test_history_survives_reopen() {
	let dir = TempDir::new().unwrap();

	{
		let store = TaskStore::open(dir.path(), 100).unwrap();
		let mut t = task("backup");
		t.start().unwrap();
		store.insert(t.clone()).unwrap();
		t.complete().unwrap();
		store.update(&t);
		store.move_to_history(t.id).unwrap();
	}

	let reopened = TaskStore::open(dir.path(), 100).unwrap();
	let history = reopened.history();
	assert_eq!(history.len(), 1);
	assert_eq!(history[0].name, "backup");
	assert_eq!(history[0].state, TaskState::Completed);
	assert!(reopened.active().is_empty());
}

#[test]
fn test_interrupted_tasks_reconcile_to_failed() {
	let dir = TempDir::new().unwrap();

	{
		let store = TaskStore::open(dir.path(), 100).unwrap();
		let mut running = task("interrupted-run");
		running.start().unwrap();
		store.insert(running).unwrap();
		store.insert(task("never-started")).unwrap();
		// process "crashes" here: active tasks stay persisted as non-terminal
	}

	let reopened = TaskStore::open(dir.path(), 100).unwrap();
	assert!(reopened.active().is_empty(), "no task may dangle after a restart");
	let history = reopened.history();
	assert_eq!(history.len(), 2);
	for t in &history {
		assert_eq!(t.state, TaskState::Failed);
		let message = t.error_message.as_deref().unwrap_or_default();
		assert!(message.contains("restart"), "unexpected message: {}", message);
	}
}

#[test]
fn test_history_retention_prunes_oldest() {
	let dir = TempDir::new().unwrap();
	let store = TaskStore::open(dir.path(), 3).unwrap();

	for i in 0..5 {
		let mut t = task(&format!("run-{}", i));
		t.start().unwrap();
		store.insert(t.clone()).unwrap();
		store.log(t.id, LogLevel::Info, "started");
		t.complete().unwrap();
		store.update(&t);
		store.move_to_history(t.id).unwrap();
	}

	let history = store.history();
	assert_eq!(history.len(), 3);
	// newest first; run-0 and run-1 were pruned
	let names: Vec<_> = history.iter().map(|t| t.name.as_str()).collect();
	assert_eq!(names, vec!["run-4", "run-3", "run-2"]);

	// logs of pruned tasks are pruned with them
	let pruned = store.search_history(&Default::default());
	assert!(pruned.iter().all(|t| t.name != "run-0"));
}

#[test]
fn test_counters_reflect_current_active_set() {
	let store = TaskStore::in_memory();
	assert_eq!(store.running_count(), 0);
	assert_eq!(store.pending_count(), 0);

	let mut a = task("a");
	a.start().unwrap();
	store.insert(a.clone()).unwrap();
	store.insert(task("b")).unwrap();
	assert_eq!(store.running_count(), 1);
	assert_eq!(store.pending_count(), 1);

	a.complete().unwrap();
	store.update(&a);
	store.move_to_history(a.id).unwrap();
	assert_eq!(store.running_count(), 0);
	assert_eq!(store.pending_count(), 1);
}

#[tokio::test]
async fn test_watch_subscription_wakes_on_update() {
	let store = TaskStore::in_memory();
	let mut rx = store.subscribe();

	let writer = store.clone();
	let handle = tokio::spawn(async move {
		let mut t = task("observed");
		t.start().unwrap();
		writer.insert(t).unwrap();
	});

	tokio::time::timeout(std::time::Duration::from_secs(5), rx.changed())
		.await
		.expect("subscription must wake")
		.expect("store alive");
	handle.await.unwrap();
	assert_eq!(store.running_count(), 1);
}

// vim: ts=4
