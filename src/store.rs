//! Task store: active tasks, history, logs, and persistence
//!
//! The store is the single source of truth for task state. Active tasks are
//! mutated live while transfers run; terminal tasks migrate exactly once
//! into an append-only history that survives restarts. Aggregate counters
//! are computed by scanning, never maintained separately, so they cannot
//! drift.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use uuid::Uuid;

use crate::error::StateError;
use crate::logging::*;
use crate::task::{LogLevel, SyncTask, TaskLog, TaskState};

/// History records kept after pruning
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreData {
	active: Vec<SyncTask>,
	history: Vec<SyncTask>,
	logs: Vec<TaskLog>,
}

/// Filter for history queries
#[derive(Debug, Default, Clone)]
pub struct HistoryQuery {
	pub state: Option<TaskState>,
	/// Substring match over task name and remote names
	pub text: Option<String>,
	pub completed_after: Option<chrono::DateTime<chrono::Utc>>,
	pub completed_before: Option<chrono::DateTime<chrono::Utc>>,
}

/// Shared handle to the task store
#[derive(Clone)]
pub struct TaskStore {
	data: Arc<Mutex<StoreData>>,
	path: Option<PathBuf>,
	history_limit: usize,
	revision: Arc<watch::Sender<u64>>,
}

impl TaskStore {
	pub fn in_memory() -> Self {
		let (tx, _) = watch::channel(0);
		TaskStore {
			data: Arc::new(Mutex::new(StoreData::default())),
			path: None,
			history_limit: DEFAULT_HISTORY_LIMIT,
			revision: Arc::new(tx),
		}
	}

	/// Open the store persisted under the state directory. Tasks that were
	/// non-terminal when the process last exited are reconciled to failed
	/// rather than left dangling.
	pub fn open(state_dir: &std::path::Path, history_limit: usize) -> Result<Self, StateError> {
		let path = state_dir.join("tasks.json");
		let mut data = if path.exists() {
			let contents = std::fs::read_to_string(&path)
				.map_err(|e| StateError::LoadFailed { source: Box::new(e) })?;
			serde_json::from_str(&contents)
				.map_err(|e| StateError::Corrupted { message: format!("task store: {}", e) })?
		} else {
			StoreData::default()
		};

		let interrupted: Vec<Uuid> = data.active.iter().map(|t| t.id).collect();
		for task in data.active.drain(..) {
			let mut task = task;
			if !task.state.is_terminal() {
				warn!(task = %task.name, "reconciling task interrupted by restart");
				// force the edge through Running so Pending records land too
				if task.state == TaskState::Pending || task.state == TaskState::Paused {
					let _ = task.transition(TaskState::Running);
				}
				let _ = task.fail("interrupted by application restart");
			}
			data.history.insert(0, task);
		}
		if !interrupted.is_empty() {
			data.history.truncate(history_limit);
		}

		let (tx, _) = watch::channel(0);
		let store = TaskStore {
			data: Arc::new(Mutex::new(data)),
			path: Some(path),
			history_limit,
			revision: Arc::new(tx),
		};
		if !interrupted.is_empty() {
			store.save(&store.lock())?;
		}
		Ok(store)
	}

	fn lock(&self) -> MutexGuard<'_, StoreData> {
		self.data.lock().unwrap_or_else(|e| e.into_inner())
	}

	fn save(&self, data: &StoreData) -> Result<(), StateError> {
		if let Some(path) = &self.path {
			let json = serde_json::to_string_pretty(data)
				.map_err(|e| StateError::SaveFailed { source: Box::new(e) })?;
			std::fs::write(path, json)
				.map_err(|e| StateError::SaveFailed { source: Box::new(e) })?;
		}
		Ok(())
	}

	fn bump(&self) {
		self.revision.send_modify(|rev| *rev += 1);
	}

	/// Observe store revisions without polling the lock. Every mutation
	/// bumps the revision; readers re-query on change.
	pub fn subscribe(&self) -> watch::Receiver<u64> {
		self.revision.subscribe()
	}

	/// Insert a task into the active collection and persist immediately,
	/// so a crash mid-transfer still leaves a record.
	pub fn insert(&self, task: SyncTask) -> Result<(), StateError> {
		let mut data = self.lock();
		data.active.push(task);
		self.save(&data)?;
		drop(data);
		self.bump();
		Ok(())
	}

	/// Replace the stored task with the given snapshot. Unknown ids are
	/// ignored (the task may have been archived concurrently).
	pub fn update(&self, task: &SyncTask) {
		let mut data = self.lock();
		if let Some(slot) = data.active.iter_mut().find(|t| t.id == task.id) {
			*slot = task.clone();
			let _ = self.save(&data);
			drop(data);
			self.bump();
		}
	}

	pub fn get(&self, id: Uuid) -> Option<SyncTask> {
		let data = self.lock();
		data.active
			.iter()
			.find(|t| t.id == id)
			.or_else(|| data.history.iter().find(|t| t.id == id))
			.cloned()
	}

	pub fn active(&self) -> Vec<SyncTask> {
		self.lock().active.clone()
	}

	pub fn history(&self) -> Vec<SyncTask> {
		self.lock().history.clone()
	}

	/// Move a terminal task from the active collection into history.
	/// Exactly-once: archiving an already-archived task is a no-op.
	pub fn move_to_history(&self, id: Uuid) -> Result<(), StateError> {
		let mut data = self.lock();
		let Some(index) = data.active.iter().position(|t| t.id == id) else {
			return Ok(());
		};
		let task = data.active.remove(index);
		data.history.insert(0, task);
		let limit = self.history_limit;
		if data.history.len() > limit {
			let drop_ids: Vec<Uuid> = data.history[limit..].iter().map(|t| t.id).collect();
			data.history.truncate(limit);
			data.logs.retain(|l| !drop_ids.contains(&l.task_id));
		}
		self.save(&data)?;
		drop(data);
		self.bump();
		Ok(())
	}

	/// Search history by state, text (name and remote names) and date range
	pub fn search_history(&self, query: &HistoryQuery) -> Vec<SyncTask> {
		let needle = query.text.as_deref().map(str::to_lowercase);
		self.lock()
			.history
			.iter()
			.filter(|t| query.state.map_or(true, |s| t.state == s))
			.filter(|t| {
				needle.as_deref().map_or(true, |n| {
					t.name.to_lowercase().contains(n)
						|| t.source_remote.to_lowercase().contains(n)
						|| t.destination_remote.to_lowercase().contains(n)
				})
			})
			.filter(|t| match t.completed_at {
				Some(at) => {
					query.completed_after.map_or(true, |a| at >= a)
						&& query.completed_before.map_or(true, |b| at <= b)
				}
				None => query.completed_after.is_none() && query.completed_before.is_none(),
			})
			.cloned()
			.collect()
	}

	pub fn clear_history(&self) -> Result<(), StateError> {
		let mut data = self.lock();
		data.history.clear();
		data.logs.clear();
		self.save(&data)?;
		drop(data);
		self.bump();
		Ok(())
	}

	// Counters are projections over the active collection, computed on
	// every call instead of being separately maintained state.

	pub fn running_count(&self) -> usize {
		self.lock().active.iter().filter(|t| t.state == TaskState::Running).count()
	}

	pub fn pending_count(&self) -> usize {
		self.lock().active.iter().filter(|t| t.state == TaskState::Pending).count()
	}

	pub fn log(&self, task_id: Uuid, level: LogLevel, message: impl Into<String>) {
		let entry = TaskLog::new(task_id, level, message);
		let mut data = self.lock();
		data.logs.push(entry);
		let _ = self.save(&data);
		drop(data);
		self.bump();
	}

	pub fn logs_for(&self, task_id: Uuid) -> Vec<TaskLog> {
		self.lock().logs.iter().filter(|l| l.task_id == task_id).cloned().collect()
	}

	/// Whether any active task references the given remote display name
	pub fn references_remote(&self, remote_name: &str) -> bool {
		self.lock()
			.active
			.iter()
			.any(|t| t.source_remote == remote_name || t.destination_remote == remote_name)
	}
}


// vim: ts=4
