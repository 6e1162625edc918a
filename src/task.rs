//! Transfer task model and its state machine
//!
//! A `SyncTask` is one unit of transfer work. It is created by the engine
//! the moment a transfer is initiated, mutated continuously while progress
//! events arrive, and frozen once it reaches a terminal state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SyncError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskKind {
	/// One-way copy of a selection
	Transfer,
	/// Bidirectional synchronization
	Sync,
	/// Scheduled backup run
	Backup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskState {
	Pending,
	Running,
	Paused,
	Completed,
	Failed,
	Cancelled,
}

impl TaskState {
	/// Terminal states accept no further transitions
	pub fn is_terminal(&self) -> bool {
		matches!(self, TaskState::Completed | TaskState::Failed | TaskState::Cancelled)
	}

	/// Legal edges of the task state machine:
	/// pending -> running -> {completed, failed, cancelled}, running <-> paused,
	/// paused -> cancelled.
	pub fn can_transition_to(&self, to: TaskState) -> bool {
		use TaskState::*;
		matches!(
			(self, to),
			(Pending, Running)
				| (Running, Paused)
				| (Running, Completed)
				| (Running, Failed)
				| (Running, Cancelled)
				| (Paused, Running)
				| (Paused, Cancelled)
		)
	}
}

/// One unit of transfer work
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncTask {
	pub id: Uuid,
	pub name: String,
	pub kind: TaskKind,
	pub source_remote: String,
	pub source_path: String,
	pub destination_remote: String,
	pub destination_path: String,
	#[serde(default)]
	pub encrypt_source: bool,
	#[serde(default)]
	pub encrypt_destination: bool,
	pub state: TaskState,
	/// Overall progress in [0, 1], monotone while running
	pub progress: f64,
	pub bytes_transferred: u64,
	pub total_bytes: u64,
	pub files_transferred: u64,
	pub total_files: u64,
	/// Entries skipped because they already existed at the destination
	#[serde(default)]
	pub skipped: u64,
	/// Formatted transfer rate as reported by the backend ("1.2 MiB/s")
	#[serde(default)]
	pub speed: String,
	/// Recommended parallelism hint, min of the two endpoints
	#[serde(default)]
	pub max_parallel_transfers: u32,
	pub created_at: DateTime<Utc>,
	pub started_at: Option<DateTime<Utc>>,
	pub completed_at: Option<DateTime<Utc>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error_message: Option<String>,
	/// Set when this run was triggered by a schedule
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub schedule_id: Option<Uuid>,
}

impl SyncTask {
	pub fn new(
		name: impl Into<String>,
		kind: TaskKind,
		source_remote: impl Into<String>,
		source_path: impl Into<String>,
		destination_remote: impl Into<String>,
		destination_path: impl Into<String>,
	) -> Self {
		SyncTask {
			id: Uuid::new_v4(),
			name: name.into(),
			kind,
			source_remote: source_remote.into(),
			source_path: source_path.into(),
			destination_remote: destination_remote.into(),
			destination_path: destination_path.into(),
			encrypt_source: false,
			encrypt_destination: false,
			state: TaskState::Pending,
			progress: 0.0,
			bytes_transferred: 0,
			total_bytes: 0,
			files_transferred: 0,
			total_files: 0,
			skipped: 0,
			speed: String::new(),
			max_parallel_transfers: 0,
			created_at: Utc::now(),
			started_at: None,
			completed_at: None,
			error_message: None,
			schedule_id: None,
		}
	}

	/// Checked state transition. Illegal edges are rejected so a terminal
	/// task can never be revived.
	pub fn transition(&mut self, to: TaskState) -> Result<(), SyncError> {
		if !self.state.can_transition_to(to) {
			return Err(SyncError::Validation {
				message: format!("illegal task transition {:?} -> {:?}", self.state, to),
			});
		}
		self.state = to;
		Ok(())
	}

	pub fn start(&mut self) -> Result<(), SyncError> {
		self.transition(TaskState::Running)?;
		if self.started_at.is_none() {
			self.started_at = Some(Utc::now());
		}
		Ok(())
	}

	pub fn pause(&mut self) -> Result<(), SyncError> {
		self.transition(TaskState::Paused)
	}

	pub fn resume(&mut self) -> Result<(), SyncError> {
		if self.state != TaskState::Paused {
			return Err(SyncError::Validation {
				message: format!("cannot resume task in state {:?}", self.state),
			});
		}
		self.transition(TaskState::Running)
	}

	pub fn complete(&mut self) -> Result<(), SyncError> {
		self.transition(TaskState::Completed)?;
		self.completed_at = Some(Utc::now());
		self.progress = 1.0;
		self.files_transferred = self.total_files;
		self.bytes_transferred = self.total_bytes;
		self.speed.clear();
		Ok(())
	}

	pub fn fail(&mut self, message: impl Into<String>) -> Result<(), SyncError> {
		self.transition(TaskState::Failed)?;
		self.completed_at = Some(Utc::now());
		self.error_message = Some(message.into());
		self.speed.clear();
		Ok(())
	}

	pub fn cancel(&mut self) -> Result<(), SyncError> {
		self.transition(TaskState::Cancelled)?;
		self.completed_at = Some(Utc::now());
		self.speed.clear();
		Ok(())
	}

	/// Fold a progress fraction into the task. Progress never moves
	/// backwards while running; a late or reordered report is dropped.
	pub fn update_progress(&mut self, fraction: f64) {
		if self.state != TaskState::Running {
			return;
		}
		let clamped = fraction.clamp(0.0, 1.0);
		if clamped > self.progress {
			self.progress = clamped;
		}
	}

	pub fn duration_secs(&self) -> Option<i64> {
		let start = self.started_at?;
		let end = self.completed_at.unwrap_or_else(Utc::now);
		Some((end - start).num_seconds())
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
	Info,
	Warning,
	Error,
	Debug,
}

/// Append-only log line attached to a task
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskLog {
	pub id: Uuid,
	pub task_id: Uuid,
	pub timestamp: DateTime<Utc>,
	pub level: LogLevel,
	pub message: String,
}

impl TaskLog {
	pub fn new(task_id: Uuid, level: LogLevel, message: impl Into<String>) -> Self {
		TaskLog {
			id: Uuid::new_v4(),
			task_id,
			timestamp: Utc::now(),
			level,
			message: message.into(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn task() -> SyncTask {
		SyncTask::new("photos", TaskKind::Transfer, "Local Storage", "/tmp/photos", "My Drive", "/backup")
	}

	#[test]
	fn test_new_task_is_pending() {
		let t = task();
		assert_eq!(t.state, TaskState::Pending);
		assert_eq!(t.progress, 0.0);
		assert!(t.started_at.is_none());
	}

	#[test]
	fn test_full_lifecycle() {
		let mut t = task();
		t.start().unwrap();
		assert_eq!(t.state, TaskState::Running);
		assert!(t.started_at.is_some());

		t.pause().unwrap();
		assert_eq!(t.state, TaskState::Paused);
		t.resume().unwrap();
		assert_eq!(t.state, TaskState::Running);

		t.total_files = 3;
		t.total_bytes = 300;
		t.complete().unwrap();
		assert_eq!(t.state, TaskState::Completed);
		assert_eq!(t.progress, 1.0);
		assert_eq!(t.files_transferred, 3);
		assert_eq!(t.bytes_transferred, 300);
		assert!(t.completed_at.is_some());
	}

	#[test]
	fn test_terminal_states_are_frozen() {
		let mut t = task();
		t.start().unwrap();
		t.complete().unwrap();
		assert!(t.start().is_err());
		assert!(t.pause().is_err());
		assert!(t.cancel().is_err());
		assert_eq!(t.state, TaskState::Completed);
	}

	#[test]
	fn test_pending_cannot_complete_directly() {
		let mut t = task();
		assert!(t.complete().is_err());
		assert!(t.pause().is_err());
		assert_eq!(t.state, TaskState::Pending);
	}

	#[test]
	fn test_cancel_from_paused() {
		let mut t = task();
		t.start().unwrap();
		t.pause().unwrap();
		t.cancel().unwrap();
		assert_eq!(t.state, TaskState::Cancelled);
		assert!(t.completed_at.is_some());
	}

	#[test]
	fn test_progress_is_monotone_while_running() {
		let mut t = task();
		t.start().unwrap();
		t.update_progress(0.4);
		assert_eq!(t.progress, 0.4);
		// a stale report must not move progress backwards
		t.update_progress(0.25);
		assert_eq!(t.progress, 0.4);
		t.update_progress(1.5);
		assert_eq!(t.progress, 1.0);
	}

	#[test]
	fn test_progress_ignored_outside_running() {
		let mut t = task();
		t.update_progress(0.8);
		assert_eq!(t.progress, 0.0);
	}

	#[test]
	fn test_fail_records_message() {
		let mut t = task();
		t.start().unwrap();
		t.fail("quota exceeded").unwrap();
		assert_eq!(t.state, TaskState::Failed);
		assert_eq!(t.error_message.as_deref(), Some("quota exceeded"));
	}

	#[test]
	fn test_serde_defaults_for_older_records() {
		// history records written before the skip counter existed
		let json = r#"{
			"id": "6f7c9c64-51b2-4b75-b5a7-2ecb5a3cf0de",
			"name": "old",
			"kind": "transfer",
			"sourceRemote": "Local Storage",
			"sourcePath": "/tmp/a",
			"destinationRemote": "My Drive",
			"destinationPath": "/b",
			"state": "completed",
			"progress": 1.0,
			"bytesTransferred": 10,
			"totalBytes": 10,
			"filesTransferred": 1,
			"totalFiles": 1,
			"createdAt": "2026-01-10T08:00:00Z",
			"startedAt": "2026-01-10T08:00:01Z",
			"completedAt": "2026-01-10T08:00:05Z"
		}"#;
		let t: SyncTask = serde_json::from_str(json).expect("older record must deserialize");
		assert_eq!(t.skipped, 0);
		assert_eq!(t.max_parallel_transfers, 0);
		assert!(!t.encrypt_source);
		assert!(t.schedule_id.is_none());
	}
}

// vim: ts=4
