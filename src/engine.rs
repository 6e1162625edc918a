//! Transfer orchestration engine
//!
//! Takes a file selection plus a resolved source/destination pair, creates a
//! task, drives the backend adapter, folds progress events into task
//! updates, and finalizes state. Each task is strictly sequential inside;
//! total throughput scales by running multiple independent tasks.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use uuid::Uuid;

use crate::backend::{remote_spec, ProgressEvent, TransferBackend};
use crate::encryption::EncryptionStore;
use crate::error::{BackendErrorKind, SyncError};
use crate::fsutil;
use crate::logging::*;
use crate::remote::Remote;
use crate::store::TaskStore;
use crate::task::{LogLevel, SyncTask, TaskKind};

/// One selected entry to transfer
#[derive(Debug, Clone)]
pub struct TransferItem {
	pub path: String,
	pub is_directory: bool,
	/// Known size in bytes; best-effort for cloud directories
	pub size: u64,
}

/// Everything needed to start one task
#[derive(Debug, Clone)]
pub struct TransferRequest {
	/// Pre-assigned task id, so callers can address the task immediately
	pub id: Uuid,
	pub name: Option<String>,
	pub kind: TaskKind,
	pub items: Vec<TransferItem>,
	pub source: Remote,
	pub source_path: String,
	pub destination: Remote,
	pub dest_path: String,
	pub encrypt_source: bool,
	pub encrypt_destination: bool,
	pub schedule_id: Option<Uuid>,
}

impl TransferRequest {
	pub fn new(
		items: Vec<TransferItem>,
		source: Remote,
		source_path: impl Into<String>,
		destination: Remote,
		dest_path: impl Into<String>,
	) -> Self {
		TransferRequest {
			id: Uuid::new_v4(),
			name: None,
			kind: TaskKind::Transfer,
			items,
			source,
			source_path: source_path.into(),
			destination,
			dest_path: dest_path.into(),
			encrypt_source: false,
			encrypt_destination: false,
			schedule_id: None,
		}
	}
}

/// Cooperative pause/cancel signals for one running task
struct TaskControl {
	cancelled: AtomicBool,
	paused: AtomicBool,
	notify: Notify,
}

impl TaskControl {
	fn new() -> Self {
		TaskControl {
			cancelled: AtomicBool::new(false),
			paused: AtomicBool::new(false),
			notify: Notify::new(),
		}
	}

	fn is_cancelled(&self) -> bool {
		self.cancelled.load(Ordering::SeqCst)
	}

	fn is_paused(&self) -> bool {
		self.paused.load(Ordering::SeqCst)
	}
}

enum EntryOutcome {
	Done,
	Cancelled,
}

/// The task orchestration engine.
///
/// Cheap to clone; clones share the same store, binding table and control
/// map, so one engine value is wired at startup and handed to whatever
/// needs to start or control tasks.
#[derive(Clone)]
pub struct TransferEngine {
	backend: Arc<dyn TransferBackend>,
	store: TaskStore,
	encryption: EncryptionStore,
	controls: Arc<Mutex<HashMap<Uuid, Arc<TaskControl>>>>,
}

impl TransferEngine {
	pub fn new(
		backend: Arc<dyn TransferBackend>,
		store: TaskStore,
		encryption: EncryptionStore,
	) -> Self {
		TransferEngine { backend, store, encryption, controls: Arc::new(Mutex::new(HashMap::new())) }
	}

	pub fn store(&self) -> &TaskStore {
		&self.store
	}

	pub fn encryption(&self) -> &EncryptionStore {
		&self.encryption
	}

	/// Request cancellation of a running or paused task. Cooperative: the
	/// in-flight subprocess is torn down, remaining entries never start.
	pub fn cancel(&self, id: Uuid) -> bool {
		let controls = self.controls.lock().unwrap_or_else(|e| e.into_inner());
		match controls.get(&id) {
			Some(control) => {
				control.cancelled.store(true, Ordering::SeqCst);
				control.notify.notify_one();
				true
			}
			None => false,
		}
	}

	/// Pause a running task. The subprocess for the active entry is
	/// terminated; resuming re-transfers that entry from the start.
	pub fn pause(&self, id: Uuid) -> bool {
		let controls = self.controls.lock().unwrap_or_else(|e| e.into_inner());
		match controls.get(&id) {
			Some(control) => {
				control.paused.store(true, Ordering::SeqCst);
				control.notify.notify_one();
				true
			}
			None => false,
		}
	}

	pub fn resume(&self, id: Uuid) -> bool {
		let controls = self.controls.lock().unwrap_or_else(|e| e.into_inner());
		match controls.get(&id) {
			Some(control) => {
				control.paused.store(false, Ordering::SeqCst);
				control.notify.notify_one();
				true
			}
			None => false,
		}
	}

	/// Fire-and-forget variant of [`execute`](Self::execute): drives the
	/// task on a background tokio task and returns its id immediately.
	pub fn spawn(&self, request: TransferRequest) -> Uuid {
		let id = request.id;
		let engine = self.clone();
		tokio::spawn(async move {
			if let Err(e) = engine.execute(request).await {
				warn!(error = %e, "transfer failed to start");
			}
		});
		id
	}

	/// Execute one transfer request to a terminal state.
	///
	/// Resolution and validation failures abort before any task exists or
	/// any subprocess starts; from task creation onwards every outcome
	/// (including per-entry failures) is recorded on the task itself and
	/// the call returns the task id.
	pub async fn execute(&self, request: TransferRequest) -> Result<Uuid, SyncError> {
		if request.items.is_empty() {
			return Err(SyncError::Validation { message: "nothing selected".to_string() });
		}

		// Resolve each side through the encryption bindings first; a task
		// may read from an encrypted remote and write to a plain one.
		let source = self.encryption.resolve_effective(&request.source, request.encrypt_source)?;
		let destination =
			self.encryption.resolve_effective(&request.destination, request.encrypt_destination)?;

		let source_spec = remote_spec(source.backend_name(), &request.source_path);
		let dest_spec = remote_spec(destination.backend_name(), &request.dest_path);
		if source_spec == dest_spec {
			return Err(SyncError::Validation {
				message: "source and destination are identical".to_string(),
			});
		}

		// Pre-compute aggregate totals. Local directories are walked for
		// exact numbers; cloud directories use the reported size, counting
		// as a single entry (exact counts would need listing calls).
		let mut entry_bytes: Vec<u64> = Vec::with_capacity(request.items.len());
		let mut entry_files: Vec<u64> = Vec::with_capacity(request.items.len());
		for item in &request.items {
			if item.is_directory && source.kind.is_local() {
				let (bytes, files) = fsutil::folder_size_and_count(Path::new(&item.path));
				entry_bytes.push(bytes);
				entry_files.push(files);
			} else {
				entry_bytes.push(item.size);
				entry_files.push(1);
			}
		}
		let total_bytes: u64 = entry_bytes.iter().sum();
		let total_files: u64 = entry_files.iter().sum();

		let name = request.name.clone().unwrap_or_else(|| match request.items.as_slice() {
			[only] => entry_name(&only.path).to_string(),
			items => format!("{} items", items.len()),
		});

		let mut task = SyncTask::new(
			name,
			request.kind,
			request.source.name.as_str(),
			request.source_path.as_str(),
			request.destination.name.as_str(),
			request.dest_path.as_str(),
		);
		task.id = request.id;
		task.encrypt_source = request.encrypt_source;
		task.encrypt_destination = request.encrypt_destination;
		task.total_bytes = total_bytes;
		task.total_files = total_files;
		task.schedule_id = request.schedule_id;
		// The conservative endpoint governs: exceeding either side's safe
		// concurrency risks provider-side throttling.
		task.max_parallel_transfers = source
			.kind
			.default_parallelism()
			.0
			.min(destination.kind.default_parallelism().0);
		task.start()?;

		// Persist before any I/O so a crash mid-transfer leaves a record
		self.store.insert(task.clone())?;
		let task_id = task.id;
		self.store.log(task_id, LogLevel::Info, "Task started");
		if task.encrypt_source {
			self.store.log(
				task_id,
				LogLevel::Info,
				format!("Source: reading through overlay {}", source.backend_name()),
			);
		}
		if task.encrypt_destination {
			self.store.log(
				task_id,
				LogLevel::Info,
				format!("Destination: writing through overlay {}", destination.backend_name()),
			);
		}

		let control = Arc::new(TaskControl::new());
		{
			let mut controls = self.controls.lock().unwrap_or_else(|e| e.into_inner());
			controls.insert(task_id, Arc::clone(&control));
		}

		let outcome = self
			.run_entries(
				&mut task,
				&request,
				&source,
				&destination,
				&entry_bytes,
				&entry_files,
				&control,
			)
			.await;

		{
			let mut controls = self.controls.lock().unwrap_or_else(|e| e.into_inner());
			controls.remove(&task_id);
		}

		match outcome {
			LoopOutcome::Cancelled => {
				task.cancel()?;
				self.store.log(task_id, LogLevel::Warning, "Task cancelled");
			}
			LoopOutcome::Finished { transferred, skipped, errors } => {
				task.skipped = skipped;
				if errors.is_empty() {
					task.complete()?;
					let message = if skipped > 0 {
						format!("{} transferred, {} skipped (already exist)", transferred, skipped)
					} else {
						"Task completed successfully".to_string()
					};
					self.store.log(task_id, LogLevel::Info, message);
				} else {
					let summary = errors.join("; ");
					task.fail(summary.clone())?;
					self.store.log(task_id, LogLevel::Error, summary);
				}
			}
		}
		self.store.update(&task);
		self.store.move_to_history(task_id)?;
		info!(task = %task.name, state = ?task.state, "task finished");
		Ok(task_id)
	}

	#[allow(clippy::too_many_arguments)]
	async fn run_entries(
		&self,
		task: &mut SyncTask,
		request: &TransferRequest,
		source: &Remote,
		destination: &Remote,
		entry_bytes: &[u64],
		entry_files: &[u64],
		control: &TaskControl,
	) -> LoopOutcome {
		let mut transferred = 0u64;
		let mut skipped = 0u64;
		let mut errors: Vec<String> = Vec::new();
		let mut bytes_done = 0u64;
		let mut files_done = 0u64;

		for (index, item) in request.items.iter().enumerate() {
			// cancellation and pause are observed between entries
			match self.obey_control(task, control).await {
				EntryOutcome::Cancelled => return LoopOutcome::Cancelled,
				EntryOutcome::Done => {}
			}

			let result = self
				.run_entry(
					task,
					request,
					source,
					destination,
					item,
					entry_bytes[index],
					bytes_done,
					files_done,
					control,
				)
				.await;

			match result {
				Ok(EntryOutcome::Cancelled) => return LoopOutcome::Cancelled,
				Ok(EntryOutcome::Done) => {
					transferred += 1;
					bytes_done += entry_bytes[index];
					files_done += entry_files[index];
					task.bytes_transferred = bytes_done.min(task.total_bytes);
					task.files_transferred = files_done.min(task.total_files);
				}
				Err(e) if e_kind(&e) == Some(BackendErrorKind::AlreadyExists) => {
					// a skip is not a failure; the batch continues
					skipped += 1;
					bytes_done += entry_bytes[index];
					files_done += entry_files[index];
					self.store.log(
						task.id,
						LogLevel::Warning,
						format!("{}: already exists, skipped", entry_name(&item.path)),
					);
				}
				Err(e) => {
					let message = format!("{}: {}", entry_name(&item.path), e);
					self.store.log(task.id, LogLevel::Error, message.clone());
					errors.push(message);
				}
			}

			if task.total_bytes > 0 {
				task.update_progress(bytes_done as f64 / task.total_bytes as f64);
			} else {
				task.update_progress((index + 1) as f64 / request.items.len() as f64);
			}
			self.store.update(task);
		}

		LoopOutcome::Finished { transferred, skipped, errors }
	}

	#[allow(clippy::too_many_arguments)]
	async fn run_entry(
		&self,
		task: &mut SyncTask,
		request: &TransferRequest,
		source: &Remote,
		destination: &Remote,
		item: &TransferItem,
		entry_size: u64,
		bytes_before: u64,
		files_before: u64,
		control: &TaskControl,
	) -> Result<EntryOutcome, SyncError> {
		// A selected directory is recreated under the destination; the
		// source root itself (schedule runs) maps directly onto it.
		let mut dest_path = request.dest_path.clone();
		if item.is_directory && item.path != request.source_path {
			dest_path = join_remote_path(&dest_path, entry_name(&item.path));
		}

		match (source.kind.is_local(), destination.kind.is_local()) {
			(true, false) => {
				self.stream_upload(
					task,
					item,
					entry_size,
					destination.backend_name(),
					&dest_path,
					bytes_before,
					files_before,
					control,
				)
				.await
			}
			(false, true) => {
				self.backend
					.download(source.backend_name(), &item.path, &dest_path)
					.await
					.map_err(SyncError::from)?;
				Ok(EntryOutcome::Done)
			}
			_ => {
				// cloud-to-cloud (and the degenerate local-to-local case)
				let source_spec = remote_spec(source.backend_name(), &item.path);
				if item.is_directory {
					let dest_spec = remote_spec(destination.backend_name(), &dest_path);
					self.backend.copy_between(&source_spec, &dest_spec).await?;
				} else {
					// single files target the exact destination path,
					// filename included
					let file_dest = join_remote_path(&dest_path, entry_name(&item.path));
					let dest_spec = remote_spec(destination.backend_name(), &file_dest);
					self.backend.copy_file_between(&source_spec, &dest_spec).await?;
				}
				Ok(EntryOutcome::Done)
			}
		}
	}

	#[allow(clippy::too_many_arguments)]
	async fn stream_upload(
		&self,
		task: &mut SyncTask,
		item: &TransferItem,
		entry_size: u64,
		dest_backend: &str,
		dest_path: &str,
		bytes_before: u64,
		files_before: u64,
		control: &TaskControl,
	) -> Result<EntryOutcome, SyncError> {
		// pause restarts the in-flight entry, hence the outer loop
		loop {
			match self.obey_control(task, control).await {
				EntryOutcome::Cancelled => return Ok(EntryOutcome::Cancelled),
				EntryOutcome::Done => {}
			}

			let mut stream = self
				.backend
				.upload_with_progress(
					&item.path,
					dest_backend,
					dest_path,
					task.max_parallel_transfers,
				)
				.await?;

			let mut interrupted = false;
			loop {
				tokio::select! {
					next = stream.next() => match next {
						Some(Ok(event)) => {
							self.fold_event(task, item, entry_size, &event, bytes_before, files_before);
							self.store.update(task);
						}
						Some(Err(e)) => return Err(e.into()),
						None => return Ok(EntryOutcome::Done),
					},
					_ = control.notify.notified() => {
						if control.is_cancelled() {
							// dropping the stream kills the subprocess
							return Ok(EntryOutcome::Cancelled);
						}
						if control.is_paused() {
							interrupted = true;
							break;
						}
					}
				}
			}
			drop(stream);
			if interrupted {
				match self.obey_control(task, control).await {
					EntryOutcome::Cancelled => return Ok(EntryOutcome::Cancelled),
					EntryOutcome::Done => {} // resumed; retry this entry
				}
			}
		}
	}

	/// Park while paused; return Cancelled if cancellation wins.
	async fn obey_control(&self, task: &mut SyncTask, control: &TaskControl) -> EntryOutcome {
		if control.is_cancelled() {
			return EntryOutcome::Cancelled;
		}
		if !control.is_paused() {
			return EntryOutcome::Done;
		}
		if task.pause().is_ok() {
			self.store.update(task);
			self.store.log(task.id, LogLevel::Info, "Task paused");
		}
		loop {
			control.notify.notified().await;
			if control.is_cancelled() {
				return EntryOutcome::Cancelled;
			}
			if !control.is_paused() {
				break;
			}
		}
		if task.resume().is_ok() {
			self.store.update(task);
			self.store.log(task.id, LogLevel::Info, "Task resumed");
		}
		EntryOutcome::Done
	}

	/// Fold one progress event into the task's live fields.
	///
	/// Directory transfers estimate files transferred from the percentage
	/// when the backend reports none; exact counts would require listing
	/// round-trips.
	#[allow(clippy::too_many_arguments)]
	fn fold_event(
		&self,
		task: &mut SyncTask,
		item: &TransferItem,
		entry_size: u64,
		event: &ProgressEvent,
		bytes_before: u64,
		files_before: u64,
	) {
		let fraction = (event.percentage / 100.0).clamp(0.0, 1.0);

		// backend-reported totals for directories refine our estimate,
		// but totals never shrink below what was already transferred
		if let Some(total) = event.total_bytes {
			let refined = bytes_before + total;
			if refined > task.total_bytes {
				task.total_bytes = refined;
			}
		}

		let entry_bytes = event
			.bytes_transferred
			.unwrap_or_else(|| (entry_size as f64 * fraction) as u64);
		task.bytes_transferred = (bytes_before + entry_bytes).min(task.total_bytes);

		if let Some(files) = event.files_transferred {
			task.files_transferred = (files_before + files).min(task.total_files);
		} else if item.is_directory && task.total_files > 1 {
			let estimated = (task.total_files as f64 * fraction) as u64;
			task.files_transferred = estimated.max(files_before).min(task.total_files);
		}

		if !event.speed.is_empty() {
			task.speed = event.speed.clone();
		}

		if task.total_bytes > 0 {
			task.update_progress(task.bytes_transferred as f64 / task.total_bytes as f64);
		} else {
			task.update_progress(fraction);
		}
	}
}

enum LoopOutcome {
	Cancelled,
	Finished { transferred: u64, skipped: u64, errors: Vec<String> },
}

fn e_kind(e: &SyncError) -> Option<BackendErrorKind> {
	match e {
		SyncError::Backend(b) => Some(b.kind),
		_ => None,
	}
}

/// Last path component, for task naming and destination mapping
fn entry_name(path: &str) -> &str {
	path.trim_end_matches('/').rsplit('/').next().unwrap_or(path)
}

fn join_remote_path(base: &str, name: &str) -> String {
	if base.is_empty() {
		name.to_string()
	} else {
		format!("{}/{}", base.trim_end_matches('/'), name)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_entry_name() {
		assert_eq!(entry_name("/home/user/photos"), "photos");
		assert_eq!(entry_name("/home/user/photos/"), "photos");
		assert_eq!(entry_name("file.txt"), "file.txt");
	}

	#[test]
	fn test_join_remote_path() {
		assert_eq!(join_remote_path("", "a.txt"), "a.txt");
		assert_eq!(join_remote_path("/backup", "a.txt"), "/backup/a.txt");
		assert_eq!(join_remote_path("/backup/", "a.txt"), "/backup/a.txt");
	}
}

// vim: ts=4
