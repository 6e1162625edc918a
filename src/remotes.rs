//! Persisted registry of configured remotes

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use crate::error::{StateError, SyncError};
use crate::remote::Remote;
use crate::store::TaskStore;

/// Shared, persisted list of configured remotes.
///
/// Provider setup itself (credentials, OAuth) happens outside the core;
/// this registry only tracks the resulting endpoints.
#[derive(Clone)]
pub struct RemoteStore {
	remotes: Arc<Mutex<Vec<Remote>>>,
	path: Option<PathBuf>,
}

impl RemoteStore {
	pub fn in_memory() -> Self {
		RemoteStore { remotes: Arc::new(Mutex::new(Vec::new())), path: None }
	}

	pub fn open(state_dir: &std::path::Path) -> Result<Self, StateError> {
		let path = state_dir.join("remotes.json");
		let remotes = if path.exists() {
			let contents = std::fs::read_to_string(&path)
				.map_err(|e| StateError::LoadFailed { source: Box::new(e) })?;
			serde_json::from_str(&contents)
				.map_err(|e| StateError::Corrupted { message: format!("remotes: {}", e) })?
		} else {
			Vec::new()
		};
		Ok(RemoteStore { remotes: Arc::new(Mutex::new(remotes)), path: Some(path) })
	}

	fn lock(&self) -> MutexGuard<'_, Vec<Remote>> {
		self.remotes.lock().unwrap_or_else(|e| e.into_inner())
	}

	fn save(&self, remotes: &[Remote]) -> Result<(), StateError> {
		if let Some(path) = &self.path {
			let json = serde_json::to_string_pretty(remotes)
				.map_err(|e| StateError::SaveFailed { source: Box::new(e) })?;
			std::fs::write(path, json)
				.map_err(|e| StateError::SaveFailed { source: Box::new(e) })?;
		}
		Ok(())
	}

	pub fn list(&self) -> Vec<Remote> {
		let mut remotes = self.lock().clone();
		remotes.sort_by_key(|r| r.sort_order);
		remotes
	}

	pub fn find_by_name(&self, name: &str) -> Option<Remote> {
		self.lock().iter().find(|r| r.name == name).cloned()
	}

	pub fn add(&self, remote: Remote) -> Result<(), SyncError> {
		let mut remotes = self.lock();
		if remotes.iter().any(|r| r.name == remote.name) {
			return Err(SyncError::Validation {
				message: format!("a remote named '{}' already exists", remote.name),
			});
		}
		remotes.push(remote);
		self.save(&remotes)?;
		Ok(())
	}

	pub fn update(&self, remote: Remote) -> Result<(), SyncError> {
		let mut remotes = self.lock();
		match remotes.iter_mut().find(|r| r.id == remote.id) {
			Some(slot) => {
				*slot = remote;
				self.save(&remotes)?;
				Ok(())
			}
			None => Err(SyncError::Validation {
				message: format!("unknown remote '{}'", remote.name),
			}),
		}
	}

	/// Remove a remote. Refused while an active task still references it;
	/// archived tasks keep only frozen name strings and do not block.
	pub fn remove(&self, id: Uuid, tasks: &TaskStore) -> Result<(), SyncError> {
		let mut remotes = self.lock();
		let Some(index) = remotes.iter().position(|r| r.id == id) else {
			return Ok(());
		};
		if tasks.references_remote(&remotes[index].name) {
			return Err(SyncError::Validation {
				message: format!(
					"remote '{}' is used by an active task; cancel it first",
					remotes[index].name
				),
			});
		}
		remotes.remove(index);
		self.save(&remotes)?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::remote::ProviderKind;
	use crate::task::{SyncTask, TaskKind};

	#[test]
	fn test_add_rejects_duplicate_names() {
		let store = RemoteStore::in_memory();
		store.add(Remote::new("Drive", ProviderKind::GoogleDrive)).unwrap();
		assert!(store.add(Remote::new("Drive", ProviderKind::Dropbox)).is_err());
	}

	#[test]
	fn test_remove_blocked_by_active_task() {
		let remotes = RemoteStore::in_memory();
		let remote = Remote::new("Drive", ProviderKind::GoogleDrive);
		let id = remote.id;
		remotes.add(remote).unwrap();

		let tasks = TaskStore::in_memory();
		let mut task = SyncTask::new("t", TaskKind::Transfer, "Local Storage", "/a", "Drive", "/b");
		task.start().unwrap();
		tasks.insert(task.clone()).unwrap();

		assert!(remotes.remove(id, &tasks).is_err());

		task.complete().unwrap();
		tasks.update(&task);
		tasks.move_to_history(task.id).unwrap();
		assert!(remotes.remove(id, &tasks).is_ok());
		assert!(remotes.find_by_name("Drive").is_none());
	}
}

// vim: ts=4
