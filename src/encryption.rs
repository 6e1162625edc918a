//! Per-remote encryption overlays and effective-remote resolution
//!
//! An overlay ("crypt remote") is a derived addressable identity layered on
//! a base remote; the external tool encrypts content and optionally names
//! transparently behind it. This module keeps the per-remote binding table
//! and decides, for every transfer side, whether to address the base
//! identity or the overlay.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::backend::TransferBackend;
use crate::error::{StateError, SyncError};
use crate::logging::*;
use crate::remote::Remote;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilenameEncryption {
	#[default]
	Standard,
	Obfuscate,
	Off,
}

impl FilenameEncryption {
	/// Value understood by the external tool's crypt backend
	pub fn config_value(&self) -> &'static str {
		match self {
			FilenameEncryption::Standard => "standard",
			FilenameEncryption::Obfuscate => "obfuscate",
			FilenameEncryption::Off => "off",
		}
	}
}

/// Per-remote record of a provisioned overlay.
///
/// Invariant: `active` implies `crypt_name` is present.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionBinding {
	/// Backend name of the base remote this overlay wraps
	pub base: String,
	pub crypt_name: Option<String>,
	pub active: bool,
	#[serde(default)]
	pub filename_mode: FilenameEncryption,
	#[serde(default = "default_true")]
	pub encrypt_folders: bool,
}

fn default_true() -> bool {
	true
}

/// Shared, persisted table of encryption bindings.
///
/// Read-mostly: mutated only on explicit user action (provision, toggle),
/// never concurrently for the same remote.
#[derive(Clone)]
pub struct EncryptionStore {
	bindings: Arc<Mutex<BTreeMap<String, EncryptionBinding>>>,
	path: Option<PathBuf>,
}

impl EncryptionStore {
	pub fn in_memory() -> Self {
		EncryptionStore { bindings: Arc::new(Mutex::new(BTreeMap::new())), path: None }
	}

	/// Open the binding table persisted under the state directory
	pub fn open(state_dir: &std::path::Path) -> Result<Self, StateError> {
		let path = state_dir.join("encryption.json");
		let bindings = if path.exists() {
			let contents = std::fs::read_to_string(&path)
				.map_err(|e| StateError::LoadFailed { source: Box::new(e) })?;
			serde_json::from_str(&contents).map_err(|e| StateError::Corrupted {
				message: format!("encryption bindings: {}", e),
			})?
		} else {
			BTreeMap::new()
		};
		Ok(EncryptionStore { bindings: Arc::new(Mutex::new(bindings)), path: Some(path) })
	}

	fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, EncryptionBinding>> {
		self.bindings.lock().unwrap_or_else(|e| e.into_inner())
	}

	fn save_locked(
		&self,
		bindings: &BTreeMap<String, EncryptionBinding>,
	) -> Result<(), StateError> {
		if let Some(path) = &self.path {
			let json = serde_json::to_string_pretty(bindings)
				.map_err(|e| StateError::SaveFailed { source: Box::new(e) })?;
			std::fs::write(path, json)
				.map_err(|e| StateError::SaveFailed { source: Box::new(e) })?;
		}
		Ok(())
	}

	pub fn binding(&self, base: &str) -> Option<EncryptionBinding> {
		self.lock().get(base).cloned()
	}

	pub fn is_provisioned(&self, base: &str) -> bool {
		self.lock().get(base).map(|b| b.crypt_name.is_some()).unwrap_or(false)
	}

	/// Resolve the remote a transfer side should actually address.
	///
	/// - `want_encrypted == false`, or a local remote: the base remote,
	///   unchanged. Idempotent and side-effect free.
	/// - `want_encrypted == true` without a provisioned overlay: a
	///   configuration error; callers must provision first. No backend
	///   calls are made.
	/// - overlay present: the same remote identity addressed through the
	///   overlay's backend name.
	pub fn resolve_effective(
		&self,
		remote: &Remote,
		want_encrypted: bool,
	) -> Result<Remote, SyncError> {
		if !want_encrypted || !remote.kind.supports_encryption() {
			return Ok(remote.clone());
		}
		let bindings = self.lock();
		let binding = bindings.get(remote.backend_name());
		match binding.and_then(|b| b.crypt_name.clone()) {
			Some(crypt_name) => {
				let mut effective = remote.clone();
				effective.custom_backend_name = Some(crypt_name);
				effective.encrypted = true;
				Ok(effective)
			}
			None => Err(SyncError::Configuration {
				message: format!(
					"encryption is not set up for remote '{}'; provision an overlay first",
					remote.name
				),
			}),
		}
	}

	/// Provision an overlay for `remote`, creating the crypt config entry in
	/// the external tool and recording the binding. Idempotent per remote:
	/// provisioning twice replaces the entry, it never creates a second one.
	pub async fn provision(
		&self,
		remote: &Remote,
		password: &str,
		salt: &str,
		filename_mode: FilenameEncryption,
		encrypt_folders: bool,
		backend: &dyn TransferBackend,
	) -> Result<EncryptionBinding, SyncError> {
		if !remote.kind.supports_encryption() {
			return Err(SyncError::Validation {
				message: format!("encryption is not applicable to '{}'", remote.name),
			});
		}
		let base = remote.backend_name().to_string();
		let crypt_name = remote.crypt_backend_name();
		let wrapped = format!("{}:", base);

		backend
			.provision_crypt(&crypt_name, &wrapped, password, salt, filename_mode, encrypt_folders)
			.await?;

		let binding = EncryptionBinding {
			base: base.clone(),
			crypt_name: Some(crypt_name),
			active: true,
			filename_mode,
			encrypt_folders,
		};
		let mut bindings = self.lock();
		bindings.insert(base.clone(), binding.clone());
		self.save_locked(&bindings)?;
		info!(remote = %remote.name, "encryption overlay provisioned");
		Ok(binding)
	}

	/// Persist the active toggle so reopening the remote reproduces the
	/// same effective view. Activating without a provisioned overlay fails.
	pub fn set_active(&self, base: &str, active: bool) -> Result<(), SyncError> {
		let mut bindings = self.lock();
		match bindings.get_mut(base) {
			Some(binding) if binding.crypt_name.is_some() => {
				binding.active = active;
			}
			Some(_) | None if !active => {
				// deactivating an unprovisioned remote is a no-op
				return Ok(());
			}
			_ => {
				return Err(SyncError::Configuration {
					message: format!("no encryption overlay provisioned for '{}'", base),
				});
			}
		}
		self.save_locked(&bindings)?;
		Ok(())
	}

	/// Drop the overlay: remove the config entry and forget the binding
	pub async fn remove(
		&self,
		remote: &Remote,
		backend: &dyn TransferBackend,
	) -> Result<(), SyncError> {
		let base = remote.backend_name().to_string();
		let crypt_name = {
			let bindings = self.lock();
			bindings.get(&base).and_then(|b| b.crypt_name.clone())
		};
		if let Some(crypt_name) = crypt_name {
			backend.remove_config(&crypt_name).await?;
		}
		let mut bindings = self.lock();
		bindings.remove(&base);
		self.save_locked(&bindings)?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::remote::ProviderKind;

	fn cloud_remote() -> Remote {
		let mut remote = Remote::new("My Drive", ProviderKind::GoogleDrive);
		remote.is_configured = true;
		remote
	}

	#[test]
	fn test_resolve_plain_is_identity() {
		let store = EncryptionStore::in_memory();
		let remote = cloud_remote();
		for _ in 0..3 {
			let resolved = store.resolve_effective(&remote, false).unwrap();
			assert_eq!(resolved, remote);
		}
	}

	#[test]
	fn test_resolve_local_ignores_encryption_flag() {
		let store = EncryptionStore::in_memory();
		let local = Remote::local();
		let resolved = store.resolve_effective(&local, true).unwrap();
		assert_eq!(resolved, local);
	}

	#[test]
	fn test_resolve_unprovisioned_fails() {
		let store = EncryptionStore::in_memory();
		let remote = cloud_remote();
		match store.resolve_effective(&remote, true) {
			Err(SyncError::Configuration { .. }) => {}
			other => panic!("expected configuration error, got {:?}", other.map(|r| r.name)),
		}
	}

	#[test]
	fn test_resolve_provisioned_targets_overlay() {
		let store = EncryptionStore::in_memory();
		let remote = cloud_remote();
		store.lock().insert(
			remote.backend_name().to_string(),
			EncryptionBinding {
				base: remote.backend_name().to_string(),
				crypt_name: Some(remote.crypt_backend_name()),
				active: true,
				filename_mode: FilenameEncryption::Standard,
				encrypt_folders: true,
			},
		);
		let resolved = store.resolve_effective(&remote, true).unwrap();
		assert_eq!(resolved.backend_name(), "google-crypt");
		assert!(resolved.encrypted);
		// display identity and kind are unchanged
		assert_eq!(resolved.name, remote.name);
		assert_eq!(resolved.kind, remote.kind);
	}

	#[test]
	fn test_set_active_requires_overlay() {
		let store = EncryptionStore::in_memory();
		assert!(store.set_active("google", true).is_err());
		// turning encryption off never needs an overlay
		assert!(store.set_active("google", false).is_ok());
	}
}

// vim: ts=4
