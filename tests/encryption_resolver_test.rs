//! Encryption resolver tests - idempotence, provisioning, persistence

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use skysync::backend::{ProgressStream, RemoteFile, TransferBackend};
use skysync::encryption::{EncryptionStore, FilenameEncryption};
use skysync::error::{BackendError, SyncError};
use skysync::remote::{ProviderKind, Remote};

/// Backend double that only counts crypt provisioning calls; everything
/// else is unreachable in these tests.
#[derive(Default)]
struct CountingBackend {
	provisions: AtomicUsize,
	removals: AtomicUsize,
}

#[async_trait]
impl TransferBackend for CountingBackend {
	async fn upload(&self, _: &str, _: &str, _: &str) -> Result<(), BackendError> {
		unreachable!("resolver tests never transfer")
	}
	async fn upload_with_progress(
		&self,
		_: &str,
		_: &str,
		_: &str,
		_: u32,
	) -> Result<ProgressStream, BackendError> {
		unreachable!("resolver tests never transfer")
	}
	async fn download(&self, _: &str, _: &str, _: &str) -> Result<(), BackendError> {
		unreachable!()
	}
	async fn copy_between(&self, _: &str, _: &str) -> Result<(), BackendError> {
		unreachable!()
	}
	async fn copy_file_between(&self, _: &str, _: &str) -> Result<(), BackendError> {
		unreachable!()
	}
	async fn delete(&self, _: &str, _: &str, _: bool) -> Result<(), BackendError> {
		unreachable!()
	}
	async fn rename(&self, _: &str, _: &str, _: &str) -> Result<(), BackendError> {
		unreachable!()
	}
	async fn mkdir(&self, _: &str, _: &str) -> Result<(), BackendError> {
		unreachable!()
	}
	async fn list(&self, _: &str, _: &str) -> Result<Vec<RemoteFile>, BackendError> {
		unreachable!()
	}
	async fn provision_crypt(
		&self,
		_crypt_name: &str,
		_wrapped: &str,
		_password: &str,
		_salt: &str,
		_filename_mode: FilenameEncryption,
		_encrypt_folders: bool,
	) -> Result<(), BackendError> {
		self.provisions.fetch_add(1, Ordering::SeqCst);
		Ok(())
	}
	async fn remove_config(&self, _: &str) -> Result<(), BackendError> {
		self.removals.fetch_add(1, Ordering::SeqCst);
		Ok(())
	}
	fn is_configured(&self, _: &str) -> bool {
		true
	}
}

fn cloud_remote() -> Remote {
	let mut remote = Remote::new("My Drive", ProviderKind::GoogleDrive);
	remote.is_configured = true;
	remote
}

#[test]
fn test_plain_resolution_is_idempotent_and_side_effect_free() {
	let store = EncryptionStore::in_memory();
	let remote = cloud_remote();
	let first = store.resolve_effective(&remote, false).unwrap();
	let second = store.resolve_effective(&remote, false).unwrap();
	assert_eq!(first, second);
	assert_eq!(first, remote);
	assert!(!store.is_provisioned(remote.backend_name()));
}

#[test]
fn test_unprovisioned_encrypted_resolution_always_fails() {
	let store = EncryptionStore::in_memory();
	let remote = cloud_remote();
	for _ in 0..3 {
		match store.resolve_effective(&remote, true) {
			Err(SyncError::Configuration { .. }) => {}
			Err(other) => panic!("wrong error type: {}", other),
			Ok(_) => panic!("unprovisioned resolve must fail"),
		}
	}
}

#[tokio::test]
async fn test_provision_then_resolve_targets_overlay() {
	let backend = Arc::new(CountingBackend::default());
	let store = EncryptionStore::in_memory();
	let remote = cloud_remote();

	let binding = store
		.provision(&remote, "hunter2", "salt", FilenameEncryption::Standard, true, backend.as_ref())
		.await
		.unwrap();
	assert!(binding.active);
	assert_eq!(binding.crypt_name.as_deref(), Some("google-crypt"));
	assert_eq!(backend.provisions.load(Ordering::SeqCst), 1);

	let resolved = store.resolve_effective(&remote, true).unwrap();
	assert_eq!(resolved.backend_name(), "google-crypt");
	assert!(resolved.encrypted);
}

#[tokio::test]
async fn test_provisioning_twice_replaces_instead_of_duplicating() {
	let backend = Arc::new(CountingBackend::default());
	let store = EncryptionStore::in_memory();
	let remote = cloud_remote();

	store
		.provision(&remote, "one", "s1", FilenameEncryption::Standard, true, backend.as_ref())
		.await
		.unwrap();
	let binding = store
		.provision(&remote, "two", "s2", FilenameEncryption::Off, false, backend.as_ref())
		.await
		.unwrap();

	// still a single overlay, now with the new parameters
	assert_eq!(binding.crypt_name.as_deref(), Some("google-crypt"));
	assert_eq!(binding.filename_mode, FilenameEncryption::Off);
	assert!(!binding.encrypt_folders);
	let resolved = store.resolve_effective(&remote, true).unwrap();
	assert_eq!(resolved.backend_name(), "google-crypt");
}

#[tokio::test]
async fn test_local_remotes_never_get_overlays() {
	let backend = Arc::new(CountingBackend::default());
	let store = EncryptionStore::in_memory();
	let local = Remote::local();

	let result = store
		.provision(&local, "pw", "salt", FilenameEncryption::Standard, true, backend.as_ref())
		.await;
	assert!(matches!(result, Err(SyncError::Validation { .. })));
	assert_eq!(backend.provisions.load(Ordering::SeqCst), 0);

	// and resolving with the flag set just returns the base remote
	let resolved = store.resolve_effective(&local, true).unwrap();
	assert_eq!(resolved, local);
}

#[tokio::test]
async fn test_bindings_survive_reopen() {
	let dir = tempfile::TempDir::new().unwrap();
	let backend = Arc::new(CountingBackend::default());
	let remote = cloud_remote();

	{
		let store = EncryptionStore::open(dir.path()).unwrap();
		store
			.provision(&remote, "pw", "salt", FilenameEncryption::Standard, true, backend.as_ref())
			.await
			.unwrap();
	}

	let reopened = EncryptionStore::open(dir.path()).unwrap();
	assert!(reopened.is_provisioned(remote.backend_name()));
	let resolved = reopened.resolve_effective(&remote, true).unwrap();
	assert_eq!(resolved.backend_name(), "google-crypt");
}

#[tokio::test]
async fn test_active_toggle_persists() {
	let dir = tempfile::TempDir::new().unwrap();
	let backend = Arc::new(CountingBackend::default());
	let remote = cloud_remote();

	let store = EncryptionStore::open(dir.path()).unwrap();
	store
		.provision(&remote, "pw", "salt", FilenameEncryption::Standard, true, backend.as_ref())
		.await
		.unwrap();
	store.set_active(remote.backend_name(), false).unwrap();

	let reopened = EncryptionStore::open(dir.path()).unwrap();
	let binding = reopened.binding(remote.backend_name()).unwrap();
	assert!(!binding.active);
	assert!(binding.crypt_name.is_some());
}

// vim: ts=4
