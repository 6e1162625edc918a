//! Remote model: configured storage endpoints and their provider kinds
//!
//! A `Remote` is a value describing one configured endpoint (local disk or a
//! cloud provider account). Provider-specific behavior the core needs is
//! carried as data on the closed `ProviderKind` enumeration; everything else
//! about a provider (auth flows, credential forms) lives outside the core.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Closed enumeration of supported provider kinds.
///
/// Each variant carries the handful of behavior-affecting facts the
/// orchestration core needs (backend type string, recommended parallelism,
/// fast-list support, encryption applicability) as plain data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
	Local,
	ProtonDrive,
	GoogleDrive,
	Dropbox,
	OneDrive,
	S3,
	Mega,
	Box,
	PCloud,
	Webdav,
	Sftp,
	Ftp,
	Nextcloud,
	BackblazeB2,
	Wasabi,
	CloudflareR2,
	Storj,
	GoogleCloudStorage,
	AzureBlob,
	Jottacloud,
}

impl ProviderKind {
	pub fn display_name(&self) -> &'static str {
		match self {
			ProviderKind::Local => "Local Storage",
			ProviderKind::ProtonDrive => "Proton Drive",
			ProviderKind::GoogleDrive => "Google Drive",
			ProviderKind::Dropbox => "Dropbox",
			ProviderKind::OneDrive => "OneDrive",
			ProviderKind::S3 => "Amazon S3",
			ProviderKind::Mega => "MEGA",
			ProviderKind::Box => "Box",
			ProviderKind::PCloud => "pCloud",
			ProviderKind::Webdav => "WebDAV",
			ProviderKind::Sftp => "SFTP",
			ProviderKind::Ftp => "FTP",
			ProviderKind::Nextcloud => "Nextcloud",
			ProviderKind::BackblazeB2 => "Backblaze B2",
			ProviderKind::Wasabi => "Wasabi",
			ProviderKind::CloudflareR2 => "Cloudflare R2",
			ProviderKind::Storj => "Storj",
			ProviderKind::GoogleCloudStorage => "Google Cloud Storage",
			ProviderKind::AzureBlob => "Azure Blob Storage",
			ProviderKind::Jottacloud => "Jottacloud",
		}
	}

	/// Backend type string understood by the external sync tool
	pub fn backend_type(&self) -> &'static str {
		match self {
			ProviderKind::Local => "local",
			ProviderKind::ProtonDrive => "protondrive",
			ProviderKind::GoogleDrive => "drive",
			ProviderKind::Dropbox => "dropbox",
			ProviderKind::OneDrive => "onedrive",
			ProviderKind::S3
			| ProviderKind::Wasabi
			| ProviderKind::CloudflareR2 => "s3",
			ProviderKind::Mega => "mega",
			ProviderKind::Box => "box",
			ProviderKind::PCloud => "pcloud",
			ProviderKind::Webdav | ProviderKind::Nextcloud => "webdav",
			ProviderKind::Sftp => "sftp",
			ProviderKind::Ftp => "ftp",
			ProviderKind::BackblazeB2 => "b2",
			ProviderKind::Storj => "storj",
			ProviderKind::GoogleCloudStorage => "google cloud storage",
			ProviderKind::AzureBlob => "azureblob",
			ProviderKind::Jottacloud => "jottacloud",
		}
	}

	/// Default addressable config name for this kind
	pub fn default_backend_name(&self) -> &'static str {
		match self {
			ProviderKind::Local => "",
			ProviderKind::ProtonDrive => "proton",
			ProviderKind::GoogleDrive => "google",
			ProviderKind::Dropbox => "dropbox",
			ProviderKind::OneDrive => "onedrive",
			ProviderKind::S3 => "s3",
			ProviderKind::Mega => "mega",
			ProviderKind::Box => "box",
			ProviderKind::PCloud => "pcloud",
			ProviderKind::Webdav => "webdav",
			ProviderKind::Sftp => "sftp",
			ProviderKind::Ftp => "ftp",
			ProviderKind::Nextcloud => "nextcloud",
			ProviderKind::BackblazeB2 => "b2",
			ProviderKind::Wasabi => "wasabi",
			ProviderKind::CloudflareR2 => "r2",
			ProviderKind::Storj => "storj",
			ProviderKind::GoogleCloudStorage => "gcs",
			ProviderKind::AzureBlob => "azureblob",
			ProviderKind::Jottacloud => "jottacloud",
		}
	}

	/// Recommended `(transfers, checkers)` concurrency for this kind.
	///
	/// Object stores tolerate wide fan-out; rate-limited providers get
	/// conservative numbers. A task's effective parallelism hint is the
	/// minimum of its two endpoints (see the engine).
	pub fn default_parallelism(&self) -> (u32, u32) {
		match self {
			ProviderKind::GoogleDrive | ProviderKind::GoogleCloudStorage => (8, 16),
			ProviderKind::S3
			| ProviderKind::BackblazeB2
			| ProviderKind::Wasabi
			| ProviderKind::CloudflareR2
			| ProviderKind::Storj => (16, 32),
			ProviderKind::Local | ProviderKind::Sftp => (8, 16),
			// Proton throttles aggressively
			ProviderKind::ProtonDrive => (2, 4),
			ProviderKind::Dropbox
			| ProviderKind::OneDrive
			| ProviderKind::Box
			| ProviderKind::Mega
			| ProviderKind::Jottacloud => (4, 8),
			_ => (4, 16),
		}
	}

	/// Whether the external tool's `--fast-list` is worthwhile for this kind
	pub fn supports_fast_list(&self) -> bool {
		matches!(
			self,
			ProviderKind::GoogleDrive
				| ProviderKind::GoogleCloudStorage
				| ProviderKind::S3
				| ProviderKind::Dropbox
				| ProviderKind::Box
				| ProviderKind::OneDrive
				| ProviderKind::BackblazeB2
				| ProviderKind::Wasabi
				| ProviderKind::CloudflareR2
		)
	}

	/// Encryption overlays are defined only for cloud kinds
	pub fn supports_encryption(&self) -> bool {
		!self.is_local()
	}

	pub fn is_local(&self) -> bool {
		matches!(self, ProviderKind::Local)
	}
}

/// A configured storage endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Remote {
	pub id: Uuid,
	/// Display name shown to the user
	pub name: String,
	pub kind: ProviderKind,
	/// Whether setup completed and the endpoint is usable
	pub is_configured: bool,
	/// Whether the encryption overlay view is currently toggled on
	#[serde(default)]
	pub encrypted: bool,
	/// Overrides the kind's default addressable name when set
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub custom_backend_name: Option<String>,
	/// Email/username of the connected account, when known
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub account: Option<String>,
	#[serde(default)]
	pub sort_order: u32,
}

impl Remote {
	pub fn new(name: impl Into<String>, kind: ProviderKind) -> Self {
		Remote {
			id: Uuid::new_v4(),
			name: name.into(),
			kind,
			is_configured: false,
			encrypted: false,
			custom_backend_name: None,
			account: None,
			sort_order: 0,
		}
	}

	/// A ready-to-use local filesystem endpoint
	pub fn local() -> Self {
		let mut remote = Remote::new("Local Storage", ProviderKind::Local);
		remote.is_configured = true;
		remote
	}

	/// The name the backend adapter uses to address this endpoint.
	///
	/// Derived from the kind (or the custom override), never stored, so it
	/// cannot drift from the remote's identity. Local endpoints have no
	/// backend name; their paths are passed through verbatim.
	pub fn backend_name(&self) -> &str {
		match &self.custom_backend_name {
			Some(custom) if !custom.is_empty() => custom,
			_ => self.kind.default_backend_name(),
		}
	}

	/// Config name of the encryption overlay wrapping this remote
	pub fn crypt_backend_name(&self) -> String {
		format!("{}-crypt", self.backend_name())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_backend_name_derivation() {
		let remote = Remote::new("My Drive", ProviderKind::GoogleDrive);
		assert_eq!(remote.backend_name(), "google");
		assert_eq!(remote.crypt_backend_name(), "google-crypt");

		let mut custom = remote.clone();
		custom.custom_backend_name = Some("work-gdrive".to_string());
		assert_eq!(custom.backend_name(), "work-gdrive");
		assert_eq!(custom.crypt_backend_name(), "work-gdrive-crypt");
	}

	#[test]
	fn test_local_has_no_backend_name() {
		let local = Remote::local();
		assert!(local.is_configured);
		assert_eq!(local.backend_name(), "");
		assert!(!local.kind.supports_encryption());
	}

	#[test]
	fn test_parallelism_table() {
		assert_eq!(ProviderKind::ProtonDrive.default_parallelism(), (2, 4));
		assert_eq!(ProviderKind::S3.default_parallelism(), (16, 32));
		assert_eq!(ProviderKind::GoogleDrive.default_parallelism(), (8, 16));
		assert_eq!(ProviderKind::Webdav.default_parallelism(), (4, 16));
	}

	#[test]
	fn test_kind_serde_round_trip() {
		let json = serde_json::to_string(&ProviderKind::BackblazeB2).unwrap();
		assert_eq!(json, "\"backblaze-b2\"");
		let kind: ProviderKind = serde_json::from_str(&json).unwrap();
		assert_eq!(kind, ProviderKind::BackblazeB2);
	}
}

// vim: ts=4
