//! Error types for skysync operations

use std::error::Error;
use std::fmt;
use std::io;

/// Main error type for transfer orchestration
#[derive(Debug)]
pub enum SyncError {
	/// A remote or its encryption overlay is not set up yet.
	/// User-actionable: finish configuration and re-trigger.
	Configuration { message: String },

	/// The external sync tool failed (nested, classified)
	Backend(BackendError),

	/// Operation cancelled by the user (not a failure)
	Cancelled,

	/// Invalid task or schedule definition
	Validation { message: String },

	/// Persisted state could not be loaded or saved (nested)
	State(StateError),

	/// I/O error
	Io(io::Error),
}

impl fmt::Display for SyncError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SyncError::Configuration { message } => {
				write!(f, "Configuration required: {}", message)
			}
			SyncError::Backend(e) => write!(f, "Backend error: {}", e),
			SyncError::Cancelled => write!(f, "Operation cancelled by user"),
			SyncError::Validation { message } => {
				write!(f, "Invalid definition: {}", message)
			}
			SyncError::State(e) => write!(f, "State error: {}", e),
			SyncError::Io(e) => write!(f, "I/O error: {}", e),
		}
	}
}

impl Error for SyncError {}

impl From<io::Error> for SyncError {
	fn from(e: io::Error) -> Self {
		SyncError::Io(e)
	}
}

impl From<BackendError> for SyncError {
	fn from(e: BackendError) -> Self {
		SyncError::Backend(e)
	}
}

impl From<StateError> for SyncError {
	fn from(e: StateError) -> Self {
		SyncError::State(e)
	}
}

/// Advisory classification of a backend failure.
///
/// Used only to choose user-facing phrasing and skip-vs-abort behavior in
/// the transfer loop. Never consulted for automatic retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
	/// Destination entry already exists; callers treat this as a skip
	AlreadyExists,
	/// Source path does not exist on the remote
	NotFound,
	/// The remote rejected the operation
	PermissionDenied,
	/// Anything else
	Unknown,
}

/// Failure reported by the external sync tool subprocess
#[derive(Debug, Clone)]
pub struct BackendError {
	pub kind: BackendErrorKind,
	pub message: String,
}

impl BackendError {
	pub fn new(kind: BackendErrorKind, message: impl Into<String>) -> Self {
		BackendError { kind, message: message.into() }
	}

	/// Classify raw subprocess output into an advisory error kind
	pub fn classify(output: &str) -> BackendErrorKind {
		let lower = output.to_lowercase();
		if lower.contains("already exists")
			|| lower.contains("there was nothing to transfer")
			|| lower.contains("unchanged skipping")
		{
			BackendErrorKind::AlreadyExists
		} else if lower.contains("not found")
			|| lower.contains("no such file")
			|| lower.contains("doesn't exist")
		{
			BackendErrorKind::NotFound
		} else if lower.contains("permission denied")
			|| lower.contains("access denied")
			|| lower.contains("insufficient permission")
			|| lower.contains("403")
		{
			BackendErrorKind::PermissionDenied
		} else {
			BackendErrorKind::Unknown
		}
	}

	/// Build an error from raw output, keeping only a short summary line.
	/// Raw subprocess output is never surfaced to the user verbatim.
	pub fn from_output(output: &str) -> Self {
		let kind = Self::classify(output);
		let summary = output
			.lines()
			.map(str::trim)
			.find(|l| !l.is_empty())
			.unwrap_or("subprocess failed")
			.to_string();
		let message = if summary.chars().count() > 160 {
			let truncated: String = summary.chars().take(160).collect();
			format!("{}...", truncated)
		} else {
			summary
		};
		BackendError { kind, message }
	}

	pub fn spawn_failed(cmd: &str, source: io::Error) -> Self {
		BackendError {
			kind: BackendErrorKind::Unknown,
			message: format!("failed to spawn '{}': {}", cmd, source),
		}
	}
}

impl fmt::Display for BackendError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self.kind {
			BackendErrorKind::AlreadyExists => {
				write!(f, "already exists: {}", self.message)
			}
			BackendErrorKind::NotFound => write!(f, "not found: {}", self.message),
			BackendErrorKind::PermissionDenied => {
				write!(f, "permission denied: {}", self.message)
			}
			BackendErrorKind::Unknown => write!(f, "{}", self.message),
		}
	}
}

impl Error for BackendError {}

/// State persistence errors
#[derive(Debug)]
pub enum StateError {
	/// Failed to load persisted state
	LoadFailed { source: Box<dyn Error + Send + Sync> },

	/// Failed to save state
	SaveFailed { source: Box<dyn Error + Send + Sync> },

	/// State file is corrupted
	Corrupted { message: String },

	/// Invalid state directory
	InvalidDirectory { path: String },
}

impl fmt::Display for StateError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			StateError::LoadFailed { source } => write!(f, "Failed to load state: {}", source),
			StateError::SaveFailed { source } => write!(f, "Failed to save state: {}", source),
			StateError::Corrupted { message } => write!(f, "State corrupted: {}", message),
			StateError::InvalidDirectory { path } => {
				write!(f, "Invalid state directory: {}", path)
			}
		}
	}
}

impl Error for StateError {}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_classify_already_exists() {
		assert_eq!(
			BackendError::classify("ERROR: file.txt: already exists at destination"),
			BackendErrorKind::AlreadyExists
		);
		assert_eq!(
			BackendError::classify("NOTICE: There was nothing to transfer"),
			BackendErrorKind::AlreadyExists
		);
		assert_eq!(
			BackendError::classify("docs/a.txt: Unchanged skipping"),
			BackendErrorKind::AlreadyExists
		);
	}

	#[test]
	fn test_classify_not_found() {
		assert_eq!(
			BackendError::classify("ERROR: directory not found"),
			BackendErrorKind::NotFound
		);
	}

	#[test]
	fn test_classify_permission() {
		assert_eq!(
			BackendError::classify("ERROR: permission denied (403 Forbidden)"),
			BackendErrorKind::PermissionDenied
		);
	}

	#[test]
	fn test_classify_unknown() {
		assert_eq!(
			BackendError::classify("ERROR: couldn't connect: timeout"),
			BackendErrorKind::Unknown
		);
	}

	#[test]
	fn test_from_output_takes_first_line() {
		let err = BackendError::from_output("\nERROR: quota exceeded\nsecond line\n");
		assert_eq!(err.message, "ERROR: quota exceeded");
		assert_eq!(err.kind, BackendErrorKind::Unknown);
	}
}

// vim: ts=4
