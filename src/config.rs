//! Unified configuration for skysync
//!
//! A single `Config` struct is the source of truth. Values follow a
//! priority chain:
//! 1. Built-in defaults (`Config::default()`)
//! 2. Config file (`<state_dir>/config.toml`)
//! 3. Environment variables (`SKYSYNC_*` prefix)
//! 4. CLI flags (highest priority, applied by the binary)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::StateError;
use crate::store::DEFAULT_HISTORY_LIMIT;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
	/// Home directory for skysync state (~/.skysync)
	pub state_dir: PathBuf,

	/// External sync tool binary; resolved via PATH when not absolute
	pub rclone_path: PathBuf,

	/// Override for the tool's config file; defaults to
	/// `<state_dir>/rclone.conf`
	pub rclone_config: Option<PathBuf>,

	/// Upload bandwidth cap in MB/s (no cap when unset)
	pub upload_limit_mbps: Option<f64>,

	/// Download bandwidth cap in MB/s
	pub download_limit_mbps: Option<f64>,

	/// Interval between progress reports from streaming transfers
	pub stats_interval_ms: u64,

	/// Completed tasks kept in history
	pub history_limit: usize,

	/// Seconds between scheduler due-checks
	pub scheduler_tick_secs: u64,
}

impl Default for Config {
	fn default() -> Self {
		Config {
			state_dir: std::env::var("HOME")
				.ok()
				.map(|h| PathBuf::from(h).join(".skysync"))
				.unwrap_or_else(|| PathBuf::from(".skysync")),
			rclone_path: PathBuf::from("rclone"),
			rclone_config: None,
			upload_limit_mbps: None,
			download_limit_mbps: None,
			stats_interval_ms: 500,
			history_limit: DEFAULT_HISTORY_LIMIT,
			scheduler_tick_secs: 60,
		}
	}
}

impl Config {
	/// Load the config following the priority chain (defaults, file, env)
	pub fn load() -> Result<Self, StateError> {
		let mut config = Config::default();
		if let Ok(dir) = std::env::var("SKYSYNC_STATE_DIR") {
			config.state_dir = PathBuf::from(dir);
		}
		let file = config.state_dir.join("config.toml");
		if file.exists() {
			config = Self::from_file(&file)?;
		}
		config.apply_env();
		Ok(config)
	}

	pub fn from_file(path: &Path) -> Result<Self, StateError> {
		let contents = std::fs::read_to_string(path)
			.map_err(|e| StateError::LoadFailed { source: Box::new(e) })?;
		toml::from_str(&contents)
			.map_err(|e| StateError::Corrupted { message: format!("config file: {}", e) })
	}

	fn apply_env(&mut self) {
		if let Ok(dir) = std::env::var("SKYSYNC_STATE_DIR") {
			self.state_dir = PathBuf::from(dir);
		}
		if let Ok(path) = std::env::var("SKYSYNC_RCLONE_PATH") {
			self.rclone_path = PathBuf::from(path);
		}
		if let Ok(limit) = std::env::var("SKYSYNC_BWLIMIT_MBPS") {
			if let Ok(mbps) = limit.parse() {
				self.upload_limit_mbps = Some(mbps);
				self.download_limit_mbps = Some(mbps);
			}
		}
	}

	pub fn rclone_config_path(&self) -> PathBuf {
		self.rclone_config.clone().unwrap_or_else(|| self.state_dir.join("rclone.conf"))
	}

	/// Create the state directory if needed and verify it is usable
	pub fn ensure_state_dir(&self) -> Result<(), StateError> {
		match std::fs::metadata(&self.state_dir) {
			Ok(meta) if meta.is_dir() => Ok(()),
			Ok(_) => Err(StateError::InvalidDirectory {
				path: self.state_dir.display().to_string(),
			}),
			Err(_) => std::fs::create_dir_all(&self.state_dir)
				.map_err(|e| StateError::SaveFailed { source: Box::new(e) }),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_config_default() {
		let config = Config::default();
		assert_eq!(config.stats_interval_ms, 500);
		assert_eq!(config.history_limit, DEFAULT_HISTORY_LIMIT);
		assert_eq!(config.scheduler_tick_secs, 60);
		assert!(config.upload_limit_mbps.is_none());
	}

	#[test]
	fn test_rclone_config_path_defaults_into_state_dir() {
		let mut config = Config::default();
		config.state_dir = PathBuf::from("/tmp/skysync-test");
		assert_eq!(config.rclone_config_path(), PathBuf::from("/tmp/skysync-test/rclone.conf"));
		config.rclone_config = Some(PathBuf::from("/etc/rclone.conf"));
		assert_eq!(config.rclone_config_path(), PathBuf::from("/etc/rclone.conf"));
	}

	#[test]
	fn test_config_file_round_trip() {
		let dir = tempfile::TempDir::new().unwrap();
		let path = dir.path().join("config.toml");
		std::fs::write(
			&path,
			"stateDir = \"/tmp/sky\"\nstatsIntervalMs = 250\nuploadLimitMbps = 2.5\n",
		)
		.unwrap();
		let config = Config::from_file(&path).unwrap();
		assert_eq!(config.state_dir, PathBuf::from("/tmp/sky"));
		assert_eq!(config.stats_interval_ms, 250);
		assert_eq!(config.upload_limit_mbps, Some(2.5));
		// unspecified fields keep their defaults
		assert_eq!(config.history_limit, DEFAULT_HISTORY_LIMIT);
	}
}

// vim: ts=4
