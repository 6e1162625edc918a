//! Transfer backend adapter: subprocess invocation of the external sync tool
//!
//! Translates logical operations (upload, download, copy-between-remotes,
//! delete, rename, mkdir) into subprocess invocations and normalizes their
//! output. Endpoints are addressed by name (`backend:path`); the mapping
//! from high-level remotes to names happens once, in the encryption
//! resolver, before this layer is invoked.
//!
//! The streaming upload is modelled as a cancellable, pull-based sequence:
//! a reader task owns the child process and feeds a channel, and dropping
//! the consumer side tears the subprocess down.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

use crate::config::Config;
use crate::encryption::FilenameEncryption;
use crate::error::{BackendError, BackendErrorKind};
use crate::logging::*;

/// How many trailing output lines are kept for error reporting
const ERROR_TAIL_LINES: usize = 24;

/// One reported snapshot of an in-flight streaming transfer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressEvent {
	/// Percentage in [0, 100] as reported by the tool
	pub percentage: f64,
	/// Formatted transfer rate ("234.5 KiB/s"), opaque to the core
	pub speed: String,
	pub bytes_transferred: Option<u64>,
	pub total_bytes: Option<u64>,
	pub files_transferred: Option<u64>,
	pub total_files: Option<u64>,
}

/// Lazy, single-pass sequence of progress events from a running subprocess.
///
/// Yields `Ok(event)` while the subprocess reports progress. The sequence
/// ends after `None` (exit 0) or after a single terminal `Err` (non-zero
/// exit, or an already-exists outcome). Dropping the stream stops the
/// reader task and kills the subprocess, so cancellation is simply
/// "stop pulling".
pub struct ProgressStream {
	rx: mpsc::Receiver<Result<ProgressEvent, BackendError>>,
	finished: bool,
}

impl ProgressStream {
	pub async fn next(&mut self) -> Option<Result<ProgressEvent, BackendError>> {
		if self.finished {
			return None;
		}
		match self.rx.recv().await {
			Some(Ok(event)) => Some(Ok(event)),
			Some(Err(e)) => {
				self.finished = true;
				Some(Err(e))
			}
			None => {
				self.finished = true;
				None
			}
		}
	}

	/// Build a stream fed by an arbitrary producer. The stream ends when the
	/// sender side closes; a terminal `Err` item ends it early.
	pub fn from_receiver(rx: mpsc::Receiver<Result<ProgressEvent, BackendError>>) -> Self {
		ProgressStream { rx, finished: false }
	}

	/// Build a stream from pre-recorded events and a terminal result.
	/// Used by backends that do not shell out (and by tests).
	pub fn from_events(events: Vec<ProgressEvent>, result: Result<(), BackendError>) -> Self {
		let (tx, rx) = mpsc::channel(events.len().max(1) + 1);
		for event in events {
			// capacity is sized above, send cannot fail here
			let _ = tx.try_send(Ok(event));
		}
		if let Err(e) = result {
			let _ = tx.try_send(Err(e));
		}
		ProgressStream { rx, finished: false }
	}
}

/// File entry reported by the external tool's JSON listing
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteFile {
	#[serde(rename = "Path")]
	pub path: String,
	#[serde(rename = "Name")]
	pub name: String,
	#[serde(rename = "Size")]
	pub size: i64,
	#[serde(rename = "MimeType", default)]
	pub mime_type: String,
	#[serde(rename = "ModTime", default)]
	pub mod_time: String,
	#[serde(rename = "IsDir")]
	pub is_dir: bool,
}

/// Build an addressable spec for the external tool.
/// Local endpoints (empty backend name) pass their paths through verbatim.
pub fn remote_spec(backend_name: &str, path: &str) -> String {
	if backend_name.is_empty() {
		path.to_string()
	} else {
		format!("{}:{}", backend_name, path)
	}
}

/// The engine's only seam towards the external tool.
///
/// All operations accept addressable names/specs, never `Remote` values,
/// keeping this layer ignorant of encryption and display concerns.
#[async_trait]
pub trait TransferBackend: Send + Sync {
	async fn upload(
		&self,
		local_path: &str,
		backend_name: &str,
		remote_path: &str,
	) -> Result<(), BackendError>;

	/// Streaming upload; `transfers` is the parallelism hint for this task
	async fn upload_with_progress(
		&self,
		local_path: &str,
		backend_name: &str,
		remote_path: &str,
		transfers: u32,
	) -> Result<ProgressStream, BackendError>;

	async fn download(
		&self,
		backend_name: &str,
		remote_path: &str,
		local_path: &str,
	) -> Result<(), BackendError>;

	/// Directory copy between two remotes, no local round-trip
	async fn copy_between(&self, source_spec: &str, dest_spec: &str) -> Result<(), BackendError>;

	/// Single-file copy targeting an exact destination path (filename included)
	async fn copy_file_between(
		&self,
		source_spec: &str,
		dest_spec: &str,
	) -> Result<(), BackendError>;

	async fn delete(
		&self,
		backend_name: &str,
		path: &str,
		is_directory: bool,
	) -> Result<(), BackendError>;

	async fn rename(
		&self,
		backend_name: &str,
		old_path: &str,
		new_path: &str,
	) -> Result<(), BackendError>;

	async fn mkdir(&self, backend_name: &str, path: &str) -> Result<(), BackendError>;

	async fn list(&self, backend_name: &str, path: &str) -> Result<Vec<RemoteFile>, BackendError>;

	/// Create the crypt config entry wrapping `wrapped` under `crypt_name`
	async fn provision_crypt(
		&self,
		crypt_name: &str,
		wrapped: &str,
		password: &str,
		salt: &str,
		filename_mode: FilenameEncryption,
		encrypt_folders: bool,
	) -> Result<(), BackendError>;

	async fn remove_config(&self, name: &str) -> Result<(), BackendError>;

	fn is_configured(&self, name: &str) -> bool;
}

/// Concrete adapter shelling out to rclone
pub struct RcloneBackend {
	binary: PathBuf,
	config_path: PathBuf,
	upload_limit_mbps: Option<f64>,
	download_limit_mbps: Option<f64>,
	stats_interval_ms: u64,
}

impl RcloneBackend {
	pub fn new(config: &Config) -> Self {
		RcloneBackend {
			binary: config.rclone_path.clone(),
			config_path: config.rclone_config_path(),
			upload_limit_mbps: config.upload_limit_mbps,
			download_limit_mbps: config.download_limit_mbps,
			stats_interval_ms: config.stats_interval_ms,
		}
	}

	fn bandwidth_args(&self) -> Vec<String> {
		// The tool has a single throttle for both directions; the more
		// restrictive configured limit governs.
		let limit = match (self.upload_limit_mbps, self.download_limit_mbps) {
			(Some(u), Some(d)) => Some(u.min(d)),
			(Some(u), None) => Some(u),
			(None, Some(d)) => Some(d),
			(None, None) => None,
		};
		match limit {
			Some(mbps) if mbps > 0.0 => vec!["--bwlimit".to_string(), format!("{}M", mbps)],
			_ => vec![],
		}
	}

	fn command(&self, args: &[String]) -> Command {
		let mut cmd = Command::new(&self.binary);
		cmd.args(args)
			.arg("--config")
			.arg(&self.config_path)
			.stdin(Stdio::null())
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.kill_on_drop(true);
		cmd
	}

	/// Run a point-in-time operation to completion
	async fn run(&self, args: Vec<String>) -> Result<String, BackendError> {
		debug!(?args, "running sync tool");
		let output = self
			.command(&args)
			.output()
			.await
			.map_err(|e| BackendError::spawn_failed(&self.binary.to_string_lossy(), e))?;
		let stdout = String::from_utf8_lossy(&output.stdout).to_string();
		let stderr = String::from_utf8_lossy(&output.stderr).to_string();
		if !output.status.success() {
			let text = if stderr.trim().is_empty() { &stdout } else { &stderr };
			return Err(BackendError::from_output(text));
		}
		Ok(stdout)
	}

	/// Like `run`, but a "nothing to transfer" outcome is surfaced as an
	/// already-exists error so the transfer loop can count it as a skip.
	async fn run_transfer(&self, args: Vec<String>) -> Result<(), BackendError> {
		let output = self
			.command(&args)
			.output()
			.await
			.map_err(|e| BackendError::spawn_failed(&self.binary.to_string_lossy(), e))?;
		let combined = format!(
			"{}{}",
			String::from_utf8_lossy(&output.stdout),
			String::from_utf8_lossy(&output.stderr)
		);
		if output.status.success() {
			if BackendError::classify(&combined) == BackendErrorKind::AlreadyExists {
				return Err(BackendError::new(
					BackendErrorKind::AlreadyExists,
					"already exists at destination",
				));
			}
			return Ok(());
		}
		Err(BackendError::from_output(&combined))
	}

	/// Obscure a secret the way the tool's config store requires
	pub async fn obscure(&self, secret: &str) -> Result<String, BackendError> {
		let out = self.run(vec!["obscure".to_string(), secret.to_string()]).await?;
		Ok(out.trim().to_string())
	}
}

#[async_trait]
impl TransferBackend for RcloneBackend {
	async fn upload(
		&self,
		local_path: &str,
		backend_name: &str,
		remote_path: &str,
	) -> Result<(), BackendError> {
		let mut args = vec![
			"copy".to_string(),
			local_path.to_string(),
			remote_spec(backend_name, remote_path),
			"--verbose".to_string(),
		];
		args.extend(self.bandwidth_args());
		self.run_transfer(args).await
	}

	async fn upload_with_progress(
		&self,
		local_path: &str,
		backend_name: &str,
		remote_path: &str,
		transfers: u32,
	) -> Result<ProgressStream, BackendError> {
		let mut args = vec![
			"copy".to_string(),
			local_path.to_string(),
			remote_spec(backend_name, remote_path),
			"--progress".to_string(),
			"--stats".to_string(),
			format!("{}ms", self.stats_interval_ms),
			"--stats-one-line".to_string(),
			"--stats-file-name-length".to_string(),
			"0".to_string(),
			"--transfers".to_string(),
			transfers.max(1).to_string(),
			"-v".to_string(),
		];
		args.extend(self.bandwidth_args());

		info!(local = local_path, dest = %remote_spec(backend_name, remote_path), "starting streaming upload");
		let mut child = self
			.command(&args)
			.spawn()
			.map_err(|e| BackendError::spawn_failed(&self.binary.to_string_lossy(), e))?;
		let stdout = child.stdout.take().ok_or_else(|| {
			BackendError::new(BackendErrorKind::Unknown, "subprocess stdout unavailable")
		})?;
		let stderr = child.stderr.take().ok_or_else(|| {
			BackendError::new(BackendErrorKind::Unknown, "subprocess stderr unavailable")
		})?;

		let (tx, rx) = mpsc::channel(64);
		tokio::spawn(async move {
			let mut out_lines = BufReader::new(stdout).lines();
			let mut err_lines = BufReader::new(stderr).lines();
			let mut tail: Vec<String> = Vec::new();
			let mut out_open = true;
			let mut err_open = true;

			while out_open || err_open {
				let line = tokio::select! {
					// consumer dropped the stream: cancellation
					_ = tx.closed() => {
						let _ = child.kill().await;
						return;
					}
					line = out_lines.next_line(), if out_open => match line {
						Ok(Some(l)) => Some(l),
						_ => {
							out_open = false;
							None
						}
					},
					line = err_lines.next_line(), if err_open => match line {
						Ok(Some(l)) => {
							if tail.len() == ERROR_TAIL_LINES {
								tail.remove(0);
							}
							tail.push(l.clone());
							Some(l)
						}
						_ => {
							err_open = false;
							None
						}
					},
				};
				if let Some(line) = line {
					// progress refreshes arrive \r-separated within one line
					for segment in line.split('\r') {
						if let Some(event) = parse_progress(segment) {
							if tx.send(Ok(event)).await.is_err() {
								let _ = child.kill().await;
								return;
							}
						}
					}
				}
			}

			let terminal = match child.wait().await {
				Ok(status) if status.success() => {
					let combined = tail.join("\n");
					if BackendError::classify(&combined) == BackendErrorKind::AlreadyExists {
						Some(BackendError::new(
							BackendErrorKind::AlreadyExists,
							"already exists at destination",
						))
					} else {
						None
					}
				}
				Ok(_) => Some(BackendError::from_output(&tail.join("\n"))),
				Err(e) => Some(BackendError::new(BackendErrorKind::Unknown, e.to_string())),
			};
			if let Some(err) = terminal {
				let _ = tx.send(Err(err)).await;
			}
		});

		Ok(ProgressStream { rx, finished: false })
	}

	async fn download(
		&self,
		backend_name: &str,
		remote_path: &str,
		local_path: &str,
	) -> Result<(), BackendError> {
		let mut args = vec![
			"copy".to_string(),
			remote_spec(backend_name, remote_path),
			local_path.to_string(),
			"--verbose".to_string(),
		];
		args.extend(self.bandwidth_args());
		self.run_transfer(args).await
	}

	async fn copy_between(&self, source_spec: &str, dest_spec: &str) -> Result<(), BackendError> {
		let mut args = vec![
			"copy".to_string(),
			source_spec.to_string(),
			dest_spec.to_string(),
			"--verbose".to_string(),
		];
		args.extend(self.bandwidth_args());
		self.run_transfer(args).await
	}

	async fn copy_file_between(
		&self,
		source_spec: &str,
		dest_spec: &str,
	) -> Result<(), BackendError> {
		let mut args = vec![
			"copyto".to_string(),
			source_spec.to_string(),
			dest_spec.to_string(),
			"--verbose".to_string(),
		];
		args.extend(self.bandwidth_args());
		self.run_transfer(args).await
	}

	async fn delete(
		&self,
		backend_name: &str,
		path: &str,
		is_directory: bool,
	) -> Result<(), BackendError> {
		let verb = if is_directory { "purge" } else { "deletefile" };
		self.run(vec![verb.to_string(), remote_spec(backend_name, path)]).await?;
		Ok(())
	}

	async fn rename(
		&self,
		backend_name: &str,
		old_path: &str,
		new_path: &str,
	) -> Result<(), BackendError> {
		self.run(vec![
			"moveto".to_string(),
			remote_spec(backend_name, old_path),
			remote_spec(backend_name, new_path),
		])
		.await?;
		Ok(())
	}

	async fn mkdir(&self, backend_name: &str, path: &str) -> Result<(), BackendError> {
		self.run(vec!["mkdir".to_string(), remote_spec(backend_name, path)]).await?;
		Ok(())
	}

	async fn list(&self, backend_name: &str, path: &str) -> Result<Vec<RemoteFile>, BackendError> {
		let out = self.run(vec!["lsjson".to_string(), remote_spec(backend_name, path)]).await?;
		if out.trim().is_empty() {
			return Ok(vec![]);
		}
		// an unparseable listing usually means an empty folder variant
		Ok(serde_json::from_str(&out).unwrap_or_default())
	}

	async fn provision_crypt(
		&self,
		crypt_name: &str,
		wrapped: &str,
		password: &str,
		salt: &str,
		filename_mode: FilenameEncryption,
		encrypt_folders: bool,
	) -> Result<(), BackendError> {
		let obscured_password = self.obscure(password).await?;
		let obscured_salt = self.obscure(salt).await?;

		// replace any stale entry so re-provisioning never duplicates
		if self.is_configured(crypt_name) {
			let _ = self.remove_config(crypt_name).await;
		}

		info!(crypt = crypt_name, wrapped, "creating crypt overlay config");
		self.run(vec![
			"config".to_string(),
			"create".to_string(),
			crypt_name.to_string(),
			"crypt".to_string(),
			"remote".to_string(),
			wrapped.to_string(),
			"password".to_string(),
			obscured_password,
			"password2".to_string(),
			obscured_salt,
			"filename_encryption".to_string(),
			filename_mode.config_value().to_string(),
			"directory_name_encryption".to_string(),
			encrypt_folders.to_string(),
			"--non-interactive".to_string(),
		])
		.await?;
		Ok(())
	}

	async fn remove_config(&self, name: &str) -> Result<(), BackendError> {
		self.run(vec!["config".to_string(), "delete".to_string(), name.to_string()]).await?;
		Ok(())
	}

	fn is_configured(&self, name: &str) -> bool {
		match std::fs::read_to_string(&self.config_path) {
			Ok(content) => content.contains(&format!("[{}]", name)),
			Err(_) => false,
		}
	}
}

/// Parse one output line into a progress event.
///
/// Recognized forms (from the tool's `--stats-one-line` output):
///   `Transferred:   1.234 MiB / 10.567 MiB, 12%, 234.5 KiB/s, ETA 30s`
///   `18 B / 18 B, 100%, 17 B/s, ETA 0s`
///   `Transferred:   5 / 100, 5%`          (file counts during dir copies)
pub fn parse_progress(line: &str) -> Option<ProgressEvent> {
	let trimmed = line.trim();
	if trimmed.is_empty() {
		return None;
	}
	let body = trimmed.strip_prefix("Transferred:").map(str::trim).unwrap_or(trimmed);

	let parts: Vec<&str> = body.split(',').map(str::trim).collect();
	if parts.len() < 2 {
		return None;
	}
	let (left, right) = parts[0].split_once('/')?;
	let left = left.trim();
	let right = right.trim();
	let percentage: f64 = parts[1].strip_suffix('%')?.trim().parse().ok()?;

	let mut event = ProgressEvent { percentage, ..Default::default() };
	match (left.parse::<u64>(), right.parse::<u64>()) {
		(Ok(done), Ok(total)) => {
			event.files_transferred = Some(done);
			event.total_files = Some(total);
		}
		_ => {
			event.bytes_transferred = parse_size(left);
			event.total_bytes = parse_size(right);
			if event.bytes_transferred.is_none() && event.total_bytes.is_none() {
				return None;
			}
		}
	}
	if let Some(speed) = parts.get(2) {
		if speed.contains("B/s") {
			event.speed = speed.to_string();
		}
	}
	Some(event)
}

/// Parse a size label like "1.5 MiB", "652.6 MB" or "128 B"
pub fn parse_size(text: &str) -> Option<u64> {
	let mut parts = text.split_whitespace();
	let value: f64 = parts.next()?.parse().ok()?;
	let unit = parts.next()?;
	if parts.next().is_some() {
		return None;
	}
	let multiplier: f64 = match unit.to_ascii_uppercase().as_str() {
		"B" => 1.0,
		"KB" | "KIB" => 1024.0,
		"MB" | "MIB" => 1024.0 * 1024.0,
		"GB" | "GIB" => 1024.0 * 1024.0 * 1024.0,
		"TB" | "TIB" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
		_ => return None,
	};
	Some((value * multiplier) as u64)
}


// vim: ts=4
