//! # skysync - Cloud Transfer Orchestration Core
//!
//! skysync moves, mirrors and backs up files across heterogeneous storage
//! backends (local disk and many cloud providers) through one uniform
//! interface, delegating the wire protocols to an external synchronization
//! tool invoked as a subprocess. The core turns a file selection plus a
//! source/destination pair into a supervised, cancellable,
//! progress-reporting task, with optional per-remote encryption overlays
//! and a scheduler for unattended runs.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use skysync::backend::RcloneBackend;
//! use skysync::config::Config;
//! use skysync::encryption::EncryptionStore;
//! use skysync::engine::{TransferEngine, TransferItem, TransferRequest};
//! use skysync::remote::Remote;
//! use skysync::store::TaskStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load()?;
//!     let backend = Arc::new(RcloneBackend::new(&config));
//!     let store = TaskStore::open(&config.state_dir, config.history_limit)?;
//!     let encryption = EncryptionStore::open(&config.state_dir)?;
//!     let engine = TransferEngine::new(backend, store, encryption);
//!
//!     let request = TransferRequest::new(
//!         vec![TransferItem { path: "/home/me/photos".into(), is_directory: true, size: 0 }],
//!         Remote::local(),
//!         "/home/me",
//!         my_cloud_remote,
//!         "/backup",
//!     );
//!     let task_id = engine.execute(request).await?;
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod config;
pub mod encryption;
pub mod engine;
pub mod error;
pub mod fsutil;
pub mod logging;
pub mod remote;
pub mod remotes;
pub mod schedule;
pub mod scheduler;
pub mod store;
pub mod task;

// Re-export commonly used types
pub use backend::{ProgressEvent, ProgressStream, RcloneBackend, TransferBackend};
pub use encryption::{EncryptionBinding, EncryptionStore, FilenameEncryption};
pub use engine::{TransferEngine, TransferItem, TransferRequest};
pub use error::{BackendError, BackendErrorKind, StateError, SyncError};
pub use remote::{ProviderKind, Remote};
pub use schedule::{ScheduleFrequency, SyncSchedule};
pub use scheduler::Scheduler;
pub use store::TaskStore;
pub use task::{SyncTask, TaskKind, TaskState};

// vim: ts=4
