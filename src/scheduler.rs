//! Scheduler: time-based trigger loop for unattended transfers
//!
//! Holds the persisted set of schedules, computes next-run times, and feeds
//! due schedules into the transfer engine. One process-wide clock evaluates
//! all enabled schedules; several due schedules run concurrently, each as
//! its own task.

use chrono::{Local, NaiveDateTime};
use futures::future::join_all;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use uuid::Uuid;

use crate::engine::{TransferEngine, TransferItem, TransferRequest};
use crate::error::{StateError, SyncError};
use crate::logging::*;
use crate::remote::Remote;
use crate::remotes::RemoteStore;
use crate::schedule::SyncSchedule;
use crate::task::TaskState;

#[derive(Clone)]
pub struct Scheduler {
	engine: TransferEngine,
	remotes: RemoteStore,
	schedules: Arc<Mutex<Vec<SyncSchedule>>>,
	path: Option<PathBuf>,
	tick: Duration,
}

struct RunOutcome {
	id: Uuid,
	success: bool,
	error: Option<String>,
}

impl Scheduler {
	pub fn in_memory(engine: TransferEngine, remotes: RemoteStore) -> Self {
		Scheduler {
			engine,
			remotes,
			schedules: Arc::new(Mutex::new(Vec::new())),
			path: None,
			tick: Duration::from_secs(60),
		}
	}

	/// Open the persisted schedule set. Next-run times are recomputed on
	/// load so schedules missed while the process was down fire on the next
	/// tick rather than piling up.
	pub fn open(
		state_dir: &std::path::Path,
		engine: TransferEngine,
		remotes: RemoteStore,
		tick_secs: u64,
	) -> Result<Self, StateError> {
		let path = state_dir.join("schedules.json");
		let mut schedules: Vec<SyncSchedule> = if path.exists() {
			let contents = std::fs::read_to_string(&path)
				.map_err(|e| StateError::LoadFailed { source: Box::new(e) })?;
			serde_json::from_str(&contents)
				.map_err(|e| StateError::Corrupted { message: format!("schedules: {}", e) })?
		} else {
			Vec::new()
		};
		let now = Local::now().naive_local();
		for schedule in &mut schedules {
			schedule.next_run_at =
				if schedule.enabled { schedule.next_run_after(now) } else { None };
		}
		let scheduler = Scheduler {
			engine,
			remotes,
			schedules: Arc::new(Mutex::new(schedules)),
			path: Some(path),
			tick: Duration::from_secs(tick_secs.max(1)),
		};
		scheduler.save(&scheduler.lock())?;
		Ok(scheduler)
	}

	fn lock(&self) -> MutexGuard<'_, Vec<SyncSchedule>> {
		self.schedules.lock().unwrap_or_else(|e| e.into_inner())
	}

	fn save(&self, schedules: &[SyncSchedule]) -> Result<(), StateError> {
		if let Some(path) = &self.path {
			let json = serde_json::to_string_pretty(schedules)
				.map_err(|e| StateError::SaveFailed { source: Box::new(e) })?;
			std::fs::write(path, json)
				.map_err(|e| StateError::SaveFailed { source: Box::new(e) })?;
		}
		Ok(())
	}

	// === CRUD ===

	pub fn list(&self) -> Vec<SyncSchedule> {
		self.lock().clone()
	}

	pub fn get(&self, id: Uuid) -> Option<SyncSchedule> {
		self.lock().iter().find(|s| s.id == id).cloned()
	}

	pub fn find_by_name(&self, name: &str) -> Option<SyncSchedule> {
		self.lock().iter().find(|s| s.name == name).cloned()
	}

	pub fn add(&self, mut schedule: SyncSchedule) -> Result<Uuid, SyncError> {
		schedule.validate().map_err(|message| SyncError::Validation { message })?;
		schedule.next_run_at = if schedule.enabled {
			schedule.next_run_after(Local::now().naive_local())
		} else {
			None
		};
		let id = schedule.id;
		let mut schedules = self.lock();
		schedules.push(schedule);
		self.save(&schedules)?;
		Ok(id)
	}

	pub fn update(&self, mut schedule: SyncSchedule) -> Result<(), SyncError> {
		schedule.validate().map_err(|message| SyncError::Validation { message })?;
		schedule.modified_at = chrono::Utc::now();
		schedule.next_run_at = if schedule.enabled {
			schedule.next_run_after(Local::now().naive_local())
		} else {
			None
		};
		let mut schedules = self.lock();
		match schedules.iter_mut().find(|s| s.id == schedule.id) {
			Some(slot) => {
				*slot = schedule;
				self.save(&schedules)?;
				Ok(())
			}
			None => Err(SyncError::Validation { message: "unknown schedule".to_string() }),
		}
	}

	pub fn remove(&self, id: Uuid) -> Result<(), StateError> {
		let mut schedules = self.lock();
		schedules.retain(|s| s.id != id);
		self.save(&schedules)
	}

	/// Enable or disable a schedule. Enabling computes a fresh next-run;
	/// a disabled schedule never has one.
	pub fn set_enabled(&self, id: Uuid, enabled: bool) -> Result<(), SyncError> {
		let mut schedules = self.lock();
		let Some(schedule) = schedules.iter_mut().find(|s| s.id == id) else {
			return Err(SyncError::Validation { message: "unknown schedule".to_string() });
		};
		schedule.enabled = enabled;
		schedule.modified_at = chrono::Utc::now();
		schedule.next_run_at =
			if enabled { schedule.next_run_after(Local::now().naive_local()) } else { None };
		self.save(&schedules)?;
		Ok(())
	}

	// === Execution ===

	/// Run one schedule immediately. Statistics are updated from the
	/// resulting task; the regular next-run time is left untouched.
	pub async fn run_now(&self, id: Uuid) -> Result<(), SyncError> {
		let Some(schedule) = self.get(id) else {
			return Err(SyncError::Validation { message: "unknown schedule".to_string() });
		};
		let preserved_next = schedule.next_run_at;
		let outcome = self.run_schedule(schedule).await;
		let mut schedules = self.lock();
		if let Some(slot) = schedules.iter_mut().find(|s| s.id == outcome.id) {
			slot.record_run(outcome.success, outcome.error, Local::now().naive_local());
			slot.next_run_at = preserved_next;
			let _ = self.save(&schedules);
		}
		Ok(())
	}

	/// Execute every enabled schedule whose next-run time has been reached.
	/// Due schedules run concurrently, each producing its own task.
	pub async fn check_due(&self, now: NaiveDateTime) {
		let due: Vec<SyncSchedule> =
			self.lock().iter().filter(|s| s.is_due(now)).cloned().collect();
		if due.is_empty() {
			return;
		}
		info!(count = due.len(), "schedules due");

		let outcomes =
			join_all(due.into_iter().map(|schedule| self.run_schedule(schedule))).await;

		let mut schedules = self.lock();
		for outcome in outcomes {
			if let Some(slot) = schedules.iter_mut().find(|s| s.id == outcome.id) {
				// failures are recorded, never disable the schedule
				slot.record_run(outcome.success, outcome.error, Local::now().naive_local());
			}
		}
		let _ = self.save(&schedules);
	}

	/// The scheduler clock: checks for due schedules once per tick until
	/// `shutdown` flips to true.
	pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
		info!(enabled = self.lock().iter().filter(|s| s.enabled).count(), "scheduler started");
		let mut interval = tokio::time::interval(self.tick);
		interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
		loop {
			tokio::select! {
				_ = interval.tick() => {
					self.check_due(Local::now().naive_local()).await;
				}
				changed = shutdown.changed() => {
					if changed.is_err() || *shutdown.borrow() {
						break;
					}
				}
			}
		}
		info!("scheduler stopped");
	}

	fn resolve_remote(&self, name: &str) -> Option<Remote> {
		if let Some(remote) = self.remotes.find_by_name(name) {
			return Some(remote);
		}
		let local = Remote::local();
		if name == local.name {
			return Some(local);
		}
		None
	}

	async fn run_schedule(&self, schedule: SyncSchedule) -> RunOutcome {
		let id = schedule.id;
		info!(schedule = %schedule.name, "executing schedule");

		let (Some(source), Some(destination)) = (
			self.resolve_remote(&schedule.source_remote),
			self.resolve_remote(&schedule.destination_remote),
		) else {
			warn!(schedule = %schedule.name, "schedule references an unknown remote");
			return RunOutcome {
				id,
				success: false,
				error: Some("schedule references an unknown remote".to_string()),
			};
		};

		// a scheduled run transfers the source directory itself
		let mut request = TransferRequest::new(
			vec![TransferItem {
				path: schedule.source_path.clone(),
				is_directory: true,
				size: 0,
			}],
			source,
			schedule.source_path.clone(),
			destination,
			schedule.destination_path.clone(),
		);
		request.name = Some(format!("Scheduled: {}", schedule.name));
		request.kind = schedule.kind;
		request.encrypt_source = schedule.encrypt_source;
		request.encrypt_destination = schedule.encrypt_destination;
		request.schedule_id = Some(id);

		match self.engine.execute(request).await {
			Ok(task_id) => {
				let task = self.engine.store().get(task_id);
				let success = task.as_ref().map(|t| t.state == TaskState::Completed).unwrap_or(false);
				let error = task.and_then(|t| t.error_message);
				RunOutcome { id, success, error }
			}
			Err(e) => {
				warn!(schedule = %schedule.name, error = %e, "scheduled run failed to start");
				RunOutcome { id, success: false, error: Some(e.to_string()) }
			}
		}
	}
}

// vim: ts=4
