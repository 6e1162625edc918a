//! Recurring schedule model and next-run computation
//!
//! A schedule describes what to transfer (source/destination pair plus
//! per-side encryption flags) and when (hourly, daily, weekly or a custom
//! interval). Next-run times are always computed strictly in the future;
//! a disabled schedule has no next run.

use chrono::{Datelike, Duration, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::task::TaskKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScheduleFrequency {
	Hourly,
	Daily,
	Weekly,
	/// Every N minutes
	Custom,
}

/// A recurring trigger definition.
///
/// Exactly one of {hour+minute, custom interval, weekday set} is meaningful,
/// selected by `frequency`; the unused fields are simply ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSchedule {
	pub id: Uuid,
	pub name: String,
	pub enabled: bool,

	// what to sync
	pub source_remote: String,
	pub source_path: String,
	pub destination_remote: String,
	pub destination_path: String,
	pub kind: TaskKind,
	#[serde(default)]
	pub encrypt_source: bool,
	#[serde(default)]
	pub encrypt_destination: bool,

	// when to sync
	pub frequency: ScheduleFrequency,
	/// Minutes between runs for `Custom` (minimum 5)
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub interval_minutes: Option<u32>,
	/// 0-23, for daily/weekly
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub hour: Option<u32>,
	/// 0-59
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub minute: Option<u32>,
	/// 1=Sunday .. 7=Saturday, for weekly
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub weekdays: Option<BTreeSet<u8>>,

	// run statistics
	pub run_count: u32,
	pub failure_count: u32,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub last_run_at: Option<chrono::DateTime<Utc>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub last_run_success: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub last_run_error: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub next_run_at: Option<NaiveDateTime>,

	pub created_at: chrono::DateTime<Utc>,
	pub modified_at: chrono::DateTime<Utc>,
}

impl SyncSchedule {
	pub fn new(
		name: impl Into<String>,
		source_remote: impl Into<String>,
		source_path: impl Into<String>,
		destination_remote: impl Into<String>,
		destination_path: impl Into<String>,
	) -> Self {
		let now = Utc::now();
		SyncSchedule {
			id: Uuid::new_v4(),
			name: name.into(),
			enabled: true,
			source_remote: source_remote.into(),
			source_path: source_path.into(),
			destination_remote: destination_remote.into(),
			destination_path: destination_path.into(),
			kind: TaskKind::Backup,
			encrypt_source: false,
			encrypt_destination: false,
			frequency: ScheduleFrequency::Daily,
			interval_minutes: None,
			hour: Some(2),
			minute: Some(0),
			weekdays: None,
			run_count: 0,
			failure_count: 0,
			last_run_at: None,
			last_run_success: None,
			last_run_error: None,
			next_run_at: None,
			created_at: now,
			modified_at: now,
		}
	}

	/// Validate the definition before it is stored
	pub fn validate(&self) -> Result<(), String> {
		if self.name.trim().is_empty() {
			return Err("schedule name must not be empty".to_string());
		}
		if self.source_remote == self.destination_remote
			&& self.source_path == self.destination_path
		{
			return Err("source and destination are identical".to_string());
		}
		match self.frequency {
			ScheduleFrequency::Custom => match self.interval_minutes {
				Some(m) if m >= 5 => Ok(()),
				_ => Err("custom interval must be at least 5 minutes".to_string()),
			},
			ScheduleFrequency::Weekly => match &self.weekdays {
				Some(days) if !days.is_empty() && days.iter().all(|d| (1..=7).contains(d)) => {
					Ok(())
				}
				_ => Err("weekly schedule needs at least one weekday (1-7)".to_string()),
			},
			_ => Ok(()),
		}
	}

	/// Compute the next trigger time strictly after `now`.
	/// Returns None for disabled schedules and empty weekday sets.
	pub fn next_run_after(&self, now: NaiveDateTime) -> Option<NaiveDateTime> {
		if !self.enabled {
			return None;
		}
		match self.frequency {
			ScheduleFrequency::Hourly => {
				let minute = self.minute.unwrap_or(0);
				let mut next = now.date().and_hms_opt(now.hour(), minute, 0)?;
				if next <= now {
					next += Duration::hours(1);
				}
				Some(next)
			}
			ScheduleFrequency::Daily => {
				let hour = self.hour.unwrap_or(2);
				let minute = self.minute.unwrap_or(0);
				let mut next = now.date().and_hms_opt(hour, minute, 0)?;
				if next <= now {
					next += Duration::days(1);
				}
				Some(next)
			}
			ScheduleFrequency::Weekly => {
				let days = self.weekdays.as_ref().filter(|d| !d.is_empty())?;
				let hour = self.hour.unwrap_or(2);
				let minute = self.minute.unwrap_or(0);
				for offset in 0..8 {
					let date = now.date() + Duration::days(offset);
					let weekday = date.weekday().num_days_from_sunday() as u8 + 1;
					if !days.contains(&weekday) {
						continue;
					}
					let candidate = date.and_hms_opt(hour, minute, 0)?;
					if candidate > now {
						return Some(candidate);
					}
				}
				None
			}
			ScheduleFrequency::Custom => {
				let minutes = self.interval_minutes.unwrap_or(60);
				Some(now + Duration::minutes(minutes as i64))
			}
		}
	}

	/// Record the outcome of one triggered run and advance the next-run time
	pub fn record_run(&mut self, success: bool, error: Option<String>, now: NaiveDateTime) {
		self.run_count += 1;
		self.last_run_at = Some(Utc::now());
		self.last_run_success = Some(success);
		if success {
			self.last_run_error = None;
		} else {
			// a failed run is recorded but never disables the schedule
			self.failure_count += 1;
			self.last_run_error = error;
		}
		self.next_run_at = self.next_run_after(now);
	}

	pub fn is_due(&self, now: NaiveDateTime) -> bool {
		self.enabled && self.next_run_at.map_or(false, |next| next <= now)
	}
}


// vim: ts=4
