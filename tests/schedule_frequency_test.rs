//! Schedule arithmetic tests - next-run computation for every frequency

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use skysync::schedule::{ScheduleFrequency, SyncSchedule};

fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
	NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(h, min, 0).unwrap()
}

fn schedule() -> SyncSchedule {
	SyncSchedule::new("nightly", "Local Storage", "/data", "My Drive", "/backup")
}

#[test]
fn test_daily_two_am_on_both_sides_of_the_trigger() {
	let mut s = schedule();
	s.frequency = ScheduleFrequency::Daily;
	s.hour = Some(2);
	s.minute = Some(0);

	// computed at 03:00 on day D -> 02:00 on day D+1
	assert_eq!(s.next_run_after(at(2026, 6, 15, 3, 0)), Some(at(2026, 6, 16, 2, 0)));
	// computed at 01:00 on day D -> 02:00 on day D
	assert_eq!(s.next_run_after(at(2026, 6, 15, 1, 0)), Some(at(2026, 6, 15, 2, 0)));
}

#[test]
fn test_daily_rolls_over_month_boundary() {
	let mut s = schedule();
	s.frequency = ScheduleFrequency::Daily;
	s.hour = Some(2);
	s.minute = Some(30);
	assert_eq!(s.next_run_after(at(2026, 6, 30, 23, 0)), Some(at(2026, 7, 1, 2, 30)));
}

#[test]
fn test_hourly_runs_at_the_configured_minute() {
	let mut s = schedule();
	s.frequency = ScheduleFrequency::Hourly;
	s.minute = Some(15);
	assert_eq!(s.next_run_after(at(2026, 6, 15, 9, 0)), Some(at(2026, 6, 15, 9, 15)));
	assert_eq!(s.next_run_after(at(2026, 6, 15, 9, 15)), Some(at(2026, 6, 15, 10, 15)));
	assert_eq!(s.next_run_after(at(2026, 6, 15, 23, 50)), Some(at(2026, 6, 16, 0, 15)));
}

#[test]
fn test_weekly_weekend_set() {
	let mut s = schedule();
	s.frequency = ScheduleFrequency::Weekly;
	s.hour = Some(9);
	s.minute = Some(0);
	// 1=Sunday, 7=Saturday
	s.weekdays = Some([1u8, 7u8].into_iter().collect());

	// 2026-06-15 is a Monday; the next weekend day is Saturday the 20th
	let monday = at(2026, 6, 15, 12, 0);
	assert_eq!(monday.weekday().num_days_from_sunday(), 1);
	assert_eq!(s.next_run_after(monday), Some(at(2026, 6, 20, 9, 0)));

	// on Saturday after 09:00, the next run is Sunday
	assert_eq!(s.next_run_after(at(2026, 6, 20, 10, 0)), Some(at(2026, 6, 21, 9, 0)));
}

#[test]
fn test_weekly_single_day_wraps_a_full_week() {
	let mut s = schedule();
	s.frequency = ScheduleFrequency::Weekly;
	s.hour = Some(9);
	s.minute = Some(0);
	// Monday = 2
	s.weekdays = Some([2u8].into_iter().collect());

	// Monday after 09:00 -> next Monday
	assert_eq!(s.next_run_after(at(2026, 6, 15, 10, 0)), Some(at(2026, 6, 22, 9, 0)));
}

#[test]
fn test_weekly_without_days_has_no_next_run() {
	let mut s = schedule();
	s.frequency = ScheduleFrequency::Weekly;
	s.weekdays = Some(Default::default());
	assert_eq!(s.next_run_after(at(2026, 6, 15, 10, 0)), None);
}

#[test]
fn test_custom_interval_is_relative_to_now() {
	let mut s = schedule();
	s.frequency = ScheduleFrequency::Custom;
	s.interval_minutes = Some(90);
	assert_eq!(s.next_run_after(at(2026, 6, 15, 23, 0)), Some(at(2026, 6, 16, 0, 30)));
}

#[test]
fn test_disabled_never_computes_next_run() {
	let mut s = schedule();
	s.enabled = false;
	for frequency in [
		ScheduleFrequency::Hourly,
		ScheduleFrequency::Daily,
		ScheduleFrequency::Weekly,
		ScheduleFrequency::Custom,
	] {
		s.frequency = frequency;
		assert_eq!(s.next_run_after(at(2026, 6, 15, 1, 0)), None);
	}
}

#[test]
fn test_is_due() {
	let mut s = schedule();
	s.next_run_at = Some(at(2026, 6, 15, 2, 0));
	assert!(!s.is_due(at(2026, 6, 15, 1, 59)));
	assert!(s.is_due(at(2026, 6, 15, 2, 0)));
	assert!(s.is_due(at(2026, 6, 15, 8, 0)));

	s.enabled = false;
	assert!(!s.is_due(at(2026, 6, 15, 8, 0)));
}

#[test]
fn test_run_statistics_accumulate() {
	let mut s = schedule();
	s.frequency = ScheduleFrequency::Daily;
	s.hour = Some(2);
	s.minute = Some(0);

	s.record_run(true, None, at(2026, 6, 15, 2, 0));
	s.record_run(false, Some("timeout".to_string()), at(2026, 6, 16, 2, 0));
	s.record_run(true, None, at(2026, 6, 17, 2, 0));

	assert_eq!(s.run_count, 3);
	assert_eq!(s.failure_count, 1);
	assert_eq!(s.last_run_success, Some(true));
	assert!(s.last_run_error.is_none());
	assert!(s.enabled, "failures never disable a schedule");
	assert_eq!(s.next_run_at, Some(at(2026, 6, 18, 2, 0)));
}

// vim: ts=4
