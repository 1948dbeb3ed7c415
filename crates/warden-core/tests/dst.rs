//! Schedule boundaries across a spring-forward DST gap
//!
//! Runs in its own process so the local time zone can be pinned.

use chrono::{DateTime, Duration, Local, TimeZone};
use std::path::Path;
use warden_api::{PolicySettings, Schedule, ScheduleKind};
use warden_core::window::{is_active, next_change};
use warden_util::WallClock;

const ZONE: &str = "America/New_York";

/// Pin the local zone; false when the host has no tz database entry for it
fn pin_zone() -> bool {
    if !Path::new("/usr/share/zoneinfo").join(ZONE).exists() {
        return false;
    }
    // SAFETY: this binary holds a single test, so nothing else reads the
    // environment concurrently.
    unsafe { std::env::set_var("TZ", ZONE) };
    true
}

fn daily(start: (u8, u8), end: (u8, u8)) -> Schedule {
    Schedule::new(
        ScheduleKind::Daily,
        WallClock::new(start.0, start.1).unwrap(),
        WallClock::new(end.0, end.1).unwrap(),
        PolicySettings::ALL_BLOCKED,
    )
}

// 2025-03-09: 02:00 EST jumps to 03:00 EDT
fn at(h: u32, m: u32) -> DateTime<Local> {
    Local.with_ymd_and_hms(2025, 3, 9, h, m, 0).unwrap()
}

#[test]
fn boundaries_inside_the_gap_fall_forward() {
    if !pin_zone() {
        eprintln!("skipping: no tz data for {}", ZONE);
        return;
    }

    // End at 02:30 does not exist that day
    let ends_in_gap = daily((1, 0), (2, 30));
    let now = at(1, 30);
    assert!(is_active(&ends_in_gap, &now));
    assert_eq!(next_change(&ends_in_gap, &now), Some(at(3, 0)));
    assert!(!is_active(&ends_in_gap, &at(3, 0)));

    // Start at 02:15 does not exist either
    let starts_in_gap = daily((2, 15), (4, 0));
    assert_eq!(next_change(&starts_in_gap, &at(1, 0)), Some(at(3, 0)));
    assert!(is_active(&starts_in_gap, &at(3, 0)));

    // Every enabled schedule keeps a next change strictly ahead across the day
    let schedules = [ends_in_gap, starts_in_gap, daily((22, 0), (2, 30))];
    let mut now = Local.with_ymd_and_hms(2025, 3, 8, 20, 0, 0).unwrap();
    let stop = Local.with_ymd_and_hms(2025, 3, 10, 6, 0, 0).unwrap();
    while now < stop {
        for schedule in &schedules {
            let next = next_change(schedule, &now)
                .unwrap_or_else(|| panic!("{} has no next change at {}", schedule.describe(), now));
            assert!(next > now, "{} at {}", schedule.describe(), now);
        }
        now += Duration::minutes(7);
    }
}
