//! Schedule window membership and transition times
//!
//! Minute granularity. The start minute is inclusive and the end minute
//! exclusive. A window whose start is after its end wraps past midnight.
//! Only the current day is checked against the schedule's days, including
//! during the after-midnight tail of a wrapping window.

use chrono::{DateTime, Duration, Local};
use warden_api::Schedule;
use warden_util::{day_and_minute, local_datetime};

/// How far ahead `next_change` looks for the next start
const LOOKAHEAD_DAYS: i64 = 7;

/// Whether `schedule` is in force at `now`
pub fn is_active(schedule: &Schedule, now: &DateTime<Local>) -> bool {
    if !schedule.enabled {
        return false;
    }

    let (day, minute) = day_and_minute(now);
    if !schedule.applicable_days().contains_index(day) {
        return false;
    }

    let start = schedule.start_time.minutes_from_midnight();
    let end = schedule.end_time.minutes_from_midnight();

    if start <= end {
        minute >= start && minute < end
    } else {
        minute >= start || minute < end
    }
}

/// Next instant at which `schedule` starts or stops applying.
///
/// `None` when the schedule is disabled, or when no applicable day falls
/// within the next week. A boundary that lands in a DST gap is reported
/// at the first minute after the gap.
pub fn next_change(schedule: &Schedule, now: &DateTime<Local>) -> Option<DateTime<Local>> {
    if !schedule.enabled {
        return None;
    }

    let today = now.date_naive();

    if is_active(schedule, now) {
        let (_, minute) = day_and_minute(now);
        let ends_tomorrow =
            schedule.spans_midnight() && minute >= schedule.start_time.minutes_from_midnight();
        let end_date = if ends_tomorrow {
            today + Duration::days(1)
        } else {
            today
        };
        return local_datetime(end_date, schedule.end_time);
    }

    let days = schedule.applicable_days();
    (0..=LOOKAHEAD_DAYS)
        .map(|offset| today + Duration::days(offset))
        .filter_map(|date| {
            let start = local_datetime(date, schedule.start_time)?;
            let (day, _) = day_and_minute(&start);
            days.contains_index(day).then_some(start)
        })
        .find(|start| start > now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use warden_api::{PolicySettings, ScheduleKind};
    use warden_util::{DaysOfWeek, WallClock};

    fn hm(h: u8, m: u8) -> WallClock {
        WallClock::new(h, m).unwrap()
    }

    // 2025-01-06 is a Monday
    fn at(day: u32, h: u32, m: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 1, day, h, m, 0).unwrap()
    }

    fn daily(start: WallClock, end: WallClock) -> Schedule {
        Schedule::new(ScheduleKind::Daily, start, end, PolicySettings::ALL_BLOCKED)
    }

    #[test]
    fn overnight_boundaries() {
        let schedule = daily(hm(22, 0), hm(6, 0));

        assert!(is_active(&schedule, &at(6, 23, 0)));
        assert!(is_active(&schedule, &at(7, 5, 59)));
        assert!(!is_active(&schedule, &at(7, 6, 0)));
        assert!(!is_active(&schedule, &at(7, 21, 59)));
        assert!(is_active(&schedule, &at(7, 22, 0)));
    }

    #[test]
    fn same_day_boundaries() {
        let schedule = daily(hm(8, 0), hm(22, 0));

        assert!(!is_active(&schedule, &at(6, 7, 59)));
        assert!(is_active(&schedule, &at(6, 8, 0)));
        assert!(is_active(&schedule, &at(6, 21, 59)));
        assert!(!is_active(&schedule, &at(6, 22, 0)));
    }

    #[test]
    fn disabled_is_never_active() {
        let mut schedule = daily(hm(0, 0), hm(23, 59));
        schedule.enabled = false;

        assert!(!is_active(&schedule, &at(6, 12, 0)));
        assert!(next_change(&schedule, &at(6, 12, 0)).is_none());
    }

    #[test]
    fn day_filter_uses_kind() {
        let mut weekends = Schedule::new(
            ScheduleKind::Weekends,
            hm(8, 0),
            hm(22, 0),
            PolicySettings::ALL_BLOCKED,
        );
        // Stale days must not be consulted for non-custom kinds
        weekends.days = DaysOfWeek::WEEKDAYS;

        assert!(!is_active(&weekends, &at(6, 12, 0)));
        assert!(is_active(&weekends, &at(11, 12, 0)));
        assert!(is_active(&weekends, &at(12, 12, 0)));

        let custom = Schedule::custom(
            DaysOfWeek::from_indices([1, 3]),
            hm(8, 0),
            hm(22, 0),
            PolicySettings::ALL_BLOCKED,
        );
        assert!(is_active(&custom, &at(6, 12, 0)));
        assert!(!is_active(&custom, &at(7, 12, 0)));
        assert!(is_active(&custom, &at(8, 12, 0)));
    }

    #[test]
    fn next_change_while_active() {
        let schedule = daily(hm(8, 0), hm(22, 0));
        assert_eq!(next_change(&schedule, &at(6, 12, 30)), Some(at(6, 22, 0)));

        let overnight = daily(hm(22, 0), hm(6, 0));
        assert_eq!(next_change(&overnight, &at(6, 23, 0)), Some(at(7, 6, 0)));
        assert_eq!(next_change(&overnight, &at(7, 2, 0)), Some(at(7, 6, 0)));
    }

    #[test]
    fn next_change_while_inactive() {
        let schedule = daily(hm(8, 0), hm(22, 0));
        assert_eq!(next_change(&schedule, &at(6, 7, 0)), Some(at(6, 8, 0)));
        assert_eq!(next_change(&schedule, &at(6, 22, 30)), Some(at(7, 8, 0)));

        let weekdays = Schedule::new(
            ScheduleKind::Weekdays,
            hm(8, 0),
            hm(17, 0),
            PolicySettings::ALL_BLOCKED,
        );
        // Friday evening -> Monday morning
        assert_eq!(next_change(&weekdays, &at(10, 18, 0)), Some(at(13, 8, 0)));
    }

    #[test]
    fn next_change_wraps_a_full_week() {
        let mondays = Schedule::custom(
            DaysOfWeek::from_indices([1]),
            hm(8, 0),
            hm(9, 0),
            PolicySettings::ALL_BLOCKED,
        );
        assert_eq!(next_change(&mondays, &at(6, 10, 0)), Some(at(13, 8, 0)));
    }

    #[test]
    fn next_change_none_without_days() {
        let never = Schedule::custom(
            DaysOfWeek::NONE,
            hm(8, 0),
            hm(9, 0),
            PolicySettings::ALL_BLOCKED,
        );
        assert!(next_change(&never, &at(6, 10, 0)).is_none());
    }

    #[test]
    fn next_change_is_strictly_after_now() {
        let schedules = [
            daily(hm(8, 0), hm(22, 0)),
            daily(hm(22, 0), hm(6, 0)),
            Schedule::new(ScheduleKind::Weekends, hm(0, 0), hm(23, 59), PolicySettings::ALL_BLOCKED),
            Schedule::custom(
                DaysOfWeek::from_indices([0, 3]),
                hm(12, 15),
                hm(3, 45),
                PolicySettings::ALL_BLOCKED,
            ),
        ];

        let mut now = at(6, 0, 0);
        let stop = at(20, 0, 0);
        while now < stop {
            for schedule in &schedules {
                let next = next_change(schedule, &now).unwrap();
                assert!(next > now, "{} at {}", schedule.describe(), now);
            }
            now += Duration::minutes(37);
        }
    }
}
