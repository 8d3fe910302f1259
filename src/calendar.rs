use std::collections::BTreeSet;

use chrono::{Datelike, Days, NaiveDate, Utc, Weekday};

use crate::limits::CADENCE_LOOKAHEAD;
use crate::model::*;

/// The club opens for online booking on this date. Nothing earlier is offered.
pub const DEFAULT_OPENING_FLOOR: NaiveDate = match NaiveDate::from_ymd_opt(2026, 3, 1) {
    Some(d) => d,
    None => panic!("invalid opening floor"),
};

/// Fixed weekly game night.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CadenceRule {
    pub weekday: Weekday,
    /// Hard floor below which no cadence date is produced.
    pub floor: Day,
    pub count: usize,
}

impl CadenceRule {
    pub fn weekly(weekday: Weekday, floor: Day) -> Self {
        Self {
            weekday,
            floor,
            count: CADENCE_LOOKAHEAD,
        }
    }
}

impl Default for CadenceRule {
    fn default() -> Self {
        Self::weekly(Weekday::Tue, DEFAULT_OPENING_FLOOR)
    }
}

/// A date offered in the viewing dropdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectableDate {
    pub date: Day,
    pub is_cancelled: bool,
}

/// Today as a UTC calendar day. All "today" comparisons use this frame.
pub fn today_utc() -> Day {
    Utc::now().date_naive()
}

/// First `weekday` on or after `start`.
pub fn next_on_or_after(start: Day, weekday: Weekday) -> Option<Day> {
    let ahead = (7 + weekday.num_days_from_monday() - start.weekday().num_days_from_monday()) % 7;
    start.checked_add_days(Days::new(u64::from(ahead)))
}

/// Next `rule.count` cadence dates, starting from the later of `today` and the floor.
pub fn upcoming_cadence_dates(rule: &CadenceRule, today: Day) -> Vec<Day> {
    let start = today.max(rule.floor);
    let Some(first) = next_on_or_after(start, rule.weekday) else {
        return Vec::new();
    };
    std::iter::successors(Some(first), |d| d.checked_add_days(Days::new(7)))
        .take(rule.count)
        .collect()
}

/// Dates a member may pick for a new reservation.
///
/// (cadence ∪ special) − cancelled − past. Cancellation beats a special event.
pub fn bookable_dates(rule: &CadenceRule, today: Day, schedule: &ScheduleExceptions) -> Vec<Day> {
    let mut dates: BTreeSet<Day> = upcoming_cadence_dates(rule, today).into_iter().collect();
    dates.extend(schedule.special.iter().copied());
    dates
        .into_iter()
        .filter(|d| *d >= today && !schedule.is_cancelled(*d))
        .collect()
}

/// Dates a member may view: cadence, special events, and any date that already
/// carries an active reservation, past dates dropped. Cancelled dates stay in,
/// tagged, so the closed state can be shown.
pub fn selectable_dates(
    rule: &CadenceRule,
    today: Day,
    schedule: &ScheduleExceptions,
    reservations: &[Reservation],
) -> Vec<SelectableDate> {
    let mut dates: BTreeSet<Day> = upcoming_cadence_dates(rule, today).into_iter().collect();
    dates.extend(schedule.special.iter().copied());
    dates.extend(reservations.iter().filter(|r| r.is_active()).map(|r| r.date));
    dates
        .into_iter()
        .filter(|d| *d >= today)
        .map(|date| SelectableDate {
            date,
            is_cancelled: schedule.is_cancelled(date),
        })
        .collect()
}

/// Keep `current` if it is still selectable, otherwise fall back to the first
/// selectable date.
pub fn resolve_selection(selectable: &[SelectableDate], current: Option<Day>) -> Option<Day> {
    match current {
        Some(d) if selectable.iter().any(|s| s.date == d) => Some(d),
        _ => selectable.first().map(|s| s.date),
    }
}
