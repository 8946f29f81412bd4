//! Habit completion and streak reconciliation.
//!
//! Completing a habit is allowed once per local calendar day. The decision is
//! made here without touching the backend: callers gather today's completions,
//! ask [`plan_completion`] what to write, and perform the writes themselves.
//!
//! Streaks only ever grow. There is no reset for missed days.

use chrono::{DateTime, Local, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::model::{Completion, Habit, HabitPatch, NewCompletion};

/// Half-open interval `[start, end)` covering one local calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DayWindow {
    /// The local day containing `instant`, evaluated in the instant's own zone.
    ///
    /// The end is the following local midnight, so days that gain or lose an
    /// hour to a DST change are 25 or 23 hours long.
    pub fn containing<Tz: TimeZone>(instant: &DateTime<Tz>) -> Self {
        let tz = instant.timezone();
        let date = instant.date_naive();
        let next = date.succ_opt().unwrap_or(date);
        Self {
            start: start_of_day(&tz, date),
            end: start_of_day(&tz, next),
        }
    }

    /// Today's window in the process-local time zone.
    pub fn today() -> Self {
        Self::containing(&Local::now())
    }

    /// Today's window together with the instant it was taken from.
    pub fn current() -> (Self, DateTime<Utc>) {
        let now = Local::now();
        (Self::containing(&now), now.with_timezone(&Utc))
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant < self.end
    }
}

/// First valid instant of `date` in `tz`.
///
/// Ambiguous midnights resolve to the earlier instant. Zones that skip
/// midnight entirely start the day at the first local time that exists.
fn start_of_day<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> DateTime<Utc> {
    let mut local = date.and_time(NaiveTime::MIN);
    // Transitions never skip more than a few hours.
    for _ in 0..(4 * 24) {
        if let Some(start) = tz.from_local_datetime(&local).earliest() {
            return start.with_timezone(&Utc);
        }
        local += chrono::Duration::minutes(15);
    }
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

/// Ids of the habits with at least one completion inside `window`.
pub fn completed_habit_ids<'a, I>(completions: I, window: &DayWindow) -> HashSet<String>
where
    I: IntoIterator<Item = &'a Completion>,
{
    completions
        .into_iter()
        .filter(|c| window.contains(c.completed_at))
        .map(|c| c.habit_id.clone())
        .collect()
}

/// What completing a habit right now should do.
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionPlan {
    /// The habit already has a completion in today's window. Nothing is written.
    AlreadyCompletedToday,
    /// Write `completion`, then apply `patch` to the habit.
    Record {
        completion: NewCompletion,
        patch: HabitPatch,
        /// The habit as it will look once `patch` is applied.
        updated: Habit,
    },
}

/// Decide whether `habit` may be completed at `now` for `user_id`.
pub fn plan_completion(
    habit: &Habit,
    completed_today: &HashSet<String>,
    user_id: &str,
    now: DateTime<Utc>,
) -> CompletionPlan {
    if completed_today.contains(&habit.id) {
        return CompletionPlan::AlreadyCompletedToday;
    }

    let patch = HabitPatch {
        streak_count: Some(habit.streak_count.saturating_add(1)),
        last_completed: Some(now),
        ..Default::default()
    };
    let mut updated = habit.clone();
    patch.apply_to(&mut updated);

    CompletionPlan::Record {
        completion: NewCompletion {
            user_id: user_id.to_string(),
            habit_id: habit.id.clone(),
            completed_at: now,
        },
        patch,
        updated,
    }
}

/// Result of a completion request after the writes went through.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CompletionOutcome {
    AlreadyCompleted { habit: Habit },
    Completed { habit: Habit, completion: Completion },
}

impl CompletionOutcome {
    pub fn habit(&self) -> &Habit {
        match self {
            CompletionOutcome::AlreadyCompleted { habit } => habit,
            CompletionOutcome::Completed { habit, .. } => habit,
        }
    }

    pub fn was_recorded(&self) -> bool {
        matches!(self, CompletionOutcome::Completed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Frequency;
    use chrono::{Duration, FixedOffset};
    use chrono_tz::America::{Havana, New_York, Sao_Paulo};

    fn habit(id: &str, streak: u32) -> Habit {
        Habit {
            id: id.to_string(),
            user_id: "u1".to_string(),
            title: "Stretch".to_string(),
            description: "10 minutes".to_string(),
            frequency: Frequency::Daily,
            streak_count: streak,
            last_completed: Some(Utc.with_ymd_and_hms(2026, 10, 1, 7, 0, 0).unwrap()),
            created_at: None,
            updated_at: None,
        }
    }

    fn completion(habit_id: &str, at: DateTime<Utc>) -> Completion {
        Completion {
            id: format!("c-{habit_id}-{}", at.timestamp_millis()),
            user_id: "u1".to_string(),
            habit_id: habit_id.to_string(),
            completed_at: at,
        }
    }

    #[test]
    fn test_first_completion_increments_streak() {
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap();
        let h1 = habit("H1", 3);

        match plan_completion(&h1, &HashSet::new(), "u1", now) {
            CompletionPlan::Record {
                completion,
                patch,
                updated,
            } => {
                assert_eq!(completion.habit_id, "H1");
                assert_eq!(completion.completed_at, now);
                assert_eq!(patch.streak_count, Some(4));
                assert_eq!(updated.streak_count, 4);
                assert_eq!(updated.last_completed, Some(now));
            }
            other => panic!("expected a record plan, got {other:?}"),
        }
    }

    #[test]
    fn test_second_completion_same_day_is_noop() {
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap();
        let done: HashSet<String> = ["H1".to_string()].into();
        assert_eq!(
            plan_completion(&habit("H1", 3), &done, "u1", now),
            CompletionPlan::AlreadyCompletedToday
        );
    }

    #[test]
    fn test_streak_saturates() {
        let now = Utc::now();
        match plan_completion(&habit("H1", u32::MAX), &HashSet::new(), "u1", now) {
            CompletionPlan::Record { updated, .. } => assert_eq!(updated.streak_count, u32::MAX),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_window_boundaries_in_fixed_zone() {
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        let noon = tz.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap();
        let window = DayWindow::containing(&noon);

        let midnight = tz.with_ymd_and_hms(2026, 10, 16, 0, 0, 0).unwrap();
        let last_ms = tz.with_ymd_and_hms(2026, 10, 16, 23, 59, 59).unwrap()
            + Duration::milliseconds(999);
        let next_midnight = tz.with_ymd_and_hms(2026, 10, 17, 0, 0, 0).unwrap();

        assert!(window.contains(midnight.with_timezone(&Utc)));
        assert!(window.contains(last_ms.with_timezone(&Utc)));
        assert!(!window.contains(next_midnight.with_timezone(&Utc)));
        assert!(!window.contains((midnight - Duration::milliseconds(1)).with_timezone(&Utc)));
        assert_eq!(window.end - window.start, Duration::hours(24));
    }

    #[test]
    fn test_current_window_contains_its_instant() {
        let (window, now) = DayWindow::current();
        assert!(window.contains(now));
    }

    #[test]
    fn test_spring_forward_day_is_23_hours() {
        let noon = New_York.with_ymd_and_hms(2026, 3, 8, 12, 0, 0).unwrap();
        let window = DayWindow::containing(&noon);
        assert_eq!(window.start, Utc.with_ymd_and_hms(2026, 3, 8, 5, 0, 0).unwrap());
        assert_eq!(window.end, Utc.with_ymd_and_hms(2026, 3, 9, 4, 0, 0).unwrap());
        assert_eq!(window.end - window.start, Duration::hours(23));
    }

    #[test]
    fn test_fall_back_day_is_25_hours() {
        let noon = New_York.with_ymd_and_hms(2026, 11, 1, 12, 0, 0).unwrap();
        let window = DayWindow::containing(&noon);
        assert_eq!(window.start, Utc.with_ymd_and_hms(2026, 11, 1, 4, 0, 0).unwrap());
        assert_eq!(window.end, Utc.with_ymd_and_hms(2026, 11, 2, 5, 0, 0).unwrap());
        assert_eq!(window.end - window.start, Duration::hours(25));
    }

    #[test]
    fn test_skipped_midnight_starts_at_first_valid_time() {
        // 00:00 jumps straight to 01:00 -02.
        let noon = Sao_Paulo.with_ymd_and_hms(2018, 11, 4, 12, 0, 0).unwrap();
        let window = DayWindow::containing(&noon);
        assert_eq!(window.start, Utc.with_ymd_and_hms(2018, 11, 4, 3, 0, 0).unwrap());
        assert_eq!(window.end, Utc.with_ymd_and_hms(2018, 11, 5, 2, 0, 0).unwrap());

        // The previous day ends where this one starts.
        let eve = Sao_Paulo.with_ymd_and_hms(2018, 11, 3, 20, 0, 0).unwrap();
        assert_eq!(DayWindow::containing(&eve).end, window.start);
    }

    #[test]
    fn test_ambiguous_midnight_takes_earlier_instant() {
        // 01:00 CDT falls back to 00:00 CST, so midnight happens twice.
        let noon = Havana.with_ymd_and_hms(2025, 11, 2, 12, 0, 0).unwrap();
        let window = DayWindow::containing(&noon);
        assert_eq!(window.start, Utc.with_ymd_and_hms(2025, 11, 2, 4, 0, 0).unwrap());
        assert_eq!(window.end, Utc.with_ymd_and_hms(2025, 11, 3, 5, 0, 0).unwrap());
        assert!(window.contains(Utc.with_ymd_and_hms(2025, 11, 2, 5, 30, 0).unwrap()));
    }

    #[test]
    fn test_completed_ids_only_counts_window() {
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap();
        let window = DayWindow::containing(&now);
        let completions = vec![
            completion("H1", now - Duration::hours(2)),
            completion("H2", now - Duration::days(1)),
            completion("H3", window.end),
        ];

        let done = completed_habit_ids(&completions, &window);
        assert!(done.contains("H1"));
        assert!(!done.contains("H2"));
        assert!(!done.contains("H3"));
    }

    #[test]
    fn test_outcome_accessors() {
        let h = habit("H1", 1);
        let outcome = CompletionOutcome::AlreadyCompleted { habit: h.clone() };
        assert_eq!(outcome.habit(), &h);
        assert!(!outcome.was_recorded());
    }
}
