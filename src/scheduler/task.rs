//! Schedulable task definitions and per-trigger firing rules.
//!
//! A [`Task`] carries a message payload and a [`Trigger`] describing when it
//! fires. All trigger arithmetic lives here so the polling loop stays a
//! single exhaustive match away from the rules.

use chrono::{Duration, Local, NaiveDateTime};
use serde::Serialize;

/// Timestamp format used for persisted target times.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Largest accepted delay or interval magnitude, in seconds (~100 years).
pub const MAX_SCHEDULE_SECS: i64 = 3_200_000_000;

/// Current local wall-clock time, naive (no offset).
pub fn now_local() -> NaiveDateTime {
    Local::now().naive_local()
}

/// `base + secs`, saturating to the far future instead of panicking when the
/// offset exceeds what the datetime arithmetic supports. A saturated target
/// is never due.
pub(crate) fn offset_from(base: NaiveDateTime, secs: i64) -> NaiveDateTime {
    Duration::try_seconds(secs)
        .and_then(|d| base.checked_add_signed(d))
        .unwrap_or(NaiveDateTime::MAX)
}

/// Trigger kind, used for id prefixes and the persisted `task_type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    Once,
    Interval,
    Daily,
}

impl TriggerKind {
    /// Wire name, also the default id prefix (`once_3`, `daily_1`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Once => "once",
            Self::Interval => "interval",
            Self::Daily => "daily",
        }
    }
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// When a task fires.
#[derive(Debug, Clone)]
pub enum Trigger {
    /// Fire exactly once at `target`.
    Once {
        target: NaiveDateTime,
        /// Delay the task was created with. Known only for tasks created in
        /// this process; tasks loaded from disk carry `None` and keep their
        /// stored target on resume.
        delay_secs: Option<i64>,
    },
    /// Fire every `every_secs` seconds, `remaining` more times (-1 = unlimited).
    Interval {
        every_secs: i64,
        remaining: i64,
        target: NaiveDateTime,
    },
    /// Fire daily at `hour:minute`. `target` is the next occurrence, always
    /// strictly in the future when set.
    Daily {
        hour: u8,
        minute: u8,
        target: Option<NaiveDateTime>,
    },
}

impl Trigger {
    pub fn kind(&self) -> TriggerKind {
        match self {
            Self::Once { .. } => TriggerKind::Once,
            Self::Interval { .. } => TriggerKind::Interval,
            Self::Daily { .. } => TriggerKind::Daily,
        }
    }

    /// Next fire time, if one is currently set.
    pub fn next_fire(&self) -> Option<NaiveDateTime> {
        match self {
            Self::Once { target, .. } => Some(*target),
            Self::Interval { target, .. } => Some(*target),
            Self::Daily { target, .. } => *target,
        }
    }
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Once { target, .. } => write!(f, "once at {}", target.format(TIME_FORMAT)),
            Self::Interval {
                every_secs,
                remaining,
                ..
            } => {
                if *remaining < 0 {
                    write!(f, "every {every_secs}s")
                } else {
                    write!(f, "every {every_secs}s ({remaining} left)")
                }
            }
            Self::Daily { hour, minute, .. } => write!(f, "daily at {hour:02}:{minute:02}"),
        }
    }
}

/// A schedulable unit: message payload plus trigger state.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: String,
    /// Payload delivered to the agent on each fire.
    pub message: String,
    /// Inactive tasks are skipped by the loop and dropped from persistence.
    pub active: bool,
    pub trigger: Trigger,
}

impl Task {
    pub fn once(id: impl Into<String>, message: impl Into<String>, delay_secs: i64) -> Self {
        Self {
            id: id.into(),
            message: message.into(),
            active: true,
            trigger: Trigger::Once {
                target: offset_from(now_local(), delay_secs),
                delay_secs: Some(delay_secs),
            },
        }
    }

    pub fn interval(
        id: impl Into<String>,
        message: impl Into<String>,
        every_secs: i64,
        count: i64,
    ) -> Self {
        Self {
            id: id.into(),
            message: message.into(),
            active: true,
            trigger: Trigger::Interval {
                every_secs,
                remaining: count,
                target: offset_from(now_local(), every_secs),
            },
        }
    }

    /// Caller validates hour/minute ranges before constructing.
    pub fn daily(id: impl Into<String>, message: impl Into<String>, hour: u8, minute: u8) -> Self {
        let now = now_local();
        Self {
            id: id.into(),
            message: message.into(),
            active: true,
            trigger: Trigger::Daily {
                hour,
                minute,
                target: Some(next_daily_occurrence(now, hour, minute)),
            },
        }
    }

    /// Returns `true` if the task is active and due as of `now`.
    pub fn is_due(&self, now: NaiveDateTime) -> bool {
        if !self.active {
            return false;
        }
        match &self.trigger {
            Trigger::Once { target, .. } => now >= *target,
            Trigger::Interval {
                remaining, target, ..
            } => now >= *target && (*remaining < 0 || *remaining > 0),
            Trigger::Daily { target, .. } => match target {
                None => true,
                Some(t) => now >= *t,
            },
        }
    }

    /// Apply per-trigger bookkeeping for a fire at `now`.
    ///
    /// Once deactivates; Interval advances its target and burns one count
    /// unless unlimited; Daily moves its target to the next strictly-future
    /// occurrence of its hour:minute.
    pub fn fire(&mut self, now: NaiveDateTime) {
        match &mut self.trigger {
            Trigger::Once { .. } => {
                self.active = false;
            }
            Trigger::Interval {
                every_secs,
                remaining,
                target,
            } => {
                *target = offset_from(now, *every_secs);
                if *remaining > 0 {
                    *remaining -= 1;
                }
            }
            Trigger::Daily {
                hour,
                minute,
                target,
            } => {
                *target = Some(next_daily_occurrence(now, *hour, *minute));
            }
        }
    }

    /// Recompute the target from `now`, used when a paused task resumes.
    ///
    /// Interval restarts a full period; Daily picks the next future
    /// occurrence; Once reinstates its original delay when that is known and
    /// otherwise keeps the stored target.
    pub fn reschedule(&mut self, now: NaiveDateTime) {
        match &mut self.trigger {
            Trigger::Once { target, delay_secs } => {
                if let Some(delay) = delay_secs {
                    *target = offset_from(now, *delay);
                }
            }
            Trigger::Interval {
                every_secs, target, ..
            } => {
                *target = offset_from(now, *every_secs);
            }
            Trigger::Daily {
                hour,
                minute,
                target,
            } => {
                *target = Some(next_daily_occurrence(now, *hour, *minute));
            }
        }
    }

    /// Read-only snapshot row for task listings.
    pub fn summary(&self, now: NaiveDateTime) -> TaskSummary {
        let next_fire = self.trigger.next_fire();
        TaskSummary {
            id: self.id.clone(),
            message: self.message.clone(),
            kind: self.trigger.kind(),
            active: self.active,
            schedule: self.trigger.to_string(),
            next_fire,
            remaining_secs: next_fire.map(|t| (t - now).num_seconds()),
        }
    }
}

/// One row of [`Scheduler::list_tasks`](crate::Scheduler::list_tasks).
#[derive(Debug, Clone, Serialize)]
pub struct TaskSummary {
    pub id: String,
    pub message: String,
    pub kind: TriggerKind,
    pub active: bool,
    /// Human-readable trigger description.
    pub schedule: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_fire: Option<NaiveDateTime>,
    /// Seconds until the next fire; negative when already due.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_secs: Option<i64>,
}

/// Next occurrence of `hour:minute`, strictly after `now`.
///
/// Same-day if that time is still ahead, otherwise tomorrow. Hour/minute are
/// validated at scheduling time, so the fallback arm is unreachable in
/// practice.
pub fn next_daily_occurrence(now: NaiveDateTime, hour: u8, minute: u8) -> NaiveDateTime {
    let candidate = now
        .date()
        .and_hms_opt(u32::from(hour), u32::from(minute), 0)
        .unwrap_or(now);
    if candidate <= now {
        candidate + Duration::days(1)
    } else {
        candidate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, TIME_FORMAT).unwrap()
    }

    #[test]
    fn test_once_due_after_target() {
        let task = Task::once("once_1", "ping", 2);
        assert!(!task.is_due(now_local()));
        assert!(task.is_due(now_local() + Duration::seconds(3)));
    }

    #[test]
    fn test_once_fire_deactivates() {
        let mut task = Task::once("once_1", "ping", 0);
        task.fire(now_local());
        assert!(!task.active);
        assert!(!task.is_due(now_local() + Duration::hours(1)));
    }

    #[test]
    fn test_inactive_never_due() {
        let mut task = Task::interval("interval_1", "tick", 0, -1);
        task.active = false;
        assert!(!task.is_due(now_local() + Duration::hours(1)));
    }

    #[test]
    fn test_interval_advances_and_decrements() {
        let mut task = Task::interval("interval_1", "tick", 60, 2);
        let now = now_local() + Duration::seconds(61);
        assert!(task.is_due(now));
        task.fire(now);
        match &task.trigger {
            Trigger::Interval {
                remaining, target, ..
            } => {
                assert_eq!(*remaining, 1);
                assert_eq!(*target, now + Duration::seconds(60));
            }
            _ => panic!("expected interval"),
        }
    }

    #[test]
    fn test_interval_exhausted_not_due() {
        let mut task = Task::interval("interval_1", "tick", 0, 1);
        let now = now_local() + Duration::seconds(1);
        assert!(task.is_due(now));
        task.fire(now);
        // Count burned down to zero: never due again.
        assert!(!task.is_due(now + Duration::hours(1)));
    }

    #[test]
    fn test_interval_unlimited_never_exhausts() {
        let mut task = Task::interval("interval_1", "tick", 0, -1);
        for _ in 0..5 {
            let now = now_local() + Duration::seconds(1);
            assert!(task.is_due(now));
            task.fire(now);
        }
    }

    #[test]
    fn test_daily_target_strictly_future() {
        let now = at("2024-06-01 12:30:00");
        // Earlier today rolls to tomorrow.
        assert_eq!(
            next_daily_occurrence(now, 8, 0),
            at("2024-06-02 08:00:00")
        );
        // Later today stays today.
        assert_eq!(
            next_daily_occurrence(now, 20, 15),
            at("2024-06-01 20:15:00")
        );
        // Exactly now rolls to tomorrow (strict).
        assert_eq!(
            next_daily_occurrence(now, 12, 30),
            at("2024-06-02 12:30:00")
        );
    }

    #[test]
    fn test_daily_fire_resets_target_after_now() {
        let mut task = Task::daily("daily_1", "morning", 8, 0);
        let now = at("2024-06-01 08:00:30");
        task.fire(now);
        match &task.trigger {
            Trigger::Daily { target, .. } => {
                assert_eq!(*target, Some(at("2024-06-02 08:00:00")));
            }
            _ => panic!("expected daily"),
        }
        assert!(!task.is_due(now + Duration::minutes(1)));
    }

    #[test]
    fn test_daily_unset_target_is_due() {
        let mut task = Task::daily("daily_1", "morning", 8, 0);
        if let Trigger::Daily { target, .. } = &mut task.trigger {
            *target = None;
        }
        assert!(task.is_due(now_local()));
    }

    #[test]
    fn test_resume_interval_restarts_full_period() {
        let mut task = Task::interval("interval_1", "tick", 120, -1);
        let later = now_local() + Duration::hours(3);
        task.reschedule(later);
        assert_eq!(task.trigger.next_fire(), Some(later + Duration::seconds(120)));
    }

    #[test]
    fn test_resume_once_reinstates_original_delay() {
        let mut task = Task::once("once_1", "ping", 30);
        let later = now_local() + Duration::hours(1);
        task.reschedule(later);
        assert_eq!(task.trigger.next_fire(), Some(later + Duration::seconds(30)));
    }

    #[test]
    fn test_resume_once_without_delay_keeps_target() {
        let target = at("2024-06-01 09:00:00");
        let mut task = Task {
            id: "once_1".into(),
            message: "ping".into(),
            active: true,
            trigger: Trigger::Once {
                target,
                delay_secs: None,
            },
        };
        task.reschedule(at("2024-06-01 10:00:00"));
        assert_eq!(task.trigger.next_fire(), Some(target));
    }

    #[test]
    fn test_summary_remaining_secs() {
        let now = at("2024-06-01 12:00:00");
        let task = Task {
            id: "once_1".into(),
            message: "ping".into(),
            active: true,
            trigger: Trigger::Once {
                target: at("2024-06-01 12:01:30"),
                delay_secs: Some(90),
            },
        };
        let summary = task.summary(now);
        assert_eq!(summary.remaining_secs, Some(90));
        assert_eq!(summary.kind, TriggerKind::Once);
    }

    #[test]
    fn test_extreme_delay_saturates_instead_of_panicking() {
        // Out-of-range offsets land at the far future and never fire.
        let task = Task::once("once_1", "boom", i64::MAX);
        assert!(!task.is_due(now_local() + Duration::days(365)));
        assert_eq!(task.trigger.next_fire(), Some(NaiveDateTime::MAX));

        let mut task = Task::interval("interval_1", "boom", i64::MAX, -1);
        task.fire(now_local());
        task.reschedule(now_local());
        assert!(!task.is_due(now_local() + Duration::days(365)));

        let task = Task::once("once_2", "boom", i64::MIN);
        assert!(!task.is_due(now_local()));
    }

    #[test]
    fn test_trigger_display() {
        assert_eq!(
            Task::interval("i", "m", 60, -1).trigger.to_string(),
            "every 60s"
        );
        assert_eq!(
            Task::interval("i", "m", 60, 3).trigger.to_string(),
            "every 60s (3 left)"
        );
        assert_eq!(Task::daily("d", "m", 8, 5).trigger.to_string(), "daily at 08:05");
    }
}
