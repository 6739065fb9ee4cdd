//! Task persistence.
//!
//! Tasks and the id counter live in one JSON file. Loading is fail-soft: a
//! missing, empty, or malformed file yields an empty task set, never an
//! error. Saving drops tasks that can no longer fire.

use super::task::{next_daily_occurrence, now_local, offset_from, Task, Trigger, TriggerKind, TIME_FORMAT};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Flat on-disk record for one task.
#[derive(Debug, Serialize, Deserialize)]
struct TaskRecord {
    id: String,
    message: String,
    task_type: String,
    is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    interval_seconds: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    interval_count: Option<i64>,
    /// `"HH:MM"` for daily tasks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    daily_time: Option<String>,
}

/// Top-level persisted document.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    tasks: Vec<TaskRecord>,
    #[serde(default)]
    counter: u64,
}

/// Loads and saves the full task set.
#[derive(Debug, Clone)]
pub struct TaskStore {
    path: PathBuf,
}

impl TaskStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load all tasks and the id counter.
    ///
    /// Never fails: unreadable or unparsable state comes back as an empty
    /// set with counter 0, and individually broken records are skipped.
    pub fn load(&self) -> (Vec<Task>, u64) {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no task file at {}, starting empty", self.path.display());
                return (Vec::new(), 0);
            }
            Err(e) => {
                warn!("cannot read task file {}: {e}", self.path.display());
                return (Vec::new(), 0);
            }
        };

        if content.trim().is_empty() {
            return (Vec::new(), 0);
        }

        let file: StoreFile = match serde_json::from_str(&content) {
            Ok(f) => f,
            Err(e) => {
                warn!("malformed task file {}: {e}", self.path.display());
                return (Vec::new(), 0);
            }
        };

        let tasks: Vec<Task> = file
            .tasks
            .into_iter()
            .filter_map(|record| {
                let id = record.id.clone();
                match task_from_record(record) {
                    Some(task) => Some(task),
                    None => {
                        warn!("skipping unreadable task record '{id}'");
                        None
                    }
                }
            })
            .collect();

        debug!(
            "loaded {} tasks (counter {}) from {}",
            tasks.len(),
            file.counter,
            self.path.display()
        );
        (tasks, file.counter)
    }

    /// Persist tasks that can still fire, plus the id counter.
    ///
    /// Filters out inactive tasks, elapsed one-shot tasks, and interval
    /// tasks with an exhausted count. Daily tasks are always kept.
    pub fn save(&self, tasks: &[Task], counter: u64) -> crate::Result<()> {
        let now = now_local();
        let records: Vec<TaskRecord> = tasks
            .iter()
            .filter(|task| should_persist(task, now))
            .map(record_from_task)
            .collect();

        let file = StoreFile {
            tasks: records,
            counter,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(&file)?;
        std::fs::write(&self.path, content)?;
        debug!("saved {} tasks to {}", file.tasks.len(), self.path.display());
        Ok(())
    }
}

/// Persistence filter of the save rules.
fn should_persist(task: &Task, now: NaiveDateTime) -> bool {
    if !task.active {
        return false;
    }
    match &task.trigger {
        Trigger::Once { target, .. } => now < *target,
        Trigger::Interval { remaining, .. } => *remaining != 0,
        Trigger::Daily { .. } => true,
    }
}

fn record_from_task(task: &Task) -> TaskRecord {
    let mut record = TaskRecord {
        id: task.id.clone(),
        message: task.message.clone(),
        task_type: task.trigger.kind().as_str().to_string(),
        is_active: task.active,
        target_time: None,
        interval_seconds: None,
        interval_count: None,
        daily_time: None,
    };
    match &task.trigger {
        Trigger::Once { target, .. } => {
            record.target_time = Some(target.format(TIME_FORMAT).to_string());
        }
        Trigger::Interval {
            every_secs,
            remaining,
            target,
        } => {
            record.interval_seconds = Some(*every_secs);
            record.interval_count = Some(*remaining);
            record.target_time = Some(target.format(TIME_FORMAT).to_string());
        }
        Trigger::Daily {
            hour,
            minute,
            target,
        } => {
            record.daily_time = Some(format!("{hour:02}:{minute:02}"));
            record.target_time = target.map(|t| t.format(TIME_FORMAT).to_string());
        }
    }
    record
}

fn task_from_record(record: TaskRecord) -> Option<Task> {
    let target_time = match &record.target_time {
        Some(s) => Some(NaiveDateTime::parse_from_str(s, TIME_FORMAT).ok()?),
        None => None,
    };

    let trigger = match record.task_type.as_str() {
        "once" => Trigger::Once {
            target: target_time?,
            // Original delay is not persisted; resume keeps the stored target.
            delay_secs: None,
        },
        "interval" => {
            let every_secs = record.interval_seconds?;
            Trigger::Interval {
                every_secs,
                remaining: record.interval_count.unwrap_or(-1),
                target: target_time.unwrap_or_else(|| offset_from(now_local(), every_secs)),
            }
        }
        "daily" => {
            let (hour, minute) = parse_daily_time(record.daily_time.as_deref()?)?;
            Trigger::Daily {
                hour,
                minute,
                target: target_time.or_else(|| Some(next_daily_occurrence(now_local(), hour, minute))),
            }
        }
        _ => return None,
    };

    Some(Task {
        id: record.id,
        message: record.message,
        active: record.is_active,
        trigger,
    })
}

/// Parse `"HH:MM"` into a validated (hour, minute) pair.
fn parse_daily_time(s: &str) -> Option<(u8, u8)> {
    let (h, m) = s.split_once(':')?;
    let hour: u8 = h.parse().ok()?;
    let minute: u8 = m.parse().ok()?;
    if hour > 23 || minute > 59 {
        return None;
    }
    Some((hour, minute))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> TaskStore {
        TaskStore::new(dir.path().join("tasks.json"))
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let (tasks, counter) = store_in(&dir).load();
        assert!(tasks.is_empty());
        assert_eq!(counter, 0);
    }

    #[test]
    fn test_empty_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), "   \n").unwrap();
        let (tasks, counter) = store.load();
        assert!(tasks.is_empty());
        assert_eq!(counter, 0);
    }

    #[test]
    fn test_malformed_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), "{not json at all").unwrap();
        let (tasks, counter) = store.load();
        assert!(tasks.is_empty());
        assert_eq!(counter, 0);
    }

    #[test]
    fn test_round_trip_preserves_tasks() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let tasks = vec![
            Task::once("once_1", "drink water", 3600),
            Task::interval("interval_1", "stretch", 60, -1),
            Task::daily("daily_1", "good morning", 8, 0),
        ];
        store.save(&tasks, 3).unwrap();

        let (loaded, counter) = store.load();
        assert_eq!(counter, 3);
        assert_eq!(loaded.len(), 3);

        let daily = loaded.iter().find(|t| t.id == "daily_1").unwrap();
        match &daily.trigger {
            Trigger::Daily { hour, minute, target } => {
                assert_eq!((*hour, *minute), (8, 0));
                assert!(target.is_some());
            }
            _ => panic!("expected daily"),
        }
    }

    #[test]
    fn test_save_load_save_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let tasks = vec![
            Task::once("once_1", "a", 3600),
            Task::interval("interval_1", "b", 60, 5),
            Task::daily("daily_1", "c", 23, 59),
        ];
        store.save(&tasks, 7).unwrap();
        let first = std::fs::read_to_string(store.path()).unwrap();

        let (loaded, counter) = store.load();
        store.save(&loaded, counter).unwrap();
        let second = std::fs::read_to_string(store.path()).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_save_filters_spent_tasks() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let mut paused = Task::daily("daily_2", "paused", 9, 0);
        paused.active = false;

        let elapsed_once = Task {
            id: "once_1".into(),
            message: "gone".into(),
            active: true,
            trigger: Trigger::Once {
                target: now_local() - Duration::seconds(5),
                delay_secs: Some(1),
            },
        };

        let tasks = vec![
            elapsed_once,
            Task::interval("interval_1", "spent", 60, 0),
            Task::daily("daily_1", "kept", 8, 0),
            paused,
        ];
        store.save(&tasks, 4).unwrap();

        let (loaded, _) = store.load();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, "daily_1");
    }

    #[test]
    fn test_wire_layout_matches_contract() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        store
            .save(&[Task::daily("daily_1", "hello", 8, 0)], 1)
            .unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();

        assert_eq!(json["counter"], 1);
        let task = &json["tasks"][0];
        assert_eq!(task["id"], "daily_1");
        assert_eq!(task["task_type"], "daily");
        assert_eq!(task["is_active"], true);
        assert_eq!(task["daily_time"], "08:00");
        // target_time uses the fixed "YYYY-MM-DD HH:MM:SS" text form.
        let target = task["target_time"].as_str().unwrap();
        assert!(NaiveDateTime::parse_from_str(target, TIME_FORMAT).is_ok());
        // No interval fields on a daily record.
        assert!(task.get("interval_seconds").is_none());
    }

    #[test]
    fn test_broken_record_is_skipped() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let content = r#"{
            "tasks": [
                {"id": "bad_1", "message": "x", "task_type": "once",
                 "is_active": true, "target_time": "not a time"},
                {"id": "interval_1", "message": "y", "task_type": "interval",
                 "is_active": true, "interval_seconds": 60, "interval_count": -1,
                 "target_time": "2030-01-01 12:00:00"}
            ],
            "counter": 2
        }"#;
        std::fs::write(store.path(), content).unwrap();

        let (loaded, counter) = store.load();
        assert_eq!(counter, 2);
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, "interval_1");
    }

    #[test]
    fn test_huge_persisted_interval_loads_without_panicking() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let content = format!(
            r#"{{"tasks": [{{"id": "interval_1", "message": "x", "task_type": "interval",
                "is_active": true, "interval_seconds": {}, "interval_count": -1}}],
                "counter": 1}}"#,
            i64::MAX
        );
        std::fs::write(store.path(), content).unwrap();

        let (loaded, _) = store.load();
        assert_eq!(loaded.len(), 1);
        // Saturated target: scheduled so far out it never fires.
        assert!(!loaded[0].is_due(now_local() + Duration::days(365)));
    }

    #[test]
    fn test_parse_daily_time_rejects_out_of_range() {
        assert_eq!(parse_daily_time("08:30"), Some((8, 30)));
        assert_eq!(parse_daily_time("24:00"), None);
        assert_eq!(parse_daily_time("12:60"), None);
        assert_eq!(parse_daily_time("nope"), None);
    }
}
