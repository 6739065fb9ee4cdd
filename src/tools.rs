//! Tool surface exposed to the model.
//!
//! `SchedulerTools` maps the scheduler and shared memory onto the OpenAI
//! function-calling schema. Dispatch failures are reported back to the model
//! as plain strings so a bad argument never aborts a conversation turn.

use crate::memory::SharedMemory;
use crate::scheduler::Scheduler;
use futures::future::{BoxFuture, FutureExt};
use serde_json::{json, Value};

/// Seam between the agent's completion loop and whatever tools it carries.
pub trait ToolDispatcher: Send + Sync {
    /// Tool definitions in the chat-completions `tools` wire format.
    fn definitions(&self) -> Vec<Value>;

    /// Run one tool call. The returned string goes back to the model verbatim.
    fn dispatch(&self, name: &str, args: &Value) -> BoxFuture<'_, crate::Result<String>>;
}

/// Scheduling and memory tools backed by a live [`Scheduler`].
#[derive(Clone)]
pub struct SchedulerTools {
    scheduler: Scheduler,
    memory: SharedMemory,
}

impl SchedulerTools {
    pub fn new(scheduler: Scheduler, memory: SharedMemory) -> Self {
        Self { scheduler, memory }
    }

    async fn run(&self, name: &str, args: &Value) -> String {
        match name {
            "once_after" => {
                let message = str_arg(args, "message");
                let Some(delay) = int_arg(args, "delay_seconds") else {
                    return missing_arg("delay_seconds");
                };
                match self.scheduler.schedule_once(message, delay, None) {
                    Ok(id) => format!("Scheduled one-shot task {id} in {delay}s."),
                    Err(e) => format!("Could not schedule: {e}"),
                }
            }
            "interval_every" => {
                let message = str_arg(args, "message");
                let Some(every) = int_arg(args, "interval_seconds") else {
                    return missing_arg("interval_seconds");
                };
                let count = int_arg(args, "interval_count").unwrap_or(-1);
                match self.scheduler.schedule_interval(message, every, count, None) {
                    Ok(id) => {
                        let times = if count < 0 {
                            "unlimited".to_string()
                        } else {
                            format!("{count}")
                        };
                        format!("Scheduled task {id} every {every}s ({times} runs).")
                    }
                    Err(e) => format!("Could not schedule: {e}"),
                }
            }
            "daily_at" => {
                let message = str_arg(args, "message");
                let Some(hour) = int_arg(args, "hour") else {
                    return missing_arg("hour");
                };
                let Some(minute) = int_arg(args, "minute") else {
                    return missing_arg("minute");
                };
                let (Ok(h), Ok(m)) = (u8::try_from(hour), u8::try_from(minute)) else {
                    return format!("Could not schedule: invalid time {hour}:{minute}");
                };
                match self.scheduler.schedule_daily(message, h, m, None) {
                    Ok(id) => format!("Scheduled daily task {id} at {h:02}:{m:02}."),
                    Err(e) => format!("Could not schedule: {e}"),
                }
            }
            "cancel_task" => {
                let id = str_arg(args, "task_id");
                if self.scheduler.cancel(&id) {
                    format!("Cancelled task {id}.")
                } else {
                    format!("No task named {id}.")
                }
            }
            "pause_task" => {
                let id = str_arg(args, "task_id");
                if self.scheduler.pause(&id) {
                    format!("Paused task {id}.")
                } else {
                    format!("No task named {id}.")
                }
            }
            "resume_task" => {
                let id = str_arg(args, "task_id");
                if self.scheduler.resume(&id) {
                    format!("Resumed task {id}.")
                } else {
                    format!("No task named {id}.")
                }
            }
            "list_tasks" => {
                let tasks = self.scheduler.list_tasks();
                if tasks.is_empty() {
                    "No scheduled tasks.".to_string()
                } else {
                    tasks
                        .iter()
                        .map(|t| {
                            let state = if t.active { "active" } else { "paused" };
                            format!("{} [{state}] {} ({})", t.id, t.schedule, t.message)
                        })
                        .collect::<Vec<_>>()
                        .join("\n")
                }
            }
            "memory_count" => {
                format!("{} messages in memory.", self.memory.len())
            }
            other => format!("Unknown tool '{other}'."),
        }
    }
}

impl ToolDispatcher for SchedulerTools {
    fn definitions(&self) -> Vec<Value> {
        vec![
            tool_def(
                "once_after",
                "Schedule a one-shot reminder after a delay.",
                json!({
                    "type": "object",
                    "properties": {
                        "message": {"type": "string", "description": "Reminder text to deliver"},
                        "delay_seconds": {"type": "integer", "description": "Seconds from now"}
                    },
                    "required": ["message", "delay_seconds"]
                }),
            ),
            tool_def(
                "interval_every",
                "Schedule a repeating reminder at a fixed interval.",
                json!({
                    "type": "object",
                    "properties": {
                        "message": {"type": "string"},
                        "interval_seconds": {"type": "integer", "description": "Seconds between runs"},
                        "interval_count": {"type": "integer", "description": "Number of runs, -1 for unlimited"}
                    },
                    "required": ["message", "interval_seconds"]
                }),
            ),
            tool_def(
                "daily_at",
                "Schedule a reminder that fires every day at a local time.",
                json!({
                    "type": "object",
                    "properties": {
                        "message": {"type": "string"},
                        "hour": {"type": "integer", "description": "Hour 0-23"},
                        "minute": {"type": "integer", "description": "Minute 0-59"}
                    },
                    "required": ["message", "hour", "minute"]
                }),
            ),
            tool_def(
                "cancel_task",
                "Cancel and remove a scheduled task by id.",
                task_id_params(),
            ),
            tool_def(
                "pause_task",
                "Pause a scheduled task without removing it.",
                task_id_params(),
            ),
            tool_def(
                "resume_task",
                "Resume a paused task.",
                task_id_params(),
            ),
            tool_def(
                "list_tasks",
                "List all scheduled tasks with their next fire times.",
                json!({"type": "object", "properties": {}}),
            ),
            tool_def(
                "memory_count",
                "Report how many messages are in conversation memory.",
                json!({"type": "object", "properties": {}}),
            ),
        ]
    }

    fn dispatch(&self, name: &str, args: &Value) -> BoxFuture<'_, crate::Result<String>> {
        let name = name.to_string();
        let args = args.clone();
        async move { Ok(self.run(&name, &args).await) }.boxed()
    }
}

fn tool_def(name: &str, description: &str, parameters: Value) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": name,
            "description": description,
            "parameters": parameters
        }
    })
}

fn task_id_params() -> Value {
    json!({
        "type": "object",
        "properties": {
            "task_id": {"type": "string", "description": "Task id, e.g. once_3"}
        },
        "required": ["task_id"]
    })
}

fn str_arg(args: &Value, key: &str) -> String {
    args.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn int_arg(args: &Value, key: &str) -> Option<i64> {
    args.get(key).and_then(Value::as_i64)
}

fn missing_arg(key: &str) -> String {
    format!("Missing or non-integer argument '{key}'.")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::TaskStore;
    use tempfile::TempDir;

    fn tools(dir: &TempDir) -> SchedulerTools {
        let store = TaskStore::new(dir.path().join("tasks.json"));
        SchedulerTools::new(Scheduler::new(store), SharedMemory::new())
    }

    #[tokio::test]
    async fn test_schedule_and_cancel_round_trip() {
        let dir = TempDir::new().unwrap();
        let tools = tools(&dir);

        let out = tools
            .dispatch("once_after", &json!({"message": "tea", "delay_seconds": 60}))
            .await
            .unwrap();
        assert!(out.contains("once_1"), "unexpected reply: {out}");

        let listing = tools.dispatch("list_tasks", &json!({})).await.unwrap();
        assert!(listing.contains("tea"));

        let gone = tools
            .dispatch("cancel_task", &json!({"task_id": "once_1"}))
            .await
            .unwrap();
        assert!(gone.contains("Cancelled"));
        let listing = tools.dispatch("list_tasks", &json!({})).await.unwrap();
        assert_eq!(listing, "No scheduled tasks.");
    }

    #[tokio::test]
    async fn test_bad_daily_arguments_reported_not_errored() {
        let dir = TempDir::new().unwrap();
        let tools = tools(&dir);
        let out = tools
            .dispatch("daily_at", &json!({"message": "m", "hour": 99, "minute": 0}))
            .await
            .unwrap();
        assert!(out.contains("Could not schedule"));
    }

    #[tokio::test]
    async fn test_missing_numeric_arguments_are_reported() {
        let dir = TempDir::new().unwrap();
        let tools = tools(&dir);

        let out = tools
            .dispatch("once_after", &json!({"message": "tea"}))
            .await
            .unwrap();
        assert!(out.contains("delay_seconds"), "unexpected reply: {out}");

        let out = tools
            .dispatch("daily_at", &json!({"message": "m", "minute": 0}))
            .await
            .unwrap();
        assert!(out.contains("hour"), "unexpected reply: {out}");

        let out = tools
            .dispatch("interval_every", &json!({"message": "m", "interval_seconds": "soon"}))
            .await
            .unwrap();
        assert!(out.contains("interval_seconds"), "unexpected reply: {out}");

        let listing = tools.dispatch("list_tasks", &json!({})).await.unwrap();
        assert_eq!(listing, "No scheduled tasks.");
    }

    #[tokio::test]
    async fn test_extreme_delay_is_refused_not_panicking() {
        let dir = TempDir::new().unwrap();
        let tools = tools(&dir);
        let out = tools
            .dispatch(
                "once_after",
                &json!({"message": "boom", "delay_seconds": i64::MAX}),
            )
            .await
            .unwrap();
        assert!(out.contains("Could not schedule"), "unexpected reply: {out}");
    }

    #[tokio::test]
    async fn test_unknown_tool_is_a_string_reply() {
        let dir = TempDir::new().unwrap();
        let tools = tools(&dir);
        let out = tools.dispatch("frobnicate", &json!({})).await.unwrap();
        assert!(out.contains("Unknown tool"));
    }

    #[tokio::test]
    async fn test_memory_count_reflects_log() {
        let dir = TempDir::new().unwrap();
        let tools = tools(&dir);
        tools.memory.append(crate::Message::user("hello"));
        let out = tools.dispatch("memory_count", &json!({})).await.unwrap();
        assert_eq!(out, "1 messages in memory.");
    }

    #[test]
    fn test_definitions_cover_all_tools() {
        let dir = TempDir::new().unwrap();
        let defs = tools(&dir).definitions();
        let names: Vec<&str> = defs
            .iter()
            .map(|d| d["function"]["name"].as_str().unwrap())
            .collect();
        for expected in [
            "once_after",
            "interval_every",
            "daily_at",
            "cancel_task",
            "pause_task",
            "resume_task",
            "list_tasks",
            "memory_count",
        ] {
            assert!(names.contains(&expected), "missing {expected}");
        }
    }
}
