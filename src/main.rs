//! Nudge CLI
//!
//! A conversational assistant with a background reminder scheduler. Runs a
//! read-eval loop on stdin; scheduled reminders are delivered through the
//! same agent and land in the same conversation log.

use clap::Parser;
use nudge::memory::{MemoryArchive, SharedMemory};
use nudge::scheduler::{AgentExecutor, Scheduler, TaskStore};
use nudge::tools::SchedulerTools;
use nudge::{Agent, AppConfig, ChatClient};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Nudge - a reminder-scheduling chat assistant
#[derive(Parser, Debug)]
#[command(name = "nudge")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to the task state file
    #[arg(long)]
    tasks_file: Option<PathBuf>,

    /// Verbose output: show scheduler and tool activity
    #[arg(short, long)]
    verbose: bool,

    /// One-shot prompt; when given, answer it and exit
    #[arg(trailing_var_arg = true)]
    prompt: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = AppConfig::load(cli.config.as_deref());
    let state_dir = config.state_dir();
    std::fs::create_dir_all(&state_dir)?;
    info!("State directory: {}", state_dir.display());

    let archive = MemoryArchive::new(
        ChatClient::new(&config.ai)?,
        nudge::prompt::PromptStore::new(config.paths.prompt_dir.clone()).get("summary")?,
        config.archive_dir(),
        config.memory_index_file(),
    );
    let memory = SharedMemory::with_summarizer(Arc::new(archive));

    let tasks_file = cli.tasks_file.unwrap_or_else(|| config.tasks_file());
    let scheduler = Scheduler::new(TaskStore::new(tasks_file));

    let tools = Arc::new(SchedulerTools::new(scheduler.clone(), memory.clone()));
    let agent = Arc::new(Agent::new(&config, memory.clone(), tools.clone())?);

    // Scheduled tasks speak through their own lazily built agent so a fired
    // reminder never waits on the foreground turn.
    let executor = {
        let config = config.clone();
        let memory = memory.clone();
        let tools = tools.clone();
        AgentExecutor::new(Box::new(move || {
            Agent::new(&config, memory.clone(), tools.clone())
        }))
    };
    scheduler.start(Arc::new(executor));

    let result = if cli.prompt.is_empty() {
        run_repl(&agent, &scheduler, &memory).await
    } else {
        run_once(&agent, cli.prompt.join(" ")).await
    };

    scheduler.stop().await;
    result
}

async fn run_once(agent: &Agent, prompt: String) -> anyhow::Result<()> {
    let reply = agent.chat(&prompt).await?;
    println!("{reply}");
    Ok(())
}

async fn run_repl(
    agent: &Agent,
    scheduler: &Scheduler,
    memory: &SharedMemory,
) -> anyhow::Result<()> {
    println!("Type a message, or /help for commands.");

    let (line_tx, mut line_rx) = mpsc::channel::<String>(32);
    std::thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if line_tx.blocking_send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    eprintln!("Error reading stdin: {e}");
                    break;
                }
            }
        }
    });

    print_prompt();
    while let Some(line) = line_rx.recv().await {
        let line = line.trim();
        if line.is_empty() {
            print_prompt();
            continue;
        }
        if let Some(command) = line.strip_prefix('/') {
            if !handle_command(command, scheduler, memory).await {
                break;
            }
            print_prompt();
            continue;
        }
        match agent.chat(line).await {
            Ok(reply) => println!("{reply}"),
            Err(e) => eprintln!("Error: {e}"),
        }
        print_prompt();
    }
    Ok(())
}

fn print_prompt() {
    print!("> ");
    let _ = io::stdout().flush();
}

/// Handle a slash command. Returns false when the loop should exit.
async fn handle_command(command: &str, scheduler: &Scheduler, memory: &SharedMemory) -> bool {
    let mut parts = command.split_whitespace();
    let name = parts.next().unwrap_or_default();
    let args: Vec<&str> = parts.collect();

    match name {
        "quit" | "exit" => return false,
        "help" => {
            println!("/tasks                     list scheduled tasks");
            println!("/once <secs> <message>     schedule a one-shot reminder");
            println!("/every <secs> <n> <msg>    schedule a repeating reminder (-1 = unlimited)");
            println!("/daily <HH:MM> <message>   schedule a daily reminder");
            println!("/cancel <id>               cancel a task");
            println!("/pause <id>                pause a task");
            println!("/resume <id>               resume a task");
            println!("/clear                     archive and reset the conversation");
            println!("/quit                      exit");
        }
        "tasks" => {
            let tasks = scheduler.list_tasks();
            if tasks.is_empty() {
                println!("No scheduled tasks.");
            }
            for task in tasks {
                let state = if task.active { "active" } else { "paused" };
                println!("{} [{state}] {} ({})", task.id, task.schedule, task.message);
            }
        }
        "once" => match parse_once(&args) {
            Ok((delay, message)) => report(scheduler.schedule_once(message, delay, None)),
            Err(e) => println!("{e}"),
        },
        "every" => match parse_every(&args) {
            Ok((every, count, message)) => {
                report(scheduler.schedule_interval(message, every, count, None))
            }
            Err(e) => println!("{e}"),
        },
        "daily" => match parse_daily(&args) {
            Ok((hour, minute, message)) => {
                report(scheduler.schedule_daily(message, hour, minute, None))
            }
            Err(e) => println!("{e}"),
        },
        "cancel" => report_found(args.first().map(|id| scheduler.cancel(id)), &args),
        "pause" => report_found(args.first().map(|id| scheduler.pause(id)), &args),
        "resume" => report_found(args.first().map(|id| scheduler.resume(id)), &args),
        "clear" => {
            memory.clear().await;
            println!("Conversation archived and cleared.");
        }
        other => println!("Unknown command /{other}, try /help."),
    }
    true
}

fn report(result: nudge::Result<String>) {
    match result {
        Ok(id) => println!("Scheduled {id}."),
        Err(e) => println!("Error: {e}"),
    }
}

fn report_found(outcome: Option<bool>, args: &[&str]) {
    match outcome {
        Some(true) => println!("Done."),
        Some(false) => println!("No task named {}.", args[0]),
        None => println!("Usage: give a task id."),
    }
}

fn parse_once(args: &[&str]) -> Result<(i64, String), String> {
    let (secs, rest) = args
        .split_first()
        .ok_or("Usage: /once <secs> <message>")?;
    let delay: i64 = secs.parse().map_err(|_| format!("Bad delay '{secs}'."))?;
    if rest.is_empty() {
        return Err("Usage: /once <secs> <message>".into());
    }
    Ok((delay, rest.join(" ")))
}

fn parse_every(args: &[&str]) -> Result<(i64, i64, String), String> {
    if args.len() < 3 {
        return Err("Usage: /every <secs> <count> <message>".into());
    }
    let every: i64 = args[0]
        .parse()
        .map_err(|_| format!("Bad interval '{}'.", args[0]))?;
    let count: i64 = args[1]
        .parse()
        .map_err(|_| format!("Bad count '{}'.", args[1]))?;
    Ok((every, count, args[2..].join(" ")))
}

fn parse_daily(args: &[&str]) -> Result<(u8, u8, String), String> {
    let (time, rest) = args
        .split_first()
        .ok_or("Usage: /daily <HH:MM> <message>")?;
    let (h, m) = time
        .split_once(':')
        .ok_or_else(|| format!("Bad time '{time}', expected HH:MM."))?;
    let hour: u8 = h.parse().map_err(|_| format!("Bad hour '{h}'."))?;
    let minute: u8 = m.parse().map_err(|_| format!("Bad minute '{m}'."))?;
    if rest.is_empty() {
        return Err("Usage: /daily <HH:MM> <message>".into());
    }
    Ok((hour, minute, rest.join(" ")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_once() {
        assert_eq!(
            parse_once(&["90", "stretch", "your", "legs"]).unwrap(),
            (90, "stretch your legs".to_string())
        );
        assert!(parse_once(&["soon", "hi"]).is_err());
        assert!(parse_once(&["90"]).is_err());
    }

    #[test]
    fn test_parse_every() {
        assert_eq!(
            parse_every(&["3600", "-1", "drink", "water"]).unwrap(),
            (3600, -1, "drink water".to_string())
        );
        assert!(parse_every(&["3600", "water"]).is_err());
    }

    #[test]
    fn test_parse_daily() {
        assert_eq!(
            parse_daily(&["08:30", "standup"]).unwrap(),
            (8, 30, "standup".to_string())
        );
        assert!(parse_daily(&["830", "standup"]).is_err());
        assert!(parse_daily(&["08:30"]).is_err());
    }
}
