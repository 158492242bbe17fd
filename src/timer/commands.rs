use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};

use crate::{
    db::{FocusSessionFilter, StoredFocusSession},
    settings::TimerSettings,
    AppState,
};

use super::{
    format::{format_clock, format_duration_short},
    state::{SessionType, TimerSnapshot, TimerStatus},
};

const DEFAULT_SESSION_LIMIT: usize = 10;

pub const HELP: &str = "\
commands:
  start pomodoro|manual <project> [task]
  switch <project> [task]
  pause | resume | stop | reset | skip
  status
  sessions [n]
  delete <session-id>
  today
  settings
  set work|short|long|cycles|auto|sound <value>
  quit";

/// One line typed at the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start {
        session_type: SessionType,
        project_id: String,
        task_id: Option<String>,
    },
    Switch {
        project_id: String,
        task_id: Option<String>,
    },
    Pause,
    Resume,
    Stop,
    Reset,
    Skip,
    Status,
    Sessions { limit: usize },
    Delete { id: String },
    Today,
    Settings,
    Set { key: String, value: String },
    Help,
    Quit,
}

impl Command {
    /// `Ok(None)` for a blank line.
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(None);
        };
        let args: Vec<&str> = words.collect();

        let command = match verb.to_ascii_lowercase().as_str() {
            "start" => {
                let kind = args
                    .first()
                    .ok_or_else(|| anyhow!("usage: start pomodoro|manual <project> [task]"))?;
                let session_type = SessionType::parse(&kind.to_ascii_lowercase())
                    .ok_or_else(|| anyhow!("unknown session type '{kind}'"))?;
                let (project_id, task_id) = target(&args[1..], "start")?;
                Command::Start {
                    session_type,
                    project_id,
                    task_id,
                }
            }
            "switch" => {
                let (project_id, task_id) = target(&args, "switch")?;
                Command::Switch {
                    project_id,
                    task_id,
                }
            }
            "pause" => Command::Pause,
            "resume" => Command::Resume,
            "stop" => Command::Stop,
            "reset" => Command::Reset,
            "skip" | "next" => Command::Skip,
            "status" => Command::Status,
            "sessions" => {
                let limit = match args.first() {
                    Some(n) => n
                        .parse()
                        .with_context(|| format!("'{n}' is not a session count"))?,
                    None => DEFAULT_SESSION_LIMIT,
                };
                Command::Sessions { limit }
            }
            "delete" => match args.as_slice() {
                [id] => Command::Delete {
                    id: (*id).to_string(),
                },
                _ => bail!("usage: delete <session-id>"),
            },
            "today" => Command::Today,
            "settings" => Command::Settings,
            "set" => match args.as_slice() {
                [key, value] => Command::Set {
                    key: key.to_ascii_lowercase(),
                    value: (*value).to_string(),
                },
                _ => bail!("usage: set <key> <value>"),
            },
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => bail!("unknown command '{other}', try 'help'"),
        };
        Ok(Some(command))
    }
}

fn target(args: &[&str], verb: &str) -> Result<(String, Option<String>)> {
    match args {
        [project] => Ok(((*project).to_string(), None)),
        [project, task] => Ok(((*project).to_string(), Some((*task).to_string()))),
        _ => bail!("usage: {verb} <project> [task]"),
    }
}

/// Run a command against the app and describe the result.
pub(crate) async fn execute(state: &AppState, command: Command) -> Result<String> {
    let timer = &state.timer;
    let reply = match command {
        Command::Start {
            session_type,
            project_id,
            task_id,
        } => describe(&timer.start_timer(session_type, project_id, task_id).await),
        Command::Switch {
            project_id,
            task_id,
        } => {
            let status = timer.status().await;
            match timer.switch_task(project_id, task_id).await {
                Some(record) => format!(
                    "Credited {} to {}",
                    format_duration_short(record.duration_sec),
                    record.project_id
                ),
                None if status == TimerStatus::Idle || status == TimerStatus::Halted => {
                    "Timer is not running".to_string()
                }
                None => describe(&timer.snapshot().await),
            }
        }
        Command::Pause => describe(&timer.pause_timer().await),
        Command::Resume => describe(&timer.resume_timer().await),
        Command::Stop => match timer.stop_timer().await {
            Some(record) => format!(
                "Stopped; credited {} to {}",
                format_duration_short(record.duration_sec),
                record.project_id
            ),
            None => "Stopped".to_string(),
        },
        Command::Reset => describe(&timer.reset_timer().await),
        Command::Skip => describe(&timer.next_phase().await),
        Command::Status => describe(&timer.snapshot().await),
        Command::Sessions { limit } => {
            let sessions = state
                .db
                .list_focus_sessions(FocusSessionFilter {
                    limit: Some(limit),
                    ..FocusSessionFilter::default()
                })
                .await?;
            list_sessions(&sessions)
        }
        Command::Delete { id } => match state.db.get_focus_session(&id).await? {
            Some(session) => {
                state.db.delete_focus_session(&id).await?;
                format!(
                    "Deleted {} of {} from {}",
                    format_duration_short(session.record.duration_sec),
                    session.record.project_id,
                    session.record.start.format("%Y-%m-%d %H:%M")
                )
            }
            None => format!("No session with id {id}"),
        },
        Command::Today => {
            let today = Local::now().date_naive();
            let (from, to) = local_day_bounds(today)
                .with_context(|| format!("cannot resolve local midnight for {today}"))?;
            let totals = state.db.project_totals(from, to).await?;
            if totals.is_empty() {
                "Nothing recorded today".to_string()
            } else {
                totals
                    .iter()
                    .map(|total| {
                        format!(
                            "{:<20} {:>8}  ({} sessions)",
                            total.project_id,
                            format_duration_short(total.total_sec),
                            total.session_count
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        }
        Command::Settings => serde_json::to_string_pretty(&state.settings.timer())?,
        Command::Set { key, value } => {
            let updated = apply_setting(state.settings.timer(), &key, &value)?;
            state.settings.update_timer(updated)?;
            format!("{key} = {value}")
        }
        Command::Help => HELP.to_string(),
        Command::Quit => "Bye".to_string(),
    };
    Ok(reply)
}

fn apply_setting(mut settings: TimerSettings, key: &str, value: &str) -> Result<TimerSettings> {
    let whole = || -> Result<u32> {
        value
            .parse()
            .with_context(|| format!("'{value}' is not a whole number"))
    };
    let flag = || -> Result<bool> {
        match value.to_ascii_lowercase().as_str() {
            "on" | "true" | "yes" | "1" => Ok(true),
            "off" | "false" | "no" | "0" => Ok(false),
            _ => bail!("'{value}' is not on/off"),
        }
    };

    match key {
        "work" => settings.work_min = whole()?,
        "short" => settings.short_break_min = whole()?,
        "long" => settings.long_break_min = whole()?,
        "cycles" => settings.cycles_to_long_break = whole()?,
        "auto" => settings.auto_start_next = flag()?,
        "sound" => settings.sound_on = flag()?,
        other => bail!("unknown setting '{other}'"),
    }
    Ok(settings)
}

/// One-line summary of the timer.
pub fn describe(snapshot: &TimerSnapshot) -> String {
    let status = snapshot.status();
    if status == TimerStatus::Idle {
        return "Idle".to_string();
    }

    let mut line = format!(
        "{} {} {:.0}% [{:?}]",
        snapshot.current_phase.label(),
        snapshot.countdown_display(),
        snapshot.progress() * 100.0,
        status
    );
    if snapshot.cycles > 0 {
        line.push_str(&format!(
            " cycle {}/{}",
            snapshot.current_cycle, snapshot.cycles
        ));
    }
    if let Some(project) = &snapshot.selected_project_id {
        line.push_str(&format!(" on {project}"));
        if let Some(task) = &snapshot.selected_task_id {
            line.push_str(&format!("/{task}"));
        }
    }
    line
}

/// UTC instants of the local midnights starting and ending `day`.
fn local_day_bounds(day: NaiveDate) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let midnight = |date: NaiveDate| {
        Local
            .from_local_datetime(&date.and_hms_opt(0, 0, 0)?)
            .earliest()
            .map(|local| local.with_timezone(&Utc))
    };
    Some((midnight(day)?, midnight(day.succ_opt()?)?))
}

fn list_sessions(sessions: &[StoredFocusSession]) -> String {
    if sessions.is_empty() {
        return "No sessions yet".to_string();
    }
    sessions
        .iter()
        .map(|s| {
            let target = match &s.record.task_id {
                Some(task) => format!("{}/{}", s.record.project_id, task),
                None => s.record.project_id.clone(),
            };
            format!(
                "{}  {}  {:>8}  {:<8}  {}",
                s.id,
                s.record.start.format("%Y-%m-%d %H:%M"),
                format_clock(s.record.duration_sec),
                s.record.session_type.as_str(),
                target
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
