//! Today's tasks from the calendar.

use chrono::{Local, NaiveDate, TimeZone, Utc};
use tracing::debug;

use daysync_core::{StartTime, TaskRecord, todays_tasks};
use daysync_google::CalendarClient;

use crate::error::ClientResult;

/// Prints today's tasks from `calendar_id`.
pub async fn run(calendar: &CalendarClient, calendar_id: &str, json: bool) -> ClientResult<()> {
    let tasks = fetch_tasks(calendar, calendar_id, daysync_core::local_today()).await?;
    println!("{}", render(&tasks, json)?);
    Ok(())
}

/// Fetches events from the start of `today` and reduces them to tasks.
pub async fn fetch_tasks(
    calendar: &CalendarClient,
    calendar_id: &str,
    today: NaiveDate,
) -> ClientResult<Vec<TaskRecord>> {
    let time_min = today
        .and_hms_opt(0, 0, 0)
        .and_then(|midnight| Local.from_local_datetime(&midnight).earliest())
        .map(|dt| dt.with_timezone(&Utc));

    let events = calendar.list_events(calendar_id, time_min).await?;
    let tasks = todays_tasks(&events, today);
    debug!(events = events.len(), tasks = tasks.len(), "built today's tasks");
    Ok(tasks)
}

/// Renders tasks as text lines or a JSON array.
pub fn render(tasks: &[TaskRecord], json: bool) -> ClientResult<String> {
    if json {
        return Ok(serde_json::to_string_pretty(tasks)?);
    }
    if tasks.is_empty() {
        return Ok("No tasks for today.".to_string());
    }

    let lines: Vec<String> = tasks
        .iter()
        .map(|task| {
            let checkbox = if task.done { "[x]" } else { "[ ]" };
            format!("{} {:<7} {}", checkbox, time_label(&task.time), task.title)
        })
        .collect();
    Ok(lines.join("\n"))
}

fn time_label(start: &str) -> String {
    match StartTime::parse(start) {
        Some(StartTime::Instant(dt)) => dt.format("%H:%M").to_string(),
        Some(StartTime::Date(_)) => "all-day".to_string(),
        None => "?".to_string(),
    }
}
