//! Today's task list.
//!
//! Builds the daily task list from a batch of calendar events:
//!
//! 1. keep events whose start falls on the local calendar date
//! 2. collapse instances sharing a [`EventInput::dedup_key`], keeping the
//!    earliest start
//! 3. map each survivor to a [`TaskRecord`]
//!
//! The reference date is passed in explicitly; [`local_today`] supplies it
//! for live use.

use std::collections::HashMap;

use chrono::{Local, NaiveDate};
use tracing::debug;

use crate::event::{EventInput, TaskRecord};
use crate::time::StartTime;

/// Returns the current local calendar date.
pub fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

/// Returns `true` if `start` falls on `today` in local time.
///
/// Date-only values are compared as calendar dates. Timestamps are
/// converted to the local timezone first. Unparseable values are never
/// "today".
pub fn is_on_local_day(start: &str, today: NaiveDate) -> bool {
    StartTime::parse(start).is_some_and(|s| s.local_date() == today)
}

/// Keeps the events starting on `today`, preserving their order.
pub fn filter_today(events: &[EventInput], today: NaiveDate) -> Vec<EventInput> {
    events
        .iter()
        .filter(|e| is_on_local_day(&e.start, today))
        .cloned()
        .collect()
}

/// Collapses events sharing a dedup key, keeping the earliest start.
///
/// Groups are emitted in order of their first appearance. Events whose start
/// cannot be parsed sort after every parseable one; ties keep input order.
pub fn dedup_earliest(events: Vec<EventInput>) -> Vec<EventInput> {
    let mut order: Vec<String> = Vec::new();
    let mut best: HashMap<String, (i64, EventInput)> = HashMap::new();

    for event in events {
        let key = event.dedup_key();
        let millis = event
            .start_time()
            .map(|s| s.sort_millis())
            .unwrap_or(i64::MAX);

        match best.get_mut(&key) {
            Some(current) => {
                if millis < current.0 {
                    *current = (millis, event);
                }
            }
            None => {
                order.push(key.clone());
                best.insert(key, (millis, event));
            }
        }
    }

    order
        .into_iter()
        .filter_map(|key| best.remove(&key).map(|(_, event)| event))
        .collect()
}

/// Builds today's task list from raw events.
pub fn todays_tasks(events: &[EventInput], today: NaiveDate) -> Vec<TaskRecord> {
    let on_day = filter_today(events, today);
    debug!(total = events.len(), today = on_day.len(), "filtered events to local day");

    let unique = dedup_earliest(on_day);
    debug!(unique = unique.len(), "deduplicated today's events");

    unique.iter().map(TaskRecord::from).collect()
}
