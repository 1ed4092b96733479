//! Event and task types.
//!
//! - [`EventInput`]: a calendar event as the rest of the system sees it,
//!   independent of the provider's wire format
//! - [`TaskRecord`]: a line in the daily task list, derived from an event

use serde::{Deserialize, Serialize};

use crate::time::StartTime;

/// Title used when the provider returns an event without a summary.
pub const UNTITLED_EVENT: &str = "(no title)";

/// A calendar event.
///
/// `start` and `end` keep the provider's textual form: either a date-only
/// `YYYY-MM-DD` value (all-day events) or an ISO-8601 timestamp.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventInput {
    /// Provider event identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Identifier shared by all instances of a recurring event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurring_event_id: Option<String>,

    /// Event title.
    pub title: String,

    /// Start, date-only or timestamp.
    pub start: String,

    /// End, date-only or timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,

    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl EventInput {
    /// Creates an event with a title and a start value.
    pub fn new(title: impl Into<String>, start: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            start: start.into(),
            ..Default::default()
        }
    }

    /// Builder: set the event id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Builder: set the recurring event id.
    pub fn with_recurring_event_id(mut self, id: impl Into<String>) -> Self {
        self.recurring_event_id = Some(id.into());
        self
    }

    /// Builder: set the end value.
    pub fn with_end(mut self, end: impl Into<String>) -> Self {
        self.end = Some(end.into());
        self
    }

    /// Builder: set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Parses the start value, if it is a recognised date or timestamp.
    pub fn start_time(&self) -> Option<StartTime> {
        StartTime::parse(&self.start)
    }

    /// Returns the key used to collapse duplicate events.
    ///
    /// Precedence: recurring event id, event id, title, then `title:start`.
    /// Empty strings are skipped.
    pub fn dedup_key(&self) -> String {
        let non_empty = |v: &Option<String>| v.as_deref().filter(|s| !s.is_empty()).map(String::from);

        non_empty(&self.recurring_event_id)
            .or_else(|| non_empty(&self.id))
            .or_else(|| (!self.title.is_empty()).then(|| self.title.clone()))
            .unwrap_or_else(|| format!("{}:{}", self.title, self.start))
    }
}

/// An entry in the daily task list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// The event start as received from the provider.
    pub time: String,
    /// Task title.
    pub title: String,
    /// Completion flag; always `false` for freshly derived tasks.
    pub done: bool,
}

impl From<&EventInput> for TaskRecord {
    fn from(event: &EventInput) -> Self {
        Self {
            time: event.start.clone(),
            title: event.title.clone(),
            done: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_key_prefers_recurring_id() {
        let event = EventInput::new("Standup", "2024-01-01T09:00")
            .with_id("a")
            .with_recurring_event_id("R");
        assert_eq!(event.dedup_key(), "R");
    }

    #[test]
    fn dedup_key_falls_back_to_id_then_title() {
        let event = EventInput::new("Standup", "2024-01-01T09:00").with_id("a");
        assert_eq!(event.dedup_key(), "a");

        let event = EventInput::new("Standup", "2024-01-01T09:00");
        assert_eq!(event.dedup_key(), "Standup");
    }

    #[test]
    fn dedup_key_skips_empty_values() {
        let event = EventInput::new("", "2024-01-01")
            .with_id("")
            .with_recurring_event_id("");
        assert_eq!(event.dedup_key(), ":2024-01-01");
    }

    #[test]
    fn task_from_event() {
        let event = EventInput::new("Review", "2024-06-15T14:00:00Z").with_id("x");
        let task = TaskRecord::from(&event);
        assert_eq!(task.time, "2024-06-15T14:00:00Z");
        assert_eq!(task.title, "Review");
        assert!(!task.done);
    }

    #[test]
    fn event_serializes_camel_case() {
        let event = EventInput::new("Planning", "2024-06-15").with_recurring_event_id("R1");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["recurringEventId"], "R1");
        assert!(json.get("id").is_none());
    }
}
