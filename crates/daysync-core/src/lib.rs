//! Core types: calendar events, daily tasks, today filter, tracing

pub mod event;
pub mod time;
pub mod today;
pub mod tracing;

pub use event::{EventInput, TaskRecord, UNTITLED_EVENT};
pub use time::{StartTime, is_date_only};
pub use today::{dedup_earliest, filter_today, is_on_local_day, local_today, todays_tasks};
pub use crate::tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
