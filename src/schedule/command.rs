//! Scheduling commands and their public API surface
//!
//! [`ScheduleRequest`] is what arrives from outside the core (e.g. an
//! HTTP scheduling endpoint). Validation happens synchronously in
//! [`ScheduleRequest::resolve`] so malformed input is rejected at the
//! caller and never thrown onto the bus; only validated commands travel
//! to the scheduler as events.

use crate::bus::Bus;
use crate::error::{HubError, Result};
use crate::event::{Event, SCHEDULE_COMMAND_KIND, UNSCHEDULE_COMMAND_KIND};
use crate::schedule::repeat::RepeatPolicy;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Wire format of scheduled execution times
pub const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M";

fn default_grace() -> u32 {
    1
}

fn default_repeat_name() -> String {
    RepeatPolicy::NoRepeat.name().to_string()
}

fn default_true() -> bool {
    true
}

/// A raw scheduling request from outside the core
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleRequest {
    /// Execution time, `YYYY-MM-DDThh:mm`
    pub exec_time: String,

    /// Whether the entry should survive a restart
    #[serde(default)]
    pub persist_after_reboot: bool,

    /// Wire name of the repeat policy
    #[serde(default = "default_repeat_name")]
    pub repeat_policy: String,

    /// Maximum lateness in minutes before the entry is discarded
    #[serde(default = "default_grace")]
    pub grace_period_in_minutes: u32,

    /// JSON string whose shape the target schedulable event defines,
    /// with `event_id` identifying the concrete type
    pub event: String,
}

impl ScheduleRequest {
    /// Validate this request into a command
    ///
    /// Rejects with a client error if `exec_time` fails to parse, `event`
    /// is not valid JSON, or no registered schedulable type accepts it.
    pub async fn resolve(&self, bus: &Bus) -> Result<ScheduleCommand> {
        let exec_time = NaiveDateTime::parse_from_str(&self.exec_time, TIME_FORMAT)
            .map_err(|_| HubError::InvalidTimestamp(self.exec_time.clone()))?;
        let payload: serde_json::Value = serde_json::from_str(&self.event)
            .map_err(|e| HubError::InvalidPayload(format!("event is not valid JSON: {e}")))?;
        let event = bus.resolve_schedulable(&payload).await?;

        Ok(ScheduleCommand {
            exec_time,
            event,
            persist_after_reboot: self.persist_after_reboot,
            repeat_policy: RepeatPolicy::from_name(&self.repeat_policy),
            grace_period_in_minutes: self.grace_period_in_minutes,
        })
    }
}

/// A validated command to schedule an event for later execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleCommand {
    /// When to execute (truncated to the minute by the scheduler)
    pub exec_time: NaiveDateTime,

    /// The event to re-publish at execution time
    pub event: Event,

    /// Whether the entry should survive a restart
    pub persist_after_reboot: bool,

    /// How the entry repeats after firing
    pub repeat_policy: RepeatPolicy,

    /// Maximum lateness in minutes before the entry is discarded
    pub grace_period_in_minutes: u32,
}

impl ScheduleCommand {
    /// Create a command with the default flags: volatile, no repeat,
    /// one minute of grace
    pub fn new(exec_time: NaiveDateTime, event: Event) -> Self {
        Self {
            exec_time,
            event,
            persist_after_reboot: false,
            repeat_policy: RepeatPolicy::NoRepeat,
            grace_period_in_minutes: default_grace(),
        }
    }

    /// Mark the entry as surviving restarts
    pub fn persistent(mut self) -> Self {
        self.persist_after_reboot = true;
        self
    }

    /// Set the repeat policy
    pub fn with_repeat(mut self, policy: RepeatPolicy) -> Self {
        self.repeat_policy = policy;
        self
    }

    /// Set the grace period in minutes
    pub fn with_grace(mut self, minutes: u32) -> Self {
        self.grace_period_in_minutes = minutes;
        self
    }

    /// Wrap this command as a bus event for the scheduler
    pub fn into_event(self) -> Result<Event> {
        Ok(Event::new(SCHEDULE_COMMAND_KIND, serde_json::to_value(self)?))
    }

    /// Decode a command from its bus event form
    pub fn from_event(event: &Event) -> Result<Self> {
        serde_json::from_value(event.payload.clone()).map_err(Into::into)
    }
}

/// A command to remove previously scheduled occurrences of an event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnscheduleCommand {
    /// Entries whose payload equals this event by value are removed
    pub event_to_remove: Event,

    /// When false, the next occurrence per the repeat policy is
    /// re-scheduled, so only one occurrence is skipped
    #[serde(default = "default_true")]
    pub remove_following_events: bool,

    /// Whether to also delete a stored persisted copy
    #[serde(default = "default_true")]
    pub remove_from_persistence: bool,
}

impl UnscheduleCommand {
    /// Create a command that removes the whole series and its durable copy
    pub fn new(event_to_remove: Event) -> Self {
        Self {
            event_to_remove,
            remove_following_events: true,
            remove_from_persistence: true,
        }
    }

    /// Skip only the next occurrence; the series continues
    pub fn keep_following_events(mut self) -> Self {
        self.remove_following_events = false;
        self
    }

    /// Leave any stored persisted copy in place
    pub fn keep_persisted_copy(mut self) -> Self {
        self.remove_from_persistence = false;
        self
    }

    /// Wrap this command as a bus event for the scheduler
    pub fn into_event(self) -> Result<Event> {
        Ok(Event::new(
            UNSCHEDULE_COMMAND_KIND,
            serde_json::to_value(self)?,
        ))
    }

    /// Decode a command from its bus event form
    pub fn from_event(event: &Event) -> Result<Self> {
        serde_json::from_value(event.payload.clone()).map_err(Into::into)
    }
}
