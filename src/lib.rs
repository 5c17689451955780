//! # hub-event
//!
//! Actor-style event distribution and persistent scheduling for a
//! home-automation hub.
//!
//! ## Overview
//!
//! Integrations (lighting, music, weather, calendar, ...) communicate
//! through a central [`Bus`]: each one is a receiver with a private queue
//! and a background consumption loop, registered with the bus under the
//! event kinds it cares about. The [`Scheduler`] is itself a receiver
//! that stores events for later execution and re-injects them into the
//! bus when due, optionally surviving restarts through a pluggable
//! [`ScheduleStore`].
//!
//! ## Quick Start
//!
//! ```rust
//! use hub_event::{Bus, Event, SchedulableCodec, SchedulableRegistry};
//!
//! # async fn example() -> hub_event::Result<()> {
//! // Codecs make event types eligible for scheduling
//! let registry = SchedulableRegistry::new()
//!     .with(SchedulableCodec::simple("CalendarRefreshEvent"));
//! let bus = Bus::new(registry);
//!
//! // Ask for a response over the bus
//! let receiver = hub_event::ResponseReceiver::new(&bus, vec!["weather.report".into()]);
//! receiver.start().await?;
//! bus.publish(Event::signal("weather.fetch"));
//! let report = receiver.await_one(true).await?;
//!
//! println!("Received: {}", report.kind);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`Event`] — immutable typed message; the `kind` tag is the dispatch key
//! - [`EventReceiver`] trait + [`spawn`] — actors with private queues
//! - [`Bus`] — owns the subscription table, forwards by kind
//! - [`ResponseReceiver`] / [`TemporaryReceiver`] — one-shot await semantics
//! - [`SchedulableRegistry`] — JSON codecs for schedulable event types
//! - [`Scheduler`] — time-indexed execution table with durable storage

pub mod bus;
pub mod error;
pub mod event;
pub mod oneshot;
pub mod receiver;
pub mod schedulable;
pub mod schedule;

// Re-export core types
pub use bus::Bus;
pub use error::{HubError, Result};
pub use event::{
    Event, EVENT_ID_FIELD, PUSH_UPDATE_KIND, SCHEDULE_COMMAND_KIND, UNSCHEDULE_COMMAND_KIND,
};
pub use oneshot::{ResponseReceiver, TemporaryReceiver};
pub use receiver::{spawn, spawn_with_workers, EventReceiver, ReceiverHandle};
pub use schedulable::{DecodeError, DecodeResult, SchedulableCodec, SchedulableRegistry};
pub use schedule::{
    FileScheduleStore, MemoryScheduleStore, RepeatPolicy, ScheduleCommand, ScheduleRequest,
    ScheduleStore, ScheduledEntry, Scheduler, StoredEntry, UnscheduleCommand, TIME_FORMAT,
};
