//! Persistent time-based scheduling on top of the event bus

pub mod command;
pub mod repeat;
pub mod scheduler;
pub mod store;

pub use command::{ScheduleCommand, ScheduleRequest, UnscheduleCommand, TIME_FORMAT};
pub use repeat::RepeatPolicy;
pub use scheduler::{ScheduledEntry, Scheduler};
pub use store::{FileScheduleStore, MemoryScheduleStore, ScheduleStore, StoredEntry};
