//! The persistent event scheduler
//!
//! A receiver that accepts schedule/unschedule commands from the bus,
//! keeps a time-indexed execution table, persists flagged entries, and on
//! a minute-aligned cadence re-injects due events back into the bus.

use crate::bus::Bus;
use crate::error::Result;
use crate::event::{Event, SCHEDULE_COMMAND_KIND, UNSCHEDULE_COMMAND_KIND};
use crate::receiver::ReceiverHandle;
use crate::schedule::command::{ScheduleCommand, UnscheduleCommand, TIME_FORMAT};
use crate::schedule::repeat::RepeatPolicy;
use crate::schedule::store::{ScheduleStore, StoredEntry};
use chrono::{Duration, Local, NaiveDateTime, Timelike};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;

/// One scheduled occurrence of an event
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledEntry {
    /// Execution time, truncated to the minute
    pub exec_time: NaiveDateTime,

    /// The event to re-publish when due
    pub event: Event,

    /// Whether a durable copy exists in the store
    pub persist: bool,

    /// How the entry repeats after firing
    pub repeat: RepeatPolicy,

    /// Maximum lateness in minutes before the entry is discarded
    pub grace_minutes: u32,
}

impl ScheduledEntry {
    fn stored(&self) -> StoredEntry {
        StoredEntry {
            exec_time: self.exec_time.format(TIME_FORMAT).to_string(),
            grace_period_in_minutes: self.grace_minutes,
            persist_after_reboot: self.persist,
            repeat_policy: self.repeat.name().to_string(),
            event: self.event.payload_json(),
        }
    }

    fn grace_deadline(&self) -> NaiveDateTime {
        self.exec_time + Duration::minutes(i64::from(self.grace_minutes))
    }
}

/// Scheduling engine for executing events at a later time
///
/// The execution table is per-instance state owned by this struct; when
/// spawned, it is touched exclusively from the scheduler's own loop.
pub struct Scheduler {
    bus: Bus,
    store: Arc<dyn ScheduleStore>,
    table: BTreeMap<NaiveDateTime, Vec<ScheduledEntry>>,
}

impl Scheduler {
    /// Create a scheduler publishing into `bus` and persisting into `store`
    pub fn new(bus: Bus, store: Arc<dyn ScheduleStore>) -> Self {
        Self {
            bus,
            store,
            table: BTreeMap::new(),
        }
    }

    /// The event kinds the scheduler subscribes to
    pub fn kinds() -> Vec<String> {
        vec![
            SCHEDULE_COMMAND_KIND.to_string(),
            UNSCHEDULE_COMMAND_KIND.to_string(),
        ]
    }

    /// Restore the execution table from the durable store
    ///
    /// Call after the schedulable event types are registered with the bus.
    /// Unreadable records are logged and skipped; entries whose time has
    /// long passed are dropped by the grace rule at the first tick.
    pub async fn load_persistent(&mut self) -> Result<()> {
        let records = self.store.load().await?;
        let count = records.len();
        for record in records {
            if let Err(e) = self.restore(&record).await {
                tracing::warn!(
                    exec_time = %record.exec_time,
                    error = %e,
                    "Skipping unreadable persisted entry"
                );
            }
        }
        tracing::info!(records = count, "Loaded persisted schedule");
        Ok(())
    }

    async fn restore(&mut self, record: &StoredEntry) -> Result<()> {
        let exec_time = NaiveDateTime::parse_from_str(&record.exec_time, TIME_FORMAT)
            .map_err(|_| crate::error::HubError::InvalidTimestamp(record.exec_time.clone()))?;
        let payload: serde_json::Value = serde_json::from_str(&record.event)?;
        let event = self.bus.resolve_schedulable(&payload).await?;

        self.insert(ScheduledEntry {
            exec_time,
            event,
            persist: record.persist_after_reboot,
            repeat: RepeatPolicy::from_name(&record.repeat_policy),
            grace_minutes: record.grace_period_in_minutes,
        });
        Ok(())
    }

    /// Dispatch one command event from the bus
    pub async fn handle_event(&mut self, event: Event) {
        match event.kind.as_str() {
            SCHEDULE_COMMAND_KIND => match ScheduleCommand::from_event(&event) {
                Ok(command) => self.handle_schedule(command).await,
                Err(e) => tracing::warn!(error = %e, "Discarding malformed schedule command"),
            },
            UNSCHEDULE_COMMAND_KIND => match UnscheduleCommand::from_event(&event) {
                Ok(command) => {
                    let now = Local::now().naive_local();
                    self.handle_unschedule(command, now).await;
                }
                Err(e) => tracing::warn!(error = %e, "Discarding malformed unschedule command"),
            },
            other => tracing::debug!(kind = %other, "Scheduler ignoring event"),
        }
    }

    /// Place a validated schedule command into the execution table
    pub async fn handle_schedule(&mut self, command: ScheduleCommand) {
        let entry = ScheduledEntry {
            exec_time: truncate_to_minute(command.exec_time),
            event: command.event,
            persist: command.persist_after_reboot,
            repeat: command.repeat_policy,
            grace_minutes: command.grace_period_in_minutes,
        };

        if entry.persist {
            if let Err(e) = self.store.append(&entry.stored()).await {
                tracing::warn!(error = %e, "Failed to persist scheduled entry; keeping it in memory");
            }
        }

        tracing::info!(
            kind = %entry.event.kind,
            exec_time = %entry.exec_time,
            repeat = %entry.repeat,
            "Scheduled event"
        );
        self.insert(entry);
    }

    /// Remove entries matching the command's payload by value
    pub async fn handle_unschedule(&mut self, command: UnscheduleCommand, now: NaiveDateTime) {
        let mut removed = Vec::new();
        for entries in self.table.values_mut() {
            let mut i = 0;
            while i < entries.len() {
                if entries[i].event == command.event_to_remove {
                    removed.push(entries.remove(i));
                } else {
                    i += 1;
                }
            }
        }
        self.table.retain(|_, entries| !entries.is_empty());

        if removed.is_empty() {
            tracing::debug!(kind = %command.event_to_remove.kind, "Unschedule matched no entries");
            return;
        }

        for entry in removed {
            tracing::info!(
                kind = %entry.event.kind,
                exec_time = %entry.exec_time,
                "Unscheduled event"
            );

            if command.remove_from_persistence && entry.persist {
                if let Err(e) = self.store.remove(&entry.stored()).await {
                    tracing::warn!(error = %e, "Failed to remove persisted entry");
                }
            }

            if !command.remove_following_events && entry.repeat.repeats() {
                // skip-one semantics: the series continues at the next occurrence
                let next = entry.repeat.next_after(entry.repeat.next(entry.exec_time), now);
                let follow = ScheduleCommand {
                    exec_time: next,
                    event: entry.event,
                    persist_after_reboot: entry.persist,
                    repeat_policy: entry.repeat,
                    grace_period_in_minutes: entry.grace_minutes,
                };
                self.handle_schedule(follow).await;
            }
        }
    }

    /// Fire or expire every entry due at `now`
    ///
    /// Due buckets are removed as a whole. Members still inside their
    /// grace window are re-published onto the bus; late members are
    /// logged and dropped so a long downtime cannot flood the bus on
    /// restart. Durable copies are removed for every drained member,
    /// fired or expired, and repeating members are re-inserted at their
    /// first occurrence strictly after `now`.
    pub async fn tick(&mut self, now: NaiveDateTime) {
        let due_keys: Vec<NaiveDateTime> = self.table.range(..=now).map(|(k, _)| *k).collect();

        for key in due_keys {
            let Some(entries) = self.table.remove(&key) else {
                continue;
            };
            for entry in entries {
                if now <= entry.grace_deadline() {
                    tracing::info!(
                        kind = %entry.event.kind,
                        exec_time = %entry.exec_time,
                        "Firing scheduled event"
                    );
                    self.bus.publish(entry.event.clone());
                } else {
                    tracing::warn!(
                        kind = %entry.event.kind,
                        exec_time = %entry.exec_time,
                        grace_minutes = entry.grace_minutes,
                        "Dropping scheduled event past its grace period"
                    );
                }

                if entry.persist {
                    if let Err(e) = self.store.remove(&entry.stored()).await {
                        tracing::warn!(error = %e, "Failed to remove persisted entry");
                    }
                }

                if entry.repeat.repeats() {
                    let next = entry.repeat.next_after(entry.repeat.next(entry.exec_time), now);
                    let follow = ScheduledEntry {
                        exec_time: next,
                        event: entry.event,
                        persist: entry.persist,
                        repeat: entry.repeat,
                        grace_minutes: entry.grace_minutes,
                    };
                    if follow.persist {
                        if let Err(e) = self.store.append(&follow.stored()).await {
                            tracing::warn!(error = %e, "Failed to persist rescheduled entry");
                        }
                    }
                    tracing::debug!(
                        kind = %follow.event.kind,
                        exec_time = %follow.exec_time,
                        "Rescheduled repeating event"
                    );
                    self.insert(follow);
                }
            }
        }
    }

    fn insert(&mut self, entry: ScheduledEntry) {
        self.table.entry(entry.exec_time).or_default().push(entry);
    }

    /// Number of pending entries
    pub fn len(&self) -> usize {
        self.table.values().map(Vec::len).sum()
    }

    /// Whether the execution table is empty
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Pending execution times of entries equal to `event` by value
    pub fn occurrences_of(&self, event: &Event) -> Vec<NaiveDateTime> {
        self.table
            .iter()
            .flat_map(|(time, entries)| {
                entries
                    .iter()
                    .filter(|entry| &entry.event == event)
                    .map(move |_| *time)
            })
            .collect()
    }

    /// Run the scheduler as a bus receiver
    ///
    /// The returned handle must be registered with the bus. The loop
    /// multiplexes command events with a timer that re-aligns to the next
    /// wall-clock minute after every tick, so the cadence self-corrects
    /// instead of drifting.
    pub fn spawn(mut self) -> ReceiverHandle {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = ReceiverHandle::new(Self::kinds(), tx);

        tokio::spawn(async move {
            loop {
                let now = Local::now().naive_local();
                let deadline = tokio::time::Instant::now() + delay_to_next_minute(now);
                loop {
                    tokio::select! {
                        maybe = rx.recv() => match maybe {
                            Some(event) => self.handle_event(event).await,
                            None => return,
                        },
                        _ = tokio::time::sleep_until(deadline) => {
                            self.tick(Local::now().naive_local()).await;
                            break;
                        }
                    }
                }
            }
        });

        handle
    }
}

fn truncate_to_minute(time: NaiveDateTime) -> NaiveDateTime {
    time.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(time)
}

fn delay_to_next_minute(now: NaiveDateTime) -> std::time::Duration {
    std::time::Duration::from_secs(u64::from(60 - now.second().min(59)))
}
