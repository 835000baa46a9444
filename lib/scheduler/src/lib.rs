//! Scheduler for aura workflow triggers.
//!
//! This crate provides:
//!
//! - **Schedule Rules**: daily, weekly, monthly and five-field cron schedules
//! - **Trigger Scheduler**: per-minute evaluation of active workflows' schedule triggers

pub mod error;
pub mod schedule;
pub mod scheduler;

pub use error::{ScheduleError, TriggerEvaluationError};
pub use schedule::{CronSchedule, ScheduleRule, TimeOfDay};
pub use scheduler::{TriggerScheduler, TriggerSink, WallClock};
