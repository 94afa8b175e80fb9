//! Attendance core for the school dashboard: a day-by-class record store,
//! on-demand analytics over it, and an update bus that tells open views when
//! to refresh.

pub mod analytics;
pub mod channel;
pub mod config;
pub mod db;
pub mod ipc;
pub mod logging;
pub mod model;
pub mod roster;
pub mod store;

pub use analytics::{AttendanceStats, Period, PeriodFilter};
pub use channel::{Channel, PublishReport, Subscription, UpdateChannel};
pub use model::{AttendanceBatch, AttendanceRecord, AttendanceStatus, BatchEntry, StoreError};
pub use roster::{ClassInfo, Roster, StaticRoster};
pub use store::{AttendancePersistence, AttendanceQuery, AttendanceStore, PurgeTarget};
