//! In-process update bus.
//!
//! After a successful mutation the caller publishes on the channel matching
//! what changed, and every view subscribed there re-reads its data. Handlers
//! run synchronously in registration order. A failing handler is logged and
//! skipped.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use thiserror::Error;
use tracing::{debug, error};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Channel {
    Attendance,
    Assignment,
    Timetable,
    ExamTimetable,
    Profile,
    Announcement,
    Grade,
}

impl Channel {
    pub const ALL: [Channel; 7] = [
        Channel::Attendance,
        Channel::Assignment,
        Channel::Timetable,
        Channel::ExamTimetable,
        Channel::Profile,
        Channel::Announcement,
        Channel::Grade,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Channel::Attendance => "attendance_updates",
            Channel::Assignment => "assignment_updates",
            Channel::Timetable => "timetable_updates",
            Channel::ExamTimetable => "exam_timetable_updates",
            Channel::Profile => "profile_updates",
            Channel::Announcement => "announcement_updates",
            Channel::Grade => "grade_updates",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("unknown channel: {0}")]
    UnknownChannel(String),
}

impl FromStr for Channel {
    type Err = ChannelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim();
        Channel::ALL
            .into_iter()
            .find(|c| c.name() == t || c.name().trim_end_matches("_updates") == t)
            .ok_or_else(|| ChannelError::UnknownChannel(t.to_string()))
    }
}

type Handler<P> = Arc<dyn Fn(&P) -> anyhow::Result<()> + Send + Sync>;

struct Entry<P> {
    id: u64,
    handler: Handler<P>,
}

struct Inner<P> {
    next_id: AtomicU64,
    handlers: Mutex<HashMap<Channel, Vec<Entry<P>>>>,
}

impl<P> Inner<P> {
    fn handlers(&self) -> MutexGuard<'_, HashMap<Channel, Vec<Entry<P>>>> {
        // Handlers never run under this lock.
        self.handlers.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn remove(&self, channel: Channel, id: u64) {
        let mut map = self.handlers();
        if let Some(list) = map.get_mut(&channel) {
            list.retain(|e| e.id != id);
            if list.is_empty() {
                map.remove(&channel);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Shared handle; clones publish to and subscribe on the same bus.
pub struct UpdateChannel<P = serde_json::Value> {
    inner: Arc<Inner<P>>,
}

impl<P> Clone for UpdateChannel<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P> Default for UpdateChannel<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> fmt::Debug for UpdateChannel<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateChannel")
            .field("active_channels", &self.active_channels())
            .finish()
    }
}

impl<P> UpdateChannel<P> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                next_id: AtomicU64::new(1),
                handlers: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn subscribe<F>(&self, channel: Channel, handler: F) -> Subscription<P>
    where
        F: Fn(&P) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .handlers()
            .entry(channel)
            .or_default()
            .push(Entry {
                id,
                handler: Arc::new(handler),
            });
        debug!(%channel, id, "subscribed");
        Subscription {
            channel,
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Calls every handler registered on `channel` when the call starts.
    ///
    /// Handlers added or removed while delivering only affect later calls.
    pub fn publish(&self, channel: Channel, payload: &P) -> PublishReport {
        let scheduled: Vec<(u64, Handler<P>)> = self
            .inner
            .handlers()
            .get(&channel)
            .map(|list| list.iter().map(|e| (e.id, Arc::clone(&e.handler))).collect())
            .unwrap_or_default();

        let mut report = PublishReport::default();
        for (id, handler) in scheduled {
            match panic::catch_unwind(AssertUnwindSafe(|| (*handler)(payload))) {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(e)) => {
                    report.failed += 1;
                    error!(%channel, id, error = %e, "update handler failed");
                }
                Err(cause) => {
                    report.failed += 1;
                    error!(%channel, id, panic = panic_message(&*cause), "update handler panicked");
                }
            }
        }
        debug!(%channel, delivered = report.delivered, failed = report.failed, "published");
        report
    }

    pub fn subscriber_count(&self, channel: Channel) -> usize {
        self.inner.handlers().get(&channel).map_or(0, Vec::len)
    }

    pub fn active_channels(&self) -> Vec<Channel> {
        let mut channels: Vec<Channel> = self.inner.handlers().keys().copied().collect();
        channels.sort();
        channels
    }

    pub fn unsubscribe_all(&self) {
        self.inner.handlers().clear();
    }
}

fn panic_message(cause: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = cause.downcast_ref::<&str>() {
        s
    } else if let Some(s) = cause.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

/// Deregistration token returned by [`UpdateChannel::subscribe`].
///
/// Dropping it keeps the handler registered.
pub struct Subscription<P> {
    channel: Channel,
    id: u64,
    inner: Weak<Inner<P>>,
}

impl<P> Subscription<P> {
    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// Safe to call more than once, and from inside a running handler.
    pub fn unsubscribe(&self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.remove(self.channel, self.id);
        }
    }
}

impl<P> fmt::Debug for Subscription<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("channel", &self.channel)
            .field("id", &self.id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use serde_json::json;

    fn new_log() -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let bus: UpdateChannel = UpdateChannel::new();
        let log = new_log();
        for name in ["a", "b", "c"] {
            let log = Arc::clone(&log);
            bus.subscribe(Channel::Attendance, move |_| {
                log.lock().expect("lock").push(name.to_string());
                Ok(())
            });
        }
        let report = bus.publish(Channel::Attendance, &json!({}));
        assert_eq!(report.delivered, 3);
        assert_eq!(*log.lock().expect("lock"), vec!["a", "b", "c"]);
    }

    #[test]
    fn failing_handler_does_not_block_the_next_one() {
        let bus: UpdateChannel = UpdateChannel::new();
        let log = new_log();
        bus.subscribe(Channel::Attendance, |_| Err(anyhow!("view refresh failed")));
        let h2 = Arc::clone(&log);
        bus.subscribe(Channel::Attendance, move |_| {
            h2.lock().expect("lock").push("h2".to_string());
            Ok(())
        });

        let report = bus.publish(Channel::Attendance, &json!({"classId": "10-A"}));
        assert_eq!(report, PublishReport { delivered: 1, failed: 1 });
        assert_eq!(*log.lock().expect("lock"), vec!["h2"]);
    }

    #[test]
    fn panicking_handler_is_contained() {
        let bus: UpdateChannel = UpdateChannel::new();
        let log = new_log();
        bus.subscribe(Channel::Attendance, |_| panic!("boom"));
        let h2 = Arc::clone(&log);
        bus.subscribe(Channel::Attendance, move |_| {
            h2.lock().expect("lock").push("h2".to_string());
            Ok(())
        });

        let report = bus.publish(Channel::Attendance, &json!(null));
        assert_eq!(report.failed, 1);
        assert_eq!(log.lock().expect("lock").len(), 1);
    }

    #[test]
    fn self_unsubscribe_keeps_current_delivery_only() {
        let bus: UpdateChannel = UpdateChannel::new();
        let calls = Arc::new(AtomicU64::new(0));
        let slot: Arc<Mutex<Option<Subscription<serde_json::Value>>>> = Arc::new(Mutex::new(None));

        let handler_calls = Arc::clone(&calls);
        let handler_slot = Arc::clone(&slot);
        let sub = bus.subscribe(Channel::Attendance, move |_| {
            handler_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(sub) = handler_slot.lock().expect("lock").as_ref() {
                sub.unsubscribe();
            }
            Ok(())
        });
        *slot.lock().expect("lock") = Some(sub);

        bus.publish(Channel::Attendance, &json!(1));
        bus.publish(Channel::Attendance, &json!(2));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(bus.subscriber_count(Channel::Attendance), 0);
    }

    #[test]
    fn unsubscribing_a_later_handler_mid_publish_still_delivers_to_it() {
        let bus: UpdateChannel = UpdateChannel::new();
        let second_calls = Arc::new(AtomicU64::new(0));
        let slot: Arc<Mutex<Option<Subscription<serde_json::Value>>>> = Arc::new(Mutex::new(None));

        let first_slot = Arc::clone(&slot);
        bus.subscribe(Channel::Attendance, move |_| {
            if let Some(sub) = first_slot.lock().expect("lock").as_ref() {
                sub.unsubscribe();
            }
            Ok(())
        });
        let counter = Arc::clone(&second_calls);
        let second = bus.subscribe(Channel::Attendance, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        *slot.lock().expect("lock") = Some(second);

        bus.publish(Channel::Attendance, &json!(1));
        assert_eq!(second_calls.load(Ordering::SeqCst), 1);
        bus.publish(Channel::Attendance, &json!(2));
        assert_eq!(second_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn channels_are_independent() {
        let bus: UpdateChannel = UpdateChannel::new();
        let hits = Arc::new(AtomicU64::new(0));
        let h = Arc::clone(&hits);
        let sub = bus.subscribe(Channel::Assignment, move |_| {
            h.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let report = bus.publish(Channel::Attendance, &json!({}));
        assert_eq!(report, PublishReport::default());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(bus.active_channels(), vec![Channel::Assignment]);

        sub.unsubscribe();
        sub.unsubscribe();
        assert!(bus.active_channels().is_empty());
    }

    #[test]
    fn unsubscribe_all_empties_every_channel() {
        let bus: UpdateChannel = UpdateChannel::new();
        let hits = Arc::new(AtomicU64::new(0));
        let subs: Vec<Subscription<serde_json::Value>> = [Channel::Attendance, Channel::Grade, Channel::Grade]
            .into_iter()
            .map(|channel| {
                let h = Arc::clone(&hits);
                bus.subscribe(channel, move |_| {
                    h.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            })
            .collect();
        assert_eq!(subs[1].channel(), Channel::Grade);
        assert_eq!(bus.subscriber_count(Channel::Grade), 2);

        bus.unsubscribe_all();
        assert!(bus.active_channels().is_empty());
        for channel in Channel::ALL {
            assert_eq!(bus.subscriber_count(channel), 0);
            assert_eq!(bus.publish(channel, &json!({})), PublishReport::default());
        }
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        // Stale tokens stay harmless.
        subs[0].unsubscribe();
        assert!(bus.active_channels().is_empty());
    }

    #[test]
    fn channel_names_parse_with_or_without_suffix() {
        assert_eq!("attendance".parse::<Channel>(), Ok(Channel::Attendance));
        assert_eq!(
            "exam_timetable_updates".parse::<Channel>(),
            Ok(Channel::ExamTimetable)
        );
        assert!(matches!(
            "chat".parse::<Channel>(),
            Err(ChannelError::UnknownChannel(_))
        ));
    }
}
