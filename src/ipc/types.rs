use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use serde::Deserialize;

use crate::channel::{Channel, Subscription, UpdateChannel};
use crate::store::AttendanceStore;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Per-channel change counters kept current by a subscriber on every channel.
#[derive(Debug, Clone, Default)]
pub struct Revisions(Arc<Mutex<BTreeMap<Channel, u64>>>);

impl Revisions {
    fn bump(&self, channel: Channel) {
        let mut map = self.0.lock().unwrap_or_else(|e| e.into_inner());
        *map.entry(channel).or_insert(0) += 1;
    }

    pub fn snapshot(&self) -> BTreeMap<Channel, u64> {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub store: AttendanceStore,
    pub updates: UpdateChannel,
    pub revisions: Revisions,
    _revision_subs: Vec<Subscription<serde_json::Value>>,
}

impl AppState {
    pub fn new(updates: UpdateChannel) -> Self {
        let revisions = Revisions::default();
        let subs = Channel::ALL
            .into_iter()
            .map(|channel| {
                let revisions = revisions.clone();
                updates.subscribe(channel, move |_| {
                    revisions.bump(channel);
                    Ok(())
                })
            })
            .collect();
        Self {
            workspace: None,
            db: None,
            store: AttendanceStore::new(),
            updates,
            revisions,
            _revision_subs: subs,
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(UpdateChannel::new())
    }
}
