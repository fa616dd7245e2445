use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info};

use super::keys::{self, key_prefix};
use super::model::{ConsumeResult, Payload, SecretMeta, SecretRecord, SecretView};

/// Thread-safe in-memory secret store. Clones share the same map.
///
/// Every operation that touches a record runs under that key's map entry
/// lock, so check-and-charge is one indivisible step per key: with k views
/// left and any number of racing consumers, exactly k of them receive the
/// payload.
#[derive(Clone)]
pub struct Store {
    entries: Arc<DashMap<String, SecretRecord>>,
    key_length: usize,
}

impl Store {
    /// A new, empty store generating keys of `key_length` characters.
    pub fn new(key_length: usize) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            key_length,
        }
    }

    /// Store a payload under a fresh random key and return the key. Keys
    /// are generated here, never chosen by the caller, so the key is the
    /// one and only handle to the secret.
    pub fn create(&self, payload: Payload, max_views: NonZeroU32, ttl: Duration) -> String {
        let record = SecretRecord::new(payload, max_views, ttl);
        loop {
            let key = keys::generate(self.key_length);
            match self.entries.entry(key.clone()) {
                Entry::Occupied(_) => {
                    // Collision. Vanishingly rare at the default length;
                    // draw again rather than overwrite a live secret.
                    debug!("key collision, regenerating");
                }
                Entry::Vacant(slot) => {
                    slot.insert(record);
                    debug!(key = key_prefix(&key), "stored secret");
                    return key;
                }
            }
        }
    }

    /// Consume one view of `key`: charge the view and hand out the payload,
    /// or report why nothing was handed out. On the final view the stored
    /// payload is destroyed in the same locked step, leaving a tombstone
    /// that answers [`ConsumeResult::Spent`] until the sweeper drops it.
    ///
    /// Expired records are evicted here rather than served, so a dead link
    /// reads the same whether the sweeper has run or not.
    pub fn consume(&self, key: &str) -> ConsumeResult {
        let now = Instant::now();
        match self.entries.entry(key.to_owned()) {
            Entry::Vacant(_) => ConsumeResult::NotFound,
            Entry::Occupied(mut entry) => {
                if entry.get().is_expired(now) {
                    entry.remove();
                    debug!(key = key_prefix(key), "lazy-evicted expired secret");
                    return ConsumeResult::NotFound;
                }

                let record = entry.get_mut();
                let payload = match record.payload.take() {
                    Some(payload) => payload,
                    None => return ConsumeResult::Spent,
                };

                record.views += 1;
                let views = record.views;
                let max_views = record.max_views.get();
                let expires_in = record.expires_at.saturating_duration_since(now);

                if views < max_views {
                    // Views remain: hand out this copy, keep one stored.
                    record.payload = Some(payload.clone());
                    ConsumeResult::Viewed(SecretView {
                        payload,
                        views,
                        max_views,
                        expires_in,
                    })
                } else {
                    // Final view: the stored copy stays taken.
                    record.spent_at = Some(now);
                    debug!(key = key_prefix(key), views, "burned after final view");
                    ConsumeResult::Burned(SecretView {
                        payload,
                        views,
                        max_views,
                        expires_in,
                    })
                }
            }
        }
    }

    /// Metadata for `key` without charging a view, plus whether the view
    /// budget is already spent. Expired records are lazily evicted here
    /// just like on the consume path.
    pub fn peek(&self, key: &str) -> Option<(SecretMeta, bool)> {
        let now = Instant::now();
        match self.entries.entry(key.to_owned()) {
            Entry::Vacant(_) => None,
            Entry::Occupied(entry) => {
                if entry.get().is_expired(now) {
                    entry.remove();
                    debug!(key = key_prefix(key), "lazy-evicted expired secret");
                    return None;
                }
                let record = entry.get();
                Some((record.meta(now), record.is_spent()))
            }
        }
    }

    /// Remove `key` outright, tombstone or not. Returns true if a record
    /// existed. Safe to call any number of times.
    pub fn evict(&self, key: &str) -> bool {
        let existed = self.entries.remove(key).is_some();
        if existed {
            debug!(key = key_prefix(key), "evicted secret");
        }
        existed
    }

    /// Drop every record past its time budget, plus spent tombstones older
    /// than `retention`. Returns how many records were removed.
    ///
    /// Candidate keys are snapshotted first and re-checked under each entry
    /// lock, so a record consumed or replaced mid-sweep is left alone.
    pub fn purge_expired(&self, retention: Duration) -> usize {
        let now = Instant::now();
        let candidates: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.value().should_purge(now, retention))
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = 0;
        for key in candidates {
            if self
                .entries
                .remove_if(&key, |_, record| record.should_purge(now, retention))
                .is_some()
            {
                removed += 1;
            }
        }
        removed
    }

    /// Spawn a background Tokio task that calls [`purge_expired`] every
    /// `interval`. Returns the task handle so the server can abort it on
    /// shutdown.
    ///
    /// [`purge_expired`]: Store::purge_expired
    pub fn spawn_sweep(self, interval: Duration, retention: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.tick().await; // skip first immediate tick
            loop {
                ticker.tick().await;
                let removed = self.purge_expired(retention);
                if removed > 0 {
                    info!(removed, "swept expired secrets");
                }
            }
        })
    }

    /// Number of records currently held, tombstones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
