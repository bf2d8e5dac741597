//! Event store abstraction.

use std::collections::{BTreeMap, HashSet};

use tokio::sync::RwLock;

use crate::analytics::TimeRange;
use crate::event::{IdentityRecord, RawEvent};

/// Append-only store of raw events keyed by identity.
///
/// Implementations must absorb duplicate identity inserts silently and make
/// concurrent writes safe. Reads may miss writes that commit concurrently.
#[async_trait::async_trait]
pub trait EventStore: Send + Sync + 'static {
    /// Insert `record` unless its identity already exists.
    async fn insert_identity(&self, record: &IdentityRecord) -> anyhow::Result<()>;

    async fn insert_event(&self, event: &RawEvent) -> anyhow::Result<()>;

    /// Every stored event of every identity with at least one event in
    /// `range`, ordered by identity, then time, then insertion order.
    async fn events_for_active_identities(&self, range: &TimeRange)
        -> anyhow::Result<Vec<RawEvent>>;

    async fn ping(&self) -> anyhow::Result<()>;
}

#[derive(Default)]
struct MemoryInner {
    identities: BTreeMap<String, IdentityRecord>,
    events: Vec<RawEvent>,
}

/// In-process `EventStore` used by tests and embedders that bring their own
/// persistence.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn identity(&self, identity: &str) -> Option<IdentityRecord> {
        self.inner.read().await.identities.get(identity).cloned()
    }

    pub async fn event_count(&self) -> usize {
        self.inner.read().await.events.len()
    }
}

#[async_trait::async_trait]
impl EventStore for MemoryStore {
    async fn insert_identity(&self, record: &IdentityRecord) -> anyhow::Result<()> {
        self.inner
            .write()
            .await
            .identities
            .entry(record.identity.clone())
            .or_insert_with(|| record.clone());
        Ok(())
    }

    async fn insert_event(&self, event: &RawEvent) -> anyhow::Result<()> {
        self.inner.write().await.events.push(event.clone());
        Ok(())
    }

    async fn events_for_active_identities(
        &self,
        range: &TimeRange,
    ) -> anyhow::Result<Vec<RawEvent>> {
        let inner = self.inner.read().await;
        let active: HashSet<&str> = inner
            .events
            .iter()
            .filter(|e| range.contains(e.created_at))
            .map(|e| e.identity.as_str())
            .collect();

        let mut events: Vec<RawEvent> = inner
            .events
            .iter()
            .filter(|e| active.contains(e.identity.as_str()))
            .cloned()
            .collect();
        // Stable sort keeps insertion order among equal timestamps.
        events.sort_by(|a, b| {
            a.identity
                .cmp(&b.identity)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        Ok(events)
    }

    async fn ping(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
