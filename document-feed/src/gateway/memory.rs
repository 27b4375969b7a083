use super::{DocumentGateway, GatewayError, PageQuery, SnapshotSink, SubscriptionHandle};
use crate::models::{DocumentRecord, NewDocument, PageSnapshot};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// In-process document store with live queries.
///
/// Every mutation re-evaluates each open query and pushes the new page to
/// the subscriptions whose result actually changed.
#[derive(Default)]
pub struct MemoryGateway {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    documents: BTreeSet<DocumentRecord>,
    subscriptions: HashMap<u64, LiveQuery>,
    next_handle: u64,
}

struct LiveQuery {
    query: PageQuery,
    sink: SnapshotSink,
    delivered: Vec<DocumentRecord>,
}

impl Inner {
    fn page(&self, query: &PageQuery) -> PageSnapshot {
        let items = self
            .documents
            .iter()
            .filter(|doc| query.after.as_ref().map_or(true, |c| doc.is_after(c)))
            .take(query.page_size)
            .cloned()
            .collect();
        PageSnapshot::new(items)
    }

    fn broadcast(&mut self) {
        let pages: Vec<(u64, PageSnapshot)> = self
            .subscriptions
            .iter()
            .map(|(id, live)| (*id, self.page(&live.query)))
            .collect();

        for (id, snapshot) in pages {
            let Some(live) = self.subscriptions.get_mut(&id) else {
                continue;
            };
            if live.delivered == snapshot.items {
                continue;
            }
            live.delivered = snapshot.items.clone();
            if !live.sink.push(snapshot) {
                tracing::debug!(subscription = id, "Feed dropped, closing live query");
                self.subscriptions.remove(&id);
            }
        }
    }
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert fully formed records, e.g. fixtures with fixed ids.
    pub fn seed(&self, records: impl IntoIterator<Item = DocumentRecord>) {
        let mut inner = self.lock();
        inner.documents.extend(records);
        inner.broadcast();
    }

    pub fn remove(&self, id: &str) -> bool {
        let mut inner = self.lock();
        let before = inner.documents.len();
        inner.documents.retain(|doc| doc.id != id);
        let removed = inner.documents.len() != before;
        if removed {
            inner.broadcast();
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.lock().documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DocumentGateway for MemoryGateway {
    async fn query(
        &self,
        query: PageQuery,
        sink: SnapshotSink,
    ) -> Result<SubscriptionHandle, GatewayError> {
        query.validate()?;

        let mut inner = self.lock();
        let id = inner.next_handle;
        inner.next_handle += 1;

        let snapshot = inner.page(&query);
        let delivered = snapshot.items.clone();
        if sink.push(snapshot) {
            inner.subscriptions.insert(
                id,
                LiveQuery {
                    query,
                    sink,
                    delivered,
                },
            );
        }

        tracing::debug!(subscription = id, "Live query opened");
        Ok(SubscriptionHandle::new(id))
    }

    fn cancel(&self, handle: &SubscriptionHandle) {
        if self.lock().subscriptions.remove(&handle.id()).is_some() {
            tracing::debug!(subscription = handle.id(), "Live query cancelled");
        }
    }

    async fn insert(&self, document: NewDocument) -> Result<DocumentRecord, GatewayError> {
        let record = DocumentRecord {
            id: Uuid::new_v4().to_string(),
            name: document.name,
            url: document.url,
            created_at: document.created_at,
        };

        let mut inner = self.lock();
        inner.documents.insert(record.clone());
        inner.broadcast();
        Ok(record)
    }

    fn active_subscriptions(&self) -> usize {
        self.lock().subscriptions.len()
    }

    async fn health_check(&self) -> Result<(), GatewayError> {
        Ok(())
    }
}
