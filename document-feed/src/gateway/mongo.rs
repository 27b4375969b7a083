use super::{DocumentGateway, GatewayError, PageQuery, SnapshotSink, SubscriptionHandle};
use crate::models::{DocumentRecord, NewDocument, PageSnapshot};
use crate::services::MongoDb;
use async_trait::async_trait;
use dashmap::DashMap;
use futures::{StreamExt, TryStreamExt};
use mongodb::bson::{doc, DateTime as BsonDateTime, Document};
use mongodb::change_stream::{event::ChangeStreamEvent, ChangeStream};
use mongodb::options::FindOptions;
use mongodb::Collection;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Live queries over the `documents` collection.
///
/// A subscription is a keyset `find` that is re-run whenever the
/// collection's change stream reports a write. Change streams need a replica
/// set; against a standalone server `query` fails up front.
pub struct MongoGateway {
    db: MongoDb,
    subscriptions: Arc<DashMap<u64, CancellationToken>>,
    next_handle: AtomicU64,
}

impl MongoGateway {
    pub fn new(db: MongoDb) -> Self {
        Self {
            db,
            subscriptions: Arc::new(DashMap::new()),
            next_handle: AtomicU64::new(0),
        }
    }
}

fn page_filter(query: &PageQuery) -> Document {
    match &query.after {
        Some(cursor) => {
            let created_at = BsonDateTime::from_chrono(cursor.created_at());
            doc! {
                "$or": [
                    { "created_at": { "$gt": created_at } },
                    { "created_at": created_at, "_id": { "$gt": cursor.id() } },
                ]
            }
        }
        None => doc! {},
    }
}

/// A negative limit means "single batch" to the server, so sizes that do
/// not fit are refused.
fn page_limit(query: &PageQuery) -> Result<i64, GatewayError> {
    i64::try_from(query.page_size).map_err(|_| {
        GatewayError::InvalidQuery(format!("page size {} is too large", query.page_size))
    })
}

async fn fetch_page(
    collection: &Collection<DocumentRecord>,
    query: &PageQuery,
) -> Result<PageSnapshot, GatewayError> {
    let options = FindOptions::builder()
        .sort(doc! { "created_at": 1, "_id": 1 })
        .limit(page_limit(query)?)
        .build();

    let items: Vec<DocumentRecord> = collection
        .find(page_filter(query), options)
        .await?
        .try_collect()
        .await?;

    Ok(PageSnapshot::new(items))
}

async fn run_live_query(
    collection: Collection<DocumentRecord>,
    query: PageQuery,
    sink: SnapshotSink,
    mut changes: ChangeStream<ChangeStreamEvent<DocumentRecord>>,
    mut delivered: Vec<DocumentRecord>,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            change = changes.next() => {
                let error = match change {
                    // Feed gone without cancelling.
                    Some(Ok(_)) if sink.is_closed() => break,
                    Some(Ok(_)) => match fetch_page(&collection, &query).await {
                        Ok(snapshot) => {
                            if token.is_cancelled() {
                                break;
                            }
                            if snapshot.items == delivered {
                                continue;
                            }
                            delivered = snapshot.items.clone();
                            if !sink.push(snapshot) {
                                break;
                            }
                            continue;
                        }
                        Err(e) => e,
                    },
                    Some(Err(e)) => GatewayError::from(e),
                    None => GatewayError::Unavailable("change stream closed".to_string()),
                };

                tracing::warn!(
                    generation = sink.generation(),
                    error = %error,
                    "Live query failed"
                );
                if !token.is_cancelled() {
                    sink.fail(error);
                }
                break;
            }
        }
    }
}

#[async_trait]
impl DocumentGateway for MongoGateway {
    async fn query(
        &self,
        query: PageQuery,
        sink: SnapshotSink,
    ) -> Result<SubscriptionHandle, GatewayError> {
        query.validate()?;
        let collection = self.db.documents();

        // Open the stream before the first read so no write can fall between them.
        let changes = collection.watch(None, None).await?;
        let first = fetch_page(&collection, &query).await?;
        let delivered = first.items.clone();
        sink.push(first);

        let id = self.next_handle.fetch_add(1, Ordering::SeqCst);
        let token = CancellationToken::new();
        self.subscriptions.insert(id, token.clone());

        let subscriptions = Arc::clone(&self.subscriptions);
        tokio::spawn(async move {
            run_live_query(collection, query, sink, changes, delivered, token).await;
            subscriptions.remove(&id);
            tracing::debug!(subscription = id, "Live query task finished");
        });

        tracing::debug!(subscription = id, "Live query opened");
        Ok(SubscriptionHandle::new(id))
    }

    fn cancel(&self, handle: &SubscriptionHandle) {
        if let Some((_, token)) = self.subscriptions.remove(&handle.id()) {
            token.cancel();
            tracing::debug!(subscription = handle.id(), "Live query cancelled");
        }
    }

    async fn insert(&self, document: NewDocument) -> Result<DocumentRecord, GatewayError> {
        // Stored timestamps have millisecond precision; return what a read would.
        let created_at = BsonDateTime::from_chrono(document.created_at).to_chrono();
        let record = DocumentRecord {
            id: Uuid::new_v4().to_string(),
            name: document.name,
            url: document.url,
            created_at,
        };

        self.db.documents().insert_one(&record, None).await?;
        tracing::info!(document_id = %record.id, "Document record inserted");
        Ok(record)
    }

    fn active_subscriptions(&self) -> usize {
        self.subscriptions.len()
    }

    async fn health_check(&self) -> Result<(), GatewayError> {
        self.db.health_check().await.map_err(GatewayError::from)
    }
}
