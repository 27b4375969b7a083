//! Contract between the feed and the document store.
//!
//! A gateway turns a [`PageQuery`] into a live subscription: it pushes the
//! initial page into the supplied [`SnapshotSink`] and then pushes a fresh
//! full page every time the underlying data for that query changes, until the
//! subscription is cancelled.

pub mod memory;
pub mod mongo;

pub use memory::MemoryGateway;
pub use mongo::MongoGateway;

use crate::models::{Cursor, DocumentRecord, NewDocument, PageSnapshot};
use async_trait::async_trait;
use service_core::error::AppError;
use std::fmt;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("document store unavailable: {0}")]
    Unavailable(String),

    #[error("database error: {0}")]
    Database(#[from] mongodb::error::Error),
}

impl GatewayError {
    /// Whether trying the same call again may succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(self, GatewayError::InvalidQuery(_))
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::InvalidQuery(msg) => AppError::BadRequest(anyhow::anyhow!(msg)),
            GatewayError::Unavailable(msg) => AppError::BadGateway(msg),
            GatewayError::Database(e) => AppError::from(e),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery {
    pub page_size: usize,
    pub after: Option<Cursor>,
}

impl PageQuery {
    pub fn first(page_size: usize) -> Self {
        Self {
            page_size,
            after: None,
        }
    }

    pub fn after(page_size: usize, cursor: Cursor) -> Self {
        Self {
            page_size,
            after: Some(cursor),
        }
    }

    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.page_size == 0 {
            return Err(GatewayError::InvalidQuery(
                "page size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// A push delivered to the feed, tagged with the generation of the
/// subscription that produced it.
#[derive(Debug)]
pub struct FeedEvent {
    pub generation: u64,
    pub payload: Result<PageSnapshot, GatewayError>,
}

/// Sending half of a feed's event channel, bound to one subscription
/// generation.
#[derive(Debug, Clone)]
pub struct SnapshotSink {
    generation: u64,
    tx: mpsc::UnboundedSender<FeedEvent>,
}

impl SnapshotSink {
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<FeedEvent>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns false once the receiving feed is gone.
    pub fn push(&self, snapshot: PageSnapshot) -> bool {
        self.send(Ok(snapshot))
    }

    pub fn fail(&self, error: GatewayError) -> bool {
        self.send(Err(error))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn send(&self, payload: Result<PageSnapshot, GatewayError>) -> bool {
        self.tx
            .send(FeedEvent {
                generation: self.generation,
                payload,
            })
            .is_ok()
    }
}

/// Opaque handle to one live subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

impl SubscriptionHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

#[async_trait]
pub trait DocumentGateway: Send + Sync {
    /// Open a live subscription for one page. An error here means nothing was
    /// subscribed and nothing will be pushed into `sink`.
    async fn query(
        &self,
        query: PageQuery,
        sink: SnapshotSink,
    ) -> Result<SubscriptionHandle, GatewayError>;

    /// Stop pushing for `handle`. Cancelling an unknown or already cancelled
    /// handle is a no-op.
    fn cancel(&self, handle: &SubscriptionHandle);

    async fn insert(&self, document: NewDocument) -> Result<DocumentRecord, GatewayError>;

    fn active_subscriptions(&self) -> usize;

    async fn health_check(&self) -> Result<(), GatewayError>;
}
