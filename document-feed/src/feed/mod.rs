//! Paginated live document feed.
//!
//! The feed shows one page of documents at a time and keeps it current by
//! holding exactly one live subscription on the store. Pushes from every
//! subscription arrive on a single channel tagged with the generation of the
//! subscription that produced them; anything not tagged with the active
//! generation is dropped, so a late push for a page the user already left
//! can never overwrite the page being shown.
//!
//! The store's cursors only run forward. Going back a page therefore replays
//! from page 1 until the target page is reached, and the result reflects the
//! data as it is now, not as it was when the page was first shown.

pub mod state;

pub use state::{
    Applied, FeedConfig, FeedState, Navigation, DEFAULT_MAX_PAGE_SIZE, DEFAULT_PAGE_SIZE,
};

use crate::gateway::{
    DocumentGateway, FeedEvent, GatewayError, PageQuery, SnapshotSink, SubscriptionHandle,
};
use crate::models::{Cursor, PageSnapshot};
use service_core::error::AppError;
use service_core::retry::retry_async;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("page size must be at least 1")]
    InvalidPageSize,

    #[error("page size {0} exceeds the maximum of {1}")]
    PageSizeTooLarge(usize, usize),

    #[error("failed to load documents: {0}")]
    SubscriptionSetup(#[source] GatewayError),

    #[error("live document updates failed: {0}")]
    Subscription(#[source] GatewayError),

    #[error("timed out after {0:?} loading page {1}")]
    ReplayTimeout(Duration, u32),
}

impl From<FeedError> for AppError {
    fn from(err: FeedError) -> Self {
        match err {
            FeedError::InvalidPageSize | FeedError::PageSizeTooLarge(..) => {
                AppError::BadRequest(anyhow::anyhow!(err))
            }
            FeedError::SubscriptionSetup(e) | FeedError::Subscription(e) => AppError::from(e),
            FeedError::ReplayTimeout(..) => AppError::BadGateway(err.to_string()),
        }
    }
}

pub struct DocumentFeed {
    gateway: Arc<dyn DocumentGateway>,
    config: FeedConfig,
    state: FeedState,
    /// Cursor the current page was opened after; `None` on page 1.
    page_start: Option<Cursor>,
    generation: u64,
    active: Option<SubscriptionHandle>,
    events_tx: mpsc::UnboundedSender<FeedEvent>,
    events_rx: mpsc::UnboundedReceiver<FeedEvent>,
}

impl DocumentFeed {
    /// Create the feed and subscribe to the first page.
    pub async fn initialize(
        gateway: Arc<dyn DocumentGateway>,
        config: FeedConfig,
    ) -> Result<Self, FeedError> {
        config.validate()?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let mut feed = Self {
            gateway,
            config,
            state: FeedState::new(),
            page_start: None,
            generation: 0,
            active: None,
            events_tx,
            events_rx,
        };

        feed.subscribe(None).await?;
        tracing::debug!(page_size = feed.config.page_size, "Document feed initialized");
        Ok(feed)
    }

    pub fn state(&self) -> &FeedState {
        &self.state
    }

    pub fn page_size(&self) -> usize {
        self.config.page_size
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_subscribed(&self) -> bool {
        self.active.is_some()
    }

    pub async fn go_to_next_page(&mut self) -> Result<Navigation, FeedError> {
        let cursor = match (&self.state.cursor, self.state.has_more) {
            (Some(cursor), true) => cursor.clone(),
            _ => {
                tracing::debug!(
                    page_number = self.state.page_number,
                    "No next page, ignoring navigation"
                );
                return Ok(Navigation::NoOp);
            }
        };

        self.subscribe(Some(cursor.clone())).await?;
        self.page_start = Some(cursor);
        self.state.page_number += 1;

        tracing::debug!(page_number = self.state.page_number, "Moved to next page");
        Ok(Navigation::Moved {
            page_number: self.state.page_number,
        })
    }

    pub async fn go_to_previous_page(&mut self) -> Result<Navigation, FeedError> {
        if self.state.page_number <= 1 {
            tracing::debug!("Already on first page, ignoring navigation");
            return Ok(Navigation::NoOp);
        }

        let target = self.state.page_number - 1;
        let cursor = self.state.cursor.clone();
        let has_more = self.state.has_more;

        match self.replay_to(target).await {
            Ok(navigation) => Ok(navigation),
            Err(e) => {
                // Every replay step reset the window; the page still shown
                // must stay navigable.
                self.state.cursor = cursor;
                self.state.has_more = has_more;
                Err(e)
            }
        }
    }

    /// Walk forward from page 1 until `target` is subscribed, or until a
    /// short page shows the data no longer reaches that far.
    async fn replay_to(&mut self, target: u32) -> Result<Navigation, FeedError> {
        let mut page = 1;
        let mut after: Option<Cursor> = None;

        loop {
            self.subscribe(after.clone()).await?;
            if page == target {
                break;
            }

            let snapshot = match self.first_push(page).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    self.fail_active(&e);
                    return Err(e);
                }
            };

            let next_start = match &snapshot.last {
                Some(last) if snapshot.items.len() == self.config.page_size => last.clone(),
                _ => {
                    // The data shrank; this is now the last page.
                    tracing::info!(
                        reached = page,
                        target = target,
                        "Replay ended early, fewer pages than before"
                    );
                    self.page_start = after;
                    self.state.page_number = page;
                    self.apply_snapshot(snapshot);
                    return Ok(Navigation::Moved { page_number: page });
                }
            };

            after = Some(next_start);
            page += 1;
        }

        self.page_start = after;
        self.state.page_number = target;

        tracing::debug!(page_number = target, "Moved to previous page");
        Ok(Navigation::Moved {
            page_number: target,
        })
    }

    /// Re-open the current page's subscription, e.g. after a failure.
    pub async fn refresh(&mut self) -> Result<(), FeedError> {
        let start = self.page_start.clone();
        self.subscribe(start).await
    }

    /// Handle one push from the store.
    pub fn apply(&mut self, event: FeedEvent) -> Applied {
        if self.active.is_none() || event.generation != self.generation {
            metrics::counter!("feed_stale_pushes_total").increment(1);
            tracing::debug!(
                push_generation = event.generation,
                active_generation = self.generation,
                "Dropping push from superseded subscription"
            );
            return Applied::Stale;
        }

        match event.payload {
            Ok(snapshot) => {
                self.apply_snapshot(snapshot);
                Applied::Replaced
            }
            Err(e) => {
                let err = FeedError::Subscription(e);
                tracing::error!(
                    generation = self.generation,
                    page_number = self.state.page_number,
                    error = %err,
                    "Live subscription failed, keeping last good page"
                );
                self.fail_active(&err);
                Applied::Failed
            }
        }
    }

    /// Apply every push that has already arrived. Returns how many were not
    /// stale.
    pub fn poll_updates(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            if self.apply(event) != Applied::Stale {
                applied += 1;
            }
        }
        applied
    }

    /// Wait for the next push of the active subscription and apply it.
    /// Returns `None` when there is no active subscription to wait on.
    pub async fn next_update(&mut self) -> Option<Applied> {
        loop {
            self.active.as_ref()?;
            let event = self.events_rx.recv().await?;
            match self.apply(event) {
                Applied::Stale => continue,
                applied => return Some(applied),
            }
        }
    }

    /// Release the live subscription. Safe to call more than once.
    pub fn teardown(&mut self) {
        self.release_active();
    }

    /// Cancel, then open a subscription for the page after `after`. On
    /// success the window is marked loading until the first push lands.
    async fn subscribe(&mut self, after: Option<Cursor>) -> Result<(), FeedError> {
        self.release_active();

        let query = PageQuery {
            page_size: self.config.page_size,
            after,
        };
        let gateway = Arc::clone(&self.gateway);
        let tx = self.events_tx.clone();
        let mut generation = self.generation;

        let result = retry_async(
            &self.config.setup_retry,
            "feed_subscribe",
            GatewayError::is_transient,
            || {
                generation += 1;
                let sink = SnapshotSink::new(generation, tx.clone());
                let gateway = Arc::clone(&gateway);
                let query = query.clone();
                async move { gateway.query(query, sink).await }
            },
        )
        .await;

        // Every attempt consumed a generation; none of the failed ones may
        // match again.
        self.generation = generation;

        match result {
            Ok(handle) => {
                metrics::counter!("feed_subscriptions_opened_total").increment(1);
                tracing::debug!(
                    subscription = %handle,
                    generation = generation,
                    "Subscribed to page"
                );
                self.active = Some(handle);
                self.state.loading = true;
                self.state.has_more = false;
                self.state.cursor = None;
                Ok(())
            }
            Err(e) => {
                let err = FeedError::SubscriptionSetup(e);
                tracing::error!(error = %err, "Failed to subscribe to page");
                metrics::counter!("feed_subscription_failures_total").increment(1);
                self.state.loading = false;
                self.state.error = Some(err.to_string());
                Err(err)
            }
        }
    }

    async fn first_push(&mut self, page: u32) -> Result<PageSnapshot, FeedError> {
        let generation = self.generation;
        let events = &mut self.events_rx;
        let wait = async move {
            loop {
                match events.recv().await {
                    Some(event) if event.generation == generation => {
                        return event.payload.map_err(FeedError::Subscription);
                    }
                    Some(event) => {
                        metrics::counter!("feed_stale_pushes_total").increment(1);
                        tracing::debug!(
                            push_generation = event.generation,
                            "Dropping push from superseded subscription"
                        );
                    }
                    None => {
                        return Err(FeedError::Subscription(GatewayError::Unavailable(
                            "feed channel closed".to_string(),
                        )))
                    }
                }
            }
        };

        tokio::time::timeout(self.config.replay_timeout, wait)
            .await
            .map_err(|_| FeedError::ReplayTimeout(self.config.replay_timeout, page))?
    }

    fn apply_snapshot(&mut self, snapshot: PageSnapshot) {
        self.state.has_more = snapshot.items.len() == self.config.page_size;
        self.state.cursor = snapshot.last;
        self.state.items = snapshot.items;
        self.state.loading = false;
        self.state.error = None;
    }

    fn fail_active(&mut self, err: &FeedError) {
        self.release_active();
        metrics::counter!("feed_subscription_failures_total").increment(1);
        self.state.loading = false;
        self.state.error = Some(err.to_string());
    }

    fn release_active(&mut self) {
        if let Some(handle) = self.active.take() {
            self.gateway.cancel(&handle);
            metrics::counter!("feed_subscriptions_cancelled_total").increment(1);
            tracing::debug!(subscription = %handle, "Released page subscription");
        }
    }
}

impl Drop for DocumentFeed {
    fn drop(&mut self) {
        self.release_active();
    }
}
