use super::FeedError;
use crate::models::{Cursor, DocumentRecord};
use service_core::retry::RetryConfig;
use std::time::Duration;

pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const DEFAULT_MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub page_size: usize,
    /// Largest page a client may ask for.
    pub max_page_size: usize,
    /// Upper bound on waiting for each page's first push while replaying
    /// towards a previous page.
    pub replay_timeout: Duration,
    /// Retries for a subscription the store refuses to open.
    pub setup_retry: RetryConfig,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
            replay_timeout: Duration::from_secs(5),
            setup_retry: RetryConfig::quick(),
        }
    }
}

impl FeedConfig {
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            page_size,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), FeedError> {
        if self.page_size == 0 {
            return Err(FeedError::InvalidPageSize);
        }
        if self.page_size > self.max_page_size {
            return Err(FeedError::PageSizeTooLarge(
                self.page_size,
                self.max_page_size,
            ));
        }
        Ok(())
    }
}

/// What the feed currently shows.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedState {
    pub items: Vec<DocumentRecord>,
    /// Position of the last item in `items`; next page starts after it.
    pub cursor: Option<Cursor>,
    pub page_number: u32,
    pub has_more: bool,
    pub loading: bool,
    pub error: Option<String>,
}

impl FeedState {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            cursor: None,
            page_number: 1,
            has_more: false,
            loading: true,
            error: None,
        }
    }
}

impl Default for FeedState {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of a navigation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Moved { page_number: u32 },
    /// Boundary reached (no next page, or already on page 1); nothing changed.
    NoOp,
}

/// Result of handing one push to the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// The page window was replaced.
    Replaced,
    /// The push carried an error; the subscription was closed and the
    /// window left at its last good contents.
    Failed,
    /// The push belonged to a superseded subscription and was dropped.
    Stale,
}
