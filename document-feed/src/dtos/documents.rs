use crate::feed::FeedState;
use crate::models::DocumentRecord;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentResponse {
    pub id: String,
    pub name: String,
    pub url: String,
    pub created_at: String,
}

impl From<DocumentRecord> for DocumentResponse {
    fn from(doc: DocumentRecord) -> Self {
        Self {
            id: doc.id,
            name: doc.name,
            url: doc.url,
            created_at: doc.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct FeedParams {
    pub page_size: Option<usize>,
}

/// Client request on an open feed socket, e.g. `{"action":"next"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum FeedCommand {
    Next,
    Previous,
    Refresh,
}

/// Frame sent to the client whenever the visible page changes.
#[derive(Debug, Serialize, Deserialize)]
pub struct FeedView {
    pub items: Vec<DocumentResponse>,
    pub page_number: u32,
    pub has_more: bool,
    pub loading: bool,
    pub error: Option<String>,
}

impl From<&FeedState> for FeedView {
    fn from(state: &FeedState) -> Self {
        Self {
            items: state
                .items
                .iter()
                .cloned()
                .map(DocumentResponse::from)
                .collect(),
            page_number: state.page_number,
            has_more: state.has_more,
            loading: state.loading,
            error: state.error.clone(),
        }
    }
}
