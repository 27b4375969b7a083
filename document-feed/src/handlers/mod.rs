pub mod documents;
pub mod feed;
pub mod health;

pub use documents::{download_file, upload_document};
pub use feed::document_feed;
pub use health::{health_check, metrics_endpoint, readiness_check};
