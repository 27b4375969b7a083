pub mod database;
pub mod metrics;
pub mod storage;
pub mod uploader;

pub use database::MongoDb;
pub use metrics::{get_metrics, init_metrics};
pub use storage::{LocalStorage, Storage};
pub use uploader::DocumentUploader;
