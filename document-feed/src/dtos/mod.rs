pub mod documents;

pub use documents::{DocumentResponse, FeedCommand, FeedParams, FeedView};
