pub mod document;

pub use document::{Cursor, DocumentRecord, NewDocument, PageSnapshot};
