//! Domain models.

mod document;

pub use document::{CompletedPage, DocumentRecord};
