//! Document metadata model for archive records.
//!
//! One record per document detail page, keyed by the detail-page URL.
//! Multi-valued fields keep DOM appearance order and are stored in the
//! database as JSON array text.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata scraped from a single document detail page.
///
/// Every field except `document_url` and `scraped_at` is optional: a missing
/// selector yields `None` (or an empty list), never an error. Re-scraping the
/// same URL replaces the stored row wholesale.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Canonical detail-page URL. Primary key.
    pub document_url: String,
    /// Search-results page this document was found on (0-indexed). Provenance only.
    pub page_number: Option<u32>,
    /// 1-based position within that page. Provenance only.
    pub page_position: Option<u32>,
    pub original_publication_date: Option<String>,
    pub title: Option<String>,
    pub credits: Option<String>,
    /// Full transcript text from the active tab pane.
    pub text_body: Option<String>,
    pub summary: Option<String>,
    pub authors: Vec<String>,
    pub associated_places: Vec<String>,
    pub subjects_discussed: Vec<String>,
    pub associated_people_orgs: Vec<String>,
    pub document_contributors: Vec<String>,
    pub source: Option<String>,
    pub original_upload_date: Option<String>,
    pub original_archive_title: Option<String>,
    pub language: Vec<String>,
    pub rights: Option<String>,
    pub record_id: Option<String>,
    pub original_classification: Option<String>,
    pub donors: Vec<String>,
    /// When this row was written. Overwritten on every re-scrape.
    pub scraped_at: DateTime<Utc>,
}

impl DocumentRecord {
    /// Create an empty record for a URL, stamped now.
    pub fn new(document_url: impl Into<String>) -> Self {
        Self {
            document_url: document_url.into(),
            scraped_at: Utc::now(),
            ..Default::default()
        }
    }

    /// Column names in database/CSV order.
    pub const COLUMNS: &'static [&'static str] = &[
        "document_url",
        "page_number",
        "page_position",
        "original_publication_date",
        "title",
        "credits",
        "text_body",
        "summary",
        "authors",
        "associated_places",
        "subjects_discussed",
        "associated_people_orgs",
        "document_contributors",
        "source",
        "original_upload_date",
        "original_archive_title",
        "language",
        "rights",
        "record_id",
        "original_classification",
        "donors",
        "scraped_at",
    ];

    /// Serialize a multi-valued field as JSON array text, or `None` when empty.
    ///
    /// Matches the storage format: an absent pill list is NULL, not `[]`.
    pub fn json_list(values: &[String]) -> Option<String> {
        if values.is_empty() {
            None
        } else {
            // Vec<String> to JSON array cannot fail
            Some(serde_json::to_string(values).unwrap_or_default())
        }
    }

    /// Parse a stored JSON array cell back into an ordered list.
    pub fn parse_json_list(text: Option<String>) -> Vec<String> {
        text.and_then(|t| serde_json::from_str(&t).ok())
            .unwrap_or_default()
    }
}

/// A fully processed search-results page.
///
/// Presence of a row is a durable promise that every document discoverable on
/// the page at scrape time was attempted and persisted. There is no transition
/// back to incomplete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedPage {
    pub page_number: u32,
    pub completed_at: DateTime<Utc>,
}
