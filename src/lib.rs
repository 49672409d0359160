//! wilsonscrape - Wilson Center Digital Archive acquisition tool.
//!
//! A sequential scraper for the archive's search results: walks a page range
//! through a stealth headless browser, extracts document metadata via CSS
//! selectors, and persists it to SQLite with page-level completion tracking
//! so interrupted runs resume where they left off.

pub mod browser;
pub mod cli;
pub mod config;
pub mod error;
pub mod extract;
pub mod models;
pub mod repository;
pub mod walker;
