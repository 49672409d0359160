//! Page walker: the sequential, resumable pagination loop.
//!
//! Drives the browser session across a range of search-results pages, hands
//! each rendered page to the extractor, and persists results through the
//! repository. Completion marking is the last step of a page's processing, so
//! an interrupted or failed page is always retried in full on the next run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::Rng;
use scraper::Html;
use tracing::{info, warn};

use crate::config::Settings;
use crate::error::ScrapeError;
use crate::extract;
use crate::models::DocumentRecord;
use crate::repository::ArchiveRepository;

/// Fetches a URL through the browser and returns rendered HTML.
///
/// `settle` is a fixed wait applied after navigation so client-side rendering
/// can finish. Tests substitute a canned fetcher for the real browser.
#[async_trait]
pub trait PageFetcher: Send {
    async fn fetch(&mut self, url: &str, settle: Duration) -> Result<String, ScrapeError>;
}

/// Walks search-results pages in ascending order, one at a time.
pub struct PageWalker<F> {
    fetcher: F,
    settings: Settings,
    shutdown: Arc<AtomicBool>,
}

impl<F: PageFetcher> PageWalker<F> {
    pub fn new(fetcher: F, settings: Settings, shutdown: Arc<AtomicBool>) -> Self {
        Self {
            fetcher,
            settings,
            shutdown,
        }
    }

    fn interrupted(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Process pages `start..=end` inclusive.
    ///
    /// Already-completed pages are skipped without any navigation. Page-scoped
    /// errors are logged and the walk continues; store errors abort the run.
    pub async fn scrape_range(
        &mut self,
        repo: &ArchiveRepository,
        start: u32,
        end: u32,
    ) -> Result<(), ScrapeError> {
        info!("Starting scraper for pages {} to {}", start, end);

        for page in start..=end {
            if self.interrupted() {
                info!("Interrupted, stopping before page {}", page);
                break;
            }

            if repo.is_page_completed(page)? {
                info!("Page {} already completed, skipping", page);
                continue;
            }

            match self.scrape_page(repo, page).await {
                Ok(()) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!("Error processing page {}: {}", page, e),
            }

            if page < end && !self.interrupted() {
                tokio::time::sleep(self.page_gap()).await;
            }
        }

        Ok(())
    }

    /// Scrape all documents from a single search-results page.
    async fn scrape_page(&mut self, repo: &ArchiveRepository, page: u32) -> Result<(), ScrapeError> {
        let started = Instant::now();
        info!("Processing page {}", page);

        let url = self.settings.search_url(page);
        let settle = Duration::from_millis(self.settings.delays.search_settle_ms);
        let html_text = self.fetcher.fetch(&url, settle).await?;

        // Parse in a block: the DOM is not Send and must not cross an await
        let links = {
            let html = Html::parse_document(&html_text);
            extract::document_links(&html, &self.settings.base_url)
        };

        if links.is_empty() {
            // Left unmarked on purpose so the page is retried next run
            warn!("No document links found on page {}, leaving it incomplete", page);
            return Ok(());
        }
        info!("Found {} document links on page {}", links.len(), page);

        let mut failures = 0usize;
        for (idx, link) in links.iter().enumerate() {
            if self.interrupted() {
                info!(
                    "Interrupted on page {}, leaving it incomplete after {} documents",
                    page, idx
                );
                return Ok(());
            }

            let position = (idx + 1) as u32;
            match self.scrape_document(page, position, link).await {
                Ok(record) => repo.upsert_document(&record)?,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!("Error scraping document {}: {}", link, e);
                    failures += 1;
                }
            }

            let gap = self.settings.delays.document_gap_ms;
            if gap > 0 {
                tokio::time::sleep(Duration::from_millis(gap)).await;
            }
        }

        if failures > 0 && self.settings.strict_completion {
            warn!(
                "{} of {} documents failed on page {}, leaving it incomplete",
                failures,
                links.len(),
                page
            );
            return Ok(());
        }
        if failures > 0 {
            warn!(
                "{} of {} documents failed on page {}, marking it complete anyway",
                failures,
                links.len(),
                page
            );
        }

        repo.mark_page_completed(page)?;

        let secs = started.elapsed().as_secs();
        info!(
            "Page {} marked as completed ({}m {}s)",
            page,
            secs / 60,
            secs % 60
        );
        Ok(())
    }

    /// Fetch and extract one document detail page.
    async fn scrape_document(
        &mut self,
        page: u32,
        position: u32,
        url: &str,
    ) -> Result<DocumentRecord, ScrapeError> {
        let settle = Duration::from_millis(self.settings.delays.document_settle_ms);
        let html_text = self.fetcher.fetch(url, settle).await?;

        let mut record = {
            let html = Html::parse_document(&html_text);
            extract::document_record(&html, url)
        };
        record.page_number = Some(page);
        record.page_position = Some(position);
        Ok(record)
    }

    /// Randomized politeness delay between pages.
    fn page_gap(&self) -> Duration {
        let min = self.settings.delays.page_gap_min_ms;
        let max = self.settings.delays.page_gap_max_ms;
        let ms = if min >= max {
            min
        } else {
            rand::rng().random_range(min..=max)
        };
        Duration::from_millis(ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DelaySettings;

    fn walker_with_gaps(min: u64, max: u64) -> PageWalker<NoopFetcher> {
        let mut settings = Settings::default();
        settings.delays = DelaySettings {
            page_gap_min_ms: min,
            page_gap_max_ms: max,
            ..DelaySettings::none()
        };
        PageWalker::new(NoopFetcher, settings, Arc::new(AtomicBool::new(false)))
    }

    struct NoopFetcher;

    #[async_trait]
    impl PageFetcher for NoopFetcher {
        async fn fetch(&mut self, url: &str, _settle: Duration) -> Result<String, ScrapeError> {
            Err(ScrapeError::Navigation {
                url: url.to_string(),
                message: "noop".to_string(),
            })
        }
    }

    #[test]
    fn test_page_gap_within_bounds() {
        let walker = walker_with_gaps(1000, 3000);
        for _ in 0..32 {
            let gap = walker.page_gap();
            assert!(gap >= Duration::from_millis(1000));
            assert!(gap <= Duration::from_millis(3000));
        }
    }

    #[test]
    fn test_page_gap_degenerate_range() {
        let walker = walker_with_gaps(2000, 2000);
        assert_eq!(walker.page_gap(), Duration::from_millis(2000));

        let walker = walker_with_gaps(0, 0);
        assert_eq!(walker.page_gap(), Duration::ZERO);
    }
}
