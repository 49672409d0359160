//! Field extraction from rendered archive pages.
//!
//! Everything here is pure: callers fetch rendered HTML through the browser
//! session, parse it in a non-async scope (the DOM is not Send), and hand it
//! to these functions. Missing optional fields yield `None` or an empty list,
//! never an error.

use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

use crate::models::DocumentRecord;

/// Selector cascade for document links on a search-results page.
/// The first selector that matches anything wins.
const LINK_SELECTORS: &[&str] = &[
    "td.document.contextual-region a",
    "td.document a",
    ".views-row a[href*='/document/']",
    "a[href*='/document/']",
];

fn sel(selector: &str) -> Selector {
    // All selectors in this module are static and known-valid
    Selector::parse(selector).expect("static selector")
}

/// Collapse an element's text nodes into a trimmed string, `None` when empty.
fn element_text(element: ElementRef<'_>) -> Option<String> {
    let text = element.text().collect::<String>();
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Text of the first element matching `selector`.
fn first_text(html: &Html, selector: &str) -> Option<String> {
    html.select(&sel(selector)).find_map(element_text)
}

fn heading_matches(element: ElementRef<'_>, heading: &str) -> bool {
    element
        .text()
        .collect::<String>()
        .to_lowercase()
        .contains(&heading.to_lowercase())
}

/// Value of the information block whose `.sub-title` contains `heading`.
///
/// Information blocks carry scalar metadata (Source, Rights, Record ID, ...).
fn information_block(html: &Html, heading: &str) -> Option<String> {
    let block_sel = sel(".information-block");
    let subtitle_sel = sel(".sub-title");
    let text_sel = sel(".text");

    for block in html.select(&block_sel) {
        let Some(subtitle) = block.select(&subtitle_sel).next() else {
            continue;
        };
        if !heading_matches(subtitle, heading) {
            continue;
        }
        if let Some(value) = block.select(&text_sel).find_map(element_text) {
            return Some(value);
        }
    }
    None
}

/// Items of the pill list introduced by a heading containing `heading`.
///
/// Primary layout: an `h2.title` heading followed by a sibling element holding
/// `.pill .name span` entries. Fallback layout: a `.pill-block` or
/// `.information-block` with an inner `h3`/`h4` title. Order and duplicates
/// are preserved.
fn pill_list(html: &Html, heading: &str) -> Vec<String> {
    let h2_sel = sel("h2.title");
    let pill_span_sel = sel(".pill .name span");
    let pill_name_sel = sel(".pill .name");

    for h2 in html.select(&h2_sel) {
        if !heading_matches(h2, heading) {
            continue;
        }
        let Some(sibling) = h2.next_siblings().filter_map(ElementRef::wrap).next() else {
            continue;
        };
        let names: Vec<String> = sibling.select(&pill_span_sel).filter_map(element_text).collect();
        if !names.is_empty() {
            return names;
        }
    }

    // Fallback: pill blocks with inner titles
    let block_sel = sel(".pill-block, .information-block");
    let block_title_sel = sel("h3.title, h4.title, h3.sub-title");
    for block in html.select(&block_sel) {
        let matched = block
            .select(&block_title_sel)
            .any(|title| heading_matches(title, heading));
        if !matched {
            continue;
        }
        let mut names: Vec<String> = block.select(&pill_span_sel).filter_map(element_text).collect();
        if names.is_empty() {
            names = block.select(&pill_name_sel).filter_map(element_text).collect();
        }
        if !names.is_empty() {
            return names;
        }
    }

    Vec::new()
}

/// Extract document detail links from a search-results page, in DOM order.
///
/// Relative hrefs are resolved against `base_url`; duplicates are dropped
/// while preserving first-seen order.
pub fn document_links(html: &Html, base_url: &str) -> Vec<String> {
    let mut elements = Vec::new();
    for selector in LINK_SELECTORS {
        elements = html.select(&sel(selector)).collect::<Vec<_>>();
        if !elements.is_empty() {
            debug!("Found {} elements with selector: {}", elements.len(), selector);
            break;
        }
    }

    let mut links = Vec::new();
    for element in elements {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        if !href.contains("/document/") {
            continue;
        }

        let full_url = if href.starts_with("http://") || href.starts_with("https://") {
            href.to_string()
        } else if let Ok(base) = Url::parse(base_url) {
            match base.join(href) {
                Ok(joined) => joined.to_string(),
                Err(_) => continue,
            }
        } else {
            continue;
        };

        if !links.contains(&full_url) {
            links.push(full_url);
        }
    }
    links
}

/// Extract all metadata fields from a rendered document detail page.
pub fn document_record(html: &Html, document_url: &str) -> DocumentRecord {
    let mut record = DocumentRecord::new(document_url);

    record.original_publication_date = first_text(html, ".date");
    record.title = first_text(html, "h1.title");
    record.credits = first_text(html, ".donated");
    record.text_body = first_text(html, ".tab-pane.active");
    record.summary = first_text(html, ".text-block");

    record.authors = pill_list(html, "Author");
    record.associated_places = pill_list(html, "Associated Places");
    record.subjects_discussed = pill_list(html, "Subjects Discussed");
    record.associated_people_orgs = pill_list(html, "Associated People");
    record.document_contributors = pill_list(html, "Document Contributor");
    record.donors = pill_list(html, "Donor");
    record.language = pill_list(html, "Language");

    record.source = information_block(html, "Source");
    record.original_upload_date = information_block(html, "Original Uploaded Date");
    record.rights = information_block(html, "Rights");
    record.record_id = information_block(html, "Record ID");
    record.original_classification = information_block(html, "Original Classification");
    // Archive title is a pill in the markup but a scalar in the data model
    record.original_archive_title = pill_list(html, "Original Archive").into_iter().next();

    record
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEARCH_PAGE: &str = r#"
        <html><body><table>
        <tr><td class="document contextual-region">
            <a href="/document/112504/telegram-moscow">Telegram</a>
        </td></tr>
        <tr><td class="document contextual-region">
            <a href="https://digitalarchive.wilsoncenter.org/document/110001/memo">Memo</a>
        </td></tr>
        <tr><td class="document contextual-region">
            <a href="/document/112504/telegram-moscow">Telegram again</a>
        </td></tr>
        <tr><td class="document contextual-region">
            <a href="/collection/76/not-a-doc">Collection</a>
        </td></tr>
        </table></body></html>
    "#;

    const DOCUMENT_PAGE: &str = r#"
        <html><body>
        <h1 class="title">Telegram from Moscow</h1>
        <span class="date">June 17, 1962</span>
        <div class="donated">Donated by the Blavatnik Family Foundation</div>
        <div class="tab-pane active">Full telegram text here.</div>
        <div class="text-block">A short summary.</div>

        <h2 class="title">Authors</h2>
        <div class="pills">
            <span class="pill"><span class="name"><span>Gromyko, Andrei</span></span></span>
            <span class="pill"><span class="name"><span>Dobrynin, Anatoly</span></span></span>
        </div>

        <div class="pill-block">
            <h3 class="title">Subjects Discussed</h3>
            <span class="pill"><span class="name"><span>Cold War</span></span></span>
        </div>

        <div class="pill-block">
            <h4 class="title">Original Archive</h4>
            <span class="pill"><span class="name">AVP RF</span></span>
        </div>

        <div class="information-block">
            <h3 class="sub-title">Source</h3>
            <div class="text">AVP RF, f. 059a, op. 7</div>
        </div>
        <div class="information-block">
            <h3 class="sub-title">Record ID</h3>
            <div class="text">112504</div>
        </div>
        <div class="information-block">
            <h3 class="sub-title">Rights</h3>
            <div class="text"></div>
        </div>
        </body></html>
    "#;

    #[test]
    fn test_document_links_dedup_and_resolution() {
        let html = Html::parse_document(SEARCH_PAGE);
        let links = document_links(&html, "https://digitalarchive.wilsoncenter.org");
        assert_eq!(
            links,
            vec![
                "https://digitalarchive.wilsoncenter.org/document/112504/telegram-moscow",
                "https://digitalarchive.wilsoncenter.org/document/110001/memo",
            ]
        );
    }

    #[test]
    fn test_document_links_empty_page() {
        let html = Html::parse_document("<html><body><p>No results.</p></body></html>");
        assert!(document_links(&html, "https://digitalarchive.wilsoncenter.org").is_empty());
    }

    #[test]
    fn test_scalar_fields() {
        let html = Html::parse_document(DOCUMENT_PAGE);
        let rec = document_record(&html, "https://example.org/document/112504");

        assert_eq!(rec.title.as_deref(), Some("Telegram from Moscow"));
        assert_eq!(rec.original_publication_date.as_deref(), Some("June 17, 1962"));
        assert_eq!(
            rec.credits.as_deref(),
            Some("Donated by the Blavatnik Family Foundation")
        );
        assert_eq!(rec.text_body.as_deref(), Some("Full telegram text here."));
        assert_eq!(rec.summary.as_deref(), Some("A short summary."));
        assert_eq!(rec.source.as_deref(), Some("AVP RF, f. 059a, op. 7"));
        assert_eq!(rec.record_id.as_deref(), Some("112504"));
        // Present block with empty text stays absent
        assert!(rec.rights.is_none());
        // Selector never present
        assert!(rec.original_classification.is_none());
    }

    #[test]
    fn test_pill_list_heading_then_sibling() {
        let html = Html::parse_document(DOCUMENT_PAGE);
        let rec = document_record(&html, "https://example.org/document/112504");
        assert_eq!(
            rec.authors,
            vec!["Gromyko, Andrei".to_string(), "Dobrynin, Anatoly".to_string()]
        );
    }

    #[test]
    fn test_pill_list_block_fallbacks() {
        let html = Html::parse_document(DOCUMENT_PAGE);
        let rec = document_record(&html, "https://example.org/document/112504");
        // h3.title inside a pill-block, spans present
        assert_eq!(rec.subjects_discussed, vec!["Cold War".to_string()]);
        // h4.title with bare .name (no inner span), scalar in the model
        assert_eq!(rec.original_archive_title.as_deref(), Some("AVP RF"));
        // Absent lists stay empty
        assert!(rec.donors.is_empty());
        assert!(rec.language.is_empty());
    }
}
