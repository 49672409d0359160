//! SQLite-backed archive repository.
//!
//! Two tables: `documents` (one row per scraped document, keyed by URL) and
//! `completed_pages` (the resume ledger). All writes are INSERT OR REPLACE,
//! so every operation here is idempotent.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use super::{connect, Result};
use crate::models::{CompletedPage, DocumentRecord};

/// Simple document/page counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub document_count: u64,
    pub page_count: u64,
}

/// SQLite-backed repository for scraped documents and page completion state.
///
/// Holds its connection open for the lifetime of the run; dropping the
/// repository closes it on every exit path.
pub struct ArchiveRepository {
    db_path: PathBuf,
    conn: Connection,
}

impl ArchiveRepository {
    /// Open (or create) the archive database and initialize the schema.
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = connect(db_path)?;
        let repo = Self {
            db_path: db_path.to_path_buf(),
            conn,
        };
        repo.init_schema()?;
        Ok(repo)
    }

    /// Get the database path.
    pub fn database_path(&self) -> &Path {
        &self.db_path
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                document_url TEXT PRIMARY KEY,
                page_number INTEGER,
                page_position INTEGER,
                original_publication_date TEXT,
                title TEXT,
                credits TEXT,
                text_body TEXT,
                summary TEXT,
                authors TEXT,
                associated_places TEXT,
                subjects_discussed TEXT,
                associated_people_orgs TEXT,
                document_contributors TEXT,
                source TEXT,
                original_upload_date TEXT,
                original_archive_title TEXT,
                language TEXT,
                rights TEXT,
                record_id TEXT,
                original_classification TEXT,
                donors TEXT,
                scraped_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_documents_page_number
                ON documents(page_number);
            CREATE INDEX IF NOT EXISTS idx_documents_page_position
                ON documents(page_number, page_position);

            CREATE TABLE IF NOT EXISTS completed_pages (
                page_number INTEGER PRIMARY KEY,
                completed_at TEXT NOT NULL
            );
        "#,
        )?;
        Ok(())
    }

    /// Insert or replace a document by URL.
    ///
    /// Last write wins: the whole row is replaced, there is no field-level
    /// merge. Calling twice with the same URL leaves exactly one row holding
    /// the second call's values.
    pub fn upsert_document(&self, doc: &DocumentRecord) -> Result<()> {
        self.conn.execute(
            r#"INSERT OR REPLACE INTO documents (
                document_url, page_number, page_position,
                original_publication_date, title, credits, text_body, summary,
                authors, associated_places, subjects_discussed,
                associated_people_orgs, document_contributors, source,
                original_upload_date, original_archive_title, language, rights,
                record_id, original_classification, donors, scraped_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            params![
                doc.document_url,
                doc.page_number,
                doc.page_position,
                doc.original_publication_date,
                doc.title,
                doc.credits,
                doc.text_body,
                doc.summary,
                DocumentRecord::json_list(&doc.authors),
                DocumentRecord::json_list(&doc.associated_places),
                DocumentRecord::json_list(&doc.subjects_discussed),
                DocumentRecord::json_list(&doc.associated_people_orgs),
                DocumentRecord::json_list(&doc.document_contributors),
                doc.source,
                doc.original_upload_date,
                doc.original_archive_title,
                DocumentRecord::json_list(&doc.language),
                doc.rights,
                doc.record_id,
                doc.original_classification,
                DocumentRecord::json_list(&doc.donors),
                doc.scraped_at.to_rfc3339(),
            ],
        )?;
        debug!(
            "Saved document: {}",
            doc.title.as_deref().unwrap_or(&doc.document_url)
        );
        Ok(())
    }

    /// Get a document by its detail-page URL.
    pub fn get_document(&self, url: &str) -> Result<Option<DocumentRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM documents WHERE document_url = ?")?;
        let doc = stmt.query_row(params![url], row_to_document).optional()?;
        Ok(doc)
    }

    /// Check whether a search-results page has already been fully processed.
    pub fn is_page_completed(&self, page_number: u32) -> Result<bool> {
        let exists: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM completed_pages WHERE page_number = ?",
                params![page_number],
                |row| row.get(0),
            )
            .optional()?;
        Ok(exists.is_some())
    }

    /// Mark a page as fully processed, stamped now. Idempotent.
    pub fn mark_page_completed(&self, page_number: u32) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO completed_pages (page_number, completed_at) VALUES (?, ?)",
            params![page_number, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Fetch the completion record for a page, if any.
    pub fn completed_page(&self, page_number: u32) -> Result<Option<CompletedPage>> {
        let mut stmt = self
            .conn
            .prepare("SELECT page_number, completed_at FROM completed_pages WHERE page_number = ?")?;
        let row = stmt
            .query_row(params![page_number], |row| {
                Ok(CompletedPage {
                    page_number: row.get(0)?,
                    completed_at: parse_datetime(&row.get::<_, String>(1)?),
                })
            })
            .optional()?;
        Ok(row)
    }

    /// Document and completed-page counts.
    pub fn stats(&self) -> Result<StoreStats> {
        let document_count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
        let page_count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM completed_pages", [], |row| row.get(0))?;
        Ok(StoreStats {
            document_count: document_count as u64,
            page_count: page_count as u64,
        })
    }

    /// Export all documents to a CSV file, ordered by page and position.
    ///
    /// The header matches the database columns plus a derived
    /// `page_number_one_indexed` column directly after `page_number`.
    /// Multi-valued fields stay as their JSON-array text in a single cell.
    /// Returns the number of rows written; an empty store writes nothing.
    pub fn export_to_csv(&self, output: &Path) -> Result<u64> {
        let mut stmt = self.conn.prepare(
            r#"SELECT document_url, page_number, page_position,
                      original_publication_date, title, credits, text_body,
                      summary, authors, associated_places, subjects_discussed,
                      associated_people_orgs, document_contributors, source,
                      original_upload_date, original_archive_title, language,
                      rights, record_id, original_classification, donors,
                      scraped_at
               FROM documents
               ORDER BY page_number ASC, page_position ASC, document_url ASC"#,
        )?;

        let rows: Vec<Vec<Option<String>>> = stmt
            .query_map([], |row| {
                let mut cells = Vec::with_capacity(DocumentRecord::COLUMNS.len() + 1);
                for idx in 0..DocumentRecord::COLUMNS.len() {
                    let cell = match DocumentRecord::COLUMNS[idx] {
                        "page_number" | "page_position" => {
                            row.get::<_, Option<i64>>(idx)?.map(|n| n.to_string())
                        }
                        _ => row.get::<_, Option<String>>(idx)?,
                    };
                    cells.push(cell);
                    // Derived column rides directly behind page_number
                    if DocumentRecord::COLUMNS[idx] == "page_number" {
                        let one_indexed = row
                            .get::<_, Option<i64>>(idx)?
                            .map(|n| (n + 1).to_string());
                        cells.push(one_indexed);
                    }
                }
                Ok(cells)
            })?
            .collect::<std::result::Result<_, _>>()?;

        if rows.is_empty() {
            info!("No documents in database, nothing to export");
            return Ok(0);
        }

        let mut header: Vec<&str> = Vec::with_capacity(DocumentRecord::COLUMNS.len() + 1);
        for col in DocumentRecord::COLUMNS {
            header.push(col);
            if *col == "page_number" {
                header.push("page_number_one_indexed");
            }
        }

        let mut writer = BufWriter::new(File::create(output)?);
        writeln!(writer, "{}", header.join(","))?;
        for cells in &rows {
            let line = cells
                .iter()
                .map(|cell| escape_csv(cell.as_deref().unwrap_or("")))
                .collect::<Vec<_>>()
                .join(",");
            writeln!(writer, "{}", line)?;
        }
        writer.flush()?;

        info!("Exported {} documents to {}", rows.len(), output.display());
        Ok(rows.len() as u64)
    }
}

/// Map a `SELECT * FROM documents` row back into a record.
fn row_to_document(row: &Row<'_>) -> rusqlite::Result<DocumentRecord> {
    Ok(DocumentRecord {
        document_url: row.get("document_url")?,
        page_number: row.get("page_number")?,
        page_position: row.get("page_position")?,
        original_publication_date: row.get("original_publication_date")?,
        title: row.get("title")?,
        credits: row.get("credits")?,
        text_body: row.get("text_body")?,
        summary: row.get("summary")?,
        authors: DocumentRecord::parse_json_list(row.get("authors")?),
        associated_places: DocumentRecord::parse_json_list(row.get("associated_places")?),
        subjects_discussed: DocumentRecord::parse_json_list(row.get("subjects_discussed")?),
        associated_people_orgs: DocumentRecord::parse_json_list(row.get("associated_people_orgs")?),
        document_contributors: DocumentRecord::parse_json_list(row.get("document_contributors")?),
        source: row.get("source")?,
        original_upload_date: row.get("original_upload_date")?,
        original_archive_title: row.get("original_archive_title")?,
        language: DocumentRecord::parse_json_list(row.get("language")?),
        rights: row.get("rights")?,
        record_id: row.get("record_id")?,
        original_classification: row.get("original_classification")?,
        donors: DocumentRecord::parse_json_list(row.get("donors")?),
        scraped_at: parse_datetime(&row.get::<_, String>("scraped_at")?),
    })
}

/// Parse a datetime string from the database, defaulting to Unix epoch on error.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Quote a CSV cell when it contains separators, quotes or newlines.
fn escape_csv(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_repo() -> (TempDir, ArchiveRepository) {
        let dir = TempDir::new().unwrap();
        let repo = ArchiveRepository::open(&dir.path().join("archive.db")).unwrap();
        (dir, repo)
    }

    fn sample_doc(url: &str) -> DocumentRecord {
        DocumentRecord {
            title: Some("Telegram from Moscow".to_string()),
            page_number: Some(4),
            page_position: Some(1),
            authors: vec!["Gromyko, Andrei".to_string()],
            subjects_discussed: vec![
                "Cold War".to_string(),
                "Diplomacy, dollars, and detente".to_string(),
            ],
            ..DocumentRecord::new(url)
        }
    }

    #[test]
    fn test_upsert_is_last_write_wins() {
        let (_dir, repo) = test_repo();
        let url = "https://example.org/document/1";

        repo.upsert_document(&sample_doc(url)).unwrap();

        let mut second = DocumentRecord::new(url);
        second.title = Some("Revised title".to_string());
        second.authors = vec!["Khrushchev, Nikita".to_string()];
        repo.upsert_document(&second).unwrap();

        assert_eq!(repo.stats().unwrap().document_count, 1);
        let stored = repo.get_document(url).unwrap().unwrap();
        assert_eq!(stored.title.as_deref(), Some("Revised title"));
        assert_eq!(stored.authors, vec!["Khrushchev, Nikita".to_string()]);
        // Whole-row replace: fields absent in the second write are gone
        assert!(stored.subjects_discussed.is_empty());
    }

    #[test]
    fn test_document_round_trip() {
        let (_dir, repo) = test_repo();
        let doc = sample_doc("https://example.org/document/2");
        repo.upsert_document(&doc).unwrap();

        let stored = repo.get_document(&doc.document_url).unwrap().unwrap();
        assert_eq!(stored.page_number, Some(4));
        assert_eq!(stored.page_position, Some(1));
        assert_eq!(stored.subjects_discussed, doc.subjects_discussed);
        assert!(stored.text_body.is_none());
    }

    #[test]
    fn test_page_completion_lifecycle() {
        let (_dir, repo) = test_repo();
        assert!(!repo.is_page_completed(7).unwrap());

        repo.mark_page_completed(7).unwrap();
        assert!(repo.is_page_completed(7).unwrap());
        assert!(!repo.is_page_completed(8).unwrap());

        // Idempotent re-mark
        repo.mark_page_completed(7).unwrap();
        assert_eq!(repo.stats().unwrap().page_count, 1);

        let completed = repo.completed_page(7).unwrap().unwrap();
        assert_eq!(completed.page_number, 7);
    }

    #[test]
    fn test_stats_match_counts() {
        let (_dir, repo) = test_repo();
        for i in 0..3 {
            repo.upsert_document(&sample_doc(&format!("https://example.org/document/{}", i)))
                .unwrap();
        }
        repo.mark_page_completed(0).unwrap();
        repo.mark_page_completed(1).unwrap();

        let stats = repo.stats().unwrap();
        assert_eq!(stats.document_count, 3);
        assert_eq!(stats.page_count, 2);
    }

    #[test]
    fn test_export_empty_store_writes_nothing() {
        let (dir, repo) = test_repo();
        let out = dir.path().join("export.csv");
        assert_eq!(repo.export_to_csv(&out).unwrap(), 0);
        assert!(!out.exists());
    }

    #[test]
    fn test_export_row_count_and_json_cells() {
        let (dir, repo) = test_repo();
        let doc = sample_doc("https://example.org/document/9");
        repo.upsert_document(&doc).unwrap();

        let out = dir.path().join("export.csv");
        assert_eq!(repo.export_to_csv(&out).unwrap(), 1);

        let content = std::fs::read_to_string(&out).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let header: Vec<&str> = lines[0].split(',').collect();
        assert_eq!(header[0], "document_url");
        assert_eq!(header[1], "page_number");
        assert_eq!(header[2], "page_number_one_indexed");
        assert_eq!(header[3], "page_position");

        let cells = parse_csv_line(lines[1]);
        assert_eq!(cells.len(), header.len());
        assert_eq!(cells[1], "4");
        assert_eq!(cells[2], "5");
        // JSON cell parses back to the original ordered sequence
        let subjects_idx = header.iter().position(|h| *h == "subjects_discussed").unwrap();
        let parsed: Vec<String> = serde_json::from_str(&cells[subjects_idx]).unwrap();
        assert_eq!(parsed, doc.subjects_discussed);
    }

    #[test]
    fn test_escape_csv() {
        assert_eq!(escape_csv("plain"), "plain");
        assert_eq!(escape_csv("a,b"), "\"a,b\"");
        assert_eq!(escape_csv("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    /// Minimal RFC 4180 cell splitter for assertions.
    fn parse_csv_line(line: &str) -> Vec<String> {
        let mut cells = Vec::new();
        let mut cell = String::new();
        let mut in_quotes = false;
        let mut chars = line.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '"' if in_quotes && chars.peek() == Some(&'"') => {
                    cell.push('"');
                    chars.next();
                }
                '"' => in_quotes = !in_quotes,
                ',' if !in_quotes => cells.push(std::mem::take(&mut cell)),
                _ => cell.push(c),
            }
        }
        cells.push(cell);
        cells
    }
}
