use chrono::{DateTime, Utc};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const UNKNOWN_SEGMENT: &str = "Unknown";

/// Position of a PDF inside the notes tree. The first two directory
/// segments under the root become `course` and `unit`; deeper levels are
/// ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathContext {
    pub course: String,
    pub unit: String,
    pub file_name: String,
}

impl PathContext {
    pub fn unknown(file_name: impl Into<String>) -> Self {
        Self {
            course: UNKNOWN_SEGMENT.to_string(),
            unit: UNKNOWN_SEGMENT.to_string(),
            file_name: file_name.into(),
        }
    }
}

/// A PDF discovered under the notes root. Immutable once built; the
/// `file_hash` is a SHA-256 over the raw bytes so unchanged files hash
/// identically across runs and machines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PdfDocument {
    pub path: PathBuf,
    pub relative_path: PathBuf,
    pub size_bytes: u64,
    pub page_count: u32,
    pub file_hash: String,
    pub context: PathContext,
}

/// One rasterized page, held only long enough for OCR to consume it.
/// `bitmap` is `None` when rendering that page failed; OCR must turn that
/// into an errored result rather than skipping the page silently.
#[derive(Debug, Clone)]
pub struct PageImage {
    pub page_number: u32,
    pub bitmap: Option<RgbImage>,
    pub dpi: u32,
}

/// Text extracted from one page. If `error` is set, `text` is empty and the
/// result must never reach the index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrResult {
    pub pdf_path: String,
    pub page_number: u32,
    pub text: String,
    pub confidence: f32,
    pub method: String,
    pub error: Option<String>,
    pub image_size: String,
    pub context: PathContext,
    pub file_hash: String,
}

impl OcrResult {
    /// True when the result carries usable text for indexing.
    pub fn is_indexable(&self) -> bool {
        self.error.is_none() && !self.text.trim().is_empty()
    }
}

/// The unit stored and queried. Logical identity is
/// `(pdf_path, page_number)`; the vector travels alongside as a
/// [`PagePoint`](crate::store::PagePoint), not inside the record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageRecord {
    pub text: String,
    pub pdf_path: String,
    pub page_number: u32,
    pub confidence: f32,
    pub course: String,
    pub unit: String,
    pub document_title: String,
    pub ocr_method: String,
    pub indexed_at: DateTime<Utc>,
    pub file_hash: String,
    pub image_size: String,
}

/// Record metadata without the page text, as returned by `list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageSummary {
    pub pdf_path: String,
    pub page_number: u32,
    pub confidence: f32,
    pub course: String,
    pub unit: String,
    pub document_title: String,
    pub ocr_method: String,
    pub indexed_at: DateTime<Utc>,
    pub file_hash: String,
}

impl From<&PageRecord> for PageSummary {
    fn from(record: &PageRecord) -> Self {
        Self {
            pdf_path: record.pdf_path.clone(),
            page_number: record.page_number,
            confidence: record.confidence,
            course: record.course.clone(),
            unit: record.unit.clone(),
            document_title: record.document_title.clone(),
            ocr_method: record.ocr_method.clone(),
            indexed_at: record.indexed_at,
            file_hash: record.file_hash.clone(),
        }
    }
}

/// One ranked search result. `score` is the cosine similarity reported by
/// the store, descending over the result sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub score: f64,
    pub record: PageRecord,
}

/// Totals over the most recent discovery pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanStats {
    pub total_pdfs: usize,
    pub total_pages: u64,
    pub total_size_mb: f64,
    pub average_pages_per_pdf: f64,
}

/// Aggregate view over the collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStats {
    pub total_documents: u64,
    pub unique_pdfs: usize,
    pub unique_courses: usize,
    pub average_confidence: f64,
    pub last_indexed: String,
}

/// A PDF the ingest run gave up on, with the reason it was skipped.
#[derive(Debug, Clone)]
pub struct SkippedPdf {
    pub path: PathBuf,
    pub reason: String,
}

/// Outcome of one orchestrator run. Per-page and per-PDF failures are
/// counted here instead of aborting the run.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub pdfs_processed: usize,
    pub pages_processed: usize,
    pub pages_indexed: usize,
    pub skipped_pdfs: Vec<SkippedPdf>,
}
