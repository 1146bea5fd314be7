use crate::embeddings::Embedder;
use crate::error::SearchError;
use crate::models::{IndexStats, OcrResult, PageRecord, PageSummary};
use crate::store::{PagePoint, VectorStore};
use chrono::Utc;
use std::collections::HashSet;
use tracing::{debug, error, info, warn};

pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Upper bound on records pulled back for listing and stats aggregation.
const LIST_LIMIT: usize = 10_000;

const DUMP_PREVIEW_CHARS: usize = 200;

/// Writes OCR results into the vector store as one record per page and
/// answers the maintenance operations over the collection. Vectors come from
/// the embedder here; the store never vectorizes on its own.
pub struct NotesIndex<S, E> {
    store: S,
    embedder: E,
}

impl<S: VectorStore, E: Embedder> NotesIndex<S, E> {
    pub fn new(store: S, embedder: E) -> Self {
        Self { store, embedder }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Creates the collection, optionally dropping an existing one first.
    /// Schema failures are fatal; nothing downstream works without it.
    pub async fn create_schema(&self, delete_existing: bool) -> Result<(), SearchError> {
        if delete_existing {
            self.store.drop_collection().await?;
            info!("dropped existing collection");
        }
        self.store
            .create_collection(self.embedder.dimensions())
            .await?;
        info!(dimensions = self.embedder.dimensions(), "collection ready");
        Ok(())
    }

    /// Embeds and upserts indexable results in batches. Errored or blank
    /// pages are skipped with a log line; a failed batch is logged and the
    /// run continues with the next one. Returns how many records landed.
    ///
    /// Point ids derive from `(pdf_path, page_number)`, so feeding the same
    /// pages twice overwrites in place instead of duplicating.
    pub async fn index_ocr_results(
        &self,
        results: &[OcrResult],
        batch_size: usize,
    ) -> Result<usize, SearchError> {
        if !self.store.collection_exists().await? {
            self.create_schema(false).await?;
        }

        let mut points = Vec::new();
        for result in results {
            if !result.is_indexable() {
                debug!(
                    pdf = %result.pdf_path,
                    page = result.page_number,
                    error = result.error.as_deref().unwrap_or("empty text"),
                    "skipping unindexable page"
                );
                continue;
            }
            let Some(vector) = self.embedder.embed(&result.text) else {
                warn!(
                    pdf = %result.pdf_path,
                    page = result.page_number,
                    "embedding failed, skipping page"
                );
                continue;
            };
            points.push(PagePoint::new(record_from(result), vector));
        }

        let batch_size = batch_size.max(1);
        let mut indexed = 0;
        for chunk in points.chunks(batch_size) {
            match self.store.upsert_pages(chunk).await {
                Ok(()) => indexed += chunk.len(),
                Err(upsert_error) => {
                    error!(batch = chunk.len(), %upsert_error, "batch upsert failed");
                }
            }
        }

        info!(
            indexed,
            skipped = results.len() - points.len(),
            "indexing pass done"
        );
        Ok(indexed)
    }

    /// Removes every record ingested from the given PDF path and returns
    /// the number removed. Store errors are logged and reported as zero.
    pub async fn delete_by_source(&self, pdf_path: &str) -> u64 {
        match self.store.delete_by_pdf_path(pdf_path).await {
            Ok(removed) => {
                info!(pdf = pdf_path, removed, "deleted records for pdf");
                removed
            }
            Err(delete_error) => {
                error!(pdf = pdf_path, %delete_error, "delete by pdf path failed");
                0
            }
        }
    }

    /// Lists indexed pages without their text. Empty on store errors.
    pub async fn list_documents(&self) -> Vec<PageSummary> {
        match self.store.scroll(LIST_LIMIT).await {
            Ok(records) => records.iter().map(PageSummary::from).collect(),
            Err(scroll_error) => {
                error!(%scroll_error, "listing indexed pages failed");
                Vec::new()
            }
        }
    }

    /// Aggregates over the collection: totals, distinct PDFs and courses,
    /// mean confidence, most recent indexing time.
    pub async fn stats(&self) -> Result<IndexStats, SearchError> {
        let total_documents = self.store.count().await?;
        let records = self.store.scroll(LIST_LIMIT).await?;

        let unique_pdfs: HashSet<&str> =
            records.iter().map(|record| record.pdf_path.as_str()).collect();
        let unique_courses: HashSet<&str> =
            records.iter().map(|record| record.course.as_str()).collect();

        let average_confidence = if records.is_empty() {
            0.0
        } else {
            let sum: f64 = records.iter().map(|record| f64::from(record.confidence)).sum();
            round_to(sum / records.len() as f64, 3)
        };

        let last_indexed = records
            .iter()
            .map(|record| record.indexed_at)
            .max()
            .map(|at| at.to_rfc3339())
            .unwrap_or_else(|| "Never".to_string());

        Ok(IndexStats {
            total_documents,
            unique_pdfs: unique_pdfs.len(),
            unique_courses: unique_courses.len(),
            average_confidence,
            last_indexed,
        })
    }

    /// Raw record sample with text clipped to a short preview, for eyeball
    /// inspection of what actually landed in the store.
    pub async fn dump(&self, limit: usize) -> Vec<PageRecord> {
        let mut records = match self.store.scroll(limit).await {
            Ok(records) => records,
            Err(scroll_error) => {
                error!(%scroll_error, "dump scroll failed");
                return Vec::new();
            }
        };
        for record in &mut records {
            if record.text.chars().count() > DUMP_PREVIEW_CHARS {
                record.text = record.text.chars().take(DUMP_PREVIEW_CHARS).collect();
            }
        }
        records
    }
}

fn record_from(result: &OcrResult) -> PageRecord {
    PageRecord {
        text: result.text.clone(),
        pdf_path: result.pdf_path.clone(),
        page_number: result.page_number,
        confidence: result.confidence,
        course: result.context.course.clone(),
        unit: result.context.unit.clone(),
        document_title: result.context.file_name.clone(),
        ocr_method: result.method.clone(),
        indexed_at: Utc::now(),
        file_hash: result.file_hash.clone(),
        image_size: result.image_size.clone(),
    }
}

fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::{NotesIndex, DEFAULT_BATCH_SIZE};
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::models::{OcrResult, PathContext};
    use crate::store::VectorStore;
    use crate::stores::MemoryStore;

    fn ocr_result(pdf_path: &str, page_number: u32, course: &str, text: &str) -> OcrResult {
        OcrResult {
            pdf_path: pdf_path.to_string(),
            page_number,
            text: text.to_string(),
            confidence: 0.85,
            method: "mock_ocr".to_string(),
            error: None,
            image_size: "791x1024".to_string(),
            context: PathContext {
                course: course.to_string(),
                unit: "Unit1".to_string(),
                file_name: "notes.pdf".to_string(),
            },
            file_hash: "abc".to_string(),
        }
    }

    fn errored(pdf_path: &str, page_number: u32) -> OcrResult {
        OcrResult {
            text: String::new(),
            confidence: 0.0,
            error: Some("page failed to rasterize".to_string()),
            ..ocr_result(pdf_path, page_number, "Calc", "")
        }
    }

    fn index() -> NotesIndex<MemoryStore, CharacterNgramEmbedder> {
        NotesIndex::new(MemoryStore::new(), CharacterNgramEmbedder::default())
    }

    #[tokio::test]
    async fn unindexable_pages_are_skipped() {
        let index = index();
        let results = vec![
            ocr_result("/notes/a.pdf", 1, "Calc", "limits and continuity"),
            errored("/notes/a.pdf", 2),
            ocr_result("/notes/a.pdf", 3, "Calc", "   \n"),
        ];

        let indexed = index
            .index_ocr_results(&results, DEFAULT_BATCH_SIZE)
            .await
            .unwrap();
        assert_eq!(indexed, 1);
        assert_eq!(index.store().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn reindexing_the_same_pages_does_not_duplicate() {
        let index = index();
        let results = vec![
            ocr_result("/notes/a.pdf", 1, "Calc", "integration by parts"),
            ocr_result("/notes/a.pdf", 2, "Calc", "u substitution"),
        ];

        index
            .index_ocr_results(&results, DEFAULT_BATCH_SIZE)
            .await
            .unwrap();
        index
            .index_ocr_results(&results, DEFAULT_BATCH_SIZE)
            .await
            .unwrap();

        assert_eq!(index.store().count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn schema_is_bootstrapped_on_first_indexing() {
        let index = index();
        assert!(!index.store().collection_exists().await.unwrap());

        index
            .index_ocr_results(
                &[ocr_result("/notes/a.pdf", 1, "Calc", "chain rule")],
                DEFAULT_BATCH_SIZE,
            )
            .await
            .unwrap();
        assert!(index.store().collection_exists().await.unwrap());
    }

    #[tokio::test]
    async fn create_schema_with_delete_clears_records() {
        let index = index();
        index
            .index_ocr_results(
                &[ocr_result("/notes/a.pdf", 1, "Calc", "chain rule")],
                DEFAULT_BATCH_SIZE,
            )
            .await
            .unwrap();

        index.create_schema(true).await.unwrap();
        assert_eq!(index.store().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn delete_by_source_reports_removed_count() {
        let index = index();
        let results = vec![
            ocr_result("/notes/a.pdf", 1, "Calc", "first"),
            ocr_result("/notes/a.pdf", 2, "Calc", "second"),
            ocr_result("/notes/b.pdf", 1, "Linear", "third"),
        ];
        index
            .index_ocr_results(&results, DEFAULT_BATCH_SIZE)
            .await
            .unwrap();

        assert_eq!(index.delete_by_source("/notes/a.pdf").await, 2);
        assert_eq!(index.delete_by_source("/notes/a.pdf").await, 0);
        assert_eq!(index.store().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn stats_aggregate_pdfs_courses_and_confidence() {
        let index = index();
        let results = vec![
            ocr_result("/notes/a.pdf", 1, "Calc", "first"),
            ocr_result("/notes/a.pdf", 2, "Calc", "second"),
            ocr_result("/notes/b.pdf", 1, "Linear", "third"),
        ];
        index
            .index_ocr_results(&results, DEFAULT_BATCH_SIZE)
            .await
            .unwrap();

        let stats = index.stats().await.unwrap();
        assert_eq!(stats.total_documents, 3);
        assert_eq!(stats.unique_pdfs, 2);
        assert_eq!(stats.unique_courses, 2);
        assert!((stats.average_confidence - 0.85).abs() < 1e-9);
        assert_ne!(stats.last_indexed, "Never");
    }

    #[tokio::test]
    async fn stats_on_empty_collection_report_never() {
        let index = index();
        index.create_schema(false).await.unwrap();

        let stats = index.stats().await.unwrap();
        assert_eq!(stats.total_documents, 0);
        assert_eq!(stats.average_confidence, 0.0);
        assert_eq!(stats.last_indexed, "Never");
    }

    #[tokio::test]
    async fn listing_returns_summaries_without_text() {
        let index = index();
        index
            .index_ocr_results(
                &[ocr_result("/notes/a.pdf", 1, "Calc", "eigenvalues")],
                DEFAULT_BATCH_SIZE,
            )
            .await
            .unwrap();

        let listed = index.list_documents().await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].pdf_path, "/notes/a.pdf");
        assert_eq!(listed[0].course, "Calc");
    }

    #[tokio::test]
    async fn dump_clips_long_text() {
        let index = index();
        let long = "x".repeat(500);
        index
            .index_ocr_results(
                &[ocr_result("/notes/a.pdf", 1, "Calc", &long)],
                DEFAULT_BATCH_SIZE,
            )
            .await
            .unwrap();

        let dumped = index.dump(10).await;
        assert_eq!(dumped.len(), 1);
        assert_eq!(dumped[0].text.chars().count(), 200);
    }

    #[tokio::test]
    async fn listing_against_broken_store_is_empty() {
        let index = NotesIndex::new(MemoryStore::offline(), CharacterNgramEmbedder::default());
        assert!(index.list_documents().await.is_empty());
        assert_eq!(index.delete_by_source("/notes/a.pdf").await, 0);
    }
}
