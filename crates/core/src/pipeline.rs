use crate::embeddings::Embedder;
use crate::error::IngestError;
use crate::index::NotesIndex;
use crate::models::{IngestReport, OcrResult, PdfDocument, SkippedPdf};
use crate::ocr::OcrProcessor;
use crate::scanner::PdfScanner;
use crate::store::VectorStore;
use std::path::Path;
use tracing::{info, warn};

/// Runs the full chain for a notes tree: discover, rasterize, OCR, index.
/// One failing PDF never aborts a run; it is recorded in the report and the
/// run moves on. Rasterization and OCR are blocking work, so they run under
/// `block_in_place` on the multi-threaded runtime.
pub struct IngestPipeline<S, E> {
    scanner: PdfScanner,
    ocr: OcrProcessor,
    index: NotesIndex<S, E>,
    batch_size: usize,
}

impl<S: VectorStore, E: Embedder> IngestPipeline<S, E> {
    pub fn new(scanner: PdfScanner, ocr: OcrProcessor, index: NotesIndex<S, E>) -> Self {
        Self {
            scanner,
            ocr,
            index,
            batch_size: crate::index::DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn index(&self) -> &NotesIndex<S, E> {
        &self.index
    }

    /// Ingests every PDF under the notes root. Fails only when the root
    /// itself is missing; per-PDF trouble lands in `skipped_pdfs`.
    pub async fn ingest_all(&self) -> Result<IngestReport, IngestError> {
        let documents = self.scanner.discover_pdfs()?;
        info!(pdfs = documents.len(), root = %self.scanner.root().display(), "ingest run starting");

        let mut report = IngestReport::default();
        for document in &documents {
            if let Err(ingest_error) = self.ingest_document(document, &mut report).await {
                warn!(pdf = %document.path.display(), %ingest_error, "skipping pdf");
                report.skipped_pdfs.push(SkippedPdf {
                    path: document.path.clone(),
                    reason: ingest_error.to_string(),
                });
            }
        }

        info!(
            pdfs = report.pdfs_processed,
            pages = report.pages_processed,
            indexed = report.pages_indexed,
            skipped = report.skipped_pdfs.len(),
            "ingest run done"
        );
        Ok(report)
    }

    /// Ingests one PDF by path. `NotFound` when the file is absent;
    /// downstream failures are reported as a skipped entry, matching the
    /// whole-tree run.
    pub async fn ingest_pdf(&self, path: &Path) -> Result<IngestReport, IngestError> {
        let document = self.scanner.describe_pdf(path)?;
        let mut report = IngestReport::default();
        if let Err(ingest_error) = self.ingest_document(&document, &mut report).await {
            report.skipped_pdfs.push(SkippedPdf {
                path: document.path.clone(),
                reason: ingest_error.to_string(),
            });
        }
        Ok(report)
    }

    async fn ingest_document(
        &self,
        document: &PdfDocument,
        report: &mut IngestReport,
    ) -> Result<(), IngestError> {
        let results = tokio::task::block_in_place(|| -> Result<Vec<OcrResult>, IngestError> {
            let mut results = Vec::new();
            self.scanner.extract_pages_as_images(document, &mut |page| {
                results.push(self.ocr.process_image(document, &page));
            })?;
            Ok(results)
        })?;

        let indexed = self.index.index_ocr_results(&results, self.batch_size).await?;

        report.pdfs_processed += 1;
        report.pages_processed += results.len();
        report.pages_indexed += indexed;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::IngestPipeline;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::index::NotesIndex;
    use crate::ocr::OcrProcessor;
    use crate::query::QueryEngine;
    use crate::scanner::PdfScanner;
    use crate::store::VectorStore;
    use crate::stores::MemoryStore;
    use crate::test_support::{write_sample_pdf, FakeRasterizer};
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    fn pipeline(
        root: &Path,
        store: MemoryStore,
        rasterizer: FakeRasterizer,
    ) -> IngestPipeline<MemoryStore, CharacterNgramEmbedder> {
        let scanner = PdfScanner::new(root).with_rasterizer(Box::new(rasterizer));
        let index = NotesIndex::new(store, CharacterNgramEmbedder::default());
        IngestPipeline::new(scanner, OcrProcessor::mock(), index)
    }

    fn seed_tree(root: &Path) -> Result<(), Box<dyn std::error::Error>> {
        fs::create_dir_all(root.join("Calc/Unit2"))?;
        fs::create_dir_all(root.join("Linear/Unit1"))?;
        write_sample_pdf(&root.join("Calc/Unit2/limits.pdf"), 3)?;
        write_sample_pdf(&root.join("Linear/Unit1/week1.pdf"), 3)?;
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn full_run_indexes_every_page() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        seed_tree(dir.path())?;
        let store = MemoryStore::new();
        let pipeline = pipeline(dir.path(), store.clone(), FakeRasterizer::new(3));

        let report = pipeline.ingest_all().await?;
        assert_eq!(report.pdfs_processed, 2);
        assert_eq!(report.pages_processed, 6);
        assert_eq!(report.pages_indexed, 6);
        assert!(report.skipped_pdfs.is_empty());

        let stats = pipeline.index().stats().await?;
        assert_eq!(stats.total_documents, 6);
        assert_eq!(stats.unique_pdfs, 2);
        assert_eq!(stats.unique_courses, 2);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn reingesting_the_tree_is_idempotent() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        seed_tree(dir.path())?;
        let store = MemoryStore::new();
        let pipeline = pipeline(dir.path(), store.clone(), FakeRasterizer::new(3));

        pipeline.ingest_all().await?;
        let first = store.count().await?;
        pipeline.ingest_all().await?;
        assert_eq!(store.count().await?, first);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn course_filter_separates_the_courses() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        seed_tree(dir.path())?;
        let store = MemoryStore::new();
        let pipeline = pipeline(dir.path(), store.clone(), FakeRasterizer::new(3));
        pipeline.ingest_all().await?;

        let engine = QueryEngine::new(store, CharacterNgramEmbedder::default());
        let calc = engine.search("handwritten notes", 10, Some("Calc")).await;
        assert_eq!(calc.len(), 3);
        assert!(calc.iter().all(|hit| hit.record.course == "Calc"));

        let linear = engine.search("handwritten notes", 10, Some("Linear")).await;
        assert_eq!(linear.len(), 3);
        assert!(linear.iter().all(|hit| hit.record.course == "Linear"));
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn deleting_one_pdf_leaves_the_other() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        seed_tree(dir.path())?;
        let store = MemoryStore::new();
        let pipeline = pipeline(dir.path(), store.clone(), FakeRasterizer::new(3));
        pipeline.ingest_all().await?;

        let target = dir.path().join("Calc/Unit2/limits.pdf");
        let removed = pipeline
            .index()
            .delete_by_source(&target.to_string_lossy())
            .await;
        assert_eq!(removed, 3);
        assert_eq!(store.count().await?, 3);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn page_render_failure_does_not_sink_its_siblings()
    -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        write_sample_pdf(&dir.path().join("notes.pdf"), 3)?;
        let store = MemoryStore::new();
        let pipeline = pipeline(
            dir.path(),
            store.clone(),
            FakeRasterizer::failing(3, vec![2]),
        );

        let report = pipeline.ingest_all().await?;
        assert_eq!(report.pages_processed, 3);
        assert_eq!(report.pages_indexed, 2);
        assert!(report.skipped_pdfs.is_empty());
        assert_eq!(store.count().await?, 2);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn single_pdf_ingest_by_path() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        seed_tree(dir.path())?;
        let store = MemoryStore::new();
        let pipeline = pipeline(dir.path(), store.clone(), FakeRasterizer::new(3));

        let report = pipeline
            .ingest_pdf(&dir.path().join("Calc/Unit2/limits.pdf"))
            .await?;
        assert_eq!(report.pdfs_processed, 1);
        assert_eq!(report.pages_indexed, 3);
        assert_eq!(store.count().await?, 3);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn missing_pdf_path_is_an_error() {
        let dir = tempdir().unwrap();
        let pipeline = pipeline(dir.path(), MemoryStore::new(), FakeRasterizer::new(1));
        assert!(pipeline
            .ingest_pdf(Path::new("/definitely/not/here.pdf"))
            .await
            .is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn broken_store_skips_pdfs_instead_of_aborting()
    -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        seed_tree(dir.path())?;
        let pipeline = pipeline(dir.path(), MemoryStore::offline(), FakeRasterizer::new(3));

        let report = pipeline.ingest_all().await?;
        assert_eq!(report.pages_indexed, 0);
        assert_eq!(report.skipped_pdfs.len(), 2);
        Ok(())
    }
}
