//! Retrieval pipeline for scanned handwritten course notes: walk a notes
//! tree, rasterize PDF pages, OCR them with a fallback chain of backends,
//! embed the text deterministically, and index one record per page in a
//! vector store for semantic search.
//!
//! The crate is organized along the pipeline stages:
//!
//! - [`scanner`]: PDF discovery, hashing, and path-derived context
//! - [`rasterizer`]: page bitmaps via pdfium
//! - [`ocr`]: backend selection and per-page text extraction
//! - [`embeddings`]: text to fixed-dimension unit vectors
//! - [`index`]: writing and maintaining the page collection
//! - [`query`]: semantic search over indexed pages
//! - [`pipeline`]: the end-to-end ingest orchestrator
//!
//! Store access goes through the [`store::VectorStore`] trait; shipped
//! implementations are a Qdrant REST client and an in-process store.

pub mod embeddings;
pub mod error;
pub mod index;
pub mod models;
pub mod ocr;
pub mod pipeline;
pub mod query;
pub mod rasterizer;
pub mod scanner;
pub mod store;
pub mod stores;

#[cfg(test)]
pub(crate) mod test_support;

pub use embeddings::{CharacterNgramEmbedder, Embedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{IngestError, SearchError};
pub use index::{NotesIndex, DEFAULT_BATCH_SIZE};
pub use models::{
    IndexStats, IngestReport, OcrResult, PageImage, PageRecord, PageSummary, PathContext,
    PdfDocument, ScanStats, SearchHit, SkippedPdf,
};
pub use ocr::{OcrConfig, OcrProcessor};
pub use pipeline::IngestPipeline;
pub use query::{QueryEngine, DEFAULT_SEARCH_LIMIT};
pub use rasterizer::{PageRasterizer, PdfiumRasterizer};
pub use scanner::{PdfScanner, DEFAULT_RENDER_DPI};
pub use store::{page_point_id, PagePoint, VectorStore};
pub use stores::{MemoryStore, QdrantStore};
