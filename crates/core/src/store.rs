use crate::error::SearchError;
use crate::models::{PageRecord, SearchHit};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// One record plus its externally supplied vector, ready for upsert. The
/// `id` is derived from the record's logical key, so writing the same page
/// twice overwrites in place instead of duplicating.
#[derive(Debug, Clone)]
pub struct PagePoint {
    pub id: String,
    pub record: PageRecord,
    pub vector: Vec<f32>,
}

impl PagePoint {
    pub fn new(record: PageRecord, vector: Vec<f32>) -> Self {
        let id = page_point_id(&record.pdf_path, record.page_number);
        Self { id, record, vector }
    }
}

/// Deterministic point id for `(pdf_path, page_number)`: a UUID formed from
/// the first 16 bytes of SHA-256 over the key. Re-ingesting a page yields
/// the same id, which is what makes ingestion idempotent.
pub fn page_point_id(pdf_path: &str, page_number: u32) -> String {
    let digest = Sha256::digest(format!("{pdf_path}\n{page_number}").as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes).to_string()
}

/// Contract the pipeline requires of a vector database: a named collection
/// of objects with scalar payloads and externally supplied fixed-dimension
/// vectors, plus near-vector search, equality predicates, counting, and
/// predicate deletes. Anything meeting this is acceptable; the shipped
/// impls are a Qdrant REST client and an in-process store.
#[async_trait]
pub trait VectorStore {
    /// Liveness probe; `Err(NotReady)` when the store is unreachable.
    async fn ready(&self) -> Result<(), SearchError>;

    async fn collection_exists(&self) -> Result<bool, SearchError>;

    /// Creates the collection with the given vector size and cosine
    /// distance. No-op when the collection is already present.
    async fn create_collection(&self, dimensions: usize) -> Result<(), SearchError>;

    async fn drop_collection(&self) -> Result<(), SearchError>;

    /// Upserts points keyed by their deterministic ids.
    async fn upsert_pages(&self, points: &[PagePoint]) -> Result<(), SearchError>;

    /// Near-vector search in descending similarity order. The course
    /// filter, when present, is an exact-match predicate ANDed with the
    /// vector search inside the store, never applied post-hoc on top-k.
    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        course_filter: Option<&str>,
    ) -> Result<Vec<SearchHit>, SearchError>;

    async fn count(&self) -> Result<u64, SearchError>;

    async fn count_by_pdf_path(&self, pdf_path: &str) -> Result<u64, SearchError>;

    /// Removes every record whose `pdf_path` equals the argument and
    /// returns how many were removed.
    async fn delete_by_pdf_path(&self, pdf_path: &str) -> Result<u64, SearchError>;

    /// Plain record listing (no vectors), capped at `limit`.
    async fn scroll(&self, limit: usize) -> Result<Vec<PageRecord>, SearchError>;
}
