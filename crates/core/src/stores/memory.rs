use crate::error::SearchError;
use crate::models::{PageRecord, SearchHit};
use crate::store::{PagePoint, VectorStore};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// In-process implementation of the store contract: an exact cosine scan
/// over a point map. Used by the test suite and by store-less local runs;
/// clones share the same underlying collection.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    offline: bool,
    collection: Mutex<Option<Collection>>,
}

struct Collection {
    dimensions: usize,
    // BTreeMap keeps iteration (and therefore tie order) stable.
    points: BTreeMap<String, PagePoint>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that refuses every call, for exercising unreachable-store
    /// behavior without sockets.
    pub fn offline() -> Self {
        Self {
            inner: Arc::new(Inner {
                offline: true,
                collection: Mutex::new(None),
            }),
        }
    }

    fn guard(&self) -> Result<std::sync::MutexGuard<'_, Option<Collection>>, SearchError> {
        if self.inner.offline {
            return Err(SearchError::NotReady("memory store is offline".to_string()));
        }
        Ok(self
            .inner
            .collection
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()))
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn ready(&self) -> Result<(), SearchError> {
        self.guard().map(|_| ())
    }

    async fn collection_exists(&self) -> Result<bool, SearchError> {
        Ok(self.guard()?.is_some())
    }

    async fn create_collection(&self, dimensions: usize) -> Result<(), SearchError> {
        let mut collection = self.guard()?;
        if collection.is_none() {
            *collection = Some(Collection {
                dimensions,
                points: BTreeMap::new(),
            });
        }
        Ok(())
    }

    async fn drop_collection(&self) -> Result<(), SearchError> {
        *self.guard()? = None;
        Ok(())
    }

    async fn upsert_pages(&self, points: &[PagePoint]) -> Result<(), SearchError> {
        let mut guard = self.guard()?;
        let collection = guard
            .as_mut()
            .ok_or_else(|| SearchError::Request("collection does not exist".to_string()))?;

        for point in points {
            if point.vector.len() != collection.dimensions {
                return Err(SearchError::Request(format!(
                    "vector dimension {} is not {}",
                    point.vector.len(),
                    collection.dimensions
                )));
            }
            collection.points.insert(point.id.clone(), point.clone());
        }
        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        course_filter: Option<&str>,
    ) -> Result<Vec<SearchHit>, SearchError> {
        let guard = self.guard()?;
        let collection = guard
            .as_ref()
            .ok_or_else(|| SearchError::Request("collection does not exist".to_string()))?;

        if vector.len() != collection.dimensions {
            return Err(SearchError::Request(format!(
                "query vector dimension {} is not {}",
                vector.len(),
                collection.dimensions
            )));
        }

        let mut scored: Vec<(f64, &PagePoint)> = collection
            .points
            .values()
            .filter(|point| {
                course_filter
                    .map(|course| point.record.course == course)
                    .unwrap_or(true)
            })
            .map(|point| {
                let score: f64 = point
                    .vector
                    .iter()
                    .zip(vector.iter())
                    .map(|(a, b)| f64::from(*a) * f64::from(*b))
                    .sum();
                (score, point)
            })
            .collect();

        // Descending similarity; equal scores fall back to point id so the
        // order is stable within a process.
        scored.sort_by(|left, right| {
            right
                .0
                .total_cmp(&left.0)
                .then_with(|| left.1.id.cmp(&right.1.id))
        });

        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(score, point)| SearchHit {
                score,
                record: point.record.clone(),
            })
            .collect())
    }

    async fn count(&self) -> Result<u64, SearchError> {
        Ok(self
            .guard()?
            .as_ref()
            .map(|collection| collection.points.len() as u64)
            .unwrap_or(0))
    }

    async fn count_by_pdf_path(&self, pdf_path: &str) -> Result<u64, SearchError> {
        Ok(self
            .guard()?
            .as_ref()
            .map(|collection| {
                collection
                    .points
                    .values()
                    .filter(|point| point.record.pdf_path == pdf_path)
                    .count() as u64
            })
            .unwrap_or(0))
    }

    async fn delete_by_pdf_path(&self, pdf_path: &str) -> Result<u64, SearchError> {
        let mut guard = self.guard()?;
        let Some(collection) = guard.as_mut() else {
            return Ok(0);
        };

        let before = collection.points.len();
        collection
            .points
            .retain(|_, point| point.record.pdf_path != pdf_path);
        Ok((before - collection.points.len()) as u64)
    }

    async fn scroll(&self, limit: usize) -> Result<Vec<PageRecord>, SearchError> {
        Ok(self
            .guard()?
            .as_ref()
            .map(|collection| {
                collection
                    .points
                    .values()
                    .take(limit)
                    .map(|point| point.record.clone())
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryStore;
    use crate::models::PageRecord;
    use crate::store::{PagePoint, VectorStore};
    use chrono::Utc;

    fn record(pdf_path: &str, page_number: u32, course: &str) -> PageRecord {
        PageRecord {
            text: format!("page {page_number} of {pdf_path}"),
            pdf_path: pdf_path.to_string(),
            page_number,
            confidence: 0.85,
            course: course.to_string(),
            unit: "Unit1".to_string(),
            document_title: "notes.pdf".to_string(),
            ocr_method: "mock_ocr".to_string(),
            indexed_at: Utc::now(),
            file_hash: "hash".to_string(),
            image_size: "64x64".to_string(),
        }
    }

    fn point(pdf_path: &str, page_number: u32, course: &str, vector: Vec<f32>) -> PagePoint {
        PagePoint::new(record(pdf_path, page_number, course), vector)
    }

    #[tokio::test]
    async fn upsert_overwrites_same_page_key() {
        let store = MemoryStore::new();
        store.create_collection(2).await.unwrap();

        let first = point("/notes/a.pdf", 1, "A", vec![1.0, 0.0]);
        let again = point("/notes/a.pdf", 1, "A", vec![0.0, 1.0]);
        store.upsert_pages(&[first]).await.unwrap();
        store.upsert_pages(&[again]).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn search_orders_by_similarity_and_honors_filter() {
        let store = MemoryStore::new();
        store.create_collection(2).await.unwrap();
        store
            .upsert_pages(&[
                point("/notes/a.pdf", 1, "A", vec![1.0, 0.0]),
                point("/notes/a.pdf", 2, "A", vec![0.6, 0.8]),
                point("/notes/b.pdf", 1, "B", vec![0.0, 1.0]),
            ])
            .await
            .unwrap();

        let hits = store.search(&[1.0, 0.0], 10, None).await.unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].record.page_number, 1);
        assert!(hits[0].score >= hits[1].score && hits[1].score >= hits[2].score);

        let filtered = store.search(&[1.0, 0.0], 10, Some("B")).await.unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].record.course, "B");
    }

    #[tokio::test]
    async fn delete_by_pdf_path_returns_removed_count() {
        let store = MemoryStore::new();
        store.create_collection(2).await.unwrap();
        store
            .upsert_pages(&[
                point("/notes/a.pdf", 1, "A", vec![1.0, 0.0]),
                point("/notes/a.pdf", 2, "A", vec![0.0, 1.0]),
                point("/notes/b.pdf", 1, "B", vec![0.0, 1.0]),
            ])
            .await
            .unwrap();

        assert_eq!(store.delete_by_pdf_path("/notes/a.pdf").await.unwrap(), 2);
        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.delete_by_pdf_path("/notes/a.pdf").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn dimension_mismatch_is_rejected() {
        let store = MemoryStore::new();
        store.create_collection(3).await.unwrap();
        let result = store
            .upsert_pages(&[point("/notes/a.pdf", 1, "A", vec![1.0, 0.0])])
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn offline_store_refuses_everything() {
        let store = MemoryStore::offline();
        assert!(store.ready().await.is_err());
        assert!(store.search(&[1.0], 5, None).await.is_err());
        assert!(store.count().await.is_err());
    }
}
