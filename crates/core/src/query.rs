use crate::embeddings::Embedder;
use crate::models::SearchHit;
use crate::store::VectorStore;
use tracing::{debug, error};

pub const DEFAULT_SEARCH_LIMIT: usize = 10;

/// Answers semantic queries over the indexed pages. Query failures never
/// surface as errors; a search always yields a (possibly empty) hit list,
/// with exactly one log line explaining an empty degraded result.
pub struct QueryEngine<S, E> {
    store: S,
    embedder: E,
}

impl<S: VectorStore, E: Embedder> QueryEngine<S, E> {
    pub fn new(store: S, embedder: E) -> Self {
        Self { store, embedder }
    }

    /// Embeds the query and runs near-vector search, optionally restricted
    /// to one course. Hits come back in descending similarity order.
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
        course_filter: Option<&str>,
    ) -> Vec<SearchHit> {
        let Some(vector) = self.embedder.embed(query) else {
            error!(query, "query embedding failed");
            return Vec::new();
        };

        match self.store.search(&vector, limit, course_filter).await {
            Ok(hits) => {
                debug!(query, hits = hits.len(), "search done");
                hits
            }
            Err(search_error) => {
                error!(query, %search_error, "search against store failed");
                Vec::new()
            }
        }
    }
}
