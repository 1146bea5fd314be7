use crate::error::SearchError;
use crate::models::{PageRecord, SearchHit};
use crate::store::{PagePoint, VectorStore};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

/// Fields matched exactly (keyword schema) versus tokenized by word.
const KEYWORD_FIELDS: &[&str] = &[
    "pdf_path",
    "course",
    "unit",
    "ocr_method",
    "file_hash",
    "image_size",
];
const TEXT_FIELDS: &[&str] = &["text", "document_title"];

/// Qdrant REST client scoped to one collection. Vectors are supplied by the
/// caller; the collection never vectorizes server-side.
pub struct QdrantStore {
    endpoint: String,
    collection: String,
    client: Client,
}

impl QdrantStore {
    pub fn new(endpoint: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            collection: collection.into(),
            client: Client::new(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn collection_url(&self, suffix: &str) -> String {
        format!("{}/collections/{}{}", self.endpoint, self.collection, suffix)
    }

    fn backend_error(details: impl Into<String>) -> SearchError {
        SearchError::BackendResponse {
            backend: "qdrant".to_string(),
            details: details.into(),
        }
    }

    fn pdf_path_filter(pdf_path: &str) -> Value {
        json!({ "must": [{ "key": "pdf_path", "match": { "value": pdf_path } }] })
    }

    async fn count_with_filter(&self, filter: Option<Value>) -> Result<u64, SearchError> {
        let mut body = json!({ "exact": true });
        if let Some(filter) = filter {
            body["filter"] = filter;
        }

        let response = self
            .client
            .post(self.collection_url("/points/count"))
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::backend_error(response.status().to_string()));
        }

        let parsed: Value = response.json().await?;
        Ok(parsed
            .pointer("/result/count")
            .and_then(Value::as_u64)
            .unwrap_or(0))
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn ready(&self) -> Result<(), SearchError> {
        let response = self
            .client
            .get(format!("{}/readyz", self.endpoint))
            .send()
            .await
            .map_err(|error| SearchError::NotReady(error.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(SearchError::NotReady(format!(
                "qdrant at {} answered {}",
                self.endpoint,
                response.status()
            )))
        }
    }

    async fn collection_exists(&self) -> Result<bool, SearchError> {
        let response = self
            .client
            .get(self.collection_url(""))
            .send()
            .await
            .map_err(|error| SearchError::NotReady(error.to_string()))?;

        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(Self::backend_error(status.to_string())),
        }
    }

    async fn create_collection(&self, dimensions: usize) -> Result<(), SearchError> {
        if self.collection_exists().await? {
            return Ok(());
        }

        let response = self
            .client
            .put(self.collection_url(""))
            .json(&json!({
                "vectors": { "size": dimensions, "distance": "Cosine" }
            }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::backend_error(format!(
                "collection setup failed with {}",
                response.status()
            )));
        }

        // Payload indexes so equality filters run inside the store.
        for field in KEYWORD_FIELDS {
            let response = self
                .client
                .put(self.collection_url("/index"))
                .json(&json!({ "field_name": field, "field_schema": "keyword" }))
                .send()
                .await?;
            if !response.status().is_success() {
                return Err(Self::backend_error(format!(
                    "keyword index on {field} failed with {}",
                    response.status()
                )));
            }
        }
        for field in TEXT_FIELDS {
            let response = self
                .client
                .put(self.collection_url("/index"))
                .json(&json!({
                    "field_name": field,
                    "field_schema": { "type": "text", "tokenizer": "word", "lowercase": true }
                }))
                .send()
                .await?;
            if !response.status().is_success() {
                return Err(Self::backend_error(format!(
                    "text index on {field} failed with {}",
                    response.status()
                )));
            }
        }

        Ok(())
    }

    async fn drop_collection(&self) -> Result<(), SearchError> {
        let response = self.client.delete(self.collection_url("")).send().await?;
        if response.status().is_success() || response.status() == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(Self::backend_error(response.status().to_string()))
        }
    }

    async fn upsert_pages(&self, points: &[PagePoint]) -> Result<(), SearchError> {
        if points.is_empty() {
            return Ok(());
        }

        let body = points
            .iter()
            .map(|point| {
                Ok(json!({
                    "id": point.id,
                    "vector": point.vector,
                    "payload": serde_json::to_value(&point.record)?,
                }))
            })
            .collect::<Result<Vec<_>, SearchError>>()?;

        let response = self
            .client
            .put(self.collection_url("/points?wait=true"))
            .json(&json!({ "points": body }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::backend_error(response.status().to_string()));
        }

        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        course_filter: Option<&str>,
    ) -> Result<Vec<SearchHit>, SearchError> {
        let mut body = json!({
            "vector": vector,
            "limit": limit,
            "with_payload": true,
        });
        if let Some(course) = course_filter {
            body["filter"] = json!({
                "must": [{ "key": "course", "match": { "value": course } }]
            });
        }

        let response = self
            .client
            .post(self.collection_url("/points/search"))
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::backend_error(response.status().to_string()));
        }

        let parsed: Value = response.json().await?;
        parse_search_hits(&parsed)
    }

    async fn count(&self) -> Result<u64, SearchError> {
        self.count_with_filter(None).await
    }

    async fn count_by_pdf_path(&self, pdf_path: &str) -> Result<u64, SearchError> {
        self.count_with_filter(Some(Self::pdf_path_filter(pdf_path)))
            .await
    }

    async fn delete_by_pdf_path(&self, pdf_path: &str) -> Result<u64, SearchError> {
        // Qdrant's filter delete reports no count, so count first.
        let matching = self.count_by_pdf_path(pdf_path).await?;
        if matching == 0 {
            return Ok(0);
        }

        let response = self
            .client
            .post(self.collection_url("/points/delete?wait=true"))
            .json(&json!({ "filter": Self::pdf_path_filter(pdf_path) }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::backend_error(response.status().to_string()));
        }

        Ok(matching)
    }

    async fn scroll(&self, limit: usize) -> Result<Vec<PageRecord>, SearchError> {
        let response = self
            .client
            .post(self.collection_url("/points/scroll"))
            .json(&json!({
                "limit": limit,
                "with_payload": true,
                "with_vector": false,
            }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::backend_error(response.status().to_string()));
        }

        let parsed: Value = response.json().await?;
        let points = parsed
            .pointer("/result/points")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut records = Vec::with_capacity(points.len());
        for point in points {
            let Some(payload) = point.pointer("/payload") else {
                continue;
            };
            records.push(serde_json::from_value(payload.clone())?);
        }
        Ok(records)
    }
}

fn parse_search_hits(parsed: &Value) -> Result<Vec<SearchHit>, SearchError> {
    let hits = parsed
        .pointer("/result")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut result = Vec::with_capacity(hits.len());
    for hit in hits {
        let score = hit.pointer("/score").and_then(Value::as_f64).unwrap_or(0.0);
        let Some(payload) = hit.pointer("/payload") else {
            continue;
        };
        let record: PageRecord = serde_json::from_value(payload.clone())?;
        result.push(SearchHit { score, record });
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::parse_search_hits;
    use serde_json::json;

    #[test]
    fn search_hits_parse_payload_and_score() {
        let body = json!({
            "result": [{
                "id": "4be0643f-1d98-573b-97cd-ca98a65347dd",
                "score": 0.87,
                "payload": {
                    "text": "integration by parts",
                    "pdf_path": "/notes/Calc/Unit2/week3.pdf",
                    "page_number": 2,
                    "confidence": 0.85,
                    "course": "Calc",
                    "unit": "Unit2",
                    "document_title": "week3.pdf",
                    "ocr_method": "mock_ocr",
                    "indexed_at": "2026-08-20T10:00:00Z",
                    "file_hash": "abc",
                    "image_size": "791x1024"
                }
            }]
        });

        let hits = parse_search_hits(&body).expect("payload should parse");
        assert_eq!(hits.len(), 1);
        assert!((hits[0].score - 0.87).abs() < 1e-9);
        assert_eq!(hits[0].record.page_number, 2);
        assert_eq!(hits[0].record.course, "Calc");
    }

    #[test]
    fn hits_without_payload_are_dropped() {
        let body = json!({ "result": [{ "id": "x", "score": 0.5 }] });
        let hits = parse_search_hits(&body).expect("parse succeeds");
        assert!(hits.is_empty());
    }

    #[test]
    fn empty_result_parses_to_no_hits() {
        let hits = parse_search_hits(&json!({ "result": [] })).expect("parse succeeds");
        assert!(hits.is_empty());
    }
}
