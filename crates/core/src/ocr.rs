use crate::error::IngestError;
use crate::models::{OcrResult, PageImage, PathContext, PdfDocument};
use base64::{engine::general_purpose::STANDARD, Engine};
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, RgbImage};
use reqwest::blocking::Client;
use serde_json::{json, Value};
use std::cell::OnceCell;
use std::time::Duration;
use tracing::{debug, warn};

pub const METHOD_OLMOCR: &str = "olmocr";
pub const METHOD_TRANSFORMERS: &str = "transformers";
pub const METHOD_MOCK: &str = "mock_ocr";

/// Per-page budget for a remote OCR pass; overrun counts as a page failure.
pub const DEFAULT_PAGE_TIMEOUT: Duration = Duration::from_secs(60);

const VISION_PROMPT: &str =
    "Extract ONLY the plain text from this page of handwritten notes. No commentary.";

/// OCR backend settings. Selection happens at construction from the config
/// alone; nothing here is probed over the network until the first page.
#[derive(Debug, Clone)]
pub struct OcrConfig {
    /// Dedicated handwriting OCR service (olmOCR-style HTTP endpoint).
    pub olmocr_endpoint: Option<String>,
    /// OpenAI-compatible vision chat endpoint used as the slower fallback.
    pub vision_endpoint: Option<String>,
    pub vision_model: String,
    pub api_key: Option<String>,
    /// Force the deterministic mock backend regardless of endpoints.
    pub lightweight: bool,
    pub page_timeout: Duration,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            olmocr_endpoint: None,
            vision_endpoint: None,
            vision_model: "allenai/olmOCR-7B-0225-preview".to_string(),
            api_key: None,
            lightweight: false,
            page_timeout: DEFAULT_PAGE_TIMEOUT,
        }
    }
}

/// Backends in fallback order. The tag is recorded as `ocr_method` on every
/// result so degraded output stays identifiable downstream.
#[derive(Debug, Clone)]
enum OcrBackend {
    NativeEngine { endpoint: String },
    Vision2Seq { endpoint: String, model: String },
    Mock,
}

/// Converts page bitmaps to text with an explicit confidence and method
/// tag. A notes pipeline must not die because a heavyweight OCR dependency
/// is absent, so the mock backend is always available as the last resort.
pub struct OcrProcessor {
    backend: OcrBackend,
    api_key: Option<String>,
    timeout: Duration,
    client: OnceCell<Client>,
}

impl OcrProcessor {
    /// Picks the first configured backend: native engine, then vision
    /// transformer, then mock. Construction performs no I/O; the HTTP
    /// client is built lazily on the first page.
    pub fn new(config: OcrConfig) -> Self {
        let backend = if config.lightweight {
            OcrBackend::Mock
        } else if let Some(endpoint) = config.olmocr_endpoint {
            OcrBackend::NativeEngine { endpoint }
        } else if let Some(endpoint) = config.vision_endpoint {
            OcrBackend::Vision2Seq {
                endpoint,
                model: config.vision_model,
            }
        } else {
            OcrBackend::Mock
        };

        Self {
            backend,
            api_key: config.api_key,
            timeout: config.page_timeout,
            client: OnceCell::new(),
        }
    }

    /// Deterministic mock backend, mostly for tests and store-less runs.
    pub fn mock() -> Self {
        Self::new(OcrConfig {
            lightweight: true,
            ..OcrConfig::default()
        })
    }

    pub fn method(&self) -> &'static str {
        match self.backend {
            OcrBackend::NativeEngine { .. } => METHOD_OLMOCR,
            OcrBackend::Vision2Seq { .. } => METHOD_TRANSFORMERS,
            OcrBackend::Mock => METHOD_MOCK,
        }
    }

    /// Runs exactly one OCR pass over a page. Failures never propagate:
    /// they come back as a result with empty text, zero confidence, and the
    /// error message filled in.
    pub fn process_image(&self, document: &PdfDocument, page: &PageImage) -> OcrResult {
        let base = |text: String, confidence: f32, error: Option<String>| OcrResult {
            pdf_path: document.path.to_string_lossy().to_string(),
            page_number: page.page_number,
            text,
            confidence,
            method: self.method().to_string(),
            error,
            image_size: page
                .bitmap
                .as_ref()
                .map(|bitmap| format!("{}x{}", bitmap.width(), bitmap.height()))
                .unwrap_or_default(),
            context: document.context.clone(),
            file_hash: document.file_hash.clone(),
        };

        let Some(bitmap) = page.bitmap.as_ref() else {
            return base(
                String::new(),
                0.0,
                Some("page failed to rasterize".to_string()),
            );
        };

        let outcome = match &self.backend {
            OcrBackend::Mock => Ok(mock_page_text(&document.context, page.page_number)),
            OcrBackend::NativeEngine { endpoint } => self.recognize_native(endpoint, bitmap),
            OcrBackend::Vision2Seq { endpoint, model } => {
                self.recognize_vision(endpoint, model, bitmap)
            }
        };

        match outcome {
            Ok((text, confidence)) => {
                let text = text.trim().to_string();
                base(text, confidence.clamp(0.0, 1.0), None)
            }
            Err(error) => {
                warn!(
                    page = page.page_number,
                    pdf = %document.path.display(),
                    %error,
                    "ocr pass failed"
                );
                base(String::new(), 0.0, Some(error.to_string()))
            }
        }
    }

    /// Maps OCR over a page stream, attaching the pdf path and page number
    /// to every result. Never raises; per-page failures are embedded in the
    /// returned results.
    pub fn process_pdf_pages<I>(&self, document: &PdfDocument, pages: I) -> Vec<OcrResult>
    where
        I: IntoIterator<Item = PageImage>,
    {
        let mut results = Vec::new();
        for page in pages {
            let result = self.process_image(document, &page);
            debug!(
                page = result.page_number,
                chars = result.text.len(),
                confidence = result.confidence,
                "ocr page done"
            );
            results.push(result);
        }
        results
    }

    fn client(&self) -> Result<&Client, IngestError> {
        if let Some(client) = self.client.get() {
            return Ok(client);
        }
        let built = Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(IngestError::Http)?;
        Ok(self.client.get_or_init(|| built))
    }

    fn recognize_native(
        &self,
        endpoint: &str,
        bitmap: &RgbImage,
    ) -> Result<(String, f32), IngestError> {
        let mut request = self.client()?.post(endpoint).json(&json!({
            "image_base64": STANDARD.encode(encode_png(bitmap)?),
            "format": "png",
        }));
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send()?;
        if !response.status().is_success() {
            return Err(IngestError::Ocr(format!(
                "ocr endpoint {} returned {}",
                endpoint,
                response.status()
            )));
        }

        let payload: Value = response.json()?;
        let text = payload
            .pointer("/text")
            .and_then(Value::as_str)
            .ok_or_else(|| IngestError::Ocr("ocr response missing text field".to_string()))?
            .to_string();
        let confidence = payload
            .pointer("/confidence")
            .and_then(Value::as_f64)
            .unwrap_or(1.0) as f32;
        Ok((text, confidence))
    }

    fn recognize_vision(
        &self,
        endpoint: &str,
        model: &str,
        bitmap: &RgbImage,
    ) -> Result<(String, f32), IngestError> {
        let data_url = format!(
            "data:image/png;base64,{}",
            STANDARD.encode(encode_png(bitmap)?)
        );
        let mut request = self.client()?.post(endpoint).json(&json!({
            "model": model,
            "temperature": 0,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": VISION_PROMPT },
                    { "type": "image_url", "image_url": { "url": data_url } }
                ]
            }]
        }));
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send()?;
        if !response.status().is_success() {
            return Err(IngestError::Ocr(format!(
                "vision endpoint {} returned {}",
                endpoint,
                response.status()
            )));
        }

        let payload: Value = response.json()?;
        let text = payload
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .ok_or_else(|| IngestError::Ocr("vision response missing content".to_string()))?
            .to_string();

        // Chat-style models report no token confidence; use a fixed score.
        Ok((text, 0.9))
    }
}

fn mock_page_text(context: &PathContext, page_number: u32) -> (String, f32) {
    let text = format!(
        "Handwritten notes from {} - Page {}\n\
         Mathematics equations and diagrams\n\
         Key concepts and formulas\n\
         Student annotations and notes",
        context.course, page_number
    );
    (text, 0.85)
}

fn encode_png(bitmap: &RgbImage) -> Result<Vec<u8>, IngestError> {
    let mut bytes = Vec::new();
    PngEncoder::new(&mut bytes)
        .write_image(
            bitmap.as_raw(),
            bitmap.width(),
            bitmap.height(),
            ExtendedColorType::Rgb8,
        )
        .map_err(|error| IngestError::Ocr(format!("png encode failed: {error}")))?;
    Ok(bytes)
}
