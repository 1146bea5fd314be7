use crate::error::IngestError;
use crate::models::{PageImage, PathContext, PdfDocument, ScanStats, UNKNOWN_SEGMENT};
use crate::rasterizer::{PageRasterizer, PdfiumRasterizer};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

pub const DEFAULT_RENDER_DPI: u32 = 200;

const HASH_CHUNK_BYTES: usize = 64 * 1024;

/// Walks a notes root, enumerates PDFs, and streams their pages with
/// path-derived context. One unreadable PDF never aborts discovery; it is
/// logged and omitted.
pub struct PdfScanner {
    root: PathBuf,
    dpi: u32,
    rasterizer: Box<dyn PageRasterizer>,
}

impl PdfScanner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            dpi: DEFAULT_RENDER_DPI,
            rasterizer: Box::new(PdfiumRasterizer::new()),
        }
    }

    pub fn with_dpi(mut self, dpi: u32) -> Self {
        self.dpi = dpi;
        self
    }

    pub fn with_rasterizer(mut self, rasterizer: Box<dyn PageRasterizer>) -> Self {
        self.rasterizer = rasterizer;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Recursively discovers PDFs under the root, ordered lexicographically
    /// by relative path. Fails only when the root itself is missing.
    pub fn discover_pdfs(&self) -> Result<Vec<PdfDocument>, IngestError> {
        if !self.root.exists() {
            return Err(IngestError::NotFound(self.root.clone()));
        }

        let mut paths = Vec::new();
        for entry in WalkDir::new(&self.root)
            .into_iter()
            .filter_map(|item| item.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let is_pdf = entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
            if is_pdf {
                paths.push(entry.path().to_path_buf());
            }
        }

        paths.sort_unstable_by(|left, right| {
            let left = left.strip_prefix(&self.root).unwrap_or(left);
            let right = right.strip_prefix(&self.root).unwrap_or(right);
            left.cmp(right)
        });

        let mut documents = Vec::new();
        for path in paths {
            match self.describe_pdf(&path) {
                Ok(document) => documents.push(document),
                Err(error) => {
                    warn!(path = %path.display(), %error, "skipping unreadable pdf");
                }
            }
        }

        debug!(count = documents.len(), root = %self.root.display(), "pdf discovery done");
        Ok(documents)
    }

    /// Builds the full document record for one PDF: size, page count,
    /// content hash, and path context. `NotFound` when the file is absent;
    /// `PdfParse` when it cannot be opened as a PDF.
    pub fn describe_pdf(&self, path: &Path) -> Result<PdfDocument, IngestError> {
        if !path.exists() {
            return Err(IngestError::NotFound(path.to_path_buf()));
        }

        let size_bytes = std::fs::metadata(path)?.len();
        let document = lopdf::Document::load(path)
            .map_err(|error| IngestError::PdfParse(error.to_string()))?;
        let page_count = document.get_pages().len() as u32;
        let file_hash = hash_file(path)?;
        let relative_path = path
            .strip_prefix(&self.root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.to_path_buf());

        Ok(PdfDocument {
            path: path.to_path_buf(),
            relative_path,
            size_bytes,
            page_count,
            file_hash,
            context: self.pdf_context(path),
        })
    }

    /// Derives `(course, unit, file_name)` from the PDF's position under
    /// the root. A path that escapes the root (symlink or explicit file
    /// outside the tree) gets `Unknown` for both segments.
    pub fn pdf_context(&self, path: &Path) -> PathContext {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();

        let Ok(relative) = path.strip_prefix(&self.root) else {
            return PathContext::unknown(file_name);
        };

        let segments: Vec<String> = relative
            .parent()
            .map(|parent| {
                parent
                    .components()
                    .map(|component| component.as_os_str().to_string_lossy().to_string())
                    .collect()
            })
            .unwrap_or_default();

        PathContext {
            course: segments
                .first()
                .cloned()
                .unwrap_or_else(|| UNKNOWN_SEGMENT.to_string()),
            unit: segments
                .get(1)
                .cloned()
                .unwrap_or_else(|| UNKNOWN_SEGMENT.to_string()),
            file_name,
        }
    }

    /// Streams the PDF's pages through `on_page` in ascending page order,
    /// one bitmap in memory at a time. A page that fails to render arrives
    /// with `bitmap: None`.
    pub fn extract_pages_as_images(
        &self,
        pdf: &PdfDocument,
        on_page: &mut dyn FnMut(PageImage),
    ) -> Result<(), IngestError> {
        self.rasterizer.rasterize(&pdf.path, self.dpi, on_page)
    }

    /// Totals over a discovery result.
    pub fn scan_stats(documents: &[PdfDocument]) -> ScanStats {
        let total_pages: u64 = documents.iter().map(|d| u64::from(d.page_count)).sum();
        let total_bytes: u64 = documents.iter().map(|d| d.size_bytes).sum();
        let average = if documents.is_empty() {
            0.0
        } else {
            total_pages as f64 / documents.len() as f64
        };

        ScanStats {
            total_pdfs: documents.len(),
            total_pages,
            total_size_mb: round_to(total_bytes as f64 / (1024.0 * 1024.0), 2),
            average_pages_per_pdf: round_to(average, 1),
        }
    }
}

/// SHA-256 over raw file bytes, streamed in 64 KiB chunks. Stable across
/// machines for identical bytes; mtime and location never affect it, so
/// copies of a file are detected as the same content.
pub fn hash_file(path: &Path) -> Result<String, IngestError> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut chunk = vec![0u8; HASH_CHUNK_BYTES];
    loop {
        let read = file.read(&mut chunk)?;
        if read == 0 {
            break;
        }
        hasher.update(&chunk[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}
