use crate::error::IngestError;
use crate::models::PageImage;
use image::RgbImage;
use pdfium_render::prelude::*;
use std::cell::OnceCell;
use std::path::Path;
use tracing::warn;

/// Longest bitmap side handed to OCR. Handwriting models are trained on
/// page images around this size; larger renders only cost memory.
pub const MAX_OCR_DIMENSION: u32 = 1024;

/// Renders PDF pages to RGB bitmaps, one page at a time so memory stays
/// bounded by a single bitmap. A page that fails to render is still
/// delivered, with `bitmap: None`, so downstream stages can account for it.
pub trait PageRasterizer {
    fn rasterize(
        &self,
        path: &Path,
        dpi: u32,
        on_page: &mut dyn FnMut(PageImage),
    ) -> Result<(), IngestError>;
}

/// Production rasterizer backed by pdfium. The engine binds to the system
/// pdfium library lazily on first use; constructing the rasterizer performs
/// no I/O.
#[derive(Default)]
pub struct PdfiumRasterizer {
    engine: OnceCell<Pdfium>,
}

impl PdfiumRasterizer {
    pub fn new() -> Self {
        Self::default()
    }

    fn engine(&self) -> Result<&Pdfium, IngestError> {
        if let Some(engine) = self.engine.get() {
            return Ok(engine);
        }
        let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library())
            .map_err(|error| IngestError::PdfRender(format!("pdfium is not available: {error}")))?;
        Ok(self.engine.get_or_init(|| Pdfium::new(bindings)))
    }
}

impl PageRasterizer for PdfiumRasterizer {
    fn rasterize(
        &self,
        path: &Path,
        dpi: u32,
        on_page: &mut dyn FnMut(PageImage),
    ) -> Result<(), IngestError> {
        let pdfium = self.engine()?;
        let document = pdfium
            .load_pdf_from_file(path, None)
            .map_err(|error| IngestError::PdfParse(error.to_string()))?;

        // pdfium renders at 72 DPI natively.
        let config = PdfRenderConfig::new().scale_page_by_factor(dpi as f32 / 72.0);

        for (index, page) in document.pages().iter().enumerate() {
            let page_number = index as u32 + 1;
            let bitmap = match page.render_with_config(&config) {
                // as_image() drops any alpha channel on the way to RGB
                Ok(rendered) => Some(fit_for_ocr(rendered.as_image().into_rgb8())),
                Err(error) => {
                    warn!(
                        page = page_number,
                        path = %path.display(),
                        %error,
                        "page rasterization failed"
                    );
                    None
                }
            };
            on_page(PageImage {
                page_number,
                bitmap,
                dpi,
            });
        }

        Ok(())
    }
}

/// Downscales so the longest side is at most [`MAX_OCR_DIMENSION`] pixels,
/// preserving aspect ratio. Smaller bitmaps pass through untouched.
pub fn fit_for_ocr(image: RgbImage) -> RgbImage {
    let (width, height) = image.dimensions();
    let longest = width.max(height);
    if longest <= MAX_OCR_DIMENSION {
        return image;
    }

    let scale = MAX_OCR_DIMENSION as f32 / longest as f32;
    let new_width = ((width as f32 * scale).round() as u32).max(1);
    let new_height = ((height as f32 * scale).round() as u32).max(1);
    image::imageops::resize(
        &image,
        new_width,
        new_height,
        image::imageops::FilterType::Lanczos3,
    )
}
