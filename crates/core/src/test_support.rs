//! Shared fixtures for unit tests: tiny on-disk PDFs and a rasterizer that
//! fabricates bitmaps without pdfium.

use crate::error::IngestError;
use crate::models::PageImage;
use crate::rasterizer::PageRasterizer;
use image::RgbImage;
use lopdf::{dictionary, Document, Object, Stream};
use std::path::Path;

/// Writes a minimal valid PDF with the requested number of empty pages.
pub(crate) fn write_sample_pdf(path: &Path, pages: usize) -> Result<(), lopdf::Error> {
    let mut document = Document::with_version("1.5");
    let pages_id = document.new_object_id();

    let mut kids = Vec::new();
    for _ in 0..pages {
        let content_id = document.add_object(Stream::new(dictionary! {}, Vec::new()));
        let page_id = document.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(Object::Reference(page_id));
    }

    let count = kids.len() as i64;
    document.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );

    let catalog_id = document.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    document.trailer.set("Root", catalog_id);
    document.save(path)?;
    Ok(())
}

/// Rasterizer that yields blank bitmaps, with selected pages failing, so
/// pipeline tests run without a pdfium library.
pub(crate) struct FakeRasterizer {
    pub pages_per_pdf: u32,
    pub fail_pages: Vec<u32>,
}

impl FakeRasterizer {
    pub(crate) fn new(pages_per_pdf: u32) -> Self {
        Self {
            pages_per_pdf,
            fail_pages: Vec::new(),
        }
    }

    pub(crate) fn failing(pages_per_pdf: u32, fail_pages: Vec<u32>) -> Self {
        Self {
            pages_per_pdf,
            fail_pages,
        }
    }
}

impl PageRasterizer for FakeRasterizer {
    fn rasterize(
        &self,
        _path: &Path,
        dpi: u32,
        on_page: &mut dyn FnMut(PageImage),
    ) -> Result<(), IngestError> {
        for page_number in 1..=self.pages_per_pdf {
            let bitmap = (!self.fail_pages.contains(&page_number)).then(|| RgbImage::new(64, 64));
            on_page(PageImage {
                page_number,
                bitmap,
                dpi,
            });
        }
        Ok(())
    }
}
