// PDFium-backed document access (rendering + text layer)
use image::{DynamicImage, RgbaImage};
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::debug;

use super::document::{DocumentBackend, PageDocument};
use crate::config;
use crate::types::{HarvestError, NativeRect, PageSize, Result};

fn pdf_err(err: PdfiumError) -> HarvestError {
    HarvestError::Pdf(format!("{err:?}"))
}

/// Owns the bound PDFium library. Bind once per run and reuse for every document.
pub struct PdfiumBackend {
    pdfium: Pdfium,
}

impl PdfiumBackend {
    /// Binds PDFium from `FIGURE_HARVEST_PDFIUM_PATH` (default `./lib`), falling
    /// back to the system library path.
    pub fn bind() -> Result<Self> {
        let lib_path = config::pdfium_library_path();
        let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&lib_path))
            .or_else(|_| Pdfium::bind_to_system_library())
            .map_err(|e| {
                HarvestError::Config(format!(
                    "failed to load PDFium library from {} or system paths: {e:?}",
                    lib_path.display()
                ))
            })?;
        debug!(path = %lib_path.display(), "PDFium bound");
        Ok(Self {
            pdfium: Pdfium::new(bindings),
        })
    }
}

impl DocumentBackend for PdfiumBackend {
    fn open<'a>(&'a self, path: &Path) -> Result<Box<dyn PageDocument + 'a>> {
        let document = self.pdfium.load_pdf_from_file(path, None).map_err(pdf_err)?;
        Ok(Box::new(PdfiumDocument { document }))
    }
}

struct PdfiumDocument<'a> {
    document: PdfDocument<'a>,
}

impl<'a> PdfiumDocument<'a> {
    fn page(&self, page_index: usize) -> Result<PdfPage<'a>> {
        let count = self.page_count();
        let index = u16::try_from(page_index)
            .ok()
            .filter(|index| usize::from(*index) < count)
            .ok_or(HarvestError::PageOutOfRange {
                page: page_index + 1,
                count,
            })?;
        self.document.pages().get(index).map_err(pdf_err)
    }
}

impl PageDocument for PdfiumDocument<'_> {
    fn page_count(&self) -> usize {
        usize::from(self.document.pages().len())
    }

    fn page_size(&self, page_index: usize) -> Result<PageSize> {
        let page = self.page(page_index)?;
        Ok(PageSize::new(
            f64::from(page.width().value),
            f64::from(page.height().value),
        ))
    }

    fn render_page(&self, page_index: usize, zoom: f32) -> Result<DynamicImage> {
        let page = self.page(page_index)?;
        let render_config = PdfRenderConfig::new()
            .scale_page_by_factor(zoom)
            .render_form_data(true)
            .render_annotations(true);
        let bitmap = page.render_with_config(&render_config).map_err(pdf_err)?;

        // Rebuild from raw bytes so the raster type does not depend on the
        // image version pdfium-render was compiled against
        let width = u32::try_from(bitmap.width()).unwrap_or(0);
        let height = u32::try_from(bitmap.height()).unwrap_or(0);
        let pixels = RgbaImage::from_raw(width, height, bitmap.as_rgba_bytes())
            .ok_or_else(|| HarvestError::Pdf(format!("bitmap of {width}x{height} has unexpected size")))?;
        Ok(DynamicImage::ImageRgba8(pixels))
    }

    fn text_in_rect(&self, page_index: usize, rect: &NativeRect) -> Result<String> {
        let page = self.page(page_index)?;
        let (bottom, left, top, right) = pdfium_clip(rect, page.height().value);
        let clip = PdfRect::new_from_values(bottom, left, top, right);
        let text = page.text().map_err(pdf_err)?;
        Ok(text.inside_rect(clip))
    }
}

/// Converts a top-left-origin rectangle into PDFium's bottom-left page space,
/// as `(bottom, left, top, right)` in the argument order of `PdfRect::new_from_values`.
fn pdfium_clip(rect: &NativeRect, page_height: f32) -> (f32, f32, f32, f32) {
    let left = rect.x0.min(rect.x1) as f32;
    let right = rect.x0.max(rect.x1) as f32;
    let upper = rect.y0.min(rect.y1) as f32;
    let lower = rect.y0.max(rect.y1) as f32;
    (page_height - lower, left, page_height - upper, right)
}
