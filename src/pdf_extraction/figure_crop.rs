// Figure rasterization and caption text extraction for one page
use image::{DynamicImage, GenericImageView, ImageFormat};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{trace, warn};

use super::caption::normalize_caption;
use super::document::PageDocument;
use crate::annotations::ResolvedFigure;
use crate::storage::write_atomically;
use crate::types::{figure_filename, FigureRecord, HarvestError, NativeRect, PageId, PageSize, Result};

/// PDF user space resolution.
pub const PDF_BASE_DPI: f32 = 72.0;

/// Largest page bitmap rendered at once (about 256 MB as RGBA).
pub const DEFAULT_MAX_RENDER_PIXELS: u64 = 64_000_000;

// Rendered page plus the zoom it was rendered at, or the render error
type PageRaster = std::result::Result<(DynamicImage, f32), String>;

/// What happened to one resolved figure.
#[derive(Debug)]
pub enum FigureOutcome {
    Extracted(FigureRecord),
    Failed(HarvestError),
}

/// Result of materializing the figures of one page.
#[derive(Debug, Default)]
pub struct PageExtraction {
    pub records: Vec<FigureRecord>,
    /// Figures that could not be rendered or written.
    pub failed: usize,
}

pub struct FigureCropExtractor {
    zoom: f32,
    max_render_pixels: u64,
    image_dir: PathBuf,
}

impl FigureCropExtractor {
    pub fn new(target_dpi: f32, image_dir: impl Into<PathBuf>) -> Self {
        Self {
            zoom: target_dpi / PDF_BASE_DPI,
            max_render_pixels: DEFAULT_MAX_RENDER_PIXELS,
            image_dir: image_dir.into(),
        }
    }

    pub fn with_max_render_pixels(mut self, max_render_pixels: u64) -> Self {
        self.max_render_pixels = max_render_pixels.max(1);
        self
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    /// Zoom used for a page of this size: the target zoom, lowered just
    /// enough to keep the bitmap within the pixel limit.
    pub fn page_zoom(&self, page: PageSize) -> f32 {
        let area = page.width * page.height;
        let zoom = f64::from(self.zoom);
        let limit = self.max_render_pixels as f64;
        if !area.is_finite() || area <= 0.0 || area * zoom * zoom <= limit {
            return self.zoom;
        }
        (limit / area).sqrt() as f32
    }

    pub fn image_dir(&self) -> &Path {
        &self.image_dir
    }

    /// Crops every resolved figure out of the page and reads its caption.
    ///
    /// The page is rendered at most once. A figure that fails is logged and
    /// left out; it does not consume a sequence number, so `figure_id`s on a
    /// page stay dense.
    pub fn extract_page(
        &self,
        document: &dyn PageDocument,
        page_id: &PageId,
        figures: &[ResolvedFigure],
    ) -> PageExtraction {
        let mut raster: Option<PageRaster> = None;
        let mut extraction = PageExtraction::default();

        for figure in figures {
            let figure_id = extraction.records.len();
            match self.figure_outcome(document, page_id, figure_id, figure, &mut raster) {
                FigureOutcome::Extracted(record) => {
                    trace!(
                        image = %record.image_filename,
                        bbox = ?record.bbox_pdf_coords,
                        caption_chars = record.caption.len(),
                        "Figure extracted"
                    );
                    extraction.records.push(record);
                }
                FigureOutcome::Failed(e) => {
                    warn!(
                        page_id = %page_id,
                        annotation = figure.annotation_id.as_deref().unwrap_or("<none>"),
                        error = %e,
                        "Skipping figure"
                    );
                    extraction.failed += 1;
                }
            }
        }
        extraction
    }

    fn figure_outcome(
        &self,
        document: &dyn PageDocument,
        page_id: &PageId,
        figure_id: usize,
        figure: &ResolvedFigure,
        raster: &mut Option<PageRaster>,
    ) -> FigureOutcome {
        match self.extract_figure(document, page_id, figure_id, figure, raster) {
            Ok(record) => FigureOutcome::Extracted(record),
            Err(e) => FigureOutcome::Failed(e),
        }
    }

    fn render(&self, document: &dyn PageDocument, page_id: &PageId) -> Result<(DynamicImage, f32)> {
        let page_index = page_id.page_index();
        let zoom = self.page_zoom(document.page_size(page_index)?);
        if zoom < self.zoom {
            warn!(
                page_id = %page_id,
                zoom,
                target_zoom = self.zoom,
                "Page too large for target resolution, rendering at reduced zoom"
            );
        }
        Ok((document.render_page(page_index, zoom)?, zoom))
    }

    fn extract_figure(
        &self,
        document: &dyn PageDocument,
        page_id: &PageId,
        figure_id: usize,
        figure: &ResolvedFigure,
        raster: &mut Option<PageRaster>,
    ) -> Result<FigureRecord> {
        let page_index = page_id.page_index();
        let rendered = raster.get_or_insert_with(|| {
            self.render(document, page_id)
                .map_err(|e| e.to_string())
        });
        let (page, zoom) = rendered
            .as_ref()
            .map_err(|reason| HarvestError::Pdf(reason.clone()))?;

        let (width, height) = page.dimensions();
        let (x, y, crop_width, crop_height) =
            pixel_window(&figure.figure_rect, f64::from(*zoom), width, height)
                .ok_or(HarvestError::EmptyCrop)?;
        let crop = page.crop_imm(x, y, crop_width, crop_height);

        let image_filename = figure_filename(page_id, figure_id);
        let mut encoded = Cursor::new(Vec::new());
        crop.write_to(&mut encoded, ImageFormat::Png)?;
        write_atomically(&self.image_dir.join(&image_filename), encoded.get_ref())?;

        let caption = match &figure.caption_rect {
            Some(rect) => match document.text_in_rect(page_index, rect) {
                Ok(text) => normalize_caption(&text),
                Err(e) => {
                    warn!(page_id = %page_id, error = %e, "Caption text unavailable");
                    String::new()
                }
            },
            None => String::new(),
        };

        Ok(FigureRecord {
            pdf_id: page_id.document_id().to_string(),
            page_id: page_id.to_string(),
            figure_id,
            original_annotation_id: figure.annotation_id.clone(),
            image_filename,
            caption,
            bbox_pdf_coords: figure.figure_rect.to_array(),
        })
    }
}

/// Pixel crop `(x, y, width, height)` for a native rectangle on a page
/// rendered at `zoom`, rounded outward and clamped to the bitmap.
/// `None` when nothing of the rectangle lies on the page.
pub(crate) fn pixel_window(
    rect: &NativeRect,
    zoom: f64,
    bitmap_width: u32,
    bitmap_height: u32,
) -> Option<(u32, u32, u32, u32)> {
    let left = (rect.x0.min(rect.x1) * zoom).floor().max(0.0);
    let top = (rect.y0.min(rect.y1) * zoom).floor().max(0.0);
    let right = (rect.x0.max(rect.x1) * zoom).ceil().min(f64::from(bitmap_width));
    let bottom = (rect.y0.max(rect.y1) * zoom).ceil().min(f64::from(bitmap_height));
    if right <= left || bottom <= top {
        return None;
    }
    Some((
        left as u32,
        top as u32,
        (right - left) as u32,
        (bottom - top) as u32,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use std::cell::Cell;

    struct StubDocument {
        size: PageSize,
        caption: &'static str,
        fail_render: bool,
        renders: Cell<usize>,
    }

    impl StubDocument {
        fn new(fail_render: bool) -> Self {
            Self {
                size: PageSize::new(100.0, 100.0),
                caption: "  Figure 2.\nA caption  ",
                fail_render,
                renders: Cell::new(0),
            }
        }
    }

    impl PageDocument for StubDocument {
        fn page_count(&self) -> usize {
            1
        }

        fn page_size(&self, _page_index: usize) -> Result<PageSize> {
            Ok(self.size)
        }

        fn render_page(&self, _page_index: usize, zoom: f32) -> Result<DynamicImage> {
            self.renders.set(self.renders.get() + 1);
            if self.fail_render {
                return Err(HarvestError::Pdf("render failed".into()));
            }
            let width = (self.size.width * f64::from(zoom)).ceil() as u32;
            let height = (self.size.height * f64::from(zoom)).ceil() as u32;
            Ok(DynamicImage::ImageRgb8(RgbImage::new(width, height)))
        }

        fn text_in_rect(&self, _page_index: usize, _rect: &NativeRect) -> Result<String> {
            Ok(self.caption.to_string())
        }
    }

    fn figure(rect: NativeRect, caption: Option<NativeRect>) -> ResolvedFigure {
        ResolvedFigure {
            annotation_id: Some("f".into()),
            figure_rect: rect,
            caption_rect: caption,
        }
    }

    #[test]
    fn test_crops_written_with_sequence_names() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = FigureCropExtractor::new(144.0, dir.path());
        let document = StubDocument::new(false);
        let page_id: PageId = "Doc-1".parse().unwrap();
        let figures = [
            figure(NativeRect::new(10.0, 10.0, 60.0, 35.0), Some(NativeRect::new(10.0, 40.0, 60.0, 45.0))),
            figure(NativeRect::new(0.0, 50.0, 100.0, 100.0), None),
        ];

        let extraction = extractor.extract_page(&document, &page_id, &figures);

        assert_eq!(extraction.failed, 0);
        assert_eq!(document.renders.get(), 1);
        assert_eq!(extraction.records.len(), 2);
        assert_eq!(extraction.records[0].image_filename, "Doc-1-fig-0.png");
        assert_eq!(extraction.records[0].caption, "Figure 2. A caption");
        assert_eq!(extraction.records[0].bbox_pdf_coords, [10.0, 10.0, 60.0, 35.0]);
        assert_eq!(extraction.records[1].image_filename, "Doc-1-fig-1.png");
        assert_eq!(extraction.records[1].caption, "");

        let crop = image::open(dir.path().join("Doc-1-fig-0.png")).unwrap();
        assert_eq!(crop.dimensions(), (100, 50));
    }

    #[test]
    fn test_failed_figure_does_not_consume_sequence_number() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = FigureCropExtractor::new(72.0, dir.path());
        let document = StubDocument::new(false);
        let page_id: PageId = "Doc-3".parse().unwrap();
        let figures = [
            figure(NativeRect::new(200.0, 200.0, 300.0, 300.0), None),
            figure(NativeRect::new(0.0, 0.0, 10.0, 10.0), None),
        ];

        let extraction = extractor.extract_page(&document, &page_id, &figures);

        assert_eq!(extraction.failed, 1);
        assert_eq!(extraction.records.len(), 1);
        assert_eq!(extraction.records[0].figure_id, 0);
        assert!(dir.path().join("Doc-3-fig-0.png").exists());
        assert!(!dir.path().join("Doc-3-fig-1.png").exists());
    }

    #[test]
    fn test_render_failure_skips_figures_without_retrying() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = FigureCropExtractor::new(300.0, dir.path());
        let document = StubDocument::new(true);
        let page_id: PageId = "Doc-1".parse().unwrap();
        let figures = [
            figure(NativeRect::new(0.0, 0.0, 10.0, 10.0), None),
            figure(NativeRect::new(0.0, 20.0, 10.0, 30.0), None),
        ];

        let extraction = extractor.extract_page(&document, &page_id, &figures);

        assert!(extraction.records.is_empty());
        assert_eq!(extraction.failed, 2);
        assert_eq!(document.renders.get(), 1);
    }

    #[test]
    fn test_pixel_window_rounds_outward_and_clamps() {
        assert_eq!(
            pixel_window(&NativeRect::new(1.2, 2.7, 3.1, 4.0), 1.0, 10, 10),
            Some((1, 2, 3, 2))
        );
        assert_eq!(
            pixel_window(&NativeRect::new(-5.0, -5.0, 50.0, 50.0), 2.0, 40, 30),
            Some((0, 0, 40, 30))
        );
        assert_eq!(pixel_window(&NativeRect::new(50.0, 0.0, 60.0, 10.0), 1.0, 40, 40), None);
        assert_eq!(pixel_window(&NativeRect::new(5.0, 5.0, 5.0, 9.0), 1.0, 40, 40), None);
    }

    #[test]
    fn test_oversized_page_renders_at_capped_zoom() {
        let dir = tempfile::tempdir().unwrap();
        // 100x100 pt at 2x would be 40000 px; the cap allows 10000
        let extractor = FigureCropExtractor::new(144.0, dir.path()).with_max_render_pixels(10_000);
        let document = StubDocument::new(false);
        let page_id: PageId = "Poster-1".parse().unwrap();
        let figures = [figure(NativeRect::new(10.0, 10.0, 60.0, 35.0), None)];

        let extraction = extractor.extract_page(&document, &page_id, &figures);

        assert_eq!(extraction.failed, 0);
        assert_eq!(extraction.records[0].bbox_pdf_coords, [10.0, 10.0, 60.0, 35.0]);
        let crop = image::open(dir.path().join("Poster-1-fig-0.png")).unwrap();
        assert_eq!(crop.dimensions(), (50, 25));
    }

    #[test]
    fn test_page_zoom_only_lowers_when_needed() {
        let extractor = FigureCropExtractor::new(300.0, "out");
        let letter = PageSize::new(612.0, 792.0);
        assert_eq!(extractor.page_zoom(letter), extractor.zoom());

        // A0 at 300 dpi is about 140 megapixels
        let a0 = PageSize::new(2384.0, 3370.0);
        let zoom = f64::from(extractor.page_zoom(a0));
        assert!(zoom < f64::from(extractor.zoom()));
        let pixels = 2384.0 * zoom * 3370.0 * zoom;
        assert!(pixels <= DEFAULT_MAX_RENDER_PIXELS as f64 * 1.0001);
        assert!(pixels > DEFAULT_MAX_RENDER_PIXELS as f64 * 0.99);
    }

    #[test]
    fn test_default_zoom_targets_300_dpi() {
        let extractor = FigureCropExtractor::new(300.0, "out");
        assert!((extractor.zoom() - 300.0 / 72.0).abs() < f32::EPSILON);
    }
}
