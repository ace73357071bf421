// PDF engine seam: what the pipeline needs from an opened document
use image::DynamicImage;
use std::path::Path;

use crate::types::{NativeRect, PageSize, Result};

/// Opens source documents. The handle borrows the backend, so one backend
/// instance (and its bound library) outlives every document it opens.
pub trait DocumentBackend {
    fn open<'a>(&'a self, path: &Path) -> Result<Box<dyn PageDocument + 'a>>;
}

/// An opened document. Page indices are 0-based; rectangles use native page
/// units with a top-left origin.
pub trait PageDocument {
    fn page_count(&self) -> usize;

    fn page_size(&self, page_index: usize) -> Result<PageSize>;

    /// Renders the full page scaled by `zoom` (1.0 = 72 pixels per inch).
    fn render_page(&self, page_index: usize, zoom: f32) -> Result<DynamicImage>;

    /// Text-layer content confined to `rect`, unnormalized.
    fn text_in_rect(&self, page_index: usize, rect: &NativeRect) -> Result<String>;
}
