// PDF extraction module
pub mod caption;
pub mod document;
pub mod figure_crop;
pub mod pdfium_backend;

pub use caption::normalize_caption;
pub use document::{DocumentBackend, PageDocument};
pub use figure_crop::{FigureCropExtractor, FigureOutcome, PageExtraction, PDF_BASE_DPI};
pub use pdfium_backend::PdfiumBackend;
