// Annotation loading and caption/figure resolution
pub mod model;
pub mod resolver;
pub mod selector;

pub use model::{Annotation, BodyTag, PageAnnotationSet};
pub use resolver::{resolve_figures, CaptionConflictPolicy, ResolvedFigure};
pub use selector::parse_pixel_selector;

use crate::types::Result;
use std::fs;
use std::path::Path;

/// Load one page's annotation file.
pub fn load_annotation_set(path: &Path) -> Result<PageAnnotationSet> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}
