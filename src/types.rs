// Core types and error definitions for figure-harvest
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

// Everything before the last '-' is the document id, the trailing digits are the page number.
static PAGE_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?P<document>.+)-(?P<page>[0-9]+)$").expect("valid page id regex"));

/// Unit of work: one page of one source document, e.g. `Draft-2023-5`.
///
/// The original token is kept verbatim so file names derived from it
/// (`{page_id}.json`, `{page_id}-fig-{n}.png`) match the caller's spelling.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageId {
    token: String,
    document_len: usize,
    page_number: u32,
}

impl PageId {
    pub fn as_str(&self) -> &str {
        &self.token
    }

    pub fn document_id(&self) -> &str {
        &self.token[..self.document_len]
    }

    /// 1-based page number as written in the token.
    pub fn page_number(&self) -> u32 {
        self.page_number
    }

    /// 0-based page index for the PDF engine.
    pub fn page_index(&self) -> usize {
        (self.page_number - 1) as usize
    }
}

impl FromStr for PageId {
    type Err = HarvestError;

    fn from_str(token: &str) -> Result<Self> {
        let captures = PAGE_ID_PATTERN
            .captures(token)
            .ok_or_else(|| HarvestError::InvalidPageId(token.to_string()))?;
        let document = &captures["document"];
        let page_number: u32 = captures["page"]
            .parse()
            .map_err(|_| HarvestError::InvalidPageId(token.to_string()))?;
        if page_number == 0 {
            return Err(HarvestError::InvalidPageId(token.to_string()));
        }
        Ok(Self {
            token: token.to_string(),
            document_len: document.len(),
            page_number,
        })
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token)
    }
}

/// Pixel rectangle in annotation canvas space, `x,y,w,h` form.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CanvasRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl CanvasRect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }
}

/// Rectangle in native page units, two-corner form with a top-left origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NativeRect {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl NativeRect {
    pub const fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> f64 {
        (self.x1 - self.x0).abs()
    }

    pub fn height(&self) -> f64 {
        (self.y1 - self.y0).abs()
    }

    pub fn to_array(&self) -> [f64; 4] {
        [self.x0, self.y0, self.x1, self.y1]
    }
}

/// Native page dimensions as reported by the PDF engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width: f64,
    pub height: f64,
}

impl PageSize {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// One extracted figure as persisted in the metadata registry. Never mutated once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FigureRecord {
    pub pdf_id: String,
    pub page_id: String,
    pub figure_id: usize,
    pub original_annotation_id: Option<String>,
    pub image_filename: String,
    pub caption: String,
    pub bbox_pdf_coords: [f64; 4],
}

impl FigureRecord {
    pub fn key(&self) -> (String, usize) {
        (self.page_id.clone(), self.figure_id)
    }
}

pub fn figure_filename(page_id: &PageId, figure_id: usize) -> String {
    format!("{}-fig-{}.png", page_id, figure_id)
}

// Error types
#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to read config file: {0}")]
    ConfigFile(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("registry file {} is malformed at line {line}: {source}", path.display())]
    RegistryFormat {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("PDF error: {0}")]
    Pdf(String),

    #[error("page {page} out of range (document has {count} pages)")]
    PageOutOfRange { page: usize, count: usize },

    #[error("invalid page id {0:?}: expected <document>-<page number>")]
    InvalidPageId(String),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("figure region lies outside the rendered page")]
    EmptyCrop,
}

pub type Result<T> = std::result::Result<T, HarvestError>;
