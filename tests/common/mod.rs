// Shared fixtures: an in-memory PDF backend and a temp workspace
#![allow(dead_code)]

use figure_harvest::pdf_extraction::{DocumentBackend, PageDocument};
use figure_harvest::types::{HarvestError, NativeRect, PageSize, Result};
use figure_harvest::ExtractionConfig;
use image::{DynamicImage, RgbImage};
use serde_json::{json, Value};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A page's text layer as positioned fragments.
#[derive(Debug, Clone)]
pub struct TextFragment {
    pub x: f64,
    pub y: f64,
    pub text: String,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryDocument {
    pub pages: Vec<PageSize>,
    pub text: HashMap<usize, Vec<TextFragment>>,
    pub fail_render: bool,
}

impl MemoryDocument {
    pub fn with_pages(count: usize, width: f64, height: f64) -> Self {
        Self {
            pages: vec![PageSize::new(width, height); count],
            ..Default::default()
        }
    }

    pub fn text_at(mut self, page_index: usize, x: f64, y: f64, text: &str) -> Self {
        self.text.entry(page_index).or_default().push(TextFragment {
            x,
            y,
            text: text.to_string(),
        });
        self
    }

    fn size(&self, page_index: usize) -> Result<PageSize> {
        self.pages
            .get(page_index)
            .copied()
            .ok_or(HarvestError::PageOutOfRange {
                page: page_index + 1,
                count: self.pages.len(),
            })
    }
}

/// Opens documents by file stem. The path must still exist on disk, like a real engine.
#[derive(Default)]
pub struct MemoryBackend {
    documents: HashMap<String, MemoryDocument>,
    unreadable: HashSet<String>,
    pub opened: RefCell<Vec<String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(mut self, document_id: &str, document: MemoryDocument) -> Self {
        self.documents.insert(document_id.to_string(), document);
        self
    }

    /// The file exists but cannot be parsed.
    pub fn with_unreadable(mut self, document_id: &str) -> Self {
        self.unreadable.insert(document_id.to_string());
        self
    }

    pub fn open_count(&self) -> usize {
        self.opened.borrow().len()
    }
}

impl DocumentBackend for MemoryBackend {
    fn open<'a>(&'a self, path: &Path) -> Result<Box<dyn PageDocument + 'a>> {
        if !path.is_file() {
            return Err(HarvestError::Pdf(format!("{} not found", path.display())));
        }
        let stem = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.opened.borrow_mut().push(stem.clone());
        if self.unreadable.contains(&stem) {
            return Err(HarvestError::Pdf(format!("{stem}: not a PDF")));
        }
        let document = self
            .documents
            .get(&stem)
            .ok_or_else(|| HarvestError::Pdf(format!("{stem}: unknown document")))?;
        Ok(Box::new(OpenDocument { document }))
    }
}

struct OpenDocument<'a> {
    document: &'a MemoryDocument,
}

impl PageDocument for OpenDocument<'_> {
    fn page_count(&self) -> usize {
        self.document.pages.len()
    }

    fn page_size(&self, page_index: usize) -> Result<PageSize> {
        self.document.size(page_index)
    }

    fn render_page(&self, page_index: usize, zoom: f32) -> Result<DynamicImage> {
        let size = self.document.size(page_index)?;
        if self.document.fail_render {
            return Err(HarvestError::Pdf("render failed".into()));
        }
        let width = (size.width * f64::from(zoom)).ceil() as u32;
        let height = (size.height * f64::from(zoom)).ceil() as u32;
        Ok(DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, image::Rgb([255, 255, 255]))))
    }

    fn text_in_rect(&self, page_index: usize, rect: &NativeRect) -> Result<String> {
        self.document.size(page_index)?;
        let fragments = self.document.text.get(&page_index).into_iter().flatten();
        Ok(fragments
            .filter(|f| f.x >= rect.x0 && f.x <= rect.x1 && f.y >= rect.y0 && f.y <= rect.y1)
            .map(|f| f.text.as_str())
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

/// Input and output directories for one test.
pub struct Workspace {
    _root: TempDir,
    pub pdf_dir: PathBuf,
    pub annotations_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl Workspace {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let pdf_dir = root.path().join("pdfs");
        let annotations_dir = root.path().join("annotations");
        fs::create_dir_all(&pdf_dir).unwrap();
        fs::create_dir_all(&annotations_dir).unwrap();
        Self {
            output_dir: root.path().join("out"),
            pdf_dir,
            annotations_dir,
            _root: root,
        }
    }

    pub fn config(&self) -> ExtractionConfig {
        let mut config = ExtractionConfig::new(&self.pdf_dir, &self.annotations_dir, &self.output_dir);
        // Keep test renders small
        config.target_dpi = 72.0;
        config
    }

    /// Placeholder bytes; the memory backend only needs the file to exist.
    pub fn add_pdf(&self, document_id: &str) {
        fs::write(self.pdf_dir.join(format!("{document_id}.pdf")), b"%PDF-1.7\n").unwrap();
    }

    pub fn add_annotations(&self, page_id: &str, payload: &Value) {
        fs::write(
            self.annotations_dir.join(format!("{page_id}.json")),
            serde_json::to_vec_pretty(payload).unwrap(),
        )
        .unwrap();
    }

    pub fn add_raw_annotations(&self, page_id: &str, raw: &str) {
        fs::write(self.annotations_dir.join(format!("{page_id}.json")), raw).unwrap();
    }

    pub fn image_path(&self, name: &str) -> PathBuf {
        self.output_dir.join(name)
    }

    pub fn metadata(&self) -> Vec<Value> {
        let raw = fs::read_to_string(self.output_dir.join("extracted_figures_metadata.json")).unwrap();
        serde_json::from_str(&raw).unwrap()
    }
}

pub fn figure(id: &str, x: f64, y: f64, w: f64, h: f64) -> Value {
    json!({
        "id": id,
        "body": [{"value": "Figure"}],
        "target": {"selector": {"type": "FragmentSelector", "value": format!("xywh=pixel:{x},{y},{w},{h}")}}
    })
}

pub fn caption(id: &str, parent: &str, x: f64, y: f64, w: f64, h: f64) -> Value {
    json!({
        "id": id,
        "body": [{"value": "Caption"}, {"value": parent, "purpose": "parent"}],
        "target": {"selector": {"value": format!("xywh=pixel:{x},{y},{w},{h}")}}
    })
}

pub fn page(canvas_width: f64, canvas_height: f64, annotations: Vec<Value>) -> Value {
    json!({
        "canvasWidth": canvas_width,
        "canvasHeight": canvas_height,
        "annotations": annotations
    })
}
