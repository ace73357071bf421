// Run configuration for figure-harvest
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::annotations::CaptionConflictPolicy;
use crate::pdf_extraction::figure_crop::DEFAULT_MAX_RENDER_PIXELS;
use crate::types::{HarvestError, Result};

pub const DEFAULT_METADATA_FILE: &str = "extracted_figures_metadata.json";
pub const DEFAULT_TARGET_DPI: f32 = 300.0;
pub const CONFIG_FILE_NAME: &str = "figure-harvest.toml";

// Get library path from environment or use default
pub fn pdfium_library_path() -> PathBuf {
    env::var("FIGURE_HARVEST_PDFIUM_PATH")
        .unwrap_or_else(|_| "./lib".to_string())
        .into()
}

/// Everything one extraction run needs, passed explicitly to the orchestrator.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExtractionConfig {
    pub pdf_dir: PathBuf,
    pub annotations_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Where figure PNGs go; the output directory when unset.
    #[serde(default)]
    pub image_dir: Option<PathBuf>,
    #[serde(default = "default_metadata_file")]
    pub metadata_file: String,
    #[serde(default = "default_target_dpi")]
    pub target_dpi: f32,
    #[serde(default)]
    pub caption_policy: CaptionConflictPolicy,
    /// Compact the registry every N checkpoints; 0 compacts only at the end of a run.
    #[serde(default)]
    pub compact_every: usize,
    /// Pages whose bitmap at `target_dpi` would exceed this are rendered at a lower zoom.
    #[serde(default = "default_max_render_pixels")]
    pub max_render_pixels: u64,
}

fn default_max_render_pixels() -> u64 {
    DEFAULT_MAX_RENDER_PIXELS
}

fn default_metadata_file() -> String {
    DEFAULT_METADATA_FILE.to_string()
}

fn default_target_dpi() -> f32 {
    DEFAULT_TARGET_DPI
}

impl ExtractionConfig {
    pub fn new(
        pdf_dir: impl Into<PathBuf>,
        annotations_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            pdf_dir: pdf_dir.into(),
            annotations_dir: annotations_dir.into(),
            output_dir: output_dir.into(),
            image_dir: None,
            metadata_file: default_metadata_file(),
            target_dpi: default_target_dpi(),
            caption_policy: CaptionConflictPolicy::default(),
            compact_every: 0,
            max_render_pixels: default_max_render_pixels(),
        }
    }

    pub fn image_dir(&self) -> &Path {
        self.image_dir.as_deref().unwrap_or(&self.output_dir)
    }

    pub fn pdf_path(&self, document_id: &str) -> PathBuf {
        self.pdf_dir.join(format!("{document_id}.pdf"))
    }

    pub fn annotation_path(&self, page_id: &str) -> PathBuf {
        self.annotations_dir.join(format!("{page_id}.json"))
    }

    /// Checks everything that would make a run fail before any unit is touched.
    pub fn validate(&self) -> Result<()> {
        if !self.pdf_dir.is_dir() {
            return Err(HarvestError::Config(format!(
                "PDF directory {} does not exist",
                self.pdf_dir.display()
            )));
        }
        if !self.annotations_dir.is_dir() {
            return Err(HarvestError::Config(format!(
                "annotation directory {} does not exist",
                self.annotations_dir.display()
            )));
        }
        if !(self.target_dpi.is_finite() && self.target_dpi > 0.0) {
            return Err(HarvestError::Config(format!(
                "target dpi must be positive, got {}",
                self.target_dpi
            )));
        }
        if self.max_render_pixels == 0 {
            return Err(HarvestError::Config("max_render_pixels must be positive".into()));
        }
        let plain_name = Path::new(&self.metadata_file)
            .file_name()
            .is_some_and(|name| name == self.metadata_file.as_str());
        if !plain_name {
            return Err(HarvestError::Config(format!(
                "metadata file must be a plain file name, got {:?}",
                self.metadata_file
            )));
        }
        Ok(())
    }

    /// Creates the output and image directories.
    pub fn prepare_output(&self) -> Result<()> {
        fs::create_dir_all(&self.output_dir)?;
        fs::create_dir_all(self.image_dir())?;
        Ok(())
    }

    /// Overlays the values set in a config file.
    pub fn apply_file(&mut self, file: ConfigFile) {
        if let Some(image_dir) = file.image_dir {
            self.image_dir = Some(image_dir);
        }
        if let Some(metadata_file) = file.metadata_file {
            self.metadata_file = metadata_file;
        }
        if let Some(target_dpi) = file.target_dpi {
            self.target_dpi = target_dpi;
        }
        if let Some(caption_policy) = file.caption_policy {
            self.caption_policy = caption_policy;
        }
        if let Some(compact_every) = file.compact_every {
            self.compact_every = compact_every;
        }
        if let Some(max_render_pixels) = file.max_render_pixels {
            self.max_render_pixels = max_render_pixels;
        }
    }
}

/// Optional settings read from `figure-harvest.toml`; unset keys keep the defaults.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub pdf_dir: Option<PathBuf>,
    pub annotations_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub image_dir: Option<PathBuf>,
    pub metadata_file: Option<String>,
    pub target_dpi: Option<f32>,
    pub caption_policy: Option<CaptionConflictPolicy>,
    pub compact_every: Option<usize>,
    pub max_render_pixels: Option<u64>,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            HarvestError::Config(format!("cannot read config file {}: {e}", path.display()))
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// `./figure-harvest.toml`, then `<config dir>/figure-harvest/config.toml`.
    pub fn discover() -> Result<Option<Self>> {
        let local = PathBuf::from(CONFIG_FILE_NAME);
        let user = dirs::config_dir().map(|dir| dir.join("figure-harvest").join("config.toml"));
        for candidate in std::iter::once(local).chain(user) {
            if candidate.is_file() {
                return Self::load(&candidate).map(Some);
            }
        }
        Ok(None)
    }
}
