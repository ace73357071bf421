// figure-harvest: figure and caption extraction from annotated PDF pages
pub mod annotations;
pub mod config;
pub mod logging;
pub mod orchestrator;
pub mod pdf_extraction;
pub mod progress;
pub mod storage;
pub mod transform;
pub mod types;

pub use config::{ConfigFile, ExtractionConfig};
pub use orchestrator::{BatchOrchestrator, RunReport, RunSummary, UnitOutcome};
pub use pdf_extraction::{DocumentBackend, PageDocument, PdfiumBackend};
pub use progress::{page_progress_bar, RunProgress};
pub use storage::{ExtractionRegistry, RegistryStore};
pub use types::{FigureRecord, HarvestError, PageId, Result};
