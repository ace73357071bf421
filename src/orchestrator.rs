// Resumable batch driver: ids -> document groups -> checkpoints
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io::ErrorKind;
use tracing::{debug, info, warn};

use crate::annotations::{load_annotation_set, resolve_figures};
use crate::config::ExtractionConfig;
use crate::pdf_extraction::{DocumentBackend, FigureCropExtractor, PageDocument};
use crate::progress::RunProgress;
use crate::storage::{Checkpoint, ExtractionRegistry, RegistryStore};
use crate::transform::CanvasTransform;
use crate::types::{FigureRecord, HarvestError, PageId, Result};

/// Terminal state of one unit. Every variant marks the unit completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitOutcome {
    /// The source PDF is missing or could not be opened.
    SkippedNoDocument,
    SkippedNoAnnotation,
    /// Bad id, malformed annotation file, or page outside the document.
    SkippedParseError,
    Completed { figures: usize, failed: usize },
}

impl UnitOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            UnitOutcome::SkippedNoDocument => "skipped-no-pdf",
            UnitOutcome::SkippedNoAnnotation => "skipped-no-annotation",
            UnitOutcome::SkippedParseError => "skipped-parse-error",
            UnitOutcome::Completed { .. } => "completed",
        }
    }
}

/// Counts for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub requested: usize,
    pub duplicates: usize,
    pub already_completed: usize,
    pub processed: usize,
    pub documents: usize,
    pub completed: usize,
    pub skipped_no_document: usize,
    pub skipped_no_annotation: usize,
    pub skipped_parse_error: usize,
    pub figures_extracted: usize,
    pub figures_failed: usize,
}

impl RunSummary {
    pub fn record(&mut self, outcome: UnitOutcome) {
        self.processed += 1;
        match outcome {
            UnitOutcome::SkippedNoDocument => self.skipped_no_document += 1,
            UnitOutcome::SkippedNoAnnotation => self.skipped_no_annotation += 1,
            UnitOutcome::SkippedParseError => self.skipped_parse_error += 1,
            UnitOutcome::Completed { figures, failed } => {
                self.completed += 1;
                self.figures_extracted += figures;
                self.figures_failed += failed;
            }
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "requested:              {}", self.requested)?;
        writeln!(f, "duplicates:             {}", self.duplicates)?;
        writeln!(f, "already completed:      {}", self.already_completed)?;
        writeln!(f, "processed:              {}", self.processed)?;
        writeln!(f, "  documents:            {}", self.documents)?;
        writeln!(f, "  completed:            {}", self.completed)?;
        writeln!(f, "  skipped (no pdf):     {}", self.skipped_no_document)?;
        writeln!(f, "  skipped (no json):    {}", self.skipped_no_annotation)?;
        writeln!(f, "  skipped (parse):      {}", self.skipped_parse_error)?;
        writeln!(f, "figures extracted:      {}", self.figures_extracted)?;
        write!(f, "figures failed:         {}", self.figures_failed)
    }
}

#[derive(Debug)]
pub struct RunReport {
    pub registry: ExtractionRegistry,
    pub summary: RunSummary,
}

struct DocumentGroup {
    document_id: String,
    units: Vec<PageId>,
}

struct GroupResult {
    outcomes: Vec<UnitOutcome>,
    records: Vec<FigureRecord>,
}

pub struct BatchOrchestrator<B: DocumentBackend> {
    config: ExtractionConfig,
    backend: B,
    store: RegistryStore,
    extractor: FigureCropExtractor,
}

impl<B: DocumentBackend> BatchOrchestrator<B> {
    /// Validates the configuration and creates the output directories.
    pub fn new(config: ExtractionConfig, backend: B) -> Result<Self> {
        config.validate()?;
        config.prepare_output()?;
        let store = RegistryStore::new(&config.output_dir, &config.metadata_file);
        let extractor = FigureCropExtractor::new(config.target_dpi, config.image_dir())
            .with_max_render_pixels(config.max_render_pixels);
        Ok(Self {
            config,
            backend,
            store,
            extractor,
        })
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn store(&self) -> &RegistryStore {
        &self.store
    }

    /// Processes every requested id not already in the registry.
    ///
    /// Progress is made durable one document group at a time. Only
    /// persistence failures abort the run; everything below that is
    /// recorded as a unit outcome.
    pub fn run<I, S>(&mut self, ids: I) -> Result<RunReport>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.run_with_progress(ids, &mut ())
    }

    /// Like [`run`](Self::run), reporting each settled unit to `progress`.
    pub fn run_with_progress<I, S>(&mut self, ids: I, progress: &mut dyn RunProgress) -> Result<RunReport>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut registry = self.store.load()?;
        let mut summary = RunSummary::default();

        let mut seen = HashSet::new();
        let mut invalid = Vec::new();
        let mut groups: Vec<DocumentGroup> = Vec::new();
        let mut group_index: HashMap<String, usize> = HashMap::new();

        for id in ids {
            let id = id.as_ref();
            summary.requested += 1;
            if !seen.insert(id.to_string()) {
                summary.duplicates += 1;
                continue;
            }
            if registry.is_completed(id) {
                summary.already_completed += 1;
                continue;
            }
            match id.parse::<PageId>() {
                Ok(page_id) => {
                    let document_id = page_id.document_id().to_string();
                    let slot = *group_index.entry(document_id.clone()).or_insert_with(|| {
                        groups.push(DocumentGroup {
                            document_id,
                            units: Vec::new(),
                        });
                        groups.len() - 1
                    });
                    groups[slot].units.push(page_id);
                }
                Err(e) => {
                    warn!(id, error = %e, "Unparseable unit id");
                    invalid.push(id.to_string());
                }
            }
        }

        let pending = invalid.len() + groups.iter().map(|g| g.units.len()).sum::<usize>();
        info!(
            requested = summary.requested,
            already_completed = summary.already_completed,
            pending,
            documents = groups.len(),
            "Starting extraction run"
        );
        progress.start(pending);

        if !invalid.is_empty() {
            for id in &invalid {
                summary.record(UnitOutcome::SkippedParseError);
                progress.unit_done(id, UnitOutcome::SkippedParseError);
            }
            let checkpoint = Checkpoint::new(None, invalid, Vec::new());
            self.commit(&mut registry, &checkpoint)?;
        }

        let total = groups.len();
        for (position, group) in groups.into_iter().enumerate() {
            info!(
                document = %group.document_id,
                units = group.units.len(),
                "Processing document {}/{}",
                position + 1,
                total
            );
            let result = self.process_group(&group);
            summary.documents += 1;
            for (unit, outcome) in group.units.iter().zip(&result.outcomes) {
                summary.record(*outcome);
                progress.unit_done(unit.as_str(), *outcome);
            }

            let checkpoint = Checkpoint::new(
                Some(group.document_id),
                group.units.iter().map(|unit| unit.to_string()).collect(),
                result.records,
            );
            self.commit(&mut registry, &checkpoint)?;
        }

        if self.store.pending_checkpoints() > 0 {
            self.store.compact(&registry)?;
        }
        progress.finish();

        info!(
            processed = summary.processed,
            completed = summary.completed,
            skipped_no_pdf = summary.skipped_no_document,
            skipped_no_annotation = summary.skipped_no_annotation,
            skipped_parse_error = summary.skipped_parse_error,
            figures = summary.figures_extracted,
            figures_failed = summary.figures_failed,
            total_records = registry.record_count(),
            "Extraction run finished"
        );

        Ok(RunReport { registry, summary })
    }

    fn commit(&mut self, registry: &mut ExtractionRegistry, checkpoint: &Checkpoint) -> Result<()> {
        self.store.append_checkpoint(checkpoint)?;
        registry.apply_checkpoint(checkpoint);
        let every = self.config.compact_every;
        if every > 0 && self.store.pending_checkpoints() >= every {
            self.store.compact(registry)?;
        }
        Ok(())
    }

    // The document handle lives only inside this call, so it is closed
    // before the caller writes the group's checkpoint.
    fn process_group(&self, group: &DocumentGroup) -> GroupResult {
        let skipped = |reason: &str| {
            warn!(document = %group.document_id, reason, "Document unavailable, marking its units processed");
            GroupResult {
                outcomes: vec![UnitOutcome::SkippedNoDocument; group.units.len()],
                records: Vec::new(),
            }
        };

        let pdf_path = self.config.pdf_path(&group.document_id);
        if !pdf_path.is_file() {
            return skipped("missing file");
        }
        let document = match self.backend.open(&pdf_path) {
            Ok(document) => document,
            Err(e) => return skipped(&e.to_string()),
        };

        let mut result = GroupResult {
            outcomes: Vec::with_capacity(group.units.len()),
            records: Vec::new(),
        };
        for page_id in &group.units {
            let (outcome, records) = self.process_unit(document.as_ref(), page_id);
            debug!(page_id = %page_id, outcome = outcome.label(), "Unit finished");
            result.outcomes.push(outcome);
            result.records.extend(records);
        }
        result
    }

    fn process_unit(&self, document: &dyn PageDocument, page_id: &PageId) -> (UnitOutcome, Vec<FigureRecord>) {
        let annotation_path = self.config.annotation_path(page_id.as_str());
        let annotations = match load_annotation_set(&annotation_path) {
            Ok(annotations) => annotations,
            Err(HarvestError::Io(e)) if e.kind() == ErrorKind::NotFound => {
                warn!(page_id = %page_id, path = %annotation_path.display(), "Annotation file not found");
                return (UnitOutcome::SkippedNoAnnotation, Vec::new());
            }
            Err(e) => {
                warn!(page_id = %page_id, error = %e, "Cannot parse annotation file");
                return (UnitOutcome::SkippedParseError, Vec::new());
            }
        };

        let page_size = match document.page_size(page_id.page_index()) {
            Ok(size) => size,
            Err(e) => {
                warn!(page_id = %page_id, error = %e, "Cannot read page");
                return (UnitOutcome::SkippedParseError, Vec::new());
            }
        };

        let transform = CanvasTransform::new(annotations.canvas_width, annotations.canvas_height, page_size);
        let figures = resolve_figures(&annotations, &transform, self.config.caption_policy);
        debug!(
            page_id = %page_id,
            annotations = annotations.annotations.len(),
            figures = figures.len(),
            "Resolved figure annotations"
        );

        let extraction = self.extractor.extract_page(document, page_id, &figures);
        let outcome = UnitOutcome::Completed {
            figures: extraction.records.len(),
            failed: extraction.failed,
        };
        (outcome, extraction.records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_record_counts_outcomes() {
        let mut summary = RunSummary::default();
        summary.record(UnitOutcome::Completed { figures: 2, failed: 1 });
        summary.record(UnitOutcome::Completed { figures: 0, failed: 0 });
        summary.record(UnitOutcome::SkippedNoDocument);
        summary.record(UnitOutcome::SkippedNoAnnotation);
        summary.record(UnitOutcome::SkippedParseError);

        assert_eq!(summary.processed, 5);
        assert_eq!(summary.completed, 2);
        assert_eq!(summary.figures_extracted, 2);
        assert_eq!(summary.figures_failed, 1);
        assert_eq!(summary.skipped_no_document, 1);
        assert_eq!(summary.skipped_no_annotation, 1);
        assert_eq!(summary.skipped_parse_error, 1);
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(UnitOutcome::SkippedNoDocument.label(), "skipped-no-pdf");
        assert_eq!(UnitOutcome::Completed { figures: 1, failed: 0 }.label(), "completed");
    }

    #[test]
    fn test_summary_display_lists_counts() {
        let summary = RunSummary {
            requested: 4,
            figures_extracted: 3,
            ..Default::default()
        };
        let text = summary.to_string();
        assert!(text.contains("requested:              4"));
        assert!(text.contains("figures extracted:      3"));
    }
}
