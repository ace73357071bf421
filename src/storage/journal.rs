// Durable registry: compacted snapshot + append-only checkpoint journal
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::atomic::write_atomically;
use super::registry::{Checkpoint, ExtractionRegistry};
use crate::types::{FigureRecord, HarvestError, Result};

// What the journal tail needs before the next append
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TailRepair {
    Clean,
    /// Cut the file back to this length.
    Truncate(u64),
    /// Last line parsed but has no newline.
    Terminate,
}

/// Files backing one extraction registry inside the output directory.
///
/// - `<metadata>.json`: JSON array of every figure record (the corpus index).
/// - `<stem>.units.json`: completed unit ids as of the last compaction.
/// - `<stem>.journal.jsonl`: one [`Checkpoint`] per line since then.
///
/// A checkpoint append is a single fsynced line, so the state after a crash
/// always covers whole document groups.
#[derive(Debug)]
pub struct RegistryStore {
    snapshot_path: PathBuf,
    units_path: PathBuf,
    journal_path: PathBuf,
    pending_checkpoints: usize,
}

impl RegistryStore {
    pub fn new(output_dir: &Path, metadata_file: &str) -> Self {
        let snapshot_path = output_dir.join(metadata_file);
        let stem = Path::new(metadata_file)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| metadata_file.to_string());
        Self {
            snapshot_path,
            units_path: output_dir.join(format!("{stem}.units.json")),
            journal_path: output_dir.join(format!("{stem}.journal.jsonl")),
            pending_checkpoints: 0,
        }
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    pub fn units_path(&self) -> &Path {
        &self.units_path
    }

    pub fn journal_path(&self) -> &Path {
        &self.journal_path
    }

    /// Checkpoints in the journal that have not been folded into the snapshot yet.
    pub fn pending_checkpoints(&self) -> usize {
        self.pending_checkpoints
    }

    /// Rebuilds the registry from snapshot, units file and journal.
    ///
    /// A torn final journal line (crash mid-append) is dropped and cut from
    /// the file; a complete final line missing its newline gets one. Either
    /// way later appends start on a clean line. Any other malformed content
    /// is an error.
    pub fn load(&mut self) -> Result<ExtractionRegistry> {
        let (registry, replayed, repair) = self.read_state()?;
        self.repair_tail(repair)?;
        self.pending_checkpoints = replayed;
        if registry.completed_count() > 0 {
            info!(
                completed = registry.completed_count(),
                records = registry.record_count(),
                pending_checkpoints = self.pending_checkpoints,
                "Loaded existing registry"
            );
        }
        Ok(registry)
    }

    /// Same state as [`load`](Self::load) without touching any file.
    /// Returns the registry and the number of journal checkpoints replayed.
    pub fn peek(&self) -> Result<(ExtractionRegistry, usize)> {
        let (registry, replayed, _) = self.read_state()?;
        Ok((registry, replayed))
    }

    fn read_state(&self) -> Result<(ExtractionRegistry, usize, TailRepair)> {
        let records: Vec<FigureRecord> = read_json_or_default(&self.snapshot_path)?;
        let mut registry = ExtractionRegistry::from_records(records);

        let units: Vec<String> = read_json_or_default(&self.units_path)?;
        for unit in units {
            registry.mark_completed(unit);
        }

        let (replayed, repair) = self.replay_journal(&mut registry)?;
        Ok((registry, replayed, repair))
    }

    fn replay_journal(&self, registry: &mut ExtractionRegistry) -> Result<(usize, TailRepair)> {
        let content = match fs::read_to_string(&self.journal_path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok((0, TailRepair::Clean)),
            Err(e) => return Err(e.into()),
        };

        let mut replayed = 0;
        let mut offset = 0;
        for (index, line) in content.split_inclusive('\n').enumerate() {
            let line_start = offset;
            offset += line.len();
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Checkpoint>(line) {
                Ok(checkpoint) => {
                    registry.apply_checkpoint(&checkpoint);
                    replayed += 1;
                }
                Err(_) if !line.ends_with('\n') => {
                    warn!(
                        path = %self.journal_path.display(),
                        line = index + 1,
                        "Discarding torn journal entry"
                    );
                    return Ok((replayed, TailRepair::Truncate(line_start as u64)));
                }
                Err(source) => {
                    return Err(HarvestError::RegistryFormat {
                        path: self.journal_path.clone(),
                        line: index + 1,
                        source,
                    })
                }
            }
        }

        let repair = if content.is_empty() || content.ends_with('\n') {
            TailRepair::Clean
        } else {
            TailRepair::Terminate
        };
        Ok((replayed, repair))
    }

    fn repair_tail(&self, repair: TailRepair) -> Result<()> {
        match repair {
            TailRepair::Clean => {}
            TailRepair::Truncate(len) => {
                let journal = OpenOptions::new().write(true).open(&self.journal_path)?;
                journal.set_len(len)?;
                journal.sync_all()?;
            }
            TailRepair::Terminate => {
                debug!(path = %self.journal_path.display(), "Terminating last journal line");
                let mut journal = OpenOptions::new().append(true).open(&self.journal_path)?;
                journal.write_all(b"\n")?;
                journal.sync_data()?;
            }
        }
        Ok(())
    }

    /// Appends one checkpoint and syncs it to disk before returning.
    pub fn append_checkpoint(&mut self, checkpoint: &Checkpoint) -> Result<()> {
        let mut line = serde_json::to_vec(checkpoint)?;
        line.push(b'\n');
        let mut journal = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.journal_path)?;
        journal.write_all(&line)?;
        journal.sync_data()?;
        self.pending_checkpoints += 1;
        debug!(
            document = checkpoint.document_id.as_deref().unwrap_or("<none>"),
            units = checkpoint.units.len(),
            records = checkpoint.records.len(),
            "Checkpoint written"
        );
        Ok(())
    }

    /// Folds the whole registry into snapshot + units file, then empties the journal.
    ///
    /// Each file is replaced atomically. If the process dies between steps the
    /// journal is replayed on top of the new snapshot, which is harmless
    /// because replay is idempotent.
    pub fn compact(&mut self, registry: &ExtractionRegistry) -> Result<()> {
        write_atomically(&self.snapshot_path, &to_pretty_json(registry.records())?)?;
        write_atomically(&self.units_path, &to_pretty_json(&registry.completed_units())?)?;
        write_atomically(&self.journal_path, b"")?;
        self.pending_checkpoints = 0;
        info!(
            path = %self.snapshot_path.display(),
            records = registry.record_count(),
            completed = registry.completed_count(),
            "Registry compacted"
        );
        Ok(())
    }
}

fn read_json_or_default<T>(path: &Path) -> Result<T>
where
    T: serde::de::DeserializeOwned + Default,
{
    match fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content).map_err(|source| HarvestError::RegistryFormat {
            path: path.to_path_buf(),
            line: source.line(),
            source,
        }),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(e.into()),
    }
}

// Four-space indentation, non-ASCII kept as-is
fn to_pretty_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(b"    "));
    value.serialize(&mut serializer)?;
    out.push(b'\n');
    Ok(out)
}
