// Write-to-temp-then-rename file replacement
use std::io::{self, Write};
use std::path::Path;

/// Replaces `path` with `bytes` so readers only ever see the old or the new
/// content. The temp file lives in the destination directory so the final
/// rename stays on one filesystem.
pub fn write_atomically(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::Builder::new()
        .prefix(".figure-harvest-")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_replaces_existing_content_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("registry.json");
        fs::write(&target, "old").unwrap();

        write_atomically(&target, b"new").unwrap();

        assert_eq!(fs::read_to_string(&target).unwrap(), "new");
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }
}
