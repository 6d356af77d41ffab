//! Tag regions within a file and the rewrite that replaces them

use mtag_core::{Confidence, Placement, Registry, Result, TagError};
use std::fs;
use std::io::Write;
use std::ops::Range;
use std::path::Path;
use tracing::debug;

/// A tag block found in the file
#[derive(Debug, Clone)]
pub(crate) struct Region {
    pub format: String,
    pub range: Range<usize>,
    pub confidence: Confidence,
    /// Copy of the block as it was on disk
    pub bytes: Vec<u8>,
    /// Set by `strip`; the block is dropped on the next save
    pub stripped: bool,
}

/// Run every adapter's detection in registration order
///
/// A match that overlaps an earlier one is ignored.
pub(crate) fn detect_regions(registry: &Registry, data: &[u8]) -> Vec<Region> {
    let mut regions: Vec<Region> = Vec::new();

    for (format, detection) in registry.detect_all(data) {
        let (Some(range), Some(confidence)) = (detection.region(), detection.confidence()) else {
            continue;
        };
        if range.is_empty() || range.end > data.len() {
            debug!("Ignoring {} match with invalid range {:?}", format.id, range);
            continue;
        }
        if let Some(other) = regions
            .iter()
            .find(|r| r.range.start < range.end && range.start < r.range.end)
        {
            debug!(
                "Ignoring {} block at {:?}: overlaps {} block at {:?}",
                format.id, range, other.format, other.range
            );
            continue;
        }

        debug!(
            "Detected {} block at {}..{} ({:?})",
            format.id, range.start, range.end, confidence
        );
        regions.push(Region {
            format: format.id.clone(),
            bytes: data[range.clone()].to_vec(),
            range,
            confidence,
            stripped: false,
        });
    }

    regions
}

/// Build the new file contents
///
/// Leading blocks (by order), then `data` with every range in `removed` cut
/// out, then trailing blocks (by order).
pub(crate) fn assemble(
    data: &[u8],
    removed: &[Range<usize>],
    mut blocks: Vec<(Placement, Vec<u8>)>,
) -> Vec<u8> {
    let mut removed = removed.to_vec();
    removed.sort_by_key(|r| r.start);

    blocks.sort_by_key(|(placement, _)| match *placement {
        Placement::Leading { order } => (0, order),
        Placement::Trailing { order } => (1, order),
    });
    let (leading, trailing): (Vec<_>, Vec<_>) = blocks
        .into_iter()
        .partition(|(placement, _)| matches!(placement, Placement::Leading { .. }));

    let mut out = Vec::with_capacity(data.len());
    for (_, bytes) in &leading {
        out.extend_from_slice(bytes);
    }

    let mut pos = 0;
    for range in &removed {
        if range.start > pos {
            out.extend_from_slice(&data[pos..range.start]);
        }
        pos = pos.max(range.end);
    }
    if pos < data.len() {
        out.extend_from_slice(&data[pos..]);
    }

    for (_, bytes) in &trailing {
        out.extend_from_slice(bytes);
    }
    out
}

/// Replace `path` with `bytes` through a temporary file in the same directory
///
/// The original stays untouched unless the final rename succeeds. A file
/// that cannot be opened for writing is refused even when its directory
/// would allow the rename.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    fs::OpenOptions::new()
        .write(true)
        .open(path)
        .map_err(|e| TagError::from_io(e, path))?;

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    let mut temp = tempfile::Builder::new()
        .prefix(".mtag-")
        .tempfile_in(dir)
        .map_err(|e| TagError::from_io(e, path))?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;

    if let Ok(metadata) = fs::metadata(path) {
        fs::set_permissions(temp.path(), metadata.permissions())?;
    }

    temp.persist(path)
        .map_err(|e| TagError::from_io(e.error, path))?;
    Ok(())
}
