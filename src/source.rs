use crate::channel::BoundedChannel;
use crate::error::{LoadError, PipelineError, Result};
use crate::item::{Envelope, WorkItem};
use crate::matrix::Matrix;
use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;

/// Counts published by the source after the feed is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceReport {
    /// Items admitted into the pipeline
    pub admitted: u64,
    /// Descriptors skipped because their item file failed to load
    pub skipped: u64,
}

/// Read the feed: one item-file path per line, blank lines ignored.
///
/// The feed itself failing to read is fatal; per-item failures are handled
/// later, at admission.
pub fn read_feed(path: &Path) -> Result<Vec<PathBuf>> {
    let text = fs::read_to_string(path).map_err(|source| PipelineError::Feed {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(PathBuf::from)
        .collect())
}

/// Load one item file: matrices A then B, each `order` non-empty rows.
///
/// A blank separator line between the matrices is tolerated; rows are
/// comma and/or whitespace delimited.
pub fn load_item(path: &Path, order: usize) -> std::result::Result<WorkItem, LoadError> {
    let text = fs::read_to_string(path)?;
    let rows: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    if rows.len() < 2 * order {
        return Err(LoadError::TooFewRows {
            expected: 2 * order,
            found: rows.len(),
        });
    }
    let a = Matrix::parse_rows(&rows[..order], order, 0)?;
    let b = Matrix::parse_rows(&rows[order..2 * order], order, order)?;
    Ok(WorkItem::new(path.display().to_string(), a, b))
}

/// Spawn the source worker.
///
/// It loads each descriptor, skips the ones that fail with a diagnostic,
/// and puts the rest into `output`. Once the feed is exhausted it publishes
/// the immutable admitted total as a `Finished` marker behind the last item
/// and exits naturally.
pub fn spawn(
    descriptors: Vec<PathBuf>,
    order: usize,
    output: BoundedChannel<Envelope>,
) -> Result<JoinHandle<SourceReport>> {
    std::thread::Builder::new()
        .name("source".into())
        .spawn(move || {
            let mut admitted = 0u64;
            let mut skipped = 0u64;
            for path in &descriptors {
                match load_item(path, order) {
                    Ok(item) => {
                        debug!("[source] admitted {}", item.name);
                        output.put(Envelope::Item(Box::new(item)));
                        admitted += 1;
                    }
                    Err(e) => {
                        warn!("[source] skipping {}: {e}", path.display());
                        skipped += 1;
                    }
                }
            }
            output.put(Envelope::Finished(admitted));
            info!("[source] feed exhausted, {admitted} admitted, {skipped} skipped");
            SourceReport { admitted, skipped }
        })
        .map_err(|e| PipelineError::Worker(format!("spawn source: {e}")))
}
