use crate::channel::BoundedChannel;
use crate::error::{PipelineError, Result};
use crate::item::{Envelope, WorkItem};
use log::{debug, error, info, warn};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::thread::JoinHandle;

const BANNER: &str = "================================";
const RULE: &str = "--------------------------------";

/// Outcome of the sink worker.
#[derive(Debug)]
pub struct SinkReport {
    /// Items fully consumed, failed ones included
    pub completed: u64,
    /// First report-write failure, deferred so the drain could finish
    pub write_error: Option<PipelineError>,
}

/// Spawn the sink worker.
///
/// It consumes the last channel, writing one labeled report block per item,
/// and exits once the completion counter reaches the total published by the
/// source. Items may trail the `Finished` marker under fan-out reordering,
/// so the sink keeps draining until the counter meets the target.
///
/// A write failure is recorded and reported after the run, but consumption
/// continues to the target regardless: stopping early would leave upstream
/// workers wedged in `put` during shutdown.
pub fn spawn(
    report_path: PathBuf,
    input: BoundedChannel<Envelope>,
) -> Result<JoinHandle<SinkReport>> {
    std::thread::Builder::new()
        .name("sink".into())
        .spawn(move || {
            let mut write_error = None;
            let mut writer = match File::create(&report_path) {
                Ok(file) => Some(BufWriter::new(file)),
                Err(source) => {
                    error!("[sink] cannot create {}: {source}", report_path.display());
                    write_error = Some(PipelineError::Report {
                        path: report_path.clone(),
                        source,
                    });
                    None
                }
            };

            let mut completed = 0u64;
            let mut target: Option<u64> = None;
            loop {
                match input.get() {
                    Envelope::Item(item) => {
                        if let Some(w) = writer.as_mut() {
                            if let Err(source) = write_block(w, &item) {
                                error!(
                                    "[sink] write failed for {}: {source}, draining without output",
                                    item.name
                                );
                                write_error = Some(PipelineError::Report {
                                    path: report_path.clone(),
                                    source,
                                });
                                writer = None;
                            }
                        }
                        completed += 1;
                        debug!("[sink] completed {} ({completed} so far)", item.name);
                        if target.is_some_and(|t| completed >= t) {
                            break;
                        }
                    }
                    Envelope::Finished(total) => {
                        debug!("[sink] completion target is {total}");
                        target = Some(total);
                        if completed >= total {
                            break;
                        }
                    }
                    // Stop markers are only ever injected for stage workers
                    Envelope::Eof => {
                        warn!("[sink] unexpected stop marker, exiting");
                        break;
                    }
                }
            }
            info!("[sink] run complete, {completed} items written");
            SinkReport {
                completed,
                write_error,
            }
        })
        .map_err(|e| PipelineError::Worker(format!("spawn sink: {e}")))
}

/// Write one report block: origin plus a labeled section per payload field,
/// flushed so partial output survives a crash.
fn write_block(w: &mut BufWriter<File>, item: &WorkItem) -> std::io::Result<()> {
    writeln!(w, "{BANNER}")?;
    writeln!(w, "Input: {}", item.name)?;
    if let Some(reason) = &item.failure {
        writeln!(w, "{RULE}")?;
        writeln!(w, "Failed: {reason}")?;
        writeln!(w, "{BANNER}")?;
        return w.flush();
    }
    writeln!(w, "{RULE}")?;
    writeln!(w, "A")?;
    w.write_all(item.a.render().as_bytes())?;
    writeln!(w, "{RULE}")?;
    writeln!(w, "B")?;
    w.write_all(item.b.render().as_bytes())?;
    if let Some(product) = &item.product {
        writeln!(w, "{RULE}")?;
        writeln!(w, "Product")?;
        w.write_all(product.render().as_bytes())?;
    }
    if let Some(sums) = &item.col_sums {
        writeln!(w, "{RULE}")?;
        writeln!(w, "Column sums")?;
        for value in sums {
            writeln!(w, "{value:.6}")?;
        }
    }
    if let Some(total) = item.total {
        writeln!(w, "{RULE}")?;
        writeln!(w, "Total")?;
        writeln!(w, "{total:.6}")?;
    }
    writeln!(w, "{BANNER}")?;
    w.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::Matrix;

    fn finished_item(name: &str) -> WorkItem {
        let a = Matrix::parse_rows(&["1,0", "0,1"], 2, 0).unwrap();
        let b = Matrix::parse_rows(&["2,0", "0,2"], 2, 0).unwrap();
        let mut item = WorkItem::new(name, a.clone(), b);
        item.product = Some(a);
        item.col_sums = Some(vec![1.0, 1.0]);
        item.total = Some(2.0);
        item
    }

    #[test]
    fn test_sink_stops_at_target() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("report.out");
        let channel = BoundedChannel::new(4);
        let handle = spawn(out.clone(), channel.clone()).unwrap();

        channel.put(Envelope::Item(Box::new(finished_item("first"))));
        channel.put(Envelope::Item(Box::new(finished_item("second"))));
        channel.put(Envelope::Finished(2));

        let report = handle.join().unwrap();
        assert_eq!(report.completed, 2);
        assert!(report.write_error.is_none());

        let text = std::fs::read_to_string(out).unwrap();
        assert!(text.contains("Input: first"));
        assert!(text.contains("Input: second"));
        assert!(text.contains("Total"));
    }

    #[test]
    fn test_sink_drains_items_trailing_the_marker() {
        let dir = tempfile::tempdir().unwrap();
        let channel = BoundedChannel::new(4);
        // A reordered hand-off: the marker overtook one in-flight item
        channel.put(Envelope::Item(Box::new(finished_item("early"))));
        channel.put(Envelope::Finished(2));
        channel.put(Envelope::Item(Box::new(finished_item("late"))));

        let handle = spawn(dir.path().join("report.out"), channel.clone()).unwrap();
        let report = handle.join().unwrap();
        assert_eq!(report.completed, 2);
        assert!(channel.is_empty());
    }

    #[test]
    fn test_sink_zero_item_run() {
        let dir = tempfile::tempdir().unwrap();
        let channel = BoundedChannel::new(2);
        channel.put(Envelope::Finished(0));
        let handle = spawn(dir.path().join("report.out"), channel).unwrap();
        assert_eq!(handle.join().unwrap().completed, 0);
    }

    #[test]
    fn test_sink_reports_failed_item() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("report.out");
        let channel = BoundedChannel::new(2);
        let mut item = finished_item("broken");
        item.failure = Some("stage rejected it".into());
        channel.put(Envelope::Item(Box::new(item)));
        channel.put(Envelope::Finished(1));

        let report = spawn(out.clone(), channel).unwrap().join().unwrap();
        assert_eq!(report.completed, 1);
        let text = std::fs::read_to_string(out).unwrap();
        assert!(text.contains("Failed: stage rejected it"));
        assert!(!text.contains("Column sums"));
    }

    #[test]
    fn test_sink_surfaces_write_error_but_still_drains() {
        let dir = tempfile::tempdir().unwrap();
        // A directory path cannot be created as a file
        let bad_path = dir.path().to_path_buf();
        let channel = BoundedChannel::new(4);
        channel.put(Envelope::Item(Box::new(finished_item("only"))));
        channel.put(Envelope::Finished(1));

        let report = spawn(bad_path, channel.clone()).unwrap().join().unwrap();
        assert_eq!(report.completed, 1);
        assert!(report.write_error.is_some());
        assert!(channel.is_empty());
    }
}
