use crate::channel::BoundedChannel;
use crate::error::{PipelineError, Result};
use crate::item::{Envelope, WorkItem};
use crate::matrix::column_total;
use crate::metrics::StageMetrics;
use log::{debug, warn};
use std::thread::JoinHandle;
use std::time::Instant;

/// One compute step applied to items flowing through the pipeline.
///
/// Transforms are item-local: they may keep per-worker state but never share
/// mutable state across items, so workers need no synchronization beyond the
/// channels.
pub trait Transform: Send + 'static {
    /// Populate the item's next derived field in place.
    fn apply(&mut self, item: &mut WorkItem) -> Result<()>;

    /// Get a human-readable name for this transform
    fn name(&self) -> &str {
        "stage"
    }
}

fn missing_field(stage: &str, item: &WorkItem, field: &str) -> PipelineError {
    PipelineError::Stage {
        stage: stage.to_string(),
        item: item.name.clone(),
        reason: format!("{field} not yet computed"),
    }
}

/// Computes the product of the two input matrices.
#[derive(Debug)]
pub struct MultiplyStage;

impl Transform for MultiplyStage {
    fn apply(&mut self, item: &mut WorkItem) -> Result<()> {
        item.product = Some(item.a.multiply(&item.b));
        Ok(())
    }

    fn name(&self) -> &str {
        "multiply"
    }
}

/// Reduces the product matrix to its per-column sums.
#[derive(Debug)]
pub struct ColumnSumStage;

impl Transform for ColumnSumStage {
    fn apply(&mut self, item: &mut WorkItem) -> Result<()> {
        let product = item
            .product
            .as_ref()
            .ok_or_else(|| missing_field(self.name(), item, "product"))?;
        item.col_sums = Some(product.column_sums());
        Ok(())
    }

    fn name(&self) -> &str {
        "column-sum"
    }
}

/// Reduces the column-sum vector to a single scalar.
#[derive(Debug)]
pub struct TotalStage;

impl Transform for TotalStage {
    fn apply(&mut self, item: &mut WorkItem) -> Result<()> {
        let sums = item
            .col_sums
            .as_ref()
            .ok_or_else(|| missing_field(self.name(), item, "col_sums"))?;
        item.total = Some(column_total(sums));
        Ok(())
    }

    fn name(&self) -> &str {
        "total"
    }
}

/// A pool of worker threads running one transform between two channels.
///
/// Each worker loops `get -> apply -> put` until it receives an `Eof` marker.
/// A `Finished` marker is forwarded downstream by whichever worker receives
/// it; failure-tagged items pass through untransformed so the sink can still
/// count them.
pub struct StagePool {
    name: String,
    handles: Vec<JoinHandle<()>>,
}

impl StagePool {
    /// Spawn `pool_size` workers for one stage.
    pub fn spawn<F>(
        name: impl Into<String>,
        pool_size: usize,
        input: BoundedChannel<Envelope>,
        output: BoundedChannel<Envelope>,
        metrics: StageMetrics,
        transform_factory: F,
    ) -> Result<Self>
    where
        F: Fn(usize) -> Box<dyn Transform>,
    {
        let name = name.into();
        let mut handles = Vec::with_capacity(pool_size);
        for worker_idx in 0..pool_size {
            let input = input.clone();
            let output = output.clone();
            let metrics = metrics.clone();
            let transform = transform_factory(worker_idx);
            let thread_name = format!("{name}-{worker_idx}");
            let worker_name = thread_name.clone();
            let handle = std::thread::Builder::new()
                .name(thread_name.clone())
                .spawn(move || run_worker(&worker_name, transform, &input, &output, &metrics))
                .map_err(|e| PipelineError::Worker(format!("spawn {thread_name}: {e}")))?;
            handles.push(handle);
        }
        Ok(Self { name, handles })
    }

    /// Number of workers in the pool.
    pub fn pool_size(&self) -> usize {
        self.handles.len()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait for every worker to exit. Panics inside a worker surface as
    /// `PipelineError::Worker` rather than being swallowed.
    pub fn join(self) -> Result<()> {
        for handle in self.handles {
            let thread_name = handle.thread().name().unwrap_or("unnamed").to_string();
            handle
                .join()
                .map_err(|_| PipelineError::Worker(format!("{thread_name} panicked")))?;
        }
        Ok(())
    }
}

fn run_worker(
    worker: &str,
    mut transform: Box<dyn Transform>,
    input: &BoundedChannel<Envelope>,
    output: &BoundedChannel<Envelope>,
    metrics: &StageMetrics,
) {
    loop {
        match input.get() {
            Envelope::Item(mut item) => {
                if item.failure.is_none() {
                    let start = Instant::now();
                    match transform.apply(&mut item) {
                        Ok(()) => {
                            metrics.record_latency(start.elapsed().as_nanos() as u64);
                            metrics.record_processed();
                            debug!("[{worker}] processed {}", item.name);
                        }
                        Err(e) => {
                            warn!("[{worker}] {} rejected: {e}", item.name);
                            item.failure = Some(e.to_string());
                            metrics.record_failed();
                        }
                    }
                }
                output.put(Envelope::Item(item));
            }
            Envelope::Finished(total) => {
                debug!("[{worker}] forwarding completion marker ({total} admitted)");
                output.put(Envelope::Finished(total));
            }
            Envelope::Eof => {
                debug!("[{worker}] stopping");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::Matrix;

    fn item_3x3() -> WorkItem {
        let a = Matrix::parse_rows(&["1,2,0", "0,1,0", "0,0,1"], 3, 0).unwrap();
        let b = Matrix::parse_rows(&["1,0,0", "3,1,0", "0,0,2"], 3, 0).unwrap();
        WorkItem::new("unit", a, b)
    }

    #[test]
    fn test_multiply_stage() {
        let mut item = item_3x3();
        MultiplyStage.apply(&mut item).unwrap();
        let p = item.product.unwrap();
        assert_eq!(p.at(0, 0), 7.0);
        assert_eq!(p.at(1, 0), 3.0);
        assert_eq!(p.at(2, 2), 2.0);
    }

    #[test]
    fn test_column_sum_stage() {
        let mut item = item_3x3();
        MultiplyStage.apply(&mut item).unwrap();
        ColumnSumStage.apply(&mut item).unwrap();
        assert_eq!(item.col_sums.unwrap(), vec![10.0, 3.0, 2.0]);
    }

    #[test]
    fn test_total_stage() {
        let mut item = item_3x3();
        MultiplyStage.apply(&mut item).unwrap();
        ColumnSumStage.apply(&mut item).unwrap();
        TotalStage.apply(&mut item).unwrap();
        assert_eq!(item.total, Some(15.0));
    }

    #[test]
    fn test_stage_requires_prerequisite() {
        let mut item = item_3x3();
        let err = ColumnSumStage.apply(&mut item).unwrap_err();
        assert!(matches!(err, PipelineError::Stage { .. }));
    }

    #[test]
    fn test_chain_determinism() {
        let mut first = item_3x3();
        let mut second = item_3x3();
        for item in [&mut first, &mut second] {
            MultiplyStage.apply(item).unwrap();
            ColumnSumStage.apply(item).unwrap();
            TotalStage.apply(item).unwrap();
        }
        assert_eq!(first.product, second.product);
        assert_eq!(first.col_sums, second.col_sums);
        assert_eq!(first.total, second.total);
    }

    #[test]
    fn test_pool_forwards_markers_and_stops_on_eof() {
        let input = BoundedChannel::new(4);
        let output = BoundedChannel::new(4);
        let pool = StagePool::spawn(
            "multiply",
            2,
            input.clone(),
            output.clone(),
            StageMetrics::new(),
            |_| Box::new(MultiplyStage),
        )
        .unwrap();

        input.put(Envelope::Item(Box::new(item_3x3())));
        input.put(Envelope::Finished(1));
        input.put(Envelope::Eof);
        input.put(Envelope::Eof);
        pool.join().unwrap();

        let mut saw_item = false;
        let mut saw_finished = false;
        while let Some(envelope) = output.try_get() {
            match envelope {
                Envelope::Item(item) => {
                    assert!(item.product.is_some());
                    saw_item = true;
                }
                Envelope::Finished(total) => {
                    assert_eq!(total, 1);
                    saw_finished = true;
                }
                Envelope::Eof => panic!("Eof must not be forwarded"),
            }
        }
        assert!(saw_item && saw_finished);
    }

    #[test]
    fn test_failed_item_is_tagged_and_forwarded() {
        struct RejectAll;
        impl Transform for RejectAll {
            fn apply(&mut self, item: &mut WorkItem) -> Result<()> {
                Err(PipelineError::Stage {
                    stage: "reject".into(),
                    item: item.name.clone(),
                    reason: "always".into(),
                })
            }
            fn name(&self) -> &str {
                "reject"
            }
        }

        let input = BoundedChannel::new(4);
        let output = BoundedChannel::new(4);
        let metrics = StageMetrics::new();
        let pool = StagePool::spawn(
            "reject",
            1,
            input.clone(),
            output.clone(),
            metrics.clone(),
            |_| Box::new(RejectAll),
        )
        .unwrap();

        input.put(Envelope::Item(Box::new(item_3x3())));
        input.put(Envelope::Eof);
        pool.join().unwrap();

        match output.try_get() {
            Some(Envelope::Item(item)) => assert!(item.failure.is_some()),
            other => panic!("expected tagged item, got {other:?}"),
        }
        assert_eq!(metrics.total_failed(), 1);
        assert_eq!(metrics.total_processed(), 0);
    }
}
