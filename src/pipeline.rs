use crate::channel::BoundedChannel;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::item::Envelope;
use crate::metrics::StageMetrics;
use crate::sink;
use crate::source;
use crate::stage::{ColumnSumStage, MultiplyStage, StagePool, TotalStage, Transform};
use log::info;
use std::path::Path;

/// Builder for configuring a pipeline before any thread is spawned
pub struct PipelineBuilder {
    config: PipelineConfig,
}

impl PipelineBuilder {
    /// Create a builder with the default configuration
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
        }
    }

    /// Dimension of the square input matrices
    pub fn matrix_order(mut self, order: usize) -> Self {
        self.config.matrix_order = order;
        self
    }

    /// Capacity of every inter-stage channel
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    /// Worker counts for the multiply, column-sum and total stages
    pub fn workers(mut self, multiply: usize, column_sum: usize, total: usize) -> Self {
        self.config.multiply_workers = multiply;
        self.config.column_sum_workers = column_sum;
        self.config.total_workers = total;
        self
    }

    /// Replace the whole configuration at once
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Validate the configuration and produce a runnable pipeline
    pub fn build(self) -> Result<Pipeline> {
        self.config.validate()?;
        Ok(Pipeline {
            config: self.config,
        })
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Counts for one finished run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    /// Items the source admitted into the pipeline
    pub admitted: u64,
    /// Descriptors the source skipped at admission
    pub skipped: u64,
    /// Items the sink fully consumed
    pub completed: u64,
}

/// A fixed linear pipeline: source -> multiply -> column-sum -> total -> sink,
/// with one bounded channel per hop.
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the pipeline to completion: read the feed at `feed_path`, write
    /// the per-item report to `report_path`, and return the run counts.
    ///
    /// Blocks until every worker thread has been joined. Shutdown follows
    /// the cooperative protocol: the source exits at feed end, the sink at
    /// its completion target, and every stage worker is then woken with a
    /// dedicated stop marker and joined before the channels are dropped.
    pub fn run(&self, feed_path: &Path, report_path: &Path) -> Result<RunReport> {
        let descriptors = source::read_feed(feed_path)?;
        info!(
            "starting run: {} descriptors, order {}, capacity {}, workers {}/{}/{}",
            descriptors.len(),
            self.config.matrix_order,
            self.config.channel_capacity,
            self.config.multiply_workers,
            self.config.column_sum_workers,
            self.config.total_workers,
        );

        // One channel per hop; channel k is written only by stage k's
        // workers and read only by stage k+1's.
        let channels: Vec<BoundedChannel<Envelope>> = (0..4)
            .map(|_| BoundedChannel::new(self.config.channel_capacity))
            .collect();

        let stages: [(&str, usize, fn() -> Box<dyn Transform>); 3] = [
            ("multiply", self.config.multiply_workers, || {
                Box::new(MultiplyStage)
            }),
            ("column-sum", self.config.column_sum_workers, || {
                Box::new(ColumnSumStage)
            }),
            ("total", self.config.total_workers, || Box::new(TotalStage)),
        ];

        let source_handle = source::spawn(
            descriptors,
            self.config.matrix_order,
            channels[0].clone(),
        )?;

        let mut pools = Vec::with_capacity(stages.len());
        let mut metrics = Vec::with_capacity(stages.len());
        for (idx, (name, pool_size, make)) in stages.iter().enumerate() {
            let stage_metrics = StageMetrics::new();
            pools.push(StagePool::spawn(
                *name,
                *pool_size,
                channels[idx].clone(),
                channels[idx + 1].clone(),
                stage_metrics.clone(),
                |_| make(),
            )?);
            metrics.push((*name, stage_metrics));
        }

        let sink_handle = sink::spawn(report_path.to_path_buf(), channels[3].clone())?;

        // Termination protocol. The source ends on its own once the feed is
        // exhausted; it has already published the admitted total in-band.
        let source_report = source_handle
            .join()
            .map_err(|_| PipelineError::Worker("source panicked".into()))?;
        info!(
            "source finished: {} admitted, {} skipped",
            source_report.admitted, source_report.skipped
        );

        // The sink ends once its counter reaches that total; at that point
        // every item that will ever exist has been produced and consumed.
        let sink_report = sink_handle
            .join()
            .map_err(|_| PipelineError::Worker("sink panicked".into()))?;

        // Stage workers may still be blocked in get on empty channels. Wake
        // each one with its own stop marker, then join them all before the
        // channels go away.
        for (pool, channel) in pools.iter().zip(channels.iter()) {
            for _ in 0..pool.pool_size() {
                channel.put(Envelope::Eof);
            }
        }
        for pool in pools {
            pool.join()?;
        }

        for (name, stage_metrics) in &metrics {
            info!("stage {name}: {}", stage_metrics.snapshot().format());
        }
        for (idx, channel) in channels.iter().enumerate() {
            info!(
                "channel {idx}: capacity {}, {} blocked puts",
                channel.capacity(),
                channel.blocked_puts()
            );
        }

        if let Some(err) = sink_report.write_error {
            return Err(err);
        }
        Ok(RunReport {
            admitted: source_report.admitted,
            skipped: source_report.skipped,
            completed: sink_report.completed,
        })
    }
}
