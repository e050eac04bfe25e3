//! A multi-stage bounded-buffer pipeline for batch matrix computation.
//!
//! This crate streams work items (pairs of square matrices loaded from a
//! file feed) through a fixed sequence of compute stages, each backed by a
//! pool of OS threads, with blocking bounded channels between stages
//! providing backpressure.
//!
//! # Features
//!
//! - Blocking fixed-capacity FIFO channels (put blocks while full, get
//!   blocks while empty)
//! - Fixed linear topology: source -> multiply -> column-sum -> total -> sink
//! - Cooperative termination: the admitted total travels in-band behind the
//!   last item, and every worker is woken with a dedicated stop marker and
//!   joined before the run returns
//! - Admission-time filtering: malformed item files are skipped with a
//!   diagnostic, never fatal to the run
//! - Per-stage metrics: throughput, latency percentiles, failure counts
//!
//! # Example
//!
//! ```ignore
//! use matrix_pipeline::PipelineBuilder;
//!
//! let report = PipelineBuilder::new()
//!     .matrix_order(10)
//!     .channel_capacity(5)
//!     .workers(5, 4, 3)
//!     .build()?
//!     .run("feed.in".as_ref(), "report.out".as_ref())?;
//!
//! assert_eq!(report.completed, report.admitted);
//! ```

pub mod channel;
pub mod config;
pub mod error;
pub mod item;
pub mod matrix;
pub mod metrics;
pub mod pipeline;
pub mod sink;
pub mod source;
pub mod stage;

// Re-exports for convenience
pub use channel::BoundedChannel;
pub use config::PipelineConfig;
pub use error::{LoadError, PipelineError, Result};
pub use item::{Envelope, WorkItem};
pub use matrix::Matrix;
pub use metrics::{MetricsSnapshot, StageMetrics};
pub use pipeline::{Pipeline, PipelineBuilder, RunReport};
pub use stage::{ColumnSumStage, MultiplyStage, StagePool, TotalStage, Transform};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
