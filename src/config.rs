use crate::error::{PipelineError, Result};

/// Runtime knobs for a pipeline run. The topology itself (three compute
/// stages between a source and a sink) is fixed; only sizes vary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Dimension of the square input matrices
    pub matrix_order: usize,
    /// Capacity of every inter-stage channel
    pub channel_capacity: usize,
    pub multiply_workers: usize,
    pub column_sum_workers: usize,
    pub total_workers: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            matrix_order: 10,
            channel_capacity: 5,
            multiply_workers: 5,
            column_sum_workers: 4,
            total_workers: 3,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.matrix_order == 0 {
            return Err(PipelineError::Config("matrix order must be nonzero".into()));
        }
        if self.channel_capacity == 0 {
            return Err(PipelineError::Config(
                "channel capacity must be nonzero".into(),
            ));
        }
        if self.multiply_workers == 0 || self.column_sum_workers == 0 || self.total_workers == 0 {
            return Err(PipelineError::Config(
                "every stage needs at least one worker".into(),
            ));
        }
        Ok(())
    }
}
