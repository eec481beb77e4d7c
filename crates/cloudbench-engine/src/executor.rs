//! The native stage interpreter
//!
//! [`NativeBackend`] executes an [`ExecutionPlan`]: it resolves the
//! starting buffers (cached seed or a fresh file read), runs each stage
//! group in order over the running buffer, reports tagged groups, and
//! honors cooperative cancellation at group boundaries. A stage that is
//! already running is never killed mid-flight; the flag is re-checked
//! once it returns.

use cloudbench_core::ports::{
    CancelFlag, ExecutionOutput, ExecutionPlan, PipelineBackend, PointReader, StageReport,
};
use cloudbench_core::{CloudbenchError, Result};

use crate::filters;
use crate::formats::las::LasFileReader;

pub struct NativeBackend {
    reader: LasFileReader,
}

impl NativeBackend {
    pub fn new() -> Self {
        Self {
            reader: LasFileReader::new(),
        }
    }
}

impl Default for NativeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineBackend for NativeBackend {
    fn execute(
        &self,
        plan: &ExecutionPlan,
        cancel: &CancelFlag,
        on_stage: &mut dyn FnMut(StageReport),
    ) -> Result<ExecutionOutput> {
        let mut buffers = match (&plan.seed, &plan.source) {
            (Some(seed), _) => (**seed).clone(),
            (None, Some(path)) => self.reader.read_points(path)?,
            (None, None) => {
                return Err(CloudbenchError::InvalidStageConfig {
                    reason: "execution plan has neither a seed nor a source file".to_string(),
                })
            }
        };
        let mut crs_epsg = plan.source_epsg;

        tracing::debug!(
            groups = plan.groups.len(),
            start_count = buffers.len(),
            seeded = plan.seed.is_some(),
            "executing pipeline"
        );

        for (index, group) in plan.groups.iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::debug!(index, "execution interrupted at group boundary");
                return Err(CloudbenchError::Interrupted);
            }

            let input_count = buffers.len() as u64;
            for config in &group.configs {
                buffers = filters::apply(config, &buffers, &mut crs_epsg)
                    .map_err(|error| stage_error(index, error))?;
            }

            if let Some(tag) = &group.tag {
                on_stage(StageReport {
                    index,
                    tag: tag.clone(),
                    input_count,
                    output_count: buffers.len() as u64,
                });
            }
        }

        if cancel.is_cancelled() {
            return Err(CloudbenchError::Interrupted);
        }
        if buffers.is_empty() {
            return Err(CloudbenchError::EmptyResult);
        }

        let count = buffers.len() as u64;
        Ok(ExecutionOutput {
            points: buffers,
            count,
        })
    }
}

/// Annotate a stage failure with its group index. Interruptions and
/// already-annotated failures pass through untouched.
fn stage_error(index: usize, error: CloudbenchError) -> CloudbenchError {
    match error {
        CloudbenchError::Interrupted => CloudbenchError::Interrupted,
        CloudbenchError::StageFailed { index, message } => {
            CloudbenchError::StageFailed { index, message }
        }
        other => CloudbenchError::StageFailed {
            index,
            message: other.to_string(),
        },
    }
}
