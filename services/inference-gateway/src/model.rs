use crate::error::ModelLoadError;
use crate::preprocess::{ImageTensor, INPUT_SHAPE};
use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, instrument};
use tract_onnx::prelude::*;

/// Output labels, positionally aligned with the scorer's output vector.
pub const CLASS_LABELS: [&str; 2] = ["Bad Posture", "Good Posture"];

/// A loaded model. Read-only after construction, so one instance is shared
/// by every request handler without locking.
pub trait Scorer: Send + Sync {
    /// Probability per class, same order as `CLASS_LABELS`.
    fn predict(&self, tensor: &ImageTensor) -> Result<Vec<f32>>;
}

type Plan = TypedRunnableModel<TypedModel>;

pub struct OnnxScorer {
    path: PathBuf,
    plan: Plan,
}

impl std::fmt::Debug for OnnxScorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxScorer").field("path", &self.path).finish_non_exhaustive()
    }
}

impl OnnxScorer {
    #[instrument(fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self, ModelLoadError> {
        let start = Instant::now();
        std::fs::metadata(path).map_err(|source| ModelLoadError::Unreadable { path: path.to_path_buf(), source })?;
        let format = |e: TractError| ModelLoadError::Format { path: path.to_path_buf(), reason: format!("{e:#}") };
        let plan = tract_onnx::onnx()
            .model_for_path(path)
            .map_err(format)?
            .with_input_fact(0, InferenceFact::dt_shape(f32::datum_type(), tvec!(INPUT_SHAPE[0], INPUT_SHAPE[1], INPUT_SHAPE[2], INPUT_SHAPE[3])))
            .map_err(format)?
            .into_optimized()
            .map_err(format)?
            .into_runnable()
            .map_err(format)?;
        let this = Self { path: path.to_path_buf(), plan };
        // warm-up doubles as an output arity check
        let probs = this.predict(&ImageTensor::zeros()).map_err(format)?;
        if probs.len() != CLASS_LABELS.len() {
            return Err(ModelLoadError::OutputArity { path: path.to_path_buf(), expected: CLASS_LABELS.len(), actual: probs.len() });
        }
        info!(elapsed_ms = start.elapsed().as_millis() as u64, "model loaded");
        Ok(this)
    }
}

impl Scorer for OnnxScorer {
    fn predict(&self, tensor: &ImageTensor) -> Result<Vec<f32>> {
        if tensor.shape() != INPUT_SHAPE {
            return Err(anyhow!("input shape {:?} does not match model input {:?}", tensor.shape(), INPUT_SHAPE));
        }
        let input: Tensor = tensor.clone().into_array().into();
        let outputs = self.plan.run(tvec!(input.into()))?;
        let first = outputs.first().ok_or_else(|| anyhow!("model produced no outputs"))?;
        let raw: Vec<f32> = first.to_array_view::<f32>()?.iter().copied().collect();
        Ok(to_probabilities(raw))
    }
}

/// Passes probability vectors through untouched. Anything outside `[0, 1]`
/// is treated as logits and softmaxed.
pub fn to_probabilities(mut v: Vec<f32>) -> Vec<f32> {
    if v.iter().all(|x| (0.0..=1.0).contains(x)) { return v; }
    softmax(&mut v);
    v
}

fn softmax(v: &mut [f32]) {
    if v.is_empty() { return; }
    let max = v.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0;
    for x in v.iter_mut() { *x = (*x - max).exp(); sum += *x; }
    if sum > 0.0 { for x in v.iter_mut() { *x /= sum; } }
}
