//! Cull classification rule and strategy boundary
//!
//! An entity is cullable iff it is far (`distance > max_distance`), slow
//! (`speed < speed_threshold`) and outside the observer's gaze
//! (`cos_angle < cos_angle_threshold`). Frustum-approx mode tightens the
//! cosine threshold by [`FRUSTUM_TIGHTEN`]; the tightening is folded into
//! the effective thresholds before strategy dispatch so the software and
//! accelerated strategies see identical inputs and must produce identical
//! outcomes.

use std::collections::HashMap;

use rustc_hash::FxHashMap;

use crate::config::{CullingConfig, TypeThresholdConfig};

/// Cosine tightening applied in frustum-approx mode
pub const FRUSTUM_TIGHTEN: f64 = 0.15;

/// One resolved threshold tuple
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub max_distance: f64,
    pub speed_threshold: f64,
    pub cos_angle_threshold: f64,
}

impl Thresholds {
    /// The base heuristic on a single (distance, speed, cosine) tuple
    #[inline]
    pub fn should_cull(&self, distance: f64, speed: f64, cos_angle: f64) -> bool {
        distance > self.max_distance
            && speed < self.speed_threshold
            && cos_angle < self.cos_angle_threshold
    }
}

/// Immutable threshold table: global defaults plus per-kind overrides.
///
/// Kinds with overrides get dense codes 1..; code 0 is the global default.
/// Rebuilt wholesale on configuration reload.
#[derive(Debug, Clone)]
pub struct ThresholdTable {
    default: Thresholds,
    /// Parallel to codes; index 0 is the default tuple
    by_code: Vec<Thresholds>,
    code_by_kind: FxHashMap<String, u32>,
}

impl ThresholdTable {
    pub fn from_config(config: &CullingConfig) -> Self {
        let tighten = if config.frustum_approx { FRUSTUM_TIGHTEN } else { 0.0 };
        let default = Thresholds {
            max_distance: config.max_distance,
            speed_threshold: config.speed_threshold,
            cos_angle_threshold: config.cos_angle_threshold - tighten,
        };
        Self::build(default, &config.type_thresholds, tighten)
    }

    fn build(
        default: Thresholds,
        overrides: &HashMap<String, TypeThresholdConfig>,
        tighten: f64,
    ) -> Self {
        // Sort kinds so code assignment is stable across reloads
        let mut kinds: Vec<&String> = overrides.keys().collect();
        kinds.sort();

        let mut by_code = Vec::with_capacity(kinds.len() + 1);
        by_code.push(default);
        let mut code_by_kind = FxHashMap::default();
        for kind in kinds {
            let o = &overrides[kind];
            by_code.push(Thresholds {
                max_distance: o.max_distance.unwrap_or(default.max_distance),
                speed_threshold: o.speed_threshold.unwrap_or(default.speed_threshold),
                cos_angle_threshold: o
                    .cos_angle_threshold
                    .map(|c| c - tighten)
                    .unwrap_or(default.cos_angle_threshold),
            });
            code_by_kind.insert(kind.clone(), (by_code.len() - 1) as u32);
        }

        Self {
            default,
            by_code,
            code_by_kind,
        }
    }

    #[inline]
    pub fn default_thresholds(&self) -> Thresholds {
        self.default
    }

    /// Dense code for a kind; 0 when the kind has no override
    #[inline]
    pub fn code_for(&self, kind: &str) -> u32 {
        self.code_by_kind.get(kind).copied().unwrap_or(0)
    }

    #[inline]
    pub fn for_kind(&self, kind: &str) -> &Thresholds {
        &self.by_code[self.code_for(kind) as usize]
    }

    /// Per-code threshold tuples, index 0 = default
    #[inline]
    pub fn by_code(&self) -> &[Thresholds] {
        &self.by_code
    }

    pub fn has_overrides(&self) -> bool {
        self.by_code.len() > 1
    }

    /// Single-pair approximation used at serialization time: velocity is not
    /// observable there, so speed is taken as zero (always below threshold).
    #[inline]
    pub fn quick_should_cull(&self, distance: f64, cos_angle: f64) -> bool {
        self.default.should_cull(distance, 0.0, cos_angle)
    }
}

/// One batch of classification inputs, parallel arrays of equal length.
///
/// `kind_codes[i]` indexes `thresholds`; code 0 is the global default.
#[derive(Debug)]
pub struct BatchRequest<'a> {
    pub distances: &'a [f64],
    pub speeds: &'a [f64],
    pub cos_angles: &'a [f64],
    pub kind_codes: &'a [u32],
    pub thresholds: &'a [Thresholds],
}

impl BatchRequest<'_> {
    pub fn len(&self) -> usize {
        self.distances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.distances.is_empty()
    }
}

/// Errors from a classification strategy
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClassifyError {
    #[error("batch arrays have mismatched lengths")]
    LengthMismatch,
    #[error("accelerator call failed with status {0}")]
    Accelerator(i32),
}

/// Batch classification strategy.
///
/// Implementations write one boolean per input into `out` (same length as
/// the batch). The software implementation is the default; the accelerated
/// one is selected at startup when the native library binds.
pub trait Classifier: Send {
    fn name(&self) -> &'static str;

    fn classify_batch(&mut self, request: &BatchRequest<'_>, out: &mut [bool])
        -> Result<(), ClassifyError>;
}

/// Pure-software strategy; the reference semantics for any accelerator
#[derive(Debug, Default)]
pub struct SoftwareClassifier;

impl Classifier for SoftwareClassifier {
    fn name(&self) -> &'static str {
        "software"
    }

    fn classify_batch(
        &mut self,
        request: &BatchRequest<'_>,
        out: &mut [bool],
    ) -> Result<(), ClassifyError> {
        let n = request.len();
        if request.speeds.len() != n
            || request.cos_angles.len() != n
            || request.kind_codes.len() != n
            || out.len() < n
        {
            return Err(ClassifyError::LengthMismatch);
        }
        for i in 0..n {
            let code = request.kind_codes[i] as usize;
            // Unknown codes fall back to the default tuple
            let th = request
                .thresholds
                .get(code)
                .unwrap_or(&request.thresholds[0]);
            out[i] = th.should_cull(request.distances[i], request.speeds[i], request.cos_angles[i]);
        }
        Ok(())
    }
}
