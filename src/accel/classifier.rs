//! Accelerated classification strategy
//!
//! Thin adapter from [`Classifier`] batches to the native ABI. The input
//! thresholds are already final (frustum tightening folded in), so the
//! native verdicts must match the software strategy bit for bit; any
//! nonzero status aborts the batch and the caller discards it.

use crate::accel::loader::AccelLibrary;
use crate::culling::classify::{BatchRequest, Classifier, ClassifyError};

pub struct AcceleratedClassifier {
    lib: AccelLibrary,
    /// Native out-buffer, 1 byte per entity
    flags: Vec<u8>,
    /// Threshold tuples flattened to (max_d, s_th, c_th) triples per code
    flat_thresholds: Vec<f64>,
}

impl AcceleratedClassifier {
    pub fn new(lib: AccelLibrary) -> Self {
        Self {
            lib,
            flags: Vec::new(),
            flat_thresholds: Vec::new(),
        }
    }
}

impl Classifier for AcceleratedClassifier {
    fn name(&self) -> &'static str {
        "accelerated"
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
            || request.thresholds.is_empty()
        {
            return Err(ClassifyError::LengthMismatch);
        }
        if n == 0 {
            return Ok(());
        }

        self.flags.clear();
        self.flags.resize(n, 0);

        let status = if request.thresholds.len() == 1 {
            let th = &request.thresholds[0];
            // SAFETY: all slices are length n and outlive the call
            unsafe {
                (self.lib.cull_batch)(
                    request.distances.as_ptr(),
                    request.speeds.as_ptr(),
                    request.cos_angles.as_ptr(),
                    n,
                    th.max_distance,
                    th.speed_threshold,
                    th.cos_angle_threshold,
                    self.flags.as_mut_ptr(),
                )
            }
        } else {
            self.flat_thresholds.clear();
            for th in request.thresholds {
                self.flat_thresholds.push(th.max_distance);
                self.flat_thresholds.push(th.speed_threshold);
                self.flat_thresholds.push(th.cos_angle_threshold);
            }
            // SAFETY: codes are bounds-checked against code_count natively
            unsafe {
                (self.lib.cull_batch_by_type)(
                    request.distances.as_ptr(),
                    request.speeds.as_ptr(),
                    request.cos_angles.as_ptr(),
                    request.kind_codes.as_ptr(),
                    n,
                    self.flat_thresholds.as_ptr(),
                    request.thresholds.len(),
                    self.flags.as_mut_ptr(),
                )
            }
        };

        if status != 0 {
            return Err(ClassifyError::Accelerator(status));
        }
        for i in 0..n {
            out[i] = self.flags[i] != 0;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accel::loader::AccelLibrary;
    use crate::config::{CullingConfig, TypeThresholdConfig};
    use crate::culling::classify::{SoftwareClassifier, ThresholdTable};
    use std::path::PathBuf;

    // Reference entry points with the same semantics the shipped native
    // library implements.

    unsafe extern "C" fn ref_should_cull(
        distance: f64,
        speed: f64,
        cos_angle: f64,
        max_distance: f64,
        speed_threshold: f64,
        cos_angle_threshold: f64,
    ) -> i32 {
        i32::from(
            distance > max_distance && speed < speed_threshold && cos_angle < cos_angle_threshold,
        )
    }

    unsafe extern "C" fn ref_cull_batch(
        distances: *const f64,
        speeds: *const f64,
        cos_angles: *const f64,
        len: usize,
        max_distance: f64,
        speed_threshold: f64,
        cos_angle_threshold: f64,
        out: *mut u8,
    ) -> i32 {
        let d = std::slice::from_raw_parts(distances, len);
        let s = std::slice::from_raw_parts(speeds, len);
        let c = std::slice::from_raw_parts(cos_angles, len);
        let out = std::slice::from_raw_parts_mut(out, len);
        for i in 0..len {
            out[i] = u8::from(
                d[i] > max_distance && s[i] < speed_threshold && c[i] < cos_angle_threshold,
            );
        }
        0
    }

    unsafe extern "C" fn ref_cull_batch_by_type(
        distances: *const f64,
        speeds: *const f64,
        cos_angles: *const f64,
        kind_codes: *const u32,
        len: usize,
        thresholds: *const f64,
        code_count: usize,
        out: *mut u8,
    ) -> i32 {
        if code_count == 0 {
            return 1;
        }
        let d = std::slice::from_raw_parts(distances, len);
        let s = std::slice::from_raw_parts(speeds, len);
        let c = std::slice::from_raw_parts(cos_angles, len);
        let codes = std::slice::from_raw_parts(kind_codes, len);
        let th = std::slice::from_raw_parts(thresholds, code_count * 3);
        let out = std::slice::from_raw_parts_mut(out, len);
        for i in 0..len {
            // Out-of-range codes fall back to tuple 0, like the software path
            let code = codes[i] as usize;
            let base = if code < code_count { code * 3 } else { 0 };
            out[i] =
                u8::from(d[i] > th[base] && s[i] < th[base + 1] && c[i] < th[base + 2]);
        }
        0
    }

    unsafe extern "C" fn failing_batch(
        _distances: *const f64,
        _speeds: *const f64,
        _cos_angles: *const f64,
        _len: usize,
        _max_distance: f64,
        _speed_threshold: f64,
        _cos_angle_threshold: f64,
        _out: *mut u8,
    ) -> i32 {
        7
    }

    fn reference_accel() -> AcceleratedClassifier {
        AcceleratedClassifier::new(AccelLibrary::from_raw(
            PathBuf::from("reference"),
            ref_should_cull,
            ref_cull_batch,
            ref_cull_batch_by_type,
        ))
    }

    /// Batch spanning the cull/keep boundary on every axis
    fn boundary_batch() -> (Vec<f64>, Vec<f64>, Vec<f64>) {
        let mut distances = Vec::new();
        let mut speeds = Vec::new();
        let mut cos_angles = Vec::new();
        for &d in &[40.0, 48.0, 48.001, 60.0] {
            for &s in &[0.0, 0.049, 0.05, 0.2] {
                for &c in &[-0.5, 0.249, 0.25, 0.9] {
                    distances.push(d);
                    speeds.push(s);
                    cos_angles.push(c);
                }
            }
        }
        (distances, speeds, cos_angles)
    }

    fn run(
        classifier: &mut dyn Classifier,
        request: &BatchRequest<'_>,
    ) -> Vec<bool> {
        let mut out = vec![false; request.len()];
        classifier.classify_batch(request, &mut out).unwrap();
        out
    }

    #[test]
    fn test_matches_software_on_default_thresholds() {
        let table = ThresholdTable::from_config(&CullingConfig::default());
        let (distances, speeds, cos_angles) = boundary_batch();
        let kind_codes = vec![0u32; distances.len()];
        let request = BatchRequest {
            distances: &distances,
            speeds: &speeds,
            cos_angles: &cos_angles,
            kind_codes: &kind_codes,
            thresholds: table.by_code(),
        };

        let software = run(&mut SoftwareClassifier, &request);
        let accelerated = run(&mut reference_accel(), &request);
        assert_eq!(software, accelerated);
        assert!(software.contains(&true) && software.contains(&false));
    }

    #[test]
    fn test_matches_software_with_type_overrides() {
        let mut config = CullingConfig::default();
        config.type_thresholds.insert(
            "BAT".to_string(),
            TypeThresholdConfig {
                max_distance: Some(24.0),
                speed_threshold: None,
                cos_angle_threshold: Some(0.5),
            },
        );
        let table = ThresholdTable::from_config(&config);
        assert!(table.has_overrides());

        let (distances, speeds, cos_angles) = boundary_batch();
        // Cycle through default, the override, and an unknown code
        let kind_codes: Vec<u32> = (0..distances.len() as u32)
            .map(|i| [0, 1, 99][(i % 3) as usize])
            .collect();
        let request = BatchRequest {
            distances: &distances,
            speeds: &speeds,
            cos_angles: &cos_angles,
            kind_codes: &kind_codes,
            thresholds: table.by_code(),
        };

        let software = run(&mut SoftwareClassifier, &request);
        let accelerated = run(&mut reference_accel(), &request);
        assert_eq!(software, accelerated);
    }

    #[test]
    fn test_nonzero_status_discards_batch() {
        let mut classifier = AcceleratedClassifier::new(AccelLibrary::from_raw(
            PathBuf::from("failing"),
            ref_should_cull,
            failing_batch,
            ref_cull_batch_by_type,
        ));
        let table = ThresholdTable::from_config(&CullingConfig::default());
        let request = BatchRequest {
            distances: &[60.0],
            speeds: &[0.01],
            cos_angles: &[-0.5],
            kind_codes: &[0],
            thresholds: table.by_code(),
        };
        let mut out = [false; 1];
        assert!(matches!(
            classifier.classify_batch(&request, &mut out),
            Err(ClassifyError::Accelerator(7))
        ));
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let table = ThresholdTable::from_config(&CullingConfig::default());
        let request = BatchRequest {
            distances: &[60.0, 40.0],
            speeds: &[0.01],
            cos_angles: &[-0.5, -0.5],
            kind_codes: &[0, 0],
            thresholds: table.by_code(),
        };
        let mut out = [false; 2];
        assert!(matches!(
            reference_accel().classify_batch(&request, &mut out),
            Err(ClassifyError::LengthMismatch)
        ));
    }

    #[test]
    fn test_empty_batch_is_ok() {
        let table = ThresholdTable::from_config(&CullingConfig::default());
        let request = BatchRequest {
            distances: &[],
            speeds: &[],
            cos_angles: &[],
            kind_codes: &[],
            thresholds: table.by_code(),
        };
        let mut out = [false; 0];
        assert!(reference_accel().classify_batch(&request, &mut out).is_ok());
    }
}
