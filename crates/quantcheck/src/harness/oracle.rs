use serde::Serialize;

use quantcheck_core::{BackendFailure, TensorDescriptor, TensorValue};

use crate::harness::matrix::ExecutionResult;
use crate::report::{BackendStatus, BackendVerdict, Mismatch};

// Conformance oracle
//
// Judges each backend's outputs against the independently computed f64
// reference. The envelope is checked first (output count, shape, dtype),
// then elements; the first disagreement is recorded and judging of that
// backend stops. Shape is judged exactly against the reference result, so a
// dtype-only output declaration still pins the shape.

/// Mixed absolute/relative tolerance: `|actual - expected|` must not exceed
/// `atol + rtol * |expected|`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Tolerance {
    pub atol: f64,
    pub rtol: f64,
}

impl Tolerance {
    pub fn new(atol: f64, rtol: f64) -> Self {
        Self { atol, rtol }
    }

    /// Exact equality, NaN-aware.
    pub fn exact() -> Self {
        Self::new(0.0, 0.0)
    }

    /// Whether `actual` is an acceptable rendition of `expected`.
    /// NaN matches only NaN; infinities must match exactly in sign.
    pub fn accepts(&self, expected: f64, actual: f64) -> bool {
        if expected.is_nan() || actual.is_nan() {
            return expected.is_nan() && actual.is_nan();
        }
        if expected.is_infinite() || actual.is_infinite() {
            return expected == actual;
        }
        (actual - expected).abs() <= self.atol + self.rtol * expected.abs()
    }
}

impl Default for Tolerance {
    /// Wide enough to absorb an f32 backend rounding against the f64
    /// reference, tight enough to catch any off-by-one-step error.
    fn default() -> Self {
        Self::new(1e-5, 1e-5)
    }
}

/// Judge every backend result against the reference outputs.
///
/// `expected` carries the declared output descriptors; a rank-0 declaration
/// constrains dtype only.
pub fn judge(
    results: &[ExecutionResult],
    reference: &[TensorValue],
    expected: &[TensorDescriptor],
    tolerance: Tolerance,
) -> Vec<BackendVerdict> {
    results
        .iter()
        .map(|r| judge_result(r, reference, expected, tolerance))
        .collect()
}

/// Judge one backend's result.
pub fn judge_result(
    result: &ExecutionResult,
    reference: &[TensorValue],
    expected: &[TensorDescriptor],
    tolerance: Tolerance,
) -> BackendVerdict {
    let status = match &result.outcome {
        Ok(outputs) => match compare_outputs(outputs, reference, expected, tolerance) {
            None => BackendStatus::Passed,
            Some(detail) => BackendStatus::Mismatch { detail },
        },
        Err(BackendFailure::Timeout(timeout)) => BackendStatus::TimedOut {
            timeout_ms: timeout.as_millis() as u64,
        },
        Err(failure) if failure.is_unsupported() => BackendStatus::Unsupported {
            reason: failure.to_string(),
        },
        Err(failure) => BackendStatus::Failed {
            reason: failure.to_string(),
        },
    };
    BackendVerdict::new(result.backend.clone(), status, result.elapsed)
}

fn compare_outputs(
    outputs: &[TensorValue],
    reference: &[TensorValue],
    expected: &[TensorDescriptor],
    tolerance: Tolerance,
) -> Option<Mismatch> {
    if outputs.len() != reference.len() {
        return Some(Mismatch::OutputCount {
            expected: reference.len(),
            got: outputs.len(),
        });
    }
    for (i, (got, want)) in outputs.iter().zip(reference).enumerate() {
        if got.shape() != want.shape() {
            return Some(Mismatch::Shape {
                output: i,
                expected: want.shape().dims().to_vec(),
                got: got.shape().dims().to_vec(),
            });
        }
        if let Some(desc) = expected.get(i) {
            if got.dtype() != desc.dtype {
                return Some(Mismatch::DType {
                    output: i,
                    expected: desc.dtype.to_string(),
                    got: got.dtype().to_string(),
                });
            }
        }
        for (index, (&actual, &expected)) in got.data().iter().zip(want.data()).enumerate() {
            if !tolerance.accepts(expected, actual) {
                return Some(Mismatch::Element {
                    output: i,
                    index,
                    expected,
                    actual,
                });
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use quantcheck_core::{parse_descriptor, DType, Shape};
    use std::time::Duration;

    fn value(data: &[f64], dims: Vec<usize>, dtype: DType) -> TensorValue {
        TensorValue::from_f64_slice(data, Shape::new(dims), dtype).unwrap()
    }

    fn result_of(outcome: Result<Vec<TensorValue>, BackendFailure>) -> ExecutionResult {
        ExecutionResult {
            backend: "cpu".to_string(),
            outcome,
            elapsed: Duration::from_millis(1),
        }
    }

    fn f32_out() -> Vec<TensorDescriptor> {
        vec![parse_descriptor("f32_X").unwrap()]
    }

    #[test]
    fn test_tolerance_absorbs_f32_rounding() {
        let tol = Tolerance::default();
        let expected = -64770.0_f64; // (-127 - 127) * 255
        let actual = (-64770.0_f32) as f64;
        assert!(tol.accepts(expected, actual));
        // A full quantization step out is never acceptable.
        assert!(!tol.accepts(expected, expected + 255.0));
    }

    #[test]
    fn test_tolerance_nan_and_infinity() {
        let tol = Tolerance::default();
        assert!(tol.accepts(f64::NAN, f64::NAN));
        assert!(!tol.accepts(f64::NAN, 0.0));
        assert!(!tol.accepts(0.0, f64::NAN));
        assert!(tol.accepts(f64::INFINITY, f64::INFINITY));
        assert!(!tol.accepts(f64::INFINITY, f64::NEG_INFINITY));
        assert!(!tol.accepts(f64::INFINITY, 1e300));
    }

    #[test]
    fn test_pass_within_tolerance() {
        let reference = vec![value(&[1.0, 2.0], vec![2], DType::F64)];
        let outputs = vec![value(&[1.000001, 2.0], vec![2], DType::F32)];
        let verdict = judge_result(
            &result_of(Ok(outputs)),
            &reference,
            &f32_out(),
            Tolerance::default(),
        );
        assert_eq!(verdict.status, BackendStatus::Passed);
    }

    #[test]
    fn test_first_element_mismatch_is_recorded() {
        let reference = vec![value(&[1.0, 2.0, 3.0], vec![3], DType::F64)];
        let outputs = vec![value(&[1.0, 9.0, 8.0], vec![3], DType::F32)];
        let verdict = judge_result(
            &result_of(Ok(outputs)),
            &reference,
            &f32_out(),
            Tolerance::default(),
        );
        match verdict.status {
            BackendStatus::Mismatch {
                detail: Mismatch::Element { output, index, expected, actual },
            } => {
                assert_eq!((output, index), (0, 1));
                assert_eq!((expected, actual), (2.0, 9.0));
            }
            other => panic!("unexpected status: {other:?}"),
        }
    }

    #[test]
    fn test_shape_is_judged_against_reference() {
        // The declared output is dtype-only, the reference shape still binds.
        let reference = vec![value(&[1.0, 2.0], vec![2, 1], DType::F64)];
        let outputs = vec![value(&[1.0, 2.0], vec![2], DType::F32)];
        let verdict = judge_result(
            &result_of(Ok(outputs)),
            &reference,
            &f32_out(),
            Tolerance::default(),
        );
        assert!(matches!(
            verdict.status,
            BackendStatus::Mismatch {
                detail: Mismatch::Shape { .. }
            }
        ));
    }

    #[test]
    fn test_wrong_output_dtype() {
        let reference = vec![value(&[1.0], vec![1], DType::F64)];
        let outputs = vec![value(&[1.0], vec![1], DType::F64)];
        let verdict = judge_result(
            &result_of(Ok(outputs)),
            &reference,
            &f32_out(),
            Tolerance::default(),
        );
        assert!(matches!(
            verdict.status,
            BackendStatus::Mismatch {
                detail: Mismatch::DType { .. }
            }
        ));
    }

    #[test]
    fn test_failures_map_to_statuses() {
        let reference = vec![value(&[1.0], vec![1], DType::F64)];
        let cases = [
            (
                BackendFailure::Unsupported("no qi16".into()),
                BackendStatus::Unsupported {
                    reason: "unsupported: no qi16".into(),
                },
            ),
            (
                BackendFailure::Compile("bad body".into()),
                BackendStatus::Failed {
                    reason: "compilation failed: bad body".into(),
                },
            ),
            (
                BackendFailure::Timeout(Duration::from_millis(250)),
                BackendStatus::TimedOut { timeout_ms: 250 },
            ),
        ];
        for (failure, want) in cases {
            let verdict = judge_result(
                &result_of(Err(failure)),
                &reference,
                &f32_out(),
                Tolerance::default(),
            );
            assert_eq!(verdict.status, want);
        }
    }
}
