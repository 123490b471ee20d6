//! The conformance harness: test-case assembly, fail-fast validation, the
//! execution matrix, and the oracle verdict.
//!
//! A case runs in a fixed order. Configuration is validated completely
//! before any backend is touched; the reference result is computed once in
//! f64; the backend set then runs and each backend's outputs are judged
//! against the reference. Parse and configuration errors abort the case as
//! `Err`; backend failures never do.

use std::sync::Arc;
use std::time::Duration;

use quantcheck_core::{
    bail, dequantize_reference, Backend, Error, Program, ProgramVariant, QuantizationParams,
    Result, Shape, TensorDescriptor, TensorValue,
};

use crate::report::CaseVerdict;

pub mod matrix;
pub mod oracle;
pub mod selector;

use matrix::ExecutionMatrix;
use oracle::Tolerance;
use selector::{specialize_descriptor, ErasurePolicy};

/// Harness-wide knobs, all defaulted for a plain CPU conformance run.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Oracle tolerance for element comparison.
    pub tolerance: Tolerance,
    /// Per-backend wall-clock bound. `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// Run the backend set on one thread per backend.
    pub parallel: bool,
    /// Which dims the partially-dynamic variant erases.
    pub erasure: ErasurePolicy,
    /// Cache compiled artifacts across cases.
    pub cache_artifacts: bool,
    /// Require the program signature to equal the erased case descriptors
    /// exactly. When relaxed, the program may declare extra dynamic dims as
    /// long as it accepts the concrete inputs.
    pub strict_signature: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            tolerance: Tolerance::default(),
            timeout: None,
            parallel: false,
            erasure: ErasurePolicy::default(),
            cache_artifacts: false,
            strict_signature: true,
        }
    }
}

impl HarnessConfig {
    pub fn with_tolerance(mut self, tolerance: Tolerance) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_erasure(mut self, erasure: ErasurePolicy) -> Self {
        self.erasure = erasure;
        self
    }

    pub fn with_artifact_cache(mut self, cache: bool) -> Self {
        self.cache_artifacts = cache;
        self
    }

    pub fn with_strict_signature(mut self, strict: bool) -> Self {
        self.strict_signature = strict;
        self
    }
}

/// One conformance case: a program, the variant it targets, concrete input
/// values with their declared (static) descriptors, and the expected output
/// declarations.
#[derive(Debug, Clone)]
pub struct TestCase {
    pub program: Program,
    pub variant: ProgramVariant,
    pub inputs: Vec<(TensorDescriptor, TensorValue)>,
    pub expected_outputs: Vec<TensorDescriptor>,
    /// Explicit channel axis, overriding the program attribute and the
    /// unique-dimension inference.
    pub channel_axis: Option<usize>,
}

impl TestCase {
    pub fn new(program: Program, variant: ProgramVariant) -> Self {
        Self {
            program,
            variant,
            inputs: Vec::new(),
            expected_outputs: Vec::new(),
            channel_axis: None,
        }
    }

    /// Append an input with an already-built descriptor and value.
    pub fn input(mut self, descriptor: TensorDescriptor, value: TensorValue) -> Self {
        self.inputs.push((descriptor, value));
        self
    }

    /// Append an input from a descriptor token and a flat buffer. The token
    /// must be fully static so the buffer's shape is unambiguous.
    pub fn input_token(self, token: &str, values: &[f64]) -> Result<Self> {
        let descriptor = quantcheck_core::parse_descriptor(token)?;
        let shape = descriptor
            .concrete_shape()
            .ok_or_else(|| Error::msg(format!("input token `{token}` must be fully static")))?;
        let value = TensorValue::from_f64_slice(values, shape, descriptor.dtype)?;
        Ok(self.input(descriptor, value))
    }

    /// Declare an expected output.
    pub fn expect_output(mut self, descriptor: TensorDescriptor) -> Self {
        self.expected_outputs.push(descriptor);
        self
    }

    /// Declare an expected output from a descriptor token.
    pub fn expect_output_token(self, token: &str) -> Result<Self> {
        Ok(self.expect_output(quantcheck_core::parse_descriptor(token)?))
    }

    pub fn with_channel_axis(mut self, axis: usize) -> Self {
        self.channel_axis = Some(axis);
        self
    }
}

/// Drives a case through validation, reference, matrix, and oracle.
pub struct Harness {
    config: HarnessConfig,
    matrix: ExecutionMatrix,
}

impl Harness {
    pub fn new(config: HarnessConfig) -> Self {
        let matrix = ExecutionMatrix::new(config.timeout, config.parallel, config.cache_artifacts);
        Self { config, matrix }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// The artifact cache, when `cache_artifacts` is enabled.
    pub fn artifact_cache(&self) -> Option<&matrix::ArtifactCache> {
        self.matrix.cache()
    }

    /// Run one case across the backend set and fold the results into a
    /// verdict. Errors returned here are parse/configuration errors; backend
    /// failures are inside the verdict.
    pub fn run_case(&self, case: &TestCase, backends: &[Arc<dyn Backend>]) -> Result<CaseVerdict> {
        if backends.is_empty() {
            return Err(Error::EmptyBackendSet);
        }
        self.validate_case(case)?;

        let op = self.resolve_operator(case)?;
        let params = self.resolve_params(case, &op)?;
        params.validate(case.inputs[op.data].1.shape())?;

        let reference = vec![dequantize_reference(&case.inputs[op.data].1, &params)?];
        self.check_expected_shapes(case, &reference)?;

        let input_values: Vec<TensorValue> =
            case.inputs.iter().map(|(_, v)| v.clone()).collect();
        let results = self.matrix.run(
            backends,
            &case.program,
            case.variant,
            &op.name,
            &input_values,
        );
        let verdicts = oracle::judge(
            &results,
            &reference,
            &case.expected_outputs,
            self.config.tolerance,
        );
        Ok(CaseVerdict::new(
            case.program.name.clone(),
            case.variant,
            verdicts,
        ))
    }

    // Everything below runs before any backend is touched.

    fn validate_case(&self, case: &TestCase) -> Result<()> {
        if let Some(embedded) = case.program.variant() {
            if embedded != case.variant {
                return Err(Error::VariantMismatch {
                    program: case.program.name.clone(),
                    embedded,
                    requested: case.variant,
                });
            }
        }

        let declared_inputs = case.program.inputs.len();
        if declared_inputs != case.inputs.len() {
            return Err(Error::InputCountMismatch {
                declared: declared_inputs,
                supplied: case.inputs.len(),
            });
        }
        let declared_outputs = case.program.outputs.len();
        if declared_outputs != case.expected_outputs.len() {
            return Err(Error::OutputCountMismatch {
                declared: declared_outputs,
                supplied: case.expected_outputs.len(),
            });
        }

        // Each supplied value must satisfy its own case descriptor, and the
        // erased case descriptor must line up with the program's signature.
        for (index, ((_, declared), (case_desc, value))) in case
            .program
            .inputs
            .iter()
            .zip(&case.inputs)
            .enumerate()
        {
            if case_desc.dtype != value.dtype() || !case_desc.accepts(value.shape()) {
                return Err(Error::SignatureMismatch {
                    kind: "input",
                    index,
                    declared: case_desc.to_string(),
                    supplied: describe_value(value),
                });
            }
            let erased = specialize_descriptor(case_desc, case.variant, &self.config.erasure);
            let compatible = if self.config.strict_signature {
                declared.dims == erased.dims && declared.dtype == erased.dtype
            } else {
                declared.dtype == case_desc.dtype && declared.accepts(value.shape())
            };
            if !compatible {
                return Err(Error::SignatureMismatch {
                    kind: "input",
                    index,
                    declared: declared.to_string(),
                    supplied: erased.to_string(),
                });
            }
        }

        for (index, ((_, declared), expected)) in case
            .program
            .outputs
            .iter()
            .zip(&case.expected_outputs)
            .enumerate()
        {
            let dtype_ok = declared.dtype == expected.dtype;
            // Rank-0 on either side constrains dtype only.
            let dims_ok = declared.is_scalar()
                || expected.is_scalar()
                || declared.rank() == expected.rank();
            if !dtype_ok || !dims_ok {
                return Err(Error::SignatureMismatch {
                    kind: "output",
                    index,
                    declared: declared.to_string(),
                    supplied: expected.to_string(),
                });
            }
        }
        Ok(())
    }

    fn resolve_operator(&self, case: &TestCase) -> Result<OperatorRoles> {
        let stmt = match case.program.body.as_slice() {
            [stmt] => stmt,
            [] => bail!("program `{}` has an empty body", case.program.name),
            _ => bail!(
                "program `{}` has more than one statement; single-op bodies only",
                case.program.name
            ),
        };
        if stmt.op != "dequantize" {
            bail!("no reference implementation for operator `{}`", stmt.op);
        }
        let [data, scale, zero_point] = stmt.args.as_slice() else {
            bail!(
                "`dequantize` takes (data, scale, zero_point), got {} operands",
                stmt.args.len()
            );
        };
        let index_of = |operand: &str| {
            case.program.input_index(operand).ok_or_else(|| {
                Error::msg(format!(
                    "operand `{operand}` is not a declared input of `{}`",
                    case.program.name
                ))
            })
        };
        let roles = OperatorRoles {
            name: stmt.op.clone(),
            data: index_of(data)?,
            scale: index_of(scale)?,
            zero_point: index_of(zero_point)?,
            attr_axis: match stmt.attr("axis") {
                Some(value) => Some(value.as_usize().ok_or_else(|| {
                    Error::msg(format!("`axis` attribute must be a non-negative integer, got {value:?}"))
                })?),
                None => None,
            },
        };

        // Quantized data, float scale/zero-point/output.
        let data_dtype = case.inputs[roles.data].1.dtype();
        if !data_dtype.is_quantized() {
            bail!("`dequantize` data must be a quantized dtype, got {data_dtype}");
        }
        for (role, index) in [("scale", roles.scale), ("zero_point", roles.zero_point)] {
            let dtype = case.inputs[index].1.dtype();
            if !dtype.is_float() {
                bail!("`dequantize` {role} must be a float dtype, got {dtype}");
            }
        }
        for expected in &case.expected_outputs {
            if !expected.dtype.is_float() {
                bail!("`dequantize` output must be a float dtype, got {}", expected.dtype);
            }
        }
        Ok(roles)
    }

    fn resolve_params(&self, case: &TestCase, op: &OperatorRoles) -> Result<QuantizationParams> {
        let scales = case.inputs[op.scale].1.data().to_vec();
        let zero_points = case.inputs[op.zero_point].1.data().to_vec();
        let data_shape = case.inputs[op.data].1.shape();
        let axis = resolve_channel_axis(
            data_shape,
            scales.len(),
            case.channel_axis.or(op.attr_axis),
        )?;
        Ok(QuantizationParams {
            scales,
            zero_points,
            axis,
        })
    }

    fn check_expected_shapes(&self, case: &TestCase, reference: &[TensorValue]) -> Result<()> {
        for (index, (expected, value)) in
            case.expected_outputs.iter().zip(reference).enumerate()
        {
            if !expected.is_scalar() && !expected.accepts(value.shape()) {
                return Err(Error::SignatureMismatch {
                    kind: "output",
                    index,
                    declared: expected.to_string(),
                    supplied: describe_value(value),
                });
            }
        }
        Ok(())
    }
}

struct OperatorRoles {
    name: String,
    data: usize,
    scale: usize,
    zero_point: usize,
    attr_axis: Option<usize>,
}

/// Resolve the channel axis for a given channel count.
///
/// An explicit axis always wins (and is range/size checked). Otherwise one
/// channel means per-tensor and no axis; several channels require exactly
/// one data dimension of matching size, anything else is a configuration
/// error the caller must disambiguate.
pub fn resolve_channel_axis(
    shape: &Shape,
    channels: usize,
    explicit: Option<usize>,
) -> Result<Option<usize>> {
    if let Some(axis) = explicit {
        if axis >= shape.rank() {
            return Err(Error::ChannelAxisOutOfRange {
                axis,
                shape: shape.clone(),
            });
        }
        if channels > 1 && shape.dims()[axis] != channels {
            bail!(
                "channel axis {} of shape {} has size {}, expected {} channels",
                axis,
                shape,
                shape.dims()[axis],
                channels
            );
        }
        return Ok(Some(axis));
    }
    if channels <= 1 {
        return Ok(None);
    }
    let candidates: Vec<usize> = shape
        .dims()
        .iter()
        .enumerate()
        .filter(|(_, &d)| d == channels)
        .map(|(i, _)| i)
        .collect();
    match candidates.as_slice() {
        [axis] => Ok(Some(*axis)),
        [] => Err(Error::NoChannelAxis {
            shape: shape.clone(),
            channels,
        }),
        _ => Err(Error::AmbiguousChannelAxis {
            shape: shape.clone(),
            channels,
            candidates,
        }),
    }
}

fn describe_value(value: &TensorValue) -> String {
    TensorDescriptor::new(value.shape().dims().to_vec(), value.dtype()).to_string()
}

/// One-call conformance entry point for fixture-style invocations.
///
/// Builds a default-configured harness, binds `input_values` to the
/// descriptor tokens in order, and reduces the verdict to a single boolean.
/// The count arguments are redundant with the slice lengths on purpose:
/// fixtures state them explicitly and a disagreement is a fixture bug.
#[allow(clippy::too_many_arguments)]
pub fn check_conformance(
    program: &Program,
    backends: &[Arc<dyn Backend>],
    num_inputs: usize,
    num_outputs: usize,
    input_descriptors: &[&str],
    output_descriptors: &[&str],
    input_values: &[Vec<f64>],
) -> Result<bool> {
    if input_descriptors.len() != num_inputs {
        return Err(Error::InputCountMismatch {
            declared: num_inputs,
            supplied: input_descriptors.len(),
        });
    }
    if input_values.len() != num_inputs {
        return Err(Error::InputCountMismatch {
            declared: num_inputs,
            supplied: input_values.len(),
        });
    }
    if output_descriptors.len() != num_outputs {
        return Err(Error::OutputCountMismatch {
            declared: num_outputs,
            supplied: output_descriptors.len(),
        });
    }

    let variant = program.variant().unwrap_or(ProgramVariant::Static);
    let mut case = TestCase::new(program.clone(), variant);
    for (token, values) in input_descriptors.iter().zip(input_values) {
        case = case.input_token(token, values)?;
    }
    for token in output_descriptors {
        case = case.expect_output_token(token)?;
    }

    let harness = Harness::new(HarnessConfig::default());
    Ok(harness.run_case(&case, backends)?.passed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_channel_axis_per_tensor() {
        let shape = Shape::new(vec![2, 3, 4, 5]);
        assert_eq!(resolve_channel_axis(&shape, 1, None).unwrap(), None);
        // Explicit axis is honored in per-tensor mode too.
        assert_eq!(resolve_channel_axis(&shape, 1, Some(1)).unwrap(), Some(1));
    }

    #[test]
    fn test_resolve_channel_axis_unique_inference() {
        let shape = Shape::new(vec![2, 3, 4, 5]);
        assert_eq!(resolve_channel_axis(&shape, 3, None).unwrap(), Some(1));
        assert_eq!(resolve_channel_axis(&shape, 5, None).unwrap(), Some(3));
    }

    #[test]
    fn test_resolve_channel_axis_no_match() {
        let shape = Shape::new(vec![2, 3, 4, 5]);
        assert!(matches!(
            resolve_channel_axis(&shape, 7, None),
            Err(Error::NoChannelAxis { .. })
        ));
    }

    #[test]
    fn test_resolve_channel_axis_ambiguous() {
        let shape = Shape::new(vec![3, 3, 4]);
        match resolve_channel_axis(&shape, 3, None) {
            Err(Error::AmbiguousChannelAxis { candidates, .. }) => {
                assert_eq!(candidates, vec![0, 1]);
            }
            other => panic!("unexpected: {other:?}"),
        }
        // An explicit axis disambiguates.
        assert_eq!(resolve_channel_axis(&shape, 3, Some(0)).unwrap(), Some(0));
    }

    #[test]
    fn test_resolve_channel_axis_explicit_out_of_range() {
        let shape = Shape::new(vec![2, 3]);
        assert!(matches!(
            resolve_channel_axis(&shape, 3, Some(4)),
            Err(Error::ChannelAxisOutOfRange { .. })
        ));
        // Explicit axis whose dim disagrees with the channel count.
        assert!(resolve_channel_axis(&shape, 3, Some(0)).is_err());
    }
}
