use std::sync::Arc;

use rayon::prelude::*;

use quantcheck_core::{
    Backend, BackendFailure, CompiledProgram, DType, Program, ProgramVariant, Shape,
    TensorDescriptor, TensorValue,
};

// CPU interpreter backends
//
// Two reference backends that interpret the one-op program body directly:
// a scalar interpreter ("cpu") and a rayon-parallel one ("cpu-parallel").
// Both validate the plan at compile time and check concrete inputs against
// the possibly-dynamic compiled signature at bind time, so a shape bug that
// only manifests under dynamic specialization has somewhere to surface.
//
// The kernels compute in f32 — the precision a production CPU kernel would
// use — while the harness reference runs in f64; the oracle's tolerance
// absorbs exactly that rounding gap.

/// Scalar CPU interpreter backend.
#[derive(Debug, Clone, Default)]
pub struct CpuBackend;

/// Rayon-parallel CPU interpreter backend. Same plan as [`CpuBackend`],
/// element loop split across the thread pool.
#[derive(Debug, Clone, Default)]
pub struct ParallelCpuBackend;

/// The explicit stand-in for a "supported CPU backends" list: every backend
/// configuration a CPU-only conformance run should exercise.
pub fn supported_cpu_backends() -> Vec<Arc<dyn Backend>> {
    vec![Arc::new(CpuBackend), Arc::new(ParallelCpuBackend)]
}

impl Backend for CpuBackend {
    fn name(&self) -> &str {
        "cpu"
    }

    fn supports(&self, op: &str, _variant: ProgramVariant) -> bool {
        op == "dequantize"
    }

    fn compile(
        &self,
        program: &Program,
        variant: ProgramVariant,
    ) -> Result<Arc<dyn CompiledProgram>, BackendFailure> {
        Ok(Arc::new(DequantizePlan::build(program, variant, false)?))
    }
}

impl Backend for ParallelCpuBackend {
    fn name(&self) -> &str {
        "cpu-parallel"
    }

    fn supports(&self, op: &str, _variant: ProgramVariant) -> bool {
        op == "dequantize"
    }

    fn compile(
        &self,
        program: &Program,
        variant: ProgramVariant,
    ) -> Result<Arc<dyn CompiledProgram>, BackendFailure> {
        Ok(Arc::new(DequantizePlan::build(program, variant, true)?))
    }
}

// DequantizePlan — the compiled artifact

/// Validated execution plan for a dequantize program.
#[derive(Debug)]
struct DequantizePlan {
    /// Declared input types, possibly with dynamic dims, in declared order.
    signature: Vec<TensorDescriptor>,
    data_idx: usize,
    scale_idx: usize,
    zero_point_idx: usize,
    /// Channel axis from the body attribute, if stated.
    axis: Option<usize>,
    output_dtype: DType,
    parallel: bool,
}

impl DequantizePlan {
    fn build(
        program: &Program,
        _variant: ProgramVariant,
        parallel: bool,
    ) -> Result<Self, BackendFailure> {
        let compile_err = |msg: String| BackendFailure::Compile(msg);

        let stmt = match program.body.as_slice() {
            [stmt] => stmt,
            other => {
                return Err(compile_err(format!(
                    "expected a single-statement body, got {} statements",
                    other.len()
                )))
            }
        };
        if stmt.op != "dequantize" {
            return Err(BackendFailure::Unsupported(format!(
                "op `{}` is not implemented by this backend",
                stmt.op
            )));
        }
        if stmt.args.len() != 3 {
            return Err(compile_err(format!(
                "dequantize takes 3 operands (data, scale, zero_point), got {}",
                stmt.args.len()
            )));
        }

        let operand = |name: &str| {
            program
                .input_index(name)
                .ok_or_else(|| compile_err(format!("unknown operand `{}`", name)))
        };
        let data_idx = operand(&stmt.args[0])?;
        let scale_idx = operand(&stmt.args[1])?;
        let zero_point_idx = operand(&stmt.args[2])?;

        let signature = program.input_descriptors();
        let data_desc = &signature[data_idx];
        if !data_desc.dtype.is_quantized() {
            return Err(compile_err(format!(
                "dequantize data operand must be quantized, got {}",
                data_desc.dtype
            )));
        }
        for idx in [scale_idx, zero_point_idx] {
            if !signature[idx].dtype.is_float() {
                return Err(compile_err(format!(
                    "scale/zero-point operands must be float, got {}",
                    signature[idx].dtype
                )));
            }
        }

        let output_dtype = program
            .outputs
            .iter()
            .find(|(name, _)| *name == stmt.result)
            .map(|(_, desc)| desc.dtype)
            .ok_or_else(|| compile_err(format!("result `{}` is not an output", stmt.result)))?;
        if !output_dtype.is_float() {
            return Err(compile_err(format!(
                "dequantize output must be float, got {}",
                output_dtype
            )));
        }

        let axis = match stmt.attr("axis") {
            None => None,
            Some(value) => {
                let axis = value.as_usize().ok_or_else(|| {
                    compile_err(format!("axis attribute must be a non-negative integer, got {:?}", value))
                })?;
                // Rank survives erasure, so this check holds for every variant.
                if axis >= data_desc.rank() {
                    return Err(compile_err(format!(
                        "axis {} out of range for rank-{} data",
                        axis,
                        data_desc.rank()
                    )));
                }
                Some(axis)
            }
        };

        Ok(Self {
            signature,
            data_idx,
            scale_idx,
            zero_point_idx,
            axis,
            output_dtype,
            parallel,
        })
    }

    /// Resolve the channel axis against the concrete data shape.
    fn resolve_axis(
        &self,
        shape: &Shape,
        channels: usize,
    ) -> Result<Option<usize>, BackendFailure> {
        if channels == 1 {
            return Ok(None);
        }
        if let Some(axis) = self.axis {
            if shape.dims().get(axis).copied() != Some(channels) {
                return Err(BackendFailure::Runtime(format!(
                    "axis {} of shape {} does not have {} channels",
                    axis, shape, channels
                )));
            }
            return Ok(Some(axis));
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
            [] => Err(BackendFailure::Runtime(format!(
                "no dimension of shape {} matches {} channels",
                shape, channels
            ))),
            many => Err(BackendFailure::Runtime(format!(
                "ambiguous channel axis: dimensions {:?} of shape {} all have {} channels",
                many, shape, channels
            ))),
        }
    }
}

impl CompiledProgram for DequantizePlan {
    fn execute(&self, inputs: &[TensorValue]) -> Result<Vec<TensorValue>, BackendFailure> {
        let runtime_err = |msg: String| BackendFailure::Runtime(msg);

        if inputs.len() != self.signature.len() {
            return Err(runtime_err(format!(
                "expected {} inputs, got {}",
                self.signature.len(),
                inputs.len()
            )));
        }
        // Bind-time check of concrete values against the compiled signature.
        for (i, (value, declared)) in inputs.iter().zip(&self.signature).enumerate() {
            if value.dtype() != declared.dtype {
                return Err(runtime_err(format!(
                    "input {} dtype {} does not match declared {}",
                    i,
                    value.dtype(),
                    declared.dtype
                )));
            }
            if !declared.accepts(value.shape()) {
                return Err(runtime_err(format!(
                    "input {} shape {} does not satisfy declared `{}`",
                    i,
                    value.shape(),
                    declared
                )));
            }
        }

        let data = &inputs[self.data_idx];
        let scales = inputs[self.scale_idx].data();
        let zero_points = inputs[self.zero_point_idx].data();
        if scales.len() != zero_points.len() {
            return Err(runtime_err(format!(
                "{} scales vs {} zero points",
                scales.len(),
                zero_points.len()
            )));
        }
        if scales.is_empty() {
            return Err(runtime_err("empty scale tensor".to_string()));
        }

        let shape = data.shape().clone();
        let axis = self.resolve_axis(&shape, scales.len())?;
        let (stride, dim) = match axis {
            Some(a) => (shape.stride_contiguous()[a], shape.dims()[a]),
            None => (1, 1),
        };

        let kernel = |(i, &q): (usize, &f64)| -> f64 {
            let ch = if dim > 1 { (i / stride) % dim } else { 0 };
            let v = (q as f32 - zero_points[ch] as f32) * scales[ch] as f32;
            self.output_dtype.materialize(v as f64)
        };

        let out: Vec<f64> = if self.parallel {
            data.data().par_iter().enumerate().map(kernel).collect()
        } else {
            data.data().iter().enumerate().map(kernel).collect()
        };

        let value = TensorValue::from_f64_slice(&out, shape, self.output_dtype)
            .map_err(|e| runtime_err(e.to_string()))?;
        Ok(vec![value])
    }
}
