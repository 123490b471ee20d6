//! # quantcheck
//!
//! A conformance harness for quantized tensor operators. A textual program
//! is compiled under three shape-specialization variants (static, partially
//! dynamic, fully dynamic), executed on every backend in an explicit set,
//! and each backend's outputs are judged against an independent f64
//! reference computation.
//!
//! The crate is the user-facing facade: test-case assembly, the execution
//! matrix, the oracle, and reporting. Core vocabulary types (descriptors,
//! programs, values, the reference math) live in `quantcheck-core`; the CPU
//! interpreter backends live in `quantcheck-cpu`.
//!
//! ```no_run
//! use quantcheck::prelude::*;
//!
//! fn run() -> quantcheck::Result<()> {
//!     let program = Program::parse(
//!         "@program { name: \"dequantize_s_int8_scalar_scaled\"; }\n\
//!          @signature {\n\
//!              input x: 4xqi8_X;\n\
//!              input scale: f32_X;\n\
//!              input zero_point: f32_X;\n\
//!              output y: f32_X;\n\
//!          }\n\
//!          @body { y = dequantize(x, scale, zero_point); }",
//!     )?;
//!     let backends = supported_cpu_backends();
//!     let ok = check_conformance(
//!         &program,
//!         &backends,
//!         3,
//!         1,
//!         &["4xqi8_X", "f32_X", "f32_X"],
//!         &["f32_X"],
//!         &[vec![-128.0, -1.0, 0.0, 127.0], vec![0.5], vec![1.0]],
//!     )?;
//!     assert!(ok);
//!     Ok(())
//! }
//! ```

pub mod harness;
pub mod report;

pub use harness::matrix::{ArtifactCache, ExecutionMatrix, ExecutionResult};
pub use harness::oracle::Tolerance;
pub use harness::selector::{
    emit_variants, specialize_descriptor, specialize_descriptors, specialize_program,
    ErasurePolicy,
};
pub use harness::{
    check_conformance, resolve_channel_axis, Harness, HarnessConfig, TestCase,
};
pub use report::{BackendStatus, BackendVerdict, CaseVerdict, Mismatch, SuiteReport};

pub use quantcheck_core::{
    dequantize_reference, parse_descriptor, quantize_reference, Backend, BackendFailure,
    CompiledProgram, DType, Dim, Error, Placement, Program, ProgramVariant, QuantizationParams,
    Result, Shape, TensorDescriptor, TensorValue,
};
pub use quantcheck_cpu::{supported_cpu_backends, CpuBackend, ParallelCpuBackend};

pub mod prelude {
    //! The common imports for writing conformance suites.
    pub use crate::harness::{check_conformance, Harness, HarnessConfig, TestCase};
    pub use crate::harness::selector::{emit_variants, ErasurePolicy};
    pub use crate::report::{BackendStatus, CaseVerdict, SuiteReport};
    pub use crate::Tolerance;
    pub use quantcheck_core::{
        parse_descriptor, Backend, DType, Program, ProgramVariant, Shape, TensorDescriptor,
        TensorValue,
    };
    pub use quantcheck_cpu::supported_cpu_backends;
}
