use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::program::Program;
use crate::value::TensorValue;
use crate::variant::ProgramVariant;

// Backend — uniform capability interface over execution targets
//
// Backends are capability-polymorphic, not a type hierarchy: a backend is
// anything that can say what it supports, compile a program, and execute
// the compiled artifact. New backends are added by implementing the trait.
// The backend set handed to the execution matrix is an explicitly passed
// slice of trait objects, never process-global state.

/// A failure contained within a single backend's execution.
///
/// These are data, not harness errors: the execution matrix records them in
/// the backend's result and continues with the remaining backends. A backend
/// that cannot run an operator at all reports `Unsupported`, which the
/// oracle treats as distinct from an incorrect result.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendFailure {
    /// The backend does not implement this operator or specialization mode.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Compilation of the program failed.
    #[error("compilation failed: {0}")]
    Compile(String),

    /// The compiled program crashed or rejected its inputs at run time.
    #[error("runtime failure: {0}")]
    Runtime(String),

    /// Execution exceeded the configured per-backend bound.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl BackendFailure {
    pub fn is_unsupported(&self) -> bool {
        matches!(self, BackendFailure::Unsupported(_))
    }
}

/// A compiled program artifact, ready to execute.
///
/// Executions are side-effect-free on shared state, so one artifact may be
/// executed concurrently or cached across test cases.
pub trait CompiledProgram: fmt::Debug + Send + Sync {
    /// Execute with inputs bound in declared order.
    fn execute(&self, inputs: &[TensorValue]) -> Result<Vec<TensorValue>, BackendFailure>;
}

/// The capability interface every execution target implements.
pub trait Backend: fmt::Debug + Send + Sync {
    /// A short stable identifier (e.g. "cpu", "cpu-parallel").
    fn name(&self) -> &str;

    /// Whether this backend can run the given operator under the given
    /// shape-specialization variant.
    fn supports(&self, op: &str, variant: ProgramVariant) -> bool;

    /// Compile a (possibly shape-specialized) program.
    fn compile(
        &self,
        program: &Program,
        variant: ProgramVariant,
    ) -> Result<Arc<dyn CompiledProgram>, BackendFailure>;
}
