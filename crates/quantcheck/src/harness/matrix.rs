use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use quantcheck_core::{Backend, BackendFailure, CompiledProgram, Program, ProgramVariant, TensorValue};

// Execution matrix
//
// Runs one (program, variant) pair across the whole backend set and records
// a result per backend. Backend failures are contained: a compile error,
// crash, or timeout on one backend becomes data in that backend's slot and
// the remaining backends still run.

/// What one backend produced for one case.
#[derive(Debug)]
pub struct ExecutionResult {
    pub backend: String,
    pub outcome: Result<Vec<TensorValue>, BackendFailure>,
    pub elapsed: Duration,
}

/// Cache of compiled artifacts keyed by (program, variant, backend).
///
/// Artifacts are immutable and side-effect-free, so sharing one across test
/// cases is sound; the cache only retains successful compilations.
#[derive(Default)]
pub struct ArtifactCache {
    entries: Mutex<HashMap<(String, ProgramVariant, String), Arc<dyn CompiledProgram>>>,
}

impl ArtifactCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<(String, ProgramVariant, String), Arc<dyn CompiledProgram>>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn get_or_compile(
        &self,
        backend: &dyn Backend,
        program: &Program,
        variant: ProgramVariant,
    ) -> Result<Arc<dyn CompiledProgram>, BackendFailure> {
        let key = (
            program.name.clone(),
            variant,
            backend.name().to_string(),
        );
        if let Some(hit) = self.lock().get(&key) {
            return Ok(Arc::clone(hit));
        }
        // Compile outside the lock; a duplicate compile on a race is harmless.
        let compiled = backend.compile(program, variant)?;
        self.lock().insert(key, Arc::clone(&compiled));
        Ok(compiled)
    }
}

/// Runs the backend set for the harness, either sequentially or with one
/// thread per backend. Owns the per-backend timeout policy and the optional
/// artifact cache.
pub struct ExecutionMatrix {
    timeout: Option<Duration>,
    parallel: bool,
    cache: Option<ArtifactCache>,
}

impl ExecutionMatrix {
    pub fn new(timeout: Option<Duration>, parallel: bool, cache_artifacts: bool) -> Self {
        Self {
            timeout,
            parallel,
            cache: cache_artifacts.then(ArtifactCache::new),
        }
    }

    pub fn cache(&self) -> Option<&ArtifactCache> {
        self.cache.as_ref()
    }

    /// Run every backend on the same program and inputs. Results come back
    /// in backend-set order regardless of execution interleaving.
    pub fn run(
        &self,
        backends: &[Arc<dyn Backend>],
        program: &Program,
        variant: ProgramVariant,
        op: &str,
        inputs: &[TensorValue],
    ) -> Vec<ExecutionResult> {
        if self.parallel && backends.len() > 1 {
            thread::scope(|scope| {
                let handles: Vec<_> = backends
                    .iter()
                    .map(|backend| {
                        scope.spawn(move || self.run_one(backend.as_ref(), program, variant, op, inputs))
                    })
                    .collect();
                handles
                    .into_iter()
                    .zip(backends)
                    .map(|(handle, backend)| {
                        handle.join().unwrap_or_else(|_| ExecutionResult {
                            backend: backend.name().to_string(),
                            outcome: Err(BackendFailure::Runtime(
                                "backend thread panicked".to_string(),
                            )),
                            elapsed: Duration::ZERO,
                        })
                    })
                    .collect()
            })
        } else {
            backends
                .iter()
                .map(|backend| self.run_one(backend.as_ref(), program, variant, op, inputs))
                .collect()
        }
    }

    fn run_one(
        &self,
        backend: &dyn Backend,
        program: &Program,
        variant: ProgramVariant,
        op: &str,
        inputs: &[TensorValue],
    ) -> ExecutionResult {
        let start = Instant::now();
        let outcome = self.run_inner(backend, program, variant, op, inputs);
        ExecutionResult {
            backend: backend.name().to_string(),
            outcome,
            elapsed: start.elapsed(),
        }
    }

    fn run_inner(
        &self,
        backend: &dyn Backend,
        program: &Program,
        variant: ProgramVariant,
        op: &str,
        inputs: &[TensorValue],
    ) -> Result<Vec<TensorValue>, BackendFailure> {
        // Capability gate: an unsupported backend never sees the program.
        if !backend.supports(op, variant) {
            return Err(BackendFailure::Unsupported(format!(
                "{} does not support `{}` under {}",
                backend.name(),
                op,
                variant
            )));
        }

        let compiled = match &self.cache {
            Some(cache) => cache.get_or_compile(backend, program, variant)?,
            None => backend.compile(program, variant)?,
        };

        match self.timeout {
            Some(timeout) => execute_with_timeout(compiled, inputs.to_vec(), timeout),
            None => {
                // A panicking backend is a contained runtime failure, not a
                // harness abort.
                panic::catch_unwind(AssertUnwindSafe(|| compiled.execute(inputs)))
                    .unwrap_or_else(|_| {
                        Err(BackendFailure::Runtime("backend panicked".to_string()))
                    })
            }
        }
    }
}

/// Execute on a worker thread and give up after `timeout`.
///
/// The worker is detached on timeout: it may finish later, but its send goes
/// to a dropped receiver and the result is discarded.
fn execute_with_timeout(
    compiled: Arc<dyn CompiledProgram>,
    inputs: Vec<TensorValue>,
    timeout: Duration,
) -> Result<Vec<TensorValue>, BackendFailure> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(compiled.execute(&inputs));
    });
    match rx.recv_timeout(timeout) {
        Ok(outcome) => outcome,
        Err(RecvTimeoutError::Timeout) => Err(BackendFailure::Timeout(timeout)),
        Err(RecvTimeoutError::Disconnected) => Err(BackendFailure::Runtime(
            "backend thread panicked".to_string(),
        )),
    }
}
