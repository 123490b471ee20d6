use std::fmt;
use std::time::Duration;

use serde::Serialize;

use quantcheck_core::{Error, ProgramVariant, Result};

// Verdict & report types
//
// Every type here is both a structured machine artifact (serde JSON for CI)
// and a human summary (Display). Numeric fields are plain f64/usize/String
// so the JSON needs no schema beyond what serde derives.

/// How one element disagreed, or how the output envelope disagreed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Mismatch {
    OutputCount {
        expected: usize,
        got: usize,
    },
    Shape {
        output: usize,
        expected: Vec<usize>,
        got: Vec<usize>,
    },
    DType {
        output: usize,
        expected: String,
        got: String,
    },
    Element {
        output: usize,
        index: usize,
        expected: f64,
        actual: f64,
    },
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mismatch::OutputCount { expected, got } => {
                write!(f, "expected {} outputs, got {}", expected, got)
            }
            Mismatch::Shape {
                output,
                expected,
                got,
            } => write!(
                f,
                "output {} shape {:?} does not match reference {:?}",
                output, got, expected
            ),
            Mismatch::DType {
                output,
                expected,
                got,
            } => write!(f, "output {} dtype {} != expected {}", output, got, expected),
            Mismatch::Element {
                output,
                index,
                expected,
                actual,
            } => write!(
                f,
                "output {} element {}: expected {}, got {}",
                output, index, expected, actual
            ),
        }
    }
}

/// Outcome for a single backend within a test case.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BackendStatus {
    /// Every output matched the reference within tolerance.
    Passed,
    /// The backend ran but disagreed with the reference.
    Mismatch { detail: Mismatch },
    /// The backend does not implement the operator or variant. Excluded
    /// from the aggregate verdict, recorded informationally.
    Unsupported { reason: String },
    /// Compilation or execution failed.
    Failed { reason: String },
    /// Execution exceeded the configured bound.
    TimedOut { timeout_ms: u64 },
}

/// Per-backend verdict with wall-clock timing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackendVerdict {
    pub backend: String,
    pub status: BackendStatus,
    pub elapsed_ms: f64,
}

impl BackendVerdict {
    pub fn new(backend: impl Into<String>, status: BackendStatus, elapsed: Duration) -> Self {
        Self {
            backend: backend.into(),
            status,
            elapsed_ms: elapsed.as_secs_f64() * 1e3,
        }
    }

    /// Whether this backend matched the reference.
    pub fn passed(&self) -> bool {
        matches!(self.status, BackendStatus::Passed)
    }

    /// Whether this backend is excluded from the aggregate verdict.
    pub fn is_informational(&self) -> bool {
        matches!(self.status, BackendStatus::Unsupported { .. })
    }
}

impl fmt::Display for BackendVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<14} ", self.backend)?;
        match &self.status {
            BackendStatus::Passed => write!(f, "pass")?,
            BackendStatus::Mismatch { detail } => write!(f, "MISMATCH: {}", detail)?,
            BackendStatus::Unsupported { reason } => write!(f, "unsupported ({})", reason)?,
            BackendStatus::Failed { reason } => write!(f, "FAILED: {}", reason)?,
            BackendStatus::TimedOut { timeout_ms } => {
                write!(f, "TIMED OUT after {}ms", timeout_ms)?
            }
        }
        write!(f, " [{:.2}ms]", self.elapsed_ms)
    }
}

/// Aggregate verdict for one test case: the logical AND of every
/// non-informational backend verdict.
#[derive(Debug, Clone, Serialize)]
pub struct CaseVerdict {
    pub program: String,
    pub variant: String,
    pub passed: bool,
    pub backends: Vec<BackendVerdict>,
}

impl CaseVerdict {
    pub fn new(program: String, variant: ProgramVariant, backends: Vec<BackendVerdict>) -> Self {
        let passed = backends
            .iter()
            .filter(|v| !v.is_informational())
            .all(|v| v.passed());
        Self {
            program,
            variant: variant.to_string(),
            passed,
            backends,
        }
    }
}

impl fmt::Display for CaseVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} [{}] — {}",
            self.program,
            self.variant,
            if self.passed { "PASS" } else { "FAIL" }
        )?;
        for backend in &self.backends {
            writeln!(f, "  {}", backend)?;
        }
        Ok(())
    }
}

/// Aggregated case verdicts for a whole run, serializable as a CI artifact.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SuiteReport {
    pub cases: Vec<CaseVerdict>,
}

impl SuiteReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, verdict: CaseVerdict) {
        self.cases.push(verdict);
    }

    /// True iff every case passed.
    pub fn passed(&self) -> bool {
        self.cases.iter().all(|c| c.passed)
    }

    pub fn failed_cases(&self) -> impl Iterator<Item = &CaseVerdict> {
        self.cases.iter().filter(|c| !c.passed)
    }

    /// Pretty-printed JSON for CI artifacts.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::msg(e.to_string()))
    }
}

impl fmt::Display for SuiteReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let failed = self.failed_cases().count();
        writeln!(
            f,
            "{} cases, {} passed, {} failed",
            self.cases.len(),
            self.cases.len() - failed,
            failed
        )?;
        for case in &self.cases {
            write!(f, "{}", case)?;
        }
        Ok(())
    }
}
