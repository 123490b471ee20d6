// Harness behavior tests: fail-fast validation, failure isolation, and
// reporting, using stub backends alongside the real CPU interpreter.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use quantcheck::prelude::*;
use quantcheck::{
    BackendFailure, BackendVerdict, CompiledProgram, CpuBackend, Error, Harness, Mismatch,
    TensorValue,
};

const SCALAR_SCALED: &str = r#"
@program { name: "dequantize_s_int8_scalar_scaled"; }
@signature {
    input x: 4xqi8_X;
    input scale: f32_X;
    input zero_point: f32_X;
    output y: f32_X;
}
@body {
    y = dequantize(x, scale, zero_point);
}
"#;

fn scalar_case() -> TestCase {
    TestCase::new(Program::parse(SCALAR_SCALED).unwrap(), ProgramVariant::Static)
        .input_token("4xqi8_X", &[-128.0, -1.0, 0.0, 127.0])
        .unwrap()
        .input_token("f32_X", &[0.5])
        .unwrap()
        .input_token("f32_X", &[1.0])
        .unwrap()
        .expect_output_token("f32_X")
        .unwrap()
}

fn verdict_for<'a>(verdicts: &'a [BackendVerdict], backend: &str) -> &'a BackendVerdict {
    verdicts
        .iter()
        .find(|v| v.backend == backend)
        .unwrap_or_else(|| panic!("no verdict for {backend}"))
}

// Stub backends

#[derive(Debug, Default)]
struct CountingBackend {
    compiles: AtomicUsize,
}

impl Backend for CountingBackend {
    fn name(&self) -> &str {
        "counting"
    }

    fn supports(&self, op: &str, _variant: ProgramVariant) -> bool {
        op == "dequantize"
    }

    fn compile(
        &self,
        program: &Program,
        variant: ProgramVariant,
    ) -> Result<Arc<dyn CompiledProgram>, BackendFailure> {
        self.compiles.fetch_add(1, Ordering::SeqCst);
        CpuBackend.compile(program, variant)
    }
}

#[derive(Debug)]
struct BrokenProgram;

impl CompiledProgram for BrokenProgram {
    fn execute(&self, _inputs: &[TensorValue]) -> Result<Vec<TensorValue>, BackendFailure> {
        Err(BackendFailure::Runtime("synthetic fault".to_string()))
    }
}

#[derive(Debug)]
struct BrokenBackend;

impl Backend for BrokenBackend {
    fn name(&self) -> &str {
        "broken"
    }

    fn supports(&self, _op: &str, _variant: ProgramVariant) -> bool {
        true
    }

    fn compile(
        &self,
        _program: &Program,
        _variant: ProgramVariant,
    ) -> Result<Arc<dyn CompiledProgram>, BackendFailure> {
        Ok(Arc::new(BrokenProgram))
    }
}

#[derive(Debug)]
struct NarrowBackend;

impl Backend for NarrowBackend {
    fn name(&self) -> &str {
        "narrow"
    }

    fn supports(&self, _op: &str, _variant: ProgramVariant) -> bool {
        false
    }

    fn compile(
        &self,
        _program: &Program,
        _variant: ProgramVariant,
    ) -> Result<Arc<dyn CompiledProgram>, BackendFailure> {
        Err(BackendFailure::Unsupported("nothing at all".to_string()))
    }
}

#[derive(Debug)]
struct StalledProgram;

impl CompiledProgram for StalledProgram {
    fn execute(&self, inputs: &[TensorValue]) -> Result<Vec<TensorValue>, BackendFailure> {
        thread::sleep(Duration::from_secs(10));
        Ok(inputs.to_vec())
    }
}

#[derive(Debug)]
struct StalledBackend;

impl Backend for StalledBackend {
    fn name(&self) -> &str {
        "stalled"
    }

    fn supports(&self, _op: &str, _variant: ProgramVariant) -> bool {
        true
    }

    fn compile(
        &self,
        _program: &Program,
        _variant: ProgramVariant,
    ) -> Result<Arc<dyn CompiledProgram>, BackendFailure> {
        Ok(Arc::new(StalledProgram))
    }
}

// Tests

#[test]
fn test_configuration_error_precedes_backend_work() {
    // A non-positive scale aborts the case before any backend compiles.
    let counting = Arc::new(CountingBackend::default());
    let backends: Vec<Arc<dyn Backend>> = vec![counting.clone()];

    let case = TestCase::new(Program::parse(SCALAR_SCALED).unwrap(), ProgramVariant::Static)
        .input_token("4xqi8_X", &[-128.0, -1.0, 0.0, 127.0])
        .unwrap()
        .input_token("f32_X", &[-255.0])
        .unwrap()
        .input_token("f32_X", &[127.0])
        .unwrap()
        .expect_output_token("f32_X")
        .unwrap();

    let err = Harness::new(HarnessConfig::default())
        .run_case(&case, &backends)
        .unwrap_err();
    assert!(matches!(err, Error::NonPositiveScale { channel: 0, .. }));
    assert_eq!(counting.compiles.load(Ordering::SeqCst), 0);
}

#[test]
fn test_empty_backend_set_is_an_error() {
    let err = Harness::new(HarnessConfig::default())
        .run_case(&scalar_case(), &[])
        .unwrap_err();
    assert!(matches!(err, Error::EmptyBackendSet));
}

#[test]
fn test_backend_failure_is_isolated() {
    let backends: Vec<Arc<dyn Backend>> = vec![Arc::new(CpuBackend), Arc::new(BrokenBackend)];
    let verdict = Harness::new(HarnessConfig::default())
        .run_case(&scalar_case(), &backends)
        .unwrap();

    assert!(!verdict.passed);
    assert!(verdict_for(&verdict.backends, "cpu").passed());
    match &verdict_for(&verdict.backends, "broken").status {
        BackendStatus::Failed { reason } => assert!(reason.contains("synthetic fault")),
        other => panic!("unexpected status: {other:?}"),
    }
}

#[test]
fn test_unsupported_backend_does_not_fail_the_case() {
    let backends: Vec<Arc<dyn Backend>> = vec![Arc::new(CpuBackend), Arc::new(NarrowBackend)];
    let verdict = Harness::new(HarnessConfig::default())
        .run_case(&scalar_case(), &backends)
        .unwrap();

    assert!(verdict.passed);
    assert!(matches!(
        verdict_for(&verdict.backends, "narrow").status,
        BackendStatus::Unsupported { .. }
    ));
}

#[test]
fn test_timeout_is_contained_and_counts_against() {
    let backends: Vec<Arc<dyn Backend>> = vec![Arc::new(StalledBackend), Arc::new(CpuBackend)];
    let config = HarnessConfig::default().with_timeout(Duration::from_millis(50));
    let verdict = Harness::new(config).run_case(&scalar_case(), &backends).unwrap();

    assert!(!verdict.passed);
    assert!(matches!(
        verdict_for(&verdict.backends, "stalled").status,
        BackendStatus::TimedOut { timeout_ms: 50 }
    ));
    assert!(verdict_for(&verdict.backends, "cpu").passed());
}

#[test]
fn test_parallel_matrix_agrees_with_sequential() {
    let backends = supported_cpu_backends();
    let sequential = Harness::new(HarnessConfig::default())
        .run_case(&scalar_case(), &backends)
        .unwrap();
    let parallel = Harness::new(HarnessConfig::default().with_parallel(true))
        .run_case(&scalar_case(), &backends)
        .unwrap();

    assert!(sequential.passed && parallel.passed);
    let order = |v: &CaseVerdict| v.backends.iter().map(|b| b.backend.clone()).collect::<Vec<_>>();
    assert_eq!(order(&sequential), order(&parallel));
}

#[test]
fn test_variant_mismatch_rejected() {
    let mut case = scalar_case();
    case.variant = ProgramVariant::FullyDynamic;
    let err = Harness::new(HarnessConfig::default())
        .run_case(&case, &supported_cpu_backends())
        .unwrap_err();
    assert!(matches!(err, Error::VariantMismatch { .. }));
}

#[test]
fn test_input_count_mismatch_rejected() {
    let case = TestCase::new(Program::parse(SCALAR_SCALED).unwrap(), ProgramVariant::Static)
        .input_token("4xqi8_X", &[1.0, 2.0, 3.0, 4.0])
        .unwrap()
        .expect_output_token("f32_X")
        .unwrap();
    let err = Harness::new(HarnessConfig::default())
        .run_case(&case, &supported_cpu_backends())
        .unwrap_err();
    assert!(matches!(
        err,
        Error::InputCountMismatch {
            declared: 3,
            supplied: 1
        }
    ));
}

#[test]
fn test_signature_mismatch_names_the_input() {
    // Value dtype disagrees with the declared descriptor.
    let case = TestCase::new(Program::parse(SCALAR_SCALED).unwrap(), ProgramVariant::Static)
        .input_token("4xqui8_X", &[1.0, 2.0, 3.0, 4.0])
        .unwrap()
        .input_token("f32_X", &[0.5])
        .unwrap()
        .input_token("f32_X", &[1.0])
        .unwrap()
        .expect_output_token("f32_X")
        .unwrap();
    let err = Harness::new(HarnessConfig::default())
        .run_case(&case, &supported_cpu_backends())
        .unwrap_err();
    match err {
        Error::SignatureMismatch { kind, index, .. } => {
            assert_eq!(kind, "input");
            assert_eq!(index, 0);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_mismatching_backend_produces_element_mismatch() {
    #[derive(Debug)]
    struct OffByOneProgram;

    impl CompiledProgram for OffByOneProgram {
        fn execute(&self, inputs: &[TensorValue]) -> Result<Vec<TensorValue>, BackendFailure> {
            // Correct shape and dtype, every element nudged a full step.
            let compiled = CpuBackend
                .compile(&Program::parse(SCALAR_SCALED).expect("parse"), ProgramVariant::Static)?;
            let out = compiled.execute(inputs)?;
            let shifted: Vec<f64> = out[0].data().iter().map(|v| v + 0.5).collect();
            let value =
                TensorValue::from_f64_slice(&shifted, out[0].shape().clone(), out[0].dtype())
                    .map_err(|e| BackendFailure::Runtime(e.to_string()))?;
            Ok(vec![value])
        }
    }

    #[derive(Debug)]
    struct OffByOneBackend;

    impl Backend for OffByOneBackend {
        fn name(&self) -> &str {
            "off-by-one"
        }

        fn supports(&self, _op: &str, _variant: ProgramVariant) -> bool {
            true
        }

        fn compile(
            &self,
            _program: &Program,
            _variant: ProgramVariant,
        ) -> Result<Arc<dyn CompiledProgram>, BackendFailure> {
            Ok(Arc::new(OffByOneProgram))
        }
    }

    let backends: Vec<Arc<dyn Backend>> = vec![Arc::new(OffByOneBackend)];
    let verdict = Harness::new(HarnessConfig::default())
        .run_case(&scalar_case(), &backends)
        .unwrap();

    assert!(!verdict.passed);
    match &verdict.backends[0].status {
        BackendStatus::Mismatch {
            detail: Mismatch::Element { output, index, expected, actual },
        } => {
            assert_eq!((*output, *index), (0, 0));
            assert!((actual - expected - 0.5).abs() < 1e-9);
        }
        other => panic!("unexpected status: {other:?}"),
    }
}

#[test]
fn test_check_conformance_entry_point() {
    let program = Program::parse(SCALAR_SCALED).unwrap();
    let backends = supported_cpu_backends();

    let ok = quantcheck::check_conformance(
        &program,
        &backends,
        3,
        1,
        &["4xqi8_X", "f32_X", "f32_X"],
        &["f32_X"],
        &[vec![-128.0, -1.0, 0.0, 127.0], vec![0.5], vec![1.0]],
    )
    .unwrap();
    assert!(ok);

    // Stated counts must agree with the slices.
    let err = quantcheck::check_conformance(
        &program,
        &backends,
        2,
        1,
        &["4xqi8_X", "f32_X", "f32_X"],
        &["f32_X"],
        &[vec![0.0; 4], vec![0.5], vec![1.0]],
    )
    .unwrap_err();
    assert!(matches!(err, Error::InputCountMismatch { .. }));
}

#[test]
fn test_suite_report_serializes_run() {
    let backends = supported_cpu_backends();
    let harness = Harness::new(HarnessConfig::default());

    let mut report = SuiteReport::new();
    report.push(harness.run_case(&scalar_case(), &backends).unwrap());

    let failing: Vec<Arc<dyn Backend>> = vec![Arc::new(BrokenBackend)];
    report.push(harness.run_case(&scalar_case(), &failing).unwrap());

    assert!(!report.passed());
    assert_eq!(report.failed_cases().count(), 1);

    let json = report.to_json().unwrap();
    assert!(json.contains("\"passed\": true"));
    assert!(json.contains("\"status\": \"failed\""));
    assert!(json.contains("dequantize_s_int8_scalar_scaled"));
}
