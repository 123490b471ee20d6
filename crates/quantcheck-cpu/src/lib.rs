//! # quantcheck-cpu
//!
//! Reference CPU interpreter backends for the quantcheck harness.
//!
//! Provides two implementations of the [`Backend`](quantcheck_core::Backend)
//! capability trait:
//!
//! - [`CpuBackend`] ("cpu") — scalar interpreter
//! - [`ParallelCpuBackend`] ("cpu-parallel") — same plan, rayon element loop
//!
//! plus [`supported_cpu_backends`], the explicit backend set a CPU-only
//! conformance run exercises. Both backends interpret the one-op program
//! body in f32 and are collaborator stand-ins for real backend toolchains:
//! independent enough of the f64 reference computation that the oracle has
//! something honest to judge.

pub mod interpreter;

pub use interpreter::{supported_cpu_backends, CpuBackend, ParallelCpuBackend};
