//! # quantcheck-core
//!
//! Core types for the quantcheck conformance harness.
//!
//! This crate provides:
//! - [`TensorDescriptor`] and the descriptor token grammar ([`parse_descriptor`])
//! - [`DType`] — element types, including quantized-integer tags
//! - [`Shape`] — concrete shapes, strides, element counts
//! - [`QuantizationParams`] and the reference (de)quantization formulas
//! - [`Program`] — the textual program format (signature + one-op body)
//! - [`ProgramVariant`] — the shape-specialization axis
//! - [`Backend`] trait — the uniform capability interface backends implement
//!
//! Everything here is backend-agnostic; the reference computation in
//! [`quant`] deliberately shares no code with any backend so the oracle
//! never validates a backend against itself.

pub mod backend;
pub mod descriptor;
pub mod dtype;
pub mod error;
pub mod program;
pub mod quant;
pub mod shape;
pub mod value;
pub mod variant;

pub use backend::{Backend, BackendFailure, CompiledProgram};
pub use descriptor::{parse_descriptor, Dim, Placement, TensorDescriptor};
pub use dtype::{DType, DTypeKind, WithDType};
pub use error::{Error, Result};
pub use program::{AttrValue, Program, Statement};
pub use quant::{dequantize_reference, quantize_reference, QuantizationParams};
pub use shape::Shape;
pub use value::TensorValue;
pub use variant::ProgramVariant;
