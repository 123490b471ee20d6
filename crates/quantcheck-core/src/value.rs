use crate::dtype::DType;
use crate::error::{Error, Result};
use crate::shape::Shape;

// TensorValue — a concrete host buffer tagged with its descriptor info
//
// Values are stored as flat f64 in row-major order regardless of dtype; the
// dtype records what a backend buffer of this tensor would hold, and every
// value is materialized through that dtype at construction (half floats are
// rounded, integers are rounded and clamped). This makes the buffer the
// single source of truth: the reference computation and every backend see
// exactly the same numbers.

/// A concrete tensor: dtype, shape, and a flat row-major f64 buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorValue {
    dtype: DType,
    shape: Shape,
    data: Vec<f64>,
}

impl TensorValue {
    /// Create a value from a flat f64 slice, materializing each element
    /// through the dtype's storage representation.
    ///
    /// Fails with `ElementCountMismatch` if the buffer length does not match
    /// the shape's element count.
    pub fn from_f64_slice(data: &[f64], shape: impl Into<Shape>, dtype: DType) -> Result<Self> {
        let shape = shape.into();
        let expected = shape.elem_count();
        if data.len() != expected {
            return Err(Error::ElementCountMismatch {
                shape,
                expected,
                got: data.len(),
            });
        }
        let data = data.iter().map(|&v| dtype.materialize(v)).collect();
        Ok(Self { dtype, shape, data })
    }

    /// A rank-0 value holding a single element.
    pub fn scalar(value: f64, dtype: DType) -> Self {
        Self {
            dtype,
            shape: Shape::scalar(),
            data: vec![dtype.materialize(value)],
        }
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// The flat row-major buffer.
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn elem_count(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
