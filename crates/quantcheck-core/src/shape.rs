use std::fmt;

// Shape — concrete n-dimensional shape
//
// A Shape describes the size of each dimension of an actual tensor buffer.
// Dimensions are always concrete here; a descriptor's dynamic dimensions
// (see `descriptor::Dim`) are resolved to a Shape before any buffer exists.
//
//   - Scalar: Shape([])        — 0 dimensions, 1 element
//   - Vector: Shape([5])       — 1 dimension, 5 elements
//   - Batch:  Shape([2, 3, 4]) — 3 dimensions, 24 elements
//
// Zero-sized dimensions are legal: Shape([0, 3]) holds 0 elements and flows
// through the harness like any other shape.

/// Concrete n-dimensional shape of a tensor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Shape(Vec<usize>);

impl Shape {
    /// Create a new shape from a vector of dimension sizes.
    pub fn new(dims: Vec<usize>) -> Self {
        Shape(dims)
    }

    /// Scalar shape (0 dimensions, 1 element).
    pub fn scalar() -> Self {
        Shape(Vec::new())
    }

    /// The dimension sizes as a slice.
    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    /// Number of dimensions (0 for scalar).
    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// Total number of elements (product of all dimensions).
    /// A scalar shape [] has 1 element; any zero-sized dimension gives 0.
    pub fn elem_count(&self) -> usize {
        self.0.iter().product()
    }

    /// Compute the contiguous (row-major / C-order) strides for this shape.
    ///
    /// For shape [2, 3, 4], strides are [12, 4, 1]: moving one step in dim 0
    /// jumps 12 elements, one step in the last dimension is contiguous.
    pub fn stride_contiguous(&self) -> Vec<usize> {
        let mut strides = vec![0usize; self.rank()];
        if self.rank() > 0 {
            strides[self.rank() - 1] = 1;
            for i in (0..self.rank() - 1).rev() {
                strides[i] = strides[i + 1] * self.0[i + 1];
            }
        }
        strides
    }

    /// Size of a specific dimension.
    pub fn dim(&self, d: usize) -> crate::Result<usize> {
        self.0.get(d).copied().ok_or(crate::Error::DimOutOfRange {
            dim: d,
            rank: self.rank(),
        })
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", d)?;
        }
        write!(f, "]")
    }
}

impl From<Vec<usize>> for Shape {
    fn from(v: Vec<usize>) -> Self {
        Shape(v)
    }
}

impl From<&[usize]> for Shape {
    fn from(s: &[usize]) -> Self {
        Shape(s.to_vec())
    }
}
