use std::fmt;

use crate::dtype::DType;
use crate::error::{Error, Result};
use crate::shape::Shape;

// Tensor descriptor grammar
//
// The compact wire format used by test fixtures to declare a tensor's shape,
// element type, and placement:
//
//   2x3x4x5xqi8_X     rank-4, quantized int8, any placement
//   ?x3xf32_h         rank-2 with a dynamic leading dim, f32, host
//   f32_X             rank-0 scalar (or, for outputs, dtype-only)
//
// Grammar: `dim (x dim)* x type-tag [_placement]` where `dim` is an unsigned
// decimal integer or the dynamic marker `?` (`-1` is accepted as an alias).
// The quantized type tags signal that scale/zero-point tensors are supplied
// separately by the test case; they are never embedded in the token.

/// A declared dimension: a concrete size or a dynamic placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dim {
    /// Known at compile time. Zero is legal (zero-length tensors).
    Fixed(usize),
    /// Resolved at run time — matches any concrete size.
    Dynamic,
}

impl Dim {
    pub fn is_dynamic(&self) -> bool {
        matches!(self, Dim::Dynamic)
    }

    /// Check whether a concrete size satisfies this declared dimension.
    pub fn accepts(&self, size: usize) -> bool {
        match self {
            Dim::Fixed(n) => *n == size,
            Dim::Dynamic => true,
        }
    }
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dim::Fixed(n) => write!(f, "{}", n),
            Dim::Dynamic => write!(f, "?"),
        }
    }
}

/// Where a tensor lives, parsed from the descriptor suffix.
///
/// `_h` pins the tensor to the host, `_d` to the device, `_X` leaves the
/// placement to the backend. A token without a suffix defaults to `Any`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Placement {
    Host,
    Device,
    #[default]
    Any,
}

impl Placement {
    fn suffix(&self) -> &'static str {
        match self {
            Placement::Host => "h",
            Placement::Device => "d",
            Placement::Any => "X",
        }
    }
}

/// Structured form of a descriptor token: declared dims, dtype, placement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorDescriptor {
    pub dims: Vec<Dim>,
    pub dtype: DType,
    pub placement: Placement,
}

impl TensorDescriptor {
    /// Build a descriptor with concrete dimensions.
    pub fn new(dims: Vec<usize>, dtype: DType) -> Self {
        Self {
            dims: dims.into_iter().map(Dim::Fixed).collect(),
            dtype,
            placement: Placement::Any,
        }
    }

    /// Rank-0 descriptor.
    pub fn scalar(dtype: DType) -> Self {
        Self {
            dims: Vec::new(),
            dtype,
            placement: Placement::Any,
        }
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn is_scalar(&self) -> bool {
        self.dims.is_empty()
    }

    /// Whether every dimension is concrete.
    pub fn is_static(&self) -> bool {
        self.dims.iter().all(|d| !d.is_dynamic())
    }

    /// The concrete shape, if every dimension is fixed.
    pub fn concrete_shape(&self) -> Option<Shape> {
        let mut dims = Vec::with_capacity(self.dims.len());
        for d in &self.dims {
            match d {
                Dim::Fixed(n) => dims.push(*n),
                Dim::Dynamic => return None,
            }
        }
        Some(Shape::new(dims))
    }

    /// Check whether a concrete shape satisfies this declared type
    /// (same rank, every fixed dim equal, dynamic dims match anything).
    pub fn accepts(&self, shape: &Shape) -> bool {
        self.rank() == shape.rank()
            && self
                .dims
                .iter()
                .zip(shape.dims())
                .all(|(d, &s)| d.accepts(s))
    }

    /// Copy of this descriptor with the given dimension indices erased to
    /// dynamic. Indices past the rank are ignored.
    pub fn with_dynamic_dims(&self, indices: &[usize]) -> Self {
        let mut out = self.clone();
        for &i in indices {
            if i < out.dims.len() {
                out.dims[i] = Dim::Dynamic;
            }
        }
        out
    }

    /// Copy of this descriptor with every dimension erased to dynamic.
    pub fn fully_dynamic(&self) -> Self {
        let mut out = self.clone();
        for d in &mut out.dims {
            *d = Dim::Dynamic;
        }
        out
    }
}

impl fmt::Display for TensorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for d in &self.dims {
            write!(f, "{}x", d)?;
        }
        write!(f, "{}_{}", self.dtype, self.placement.suffix())
    }
}

/// Parse a descriptor token into its structured form.
///
/// Rejects empty shape segments, non-numeric dimension tokens, unknown type
/// tags, and unknown placement suffixes; the error carries the full token
/// and the byte offset of the offending segment.
pub fn parse_descriptor(token: &str) -> Result<TensorDescriptor> {
    let invalid = |offset: usize, reason: String| Error::InvalidDescriptor {
        token: token.to_string(),
        offset,
        reason,
    };

    if token.is_empty() {
        return Err(invalid(0, "empty token".to_string()));
    }

    // Split on the dimension separator, remembering each segment's offset.
    let mut segments: Vec<(usize, &str)> = Vec::new();
    let mut start = 0usize;
    for (i, ch) in token.char_indices() {
        if ch == 'x' {
            segments.push((start, &token[start..i]));
            start = i + 1;
        }
    }
    // The trailing segment is the type tag (+ optional placement suffix);
    // everything before it is a dimension.
    let (type_offset, type_part) = (start, &token[start..]);

    let mut dims = Vec::with_capacity(segments.len());
    for (offset, seg) in segments {
        if seg.is_empty() {
            return Err(invalid(offset, "empty shape segment".to_string()));
        }
        if seg == "?" || seg == "-1" {
            dims.push(Dim::Dynamic);
        } else {
            match seg.parse::<usize>() {
                Ok(n) => dims.push(Dim::Fixed(n)),
                Err(_) => {
                    return Err(invalid(
                        offset,
                        format!("non-numeric dimension `{}`", seg),
                    ))
                }
            }
        }
    }

    if type_part.is_empty() {
        return Err(invalid(type_offset, "missing type tag".to_string()));
    }

    let (tag, placement) = match type_part.rsplit_once('_') {
        Some((tag, suffix)) => {
            let placement = match suffix {
                "h" => Placement::Host,
                "d" => Placement::Device,
                "X" => Placement::Any,
                other => {
                    return Err(invalid(
                        type_offset,
                        format!("unknown placement suffix `_{}`", other),
                    ))
                }
            };
            (tag, placement)
        }
        None => (type_part, Placement::Any),
    };

    let dtype: DType = tag
        .parse()
        .map_err(|_| invalid(type_offset, format!("unknown type tag `{}`", tag)))?;

    Ok(TensorDescriptor {
        dims,
        dtype,
        placement,
    })
}
