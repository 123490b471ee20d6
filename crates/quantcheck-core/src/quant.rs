use crate::bail;
use crate::dtype::DType;
use crate::error::{Error, Result};
use crate::shape::Shape;
use crate::value::TensorValue;

// Quantization model
//
// Affine quantization maps a float value to an integer grid and back:
//
//   quantize:   q = clamp(round(v / scale + zero_point), qmin, qmax)
//   dequantize: v = (q - zero_point) * scale
//
// One scale/zero-point pair covers the whole tensor (per-tensor), or a
// distinct pair applies per slice along a designated channel axis
// (per-channel). `dequantize_reference` below is the ground truth the
// conformance oracle checks compiled backends against; it deliberately
// shares no code with any backend.

/// Scale/zero-point parameters for per-tensor or per-channel quantization.
///
/// Length-1 sequences mean per-tensor; longer sequences carry one pair per
/// channel and require an axis. Zero points are kept as f64 because fixtures
/// deliver them through float tensors.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantizationParams {
    pub scales: Vec<f64>,
    pub zero_points: Vec<f64>,
    pub axis: Option<usize>,
}

impl QuantizationParams {
    /// Per-tensor parameters: a single scale/zero-point pair.
    pub fn per_tensor(scale: f64, zero_point: f64) -> Self {
        Self {
            scales: vec![scale],
            zero_points: vec![zero_point],
            axis: None,
        }
    }

    /// Per-channel parameters along `axis`.
    pub fn per_channel(scales: Vec<f64>, zero_points: Vec<f64>, axis: usize) -> Self {
        Self {
            scales,
            zero_points,
            axis: Some(axis),
        }
    }

    /// Number of channels (1 for per-tensor).
    pub fn channels(&self) -> usize {
        self.scales.len()
    }

    pub fn is_per_channel(&self) -> bool {
        self.scales.len() > 1
    }

    /// Validate the parameters against the shape of the quantized tensor.
    ///
    /// Enforces: non-empty equal-length sequences, strictly positive scales,
    /// an in-range axis whose dimension equals the channel count whenever
    /// the parameters are per-channel.
    pub fn validate(&self, shape: &Shape) -> Result<()> {
        if self.scales.is_empty() {
            bail!("quantization parameters must carry at least one scale");
        }
        if self.scales.len() != self.zero_points.len() {
            return Err(Error::ParamLengthMismatch {
                scales: self.scales.len(),
                zero_points: self.zero_points.len(),
            });
        }
        for (channel, &scale) in self.scales.iter().enumerate() {
            if !(scale > 0.0) {
                return Err(Error::NonPositiveScale { channel, scale });
            }
        }
        if self.is_per_channel() {
            let axis = self.axis.ok_or_else(|| {
                Error::msg(format!(
                    "per-channel parameters ({} channels) require a channel axis",
                    self.channels()
                ))
            })?;
            if axis >= shape.rank() {
                return Err(Error::ChannelAxisOutOfRange {
                    axis,
                    shape: shape.clone(),
                });
            }
            let dim = shape.dims()[axis];
            if dim != self.channels() {
                bail!(
                    "channel axis {} of shape {} has size {}, expected {} channels",
                    axis,
                    shape,
                    dim,
                    self.channels()
                );
            }
        } else if let Some(axis) = self.axis {
            if axis >= shape.rank() {
                return Err(Error::ChannelAxisOutOfRange {
                    axis,
                    shape: shape.clone(),
                });
            }
        }
        Ok(())
    }

    /// Selector from flat contiguous index to channel index: the element's
    /// coordinate along the channel axis, or 0 in per-tensor mode.
    pub fn channel_selector(&self, shape: &Shape) -> ChannelSelector {
        match self.axis {
            Some(axis) if self.is_per_channel() => ChannelSelector {
                stride: shape.stride_contiguous()[axis],
                dim: shape.dims()[axis],
            },
            _ => ChannelSelector { stride: 1, dim: 1 },
        }
    }
}

/// Maps a flat contiguous index to the channel it belongs to.
#[derive(Debug, Clone, Copy)]
pub struct ChannelSelector {
    stride: usize,
    dim: usize,
}

impl ChannelSelector {
    pub fn channel_of(&self, flat: usize) -> usize {
        (flat / self.stride) % self.dim
    }
}

/// Reference dequantization: `(q - zero_point) * scale` element-wise in f64.
///
/// Per-channel mode selects the pair by the element's coordinate along the
/// channel axis. Zero-length input produces zero-length output. The result
/// carries dtype F64; backends produce their declared output dtype and the
/// oracle compares values, not reference dtype.
pub fn dequantize_reference(
    data: &TensorValue,
    params: &QuantizationParams,
) -> Result<TensorValue> {
    params.validate(data.shape())?;

    let shape = data.shape();
    let select = params.channel_selector(shape);
    let out: Vec<f64> = data
        .data()
        .iter()
        .enumerate()
        .map(|(i, &q)| {
            let ch = select.channel_of(i);
            (q - params.zero_points[ch]) * params.scales[ch]
        })
        .collect();

    TensorValue::from_f64_slice(&out, shape.clone(), DType::F64)
}

/// Reference affine quantization, the inverse of `dequantize_reference`:
/// `clamp(round(v / scale + zero_point))` to the target dtype's range.
///
/// Used to validate fixture construction (round-trip within one quantization
/// step), not by the operator under test.
pub fn quantize_reference(
    values: &TensorValue,
    params: &QuantizationParams,
    target: DType,
) -> Result<TensorValue> {
    params.validate(values.shape())?;
    if !target.is_quantized() {
        bail!("quantize target must be a quantized dtype, got {}", target);
    }

    let shape = values.shape();
    let select = params.channel_selector(shape);
    let out: Vec<f64> = values
        .data()
        .iter()
        .enumerate()
        .map(|(i, &v)| {
            let ch = select.channel_of(i);
            (v / params.scales[ch] + params.zero_points[ch]).round()
        })
        .collect();

    // from_f64_slice clamps to the target's integer range via materialize
    TensorValue::from_f64_slice(&out, shape.clone(), target)
}
