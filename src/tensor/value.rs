//! Runtime tensor flowing through hooked operator calls

use super::{Dtype, QParams, TensorInfo};
use crate::{Error, Result};
use ndarray::{Array1, ArrayD, Axis, IxDyn};

/// Host tensor stand-in carrying a precision tag and provenance
///
/// Quantized tensors keep their integer codes in `f32` storage together with
/// the scale/zero-point needed to map them back.
#[derive(Clone, Debug, PartialEq)]
pub struct Tensor {
    data: ArrayD<f32>,
    dtype: Dtype,
    qparams: Option<QParams>,
    info: Option<TensorInfo>,
}

impl Tensor {
    /// Create a float tensor from an n-dimensional array
    pub fn new(data: ArrayD<f32>) -> Self {
        Self {
            data,
            dtype: Dtype::Float32,
            qparams: None,
            info: None,
        }
    }

    /// Create a 1-D float tensor from a vector
    pub fn from_vec(data: Vec<f32>) -> Self {
        Self::new(Array1::from(data).into_dyn())
    }

    /// Create a float tensor with an explicit shape
    pub fn from_shape_vec(shape: &[usize], data: Vec<f32>) -> Result<Self> {
        let array = ArrayD::from_shape_vec(IxDyn(shape), data)
            .map_err(|e| Error::InvalidParameter(format!("bad tensor shape {shape:?}: {e}")))?;
        Ok(Self::new(array))
    }

    /// Create a float tensor filled with zeros
    pub fn zeros(shape: &[usize]) -> Self {
        Self::new(ArrayD::zeros(IxDyn(shape)))
    }

    pub fn data(&self) -> &ArrayD<f32> {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut ArrayD<f32> {
        &mut self.data
    }

    pub fn dtype(&self) -> Dtype {
        self.dtype
    }

    pub fn is_quantized(&self) -> bool {
        self.dtype.is_quantized()
    }

    /// Scale/zero-point of a quantized tensor
    pub fn qparams(&self) -> Option<&QParams> {
        self.qparams.as_ref()
    }

    /// Provenance descriptor attached during tracing
    pub fn info(&self) -> Option<&TensorInfo> {
        self.info.as_ref()
    }

    pub fn set_info(&mut self, info: TensorInfo) {
        self.info = Some(info);
    }

    pub fn with_info(mut self, info: TensorInfo) -> Self {
        self.info = Some(info);
        self
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Values as a flat slice when the storage is contiguous
    pub fn as_slice(&self) -> Option<&[f32]> {
        self.data.as_slice()
    }

    /// Quantize a float tensor to `dtype` with the given parameters.
    ///
    /// Per-channel parameters map onto axis 0 and must match its length.
    pub fn quantize(&self, qparams: &QParams, dtype: Dtype) -> Result<Tensor> {
        let range = dtype.quant_range(false).ok_or_else(|| {
            Error::InvalidParameter(format!("cannot quantize to non-quantized dtype {dtype}"))
        })?;
        self.quantize_in_range(qparams, dtype, range)
    }

    /// Like [`quantize`](Self::quantize), clamping codes to `range`, the
    /// integer range the parameters were fitted for
    pub fn quantize_in_range(
        &self,
        qparams: &QParams,
        dtype: Dtype,
        range: (i64, i64),
    ) -> Result<Tensor> {
        let (qmin, qmax) = range;
        match dtype.quant_range(false) {
            Some((lo, hi)) if lo <= qmin && qmin < qmax && qmax <= hi => {}
            _ => {
                return Err(Error::InvalidParameter(format!(
                    "range [{qmin}, {qmax}] is not a valid code range of {dtype}"
                )))
            }
        }
        if self.is_quantized() {
            return self.dequantize().quantize_in_range(qparams, dtype, range);
        }

        let mut data = self.data.clone();
        let quantize_value = |x: f32, scale: f32, zp: i64| -> f32 {
            let q = (x / scale).round() as i64 + zp;
            q.clamp(qmin, qmax) as f32
        };

        if qparams.is_per_channel() {
            let channels = data.shape().first().copied().unwrap_or(0);
            if data.ndim() == 0 || channels != qparams.num_channels() {
                return Err(Error::InvalidParameter(format!(
                    "per-channel qparams with {} channels do not fit shape {:?}",
                    qparams.num_channels(),
                    data.shape()
                )));
            }
            for (c, mut lane) in data.axis_iter_mut(Axis(0)).enumerate() {
                let (scale, zp) = qparams.channel(c);
                lane.mapv_inplace(|x| quantize_value(x, scale, zp));
            }
        } else {
            let (scale, zp) = qparams.channel(0);
            data.mapv_inplace(|x| quantize_value(x, scale, zp));
        }

        Ok(Tensor {
            data,
            dtype,
            qparams: Some(qparams.clone()),
            info: self.info,
        })
    }

    /// Map a quantized tensor back to float precision. Float tensors are
    /// returned unchanged.
    pub fn dequantize(&self) -> Tensor {
        let Some(qparams) = self.qparams.as_ref().filter(|_| self.is_quantized()) else {
            return self.clone();
        };

        let mut data = self.data.clone();
        if qparams.is_per_channel() && data.ndim() > 0 {
            for (c, mut lane) in data.axis_iter_mut(Axis(0)).enumerate() {
                let (scale, zp) = qparams.channel(c);
                lane.mapv_inplace(|q| (q - zp as f32) * scale);
            }
        } else {
            let (scale, zp) = qparams.channel(0);
            data.mapv_inplace(|q| (q - zp as f32) * scale);
        }

        Tensor {
            data,
            dtype: Dtype::Float32,
            qparams: None,
            info: self.info,
        }
    }

    /// Whether this tensor is already quantized exactly as requested
    pub fn is_quantized_as(&self, qparams: &QParams, dtype: Dtype) -> bool {
        self.dtype == dtype && self.qparams.as_ref() == Some(qparams)
    }
}
