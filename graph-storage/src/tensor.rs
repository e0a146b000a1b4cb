//! Dense parameter tensors.

use crate::dtype::ParamDtype;
use crate::error::{Result, StorageError};

/// A named parameter's value: shape plus a contiguous row-major f32 buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamTensor {
    shape: Vec<usize>,
    data: Vec<f32>,
    dtype: ParamDtype,
}

impl ParamTensor {
    /// Create an f32 tensor, checking that the buffer matches the shape.
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Result<Self> {
        Self::with_dtype(shape, data, ParamDtype::F32)
    }

    /// Create a tensor that will be written back as `dtype`.
    pub fn with_dtype(shape: Vec<usize>, data: Vec<f32>, dtype: ParamDtype) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(StorageError::BufferSize {
                shape,
                expected,
                got: data.len(),
            });
        }
        Ok(Self { shape, data, dtype })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn dtype(&self) -> ParamDtype {
        self.dtype
    }

    /// Total number of elements.
    pub fn numel(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Flattened values.
    pub fn values(&self) -> &[f32] {
        &self.data
    }

    /// Mutable flattened values. Shape cannot change through this view.
    pub fn values_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Number of non-zero elements.
    pub fn nnz(&self) -> usize {
        self.data.iter().filter(|&&v| v != 0.0).count()
    }

    /// Iterate over the contiguous slices along axis 0 (one per output filter).
    pub fn outer_slices(&self) -> impl Iterator<Item = &[f32]> {
        let stride = self.shape.iter().skip(1).product::<usize>().max(1);
        self.data.chunks(stride)
    }

    /// Remove the given indices along `axis`, shrinking that dimension.
    ///
    /// Indices may be unsorted; duplicates count once. At least one entry must
    /// remain along the axis.
    pub fn remove_along(&mut self, axis: usize, indices: &[usize]) -> Result<()> {
        let rank = self.shape.len();
        if axis >= rank {
            return Err(StorageError::InvalidAxis { axis, rank });
        }

        let size = self.shape[axis];
        let mut removed = vec![false; size];
        for &index in indices {
            if index >= size {
                return Err(StorageError::IndexOutOfRange { index, size });
            }
            removed[index] = true;
        }

        let keep: Vec<usize> = (0..size).filter(|&i| !removed[i]).collect();
        if keep.is_empty() {
            return Err(StorageError::EmptyAxis { axis, size });
        }
        if keep.len() == size {
            return Ok(());
        }

        let outer: usize = self.shape[..axis].iter().product();
        let inner: usize = self.shape[axis + 1..].iter().product();

        let mut data = Vec::with_capacity(outer * keep.len() * inner);
        for o in 0..outer {
            let base = o * size * inner;
            for &k in &keep {
                let start = base + k * inner;
                data.extend_from_slice(&self.data[start..start + inner]);
            }
        }

        self.shape[axis] = keep.len();
        self.data = data;
        Ok(())
    }
}
