//! Caller-owned parameter scope.

use std::collections::BTreeMap;

use crate::error::{Result, StorageError};
use crate::tensor::ParamTensor;

/// Mapping from parameter name to its tensor.
///
/// Owned by whoever loaded the model and passed by reference into the
/// pruning passes. Iteration order is by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamScope {
    tensors: BTreeMap<String, ParamTensor>,
}

impl ParamScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a parameter, returning the previous value.
    pub fn insert(&mut self, name: impl Into<String>, tensor: ParamTensor) -> Option<ParamTensor> {
        self.tensors.insert(name.into(), tensor)
    }

    pub fn get(&self, name: &str) -> Option<&ParamTensor> {
        self.tensors.get(name)
    }

    /// Like [`get`](Self::get) but a missing name is an error.
    pub fn require(&self, name: &str) -> Result<&ParamTensor> {
        self.tensors
            .get(name)
            .ok_or_else(|| StorageError::MissingParameter(name.to_string()))
    }

    /// Mutable [`require`](Self::require).
    pub fn require_mut(&mut self, name: &str) -> Result<&mut ParamTensor> {
        self.tensors
            .get_mut(name)
            .ok_or_else(|| StorageError::MissingParameter(name.to_string()))
    }

    pub fn remove(&mut self, name: &str) -> Option<ParamTensor> {
        self.tensors.remove(name)
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Total element count across all parameters.
    pub fn total_params(&self) -> usize {
        self.tensors.values().map(ParamTensor::numel).sum()
    }
}

impl FromIterator<(String, ParamTensor)> for ParamScope {
    fn from_iter<I: IntoIterator<Item = (String, ParamTensor)>>(iter: I) -> Self {
        Self {
            tensors: iter.into_iter().collect(),
        }
    }
}
