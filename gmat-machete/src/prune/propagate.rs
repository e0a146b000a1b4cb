//! Carries removed output channels through the graph.
//!
//! Starting at a pruned convolution's output, every consumer is visited:
//! - conv: input channels of its filter are removed, propagation stops
//! - depthwise conv: its filters (and bias) are removed, propagation continues
//! - fully connected: rows of its weight are removed, propagation stops
//! - anything else: per-channel vectors (bias, batch norm) are removed and
//!   channels pass through to its outputs
//!
//! Ops that reorder or merge the channel axis are rejected, as are ops with
//! an unrecognized matrix parameter and pass-through outputs whose channel
//! dim does not match.

use graph_storage::{Graph, ParamScope};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

use crate::error::{PruneError, Result};

/// Ops whose outputs do not keep channels on axis 1 one-to-one.
const RESHAPING_OPS: &[&str] = &[
    "concat",
    "split",
    "reshape",
    "reshape2",
    "transpose",
    "transpose2",
    "flatten",
    "flatten2",
    "flatten_contiguous_range",
];

/// Record of which (variable, axis) pairs have lost which indices.
#[derive(Debug, Default)]
pub(crate) struct ChannelTracker {
    pruned: HashMap<(String, usize), Vec<usize>>,
}

impl ChannelTracker {
    pub(crate) fn is_pruned(&self, name: &str, axis: usize) -> bool {
        self.pruned.contains_key(&(name.to_string(), axis))
    }

    /// Remove `removed` filters from `filter` and update everything downstream.
    pub(crate) fn prune_filters(
        &mut self,
        graph: &mut Graph,
        scope: &mut ParamScope,
        filter: &str,
        removed: &[usize],
    ) -> Result<()> {
        let channels = scope.require(filter)?.shape()[0];
        self.prune_param(graph, scope, filter, 0, removed)?;

        let mut queue = Vec::new();
        for op_index in graph.consumers(filter) {
            let op = &graph.ops[op_index];
            if op.op_type == "depthwise_conv2d" || op.attr_u64("groups").is_some_and(|g| g > 1) {
                return Err(PruneError::UnsupportedOp {
                    op_type: op.op_type.clone(),
                    tensor: filter.to_string(),
                });
            }
            self.prune_vectors(graph, scope, op_index, filter, removed, channels)?;
            queue.extend(self.channel_outputs(graph, op_index, removed, channels)?);
        }

        let remaining = (channels - removed.len()) as i64;
        while let Some((activation, axis)) = queue.pop() {
            if !self.mark(&activation, axis, removed)? {
                continue;
            }
            if let Some(var) = graph.var_mut(&activation) {
                if var.shape[axis] >= 0 {
                    var.shape[axis] = remaining;
                }
            }

            for op_index in graph.consumers(&activation) {
                if self.visit_consumer(graph, scope, op_index, &activation, removed, channels)? {
                    queue.extend(self.channel_outputs(graph, op_index, removed, channels)?);
                }
            }
        }
        Ok(())
    }

    /// Non-persistable outputs of an op paired with their channel axis.
    ///
    /// Rank-1 outputs (saved batch statistics) carry channels on axis 0,
    /// everything else on axis 1. A known channel dim other than `channels`
    /// means the op changed the channel layout and is rejected.
    fn channel_outputs(
        &self,
        graph: &Graph,
        op_index: usize,
        removed: &[usize],
        channels: usize,
    ) -> Result<Vec<(String, usize)>> {
        let op = &graph.ops[op_index];
        let mut outputs = Vec::new();

        for var in op.outputs().filter_map(|name| graph.var(name)) {
            if var.persistable || var.rank() == 0 {
                continue;
            }
            let axis = if var.rank() == 1 { 0 } else { 1 };

            match self.pruned.get(&(var.name.clone(), axis)) {
                // in-place op: output already carries the pruned channels
                Some(previous) if previous.as_slice() == removed => continue,
                // left to mark() to report the conflict
                Some(_) => {}
                None => {
                    if var.dim(axis).is_some_and(|d| d != channels) {
                        return Err(PruneError::UnsupportedOp {
                            op_type: op.op_type.clone(),
                            tensor: var.name.clone(),
                        });
                    }
                }
            }
            outputs.push((var.name.clone(), axis));
        }
        Ok(outputs)
    }

    /// Returns whether the op passes the pruned channels on to its outputs.
    fn visit_consumer(
        &mut self,
        graph: &mut Graph,
        scope: &mut ParamScope,
        op_index: usize,
        activation: &str,
        removed: &[usize],
        channels: usize,
    ) -> Result<bool> {
        let op = graph.ops[op_index].clone();
        let unsupported = || PruneError::UnsupportedOp {
            op_type: op.op_type.clone(),
            tensor: activation.to_string(),
        };

        if RESHAPING_OPS.contains(&op.op_type.as_str()) {
            return Err(unsupported());
        }

        let params: Vec<(String, Vec<usize>)> = op
            .inputs()
            .filter(|&name| name != activation)
            .filter_map(|name| scope.get(name).map(|t| (name.to_string(), t.shape().to_vec())))
            .collect();

        if let Some((filter, shape)) = params.iter().find(|(_, shape)| shape.len() == 4) {
            let depthwise = op.op_type == "depthwise_conv2d"
                || (channels > 1 && op.attr_u64("groups") == Some(channels as u64));

            if depthwise && shape[0] == channels {
                debug!(op = %op.op_type, param = %filter, "removing depthwise filters");
                self.prune_param(graph, scope, filter, 0, removed)?;
                self.prune_vectors(graph, scope, op_index, filter, removed, channels)?;
                return Ok(true);
            }
            if !depthwise && shape[1] == channels {
                debug!(op = %op.op_type, param = %filter, "removing input channels");
                self.prune_param(graph, scope, filter, 1, removed)?;
                return Ok(false);
            }
            return Err(unsupported());
        }

        if let Some((weight, _)) = params
            .iter()
            .find(|(_, shape)| shape.len() == 2 && shape[0] == channels)
        {
            debug!(op = %op.op_type, param = %weight, "removing weight rows");
            self.prune_param(graph, scope, weight, 0, removed)?;
            return Ok(false);
        }

        if params.iter().any(|(_, shape)| shape.len() >= 2) {
            return Err(unsupported());
        }

        self.prune_vectors(graph, scope, op_index, activation, removed, channels)?;
        Ok(true)
    }

    /// Remove `removed` from every rank-1 parameter of length `channels` read by the op.
    fn prune_vectors(
        &mut self,
        graph: &mut Graph,
        scope: &mut ParamScope,
        op_index: usize,
        exclude: &str,
        removed: &[usize],
        channels: usize,
    ) -> Result<()> {
        let vectors: Vec<String> = graph.ops[op_index]
            .inputs()
            .filter(|&name| name != exclude)
            .filter(|&name| {
                scope
                    .get(name)
                    .is_some_and(|t| t.rank() == 1 && t.shape()[0] == channels)
            })
            .map(String::from)
            .collect();

        for name in vectors {
            self.prune_param(graph, scope, &name, 0, removed)?;
        }
        Ok(())
    }

    fn prune_param(
        &mut self,
        graph: &mut Graph,
        scope: &mut ParamScope,
        name: &str,
        axis: usize,
        removed: &[usize],
    ) -> Result<()> {
        if !self.mark(name, axis, removed)? {
            return Ok(());
        }

        let tensor = scope.require_mut(name)?;
        tensor.remove_along(axis, removed)?;
        let size = tensor.shape()[axis];

        if let Some(var) = graph.var_mut(name) {
            if axis < var.shape.len() {
                var.shape[axis] = size as i64;
            }
        }
        Ok(())
    }

    /// Returns `true` the first time (name, axis) is seen.
    fn mark(&mut self, name: &str, axis: usize, removed: &[usize]) -> Result<bool> {
        let key = (name.to_string(), axis);
        match self.pruned.get(&key) {
            Some(previous) if previous.as_slice() == removed => Ok(false),
            Some(_) => Err(PruneError::ConflictingPrune {
                name: name.to_string(),
                axis,
            }),
            None => {
                self.pruned.insert(key, removed.to_vec());
                Ok(true)
            }
        }
    }
}

/// Check that element-wise ops see the same channel count on every activation input.
pub fn validate_channels(graph: &Graph) -> Result<()> {
    for op in graph.ops().filter(|op| op.op_type.starts_with("elementwise_")) {
        let channels: BTreeSet<usize> = op
            .inputs()
            .filter_map(|name| graph.var(name))
            .filter(|var| !var.persistable && var.rank() == 4)
            .filter_map(|var| var.dim(1))
            .collect();

        if channels.len() > 1 {
            return Err(PruneError::ChannelMismatch {
                op_type: op.op_type.clone(),
                channels: channels.into_iter().collect(),
            });
        }
    }
    Ok(())
}
