//! Inference network graph: ordered operations over declared variables.
//!
//! The graph only describes structure. Parameter values live in a
//! [`ParamScope`](crate::ParamScope) keyed by the same variable names.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::error::{Result, StorageError};

/// Declared variable: activation or persistable parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarDesc {
    pub name: String,
    /// Dimension sizes; `-1` marks an unknown dimension such as the batch.
    pub shape: Vec<i64>,
    /// Persistable variables are parameters stored in the scope.
    #[serde(default)]
    pub persistable: bool,
}

impl VarDesc {
    /// Declare a persistable parameter.
    pub fn param(name: impl Into<String>, shape: &[usize]) -> Self {
        Self {
            name: name.into(),
            shape: shape.iter().map(|&d| d as i64).collect(),
            persistable: true,
        }
    }

    /// Declare a non-persistable activation.
    pub fn activation(name: impl Into<String>, shape: &[i64]) -> Self {
        Self {
            name: name.into(),
            shape: shape.to_vec(),
            persistable: false,
        }
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Known (non-negative) size of dimension `axis`.
    pub fn dim(&self, axis: usize) -> Option<usize> {
        self.shape
            .get(axis)
            .and_then(|&d| usize::try_from(d).ok())
    }

    /// Whether the declared shape agrees with a concrete tensor shape.
    /// Unknown dimensions match anything.
    pub fn matches(&self, shape: &[usize]) -> bool {
        self.shape.len() == shape.len()
            && self
                .shape
                .iter()
                .zip(shape)
                .all(|(&d, &s)| d < 0 || d as usize == s)
    }
}

/// One operation with ordered input and output variable names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpDesc {
    #[serde(rename = "type")]
    pub op_type: String,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: BTreeMap<String, serde_json::Value>,
}

impl OpDesc {
    pub fn new<I, O>(op_type: impl Into<String>, inputs: I, outputs: O) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
        O: IntoIterator,
        O::Item: Into<String>,
    {
        Self {
            op_type: op_type.into(),
            inputs: inputs.into_iter().map(Into::into).collect(),
            outputs: outputs.into_iter().map(Into::into).collect(),
            attrs: BTreeMap::new(),
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attrs.insert(key.into(), value);
        self
    }

    /// Input names in declaration order.
    pub fn inputs(&self) -> impl Iterator<Item = &str> {
        self.inputs.iter().map(String::as_str)
    }

    pub fn outputs(&self) -> impl Iterator<Item = &str> {
        self.outputs.iter().map(String::as_str)
    }

    /// Integer attribute, if present.
    pub fn attr_u64(&self, key: &str) -> Option<u64> {
        self.attrs.get(key).and_then(serde_json::Value::as_u64)
    }
}

/// An op input visited during traversal.
#[derive(Debug, Clone, Copy)]
pub struct InputRef<'a> {
    pub op_index: usize,
    pub op: &'a OpDesc,
    pub name: &'a str,
    /// Declaration of the input, if the graph declares it.
    pub var: Option<&'a VarDesc>,
}

/// Network graph in execution order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    #[serde(default)]
    pub feed_names: Vec<String>,
    #[serde(default)]
    pub fetch_names: Vec<String>,
    #[serde(default)]
    pub vars: Vec<VarDesc>,
    #[serde(default)]
    pub ops: Vec<OpDesc>,
}

impl Graph {
    pub fn new(feed_names: Vec<String>, fetch_names: Vec<String>) -> Self {
        Self {
            feed_names,
            fetch_names,
            ..Default::default()
        }
    }

    pub fn add_var(&mut self, var: VarDesc) -> &mut Self {
        self.vars.push(var);
        self
    }

    pub fn add_op(&mut self, op: OpDesc) -> &mut Self {
        self.ops.push(op);
        self
    }

    pub fn ops(&self) -> impl Iterator<Item = &OpDesc> {
        self.ops.iter()
    }

    pub fn var(&self, name: &str) -> Option<&VarDesc> {
        self.vars.iter().find(|v| v.name == name)
    }

    pub fn var_mut(&mut self, name: &str) -> Option<&mut VarDesc> {
        self.vars.iter_mut().find(|v| v.name == name)
    }

    /// Persistable variables, in declaration order.
    pub fn params(&self) -> impl Iterator<Item = &VarDesc> {
        self.vars.iter().filter(|v| v.persistable)
    }

    /// Every op input in graph order. Each call starts a fresh traversal.
    pub fn op_inputs(&self) -> impl Iterator<Item = InputRef<'_>> {
        self.ops.iter().enumerate().flat_map(move |(op_index, op)| {
            op.inputs().map(move |name| InputRef {
                op_index,
                op,
                name,
                var: self.var(name),
            })
        })
    }

    /// Indices of ops that read `name`.
    pub fn consumers(&self, name: &str) -> Vec<usize> {
        self.ops
            .iter()
            .enumerate()
            .filter(|(_, op)| op.inputs().any(|i| i == name))
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Check that every referenced name is declared.
    pub fn validate(&self) -> Result<()> {
        let declared: HashSet<&str> = self.vars.iter().map(|v| v.name.as_str()).collect();

        let referenced = self
            .feed_names
            .iter()
            .chain(&self.fetch_names)
            .map(String::as_str)
            .chain(self.ops.iter().flat_map(|op| op.inputs().chain(op.outputs())));

        for name in referenced {
            if !declared.contains(name) {
                return Err(StorageError::UndeclaredVar(name.to_string()));
            }
        }
        Ok(())
    }
}
