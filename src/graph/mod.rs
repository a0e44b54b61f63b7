//! Knowledge graph: the per-request instance graph.
//!
//! Nodes are [`Instance`]s (a concept type plus attribute values), edges are
//! relation names declared by the active domain. A graph is built once per
//! request by [`builder::build`] and never shared between requests.

pub mod builder;
pub mod index;

use std::collections::BTreeMap;
use std::fmt;
use std::num::NonZeroU32;

use petgraph::graph::NodeIndex;
use serde::{Deserialize, Serialize};

use crate::domain::AttributeKind;

pub use index::KnowledgeGraph;

/// An attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Value {
    pub fn kind(&self) -> AttributeKind {
        match self {
            Value::Bool(_) => AttributeKind::Bool,
            Value::Number(_) => AttributeKind::Number,
            Value::Text(_) => AttributeKind::Text,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::Text(s) => write!(f, "\"{s}\""),
        }
    }
}

/// Identifier of an instance within one graph.
///
/// Uses `NonZeroU32` so that `Option<InstanceId>` is the same size as
/// `InstanceId`. Id `n` is the `n`-th instance added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct InstanceId(NonZeroU32);

impl InstanceId {
    pub(crate) fn from_node(node: NodeIndex) -> Self {
        InstanceId(NonZeroU32::MIN.saturating_add(node.index() as u32))
    }

    pub(crate) fn node(self) -> NodeIndex {
        NodeIndex::new((self.0.get() - 1) as usize)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "inst:{}", self.0)
    }
}

/// A concept instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Instance {
    pub(crate) id: InstanceId,
    pub(crate) label: String,
    pub(crate) concept: String,
    pub(crate) attributes: BTreeMap<String, Value>,
}

impl Instance {
    pub fn id(&self) -> InstanceId {
        self.id
    }

    /// Unique, human-readable key (e.g. `room`, `cooling-unit-1`).
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn concept(&self) -> &str {
        &self.concept
    }

    pub fn attributes(&self) -> &BTreeMap<String, Value> {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }
}

/// Edge weight: the relation name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Edge {
    pub relation: String,
}

/// A resolved edge, as returned by [`KnowledgeGraph::edges`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EdgeView {
    pub source: InstanceId,
    pub relation: String,
    pub target: InstanceId,
}
