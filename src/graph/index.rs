//! In-memory instance graph backed by `petgraph`, with a label index.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;

use crate::domain::{Cardinality, Domain};
use crate::error::GraphError;

use super::{Edge, EdgeView, Instance, InstanceId, Value};

/// Result type for graph operations.
pub type GraphResult<T> = std::result::Result<T, GraphError>;

/// Typed instance graph for a single request.
///
/// Every mutation is checked against the domain the graph was created for:
/// instances must use the domain's concepts and declared attribute kinds,
/// and edges must follow declared relation types and cardinalities.
#[derive(Debug, Clone)]
pub struct KnowledgeGraph {
    domain: Arc<Domain>,
    graph: DiGraph<Instance, Edge>,
    labels: HashMap<String, InstanceId>,
}

impl KnowledgeGraph {
    /// Create an empty graph for `domain`.
    pub fn new(domain: Arc<Domain>) -> Self {
        Self {
            domain,
            graph: DiGraph::new(),
            labels: HashMap::new(),
        }
    }

    pub fn domain(&self) -> &Arc<Domain> {
        &self.domain
    }

    /// Add an instance. Labels are unique within the graph.
    pub fn add_instance(
        &mut self,
        label: &str,
        concept: &str,
        attributes: BTreeMap<String, Value>,
    ) -> GraphResult<InstanceId> {
        if self.domain.concept(concept).is_none() {
            return Err(GraphError::ForeignConcept {
                domain: self.domain.name().to_string(),
                concept: concept.to_string(),
                seed: label.to_string(),
            });
        }
        if self.labels.contains_key(label) {
            return Err(GraphError::DuplicateLabel {
                label: label.to_string(),
            });
        }
        for (name, value) in &attributes {
            match self.domain.attribute_kind(concept, name) {
                None => {
                    return Err(GraphError::UnknownAttribute {
                        concept: concept.to_string(),
                        attribute: name.clone(),
                    });
                }
                Some(kind) if kind != value.kind() => {
                    return Err(GraphError::AttributeType {
                        concept: concept.to_string(),
                        attribute: name.clone(),
                        expected: kind.to_string(),
                    });
                }
                Some(_) => {}
            }
        }

        // Node indices are dense; the next node gets index `node_count`.
        let id = InstanceId::from_node(NodeIndex::new(self.graph.node_count()));
        let node = self.graph.add_node(Instance {
            id,
            label: label.to_string(),
            concept: concept.to_string(),
            attributes,
        });
        debug_assert_eq!(InstanceId::from_node(node), id);
        self.labels.insert(label.to_string(), id);
        Ok(id)
    }

    /// Connect two existing instances with a declared relation.
    pub fn add_edge(
        &mut self,
        source: InstanceId,
        relation: &str,
        target: InstanceId,
    ) -> GraphResult<()> {
        let (Some(src), Some(dst)) = (self.instance(source), self.instance(target)) else {
            return Err(GraphError::DanglingEdge {
                relation: relation.to_string(),
                source_label: self.label_or_id(source),
                target_label: self.label_or_id(target),
            });
        };
        let Some(rel) = self.domain.relation(relation) else {
            return Err(GraphError::UnknownRelation {
                relation: relation.to_string(),
                domain: self.domain.name().to_string(),
            });
        };
        if !self.domain.is_a(&src.concept, &rel.source) || !self.domain.is_a(&dst.concept, &rel.target)
        {
            return Err(GraphError::RelationMismatch {
                relation: relation.to_string(),
                source_concept: src.concept.clone(),
                target_concept: dst.concept.clone(),
            });
        }
        if rel.cardinality == Cardinality::OneToMany && self.has_incoming(target, relation) {
            return Err(GraphError::CardinalityExceeded {
                relation: relation.to_string(),
                target_label: dst.label.clone(),
            });
        }

        self.graph.add_edge(
            source.node(),
            target.node(),
            Edge {
                relation: relation.to_string(),
            },
        );
        Ok(())
    }

    fn label_or_id(&self, id: InstanceId) -> String {
        self.instance(id)
            .map(|i| i.label.clone())
            .unwrap_or_else(|| id.to_string())
    }

    /// Whether `target` already has a `relation` edge pointing at it.
    pub fn has_incoming(&self, target: InstanceId, relation: &str) -> bool {
        self.graph
            .edges_directed(target.node(), Direction::Incoming)
            .any(|e| e.weight().relation == relation)
    }

    pub fn instance(&self, id: InstanceId) -> Option<&Instance> {
        self.graph.node_weight(id.node())
    }

    pub fn by_label(&self, label: &str) -> Option<&Instance> {
        self.labels.get(label).and_then(|id| self.instance(*id))
    }

    /// All instances in insertion order.
    pub fn instances(&self) -> impl Iterator<Item = &Instance> {
        self.graph.node_weights()
    }

    /// Instances of `concept` or any of its subtypes, in insertion order.
    pub fn instances_of<'a>(&'a self, concept: &'a str) -> impl Iterator<Item = &'a Instance> {
        self.instances()
            .filter(move |i| self.domain.is_a(&i.concept, concept))
    }

    /// Instances transitively contained in `id` through one-to-many
    /// relations, in id order. `id` itself is excluded.
    pub fn contained_in(&self, id: InstanceId) -> Vec<InstanceId> {
        let mut seen = vec![id];
        let mut queue = VecDeque::from([id]);
        while let Some(current) = queue.pop_front() {
            for edge in self
                .graph
                .edges_directed(current.node(), Direction::Outgoing)
            {
                let containment = self
                    .domain
                    .relation(&edge.weight().relation)
                    .is_some_and(|r| r.cardinality == Cardinality::OneToMany);
                let child = InstanceId::from_node(edge.target());
                if containment && !seen.contains(&child) {
                    seen.push(child);
                    queue.push_back(child);
                }
            }
        }
        seen.retain(|i| *i != id);
        seen.sort();
        seen
    }

    /// All edges, ordered by (source, target).
    pub fn edges(&self) -> Vec<EdgeView> {
        let mut out: Vec<EdgeView> = self
            .graph
            .edge_references()
            .map(|e| EdgeView {
                source: InstanceId::from_node(e.source()),
                relation: e.weight().relation.clone(),
                target: InstanceId::from_node(e.target()),
            })
            .collect();
        out.sort_by_key(|e| (e.source, e.target));
        out
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}
