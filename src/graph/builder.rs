//! Knowledge graph construction from a [`Strategy`].

use crate::classify::{InstanceSeed, Strategy};
use crate::domain::registry::RegistrySnapshot;
use crate::domain::{Cardinality, Domain};
use crate::error::{ForgeResult, GraphError};

use super::{InstanceId, KnowledgeGraph};

/// Build the instance graph for `strategy` against its domain in `snapshot`.
///
/// One instance is created per seed, in seed order. Seeds that name a
/// parent are linked to it through the first relation whose endpoints
/// accept both concepts. Seeds without a parent are attached to the first
/// earlier instance that can contain them, when a one-to-many relation
/// allows it.
pub fn build(snapshot: &RegistrySnapshot, strategy: &Strategy) -> ForgeResult<KnowledgeGraph> {
    let domain = snapshot.lookup(strategy.domain())?;
    let mut graph = KnowledgeGraph::new(domain.clone());

    let mut ids = Vec::with_capacity(strategy.seeds().len());
    for seed in strategy.seeds() {
        ids.push(graph.add_instance(&seed.key, &seed.concept, seed.attributes.clone())?);
    }

    for (seed, id) in strategy.seeds().iter().zip(&ids) {
        match &seed.parent {
            Some(parent) => link_parent(&mut graph, &domain, seed, parent, *id)?,
            None => auto_link(&mut graph, &domain, seed, *id, &ids)?,
        }
    }

    tracing::debug!(
        domain = domain.name(),
        instances = graph.len(),
        edges = graph.edge_count(),
        "built knowledge graph"
    );
    Ok(graph)
}

fn link_parent(
    graph: &mut KnowledgeGraph,
    domain: &Domain,
    seed: &InstanceSeed,
    parent: &str,
    child: InstanceId,
) -> ForgeResult<()> {
    let Some(parent_inst) = graph.by_label(parent) else {
        return Err(GraphError::DanglingEdge {
            relation: "(containment)".into(),
            source_label: parent.to_string(),
            target_label: seed.key.clone(),
        }
        .into());
    };
    let (parent_id, parent_concept) = (parent_inst.id(), parent_inst.concept().to_string());

    let Some(relation) = domain
        .relations()
        .iter()
        .find(|r| domain.is_a(&parent_concept, &r.source) && domain.is_a(&seed.concept, &r.target))
    else {
        return Err(GraphError::NoRelation {
            domain: domain.name().to_string(),
            parent: parent_concept,
            child: seed.concept.clone(),
        }
        .into());
    };
    graph.add_edge(parent_id, &relation.name, child)?;
    Ok(())
}

/// A container concept gets a containment edge to each seeded child it
/// dominates, unless the child already has a container.
fn auto_link(
    graph: &mut KnowledgeGraph,
    domain: &Domain,
    seed: &InstanceSeed,
    child: InstanceId,
    ids: &[InstanceId],
) -> ForgeResult<()> {
    for relation in domain.relations() {
        if relation.cardinality != Cardinality::OneToMany
            || !domain.is_a(&seed.concept, &relation.target)
            || graph.has_incoming(child, &relation.name)
        {
            continue;
        }
        let container = ids.iter().copied().find(|id| {
            *id != child
                && graph
                    .instance(*id)
                    .is_some_and(|i| domain.is_a(i.concept(), &relation.source))
        });
        if let Some(container) = container {
            graph.add_edge(container, &relation.name, child)?;
        }
    }
    Ok(())
}
