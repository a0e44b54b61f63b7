//! Term evaluation, implication saturation and per-rule outcomes.

use std::collections::BTreeMap;

use crate::domain::rule::{RuleExpr, Term};
use crate::domain::{AttributeKind, ConstraintRule};
use crate::error::CompileError;
use crate::graph::{Instance, KnowledgeGraph};

use super::conflict;
use super::verdict::{Derivation, OutcomeStatus, RuleOutcome};

#[derive(Debug, Clone)]
struct DerivedFact {
    value: bool,
    rule: String,
}

/// The graph's asserted facts plus the values derived during saturation.
/// The graph itself is never mutated.
#[derive(Debug)]
pub struct WorkingSet<'g> {
    graph: &'g KnowledgeGraph,
    derived: BTreeMap<(String, String), DerivedFact>,
}

impl<'g> WorkingSet<'g> {
    pub fn new(graph: &'g KnowledgeGraph) -> Self {
        Self {
            graph,
            derived: BTreeMap::new(),
        }
    }

    pub fn graph(&self) -> &'g KnowledgeGraph {
        self.graph
    }

    /// Boolean attribute value; missing reads as false.
    pub fn flag(&self, inst: &Instance, attribute: &str) -> bool {
        match inst.attribute(attribute) {
            Some(v) => v.as_bool().unwrap_or(false),
            None => self
                .derived
                .get(&(inst.label().to_string(), attribute.to_string()))
                .is_some_and(|d| d.value),
        }
    }

    /// Instances a rule ranges over: its scope concept, or every instance.
    pub fn scope(&self, rule: &ConstraintRule) -> Vec<&'g Instance> {
        let graph = self.graph;
        match rule.scope.as_deref() {
            Some(concept) => graph
                .instances()
                .filter(|i| graph.domain().is_a(i.concept(), concept))
                .collect(),
            None => graph.instances().collect(),
        }
    }

    /// Whether `term` holds for `inst`.
    pub fn holds(&self, rule: &str, term: &Term, inst: &Instance) -> Result<bool, CompileError> {
        let domain = self.graph.domain();
        match term {
            Term::Name(name) => {
                if domain.concept(name).is_some() {
                    return Ok(domain.is_a(inst.concept(), name));
                }
                match domain.attribute(name) {
                    Some(AttributeKind::Bool) => Ok(self.flag(inst, name)),
                    _ => Err(unresolved(rule, name)),
                }
            }
            Term::Compare {
                attribute,
                op,
                value,
            } => match domain.attribute(attribute) {
                Some(AttributeKind::Number) => Ok(inst
                    .attribute(attribute)
                    .and_then(|v| v.as_number())
                    .is_some_and(|x| op.apply(x, *value))),
                _ => Err(unresolved(rule, attribute)),
            },
            Term::And(terms) => {
                for t in terms {
                    if !self.holds(rule, t, inst)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Term::Or(terms) => {
                for t in terms {
                    if self.holds(rule, t, inst)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Term::Not(t) => Ok(!self.holds(rule, t, inst)?),
        }
    }
}

fn unresolved(rule: &str, name: &str) -> CompileError {
    CompileError::UnresolvedReference {
        rule: rule.to_string(),
        name: name.to_string(),
    }
}

/// Apply every implication whose consequent is a conjunction of attribute
/// literals until nothing changes. Returns derivations in the order made.
///
/// Asserted facts always win over derivations. Two derivations demanding
/// opposite values for the same attribute are a conflict.
///
/// Saturation is monotone: a derived value is never retracted. An
/// antecedent that tests a derived attribute under `not(...)` reads it as
/// false until some rule derives it, so a consequent drawn from that read
/// stays in the trail even if a later pass derives the attribute. Rules
/// are applied in declaration order, so the outcome is still deterministic.
pub fn saturate(
    ws: &mut WorkingSet<'_>,
    rules: &[&ConstraintRule],
) -> Result<Vec<Derivation>, CompileError> {
    let graph = ws.graph;
    let domain = graph.domain();
    let mut derivations = Vec::new();

    loop {
        let mut changed = false;
        for rule in rules {
            let RuleExpr::Implies(antecedent, consequent) = &rule.expr else {
                continue;
            };
            let Some(literals) = consequent.literals() else {
                continue;
            };
            for inst in ws.scope(rule) {
                if !ws.holds(&rule.id, antecedent, inst)? {
                    continue;
                }
                for (attribute, value) in &literals {
                    let derivable = domain.concept(attribute).is_none()
                        && domain.attribute_kind(inst.concept(), attribute)
                            == Some(AttributeKind::Bool)
                        && inst.attribute(attribute).is_none();
                    if !derivable {
                        continue;
                    }
                    let key = (inst.label().to_string(), attribute.to_string());
                    match ws.derived.get(&key) {
                        Some(prev) if prev.value == *value => {}
                        Some(prev) => {
                            return Err(conflict::conflict_error(
                                domain,
                                &prev.rule,
                                &rule.id,
                                inst.label(),
                                attribute,
                            ));
                        }
                        None => {
                            ws.derived.insert(
                                key,
                                DerivedFact {
                                    value: *value,
                                    rule: rule.id.clone(),
                                },
                            );
                            derivations.push(Derivation {
                                rule: rule.id.clone(),
                                instance: inst.label().to_string(),
                                attribute: attribute.to_string(),
                                value: *value,
                            });
                            changed = true;
                        }
                    }
                }
            }
        }
        if !changed {
            break;
        }
    }

    if !derivations.is_empty() {
        tracing::trace!(count = derivations.len(), "saturated implications");
    }
    Ok(derivations)
}

/// Evaluate one rule against the saturated working set.
pub fn outcome(ws: &WorkingSet<'_>, rule: &ConstraintRule) -> Result<RuleOutcome, CompileError> {
    let id = rule.id.as_str();
    let mut applies = Vec::new();
    let mut violated = Vec::new();
    let mut detail = None;

    match &rule.expr {
        RuleExpr::Implies(antecedent, consequent) => {
            for inst in ws.scope(rule) {
                if ws.holds(id, antecedent, inst)? {
                    applies.push(inst.label().to_string());
                    if !ws.holds(id, consequent, inst)? {
                        violated.push(inst.label().to_string());
                    }
                }
            }
        }
        RuleExpr::And(terms) => {
            for inst in ws.scope(rule) {
                applies.push(inst.label().to_string());
                for t in terms {
                    if !ws.holds(id, t, inst)? {
                        violated.push(inst.label().to_string());
                        break;
                    }
                }
            }
        }
        RuleExpr::Not(term) => {
            for inst in ws.scope(rule) {
                applies.push(inst.label().to_string());
                if ws.holds(id, term, inst)? {
                    violated.push(inst.label().to_string());
                }
            }
        }
        RuleExpr::AtLeast { term, count, scope } | RuleExpr::Exact { term, count, scope } => {
            let exact = matches!(rule.expr, RuleExpr::Exact { .. });
            let graph = ws.graph();
            let mut counts = Vec::new();
            for owner in graph.instances_of(scope) {
                let mut n = 0usize;
                for member in graph.contained_in(owner.id()) {
                    if let Some(inst) = graph.instance(member)
                        && ws.holds(id, term, inst)?
                    {
                        n += 1;
                    }
                }
                let ok = if exact { n == *count } else { n >= *count };
                applies.push(owner.label().to_string());
                if !ok {
                    violated.push(owner.label().to_string());
                }
                let bound = if exact { "exactly" } else { "at least" };
                counts.push(format!("{}: {n} of {bound} {count}", owner.label()));
            }
            if !counts.is_empty() {
                detail = Some(counts.join("; "));
            }
        }
    }

    let (status, instances) = if applies.is_empty() {
        (OutcomeStatus::Inapplicable, Vec::new())
    } else if violated.is_empty() {
        (OutcomeStatus::Satisfied, applies)
    } else {
        (OutcomeStatus::Violated, violated)
    };
    Ok(RuleOutcome {
        rule: id.to_string(),
        status,
        instances,
        detail: if status == OutcomeStatus::Inapplicable {
            None
        } else {
            detail
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{InstanceSeed, Strategy};
    use crate::domain::registry::DomainRegistry;
    use crate::graph::{Value, builder};

    fn graph(seeds: Vec<InstanceSeed>) -> KnowledgeGraph {
        let registry = DomainRegistry::bundled().unwrap();
        let strategy = seeds.into_iter().fold(
            Strategy::new("facility-climate-compliance", "Generate Standard Plan"),
            |s, seed| s.with_seed(seed),
        );
        builder::build(&registry.snapshot(), &strategy).unwrap()
    }

    fn room(attrs: &[(&str, Value)]) -> Vec<InstanceSeed> {
        let mut r = InstanceSeed::new("room", "Room").within("proposal");
        for (k, v) in attrs {
            r = r.with(*k, v.clone());
        }
        vec![InstanceSeed::new("proposal", "Proposal"), r]
    }

    fn rules<'d>(g: &'d KnowledgeGraph, ids: &[&str]) -> Vec<&'d ConstraintRule> {
        ids.iter().map(|id| g.domain().rule(id).unwrap()).collect()
    }

    #[test]
    fn comparison_on_missing_value_is_false() {
        let g = graph(room(&[]));
        let ws = WorkingSet::new(&g);
        let rule = g.domain().rule("occupancy-risk").unwrap();
        let out = outcome(&ws, rule).unwrap();
        assert_eq!(out.status, OutcomeStatus::Inapplicable);
    }

    #[test]
    fn saturation_chains_implications() {
        let g = graph(room(&[("occupancy", Value::Number(120.0))]));
        let mut ws = WorkingSet::new(&g);
        let active = rules(&g, &["high-risk-mandatory", "occupancy-risk"]);
        let derived = saturate(&mut ws, &active).unwrap();
        let attrs: Vec<&str> = derived.iter().map(|d| d.attribute.as_str()).collect();
        assert_eq!(attrs, vec!["high_risk", "requires_mandatory_plan"]);

        let out = outcome(&ws, g.domain().rule("high-risk-mandatory").unwrap()).unwrap();
        assert_eq!(out.status, OutcomeStatus::Satisfied);
        assert_eq!(out.instances, vec!["room"]);
    }

    #[test]
    fn asserted_fact_is_not_overwritten() {
        let g = graph(room(&[
            ("is_server_room", Value::Bool(true)),
            ("requires_mandatory_plan", Value::Bool(false)),
        ]));
        let mut ws = WorkingSet::new(&g);
        let active = rules(&g, &["server-room-mandatory"]);
        assert!(saturate(&mut ws, &active).unwrap().is_empty());
        let out = outcome(&ws, active[0]).unwrap();
        assert_eq!(out.status, OutcomeStatus::Violated);
    }

    #[test]
    fn cardinality_counts_contained_instances() {
        let g = graph(room(&[("requires_mandatory_plan", Value::Bool(true))]));
        let ws = WorkingSet::new(&g);
        let out = outcome(&ws, g.domain().rule("plan-required").unwrap()).unwrap();
        assert_eq!(out.status, OutcomeStatus::Satisfied);
        assert_eq!(out.detail.as_deref(), Some("proposal: 1 of at least 1"));

        let g = graph(room(&[]));
        let ws = WorkingSet::new(&g);
        let out = outcome(&ws, g.domain().rule("plan-required").unwrap()).unwrap();
        assert_eq!(out.status, OutcomeStatus::Violated);
    }

    #[test]
    fn not_rule_violated_where_term_holds() {
        let g = graph(room(&[
            ("is_server_room", Value::Bool(true)),
            ("size_exemption_applies", Value::Bool(true)),
        ]));
        let ws = WorkingSet::new(&g);
        let out = outcome(&ws, g.domain().rule("no-exempt-server-room").unwrap()).unwrap();
        assert_eq!(out.status, OutcomeStatus::Violated);
        assert_eq!(out.instances, vec!["room"]);
    }

    const STORE: &str = r#"
[store]
goal = "Generate Storage Plan"
triggers = ["storage"]
[store.intent]
container = "Site"
subject = "Chamber"
[[store.concepts]]
name = "Site"
[[store.concepts]]
name = "Chamber"
[store.concepts.attributes]
is_freezer = "bool"
insulated = "bool"
sealed = "bool"
vented = "bool"
[[store.relations]]
name = "contains"
source = "Site"
target = "Chamber"
[[store.constraints]]
id = "insulated-and-sealed"
scope = "Chamber"
rule = "and(insulated, sealed)"
[[store.constraints]]
id = "one-freezer"
rule = "exact(is_freezer, 1, Site)"
[[store.constraints]]
id = "unsealed-vented"
scope = "Chamber"
rule = "implies(not(sealed), vented)"
[[store.constraints]]
id = "freezer-sealed"
scope = "Chamber"
rule = "implies(is_freezer, sealed)"
"#;

    /// A site holding one chamber per entry of `chambers`.
    fn store(chambers: &[&[(&str, bool)]]) -> KnowledgeGraph {
        let registry = DomainRegistry::new();
        registry.load_str("store.toml", STORE).unwrap();
        let mut strategy = Strategy::new("store", "Generate Storage Plan")
            .with_seed(InstanceSeed::new("site", "Site"));
        for (i, attrs) in chambers.iter().enumerate() {
            let mut seed = InstanceSeed::new(format!("chamber-{}", i + 1), "Chamber").within("site");
            for (k, v) in attrs.iter() {
                seed = seed.with(*k, Value::Bool(*v));
            }
            strategy = strategy.with_seed(seed);
        }
        builder::build(&registry.snapshot(), &strategy).unwrap()
    }

    fn store_outcome(g: &KnowledgeGraph, id: &str) -> RuleOutcome {
        let ws = WorkingSet::new(g);
        outcome(&ws, g.domain().rule(id).unwrap()).unwrap()
    }

    #[test]
    fn and_rule_holds_per_instance() {
        let sealed = [("insulated", true), ("sealed", true)];
        let g = store(&[&sealed, &sealed]);
        let out = store_outcome(&g, "insulated-and-sealed");
        assert_eq!(out.status, OutcomeStatus::Satisfied);
        assert_eq!(out.instances, vec!["chamber-1", "chamber-2"]);

        let g = store(&[&sealed, &[("insulated", true)]]);
        let out = store_outcome(&g, "insulated-and-sealed");
        assert_eq!(out.status, OutcomeStatus::Violated);
        assert_eq!(out.instances, vec!["chamber-2"]);
    }

    #[test]
    fn and_rule_without_instances_in_scope_is_inapplicable() {
        let g = store(&[]);
        let out = store_outcome(&g, "insulated-and-sealed");
        assert_eq!(out.status, OutcomeStatus::Inapplicable);
        assert!(out.instances.is_empty());
    }

    #[test]
    fn exact_matches_count() {
        let freezer: &[(&str, bool)] = &[("is_freezer", true)];
        let plain: &[(&str, bool)] = &[("is_freezer", false)];

        let out = store_outcome(&store(&[freezer, plain]), "one-freezer");
        assert_eq!(out.status, OutcomeStatus::Satisfied);
        assert_eq!(out.instances, vec!["site"]);
        assert_eq!(out.detail.as_deref(), Some("site: 1 of exactly 1"));

        let out = store_outcome(&store(&[freezer, freezer]), "one-freezer");
        assert_eq!(out.status, OutcomeStatus::Violated);
        assert_eq!(out.detail.as_deref(), Some("site: 2 of exactly 1"));

        let out = store_outcome(&store(&[plain]), "one-freezer");
        assert_eq!(out.status, OutcomeStatus::Violated);
        assert_eq!(out.detail.as_deref(), Some("site: 0 of exactly 1"));
    }

    #[test]
    fn exact_on_empty_owner_counts_zero() {
        let out = store_outcome(&store(&[]), "one-freezer");
        assert_eq!(out.status, OutcomeStatus::Violated);
        assert_eq!(out.instances, vec!["site"]);
        assert_eq!(out.detail.as_deref(), Some("site: 0 of exactly 1"));
    }

    #[test]
    fn negated_antecedent_derivations_are_kept() {
        let g = store(&[&[("is_freezer", true)]]);
        let active = rules(&g, &["unsealed-vented", "freezer-sealed"]);

        let mut ws = WorkingSet::new(&g);
        let derived = saturate(&mut ws, &active).unwrap();
        let attrs: Vec<&str> = derived.iter().map(|d| d.attribute.as_str()).collect();
        assert_eq!(attrs, vec!["vented", "sealed"]);
        assert!(ws.flag(g.by_label("chamber-1").unwrap(), "vented"));

        let out = outcome(&ws, active[0]).unwrap();
        assert_eq!(out.status, OutcomeStatus::Inapplicable);

        let mut again = WorkingSet::new(&g);
        assert_eq!(saturate(&mut again, &active).unwrap(), derived);
    }

    #[test]
    fn concept_test_follows_subtypes() {
        let mut seeds = room(&[]);
        seeds[1] = InstanceSeed::new("clinical-room", "ClinicalRoom").within("proposal");
        let g = graph(seeds);
        let mut ws = WorkingSet::new(&g);
        let active = rules(&g, &["clinical-mandatory"]);
        let derived = saturate(&mut ws, &active).unwrap();
        assert_eq!(derived[0].instance, "clinical-room");
        assert_eq!(derived[0].attribute, "requires_mandatory_plan");
    }
}
