//! Conflict detection between activated rules.
//!
//! Three kinds of rule impose a boolean requirement on a specific
//! (instance, attribute) pair:
//!
//! - an implication that derived a value during saturation,
//! - a top-level `and(...)` rule, whose literal conjuncts are required on
//!   every instance in scope, and
//! - a `not(and(...))` rule whose other conjuncts already hold on the
//!   instance, which then requires the remaining literal to be false.
//!
//! When two different rules require opposite values for the same pair the
//! compiler fails. Asserted facts are not requirements; a fact that breaks a
//! rule simply makes that rule violated.

use std::collections::BTreeMap;

use crate::domain::rule::{RuleExpr, Term};
use crate::domain::{AttributeKind, ConstraintRule, Domain};
use crate::error::CompileError;

use super::eval::WorkingSet;
use super::verdict::Derivation;

#[derive(Debug, Clone)]
struct Requirement {
    position: usize,
    rule: String,
    instance: String,
    attribute: String,
    value: bool,
}

/// Build the conflict error with the two rules in declaration order.
pub(crate) fn conflict_error(
    domain: &Domain,
    rule_a: &str,
    rule_b: &str,
    instance: &str,
    attribute: &str,
) -> CompileError {
    let pos = |id: &str| domain.rule_position(id).unwrap_or(usize::MAX);
    let (first, second) = if pos(rule_a) <= pos(rule_b) {
        (rule_a, rule_b)
    } else {
        (rule_b, rule_a)
    };
    tracing::debug!(
        rule_a = first,
        rule_b = second,
        instance,
        attribute,
        "constraint conflict"
    );
    CompileError::ConstraintConflict {
        rule_a: first.to_string(),
        rule_b: second.to_string(),
        instance: instance.to_string(),
        attribute: attribute.to_string(),
    }
}

/// Fail on the first pair of contradictory requirements, scanning rules in
/// declaration order.
pub fn detect(
    ws: &WorkingSet<'_>,
    rules: &[&ConstraintRule],
    derivations: &[Derivation],
) -> Result<(), CompileError> {
    let domain = ws.graph().domain();
    let position = |id: &str| domain.rule_position(id).unwrap_or(usize::MAX);

    let mut requirements: Vec<Requirement> = derivations
        .iter()
        .map(|d| Requirement {
            position: position(&d.rule),
            rule: d.rule.clone(),
            instance: d.instance.clone(),
            attribute: d.attribute.clone(),
            value: d.value,
        })
        .collect();

    for rule in rules {
        let term = match &rule.expr {
            RuleExpr::Not(term) => term,
            RuleExpr::And(terms) => {
                for inst in ws.scope(rule) {
                    for conjunct in terms.iter().flat_map(|t| t.conjuncts()) {
                        let Some((attribute, polarity)) = literal(domain, conjunct) else {
                            continue;
                        };
                        if domain.attribute_kind(inst.concept(), attribute).is_none() {
                            continue;
                        }
                        requirements.push(Requirement {
                            position: position(&rule.id),
                            rule: rule.id.clone(),
                            instance: inst.label().to_string(),
                            attribute: attribute.to_string(),
                            value: polarity,
                        });
                    }
                }
                continue;
            }
            _ => continue,
        };
        let conjuncts = term.conjuncts();
        for inst in ws.scope(rule) {
            for (i, conjunct) in conjuncts.iter().enumerate() {
                let Some((attribute, polarity)) = literal(domain, conjunct) else {
                    continue;
                };
                if domain.attribute_kind(inst.concept(), attribute).is_none() {
                    continue;
                }
                let mut others_hold = true;
                for (j, other) in conjuncts.iter().enumerate() {
                    if j != i && !ws.holds(&rule.id, other, inst)? {
                        others_hold = false;
                        break;
                    }
                }
                if others_hold {
                    requirements.push(Requirement {
                        position: position(&rule.id),
                        rule: rule.id.clone(),
                        instance: inst.label().to_string(),
                        attribute: attribute.to_string(),
                        value: !polarity,
                    });
                }
            }
        }
    }

    requirements.sort_by_key(|r| r.position);

    let mut seen: BTreeMap<(&str, &str), Vec<&Requirement>> = BTreeMap::new();
    for req in &requirements {
        let entry = seen
            .entry((req.instance.as_str(), req.attribute.as_str()))
            .or_default();
        if let Some(other) = entry
            .iter()
            .find(|o| o.value != req.value && o.rule != req.rule)
        {
            return Err(conflict_error(
                domain,
                &other.rule,
                &req.rule,
                &req.instance,
                &req.attribute,
            ));
        }
        entry.push(req);
    }
    Ok(())
}

/// A boolean attribute literal: `x` or `not(x)`.
fn literal<'t>(domain: &Domain, term: &'t Term) -> Option<(&'t str, bool)> {
    let (name, polarity) = match term {
        Term::Name(n) => (n.as_str(), true),
        Term::Not(inner) => match inner.as_ref() {
            Term::Name(n) => (n.as_str(), false),
            _ => return None,
        },
        _ => return None,
    };
    (domain.concept(name).is_none() && domain.attribute(name) == Some(AttributeKind::Bool))
        .then_some((name, polarity))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{InstanceSeed, Strategy};
    use crate::compile::eval::saturate;
    use crate::domain::registry::DomainRegistry;
    use crate::graph::{KnowledgeGraph, Value, builder};

    fn clinical(attrs: &[(&str, bool)]) -> KnowledgeGraph {
        let registry = DomainRegistry::bundled().unwrap();
        let mut room = InstanceSeed::new("clinical-room", "ClinicalRoom").within("proposal");
        for (k, v) in attrs {
            room = room.with(*k, Value::Bool(*v));
        }
        let strategy = Strategy::new("facility-climate-compliance", "Generate Standard Plan")
            .with_seed(InstanceSeed::new("proposal", "Proposal"))
            .with_seed(room);
        builder::build(&registry.snapshot(), &strategy).unwrap()
    }

    fn run(g: &KnowledgeGraph, ids: &[&str]) -> Result<(), CompileError> {
        let active: Vec<&ConstraintRule> =
            ids.iter().map(|id| g.domain().rule(id).unwrap()).collect();
        let mut ws = WorkingSet::new(g);
        let derivations = saturate(&mut ws, &active)?;
        detect(&ws, &active, &derivations)
    }

    #[test]
    fn positive_and_negative_pressure_conflict() {
        let g = clinical(&[("is_operating_theater", true), ("is_isolation_room", true)]);
        let err = run(
            &g,
            &["theater-positive-pressure", "isolation-negative-pressure"],
        )
        .unwrap_err();
        match err {
            CompileError::ConstraintConflict {
                rule_a,
                rule_b,
                instance,
                attribute,
            } => {
                assert_eq!(rule_a, "theater-positive-pressure");
                assert_eq!(rule_b, "isolation-negative-pressure");
                assert_eq!(instance, "clinical-room");
                assert_eq!(attribute, "positive_pressure");
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn rule_order_in_activation_does_not_matter() {
        let g = clinical(&[("is_operating_theater", true), ("is_isolation_room", true)]);
        let err = run(
            &g,
            &["isolation-negative-pressure", "theater-positive-pressure"],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            CompileError::ConstraintConflict { ref rule_a, .. } if rule_a == "theater-positive-pressure"
        ));
    }

    #[test]
    fn single_antecedent_is_consistent() {
        let g = clinical(&[("is_operating_theater", true)]);
        run(
            &g,
            &["theater-positive-pressure", "isolation-negative-pressure"],
        )
        .unwrap();

        let g = clinical(&[("is_isolation_room", true)]);
        run(
            &g,
            &["theater-positive-pressure", "isolation-negative-pressure"],
        )
        .unwrap();
    }

    #[test]
    fn unsuppressed_exemption_conflicts_with_server_room() {
        let g = clinical(&[("is_server_room", true), ("is_small", true)]);
        let err = run(&g, &["size-exemption", "no-exempt-server-room"]).unwrap_err();
        assert!(matches!(
            err,
            CompileError::ConstraintConflict { ref attribute, .. } if attribute == "size_exemption_applies"
        ));
    }

    const CHAMBERS: &str = r#"
[chambers]
goal = "Generate Refrigeration Plan"
triggers = ["refrigeration"]
[chambers.intent]
container = "Site"
subject = "Chamber"
[[chambers.concepts]]
name = "Site"
[[chambers.concepts]]
name = "Chamber"
[chambers.concepts.attributes]
is_freezer = "bool"
sealed = "bool"
[[chambers.relations]]
name = "contains"
source = "Site"
target = "Chamber"
[[chambers.constraints]]
id = "freezer-sealed"
scope = "Chamber"
rule = "implies(is_freezer, sealed)"
[[chambers.constraints]]
id = "never-sealed"
scope = "Chamber"
rule = "and(not(sealed))"
"#;

    fn chamber(freezer: bool) -> KnowledgeGraph {
        let registry = DomainRegistry::new();
        registry.load_str("chambers.toml", CHAMBERS).unwrap();
        let strategy = Strategy::new("chambers", "Generate Refrigeration Plan")
            .with_seed(InstanceSeed::new("site", "Site"))
            .with_seed(
                InstanceSeed::new("chamber", "Chamber")
                    .within("site")
                    .with("is_freezer", Value::Bool(freezer)),
            );
        builder::build(&registry.snapshot(), &strategy).unwrap()
    }

    #[test]
    fn conjunction_rule_conflicts_with_derivation() {
        let g = chamber(true);
        let err = run(&g, &["never-sealed", "freezer-sealed"]).unwrap_err();
        match err {
            CompileError::ConstraintConflict {
                rule_a,
                rule_b,
                instance,
                attribute,
            } => {
                assert_eq!(rule_a, "freezer-sealed");
                assert_eq!(rule_b, "never-sealed");
                assert_eq!(instance, "chamber");
                assert_eq!(attribute, "sealed");
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn conjunction_rule_alone_is_consistent() {
        let g = chamber(false);
        run(&g, &["freezer-sealed", "never-sealed"]).unwrap();
    }

    #[test]
    fn asserted_facts_are_not_requirements() {
        let g = clinical(&[("is_isolation_room", true), ("positive_pressure", true)]);
        run(&g, &["isolation-negative-pressure"]).unwrap();
    }
}
