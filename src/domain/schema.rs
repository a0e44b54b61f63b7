//! Domain definition source ("DNA"): TOML documents mapping a domain name to
//! its concepts, relations, constraints and vocabulary.
//!
//! Definitions are parsed into plain [`DomainDef`] values and then validated
//! into immutable [`Domain`]s. Validation never stops at the first problem:
//! every unresolved reference in a definition is reported together.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, ForgeResult, SchemaError, SchemaProblem};
use crate::text::{self, Phrase};

use super::rule::parse_rule;
use super::{
    AttributeKind, Cardinality, ConceptType, ConstraintRule, Domain, IntentShape, Marker,
    OverrideTrap, Quantity, RelationType, Specialization,
};

// ── Definition model ────────────────────────────────────────────────────

/// A set of definitions keyed by domain name.
pub type DomainSet = BTreeMap<String, DomainDef>;

/// Unvalidated domain definition, as written in a definition file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DomainDef {
    pub goal: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub triggers: Vec<String>,
    pub intent: IntentDef,
    #[serde(default)]
    pub concepts: Vec<ConceptDef>,
    #[serde(default)]
    pub relations: Vec<RelationDef>,
    #[serde(default)]
    pub constraints: Vec<ConstraintDef>,
    #[serde(default)]
    pub markers: Vec<MarkerDef>,
    #[serde(default)]
    pub traps: Vec<TrapDef>,
    #[serde(default)]
    pub quantities: Vec<QuantityDef>,
    #[serde(default)]
    pub specializations: Vec<SpecializationDef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IntentDef {
    pub container: String,
    pub subject: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConceptDef {
    pub name: String,
    #[serde(default)]
    pub parent: Option<String>,
    /// Attribute name → kind (`bool`, `number`, `text`).
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelationDef {
    pub name: String,
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub cardinality: Cardinality,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConstraintDef {
    pub id: String,
    pub rule: String,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MarkerDef {
    pub terms: Vec<String>,
    pub attribute: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrapDef {
    pub name: String,
    pub terms: Vec<String>,
    pub force: Vec<String>,
    #[serde(default)]
    pub suppress: Vec<String>,
    #[serde(default)]
    pub goal: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuantityDef {
    pub attribute: String,
    pub units: Vec<String>,
    #[serde(default)]
    pub spawn: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpecializationDef {
    pub name: String,
    pub triggers: Vec<String>,
    #[serde(default)]
    pub rules: Vec<String>,
    #[serde(default)]
    pub drop: Vec<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub goal: Option<String>,
}

// ── Parsing ─────────────────────────────────────────────────────────────

const FACILITY_CLIMATE_TOML: &str =
    include_str!("../../data/domains/facility-climate-compliance.toml");

/// Parse a definition document. Syntax and shape errors become a single
/// [`SchemaProblem::Parse`].
pub fn parse_definitions(source_name: &str, toml_str: &str) -> Result<DomainSet, SchemaError> {
    toml::from_str(toml_str).map_err(|e| SchemaError {
        source_name: source_name.to_string(),
        problems: vec![SchemaProblem::Parse {
            message: e.to_string(),
        }],
    })
}

/// Definitions bundled into the binary.
pub fn bundled_definitions() -> Result<DomainSet, SchemaError> {
    parse_definitions("bundled:facility-climate-compliance", FACILITY_CLIMATE_TOML)
}

/// Read and parse a definition file.
pub fn read_definitions(path: &Path) -> ForgeResult<DomainSet> {
    let content = std::fs::read_to_string(path).map_err(|source| DomainError::Read {
        path: path.display().to_string(),
        source,
    })?;
    Ok(parse_definitions(&path.display().to_string(), &content)?)
}

/// Validate every definition of a set, collecting all problems.
pub fn validate_set(source_name: &str, set: &DomainSet) -> Result<Vec<Domain>, SchemaError> {
    let mut domains = Vec::with_capacity(set.len());
    let mut problems = Vec::new();
    for (name, def) in set {
        match def.validate(name) {
            Ok(domain) => domains.push(domain),
            Err(mut found) => problems.append(&mut found),
        }
    }
    if problems.is_empty() {
        Ok(domains)
    } else {
        Err(SchemaError {
            source_name: source_name.to_string(),
            problems,
        })
    }
}

// ── Validation ──────────────────────────────────────────────────────────

struct Validator<'a> {
    domain: &'a str,
    problems: Vec<SchemaProblem>,
}

impl Validator<'_> {
    fn ctx(&self, what: impl std::fmt::Display) -> String {
        format!("{}: {what}", self.domain)
    }

    fn push(&mut self, problem: SchemaProblem) {
        self.problems.push(problem);
    }

    fn phrases(&mut self, what: &str, raw: &[String]) -> Vec<Phrase> {
        if raw.is_empty() {
            let context = self.ctx(what);
            self.push(SchemaProblem::EmptyVocabulary { context });
            return Vec::new();
        }
        let mut out = Vec::with_capacity(raw.len());
        for term in raw {
            match Phrase::new(term) {
                Some(p) => out.push(p),
                None => {
                    let context = self.ctx(what);
                    self.push(SchemaProblem::InvalidValue {
                        context,
                        message: format!("term \"{term}\" is empty after normalization"),
                    });
                }
            }
        }
        out
    }

    fn concept_ref(&mut self, skeleton: &Domain, what: &str, name: &str) -> bool {
        if skeleton.concept(name).is_some() {
            return true;
        }
        let context = self.ctx(what);
        self.push(SchemaProblem::UnknownConcept {
            context,
            name: name.to_string(),
        });
        false
    }

    fn bool_attribute(&mut self, skeleton: &Domain, what: &str, name: &str) {
        match skeleton.attribute(name) {
            Some(AttributeKind::Bool) => {}
            Some(kind) => {
                let context = self.ctx(what);
                self.push(SchemaProblem::NotBoolean {
                    context,
                    name: name.to_string(),
                    kind: kind.to_string(),
                });
            }
            None => {
                let context = self.ctx(what);
                self.push(SchemaProblem::UnresolvedReference {
                    context,
                    name: name.to_string(),
                });
            }
        }
    }

    fn rule_ref(&mut self, rules: &[ConstraintRule], what: &str, id: &str) {
        if !rules.iter().any(|r| r.id == id) {
            let context = self.ctx(what);
            self.push(SchemaProblem::UnknownRule {
                context,
                rule: id.to_string(),
            });
        }
    }
}

impl DomainDef {
    /// Validate into a [`Domain`], or return every problem found.
    pub fn validate(&self, name: &str) -> Result<Domain, Vec<SchemaProblem>> {
        let mut v = Validator {
            domain: name,
            problems: Vec::new(),
        };

        if self.goal.trim().is_empty() {
            let context = v.ctx("goal");
            v.push(SchemaProblem::InvalidValue {
                context,
                message: "goal label must not be empty".into(),
            });
        }

        let mut skeleton = Domain {
            name: name.to_string(),
            description: self.description.clone(),
            goal: self.goal.clone(),
            priority: self.priority,
            concepts: self.concepts(&mut v),
            relations: Vec::new(),
            rules: Vec::new(),
            triggers: Vec::new(),
            markers: Vec::new(),
            traps: Vec::new(),
            quantities: Vec::new(),
            specializations: Vec::new(),
            intent: IntentShape {
                container: self.intent.container.clone(),
                subject: self.intent.subject.clone(),
            },
        };

        check_parents(&skeleton, &mut v);
        check_attribute_namespace(&skeleton, &mut v);

        let container_ok = v.concept_ref(&skeleton, "intent container", &self.intent.container);
        let subject_ok = v.concept_ref(&skeleton, "intent subject", &self.intent.subject);

        let mut seen_relations = HashSet::new();
        for rel in &self.relations {
            let what = format!("relation {}", rel.name);
            if !seen_relations.insert(rel.name.as_str()) {
                let context = v.ctx(&what);
                v.push(SchemaProblem::InvalidValue {
                    context,
                    message: "duplicate relation name".into(),
                });
            }
            let ok_source = v.concept_ref(&skeleton, &what, &rel.source);
            let ok_target = v.concept_ref(&skeleton, &what, &rel.target);
            if ok_source && ok_target {
                skeleton.relations.push(RelationType {
                    name: rel.name.clone(),
                    source: rel.source.clone(),
                    target: rel.target.clone(),
                    cardinality: rel.cardinality,
                });
            }
        }

        if container_ok && subject_ok {
            check_intent_shape(&skeleton, &mut v);
        }

        skeleton.rules = self.rules(&skeleton, &mut v);
        skeleton.triggers = v.phrases("triggers", &self.triggers);

        for (i, m) in self.markers.iter().enumerate() {
            let what = format!("marker #{} ({})", i + 1, m.attribute);
            let terms = v.phrases(&what, &m.terms);
            v.bool_attribute(&skeleton, &what, &m.attribute);
            skeleton.markers.push(Marker {
                terms,
                attribute: m.attribute.clone(),
            });
        }

        for t in &self.traps {
            let what = format!("trap {}", t.name);
            let terms = v.phrases(&what, &t.terms);
            if t.force.is_empty() {
                let context = v.ctx(&what);
                v.push(SchemaProblem::InvalidValue {
                    context,
                    message: "a trap must force at least one attribute".into(),
                });
            }
            for attr in &t.force {
                v.bool_attribute(&skeleton, &what, attr);
            }
            for id in &t.suppress {
                v.rule_ref(&skeleton.rules, &what, id);
            }
            skeleton.traps.push(OverrideTrap {
                name: t.name.clone(),
                terms,
                force: t.force.clone(),
                suppress: t.suppress.clone(),
                goal: t.goal.clone(),
            });
        }

        for q in &self.quantities {
            let what = format!("quantity {}", q.attribute);
            match skeleton.attribute(&q.attribute) {
                Some(AttributeKind::Number) => {}
                Some(_) => {
                    let context = v.ctx(&what);
                    v.push(SchemaProblem::NotNumeric {
                        context,
                        name: q.attribute.clone(),
                    });
                }
                None => {
                    let context = v.ctx(&what);
                    v.push(SchemaProblem::UnresolvedReference {
                        context,
                        name: q.attribute.clone(),
                    });
                }
            }
            if let Some(spawn) = &q.spawn
                && v.concept_ref(&skeleton, &what, spawn)
                && subject_ok
                && !linked(&skeleton, &self.intent.subject, spawn)
            {
                let context = v.ctx(&what);
                v.push(SchemaProblem::InvalidValue {
                    context,
                    message: format!(
                        "no relation links subject \"{}\" to spawned \"{spawn}\"",
                        self.intent.subject
                    ),
                });
            }
            if v.phrases(&what, &q.units).is_empty() {
                continue;
            }
            match text::quantity_pattern(&q.units) {
                Ok(pattern) => skeleton.quantities.push(Quantity {
                    attribute: q.attribute.clone(),
                    pattern,
                    spawn: q.spawn.clone(),
                }),
                Err(e) => {
                    let context = v.ctx(&what);
                    v.push(SchemaProblem::InvalidValue {
                        context,
                        message: format!("cannot compile unit pattern: {e}"),
                    });
                }
            }
        }

        for s in &self.specializations {
            let what = format!("specialization {}", s.name);
            let triggers = v.phrases(&what, &s.triggers);
            for id in s.rules.iter().chain(&s.drop) {
                v.rule_ref(&skeleton.rules, &what, id);
            }
            if let Some(subject) = &s.subject
                && v.concept_ref(&skeleton, &what, subject)
                && !skeleton.is_a(subject, &self.intent.subject)
            {
                let context = v.ctx(&what);
                v.push(SchemaProblem::InvalidValue {
                    context,
                    message: format!(
                        "subject \"{subject}\" must specialize \"{}\"",
                        self.intent.subject
                    ),
                });
            }
            skeleton.specializations.push(Specialization {
                name: s.name.clone(),
                triggers,
                rules: s.rules.clone(),
                drop: s.drop.clone(),
                subject: s.subject.clone(),
                goal: s.goal.clone(),
            });
        }

        if v.problems.is_empty() {
            Ok(skeleton)
        } else {
            Err(v.problems)
        }
    }

    fn concepts(&self, v: &mut Validator<'_>) -> Vec<ConceptType> {
        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(self.concepts.len());
        for c in &self.concepts {
            if !seen.insert(c.name.as_str()) {
                let context = v.ctx("concepts");
                v.push(SchemaProblem::DuplicateConcept {
                    context,
                    name: c.name.clone(),
                });
                continue;
            }
            let mut attributes = BTreeMap::new();
            for (attr, kind) in &c.attributes {
                match AttributeKind::parse(kind) {
                    Some(k) => {
                        attributes.insert(attr.clone(), k);
                    }
                    None => {
                        let context = v.ctx(format!("concept {}", c.name));
                        v.push(SchemaProblem::InvalidAttributeKind {
                            context,
                            attribute: attr.clone(),
                            kind: kind.clone(),
                        });
                    }
                }
            }
            out.push(ConceptType {
                name: c.name.clone(),
                parent: c.parent.clone(),
                attributes,
            });
        }
        out
    }

    fn rules(&self, skeleton: &Domain, v: &mut Validator<'_>) -> Vec<ConstraintRule> {
        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(self.constraints.len());
        for c in &self.constraints {
            let what = format!("constraint {}", c.id);
            if !seen.insert(c.id.as_str()) {
                let context = v.ctx("constraints");
                v.push(SchemaProblem::DuplicateRule {
                    context,
                    id: c.id.clone(),
                });
                continue;
            }
            let expr = match parse_rule(&c.rule) {
                Ok(expr) => expr,
                Err(e) => {
                    let context = v.ctx(&what);
                    v.push(SchemaProblem::RuleSyntax {
                        context,
                        message: e.to_string(),
                    });
                    continue;
                }
            };

            for term in expr.terms() {
                for name in term.bare_names() {
                    if skeleton.concept(name).is_none() {
                        v.bool_attribute(skeleton, &what, name);
                    }
                }
                for attr in term.compared_attributes() {
                    match skeleton.attribute(attr) {
                        Some(AttributeKind::Number) => {}
                        Some(_) => {
                            let context = v.ctx(&what);
                            v.push(SchemaProblem::NotNumeric {
                                context,
                                name: attr.to_string(),
                            });
                        }
                        None if skeleton.concept(attr).is_some() => {
                            let context = v.ctx(&what);
                            v.push(SchemaProblem::NotNumeric {
                                context,
                                name: attr.to_string(),
                            });
                        }
                        None => {
                            let context = v.ctx(&what);
                            v.push(SchemaProblem::UnresolvedReference {
                                context,
                                name: attr.to_string(),
                            });
                        }
                    }
                }
            }
            if let Some(scope) = expr.cardinality_scope() {
                v.concept_ref(skeleton, &what, scope);
            }
            if let Some(scope) = &c.scope {
                v.concept_ref(skeleton, &what, scope);
            }

            out.push(ConstraintRule {
                id: c.id.clone(),
                expr,
                scope: c.scope.clone(),
                description: c.description.clone(),
            });
        }
        out
    }
}

fn check_parents(skeleton: &Domain, v: &mut Validator<'_>) {
    for c in &skeleton.concepts {
        let Some(parent) = &c.parent else { continue };
        if skeleton.concept(parent).is_none() {
            let context = v.ctx(format!("concept {} parent", c.name));
            v.push(SchemaProblem::UnknownConcept {
                context,
                name: parent.clone(),
            });
            continue;
        }
        let mut visited = HashSet::from([c.name.as_str()]);
        let mut current = Some(parent.as_str());
        while let Some(name) = current {
            if !visited.insert(name) {
                let context = v.ctx("concepts");
                v.push(SchemaProblem::ParentCycle {
                    context,
                    concept: c.name.clone(),
                });
                break;
            }
            current = skeleton.concept(name).and_then(|p| p.parent.as_deref());
        }
    }
}

/// Whether some relation accepts `parent` as source and `child` as target.
fn linked(skeleton: &Domain, parent: &str, child: &str) -> bool {
    skeleton
        .relations
        .iter()
        .any(|r| skeleton.is_a(parent, &r.source) && skeleton.is_a(child, &r.target))
}

/// The container and every concept the subject can refine to must get
/// distinct instance keys, and a relation must link the container to the
/// subject.
fn check_intent_shape(skeleton: &Domain, v: &mut Validator<'_>) {
    let intent = &skeleton.intent;
    let container_key = text::kebab_case(&intent.container);
    for c in &skeleton.concepts {
        if skeleton.is_a(&c.name, &intent.subject) && text::kebab_case(&c.name) == container_key {
            let context = v.ctx("intent");
            v.push(SchemaProblem::InvalidValue {
                context,
                message: format!(
                    "subject \"{}\" and container \"{}\" share the instance key \"{container_key}\"",
                    c.name, intent.container
                ),
            });
        }
    }
    if !linked(skeleton, &intent.container, &intent.subject) {
        let context = v.ctx("intent");
        v.push(SchemaProblem::InvalidValue {
            context,
            message: format!(
                "no relation links container \"{}\" to subject \"{}\"",
                intent.container, intent.subject
            ),
        });
    }
}

fn check_attribute_namespace(skeleton: &Domain, v: &mut Validator<'_>) {
    let mut kinds: BTreeMap<&str, AttributeKind> = BTreeMap::new();
    let mut clashed = HashSet::new();
    for c in &skeleton.concepts {
        for (attr, kind) in &c.attributes {
            match kinds.get(attr.as_str()) {
                Some(existing) if existing != kind && clashed.insert(attr.as_str()) => {
                    let context = v.ctx(format!("concept {}", c.name));
                    v.push(SchemaProblem::AttributeKindClash {
                        context,
                        attribute: attr.clone(),
                    });
                }
                Some(_) => {}
                None => {
                    kinds.insert(attr, *kind);
                }
            }
            if skeleton.concept(attr).is_some() {
                let context = v.ctx(format!("concept {}", c.name));
                v.push(SchemaProblem::AmbiguousName {
                    context,
                    name: attr.clone(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[ward]
goal = "Generate Ward Plan"
triggers = ["ward"]

[ward.intent]
container = "Building"
subject = "Ward"

[[ward.concepts]]
name = "Building"

[[ward.concepts]]
name = "Ward"
[ward.concepts.attributes]
beds = "number"
is_critical = "bool"
needs_plan = "bool"

[[ward.relations]]
name = "contains"
source = "Building"
target = "Ward"

[[ward.constraints]]
id = "critical-plan"
rule = "implies(is_critical, needs_plan)"
"#;

    #[test]
    fn bundled_definitions_validate() {
        let set = bundled_definitions().unwrap();
        let domains = validate_set("bundled", &set).unwrap();
        assert_eq!(domains.len(), 1);
        let d = &domains[0];
        assert_eq!(d.name(), "facility-climate-compliance");
        assert_eq!(d.rules().first().map(|r| r.id.as_str()), Some("size-exemption"));
        assert_eq!(d.traps().len(), 2);
        assert_eq!(d.specializations()[0].name, "healthcare-facility");
    }

    #[test]
    fn minimal_definition_validates() {
        let set = parse_definitions("inline", MINIMAL).unwrap();
        let domain = set["ward"].validate("ward").unwrap();
        assert_eq!(domain.intent().subject, "Ward");
        assert_eq!(domain.relation("contains").unwrap().cardinality, Cardinality::OneToMany);
    }

    #[test]
    fn every_unresolved_reference_is_reported() {
        let broken = MINIMAL.replace(
            "implies(is_critical, needs_plan)",
            "implies(and(is_isolated, Wing), needs_plan)",
        ) + r#"
[[ward.constraints]]
id = "beds"
rule = "at_least(needs_plan, 1, Floor)"
"#;
        let set = parse_definitions("inline", &broken).unwrap();
        let problems = set["ward"].validate("ward").unwrap_err();
        let unresolved: Vec<String> = problems
            .iter()
            .filter_map(|p| match p {
                SchemaProblem::UnresolvedReference { name, .. } => Some(name.clone()),
                SchemaProblem::UnknownConcept { name, .. } => Some(name.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(unresolved, vec!["is_isolated", "Wing", "Floor"]);
    }

    #[test]
    fn type_errors_in_rules_are_reported() {
        let broken = MINIMAL.replace(
            "implies(is_critical, needs_plan)",
            "implies(beds, is_critical > 2)",
        );
        let set = parse_definitions("inline", &broken).unwrap();
        let problems = set["ward"].validate("ward").unwrap_err();
        assert!(problems
            .iter()
            .any(|p| matches!(p, SchemaProblem::NotBoolean { name, .. } if name == "beds")));
        assert!(problems
            .iter()
            .any(|p| matches!(p, SchemaProblem::NotNumeric { name, .. } if name == "is_critical")));
    }

    #[test]
    fn relation_to_unregistered_concept_is_reported() {
        let broken = MINIMAL.replace("target = \"Ward\"", "target = \"Annex\"");
        let set = parse_definitions("inline", &broken).unwrap();
        let problems = set["ward"].validate("ward").unwrap_err();
        assert!(problems.iter().any(
            |p| matches!(p, SchemaProblem::UnknownConcept { name, context } if name == "Annex" && context.contains("relation contains"))
        ));
    }

    #[test]
    fn parent_cycles_are_rejected() {
        let cyclic = MINIMAL.replace(
            "name = \"Building\"\n",
            "name = \"Building\"\nparent = \"Ward\"\n",
        )
        .replace("name = \"Ward\"\n", "name = \"Ward\"\nparent = \"Building\"\n");
        let set = parse_definitions("inline", &cyclic).unwrap();
        let problems = set["ward"].validate("ward").unwrap_err();
        assert!(problems
            .iter()
            .any(|p| matches!(p, SchemaProblem::ParentCycle { .. })));
    }

    #[test]
    fn unknown_fields_fail_to_parse() {
        let typo = MINIMAL.replace("triggers = [\"ward\"]", "trigers = [\"ward\"]");
        let err = parse_definitions("inline", &typo).unwrap_err();
        assert!(matches!(err.problems[0], SchemaProblem::Parse { .. }));
    }

    #[test]
    fn trap_suppressing_unknown_rule_is_reported() {
        let with_trap = MINIMAL.to_string()
            + r#"
[[ward.traps]]
name = "icu"
terms = ["icu"]
force = ["is_critical"]
suppress = ["bed-exemption"]
"#;
        let set = parse_definitions("inline", &with_trap).unwrap();
        let problems = set["ward"].validate("ward").unwrap_err();
        assert!(problems.iter().any(
            |p| matches!(p, SchemaProblem::UnknownRule { rule, .. } if rule == "bed-exemption")
        ));
    }

    fn intent_problems(problems: &[SchemaProblem]) -> Vec<String> {
        problems
            .iter()
            .filter_map(|p| match p {
                SchemaProblem::InvalidValue { message, .. } => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn container_equal_to_subject_is_rejected() {
        let same = MINIMAL.replace("container = \"Building\"", "container = \"Ward\"");
        let set = parse_definitions("inline", &same).unwrap();
        let problems = set["ward"].validate("ward").unwrap_err();
        let messages = intent_problems(&problems);
        assert!(messages.iter().any(|m| m.contains("share the instance key \"ward\"")));
    }

    #[test]
    fn unlinked_container_and_subject_are_rejected() {
        let unlinked = MINIMAL.replace("source = \"Building\"", "source = \"Ward\"");
        let set = parse_definitions("inline", &unlinked).unwrap();
        let problems = set["ward"].validate("ward").unwrap_err();
        assert_eq!(
            intent_problems(&problems),
            vec!["no relation links container \"Building\" to subject \"Ward\""]
        );
    }

    #[test]
    fn unreachable_spawn_concept_is_rejected() {
        let spawning = MINIMAL.to_string()
            + r#"
[[ward.concepts]]
name = "Bed"

[[ward.quantities]]
attribute = "beds"
units = ["beds"]
spawn = "Bed"
"#;
        let set = parse_definitions("inline", &spawning).unwrap();
        let problems = set["ward"].validate("ward").unwrap_err();
        assert_eq!(
            intent_problems(&problems),
            vec!["no relation links subject \"Ward\" to spawned \"Bed\""]
        );

        let housed = spawning
            + r#"
[[ward.relations]]
name = "has_bed"
source = "Ward"
target = "Bed"
"#;
        let set = parse_definitions("inline", &housed).unwrap();
        set["ward"].validate("ward").unwrap();
    }
}
