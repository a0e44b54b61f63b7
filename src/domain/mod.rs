//! Domain model: concept types, relation types, constraint rules and the
//! trigger vocabulary that routes free text to a domain.
//!
//! A [`Domain`] is immutable once validated. It is only ever produced by
//! [`schema::DomainDef::validate`], so every rule reference, relation
//! endpoint and vocabulary entry in it is known to resolve.

pub mod registry;
pub mod rule;
pub mod schema;

use std::collections::BTreeMap;
use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::text::Phrase;

use self::rule::RuleExpr;

/// Value kind of a concept attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeKind {
    Bool,
    Number,
    Text,
}

impl AttributeKind {
    /// Parse a declared kind name.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "bool" | "boolean" => Some(AttributeKind::Bool),
            "number" | "float" | "int" => Some(AttributeKind::Number),
            "text" | "string" => Some(AttributeKind::Text),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeKind::Bool => write!(f, "bool"),
            AttributeKind::Number => write!(f, "number"),
            AttributeKind::Text => write!(f, "text"),
        }
    }
}

/// A named category of instances, optionally specializing a parent type.
#[derive(Debug, Clone, PartialEq)]
pub struct ConceptType {
    pub name: String,
    pub parent: Option<String>,
    /// Attributes declared on this type (inherited ones are not repeated).
    pub attributes: BTreeMap<String, AttributeKind>,
}

/// How many sources a relation target may have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Cardinality {
    /// Every target has at most one source (containment).
    #[default]
    OneToMany,
    /// Any source may link any target.
    ManyToMany,
}

/// A named directed relation between two concept types.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationType {
    pub name: String,
    pub source: String,
    pub target: String,
    pub cardinality: Cardinality,
}

/// A declared constraint rule.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintRule {
    pub id: String,
    pub expr: RuleExpr,
    /// Restricts the instances the rule is evaluated over.
    pub scope: Option<String>,
    pub description: Option<String>,
}

impl ConstraintRule {
    /// The rule id as prose: `size-exemption` → `size exemption`.
    pub fn label(&self) -> String {
        self.id.replace(['-', '_'], " ")
    }
}

/// A plain attribute-indicating phrase ("small" → `is_small`).
#[derive(Debug, Clone)]
pub struct Marker {
    pub terms: Vec<Phrase>,
    pub attribute: String,
}

/// A critical-use override: forces attributes on the subject instance and
/// removes the named rules from the activated set.
#[derive(Debug, Clone)]
pub struct OverrideTrap {
    pub name: String,
    pub terms: Vec<Phrase>,
    pub force: Vec<String>,
    pub suppress: Vec<String>,
    pub goal: Option<String>,
}

/// Numeric extraction rule ("10 m2" → `area_m2 = 10`).
#[derive(Debug, Clone)]
pub struct Quantity {
    pub attribute: String,
    pub pattern: Regex,
    /// Concept instantiated once per counted unit, contained in the subject.
    pub spawn: Option<String>,
}

/// A more specific sub-domain, e.g. the healthcare variant of a facility domain.
#[derive(Debug, Clone)]
pub struct Specialization {
    pub name: String,
    pub triggers: Vec<Phrase>,
    /// Rules activated only under this specialization.
    pub rules: Vec<String>,
    /// General rules deactivated under this specialization.
    pub drop: Vec<String>,
    pub subject: Option<String>,
    pub goal: Option<String>,
}

/// The instances every request seeds: a container and the subject it holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentShape {
    pub container: String,
    pub subject: String,
}

/// A validated, immutable domain bundle.
#[derive(Debug, Clone)]
pub struct Domain {
    pub(crate) name: String,
    pub(crate) description: Option<String>,
    pub(crate) goal: String,
    pub(crate) priority: i32,
    pub(crate) concepts: Vec<ConceptType>,
    pub(crate) relations: Vec<RelationType>,
    pub(crate) rules: Vec<ConstraintRule>,
    pub(crate) triggers: Vec<Phrase>,
    pub(crate) markers: Vec<Marker>,
    pub(crate) traps: Vec<OverrideTrap>,
    pub(crate) quantities: Vec<Quantity>,
    pub(crate) specializations: Vec<Specialization>,
    pub(crate) intent: IntentShape,
}

impl Domain {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Default goal label.
    pub fn goal(&self) -> &str {
        &self.goal
    }

    /// Tie-breaker when several domains match the same input equally well.
    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn concepts(&self) -> &[ConceptType] {
        &self.concepts
    }

    pub fn concept(&self, name: &str) -> Option<&ConceptType> {
        self.concepts.iter().find(|c| c.name == name)
    }

    pub fn relations(&self) -> &[RelationType] {
        &self.relations
    }

    pub fn relation(&self, name: &str) -> Option<&RelationType> {
        self.relations.iter().find(|r| r.name == name)
    }

    /// Rules in declaration order.
    pub fn rules(&self) -> &[ConstraintRule] {
        &self.rules
    }

    pub fn rule(&self, id: &str) -> Option<&ConstraintRule> {
        self.rules.iter().find(|r| r.id == id)
    }

    /// Position of a rule in declaration order.
    pub fn rule_position(&self, id: &str) -> Option<usize> {
        self.rules.iter().position(|r| r.id == id)
    }

    pub fn triggers(&self) -> &[Phrase] {
        &self.triggers
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    pub fn traps(&self) -> &[OverrideTrap] {
        &self.traps
    }

    pub fn quantities(&self) -> &[Quantity] {
        &self.quantities
    }

    /// Specializations in priority order.
    pub fn specializations(&self) -> &[Specialization] {
        &self.specializations
    }

    pub fn specialization(&self, name: &str) -> Option<&Specialization> {
        self.specializations.iter().find(|s| s.name == name)
    }

    pub fn intent(&self) -> &IntentShape {
        &self.intent
    }

    /// Whether `concept` is `ancestor` or one of its descendants.
    pub fn is_a(&self, concept: &str, ancestor: &str) -> bool {
        let mut current = Some(concept);
        // Bounded by the concept count; parent chains are validated acyclic.
        for _ in 0..=self.concepts.len() {
            let Some(name) = current else {
                return false;
            };
            if name == ancestor {
                return true;
            }
            current = self.concept(name).and_then(|c| c.parent.as_deref());
        }
        false
    }

    /// Kind of `attribute` on `concept`, following the parent chain.
    pub fn attribute_kind(&self, concept: &str, attribute: &str) -> Option<AttributeKind> {
        let mut current = self.concept(concept);
        for _ in 0..=self.concepts.len() {
            let c = current?;
            if let Some(kind) = c.attributes.get(attribute) {
                return Some(*kind);
            }
            current = c.parent.as_deref().and_then(|p| self.concept(p));
        }
        None
    }

    /// Kind of an attribute declared anywhere in the domain.
    pub fn attribute(&self, attribute: &str) -> Option<AttributeKind> {
        self.concepts
            .iter()
            .find_map(|c| c.attributes.get(attribute).copied())
    }

    /// All attributes available on `concept`, inherited ones included.
    pub fn attributes_of(&self, concept: &str) -> BTreeMap<String, AttributeKind> {
        let mut out = BTreeMap::new();
        let mut current = self.concept(concept);
        for _ in 0..=self.concepts.len() {
            let Some(c) = current else { break };
            for (name, kind) in &c.attributes {
                out.entry(name.clone()).or_insert(*kind);
            }
            current = c.parent.as_deref().and_then(|p| self.concept(p));
        }
        out
    }

    /// The most general concept at or below `base` that carries every
    /// attribute in `needed`. Descendants are tried in declaration order.
    pub fn refine_concept<'a>(&'a self, base: &'a str, needed: &[&str]) -> Option<&'a str> {
        let carries = |concept: &str| {
            needed
                .iter()
                .all(|a| self.attribute_kind(concept, a).is_some())
        };
        if carries(base) {
            return Some(base);
        }
        self.concepts
            .iter()
            .map(|c| c.name.as_str())
            .find(|&name| name != base && self.is_a(name, base) && carries(name))
    }

    /// Rule ids active for the general domain or for `specialization`, in
    /// declaration order.
    ///
    /// Rules claimed by any specialization are excluded from the general set.
    pub fn rule_ids_for(&self, specialization: Option<&Specialization>) -> Vec<String> {
        self.rules
            .iter()
            .filter(|rule| {
                let claimed = self
                    .specializations
                    .iter()
                    .any(|s| s.rules.iter().any(|r| *r == rule.id));
                match specialization {
                    None => !claimed,
                    Some(s) => {
                        let own = s.rules.iter().any(|r| *r == rule.id);
                        let dropped = s.drop.iter().any(|r| *r == rule.id);
                        own || (!claimed && !dropped)
                    }
                }
            })
            .map(|rule| rule.id.clone())
            .collect()
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "domain {}", self.name)?;
        if let Some(desc) = &self.description {
            writeln!(f, "  {desc}")?;
        }
        writeln!(f, "  goal:      {}", self.goal)?;
        writeln!(
            f,
            "  triggers:  {}",
            self.triggers
                .iter()
                .map(|t| t.text())
                .collect::<Vec<_>>()
                .join(", ")
        )?;
        writeln!(f, "  concepts:")?;
        for c in &self.concepts {
            match &c.parent {
                Some(p) => writeln!(f, "    {} : {}", c.name, p)?,
                None => writeln!(f, "    {}", c.name)?,
            }
            for (attr, kind) in &c.attributes {
                writeln!(f, "      {attr}: {kind}")?;
            }
        }
        writeln!(f, "  relations:")?;
        for r in &self.relations {
            writeln!(f, "    {}: {} -> {}", r.name, r.source, r.target)?;
        }
        writeln!(f, "  constraints:")?;
        for r in &self.rules {
            writeln!(f, "    [{}] {}", r.id, r.expr)?;
        }
        for t in &self.traps {
            writeln!(
                f,
                "  trap {}: forces {} suppresses {}",
                t.name,
                t.force.join(", "),
                t.suppress.join(", ")
            )?;
        }
        for s in &self.specializations {
            writeln!(f, "  specialization {}: +{}", s.name, s.rules.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::schema::bundled_definitions;
    use super::*;

    fn facility() -> Domain {
        let defs = bundled_definitions().unwrap();
        defs.get("facility-climate-compliance")
            .unwrap()
            .validate("facility-climate-compliance")
            .unwrap()
    }

    #[test]
    fn subtypes_inherit_attributes() {
        let d = facility();
        assert!(d.is_a("ClinicalRoom", "Room"));
        assert!(!d.is_a("Room", "ClinicalRoom"));
        assert_eq!(
            d.attribute_kind("ClinicalRoom", "area_m2"),
            Some(AttributeKind::Number)
        );
        assert_eq!(d.attribute_kind("Proposal", "area_m2"), None);
        assert!(d.attributes_of("ClinicalRoom").contains_key("is_operating_theater"));
    }

    #[test]
    fn general_rules_exclude_specialized_ones() {
        let d = facility();
        let general = d.rule_ids_for(None);
        assert!(general.contains(&"size-exemption".to_string()));
        assert!(!general.contains(&"theater-positive-pressure".to_string()));

        let health = d.specialization("healthcare-facility").unwrap();
        let special = d.rule_ids_for(Some(health));
        assert!(special.contains(&"theater-positive-pressure".to_string()));
        assert!(special.contains(&"size-exemption".to_string()));
    }

    #[test]
    fn refine_concept_descends_to_carrier() {
        let d = facility();
        assert_eq!(d.refine_concept("Room", &["is_small"]), Some("Room"));
        assert_eq!(
            d.refine_concept("Room", &["is_operating_theater"]),
            Some("ClinicalRoom")
        );
        assert_eq!(d.refine_concept("Room", &["capacity_btu"]), None);
    }

    #[test]
    fn rule_label_is_prose() {
        let d = facility();
        assert_eq!(d.rule("size-exemption").unwrap().label(), "size exemption");
    }
}
