//! Rich diagnostic error types for intent-forge.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes, help text, and source chains. Every error can also be
//! projected into a transport-friendly [`ErrorPayload`] (`kind` + `message` +
//! optional structured `details`) for crossing a process or network boundary.

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::config::ConfigError;
use crate::paths::PathError;

/// Top-level error type for intent-forge.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain through to the caller. Pipeline stages return these unchanged.
#[derive(Debug, Error, Diagnostic)]
pub enum ForgeError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Classify(#[from] ClassifyError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Path(#[from] PathError),
}

impl ForgeError {
    /// Stable error kind used by transport layers.
    pub fn kind(&self) -> &'static str {
        match self {
            ForgeError::Domain(DomainError::UnknownDomain { .. }) => "UnknownDomainError",
            ForgeError::Domain(DomainError::AlreadyRegistered { .. }) => "DomainRegistrationError",
            ForgeError::Domain(DomainError::Read { .. }) => "DomainSourceError",
            ForgeError::Schema(_) => "SchemaError",
            ForgeError::Classify(_) => "UnrecognizedIntentError",
            ForgeError::Graph(_) => "GraphConstructionError",
            ForgeError::Compile(CompileError::ConstraintConflict { .. }) => {
                "ConstraintConflictError"
            }
            ForgeError::Compile(_) => "CompilationError",
            ForgeError::Config(_) | ForgeError::Path(_) => "ConfigError",
        }
    }

    /// Structured details for the error, if it carries any.
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            ForgeError::Domain(DomainError::UnknownDomain { name })
            | ForgeError::Domain(DomainError::AlreadyRegistered { name }) => {
                Some(json!({ "domain": name }))
            }
            ForgeError::Domain(DomainError::Read { path, .. }) => Some(json!({ "path": path })),
            ForgeError::Schema(e) => Some(json!({
                "source": e.source_name,
                "problems": e.problems.iter().map(|p| p.to_string()).collect::<Vec<_>>(),
            })),
            ForgeError::Classify(ClassifyError::UnrecognizedIntent { preview }) => {
                Some(json!({ "input": preview }))
            }
            ForgeError::Graph(e) => Some(json!({ "graph": e.to_string() })),
            ForgeError::Compile(CompileError::ConstraintConflict {
                rule_a,
                rule_b,
                instance,
                attribute,
            }) => Some(json!({
                "rules": [rule_a, rule_b],
                "instance": instance,
                "attribute": attribute,
            })),
            ForgeError::Compile(CompileError::UnresolvedReference { rule, name }) => {
                Some(json!({ "rule": rule, "reference": name }))
            }
            ForgeError::Compile(CompileError::ForeignRule { rule, domain }) => {
                Some(json!({ "rule": rule, "domain": domain }))
            }
            ForgeError::Compile(CompileError::DomainMismatch {
                strategy_domain,
                graph_domain,
            }) => Some(json!({
                "strategy_domain": strategy_domain,
                "graph_domain": graph_domain,
            })),
            ForgeError::Config(_) | ForgeError::Path(_) => None,
        }
    }

    /// Project into the transport representation.
    pub fn payload(&self) -> ErrorPayload {
        ErrorPayload {
            kind: self.kind().to_string(),
            message: self.to_string(),
            details: self.details(),
        }
    }
}

/// Transport representation of any [`ForgeError`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Domain registry errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum DomainError {
    #[error("unknown domain: \"{name}\"")]
    #[diagnostic(
        code(forge::domain::unknown),
        help(
            "No domain with this name is registered. List registered domains with \
             `forge domains list`, or load a definition file with `--dna`."
        )
    )]
    UnknownDomain { name: String },

    #[error("domain \"{name}\" is already registered")]
    #[diagnostic(
        code(forge::domain::already_registered),
        help("Use `reload` to replace an existing domain definition.")
    )]
    AlreadyRegistered { name: String },

    #[error("failed to read domain definitions: {path}")]
    #[diagnostic(
        code(forge::domain::read),
        help("Ensure the definition file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Schema errors
// ---------------------------------------------------------------------------

/// A domain definition failed validation. Lists every problem found, not
/// just the first.
#[derive(Debug, Error, Diagnostic)]
#[error("invalid domain definition \"{source_name}\": {} problem(s)", .problems.len())]
#[diagnostic(
    code(forge::schema::invalid),
    help(
        "Fix every listed problem. The registry keeps the previously loaded \
         domains until a definition validates completely."
    )
)]
pub struct SchemaError {
    /// Domain name or file the definition came from.
    pub source_name: String,
    #[related]
    pub problems: Vec<SchemaProblem>,
}

/// A single validation finding inside a [`SchemaError`].
#[derive(Debug, Clone, PartialEq, Error, Diagnostic)]
pub enum SchemaProblem {
    #[error("cannot parse definition: {message}")]
    #[diagnostic(code(forge::schema::parse))]
    Parse { message: String },

    #[error("{context}: duplicate concept \"{name}\"")]
    #[diagnostic(code(forge::schema::duplicate_concept))]
    DuplicateConcept { context: String, name: String },

    #[error("{context}: parent chain of \"{concept}\" is cyclic")]
    #[diagnostic(code(forge::schema::parent_cycle))]
    ParentCycle { context: String, concept: String },

    #[error("{context}: attribute \"{attribute}\" has unknown kind \"{kind}\" (expected bool, number or text)")]
    #[diagnostic(code(forge::schema::attribute_kind))]
    InvalidAttributeKind {
        context: String,
        attribute: String,
        kind: String,
    },

    #[error("{context}: attribute \"{attribute}\" is declared with conflicting kinds")]
    #[diagnostic(code(forge::schema::attribute_clash))]
    AttributeKindClash { context: String, attribute: String },

    #[error("{context}: \"{name}\" names both a concept and an attribute")]
    #[diagnostic(code(forge::schema::ambiguous_name))]
    AmbiguousName { context: String, name: String },

    #[error("{context}: unknown concept \"{name}\"")]
    #[diagnostic(code(forge::schema::unknown_concept))]
    UnknownConcept { context: String, name: String },

    #[error("{context}: duplicate rule id \"{id}\"")]
    #[diagnostic(code(forge::schema::duplicate_rule))]
    DuplicateRule { context: String, id: String },

    #[error("{context}: rule syntax error: {message}")]
    #[diagnostic(code(forge::schema::rule_syntax))]
    RuleSyntax { context: String, message: String },

    #[error("{context}: unresolved reference \"{name}\"")]
    #[diagnostic(
        code(forge::schema::unresolved),
        help("Declare it as a concept or as an attribute of a concept in this domain.")
    )]
    UnresolvedReference { context: String, name: String },

    #[error("{context}: \"{name}\" is used as a boolean test but is a {kind} attribute")]
    #[diagnostic(code(forge::schema::not_boolean))]
    NotBoolean {
        context: String,
        name: String,
        kind: String,
    },

    #[error("{context}: \"{name}\" is compared numerically but is not a number attribute")]
    #[diagnostic(code(forge::schema::not_numeric))]
    NotNumeric { context: String, name: String },

    #[error("{context}: unknown rule \"{rule}\"")]
    #[diagnostic(code(forge::schema::unknown_rule))]
    UnknownRule { context: String, rule: String },

    #[error("{context}: vocabulary is empty")]
    #[diagnostic(code(forge::schema::empty_vocabulary))]
    EmptyVocabulary { context: String },

    #[error("{context}: {message}")]
    #[diagnostic(code(forge::schema::invalid_value))]
    InvalidValue { context: String, message: String },
}

// ---------------------------------------------------------------------------
// Classification errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ClassifyError {
    #[error("intent not understood: no domain vocabulary matches \"{preview}\"")]
    #[diagnostic(
        code(forge::classify::unrecognized),
        help(
            "None of the registered domains' trigger phrases occur in the input. \
             Rephrase the request, or register a domain that covers it."
        )
    )]
    UnrecognizedIntent { preview: String },
}

// ---------------------------------------------------------------------------
// Graph construction errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum GraphError {
    #[error("seed \"{seed}\" has concept \"{concept}\" which is not part of domain \"{domain}\"")]
    #[diagnostic(
        code(forge::graph::foreign_concept),
        help(
            "The strategy and the active domain disagree. This is a classifier/registry \
             consistency bug; the strategy must only seed concepts of its own domain."
        )
    )]
    ForeignConcept {
        domain: String,
        concept: String,
        seed: String,
    },

    #[error("concept \"{concept}\" has no attribute \"{attribute}\"")]
    #[diagnostic(code(forge::graph::unknown_attribute))]
    UnknownAttribute { concept: String, attribute: String },

    #[error("attribute \"{attribute}\" of \"{concept}\" expects a {expected} value")]
    #[diagnostic(code(forge::graph::attribute_type))]
    AttributeType {
        concept: String,
        attribute: String,
        expected: String,
    },

    #[error("duplicate instance label \"{label}\"")]
    #[diagnostic(code(forge::graph::duplicate_label))]
    DuplicateLabel { label: String },

    #[error("edge \"{relation}\" references a missing instance ({source_label} -> {target_label})")]
    #[diagnostic(
        code(forge::graph::dangling_edge),
        help("Both endpoints of an edge must exist before the edge is added.")
    )]
    DanglingEdge {
        relation: String,
        source_label: String,
        target_label: String,
    },

    #[error("relation \"{relation}\" is not declared in domain \"{domain}\"")]
    #[diagnostic(code(forge::graph::unknown_relation))]
    UnknownRelation { relation: String, domain: String },

    #[error("relation \"{relation}\" cannot connect {source_concept} -> {target_concept}")]
    #[diagnostic(code(forge::graph::relation_mismatch))]
    RelationMismatch {
        relation: String,
        source_concept: String,
        target_concept: String,
    },

    #[error("\"{target_label}\" already has a \"{relation}\" source; the relation is one-to-many")]
    #[diagnostic(code(forge::graph::cardinality))]
    CardinalityExceeded {
        relation: String,
        target_label: String,
    },

    #[error("no relation in domain \"{domain}\" links \"{parent}\" to \"{child}\"")]
    #[diagnostic(code(forge::graph::no_relation))]
    NoRelation {
        domain: String,
        parent: String,
        child: String,
    },
}

// ---------------------------------------------------------------------------
// Compilation errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum CompileError {
    #[error(
        "constraint conflict on \"{instance}\".{attribute}: \"{rule_a}\" and \"{rule_b}\" \
         require contradictory values"
    )]
    #[diagnostic(
        code(forge::compile::conflict),
        help(
            "Two activated rules demand opposite values for the same attribute of the \
             same instance. Neither wins automatically; revise the domain rules or the \
             request so that only one of them applies."
        )
    )]
    ConstraintConflict {
        rule_a: String,
        rule_b: String,
        instance: String,
        attribute: String,
    },

    #[error("rule \"{rule}\" references \"{name}\", which the knowledge graph cannot resolve")]
    #[diagnostic(code(forge::compile::unresolved))]
    UnresolvedReference { rule: String, name: String },

    #[error("rule \"{rule}\" does not belong to domain \"{domain}\"")]
    #[diagnostic(
        code(forge::compile::foreign_rule),
        help("Strategies may only activate rules declared by their own domain.")
    )]
    ForeignRule { rule: String, domain: String },

    #[error("strategy targets domain \"{strategy_domain}\" but the graph was built for \"{graph_domain}\"")]
    #[diagnostic(code(forge::compile::domain_mismatch))]
    DomainMismatch {
        strategy_domain: String,
        graph_domain: String,
    },
}

/// Convenience alias for functions returning intent-forge results.
pub type ForgeResult<T> = std::result::Result<T, ForgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_error_converts_to_forge_error() {
        let err = DomainError::UnknownDomain {
            name: "bakery".into(),
        };
        let forge: ForgeError = err.into();
        assert!(matches!(
            forge,
            ForgeError::Domain(DomainError::UnknownDomain { .. })
        ));
        assert_eq!(forge.kind(), "UnknownDomainError");
    }

    #[test]
    fn conflict_payload_names_both_rules() {
        let err: ForgeError = CompileError::ConstraintConflict {
            rule_a: "theater-positive-pressure".into(),
            rule_b: "isolation-negative-pressure".into(),
            instance: "clinical-room".into(),
            attribute: "positive_pressure".into(),
        }
        .into();
        let payload = err.payload();
        assert_eq!(payload.kind, "ConstraintConflictError");
        assert!(payload.message.contains("theater-positive-pressure"));
        let details = payload.details.unwrap();
        assert_eq!(details["rules"][1], "isolation-negative-pressure");
        assert_eq!(details["instance"], "clinical-room");
    }

    #[test]
    fn schema_error_lists_every_problem() {
        let err = SchemaError {
            source_name: "hvac".into(),
            problems: vec![
                SchemaProblem::UnknownConcept {
                    context: "hvac: relation contains".into(),
                    name: "Building".into(),
                },
                SchemaProblem::UnresolvedReference {
                    context: "hvac: constraint server".into(),
                    name: "is_rack".into(),
                },
            ],
        };
        assert!(err.to_string().contains("2 problem(s)"));
        let forge: ForgeError = err.into();
        let payload = forge.payload();
        let problems = payload.details.unwrap()["problems"].clone();
        assert_eq!(problems.as_array().map(|a| a.len()), Some(2));
    }

    #[test]
    fn payload_serializes_without_empty_details() {
        let payload = ErrorPayload {
            kind: "ConfigError".into(),
            message: "bad".into(),
            details: None,
        };
        let json = serde_json::to_string(&payload).unwrap();
        assert_eq!(json, r#"{"kind":"ConfigError","message":"bad"}"#);
    }
}
