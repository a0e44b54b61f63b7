// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # intent-forge
//!
//! Compiles free-form requests (e.g. "PMOC for a small server closet") into
//! verified compliance decisions: a domain classification, a typed instance
//! graph, and a constraint verdict with an ordered justification trail.
//!
//! ## Architecture
//!
//! - **Domains** (`domain`): concept types, relations, rules and vocabulary,
//!   loaded from TOML definitions into a snapshot registry
//! - **Classifier** (`classify`): rule-based intent routing with override traps
//! - **Knowledge graph** (`graph`): per-request petgraph instance graph
//! - **Compiler** (`compile`): implication saturation, conflict detection,
//!   per-rule outcomes and the final verdict
//! - **Pipeline** (`pipeline`): classify → build → evaluate as one context object
//!
//! ## Library usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use intent_forge::domain::registry::DomainRegistry;
//! use intent_forge::pipeline::Pipeline;
//!
//! let registry = Arc::new(DomainRegistry::bundled().unwrap());
//! let pipeline = Pipeline::new(registry);
//! let verdict = pipeline
//!     .run("small 10 unit server closet with one cooling unit")
//!     .unwrap();
//! assert!(verdict.decision());
//! println!("{verdict}");
//! ```

pub mod classify;
pub mod compile;
pub mod config;
pub mod domain;
pub mod error;
pub mod graph;
pub mod paths;
pub mod pipeline;
pub mod text;
