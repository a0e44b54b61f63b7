//! Pipeline: classify → build → evaluate, as one explicit context object.
//!
//! A [`Pipeline`] owns the shared registry handle and the stateless stage
//! implementations. Each run takes one registry snapshot and uses it for all
//! three stages, so a concurrent reload never mixes two domain versions in a
//! single request. Any stage failure halts the run; there is no partial
//! verdict.

use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::classify::IntentClassifier;
use crate::compile::{ConstraintCompiler, Verdict, VerdictPayload};
use crate::config::ForgeConfig;
use crate::domain::registry::DomainRegistry;
use crate::error::{ErrorPayload, ForgeResult};
use crate::graph::builder;
use crate::paths::ForgePaths;

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    /// Free text → strategy.
    Classify,
    /// Strategy → knowledge graph.
    Build,
    /// Graph + strategy → verdict.
    Evaluate,
}

impl StageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StageKind::Classify => "classify",
            StageKind::Build => "build",
            StageKind::Evaluate => "evaluate",
        }
    }
}

/// Transport envelope for a single run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum PipelineResponse {
    Verified { verdict: VerdictPayload },
    Error { error: ErrorPayload },
}

impl From<ForgeResult<Verdict>> for PipelineResponse {
    fn from(result: ForgeResult<Verdict>) -> Self {
        match result {
            Ok(verdict) => PipelineResponse::Verified {
                verdict: verdict.payload(),
            },
            Err(e) => PipelineResponse::Error { error: e.payload() },
        }
    }
}

/// The classify → build → evaluate context.
#[derive(Debug, Clone)]
pub struct Pipeline {
    registry: Arc<DomainRegistry>,
    classifier: IntentClassifier,
    compiler: ConstraintCompiler,
}

impl Pipeline {
    pub fn new(registry: Arc<DomainRegistry>) -> Self {
        Self::with_classifier(registry, IntentClassifier::default())
    }

    pub fn with_classifier(registry: Arc<DomainRegistry>, classifier: IntentClassifier) -> Self {
        Self {
            registry,
            classifier,
            compiler: ConstraintCompiler::new(),
        }
    }

    /// Build a pipeline and its registry from configuration: bundled
    /// domains, then discovered files, then explicitly listed files.
    ///
    /// Discovered files that fail to load are skipped with a warning;
    /// explicitly listed files must load.
    pub fn from_config(config: &ForgeConfig) -> ForgeResult<Self> {
        config.validate()?;
        let registry = if config.bundled_domains {
            DomainRegistry::bundled()?
        } else {
            DomainRegistry::new()
        };

        if config.discover_domains {
            match ForgePaths::resolve() {
                Ok(paths) => {
                    registry.load_dir(&paths.domains_dir());
                }
                Err(e) => tracing::debug!("skipping domain discovery: {e}"),
            }
        }
        for file in &config.domain_files {
            registry.load_file(file)?;
        }

        tracing::info!(domains = ?registry.names(), "domain registry ready");
        Ok(Self::with_classifier(
            Arc::new(registry),
            IntentClassifier::new(config.classifier()),
        ))
    }

    pub fn registry(&self) -> &Arc<DomainRegistry> {
        &self.registry
    }

    /// Run one request through all stages.
    pub fn run(&self, input: &str) -> ForgeResult<Verdict> {
        let snapshot = self.registry.snapshot();
        let _span = tracing::info_span!("pipeline", generation = snapshot.generation()).entered();

        let strategy = stage(StageKind::Classify, || {
            self.classifier.classify(&snapshot, input)
        })?;
        let graph = stage(StageKind::Build, || builder::build(&snapshot, &strategy))?;
        stage(StageKind::Evaluate, || {
            self.compiler.evaluate(&graph, &strategy)
        })
    }

    /// Run independent requests on the rayon pool. Results keep input order.
    pub fn run_batch<S>(&self, inputs: &[S]) -> Vec<ForgeResult<Verdict>>
    where
        S: AsRef<str> + Sync,
    {
        inputs.par_iter().map(|i| self.run(i.as_ref())).collect()
    }

    /// Run and wrap the result in a transport envelope.
    pub fn respond(&self, input: &str) -> PipelineResponse {
        self.run(input).into()
    }
}

fn stage<T>(kind: StageKind, f: impl FnOnce() -> ForgeResult<T>) -> ForgeResult<T> {
    let _span = tracing::debug_span!("stage", stage = kind.as_str()).entered();
    f().inspect_err(|e| {
        tracing::debug!(stage = kind.as_str(), kind = e.kind(), "stage failed: {e}");
    })
}
