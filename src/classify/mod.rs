//! Intent classification: free text → [`Strategy`].
//!
//! Classification is rule-based and deterministic. Stages, in order:
//!
//! 1. **Domain match**: the domain with the most matching trigger phrases
//!    wins; ties go to the higher priority, then to the lower name.
//! 2. **Specialization**: the first specialization (declaration order) whose
//!    triggers occur selects its rule set, subject concept and goal.
//! 3. **Seeding**: the container and subject instances are seeded; markers,
//!    then extracted quantities set their attributes.
//! 4. **Override traps**: trap phrases force attributes on the subject
//!    regardless of size or quantity terms.
//! 5. **Suppression**: rules named by an applied trap are removed from the
//!    activated set, and every removal is recorded on the strategy.
//!
//! The classifier holds no per-request state; the result depends only on
//! the input text and the registry snapshot passed in.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::domain::registry::RegistrySnapshot;
use crate::domain::{Domain, Marker, OverrideTrap, Quantity};
use crate::error::{ClassifyError, ForgeResult};
use crate::graph::Value;
use crate::text::{self, Phrase};

/// Longest input prefix echoed back in an unrecognized-intent error.
const PREVIEW_CHARS: usize = 80;

/// An instance the graph builder must create.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstanceSeed {
    /// Unique label within the request (`room`, `cooling-unit-2`).
    pub key: String,
    pub concept: String,
    /// Label of the seed that contains this one.
    pub parent: Option<String>,
    pub attributes: BTreeMap<String, Value>,
}

impl InstanceSeed {
    pub fn new(key: impl Into<String>, concept: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            concept: concept.into(),
            parent: None,
            attributes: BTreeMap::new(),
        }
    }

    pub fn within(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with(mut self, attribute: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(attribute.into(), value);
        self
    }
}

/// A rule removed from the activated set by an override trap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Suppression {
    pub rule: String,
    pub trap: String,
    pub instance: String,
}

/// An override trap that fired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedOverride {
    pub trap: String,
    /// The phrase that triggered it.
    pub term: String,
    pub instance: String,
    pub forced: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedMarker {
    pub term: String,
    pub attribute: String,
    pub instance: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedQuantity {
    pub attribute: String,
    pub value: f64,
    /// The matched text span.
    pub text: String,
    pub instance: String,
    /// Instances spawned for the counted units.
    pub spawned: usize,
}

/// Classifier output: the domain, the instances to build, the rules to
/// enforce and the goal label, plus a record of every signal that shaped them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Strategy {
    domain: String,
    specialization: Option<String>,
    seeds: Vec<InstanceSeed>,
    rules: Vec<String>,
    goal: String,
    matched_triggers: Vec<String>,
    markers: Vec<AppliedMarker>,
    quantities: Vec<ExtractedQuantity>,
    overrides: Vec<AppliedOverride>,
    suppressed: Vec<Suppression>,
}

impl Strategy {
    /// A bare strategy, for callers that assemble seeds and rules themselves.
    pub fn new(domain: impl Into<String>, goal: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            specialization: None,
            seeds: Vec::new(),
            rules: Vec::new(),
            goal: goal.into(),
            matched_triggers: Vec::new(),
            markers: Vec::new(),
            quantities: Vec::new(),
            overrides: Vec::new(),
            suppressed: Vec::new(),
        }
    }

    pub fn with_seed(mut self, seed: InstanceSeed) -> Self {
        self.seeds.push(seed);
        self
    }

    pub fn with_rule(mut self, rule: impl Into<String>) -> Self {
        self.rules.push(rule.into());
        self
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn specialization(&self) -> Option<&str> {
        self.specialization.as_deref()
    }

    pub fn seeds(&self) -> &[InstanceSeed] {
        &self.seeds
    }

    /// Activated rule ids.
    pub fn rules(&self) -> &[String] {
        &self.rules
    }

    pub fn goal(&self) -> &str {
        &self.goal
    }

    pub fn matched_triggers(&self) -> &[String] {
        &self.matched_triggers
    }

    pub fn markers(&self) -> &[AppliedMarker] {
        &self.markers
    }

    pub fn quantities(&self) -> &[ExtractedQuantity] {
        &self.quantities
    }

    pub fn overrides(&self) -> &[AppliedOverride] {
        &self.overrides
    }

    pub fn suppressed(&self) -> &[Suppression] {
        &self.suppressed
    }
}

/// Classifier tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifierConfig {
    /// Upper bound on instances spawned from a single extracted count.
    pub max_spawn: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self { max_spawn: 32 }
    }
}

/// Rule-based intent classifier.
#[derive(Debug, Clone, Default)]
pub struct IntentClassifier {
    config: ClassifierConfig,
}

impl IntentClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Classify `input` against the domains in `snapshot`.
    pub fn classify(&self, snapshot: &RegistrySnapshot, input: &str) -> ForgeResult<Strategy> {
        let normalized = text::normalize(input);
        let tokens = text::tokens(&normalized);

        let Some((domain, matched)) = best_domain(snapshot, &tokens) else {
            tracing::debug!(input_len = input.len(), "no domain vocabulary matched");
            return Err(ClassifyError::UnrecognizedIntent {
                preview: preview(input),
            }
            .into());
        };

        let specialization = domain
            .specializations()
            .iter()
            .find(|s| s.triggers.iter().any(|t| t.matches(&tokens)));

        let markers: Vec<(&Marker, &Phrase)> = domain
            .markers()
            .iter()
            .filter_map(|m| first_match(&m.terms, &tokens).map(|p| (m, p)))
            .collect();
        let traps: Vec<(&OverrideTrap, &Phrase)> = domain
            .traps()
            .iter()
            .filter_map(|t| first_match(&t.terms, &tokens).map(|p| (t, p)))
            .collect();
        let quantities: Vec<(&Quantity, f64, String)> = domain
            .quantities()
            .iter()
            .filter_map(|q| {
                text::extract_quantity(&q.pattern, &normalized).map(|(v, span)| (q, v, span))
            })
            .collect();

        let base = specialization
            .and_then(|s| s.subject.as_deref())
            .unwrap_or(&domain.intent().subject);
        let needed: Vec<&str> = markers
            .iter()
            .map(|(m, _)| m.attribute.as_str())
            .chain(quantities.iter().map(|(q, _, _)| q.attribute.as_str()))
            .chain(traps.iter().flat_map(|(t, _)| t.force.iter().map(String::as_str)))
            .collect();
        let subject = subject_concept(domain, base, &needed);

        let mut builder = SeedBuilder::new(domain, subject, self.config.max_spawn);

        let mut applied_markers = Vec::new();
        for (marker, term) in &markers {
            if builder.set(&marker.attribute, Value::Bool(true), false) {
                applied_markers.push(AppliedMarker {
                    term: term.text().to_string(),
                    attribute: marker.attribute.clone(),
                    instance: builder.subject_key.clone(),
                });
            }
        }

        let mut extracted = Vec::new();
        for (quantity, value, span) in &quantities {
            if !builder.set(&quantity.attribute, Value::Number(*value), false) {
                continue;
            }
            let spawned = match &quantity.spawn {
                Some(concept) => builder.spawn(concept, *value),
                None => 0,
            };
            extracted.push(ExtractedQuantity {
                attribute: quantity.attribute.clone(),
                value: *value,
                text: span.clone(),
                instance: builder.subject_key.clone(),
                spawned,
            });
        }

        let mut overrides = Vec::new();
        for (trap, term) in &traps {
            let forced: Vec<String> = trap
                .force
                .iter()
                .filter(|attr| builder.set(attr, Value::Bool(true), true))
                .cloned()
                .collect();
            overrides.push(AppliedOverride {
                trap: trap.name.clone(),
                term: term.text().to_string(),
                instance: builder.subject_key.clone(),
                forced,
            });
        }

        let mut rules = domain.rule_ids_for(specialization);
        let suppressed = suppress(&mut rules, &traps, &builder.subject_key);

        let goal = traps
            .iter()
            .find_map(|(t, _)| t.goal.clone())
            .or_else(|| specialization.and_then(|s| s.goal.clone()))
            .unwrap_or_else(|| domain.goal().to_string());

        tracing::debug!(
            domain = domain.name(),
            specialization = specialization.map(|s| s.name.as_str()),
            subject,
            rules = rules.len(),
            suppressed = suppressed.len(),
            "classified intent"
        );

        Ok(Strategy {
            domain: domain.name().to_string(),
            specialization: specialization.map(|s| s.name.clone()),
            seeds: builder.finish(),
            rules,
            goal,
            matched_triggers: matched.iter().map(|p| p.text().to_string()).collect(),
            markers: applied_markers,
            quantities: extracted,
            overrides,
            suppressed,
        })
    }
}

/// Remove every rule named by an applied trap from `rules`. Only rules that
/// were actually active are recorded.
fn suppress(
    rules: &mut Vec<String>,
    traps: &[(&OverrideTrap, &Phrase)],
    instance: &str,
) -> Vec<Suppression> {
    let mut out = Vec::new();
    for (trap, _) in traps {
        for id in &trap.suppress {
            if let Some(pos) = rules.iter().position(|r| r == id) {
                rules.remove(pos);
                out.push(Suppression {
                    rule: id.clone(),
                    trap: trap.name.clone(),
                    instance: instance.to_string(),
                });
            }
        }
    }
    out
}

fn best_domain<'a>(
    snapshot: &'a RegistrySnapshot,
    tokens: &[&str],
) -> Option<(&'a Domain, Vec<&'a Phrase>)> {
    let mut best: Option<(&Domain, Vec<&Phrase>)> = None;
    // Snapshot iteration is by name, so a strict comparison keeps the
    // lower name on a full tie.
    for domain in snapshot.domains() {
        let matched: Vec<&Phrase> = domain
            .triggers()
            .iter()
            .filter(|t| t.matches(tokens))
            .collect();
        if matched.is_empty() {
            continue;
        }
        let better = match &best {
            None => true,
            Some((d, m)) => (matched.len(), domain.priority()) > (m.len(), d.priority()),
        };
        if better {
            best = Some((domain.as_ref(), matched));
        }
    }
    best
}

fn first_match<'a>(phrases: &'a [Phrase], tokens: &[&str]) -> Option<&'a Phrase> {
    phrases.iter().find(|p| p.matches(tokens))
}

/// Pick the subject concept: the most general type at or below `base`
/// carrying every needed attribute, or failing that, every attribute that
/// some descendant can carry on its own.
fn subject_concept<'a>(domain: &'a Domain, base: &'a str, needed: &[&str]) -> &'a str {
    if let Some(c) = domain.refine_concept(base, needed) {
        return c;
    }
    let carriable: Vec<&str> = needed
        .iter()
        .copied()
        .filter(|a| domain.refine_concept(base, &[*a]).is_some())
        .collect();
    domain.refine_concept(base, &carriable).unwrap_or(base)
}

fn preview(input: &str) -> String {
    let trimmed = input.trim();
    let mut out: String = trimmed.chars().take(PREVIEW_CHARS).collect();
    if trimmed.chars().count() > PREVIEW_CHARS {
        out.push_str("...");
    }
    out
}

/// Accumulates the seeds of one request.
struct SeedBuilder<'a> {
    domain: &'a Domain,
    max_spawn: usize,
    container: InstanceSeed,
    subject: InstanceSeed,
    subject_key: String,
    spawned: Vec<InstanceSeed>,
}

impl<'a> SeedBuilder<'a> {
    fn new(domain: &'a Domain, subject: &str, max_spawn: usize) -> Self {
        let intent = domain.intent();
        let container_key = text::kebab_case(&intent.container);
        let subject_key = text::kebab_case(subject);
        Self {
            domain,
            max_spawn,
            container: InstanceSeed::new(container_key.clone(), &intent.container),
            subject: InstanceSeed::new(subject_key.clone(), subject).within(container_key),
            subject_key,
            spawned: Vec::new(),
        }
    }

    /// Set an attribute on the subject if its concept carries it. Returns
    /// whether the value was applied.
    fn set(&mut self, attribute: &str, value: Value, overwrite: bool) -> bool {
        if self
            .domain
            .attribute_kind(&self.subject.concept, attribute)
            .is_none()
        {
            tracing::debug!(
                concept = %self.subject.concept,
                attribute,
                "subject concept lacks attribute, signal ignored"
            );
            return false;
        }
        if overwrite || !self.subject.attributes.contains_key(attribute) {
            self.subject.attributes.insert(attribute.to_string(), value);
        }
        true
    }

    /// Seed one `concept` instance per counted unit, capped.
    fn spawn(&mut self, concept: &str, count: f64) -> usize {
        let n = if count.is_finite() && count >= 1.0 {
            (count.floor() as usize).min(self.max_spawn)
        } else {
            0
        };
        let stem = text::kebab_case(concept);
        let first = self.spawned.len();
        for i in 1..=n {
            self.spawned.push(
                InstanceSeed::new(format!("{stem}-{}", first + i), concept)
                    .within(self.subject_key.clone()),
            );
        }
        n
    }

    fn finish(self) -> Vec<InstanceSeed> {
        let mut seeds = Vec::with_capacity(2 + self.spawned.len());
        seeds.push(self.container);
        seeds.push(self.subject);
        seeds.extend(self.spawned);
        seeds
    }
}
