//! Verdict: per-rule outcomes, the overall decision and the justification
//! trail.
//!
//! The justification list is the authoritative explanation of a decision.
//! Its order is fixed: domain match, specialization, markers, extracted
//! quantities, overrides and suppressions, derivations, rule outcomes in
//! declaration order, and finally the goal annotation.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::classify::{Strategy, Suppression};
use crate::domain::{ConstraintRule, Domain};

/// Outcome of one activated rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Satisfied,
    Violated,
    Inapplicable,
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeStatus::Satisfied => write!(f, "satisfied"),
            OutcomeStatus::Violated => write!(f, "violated"),
            OutcomeStatus::Inapplicable => write!(f, "inapplicable"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleOutcome {
    pub rule: String,
    pub status: OutcomeStatus,
    /// Instances the outcome is about: the violating ones when violated,
    /// the ones the rule applied to otherwise.
    pub instances: Vec<String>,
    /// Counting detail for cardinality rules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl RuleOutcome {
    fn justification(&self) -> String {
        match (self.status, &self.detail) {
            (OutcomeStatus::Inapplicable, _) => format!("{}: inapplicable", self.rule),
            (status, Some(detail)) => format!("{}: {status} ({detail})", self.rule),
            (status, None) => format!("{}: {status} ({})", self.rule, self.instances.join(", ")),
        }
    }
}

/// An attribute value inferred by an implication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Derivation {
    pub rule: String,
    pub instance: String,
    pub attribute: String,
    pub value: bool,
}

impl fmt::Display for Derivation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let neg = if self.value { "" } else { "not " };
        write!(
            f,
            "{}: derived {neg}{} on {}",
            self.rule, self.attribute, self.instance
        )
    }
}

/// How binding the goal is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoalStatus {
    /// Required, and an override trap suppressed an exemption on the way.
    Mandatory,
    Required,
    /// The decision is false; the goal is a recommendation only.
    Advisory,
}

impl fmt::Display for GoalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GoalStatus::Mandatory => write!(f, "mandatory"),
            GoalStatus::Required => write!(f, "required"),
            GoalStatus::Advisory => write!(f, "advisory"),
        }
    }
}

/// The decision payload handed to transport layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerdictPayload {
    pub domain: String,
    pub decision: bool,
    pub goal: String,
    pub justification: Vec<String>,
}

/// Compiler output. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    domain: String,
    specialization: Option<String>,
    decision: bool,
    goal: String,
    goal_status: GoalStatus,
    outcomes: Vec<RuleOutcome>,
    derivations: Vec<Derivation>,
    suppressed: Vec<Suppression>,
    justification: Vec<String>,
}

impl Verdict {
    pub(crate) fn assemble(
        domain: &Domain,
        strategy: &Strategy,
        outcomes: Vec<RuleOutcome>,
        derivations: Vec<Derivation>,
    ) -> Self {
        let decision = outcomes
            .iter()
            .filter(|o| o.status != OutcomeStatus::Inapplicable)
            .all(|o| o.status == OutcomeStatus::Satisfied);
        let goal_status = match (decision, strategy.suppressed().is_empty()) {
            (true, false) => GoalStatus::Mandatory,
            (true, true) => GoalStatus::Required,
            (false, _) => GoalStatus::Advisory,
        };

        let mut justification = Vec::new();
        justification.push(format!(
            "matched domain {} on {}",
            strategy.domain(),
            quoted(strategy.matched_triggers())
        ));
        if let Some(spec) = strategy.specialization() {
            justification.push(format!("specialization {spec} applied"));
        }
        for m in strategy.markers() {
            justification.push(format!(
                "marker \"{}\" set {} on {}",
                m.term, m.attribute, m.instance
            ));
        }
        for q in strategy.quantities() {
            let mut line = format!(
                "extracted {} = {} from \"{}\" on {}",
                q.attribute, q.value, q.text, q.instance
            );
            if q.spawned > 0 {
                line.push_str(&format!(", spawned {} instance(s)", q.spawned));
            }
            justification.push(line);
        }
        for o in strategy.overrides() {
            if !o.forced.is_empty() {
                justification.push(format!(
                    "{} override forced {} on {} (\"{}\")",
                    o.trap,
                    o.forced.join(", "),
                    o.instance,
                    o.term
                ));
            }
            for s in strategy.suppressed().iter().filter(|s| s.trap == o.trap) {
                let label = domain
                    .rule(&s.rule)
                    .map(ConstraintRule::label)
                    .unwrap_or_else(|| s.rule.clone());
                justification.push(format!("{} override suppressed {label}", o.trap));
            }
        }
        justification.extend(derivations.iter().map(Derivation::to_string));
        justification.extend(outcomes.iter().map(RuleOutcome::justification));
        justification.push(match goal_status {
            GoalStatus::Mandatory => format!(
                "goal \"{}\" is mandatory: an override suppressed an exemption",
                strategy.goal()
            ),
            GoalStatus::Required => format!("goal \"{}\" is required", strategy.goal()),
            GoalStatus::Advisory => format!(
                "goal \"{}\" is advisory: not every applicable rule holds",
                strategy.goal()
            ),
        });

        Self {
            domain: strategy.domain().to_string(),
            specialization: strategy.specialization().map(String::from),
            decision,
            goal: strategy.goal().to_string(),
            goal_status,
            outcomes,
            derivations,
            suppressed: strategy.suppressed().to_vec(),
            justification,
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn specialization(&self) -> Option<&str> {
        self.specialization.as_deref()
    }

    /// Conjunction of every applicable outcome; true when nothing applies.
    pub fn decision(&self) -> bool {
        self.decision
    }

    pub fn goal(&self) -> &str {
        &self.goal
    }

    pub fn goal_status(&self) -> GoalStatus {
        self.goal_status
    }

    /// Outcomes in rule declaration order.
    pub fn outcomes(&self) -> &[RuleOutcome] {
        &self.outcomes
    }

    pub fn outcome(&self, rule: &str) -> Option<&RuleOutcome> {
        self.outcomes.iter().find(|o| o.rule == rule)
    }

    pub fn derivations(&self) -> &[Derivation] {
        &self.derivations
    }

    pub fn suppressed(&self) -> &[Suppression] {
        &self.suppressed
    }

    pub fn justification(&self) -> &[String] {
        &self.justification
    }

    pub fn payload(&self) -> VerdictPayload {
        VerdictPayload {
            domain: self.domain.clone(),
            decision: self.decision,
            goal: self.goal.clone(),
            justification: self.justification.clone(),
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "domain:   {}", self.domain)?;
        if let Some(spec) = &self.specialization {
            writeln!(f, "variant:  {spec}")?;
        }
        writeln!(f, "decision: {}", self.decision)?;
        writeln!(f, "goal:     {} ({})", self.goal, self.goal_status)?;
        writeln!(f, "justification:")?;
        for (i, line) in self.justification.iter().enumerate() {
            writeln!(f, "  {:>2}. {line}", i + 1)?;
        }
        Ok(())
    }
}

fn quoted(items: &[String]) -> String {
    items
        .iter()
        .map(|s| format!("\"{s}\""))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_lines() {
        let sat = RuleOutcome {
            rule: "server-room-mandatory".into(),
            status: OutcomeStatus::Satisfied,
            instances: vec!["room".into()],
            detail: None,
        };
        assert_eq!(sat.justification(), "server-room-mandatory: satisfied (room)");

        let card = RuleOutcome {
            rule: "plan-required".into(),
            status: OutcomeStatus::Violated,
            instances: vec!["proposal".into()],
            detail: Some("proposal: 0 of at least 1".into()),
        };
        assert_eq!(
            card.justification(),
            "plan-required: violated (proposal: 0 of at least 1)"
        );

        let na = RuleOutcome {
            rule: "occupancy-risk".into(),
            status: OutcomeStatus::Inapplicable,
            instances: Vec::new(),
            detail: None,
        };
        assert_eq!(na.justification(), "occupancy-risk: inapplicable");
    }

    #[test]
    fn derivation_line_marks_negation() {
        let d = Derivation {
            rule: "r".into(),
            instance: "room".into(),
            attribute: "positive_pressure".into(),
            value: false,
        };
        assert_eq!(d.to_string(), "r: derived not positive_pressure on room");
    }

    #[test]
    fn payload_serializes_as_flat_document() {
        let payload = VerdictPayload {
            domain: "d".into(),
            decision: true,
            goal: "g".into(),
            justification: vec!["a".into()],
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["decision"], true);
        assert_eq!(json["justification"][0], "a");
        let back: VerdictPayload = serde_json::from_value(json).unwrap();
        assert_eq!(back, payload);
    }
}
