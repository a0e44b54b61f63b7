//! Constraint compilation: evaluate a strategy's rules against its graph.
//!
//! Evaluation runs in three passes over the activated rules, always in the
//! domain's declaration order:
//!
//! 1. saturate implications with literal consequents ([`eval::saturate`]),
//! 2. reject contradictory requirements ([`conflict::detect`]),
//! 3. compute one outcome per rule ([`eval::outcome`]).
//!
//! Any failure aborts the evaluation; no partial [`Verdict`] is produced.

pub mod conflict;
pub mod eval;
pub mod verdict;

use crate::classify::Strategy;
use crate::domain::ConstraintRule;
use crate::error::{CompileError, ForgeResult};
use crate::graph::KnowledgeGraph;

pub use verdict::{Derivation, GoalStatus, OutcomeStatus, RuleOutcome, Verdict, VerdictPayload};

/// Stateless rule evaluator.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConstraintCompiler;

impl ConstraintCompiler {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate `strategy` against `graph`.
    pub fn evaluate(&self, graph: &KnowledgeGraph, strategy: &Strategy) -> ForgeResult<Verdict> {
        let domain = graph.domain();
        if domain.name() != strategy.domain() {
            return Err(CompileError::DomainMismatch {
                strategy_domain: strategy.domain().to_string(),
                graph_domain: domain.name().to_string(),
            }
            .into());
        }

        let mut rules: Vec<(usize, &ConstraintRule)> = Vec::with_capacity(strategy.rules().len());
        for id in strategy.rules() {
            match (domain.rule_position(id), domain.rule(id)) {
                (Some(pos), Some(rule)) => rules.push((pos, rule)),
                _ => {
                    return Err(CompileError::ForeignRule {
                        rule: id.clone(),
                        domain: domain.name().to_string(),
                    }
                    .into());
                }
            }
        }
        rules.sort_by_key(|(pos, _)| *pos);
        rules.dedup_by_key(|(pos, _)| *pos);
        let rules: Vec<&ConstraintRule> = rules.into_iter().map(|(_, r)| r).collect();

        let mut ws = eval::WorkingSet::new(graph);
        let derivations = eval::saturate(&mut ws, &rules)?;
        conflict::detect(&ws, &rules, &derivations)?;
        let outcomes = rules
            .iter()
            .map(|rule| eval::outcome(&ws, rule))
            .collect::<Result<Vec<_>, _>>()?;

        let verdict = Verdict::assemble(domain, strategy, outcomes, derivations);
        tracing::debug!(
            domain = verdict.domain(),
            decision = verdict.decision(),
            goal_status = %verdict.goal_status(),
            "evaluated constraints"
        );
        Ok(verdict)
    }
}
