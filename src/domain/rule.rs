//! Constraint rule language.
//!
//! Rules are written as small call expressions in domain definitions:
//!
//! ```text
//! implies(is_server_room, requires_mandatory_plan)
//! not(and(size_exemption_applies, is_server_room))
//! at_least(requires_mandatory_plan, 1, Proposal)
//! implies(or(is_small, area_m2 < 60), size_exemption_applies)
//! ```
//!
//! Names stay unresolved in the AST. Whether `Room` is a concept test or
//! `is_small` an attribute test is decided against a [`Domain`](super::Domain)
//! at validation time and again against the knowledge graph at evaluation time.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Numeric comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Comparison {
    /// Apply the comparison to `lhs OP rhs`.
    pub fn apply(self, lhs: f64, rhs: f64) -> bool {
        match self {
            Comparison::Lt => lhs < rhs,
            Comparison::Le => lhs <= rhs,
            Comparison::Gt => lhs > rhs,
            Comparison::Ge => lhs >= rhs,
            Comparison::Eq => lhs == rhs,
            Comparison::Ne => lhs != rhs,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            Comparison::Lt => "<",
            Comparison::Le => "<=",
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
            Comparison::Eq => "==",
            Comparison::Ne => "!=",
        }
    }
}

/// A term evaluated against a single instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Term {
    /// Concept-type test or boolean attribute test, resolved later.
    Name(String),
    /// Numeric attribute comparison against a constant.
    Compare {
        attribute: String,
        op: Comparison,
        value: f64,
    },
    And(Vec<Term>),
    Or(Vec<Term>),
    Not(Box<Term>),
}

impl Term {
    /// Every name referenced by this term, in source order.
    pub fn names(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_names(&mut out);
        out
    }

    fn collect_names<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Term::Name(n) => out.push(n),
            Term::Compare { attribute, .. } => out.push(attribute),
            Term::And(ts) | Term::Or(ts) => ts.iter().for_each(|t| t.collect_names(out)),
            Term::Not(t) => t.collect_names(out),
        }
    }

    /// Names used as bare boolean tests (excluding comparisons).
    pub fn bare_names(&self) -> Vec<&str> {
        match self {
            Term::Name(n) => vec![n.as_str()],
            Term::Compare { .. } => Vec::new(),
            Term::And(ts) | Term::Or(ts) => ts.iter().flat_map(|t| t.bare_names()).collect(),
            Term::Not(t) => t.bare_names(),
        }
    }

    /// Attribute names used in numeric comparisons.
    pub fn compared_attributes(&self) -> Vec<&str> {
        match self {
            Term::Name(_) => Vec::new(),
            Term::Compare { attribute, .. } => vec![attribute.as_str()],
            Term::And(ts) | Term::Or(ts) => {
                ts.iter().flat_map(|t| t.compared_attributes()).collect()
            }
            Term::Not(t) => t.compared_attributes(),
        }
    }

    /// Decompose into `(name, polarity)` literals if the term is a literal
    /// or a conjunction of literals. `None` for anything else.
    pub fn literals(&self) -> Option<Vec<(&str, bool)>> {
        match self {
            Term::Name(n) => Some(vec![(n.as_str(), true)]),
            Term::Not(inner) => match inner.as_ref() {
                Term::Name(n) => Some(vec![(n.as_str(), false)]),
                _ => None,
            },
            Term::And(ts) => {
                let mut out = Vec::new();
                for t in ts {
                    out.extend(t.literals()?);
                }
                Some(out)
            }
            _ => None,
        }
    }

    /// The conjuncts of this term (itself when not a conjunction).
    pub fn conjuncts(&self) -> Vec<&Term> {
        match self {
            Term::And(ts) => ts.iter().flat_map(|t| t.conjuncts()).collect(),
            other => vec![other],
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Name(n) => write!(f, "{n}"),
            Term::Compare {
                attribute,
                op,
                value,
            } => write!(f, "{attribute} {} {value}", op.symbol()),
            Term::And(ts) => write!(f, "and({})", join_terms(ts)),
            Term::Or(ts) => write!(f, "or({})", join_terms(ts)),
            Term::Not(t) => write!(f, "not({t})"),
        }
    }
}

fn join_terms(ts: &[Term]) -> String {
    ts.iter().map(|t| t.to_string()).collect::<Vec<_>>().join(", ")
}

/// A top-level constraint rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RuleExpr {
    /// Violated iff the antecedent holds for an instance and the consequent does not.
    Implies(Term, Term),
    /// Every term must hold for each instance in scope.
    And(Vec<Term>),
    /// The term must hold for no instance in scope.
    Not(Term),
    /// At least `count` contained instances satisfy `term` in every `scope` instance.
    AtLeast {
        term: Term,
        count: usize,
        scope: String,
    },
    /// Exactly `count` contained instances satisfy `term` in every `scope` instance.
    Exact {
        term: Term,
        count: usize,
        scope: String,
    },
}

impl RuleExpr {
    /// Short name of the rule form.
    pub fn kind(&self) -> &'static str {
        match self {
            RuleExpr::Implies(..) => "implies",
            RuleExpr::And(_) => "and",
            RuleExpr::Not(_) => "not",
            RuleExpr::AtLeast { .. } => "at_least",
            RuleExpr::Exact { .. } => "exact",
        }
    }

    /// All terms of the rule, in source order.
    pub fn terms(&self) -> Vec<&Term> {
        match self {
            RuleExpr::Implies(a, b) => vec![a, b],
            RuleExpr::And(ts) => ts.iter().collect(),
            RuleExpr::Not(t) => vec![t],
            RuleExpr::AtLeast { term, .. } | RuleExpr::Exact { term, .. } => vec![term],
        }
    }

    /// The scope concept of a cardinality rule.
    pub fn cardinality_scope(&self) -> Option<&str> {
        match self {
            RuleExpr::AtLeast { scope, .. } | RuleExpr::Exact { scope, .. } => Some(scope),
            _ => None,
        }
    }
}

impl fmt::Display for RuleExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleExpr::Implies(a, b) => write!(f, "implies({a}, {b})"),
            RuleExpr::And(ts) => write!(f, "and({})", join_terms(ts)),
            RuleExpr::Not(t) => write!(f, "not({t})"),
            RuleExpr::AtLeast { term, count, scope } => {
                write!(f, "at_least({term}, {count}, {scope})")
            }
            RuleExpr::Exact { term, count, scope } => write!(f, "exact({term}, {count}, {scope})"),
        }
    }
}

/// A rule expression that failed to parse.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message} at offset {offset}")]
pub struct RuleSyntaxError {
    pub message: String,
    pub offset: usize,
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Number(f64),
    Op(Comparison),
    LParen,
    RParen,
    Comma,
}

fn lex(src: &str) -> Result<Vec<(Tok, usize)>, RuleSyntaxError> {
    let chars: Vec<(usize, char)> = src.char_indices().collect();
    let mut out = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (pos, c) = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                out.push((Tok::LParen, pos));
                i += 1;
            }
            ')' => {
                out.push((Tok::RParen, pos));
                i += 1;
            }
            ',' => {
                out.push((Tok::Comma, pos));
                i += 1;
            }
            '<' | '>' | '=' | '!' => {
                let next_eq = chars.get(i + 1).is_some_and(|(_, n)| *n == '=');
                let op = match (c, next_eq) {
                    ('<', true) => Comparison::Le,
                    ('<', false) => Comparison::Lt,
                    ('>', true) => Comparison::Ge,
                    ('>', false) => Comparison::Gt,
                    ('=', true) => Comparison::Eq,
                    ('!', true) => Comparison::Ne,
                    _ => {
                        return Err(RuleSyntaxError {
                            message: format!("unexpected '{c}'"),
                            offset: pos,
                        });
                    }
                };
                out.push((Tok::Op(op), pos));
                i += if next_eq { 2 } else { 1 };
            }
            c if c.is_ascii_digit() || c == '-' || c == '.' => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].1.is_ascii_digit() || chars[i].1 == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().map(|(_, c)| c).collect();
                let value = text.parse::<f64>().map_err(|_| RuleSyntaxError {
                    message: format!("invalid number '{text}'"),
                    offset: pos,
                })?;
                out.push((Tok::Number(value), pos));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].1.is_alphanumeric() || chars[i].1 == '_') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().map(|(_, c)| c).collect();
                out.push((Tok::Ident(text), pos));
            }
            other => {
                return Err(RuleSyntaxError {
                    message: format!("unexpected '{other}'"),
                    offset: pos,
                });
            }
        }
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Parser {
    toks: Vec<(Tok, usize)>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos).map(|(t, _)| t)
    }

    fn offset(&self) -> usize {
        self.toks.get(self.pos).map(|(_, o)| *o).unwrap_or(self.end)
    }

    fn error(&self, message: impl Into<String>) -> RuleSyntaxError {
        RuleSyntaxError {
            message: message.into(),
            offset: self.offset(),
        }
    }

    fn next(&mut self) -> Option<Tok> {
        let tok = self.toks.get(self.pos).map(|(t, _)| t.clone());
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, want: Tok, what: &str) -> Result<(), RuleSyntaxError> {
        match self.peek() {
            Some(t) if *t == want => {
                self.pos += 1;
                Ok(())
            }
            _ => Err(self.error(format!("expected {what}"))),
        }
    }

    fn ident(&mut self) -> Result<String, RuleSyntaxError> {
        match self.peek() {
            Some(Tok::Ident(_)) => match self.next() {
                Some(Tok::Ident(name)) => Ok(name),
                _ => Err(self.error("expected a name")),
            },
            _ => Err(self.error("expected a name")),
        }
    }

    fn count(&mut self) -> Result<usize, RuleSyntaxError> {
        match self.peek() {
            Some(Tok::Number(n)) if *n >= 0.0 && n.fract() == 0.0 => {
                let n = *n as usize;
                self.pos += 1;
                Ok(n)
            }
            _ => Err(self.error("expected a non-negative integer count")),
        }
    }

    fn rule(&mut self) -> Result<RuleExpr, RuleSyntaxError> {
        let head = self.ident()?;
        self.expect(Tok::LParen, "'('")?;
        let rule = match head.as_str() {
            "implies" => {
                let a = self.term()?;
                self.expect(Tok::Comma, "','")?;
                let b = self.term()?;
                RuleExpr::Implies(a, b)
            }
            "and" => RuleExpr::And(self.term_list()?),
            "not" => RuleExpr::Not(self.term()?),
            "at_least" | "exact" => {
                let term = self.term()?;
                self.expect(Tok::Comma, "','")?;
                let count = self.count()?;
                self.expect(Tok::Comma, "','")?;
                let scope = self.ident()?;
                if head == "at_least" {
                    RuleExpr::AtLeast { term, count, scope }
                } else {
                    RuleExpr::Exact { term, count, scope }
                }
            }
            other => {
                return Err(RuleSyntaxError {
                    message: format!(
                        "unknown rule form '{other}' (expected implies, and, not, at_least or exact)"
                    ),
                    offset: 0,
                });
            }
        };
        self.expect(Tok::RParen, "')'")?;
        Ok(rule)
    }

    fn term_list(&mut self) -> Result<Vec<Term>, RuleSyntaxError> {
        let mut terms = vec![self.term()?];
        while self.peek() == Some(&Tok::Comma) {
            self.pos += 1;
            terms.push(self.term()?);
        }
        Ok(terms)
    }

    fn term(&mut self) -> Result<Term, RuleSyntaxError> {
        let name = self.ident()?;
        match self.peek() {
            Some(Tok::LParen) => {
                self.pos += 1;
                let term = match name.as_str() {
                    "and" => Term::And(self.term_list()?),
                    "or" => Term::Or(self.term_list()?),
                    "not" => Term::Not(Box::new(self.term()?)),
                    "implies" | "at_least" | "exact" => {
                        return Err(self.error(format!("'{name}' is only allowed at the top level")));
                    }
                    other => return Err(self.error(format!("unknown operator '{other}'"))),
                };
                self.expect(Tok::RParen, "')'")?;
                Ok(term)
            }
            Some(Tok::Op(op)) => {
                let op = *op;
                self.pos += 1;
                match self.next() {
                    Some(Tok::Number(value)) => Ok(Term::Compare {
                        attribute: name,
                        op,
                        value,
                    }),
                    _ => Err(self.error("expected a number after comparison operator")),
                }
            }
            _ => Ok(Term::Name(name)),
        }
    }
}

/// Parse a rule expression.
pub fn parse_rule(src: &str) -> Result<RuleExpr, RuleSyntaxError> {
    let toks = lex(src)?;
    let mut parser = Parser {
        toks,
        pos: 0,
        end: src.len(),
    };
    let rule = parser.rule()?;
    if parser.pos != parser.toks.len() {
        return Err(parser.error("trailing input after rule"));
    }
    Ok(rule)
}
