// decision.rs — Compiled decisions and SRE compilation.
//
// A CompiledDecision is the evaluated form of an SRE. It has two polarities,
// each holding:
//
//   - an automaton (absent = no opinion on that polarity)
//   - the concrete action signatures named by the polarity's patterns
//   - the concrete result literals named by the polarity's patterns
//
// The concrete lists exist because the automaton can accept an infinite
// language: the engine enumerates promotion candidates from these lists and
// only uses the automaton to confirm them.
//
// Algebra (Neutral is the decision with both polarities absent):
//
//   AND   positive = l.pos ∩ r.pos    negative = l.neg ∪ r.neg
//   OR    positive = l.pos ∪ r.pos    negative = l.neg ∩ r.neg
//
//   Neutral AND s = Neutral,  Neutral OR s = s.
//   absent ∩ x = absent,      absent ∪ x = x.

use std::collections::BTreeSet;

use crate::automaton::Automaton;
use crate::error::SreError;
use crate::pattern::{self, VarResolver};
use crate::signature::{canonical_action, Shape};
use crate::sre::{BinOp, Sre, UnOp};

/// Default bound on recursive variable expansion.
pub const DEFAULT_MAX_SUBSTITUTION_DEPTH: usize = 32;

/// One polarity of a compiled decision.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Polarity {
    pub automaton: Option<Automaton>,
    pub actions: BTreeSet<String>,
    pub results: BTreeSet<String>,
}

impl Polarity {
    /// No opinion.
    pub fn absent() -> Self {
        Self::default()
    }

    pub fn is_absent(&self) -> bool {
        self.automaton.is_none()
    }

    /// Whether this polarity's language contains `signature`. An absent
    /// polarity accepts nothing.
    pub fn accepts(&self, signature: &str) -> bool {
        self.automaton
            .as_ref()
            .is_some_and(|a| a.accepts(signature))
    }

    /// Compile a single, fully substituted pattern. Action patterns are
    /// brought to canonical form first, so the automaton and the literal
    /// list agree with the signatures the engine promotes and intercepts.
    pub fn from_pattern(pattern: &str) -> Self {
        let trimmed = pattern.trim();
        let shape = Shape::of(trimmed);
        let text = match shape {
            Shape::Action if trimmed != pattern::UNIVERSAL => canonical_action(trimmed),
            _ => trimmed.to_string(),
        };
        let mut polarity = Self {
            automaton: Some(Automaton::from_tokens(&pattern::tokenize(&text))),
            ..Self::default()
        };
        if pattern::is_concrete(&text) {
            match shape {
                Shape::Action => polarity.actions.insert(text),
                Shape::Result => polarity.results.insert(text),
            };
        }
        polarity
    }

    pub fn intersect(&self, other: &Polarity) -> Polarity {
        match (&self.automaton, &other.automaton) {
            (Some(a), Some(b)) => Polarity {
                automaton: Some(a.intersect(b)),
                actions: self.actions.intersection(&other.actions).cloned().collect(),
                results: self.results.intersection(&other.results).cloned().collect(),
            },
            _ => Polarity::absent(),
        }
    }

    pub fn union(&self, other: &Polarity) -> Polarity {
        match (&self.automaton, &other.automaton) {
            (Some(a), Some(b)) => Polarity {
                automaton: Some(a.union(b)),
                actions: self.actions.union(&other.actions).cloned().collect(),
                results: self.results.union(&other.results).cloned().collect(),
            },
            (Some(_), None) => self.clone(),
            (None, _) => other.clone(),
        }
    }

    /// Restrict to signatures of one shape.
    pub fn project(&self, shape: Shape) -> Polarity {
        let Some(automaton) = &self.automaton else {
            return Polarity::absent();
        };
        let (actions, results) = match shape {
            Shape::Action => (self.actions.clone(), BTreeSet::new()),
            Shape::Result => (BTreeSet::new(), self.results.clone()),
        };
        Polarity {
            automaton: Some(automaton.intersect(&Automaton::shaped(shape))),
            actions,
            results,
        }
    }
}

/// The evaluated form of an SRE.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompiledDecision {
    pub positive: Polarity,
    pub negative: Polarity,
}

impl CompiledDecision {
    pub fn neutral() -> Self {
        Self::default()
    }

    /// No opinion on either polarity.
    pub fn is_neutral(&self) -> bool {
        self.positive.is_absent() && self.negative.is_absent()
    }

    pub fn positive_automaton(&self) -> Option<&Automaton> {
        self.positive.automaton.as_ref()
    }

    pub fn negative_automaton(&self) -> Option<&Automaton> {
        self.negative.automaton.as_ref()
    }

    /// Concrete action signatures the decision would promote, sorted.
    pub fn concrete_actions(&self) -> &BTreeSet<String> {
        &self.positive.actions
    }

    /// Concrete result literals the decision would substitute, sorted.
    pub fn concrete_results(&self) -> &BTreeSet<String> {
        &self.positive.results
    }

    pub fn and(&self, other: &CompiledDecision) -> CompiledDecision {
        if self.is_neutral() || other.is_neutral() {
            return CompiledDecision::neutral();
        }
        CompiledDecision {
            positive: self.positive.intersect(&other.positive),
            negative: self.negative.union(&other.negative),
        }
    }

    pub fn or(&self, other: &CompiledDecision) -> CompiledDecision {
        if self.is_neutral() {
            return other.clone();
        }
        if other.is_neutral() {
            return self.clone();
        }
        CompiledDecision {
            positive: self.positive.union(&other.positive),
            negative: self.negative.intersect(&other.negative),
        }
    }

    pub fn combine(&self, op: BinOp, other: &CompiledDecision) -> CompiledDecision {
        match op {
            BinOp::And => self.and(other),
            BinOp::Or => self.or(other),
        }
    }

    pub fn apply(self, op: UnOp) -> CompiledDecision {
        match op {
            UnOp::Complement => CompiledDecision {
                positive: self.negative,
                negative: self.positive,
            },
            UnOp::Actions => CompiledDecision {
                positive: self.positive.project(Shape::Action),
                negative: self.negative.project(Shape::Action),
            },
            UnOp::Results => CompiledDecision {
                positive: self.positive.project(Shape::Result),
                negative: self.negative.project(Shape::Result),
            },
            UnOp::Positive => CompiledDecision {
                positive: self.positive,
                negative: Polarity::absent(),
            },
            UnOp::Negative => CompiledDecision {
                positive: Polarity::absent(),
                negative: self.negative,
            },
        }
    }
}

/// Compiles SREs against a variable resolver.
///
/// Compilation is pure: the same tree and the same bindings always yield the
/// same decision.
pub struct Compiler<'a> {
    vars: &'a dyn VarResolver,
    max_depth: usize,
}

impl<'a> Compiler<'a> {
    pub fn new(vars: &'a dyn VarResolver) -> Self {
        Self {
            vars,
            max_depth: DEFAULT_MAX_SUBSTITUTION_DEPTH,
        }
    }

    /// Bound recursive variable expansion (see `pattern::substitute`).
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn compile(&self, sre: &Sre) -> Result<CompiledDecision, SreError> {
        match sre {
            Sre::Neutral => Ok(CompiledDecision::neutral()),
            Sre::Leaf { positive, negative } => Ok(CompiledDecision {
                positive: self.leaf(positive.as_deref())?,
                negative: self.leaf(negative.as_deref())?,
            }),
            Sre::Bin { op, left, right } => {
                let left = self.compile(left)?;
                let right = self.compile(right)?;
                Ok(left.combine(*op, &right))
            }
            Sre::Un { op, sre } => Ok(self.compile(sre)?.apply(*op)),
        }
    }

    fn leaf(&self, pattern: Option<&str>) -> Result<Polarity, SreError> {
        let Some(raw) = pattern else {
            return Ok(Polarity::absent());
        };
        let expanded = pattern::substitute(raw, self.vars, self.max_depth)?;
        if expanded != raw {
            tracing::debug!("expanded pattern '{}' to '{}'", raw, expanded);
        }
        pattern::validate(&expanded)?;
        Ok(Polarity::from_pattern(&expanded))
    }
}

/// Compile with default settings.
pub fn compile(sre: &Sre, vars: &dyn VarResolver) -> Result<CompiledDecision, SreError> {
    Compiler::new(vars).compile(sre)
}
