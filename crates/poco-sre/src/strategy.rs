// strategy.rs — Combining the decisions of sibling policies.
//
// A composite policy node queries each child (in declaration order) and
// merges the N compiled decisions into one. A child that does not accept the
// event contributes Neutral.
//
//   First         take the first non-neutral child verbatim (no strategy set)
//   Conjunction   ((c1 AND c2) AND c3) ...
//   Disjunction   ((c1 OR  c2) OR  c3) ...

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::decision::CompiledDecision;
use crate::error::SreError;
use crate::sre::BinOp;

/// A named combination strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Strategy {
    #[default]
    First,
    Conjunction,
    Disjunction,
}

impl Strategy {
    /// Parse a strategy name. The empty name selects `First`.
    pub fn parse(name: &str) -> Result<Self, SreError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "" | "first" => Ok(Strategy::First),
            "and" | "conjunction" | "&&" => Ok(Strategy::Conjunction),
            "or" | "disjunction" | "||" => Ok(Strategy::Disjunction),
            _ => Err(SreError::UnknownStrategy {
                name: name.to_string(),
            }),
        }
    }

    /// Merge children's decisions into one.
    pub fn combine(&self, children: &[CompiledDecision]) -> CompiledDecision {
        let op = match self {
            Strategy::First => {
                return children
                    .iter()
                    .find(|d| !d.is_neutral())
                    .cloned()
                    .unwrap_or_default();
            }
            Strategy::Conjunction => BinOp::And,
            Strategy::Disjunction => BinOp::Or,
        };
        let Some((first, rest)) = children.split_first() else {
            return CompiledDecision::neutral();
        };
        rest.iter()
            .fold(first.clone(), |acc, next| acc.combine(op, next))
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::First => write!(f, "first"),
            Strategy::Conjunction => write!(f, "and"),
            Strategy::Disjunction => write!(f, "or"),
        }
    }
}

impl TryFrom<String> for Strategy {
    type Error = SreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Strategy::parse(&value)
    }
}

impl From<Strategy> for String {
    fn from(strategy: Strategy) -> Self {
        strategy.to_string()
    }
}
