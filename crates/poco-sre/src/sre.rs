// sre.rs — Symbolic regular expressions.
//
// An SRE is an immutable tree describing which signatures a policy wants to
// see happen (positive) and which it wants prevented (negative):
//
//   Neutral                   no opinion
//   Leaf(+pattern, -pattern)  one or both polarities given by a pattern
//   Bin(op, l, r)             AND / OR over the two operands' languages
//   Un(op, s)                 complement or one of the projections
//
// The tree is data only. `decision::compile` turns it into automata.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SreError;
use crate::pattern;

/// Binary SRE operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinOp {
    And,
    Or,
}

/// Unary SRE operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnOp {
    /// Swap the positive and negative polarities.
    Complement,
    /// Keep only action-shaped signatures.
    Actions,
    /// Keep only result-shaped signatures.
    Results,
    /// Keep only the positive polarity.
    Positive,
    /// Keep only the negative polarity.
    Negative,
}

/// A symbolic regular expression over call signatures.
///
/// Serialized with an internal `type` tag so policy documents read naturally:
/// ```yaml
/// type: bin
/// op: or
/// left:  { type: leaf, positive: "pkg.Foo.bar()" }
/// right: { type: leaf, negative: "pkg.Foo.secret()" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Sre {
    Neutral,
    Leaf {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        positive: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        negative: Option<String>,
    },
    Bin {
        op: BinOp,
        left: Box<Sre>,
        right: Box<Sre>,
    },
    Un {
        op: UnOp,
        sre: Box<Sre>,
    },
}

impl Sre {
    /// `+pattern`
    pub fn positive(pattern: impl Into<String>) -> Self {
        Sre::Leaf {
            positive: Some(pattern.into()),
            negative: None,
        }
    }

    /// `-pattern`
    pub fn negative(pattern: impl Into<String>) -> Self {
        Sre::Leaf {
            positive: None,
            negative: Some(pattern.into()),
        }
    }

    pub fn and(left: Sre, right: Sre) -> Self {
        Sre::Bin {
            op: BinOp::And,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn or(left: Sre, right: Sre) -> Self {
        Sre::Bin {
            op: BinOp::Or,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn unary(op: UnOp, sre: Sre) -> Self {
        Sre::Un {
            op,
            sre: Box::new(sre),
        }
    }

    pub fn complement(sre: Sre) -> Self {
        Self::unary(UnOp::Complement, sre)
    }

    /// Every leaf pattern in the tree, left to right.
    pub fn patterns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_patterns(&mut out);
        out
    }

    fn collect_patterns<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Sre::Neutral => {}
            Sre::Leaf { positive, negative } => {
                out.extend(positive.as_deref());
                out.extend(negative.as_deref());
            }
            Sre::Bin { left, right, .. } => {
                left.collect_patterns(out);
                right.collect_patterns(out);
            }
            Sre::Un { sre, .. } => sre.collect_patterns(out),
        }
    }

    /// Load-time shape check of every leaf pattern.
    pub fn validate(&self) -> Result<(), SreError> {
        self.patterns().into_iter().try_for_each(pattern::validate)
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinOp::And => write!(f, "and"),
            BinOp::Or => write!(f, "or"),
        }
    }
}

impl fmt::Display for UnOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UnOp::Complement => "complement",
            UnOp::Actions => "actions",
            UnOp::Results => "results",
            UnOp::Positive => "positive",
            UnOp::Negative => "negative",
        };
        write!(f, "{}", name)
    }
}

impl fmt::Display for Sre {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sre::Neutral => write!(f, "neutral"),
            Sre::Leaf { positive, negative } => {
                let mut parts = Vec::new();
                if let Some(p) = positive {
                    parts.push(format!("+`{}'", p));
                }
                if let Some(n) = negative {
                    parts.push(format!("-`{}'", n));
                }
                write!(f, "{}", parts.join(" "))
            }
            Sre::Bin { op, left, right } => write!(f, "{}({}, {})", op, left, right),
            Sre::Un { op, sre } => write!(f, "{}({})", op, sre),
        }
    }
}
