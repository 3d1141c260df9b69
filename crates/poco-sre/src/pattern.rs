// pattern.rs — Leaf pattern syntax.
//
// A leaf pattern is a signature (action or result shape) that may contain:
//
//   %  or  *     any run of characters, including none
//   .            on its own: any signature at all
//   $name        a free variable, substituted before compilation
//
// Everything else is literal text. A pattern with no wildcard after
// substitution is "concrete": it denotes exactly one signature and is
// remembered verbatim so the engine can enumerate promotion candidates.

use std::collections::{BTreeMap, HashMap};

use crate::error::SreError;
use crate::signature::{Shape, Signature, TypedLiteral};

/// The pattern that stands for any signature.
pub const UNIVERSAL: &str = ".";

/// One lexical unit of a pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternToken {
    Char(char),
    AnyRun,
}

/// Supplies values for `$name` pattern variables.
pub trait VarResolver {
    /// The textual value bound to `name`, if any.
    fn lookup(&self, name: &str) -> Option<String>;
}

impl VarResolver for HashMap<String, String> {
    fn lookup(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

impl VarResolver for BTreeMap<String, String> {
    fn lookup(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// A resolver with no bindings. Patterns with variables fail against it.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoVariables;

impl VarResolver for NoVariables {
    fn lookup(&self, _name: &str) -> Option<String> {
        None
    }
}

/// Result of one substitution pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expansion {
    /// Text after the pass. Unbound references are left as written.
    pub text: String,
    /// Names that had no binding, in order of appearance.
    pub missing: Vec<String>,
    /// How many references were replaced.
    pub replaced: usize,
}

pub fn is_wildcard(c: char) -> bool {
    c == '%' || c == '*'
}

/// Split a pattern into tokens. The universal pattern is a single `AnyRun`.
pub fn tokenize(pattern: &str) -> Vec<PatternToken> {
    if pattern.trim() == UNIVERSAL {
        return vec![PatternToken::AnyRun];
    }
    pattern
        .trim()
        .chars()
        .map(|c| {
            if is_wildcard(c) {
                PatternToken::AnyRun
            } else {
                PatternToken::Char(c)
            }
        })
        .collect()
}

/// Whether the pattern denotes exactly one signature.
pub fn is_concrete(pattern: &str) -> bool {
    let trimmed = pattern.trim();
    trimmed != UNIVERSAL && !trimmed.chars().any(is_wildcard)
}

/// Names of every `$name` reference, in order, duplicates kept.
pub fn variables(text: &str) -> Vec<String> {
    let mut names = Vec::new();
    expand_variables(text, |name| {
        names.push(name.to_string());
        None
    });
    names
}

/// Replace every `$name` whose lookup succeeds. A `$` not followed by an
/// identifier character is literal text.
pub fn expand_variables(text: &str, mut lookup: impl FnMut(&str) -> Option<String>) -> Expansion {
    let mut out = String::with_capacity(text.len());
    let mut missing = Vec::new();
    let mut replaced = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        let start = i + 1;
        let mut end = start;
        while let Some(&(j, next)) = chars.peek() {
            if next.is_ascii_alphanumeric() || next == '_' {
                end = j + next.len_utf8();
                chars.next();
            } else {
                break;
            }
        }
        if end == start {
            out.push('$');
            continue;
        }
        let name = &text[start..end];
        match lookup(name) {
            Some(value) => {
                out.push_str(&value);
                replaced += 1;
            }
            None => {
                out.push('$');
                out.push_str(name);
                missing.push(name.to_string());
            }
        }
    }

    Expansion {
        text: out,
        missing,
        replaced,
    }
}

/// Upper bound on the text produced by substituting values into one pattern
/// or value.
pub const MAX_EXPANDED_LEN: usize = 64 * 1024;

/// Why a reference was left unexpanded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Blocked {
    Unbound,
    Cycle,
    TooDeep,
    TooLong,
}

/// Depth-first closure substitution.
///
/// Each reference is expanded with its own name on the path, so a name that
/// re-enters its own expansion is a cycle rather than another pass.
struct Closure<'a> {
    vars: &'a dyn VarResolver,
    max_depth: usize,
    origin: Option<&'a str>,
    path: Vec<String>,
    produced: usize,
    blocked: Option<(String, Blocked)>,
}

impl<'a> Closure<'a> {
    fn new(vars: &'a dyn VarResolver, max_depth: usize) -> Self {
        Self {
            vars,
            max_depth,
            origin: None,
            path: Vec::new(),
            produced: 0,
            blocked: None,
        }
    }

    fn expand(&mut self, text: &str) -> String {
        expand_variables(text, |name| self.enter(name)).text
    }

    fn enter(&mut self, name: &str) -> Option<String> {
        let reason = if self.origin == Some(name) || self.path.iter().any(|n| n == name) {
            Blocked::Cycle
        } else if self.path.len() >= self.max_depth {
            Blocked::TooDeep
        } else if self.produced > MAX_EXPANDED_LEN {
            Blocked::TooLong
        } else {
            match self.vars.lookup(name) {
                Some(value) => {
                    self.path.push(name.to_string());
                    let expanded = self.expand(&value);
                    self.path.pop();
                    self.produced += expanded.len();
                    return Some(expanded);
                }
                None => Blocked::Unbound,
            }
        };
        self.blocked.get_or_insert((name.to_string(), reason));
        None
    }
}

/// Strictly substitute all variables in `pattern`.
///
/// Values may themselves contain references, which are expanded in turn.
/// Any unbound name fails the whole substitution; there is no partial
/// result. A name that refers back to itself, nesting deeper than
/// `max_depth`, or output longer than `MAX_EXPANDED_LEN` is malformed.
pub fn substitute(
    pattern: &str,
    vars: &dyn VarResolver,
    max_depth: usize,
) -> Result<String, SreError> {
    let mut closure = Closure::new(vars, max_depth);
    let text = closure.expand(pattern);
    let Some((name, reason)) = closure.blocked else {
        return Ok(text);
    };
    Err(match reason {
        Blocked::Unbound => SreError::UnresolvedVariable {
            name,
            pattern: pattern.to_string(),
        },
        Blocked::Cycle => {
            SreError::malformed(pattern, format!("variable '${}' refers to itself", name))
        }
        Blocked::TooDeep => SreError::malformed(
            pattern,
            format!("variable expansion did not settle within {} levels", max_depth),
        ),
        Blocked::TooLong => SreError::malformed(
            pattern,
            format!("expansion exceeds {} bytes", MAX_EXPANDED_LEN),
        ),
    })
}

/// Best-effort substitution: every reference that can be expanded is, the
/// rest stay literal. Never fails.
pub fn expand_best_effort(text: &str, vars: &dyn VarResolver, max_depth: usize) -> String {
    let mut closure = Closure::new(vars, max_depth);
    let expanded = closure.expand(text);
    if let Some((name, reason)) = closure.blocked {
        tracing::debug!(%name, ?reason, "reference left unexpanded");
    }
    expanded
}

/// Best-effort substitution of the value bound to `name`. References back
/// to `name` itself stay literal.
pub fn expand_value(name: &str, value: &str, vars: &dyn VarResolver, max_depth: usize) -> String {
    let mut closure = Closure::new(vars, max_depth);
    closure.origin = Some(name);
    let expanded = closure.expand(value);
    if let Some((blocked, reason)) = closure.blocked {
        tracing::debug!(variable = name, name = %blocked, ?reason, "reference left unexpanded");
    }
    expanded
}

/// Check that a pattern has signature shape.
///
/// Patterns still carrying variables are only checked as far as their
/// literal structure allows; the full check runs again after substitution.
pub fn validate(pattern: &str) -> Result<(), SreError> {
    let trimmed = pattern.trim();
    if trimmed.is_empty() {
        return Err(SreError::malformed(pattern, "empty pattern"));
    }
    if trimmed == UNIVERSAL || trimmed.chars().all(is_wildcard) {
        return Ok(());
    }

    let has_variables = !variables(trimmed).is_empty();
    match Shape::of(trimmed) {
        Shape::Result => {
            if TypedLiteral::parse(trimmed).is_none() {
                return Err(SreError::malformed(pattern, "expected '#Type{value}'"));
            }
        }
        Shape::Action => {
            // A bare `$p` may expand to a whole signature at runtime.
            if has_variables && !trimmed.contains('(') {
                return Ok(());
            }
            Signature::parse(trimmed)?;
        }
    }
    Ok(())
}
