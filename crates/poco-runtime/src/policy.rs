// policy.rs — Policy nodes.
//
// A policy answers an event with an SRE. The engine holds an ordered list of
// top-level policies; composites nest further lists under their own
// combination strategy.
//
//   SrePolicy        acceptance filter + one SRE
//   CompositePolicy  strategy over child policies
//
// Each node caches its compiled decision for the current round. The engine
// clears every cache at the start of a round, so within one round repeated
// queries (e.g. from nested composites) compile once.

use glob::Pattern;

use poco_sre::{CompiledDecision, Compiler, Sre, SreError, Strategy};

use crate::error::EngineError;
use crate::event::{Event, EventKind};

/// A node in the policy tree.
pub trait Policy: Send {
    fn name(&self) -> &str;

    /// Whether this policy has an opinion about `event` at all.
    fn accepts(&self, event: &Event) -> bool;

    /// The decision for `event`, compiled against the current bindings.
    /// Cached until `clear_queried`.
    fn query(&mut self, event: &Event, compiler: &Compiler<'_>)
        -> Result<CompiledDecision, SreError>;

    /// Drop the per-round cache.
    fn clear_queried(&mut self);

    /// Load-time check of everything that can be checked before events
    /// arrive.
    fn validate(&self) -> Result<(), SreError> {
        Ok(())
    }
}

/// Query each child in order; a child that does not accept the event
/// contributes Neutral.
pub fn query_children(
    children: &mut [Box<dyn Policy>],
    event: &Event,
    compiler: &Compiler<'_>,
) -> Result<Vec<CompiledDecision>, SreError> {
    children
        .iter_mut()
        .map(|child| {
            if child.accepts(event) {
                child.query(event, compiler)
            } else {
                Ok(CompiledDecision::neutral())
            }
        })
        .collect()
}

/// Which events a policy accepts.
///
/// Patterns are globs over the event's call signature (`*` any run, `?` one
/// character, `[...]` a class; write `[[]` for a literal bracket). An empty
/// pattern list accepts every signature.
#[derive(Debug, Clone, Default)]
pub struct AcceptFilter {
    patterns: Vec<Pattern>,
    kind: Option<EventKind>,
}

impl AcceptFilter {
    /// Accept every event.
    pub fn all() -> Self {
        Self::default()
    }

    /// Accept events whose signature matches any of `patterns`.
    pub fn signatures<S: AsRef<str>>(patterns: &[S]) -> Result<Self, EngineError> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Pattern::new(p.as_ref()).map_err(|e| EngineError::InvalidFilter {
                    pattern: p.as_ref().to_string(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            patterns,
            kind: None,
        })
    }

    /// Restrict to one event kind.
    pub fn only(mut self, kind: EventKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn matches(&self, event: &Event) -> bool {
        if self.kind.is_some_and(|k| k != event.kind()) {
            return false;
        }
        self.patterns.is_empty() || self.patterns.iter().any(|p| p.matches(event.signature()))
    }
}

/// A leaf policy: one SRE behind an acceptance filter.
#[derive(Debug, Clone)]
pub struct SrePolicy {
    name: String,
    filter: AcceptFilter,
    sre: Sre,
    cached: Option<CompiledDecision>,
}

impl SrePolicy {
    pub fn new(name: impl Into<String>, sre: Sre) -> Self {
        Self {
            name: name.into(),
            filter: AcceptFilter::all(),
            sre,
            cached: None,
        }
    }

    pub fn with_filter(mut self, filter: AcceptFilter) -> Self {
        self.filter = filter;
        self
    }
}

impl Policy for SrePolicy {
    fn name(&self) -> &str {
        &self.name
    }

    fn accepts(&self, event: &Event) -> bool {
        self.filter.matches(event)
    }

    fn query(
        &mut self,
        _event: &Event,
        compiler: &Compiler<'_>,
    ) -> Result<CompiledDecision, SreError> {
        if let Some(decision) = &self.cached {
            return Ok(decision.clone());
        }
        let decision = compiler.compile(&self.sre)?;
        tracing::debug!(policy = %self.name, sre = %self.sre, "compiled policy decision");
        self.cached = Some(decision.clone());
        Ok(decision)
    }

    fn clear_queried(&mut self) {
        self.cached = None;
    }

    fn validate(&self) -> Result<(), SreError> {
        self.sre.validate()
    }
}

/// An interior node combining its children's decisions.
pub struct CompositePolicy {
    name: String,
    strategy: Strategy,
    children: Vec<Box<dyn Policy>>,
    cached: Option<CompiledDecision>,
}

impl CompositePolicy {
    pub fn new(name: impl Into<String>, strategy: Strategy) -> Self {
        Self {
            name: name.into(),
            strategy,
            children: Vec::new(),
            cached: None,
        }
    }

    pub fn with_child(mut self, child: impl Policy + 'static) -> Self {
        self.children.push(Box::new(child));
        self
    }

    pub fn push(&mut self, child: Box<dyn Policy>) {
        self.children.push(child);
    }

}

impl std::fmt::Debug for CompositePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.children.iter().map(|c| c.name()).collect();
        f.debug_struct("CompositePolicy")
            .field("name", &self.name)
            .field("strategy", &self.strategy)
            .field("children", &names)
            .finish()
    }
}

impl Policy for CompositePolicy {
    fn name(&self) -> &str {
        &self.name
    }

    fn accepts(&self, event: &Event) -> bool {
        self.children.iter().any(|c| c.accepts(event))
    }

    fn query(
        &mut self,
        event: &Event,
        compiler: &Compiler<'_>,
    ) -> Result<CompiledDecision, SreError> {
        if let Some(decision) = &self.cached {
            return Ok(decision.clone());
        }
        let decisions = query_children(&mut self.children, event, compiler)?;
        let decision = self.strategy.combine(&decisions);
        self.cached = Some(decision.clone());
        Ok(decision)
    }

    fn clear_queried(&mut self) {
        self.cached = None;
        for child in &mut self.children {
            child.clear_queried();
        }
    }

    fn validate(&self) -> Result<(), SreError> {
        self.children.iter().try_for_each(|c| c.validate())
    }
}
