// engine.rs — The per-event decision protocol.
//
// Every intercepted event goes through `query_action()`, which walks a fixed
// sequence of states and stops at the first that decides:
//
// 1. Start            push the event onto the pending stack for its kind,
//                     clear every policy's per-round cache
// 2. MergeChildren    query accepting policies, combine under the root
//                     strategy → Neutral means Allow
// 3. PositiveFastPath the pending action is itself permitted → pop, Allow
// 4. PositiveSearch   promote the first (lexicographic) concrete action the
//                     positive automaton accepts and the promoter performs
// 5. ResultFastPath   the pending result is itself permitted → pop, Allow
// 6. ResultSearch     substitute the first concrete result that resolves
//                     (or stash it for the caller when no result is pending)
// 7. NegativeCheck    the pending action is forbidden → pop, Deny (halt)
//                     otherwise Allow
//
// Positive before negative, fast path before search, and the lexicographic
// order of candidates together make the outcome a pure function of the
// policy tree, the bindings and the event sequence.
//
// Results are never denied: the negative check looks only at the action
// stack.

use std::sync::{Arc, Mutex, PoisonError};

use poco_sre::{Automaton, CompiledDecision, Compiler, Signature, SreError, Strategy, TypedLiteral};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::event::{Event, ResultPayload};
use crate::halt::{HaltHandler, ProcessHalt};
use crate::policy::{query_children, Policy};
use crate::promoter::{CallTarget, PromotedCall, Promoter};
use crate::trace::{DecisionTrace, ProtocolState, TraceOutcome};
use crate::value::Value;
use crate::warehouse::Warehouse;

/// What the instrumentation layer should do with the intercepted event.
#[derive(Debug, Clone, PartialEq)]
pub enum DecisionOutcome {
    /// Proceed unmodified.
    Allow,
    /// A different action was performed in place of this one.
    Promoted { signature: String },
    /// The action is forbidden. With the default halt handler the process
    /// has already exited by the time this would be returned.
    Denied { signature: String },
    /// Use this value as the call's result.
    ResultAssigned(Value),
    /// A result was produced for a pure action; fetch it with
    /// `DecisionEngine::take_action_result`.
    ResultStored,
}

/// Owns the policy tree and all per-process decision state.
pub struct DecisionEngine {
    children: Vec<Box<dyn Policy>>,
    strategy: Strategy,
    warehouse: Arc<Warehouse>,
    config: EngineConfig,
    halt: Box<dyn HaltHandler>,
    pending_actions: Vec<String>,
    pending_results: Vec<ResultPayload>,
    promoted_events: Vec<String>,
    action_results: Vec<Value>,
    active_rounds: usize,
    last_trace: Option<DecisionTrace>,
}

impl DecisionEngine {
    pub fn new(warehouse: Arc<Warehouse>) -> Self {
        Self::with_config(warehouse, EngineConfig::default())
    }

    /// Build an engine. The config's substitution bound is applied to the
    /// warehouse as well as to pattern compilation.
    pub fn with_config(warehouse: Arc<Warehouse>, config: EngineConfig) -> Self {
        warehouse.set_max_depth(config.max_substitution_depth);
        Self {
            children: Vec::new(),
            strategy: config.strategy.unwrap_or_default(),
            warehouse,
            config,
            halt: Box::new(ProcessHalt),
            pending_actions: Vec::new(),
            pending_results: Vec::new(),
            promoted_events: Vec::new(),
            action_results: Vec::new(),
            active_rounds: 0,
            last_trace: None,
        }
    }

    /// Set the strategy that combines the top-level policies.
    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_halt_handler(mut self, handler: impl HaltHandler + 'static) -> Self {
        self.halt = Box::new(handler);
        self
    }

    /// Add a top-level policy. Its patterns are validated now so a malformed
    /// policy is rejected before any event is processed.
    pub fn add_policy(&mut self, policy: impl Policy + 'static) -> Result<(), EngineError> {
        self.add_boxed_policy(Box::new(policy))
    }

    pub fn add_boxed_policy(&mut self, policy: Box<dyn Policy>) -> Result<(), EngineError> {
        policy.validate()?;
        tracing::info!(policy = %policy.name(), "policy loaded");
        self.children.push(policy);
        Ok(())
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn policy_count(&self) -> usize {
        self.children.len()
    }

    pub fn warehouse(&self) -> &Arc<Warehouse> {
        &self.warehouse
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Actions intercepted and not yet resolved, oldest first.
    pub fn pending_actions(&self) -> &[String] {
        &self.pending_actions
    }

    /// Result signatures awaiting resolution, oldest first.
    pub fn pending_results(&self) -> Vec<&str> {
        self.pending_results
            .iter()
            .map(|p| p.signature.as_str())
            .collect()
    }

    /// Promotions performed so far, oldest first. Failed attempts are removed.
    pub fn promoted_events(&self) -> &[String] {
        &self.promoted_events
    }

    pub fn has_action_result(&self) -> bool {
        !self.action_results.is_empty()
    }

    /// Take the most recent result produced for a pure action.
    pub fn take_action_result(&mut self) -> Option<Value> {
        self.action_results.pop()
    }

    /// Trace of the most recently completed round, if traces are recorded.
    pub fn last_trace(&self) -> Option<&DecisionTrace> {
        self.last_trace.as_ref()
    }

    /// Drop all per-process decision state. Policies and bindings are kept.
    pub fn reset(&mut self) {
        self.pending_actions.clear();
        self.pending_results.clear();
        self.promoted_events.clear();
        self.action_results.clear();
        self.last_trace = None;
        self.clear_queried();
    }

    /// Decide one event.
    ///
    /// The promoter is called at most once per candidate and may deliver
    /// nested events to this engine while it runs.
    pub fn query_action(
        &mut self,
        event: &Event,
        promoter: &mut dyn Promoter,
    ) -> Result<DecisionOutcome, EngineError> {
        let mut trace = DecisionTrace::begin(event, self.active_rounds);
        self.active_rounds += 1;
        let result = self.run_round(event, promoter, &mut trace);
        self.active_rounds -= 1;

        if let Err(e) = &result {
            tracing::error!(signature = %event.signature(), error = %e, "decision round failed");
        }
        if self.config.record_traces {
            self.last_trace = Some(trace);
        }
        result
    }

    fn run_round(
        &mut self,
        event: &Event,
        promoter: &mut dyn Promoter,
        trace: &mut DecisionTrace,
    ) -> Result<DecisionOutcome, EngineError> {
        // ── Start ──
        match event.payload() {
            None => {
                self.pending_actions.push(event.signature().to_string());
                trace.step(ProtocolState::Start, format!("pending action {}", event.signature()));
            }
            Some(payload) => {
                self.pending_results.push(payload.clone());
                trace.step(ProtocolState::Start, format!("pending result {}", payload.signature));
            }
        }
        self.clear_queried();

        // ── MergeChildren ──
        let decision = match self.merge(event) {
            Ok(decision) => decision,
            Err(e) => {
                self.abandon(event);
                return Err(e.into());
            }
        };
        if decision.is_neutral() {
            trace.finish(
                ProtocolState::MergeChildren,
                "no policy has an opinion",
                TraceOutcome::Allow,
            );
            tracing::debug!(signature = %event.signature(), "allowed: no policy has an opinion");
            return Ok(DecisionOutcome::Allow);
        }
        trace.step(
            ProtocolState::MergeChildren,
            format!("{} policies merged under '{}'", self.children.len(), self.strategy),
        );

        if let Some(positive) = decision.positive_automaton() {
            // ── PositiveFastPath ──
            if let Some(signature) = pop_accepted(&mut self.pending_actions, positive) {
                trace.finish(
                    ProtocolState::PositiveFastPath,
                    format!("{} is permitted", signature),
                    TraceOutcome::Allow,
                );
                tracing::info!(%signature, "allowed: action is permitted");
                return Ok(DecisionOutcome::Allow);
            }
            trace.step(
                ProtocolState::PositiveFastPath,
                "pending action is not itself permitted",
            );

            // ── PositiveSearch ──
            if let Some(signature) = self.promote(&decision, positive, promoter) {
                trace.finish(
                    ProtocolState::PositiveSearch,
                    format!("promoted {}", signature),
                    TraceOutcome::Promoted {
                        signature: signature.clone(),
                    },
                );
                return Ok(DecisionOutcome::Promoted { signature });
            }
            trace.step(ProtocolState::PositiveSearch, "no candidate action was promoted");

            // ── ResultFastPath / ResultSearch ──
            if self.pending_results.is_empty() {
                trace.step(ProtocolState::ResultFastPath, "no pending result");
                if let Some(value) = self.find_result(&decision, positive) {
                    trace.finish(
                        ProtocolState::ResultSearch,
                        "stored result for pure action",
                        TraceOutcome::ResultStored {
                            value: value.to_string(),
                        },
                    );
                    tracing::info!(signature = %event.signature(), result = %value, "stored result for action");
                    self.action_results.push(value);
                    return Ok(DecisionOutcome::ResultStored);
                }
            } else {
                let top_accepted = self
                    .pending_results
                    .last()
                    .is_some_and(|top| positive.accepts(&top.signature));
                if top_accepted {
                    let signature = self
                        .pending_results
                        .pop()
                        .map(|p| p.signature)
                        .unwrap_or_default();
                    trace.finish(
                        ProtocolState::ResultFastPath,
                        format!("{} is permitted", signature),
                        TraceOutcome::Allow,
                    );
                    tracing::info!(%signature, "allowed: result is permitted");
                    return Ok(DecisionOutcome::Allow);
                }
                trace.step(
                    ProtocolState::ResultFastPath,
                    "pending result is not itself permitted",
                );
                if let Some(value) = self.find_result(&decision, positive) {
                    self.pending_results.pop();
                    trace.finish(
                        ProtocolState::ResultSearch,
                        "substituted result",
                        TraceOutcome::ResultAssigned {
                            value: value.to_string(),
                        },
                    );
                    tracing::info!(signature = %event.signature(), result = %value, "result substituted");
                    return Ok(DecisionOutcome::ResultAssigned(value));
                }
            }
            trace.step(ProtocolState::ResultSearch, "no concrete result resolved");
        }

        // ── NegativeCheck ──
        let Some(negative) = decision.negative_automaton() else {
            trace.finish(
                ProtocolState::NegativeCheck,
                "no negative opinion",
                TraceOutcome::Allow,
            );
            tracing::info!(signature = %event.signature(), "allowed: not forbidden");
            return Ok(DecisionOutcome::Allow);
        };
        match pop_accepted(&mut self.pending_actions, negative) {
            Some(signature) => {
                trace.finish(
                    ProtocolState::NegativeCheck,
                    format!("{} is forbidden", signature),
                    TraceOutcome::Denied {
                        signature: signature.clone(),
                    },
                );
                tracing::error!(%signature, "denied: action is not allowed to be executed");
                self.halt.halt(&signature, self.config.deny_exit_code);
                Ok(DecisionOutcome::Denied { signature })
            }
            None => {
                trace.finish(
                    ProtocolState::NegativeCheck,
                    "pending action is not forbidden",
                    TraceOutcome::Allow,
                );
                tracing::info!(signature = %event.signature(), "allowed: not forbidden");
                Ok(DecisionOutcome::Allow)
            }
        }
    }

    fn clear_queried(&mut self) {
        for child in &mut self.children {
            child.clear_queried();
        }
    }

    fn merge(&mut self, event: &Event) -> Result<CompiledDecision, SreError> {
        let warehouse = Arc::clone(&self.warehouse);
        let compiler =
            Compiler::new(&*warehouse).with_max_depth(self.config.max_substitution_depth);
        let decisions = query_children(&mut self.children, event, &compiler)?;
        Ok(self.strategy.combine(&decisions))
    }

    /// Undo the Start push of a round that failed before deciding.
    fn abandon(&mut self, event: &Event) {
        match event.payload() {
            None => {
                self.pending_actions.pop();
            }
            Some(_) => {
                self.pending_results.pop();
            }
        }
    }

    /// Try each accepted concrete action in lexicographic order until the
    /// promoter performs one.
    fn promote(
        &mut self,
        decision: &CompiledDecision,
        positive: &Automaton,
        promoter: &mut dyn Promoter,
    ) -> Option<String> {
        for candidate in decision.concrete_actions() {
            if !positive.accepts(candidate) {
                continue;
            }
            let parsed = match Signature::parse(candidate) {
                Ok(parsed) => parsed,
                Err(e) => {
                    tracing::warn!(%candidate, error = %e, "skipping unparseable candidate");
                    continue;
                }
            };
            let (target, signature) = match &parsed.object {
                Some(object) => match self.warehouse.call_target(object) {
                    Some(handle) => {
                        let signature = parsed.retarget(handle.type_name());
                        (CallTarget::Object(handle), signature)
                    }
                    None => {
                        tracing::debug!(%candidate, "skipping candidate: object target is gone");
                        continue;
                    }
                },
                None => (CallTarget::Static, parsed.to_string()),
            };
            let call = PromotedCall {
                target,
                signature,
                constructor: parsed.is_constructor,
                args: self.warehouse.materialize(&parsed.args),
            };

            let mark = self.promoted_events.len();
            self.promoted_events.push(call.signature.clone());
            match promoter.invoke(self, &call) {
                Ok(()) => {
                    tracing::info!(signature = %call.signature, "promoted action");
                    return Some(call.signature);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "promotion failed, trying next candidate");
                    self.promoted_events.truncate(mark);
                }
            }
        }
        None
    }

    /// First accepted concrete result that resolves to a value.
    fn find_result(&self, decision: &CompiledDecision, positive: &Automaton) -> Option<Value> {
        decision
            .concrete_results()
            .iter()
            .filter(|literal| positive.accepts(literal))
            .find_map(|literal| {
                let parsed = TypedLiteral::parse(literal)?;
                let value = self.warehouse.literal_value(&parsed);
                if value.is_none() {
                    tracing::debug!(%literal, "concrete result does not resolve");
                }
                value
            })
    }
}

impl std::fmt::Debug for DecisionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let policies: Vec<&str> = self.children.iter().map(|c| c.name()).collect();
        f.debug_struct("DecisionEngine")
            .field("policies", &policies)
            .field("strategy", &self.strategy)
            .field("pending_actions", &self.pending_actions)
            .field("pending_results", &self.pending_results())
            .field("promoted_events", &self.promoted_events)
            .finish()
    }
}

/// Pop the top of `stack` if `automaton` accepts it.
fn pop_accepted(stack: &mut Vec<String>, automaton: &Automaton) -> Option<String> {
    if stack.last().is_some_and(|top| automaton.accepts(top)) {
        stack.pop()
    } else {
        None
    }
}

/// An engine shared across host threads.
///
/// Top-level rounds are serialized by one lock, in arrival order. Nested
/// events raised during a promotion must go through the `&mut DecisionEngine`
/// the promoter receives, never through this handle.
#[derive(Clone)]
pub struct SharedEngine {
    inner: Arc<Mutex<DecisionEngine>>,
}

impl SharedEngine {
    pub fn new(engine: DecisionEngine) -> Self {
        Self {
            inner: Arc::new(Mutex::new(engine)),
        }
    }

    pub fn query_action(
        &self,
        event: &Event,
        promoter: &mut dyn Promoter,
    ) -> Result<DecisionOutcome, EngineError> {
        self.with_engine(|engine| engine.query_action(event, promoter))
    }

    /// Run `f` with exclusive access to the engine.
    pub fn with_engine<R>(&self, f: impl FnOnce(&mut DecisionEngine) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}
