// promoter.rs — The promotion capability consumed by the engine.
//
// When a policy wants a different action to happen, the engine resolves the
// call (static or on a live object) and its arguments, then hands it to a
// `Promoter`. How the call is actually performed is the host's business:
// a dispatch table, an FFI bridge, a scripted test double.
//
// The promoter receives the engine itself so that calls it makes can be
// intercepted and decided in turn (nested rounds) without a re-entrant lock.

use crate::engine::DecisionEngine;
use crate::error::InvocationFailed;
use crate::value::{ObjectHandle, Value};

/// Where a promoted call goes.
#[derive(Debug, Clone)]
pub enum CallTarget {
    /// A static method or constructor.
    Static,
    /// A method on a live object resolved from the warehouse.
    Object(ObjectHandle),
}

/// A fully resolved call ready for invocation.
#[derive(Debug, Clone)]
pub struct PromotedCall {
    pub target: CallTarget,
    /// Call signature; object calls are rewritten to `<type>.<method>(args)`.
    pub signature: String,
    /// Whether the call constructs a new object.
    pub constructor: bool,
    /// Materialized arguments, positionally aligned with the signature.
    /// `None` where a descriptor produced no value.
    pub args: Vec<Option<Value>>,
}

/// Performs promoted calls on behalf of the engine.
pub trait Promoter {
    fn invoke(
        &mut self,
        engine: &mut DecisionEngine,
        call: &PromotedCall,
    ) -> Result<(), InvocationFailed>;
}

/// A promoter that refuses every call. Candidates are discarded and the
/// protocol falls through to result substitution and the negative check.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPromotion;

impl Promoter for NoPromotion {
    fn invoke(
        &mut self,
        _engine: &mut DecisionEngine,
        call: &PromotedCall,
    ) -> Result<(), InvocationFailed> {
        Err(InvocationFailed::new(
            call.signature.clone(),
            "promotion is disabled",
        ))
    }
}

impl<F> Promoter for F
where
    F: FnMut(&mut DecisionEngine, &PromotedCall) -> Result<(), InvocationFailed>,
{
    fn invoke(
        &mut self,
        engine: &mut DecisionEngine,
        call: &PromotedCall,
    ) -> Result<(), InvocationFailed> {
        self(engine, call)
    }
}
