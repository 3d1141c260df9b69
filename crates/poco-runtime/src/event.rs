// event.rs — Intercepted program events.
//
// The instrumentation layer builds one Event per intercepted call site:
// an Action before the call proceeds, or a Result once it has returned.
// Events are immutable once constructed. Call signatures are stored in
// canonical form, the same form action patterns compile to.

use serde::{Deserialize, Serialize};

use poco_sre::{canonical_action, TypedLiteral};

use crate::value::Value;

/// Whether an event is a call about to happen or a value just returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Action,
    Result,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::Action => write!(f, "action"),
            EventKind::Result => write!(f, "result"),
        }
    }
}

/// The returned value carried by a Result event.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultPayload {
    /// The actual value the call returned.
    pub value: Value,
    /// Its `#Type{value}` form, matched against result patterns.
    pub signature: String,
}

/// One intercepted event.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    signature: String,
    payload: Option<ResultPayload>,
}

impl Event {
    /// A call about to be made, e.g. `pkg.Foo.bar(int)`.
    pub fn action(signature: impl AsRef<str>) -> Self {
        Self {
            signature: canonical_action(signature.as_ref()),
            payload: None,
        }
    }

    /// The result of the call `signature`. The result signature defaults to
    /// `#<type tag>{<rendered value>}`.
    pub fn result(signature: impl AsRef<str>, value: Value) -> Self {
        let literal = TypedLiteral {
            type_tag: value.type_tag().to_string(),
            value: value.to_string(),
        };
        Self::result_with_signature(signature, value, literal.to_string())
    }

    /// The result of the call `signature`, with an explicit result signature
    /// (e.g. when the host renders object results by address).
    pub fn result_with_signature(
        signature: impl AsRef<str>,
        value: Value,
        result_signature: impl Into<String>,
    ) -> Self {
        Self {
            signature: canonical_action(signature.as_ref()),
            payload: Some(ResultPayload {
                value,
                signature: result_signature.into(),
            }),
        }
    }

    /// The intercepted call's signature.
    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn kind(&self) -> EventKind {
        if self.payload.is_some() {
            EventKind::Result
        } else {
            EventKind::Action
        }
    }

    pub fn payload(&self) -> Option<&ResultPayload> {
        self.payload.as_ref()
    }

    /// The signature pushed onto the engine's pending stacks: the call
    /// signature for actions, the result literal for results.
    pub fn pending_signature(&self) -> &str {
        match &self.payload {
            Some(payload) => &payload.signature,
            None => &self.signature,
        }
    }
}
