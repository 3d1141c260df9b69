//! # poco-runtime
//!
//! The runtime half of policy enforcement: given a tree of policies and a
//! stream of intercepted events, decide for each event whether it proceeds,
//! is replaced by a promoted action, has its result substituted, or halts
//! the process.
//!
//! The instrumentation layer owns three things the engine only borrows:
//! the [`Warehouse`] of observed program state, a [`Promoter`] that can
//! perform calls, and the [`Event`]s it builds at each call site.
//!
//! ## Key invariants
//!
//! - **Deterministic**: a fixed policy tree, fixed bindings and a fixed event
//!   sequence always produce the same outcomes.
//! - **Fail fast**: malformed patterns, filters and strategy names are
//!   rejected when policies are added, before any event is processed.
//! - **Fast path first**: when the intercepted action is itself permitted,
//!   the promoter is never called.
//! - **Deny halts**: a denied action reaches the [`HaltHandler`]; the
//!   default handler exits the process.
//! - **One round at a time**: [`SharedEngine`] serializes rounds across
//!   threads; nested events arrive through the promoter's `&mut` engine.

pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod event;
pub mod halt;
pub mod policy;
pub mod promoter;
pub mod trace;
pub mod value;
pub mod warehouse;

pub use config::EngineConfig;
pub use document::{CompositeSpec, LeafSpec, PolicyDocument, PolicySpec};
pub use engine::{DecisionEngine, DecisionOutcome, SharedEngine};
pub use error::{EngineError, InvocationFailed};
pub use event::{Event, EventKind, ResultPayload};
pub use halt::{HaltHandler, ProcessHalt, RecordingHalt};
pub use policy::{AcceptFilter, CompositePolicy, Policy, SrePolicy};
pub use promoter::{CallTarget, NoPromotion, PromotedCall, Promoter};
pub use trace::{DecisionTrace, ProtocolState, ProtocolStep, TraceOutcome};
pub use value::{LiveObject, ObjectHandle, PrimitiveType, Record, Value};
pub use warehouse::{Binding, Warehouse};

pub use poco_sre::{Sre, Strategy};
