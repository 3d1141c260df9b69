//! # poco-sre
//!
//! Symbolic regular expressions (SREs) over call signatures, and their
//! compilation into automata.
//!
//! A policy answers every monitored event with an SRE: which signatures it
//! wants to see happen (positive) and which it wants prevented (negative).
//! [`compile`] turns that tree into a [`CompiledDecision`], a pair of
//! automata plus the concrete signatures the engine may promote or
//! substitute. [`Strategy`] merges the decisions of sibling policies.
//!
//! ## Key invariants
//!
//! - **Strict variables**: every `$name` in a leaf pattern must resolve before
//!   compilation; there is no partial substitution.
//! - **Deterministic enumeration**: concrete signatures are kept in sorted
//!   sets, so candidates are always tried in lexicographic order.
//! - **Neutral absorption**: `Neutral AND s = Neutral`, `Neutral OR s = s`.

pub mod automaton;
pub mod decision;
pub mod error;
pub mod pattern;
pub mod signature;
pub mod sre;
pub mod strategy;

pub use automaton::Automaton;
pub use decision::{compile, CompiledDecision, Compiler, Polarity, DEFAULT_MAX_SUBSTITUTION_DEPTH};
pub use error::SreError;
pub use pattern::{NoVariables, VarResolver};
pub use signature::{canonical_action, ObjectRef, Shape, Signature, TypedLiteral};
pub use sre::{BinOp, Sre, UnOp};
pub use strategy::Strategy;
