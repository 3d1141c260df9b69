// error.rs — Error types for the decision runtime.
//
// Load-time failures (bad patterns, bad filters, bad documents) are fatal to
// the policy tree being built and surface before any event is processed.
// `InvocationFailed` is the only runtime failure; the engine recovers from it
// by moving on to the next promotion candidate. A denied action is an
// outcome, not an error.

use std::path::PathBuf;

use poco_sre::SreError;
use thiserror::Error;

/// Errors that can occur while building or driving a decision engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// An SRE failed to validate or compile.
    #[error("policy compilation failed: {0}")]
    Compile(#[from] SreError),

    /// An acceptance filter pattern is not a valid glob.
    #[error("invalid accept pattern '{pattern}': {reason}")]
    InvalidFilter { pattern: String, reason: String },

    /// The engine configuration file exists but cannot be parsed.
    #[error("invalid engine config at {path}: {reason}")]
    Config { path: PathBuf, reason: String },

    /// A policy document is structurally invalid.
    #[error("invalid policy document: {reason}")]
    Document { reason: String },

    /// Reading a config or policy file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A promoter could not perform a promoted call.
///
/// Recoverable: the engine discards the candidate and tries the next one.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invocation of '{signature}' failed: {reason}")]
pub struct InvocationFailed {
    pub signature: String,
    pub reason: String,
}

impl InvocationFailed {
    pub fn new(signature: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            signature: signature.into(),
            reason: reason.into(),
        }
    }
}
