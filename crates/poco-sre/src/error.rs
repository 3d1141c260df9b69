// error.rs — Error types for SRE compilation.
//
// All of these are load-time or compile-time failures. They surface to
// whoever triggered compilation (the policy tree builder, or the engine when
// a pattern variable is bound only at runtime) and are never retried.

use thiserror::Error;

/// Errors that can occur while validating or compiling SREs.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SreError {
    /// A leaf pattern does not have signature shape.
    #[error("malformed pattern '{pattern}': {reason}")]
    MalformedPattern { pattern: String, reason: String },

    /// A `$name` variable in a leaf pattern has no binding.
    #[error("unresolved variable '${name}' in pattern '{pattern}'")]
    UnresolvedVariable { name: String, pattern: String },

    /// A composite node names a combination strategy nobody implements.
    #[error("unknown combination strategy '{name}'")]
    UnknownStrategy { name: String },
}

impl SreError {
    pub(crate) fn malformed(pattern: &str, reason: impl Into<String>) -> Self {
        SreError::MalformedPattern {
            pattern: pattern.to_string(),
            reason: reason.into(),
        }
    }
}
