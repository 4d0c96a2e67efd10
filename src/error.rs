//! Unified error taxonomy shared by the parser, serializer, and streaming driver.

use thiserror::Error;

/// Errors surfaced by parsing or serializing a value graph.
///
/// `Reject` (a settled-rejected `Promise`) is deliberately not a variant
/// here: a rejected promise is preserved in the IR (`PromiseStatus::Reject`)
/// and never raised as a Rust error. See `ir::types::PromiseStatus`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SerovalError {
    /// The value has no applicable parse case (dispatch fell through).
    #[error("unsupported type: {description}")]
    UnsupportedType { description: String },

    /// Faithful emission of the value requires a feature the caller disabled.
    #[error("feature '{feature}' is disabled: {description}")]
    FeatureDisabled {
        feature: &'static str,
        description: String,
    },

    /// A `Plugin` IR node's tag has no resolver in the serializer's plugin set.
    #[error("no plugin registered for tag '{tag}'")]
    MissingPlugin { tag: String },

    /// Internal inconsistency — an IR shape the serializer was not built to
    /// expect reached it anyway (e.g. a streaming-only tag outside streaming
    /// mode, or a malformed JSON IR node).
    #[error("invariant violation: {detail}")]
    InvariantViolation { detail: String },
}

impl SerovalError {
    pub fn unsupported(description: impl Into<String>) -> Self {
        SerovalError::UnsupportedType {
            description: description.into(),
        }
    }

    pub fn feature_disabled(feature: &'static str, description: impl Into<String>) -> Self {
        SerovalError::FeatureDisabled {
            feature,
            description: description.into(),
        }
    }

    pub fn missing_plugin(tag: impl Into<String>) -> Self {
        SerovalError::MissingPlugin { tag: tag.into() }
    }

    pub fn invariant(detail: impl Into<String>) -> Self {
        SerovalError::InvariantViolation {
            detail: detail.into(),
        }
    }
}

/// Error returned by `create_reference` when a tag is already bound to a
/// different handle.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("reference tag '{tag}' is already registered")]
pub struct CreateReferenceError {
    pub tag: String,
}
