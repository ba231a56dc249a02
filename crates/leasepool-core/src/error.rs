//! Error types for LeasePool core types

use thiserror::Error;

/// Errors raised while interpreting an update patch
///
/// `NotAnObject` and `MissingUsername` are caught when a patch is submitted.
/// `InvalidField` only surfaces when the patch is applied and marks the
/// patch as permanently unusable.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PatchError {
    #[error("Patch must be a JSON object")]
    NotAnObject,

    #[error("Patch is missing a non-empty string `username`")]
    MissingUsername,

    #[error("Patch does not fit the account record: {0}")]
    InvalidField(String),
}

/// Errors raised when parsing textual values
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Unknown auth service: {0}")]
    AuthService(String),

    #[error("Unknown account condition: {0}")]
    Condition(String),
}
