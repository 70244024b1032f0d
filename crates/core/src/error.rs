// SPDX-FileCopyrightText: © 2025 PackKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Structured error types for PackKit.
//!
//! The error kinds form a closed set shared by every subsystem. Callers that
//! need to branch on a kind match on the variant; everything else propagates
//! with `?`. Composition of statuses ("keep the first non-OK") is expressed
//! with ordinary `Result` sequencing.

use thiserror::Error;

/// Main error type for PackKit operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PackKitError {
    /// A caller-supplied value failed validation.
    ///
    /// Examples:
    /// - Malformed hex key material
    /// - A queue peek below the sliding window head
    /// - Muxer options with both an output file and a segment template
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An internal invariant did not hold during normal operation.
    #[error("internal error: {0}")]
    Internal(String),

    /// An HTTP transaction failed (connection, TLS, non-success status).
    #[error("http failure: {0}")]
    Http(String),

    /// A blocking operation exceeded its deadline. Retryable.
    #[error("timed out: {0}")]
    TimedOut(String),

    /// The owning queue or source was stopped. Terminal.
    #[error("stopped")]
    Stopped,

    /// The license server replied with an error payload.
    #[error("license server error: {0}")]
    Server(String),

    /// A container or cue stream failed to parse.
    #[error("parse failure: {0}")]
    Parser(String),

    /// A file operation failed on the selected backing.
    #[error("file failure: {0}")]
    File(String),

    /// An error that fits no other category.
    #[error("unknown error: {0}")]
    Unknown(String),
}

/// Convenience type alias for Results using `PackKitError`.
pub type Result<T> = std::result::Result<T, PackKitError>;

impl From<std::io::Error> for PackKitError {
    fn from(err: std::io::Error) -> Self {
        Self::File(err.to_string())
    }
}

impl From<String> for PackKitError {
    fn from(s: String) -> Self {
        Self::Internal(s)
    }
}

impl From<&str> for PackKitError {
    fn from(s: &str) -> Self {
        Self::Internal(s.to_string())
    }
}
