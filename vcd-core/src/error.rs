//! Error types for vCloud image orchestration.
//!
//! Every fatal condition surfaces as a [`VcdError`], split between failures
//! reported by (or caused by) the cloud platform and failures that indicate a
//! bug on our side, such as a lock that should always exist.

use thiserror::Error;

/// Errors that can occur while talking to the platform or mapping its
/// documents into domain records.
#[derive(Error, Debug)]
pub enum VcdError {
    /// The platform rejected or failed an operation, or a required remote
    /// resource is missing. The message embeds the offending identifier.
    #[error("Cloud error: {0}")]
    Cloud(String),

    /// A malformed response document that could not be parsed at all.
    #[error("Parse error: {0}")]
    Parse(String),

    /// A programming error on the client side, never the platform's fault.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl VcdError {
    /// Cloud-side "no such resource" error with the identifier embedded.
    pub fn not_found(what: &str, id: impl AsRef<str>) -> Self {
        VcdError::Cloud(format!("No such {}: {}", what, id.as_ref()))
    }
}

pub type Result<T> = std::result::Result<T, VcdError>;
