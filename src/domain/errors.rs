//! Structured error types for hookscope
//!
//! Using thiserror for automatic Display implementation and error chaining.
//!
//! None of these are fatal to the host process: a resolution or install
//! failure skips one hook, a store failure degrades to cache-miss behavior.

use super::types::Address;
use thiserror::Error;

/// Failures while reading or writing the on-disk caches.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("malformed record: {0}")]
    Malformed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failures while turning a logical hook target into an address.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("no resolution strategy located '{0}'")]
    NotFound(String),

    #[error("anchor export '{0}' not present in module")]
    AnchorMissing(String),

    #[error("invalid export pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("invalid byte signature: {0}")]
    Signature(String),
}

/// The interception primitive rejected a patch.
#[derive(Error, Debug)]
pub enum InstallError {
    #[error("interception rejected at {address}: {reason}")]
    Rejected { address: Address, reason: String },
}
