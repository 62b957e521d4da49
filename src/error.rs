//! Error types for the gencache library.
//!
//! ## Key Components
//!
//! - [`ConfigError`]: Returned when cache configuration parameters are invalid
//!   (e.g. a zero partition count or a zero time-to-live).
//! - [`InvariantError`]: Returned when internal generation invariants are
//!   violated (`check_invariants` methods).
//! - [`SharedError`]: A cloneable, reference-counted wrapper around a data
//!   source error, used when one failure must be delivered to many waiters.
//!
//! Data-source errors raised during a read-through load are never wrapped by
//! the caches themselves: they reach the caller as the source's own
//! `Error` type.
//!
//! ## Example Usage
//!
//! ```
//! use gencache::builder::CacheBuilder;
//! use gencache::error::ConfigError;
//!
//! let err: ConfigError = CacheBuilder::new().partitions(0).try_config().unwrap_err();
//! assert!(err.to_string().contains("partition"));
//! ```

use std::sync::Arc;

// ---------------------------------------------------------------------------
// InvariantError
// ---------------------------------------------------------------------------

/// Error returned when internal cache invariants are violated.
///
/// Produced by [`Generations::check_invariants`](crate::policy::generational::Generations::check_invariants).
/// Carries a human-readable description of which invariant failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct InvariantError(String);

impl InvariantError {
    /// Creates a new `InvariantError` with the given description.
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    /// Returns the error description.
    #[inline]
    pub fn message(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Error returned when cache configuration parameters are invalid.
///
/// Produced by [`CacheConfig::validate`](crate::config::CacheConfig::validate),
/// the builder `try_*` / `build_*` methods, and
/// [`PartitionedCache::new`](crate::policy::partitioned::PartitionedCache::new).
/// Fatal to the construction call only.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ConfigError(String);

impl ConfigError {
    /// Creates a new `ConfigError` with the given description.
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    /// Returns the error description.
    #[inline]
    pub fn message(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// SharedError
// ---------------------------------------------------------------------------

/// A data-source failure shared by every caller of one in-flight load.
///
/// Cloning is cheap and every clone points at the same underlying error, so
/// callers that coalesced onto a single load can check identity with
/// [`SharedError::ptr_eq`].
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct SharedError<E>(Arc<E>);

impl<E> SharedError<E>
where
    E: std::error::Error + 'static,
{
    /// Wraps a source error.
    pub fn new(error: E) -> Self {
        Self(Arc::new(error))
    }

    /// Returns the wrapped error.
    pub fn inner(&self) -> &E {
        &self.0
    }

    /// Returns `true` if both handles refer to the same failure.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<E> Clone for SharedError<E> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
