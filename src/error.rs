//! Error types for the Tessera operator
//!
//! Errors carry enough context (product, stage, message) to be useful in
//! logs without a debugger. Product failures collected during a stage are
//! aggregated into [`ProductErrors`] instead of aborting the stage.

use std::fmt;

use thiserror::Error;

/// HTTP status returned by the API server when a write carries a stale
/// resource version
const HTTP_CONFLICT: u16 = 409;

/// HTTP status returned by the API server for missing objects
const HTTP_NOT_FOUND: u16 = 404;

/// Main error type for Tessera operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Unknown installation type, unknown product or malformed stage template
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of what's misconfigured
        message: String,
    },

    /// A single product reconciler failed
    #[error("product {product} failed: {message}")]
    Product {
        /// Product that failed
        product: String,
        /// Description of what failed
        message: String,
    },

    /// Bootstrap stage failure
    #[error("bootstrap error: {message}")]
    Bootstrap {
        /// Description of what failed
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
    },

    /// Work was abandoned because its reconcile scope was cancelled
    #[error("cancelled: {context}")]
    Cancelled {
        /// What was about to run when cancellation was observed
        context: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Where the error occurred
        context: String,
        /// Description of what failed
        message: String,
    },
}

impl Error {
    /// Create a configuration error with the given message
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration {
            message: msg.into(),
        }
    }

    /// Create a product error
    pub fn product(product: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Product {
            product: product.into(),
            message: msg.into(),
        }
    }

    /// Create a bootstrap error with the given message
    pub fn bootstrap(msg: impl Into<String>) -> Self {
        Self::Bootstrap {
            message: msg.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    /// Create a cancellation error
    pub fn cancelled(context: impl Into<String>) -> Self {
        Self::Cancelled {
            context: context.into(),
        }
    }

    /// Create an internal error
    pub fn internal(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            context: context.into(),
            message: msg.into(),
        }
    }

    /// Returns true if the API server rejected a write because the object
    /// changed since it was read
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Kube { source: kube::Error::Api(ae) } if ae.code == HTTP_CONFLICT)
    }

    /// Returns true if the API server reported the object as missing
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Kube { source: kube::Error::Api(ae) } if ae.code == HTTP_NOT_FOUND)
    }
}

/// Per-product failures collected while visiting the products of a stage
///
/// Sibling products keep running when one fails; the accumulated errors are
/// handed back to the caller for logging and events.
#[derive(Debug, Default)]
pub struct ProductErrors {
    errors: Vec<Error>,
}

impl ProductErrors {
    /// Create an empty accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one failure
    pub fn push(&mut self, err: Error) {
        self.errors.push(err);
    }

    /// Returns true if nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Number of recorded failures
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Recorded failures in the order they happened
    pub fn errors(&self) -> &[Error] {
        &self.errors
    }

    /// `None` when empty, otherwise the accumulator itself
    pub fn into_option(self) -> Option<Self> {
        if self.is_empty() {
            None
        } else {
            Some(self)
        }
    }
}

impl fmt::Display for ProductErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "product installation errors: ")?;
        for (i, err) in self.errors.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}
