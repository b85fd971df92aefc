//! Error types used by the streamvisor runtime.
//!
//! This module defines two error enums:
//!
//! - [`LockError`] — a lock request that ended without a grant.
//! - [`TransportError`] — a push connection that could not be opened.
//!
//! Both types provide `as_label` for logging. Neither ever escapes a
//! [`Session`](crate::Session): the leader epoch converts them into runtime
//! events ([`EventKind::LockWithdrawn`](crate::EventKind::LockWithdrawn),
//! [`EventKind::ConnectionFailed`](crate::EventKind::ConnectionFailed)).

use thiserror::Error;

/// # Errors produced by a [`LockService`](crate::LockService) request.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    /// The abort token fired before the lock was granted.
    ///
    /// This is ordinary cancellation, not a failure.
    #[error("lock request for {name:?} aborted before grant")]
    Aborted {
        /// Name of the requested lock.
        name: String,
    },

    /// The lock service shut down while the request was pending.
    #[error("lock service closed while waiting for {name:?}")]
    Closed {
        /// Name of the requested lock.
        name: String,
    },
}

impl LockError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use streamvisor::LockError;
    ///
    /// let err = LockError::Aborted { name: "sse-lock".into() };
    /// assert_eq!(err.as_label(), "lock_aborted");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            LockError::Aborted { .. } => "lock_aborted",
            LockError::Closed { .. } => "lock_closed",
        }
    }

    /// True for plain cancellation (the request was withdrawn on purpose).
    pub fn is_abort(&self) -> bool {
        matches!(self, LockError::Aborted { .. })
    }
}

/// # Errors produced while opening a push connection.
///
/// Failures *after* a connection is open are not errors at this level: the
/// transport reconnects on its own and reports them as runtime events.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The url could not be used to build a client.
    #[error("invalid url {url:?}: {reason}")]
    InvalidUrl {
        /// The offending url.
        url: String,
        /// Underlying client error message.
        reason: String,
    },

    /// A configured header name or value was rejected.
    #[error("invalid header {name:?}: {reason}")]
    InvalidHeader {
        /// Header name.
        name: String,
        /// Underlying client error message.
        reason: String,
    },

    /// The transport refused to open a connection for this url.
    #[error("connection to {url:?} refused")]
    Refused {
        /// The refused url.
        url: String,
    },
}

impl TransportError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use streamvisor::TransportError;
    ///
    /// let err = TransportError::Refused { url: "/stream".into() };
    /// assert_eq!(err.as_label(), "transport_refused");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            TransportError::InvalidUrl { .. } => "transport_invalid_url",
            TransportError::InvalidHeader { .. } => "transport_invalid_header",
            TransportError::Refused { .. } => "transport_refused",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_error_labels_and_abort_flag() {
        let aborted = LockError::Aborted { name: "L".into() };
        let closed = LockError::Closed { name: "L".into() };

        assert!(aborted.is_abort());
        assert!(!closed.is_abort());
        assert_eq!(closed.as_label(), "lock_closed");
        assert_eq!(
            aborted.to_string(),
            "lock request for \"L\" aborted before grant"
        );
    }

    #[test]
    fn transport_error_display_carries_reason() {
        let err = TransportError::InvalidHeader {
            name: "Cookie".into(),
            reason: "bad value".into(),
        };
        assert_eq!(err.as_label(), "transport_invalid_header");
        assert!(err.to_string().contains("bad value"));
    }
}
