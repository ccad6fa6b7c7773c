//! Routing error taxonomy with retry classification.
//!
//! Every failure a request can hit is a [`RouterError`]. The invoker asks
//! [`RouterError::is_transient`] to decide whether another attempt is worth
//! making; the router flattens errors into an [`ErrorKind`] for the response.
//!
//! | Error                          | Retried | Surfaced as          |
//! |--------------------------------|---------|----------------------|
//! | `Timeout`                      | yes     | `timeout`            |
//! | `Protocol(Connectivity)`       | yes     | `connectivity`       |
//! | `Protocol(RateLimit)`          | yes     | `rate_limit`         |
//! | `Protocol(ServerFault)`        | yes     | `server_fault`       |
//! | `Protocol(Auth)`               | no      | `auth`               |
//! | `Protocol(Malformed)`          | no      | `malformed`          |
//! | `Configuration`                | no      | `configuration`      |
//! | `RetriesExhausted`             | n/a     | `retries_exhausted`  |
//! | `Cancelled`                    | n/a     | `cancelled`          |

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure class reported by a protocol gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolErrorKind {
    /// Backend unreachable, connection dropped, transport-level timeout.
    Connectivity,
    /// Backpressure from the backend (HTTP 429 and friends).
    RateLimit,
    /// Credentials rejected.
    Auth,
    /// The request itself is wrong: bad arguments, unknown tool, rejected input.
    Malformed,
    /// Backend blew up on its side (5xx-equivalent, garbage response).
    ServerFault,
}

impl ProtocolErrorKind {
    /// Whether a retry of the same call might succeed.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            Self::Connectivity | Self::RateLimit | Self::ServerFault
        )
    }
}

impl fmt::Display for ProtocolErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connectivity => write!(f, "connectivity"),
            Self::RateLimit => write!(f, "rate_limit"),
            Self::Auth => write!(f, "auth"),
            Self::Malformed => write!(f, "malformed"),
            Self::ServerFault => write!(f, "server_fault"),
        }
    }
}

/// Error raised by [`crate::gateway::ProtocolGateway`] implementations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} error: {detail}")]
pub struct ProtocolError {
    pub kind: ProtocolErrorKind,
    pub detail: String,
}

impl ProtocolError {
    pub fn new(kind: ProtocolErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn connectivity(detail: impl Into<String>) -> Self {
        Self::new(ProtocolErrorKind::Connectivity, detail)
    }

    pub fn rate_limit(detail: impl Into<String>) -> Self {
        Self::new(ProtocolErrorKind::RateLimit, detail)
    }

    pub fn auth(detail: impl Into<String>) -> Self {
        Self::new(ProtocolErrorKind::Auth, detail)
    }

    pub fn malformed(detail: impl Into<String>) -> Self {
        Self::new(ProtocolErrorKind::Malformed, detail)
    }

    pub fn server_fault(detail: impl Into<String>) -> Self {
        Self::new(ProtocolErrorKind::ServerFault, detail)
    }

    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

/// Flat error classification carried by [`crate::router::RouterResponse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    Timeout,
    Connectivity,
    RateLimit,
    Auth,
    Malformed,
    ServerFault,
    RetriesExhausted,
    Cancelled,
}

impl From<ProtocolErrorKind> for ErrorKind {
    fn from(kind: ProtocolErrorKind) -> Self {
        match kind {
            ProtocolErrorKind::Connectivity => Self::Connectivity,
            ProtocolErrorKind::RateLimit => Self::RateLimit,
            ProtocolErrorKind::Auth => Self::Auth,
            ProtocolErrorKind::Malformed => Self::Malformed,
            ProtocolErrorKind::ServerFault => Self::ServerFault,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "configuration"),
            Self::Timeout => write!(f, "timeout"),
            Self::Connectivity => write!(f, "connectivity"),
            Self::RateLimit => write!(f, "rate_limit"),
            Self::Auth => write!(f, "auth"),
            Self::Malformed => write!(f, "malformed"),
            Self::ServerFault => write!(f, "server_fault"),
            Self::RetriesExhausted => write!(f, "retries_exhausted"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Unified error type for classification, lookup and invocation.
#[derive(Debug, Clone, Error)]
pub enum RouterError {
    /// Backend profile missing or invalid. A deployment defect, never retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A single attempt ran past its allotted time.
    #[error("Attempt timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The gateway reported a failure.
    #[error("Protocol {0}")]
    Protocol(#[from] ProtocolError),

    /// Every attempt failed transiently.
    #[error("Retries exhausted after {attempts} attempts; last error: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<RouterError>,
    },

    /// The owning request was cancelled by its caller.
    #[error("Request cancelled")]
    Cancelled,
}

impl RouterError {
    /// Whether the invoker may schedule another attempt after this error.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Protocol(e) => e.is_transient(),
            Self::Configuration(_) | Self::RetriesExhausted { .. } | Self::Cancelled => false,
        }
    }

    /// Flatten for the caller-facing response.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Protocol(e) => e.kind.into(),
            Self::RetriesExhausted { .. } => ErrorKind::RetriesExhausted,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// The error that ended the attempt sequence, unwrapping `RetriesExhausted`.
    pub fn root_cause(&self) -> &RouterError {
        match self {
            Self::RetriesExhausted { last, .. } => last.root_cause(),
            other => other,
        }
    }
}
