use std::time::Duration;

use actix_web::http::StatusCode;
use derive_more::{Display, Error};

use crate::MalformedRange;

/// Failure of one fetch cycle of a remote source.
///
/// Any of these discards the whole cycle; the source keeps serving its previous ranges.
#[derive(Debug, Display, Error)]
#[non_exhaustive]
pub enum FetchError {
    /// Request could not be sent or no response was received.
    #[display("request to {url} failed: {reason}")]
    Transport {
        /// Endpoint URL.
        url: String,

        /// Description of the client error.
        reason: String,
    },

    /// Request, including reading the body, took longer than the configured timeout.
    #[display("request to {url} timed out after {timeout:?}")]
    Timeout {
        /// Endpoint URL.
        url: String,

        /// Configured per-request timeout.
        timeout: Duration,
    },

    /// Endpoint responded with a non-success status code.
    #[display("request to {url} returned status {status}")]
    Status {
        /// Endpoint URL.
        url: String,

        /// Response status code.
        status: StatusCode,
    },

    /// Response body could not be read.
    #[display("could not read response body from {url}: {reason}")]
    Body {
        /// Endpoint URL.
        url: String,

        /// Description of the payload error.
        reason: String,
    },

    /// Response body contained a line that is not a CIDR range.
    #[display("invalid range list from {url}: {source}")]
    Malformed {
        /// Endpoint URL.
        url: String,

        /// Parse failure.
        source: MalformedRange,
    },
}

/// Invalid matcher or source configuration.
///
/// These are fatal at startup: a matcher without a usable source would silently never match.
#[derive(Debug, Display, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// Matcher configuration has no range source.
    #[display("no IP range source configured")]
    MissingSource,

    /// Source configuration is not an object with a string `source` key.
    #[display("IP range source configuration must be an object with a \"source\" key")]
    MissingSourceName,

    /// No constructor is registered for the named source.
    #[display("unknown IP range source {name:?}")]
    UnknownSource {
        /// Requested source name.
        #[error(not(source))]
        name: String,
    },

    /// Source-specific configuration failed to deserialize or validate.
    #[display("invalid configuration for IP range source {name:?}: {source}")]
    Invalid {
        /// Source name.
        name: String,

        /// Deserialization failure.
        source: serde_json::Error,
    },
}

impl FetchError {
    /// Returns the endpoint URL the failure relates to.
    pub fn url(&self) -> &str {
        match self {
            Self::Transport { url, .. }
            | Self::Timeout { url, .. }
            | Self::Status { url, .. }
            | Self::Body { url, .. }
            | Self::Malformed { url, .. } => url,
        }
    }

    /// Returns true if the failure was a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
