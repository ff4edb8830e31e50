use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Faults raised by a single DNS query. They never leave the resolver
/// adapter; each one maps onto a [`crate::dns::LookupOutcome`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DnsFault {
    #[error("DNS query timed out")]
    Timeout,

    #[error("no record of the requested type")]
    NoRecord,

    #[error("domain does not exist")]
    Nxdomain,

    #[error("resolver fault: {0}")]
    Other(String),
}

/// Faults raised by an HTTP probe or page fetch.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum HttpFault {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("HTTP request timed out")]
    Timeout,
}

impl From<reqwest::Error> for HttpFault {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            HttpFault::Timeout
        } else {
            HttpFault::Connection(err.to_string())
        }
    }
}

/// Process-level failures. These abort before the pipeline starts.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid target domain '{0}'")]
    InvalidDomain(String),

    #[error("no usable prefixes in wordlist {}", .0.display())]
    EmptyWordlist(PathBuf),

    #[error("no valid DNS resolvers found in {source_name} ({invalid} invalid entries)")]
    NoResolvers { source_name: String, invalid: usize },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}
