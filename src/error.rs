//! Error types for cmr-dl
//!
//! Every fallible operation in the crate returns [`Result`], whose error side is the
//! crate-wide [`Error`] enum. Variants carry the context needed to diagnose a failure
//! (the URL that could not be resolved, the path that could not be written, ...) and
//! map to a stable machine-readable code via [`Error::code`].

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for cmr-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for cmr-dl
#[derive(Debug, Error)]
pub enum Error {
    /// No credentials were supplied and none were found in the credential file
    #[error("unable to create authenticated session: no credentials for {host}")]
    AuthUnavailable {
        /// Identity-provider host the credentials were looked up for
        host: String,
    },

    /// Location resolution exhausted the host strategy without a usable URL
    #[error("no file location found for {url}")]
    LocationNotFound {
        /// The resource URL that could not be resolved
        url: String,
    },

    /// The resolved response declared no real content
    #[error("no file content found at {url} (content length {content_length})")]
    EmptyContent {
        /// The resolved location that was requested
        url: String,
        /// Declared content length (-1 when the header is missing)
        content_length: i64,
    },

    /// No link on a granule matches the accepted hosts and extensions
    #[error("no matching link found for granule {granule_id} (extensions: {extensions:?})")]
    NoMatchingLink {
        /// Identifier of the granule
        granule_id: String,
        /// Extensions that were accepted
        extensions: Vec<String>,
    },

    /// A query page could not be decoded into a feed
    #[error("error decoding {resource} query response: {message}")]
    QueryDecode {
        /// Search resource that was queried (e.g. "granules")
        resource: String,
        /// What was wrong with the page
        message: String,
    },

    /// Query parameters could not be built (bad dates, bad geometry, ...)
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// A URL could not be parsed or lacks a required part
    #[error("invalid URL {url}: {reason}")]
    InvalidUrl {
        /// The offending URL
        url: String,
        /// Why it was rejected
        reason: String,
    },

    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "api.base_url")
        key: Option<String>,
    },

    /// The credential file could not be parsed
    #[error("credential file {path}: {message}")]
    Credentials {
        /// Path of the credential file
        path: PathBuf,
        /// Parse failure description
        message: String,
    },

    /// A download request returned a non-success status
    #[error("HTTP {status} from {url}")]
    UnexpectedStatus {
        /// The URL that answered
        url: String,
        /// HTTP status code
        status: u16,
    },

    /// The number of bytes written differs from the declared content length
    #[error("incomplete download of {path}: expected {expected} bytes, received {received}")]
    SizeMismatch {
        /// Destination file
        path: PathBuf,
        /// Declared content length
        expected: u64,
        /// Bytes actually written
        received: u64,
    },

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Machine-readable error code
    ///
    /// Codes are stable across releases and safe to match on programmatically.
    pub fn code(&self) -> &'static str {
        match self {
            Error::AuthUnavailable { .. } => "auth_unavailable",
            Error::LocationNotFound { .. } => "location_not_found",
            Error::EmptyContent { .. } => "empty_content",
            Error::NoMatchingLink { .. } => "no_matching_link",
            Error::QueryDecode { .. } => "query_decode_error",
            Error::InvalidQuery(_) => "invalid_query",
            Error::InvalidUrl { .. } => "invalid_url",
            Error::Config { .. } => "config_error",
            Error::Credentials { .. } => "credentials_error",
            Error::UnexpectedStatus { .. } => "unexpected_status",
            Error::SizeMismatch { .. } => "size_mismatch",
            Error::Network(_) => "network_error",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
        }
    }

    pub(crate) fn invalid_url(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidUrl {
            url: url.into(),
            reason: reason.into(),
        }
    }
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Error::InvalidUrl {
            url: String::new(),
            reason: e.to_string(),
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn all_error_variants() -> Vec<(Error, &'static str)> {
        vec![
            (
                Error::AuthUnavailable {
                    host: "urs.earthdata.nasa.gov".into(),
                },
                "auth_unavailable",
            ),
            (
                Error::LocationNotFound {
                    url: "https://e4ftl01.cr.usgs.gov/a.hdf".into(),
                },
                "location_not_found",
            ),
            (
                Error::EmptyContent {
                    url: "https://example.com/a.hdf".into(),
                    content_length: 0,
                },
                "empty_content",
            ),
            (
                Error::NoMatchingLink {
                    granule_id: "G1".into(),
                    extensions: vec!["hdf".into()],
                },
                "no_matching_link",
            ),
            (
                Error::QueryDecode {
                    resource: "granules".into(),
                    message: "missing feed".into(),
                },
                "query_decode_error",
            ),
            (Error::InvalidQuery("bad box".into()), "invalid_query"),
            (Error::invalid_url("nope", "relative URL"), "invalid_url"),
            (
                Error::Config {
                    message: "bad base url".into(),
                    key: Some("api.base_url".into()),
                },
                "config_error",
            ),
            (
                Error::Credentials {
                    path: PathBuf::from("/home/u/.netrc"),
                    message: "missing value".into(),
                },
                "credentials_error",
            ),
            (
                Error::UnexpectedStatus {
                    url: "https://example.com".into(),
                    status: 404,
                },
                "unexpected_status",
            ),
            (
                Error::SizeMismatch {
                    path: PathBuf::from("a.hdf"),
                    expected: 10,
                    received: 5,
                },
                "size_mismatch",
            ),
            (
                Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone")),
                "io_error",
            ),
            (
                Error::Serialization(serde_json::from_str::<serde_json::Value>("{").unwrap_err()),
                "serialization_error",
            ),
        ]
    }

    #[test]
    fn every_variant_has_its_code() {
        for (error, expected) in all_error_variants() {
            assert_eq!(error.code(), expected, "wrong code for {error:?}");
        }
    }

    #[test]
    fn messages_carry_context() {
        let err = Error::LocationNotFound {
            url: "https://e4ftl01.cr.usgs.gov/MOLT/a.hdf".into(),
        };
        assert!(err.to_string().contains("e4ftl01.cr.usgs.gov/MOLT/a.hdf"));

        let err = Error::EmptyContent {
            url: "https://example.com/a.hdf".into(),
            content_length: -1,
        };
        assert!(err.to_string().contains("-1"));
    }

    #[test]
    fn url_parse_errors_convert_to_invalid_url() {
        let err: Error = url::Url::parse("not a url").unwrap_err().into();
        assert_eq!(err.code(), "invalid_url");
    }
}
