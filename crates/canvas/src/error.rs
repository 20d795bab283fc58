//! Error taxonomy shared by the fetcher, texture assembler and pipeline.
//!
//! Types:
//!
//! - `FetchError` covers transport failures and non-success HTTP statuses.
//! - `DecodeError` reports payloads that arrived but could not be turned into
//!   text, JSON, or pixels.
//! - `ResolutionError` wraps malformed references handed to `ResolverContext`.
//! - `DeviceError` classifies camera capture failures.
//! - `LoadError` is the umbrella returned by any stage that fetches and decodes.
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("received HTTP {status} while fetching {uri}")]
    Status { status: u16, uri: Url },

    #[error("request for {uri} failed: {source}")]
    Transport {
        uri: Url,
        #[source]
        source: TransportError,
    },
}

impl FetchError {
    pub fn uri(&self) -> &Url {
        match self {
            Self::Status { uri, .. } | Self::Transport { uri, .. } => uri,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Transport { .. } => None,
        }
    }
}

/// Failure raised below the HTTP status layer (connection, I/O, unsupported scheme).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("unsupported url scheme '{0}'")]
    UnsupportedScheme(String),

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
#[error("failed to decode {uri}: {cause}")]
pub struct DecodeError {
    pub uri: Url,
    pub cause: String,
}

impl DecodeError {
    pub fn new(uri: &Url, cause: impl ToString) -> Self {
        Self {
            uri: uri.clone(),
            cause: cause.to_string(),
        }
    }
}

#[derive(Debug, Error)]
#[error("cannot resolve '{reference}' against {base}: {source}")]
pub struct ResolutionError {
    pub reference: String,
    pub base: String,
    #[source]
    pub source: url::ParseError,
}

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("camera access denied: {0}")]
    Denied(String),

    #[error("no capture device available")]
    Unavailable,

    #[error("camera capture failed: {0}")]
    Capture(String),
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),
}
