//! Typed errors for the pipeline stages.
//!
//! Orchestration code wraps these with `anyhow` context; the variants exist
//! so callers can tell a per-article failure (skip it) from a fatal one.

use std::path::PathBuf;

/// A chat call to the language model failed
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        source: reqwest::Error,
    },

    #[error("{endpoint} returned {status}: {body}")]
    Status {
        endpoint: String,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("malformed response from {endpoint}: {message}")]
    Malformed { endpoint: String, message: String },
}

/// An article body could not be retrieved
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP error: {0}")]
    Status(reqwest::StatusCode),

    #[error("no article text could be extracted")]
    Empty,
}

/// An aggregator link could not be turned into the publisher's URL
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("not a Google News article link: {0}")]
    NotAggregatorLink(String),

    #[error("invalid article id: {0}")]
    InvalidId(String),

    #[error("decoding parameters not found on article page")]
    MissingSignature,

    #[error("batchexecute request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("unexpected batchexecute response: {0}")]
    Response(String),
}

/// Startup configuration is unusable
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown engine '{0}', expected 'ollama' or 'lmstudio'")]
    UnknownEngine(String),

    #[error("unknown match policy '{0}', expected 'legacy' or 'tolerant'")]
    UnknownMatchPolicy(String),

    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: String, value: String },

    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid feed file {path:?}: {source}")]
    Yaml {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}

/// A cluster member could not be turned into article text
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("could not decode aggregator link: {0}")]
    Decode(#[from] DecodeError),

    #[error("could not fetch article: {0}")]
    Fetch(#[from] FetchError),
}
