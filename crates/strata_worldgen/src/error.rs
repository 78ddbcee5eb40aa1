use crate::noise::NoiseError;
use crate::spline::SplineError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorldgenError {
    #[error("unknown noise `{0}`")]
    UnknownNoise(String),
    #[error("unknown density function `{0}`")]
    UnknownDensityFunction(String),
    #[error("unknown noise settings `{0}`")]
    UnknownSettings(String),
    #[error("`{0}` is already registered")]
    DuplicateKey(String),
    #[error("density function reference cycle through `{0}`")]
    ReferenceCycle(String),
    #[error("inline noise parameters are not supported, register them under a key")]
    InlineNoise,
    #[error("invalid noise `{key}`: {source}")]
    InvalidNoise {
        key: String,
        #[source]
        source: NoiseError,
    },
    #[error("invalid density function: {0}")]
    InvalidDensityFunction(String),
    #[error(transparent)]
    Spline(#[from] SplineError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
