//! Error taxonomy for the library.
//!
//! Only caller mistakes and I/O surface here. "No solution" from the solver and
//! "out of restarts" from the generator are ordinary outcome values, not errors.
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{what}: lower bound {min} exceeds upper bound {max}")]
    InvalidBounds { what: String, min: f64, max: f64 },

    #[error("{what}: {value} outside [{lo}, {hi}]")]
    OutOfRange { what: String, value: f64, lo: f64, hi: f64 },

    #[error("dimension mismatch: expected {expected} cells, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("missing mandatory field `{0}`")]
    MissingField(String),

    #[error("invalid document: {0}")]
    InvalidDocument(String),

    #[error("invalid generator configuration: {0}")]
    InvalidConfig(String),

    #[error("the structure solver is already built")]
    AlreadyBuilt,

    #[error("the structure solver must be built before solving")]
    NotBuilt,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn bounds(what: impl Into<String>, min: f64, max: f64) -> Self {
        Error::InvalidBounds { what: what.into(), min, max }
    }

    pub(crate) fn range(what: impl Into<String>, value: f64, lo: f64, hi: f64) -> Self {
        Error::OutOfRange { what: what.into(), value, lo, hi }
    }
}

/// Check `min <= max`.
pub(crate) fn check_order(what: &str, min: f64, max: f64) -> Result<()> {
    if min > max {
        return Err(Error::bounds(what, min, max));
    }
    Ok(())
}

/// Check `min <= max` and both inside `[lo, hi]`.
pub(crate) fn check_range(what: &str, min: f64, max: f64, lo: f64, hi: f64) -> Result<()> {
    check_order(what, min, max)?;
    for v in [min, max] {
        if !(lo..=hi).contains(&v) {
            return Err(Error::range(what, v, lo, hi));
        }
    }
    Ok(())
}
