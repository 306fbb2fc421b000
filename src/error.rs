//! Error types for the backtest pipeline.

use polars::prelude::PolarsError;
use thiserror::Error;

/// Errors raised while building inputs, simulating, or analyzing a run.
#[derive(Debug, Error)]
pub enum AipError {
    /// Input values break an invariant (weights, deposits, intervals).
    #[error("validation error: {0}")]
    Validation(String),

    /// Target weights reference tickers the price table does not carry.
    #[error("configuration error: tickers not present in price data: {}", missing.join(", "))]
    Configuration { missing: Vec<String> },

    /// A numeric routine has no defined result for its input.
    #[error("arithmetic error: {0}")]
    Arithmetic(String),

    /// Malformed price table.
    #[error("data error: {0}")]
    Data(String),

    /// Price retrieval failed.
    #[error("fetch error: {0}")]
    Fetch(String),

    #[error(transparent)]
    Polars(#[from] PolarsError),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type AipResult<T> = Result<T, AipError>;

impl AipError {
    /// Whether the error comes from caller-supplied inputs rather than the environment.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            AipError::Validation(_) | AipError::Configuration { .. } | AipError::Data(_)
        )
    }
}
