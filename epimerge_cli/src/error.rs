use polars::error::PolarsError;

#[derive(thiserror::Error, Debug)]
pub enum EpimergeCliError {
    #[error("Anyhow error")]
    Anyhow(#[from] anyhow::Error),
    #[error("serde JSON error")]
    SerdeJSONError(#[from] serde_json::Error),
    #[error("polars error")]
    PolarsError(#[from] PolarsError),
    #[error("std IO error")]
    IOError(#[from] std::io::Error),
}

pub type EpimergeCliResult<T> = Result<T, EpimergeCliError>;
