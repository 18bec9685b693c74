use chrono::NaiveDate;
use std::time::Duration;
use thiserror::Error;

use crate::policy::SourceId;

/// Invalid geographic or zoom input. Raised before any tile math runs.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DomainError {
    #[error("latitude {0} is outside [-90, 90]")]
    InvalidLatitude(f64),
    #[error("latitude {0} is at a pole, longitude buffer is undefined")]
    PolarLatitude(f64),
    #[error("longitude {0} is outside [-180, 180]")]
    InvalidLongitude(f64),
    #[error("zoom level {0} is outside [0, 22]")]
    InvalidZoom(u8),
    #[error("buffer of {0} meters must be a positive finite number")]
    InvalidBuffer(f64),
    #[error("date range {start} .. {end} ends before it starts")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },
}

/// Failure reported by the imagery catalog for a single source.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("dataset {0} not found")]
    DatasetNotFound(String),
    #[error("catalog rejected credentials: {0}")]
    Unauthorized(String),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid catalog response: {0}")]
    InvalidResponse(String),
    #[error("no answer within {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Error)]
pub enum CollectError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("mandatory source {source_id} failed: {error}")]
    MandatoryProviderFailure {
        source_id: SourceId,
        #[source]
        error: ProviderError,
    },
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("failed to fetch image: {0}")]
    Http(#[from] reqwest::Error),
    #[error("failed to write image: {0}")]
    Io(#[from] std::io::Error),
}
