//! Error types for the map engine.
//!
//! Recoverable conditions (`LocationUnavailable`, `RenderTargetNotReady`) are absorbed by
//! the engine and reported as warnings. `LookupFailure` and `RouteUnavailable` are
//! returned to the caller. None of them stop map browsing.

use thiserror::Error;

use crate::FacilityId;

/// Engine error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Facility data unavailable: {0}")]
    DataUnavailable(String),

    #[error("Facility {0} is not in the current dataset")]
    LookupFailure(FacilityId),

    #[error("User location unavailable: {0}")]
    LocationUnavailable(String),

    #[error("Route unavailable: {0}")]
    RouteUnavailable(String),

    #[error("Map session is not ready")]
    RenderTargetNotReady,
}

/// Discriminant of [`EngineError`] for hosts that branch on the kind only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    DataUnavailable,
    LookupFailure,
    LocationUnavailable,
    RouteUnavailable,
    RenderTargetNotReady,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::DataUnavailable(_) => ErrorKind::DataUnavailable,
            EngineError::LookupFailure(_) => ErrorKind::LookupFailure,
            EngineError::LocationUnavailable(_) => ErrorKind::LocationUnavailable,
            EngineError::RouteUnavailable(_) => ErrorKind::RouteUnavailable,
            EngineError::RenderTargetNotReady => ErrorKind::RenderTargetNotReady,
        }
    }

    /// Whether the engine recovers from this condition on its own
    /// (substitute value or deferred action).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            EngineError::LocationUnavailable(_) | EngineError::RenderTargetNotReady
        )
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
