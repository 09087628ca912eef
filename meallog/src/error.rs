//! Error taxonomy for the conversation engine.
//!
//! Two families live here. Infrastructure failures (the entry store or the
//! oracle cannot be reached) stop a turn and are reported to the caller.
//! Everything else is local to one step and is normally turned into a
//! natural-language reply by the component that hit it.

use crate::oracle::OracleError;
use crate::structured::StructuredOutputError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, MealLogError>;

#[derive(Debug, Error)]
pub enum MealLogError {
    #[error("entry store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("oracle unavailable: {0}")]
    OracleUnavailable(String),

    #[error("malformed oracle output: {0}")]
    MalformedOutput(String),

    #[error("entry id '{0}' did not come from a lookup")]
    FabricatedId(String),

    #[error("entry '{0}' not found")]
    EntryNotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl MealLogError {
    /// True for failures that must abort the whole turn.
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            MealLogError::StoreUnavailable(_) | MealLogError::OracleUnavailable(_)
        )
    }
}

impl From<OracleError> for MealLogError {
    fn from(err: OracleError) -> Self {
        MealLogError::OracleUnavailable(err.to_string())
    }
}

impl From<StructuredOutputError> for MealLogError {
    fn from(err: StructuredOutputError) -> Self {
        MealLogError::MalformedOutput(err.to_string())
    }
}

impl From<rusqlite::Error> for MealLogError {
    fn from(err: rusqlite::Error) -> Self {
        MealLogError::StoreUnavailable(err.to_string())
    }
}

impl From<toml::de::Error> for MealLogError {
    fn from(err: toml::de::Error) -> Self {
        MealLogError::Config(err.to_string())
    }
}

impl From<validator::ValidationErrors> for MealLogError {
    fn from(err: validator::ValidationErrors) -> Self {
        MealLogError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_store_and_oracle_failures_are_infrastructure() {
        assert!(MealLogError::StoreUnavailable("down".into()).is_infrastructure());
        assert!(MealLogError::OracleUnavailable("timeout".into()).is_infrastructure());
        assert!(!MealLogError::FabricatedId("entry_1".into()).is_infrastructure());
        assert!(!MealLogError::EntryNotFound("abc".into()).is_infrastructure());
        assert!(!MealLogError::MalformedOutput("{".into()).is_infrastructure());
    }
}
