use thiserror::Error;

use crate::catalog::CatalogError;
use crate::config::ConfigError;
use crate::ml::TrainingError;
use crate::recommend::RecommendError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Recommend(#[from] RecommendError),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("dataset failure: {0}")]
    Dataset(String),
    #[error("training failure: {0}")]
    Training(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl From<CatalogError> for ApplicationError {
    fn from(value: CatalogError) -> Self {
        match value {
            CatalogError::InvalidRecord(message) => Self::InvalidInput(message),
            other => Self::Dataset(other.to_string()),
        }
    }
}

impl From<TrainingError> for ApplicationError {
    fn from(value: TrainingError) -> Self {
        Self::Training(value.to_string())
    }
}

impl From<ConfigError> for ApplicationError {
    fn from(value: ConfigError) -> Self {
        Self::Configuration(value.to_string())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::NotFound { .. } => "None of the requested drugs were found in the dataset.",
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }

    /// Stable machine-readable class for command output.
    pub fn class(&self) -> &'static str {
        match self {
            Self::Recommend(RecommendError::NoInput) | Self::InvalidInput(_) => "invalid_input",
            Self::Recommend(RecommendError::NotFound { .. }) => "not_found",
            Self::Recommend(RecommendError::ModelNotReady) => "model_not_ready",
            Self::Dataset(_) => "dataset",
            Self::Training(_) => "training",
            Self::Configuration(_) => "config",
        }
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let correlation_id = "unassigned".to_owned();
        match value {
            ApplicationError::Recommend(error @ RecommendError::NoInput) => {
                Self::BadRequest { message: error.to_string(), correlation_id }
            }
            ApplicationError::InvalidInput(message) => Self::BadRequest { message, correlation_id },
            ApplicationError::Recommend(error @ RecommendError::NotFound { .. }) => {
                Self::NotFound { message: error.to_string(), correlation_id }
            }
            ApplicationError::Recommend(error @ RecommendError::ModelNotReady) => {
                Self::ServiceUnavailable { message: error.to_string(), correlation_id }
            }
            ApplicationError::Dataset(message) | ApplicationError::Training(message) => {
                Self::ServiceUnavailable { message, correlation_id }
            }
            ApplicationError::Configuration(message) => Self::Internal { message, correlation_id },
        }
    }
}
