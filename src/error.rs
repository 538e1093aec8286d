use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HolderError {
    #[error("invalid configuration: {reason}")]
    InvalidConfiguration { reason: String },
}

impl HolderError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        HolderError::InvalidConfiguration {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, HolderError>;
