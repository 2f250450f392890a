use thiserror::Error;

#[derive(Debug, Error)]
pub enum BedError {
    #[error("bed state lock unavailable; operation skipped")]
    LockUnavailable,
    #[error(transparent)]
    Command(#[from] CommandError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("missing command name")]
    Empty,
    #[error("unknown command `{0}`")]
    Unknown(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to write `{key}`: {message}")]
    Write { key: String, message: String },
}

impl StoreError {
    pub fn write(key: &str, err: impl std::fmt::Display) -> Self {
        Self::Write {
            key: key.to_string(),
            message: err.to_string(),
        }
    }
}
