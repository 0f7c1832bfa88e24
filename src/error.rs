use thiserror::Error;

/// All failures the generator can raise. Parse/validation failures carry
/// the source name and line per §7; I/O failures wrap the underlying cause.
#[derive(Debug, Error)]
pub enum DiosError {
    #[error("{path}:{line} {message}")]
    Parse { path: String, line: usize, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl DiosError {
    pub fn parse(path: impl Into<String>, line: usize, message: impl Into<String>) -> Self {
        DiosError::Parse { path: path.into(), line, message: message.into() }
    }
}

pub type Result<T> = std::result::Result<T, DiosError>;
