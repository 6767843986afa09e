use thiserror::Error;

pub type Result<T> = std::result::Result<T, OpenRouterError>;

#[derive(Debug, Error)]
pub enum OpenRouterError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Empty completion")]
    EmptyCompletion,

    #[error("Structured output did not match schema: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for OpenRouterError {
    fn from(err: reqwest::Error) -> Self {
        OpenRouterError::Network(err.to_string())
    }
}
