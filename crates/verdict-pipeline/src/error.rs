use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecisionError {
    #[error("No structured payload found in response: {excerpt}")]
    Format { excerpt: String },

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Malformed response envelope: {0}")]
    Envelope(String),
}
