use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum MatchError {
    #[error("Operator '{operator}' error: {message}")]
    Operator { operator: String, message: String },

    #[error("Invalid argument specification for '{operator}': {message}")]
    ArgsSpec { operator: String, message: String },

    #[error("Invalid '$$alias' directive: {0}")]
    AliasDirective(String),

    #[error("Invalid '$first' directive: {0}")]
    FirstDirective(String),
}
