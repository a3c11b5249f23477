use derive_more::Display;

use crate::dns::authority::AuthorityError;
use crate::dns::lookup::LookupError;
use crate::dns::validation::ValidationError;

pub mod hosts;
pub mod server;
pub mod util;

#[derive(Debug, Display)]
pub enum WebError {
    Authority(AuthorityError),
    Lookup(LookupError),
    Io(std::io::Error),
    #[display(fmt = "Missing field: {}", _0)]
    MissingField(&'static str),
    #[display(fmt = "Malformed request body: {}", _0)]
    Serialization(serde_json::Error),
    Template(handlebars::RenderError),
    #[display(fmt = "Invalid request: {}", _0)]
    InvalidRequest(String),
}

impl WebError {
    /// HTTP status reported for this error
    pub fn status_code(&self) -> u16 {
        match self {
            WebError::Authority(AuthorityError::Validation(_)) => 400,
            WebError::Authority(_) => 500,
            WebError::Lookup(LookupError::Validation(_)) => 400,
            WebError::Lookup(LookupError::Execution(_)) => 502,
            WebError::MissingField(_) | WebError::Serialization(_) | WebError::InvalidRequest(_) => 400,
            WebError::Io(_) | WebError::Template(_) => 500,
        }
    }
}

impl From<AuthorityError> for WebError {
    fn from(err: AuthorityError) -> Self {
        WebError::Authority(err)
    }
}

impl From<ValidationError> for WebError {
    fn from(err: ValidationError) -> Self {
        WebError::Authority(AuthorityError::Validation(err))
    }
}

impl From<LookupError> for WebError {
    fn from(err: LookupError) -> Self {
        WebError::Lookup(err)
    }
}

impl From<std::io::Error> for WebError {
    fn from(err: std::io::Error) -> Self {
        WebError::Io(err)
    }
}

impl From<serde_json::Error> for WebError {
    fn from(err: serde_json::Error) -> Self {
        WebError::Serialization(err)
    }
}

impl From<handlebars::RenderError> for WebError {
    fn from(err: handlebars::RenderError) -> Self {
        WebError::Template(err)
    }
}

impl std::error::Error for WebError {}

pub type Result<T> = std::result::Result<T, WebError>;
