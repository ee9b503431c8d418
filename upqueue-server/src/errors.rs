use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use log::error;
use thiserror::Error;
use upqueue_collab::{AuthError, DatabaseError, StreamError};

pub type ServerResult<T> = Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Unauthorized(&'static str),
    #[error("Not allowed to {action} this {resource}")]
    Forbidden {
        resource: &'static str,
        action: &'static str,
    },
    #[error("{resource}:{identifier} not found")]
    NotFound {
        resource: &'static str,
        identifier: &'static str,
    },
    #[error("{0}")]
    Conflict(String),
    #[error("Unknown internal error: {0}")]
    Unknown(String),
}

impl ServerError {
    fn as_status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        if let Self::Unknown(message) = &self {
            error!("Request failed: {}", message);
        }

        (self.as_status_code(), self.to_string()).into_response()
    }
}

impl From<AuthError> for ServerError {
    fn from(value: AuthError) -> Self {
        match value {
            AuthError::InvalidIdentity => Self::Validation(value.to_string()),
            AuthError::IdentityNotFound => Self::Unauthorized("No account exists for this identity"),
            AuthError::Db(e) => e.into(),
        }
    }
}

impl From<DatabaseError> for ServerError {
    fn from(value: DatabaseError) -> Self {
        match value {
            DatabaseError::NotFound {
                resource,
                identifier,
            } => Self::NotFound {
                resource,
                identifier,
            },
            DatabaseError::Conflict { .. } => Self::Conflict(value.to_string()),
            DatabaseError::Forbidden { resource, action } => Self::Forbidden { resource, action },
            e => Self::Unknown(e.to_string()),
        }
    }
}

impl From<StreamError> for ServerError {
    fn from(value: StreamError) -> Self {
        match value {
            StreamError::Validation(message) => Self::Validation(message),
            StreamError::DuplicateUrl => Self::Conflict(value.to_string()),
            StreamError::Db(e) => e.into(),
            e => Self::Unknown(e.to_string()),
        }
    }
}
