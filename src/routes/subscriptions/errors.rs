use actix_web::{HttpResponse, ResponseError, http::StatusCode};

use crate::email_client;
use crate::routes::helpers::error_chain_fmt;

#[derive(thiserror::Error)]
pub enum SubscribeError {
    #[error("Method not allowed")]
    MethodNotAllowed,
    /// Carries the reason for the logs; callers only see the fixed message.
    #[error("Please provide a valid email address")]
    ValidationError(String),
    #[error("Server error: {0}")]
    MalformedBody(String),
    #[error("Server error: {0}")]
    UpstreamError(#[source] email_client::Error),
    #[error("Server error: {0}")]
    UnexpectedError(#[from] anyhow::Error),
}

#[derive(serde::Serialize)]
struct ErrorBody {
    error: String,
}

impl std::fmt::Debug for SubscribeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)?;
        if let SubscribeError::ValidationError(reason) = self {
            writeln!(f, "Reason:\n\t{reason}")?;
        }
        Ok(())
    }
}

impl ResponseError for SubscribeError {
    fn status_code(&self) -> StatusCode {
        match self {
            SubscribeError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            SubscribeError::ValidationError(_) => StatusCode::BAD_REQUEST,
            SubscribeError::MalformedBody(_)
            | SubscribeError::UpstreamError(_)
            | SubscribeError::UnexpectedError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorBody {
            error: self.to_string(),
        })
    }
}
