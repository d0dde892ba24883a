use thiserror::Error;
use actix_web::{ResponseError, HttpResponse, http::StatusCode};
use serde_json::json;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication error: {0}")]
    AuthError(#[from] AuthError),

    #[error("Database error: {0}")]
    DatabaseError(#[from] DatabaseError),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::DatabaseError(DatabaseError::NotFound),
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
                AppError::DatabaseError(DatabaseError::ConnectionError(err.to_string()))
            }
            _ => AppError::DatabaseError(DatabaseError::QueryError(err.to_string())),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(err.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        AppError::InternalError(format!("Failed to encode token: {}", err))
    }
}

// Handshake refusals surface through this impl, so the reason string
// reaches the client before any upgrade happens.
impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let message = match self {
            AppError::AuthError(e) => e.to_string(),
            _ => self.to_string(),
        };
        let response = json!({
            "error": {
                "status": status.as_u16(),
                "message": message
            }
        });
        HttpResponse::build(status).json(response)
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::AuthError(e) => match e {
                AuthError::MissingToken => StatusCode::UNAUTHORIZED,
                AuthError::InvalidToken => StatusCode::UNAUTHORIZED,
                AuthError::UnknownUser => StatusCode::UNAUTHORIZED,
                AuthError::Timeout => StatusCode::SERVICE_UNAVAILABLE,
                AuthError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            },
            AppError::DatabaseError(DatabaseError::NotFound) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Reasons a handshake is refused. All of them are terminal for the attempt.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("No token provided")]
    MissingToken,

    #[error("Invalid token data")]
    InvalidToken,

    #[error("User not found")]
    UnknownUser,

    #[error("Identity services timed out")]
    Timeout,

    #[error("Identity services unavailable: {0}")]
    Unavailable(String),
}

impl AuthError {
    /// Short machine-friendly label used in structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::MissingToken => "missing_token",
            AuthError::InvalidToken => "invalid_token",
            AuthError::UnknownUser => "unknown_user",
            AuthError::Timeout => "timeout",
            AuthError::Unavailable(_) => "unavailable",
        }
    }
}

/// Per-message failures. The connection stays open for every variant.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Invalid message payload: {0}")]
    InvalidPayload(String),

    #[error("Failed to persist message: {0}")]
    Persistence(#[source] anyhow::Error),

    #[error("Message store timed out")]
    Timeout,
}

impl IngestError {
    /// Text sent back to the sender in the `error` event.
    pub fn client_message(&self) -> String {
        match self {
            IngestError::InvalidPayload(reason) => reason.clone(),
            IngestError::Persistence(_) | IngestError::Timeout => {
                "Failed to send message.".to_string()
            }
        }
    }
}

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Query error: {0}")]
    QueryError(String),

    #[error("Record not found")]
    NotFound,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::AddrInUse, "address in use");
        let app_err: AppError = io_err.into();
        assert!(matches!(app_err, AppError::InternalError(_)));

        let config_err = config::ConfigError::NotFound(String::from("server.port"));
        let app_err: AppError = config_err.into();
        assert!(matches!(app_err, AppError::ConfigError(_)));

        let app_err: AppError = sqlx::Error::RowNotFound.into();
        assert!(matches!(app_err, AppError::DatabaseError(DatabaseError::NotFound)));

        let app_err: AppError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(app_err, AppError::DatabaseError(DatabaseError::ConnectionError(_))));
    }

    #[test]
    fn test_handshake_refusal_status_codes() {
        for err in [AuthError::MissingToken, AuthError::InvalidToken, AuthError::UnknownUser] {
            assert_eq!(AppError::from(err).status_code(), StatusCode::UNAUTHORIZED);
        }

        let err = AppError::AuthError(AuthError::Timeout);
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let err = AppError::AuthError(AuthError::Unavailable("db down".into()));
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let err = AppError::InvariantViolation("no identity".into());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_error_display() {
        let err = AppError::AuthError(AuthError::MissingToken);
        assert_eq!(err.to_string(), "Authentication error: No token provided");

        let err = AppError::DatabaseError(DatabaseError::NotFound);
        assert_eq!(err.to_string(), "Database error: Record not found");
    }

    #[test]
    fn test_ingest_client_messages_hide_store_details() {
        let err = IngestError::Persistence(anyhow::anyhow!("duplicate key value violates constraint"));
        assert_eq!(err.client_message(), "Failed to send message.");
        assert_eq!(IngestError::Timeout.client_message(), "Failed to send message.");

        let err = IngestError::InvalidPayload("Message text must not be empty.".into());
        assert_eq!(err.client_message(), "Message text must not be empty.");
    }

    #[actix_web::test]
    async fn test_refusal_body_carries_reason() {
        let err = AppError::AuthError(AuthError::UnknownUser);
        let response = err.error_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = actix_web::body::to_bytes(response.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["status"], 401);
        assert_eq!(json["error"]["message"], "User not found");
    }
}
