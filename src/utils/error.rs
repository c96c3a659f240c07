use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Could not connect to storage: {message}")]
    StorageConnection { message: String },

    #[error("Bucket {bucket} doesn't exist")]
    NoSuchBucket { bucket: String },

    #[error("Storage request failed: {message}")]
    StorageClient { message: String },

    #[error("Could not connect to colab at {host}:{port}: {message}")]
    RemoteConnection {
        host: String,
        port: u16,
        message: String,
    },

    #[error("Colab rejected credentials for user {user}")]
    RemoteAuth { user: String },

    #[error("Colab session error: {message}")]
    Session { message: String },

    #[error("Command `{command}` failed with {status}: {stderr}")]
    Process {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("File {file} was corrupted during upload (expected {expected} bytes, got {actual})")]
    FileIntegrity {
        file: String,
        expected: u64,
        actual: u64,
    },

    #[error("Script {script} is not among the files under {prefix}")]
    ScriptNotFound { script: String, prefix: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid value for {field}: {reason}")]
    Validation { field: String, reason: String },
}

pub type Result<T> = std::result::Result<T, BridgeError>;

impl BridgeError {
    pub fn validation(field: &str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    /// Every storage/remote/process failure is reported as 404, which is what
    /// existing clients of the service already branch on.
    pub fn status_code(&self) -> StatusCode {
        match self {
            BridgeError::StorageConnection { .. }
            | BridgeError::NoSuchBucket { .. }
            | BridgeError::StorageClient { .. }
            | BridgeError::RemoteConnection { .. }
            | BridgeError::RemoteAuth { .. }
            | BridgeError::Session { .. }
            | BridgeError::Process { .. }
            | BridgeError::FileIntegrity { .. }
            | BridgeError::ScriptNotFound { .. } => StatusCode::NOT_FOUND,
            BridgeError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            BridgeError::Io(_) | BridgeError::Config { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<russh::Error> for BridgeError {
    fn from(err: russh::Error) -> Self {
        BridgeError::Session {
            message: err.to_string(),
        }
    }
}

impl From<russh_sftp::client::error::Error> for BridgeError {
    fn from(err: russh_sftp::client::error::Error) -> Self {
        BridgeError::Session {
            message: format!("sftp: {err}"),
        }
    }
}

/// Uniform error envelope returned by every route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("request failed: {}", self);
        } else {
            tracing::warn!("request failed: {}", self);
        }
        let body = ErrorBody {
            detail: format!("Error: {}", self),
        };
        (status, Json(body)).into_response()
    }
}
