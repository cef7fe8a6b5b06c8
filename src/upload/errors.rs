use thiserror::Error;
use super::types::{FileId, UploadState};

/// 传输失败且没有可用信息时的兜底提示
pub const GENERIC_TRANSFER_MESSAGE: &str = "failed to upload file";

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("failed to get upload URL: {message}")]
    Authorization {
        status: Option<u16>,
        message: String,
    },

    #[error("{message}")]
    Transfer {
        status: Option<u16>,
        message: String,
    },

    #[error("failed to confirm upload: {0}")]
    Confirmation(String),

    #[error("uploaded object could not be verified: {0}")]
    Verification(String),

    #[error("HTTP Request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("File not found: {0}")]
    NotFound(FileId),

    #[error("File {id} cannot be retried in state {state:?}")]
    NotRetriable {
        id: FileId,
        state: UploadState,
    },

    #[error("Upload was cancelled")]
    Cancelled,

    #[error("Manager shut down")]
    ManagerShutdown,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl UploadError {
    pub fn authorization(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Authorization {
            status,
            message: message.into(),
        }
    }

    /// 空消息统一替换成 [`GENERIC_TRANSFER_MESSAGE`]
    pub fn transfer(status: Option<u16>, message: impl Into<String>) -> Self {
        let message = message.into();
        let message = if message.trim().is_empty() {
            GENERIC_TRANSFER_MESSAGE.to_string()
        } else {
            message
        };

        Self::Transfer { status, message }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

/// Error alias
pub type Result<T, E = UploadError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorization_message_names_the_step() {
        let err = UploadError::authorization(Some(500), "bucket not configured");
        assert_eq!(err.to_string(), "failed to get upload URL: bucket not configured");
    }

    #[test]
    fn test_transfer_falls_back_to_generic_message() {
        let err = UploadError::transfer(None, "   ");
        assert_eq!(err.to_string(), GENERIC_TRANSFER_MESSAGE);

        let err = UploadError::transfer(Some(403), "Upload failed with status 403 Forbidden");
        assert_eq!(err.to_string(), "Upload failed with status 403 Forbidden");
    }
}
