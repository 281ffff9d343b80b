use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use cask_store::{FailureKind, StoreError};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("index error: {0}")]
    Index(#[from] cask_index::IndexError),

    #[error("hub error: {0}")]
    Hub(#[from] cask_hub::HubError),

    #[error("invalid request: {0}")]
    Type(#[from] cask_types::TypeError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Store(e) => match e.kind() {
                FailureKind::CorruptBlob | FailureKind::InvalidRequest => StatusCode::BAD_REQUEST,
                FailureKind::NotFound => StatusCode::NOT_FOUND,
                FailureKind::StorageUnavailable => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Type(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<tokio::task::JoinError> for ServerError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Internal(e.to_string())
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;
    use cask_types::{ContentAddress, HashAlgorithm, Partition};

    fn addr(n: u8) -> ContentAddress {
        ContentAddress::new(HashAlgorithm::Sha1, [n; 20]).unwrap()
    }

    #[test]
    fn status_mapping() {
        let corrupt = ServerError::from(StoreError::CorruptBlob {
            claimed: addr(1),
            computed: addr(2),
        });
        assert_eq!(corrupt.status(), StatusCode::BAD_REQUEST);

        let invalid = ServerError::from(StoreError::InvalidPartition(Partition::default()));
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

        let missing = ServerError::from(StoreError::NotFound(addr(3)));
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let unavailable = ServerError::from(StoreError::StorageUnavailable {
            path: "/nowhere".into(),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        });
        assert_eq!(unavailable.status(), StatusCode::SERVICE_UNAVAILABLE);

        let mirror = ServerError::from(StoreError::MirrorFailed {
            partition: Partition::new("p2").unwrap(),
            source: std::io::Error::from(std::io::ErrorKind::Other),
        });
        assert_eq!(mirror.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bad_address = ServerError::from(
            "sha1-zz".parse::<ContentAddress>().unwrap_err(),
        );
        assert_eq!(bad_address.status(), StatusCode::BAD_REQUEST);
    }
}
