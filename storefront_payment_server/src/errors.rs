use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use storefront_payment_engine::CheckoutDbError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Payload deserialization error. {0}")]
    CouldNotDeserializePayload(String),
    #[error("Could not read request path: {0}")]
    InvalidRequestPath(String),
    #[error("Missing or malformed {0} header")]
    MissingIdentityHeader(&'static str),
    #[error("Webhook signature invalid or not provided")]
    InvalidWebhookSignature,
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error("{0}")]
    InvalidRequest(String),
    #[error("{0}")]
    Conflict(String),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::CouldNotDeserializePayload(_) => StatusCode::BAD_REQUEST,
            Self::InvalidRequestPath(_) => StatusCode::BAD_REQUEST,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::MissingIdentityHeader(_) => StatusCode::UNAUTHORIZED,
            Self::InvalidWebhookSignature => StatusCode::UNAUTHORIZED,
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

/// Engine errors keep their meaning; only the transport formatting happens here. Validation problems map to 400,
/// races and exhausted resources to 409, unknown ids to 404, and everything infrastructural to 500.
impl From<CheckoutDbError> for ServerError {
    fn from(e: CheckoutDbError) -> Self {
        match &e {
            CheckoutDbError::EmptySelection => Self::InvalidRequest(e.to_string()),
            CheckoutDbError::VoucherNotFound(_) => Self::InvalidRequest(e.to_string()),
            CheckoutDbError::VoucherRejected(_) => Self::InvalidRequest(e.to_string()),
            CheckoutDbError::OutOfStock { .. } => Self::Conflict(e.to_string()),
            CheckoutDbError::PendingTransactionExists(_) => Self::Conflict(e.to_string()),
            CheckoutDbError::OrderNotCancellable(_) => Self::Conflict(e.to_string()),
            CheckoutDbError::OrderNotPayable(..) => Self::Conflict(e.to_string()),
            CheckoutDbError::OrderNotFound(_) => Self::NoRecordFound(e.to_string()),
            CheckoutDbError::TransactionNotFound(_) => Self::NoRecordFound(e.to_string()),
            CheckoutDbError::DatabaseError(_) => Self::BackendError(e.to_string()),
        }
    }
}
