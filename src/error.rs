use axum::{extract::rejection::JsonRejection, http::StatusCode, response::{IntoResponse, Response}, Json};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("could not decode uploaded image: {0}")] Decode(String),
}

#[derive(Debug, Error)]
pub enum StylistError {
    #[error("{0}")]
    MissingInput(&'static str),
    #[error("error during outfit generation: {0}")]
    Generation(#[from] GenerationError),
    #[error("session {0} not found")]
    SessionNotFound(String),
    #[error("an outfit generation is already running for this session")]
    Busy,
    #[error("no outfit components detected yet; generate an outfit first")]
    NoOutfitComponents,
    #[error("outfit {0} is no longer the active outfit")]
    StaleOutfit(String),
    #[error("no product {link} under {component}")]
    ProductNotFound { component: String, link: String },
    #[error("{message}")]
    InvalidBody { status: StatusCode, message: String },
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<JsonRejection> for StylistError {
    fn from(rejection: JsonRejection) -> Self {
        Self::InvalidBody { status: rejection.status(), message: rejection.body_text() }
    }
}

impl StylistError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingInput(_) => "missing_input",
            Self::Generation(_) => "generation",
            Self::SessionNotFound(_) => "session_not_found",
            Self::Busy => "busy",
            Self::NoOutfitComponents => "no_outfit_components",
            Self::StaleOutfit(_) => "stale_outfit",
            Self::ProductNotFound { .. } => "product_not_found",
            Self::InvalidBody { status, .. } if *status == StatusCode::PAYLOAD_TOO_LARGE => "payload_too_large",
            Self::InvalidBody { .. } => "invalid_body",
            Self::Internal(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingInput(_) => StatusCode::BAD_REQUEST,
            Self::Generation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::SessionNotFound(_) | Self::ProductNotFound { .. } => StatusCode::NOT_FOUND,
            Self::Busy | Self::NoOutfitComponents | Self::StaleOutfit(_) => StatusCode::CONFLICT,
            Self::InvalidBody { status, .. } => *status,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for StylistError {
    fn into_response(self) -> Response {
        let body = json!({ "error": self.kind(), "message": self.to_string() });
        (self.status(), Json(body)).into_response()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}
