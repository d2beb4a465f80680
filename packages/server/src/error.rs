//! Mapping of core errors onto HTTP responses.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use blotter_aggregate::AggregateError;
use blotter_server_models::ApiError;
use blotter_sql::SqlError;
use blotter_upstream::UpstreamError;
use thiserror::Error;

/// Any error a handler can return.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// A required parameter is missing or malformed.
    #[error("{0}")]
    BadRequest(String),

    /// The requested entity does not exist.
    #[error("{0}")]
    NotFound(String),

    /// From the aggregation flows.
    #[error(transparent)]
    Aggregate(#[from] AggregateError),

    /// From a passthrough call.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    /// From request parsing.
    #[error(transparent)]
    Sql(#[from] SqlError),
}

fn upstream_status(e: &UpstreamError) -> StatusCode {
    match e {
        UpstreamError::Sql(_) => StatusCode::BAD_REQUEST,
        UpstreamError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        UpstreamError::QueryFailed { status, .. } => status
            .filter(|s| (400..600).contains(s))
            .and_then(|s| StatusCode::from_u16(s).ok())
            .unwrap_or(StatusCode::BAD_GATEWAY),
        UpstreamError::Decode { .. } => StatusCode::BAD_GATEWAY,
    }
}

impl ResponseError for GatewayError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::Sql(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Upstream(e) => upstream_status(e),
            Self::Aggregate(e) => match e {
                AggregateError::Sql(_) | AggregateError::InvalidParameter { .. } => {
                    StatusCode::BAD_REQUEST
                }
                AggregateError::AddressNotFound { .. } | AggregateError::UnknownSource { .. } => {
                    StatusCode::NOT_FOUND
                }
                AggregateError::Upstream(e) => upstream_status(e),
            },
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("{self}");
        } else {
            log::debug!("Rejected request: {self}");
        }
        HttpResponse::build(status).json(ApiError {
            error: self.to_string(),
        })
    }
}
