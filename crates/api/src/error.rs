//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::{DomainError, OrderError, PromotionError, TradeError};
use marketplace::MarketplaceError;

/// API-level error type that maps to HTTP responses.
///
/// The body is `{"error": <message>, "kind": <stable machine-readable kind>}`.
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    /// The `x-account-id` header is missing or malformed.
    Unauthenticated(String),
    Domain(DomainError),
    Marketplace(MarketplaceError),
}

impl ApiError {
    fn parts(self) -> (StatusCode, &'static str, String) {
        match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::Unauthenticated(msg) => (StatusCode::UNAUTHORIZED, "unauthenticated", msg),
            ApiError::Domain(err) => domain_error_parts(err),
            ApiError::Marketplace(err) => marketplace_error_parts(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = self.parts();
        if status.is_server_error() {
            tracing::error!(error = %message, kind, "internal server error");
        }

        let body = serde_json::json!({ "error": message, "kind": kind });
        (status, axum::Json(body)).into_response()
    }
}

fn domain_error_parts(err: DomainError) -> (StatusCode, &'static str, String) {
    let (status, kind) = match &err {
        DomainError::Order(order_err) => match order_err {
            OrderError::InvalidTransition { .. } => (StatusCode::CONFLICT, "invalid_transition"),
            OrderError::Forbidden { .. } => (StatusCode::FORBIDDEN, "forbidden"),
            OrderError::AlreadyPlaced => (StatusCode::CONFLICT, "conflict"),
            OrderError::NoLines
            | OrderError::InvalidQuantity { .. }
            | OrderError::InvalidTotal { .. } => (StatusCode::BAD_REQUEST, "bad_request"),
        },
        DomainError::Promotion(promotion_err) => match promotion_err {
            PromotionError::Forbidden { .. } => (StatusCode::FORBIDDEN, "forbidden"),
            PromotionError::AlreadyCreated | PromotionError::NotRedeemable => {
                (StatusCode::CONFLICT, "conflict")
            }
            PromotionError::InvalidRule(_)
            | PromotionError::InvalidWindow { .. }
            | PromotionError::MissingAssignee => (StatusCode::BAD_REQUEST, "bad_request"),
        },
        DomainError::Trade(trade_err) => match trade_err {
            TradeError::SelfTradeRejected => (StatusCode::BAD_REQUEST, "self_trade_rejected"),
            TradeError::UnauthorizedCounterOffer { .. } => {
                (StatusCode::BAD_REQUEST, "unauthorized_counter_offer")
            }
            TradeError::CounterOutOfTurn { .. } => (StatusCode::BAD_REQUEST, "counter_out_of_turn"),
            TradeError::ProposalNotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            TradeError::InvalidTransition { .. } | TradeError::InvalidProposalTransition { .. } => {
                (StatusCode::CONFLICT, "invalid_transition")
            }
            TradeError::Forbidden { .. } => (StatusCode::FORBIDDEN, "forbidden"),
            TradeError::AlreadyCreated => (StatusCode::CONFLICT, "conflict"),
            TradeError::InvalidPost(_)
            | TradeError::NoItemsOffered
            | TradeError::InvalidModeration(_) => (StatusCode::BAD_REQUEST, "bad_request"),
        },
        DomainError::AggregateNotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
        e if e.is_conflict() => (StatusCode::CONFLICT, "conflict"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
    };
    (status, kind, err.to_string())
}

fn marketplace_error_parts(err: MarketplaceError) -> (StatusCode, &'static str, String) {
    if let MarketplaceError::Domain(inner) = err {
        return domain_error_parts(inner);
    }
    let (status, kind) = match &err {
        MarketplaceError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
        MarketplaceError::InsufficientStock { .. } => {
            (StatusCode::BAD_REQUEST, "insufficient_stock")
        }
        MarketplaceError::StockConflict { .. } => (StatusCode::CONFLICT, "conflict"),
        MarketplaceError::StaleCartLine { .. } => (StatusCode::BAD_REQUEST, "stale_cart_line"),
        MarketplaceError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
        MarketplaceError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "bad_request"),
        MarketplaceError::Domain(_)
        | MarketplaceError::Projection(_)
        | MarketplaceError::Collaborator(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "internal")
        }
    };
    (status, kind, err.to_string())
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Domain(err)
    }
}

impl From<MarketplaceError> for ApiError {
    fn from(err: MarketplaceError) -> Self {
        ApiError::Marketplace(err)
    }
}
