use std::sync::Arc;

use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use crate::db::postgres::PgLedgerStore;
use crate::engine::error::LedgerError;
use crate::engine::LedgerEngine;

pub mod account;
pub mod tx;

pub type SharedEngine = Arc<LedgerEngine<PgLedgerStore>>;

pub(crate) type ErrorBody = (StatusCode, Json<Value>);

pub(crate) fn error_response(err: &LedgerError) -> ErrorBody {
    let status = match err {
        LedgerError::InvalidAmount
        | LedgerError::InsufficientFunds
        | LedgerError::MissingSourceAccount
        | LedgerError::SelfTransferNotAllowed
        | LedgerError::UnsupportedTransactionType(_) => StatusCode::BAD_REQUEST,
        LedgerError::RecipientNotFound => StatusCode::NOT_FOUND,
        LedgerError::UnauthorizedAccount => StatusCode::FORBIDDEN,
        LedgerError::StoreConflict => StatusCode::CONFLICT,
        LedgerError::IdentifierGenerationExhausted(_) | LedgerError::Store(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (
        status,
        Json(json!({ "kind": err.kind(), "message": err.to_string() })),
    )
}

pub(crate) fn not_found(message: &str) -> ErrorBody {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "kind": "not_found", "message": message })),
    )
}
