use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::model::{TransactionCategory, TransactionType};
use crate::engine::TransactionIntent;

use super::{error_response, not_found, ErrorBody, SharedEngine};

/// Wire form of an intent. Discriminants arrive as strings from the caller
/// and are parsed into the closed enums before the engine sees them.
#[derive(Debug, Serialize, Deserialize)]
pub struct ExecuteTransaction {
    pub sender: Uuid,
    pub transaction_type: String,
    pub transaction_category: String,
    pub amount: Decimal,
    pub recipient_address: Option<String>,
    pub sender_bank_account: Option<Uuid>,
}

async fn execute_transaction(
    State(engine): State<SharedEngine>,
    Json(payload): Json<ExecuteTransaction>,
) -> Result<impl IntoResponse, ErrorBody> {
    tracing::info!("Executing transaction for sender: {}", payload.sender);

    let transaction_type = match TransactionType::try_from(payload.transaction_type.as_str()) {
        Ok(val) => val,
        Err(err) => {
            tracing::warn!("Rejected intent: {err}");
            return Err(error_response(&err));
        }
    };
    let transaction_category =
        match TransactionCategory::try_from(payload.transaction_category.as_str()) {
            Ok(val) => val,
            Err(err) => {
                tracing::warn!("Rejected intent: {err}");
                return Err(error_response(&err));
            }
        };

    let intent = TransactionIntent {
        sender: payload.sender,
        transaction_type,
        transaction_category,
        amount: payload.amount,
        recipient_address: payload.recipient_address,
        sender_bank_account: payload.sender_bank_account,
    };

    match engine.execute(&intent).await {
        Ok(record) => {
            tracing::info!("Transaction completed with receipt: {}", record.receipt);
            Ok((StatusCode::OK, Json(record)))
        }
        Err(err) => {
            tracing::error!("Transaction failed: {err}");
            Err(error_response(&err))
        }
    }
}

// history of a sender, newest first
async fn list_transactions(
    State(engine): State<SharedEngine>,
    Path(sender): Path<Uuid>,
) -> Result<impl IntoResponse, ErrorBody> {
    match engine.transactions_by_sender(sender).await {
        Ok(records) => Ok((StatusCode::OK, Json(records))),
        Err(err) => {
            tracing::error!("Failed to retrieve transactions for {sender}: {err}");
            Err(error_response(&err))
        }
    }
}

async fn get_receipt(
    State(engine): State<SharedEngine>,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, ErrorBody> {
    match engine.transaction_by_receipt(&code).await {
        Ok(Some(record)) => Ok((StatusCode::OK, Json(record))),
        Ok(None) => Err(not_found("no transaction for that receipt")),
        Err(err) => {
            tracing::error!("Failed to retrieve transaction {code}: {err}");
            Err(error_response(&err))
        }
    }
}

pub fn tx_routes(engine: SharedEngine) -> Router {
    Router::new()
        .route("/tx/execute", post(execute_transaction))
        .route("/tx/list/:sender", get(list_transactions))
        .route("/tx/receipt/:code", get(get_receipt))
        .with_state(engine)
}
