use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::model::AccountType;

use super::{error_response, not_found, ErrorBody, SharedEngine};

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateAccount {
    pub owner: Uuid,
    pub account_type: String,
}

async fn create_account(
    State(engine): State<SharedEngine>,
    Json(payload): Json<CreateAccount>,
) -> Result<impl IntoResponse, ErrorBody> {
    tracing::info!("Creating bank account for owner: {}", payload.owner);

    let account_type = match AccountType::try_from(payload.account_type.as_str()) {
        Ok(val) => val,
        Err(err) => {
            tracing::warn!("Rejected account type: {err}");
            return Err(error_response(&err));
        }
    };

    match engine.create_account(payload.owner, account_type).await {
        Ok(account) => {
            tracing::info!("Bank account created: {}", account.account_number);
            Ok((StatusCode::CREATED, Json(account)))
        }
        Err(err) => {
            tracing::error!("Failed to create bank account: {err}");
            Err(error_response(&err))
        }
    }
}

async fn list_accounts(
    State(engine): State<SharedEngine>,
    Path(owner): Path<Uuid>,
) -> Result<impl IntoResponse, ErrorBody> {
    match engine.accounts_by_owner(owner).await {
        Ok(accounts) => Ok((StatusCode::OK, Json(accounts))),
        Err(err) => {
            tracing::error!("Failed to list accounts for owner {owner}: {err}");
            Err(error_response(&err))
        }
    }
}

async fn get_wallet(
    State(engine): State<SharedEngine>,
    Path(user): Path<Uuid>,
) -> Result<impl IntoResponse, ErrorBody> {
    match engine.wallet_by_user(user).await {
        Ok(Some(wallet)) => Ok((StatusCode::OK, Json(wallet))),
        Ok(None) => {
            tracing::warn!("Wallet not found for user: {user}");
            Err(not_found("wallet not found"))
        }
        Err(err) => {
            tracing::error!("Failed to fetch wallet for user {user}: {err}");
            Err(error_response(&err))
        }
    }
}

pub fn account_routes(engine: SharedEngine) -> Router {
    Router::new()
        .route("/account/create", post(create_account))
        .route("/account/list/:owner", get(list_accounts))
        .route("/wallet/:user", get(get_wallet))
        .with_state(engine)
}
