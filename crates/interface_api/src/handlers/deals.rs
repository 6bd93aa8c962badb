//! Deal handlers
//!
//! Operator endpoints over the reconciliation engine. Every mutation goes
//! through `ReconciliationService`; nothing here touches the store directly.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use tracing::info;
use validator::Validate;

use core_kernel::DealId;
use domain_installment::{
    CashPaymentReceipt, Contract, ContractSummary, PaymentRecord, ScheduleView, SettingsChange,
    SyncOutcome,
};

use crate::dto::deals::{CashPaymentBody, CreatePaymentRequest, SettingsRequest};
use crate::{AppState, error::ApiError};

fn deal_id(raw: String) -> Result<DealId, ApiError> {
    Ok(DealId::new(raw)?)
}

/// Lists contracts, most recently updated first
pub async fn list_deals(
    State(state): State<AppState>,
) -> Result<Json<Vec<ContractSummary>>, ApiError> {
    Ok(Json(state.service.list_contracts().await?))
}

/// Contract detail
///
/// Opening the detail is the first schedule read, so it fixes the anchor of
/// a contract that has a term but no anchor yet.
pub async fn get_deal(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<ScheduleView>, ApiError> {
    let deal_id = deal_id(raw_id)?;
    state.service.fix_schedule_anchor(&deal_id).await?;
    Ok(Json(state.service.get_schedule(&deal_id).await?))
}

/// Read-only schedule
pub async fn get_schedule(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<ScheduleView>, ApiError> {
    let deal_id = deal_id(raw_id)?;
    Ok(Json(state.service.get_schedule(&deal_id).await?))
}

/// Payment history, newest first
pub async fn list_payments(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<Vec<PaymentRecord>>, ApiError> {
    let deal_id = deal_id(raw_id)?;
    Ok(Json(state.service.list_payments(&deal_id).await?))
}

/// Registers a pending gateway payment
pub async fn create_payment(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    payload: Result<Json<CreatePaymentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<PaymentRecord>), ApiError> {
    let deal_id = deal_id(raw_id)?;
    let Json(request) = payload?;
    request.validate()?;

    let payment_id = request.payment_id()?;
    let record = state
        .service
        .create_gateway_payment(&deal_id, &payment_id, request.amount)
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// Records a cash payment taken by an operator
pub async fn record_cash_payment(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    payload: Result<Json<CashPaymentBody>, JsonRejection>,
) -> Result<Json<CashPaymentReceipt>, ApiError> {
    let deal_id = deal_id(raw_id)?;
    let Json(body) = payload?;
    body.validate()?;

    let request = body.into_request(deal_id)?;
    let receipt = state.service.record_cash_payment(&request).await?;
    info!(
        deal_id = %receipt.deal_id,
        payment_id = %receipt.payment_id,
        amount = receipt.amount,
        idempotent = receipt.idempotent,
        "Cash payment accepted"
    );
    Ok(Json(receipt))
}

/// Updates contract settings
pub async fn update_settings(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    payload: Result<Json<SettingsRequest>, JsonRejection>,
) -> Result<Json<Contract>, ApiError> {
    let deal_id = deal_id(raw_id)?;
    let Json(request) = payload?;
    request.validate()?;

    let change = SettingsChange::from(request);
    Ok(Json(state.service.update_settings(&deal_id, &change).await?))
}

/// Imports or refreshes a deal from the CRM
pub async fn sync_deal(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<SyncOutcome>, ApiError> {
    let deal_id = deal_id(raw_id)?;
    Ok(Json(state.service.sync_from_crm(&deal_id).await?))
}
