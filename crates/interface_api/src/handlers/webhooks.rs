//! Payment gateway webhook handler

use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use tracing::{info, warn};

use domain_installment::{GatewayWebhook, WebhookOutcome};

use crate::signature::{self, SIGNATURE_HEADER};
use crate::{AppState, error::ApiError};

/// Receives gateway notifications
///
/// With signature checks enabled the raw body must carry a valid HMAC in
/// `X-YooMoney-Signature`, otherwise the request is refused with 401.
/// Events other than a successful payment are acknowledged with 200 so the
/// gateway stops redelivering them.
pub async fn gateway_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookOutcome>, ApiError> {
    if state.config.verify_webhook_signature {
        let header = headers
            .get(SIGNATURE_HEADER)
            .and_then(|value| value.to_str().ok());
        if let Err(e) = signature::verify(&state.config.webhook_secret, &body, header) {
            warn!(error = %e, "Gateway webhook refused");
            return Err(e.into());
        }
    }

    let webhook: GatewayWebhook = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid webhook payload: {}", e)))?;
    info!(event = %webhook.event, status = %webhook.object.status, "Gateway webhook received");

    let outcome = state.service.handle_webhook(&webhook).await?;
    Ok(Json(outcome))
}
