//! Payment gateway webhook payloads
//!
//! Only `payment.succeeded` carrying status `succeeded` confirms a payment.
//! Anything else is acknowledged and ignored.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use core_kernel::{try_parse_amount, DealId, PaymentId};

use crate::error::InstallmentError;

/// Event name that triggers confirmation
pub const PAYMENT_SUCCEEDED_EVENT: &str = "payment.succeeded";

/// Object status that triggers confirmation
pub const SUCCEEDED_STATUS: &str = "succeeded";

/// Webhook body as sent by the gateway
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayWebhook {
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub object: GatewayObject,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayObject {
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub amount: GatewayAmount,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayAmount {
    #[serde(default)]
    pub value: Value,
}

/// A validated confirmation extracted from a webhook
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfirmation {
    pub deal_id: DealId,
    pub payment_id: PaymentId,
    pub amount: i64,
}

impl GatewayWebhook {
    /// Returns true if this webhook should confirm a payment
    pub fn is_success(&self) -> bool {
        self.event == PAYMENT_SUCCEEDED_EVENT && self.object.status == SUCCEEDED_STATUS
    }

    /// Extracts the confirmation from a success webhook
    ///
    /// # Returns
    ///
    /// `Ok(None)` for events that are not a successful payment
    ///
    /// # Errors
    ///
    /// `InstallmentError::Validation` if a success webhook lacks the payment
    /// id, the deal id, or a positive amount
    pub fn confirmation(&self) -> Result<Option<GatewayConfirmation>, InstallmentError> {
        if !self.is_success() {
            return Ok(None);
        }

        let payment_id = scalar_text(&self.object.id)
            .ok_or_else(|| InstallmentError::validation("webhook object has no payment id"))?;
        let deal_id = self
            .object
            .metadata
            .get("deal_id")
            .and_then(scalar_text)
            .ok_or_else(|| InstallmentError::validation("webhook metadata has no deal_id"))?;
        let amount = try_parse_amount(&self.object.amount.value).map_err(|e| {
            InstallmentError::validation(format!("webhook amount is unusable: {}", e))
        })?;
        if amount <= 0 {
            return Err(InstallmentError::validation(format!(
                "webhook amount must be positive, got {}",
                amount
            )));
        }

        Ok(Some(GatewayConfirmation {
            deal_id: DealId::new(deal_id)?,
            payment_id: PaymentId::new(payment_id)?,
            amount,
        }))
    }

    /// Short description of an ignored event, for logs and replies
    pub fn ignore_reason(&self) -> String {
        format!("event {} with status {}", self.event, self.object.status)
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn webhook(body: Value) -> GatewayWebhook {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn test_success_payload() {
        let hook = webhook(json!({
            "event": "payment.succeeded",
            "object": {
                "id": "2d9a1c3e-000f-5000-8000-1b2c3d4e5f60",
                "amount": {"value": "40000.00", "currency": "RUB"},
                "status": "succeeded",
                "metadata": {"deal_id": 318}
            }
        }));
        let confirmation = hook.confirmation().unwrap().unwrap();
        assert_eq!(confirmation.deal_id.as_str(), "318");
        assert_eq!(confirmation.amount, 40000);
    }

    #[test]
    fn test_other_events_ignored() {
        let hook = webhook(json!({
            "event": "payment.waiting_for_capture",
            "object": {"id": "p1", "status": "waiting_for_capture"}
        }));
        assert_eq!(hook.confirmation().unwrap(), None);

        let canceled = webhook(json!({
            "event": "payment.succeeded",
            "object": {"id": "p1", "status": "canceled"}
        }));
        assert_eq!(canceled.confirmation().unwrap(), None);
    }

    #[test]
    fn test_missing_fields_rejected() {
        let no_deal = webhook(json!({
            "event": "payment.succeeded",
            "object": {"id": "p1", "status": "succeeded", "amount": {"value": "10"}}
        }));
        assert!(no_deal.confirmation().is_err());

        let zero_amount = webhook(json!({
            "event": "payment.succeeded",
            "object": {"id": "p1", "status": "succeeded", "amount": {"value": "0.50"},
                       "metadata": {"deal_id": "5"}}
        }));
        assert!(zero_amount.confirmation().is_err());
    }

    #[test]
    fn test_empty_body_is_ignored() {
        assert_eq!(webhook(json!({})).confirmation().unwrap(), None);
    }
}
