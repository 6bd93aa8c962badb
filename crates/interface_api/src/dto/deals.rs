//! Deal DTOs

use serde::{Deserialize, Serialize};
use validator::Validate;

use core_kernel::{DealId, PaymentId};
use domain_installment::{CashAmount, CashPaymentRequest, MonthAllocation, SettingsChange};

use crate::error::ApiError;

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePaymentRequest {
    #[validate(length(min = 1, max = 128))]
    pub payment_id: String,
    pub amount: i64,
}

impl CreatePaymentRequest {
    pub fn payment_id(&self) -> Result<PaymentId, ApiError> {
        Ok(PaymentId::new(self.payment_id.as_str())?)
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct MonthAllocationDto {
    /// 0-based schedule month
    pub month_index: i64,
    pub amount: i64,
}

/// Cash entry body
///
/// A non-empty `allocations` list wins over `amount`.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct CashPaymentBody {
    pub amount: Option<i64>,
    #[serde(default)]
    pub allocations: Vec<MonthAllocationDto>,
    #[validate(length(min = 1, max = 64, message = "must be 1 to 64 characters"))]
    pub idempotency_key: Option<String>,
    #[validate(length(max = 500, message = "must be at most 500 characters"))]
    pub comment: Option<String>,
}

impl CashPaymentBody {
    pub fn into_request(self, deal_id: DealId) -> Result<CashPaymentRequest, ApiError> {
        let amount = if !self.allocations.is_empty() {
            CashAmount::Months(
                self.allocations
                    .iter()
                    .map(|a| MonthAllocation {
                        month_index: a.month_index,
                        amount: a.amount,
                    })
                    .collect(),
            )
        } else {
            match self.amount {
                Some(amount) => CashAmount::Lump(amount),
                None => {
                    return Err(ApiError::Validation(
                        "either amount or allocations is required".to_string(),
                    ))
                }
            }
        };

        Ok(CashPaymentRequest {
            deal_id,
            amount,
            idempotency_key: self
                .idempotency_key
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty()),
            comment: self.comment,
        })
    }
}

/// Settings body; `initial_payment` and `email` are accepted as aliases
#[derive(Debug, Default, Deserialize, Validate)]
pub struct SettingsRequest {
    pub total_amount: Option<i64>,
    pub term_months: Option<i64>,
    #[serde(alias = "initial_payment")]
    pub down_payment: Option<i64>,
    pub billing_day: Option<i64>,
    #[validate(length(max = 255))]
    pub title: Option<String>,
    #[serde(alias = "email")]
    #[validate(length(max = 254))]
    pub contact_email: Option<String>,
}

impl From<SettingsRequest> for SettingsChange {
    fn from(request: SettingsRequest) -> Self {
        SettingsChange {
            total_amount: request.total_amount,
            term_months: request.term_months,
            down_payment: request.down_payment,
            billing_day: request.billing_day,
            title: request.title,
            contact_email: request.contact_email,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deal() -> DealId {
        DealId::new("42").unwrap()
    }

    #[test]
    fn test_allocations_win_over_amount() {
        let body: CashPaymentBody = serde_json::from_value(serde_json::json!({
            "amount": 100,
            "allocations": [{"month_index": 0, "amount": 30}]
        }))
        .unwrap();
        let request = body.into_request(deal()).unwrap();
        assert_eq!(
            request.amount,
            CashAmount::Months(vec![MonthAllocation { month_index: 0, amount: 30 }])
        );
    }

    #[test]
    fn test_amount_or_allocations_required() {
        let err = CashPaymentBody::default().into_request(deal()).unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn test_blank_idempotency_key_is_dropped() {
        let body = CashPaymentBody {
            amount: Some(10),
            idempotency_key: Some("   ".to_string()),
            ..CashPaymentBody::default()
        };
        assert_eq!(body.into_request(deal()).unwrap().idempotency_key, None);
    }

    #[test]
    fn test_key_and_comment_lengths_validated() {
        let body = CashPaymentBody {
            amount: Some(10),
            idempotency_key: Some("k".repeat(65)),
            comment: Some("c".repeat(501)),
            ..CashPaymentBody::default()
        };
        let errors = body.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("idempotency_key"));
        assert!(fields.contains_key("comment"));
    }

    #[test]
    fn test_settings_aliases() {
        let request: SettingsRequest = serde_json::from_value(serde_json::json!({
            "initial_payment": 5000,
            "email": "buyer@example.com"
        }))
        .unwrap();
        let change = SettingsChange::from(request);
        assert_eq!(change.down_payment, Some(5000));
        assert_eq!(change.contact_email.as_deref(), Some("buyer@example.com"));
    }
}
