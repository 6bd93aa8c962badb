//! Test Data Builders
//!
//! Builder patterns for contracts, webhooks, and cash requests. Tests set
//! only the fields they care about; descriptive fields are filled with fake
//! but plausible data.

use chrono::{DateTime, NaiveDate, Utc};
use fake::faker::address::en::StreetName;
use fake::faker::internet::en::SafeEmail;
use fake::Fake;
use serde_json::{json, Value};

use core_kernel::DealId;
use domain_installment::{
    CashAmount, CashPaymentRequest, Contract, GatewayWebhook, MonthAllocation, DEFAULT_BILLING_DAY,
    PAYMENT_SUCCEEDED_EVENT,
};

use crate::fixtures::TemporalFixtures;

/// Builder for contracts
pub struct ContractBuilder {
    deal_id: DealId,
    title: String,
    contact_email: Option<String>,
    total_amount: i64,
    paid_amount: i64,
    down_payment: i64,
    term_months: u32,
    anchor: Option<NaiveDate>,
    billing_day: u32,
    created_at: DateTime<Utc>,
}

impl Default for ContractBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ContractBuilder {
    /// A 120000 contract over 12 months, anchored on the fixture date, with a random deal id
    pub fn new() -> Self {
        let id: u32 = (10_000..99_999).fake();
        let street: String = StreetName().fake();
        Self {
            deal_id: DealId::new(id.to_string()).unwrap(),
            title: format!("Plot on {}", street),
            contact_email: Some(SafeEmail().fake()),
            total_amount: 120_000,
            paid_amount: 0,
            down_payment: 0,
            term_months: 12,
            anchor: Some(TemporalFixtures::anchor()),
            billing_day: DEFAULT_BILLING_DAY,
            created_at: TemporalFixtures::now(),
        }
    }

    pub fn deal_id(mut self, id: &str) -> Self {
        self.deal_id = DealId::new(id).unwrap();
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn without_email(mut self) -> Self {
        self.contact_email = None;
        self
    }

    pub fn total(mut self, amount: i64) -> Self {
        self.total_amount = amount;
        self
    }

    /// Sets the aggregate paid amount without any allocation rows
    pub fn paid(mut self, amount: i64) -> Self {
        self.paid_amount = amount;
        self
    }

    pub fn down_payment(mut self, amount: i64) -> Self {
        self.down_payment = amount;
        self
    }

    /// Sets the term; a zero term also clears the anchor
    pub fn term(mut self, months: u32) -> Self {
        self.term_months = months;
        if months == 0 {
            self.anchor = None;
        }
        self
    }

    pub fn anchor(mut self, date: NaiveDate) -> Self {
        self.anchor = Some(date);
        self
    }

    /// Leaves the anchor unset, as for a contract never read since it got a term
    pub fn unanchored(mut self) -> Self {
        self.anchor = None;
        self
    }

    pub fn billing_day(mut self, day: u32) -> Self {
        self.billing_day = day;
        self
    }

    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self
    }

    pub fn build(self) -> Contract {
        let mut contract = Contract::new(self.deal_id, self.created_at);
        contract.title = self.title;
        contract.contact_email = self.contact_email;
        contract.total_amount = self.total_amount;
        contract.paid_amount = self.paid_amount;
        contract.down_payment = self.down_payment;
        contract.term_months = self.term_months;
        contract.schedule_anchor_date = self.anchor;
        contract.billing_day = self.billing_day;
        contract
    }
}

/// Builder for gateway webhook bodies
pub struct WebhookBuilder {
    event: String,
    status: String,
    payment_id: Value,
    amount: Value,
    deal_id: Option<Value>,
}

impl WebhookBuilder {
    /// A successful payment webhook
    pub fn succeeded(deal_id: &str, payment_id: &str, amount: i64) -> Self {
        Self {
            event: PAYMENT_SUCCEEDED_EVENT.to_string(),
            status: "succeeded".to_string(),
            payment_id: json!(payment_id),
            amount: json!(format!("{}.00", amount)),
            deal_id: Some(json!(deal_id)),
        }
    }

    pub fn event(mut self, event: &str, status: &str) -> Self {
        self.event = event.to_string();
        self.status = status.to_string();
        self
    }

    /// Replaces the amount with a raw value, e.g. `"1 500,50"`
    pub fn raw_amount(mut self, value: Value) -> Self {
        self.amount = value;
        self
    }

    pub fn without_deal(mut self) -> Self {
        self.deal_id = None;
        self
    }

    pub fn to_json(&self) -> Value {
        let metadata = match &self.deal_id {
            Some(deal_id) => json!({ "deal_id": deal_id }),
            None => json!({}),
        };
        json!({
            "event": self.event,
            "object": {
                "id": self.payment_id,
                "amount": { "value": self.amount, "currency": "RUB" },
                "status": self.status,
                "metadata": metadata
            }
        })
    }

    pub fn build(&self) -> GatewayWebhook {
        serde_json::from_value(self.to_json()).unwrap()
    }
}

/// Builder for cash entries
pub struct CashRequestBuilder {
    request: CashPaymentRequest,
}

impl CashRequestBuilder {
    pub fn lump(deal_id: &DealId, amount: i64) -> Self {
        Self {
            request: CashPaymentRequest {
                deal_id: deal_id.clone(),
                amount: CashAmount::Lump(amount),
                idempotency_key: None,
                comment: None,
            },
        }
    }

    /// Explicit `(month_index, amount)` allocations
    pub fn months(deal_id: &DealId, items: &[(i64, i64)]) -> Self {
        let items = items
            .iter()
            .map(|&(month_index, amount)| MonthAllocation { month_index, amount })
            .collect();
        Self {
            request: CashPaymentRequest {
                deal_id: deal_id.clone(),
                amount: CashAmount::Months(items),
                idempotency_key: None,
                comment: None,
            },
        }
    }

    pub fn key(mut self, key: &str) -> Self {
        self.request.idempotency_key = Some(key.to_string());
        self
    }

    pub fn comment(mut self, comment: &str) -> Self {
        self.request.comment = Some(comment.to_string());
        self
    }

    pub fn build(self) -> CashPaymentRequest {
        self.request
    }
}
