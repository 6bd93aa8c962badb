//! Payment records
//!
//! One record per ingested payment attempt. Gateway payments start pending
//! and are confirmed by the webhook; cash payments are paid on entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use core_kernel::{DealId, PaymentId};

/// Payment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    /// Created, awaiting gateway confirmation
    Pending,
    /// Confirmed and counted in the contract's paid amount
    Paid,
    /// Rejected by the gateway
    Failed,
}

/// Where a payment came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentSource {
    Gateway,
    Cash,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
        }
    }
}

impl PaymentSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentSource::Gateway => "gateway",
            PaymentSource::Cash => "cash",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for PaymentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "paid" => Ok(PaymentStatus::Paid),
            "failed" => Ok(PaymentStatus::Failed),
            other => Err(format!("unknown payment status: {}", other)),
        }
    }
}

impl FromStr for PaymentSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gateway" => Ok(PaymentSource::Gateway),
            "cash" => Ok(PaymentSource::Cash),
            other => Err(format!("unknown payment source: {}", other)),
        }
    }
}

/// A payment attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub payment_id: PaymentId,
    pub deal_id: DealId,
    pub amount: i64,
    pub status: PaymentStatus,
    pub source: PaymentSource,
    /// Allocation summary and operator note, for cash entries
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl PaymentRecord {
    /// A gateway payment awaiting confirmation
    pub fn pending_gateway(
        payment_id: PaymentId,
        deal_id: DealId,
        amount: i64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            payment_id,
            deal_id,
            amount,
            status: PaymentStatus::Pending,
            source: PaymentSource::Gateway,
            comment: None,
            created_at: now,
            paid_at: None,
        }
    }

    /// A payment that is confirmed on entry
    pub fn paid(
        payment_id: PaymentId,
        deal_id: DealId,
        amount: i64,
        source: PaymentSource,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            payment_id,
            deal_id,
            amount,
            status: PaymentStatus::Paid,
            source,
            comment: None,
            created_at: now,
            paid_at: Some(now),
        }
    }

    pub fn with_comment(mut self, comment: Option<String>) -> Self {
        self.comment = comment;
        self
    }

    pub fn is_paid(&self) -> bool {
        self.status == PaymentStatus::Paid
    }

    /// Marks the record paid; the confirmed amount replaces the recorded one
    pub fn confirm(&mut self, amount: i64, now: DateTime<Utc>) {
        self.amount = amount;
        self.status = PaymentStatus::Paid;
        self.paid_at = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confirm_overwrites_amount() {
        let now = Utc::now();
        let mut record = PaymentRecord::pending_gateway(
            PaymentId::new("pay_1").unwrap(),
            DealId::new("7").unwrap(),
            10000,
            now,
        );
        record.confirm(12000, now);
        assert_eq!(record.amount, 12000);
        assert!(record.is_paid());
        assert_eq!(record.paid_at, Some(now));
    }

    #[test]
    fn test_status_text_round_trip() {
        for status in [PaymentStatus::Pending, PaymentStatus::Paid, PaymentStatus::Failed] {
            assert_eq!(status.as_str().parse::<PaymentStatus>(), Ok(status));
        }
        assert!("refunded".parse::<PaymentStatus>().is_err());
    }
}
