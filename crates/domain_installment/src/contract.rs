//! Contract state
//!
//! One `Contract` per CRM deal. It owns the aggregate paid amount and the
//! terms the schedule is derived from. The reconciliation engine is the only
//! writer of `paid_amount`; settings updates and CRM syncs change the terms
//! under the same per-deal lock.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;
use validator::ValidateEmail;

use core_kernel::DealId;
use domain_crm::CrmDealSnapshot;

use crate::error::InstallmentError;
use crate::schedule::ScheduleTerms;

/// Default day of month for due dates
pub const DEFAULT_BILLING_DAY: u32 = 10;

/// Longest accepted term in months
pub const MAX_TERM_MONTHS: u32 = 120;

/// Listing status of a contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractStatus {
    /// Known total, fully paid
    Paid,
    /// Something paid, or total unknown
    Active,
    /// Known total, nothing paid yet
    Pending,
}

impl fmt::Display for ContractStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ContractStatus::Paid => "paid",
            ContractStatus::Active => "active",
            ContractStatus::Pending => "pending",
        };
        f.write_str(label)
    }
}

/// An installment contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    pub deal_id: DealId,
    pub title: String,
    pub contact_email: Option<String>,
    /// Contract total; 0 means unknown
    pub total_amount: i64,
    pub paid_amount: i64,
    pub down_payment: i64,
    /// 0 means no schedule
    pub term_months: u32,
    pub schedule_anchor_date: Option<NaiveDate>,
    pub billing_day: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Contract {
    /// Creates a contract with unknown terms
    ///
    /// Used when a payment references a deal nobody has described yet.
    pub fn new(deal_id: DealId, now: DateTime<Utc>) -> Self {
        Self {
            deal_id,
            title: String::new(),
            contact_email: None,
            total_amount: 0,
            paid_amount: 0,
            down_payment: 0,
            term_months: 0,
            schedule_anchor_date: None,
            billing_day: DEFAULT_BILLING_DAY,
            created_at: now,
            updated_at: now,
        }
    }

    /// Creates a contract from a CRM snapshot
    ///
    /// The CRM's paid amount is taken as a legacy aggregate, capped at a known
    /// total. A schedule anchor is fixed right away when the term is set.
    pub fn from_snapshot(snapshot: &CrmDealSnapshot, now: DateTime<Utc>, billing_day: u32) -> Self {
        let mut contract = Self::new(snapshot.deal_id.clone(), now);
        contract.title = snapshot.title.clone();
        contract.contact_email = snapshot.contact_email.clone();
        contract.total_amount = snapshot.total_amount;
        contract.down_payment = snapshot.down_payment;
        contract.term_months = snapshot.term_months.min(MAX_TERM_MONTHS);
        contract.paid_amount = contract.capped(snapshot.paid_amount);
        contract.billing_day = billing_day;
        if contract.term_months > 0 {
            contract.schedule_anchor_date = Some(snapshot.start_date.unwrap_or(now.date_naive()));
        }
        contract
    }

    /// Remaining balance, never negative
    pub fn remaining_amount(&self) -> i64 {
        (self.total_amount - self.paid_amount).max(0)
    }

    /// Amount subject to scheduling
    pub fn installment_base(&self) -> i64 {
        (self.total_amount - self.down_payment).max(0)
    }

    /// Returns true if a non-empty schedule can be built
    pub fn has_schedule(&self) -> bool {
        self.term_months > 0 && self.installment_base() > 0
    }

    pub fn status(&self) -> ContractStatus {
        if self.total_amount > 0 && self.paid_amount >= self.total_amount {
            ContractStatus::Paid
        } else if self.paid_amount > 0 || self.total_amount <= 0 {
            ContractStatus::Active
        } else {
            ContractStatus::Pending
        }
    }

    /// Schedule inputs, presenting from the creation date when no anchor is fixed
    ///
    /// Returns `None` when the term is zero.
    pub fn schedule_terms(&self) -> Option<ScheduleTerms> {
        (self.term_months > 0).then(|| ScheduleTerms {
            total_amount: self.total_amount,
            down_payment: self.down_payment,
            term_months: self.term_months,
            anchor: self
                .schedule_anchor_date
                .unwrap_or_else(|| self.created_at.date_naive()),
            billing_day: self.billing_day,
        })
    }

    /// Adds a confirmed amount to the aggregate, capped at a known total
    ///
    /// # Returns
    ///
    /// The `(old, new)` paid amounts
    pub fn apply_payment(&mut self, amount: i64, now: DateTime<Utc>) -> (i64, i64) {
        let old = self.paid_amount;
        self.paid_amount = self.capped(old.saturating_add(amount));
        self.updated_at = now;
        (old, self.paid_amount)
    }

    /// Fixes the schedule anchor if the term is set and no anchor exists yet
    ///
    /// A billing day already on the contract is kept; `default_billing_day`
    /// only fills one that was never set.
    ///
    /// # Returns
    ///
    /// true if the anchor was fixed by this call
    pub fn fix_anchor(&mut self, today: NaiveDate, default_billing_day: u32) -> bool {
        if self.term_months == 0 || self.schedule_anchor_date.is_some() {
            return false;
        }
        self.schedule_anchor_date = Some(today);
        if !(1..=31).contains(&self.billing_day) {
            self.billing_day = default_billing_day;
        }
        true
    }

    /// Applies a settings change
    ///
    /// # Errors
    ///
    /// - `Validation` for an empty change, negative values, or out-of-range term/billing day
    /// - `Conflict` if the new total would drop below the paid amount or the
    ///   down payment would exceed the total
    pub fn apply_settings(
        &mut self,
        change: &SettingsChange,
        now: DateTime<Utc>,
        default_billing_day: u32,
    ) -> Result<(), InstallmentError> {
        change.validate()?;

        let total = change.total_amount.unwrap_or(self.total_amount);
        let down = change.down_payment.unwrap_or(self.down_payment);
        if change.total_amount.is_some() && total < self.paid_amount {
            return Err(InstallmentError::conflict(format!(
                "total_amount {} is below paid amount {}",
                total, self.paid_amount
            )));
        }
        if total > 0 && down > total {
            return Err(InstallmentError::conflict(format!(
                "down_payment {} exceeds total_amount {}",
                down, total
            )));
        }

        self.total_amount = total;
        self.down_payment = down;

        if let Some(term) = change.term_months {
            self.term_months = term as u32;
        }
        if let Some(day) = change.billing_day {
            self.billing_day = day as u32;
        }

        if self.term_months == 0 {
            self.schedule_anchor_date = None;
        } else {
            self.fix_anchor(now.date_naive(), default_billing_day);
        }

        if let Some(title) = &change.title {
            self.title = title.trim().to_string();
        }
        if let Some(email) = &change.contact_email {
            let email = email.trim();
            self.contact_email = (!email.is_empty()).then(|| email.to_string());
        }

        self.updated_at = now;
        Ok(())
    }

    /// Merges a fresh CRM snapshot into an existing contract
    ///
    /// Descriptive fields always follow the CRM. Terms follow it only when the
    /// result keeps `paid <= total` and `down <= total`. The local paid amount
    /// is never lowered.
    ///
    /// # Returns
    ///
    /// true if the CRM terms were taken
    pub fn merge_snapshot(
        &mut self,
        snapshot: &CrmDealSnapshot,
        now: DateTime<Utc>,
        default_billing_day: u32,
    ) -> bool {
        if !snapshot.title.is_empty() {
            self.title = snapshot.title.clone();
        }
        if snapshot.contact_email.is_some() {
            self.contact_email = snapshot.contact_email.clone();
        }

        let total = snapshot.total_amount;
        let terms_fit = if self.total_amount > 0 {
            // a blank CRM total on a known contract is unknown, not zero
            total > 0 && self.paid_amount <= total && snapshot.down_payment <= total
        } else {
            total == 0 || (self.paid_amount <= total && snapshot.down_payment <= total)
        };
        if terms_fit {
            self.total_amount = total;
            self.down_payment = snapshot.down_payment;
            self.term_months = snapshot.term_months.min(MAX_TERM_MONTHS);
            if self.term_months == 0 {
                self.schedule_anchor_date = None;
            } else if self.schedule_anchor_date.is_none() {
                let anchor = snapshot.start_date.unwrap_or(now.date_naive());
                self.fix_anchor(anchor, default_billing_day);
            }
        } else {
            warn!(
                deal_id = %self.deal_id,
                crm_total = total,
                paid_amount = self.paid_amount,
                "CRM terms conflict with local paid amount, keeping local terms"
            );
        }

        let crm_paid = self.capped(snapshot.paid_amount);
        self.paid_amount = self.paid_amount.max(crm_paid);
        self.updated_at = now;
        terms_fit
    }

    fn capped(&self, amount: i64) -> i64 {
        if self.total_amount > 0 {
            amount.min(self.total_amount)
        } else {
            amount
        }
    }
}

/// Read model of a contract for listings and schedule replies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractSummary {
    pub deal_id: DealId,
    pub title: String,
    pub contact_email: Option<String>,
    pub total_amount: i64,
    pub paid_amount: i64,
    pub remaining_amount: i64,
    pub down_payment: i64,
    pub installment_base: i64,
    pub term_months: u32,
    pub schedule_anchor_date: Option<NaiveDate>,
    pub billing_day: u32,
    pub status: ContractStatus,
    pub updated_at: DateTime<Utc>,
}

impl From<&Contract> for ContractSummary {
    fn from(c: &Contract) -> Self {
        Self {
            deal_id: c.deal_id.clone(),
            title: c.title.clone(),
            contact_email: c.contact_email.clone(),
            total_amount: c.total_amount,
            paid_amount: c.paid_amount,
            remaining_amount: c.remaining_amount(),
            down_payment: c.down_payment,
            installment_base: c.installment_base(),
            term_months: c.term_months,
            schedule_anchor_date: c.schedule_anchor_date,
            billing_day: c.billing_day,
            status: c.status(),
            updated_at: c.updated_at,
        }
    }
}

/// A partial update of contract settings
///
/// Numeric fields are signed so that negative input can be rejected with a
/// specific message instead of a decode error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsChange {
    pub total_amount: Option<i64>,
    pub term_months: Option<i64>,
    pub down_payment: Option<i64>,
    pub billing_day: Option<i64>,
    pub title: Option<String>,
    pub contact_email: Option<String>,
}

impl SettingsChange {
    pub fn is_empty(&self) -> bool {
        self.total_amount.is_none()
            && self.term_months.is_none()
            && self.down_payment.is_none()
            && self.billing_day.is_none()
            && self.title.is_none()
            && self.contact_email.is_none()
    }

    /// Checks the change on its own, without the contract
    pub fn validate(&self) -> Result<(), InstallmentError> {
        if self.is_empty() {
            return Err(InstallmentError::validation("no fields to update"));
        }

        for (field, value) in [
            ("total_amount", self.total_amount),
            ("term_months", self.term_months),
            ("down_payment", self.down_payment),
        ] {
            if let Some(v) = value {
                if v < 0 {
                    return Err(InstallmentError::validation(format!(
                        "{} must not be negative, got {}",
                        field, v
                    )));
                }
            }
        }

        if let Some(term) = self.term_months {
            if term > i64::from(MAX_TERM_MONTHS) {
                return Err(InstallmentError::validation(format!(
                    "term_months {} exceeds the maximum of {}",
                    term, MAX_TERM_MONTHS
                )));
            }
        }

        if let Some(day) = self.billing_day {
            if !(1..=31).contains(&day) {
                return Err(InstallmentError::validation(format!(
                    "billing_day {} is outside 1..=31",
                    day
                )));
            }
        }

        if let Some(email) = &self.contact_email {
            let email = email.trim();
            if !email.is_empty() && !email.validate_email() {
                return Err(InstallmentError::validation(format!(
                    "contact_email {} is not a valid address",
                    email
                )));
            }
        }

        Ok(())
    }
}
