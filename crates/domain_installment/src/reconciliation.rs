//! Reconciliation engine
//!
//! Entry point for every payment and settings change. Each mutation runs in
//! one `LedgerTransaction` that first locks the deal, re-reads state under the
//! lock, mutates, and commits contract, payment record, and allocation entries
//! together. CRM lookups happen before the transaction opens; the CRM echo and
//! notifications happen after it commits.
//!
//! # Payment lifecycle
//!
//! ```text
//! unseen --create_gateway_payment--> pending --confirm--> paid
//! unseen --confirm / record_cash_payment------------------> paid
//! ```
//!
//! A confirmation for a payment id that is already paid never adds to the
//! aggregate again; it only writes allocation entries if they are missing.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use core_kernel::{DealId, PaymentId, RetryPolicy, SharedClock};
use domain_crm::{CrmPort, CrmPortExt};

use crate::allocation::{
    month_totals, plan_sequential_fill, summarize, validate_explicit, AllocationEntry,
    AllocationPart, LedgerView,
};
use crate::contract::{Contract, ContractSummary, SettingsChange, DEFAULT_BILLING_DAY};
use crate::echo::{EchoRequest, PaidAmountEcho};
use crate::error::{lift_port_error, InstallmentError};
use crate::gateway::{GatewayConfirmation, GatewayWebhook};
use crate::payment::{PaymentRecord, PaymentSource};
use crate::ports::{ContractStore, LedgerTransaction, NotificationPort, PaymentNotice};
use crate::schedule::{generate_schedule, ScheduledInstallment};

/// Tunables of the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationPolicy {
    /// Upper bound for one cash entry
    pub max_cash_payment: i64,
    /// Window of the keyless duplicate guard
    pub duplicate_window_secs: i64,
    /// Billing day assigned when an anchor is fixed without one
    pub default_billing_day: u32,
    /// Retries of the CRM echo
    pub echo_retry: RetryPolicy,
    /// Longest stored cash comment, in characters
    pub max_comment_chars: usize,
}

impl Default for ReconciliationPolicy {
    fn default() -> Self {
        Self {
            max_cash_payment: 10_000_000,
            duplicate_window_secs: 30,
            default_billing_day: DEFAULT_BILLING_DAY,
            echo_retry: RetryPolicy::default(),
            max_comment_chars: 500,
        }
    }
}

/// Result of a gateway confirmation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationOutcome {
    pub deal_id: DealId,
    pub payment_id: PaymentId,
    pub amount: i64,
    pub old_paid: i64,
    pub new_paid: i64,
    pub allocations: Vec<AllocationPart>,
    /// true when the payment had been fully applied before
    pub already_applied: bool,
}

/// Result of a webhook delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WebhookOutcome {
    Ignored { reason: String },
    Applied(ConfirmationOutcome),
}

/// Operator-chosen amount for one schedule month
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthAllocation {
    pub month_index: i64,
    pub amount: i64,
}

/// How a cash payment is to be allocated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CashAmount {
    /// Spread over the months in order
    Lump(i64),
    /// Written to the given months as-is
    Months(Vec<MonthAllocation>),
}

impl CashAmount {
    fn total(&self) -> Result<i64, InstallmentError> {
        match self {
            CashAmount::Lump(amount) => {
                if *amount <= 0 {
                    return Err(InstallmentError::validation(format!(
                        "amount must be positive, got {}",
                        amount
                    )));
                }
                Ok(*amount)
            }
            CashAmount::Months(items) => {
                if items.is_empty() {
                    return Err(InstallmentError::validation("allocation list is empty"));
                }
                let mut sum = 0i64;
                for item in items {
                    if item.amount <= 0 {
                        return Err(InstallmentError::validation(format!(
                            "allocation amount for month {} must be positive, got {}",
                            item.month_index, item.amount
                        )));
                    }
                    if item.month_index < 0 {
                        return Err(InstallmentError::validation(format!(
                            "month_index must not be negative, got {}",
                            item.month_index
                        )));
                    }
                    sum = sum.saturating_add(item.amount);
                }
                Ok(sum)
            }
        }
    }
}

/// A cash entry from an operator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashPaymentRequest {
    pub deal_id: DealId,
    pub amount: CashAmount,
    pub idempotency_key: Option<String>,
    pub comment: Option<String>,
}

/// Result of a cash entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashPaymentReceipt {
    pub deal_id: DealId,
    pub payment_id: PaymentId,
    pub amount: i64,
    pub old_paid: i64,
    pub new_paid: i64,
    pub allocations: Vec<AllocationPart>,
    /// true when the idempotency key had been used before
    pub idempotent: bool,
}

/// Result of a CRM import
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOutcome {
    pub contract: ContractSummary,
    pub created: bool,
    /// false when the CRM terms were refused because they conflict with the paid amount
    pub terms_applied: bool,
}

/// A contract with its schedule and paid state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleView {
    pub contract: ContractSummary,
    #[serde(flatten)]
    pub ledger: LedgerView,
}

/// What to do when a deal is first referenced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FirstSight {
    /// The CRM must know the deal
    RequireCrm,
    /// Fall back to a contract with unknown terms
    AcceptUnknown,
}

/// The reconciliation engine
pub struct ReconciliationService {
    store: Arc<dyn ContractStore>,
    crm: Arc<dyn CrmPort>,
    echo: PaidAmountEcho,
    clock: SharedClock,
    policy: ReconciliationPolicy,
}

impl ReconciliationService {
    pub fn new(
        store: Arc<dyn ContractStore>,
        crm: Arc<dyn CrmPort>,
        notifier: Arc<dyn NotificationPort>,
        clock: SharedClock,
        policy: ReconciliationPolicy,
    ) -> Self {
        let echo = PaidAmountEcho::new(crm.clone(), notifier, policy.echo_retry);
        Self {
            store,
            crm,
            echo,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> &ReconciliationPolicy {
        &self.policy
    }

    pub fn store(&self) -> &Arc<dyn ContractStore> {
        &self.store
    }

    /// Creates a pending gateway payment
    ///
    /// An existing record with the same id is returned unchanged.
    ///
    /// # Errors
    ///
    /// - `Validation` if the amount is not positive or exceeds the remaining balance
    /// - `NotFound` if neither the store nor the CRM knows the deal
    /// - `Conflict` if the payment id belongs to another deal
    #[instrument(skip(self), fields(deal_id = %deal_id, payment_id = %payment_id))]
    pub async fn create_gateway_payment(
        &self,
        deal_id: &DealId,
        payment_id: &PaymentId,
        amount: i64,
    ) -> Result<PaymentRecord, InstallmentError> {
        if amount <= 0 {
            return Err(InstallmentError::validation(format!(
                "amount must be positive, got {}",
                amount
            )));
        }

        let seed = self.first_sight_seed(deal_id, FirstSight::RequireCrm).await?;
        let mut tx = self.store.begin().await?;
        let contract = lock_or_create(tx.as_mut(), deal_id, seed).await?;

        if let Some(existing) = tx.find_payment(payment_id).await? {
            tx.rollback().await?;
            ensure_same_deal(&existing, deal_id)?;
            debug!("Gateway payment already exists");
            return Ok(existing);
        }

        check_remaining(&contract, amount)?;

        let record = PaymentRecord::pending_gateway(
            payment_id.clone(),
            deal_id.clone(),
            amount,
            self.clock.now(),
        );
        tx.insert_payment(&record).await.map_err(lift_port_error)?;
        tx.commit().await.map_err(lift_port_error)?;

        info!(amount, "Gateway payment created");
        Ok(record)
    }

    /// Processes a gateway webhook
    ///
    /// Events other than a successful payment are acknowledged as ignored.
    pub async fn handle_webhook(&self, webhook: &GatewayWebhook) -> Result<WebhookOutcome, InstallmentError> {
        match webhook.confirmation()? {
            Some(confirmation) => Ok(WebhookOutcome::Applied(
                self.confirm_gateway_payment(&confirmation).await?,
            )),
            None => {
                let reason = webhook.ignore_reason();
                debug!(reason = %reason, "Webhook ignored");
                Ok(WebhookOutcome::Ignored { reason })
            }
        }
    }

    /// Confirms a gateway payment
    ///
    /// Safe to call any number of times, concurrently, for the same payment
    /// id: the amount is added to the aggregate once and allocation entries
    /// are written once.
    ///
    /// # Errors
    ///
    /// - `Validation` if the amount is not positive
    /// - `Conflict` if the payment id belongs to another deal
    /// - `Port` if storage fails; nothing is written in that case
    #[instrument(skip(self, confirmation), fields(deal_id = %confirmation.deal_id, payment_id = %confirmation.payment_id))]
    pub async fn confirm_gateway_payment(
        &self,
        confirmation: &GatewayConfirmation,
    ) -> Result<ConfirmationOutcome, InstallmentError> {
        let GatewayConfirmation {
            deal_id,
            payment_id,
            amount,
        } = confirmation;
        if *amount <= 0 {
            return Err(InstallmentError::validation(format!(
                "amount must be positive, got {}",
                amount
            )));
        }

        let seed = self.first_sight_seed(deal_id, FirstSight::AcceptUnknown).await?;
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let mut contract = lock_or_create(tx.as_mut(), deal_id, seed).await?;

        let existing = tx.find_payment(payment_id).await?;
        if let Some(record) = &existing {
            if let Err(e) = ensure_same_deal(record, deal_id) {
                tx.rollback().await?;
                return Err(e);
            }
        }

        let was_paid = existing.as_ref().is_some_and(PaymentRecord::is_paid);
        let allocated = tx.has_allocations(payment_id).await?;

        if was_paid && (allocated || !contract.has_schedule()) {
            tx.rollback().await?;
            info!("Duplicate confirmation, payment already applied");
            return Ok(ConfirmationOutcome {
                deal_id: deal_id.clone(),
                payment_id: payment_id.clone(),
                amount: existing.map_or(*amount, |r| r.amount),
                old_paid: contract.paid_amount,
                new_paid: contract.paid_amount,
                allocations: Vec::new(),
                already_applied: true,
            });
        }

        let record = match existing {
            None => {
                let record = PaymentRecord::paid(
                    payment_id.clone(),
                    deal_id.clone(),
                    *amount,
                    PaymentSource::Gateway,
                    now,
                );
                tx.insert_payment(&record).await.map_err(lift_port_error)?;
                record
            }
            Some(mut record) if !record.is_paid() => {
                if record.amount != *amount {
                    debug!(recorded = record.amount, confirmed = amount, "Confirmed amount replaces recorded amount");
                }
                record.confirm(*amount, now);
                tx.save_payment(&record).await?;
                record
            }
            Some(record) => record,
        };

        let (old_paid, new_paid) = if was_paid {
            (contract.paid_amount, contract.paid_amount)
        } else {
            let change = contract.apply_payment(record.amount, now);
            tx.save_contract(&contract).await?;
            change
        };

        let parts = if allocated {
            Vec::new()
        } else {
            let parts = plan_fill(tx.as_mut(), &contract, record.amount).await?;
            write_allocations(tx.as_mut(), &contract.deal_id, payment_id, &parts, now).await?;
            parts
        };

        tx.commit().await.map_err(lift_port_error)?;
        info!(amount = record.amount, old_paid, new_paid, months = parts.len(), "Gateway payment confirmed");

        if !was_paid {
            self.echo_payment(&contract, &record);
        }

        Ok(ConfirmationOutcome {
            deal_id: deal_id.clone(),
            payment_id: payment_id.clone(),
            amount: record.amount,
            old_paid,
            new_paid,
            allocations: parts,
            already_applied: false,
        })
    }

    /// Records a cash payment
    ///
    /// With an idempotency key the payment id is `cash_<key>` and a repeated
    /// key returns the original receipt with `idempotent = true`. Without one,
    /// a payment of the same amount on the same deal inside the duplicate
    /// window is refused.
    ///
    /// # Errors
    ///
    /// - `Validation` for bad amounts or allocations, unknown total, a fully
    ///   paid contract, or an amount above the remaining balance
    /// - `NotFound` if neither the store nor the CRM knows the deal
    /// - `Conflict` for a keyless duplicate or a key used on another deal
    #[instrument(skip(self, request), fields(deal_id = %request.deal_id))]
    pub async fn record_cash_payment(
        &self,
        request: &CashPaymentRequest,
    ) -> Result<CashPaymentReceipt, InstallmentError> {
        let deal_id = &request.deal_id;
        let amount = request.amount.total()?;
        if amount > self.policy.max_cash_payment {
            return Err(InstallmentError::validation(format!(
                "amount {} exceeds the cash limit of {}",
                amount, self.policy.max_cash_payment
            )));
        }

        let key = request
            .idempotency_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty());
        let payment_id = match key {
            Some(key) => PaymentId::from_idempotency_key(key)?,
            None => PaymentId::generate_cash(),
        };

        let seed = self.first_sight_seed(deal_id, FirstSight::RequireCrm).await?;
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let mut contract = lock_or_create(tx.as_mut(), deal_id, seed).await?;

        if key.is_some() {
            if let Some(existing) = tx.find_payment(&payment_id).await? {
                let allocations = tx
                    .deal_allocations(deal_id)
                    .await?
                    .into_iter()
                    .filter(|e| e.payment_id == payment_id)
                    .filter_map(|e| {
                        e.slot.month().map(|month_index| AllocationPart {
                            month_index,
                            amount: e.amount,
                        })
                    })
                    .collect();
                tx.rollback().await?;
                ensure_same_deal(&existing, deal_id)?;
                info!(payment_id = %payment_id, "Idempotent cash payment replay");
                return Ok(CashPaymentReceipt {
                    deal_id: deal_id.clone(),
                    payment_id,
                    amount: existing.amount,
                    old_paid: contract.paid_amount,
                    new_paid: contract.paid_amount,
                    allocations,
                    idempotent: true,
                });
            }
        }

        if contract.total_amount <= 0 {
            return Err(InstallmentError::validation(
                "contract total is unknown, set it before recording cash",
            ));
        }
        check_remaining(&contract, amount)?;

        if key.is_none() {
            let since = now - Duration::seconds(self.policy.duplicate_window_secs);
            if tx
                .recent_payment_exists(deal_id, amount, PaymentSource::Cash, since)
                .await?
            {
                return Err(InstallmentError::conflict(format!(
                    "a cash payment of {} was recorded for deal {} within the last {} seconds",
                    amount, deal_id, self.policy.duplicate_window_secs
                )));
            }
        }

        let parts = match &request.amount {
            CashAmount::Lump(_) => plan_fill(tx.as_mut(), &contract, amount).await?,
            CashAmount::Months(items) => {
                let (due, already) = open_schedule(tx.as_mut(), &contract).await?;
                let requested: Vec<(i64, i64)> =
                    items.iter().map(|i| (i.month_index, i.amount)).collect();
                validate_explicit(&due, &already, &requested)?
            }
        };

        let comment = cash_comment(&parts, request.comment.as_deref(), self.policy.max_comment_chars);
        let record = PaymentRecord::paid(payment_id.clone(), deal_id.clone(), amount, PaymentSource::Cash, now)
            .with_comment(comment);
        tx.insert_payment(&record).await.map_err(lift_port_error)?;

        let (old_paid, new_paid) = contract.apply_payment(amount, now);
        tx.save_contract(&contract).await?;
        write_allocations(tx.as_mut(), deal_id, &payment_id, &parts, now).await?;
        tx.commit().await.map_err(lift_port_error)?;

        info!(payment_id = %payment_id, amount, old_paid, new_paid, "Cash payment recorded");
        self.echo_payment(&contract, &record);

        Ok(CashPaymentReceipt {
            deal_id: deal_id.clone(),
            payment_id,
            amount,
            old_paid,
            new_paid,
            allocations: parts,
            idempotent: false,
        })
    }

    /// Updates contract settings under the deal lock
    ///
    /// # Errors
    ///
    /// - `Validation` for malformed changes
    /// - `Conflict` if the change would break `paid <= total` or `down <= total`
    /// - `NotFound` if neither the store nor the CRM knows the deal
    #[instrument(skip(self, change), fields(deal_id = %deal_id))]
    pub async fn update_settings(
        &self,
        deal_id: &DealId,
        change: &SettingsChange,
    ) -> Result<Contract, InstallmentError> {
        change.validate()?;

        let seed = self.first_sight_seed(deal_id, FirstSight::RequireCrm).await?;
        let mut tx = self.store.begin().await?;
        let mut contract = lock_or_create(tx.as_mut(), deal_id, seed).await?;

        contract.apply_settings(change, self.clock.now(), self.policy.default_billing_day)?;
        tx.save_contract(&contract).await?;
        tx.commit().await.map_err(lift_port_error)?;

        info!(
            total_amount = contract.total_amount,
            term_months = contract.term_months,
            down_payment = contract.down_payment,
            "Contract settings updated"
        );
        self.echo.spawn(EchoRequest {
            deal_id: contract.deal_id.clone(),
            paid_amount: contract.paid_amount,
            notice: None,
        });
        Ok(contract)
    }

    /// Imports a deal from the CRM, or refreshes an existing one
    ///
    /// # Errors
    ///
    /// `NotFound` if the CRM does not know the deal
    #[instrument(skip(self), fields(deal_id = %deal_id))]
    pub async fn sync_from_crm(&self, deal_id: &DealId) -> Result<SyncOutcome, InstallmentError> {
        let snapshot = self
            .crm
            .fetch_snapshot(deal_id)
            .await?
            .ok_or_else(|| InstallmentError::deal_not_found(deal_id))?;

        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let (contract, created, terms_applied) = match tx.lock_contract(deal_id).await? {
            Some(mut contract) => {
                let applied = contract.merge_snapshot(&snapshot, now, self.policy.default_billing_day);
                tx.save_contract(&contract).await?;
                (contract, false, applied)
            }
            None => {
                let contract = Contract::from_snapshot(&snapshot, now, self.policy.default_billing_day);
                tx.insert_contract(&contract).await?;
                (contract, true, true)
            }
        };
        tx.commit().await.map_err(lift_port_error)?;

        info!(created, terms_applied, "Deal synced from CRM");
        Ok(SyncOutcome {
            contract: ContractSummary::from(&contract),
            created,
            terms_applied,
        })
    }

    /// Returns the schedule with per-month paid state
    ///
    /// Read-only. A contract with a term but no anchor yet is presented from
    /// its creation date.
    pub async fn get_schedule(&self, deal_id: &DealId) -> Result<ScheduleView, InstallmentError> {
        let contract = self
            .store
            .get_contract(deal_id)
            .await?
            .ok_or_else(|| InstallmentError::deal_not_found(deal_id))?;

        let ledger = match build_schedule(&contract)? {
            Some(schedule) if !schedule.is_empty() => {
                let entries = self.store.list_allocations(deal_id).await?;
                LedgerView::build(deal_id, &schedule, &entries, contract.paid_amount)
            }
            _ => LedgerView::empty(),
        };

        Ok(ScheduleView {
            contract: ContractSummary::from(&contract),
            ledger,
        })
    }

    /// Fixes the schedule anchor on first schedule read
    ///
    /// No-op when the term is zero or an anchor already exists.
    #[instrument(skip(self), fields(deal_id = %deal_id))]
    pub async fn fix_schedule_anchor(&self, deal_id: &DealId) -> Result<Contract, InstallmentError> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let mut contract = tx
            .lock_contract(deal_id)
            .await?
            .ok_or_else(|| InstallmentError::deal_not_found(deal_id))?;

        if contract.fix_anchor(now.date_naive(), self.policy.default_billing_day) {
            contract.updated_at = now;
            tx.save_contract(&contract).await?;
            tx.commit().await.map_err(lift_port_error)?;
            info!(anchor = %now.date_naive(), "Schedule anchor fixed");
        } else {
            tx.rollback().await?;
        }
        Ok(contract)
    }

    /// Payment history of a deal, newest first
    pub async fn list_payments(&self, deal_id: &DealId) -> Result<Vec<PaymentRecord>, InstallmentError> {
        if self.store.get_contract(deal_id).await?.is_none() {
            return Err(InstallmentError::deal_not_found(deal_id));
        }
        Ok(self.store.list_payments(deal_id).await?)
    }

    /// All contracts with status and remaining balance
    pub async fn list_contracts(&self) -> Result<Vec<ContractSummary>, InstallmentError> {
        let contracts = self.store.list_contracts().await?;
        Ok(contracts.iter().map(ContractSummary::from).collect())
    }

    /// Builds the contract to insert if the store does not know the deal yet
    ///
    /// Runs before any transaction so the CRM is never called under a lock.
    async fn first_sight_seed(
        &self,
        deal_id: &DealId,
        mode: FirstSight,
    ) -> Result<Option<Contract>, InstallmentError> {
        if self.store.get_contract(deal_id).await?.is_some() {
            return Ok(None);
        }

        let now = self.clock.now();
        let billing_day = self.policy.default_billing_day;
        match (self.crm.fetch_snapshot(deal_id).await, mode) {
            (Ok(Some(snapshot)), _) => Ok(Some(Contract::from_snapshot(&snapshot, now, billing_day))),
            (Ok(None), FirstSight::RequireCrm) => Err(InstallmentError::deal_not_found(deal_id)),
            (Err(e), FirstSight::RequireCrm) => Err(lift_port_error(e)),
            (lookup, FirstSight::AcceptUnknown) => {
                if let Err(e) = lookup {
                    warn!(deal_id = %deal_id, error = %e, "CRM lookup failed, creating contract with unknown terms");
                }
                let mut contract = Contract::new(deal_id.clone(), now);
                contract.billing_day = billing_day;
                Ok(Some(contract))
            }
        }
    }

    fn echo_payment(&self, contract: &Contract, record: &PaymentRecord) {
        self.echo.spawn(EchoRequest {
            deal_id: contract.deal_id.clone(),
            paid_amount: contract.paid_amount,
            notice: Some(PaymentNotice {
                deal_id: contract.deal_id.clone(),
                payment_id: record.payment_id.clone(),
                title: contract.title.clone(),
                amount: record.amount,
                source: record.source,
                paid_amount: contract.paid_amount,
                total_amount: contract.total_amount,
            }),
        });
    }
}

/// Locks the deal, inserting `seed` first if the contract does not exist
async fn lock_or_create(
    tx: &mut dyn LedgerTransaction,
    deal_id: &DealId,
    seed: Option<Contract>,
) -> Result<Contract, InstallmentError> {
    if let Some(contract) = tx.lock_contract(deal_id).await? {
        return Ok(contract);
    }

    let seed = seed.ok_or_else(|| InstallmentError::deal_not_found(deal_id))?;
    if tx.insert_contract(&seed).await? {
        debug!(deal_id = %deal_id, total_amount = seed.total_amount, "Contract created on first sight");
    }
    tx.lock_contract(deal_id)
        .await?
        .ok_or_else(|| InstallmentError::deal_not_found(deal_id))
}

fn ensure_same_deal(record: &PaymentRecord, deal_id: &DealId) -> Result<(), InstallmentError> {
    if &record.deal_id != deal_id {
        return Err(InstallmentError::conflict(format!(
            "payment {} belongs to deal {}",
            record.payment_id, record.deal_id
        )));
    }
    Ok(())
}

fn check_remaining(contract: &Contract, amount: i64) -> Result<(), InstallmentError> {
    if contract.total_amount <= 0 {
        return Ok(());
    }
    let remaining = contract.remaining_amount();
    if remaining == 0 {
        return Err(InstallmentError::validation("contract is already fully paid"));
    }
    if amount > remaining {
        return Err(InstallmentError::validation(format!(
            "amount {} exceeds remaining balance of {}",
            amount, remaining
        )));
    }
    Ok(())
}

fn build_schedule(contract: &Contract) -> Result<Option<Vec<ScheduledInstallment>>, InstallmentError> {
    contract
        .schedule_terms()
        .map(|terms| generate_schedule(&terms))
        .transpose()
        .map_err(|e| InstallmentError::validation(e.to_string()))
}

/// Due amounts and already-allocated amounts per month
async fn open_schedule(
    tx: &mut dyn LedgerTransaction,
    contract: &Contract,
) -> Result<(Vec<i64>, Vec<i64>), InstallmentError> {
    let due: Vec<i64> = match build_schedule(contract)? {
        Some(schedule) => schedule.iter().map(|s| s.due_amount).collect(),
        None => Vec::new(),
    };
    if due.is_empty() {
        return Ok((due, Vec::new()));
    }
    let existing = tx.deal_allocations(&contract.deal_id).await?;
    let already = month_totals(&existing, due.len());
    Ok((due, already))
}

async fn plan_fill(
    tx: &mut dyn LedgerTransaction,
    contract: &Contract,
    amount: i64,
) -> Result<Vec<AllocationPart>, InstallmentError> {
    let (due, already) = open_schedule(tx, contract).await?;
    Ok(plan_sequential_fill(&due, &already, amount))
}

async fn write_allocations(
    tx: &mut dyn LedgerTransaction,
    deal_id: &DealId,
    payment_id: &PaymentId,
    parts: &[AllocationPart],
    now: chrono::DateTime<chrono::Utc>,
) -> Result<(), InstallmentError> {
    if parts.is_empty() {
        return Ok(());
    }
    let entries: Vec<AllocationEntry> = parts
        .iter()
        .map(|p| p.into_entry(deal_id, payment_id, now))
        .collect();
    tx.insert_allocations(&entries).await?;
    Ok(())
}

/// Allocation summary joined with the operator's note, cut to `max_chars`
fn cash_comment(parts: &[AllocationPart], note: Option<&str>, max_chars: usize) -> Option<String> {
    let summary = summarize(parts);
    let note = note.map(str::trim).filter(|n| !n.is_empty());
    let text = match (summary.is_empty(), note) {
        (true, None) => return None,
        (true, Some(note)) => note.to_string(),
        (false, None) => summary,
        (false, Some(note)) => format!("{} | {}", summary, note),
    };
    Some(text.chars().take(max_chars).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cash_comment_shapes() {
        let parts = [
            AllocationPart { month_index: 0, amount: 5000 },
            AllocationPart { month_index: 1, amount: 3000 },
        ];
        assert_eq!(
            cash_comment(&parts, Some(" paid at office "), 500).as_deref(),
            Some("#1:5000, #2:3000 | paid at office")
        );
        assert_eq!(cash_comment(&[], Some("  "), 500), None);
        assert_eq!(cash_comment(&[], Some("note"), 500).as_deref(), Some("note"));
    }

    #[test]
    fn test_cash_comment_truncated_by_chars() {
        let long = "ж".repeat(600);
        let comment = cash_comment(&[], Some(&long), 500).unwrap();
        assert_eq!(comment.chars().count(), 500);
    }

    #[test]
    fn test_cash_amount_totals() {
        assert_eq!(CashAmount::Lump(500).total().unwrap(), 500);
        assert!(CashAmount::Lump(0).total().is_err());
        let months = CashAmount::Months(vec![
            MonthAllocation { month_index: 0, amount: 100 },
            MonthAllocation { month_index: 2, amount: 50 },
        ]);
        assert_eq!(months.total().unwrap(), 150);
        assert!(CashAmount::Months(vec![]).total().is_err());
        assert!(CashAmount::Months(vec![MonthAllocation { month_index: -1, amount: 5 }])
            .total()
            .is_err());
    }
}
