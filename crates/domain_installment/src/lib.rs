//! Installment Domain - Payment Reconciliation
//!
//! This crate keeps one contract per CRM deal consistent with the money that
//! actually arrived, whether through the payment gateway or as cash entered
//! by an operator.
//!
//! # Ledger Model
//!
//! - **Contract**: terms plus the aggregate `paid_amount`
//! - **Schedule**: pure function of the terms, never stored
//! - **Payment records**: one per payment id, unique across deals
//! - **Allocation entries**: append-only `(payment, month, amount)` slices
//!
//! Every mutation runs under an exclusive per-deal lock and commits contract,
//! payment record, and allocation entries in one transaction. A gateway
//! confirmation is idempotent per payment id.
//!
//! # Example
//!
//! ```rust,ignore
//! use domain_installment::{ReconciliationService, ReconciliationPolicy};
//!
//! let service = ReconciliationService::new(store, crm, notifier, clock, ReconciliationPolicy::default());
//!
//! let outcome = service.handle_webhook(&webhook).await?;
//! let view = service.get_schedule(&deal_id).await?;
//! ```

pub mod contract;
pub mod schedule;
pub mod allocation;
pub mod payment;
pub mod gateway;
pub mod ports;
pub mod adapters;
pub mod echo;
pub mod reconciliation;
pub mod error;

pub use contract::{Contract, ContractStatus, ContractSummary, SettingsChange, DEFAULT_BILLING_DAY, MAX_TERM_MONTHS};
pub use schedule::{due_amounts, generate_schedule, ScheduleError, ScheduleTerms, ScheduledInstallment};
pub use allocation::{
    AllocationEntry, AllocationPart, AllocationSlot, AllocationSource, InstallmentStatus, InstallmentView,
    LedgerView, DOWN_PAYMENT_SLOT,
};
pub use payment::{PaymentRecord, PaymentSource, PaymentStatus};
pub use gateway::{GatewayConfirmation, GatewayWebhook, PAYMENT_SUCCEEDED_EVENT};
pub use ports::{ContractStore, LedgerTransaction, NotificationPort, PaymentNotice};
pub use adapters::{InMemoryContractStore, TracingNotifier};
pub use echo::{EchoOutcome, EchoRequest, PaidAmountEcho};
pub use reconciliation::{
    CashAmount, CashPaymentReceipt, CashPaymentRequest, ConfirmationOutcome, MonthAllocation,
    ReconciliationPolicy, ReconciliationService, ScheduleView, SyncOutcome, WebhookOutcome,
};
pub use error::InstallmentError;
#[cfg(any(test, feature = "mock"))]
pub use ports::mock::RecordingNotifier;
