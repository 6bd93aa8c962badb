//! Core Kernel - Foundational types shared by every installment crate
//!
//! This crate provides the building blocks used across all domain modules:
//! - Exact integer amounts parsed from heterogeneous external values
//! - Calendar arithmetic and an injectable clock
//! - Opaque external identifiers
//! - The port error vocabulary for hexagonal adapters

pub mod money;
pub mod temporal;
pub mod identifiers;
pub mod error;
pub mod ports;

pub use money::{parse_amount, parse_amount_str, parse_count, try_parse_amount, MoneyError};
pub use temporal::{
    add_months, clamp_day, last_day_of_month, parse_calendar_date, parse_date_value,
    Clock, FixedClock, SharedClock, SystemClock, TemporalError,
};
pub use identifiers::{DealId, IdentifierError, PaymentId};
pub use error::CoreError;
pub use ports::{
    AdapterHealth, DomainPort, HealthCheckResult, HealthCheckable, PortError, RetryPolicy,
};
