//! Identifiers for externally issued entities
//!
//! Deals are numbered by the CRM and payments by the gateway (or by the cash
//! desk), so identifiers are opaque strings. Newtype wrappers keep a deal id
//! from being passed where a payment id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Longest identifier accepted from outside
pub const MAX_IDENTIFIER_LEN: usize = 128;

/// Errors raised when wrapping an identifier
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IdentifierError {
    #[error("{entity} id must not be blank")]
    Blank { entity: &'static str },

    #[error("{entity} id exceeds {max} characters")]
    TooLong { entity: &'static str, max: usize },
}

macro_rules! define_external_id {
    ($name:ident, $entity:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Wraps an identifier, trimming surrounding whitespace
            ///
            /// # Errors
            ///
            /// Returns `IdentifierError` for blank or oversized values
            pub fn new(value: impl Into<String>) -> Result<Self, IdentifierError> {
                let value = value.into();
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    return Err(IdentifierError::Blank { entity: $entity });
                }
                if trimmed.len() > MAX_IDENTIFIER_LEN {
                    return Err(IdentifierError::TooLong {
                        entity: $entity,
                        max: MAX_IDENTIFIER_LEN,
                    });
                }
                Ok(Self(trimmed.to_string()))
            }

            /// Returns the identifier text
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Name of the entity this identifier refers to
            pub fn entity() -> &'static str {
                $entity
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = IdentifierError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdentifierError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_external_id!(DealId, "Deal");
define_external_id!(PaymentId, "Payment");

/// Prefix for payment ids minted by the cash desk
pub const CASH_PAYMENT_PREFIX: &str = "cash_";

impl PaymentId {
    /// Derives the payment id for a cash entry carrying an idempotency key
    ///
    /// The same key always maps to the same id, which lets the storage-level
    /// uniqueness constraint reject replays.
    pub fn from_idempotency_key(key: &str) -> Result<Self, IdentifierError> {
        Self::new(format!("{}{}", CASH_PAYMENT_PREFIX, key.trim()))
    }

    /// Mints a fresh cash payment id (`cash_` plus 16 hex characters)
    pub fn generate_cash() -> Self {
        let hex = Uuid::new_v4().simple().to_string();
        Self(format!("{}{}", CASH_PAYMENT_PREFIX, &hex[..16]))
    }

    /// Returns true if this id was minted by the cash desk
    pub fn is_cash(&self) -> bool {
        self.0.starts_with(CASH_PAYMENT_PREFIX)
    }
}
