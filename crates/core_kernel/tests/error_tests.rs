//! Tests for core_kernel error types

use core_kernel::error::CoreError;
use core_kernel::{IdentifierError, MoneyError, PortError, TemporalError};

#[test]
fn test_core_error_validation() {
    let error = CoreError::validation("term out of range");

    match error {
        CoreError::Validation(msg) => assert_eq!(msg, "term out of range"),
        _ => panic!("Expected Validation error"),
    }
}

#[test]
fn test_core_error_configuration() {
    let error = CoreError::configuration("API_PORT is not a number");
    assert!(error.to_string().contains("API_PORT"));
}

#[test]
fn test_core_error_from_money_error() {
    let core_error: CoreError = MoneyError::NotNumeric("abc".to_string()).into();
    assert!(matches!(core_error, CoreError::Money(_)));
    assert!(core_error.to_string().contains("abc"));
}

#[test]
fn test_core_error_from_temporal_error() {
    let core_error: CoreError = TemporalError::InvalidMonth(13).into();
    assert!(matches!(core_error, CoreError::Temporal(_)));
}

#[test]
fn test_core_error_from_identifier_error() {
    let core_error: CoreError = IdentifierError::Blank { entity: "Deal" }.into();
    assert!(core_error.to_string().contains("Deal"));
}

#[test]
fn test_port_error_conflict() {
    let error = PortError::conflict("payment_id already exists");
    assert!(error.is_conflict());
    assert!(!error.is_not_found());
}

#[test]
fn test_port_error_keeps_source() {
    use std::error::Error;

    let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
    let error = PortError::internal_with_source("commit failed", io);
    assert!(error.source().is_some());
}
