//! Request handlers

pub mod crm;
pub mod deals;
pub mod health;
pub mod webhooks;
