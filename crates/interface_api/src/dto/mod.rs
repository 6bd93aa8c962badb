//! Request and response bodies

pub mod deals;
