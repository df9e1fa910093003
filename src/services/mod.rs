//! # Services Module
//!
//! Business rules that sit between the route handlers and the store.

pub mod ledger;
