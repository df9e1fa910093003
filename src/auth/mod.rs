//! # Authentication Module
//!
//! Handles JWT token issuance, validation, password hashing and the
//! middleware that guards player-only endpoints.

pub mod jwt;
pub mod middleware;
pub mod models;
pub mod password;
