//! Pollguard - Request Rate Limiting for the Polling Application
//!
//! This crate implements the fixed-window, per-client rate limiter that guards
//! the polling application's sign-in and poll-creation routes. The limiter can
//! be embedded as axum middleware or run as a standalone HTTP decision
//! service.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
