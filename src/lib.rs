//! risk-guard: Pre-trade risk validation for a trading platform
//!
//! This library provides the core components for:
//! - Two-tier caching of policies, prices and account state
//! - Actual and projected risk metrics
//! - Prioritised policy evaluation with Hard/Soft/Emergency semantics
//! - A global, lock-free emergency stop with an audited lifecycle
//! - Latency-bounded pre-trade checks that fail closed
//! - Continuous account monitoring with a violation circuit breaker
//! - Deduplicated, non-blocking alert publishing

pub mod account;
pub mod alert;
pub mod cache;
pub mod cli;
pub mod components;
pub mod config;
pub mod emergency;
pub mod health;
pub mod monitor;
pub mod policy;
pub mod risk;
pub mod service;
pub mod telemetry;
pub mod validator;
