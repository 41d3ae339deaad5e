//! Pre-trade validator module
//!
//! Synchronous, fail-closed order checks on the trading hot path

mod pipeline;
mod types;

pub use pipeline::PreTradeValidator;
pub use types::{OrderDecision, ValidatorSettings};
