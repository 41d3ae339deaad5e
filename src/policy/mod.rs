//! Policy module
//!
//! Declarative risk rules, their stores and the evaluation engine

mod engine;
mod store;
mod types;

pub use engine::{
    evaluate_all_policies, evaluate_policies, limit_utilization, EvaluationResult, EvaluationScope,
    PolicyEngine,
};
pub use store::{default_policies, parse_policies, FilePolicyStore, PolicyStore, StaticPolicyStore};
pub use types::{
    Decision, Operator, Policy, PolicyError, PolicyScope, PolicyType, Violation, ViolationAction,
};
