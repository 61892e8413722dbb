// ==============
// crates/backend-lib/src/metrics.rs

//! Central place for Prometheus metric keys
/// Gate decisions, labelled `outcome` = static | pass | redirect_login | redirect_home
pub const GATE_DECISION: &str = "gate.decision";
/// Session verifications that errored or timed out
pub const GATE_AUTH_FAILURE: &str = "gate.auth_failure";
/// Successful session refreshes
pub const AUTH_REFRESH: &str = "auth.refresh";
/// Data service calls that failed
pub const DATA_FAILURE: &str = "data.failure";
