// crates/backend-lib/src/middleware/mod.rs

//! Middleware for the `kabuport` edge server.

pub mod gate;

pub use gate::{request_gate, GateOutcome, GatePlan};

#[cfg(test)]
mod tests;
