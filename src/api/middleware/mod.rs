//! API middleware stack.
//!
//! Execution order (outermost → innermost):
//! 1. Rate limiter, reject early
//! 2. Session auth, cookie validation and silent refresh
//! 3. Audit logger, runs after auth so it has the user id

pub mod audit;
pub mod auth;
pub mod rate;
