//! Web handlers module
//!
//! Thin handlers that read cached scheduler state or hand requests to the
//! scheduler. None of them wait on the refresh lock.

pub mod health;
pub mod refresh;
pub mod schedule;
pub mod status;
