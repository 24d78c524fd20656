//! Shared wire types for Tollgate.
//!
//! Merchants receiving settlement webhooks depend on this crate to decode the
//! payload and verify its signature.

pub mod objects;
pub mod signature;
