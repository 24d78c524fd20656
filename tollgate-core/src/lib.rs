#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

pub mod config;
pub mod entities;
pub mod framework;
pub mod notifier;
pub mod processors;
pub mod sources;
pub mod stores;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_utils;
