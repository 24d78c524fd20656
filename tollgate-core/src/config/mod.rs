//! Configuration types for Tollgate.
//!
//! These types represent the validated runtime configuration. Loading and
//! parsing the configuration file is handled by the server crate; the values
//! are fixed for the lifetime of the process.

mod chain;
mod dispatch;
mod http;

pub use chain::{AssetConfig, ChainConfig, DEFAULT_PAGE_SIZE, DEFAULT_SCAN_INTERVAL};
pub use dispatch::{DispatchConfig, TelegramConfig};
pub use http::HttpConfig;
