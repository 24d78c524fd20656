pub mod chains;
pub mod webhook;

pub use chains::{Chain, UnknownChain};
pub use webhook::{ORDER_SETTLED_EVENT, OrderSettledPayload, OrderStatus};
