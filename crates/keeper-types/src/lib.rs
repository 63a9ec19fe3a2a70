//! Shared types for the UniswapEx keeper.

pub mod events;
pub mod ledger;
pub mod order;

pub use events::*;
pub use ledger::*;
pub use order::*;

pub use alloy::primitives::{Address, Bytes, B256, U256};
