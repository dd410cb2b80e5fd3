use std::fmt;

use cosmwasm_schema::cw_serde;

pub mod payload;
pub mod payment;
pub mod swap;
pub mod timelock;

pub use payload::{Deliveries, FailedDeposit, FailedDepositEntry};
pub use payment::PaymentConfig;
pub use swap::FailedSwap;

/// Lifecycle of a payload held by the core registry.  Transitions only move forward.
#[cw_serde]
#[derive(Copy, Eq, PartialOrd, Ord)]
pub enum PayloadState {
    Stored,
    Updated,
    Processed,
}

impl fmt::Display for PayloadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadState::Stored => f.write_str("STORED"),
            PayloadState::Updated => f.write_str("UPDATED"),
            PayloadState::Processed => f.write_str("PROCESSED"),
        }
    }
}
