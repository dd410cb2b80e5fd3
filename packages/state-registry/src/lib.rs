mod access;
pub mod core;
pub mod dst_swapper;
mod error;
pub mod msg;
pub mod payment;
pub mod slippage;
pub mod state;
pub mod timelock;
pub mod validator;

pub use error::{ContractError, ErrorKind};
