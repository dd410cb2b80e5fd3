use cosmwasm_schema::cw_serde;
use cosmwasm_std::{Addr, Uint256};
use cw_storage_plus::Map;

pub const PAYMENT_CONFIGS: Map<u64, PaymentConfig> = Map::new("payment/configs");

/// Fee parameters for one chain.  Prices use 8 decimals.
#[cw_serde]
#[derive(Default)]
pub struct PaymentConfig {
    pub native_feed_oracle: Option<Addr>,
    pub gas_price_oracle: Option<Addr>,
    pub swap_gas_used: Uint256,
    pub update_gas_used: Uint256,
    pub deposit_gas_used: Uint256,
    pub withdraw_gas_used: Uint256,
    pub default_native_price: Uint256,
    pub default_gas_price: Uint256,
    pub gas_per_byte: Uint256,
    pub ack_gas_cost: Uint256,
    pub timelock_cost: Uint256,
}
