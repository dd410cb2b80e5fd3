use cosmwasm_schema::cw_serde;
use cosmwasm_std::{Addr, Uint256};
use cw_storage_plus::{Item, Map};

// Keyed by (payload id, vault index).
pub const SWAPPED_AMOUNTS: Map<(u64, u32), Uint256> = Map::new("dst_swapper/swapped_amounts");

pub const FAILED_SWAPS: Map<(u64, u32), FailedSwap> = Map::new("dst_swapper/failed_swaps");

// Set while a swap dispatch is in flight.
pub const SWAP_GUARD: Item<bool> = Item::new("dst_swapper/guard");

/// Interim tokens left with the dst swapper after a swap could not be completed.
#[cw_serde]
pub struct FailedSwap {
    pub token: Addr,
    pub amount: Uint256,
}
