use cosmwasm_schema::cw_serde;
use cosmwasm_std::{Addr, Binary, OverflowError, Timestamp, Uint256};
use registry_bindings::payload::{
    AmbExtraData, InitMultiVaultData, InitSingleVaultData, RequestKind, VaultRequest,
};

/// A single vault instruction as submitted to a router, before a payload id is assigned.
#[cw_serde]
pub struct SingleVaultData {
    pub vault: VaultRequest,
    pub receiver: Addr,
}

#[cw_serde]
pub struct MultiVaultData {
    pub vaults: Vec<VaultRequest>,
    pub receiver: Addr,
}

impl From<&SingleVaultData> for InitMultiVaultData {
    fn from(d: &SingleVaultData) -> Self {
        InitSingleVaultData {
            payload_id: 0,
            vault: d.vault.clone(),
            receiver: d.receiver.clone(),
        }
        .into()
    }
}

impl From<&MultiVaultData> for InitMultiVaultData {
    fn from(d: &MultiVaultData) -> Self {
        InitMultiVaultData {
            payload_id: 0,
            vaults: d.vaults.clone(),
            receiver: d.receiver.clone(),
        }
    }
}

#[cw_serde]
pub struct MultiDstMultiVaultRequest {
    pub amb_ids: Vec<Vec<u8>>,
    pub dst_chain_ids: Vec<u64>,
    pub data: Vec<MultiVaultData>,
}

#[cw_serde]
pub struct MultiDstSingleVaultRequest {
    pub amb_ids: Vec<Vec<u8>>,
    pub dst_chain_ids: Vec<u64>,
    pub data: Vec<SingleVaultData>,
}

#[cw_serde]
pub struct SingleXChainMultiVaultRequest {
    pub amb_ids: Vec<u8>,
    pub dst_chain_id: u64,
    pub data: MultiVaultData,
}

#[cw_serde]
pub struct SingleXChainSingleVaultRequest {
    pub amb_ids: Vec<u8>,
    pub dst_chain_id: u64,
    pub data: SingleVaultData,
}

#[cw_serde]
pub struct SingleDirectSingleVaultRequest {
    pub data: SingleVaultData,
}

#[cw_serde]
pub struct SingleDirectMultiVaultRequest {
    pub data: MultiVaultData,
}

/// Native value a caller must attach, split by purpose.
#[cw_serde]
#[derive(Default, Copy)]
pub struct FeeEstimate {
    // Native value forwarded to liquidity bridges.
    pub liq_amount: Uint256,
    // Messaging fees plus acknowledgement processing on this chain.
    pub src_amount: Uint256,
    // Destination gas converted to this chain's native currency.
    pub dst_amount: Uint256,
    pub total_amount: Uint256,
}

impl FeeEstimate {
    pub fn checked_add(self, other: FeeEstimate) -> Result<FeeEstimate, OverflowError> {
        Ok(FeeEstimate {
            liq_amount: self.liq_amount.checked_add(other.liq_amount)?,
            src_amount: self.src_amount.checked_add(other.src_amount)?,
            dst_amount: self.dst_amount.checked_add(other.dst_amount)?,
            total_amount: self.total_amount.checked_add(other.total_amount)?,
        })
    }
}

/// One destination swap of a payload.
#[cw_serde]
pub struct SwapRequest {
    pub index: u32,
    pub bridge_id: u8,
    pub tx_data: Binary,
}

/// Marks the destination swap of one vault as failed.
#[cw_serde]
pub struct FailedSwapUpdate {
    pub index: u32,
    pub interim_token: Addr,
    pub amount: Uint256,
}

/// A withdrawal a timelocked form hands to the two-step registry.
#[cw_serde]
pub struct TimelockRequest {
    pub kind: RequestKind,
    pub src_sender: Addr,
    pub src_chain_id: u64,
    pub locked_till: Timestamp,
    pub data: InitSingleVaultData,
}

/// AMBs used to acknowledge a failed timelocked withdrawal back to the source chain.  Fees are
/// estimated when `extra_data` is absent.
#[cw_serde]
pub struct AmbOverride {
    pub amb_ids: Vec<u8>,
    pub extra_data: Option<AmbExtraData>,
}
