use cosmwasm_std::{Addr, Binary, DepsMut, Env, Uint256};

use crate::{
    payload::{AmbMessage, InitSingleVaultData, TimelockPayload},
    AddressId, Role, SuperformId,
};

/// Roles, well-known addresses and protocol configuration.
pub trait Directory {
    /// The id of the chain this ledger runs on.
    fn chain_id(&self) -> u64;

    fn address(&self, id: AddressId) -> Option<Addr>;

    fn has_role(&self, role: Role, account: &Addr) -> bool;

    /// The registry id assigned to the state registry deployed at `registry`.
    fn state_registry_id(&self, registry: &Addr) -> Option<u8>;

    /// Number of distinct AMBs that must deliver a message from `src_chain_id`.
    fn required_quorum(&self, src_chain_id: u64) -> Option<u32>;

    /// Length of the failed deposit rescue dispute window, in seconds.
    fn rescue_delay(&self) -> u64;
}

/// Token balances and transfers.  `registry_bindings::ids::NATIVE_TOKEN` designates the native
/// currency.
pub trait Ledger {
    fn balance(&self, token: &Addr, holder: &Addr) -> Uint256;

    fn transfer(&self, token: &Addr, from: &Addr, to: &Addr, amount: Uint256)
        -> anyhow::Result<()>;
}

/// The vault adapter capability.
///
/// Calls that hand control to the vault receive the caller's storage and the `Host` so that the
/// vault may call back into the registry, as a contract on a shared ledger can.
pub trait Form {
    fn vault_asset(&self) -> Addr;

    fn state_registry_id(&self) -> u8;

    /// Returns the amount of vault asset `shares` currently redeem for.
    fn preview_redeem_from(&self, shares: Uint256) -> Uint256;

    /// Deposits `data.vault.amount` of the vault asset, already transferred to the form, and
    /// returns the number of shares minted.
    fn xchain_deposit_into_vault(
        &self,
        deps: DepsMut,
        env: &Env,
        host: &dyn Host,
        data: &InitSingleVaultData,
        src_sender: &Addr,
        src_chain_id: u64,
    ) -> anyhow::Result<Uint256>;

    fn xchain_withdraw_from_vault(
        &self,
        deps: DepsMut,
        env: &Env,
        host: &dyn Host,
        data: &InitSingleVaultData,
        src_sender: &Addr,
        src_chain_id: u64,
    ) -> anyhow::Result<()>;

    fn withdraw_after_cool_down(
        &self,
        deps: DepsMut,
        env: &Env,
        host: &dyn Host,
        amount: Uint256,
        payload: &TimelockPayload,
    ) -> anyhow::Result<()>;
}

/// A call handed to a liquidity bridge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BridgeCall {
    pub caller: Addr,
    pub tx_data: Binary,
    pub token: Addr,
    pub amount: Uint256,
    pub native_amount: Uint256,
}

pub trait LiquidityBridge {
    fn dispatch(
        &self,
        deps: DepsMut,
        env: &Env,
        host: &dyn Host,
        call: &BridgeCall,
    ) -> anyhow::Result<()>;
}

/// An arbitrary message bridge transport.
pub trait Amb {
    fn estimate_fees(
        &self,
        dst_chain_id: u64,
        message: &[u8],
        extra_data: &Binary,
    ) -> anyhow::Result<Uint256>;

    /// Encodes a destination gas limit into the transport's extra data.
    fn generate_extra_data(&self, gas_limit: Uint256) -> Binary;

    fn dispatch_payload(
        &self,
        sender: &Addr,
        dst_chain_id: u64,
        fee: Uint256,
        message: &Binary,
        extra_data: &Binary,
    ) -> anyhow::Result<()>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PriceRound {
    // Price with 8 decimals.  Oracles may report non-positive values.
    pub price: i128,
    // Unix time of the round.  Zero marks an incomplete round.
    pub updated_at: u64,
}

pub trait PriceFeed {
    fn latest_round(&self) -> anyhow::Result<PriceRound>;
}

/// The component issuing position claims to users.
pub trait PositionIssuer {
    fn mint_single(&self, to: &Addr, id: &SuperformId, amount: Uint256) -> anyhow::Result<()>;

    /// Reconciles balances with an acknowledgement received from another chain.
    fn state_sync(&self, message: &AmbMessage) -> anyhow::Result<()>;
}

/// Arguments for `BridgeValidator::validate_tx_data`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationArgs {
    pub tx_data: Binary,
    pub src_chain_id: u64,
    // The chain of the vault the liquidity is destined for.
    pub dst_chain_id: u64,
    // The chain the bridge must deliver to.
    pub liq_dst_chain_id: u64,
    pub deposit: bool,
    pub sender: Addr,
    pub receiver: Addr,
    // The token the route must pull from the caller.
    pub token: Addr,
    // The token the bridge must output when a destination swap follows.
    pub interim_token: Option<Addr>,
    // The token a same-chain swap must output.
    pub output_token: Option<Addr>,
}

/// Decodes and validates one liquidity bridge's call data.
pub trait BridgeValidator {
    fn validate_tx_data(&self, args: &ValidationArgs) -> anyhow::Result<()>;

    /// Returns the token and amount a destination swap pulls from the caller.
    fn decode_dst_swap(&self, tx_data: &[u8]) -> anyhow::Result<(Addr, Uint256)>;

    fn decode_swap_output_token(&self, tx_data: &[u8]) -> anyhow::Result<Addr>;

    /// Returns the amount the bridge pulls from the caller.  Deposits must bridge, so a
    /// swap-only route is rejected when `deposit` is set.
    fn decode_amount_in(&self, tx_data: &[u8], deposit: bool) -> anyhow::Result<Uint256>;

    fn validate_receiver(&self, tx_data: &[u8], receiver: &Addr) -> bool;
}

/// Resolves collaborators by id or address.
pub trait Host {
    fn directory(&self) -> &dyn Directory;

    fn ledger(&self) -> &dyn Ledger;

    fn positions(&self) -> &dyn PositionIssuer;

    fn form(&self, superform: &Addr) -> Option<&dyn Form>;

    fn bridge_validator(&self, bridge_id: u8) -> Option<&dyn BridgeValidator>;

    fn liquidity_bridge(&self, bridge_id: u8) -> Option<&dyn LiquidityBridge>;

    fn amb(&self, amb_id: u8) -> Option<&dyn Amb>;

    fn price_feed(&self, oracle: &Addr) -> Option<&dyn PriceFeed>;
}
