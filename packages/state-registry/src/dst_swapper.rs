use anyhow::{ensure, Context};
use cosmwasm_std::{Addr, Deps, DepsMut, Env, Event, MessageInfo, StdResult, Storage, Uint256};
use registry_bindings::{
    ids::is_native,
    payload::{TransactionType, VaultRequest},
    AddressId, BridgeCall, Host, Role, ValidationArgs,
};

use crate::{
    access::{address, ensure_role},
    core,
    msg::{FailedSwapUpdate, SwapRequest},
    slippage,
    state::{
        swap::{FAILED_SWAPS, SWAPPED_AMOUNTS, SWAP_GUARD},
        FailedSwap, PayloadState,
    },
    ContractError,
};

/// Swaps the interim token of one vault of a single vault deposit payload into the vault asset.
pub fn process_tx(
    deps: DepsMut,
    env: &Env,
    info: &MessageInfo,
    host: &dyn Host,
    payload_id: u64,
    swap: &SwapRequest,
) -> anyhow::Result<Event> {
    ensure_role(host, Role::DstSwapper, &info.sender)?;

    non_reentrant(deps, |deps| {
        process_swap(deps, env, host, payload_id, false, swap)
    })
}

/// Swaps the interim tokens of several vaults of a multi vault deposit payload.  Fails as a whole
/// if any swap fails.
pub fn batch_process_tx(
    deps: DepsMut,
    env: &Env,
    info: &MessageInfo,
    host: &dyn Host,
    payload_id: u64,
    swaps: &[SwapRequest],
) -> anyhow::Result<Vec<Event>> {
    ensure_role(host, Role::DstSwapper, &info.sender)?;
    ensure!(!swaps.is_empty(), ContractError::ArrayLengthMismatch);

    non_reentrant(deps, |mut deps| {
        swaps
            .iter()
            .map(|swap| process_swap(deps.branch(), env, host, payload_id, true, swap))
            .collect()
    })
}

fn non_reentrant<T>(
    mut deps: DepsMut,
    f: impl FnOnce(DepsMut) -> anyhow::Result<T>,
) -> anyhow::Result<T> {
    let entered = SWAP_GUARD
        .may_load(deps.storage)
        .context("failed to load swap guard")?
        .unwrap_or(false);
    ensure!(!entered, ContractError::Reentrancy);

    SWAP_GUARD
        .save(deps.storage, &true)
        .context("failed to set swap guard")?;
    let res = f(deps.branch());
    SWAP_GUARD.remove(deps.storage);

    res
}

/// Loads the vault at `index` of a stored deposit payload that asked for a destination swap.
fn swap_vault(
    storage: &dyn Storage,
    payload_id: u64,
    multi: bool,
    index: u32,
) -> anyhow::Result<VaultRequest> {
    let (header, state, data) = core::load_init_payload(storage, payload_id)?;
    ensure!(
        header.tx_type == TransactionType::Deposit && header.multi == multi,
        ContractError::InvalidPayloadType
    );
    ensure!(
        state == PayloadState::Stored,
        ContractError::InvalidPayloadStatus
    );

    let vault = usize::try_from(index)
        .ok()
        .and_then(|i| data.vaults.into_iter().nth(i))
        .ok_or(ContractError::InvalidIndex(index))?;
    ensure!(vault.has_dst_swap, ContractError::InvalidIndex(index));

    Ok(vault)
}

fn process_swap(
    mut deps: DepsMut,
    env: &Env,
    host: &dyn Host,
    payload_id: u64,
    multi: bool,
    swap: &SwapRequest,
) -> anyhow::Result<Event> {
    let index = swap.index;
    let vault = swap_vault(deps.storage, payload_id, multi, index)?;

    let key = (payload_id, index);
    ensure!(
        !SWAPPED_AMOUNTS.has(deps.storage, key),
        ContractError::DstSwapAlreadyProcessed
    );
    ensure!(
        !FAILED_SWAPS.has(deps.storage, key),
        ContractError::DstSwapAlreadyFailed
    );

    let validator = host
        .bridge_validator(swap.bridge_id)
        .ok_or(ContractError::InvalidBridgeId(swap.bridge_id))?;
    let bridge = host
        .liquidity_bridge(swap.bridge_id)
        .ok_or(ContractError::InvalidBridgeId(swap.bridge_id))?;

    let (approval_token, amount) = validator.decode_dst_swap(&swap.tx_data)?;
    ensure!(
        vault.liq_request.interim_token.as_ref() == Some(&approval_token),
        ContractError::InvalidInterimToken
    );

    let superform = vault.superform_id.superform();
    let underlying = host
        .form(superform)
        .ok_or_else(|| ContractError::InvalidSuperform(superform.to_string()))?
        .vault_asset();

    let chain_id = host.directory().chain_id();
    let swapper = address(host, AddressId::DstSwapper)?;
    let core = address(host, AddressId::CoreStateRegistry)?;

    validator.validate_tx_data(&ValidationArgs {
        tx_data: swap.tx_data.clone(),
        src_chain_id: chain_id,
        dst_chain_id: chain_id,
        liq_dst_chain_id: chain_id,
        deposit: true,
        sender: swapper.clone(),
        receiver: core.clone(),
        token: approval_token.clone(),
        interim_token: None,
        output_token: Some(underlying.clone()),
    })?;

    let balance_before = host.ledger().balance(&underlying, &core);

    let native_amount = if is_native(&approval_token) {
        amount
    } else {
        Uint256::zero()
    };
    bridge
        .dispatch(
            deps.branch(),
            env,
            host,
            &BridgeCall {
                caller: swapper,
                tx_data: swap.tx_data.clone(),
                token: approval_token,
                amount,
                native_amount,
            },
        )
        .context("failed to dispatch destination swap")?;

    let balance_after = host.ledger().balance(&underlying, &core);
    ensure!(
        balance_after > balance_before,
        ContractError::InvalidSwapOutput
    );

    let realized = balance_after.checked_sub(balance_before)?;
    ensure!(
        realized >= slippage::floor(vault.amount, vault.max_slippage)?,
        ContractError::SlippageOutOfBounds
    );

    SWAPPED_AMOUNTS
        .save(deps.storage, key, &realized)
        .context("failed to save swapped amount")?;

    Ok(Event::new("SwapProcessed")
        .add_attribute("payload_id", payload_id.to_string())
        .add_attribute("index", index.to_string())
        .add_attribute("bridge_id", swap.bridge_id.to_string())
        .add_attribute("amount_in", amount.to_string())
        .add_attribute("amount_out", realized.to_string()))
}

/// Records that the destination swap of one vault of a single vault payload could not be done.
/// The interim tokens stay with the swapper until the failed deposit is rescued.
pub fn update_failed_tx(
    deps: DepsMut,
    info: &MessageInfo,
    host: &dyn Host,
    payload_id: u64,
    update: &FailedSwapUpdate,
) -> anyhow::Result<Event> {
    ensure_role(host, Role::DstSwapper, &info.sender)?;
    record_failed_swap(deps, host, payload_id, false, update)
}

pub fn batch_update_failed_tx(
    mut deps: DepsMut,
    info: &MessageInfo,
    host: &dyn Host,
    payload_id: u64,
    updates: &[FailedSwapUpdate],
) -> anyhow::Result<Vec<Event>> {
    ensure_role(host, Role::DstSwapper, &info.sender)?;
    ensure!(!updates.is_empty(), ContractError::ArrayLengthMismatch);

    updates
        .iter()
        .map(|u| record_failed_swap(deps.branch(), host, payload_id, true, u))
        .collect()
}

fn record_failed_swap(
    deps: DepsMut,
    host: &dyn Host,
    payload_id: u64,
    multi: bool,
    update: &FailedSwapUpdate,
) -> anyhow::Result<Event> {
    let index = update.index;
    let vault = swap_vault(deps.storage, payload_id, multi, index)?;
    ensure!(
        vault.liq_request.interim_token.as_ref() == Some(&update.interim_token),
        ContractError::InvalidInterimToken
    );

    let key = (payload_id, index);
    ensure!(
        !FAILED_SWAPS.has(deps.storage, key),
        ContractError::FailedDstSwapAlreadyUpdated
    );
    ensure!(
        !SWAPPED_AMOUNTS.has(deps.storage, key),
        ContractError::DstSwapAlreadyProcessed
    );
    ensure!(!update.amount.is_zero(), ContractError::ZeroAmount);

    let swapper = address(host, AddressId::DstSwapper)?;
    ensure!(
        host.ledger().balance(&update.interim_token, &swapper) >= update.amount,
        ContractError::InsufficientBalance
    );

    let failed = FailedSwap {
        token: update.interim_token.clone(),
        amount: update.amount,
    };
    FAILED_SWAPS
        .save(deps.storage, key, &failed)
        .context("failed to save failed swap")?;

    Ok(Event::new("SwapFailed")
        .add_attribute("payload_id", payload_id.to_string())
        .add_attribute("index", index.to_string())
        .add_attribute("interim_token", failed.token)
        .add_attribute("amount", failed.amount.to_string()))
}

/// Pays a failed swap's interim tokens out to `user`.  Only the core registry may call this, as
/// part of finalizing a rescue.
pub fn process_failed_tx(
    info: &MessageInfo,
    host: &dyn Host,
    user: &Addr,
    token: &Addr,
    amount: Uint256,
) -> anyhow::Result<Event> {
    let core = address(host, AddressId::CoreStateRegistry)?;
    ensure!(info.sender == core, ContractError::NotCoreStateRegistry);
    ensure!(!user.as_str().is_empty(), ContractError::ZeroAddress);

    let swapper = address(host, AddressId::DstSwapper)?;
    let res = host.ledger().transfer(token, &swapper, user, amount);
    if is_native(token) {
        res.map_err(|e| e.context(ContractError::FailedToSendNative))?;
    } else {
        res.context("failed to transfer failed swap tokens")?;
    }

    Ok(Event::new("FailedTxProcessed")
        .add_attribute("user", user.as_str())
        .add_attribute("token", token.as_str())
        .add_attribute("amount", amount.to_string()))
}

pub(crate) fn swapped_amount(
    storage: &dyn Storage,
    payload_id: u64,
    index: u32,
) -> anyhow::Result<Uint256> {
    SWAPPED_AMOUNTS
        .may_load(storage, (payload_id, index))
        .map(Option::unwrap_or_default)
        .context("failed to load swapped amount")
}

pub(crate) fn failed_swap(
    storage: &dyn Storage,
    payload_id: u64,
    index: u32,
) -> anyhow::Result<Option<FailedSwap>> {
    FAILED_SWAPS
        .may_load(storage, (payload_id, index))
        .context("failed to load failed swap")
}

pub fn query_swapped_amount(deps: Deps, payload_id: u64, index: u32) -> StdResult<Uint256> {
    SWAPPED_AMOUNTS
        .may_load(deps.storage, (payload_id, index))
        .map(Option::unwrap_or_default)
}

/// Returns the interim token and amount recorded for a failed destination swap, if any.
pub fn query_post_dst_swap_failure_updated_token_amount(
    deps: Deps,
    payload_id: u64,
    index: u32,
) -> StdResult<Option<FailedSwap>> {
    FAILED_SWAPS.may_load(deps.storage, (payload_id, index))
}

#[cfg(test)]
mod test {
    use super::*;

    use cosmwasm_std::testing::{mock_dependencies, mock_env, mock_info};
    use registry_bindings::fake::{BankKeeper, DirectoryKeeper, HostKeeper, PositionKeeper};

    fn host(bank: BankKeeper) -> HostKeeper {
        let directory = DirectoryKeeper::new(1);
        directory.set_address(AddressId::CoreStateRegistry, &Addr::unchecked("core"));
        directory.set_address(AddressId::DstSwapper, &Addr::unchecked("swapper"));
        directory.grant_role(Role::DstSwapper, &Addr::unchecked("keeper"));
        HostKeeper::new(directory, bank, PositionKeeper::new())
    }

    #[test]
    fn failed_tx_requires_core_registry() {
        let bank = BankKeeper::new();
        let host = host(bank.clone());
        let token = Addr::unchecked("usdc");
        bank.mint(&token, &Addr::unchecked("swapper"), Uint256::from(10u128));

        let err = process_failed_tx(
            &mock_info("keeper", &[]),
            &host,
            &Addr::unchecked("user"),
            &token,
            Uint256::from(10u128),
        )
        .unwrap_err();
        assert_eq!(
            Some(&ContractError::NotCoreStateRegistry),
            err.downcast_ref::<ContractError>()
        );

        let err = process_failed_tx(
            &mock_info("core", &[]),
            &host,
            &Addr::unchecked(""),
            &token,
            Uint256::from(10u128),
        )
        .unwrap_err();
        assert_eq!(
            Some(&ContractError::ZeroAddress),
            err.downcast_ref::<ContractError>()
        );
    }

    #[test]
    fn rejected_native_refund() {
        let bank = BankKeeper::new();
        let host = host(bank.clone());
        let native = registry_bindings::ids::native_token();
        bank.mint(&native, &Addr::unchecked("swapper"), Uint256::from(10u128));
        bank.reject_native_transfers(true);

        let err = process_failed_tx(
            &mock_info("core", &[]),
            &host,
            &Addr::unchecked("user"),
            &native,
            Uint256::from(10u128),
        )
        .unwrap_err();
        assert_eq!(
            Some(&ContractError::FailedToSendNative),
            err.downcast_ref::<ContractError>()
        );
    }

    #[test]
    fn guard_rejects_nested_calls() {
        let bank = BankKeeper::new();
        let host = host(bank);
        let mut deps = mock_dependencies();
        SWAP_GUARD.save(deps.as_mut().storage, &true).unwrap();

        let swap = SwapRequest {
            index: 0,
            bridge_id: 1,
            tx_data: Default::default(),
        };
        let err = process_tx(
            deps.as_mut(),
            &mock_env(),
            &mock_info("keeper", &[]),
            &host,
            1,
            &swap,
        )
        .unwrap_err();
        assert_eq!(
            Some(&ContractError::Reentrancy),
            err.downcast_ref::<ContractError>()
        );
    }

    #[test]
    fn guard_is_released_after_failure() {
        let bank = BankKeeper::new();
        let host = host(bank);
        let mut deps = mock_dependencies();

        let swap = SwapRequest {
            index: 0,
            bridge_id: 1,
            tx_data: Default::default(),
        };
        for _ in 0..2 {
            let err = process_tx(
                deps.as_mut(),
                &mock_env(),
                &mock_info("keeper", &[]),
                &host,
                1,
                &swap,
            )
            .unwrap_err();
            assert_eq!(
                Some(&ContractError::InvalidPayloadId(1)),
                err.downcast_ref::<ContractError>()
            );
        }
        assert!(!SWAP_GUARD.exists(deps.as_ref().storage));
    }
}
