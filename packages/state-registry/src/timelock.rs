use anyhow::{ensure, Context};
use cosmwasm_std::{Binary, Deps, DepsMut, Env, Event, MessageInfo, StdResult};
use registry_bindings::{
    ids::CORE_STATE_REGISTRY_ID,
    payload::{
        CallbackType, PayloadHeader, RequestKind, ReturnMultiData, TimelockPayload,
        TimelockStatus, TransactionType,
    },
    AddressId, Host, Role, ValidationArgs,
};

use crate::{
    access::{address, ensure_role},
    core,
    msg::{AmbOverride, TimelockRequest},
    payment, slippage,
    state::timelock::{TIMELOCK_PAYLOADS, TIMELOCK_PAYLOAD_COUNTER},
    ContractError,
};

/// Stores a withdrawal handed over by a timelocked form until its cooldown ends.  Only the form
/// named by the request may call this, and only if it is registered with this registry.
pub fn receive_payload(
    deps: DepsMut,
    info: &MessageInfo,
    host: &dyn Host,
    request: TimelockRequest,
) -> anyhow::Result<Event> {
    let superform = request.data.vault.superform_id.superform();
    ensure!(info.sender == *superform, ContractError::NotSuperform);

    let form = host
        .form(superform)
        .ok_or_else(|| ContractError::InvalidSuperform(superform.to_string()))?;
    let registry = address(host, AddressId::TimelockStateRegistry)?;
    let registry_id = host
        .directory()
        .state_registry_id(&registry)
        .ok_or(ContractError::InvalidRegistryId)?;
    ensure!(
        form.state_registry_id() == registry_id,
        ContractError::NotTwoStepSuperform
    );

    let id = TIMELOCK_PAYLOAD_COUNTER
        .may_load(deps.storage)
        .context("failed to load timelock payload counter")?
        .unwrap_or(0)
        .checked_add(1)
        .context("timelock payload id overflow")?;

    let payload = TimelockPayload {
        kind: request.kind,
        src_sender: request.src_sender,
        src_chain_id: request.src_chain_id,
        locked_till: request.locked_till,
        data: request.data,
        status: TimelockStatus::Pending,
    };

    TIMELOCK_PAYLOAD_COUNTER
        .save(deps.storage, &id)
        .context("failed to save timelock payload counter")?;
    TIMELOCK_PAYLOADS
        .save(deps.storage, id, &payload)
        .context("failed to save timelock payload")?;

    Ok(Event::new("TimelockPayloadReceived")
        .add_attribute("timelock_payload_id", id.to_string())
        .add_attribute("superform_id", payload.data.vault.superform_id.to_string())
        .add_attribute("locked_till", payload.locked_till.seconds().to_string()))
}

/// Completes a timelocked withdrawal after its lock has expired.
///
/// A non-empty `tx_data` replaces the liquidity tx data of the withdrawal after validation.  If
/// the vault rejects the withdrawal the user's position is restored: re-minted directly for a
/// same-chain request, or through a FAIL acknowledgement over `amb_override` for a cross-chain
/// one.  The payload is removed either way.
pub fn finalize_payload(
    mut deps: DepsMut,
    env: &Env,
    info: &MessageInfo,
    host: &dyn Host,
    timelock_payload_id: u64,
    tx_data: Binary,
    amb_override: Option<AmbOverride>,
) -> anyhow::Result<Event> {
    ensure_role(host, Role::TimelockStateRegistryProcessor, &info.sender)?;

    let count = TIMELOCK_PAYLOAD_COUNTER
        .may_load(deps.storage)
        .context("failed to load timelock payload counter")?
        .unwrap_or(0);
    ensure!(
        timelock_payload_id != 0 && timelock_payload_id <= count,
        ContractError::InvalidPayloadId(timelock_payload_id)
    );

    // Finalized payloads are removed.
    let mut payload = TIMELOCK_PAYLOADS
        .may_load(deps.storage, timelock_payload_id)
        .context("failed to load timelock payload")?
        .ok_or(ContractError::InvalidPayloadStatus)?;
    ensure!(
        payload.status == TimelockStatus::Pending,
        ContractError::InvalidPayloadStatus
    );
    ensure!(
        env.block.time >= payload.locked_till,
        ContractError::Locked
    );

    payload.status = TimelockStatus::Processed;
    TIMELOCK_PAYLOADS
        .save(deps.storage, timelock_payload_id, &payload)
        .context("failed to save timelock payload")?;

    let superform = payload.data.vault.superform_id.superform().clone();
    let form = host
        .form(&superform)
        .ok_or_else(|| ContractError::InvalidSuperform(superform.to_string()))?;

    if !tx_data.is_empty() {
        let vault = &payload.data.vault;
        let bridge_id = vault.liq_request.bridge_id;
        let validator = host
            .bridge_validator(bridge_id)
            .ok_or(ContractError::InvalidBridgeId(bridge_id))?;
        validator.validate_tx_data(&ValidationArgs {
            tx_data: tx_data.clone(),
            src_chain_id: host.directory().chain_id(),
            dst_chain_id: payload.src_chain_id,
            liq_dst_chain_id: vault.liq_request.liq_dst_chain_id,
            deposit: false,
            sender: superform.clone(),
            receiver: payload.data.receiver.clone(),
            token: vault.liq_request.token.clone(),
            interim_token: None,
            output_token: None,
        })?;

        let amount_in = validator.decode_amount_in(&tx_data, false)?;
        ensure!(
            slippage::within(
                amount_in,
                form.preview_redeem_from(vault.amount),
                vault.max_slippage
            )?,
            ContractError::SlippageOutOfBounds
        );

        payload.data.vault.liq_request.tx_data = tx_data;
        TIMELOCK_PAYLOADS
            .save(deps.storage, timelock_payload_id, &payload)
            .context("failed to save timelock payload")?;
    }

    let amount = payload.data.vault.amount;
    let evt = match form.withdraw_after_cool_down(deps.branch(), env, host, amount, &payload) {
        Ok(()) => Event::new("TimelockPayloadFinalized")
            .add_attribute("timelock_payload_id", timelock_payload_id.to_string())
            .add_attribute("amount", amount.to_string()),
        Err(e) => {
            let compensation = compensate(deps.as_ref(), host, &payload, amb_override)?;
            Event::new("FailedWithdrawCompensated")
                .add_attribute("timelock_payload_id", timelock_payload_id.to_string())
                .add_attribute("amount", amount.to_string())
                .add_attribute("compensation", compensation)
                .add_attribute("error", format!("{e:#}"))
        }
    };

    TIMELOCK_PAYLOADS.remove(deps.storage, timelock_payload_id);

    Ok(evt)
}

fn compensate(
    deps: Deps,
    host: &dyn Host,
    payload: &TimelockPayload,
    amb_override: Option<AmbOverride>,
) -> anyhow::Result<&'static str> {
    let superform_id = &payload.data.vault.superform_id;
    let amount = payload.data.vault.amount;

    match payload.kind {
        RequestKind::Direct => {
            host.positions()
                .mint_single(&payload.src_sender, superform_id, amount)
                .context("failed to re-mint position")?;
            Ok("reminted")
        }
        RequestKind::CrossChain => {
            let AmbOverride {
                amb_ids,
                extra_data,
            } = amb_override.ok_or(ContractError::NoAmbSelected)?;

            let message = core::acknowledgement(
                PayloadHeader {
                    tx_type: TransactionType::Withdraw,
                    callback: CallbackType::Fail,
                    multi: false,
                    registry_id: CORE_STATE_REGISTRY_ID,
                    src_sender: payload.src_sender.clone(),
                    src_chain_id: host.directory().chain_id(),
                },
                amb_ids.clone(),
                &ReturnMultiData {
                    payload_id: payload.data.payload_id,
                    superform_ids: vec![superform_id.clone()],
                    amounts: vec![amount],
                },
            )?;

            let extra = match extra_data {
                Some(extra) => extra,
                None => {
                    payment::calculate_amb_data(
                        deps,
                        host,
                        payload.src_chain_id,
                        &amb_ids,
                        &message,
                    )?
                    .1
                }
            };
            let sender = address(host, AddressId::TimelockStateRegistry)?;
            core::dispatch_message(
                host,
                &sender,
                &amb_ids,
                payload.src_chain_id,
                &message,
                &extra,
            )?;
            Ok("acknowledged")
        }
    }
}

pub fn query_timelock_payload_counter(deps: Deps) -> StdResult<u64> {
    TIMELOCK_PAYLOAD_COUNTER
        .may_load(deps.storage)
        .map(Option::unwrap_or_default)
}

pub fn query_timelock_payload(deps: Deps, id: u64) -> StdResult<Option<TimelockPayload>> {
    TIMELOCK_PAYLOADS.may_load(deps.storage, id)
}
