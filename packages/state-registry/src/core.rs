use anyhow::{ensure, Context};
use cosmwasm_std::{
    from_json, Addr, Binary, Deps, DepsMut, Env, Event, MessageInfo, StdResult, Storage, Uint256,
};
use registry_bindings::{
    ids::CORE_STATE_REGISTRY_ID,
    payload::{
        AmbExtraData, AmbMessage, CallbackType, InitMultiVaultData, PayloadHeader,
        ReturnMultiData, TransactionType,
    },
    AddressId, Form, Host, Role, ValidationArgs,
};

use crate::{
    access::{address, ensure_role},
    dst_swapper, payment, slippage,
    state::{
        payload::{
            FAILED_DEPOSITS, MESSAGE_QUORUM, PAYLOADS_COUNT, PAYLOAD_AMBS, PAYLOAD_BODIES,
            PAYLOAD_BY_HASH, PAYLOAD_HEADERS, PAYLOAD_PROOFS, PAYLOAD_TRACKING,
        },
        Deliveries, FailedDeposit, FailedDepositEntry, PayloadState,
    },
    ContractError,
};

/// Records a message delivered by the AMB with id `amb_id`.
///
/// A full payload is stored under a new payload id the first time it arrives; a repeated
/// delivery of the same payload only counts towards its quorum.  A proof only counts towards the
/// quorum of the payload it hashes to, which may arrive before or after it.
pub fn receive_payload(
    deps: DepsMut,
    info: &MessageInfo,
    host: &dyn Host,
    src_chain_id: u64,
    amb_id: u8,
    message: &Binary,
) -> anyhow::Result<Event> {
    ensure!(
        amb_id <= Deliveries::MAX_AMB_ID,
        ContractError::InvalidAmbId(amb_id)
    );
    let amb = host
        .directory()
        .address(AddressId::AmbImplementation(amb_id))
        .ok_or(ContractError::InvalidAmbId(amb_id))?;
    ensure!(info.sender == amb, ContractError::NotAmbImplementation);

    let message: AmbMessage = from_json(message).context(ContractError::DecodePayload)?;
    match &message {
        AmbMessage::Payload { header, .. } => {
            ensure!(
                header.src_chain_id == src_chain_id,
                ContractError::InvalidChainId
            );
            ensure!(
                header.registry_id == CORE_STATE_REGISTRY_ID,
                ContractError::InvalidRegistryId
            );
        }
        AmbMessage::Proof { proof } => ensure!(proof.len() == 32, ContractError::InvalidProof),
    }

    let hash = message.message_hash()?;
    let mut deliveries = MESSAGE_QUORUM
        .may_load(deps.storage, &hash)
        .context("failed to load message quorum")?
        .unwrap_or_default();
    deliveries.add_delivery(amb_id)?;
    MESSAGE_QUORUM
        .save(deps.storage, &hash, &deliveries)
        .context("failed to save message quorum")?;

    let (header, amb_ids, body) = match message {
        AmbMessage::Proof { proof } => {
            return Ok(Event::new("ProofReceived")
                .add_attribute("src_chain_id", src_chain_id.to_string())
                .add_attribute("amb_id", amb_id.to_string())
                .add_attribute("proof", hex::encode(proof.as_slice()))
                .add_attribute("deliveries", deliveries.num_deliveries().to_string()));
        }
        AmbMessage::Payload {
            header,
            amb_ids,
            body,
        } => (header, amb_ids, body),
    };

    let evt = Event::new("PayloadReceived")
        .add_attribute("src_chain_id", src_chain_id.to_string())
        .add_attribute("amb_id", amb_id.to_string())
        .add_attribute("deliveries", deliveries.num_deliveries().to_string());

    if let Some(payload_id) = PAYLOAD_BY_HASH
        .may_load(deps.storage, &hash)
        .context("failed to look up payload by hash")?
    {
        return Ok(evt
            .add_attribute("payload_id", payload_id.to_string())
            .add_attribute("duplicate", "true"));
    }

    let payload_id = PAYLOADS_COUNT
        .may_load(deps.storage)
        .context("failed to load payloads count")?
        .unwrap_or(0)
        .checked_add(1)
        .context("payload id overflow")?;

    PAYLOADS_COUNT
        .save(deps.storage, &payload_id)
        .context("failed to save payloads count")?;
    PAYLOAD_HEADERS
        .save(deps.storage, payload_id, &header)
        .context("failed to save payload header")?;
    PAYLOAD_BODIES
        .save(deps.storage, payload_id, &body)
        .context("failed to save payload body")?;
    PAYLOAD_TRACKING
        .save(deps.storage, payload_id, &PayloadState::Stored)
        .context("failed to save payload state")?;
    PAYLOAD_AMBS
        .save(deps.storage, payload_id, &amb_ids)
        .context("failed to save payload ambs")?;
    PAYLOAD_PROOFS
        .save(deps.storage, payload_id, &Binary::from(hash.to_vec()))
        .context("failed to save payload proof")?;
    PAYLOAD_BY_HASH
        .save(deps.storage, &hash, &payload_id)
        .context("failed to index payload by hash")?;

    Ok(evt
        .add_attribute("payload_id", payload_id.to_string())
        .add_attribute("tx_type", header.tx_type.to_string())
        .add_attribute("callback", header.callback.to_string()))
}

fn load_header(storage: &dyn Storage, payload_id: u64) -> anyhow::Result<PayloadHeader> {
    let count = PAYLOADS_COUNT
        .may_load(storage)
        .context("failed to load payloads count")?
        .unwrap_or(0);
    ensure!(
        payload_id != 0 && payload_id <= count,
        ContractError::InvalidPayloadId(payload_id)
    );

    PAYLOAD_HEADERS
        .load(storage, payload_id)
        .context("failed to load payload header")
}

fn load_state(storage: &dyn Storage, payload_id: u64) -> anyhow::Result<PayloadState> {
    PAYLOAD_TRACKING
        .load(storage, payload_id)
        .context("failed to load payload state")
}

/// Loads an INIT payload together with its state and decoded body.
pub(crate) fn load_init_payload(
    storage: &dyn Storage,
    payload_id: u64,
) -> anyhow::Result<(PayloadHeader, PayloadState, InitMultiVaultData)> {
    let header = load_header(storage, payload_id)?;
    ensure!(
        header.callback == CallbackType::Init,
        ContractError::InvalidPayloadType
    );

    let state = load_state(storage, payload_id)?;
    let body = PAYLOAD_BODIES
        .load(storage, payload_id)
        .context("failed to load payload body")?;
    let data = decode_init_body(&body, header.multi)?;

    Ok((header, state, data))
}

fn decode_init_body(body: &[u8], multi: bool) -> anyhow::Result<InitMultiVaultData> {
    let data = InitMultiVaultData::decode(body, multi).context(ContractError::DecodePayload)?;
    data.validate().context(ContractError::InvalidSuperformId)?;
    Ok(data)
}

fn ensure_quorum(
    storage: &dyn Storage,
    host: &dyn Host,
    payload_id: u64,
    src_chain_id: u64,
) -> anyhow::Result<()> {
    let required = host
        .directory()
        .required_quorum(src_chain_id)
        .ok_or(ContractError::QuorumNotConfigured(src_chain_id))?;

    let hash = PAYLOAD_PROOFS
        .load(storage, payload_id)
        .context("failed to load payload proof")?;
    let delivered = MESSAGE_QUORUM
        .may_load(storage, hash.as_slice())
        .context("failed to load message quorum")?
        .unwrap_or_default()
        .num_deliveries();

    ensure!(delivered >= required, ContractError::QuorumNotReached);
    Ok(())
}

fn ensure_updatable(state: PayloadState) -> anyhow::Result<()> {
    match state {
        PayloadState::Stored => Ok(()),
        PayloadState::Updated => Err(ContractError::PayloadAlreadyUpdated.into()),
        PayloadState::Processed => Err(ContractError::InvalidPayloadStatus.into()),
    }
}

fn form<'h>(host: &'h dyn Host, superform: &Addr) -> anyhow::Result<&'h dyn Form> {
    host.form(superform)
        .ok_or_else(|| ContractError::InvalidSuperform(superform.to_string()).into())
}

/// Sets the amounts a deposit payload will settle at.
///
/// Entries whose destination swap failed, or whose final amount falls below the slippage floor,
/// are zeroed and recorded as failed deposits to be refunded through the rescue flow.
pub fn update_deposit_payload(
    deps: DepsMut,
    info: &MessageInfo,
    host: &dyn Host,
    payload_id: u64,
    final_amounts: &[Uint256],
) -> anyhow::Result<Event> {
    ensure_role(host, Role::CoreStateRegistryUpdater, &info.sender)?;

    let (header, state, mut data) = load_init_payload(deps.storage, payload_id)?;
    ensure!(
        header.tx_type == TransactionType::Deposit,
        ContractError::InvalidPayloadType
    );
    ensure_updatable(state)?;
    ensure_quorum(deps.storage, host, payload_id, header.src_chain_id)?;
    ensure!(
        final_amounts.len() == data.vaults.len(),
        ContractError::ArrayLengthMismatch
    );

    let mut failed = Vec::new();
    for (index, (vault, &final_amount)) in data.vaults.iter_mut().zip(final_amounts).enumerate() {
        let index = u32::try_from(index).context("vault index overflow")?;

        if let Some(swap) = dst_swapper::failed_swap(deps.storage, payload_id, index)? {
            failed.push(FailedDepositEntry {
                superform_id: vault.superform_id.clone(),
                settlement_token: swap.token,
                from_dst_swapper: true,
                amount: Uint256::zero(),
            });
            vault.amount = Uint256::zero();
            continue;
        }

        if vault.has_dst_swap {
            let swapped = dst_swapper::swapped_amount(deps.storage, payload_id, index)?;
            ensure!(!swapped.is_zero(), ContractError::DstSwapPending);
            ensure!(
                final_amount <= swapped,
                ContractError::InvalidDstSwapAmount
            );
        } else {
            ensure!(
                final_amount <= vault.amount,
                ContractError::NegativeSlippage
            );
        }

        if final_amount < slippage::floor(vault.amount, vault.max_slippage)? {
            let asset = form(host, vault.superform_id.superform())?.vault_asset();
            failed.push(FailedDepositEntry {
                superform_id: vault.superform_id.clone(),
                settlement_token: asset,
                from_dst_swapper: false,
                amount: Uint256::zero(),
            });
            vault.amount = Uint256::zero();
        } else {
            vault.amount = final_amount;
        }
    }

    let next = if failed.len() == data.vaults.len() {
        PayloadState::Processed
    } else {
        PayloadState::Updated
    };

    PAYLOAD_BODIES
        .save(deps.storage, payload_id, &data.encode(header.multi)?)
        .context("failed to save payload body")?;
    PAYLOAD_TRACKING
        .save(deps.storage, payload_id, &next)
        .context("failed to save payload state")?;

    let failed_count = failed.len();
    if !failed.is_empty() {
        let record = FailedDeposit {
            entries: failed,
            receiver: data.receiver,
            last_proposed: None,
        };
        FAILED_DEPOSITS
            .save(deps.storage, payload_id, &record)
            .context("failed to save failed deposits")?;
    }

    Ok(Event::new("PayloadUpdated")
        .add_attribute("payload_id", payload_id.to_string())
        .add_attribute("state", next.to_string())
        .add_attribute("failed_deposits", failed_count.to_string()))
}

/// Supplies liquidity tx data for the vaults of a withdraw payload that were sent without any.
/// An empty entry leaves the corresponding vault unchanged.
pub fn update_withdraw_payload(
    deps: DepsMut,
    info: &MessageInfo,
    host: &dyn Host,
    payload_id: u64,
    tx_data: &[Binary],
) -> anyhow::Result<Event> {
    ensure_role(host, Role::CoreStateRegistryUpdater, &info.sender)?;

    let (header, state, mut data) = load_init_payload(deps.storage, payload_id)?;
    ensure!(
        header.tx_type == TransactionType::Withdraw,
        ContractError::InvalidPayloadType
    );
    ensure_updatable(state)?;
    ensure_quorum(deps.storage, host, payload_id, header.src_chain_id)?;
    ensure!(
        tx_data.len() == data.vaults.len(),
        ContractError::ArrayLengthMismatch
    );

    let chain_id = host.directory().chain_id();
    for (vault, tx_data) in data.vaults.iter_mut().zip(tx_data) {
        if tx_data.is_empty() {
            continue;
        }
        ensure!(
            vault.liq_request.tx_data.is_empty(),
            ContractError::CannotUpdateWithdrawTxData
        );

        let bridge_id = vault.liq_request.bridge_id;
        let validator = host
            .bridge_validator(bridge_id)
            .ok_or(ContractError::InvalidBridgeId(bridge_id))?;
        validator.validate_tx_data(&ValidationArgs {
            tx_data: tx_data.clone(),
            src_chain_id: chain_id,
            dst_chain_id: header.src_chain_id,
            liq_dst_chain_id: vault.liq_request.liq_dst_chain_id,
            deposit: false,
            sender: vault.superform_id.superform().clone(),
            receiver: data.receiver.clone(),
            token: vault.liq_request.token.clone(),
            interim_token: None,
            output_token: None,
        })?;

        let amount_in = validator.decode_amount_in(tx_data, false)?;
        let expected =
            form(host, vault.superform_id.superform())?.preview_redeem_from(vault.amount);
        ensure!(
            slippage::within(amount_in, expected, vault.max_slippage)?,
            ContractError::SlippageOutOfBounds
        );

        vault.liq_request.tx_data = tx_data.clone();
    }

    PAYLOAD_BODIES
        .save(deps.storage, payload_id, &data.encode(header.multi)?)
        .context("failed to save payload body")?;
    PAYLOAD_TRACKING
        .save(deps.storage, payload_id, &PayloadState::Updated)
        .context("failed to save payload state")?;

    Ok(Event::new("PayloadUpdated")
        .add_attribute("payload_id", payload_id.to_string())
        .add_attribute("state", PayloadState::Updated.to_string()))
}

/// Executes a payload once its quorum is reached.
///
/// The payload is marked processed before any collaborator is called, so a collaborator that
/// calls back into the registry cannot process it twice.  `ack` overrides the fees and extra
/// data of the RETURN acknowledgement sent after a deposit.
pub fn process_payload(
    mut deps: DepsMut,
    env: &Env,
    info: &MessageInfo,
    host: &dyn Host,
    payload_id: u64,
    ack: Option<AmbExtraData>,
) -> anyhow::Result<Vec<Event>> {
    ensure_role(host, Role::CoreStateRegistryProcessor, &info.sender)?;

    let header = load_header(deps.storage, payload_id)?;
    let state = load_state(deps.storage, payload_id)?;
    ensure!(
        state != PayloadState::Processed,
        ContractError::PayloadAlreadyProcessed
    );
    ensure_quorum(deps.storage, host, payload_id, header.src_chain_id)?;
    if header.callback == CallbackType::Init && header.tx_type == TransactionType::Deposit {
        ensure!(
            state == PayloadState::Updated,
            ContractError::PayloadNotUpdated
        );
    }

    PAYLOAD_TRACKING
        .save(deps.storage, payload_id, &PayloadState::Processed)
        .context("failed to save payload state")?;

    let body = PAYLOAD_BODIES
        .load(deps.storage, payload_id)
        .context("failed to load payload body")?;

    let mut evt = Event::new("PayloadProcessed")
        .add_attribute("payload_id", payload_id.to_string())
        .add_attribute("tx_type", header.tx_type.to_string())
        .add_attribute("callback", header.callback.to_string());

    match (header.callback, header.tx_type) {
        (CallbackType::Init, TransactionType::Deposit) => {
            let acked = process_deposit(deps.branch(), env, host, payload_id, &header, &body, ack)?;
            evt = evt.add_attribute("acknowledged", acked.to_string());
        }
        (CallbackType::Init, TransactionType::Withdraw) => {
            process_withdraw(deps.branch(), env, host, &header, &body)?;
        }
        (CallbackType::Return | CallbackType::Fail, _) => {
            let amb_ids = PAYLOAD_AMBS
                .load(deps.storage, payload_id)
                .context("failed to load payload ambs")?;
            let message = AmbMessage::Payload {
                header,
                amb_ids,
                body,
            };
            host.positions()
                .state_sync(&message)
                .context("failed to sync positions")?;
        }
    }

    let mut events = vec![evt];
    if let Some(failed) = FAILED_DEPOSITS
        .may_load(deps.storage, payload_id)
        .context("failed to load failed deposits")?
    {
        events.push(
            Event::new("FailedXChainDeposits")
                .add_attribute("payload_id", payload_id.to_string())
                .add_attribute("entries", failed.entries.len().to_string()),
        );
    }

    Ok(events)
}

fn process_deposit(
    mut deps: DepsMut,
    env: &Env,
    host: &dyn Host,
    payload_id: u64,
    header: &PayloadHeader,
    body: &Binary,
    ack: Option<AmbExtraData>,
) -> anyhow::Result<usize> {
    let core = address(host, AddressId::CoreStateRegistry)?;
    let data = decode_init_body(body, header.multi)?;

    let mut superform_ids = Vec::new();
    let mut amounts = Vec::new();
    for (index, vault) in data.vaults.iter().enumerate() {
        // Zeroed by the update; refunded through rescue instead.
        if vault.amount.is_zero() {
            continue;
        }

        let superform = vault.superform_id.superform();
        let form = form(host, superform)?;
        host.ledger()
            .transfer(&form.vault_asset(), &core, superform, vault.amount)
            .context("failed to transfer deposit to superform")?;

        let single = data.single(index).context("missing vault data")?;
        let shares = form
            .xchain_deposit_into_vault(
                deps.branch(),
                env,
                host,
                &single,
                &header.src_sender,
                header.src_chain_id,
            )
            .with_context(|| format!("failed to deposit into {}", vault.superform_id))?;

        superform_ids.push(vault.superform_id.clone());
        amounts.push(shares);
    }

    let acked = superform_ids.len();
    if acked == 0 {
        return Ok(0);
    }

    let amb_ids = PAYLOAD_AMBS
        .load(deps.storage, payload_id)
        .context("failed to load payload ambs")?;
    let message = acknowledgement(
        return_header(header, host.directory().chain_id()),
        amb_ids.clone(),
        &ReturnMultiData {
            payload_id: data.payload_id,
            superform_ids,
            amounts,
        },
    )?;

    let extra = match ack {
        Some(extra) => extra,
        None => {
            payment::calculate_amb_data(
                deps.as_ref(),
                host,
                header.src_chain_id,
                &amb_ids,
                &message,
            )?
            .1
        }
    };
    dispatch_message(host, &core, &amb_ids, header.src_chain_id, &message, &extra)?;

    Ok(acked)
}

fn process_withdraw(
    mut deps: DepsMut,
    env: &Env,
    host: &dyn Host,
    header: &PayloadHeader,
    body: &Binary,
) -> anyhow::Result<()> {
    let data = decode_init_body(body, header.multi)?;

    for (index, vault) in data.vaults.iter().enumerate() {
        let form = form(host, vault.superform_id.superform())?;
        let single = data.single(index).context("missing vault data")?;
        form.xchain_withdraw_from_vault(
            deps.branch(),
            env,
            host,
            &single,
            &header.src_sender,
            header.src_chain_id,
        )
        .with_context(|| format!("failed to withdraw from {}", vault.superform_id))?;
    }

    Ok(())
}

fn return_header(header: &PayloadHeader, chain_id: u64) -> PayloadHeader {
    PayloadHeader {
        tx_type: header.tx_type,
        callback: CallbackType::Return,
        multi: header.multi,
        registry_id: CORE_STATE_REGISTRY_ID,
        src_sender: header.src_sender.clone(),
        src_chain_id: chain_id,
    }
}

/// Builds an acknowledgement carrying `data` in the shape `header.multi` selects.
pub(crate) fn acknowledgement(
    header: PayloadHeader,
    amb_ids: Vec<u8>,
    data: &ReturnMultiData,
) -> anyhow::Result<AmbMessage> {
    let body = data.encode(header.multi)?;
    Ok(AmbMessage::Payload {
        header,
        amb_ids,
        body,
    })
}

/// Returns the RETURN acknowledgement processing deposit payload `payload_id` would send, as if
/// every vault settled at its current amount, and the AMBs it would travel over.
pub(crate) fn deposit_acknowledgement(
    deps: Deps,
    host: &dyn Host,
    payload_id: u64,
) -> anyhow::Result<(AmbMessage, Vec<u8>)> {
    let (header, _, data) = load_init_payload(deps.storage, payload_id)?;
    ensure!(
        header.tx_type == TransactionType::Deposit,
        ContractError::InvalidPayloadType
    );

    let amb_ids = PAYLOAD_AMBS
        .load(deps.storage, payload_id)
        .context("failed to load payload ambs")?;
    let message = acknowledgement(
        return_header(&header, host.directory().chain_id()),
        amb_ids.clone(),
        &ReturnMultiData {
            payload_id: data.payload_id,
            superform_ids: data.vaults.iter().map(|v| v.superform_id.clone()).collect(),
            amounts: data.vaults.iter().map(|v| v.amount).collect(),
        },
    )?;

    Ok((message, amb_ids))
}

/// Sends `message` to `dst_chain_id`.  The first AMB carries the full message and every other
/// AMB carries its proof, each with the fee and extra data at the same position in `extra`.
pub fn dispatch_message(
    host: &dyn Host,
    sender: &Addr,
    amb_ids: &[u8],
    dst_chain_id: u64,
    message: &AmbMessage,
    extra: &AmbExtraData,
) -> anyhow::Result<()> {
    ensure!(!amb_ids.is_empty(), ContractError::NoAmbSelected);

    let full = message.encode().context("failed to encode message")?;
    let proof = message
        .to_proof()?
        .encode()
        .context("failed to encode proof")?;

    for (i, &id) in amb_ids.iter().enumerate() {
        let amb = host.amb(id).ok_or(ContractError::InvalidAmbId(id))?;
        let fee = extra.gas_per_amb.get(i).copied().unwrap_or_default();
        let extra_data = extra
            .extra_data_per_amb
            .get(i)
            .cloned()
            .unwrap_or_default();
        let bytes = if i == 0 { &full } else { &proof };

        amb.dispatch_payload(sender, dst_chain_id, fee, bytes, &extra_data)
            .with_context(|| format!("failed to dispatch message over amb {id}"))?;
    }

    Ok(())
}

/// Proposes refund amounts for the failed deposits of `payload_id` and opens the dispute window.
pub fn propose_rescue_failed_deposits(
    deps: DepsMut,
    env: &Env,
    info: &MessageInfo,
    host: &dyn Host,
    payload_id: u64,
    amounts: &[Uint256],
) -> anyhow::Result<Event> {
    ensure_role(host, Role::CoreStateRegistryRescuer, &info.sender)?;

    load_header(deps.storage, payload_id)?;
    ensure!(
        load_state(deps.storage, payload_id)? == PayloadState::Processed,
        ContractError::InvalidPayloadStatus
    );

    let mut failed = load_failed_deposits(deps.storage, payload_id)?;
    ensure!(
        failed.last_proposed.is_none(),
        ContractError::RescueAlreadyProposed
    );
    ensure!(
        amounts.len() == failed.entries.len(),
        ContractError::ArrayLengthMismatch
    );

    for (entry, &amount) in failed.entries.iter_mut().zip(amounts) {
        entry.amount = amount;
    }
    failed.last_proposed = Some(env.block.time);

    FAILED_DEPOSITS
        .save(deps.storage, payload_id, &failed)
        .context("failed to save failed deposits")?;

    Ok(Event::new("RescueProposed")
        .add_attribute("payload_id", payload_id.to_string())
        .add_attribute("proposed_at", env.block.time.seconds().to_string()))
}

/// Lets the refund receiver reject a proposal while the dispute window is open.  The proposal
/// is cleared and a new one may be made.
pub fn dispute_rescue_failed_deposits(
    deps: DepsMut,
    env: &Env,
    info: &MessageInfo,
    host: &dyn Host,
    payload_id: u64,
) -> anyhow::Result<Event> {
    let mut failed = load_failed_deposits(deps.storage, payload_id)?;
    ensure!(
        info.sender == failed.receiver,
        ContractError::NotValidDisputer
    );

    let proposed = failed
        .last_proposed
        .ok_or(ContractError::RescueNotProposed)?;
    ensure!(
        env.block.time <= proposed.plus_seconds(host.directory().rescue_delay()),
        ContractError::DisputeTimeElapsed
    );

    failed.last_proposed = None;
    for entry in &mut failed.entries {
        entry.amount = Uint256::zero();
    }
    FAILED_DEPOSITS
        .save(deps.storage, payload_id, &failed)
        .context("failed to save failed deposits")?;

    Ok(Event::new("RescueDisputed").add_attribute("payload_id", payload_id.to_string()))
}

/// Pays out an undisputed proposal once the dispute window has closed.  Callable by anyone.
pub fn finalize_rescue_failed_deposits(
    deps: DepsMut,
    env: &Env,
    host: &dyn Host,
    payload_id: u64,
) -> anyhow::Result<Event> {
    let failed = load_failed_deposits(deps.storage, payload_id)?;
    let proposed = failed
        .last_proposed
        .ok_or(ContractError::RescueNotProposed)?;
    ensure!(
        env.block.time > proposed.plus_seconds(host.directory().rescue_delay()),
        ContractError::RescueLocked
    );

    FAILED_DEPOSITS.remove(deps.storage, payload_id);

    let core = address(host, AddressId::CoreStateRegistry)?;
    let as_core = MessageInfo {
        sender: core.clone(),
        funds: Vec::new(),
    };

    let mut paid = 0usize;
    for entry in failed.entries.iter().filter(|e| !e.amount.is_zero()) {
        if entry.from_dst_swapper {
            dst_swapper::process_failed_tx(
                &as_core,
                host,
                &failed.receiver,
                &entry.settlement_token,
                entry.amount,
            )?;
        } else {
            host.ledger()
                .transfer(&entry.settlement_token, &core, &failed.receiver, entry.amount)
                .context("failed to refund failed deposit")?;
        }
        paid += 1;
    }

    Ok(Event::new("RescueFinalized")
        .add_attribute("payload_id", payload_id.to_string())
        .add_attribute("receiver", failed.receiver)
        .add_attribute("refunds", paid.to_string()))
}

fn load_failed_deposits(storage: &dyn Storage, payload_id: u64) -> anyhow::Result<FailedDeposit> {
    FAILED_DEPOSITS
        .may_load(storage, payload_id)
        .context("failed to load failed deposits")?
        .filter(|f| !f.entries.is_empty())
        .ok_or_else(|| ContractError::NoFailedDeposits.into())
}

pub fn query_payloads_count(deps: Deps) -> StdResult<u64> {
    PAYLOADS_COUNT
        .may_load(deps.storage)
        .map(Option::unwrap_or_default)
}

pub fn query_payload_header(deps: Deps, payload_id: u64) -> anyhow::Result<PayloadHeader> {
    load_header(deps.storage, payload_id)
}

pub fn query_payload_body(deps: Deps, payload_id: u64) -> anyhow::Result<Binary> {
    load_header(deps.storage, payload_id)?;
    PAYLOAD_BODIES
        .load(deps.storage, payload_id)
        .context("failed to load payload body")
}

pub fn query_payload_state(deps: Deps, payload_id: u64) -> anyhow::Result<PayloadState> {
    load_header(deps.storage, payload_id)?;
    load_state(deps.storage, payload_id)
}

pub fn query_payload_proof(deps: Deps, payload_id: u64) -> anyhow::Result<Binary> {
    load_header(deps.storage, payload_id)?;
    PAYLOAD_PROOFS
        .load(deps.storage, payload_id)
        .context("failed to load payload proof")
}

pub fn query_payload_ambs(deps: Deps, payload_id: u64) -> anyhow::Result<Vec<u8>> {
    load_header(deps.storage, payload_id)?;
    PAYLOAD_AMBS
        .load(deps.storage, payload_id)
        .context("failed to load payload ambs")
}

/// Returns the number of distinct AMBs that delivered the message with hash `hash`.
pub fn query_message_quorum(deps: Deps, hash: &[u8]) -> StdResult<u32> {
    MESSAGE_QUORUM
        .may_load(deps.storage, hash)
        .map(|d| d.unwrap_or_default().num_deliveries())
}

pub fn query_failed_deposits(deps: Deps, payload_id: u64) -> StdResult<Option<FailedDeposit>> {
    FAILED_DEPOSITS.may_load(deps.storage, payload_id)
}

#[cfg(test)]
mod test {
    use super::*;

    use cosmwasm_std::{
        testing::{mock_dependencies, mock_info},
        to_json_binary,
    };
    use registry_bindings::{
        fake::{BankKeeper, DirectoryKeeper, HostKeeper, PositionKeeper},
        payload::{InitSingleVaultData, LiqRequest, VaultRequest},
        SuperformId,
    };

    const SRC: u64 = 10;
    const LOCAL: u64 = 1;

    fn host() -> HostKeeper {
        let directory = DirectoryKeeper::new(LOCAL);
        for amb in 1..=3u8 {
            directory.set_address(
                AddressId::AmbImplementation(amb),
                &Addr::unchecked(format!("amb{amb}")),
            );
        }
        directory.set_required_quorum(SRC, 2);
        HostKeeper::new(directory, BankKeeper::new(), PositionKeeper::new())
    }

    fn payload(registry_id: u8) -> AmbMessage {
        let data = InitSingleVaultData {
            payload_id: 1,
            vault: VaultRequest {
                superform_id: SuperformId::new(Addr::unchecked("vault"), 1, LOCAL).unwrap(),
                amount: Uint256::from(100u128),
                max_slippage: 100,
                liq_request: LiqRequest {
                    bridge_id: 1,
                    tx_data: Binary::default(),
                    token: Addr::unchecked("usdc"),
                    interim_token: None,
                    liq_dst_chain_id: LOCAL,
                    native_amount: Uint256::zero(),
                },
                has_dst_swap: false,
            },
            receiver: Addr::unchecked("user"),
        };

        AmbMessage::Payload {
            header: PayloadHeader {
                tx_type: TransactionType::Deposit,
                callback: CallbackType::Init,
                multi: false,
                registry_id,
                src_sender: Addr::unchecked("user"),
                src_chain_id: SRC,
            },
            amb_ids: vec![1, 2],
            body: to_json_binary(&data).unwrap(),
        }
    }

    #[test]
    fn payload_and_proof_share_quorum() {
        let host = host();
        let mut deps = mock_dependencies();
        let message = payload(CORE_STATE_REGISTRY_ID);

        let evt = receive_payload(
            deps.as_mut(),
            &mock_info("amb1", &[]),
            &host,
            SRC,
            1,
            &message.encode().unwrap(),
        )
        .unwrap();
        assert_eq!("PayloadReceived", evt.ty);
        assert_eq!(1, query_payloads_count(deps.as_ref()).unwrap());

        let proof = message.to_proof().unwrap();
        let evt = receive_payload(
            deps.as_mut(),
            &mock_info("amb2", &[]),
            &host,
            SRC,
            2,
            &proof.encode().unwrap(),
        )
        .unwrap();
        assert_eq!("ProofReceived", evt.ty);

        let hash = query_payload_proof(deps.as_ref(), 1).unwrap();
        assert_eq!(2, query_message_quorum(deps.as_ref(), &hash).unwrap());
        assert_eq!(1, query_payloads_count(deps.as_ref()).unwrap());
    }

    #[test]
    fn duplicate_payload_is_not_stored_twice() {
        let host = host();
        let mut deps = mock_dependencies();
        let message = payload(CORE_STATE_REGISTRY_ID).encode().unwrap();

        for amb in [1u8, 2, 2] {
            receive_payload(
                deps.as_mut(),
                &mock_info(&format!("amb{amb}"), &[]),
                &host,
                SRC,
                amb,
                &message,
            )
            .unwrap();
        }

        assert_eq!(1, query_payloads_count(deps.as_ref()).unwrap());
        let hash = query_payload_proof(deps.as_ref(), 1).unwrap();
        assert_eq!(2, query_message_quorum(deps.as_ref(), &hash).unwrap());
    }

    #[test]
    fn only_the_amb_implementation_may_deliver() {
        let host = host();
        let mut deps = mock_dependencies();
        let message = payload(CORE_STATE_REGISTRY_ID).encode().unwrap();

        let err = receive_payload(
            deps.as_mut(),
            &mock_info("amb2", &[]),
            &host,
            SRC,
            1,
            &message,
        )
        .unwrap_err();
        assert_eq!(
            Some(&ContractError::NotAmbImplementation),
            err.downcast_ref::<ContractError>()
        );

        let err = receive_payload(
            deps.as_mut(),
            &mock_info("amb9", &[]),
            &host,
            SRC,
            9,
            &message,
        )
        .unwrap_err();
        assert_eq!(
            Some(&ContractError::InvalidAmbId(9)),
            err.downcast_ref::<ContractError>()
        );
    }

    #[test]
    fn payload_for_another_registry_is_rejected() {
        let host = host();
        let mut deps = mock_dependencies();

        let err = receive_payload(
            deps.as_mut(),
            &mock_info("amb1", &[]),
            &host,
            SRC,
            1,
            &payload(2).encode().unwrap(),
        )
        .unwrap_err();
        assert_eq!(
            Some(&ContractError::InvalidRegistryId),
            err.downcast_ref::<ContractError>()
        );
    }

    #[test]
    fn unknown_payload_id() {
        let deps = mock_dependencies();
        for id in [0, 1, u64::MAX] {
            let err = query_payload_header(deps.as_ref(), id).unwrap_err();
            assert_eq!(
                Some(&ContractError::InvalidPayloadId(id)),
                err.downcast_ref::<ContractError>()
            );
        }
    }
}
