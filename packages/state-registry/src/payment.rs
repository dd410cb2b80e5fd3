use anyhow::{ensure, Context};
use cosmwasm_std::{from_json, Addr, Binary, Deps, DepsMut, Event, MessageInfo, Storage, Uint256};
use registry_bindings::{
    ids::{CORE_STATE_REGISTRY_ID, TIMELOCK_FORM_ID},
    payload::{
        AmbExtraData, AmbMessage, CallbackType, InitMultiVaultData, PayloadHeader,
        TransactionType,
    },
    Host, Role,
};
use serde::de::DeserializeOwned;

use crate::{
    access::ensure_role,
    core,
    msg::{
        FeeEstimate, MultiDstMultiVaultRequest, MultiDstSingleVaultRequest,
        SingleDirectMultiVaultRequest, SingleDirectSingleVaultRequest,
        SingleXChainMultiVaultRequest, SingleXChainSingleVaultRequest,
    },
    state::{payment::PAYMENT_CONFIGS, PaymentConfig},
    ContractError,
};

/// Identifies the field `update_remote_chain` replaces.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigType {
    NativeFeedOracle = 1,
    GasPriceOracle,
    SwapGasUsed,
    UpdateGasUsed,
    DepositGasUsed,
    WithdrawGasUsed,
    DefaultNativePrice,
    DefaultGasPrice,
    GasPerByte,
    AckGasCost,
    TimelockCost,
}

impl ConfigType {
    pub fn from_code(code: u8) -> Option<ConfigType> {
        use ConfigType::*;

        let ty = match code {
            1 => NativeFeedOracle,
            2 => GasPriceOracle,
            3 => SwapGasUsed,
            4 => UpdateGasUsed,
            5 => DepositGasUsed,
            6 => WithdrawGasUsed,
            7 => DefaultNativePrice,
            8 => DefaultGasPrice,
            9 => GasPerByte,
            10 => AckGasCost,
            11 => TimelockCost,
            _ => return None,
        };
        Some(ty)
    }
}

pub fn add_remote_chain(
    deps: DepsMut,
    info: &MessageInfo,
    host: &dyn Host,
    chain_id: u64,
    config: PaymentConfig,
) -> anyhow::Result<Event> {
    ensure_role(host, Role::ProtocolAdmin, &info.sender)?;
    ensure!(chain_id != 0, ContractError::InvalidChainId);

    PAYMENT_CONFIGS
        .save(deps.storage, chain_id, &config)
        .context("failed to save payment config")?;

    Ok(Event::new("RemoteChainAdded").add_attribute("chain_id", chain_id.to_string()))
}

/// Replaces one field of a chain's payment config.  `value` is the JSON encoding of the new
/// field value.  Unknown config types are ignored and produce no event.
pub fn update_remote_chain(
    deps: DepsMut,
    info: &MessageInfo,
    host: &dyn Host,
    chain_id: u64,
    config_type: u8,
    value: &Binary,
) -> anyhow::Result<Option<Event>> {
    ensure_role(host, Role::PaymentAdmin, &info.sender)?;

    let Some(ty) = ConfigType::from_code(config_type) else {
        return Ok(None);
    };

    let mut config = load_config(deps.storage, chain_id)?;
    match ty {
        ConfigType::NativeFeedOracle => config.native_feed_oracle = decode(value)?,
        ConfigType::GasPriceOracle => config.gas_price_oracle = decode(value)?,
        ConfigType::SwapGasUsed => config.swap_gas_used = decode(value)?,
        ConfigType::UpdateGasUsed => config.update_gas_used = decode(value)?,
        ConfigType::DepositGasUsed => config.deposit_gas_used = decode(value)?,
        ConfigType::WithdrawGasUsed => config.withdraw_gas_used = decode(value)?,
        ConfigType::DefaultNativePrice => config.default_native_price = decode(value)?,
        ConfigType::DefaultGasPrice => config.default_gas_price = decode(value)?,
        ConfigType::GasPerByte => config.gas_per_byte = decode(value)?,
        ConfigType::AckGasCost => config.ack_gas_cost = decode(value)?,
        ConfigType::TimelockCost => config.timelock_cost = decode(value)?,
    }

    PAYMENT_CONFIGS
        .save(deps.storage, chain_id, &config)
        .context("failed to save payment config")?;

    Ok(Some(
        Event::new("RemoteChainUpdated")
            .add_attribute("chain_id", chain_id.to_string())
            .add_attribute("config_type", config_type.to_string()),
    ))
}

fn decode<T: DeserializeOwned>(value: &Binary) -> anyhow::Result<T> {
    from_json(value).context("failed to decode config value")
}

pub fn query_config(deps: Deps, chain_id: u64) -> anyhow::Result<PaymentConfig> {
    load_config(deps.storage, chain_id)
}

fn load_config(storage: &dyn Storage, chain_id: u64) -> anyhow::Result<PaymentConfig> {
    PAYMENT_CONFIGS
        .may_load(storage, chain_id)
        .context("failed to load payment config")?
        .ok_or_else(|| ContractError::ChainNotConfigured(chain_id).into())
}

fn read_oracle(host: &dyn Host, oracle: &Addr) -> anyhow::Result<Uint256> {
    let feed = host
        .price_feed(oracle)
        .ok_or_else(|| ContractError::PriceFeedNotRegistered(oracle.to_string()))?;
    let round = feed
        .latest_round()
        .with_context(|| format!("failed to read price feed {oracle}"))?;
    ensure!(
        round.price > 0 && round.updated_at != 0,
        ContractError::OracleMalfunction
    );

    u128::try_from(round.price)
        .map(Uint256::from)
        .map_err(|_| ContractError::OracleMalfunction.into())
}

/// Returns the gas price on `chain_id`, from its oracle when one is configured.
pub fn gas_price(deps: Deps, host: &dyn Host, chain_id: u64) -> anyhow::Result<Uint256> {
    let config = load_config(deps.storage, chain_id)?;
    match &config.gas_price_oracle {
        Some(oracle) => read_oracle(host, oracle),
        None => Ok(config.default_gas_price),
    }
}

/// Returns the USD price of `chain_id`'s native currency with 8 decimals.
pub fn native_price(deps: Deps, host: &dyn Host, chain_id: u64) -> anyhow::Result<Uint256> {
    let config = load_config(deps.storage, chain_id)?;
    match &config.native_feed_oracle {
        Some(oracle) => read_oracle(host, oracle),
        None => Ok(config.default_native_price),
    }
}

/// Converts `dst_gas` units on `dst_chain_id` into this chain's native currency:
/// `dst_gas * dst_gas_price * dst_native_price / src_native_price`, rounded down.
pub fn convert_to_native_fee(
    deps: Deps,
    host: &dyn Host,
    dst_chain_id: u64,
    dst_gas: Uint256,
) -> anyhow::Result<Uint256> {
    let dst_native_fee = dst_gas.checked_mul(gas_price(deps, host, dst_chain_id)?)?;
    if dst_native_fee.is_zero() {
        return Ok(Uint256::zero());
    }

    let dst_usd = dst_native_fee.checked_mul(native_price(deps, host, dst_chain_id)?)?;
    if dst_usd.is_zero() {
        return Ok(Uint256::zero());
    }

    let src_chain_id = host.directory().chain_id();
    dst_usd
        .checked_div(native_price(deps, host, src_chain_id)?)
        .map_err(|_| ContractError::ChainNotConfigured(src_chain_id).into())
}

/// Returns the total messaging fee for `message` and the fee charged by each AMB, in order.
pub fn estimate_amb_fees(
    deps: Deps,
    host: &dyn Host,
    dst_chain_id: u64,
    amb_ids: &[u8],
    message: &AmbMessage,
) -> anyhow::Result<(Uint256, Vec<Uint256>)> {
    calculate_amb_data(deps, host, dst_chain_id, amb_ids, message)
        .map(|(total, extra)| (total, extra.gas_per_amb))
}

/// Estimates the messaging fee for sending `message` to `dst_chain_id` over `amb_ids`, where
/// the first AMB carries the full message and the rest carry its proof.  Returns the total fee
/// and the per-AMB fees and extra data to dispatch with.
pub fn calculate_amb_data(
    deps: Deps,
    host: &dyn Host,
    dst_chain_id: u64,
    amb_ids: &[u8],
    message: &AmbMessage,
) -> anyhow::Result<(Uint256, AmbExtraData)> {
    ensure!(!amb_ids.is_empty(), ContractError::NoAmbSelected);

    let config = load_config(deps.storage, dst_chain_id)?;
    let full = message.encode().context("failed to encode message")?;
    let proof = message
        .to_proof()?
        .encode()
        .context("failed to encode proof")?;

    let mut total = Uint256::zero();
    let mut extra = AmbExtraData::default();
    for (i, &id) in amb_ids.iter().enumerate() {
        let amb = host.amb(id).ok_or(ContractError::InvalidAmbId(id))?;
        let bytes = if i == 0 { &full } else { &proof };

        let gas = config.gas_per_byte.checked_mul(count(bytes.len()))?;
        let extra_data = amb.generate_extra_data(gas);
        let fee = amb
            .estimate_fees(dst_chain_id, bytes, &extra_data)
            .with_context(|| format!("failed to estimate fees for amb {id}"))?;

        total = total.checked_add(fee)?;
        extra.gas_per_amb.push(fee);
        extra.extra_data_per_amb.push(extra_data);
    }

    Ok((total, extra))
}

/// Returns the native fee the processor needs to acknowledge deposit payload `payload_id`.
pub fn estimate_ack_cost(deps: Deps, host: &dyn Host, payload_id: u64) -> anyhow::Result<Uint256> {
    let header = core::query_payload_header(deps, payload_id)?;
    let (message, amb_ids) = core::deposit_acknowledgement(deps, host, payload_id)?;

    calculate_amb_data(deps, host, header.src_chain_id, &amb_ids, &message).map(|(total, _)| total)
}

pub fn estimate_multi_dst_multi_vault(
    deps: Deps,
    host: &dyn Host,
    sender: &Addr,
    req: &MultiDstMultiVaultRequest,
    deposit: bool,
) -> anyhow::Result<FeeEstimate> {
    ensure!(
        req.amb_ids.len() == req.dst_chain_ids.len() && req.data.len() == req.dst_chain_ids.len(),
        ContractError::ArrayLengthMismatch
    );

    let mut estimate = FeeEstimate::default();
    let requests = req.amb_ids.iter().zip(&req.dst_chain_ids).zip(&req.data);
    for ((amb_ids, &dst_chain_id), data) in requests {
        let data = InitMultiVaultData::from(data);
        let e = estimate_xchain(deps, host, sender, amb_ids, dst_chain_id, &data, true, deposit)?;
        estimate = estimate.checked_add(e)?;
    }

    Ok(estimate)
}

pub fn estimate_multi_dst_single_vault(
    deps: Deps,
    host: &dyn Host,
    sender: &Addr,
    req: &MultiDstSingleVaultRequest,
    deposit: bool,
) -> anyhow::Result<FeeEstimate> {
    ensure!(
        req.amb_ids.len() == req.dst_chain_ids.len() && req.data.len() == req.dst_chain_ids.len(),
        ContractError::ArrayLengthMismatch
    );

    let mut estimate = FeeEstimate::default();
    let requests = req.amb_ids.iter().zip(&req.dst_chain_ids).zip(&req.data);
    for ((amb_ids, &dst_chain_id), data) in requests {
        let data = InitMultiVaultData::from(data);
        let e = estimate_xchain(deps, host, sender, amb_ids, dst_chain_id, &data, false, deposit)?;
        estimate = estimate.checked_add(e)?;
    }

    Ok(estimate)
}

pub fn estimate_single_xchain_multi_vault(
    deps: Deps,
    host: &dyn Host,
    sender: &Addr,
    req: &SingleXChainMultiVaultRequest,
    deposit: bool,
) -> anyhow::Result<FeeEstimate> {
    let data = InitMultiVaultData::from(&req.data);
    estimate_xchain(deps, host, sender, &req.amb_ids, req.dst_chain_id, &data, true, deposit)
}

pub fn estimate_single_xchain_single_vault(
    deps: Deps,
    host: &dyn Host,
    sender: &Addr,
    req: &SingleXChainSingleVaultRequest,
    deposit: bool,
) -> anyhow::Result<FeeEstimate> {
    let data = InitMultiVaultData::from(&req.data);
    estimate_xchain(deps, host, sender, &req.amb_ids, req.dst_chain_id, &data, false, deposit)
}

pub fn estimate_single_direct_single_vault(
    deps: Deps,
    host: &dyn Host,
    req: &SingleDirectSingleVaultRequest,
    deposit: bool,
) -> anyhow::Result<FeeEstimate> {
    estimate_direct(deps, host, &InitMultiVaultData::from(&req.data), deposit)
}

pub fn estimate_single_direct_multi_vault(
    deps: Deps,
    host: &dyn Host,
    req: &SingleDirectMultiVaultRequest,
    deposit: bool,
) -> anyhow::Result<FeeEstimate> {
    estimate_direct(deps, host, &InitMultiVaultData::from(&req.data), deposit)
}

fn count(n: usize) -> Uint256 {
    Uint256::from(n as u128)
}

fn liq_amount(data: &InitMultiVaultData) -> anyhow::Result<Uint256> {
    data.vaults.iter().try_fold(Uint256::zero(), |acc, v| {
        acc.checked_add(v.liq_request.native_amount)
            .map_err(anyhow::Error::from)
    })
}

fn estimate_direct(
    deps: Deps,
    host: &dyn Host,
    data: &InitMultiVaultData,
    deposit: bool,
) -> anyhow::Result<FeeEstimate> {
    let chain_id = host.directory().chain_id();
    let config = load_config(deps.storage, chain_id)?;

    let per_vault = if deposit {
        config.deposit_gas_used
    } else {
        config.withdraw_gas_used
    };
    let gas = per_vault.checked_mul(count(data.vaults.len()))?;
    let src_amount = gas.checked_mul(gas_price(deps, host, chain_id)?)?;
    let liq_amount = liq_amount(data)?;

    Ok(FeeEstimate {
        liq_amount,
        src_amount,
        dst_amount: Uint256::zero(),
        total_amount: liq_amount.checked_add(src_amount)?,
    })
}

#[allow(clippy::too_many_arguments)]
fn estimate_xchain(
    deps: Deps,
    host: &dyn Host,
    sender: &Addr,
    amb_ids: &[u8],
    dst_chain_id: u64,
    data: &InitMultiVaultData,
    multi: bool,
    deposit: bool,
) -> anyhow::Result<FeeEstimate> {
    let src_chain_id = host.directory().chain_id();
    if dst_chain_id == src_chain_id {
        return estimate_direct(deps, host, data, deposit);
    }

    let tx_type = if deposit {
        TransactionType::Deposit
    } else {
        TransactionType::Withdraw
    };
    let message = AmbMessage::Payload {
        header: PayloadHeader {
            tx_type,
            callback: CallbackType::Init,
            multi,
            registry_id: CORE_STATE_REGISTRY_ID,
            src_sender: sender.clone(),
            src_chain_id,
        },
        amb_ids: amb_ids.to_vec(),
        body: data.encode(multi)?,
    };
    let (amb_fees, _) = calculate_amb_data(deps, host, dst_chain_id, amb_ids, &message)?;

    let config = load_config(deps.storage, dst_chain_id)?;
    let vaults = count(data.vaults.len());
    let dst_gas = if deposit {
        let swaps = count(data.vaults.iter().filter(|v| v.has_dst_swap).count());
        config
            .update_gas_used
            .checked_add(config.deposit_gas_used)?
            .checked_mul(vaults)?
            .checked_add(config.swap_gas_used.checked_mul(swaps)?)?
    } else {
        let timelocked = count(
            data.vaults
                .iter()
                .filter(|v| v.superform_id.form_id() == TIMELOCK_FORM_ID)
                .count(),
        );
        config
            .withdraw_gas_used
            .checked_mul(vaults)?
            .checked_add(config.timelock_cost.checked_mul(timelocked)?)?
    };
    let dst_amount = convert_to_native_fee(deps, host, dst_chain_id, dst_gas)?;

    let mut src_amount = amb_fees;
    if deposit {
        let src_config = load_config(deps.storage, src_chain_id)?;
        let ack = src_config
            .ack_gas_cost
            .checked_mul(gas_price(deps, host, src_chain_id)?)?;
        src_amount = src_amount.checked_add(ack)?;
    }

    let liq_amount = liq_amount(data)?;
    Ok(FeeEstimate {
        liq_amount,
        src_amount,
        dst_amount,
        total_amount: liq_amount.checked_add(src_amount)?.checked_add(dst_amount)?,
    })
}
