#![allow(dead_code)]

use cosmwasm_std::{
    testing::{mock_dependencies, mock_env, MockApi, MockQuerier, MockStorage},
    to_json_binary, Addr, Binary, Env, Event, MessageInfo, OwnedDeps, Uint256,
};
use registry_bindings::{
    fake::{
        AmbKeeper, BankKeeper, BridgeKeeper, DirectoryKeeper, HostKeeper, PositionKeeper,
        VaultKeeper,
    },
    ids::{CORE_STATE_REGISTRY_ID, TIMELOCK_FORM_ID, TIMELOCK_STATE_REGISTRY_ID},
    payload::{
        AmbMessage, CallbackType, InitMultiVaultData, InitSingleVaultData, LiqRequest,
        PayloadHeader, TransactionType, VaultRequest,
    },
    AddressId, Role, SuperformId,
};
use state_registry::{
    core, payment,
    state::PaymentConfig,
    validator::{PackedRoute, PackedRouteValidator},
    ContractError,
};

pub const LOCAL: u64 = 1;
pub const REMOTE: u64 = 10;

pub const CORE: &str = "core-state-registry";
pub const SWAPPER: &str = "dst-swapper";
pub const TIMELOCK: &str = "timelock-state-registry";
pub const BRIDGE: &str = "liquidity-bridge";

pub const ADMIN: &str = "protocol-admin";
pub const PAYMENT_ADMIN: &str = "payment-admin";
pub const UPDATER: &str = "updater";
pub const PROCESSOR: &str = "processor";
pub const RESCUER: &str = "rescuer";
pub const KEEPER: &str = "swap-keeper";
pub const TIMELOCK_PROCESSOR: &str = "timelock-processor";
pub const USER: &str = "user";

pub const USDC: &str = "usdc";
pub const WETH: &str = "weth";
pub const VAULT: &str = "usdc-vault";
pub const TIMELOCKED_VAULT: &str = "usdc-timelocked-vault";

pub const BRIDGE_ID: u8 = 1;
pub const AMB_IDS: [u8; 3] = [1, 2, 3];
pub const RESCUE_DELAY: u64 = 3_600;

pub struct Registry {
    pub deps: OwnedDeps<MockStorage, MockApi, MockQuerier>,
    pub env: Env,
    pub host: HostKeeper,
    pub directory: DirectoryKeeper,
    pub bank: BankKeeper,
    pub positions: PositionKeeper,
    pub vault: VaultKeeper,
    pub timelocked: VaultKeeper,
    pub bridge: BridgeKeeper,
    pub ambs: Vec<AmbKeeper>,
}

pub fn addr(s: &str) -> Addr {
    Addr::unchecked(s)
}

pub fn info(sender: &str) -> MessageInfo {
    MessageInfo {
        sender: addr(sender),
        funds: Vec::new(),
    }
}

pub fn amb_address(amb_id: u8) -> String {
    format!("amb-{amb_id}")
}

pub fn assert_error(err: &anyhow::Error, want: ContractError) {
    assert_eq!(
        Some(&want),
        err.downcast_ref::<ContractError>(),
        "unexpected error: {err:#}"
    );
}

pub fn attribute<'e>(evt: &'e Event, key: &str) -> Option<&'e str> {
    evt.attributes
        .iter()
        .find(|a| a.key == key)
        .map(|a| a.value.as_str())
}

pub fn proper_instantiate() -> Registry {
    let directory = DirectoryKeeper::new(LOCAL);
    directory.set_address(AddressId::CoreStateRegistry, &addr(CORE));
    directory.set_address(AddressId::DstSwapper, &addr(SWAPPER));
    directory.set_address(AddressId::TimelockStateRegistry, &addr(TIMELOCK));
    for id in AMB_IDS {
        directory.set_address(AddressId::AmbImplementation(id), &addr(&amb_address(id)));
    }
    directory.set_state_registry_id(&addr(CORE), CORE_STATE_REGISTRY_ID);
    directory.set_state_registry_id(&addr(TIMELOCK), TIMELOCK_STATE_REGISTRY_ID);
    directory.set_required_quorum(REMOTE, 2);
    directory.set_rescue_delay(RESCUE_DELAY);

    for (role, account) in [
        (Role::ProtocolAdmin, ADMIN),
        (Role::PaymentAdmin, PAYMENT_ADMIN),
        (Role::CoreStateRegistryUpdater, UPDATER),
        (Role::CoreStateRegistryProcessor, PROCESSOR),
        (Role::CoreStateRegistryRescuer, RESCUER),
        (Role::DstSwapper, KEEPER),
        (Role::TimelockStateRegistryProcessor, TIMELOCK_PROCESSOR),
    ] {
        directory.grant_role(role, &addr(account));
    }

    let bank = BankKeeper::new();
    let positions = PositionKeeper::new();
    let mut host = HostKeeper::new(directory.clone(), bank.clone(), positions.clone());

    let vault = VaultKeeper::new(addr(VAULT), addr(USDC), CORE_STATE_REGISTRY_ID);
    let timelocked = VaultKeeper::new(
        addr(TIMELOCKED_VAULT),
        addr(USDC),
        TIMELOCK_STATE_REGISTRY_ID,
    );
    host.add_form(vault.clone());
    host.add_form(timelocked.clone());

    let bridge = BridgeKeeper::new(addr(BRIDGE), bank.clone());
    host.add_validator(BRIDGE_ID, PackedRouteValidator::default());
    host.add_bridge(BRIDGE_ID, bridge.clone());

    let ambs: Vec<AmbKeeper> = AMB_IDS
        .iter()
        .map(|&id| {
            let amb = AmbKeeper::new(Uint256::from(1_000u128), Uint256::one());
            host.add_amb(id, amb.clone());
            amb
        })
        .collect();

    let mut deps = mock_dependencies();
    for chain_id in [LOCAL, REMOTE] {
        payment::add_remote_chain(
            deps.as_mut(),
            &info(ADMIN),
            &host,
            chain_id,
            default_payment_config(),
        )
        .unwrap();
    }

    Registry {
        deps,
        env: mock_env(),
        host,
        directory,
        bank,
        positions,
        vault,
        timelocked,
        bridge,
        ambs,
    }
}

pub fn default_payment_config() -> PaymentConfig {
    PaymentConfig {
        swap_gas_used: Uint256::from(150_000u128),
        update_gas_used: Uint256::from(50_000u128),
        deposit_gas_used: Uint256::from(200_000u128),
        withdraw_gas_used: Uint256::from(250_000u128),
        default_native_price: Uint256::from(100_000_000u128),
        default_gas_price: Uint256::from(10u128),
        gas_per_byte: Uint256::from(2u128),
        ack_gas_cost: Uint256::from(100_000u128),
        timelock_cost: Uint256::from(300_000u128),
        ..Default::default()
    }
}

pub fn vault_request(superform: &str, form_id: u32, amount: u128) -> VaultRequest {
    VaultRequest {
        superform_id: SuperformId::new(addr(superform), form_id, LOCAL).unwrap(),
        amount: Uint256::from(amount),
        max_slippage: 100,
        liq_request: LiqRequest {
            bridge_id: BRIDGE_ID,
            tx_data: Binary::default(),
            token: addr(USDC),
            interim_token: None,
            liq_dst_chain_id: LOCAL,
            native_amount: Uint256::zero(),
        },
        has_dst_swap: false,
    }
}

pub fn deposit_vault(amount: u128) -> VaultRequest {
    vault_request(VAULT, 1, amount)
}

/// A deposit that arrives as WETH and must be swapped into USDC on this chain.
pub fn swap_vault(amount: u128) -> VaultRequest {
    let mut v = deposit_vault(amount);
    v.liq_request.interim_token = Some(addr(WETH));
    v.has_dst_swap = true;
    v
}

pub fn timelocked_vault(amount: u128) -> VaultRequest {
    let mut v = vault_request(TIMELOCKED_VAULT, TIMELOCK_FORM_ID, amount);
    v.liq_request.liq_dst_chain_id = REMOTE;
    v
}

pub fn init_message(tx_type: TransactionType, vaults: Vec<VaultRequest>) -> AmbMessage {
    let multi = vaults.len() > 1;
    let data = InitMultiVaultData {
        payload_id: 77,
        vaults,
        receiver: addr(USER),
    };

    AmbMessage::Payload {
        header: PayloadHeader {
            tx_type,
            callback: CallbackType::Init,
            multi,
            registry_id: CORE_STATE_REGISTRY_ID,
            src_sender: addr(USER),
            src_chain_id: REMOTE,
        },
        amb_ids: vec![1, 2],
        body: data.encode(multi).unwrap(),
    }
}

pub fn deposit_message(vaults: Vec<VaultRequest>) -> AmbMessage {
    init_message(TransactionType::Deposit, vaults)
}

pub fn withdraw_message(vaults: Vec<VaultRequest>) -> AmbMessage {
    init_message(TransactionType::Withdraw, vaults)
}

pub fn single_body(message: &AmbMessage) -> InitSingleVaultData {
    match message {
        AmbMessage::Payload { body, .. } => cosmwasm_std::from_json(body).unwrap(),
        AmbMessage::Proof { .. } => panic!("not a payload"),
    }
}

/// A same-chain swap of `amount_in` WETH into USDC paid to the core registry.
pub fn swap_tx(amount_in: u128) -> Binary {
    PackedRoute::swap(
        LOCAL,
        Uint256::from(amount_in),
        &addr(WETH),
        &addr(USDC),
        &addr(CORE),
    )
    .encode()
    .map(Binary::from)
    .unwrap()
}

/// A route bridging `amount_in` USDC back to the user on the remote chain.
pub fn withdraw_tx(amount_in: u128) -> Binary {
    PackedRoute::bridge(
        REMOTE,
        Uint256::from(amount_in),
        &addr(USDC),
        &addr(USDC),
        &addr(USER),
    )
    .encode()
    .map(Binary::from)
    .unwrap()
}

impl Registry {
    pub fn deliver(&mut self, amb_id: u8, message: &AmbMessage) -> anyhow::Result<Event> {
        core::receive_payload(
            self.deps.as_mut(),
            &info(&amb_address(amb_id)),
            &self.host,
            REMOTE,
            amb_id,
            &to_json_binary(message).unwrap(),
        )
    }

    /// Delivers the full message over AMB 1 and its proof over AMB 2, and returns the payload
    /// id it was stored under.
    pub fn deliver_with_quorum(&mut self, message: &AmbMessage) -> u64 {
        self.deliver(1, message).unwrap();
        self.deliver(2, &message.to_proof().unwrap()).unwrap();
        core::query_payloads_count(self.deps.as_ref()).unwrap()
    }

    pub fn update_deposit(&mut self, payload_id: u64, amounts: &[u128]) -> anyhow::Result<Event> {
        let amounts: Vec<Uint256> = amounts.iter().map(|&a| Uint256::from(a)).collect();
        core::update_deposit_payload(
            self.deps.as_mut(),
            &info(UPDATER),
            &self.host,
            payload_id,
            &amounts,
        )
    }

    pub fn process(&mut self, payload_id: u64) -> anyhow::Result<Vec<Event>> {
        core::process_payload(
            self.deps.as_mut(),
            &self.env,
            &info(PROCESSOR),
            &self.host,
            payload_id,
            None,
        )
    }

    pub fn advance(&mut self, seconds: u64) {
        self.env.block.time = self.env.block.time.plus_seconds(seconds);
    }

    pub fn balance(&self, token: &str, holder: &str) -> Uint256 {
        use registry_bindings::Ledger;
        self.bank.balance(&addr(token), &addr(holder))
    }
}
