use std::{
    cell::RefCell,
    collections::{BTreeMap, BTreeSet, VecDeque},
    rc::Rc,
};

use anyhow::{anyhow, ensure};
use cosmwasm_std::{Addr, Binary, DepsMut, Env, Uint256};

use crate::{
    ids::is_native,
    payload::{AmbMessage, InitSingleVaultData, TimelockPayload},
    AddressId, Amb, BridgeCall, BridgeValidator, Directory, Form, Host, Ledger, LiquidityBridge,
    PositionIssuer, PriceFeed, PriceRound, Role, SuperformId,
};

/// Invoked while a fake capability holds control.  Tests use it to call back into the registry
/// the way a malicious vault or bridge could.
pub type Reentry = Rc<dyn Fn(DepsMut, &Env, &dyn Host)>;

/// Handles a cross-chain withdrawal on behalf of a fake form, e.g. by routing it into the
/// two-step registry.
pub type WithdrawRoute =
    Rc<dyn Fn(DepsMut, &Env, &dyn Host, &InitSingleVaultData, &Addr, u64) -> anyhow::Result<()>>;

#[derive(Debug, Default)]
struct DirectoryInner {
    chain_id: u64,
    roles: BTreeSet<(Role, Addr)>,
    addresses: BTreeMap<AddressId, Addr>,
    registry_ids: BTreeMap<Addr, u8>,
    quorums: BTreeMap<u64, u32>,
    rescue_delay: u64,
}

#[derive(Clone, Debug, Default)]
pub struct DirectoryKeeper(Rc<RefCell<DirectoryInner>>);

impl DirectoryKeeper {
    pub fn new(chain_id: u64) -> DirectoryKeeper {
        DirectoryKeeper(Rc::new(RefCell::new(DirectoryInner {
            chain_id,
            ..Default::default()
        })))
    }

    pub fn grant_role(&self, role: Role, account: &Addr) {
        self.0.borrow_mut().roles.insert((role, account.clone()));
    }

    pub fn revoke_role(&self, role: Role, account: &Addr) {
        self.0.borrow_mut().roles.remove(&(role, account.clone()));
    }

    pub fn set_address(&self, id: AddressId, addr: &Addr) {
        self.0.borrow_mut().addresses.insert(id, addr.clone());
    }

    pub fn set_state_registry_id(&self, registry: &Addr, id: u8) {
        self.0.borrow_mut().registry_ids.insert(registry.clone(), id);
    }

    pub fn set_required_quorum(&self, src_chain_id: u64, quorum: u32) {
        self.0.borrow_mut().quorums.insert(src_chain_id, quorum);
    }

    pub fn set_rescue_delay(&self, delay: u64) {
        self.0.borrow_mut().rescue_delay = delay;
    }
}

impl Directory for DirectoryKeeper {
    fn chain_id(&self) -> u64 {
        self.0.borrow().chain_id
    }

    fn address(&self, id: AddressId) -> Option<Addr> {
        self.0.borrow().addresses.get(&id).cloned()
    }

    fn has_role(&self, role: Role, account: &Addr) -> bool {
        self.0.borrow().roles.contains(&(role, account.clone()))
    }

    fn state_registry_id(&self, registry: &Addr) -> Option<u8> {
        self.0.borrow().registry_ids.get(registry).copied()
    }

    fn required_quorum(&self, src_chain_id: u64) -> Option<u32> {
        self.0.borrow().quorums.get(&src_chain_id).copied()
    }

    fn rescue_delay(&self) -> u64 {
        self.0.borrow().rescue_delay
    }
}

#[derive(Debug, Default)]
struct BankInner {
    balances: BTreeMap<(Addr, Addr), Uint256>,
    reject_native: bool,
}

#[derive(Clone, Debug, Default)]
pub struct BankKeeper(Rc<RefCell<BankInner>>);

impl BankKeeper {
    pub fn new() -> BankKeeper {
        BankKeeper::default()
    }

    pub fn mint(&self, token: &Addr, to: &Addr, amount: Uint256) {
        let mut inner = self.0.borrow_mut();
        let balance = inner
            .balances
            .entry((token.clone(), to.clone()))
            .or_default();
        *balance += amount;
    }

    /// Makes every native transfer fail, as a recipient rejecting value would.
    pub fn reject_native_transfers(&self, reject: bool) {
        self.0.borrow_mut().reject_native = reject;
    }
}

impl Ledger for BankKeeper {
    fn balance(&self, token: &Addr, holder: &Addr) -> Uint256 {
        self.0
            .borrow()
            .balances
            .get(&(token.clone(), holder.clone()))
            .copied()
            .unwrap_or_default()
    }

    fn transfer(
        &self,
        token: &Addr,
        from: &Addr,
        to: &Addr,
        amount: Uint256,
    ) -> anyhow::Result<()> {
        let mut inner = self.0.borrow_mut();
        ensure!(
            !(inner.reject_native && is_native(token)),
            "native transfer rejected by {to}"
        );

        let key = (token.clone(), from.clone());
        let available = inner.balances.get(&key).copied().unwrap_or_default();
        let remaining = available.checked_sub(amount).map_err(|_| {
            anyhow!("insufficient {token} balance for {from}: have {available}, need {amount}")
        })?;
        inner.balances.insert(key, remaining);

        let balance = inner
            .balances
            .entry((token.clone(), to.clone()))
            .or_default();
        *balance = balance.checked_add(amount)?;

        Ok(())
    }
}

struct VaultInner {
    address: Addr,
    asset: Addr,
    registry_id: u8,
    reject_deposits: bool,
    reject_withdrawals: bool,
    deposits: Vec<InitSingleVaultData>,
    withdrawals: Vec<InitSingleVaultData>,
    cool_down_withdrawals: Vec<Uint256>,
    reentry: Option<Reentry>,
    withdraw_route: Option<WithdrawRoute>,
}

/// A vault form that mints one share per unit of asset.
#[derive(Clone)]
pub struct VaultKeeper(Rc<RefCell<VaultInner>>);

impl VaultKeeper {
    pub fn new(address: Addr, asset: Addr, registry_id: u8) -> VaultKeeper {
        VaultKeeper(Rc::new(RefCell::new(VaultInner {
            address,
            asset,
            registry_id,
            reject_deposits: false,
            reject_withdrawals: false,
            deposits: Vec::new(),
            withdrawals: Vec::new(),
            cool_down_withdrawals: Vec::new(),
            reentry: None,
            withdraw_route: None,
        })))
    }

    pub fn address(&self) -> Addr {
        self.0.borrow().address.clone()
    }

    pub fn reject_deposits(&self, reject: bool) {
        self.0.borrow_mut().reject_deposits = reject;
    }

    pub fn reject_withdrawals(&self, reject: bool) {
        self.0.borrow_mut().reject_withdrawals = reject;
    }

    pub fn set_reentry(&self, hook: Reentry) {
        self.0.borrow_mut().reentry = Some(hook);
    }

    pub fn set_withdraw_route(&self, route: WithdrawRoute) {
        self.0.borrow_mut().withdraw_route = Some(route);
    }

    pub fn deposits(&self) -> Vec<InitSingleVaultData> {
        self.0.borrow().deposits.clone()
    }

    pub fn withdrawals(&self) -> Vec<InitSingleVaultData> {
        self.0.borrow().withdrawals.clone()
    }

    pub fn cool_down_withdrawals(&self) -> Vec<Uint256> {
        self.0.borrow().cool_down_withdrawals.clone()
    }

    fn reenter(&self, deps: DepsMut, env: &Env, host: &dyn Host) {
        // Clone the hook out so no borrow is held while it runs.
        let hook = self.0.borrow().reentry.clone();
        if let Some(hook) = hook {
            hook(deps, env, host);
        }
    }
}

impl Form for VaultKeeper {
    fn vault_asset(&self) -> Addr {
        self.0.borrow().asset.clone()
    }

    fn state_registry_id(&self) -> u8 {
        self.0.borrow().registry_id
    }

    fn preview_redeem_from(&self, shares: Uint256) -> Uint256 {
        shares
    }

    fn xchain_deposit_into_vault(
        &self,
        mut deps: DepsMut,
        env: &Env,
        host: &dyn Host,
        data: &InitSingleVaultData,
        _src_sender: &Addr,
        _src_chain_id: u64,
    ) -> anyhow::Result<Uint256> {
        self.reenter(deps.branch(), env, host);

        let mut inner = self.0.borrow_mut();
        ensure!(!inner.reject_deposits, "vault rejected deposit");
        inner.deposits.push(data.clone());

        Ok(data.vault.amount)
    }

    fn xchain_withdraw_from_vault(
        &self,
        mut deps: DepsMut,
        env: &Env,
        host: &dyn Host,
        data: &InitSingleVaultData,
        src_sender: &Addr,
        src_chain_id: u64,
    ) -> anyhow::Result<()> {
        self.reenter(deps.branch(), env, host);

        ensure!(
            !self.0.borrow().reject_withdrawals,
            "vault rejected withdrawal"
        );

        let route = self.0.borrow().withdraw_route.clone();
        if let Some(route) = route {
            return route(deps, env, host, data, src_sender, src_chain_id);
        }

        self.0.borrow_mut().withdrawals.push(data.clone());
        Ok(())
    }

    fn withdraw_after_cool_down(
        &self,
        mut deps: DepsMut,
        env: &Env,
        host: &dyn Host,
        amount: Uint256,
        _payload: &TimelockPayload,
    ) -> anyhow::Result<()> {
        self.reenter(deps.branch(), env, host);

        let mut inner = self.0.borrow_mut();
        ensure!(!inner.reject_withdrawals, "vault withdrawals are paused");
        inner.cool_down_withdrawals.push(amount);

        Ok(())
    }
}

struct BridgeInner {
    address: Addr,
    outputs: VecDeque<(Addr, Addr, Uint256)>,
    calls: Vec<BridgeCall>,
    reentry: Option<Reentry>,
}

/// A liquidity bridge that pulls the input from the caller and credits queued outputs.
#[derive(Clone)]
pub struct BridgeKeeper {
    inner: Rc<RefCell<BridgeInner>>,
    bank: BankKeeper,
}

impl BridgeKeeper {
    pub fn new(address: Addr, bank: BankKeeper) -> BridgeKeeper {
        BridgeKeeper {
            inner: Rc::new(RefCell::new(BridgeInner {
                address,
                outputs: VecDeque::new(),
                calls: Vec::new(),
                reentry: None,
            })),
            bank,
        }
    }

    /// Queues `amount` of `token` to be credited to `receiver` by the next dispatch.
    pub fn push_output(&self, token: &Addr, receiver: &Addr, amount: Uint256) {
        self.inner
            .borrow_mut()
            .outputs
            .push_back((token.clone(), receiver.clone(), amount));
    }

    pub fn set_reentry(&self, hook: Reentry) {
        self.inner.borrow_mut().reentry = Some(hook);
    }

    pub fn calls(&self) -> Vec<BridgeCall> {
        self.inner.borrow().calls.clone()
    }
}

impl LiquidityBridge for BridgeKeeper {
    fn dispatch(
        &self,
        mut deps: DepsMut,
        env: &Env,
        host: &dyn Host,
        call: &BridgeCall,
    ) -> anyhow::Result<()> {
        let hook = self.inner.borrow().reentry.clone();
        if let Some(hook) = hook {
            hook(deps.branch(), env, host);
        }

        let address = self.inner.borrow().address.clone();
        self.bank
            .transfer(&call.token, &call.caller, &address, call.amount)?;

        let output = self.inner.borrow_mut().outputs.pop_front();
        if let Some((token, receiver, amount)) = output {
            self.bank.mint(&token, &receiver, amount);
        }

        self.inner.borrow_mut().calls.push(call.clone());
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dispatched {
    pub sender: Addr,
    pub dst_chain_id: u64,
    pub fee: Uint256,
    pub message: Binary,
    pub extra_data: Binary,
}

#[derive(Debug, Default)]
struct AmbInner {
    base_fee: Uint256,
    fee_per_gas: Uint256,
    dispatched: Vec<Dispatched>,
}

/// An AMB charging `base_fee + gas_limit * fee_per_gas`, where the gas limit is carried in the
/// extra data as a big-endian 256 bit integer.
#[derive(Clone, Debug, Default)]
pub struct AmbKeeper(Rc<RefCell<AmbInner>>);

impl AmbKeeper {
    pub fn new(base_fee: Uint256, fee_per_gas: Uint256) -> AmbKeeper {
        AmbKeeper(Rc::new(RefCell::new(AmbInner {
            base_fee,
            fee_per_gas,
            dispatched: Vec::new(),
        })))
    }

    pub fn dispatched(&self) -> Vec<Dispatched> {
        self.0.borrow().dispatched.clone()
    }
}

impl Amb for AmbKeeper {
    fn estimate_fees(
        &self,
        _dst_chain_id: u64,
        _message: &[u8],
        extra_data: &Binary,
    ) -> anyhow::Result<Uint256> {
        let gas_limit = if extra_data.is_empty() {
            Uint256::zero()
        } else {
            <[u8; 32]>::try_from(extra_data.as_slice())
                .map(Uint256::from_be_bytes)
                .map_err(|_| anyhow!("invalid extra data length {}", extra_data.len()))?
        };

        let inner = self.0.borrow();
        let fee = inner
            .base_fee
            .checked_add(gas_limit.checked_mul(inner.fee_per_gas)?)?;
        Ok(fee)
    }

    fn generate_extra_data(&self, gas_limit: Uint256) -> Binary {
        Binary::from(gas_limit.to_be_bytes().to_vec())
    }

    fn dispatch_payload(
        &self,
        sender: &Addr,
        dst_chain_id: u64,
        fee: Uint256,
        message: &Binary,
        extra_data: &Binary,
    ) -> anyhow::Result<()> {
        self.0.borrow_mut().dispatched.push(Dispatched {
            sender: sender.clone(),
            dst_chain_id,
            fee,
            message: message.clone(),
            extra_data: extra_data.clone(),
        });
        Ok(())
    }
}

#[derive(Clone, Debug, Default)]
pub struct OracleKeeper(Rc<RefCell<PriceRound>>);

impl OracleKeeper {
    pub fn new(price: i128, updated_at: u64) -> OracleKeeper {
        OracleKeeper(Rc::new(RefCell::new(PriceRound { price, updated_at })))
    }

    pub fn set(&self, price: i128, updated_at: u64) {
        *self.0.borrow_mut() = PriceRound { price, updated_at };
    }
}

impl PriceFeed for OracleKeeper {
    fn latest_round(&self) -> anyhow::Result<PriceRound> {
        Ok(*self.0.borrow())
    }
}

#[derive(Debug, Default)]
struct PositionInner {
    minted: Vec<(Addr, SuperformId, Uint256)>,
    synced: Vec<AmbMessage>,
}

#[derive(Clone, Debug, Default)]
pub struct PositionKeeper(Rc<RefCell<PositionInner>>);

impl PositionKeeper {
    pub fn new() -> PositionKeeper {
        PositionKeeper::default()
    }

    pub fn minted(&self) -> Vec<(Addr, SuperformId, Uint256)> {
        self.0.borrow().minted.clone()
    }

    pub fn synced(&self) -> Vec<AmbMessage> {
        self.0.borrow().synced.clone()
    }
}

impl PositionIssuer for PositionKeeper {
    fn mint_single(&self, to: &Addr, id: &SuperformId, amount: Uint256) -> anyhow::Result<()> {
        self.0
            .borrow_mut()
            .minted
            .push((to.clone(), id.clone(), amount));
        Ok(())
    }

    fn state_sync(&self, message: &AmbMessage) -> anyhow::Result<()> {
        self.0.borrow_mut().synced.push(message.clone());
        Ok(())
    }
}

/// A `Host` wired from the fakes above.
#[derive(Default)]
pub struct HostKeeper {
    directory: DirectoryKeeper,
    bank: BankKeeper,
    positions: PositionKeeper,
    forms: BTreeMap<Addr, VaultKeeper>,
    validators: BTreeMap<u8, Box<dyn BridgeValidator>>,
    bridges: BTreeMap<u8, BridgeKeeper>,
    ambs: BTreeMap<u8, AmbKeeper>,
    oracles: BTreeMap<Addr, OracleKeeper>,
}

impl HostKeeper {
    pub fn new(directory: DirectoryKeeper, bank: BankKeeper, positions: PositionKeeper) -> Self {
        HostKeeper {
            directory,
            bank,
            positions,
            ..Default::default()
        }
    }

    pub fn add_form(&mut self, form: VaultKeeper) {
        self.forms.insert(form.address(), form);
    }

    pub fn add_validator(&mut self, bridge_id: u8, validator: impl BridgeValidator + 'static) {
        self.validators.insert(bridge_id, Box::new(validator));
    }

    pub fn add_bridge(&mut self, bridge_id: u8, bridge: BridgeKeeper) {
        self.bridges.insert(bridge_id, bridge);
    }

    pub fn add_amb(&mut self, amb_id: u8, amb: AmbKeeper) {
        self.ambs.insert(amb_id, amb);
    }

    pub fn add_oracle(&mut self, oracle: &Addr, feed: OracleKeeper) {
        self.oracles.insert(oracle.clone(), feed);
    }
}

impl Host for HostKeeper {
    fn directory(&self) -> &dyn Directory {
        &self.directory
    }

    fn ledger(&self) -> &dyn Ledger {
        &self.bank
    }

    fn positions(&self) -> &dyn PositionIssuer {
        &self.positions
    }

    fn form(&self, superform: &Addr) -> Option<&dyn Form> {
        self.forms.get(superform).map(|f| f as &dyn Form)
    }

    fn bridge_validator(&self, bridge_id: u8) -> Option<&dyn BridgeValidator> {
        self.validators.get(&bridge_id).map(|v| &**v)
    }

    fn liquidity_bridge(&self, bridge_id: u8) -> Option<&dyn LiquidityBridge> {
        self.bridges
            .get(&bridge_id)
            .map(|b| b as &dyn LiquidityBridge)
    }

    fn amb(&self, amb_id: u8) -> Option<&dyn Amb> {
        self.ambs.get(&amb_id).map(|a| a as &dyn Amb)
    }

    fn price_feed(&self, oracle: &Addr) -> Option<&dyn PriceFeed> {
        self.oracles.get(oracle).map(|o| o as &dyn PriceFeed)
    }
}
