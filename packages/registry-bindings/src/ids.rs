use std::{fmt, str::FromStr};

use anyhow::{anyhow, ensure, Context};
use cosmwasm_schema::cw_serde;
use cosmwasm_std::Addr;

/// Token identifier used for the chain's native currency.
pub const NATIVE_TOKEN: &str = "native";

/// Registry id of the core payload state machine.
pub const CORE_STATE_REGISTRY_ID: u8 = 1;

/// Registry id of the two-step (timelocked) form state registry.
pub const TIMELOCK_STATE_REGISTRY_ID: u8 = 2;

/// Form id of the timelocked vault adapter.  Withdrawals through these forms wait out a
/// cooldown and are finalized by the two-step registry.
pub const TIMELOCK_FORM_ID: u32 = 2;

pub fn native_token() -> Addr {
    Addr::unchecked(NATIVE_TOKEN)
}

pub fn is_native(token: &Addr) -> bool {
    token.as_str() == NATIVE_TOKEN
}

/// Canonical address of a vault form on a specific chain.
///
/// The string encoding is `<chain_id>/<form_id>/<superform>` and round-trips losslessly through
/// `Display` and `FromStr`.
///
/// # Examples
///
/// ```
/// # fn example() -> anyhow::Result<()> {
/// use cosmwasm_std::Addr;
/// use registry_bindings::SuperformId;
///
/// let id = SuperformId::new(Addr::unchecked("vault"), 1, 137)?;
/// let encoded = id.to_string();
/// assert_eq!(encoded, "137/1/vault");
/// assert_eq!(id, encoded.parse()?);
/// #
/// #     Ok(())
/// # }
/// #
/// # example().unwrap();
/// ```
#[cw_serde]
#[derive(Eq, PartialOrd, Ord, Hash)]
pub struct SuperformId {
    // The chain on which the form is deployed.
    chain_id: u64,
    // The form implementation kind.
    form_id: u32,
    // The address of the form wrapping the vault.
    superform: Addr,
}

impl SuperformId {
    pub fn new(superform: Addr, form_id: u32, chain_id: u64) -> anyhow::Result<Self> {
        let id = Self {
            chain_id,
            form_id,
            superform,
        };
        id.validate()?;
        Ok(id)
    }

    /// Checks the field ranges.  Ids decoded from an untrusted payload must be validated before
    /// use since deserialization bypasses `new`.
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.chain_id != 0, "superform id chain must be non-zero");
        ensure!(self.form_id != 0, "superform id form must be non-zero");
        ensure!(
            !self.superform.as_str().is_empty(),
            "superform id address must be non-empty"
        );
        ensure!(
            !self.superform.as_str().contains('/'),
            "superform id address must not contain '/'"
        );

        Ok(())
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn form_id(&self) -> u32 {
        self.form_id
    }

    pub fn superform(&self) -> &Addr {
        &self.superform
    }
}

impl fmt::Display for SuperformId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}/{}", self.chain_id, self.form_id, self.superform)
    }
}

impl FromStr for SuperformId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut components = s.splitn(3, '/');

        let chain_id: u64 = components
            .next()
            .map(str::parse)
            .transpose()
            .context("failed to parse chain id")?
            .ok_or_else(|| anyhow!("missing chain id"))?;

        let form_id: u32 = components
            .next()
            .map(str::parse)
            .transpose()
            .context("failed to parse form id")?
            .ok_or_else(|| anyhow!("missing form id"))?;

        let superform = components
            .next()
            .map(Addr::unchecked)
            .ok_or_else(|| anyhow!("missing superform address"))?;

        Self::new(superform, form_id, chain_id)
    }
}

/// Privileged roles checked through the `Directory`.
#[cw_serde]
#[derive(Copy, Eq, PartialOrd, Ord, Hash)]
pub enum Role {
    ProtocolAdmin,
    PaymentAdmin,
    CoreStateRegistryUpdater,
    CoreStateRegistryProcessor,
    CoreStateRegistryRescuer,
    DstSwapper,
    TimelockStateRegistryProcessor,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Role::ProtocolAdmin => "PROTOCOL_ADMIN_ROLE",
            Role::PaymentAdmin => "PAYMENT_ADMIN_ROLE",
            Role::CoreStateRegistryUpdater => "CORE_STATE_REGISTRY_UPDATER_ROLE",
            Role::CoreStateRegistryProcessor => "CORE_STATE_REGISTRY_PROCESSOR_ROLE",
            Role::CoreStateRegistryRescuer => "CORE_STATE_REGISTRY_RESCUER_ROLE",
            Role::DstSwapper => "DST_SWAPPER_ROLE",
            Role::TimelockStateRegistryProcessor => "TIMELOCK_STATE_REGISTRY_PROCESSOR_ROLE",
        };
        f.write_str(name)
    }
}

/// Well-known addresses resolved through the `Directory`.
#[cw_serde]
#[derive(Copy, Eq, PartialOrd, Ord, Hash)]
pub enum AddressId {
    CoreStateRegistry,
    DstSwapper,
    TimelockStateRegistry,
    /// The implementation contract of the AMB with the given id.
    AmbImplementation(u8),
}
