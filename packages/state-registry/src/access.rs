use cosmwasm_std::Addr;
use registry_bindings::{AddressId, Host, Role};

use crate::ContractError;

pub(crate) fn ensure_role(host: &dyn Host, role: Role, account: &Addr) -> anyhow::Result<()> {
    if host.directory().has_role(role, account) {
        Ok(())
    } else {
        Err(ContractError::NotPrivilegedCaller(role).into())
    }
}

pub(crate) fn address(host: &dyn Host, id: AddressId) -> anyhow::Result<Addr> {
    host.directory()
        .address(id)
        .ok_or_else(|| ContractError::AddressNotRegistered(id).into())
}
