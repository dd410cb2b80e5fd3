//! Liquidity bridge validators.
//!
//! Each bridge encodes its call data differently.  A validator decodes it into a `Route` so the
//! chain, token and receiver checks below are shared by every bridge.

use anyhow::ensure;
use cosmwasm_std::{Addr, Uint256};
use registry_bindings::ValidationArgs;

use crate::ContractError;

mod order;
mod packed;

pub use order::{OrderRoute, OrderRouteValidator};
pub use packed::{PackedRoute, PackedRouteValidator};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteAction {
    Bridge,
    Swap,
    SwapAndBridge,
}

/// The uniform view of a liquidity route.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Route {
    pub action: RouteAction,
    pub input_token: Addr,
    pub amount_in: Uint256,
    pub output_token: Addr,
    pub receiver: Addr,
    pub dst_chain_id: u64,
}

fn validate_route(
    route: &Route,
    args: &ValidationArgs,
    intermediaries: &[Addr],
) -> anyhow::Result<()> {
    ensure!(
        route.dst_chain_id == args.liq_dst_chain_id,
        ContractError::InvalidChainId
    );
    if args.deposit {
        // Deposits must deliver to the chain of the vault.
        ensure!(
            args.liq_dst_chain_id == args.dst_chain_id,
            ContractError::InvalidChainId
        );
    }

    let same_chain = args.liq_dst_chain_id == args.src_chain_id;
    let action_ok = match route.action {
        RouteAction::Swap => same_chain,
        RouteAction::Bridge | RouteAction::SwapAndBridge => !same_chain,
    };
    ensure!(action_ok, ContractError::InvalidAction);

    // Deposits settle into a protocol contract.  Withdrawals pay the user, possibly through a
    // known intermediary.
    let receiver_ok = route.receiver == args.receiver
        || (!args.deposit && intermediaries.contains(&route.receiver));
    ensure!(receiver_ok, ContractError::InvalidReceiver);

    if let Some(interim) = &args.interim_token {
        ensure!(
            route.output_token == *interim,
            ContractError::InvalidInterimToken
        );
    }

    if let Some(output) = &args.output_token {
        ensure!(route.output_token == *output, ContractError::InvalidToken);
    }

    ensure!(route.input_token == args.token, ContractError::InvalidToken);

    Ok(())
}

fn amount_in(route: &Route, deposit: bool) -> anyhow::Result<Uint256> {
    ensure!(
        !(deposit && route.action == RouteAction::Swap),
        ContractError::InvalidAction
    );
    Ok(route.amount_in)
}

fn dst_swap(route: Route) -> anyhow::Result<(Addr, Uint256)> {
    ensure!(route.action == RouteAction::Swap, ContractError::InvalidAction);
    Ok((route.input_token, route.amount_in))
}
