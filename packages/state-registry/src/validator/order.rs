use anyhow::ensure;
use cosmwasm_schema::cw_serde;
use cosmwasm_std::{from_json, to_json_binary, Addr, Binary, StdResult, Uint256};
use registry_bindings::{BridgeValidator, ValidationArgs};

use super::{Route, RouteAction};
use crate::ContractError;

const ACTION_CREATE_ORDER: u8 = 0;
const ACTION_SWAP: u8 = 1;
const ACTION_SWAP_AND_CREATE_ORDER: u8 = 2;

/// An order for an intent-style bridge, JSON encoded.  Takers fill the order on the destination
/// chain and the `authority` may patch or cancel it there.
#[cw_serde]
pub struct OrderRoute {
    pub action: u8,
    pub give_token: Addr,
    pub give_amount: Uint256,
    pub take_token: Addr,
    pub take_chain_id: u64,
    pub receiver: Addr,
    pub authority: Addr,
}

impl OrderRoute {
    pub fn encode(&self) -> StdResult<Binary> {
        to_json_binary(self)
    }

    pub fn decode(data: &[u8]) -> anyhow::Result<Self> {
        from_json(data).map_err(|_| ContractError::DecodeTxData.into())
    }

    fn to_route(&self) -> anyhow::Result<Route> {
        let action = match self.action {
            ACTION_CREATE_ORDER => RouteAction::Bridge,
            ACTION_SWAP => RouteAction::Swap,
            ACTION_SWAP_AND_CREATE_ORDER => RouteAction::SwapAndBridge,
            _ => return Err(ContractError::InvalidAction.into()),
        };

        Ok(Route {
            action,
            input_token: self.give_token.clone(),
            amount_in: self.give_amount,
            output_token: self.take_token.clone(),
            receiver: self.receiver.clone(),
            dst_chain_id: self.take_chain_id,
        })
    }
}

fn route(tx_data: &[u8]) -> anyhow::Result<Route> {
    OrderRoute::decode(tx_data).and_then(|o| o.to_route())
}

/// Validator for order routes.  In addition to the shared checks the order authority must be
/// the expected sender, otherwise a third party could redirect the order after submission.
#[derive(Clone, Debug, Default)]
pub struct OrderRouteValidator {
    intermediaries: Vec<Addr>,
}

impl OrderRouteValidator {
    pub fn new(intermediaries: Vec<Addr>) -> Self {
        OrderRouteValidator { intermediaries }
    }
}

impl BridgeValidator for OrderRouteValidator {
    fn validate_tx_data(&self, args: &ValidationArgs) -> anyhow::Result<()> {
        let order = OrderRoute::decode(&args.tx_data)?;
        super::validate_route(&order.to_route()?, args, &self.intermediaries)?;

        ensure!(order.authority == args.sender, ContractError::InvalidAuthority);
        Ok(())
    }

    fn decode_dst_swap(&self, tx_data: &[u8]) -> anyhow::Result<(Addr, Uint256)> {
        route(tx_data).and_then(super::dst_swap)
    }

    fn decode_swap_output_token(&self, tx_data: &[u8]) -> anyhow::Result<Addr> {
        OrderRoute::decode(tx_data)
            .map(|o| o.take_token)
            .map_err(|_| ContractError::CannotDecodeSwapOutputToken.into())
    }

    fn decode_amount_in(&self, tx_data: &[u8], deposit: bool) -> anyhow::Result<Uint256> {
        route(tx_data).and_then(|r| super::amount_in(&r, deposit))
    }

    fn validate_receiver(&self, tx_data: &[u8], receiver: &Addr) -> bool {
        OrderRoute::decode(tx_data)
            .map(|o| o.receiver == *receiver)
            .unwrap_or(false)
    }
}
