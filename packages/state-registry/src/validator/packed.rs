use std::str;

use anyhow::{ensure, Context};
use cosmwasm_std::{Addr, Uint256};
use registry_bindings::{BridgeValidator, ValidationArgs};

use super::{Route, RouteAction};
use crate::ContractError;

const ACTION_BRIDGE: u8 = 1;
const ACTION_SWAP: u8 = 2;
const ACTION_SWAP_AND_BRIDGE: u8 = 3;

/// A route in the fixed binary layout:
///
/// | field        | encoding                      |
/// |--------------|-------------------------------|
/// | action       | u8                            |
/// | dst_chain_id | u64, big-endian               |
/// | amount_in    | u256, big-endian              |
/// | input_token  | u16 big-endian length + utf-8 |
/// | output_token | u16 big-endian length + utf-8 |
/// | receiver     | u16 big-endian length + utf-8 |
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackedRoute {
    pub action: u8,
    pub dst_chain_id: u64,
    pub amount_in: Uint256,
    pub input_token: Addr,
    pub output_token: Addr,
    pub receiver: Addr,
}

impl PackedRoute {
    pub fn bridge(
        dst_chain_id: u64,
        amount_in: Uint256,
        input_token: &Addr,
        output_token: &Addr,
        receiver: &Addr,
    ) -> Self {
        PackedRoute {
            action: ACTION_BRIDGE,
            dst_chain_id,
            amount_in,
            input_token: input_token.clone(),
            output_token: output_token.clone(),
            receiver: receiver.clone(),
        }
    }

    pub fn swap(
        chain_id: u64,
        amount_in: Uint256,
        input_token: &Addr,
        output_token: &Addr,
        receiver: &Addr,
    ) -> Self {
        PackedRoute {
            action: ACTION_SWAP,
            ..Self::bridge(chain_id, amount_in, input_token, output_token, receiver)
        }
    }

    pub fn encode(&self) -> anyhow::Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(41 + 6 + 64);
        buf.push(self.action);
        buf.extend_from_slice(&self.dst_chain_id.to_be_bytes());
        buf.extend_from_slice(&self.amount_in.to_be_bytes());
        for a in [&self.input_token, &self.output_token, &self.receiver] {
            let s = a.as_bytes();
            let len = u16::try_from(s.len()).context("address too long")?;
            buf.extend_from_slice(&len.to_be_bytes());
            buf.extend_from_slice(s);
        }
        Ok(buf)
    }

    pub fn decode(data: &[u8]) -> anyhow::Result<Self> {
        let mut r = Reader::new(data);

        let route = PackedRoute {
            action: r.u8()?,
            dst_chain_id: r.u64()?,
            amount_in: r.u256()?,
            input_token: r.addr()?,
            output_token: r.addr()?,
            receiver: r.addr()?,
        };
        r.finish()?;

        Ok(route)
    }

    fn into_route(self) -> anyhow::Result<Route> {
        let action = match self.action {
            ACTION_BRIDGE => RouteAction::Bridge,
            ACTION_SWAP => RouteAction::Swap,
            ACTION_SWAP_AND_BRIDGE => RouteAction::SwapAndBridge,
            _ => return Err(ContractError::InvalidAction.into()),
        };

        Ok(Route {
            action,
            input_token: self.input_token,
            amount_in: self.amount_in,
            output_token: self.output_token,
            receiver: self.receiver,
            dst_chain_id: self.dst_chain_id,
        })
    }
}

/// Bounds checked big-endian reader.  Any short read is a decode error.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Reader { data, pos: 0 }
    }

    fn bytes(&mut self, n: usize) -> anyhow::Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.data.len())
            .ok_or(ContractError::DecodeTxData)?;
        let b = &self.data[self.pos..end];
        self.pos = end;
        Ok(b)
    }

    fn const_bytes<const N: usize>(&mut self) -> anyhow::Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> anyhow::Result<u8> {
        self.const_bytes::<1>().map(|b| b[0])
    }

    fn u16(&mut self) -> anyhow::Result<u16> {
        self.const_bytes().map(u16::from_be_bytes)
    }

    fn u64(&mut self) -> anyhow::Result<u64> {
        self.const_bytes().map(u64::from_be_bytes)
    }

    fn u256(&mut self) -> anyhow::Result<Uint256> {
        self.const_bytes().map(Uint256::from_be_bytes)
    }

    fn addr(&mut self) -> anyhow::Result<Addr> {
        let len = self.u16()?;
        let raw = self.bytes(usize::from(len))?;
        let s = str::from_utf8(raw).map_err(|_| ContractError::DecodeTxData)?;
        Ok(Addr::unchecked(s))
    }

    fn finish(self) -> anyhow::Result<()> {
        ensure!(self.pos == self.data.len(), ContractError::DecodeTxData);
        Ok(())
    }
}

fn route(tx_data: &[u8]) -> anyhow::Result<Route> {
    PackedRoute::decode(tx_data).and_then(PackedRoute::into_route)
}

/// Validator for bridges using the packed binary layout.
#[derive(Clone, Debug, Default)]
pub struct PackedRouteValidator {
    // Receivers other than the user that withdrawals may pay through.
    intermediaries: Vec<Addr>,
}

impl PackedRouteValidator {
    pub fn new(intermediaries: Vec<Addr>) -> Self {
        PackedRouteValidator { intermediaries }
    }
}

impl BridgeValidator for PackedRouteValidator {
    fn validate_tx_data(&self, args: &ValidationArgs) -> anyhow::Result<()> {
        let route = route(&args.tx_data)?;
        super::validate_route(&route, args, &self.intermediaries)
    }

    fn decode_dst_swap(&self, tx_data: &[u8]) -> anyhow::Result<(Addr, Uint256)> {
        route(tx_data).and_then(super::dst_swap)
    }

    fn decode_swap_output_token(&self, tx_data: &[u8]) -> anyhow::Result<Addr> {
        PackedRoute::decode(tx_data)
            .map(|r| r.output_token)
            .map_err(|_| ContractError::CannotDecodeSwapOutputToken.into())
    }

    fn decode_amount_in(&self, tx_data: &[u8], deposit: bool) -> anyhow::Result<Uint256> {
        route(tx_data).and_then(|r| super::amount_in(&r, deposit))
    }

    fn validate_receiver(&self, tx_data: &[u8], receiver: &Addr) -> bool {
        PackedRoute::decode(tx_data)
            .map(|r| r.receiver == *receiver)
            .unwrap_or(false)
    }
}
