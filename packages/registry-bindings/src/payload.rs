use std::fmt;

use anyhow::{anyhow, ensure, Context};
use cosmwasm_schema::cw_serde;
use cosmwasm_std::{from_json, to_json_binary, Addr, Binary, StdResult, Timestamp, Uint256};
use sha3::{Digest, Keccak256};

use crate::SuperformId;

#[cw_serde]
#[derive(Copy, Eq)]
pub enum TransactionType {
    Deposit,
    Withdraw,
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionType::Deposit => f.write_str("DEPOSIT"),
            TransactionType::Withdraw => f.write_str("WITHDRAW"),
        }
    }
}

#[cw_serde]
#[derive(Copy, Eq)]
pub enum CallbackType {
    Init,
    Return,
    Fail,
}

impl fmt::Display for CallbackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallbackType::Init => f.write_str("INIT"),
            CallbackType::Return => f.write_str("RETURN"),
            CallbackType::Fail => f.write_str("FAIL"),
        }
    }
}

#[cw_serde]
pub struct PayloadHeader {
    pub tx_type: TransactionType,
    pub callback: CallbackType,
    // Whether the body carries a list of vaults.
    pub multi: bool,
    // The registry that should handle the payload on arrival.
    pub registry_id: u8,
    pub src_sender: Addr,
    pub src_chain_id: u64,
}

/// Instructions for moving liquidity with a liquidity bridge.
#[cw_serde]
pub struct LiqRequest {
    pub bridge_id: u8,
    // Opaque, bridge specific call data.  May be empty for withdrawals and filled in later by an
    // updater.
    pub tx_data: Binary,
    // The token the bridge pulls from the caller.
    pub token: Addr,
    // The token delivered mid-route when a destination swap is required.
    pub interim_token: Option<Addr>,
    pub liq_dst_chain_id: u64,
    pub native_amount: Uint256,
}

#[cw_serde]
pub struct VaultRequest {
    pub superform_id: SuperformId,
    pub amount: Uint256,
    // Maximum slippage in basis points.
    pub max_slippage: u16,
    pub liq_request: LiqRequest,
    pub has_dst_swap: bool,
}

#[cw_serde]
pub struct InitSingleVaultData {
    pub payload_id: u64,
    pub vault: VaultRequest,
    pub receiver: Addr,
}

#[cw_serde]
pub struct InitMultiVaultData {
    pub payload_id: u64,
    pub vaults: Vec<VaultRequest>,
    pub receiver: Addr,
}

impl From<InitSingleVaultData> for InitMultiVaultData {
    fn from(data: InitSingleVaultData) -> Self {
        Self {
            payload_id: data.payload_id,
            vaults: vec![data.vault],
            receiver: data.receiver,
        }
    }
}

impl InitMultiVaultData {
    /// Decodes an INIT payload body.  A single vault body is returned as a one element list so
    /// callers can treat both shapes uniformly.
    pub fn decode(body: &[u8], multi: bool) -> anyhow::Result<Self> {
        let data = if multi {
            from_json::<Self>(body).context("failed to decode multi vault data")?
        } else {
            from_json::<InitSingleVaultData>(body)
                .map(Self::from)
                .context("failed to decode single vault data")?
        };

        Ok(data)
    }

    /// Checks every superform id in the body.  Deserialization bypasses `SuperformId::new`, so
    /// bodies from the wire must pass this before use.
    pub fn validate(&self) -> anyhow::Result<()> {
        for v in &self.vaults {
            v.superform_id
                .validate()
                .with_context(|| format!("invalid superform id {}", v.superform_id))?;
        }

        Ok(())
    }

    /// Encodes the body back into the shape indicated by `multi`.
    pub fn encode(&self, multi: bool) -> anyhow::Result<Binary> {
        if multi {
            return to_json_binary(self).context("failed to encode multi vault data");
        }

        ensure!(
            self.vaults.len() == 1,
            "single vault payload must carry exactly one vault, found {}",
            self.vaults.len()
        );
        let single = self
            .single(0)
            .ok_or_else(|| anyhow!("missing vault data"))?;
        to_json_binary(&single).context("failed to encode single vault data")
    }

    pub fn single(&self, index: usize) -> Option<InitSingleVaultData> {
        self.vaults.get(index).map(|v| InitSingleVaultData {
            payload_id: self.payload_id,
            vault: v.clone(),
            receiver: self.receiver.clone(),
        })
    }
}

/// Acknowledgement for a single vault.
#[cw_serde]
pub struct ReturnSingleData {
    pub payload_id: u64,
    pub superform_id: SuperformId,
    pub amount: Uint256,
}

/// Acknowledgement for several vaults of the same source payload.
#[cw_serde]
pub struct ReturnMultiData {
    pub payload_id: u64,
    pub superform_ids: Vec<SuperformId>,
    pub amounts: Vec<Uint256>,
}

impl ReturnMultiData {
    /// Encodes the acknowledgement in the shape indicated by `multi`.
    pub fn encode(&self, multi: bool) -> anyhow::Result<Binary> {
        ensure!(
            self.superform_ids.len() == self.amounts.len(),
            "acknowledgement has {} superforms but {} amounts",
            self.superform_ids.len(),
            self.amounts.len()
        );
        if multi {
            return to_json_binary(self).context("failed to encode multi return data");
        }

        match (&self.superform_ids[..], &self.amounts[..]) {
            ([superform_id], [amount]) => to_json_binary(&ReturnSingleData {
                payload_id: self.payload_id,
                superform_id: superform_id.clone(),
                amount: *amount,
            })
            .context("failed to encode single return data"),
            _ => Err(anyhow!(
                "single acknowledgement must carry exactly one vault, found {}",
                self.amounts.len()
            )),
        }
    }
}

/// A message carried by an AMB.  The first AMB of a dispatch carries the full payload and the
/// remaining AMBs carry a proof: the keccak-256 digest of the full message.
#[cw_serde]
pub enum AmbMessage {
    Payload {
        header: PayloadHeader,
        amb_ids: Vec<u8>,
        body: Binary,
    },
    Proof {
        proof: Binary,
    },
}

impl AmbMessage {
    pub fn encode(&self) -> StdResult<Binary> {
        to_json_binary(self)
    }

    /// Returns the keccak-256 digest of the encoded message.
    pub fn digest(&self) -> StdResult<[u8; 32]> {
        let encoded = self.encode()?;
        Ok(Keccak256::digest(encoded.as_slice()).into())
    }

    /// Returns the hash this message contributes to quorum: the digest of a full payload, or
    /// the digest carried by a proof.
    pub fn message_hash(&self) -> anyhow::Result<[u8; 32]> {
        match self {
            AmbMessage::Payload { .. } => self.digest().context("failed to digest message"),
            AmbMessage::Proof { proof } => <[u8; 32]>::try_from(proof.as_slice())
                .map_err(|_| anyhow!("invalid proof length; want 32, got {}", proof.len())),
        }
    }

    pub fn to_proof(&self) -> anyhow::Result<AmbMessage> {
        self.message_hash().map(|h| AmbMessage::Proof {
            proof: Binary::from(h.to_vec()),
        })
    }
}

/// Per-AMB gas budgets and transport specific data for an outbound dispatch.
#[cw_serde]
#[derive(Default)]
pub struct AmbExtraData {
    pub gas_per_amb: Vec<Uint256>,
    pub extra_data_per_amb: Vec<Binary>,
}

#[cw_serde]
#[derive(Copy, Eq)]
pub enum RequestKind {
    Direct,
    CrossChain,
}

#[cw_serde]
#[derive(Copy, Eq)]
pub enum TimelockStatus {
    Pending,
    Processed,
}

/// A withdrawal waiting out a vault cooldown in the two-step registry.
#[cw_serde]
pub struct TimelockPayload {
    pub kind: RequestKind,
    pub src_sender: Addr,
    pub src_chain_id: u64,
    pub locked_till: Timestamp,
    pub data: InitSingleVaultData,
    pub status: TimelockStatus,
}
