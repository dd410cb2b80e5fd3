use anyhow::ensure;
use cosmwasm_schema::cw_serde;
use cosmwasm_std::{Addr, Binary, Timestamp, Uint256};
use cw_storage_plus::{Item, Map};
use registry_bindings::{payload::PayloadHeader, SuperformId};

use super::PayloadState;
use crate::ContractError;

pub const PAYLOADS_COUNT: Item<u64> = Item::new("core/payloads_count");

pub const PAYLOAD_HEADERS: Map<u64, PayloadHeader> = Map::new("core/payload_headers");

pub const PAYLOAD_BODIES: Map<u64, Binary> = Map::new("core/payload_bodies");

pub const PAYLOAD_TRACKING: Map<u64, PayloadState> = Map::new("core/payload_tracking");

// The AMBs named by the sender of each payload.  Acknowledgements travel back over them.
pub const PAYLOAD_AMBS: Map<u64, Vec<u8>> = Map::new("core/payload_ambs");

// The message hash each payload was received under.
pub const PAYLOAD_PROOFS: Map<u64, Binary> = Map::new("core/payload_proofs");

pub const PAYLOAD_BY_HASH: Map<&[u8], u64> = Map::new("core/payload_by_hash");

pub const MESSAGE_QUORUM: Map<&[u8], Deliveries> = Map::new("core/message_quorum");

pub const FAILED_DEPOSITS: Map<u64, FailedDeposit> = Map::new("core/failed_deposits");

/// The set of AMBs that delivered a message hash, as a bitset indexed by AMB id.
#[cw_serde]
#[derive(Copy, Default, Eq)]
pub struct Deliveries {
    ambs: u128,
}

impl Deliveries {
    pub const MAX_AMB_ID: u8 = 127;

    /// Returns the number of distinct AMBs that delivered the message.
    pub fn num_deliveries(&self) -> u32 {
        self.ambs.count_ones()
    }

    /// Records a delivery by `amb_id`.  Repeated deliveries by the same AMB are idempotent.
    pub fn add_delivery(&mut self, amb_id: u8) -> anyhow::Result<()> {
        ensure!(
            amb_id <= Self::MAX_AMB_ID,
            ContractError::InvalidAmbId(amb_id)
        );
        self.ambs |= 1u128 << amb_id;
        Ok(())
    }
}

#[cw_serde]
pub struct FailedDepositEntry {
    pub superform_id: SuperformId,
    pub settlement_token: Addr,
    // Whether the refund is paid out of the dst swapper's escrow.
    pub from_dst_swapper: bool,
    // Proposed refund amount.  Zero until a rescue is proposed.
    pub amount: Uint256,
}

/// Deposits of one payload that could not settle at the instructed amounts.
#[cw_serde]
pub struct FailedDeposit {
    pub entries: Vec<FailedDepositEntry>,
    pub receiver: Addr,
    pub last_proposed: Option<Timestamp>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn add_deliveries() {
        let mut d = Deliveries::default();
        for i in 0..=Deliveries::MAX_AMB_ID {
            d.add_delivery(i).unwrap();
            assert_eq!(u32::from(i) + 1, d.num_deliveries());
        }
    }

    #[test]
    fn repeated_delivery_counts_once() {
        let mut d = Deliveries::default();
        d.add_delivery(3).unwrap();
        d.add_delivery(3).unwrap();
        assert_eq!(1, d.num_deliveries());
    }

    #[test]
    fn out_of_bounds_amb() {
        for i in 128..=u8::MAX {
            let mut d = Deliveries::default();
            let err = d.add_delivery(i).unwrap_err();
            assert_eq!(
                Some(&ContractError::InvalidAmbId(i)),
                err.downcast_ref::<ContractError>()
            );
            assert_eq!(0, d.num_deliveries());
        }
    }
}
