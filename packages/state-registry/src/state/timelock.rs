use cw_storage_plus::{Item, Map};
use registry_bindings::payload::TimelockPayload;

pub const TIMELOCK_PAYLOAD_COUNTER: Item<u64> = Item::new("timelock/payload_counter");

pub const TIMELOCK_PAYLOADS: Map<u64, TimelockPayload> = Map::new("timelock/payloads");
