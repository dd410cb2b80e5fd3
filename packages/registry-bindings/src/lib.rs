mod host;
pub mod ids;
pub mod payload;

#[cfg(feature = "fake")]
pub mod fake;

pub use host::{
    Amb, BridgeCall, BridgeValidator, Directory, Form, Host, Ledger, LiquidityBridge,
    PositionIssuer, PriceFeed, PriceRound, ValidationArgs,
};
pub use ids::{AddressId, Role, SuperformId};
