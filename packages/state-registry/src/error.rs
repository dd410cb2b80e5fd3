use std::fmt;

use registry_bindings::{AddressId, Role};
use thiserror::Error;

/// Broad failure categories so callers can tell "retry later" apart from "funds at risk".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    InputValidation,
    Unauthorized,
    State,
    Integrity,
    External,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::InputValidation => f.write_str("input_validation"),
            ErrorKind::Unauthorized => f.write_str("unauthorized"),
            ErrorKind::State => f.write_str("state"),
            ErrorKind::Integrity => f.write_str("integrity"),
            ErrorKind::External => f.write_str("external"),
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ContractError {
    #[error("invalid chain id")]
    InvalidChainId,
    #[error("invalid tx data receiver")]
    InvalidReceiver,
    #[error("invalid interim token")]
    InvalidInterimToken,
    #[error("invalid tx data token")]
    InvalidToken,
    #[error("invalid bridge action")]
    InvalidAction,
    #[error("invalid order authority")]
    InvalidAuthority,
    #[error("zero address")]
    ZeroAddress,
    #[error("zero amount")]
    ZeroAmount,
    #[error("invalid index {0}")]
    InvalidIndex(u32),
    #[error("invalid payload id {0}")]
    InvalidPayloadId(u64),
    #[error("invalid payload type")]
    InvalidPayloadType,
    #[error("no validator or bridge registered for bridge id {0}")]
    InvalidBridgeId(u8),
    #[error("no implementation registered for amb id {0}")]
    InvalidAmbId(u8),
    #[error("at least one amb is required")]
    NoAmbSelected,
    #[error("unknown superform {0}")]
    InvalidSuperform(String),
    #[error("invalid registry id")]
    InvalidRegistryId,
    #[error("array length mismatch")]
    ArrayLengthMismatch,
    #[error("invalid slippage")]
    InvalidSlippage,
    #[error("failed to decode tx data")]
    DecodeTxData,
    #[error("cannot decode final swap output token")]
    CannotDecodeSwapOutputToken,
    #[error("cannot update tx data supplied by the user")]
    CannotUpdateWithdrawTxData,
    #[error("proof must be a 32 byte message hash")]
    InvalidProof,
    #[error("failed to decode payload")]
    DecodePayload,
    #[error("invalid superform id in payload")]
    InvalidSuperformId,

    #[error("caller does not hold {0}")]
    NotPrivilegedCaller(Role),
    #[error("caller is not the amb implementation")]
    NotAmbImplementation,
    #[error("caller is not the superform")]
    NotSuperform,
    #[error("superform is not registered with this registry")]
    NotTwoStepSuperform,
    #[error("caller is not the core state registry")]
    NotCoreStateRegistry,
    #[error("caller is not the refund receiver")]
    NotValidDisputer,

    #[error("invalid payload status")]
    InvalidPayloadStatus,
    #[error("payload already processed")]
    PayloadAlreadyProcessed,
    #[error("payload already updated")]
    PayloadAlreadyUpdated,
    #[error("payload not updated")]
    PayloadNotUpdated,
    #[error("payload is locked")]
    Locked,
    #[error("quorum not reached")]
    QuorumNotReached,
    #[error("no quorum configured for chain {0}")]
    QuorumNotConfigured(u64),
    #[error("dst swap not processed yet")]
    DstSwapPending,
    #[error("dst swap already processed")]
    DstSwapAlreadyProcessed,
    #[error("dst swap already marked failed")]
    DstSwapAlreadyFailed,
    #[error("failed dst swap already updated")]
    FailedDstSwapAlreadyUpdated,
    #[error("invalid dst swap amount")]
    InvalidDstSwapAmount,
    #[error("no failed deposits for payload")]
    NoFailedDeposits,
    #[error("rescue already proposed")]
    RescueAlreadyProposed,
    #[error("rescue not proposed")]
    RescueNotProposed,
    #[error("dispute time elapsed")]
    DisputeTimeElapsed,
    #[error("rescue dispute window still open")]
    RescueLocked,
    #[error("reentrant call")]
    Reentrancy,
    #[error("no payment configuration for chain {0}")]
    ChainNotConfigured(u64),
    #[error("no address registered for {0:?}")]
    AddressNotRegistered(AddressId),
    #[error("no price feed registered at {0}")]
    PriceFeedNotRegistered(String),

    #[error("slippage out of bounds")]
    SlippageOutOfBounds,
    #[error("final amount exceeds the instructed amount")]
    NegativeSlippage,
    #[error("invalid swap output")]
    InvalidSwapOutput,
    #[error("insufficient balance")]
    InsufficientBalance,
    #[error("price oracle malfunction")]
    OracleMalfunction,

    #[error("failed to send native")]
    FailedToSendNative,
}

impl ContractError {
    pub fn kind(&self) -> ErrorKind {
        use ContractError::*;

        match self {
            InvalidChainId
            | InvalidReceiver
            | InvalidInterimToken
            | InvalidToken
            | InvalidAction
            | InvalidAuthority
            | ZeroAddress
            | ZeroAmount
            | InvalidIndex(_)
            | InvalidPayloadId(_)
            | InvalidPayloadType
            | InvalidBridgeId(_)
            | InvalidAmbId(_)
            | NoAmbSelected
            | InvalidSuperform(_)
            | InvalidRegistryId
            | ArrayLengthMismatch
            | InvalidSlippage
            | DecodeTxData
            | CannotDecodeSwapOutputToken
            | CannotUpdateWithdrawTxData
            | InvalidProof
            | DecodePayload
            | InvalidSuperformId => ErrorKind::InputValidation,

            NotPrivilegedCaller(_)
            | NotAmbImplementation
            | NotSuperform
            | NotTwoStepSuperform
            | NotCoreStateRegistry
            | NotValidDisputer => ErrorKind::Unauthorized,

            InvalidPayloadStatus
            | PayloadAlreadyProcessed
            | PayloadAlreadyUpdated
            | PayloadNotUpdated
            | Locked
            | QuorumNotReached
            | QuorumNotConfigured(_)
            | DstSwapPending
            | DstSwapAlreadyProcessed
            | DstSwapAlreadyFailed
            | FailedDstSwapAlreadyUpdated
            | InvalidDstSwapAmount
            | NoFailedDeposits
            | RescueAlreadyProposed
            | RescueNotProposed
            | DisputeTimeElapsed
            | RescueLocked
            | Reentrancy
            | ChainNotConfigured(_)
            | AddressNotRegistered(_)
            | PriceFeedNotRegistered(_) => ErrorKind::State,

            SlippageOutOfBounds
            | NegativeSlippage
            | InvalidSwapOutput
            | InsufficientBalance
            | OracleMalfunction => ErrorKind::Integrity,

            FailedToSendNative => ErrorKind::External,
        }
    }

    /// Whether the same call may succeed later without any change to its arguments.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ContractError::QuorumNotReached
                | ContractError::Locked
                | ContractError::RescueLocked
                | ContractError::PayloadNotUpdated
                | ContractError::DstSwapPending
        )
    }
}
